use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tarlift_core::archive::TarArchiver;
use tarlift_core::inventory::InventoryOptions;
use tarlift_core::master_manifest::MasterManifest;
use tarlift_core::partition::DEFAULT_MAX_PART_SIZE;
use tarlift_core::pipeline::{self, Pipeline, PipelineConfig, Plan};
use tarlift_core::progress::Progress;
use tarlift_core::remote::RemoteTarget;
use tarlift_core::transfer::{RsyncUploader, SshRemoteHasher};

mod config;
mod prompt;
mod size;

use config::Config;

#[derive(Parser)]
#[command(name = "tarlift", version, about = "Pack a directory into size-bounded tar.gz parts, upload and verify them")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Archive, hash, upload and verify every part
    Upload(UploadArgs),
    /// Show how the source tree would be split, without writing anything
    Plan {
        #[arg(long, alias = "source_dir")]
        source_dir: PathBuf,
        #[arg(long, value_parser = size::parse_size, default_value_t = DEFAULT_MAX_PART_SIZE)]
        max_part_size: u64,
        #[arg(long)]
        exclude: Vec<String>,
        /// Print the parts as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report which parts of a master manifest reached VERIFIED
    Status { master: PathBuf },
    /// Show or change local settings
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    Show,
    /// Save the default remote root used when --remote-root is absent
    SetRemoteRoot { path: String },
}

#[derive(Args)]
struct UploadArgs {
    #[arg(long, alias = "source_dir")]
    source_dir: Option<PathBuf>,
    #[arg(long, alias = "upload_name")]
    upload_name: Option<String>,
    /// e.g. user@host
    #[arg(long, alias = "remote_host")]
    remote_host: Option<String>,
    /// Remote directory the per-part destinations are relative to
    #[arg(long)]
    remote_root: Option<String>,
    /// Destination of each part, relative to the remote root, in part order
    #[arg(long)]
    dest: Vec<String>,
    #[arg(long, value_parser = size::parse_size, default_value_t = DEFAULT_MAX_PART_SIZE)]
    max_part_size: u64,
    /// Where archives and manifests are written
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,
    #[arg(long)]
    exclude: Vec<String>,
    /// Parts processed at once
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=64))]
    jobs: u16,
    /// Skip parts an earlier run of the same upload already verified
    #[arg(long, default_value_t = false)]
    resume: bool,
    /// Delete each local archive once its part is verified
    #[arg(long, default_value_t = false)]
    remove_archives: bool,
    /// Seconds before tar is killed
    #[arg(long)]
    archive_timeout: Option<u64>,
    /// Seconds before rsync is killed
    #[arg(long)]
    transfer_timeout: Option<u64>,
    /// Seconds before the remote checksum is abandoned
    #[arg(long)]
    verify_timeout: Option<u64>,
    #[arg(long, default_value_t = false)]
    progress: bool,
    /// Graphical mode (not available; falls back to the prompts)
    #[arg(long, default_value_t = false)]
    gui: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let cfg_path = config::config_path();
    match cli.cmd {
        Cmd::Upload(args) => {
            let cfg = match &cfg_path {
                Some(p) => Config::load(p)?,
                None => Config::default(),
            };
            upload(args, &cfg)?;
        }
        Cmd::Plan { source_dir, max_part_size, exclude, json } => {
            let opts = InventoryOptions { excludes: exclude, ..Default::default() };
            let plan = pipeline::plan(&source_dir, &opts, max_part_size)?;
            print_plan(&plan, json)?;
        }
        Cmd::Status { master } => status(&master)?,
        Cmd::Config { action } => {
            let path = cfg_path.ok_or_else(|| anyhow!("no config directory; set TARLIFT_CONFIG"))?;
            config_cmd(action, &path)?;
        }
    }
    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn upload(args: UploadArgs, cfg: &Config) -> Result<()> {
    if args.gui {
        warn!("graphical mode is not available; falling back to the command line");
    }
    let source_dir = PathBuf::from(prompt::value_or_ask(
        args.source_dir.map(|p| p.to_string_lossy().into_owned()),
        "Enter source directory: ",
    )?);
    let upload_name = prompt::value_or_ask(args.upload_name, "Enter upload name: ")?;
    if upload_name.contains(['/', '\\']) || upload_name.starts_with('.') {
        bail!("upload name {upload_name:?} must be a plain file name");
    }
    let remote_host = prompt::value_or_ask(args.remote_host, "Enter remote host (e.g., user@host): ")?;
    let remote_root = args.remote_root.unwrap_or_else(|| cfg.remote_root().to_string());

    let opts = InventoryOptions {
        excludes: args.exclude,
        skip_dir: Some(args.work_dir.clone()),
        upload_name: Some(upload_name.clone()),
    };
    let plan = pipeline::plan(&source_dir, &opts, args.max_part_size)?;
    let dests = destinations(&plan, &remote_host, &remote_root, &args.dest)?;

    let secs = |s: Option<u64>| s.map(Duration::from_secs);
    let archiver = TarArchiver { timeout: secs(args.archive_timeout), ..Default::default() };
    let uploader = RsyncUploader {
        show_progress: args.progress,
        timeout: secs(args.transfer_timeout),
        ..Default::default()
    };
    let hasher = SshRemoteHasher { timeout: secs(args.verify_timeout), ..Default::default() };

    let mut pcfg = PipelineConfig::new(&upload_name, &args.work_dir);
    pcfg.jobs = args.jobs as usize;
    pcfg.resume = args.resume;
    pcfg.keep_archives = !args.remove_archives;
    let pipeline = Pipeline::new(pcfg, Box::new(archiver), Box::new(uploader), Box::new(hasher))
        .with_progress(Progress::new(args.progress));

    let report = pipeline.run(&plan, &dests).map_err(|e| {
        let what = match e.part_stage() {
            Some((id, _)) if e.is_integrity_mismatch() => format!("part {id} arrived corrupted"),
            Some((id, stage)) => format!("part {id} failed during {stage}"),
            None => format!("upload {upload_name:?} failed"),
        };
        anyhow::Error::new(e).context(what)
    })?;
    if report.resumed() > 0 {
        info!("{} part(s) were already verified by an earlier run", report.resumed());
    }
    println!("Master manifest: {}", report.master_manifest.display());
    Ok(())
}

fn destinations(plan: &Plan, host: &str, root: &str, given: &[String]) -> Result<Vec<RemoteTarget>> {
    if given.len() > plan.parts.len() {
        bail!("{} destinations given for {} part(s)", given.len(), plan.parts.len());
    }
    let mut out = Vec::with_capacity(plan.parts.len());
    for part in &plan.parts {
        let rel = match given.get(part.part_id - 1) {
            Some(d) => d.clone(),
            None => prompt::ask_optional(&format!(
                "Enter destination path for part {} (relative to remote root): ",
                part.part_id
            ))?,
        };
        out.push(RemoteTarget::new(host, root, &rel)?);
    }
    Ok(out)
}

fn print_plan(plan: &Plan, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&plan.parts)?);
        return Ok(());
    }
    println!(
        "{} files, {} bytes, ceiling {} bytes -> {} part(s)",
        plan.total_files,
        plan.total_size,
        plan.max_part_size,
        plan.parts.len()
    );
    for p in &plan.parts {
        let flag = if p.oversize { "  OVERSIZE" } else { "" };
        println!("part {}: {} files, {} bytes{}", p.part_id, p.file_count(), p.total_size, flag);
    }
    Ok(())
}

fn status(master: &Path) -> Result<()> {
    let m = MasterManifest::load(master)?;
    println!("{} ({}): {} files, {} bytes", m.upload_name, m.source_dir, m.total_files, m.total_size);
    for p in &m.parts {
        let state = if p.is_complete() { "VERIFIED" } else { "INCOMPLETE" };
        println!(
            "part {}: {} files, {} bytes -> {} [{}]",
            p.part_id, p.file_count, p.total_size, p.destination, state
        );
    }
    let done = m.completed_parts().count();
    if !m.is_complete() {
        bail!("{} of {} part(s) incomplete", m.parts.len() - done, m.parts.len());
    }
    println!("OK");
    Ok(())
}

fn config_cmd(action: ConfigCmd, path: &Path) -> Result<()> {
    let mut cfg = Config::load(path)?;
    match action {
        ConfigCmd::Show => {
            println!("config: {}", path.display());
            println!("remote_root: {}", cfg.remote_root());
        }
        ConfigCmd::SetRemoteRoot { path: root } => {
            cfg.remote_root = Some(root);
            cfg.save(path).context("save config")?;
            eprintln!("Default root saved.");
        }
    }
    Ok(())
}
