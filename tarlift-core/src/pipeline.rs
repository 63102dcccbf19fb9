//! Per-part archive → hash → manifest → transfer → verify pipeline.
//!
//! Parts run one at a time by default. With `jobs > 1` they run on a bounded
//! rayon pool; every master manifest write still goes through one mutex, so
//! the file on disk always marks exactly the parts verified so far.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::archive::Archiver;
use crate::cancel::CancelToken;
use crate::checksum;
use crate::error::{Error, Result, Stage};
use crate::inventory::{self, InventoryOptions};
use crate::master_manifest::{MasterManifest, PartInfo, RunLock};
use crate::part_manifest::PartManifest;
use crate::partition::{partition_with_total, Part};
use crate::progress::Progress;
use crate::remote::RemoteTarget;
use crate::transfer::{RemoteHasher, Uploader};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PartState {
    Planned,
    Archived,
    Hashed,
    Manifested,
    Transferred,
    Verified,
}

impl fmt::Display for PartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PartState::Planned => "PLANNED",
            PartState::Archived => "ARCHIVED",
            PartState::Hashed => "HASHED",
            PartState::Manifested => "MANIFESTED",
            PartState::Transferred => "TRANSFERRED",
            PartState::Verified => "VERIFIED",
        };
        f.write_str(s)
    }
}

/// Inventory and part layout of one source tree.
#[derive(Clone, Debug)]
pub struct Plan {
    pub source_dir: PathBuf,
    pub total_size: u64,
    pub total_files: usize,
    pub max_part_size: u64,
    pub parts: Vec<Part>,
}

/// Scan `source_dir` and split it into parts of at most `max_part_size`.
pub fn plan(source_dir: &Path, opts: &InventoryOptions, max_part_size: u64) -> Result<Plan> {
    let stat_total = inventory::total_size(source_dir, opts)?;
    let inv = inventory::scan(source_dir, opts)?;
    if inv.is_empty() {
        return Err(Error::EmptyInventory(source_dir.to_path_buf()));
    }
    if stat_total != inv.total_size {
        warn!(
            "source tree changed while scanning ({} vs {} bytes); using the larger total",
            stat_total, inv.total_size
        );
    }
    let total_size = stat_total.max(inv.total_size);
    let total_files = inv.len();
    let parts = partition_with_total(inv.files, total_size, max_part_size);
    info!(
        "{}: {} files, {} bytes in {} part(s)",
        source_dir.display(),
        total_files,
        total_size,
        parts.len()
    );
    Ok(Plan { source_dir: source_dir.to_path_buf(), total_size, total_files, max_part_size, parts })
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub upload_name: String,
    /// Archives, part manifests and the master manifest are written here.
    pub work_dir: PathBuf,
    pub jobs: usize,
    /// Skip parts an earlier run with the same layout already verified.
    pub resume: bool,
    /// Keep local archives after their part is verified.
    pub keep_archives: bool,
}

impl PipelineConfig {
    pub fn new(upload_name: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_name: upload_name.into(),
            work_dir: work_dir.into(),
            jobs: 1,
            resume: false,
            keep_archives: true,
        }
    }

    pub fn archive_name(&self, part_id: usize) -> String {
        format!("{}_part{}.tar.gz", self.upload_name, part_id)
    }
}

#[derive(Clone, Debug)]
pub struct PartOutcome {
    pub part_id: usize,
    pub state: PartState,
    pub tar_file: String,
    pub manifest: String,
    /// None for parts carried over from an earlier run.
    pub sha256: Option<String>,
    pub resumed: bool,
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub master_manifest: PathBuf,
    pub parts: Vec<PartOutcome>,
}

impl RunReport {
    pub fn resumed(&self) -> usize {
        self.parts.iter().filter(|p| p.resumed).count()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    archiver: Box<dyn Archiver>,
    uploader: Box<dyn Uploader>,
    remote_hasher: Box<dyn RemoteHasher>,
    progress: Progress,
    cancel: CancelToken,
}

struct Checkpoint<'a> {
    upload_name: &'a str,
    source_dir: String,
    work_dir: &'a Path,
    parts: Mutex<Vec<PartInfo>>,
}

impl Checkpoint<'_> {
    fn write(&self, parts: &[PartInfo]) -> Result<PathBuf> {
        MasterManifest::build_or_update(self.upload_name, &self.source_dir, parts.to_vec())
            .write(self.work_dir)
    }

    fn flush(&self) -> Result<PathBuf> {
        let guard = self.parts.lock().unwrap_or_else(|p| p.into_inner());
        self.write(&guard)
    }

    fn complete(&self, outcome: &PartOutcome) -> Result<()> {
        let mut guard = self.parts.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(info) = guard.iter_mut().find(|p| p.part_id == outcome.part_id) {
            info.tar_file = Some(outcome.tar_file.clone());
            info.manifest = Some(outcome.manifest.clone());
        }
        self.write(&guard)?;
        Ok(())
    }
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        archiver: Box<dyn Archiver>,
        uploader: Box<dyn Uploader>,
        remote_hasher: Box<dyn RemoteHasher>,
    ) -> Self {
        Self {
            config,
            archiver,
            uploader,
            remote_hasher,
            progress: Progress::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The run's cancellation token. A failing part in a parallel run
    /// cancels it to stop the other workers.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Take every part of `plan` to VERIFIED, in order, one destination per
    /// part. The first failure stops the run.
    pub fn run(&self, plan: &Plan, destinations: &[RemoteTarget]) -> Result<RunReport> {
        if destinations.len() != plan.parts.len() {
            return Err(Error::DestinationCount {
                expected: plan.parts.len(),
                got: destinations.len(),
            });
        }
        let cfg = &self.config;
        fs::create_dir_all(&cfg.work_dir).map_err(|e| Error::io(&cfg.work_dir, e))?;
        let work_dir = fs::canonicalize(&cfg.work_dir).map_err(|e| Error::io(&cfg.work_dir, e))?;
        let _lock = RunLock::acquire(&work_dir, &cfg.upload_name)?;

        let source_dir = plan.source_dir.to_string_lossy().into_owned();
        let mut infos: Vec<PartInfo> = plan
            .parts
            .iter()
            .zip(destinations)
            .map(|(p, d)| PartInfo {
                part_id: p.part_id,
                destination: d.to_string(),
                total_size: p.total_size,
                file_count: p.file_count(),
                tar_file: None,
                manifest: None,
            })
            .collect();
        if cfg.resume {
            carry_over(&work_dir, &cfg.upload_name, &source_dir, &plan.parts, &mut infos);
        }
        let resumed: Vec<PartOutcome> = infos
            .iter()
            .filter(|i| i.is_complete())
            .map(|i| PartOutcome {
                part_id: i.part_id,
                state: PartState::Verified,
                tar_file: i.tar_file.clone().unwrap_or_default(),
                manifest: i.manifest.clone().unwrap_or_default(),
                sha256: None,
                resumed: true,
            })
            .collect();

        let checkpoint = Checkpoint {
            upload_name: &cfg.upload_name,
            source_dir,
            work_dir: &work_dir,
            parts: Mutex::new(infos),
        };
        let master_path = checkpoint.flush()?;
        info!("master manifest: {}", master_path.display());

        let pending: Vec<(&Part, &RemoteTarget)> = plan
            .parts
            .iter()
            .zip(destinations)
            .filter(|(p, _)| !resumed.iter().any(|r| r.part_id == p.part_id))
            .collect();
        if !resumed.is_empty() {
            info!("resuming: {} of {} part(s) already verified", resumed.len(), plan.parts.len());
        }

        let n = plan.parts.len();
        self.progress.set_parts_total(n);
        for _ in &resumed {
            self.progress.inc_part();
        }
        self.progress.start();
        let result = self.run_pending(&pending, &plan.source_dir, n, &work_dir, &checkpoint);
        self.progress.stop();
        let mut done = result?;

        let master_manifest = checkpoint.flush()?;
        done.extend(resumed);
        done.sort_by_key(|o| o.part_id);
        Ok(RunReport { master_manifest, parts: done })
    }

    fn run_pending(
        &self,
        pending: &[(&Part, &RemoteTarget)],
        source_dir: &Path,
        n: usize,
        work_dir: &Path,
        checkpoint: &Checkpoint<'_>,
    ) -> Result<Vec<PartOutcome>> {
        let step = |part: &Part, dest: &RemoteTarget| -> Result<PartOutcome> {
            self.cancel.check()?;
            let outcome = self.process_part(part, dest, source_dir, n, work_dir)?;
            checkpoint.complete(&outcome)?;
            self.progress.inc_part();
            info!("part {}/{} uploaded and verified", part.part_id, n);
            Ok(outcome)
        };

        if self.config.jobs <= 1 {
            return pending.iter().map(|&(p, d)| step(p, d)).collect();
        }

        let pool = rayon::ThreadPoolBuilder::new().num_threads(self.config.jobs).build()?;
        let results: Vec<Result<PartOutcome>> = pool.install(|| {
            pending
                .par_iter()
                .map(|&(p, d)| {
                    let r = step(p, d);
                    if r.is_err() {
                        self.cancel.cancel();
                    }
                    r
                })
                .collect()
        });

        let mut done = Vec::with_capacity(results.len());
        let mut first_err: Option<Error> = None;
        for r in results {
            match r {
                Ok(o) => done.push(o),
                // report the part that failed, not the ones it cancelled
                Err(Error::Cancelled) => {
                    first_err.get_or_insert(Error::Cancelled);
                }
                Err(e) => {
                    if matches!(first_err, None | Some(Error::Cancelled)) {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(done),
        }
    }

    fn process_part(
        &self,
        part: &Part,
        dest: &RemoteTarget,
        source_dir: &Path,
        n: usize,
        work_dir: &Path,
    ) -> Result<PartOutcome> {
        let id = part.part_id;
        let tar_file = self.config.archive_name(id);
        let archive = work_dir.join(&tar_file);
        let mut state = PartState::Planned;
        let mut advance = |next: PartState| {
            debug!("part {id}: {state} -> {next}");
            state = next;
        };

        self.progress.set_stage(&format!("part {id}/{n}: archiving"));
        let rel_paths: Vec<&str> = part.rel_paths().collect();
        self.archiver
            .create(source_dir, &rel_paths, &archive, &self.cancel)
            .map_err(|e| e.at(id, Stage::Archive))?;
        advance(PartState::Archived);

        self.cancel.check()?;
        self.progress.set_stage(&format!("part {id}/{n}: hashing"));
        let sha256 = checksum::sha256_file(&archive, Some(&self.progress), Some(&self.cancel))
            .map_err(|e| e.at(id, Stage::Hash))?;
        advance(PartState::Hashed);

        let manifest_path = PartManifest::build(part, &tar_file, &sha256, id)
            .write(&archive)
            .map_err(|e| e.at(id, Stage::Manifest))?;
        advance(PartState::Manifested);

        self.cancel.check()?;
        self.progress.set_stage(&format!("part {id}/{n}: transferring"));
        self.uploader.upload(&archive, dest, &self.cancel).map_err(|e| e.at(id, Stage::Transfer))?;
        advance(PartState::Transferred);

        self.cancel.check()?;
        self.progress.set_stage(&format!("part {id}/{n}: verifying"));
        let remote = self
            .remote_hasher
            .remote_sha256(dest, &tar_file, &self.cancel)
            .map_err(|e| e.at(id, Stage::Verify))?;
        if remote != sha256 {
            return Err(Error::IntegrityMismatch { part_id: id, local: sha256, remote });
        }
        advance(PartState::Verified);

        if !self.config.keep_archives {
            if let Err(e) = fs::remove_file(&archive) {
                warn!("could not remove {}: {e}", archive.display());
            }
        }

        let manifest = manifest_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(PartOutcome { part_id: id, state, tar_file, manifest, sha256: Some(sha256), resumed: false })
    }
}

/// Copy artifacts of parts an earlier run verified into `infos`, provided
/// that run had the same source and the same part layout, and each carried
/// part's manifest still lists exactly the files planned for it.
fn carry_over(
    work_dir: &Path,
    upload_name: &str,
    source_dir: &str,
    parts: &[Part],
    infos: &mut [PartInfo],
) {
    let path = MasterManifest::path_for(work_dir, upload_name);
    if !path.exists() {
        return;
    }
    let prior = match MasterManifest::load(&path) {
        Ok(m) => m,
        Err(e) => {
            warn!("ignoring unreadable master manifest: {e}");
            return;
        }
    };
    let same_layout = prior.source_dir == source_dir
        && prior.parts.len() == infos.len()
        && prior.parts.iter().zip(infos.iter()).all(|(a, b)| {
            a.part_id == b.part_id
                && a.total_size == b.total_size
                && a.file_count == b.file_count
                && a.destination == b.destination
        });
    if !same_layout {
        warn!("{} describes a different layout; starting over", path.display());
        return;
    }
    for ((info, old), part) in infos.iter_mut().zip(prior.parts).zip(parts) {
        let Some(manifest) = old.manifest.as_deref().filter(|_| old.is_complete()) else {
            continue;
        };
        match PartManifest::load(&work_dir.join(manifest)) {
            Ok(m) if same_files(&m, part) => {
                info.tar_file = old.tar_file;
                info.manifest = old.manifest;
            }
            Ok(_) => info!("part {}: source files changed since it was verified", part.part_id),
            Err(e) => warn!("part {}: {e}; uploading it again", part.part_id),
        }
    }
}

fn same_files(manifest: &PartManifest, part: &Part) -> bool {
    manifest.files.len() == part.files.len()
        && manifest.files.iter().zip(&part.files).all(|(r, f)| {
            // the JSON float may be off in the last bit
            r.relpath == f.rel_path && r.size == f.size && (r.mtime - f.mtime).abs() < 1e-6
        })
}
