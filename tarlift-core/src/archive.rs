use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::exec::{self, RunOptions};

/// Builds one compressed archive from paths relative to a base directory.
pub trait Archiver: Send + Sync {
    fn create(
        &self,
        base_dir: &Path,
        rel_paths: &[&str],
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<()>;
}

/// `tar -czf`, with the file list fed NUL-separated on stdin.
#[derive(Clone, Debug)]
pub struct TarArchiver {
    pub program: String,
    pub timeout: Option<Duration>,
}

impl Default for TarArchiver {
    fn default() -> Self {
        Self { program: "tar".into(), timeout: None }
    }
}

impl Archiver for TarArchiver {
    fn create(
        &self,
        base_dir: &Path,
        rel_paths: &[&str],
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut list = Vec::with_capacity(rel_paths.iter().map(|p| p.len() + 3).sum());
        for p in rel_paths {
            // tar reads a leading '-' in the list as an option
            if p.starts_with('-') {
                list.extend_from_slice(b"./");
            }
            list.extend_from_slice(p.as_bytes());
            list.push(0);
        }
        let mut cmd = Command::new(&self.program);
        cmd.arg("-czf").arg(output).arg("-C").arg(base_dir).args(["--null", "-T", "-"]);
        exec::run(
            cmd,
            RunOptions { stdin: Some(list), timeout: self.timeout, cancel: Some(cancel), ..Default::default() },
        )?;
        Ok(())
    }
}
