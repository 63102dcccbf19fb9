use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::checksum::parse_digest;
use crate::error::Result;
use crate::exec::{self, RunOptions};
use crate::remote::{shell_quote, RemoteTarget};

/// Copies a local file into a remote directory.
pub trait Uploader: Send + Sync {
    fn upload(&self, local: &Path, target: &RemoteTarget, cancel: &CancelToken) -> Result<()>;
}

/// Asks the remote side for the SHA-256 of a file it holds.
pub trait RemoteHasher: Send + Sync {
    fn remote_sha256(
        &self,
        target: &RemoteTarget,
        file_name: &str,
        cancel: &CancelToken,
    ) -> Result<String>;
}

/// `rsync --partial`, so an interrupted copy resumes on the next attempt.
#[derive(Clone, Debug)]
pub struct RsyncUploader {
    pub program: String,
    pub show_progress: bool,
    pub timeout: Option<Duration>,
}

impl Default for RsyncUploader {
    fn default() -> Self {
        Self { program: "rsync".into(), show_progress: false, timeout: None }
    }
}

impl Uploader for RsyncUploader {
    fn upload(&self, local: &Path, target: &RemoteTarget, cancel: &CancelToken) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--partial");
        if self.show_progress {
            cmd.arg("--progress");
        }
        cmd.arg(local).arg(target.rsync_dest());
        exec::run(cmd, RunOptions { timeout: self.timeout, cancel: Some(cancel), ..Default::default() })?;
        Ok(())
    }
}

/// `ssh <host> sha256sum -- <path>`.
#[derive(Clone, Debug)]
pub struct SshRemoteHasher {
    pub program: String,
    pub timeout: Option<Duration>,
}

impl Default for SshRemoteHasher {
    fn default() -> Self {
        Self { program: "ssh".into(), timeout: None }
    }
}

impl RemoteHasher for SshRemoteHasher {
    fn remote_sha256(
        &self,
        target: &RemoteTarget,
        file_name: &str,
        cancel: &CancelToken,
    ) -> Result<String> {
        let remote_cmd = format!("sha256sum -- {}", shell_quote(&target.file_path(file_name)));
        let mut cmd = Command::new(&self.program);
        cmd.arg(target.ssh_host()).arg(remote_cmd);
        let out = exec::run(
            cmd,
            RunOptions {
                capture_stdout: true,
                timeout: self.timeout,
                cancel: Some(cancel),
                ..Default::default()
            },
        )?;
        parse_digest(&out.stdout)
    }
}
