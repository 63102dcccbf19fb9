use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Pipeline step in which a part failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Archive,
    Hash,
    Manifest,
    Transfer,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Archive => "archive",
            Stage::Hash => "hash",
            Stage::Manifest => "manifest",
            Stage::Transfer => "transfer",
            Stage::Verify => "verify",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot read {path}: {source}")]
    Inventory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no regular files found under {0}")]
    EmptyInventory(PathBuf),

    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("invalid remote target {raw:?}: {reason}")]
    InvalidTarget { raw: String, reason: &'static str },

    #[error("{program} exited with {status}{}", stderr_suffix(.stderr))]
    CommandFailed { program: String, status: String, stderr: String },

    #[error("{program} timed out after {}s", .after.as_secs())]
    Timeout { program: String, after: Duration },

    #[error("unexpected checksum output: {0:?}")]
    BadDigest(String),

    #[error("part {part_id}: remote sha256 {remote} does not match local {local}")]
    IntegrityMismatch { part_id: usize, local: String, remote: String },

    #[error("part {part_id}: {stage} failed: {source}")]
    PartFailure {
        part_id: usize,
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("expected {expected} destinations, got {got}")]
    DestinationCount { expected: usize, got: usize },

    #[error("upload {0:?} is locked by another run")]
    Locked(String),

    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("cancelled")]
    Cancelled,

    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let tail = stderr.trim();
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {tail}")
    }
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn at(self, part_id: usize, stage: Stage) -> Self {
        match self {
            // Already carries the part and its own distinct kind.
            e @ (Error::IntegrityMismatch { .. } | Error::Cancelled | Error::PartFailure { .. }) => e,
            e => Error::PartFailure { part_id, stage, source: Box::new(e) },
        }
    }

    /// Failed part and stage, when the error came out of a part pipeline.
    pub fn part_stage(&self) -> Option<(usize, Stage)> {
        match self {
            Error::PartFailure { part_id, stage, .. } => Some((*part_id, *stage)),
            Error::IntegrityMismatch { part_id, .. } => Some((*part_id, Stage::Verify)),
            _ => None,
        }
    }

    pub fn is_integrity_mismatch(&self) -> bool {
        matches!(self, Error::IntegrityMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
