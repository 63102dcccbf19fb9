use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Per-part entry of the master manifest. `tar_file` and `manifest` are set
/// only once the part has been verified on the remote side.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PartInfo {
    pub part_id: usize,
    pub destination: String,
    pub total_size: u64,
    pub file_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tar_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
}

impl PartInfo {
    pub fn is_complete(&self) -> bool {
        self.tar_file.is_some() && self.manifest.is_some()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MasterManifest {
    pub upload_name: String,
    pub source_dir: String,
    pub parts: Vec<PartInfo>,
    pub total_size: u64,
    pub total_files: usize,
    #[serde(default)]
    pub updated_utc: String,
}

impl MasterManifest {
    /// Totals are always summed from `parts`.
    pub fn build_or_update(upload_name: &str, source_dir: &str, parts: Vec<PartInfo>) -> Self {
        MasterManifest {
            upload_name: upload_name.to_string(),
            source_dir: source_dir.to_string(),
            total_size: parts.iter().map(|p| p.total_size).sum(),
            total_files: parts.iter().map(|p| p.file_count).sum(),
            parts,
            updated_utc: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn path_for(dir: &Path, upload_name: &str) -> PathBuf {
        dir.join(format!("{upload_name}_master.json"))
    }

    /// Replace `<dir>/<upload_name>_master.json` atomically.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = Self::path_for(dir, &self.upload_name);
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Json { path: path.clone(), source: e })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
        tmp.write_all(body.as_bytes()).map_err(|e| Error::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| Error::io(&path, e.error))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_reader(BufReader::new(f))
            .map_err(|e| Error::Json { path: path.into(), source: e })
    }

    pub fn completed_parts(&self) -> impl Iterator<Item = &PartInfo> {
        self.parts.iter().filter(|p| p.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        !self.parts.is_empty() && self.parts.iter().all(PartInfo::is_complete)
    }
}

/// Exclusive advisory lock on `<upload_name>_master.lock`, held for a run.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(dir: &Path, upload_name: &str) -> Result<Self> {
        let path = dir.join(format!("{upload_name}_master.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        file.try_lock_exclusive().map_err(|_| Error::Locked(upload_name.to_string()))?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
