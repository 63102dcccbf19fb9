use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::partition::Part;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FileRecord {
    pub relpath: String,
    pub size: u64,
    pub filetype: String,
    pub mtime: f64,
}

/// Immutable record of one archive: what went in, and its SHA-256.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PartManifest {
    pub part_id: usize,
    pub tar_file: String,
    pub sha256: String,
    pub files: Vec<FileRecord>,
    pub total_size: u64,
    pub file_count: usize,
}

/// Lower-cased final extension of `relpath`, without the dot; empty if none.
pub fn filetype(relpath: &str) -> String {
    Path::new(relpath)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Path of the manifest that sits next to `archive`.
pub fn manifest_path_for(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

impl PartManifest {
    pub fn build(part: &Part, archive_name: &str, sha256: &str, part_id: usize) -> Self {
        let files: Vec<FileRecord> = part
            .files
            .iter()
            .map(|f| FileRecord {
                relpath: f.rel_path.clone(),
                size: f.size,
                filetype: filetype(&f.rel_path),
                mtime: f.mtime,
            })
            .collect();
        PartManifest {
            part_id,
            tar_file: archive_name.to_string(),
            sha256: sha256.to_string(),
            total_size: files.iter().map(|f| f.size).sum(),
            file_count: files.len(),
            files,
        }
    }

    /// Write as `<archive>.json` and return that path.
    pub fn write(&self, archive: &Path) -> Result<PathBuf> {
        let path = manifest_path_for(archive);
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Json { path: path.clone(), source: e })?;
        let mut f = File::create(&path).map_err(|e| Error::io(&path, e))?;
        f.write_all(body.as_bytes()).map_err(|e| Error::io(&path, e))?;
        f.sync_all().map_err(|e| Error::io(&path, e))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_reader(BufReader::new(f))
            .map_err(|e| Error::Json { path: path.into(), source: e })
    }
}
