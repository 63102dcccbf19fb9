//! Source tree inventory.
//!
//! Symlinks are never followed and never archived; sockets, FIFOs and device
//! nodes are skipped as well. Only regular files end up in an inventory.

use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use globset::{Glob, GlobSet, GlobSetBuilder};
use log::{debug, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// One regular file found under the source root.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileDescriptor {
    /// Path relative to the source root, `/`-separated.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub size: u64,
    /// Modification time in seconds since the UNIX epoch.
    pub mtime: f64,
}

#[derive(Clone, Debug, Default)]
pub struct InventoryOptions {
    /// Glob patterns matched against relative paths; matching files and
    /// directories are left out.
    pub excludes: Vec<String>,
    /// Directory to prune if it lies inside the source tree (the work dir).
    pub skip_dir: Option<PathBuf>,
    /// Upload whose artifacts (`<name>_partN.tar.gz[.json]`,
    /// `<name>_master.json`, `<name>_master.lock`) are left out when
    /// `skip_dir` is the source root itself.
    pub upload_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Inventory {
    pub root: PathBuf,
    pub files: Vec<FileDescriptor>,
    pub total_size: u64,
}

impl Inventory {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

struct Selector {
    excludes: GlobSet,
    skip_rel: Option<PathBuf>,
    /// Set when the work dir is the source root.
    artifacts_of: Option<String>,
}

impl Selector {
    fn new(root: &Path, opts: &InventoryOptions) -> Result<Self> {
        let mut b = GlobSetBuilder::new();
        for g in &opts.excludes {
            b.add(Glob::new(g)?);
        }
        let work_rel = opts.skip_dir.as_deref().and_then(|skip| {
            let root_can = fs::canonicalize(root).ok()?;
            let skip_can = fs::canonicalize(skip).ok()?;
            skip_can.strip_prefix(&root_can).ok().map(Path::to_path_buf)
        });
        let (skip_rel, artifacts_of) = match work_rel {
            Some(rel) if rel.as_os_str().is_empty() => {
                if opts.upload_name.is_none() {
                    warn!("work dir is the source root; earlier archives may be picked up");
                }
                (None, opts.upload_name.clone())
            }
            other => (other, None),
        };
        Ok(Self { excludes: b.build()?, skip_rel, artifacts_of })
    }

    fn skips_dir(&self, rel: &Path) -> bool {
        if self.skip_rel.as_deref() == Some(rel) {
            return true;
        }
        self.excludes.is_match(slash_path(rel))
    }

    fn excludes_file(&self, rel: &str) -> bool {
        if let Some(name) = &self.artifacts_of {
            if is_run_artifact(name, rel) {
                return true;
            }
        }
        self.excludes.is_match(rel)
    }
}

/// Whether top-level `rel` is one of the files a run of `upload_name` writes
/// into its work dir.
fn is_run_artifact(upload_name: &str, rel: &str) -> bool {
    let Some(rest) = rel.strip_prefix(upload_name) else {
        return false;
    };
    if rest == "_master.json" || rest == "_master.lock" {
        return true;
    }
    rest.strip_prefix("_part")
        .and_then(|r| r.strip_suffix(".tar.gz.json").or_else(|| r.strip_suffix(".tar.gz")))
        .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
}

fn slash_path(rel: &Path) -> String {
    let parts: Vec<String> =
        rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    parts.join("/")
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf())
}

fn mtime_secs(md: &Metadata) -> f64 {
    match md.modified() {
        Ok(t) => match t.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64(),
            Err(e) => -e.duration().as_secs_f64(),
        },
        Err(_) => 0.0,
    }
}

fn ensure_dir(root: &Path) -> Result<()> {
    let md = fs::metadata(root).map_err(|e| Error::Inventory { path: root.into(), source: e })?;
    if !md.is_dir() {
        return Err(Error::Inventory {
            path: root.into(),
            source: io::Error::new(io::ErrorKind::Other, "not a directory"),
        });
    }
    Ok(())
}

fn walk_error(root: &Path, e: walkdir::Error) -> Error {
    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    Error::Inventory { path, source: io::Error::from(e) }
}

/// Walk `root` and describe every regular file, in file-name-sorted
/// traversal order. Any unreadable entry aborts the scan.
pub fn scan(root: &Path, opts: &InventoryOptions) -> Result<Inventory> {
    ensure_dir(root)?;
    let sel = Selector::new(root, opts)?;
    let mut files = Vec::new();
    let mut total_size = 0u64;

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && sel.skips_dir(&relative(root, e.path()))));

    for ent in walker {
        let ent = ent.map_err(|e| walk_error(root, e))?;
        let ft = ent.file_type();
        if ft.is_dir() {
            continue;
        }
        if !ft.is_file() {
            debug!("skipping non-regular entry {}", ent.path().display());
            continue;
        }
        let rel_path = slash_path(&relative(root, ent.path()));
        if sel.excludes_file(&rel_path) {
            debug!("excluded {rel_path}");
            continue;
        }
        let md = ent.metadata().map_err(|e| walk_error(root, e))?;
        total_size += md.len();
        files.push(FileDescriptor {
            rel_path,
            abs_path: ent.path().to_path_buf(),
            size: md.len(),
            mtime: mtime_secs(&md),
        });
    }

    debug!("inventory of {}: {} files, {} bytes", root.display(), files.len(), total_size);
    Ok(Inventory { root: root.to_path_buf(), files, total_size })
}

/// Total size of the regular files under `root`, by a separate stat pass
/// that applies the same selection rules as [`scan`].
pub fn total_size(root: &Path, opts: &InventoryOptions) -> Result<u64> {
    ensure_dir(root)?;
    let sel = Selector::new(root, opts)?;
    dir_size(root, root, &sel)
}

fn dir_size(root: &Path, dir: &Path, sel: &Selector) -> Result<u64> {
    let unreadable = |path: &Path, e: io::Error| Error::Inventory { path: path.into(), source: e };
    let mut total = 0u64;
    for ent in fs::read_dir(dir).map_err(|e| unreadable(dir, e))? {
        let ent = ent.map_err(|e| unreadable(dir, e))?;
        let path = ent.path();
        let ft = ent.file_type().map_err(|e| unreadable(&path, e))?;
        if ft.is_dir() {
            if !sel.skips_dir(&relative(root, &path)) {
                total += dir_size(root, &path, sel)?;
            }
        } else if ft.is_file() {
            if sel.excludes_file(&slash_path(&relative(root, &path))) {
                continue;
            }
            total += ent.metadata().map_err(|e| unreadable(&path, e))?.len();
        }
    }
    Ok(total)
}
