use log::warn;
use serde::Serialize;

use crate::inventory::FileDescriptor;

/// 150 GiB.
pub const DEFAULT_MAX_PART_SIZE: u64 = 150 * 1024 * 1024 * 1024;

/// Files packed together into one archive.
#[derive(Clone, Debug, Serialize)]
pub struct Part {
    /// 1-based, in creation order.
    pub part_id: usize,
    pub files: Vec<FileDescriptor>,
    pub total_size: u64,
    /// A single file larger than the ceiling.
    pub oversize: bool,
}

impl Part {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn rel_paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.rel_path.as_str())
    }
}

/// Split `files` into parts of at most `max_part_size` bytes each.
pub fn partition(files: Vec<FileDescriptor>, max_part_size: u64) -> Vec<Part> {
    let total = files.iter().map(|f| f.size).sum();
    partition_with_total(files, total, max_part_size)
}

/// Like [`partition`], with the inventory total already known.
///
/// When the whole inventory fits, the result is one part in traversal order.
/// Otherwise files are packed first-fit decreasing: stable sort by size,
/// largest first, each into the earliest bin with room, else a new bin.
pub fn partition_with_total(
    files: Vec<FileDescriptor>,
    total_size: u64,
    max_part_size: u64,
) -> Vec<Part> {
    if files.is_empty() {
        return Vec::new();
    }
    if total_size <= max_part_size {
        let total_size = files.iter().map(|f| f.size).sum();
        return vec![Part { part_id: 1, files, total_size, oversize: false }];
    }

    let mut sorted = files;
    // sort_by is stable: equal sizes keep traversal order
    sorted.sort_by(|a, b| b.size.cmp(&a.size));

    let mut bins: Vec<Part> = Vec::new();
    for f in sorted {
        let slot = bins
            .iter()
            .position(|b| b.total_size.checked_add(f.size).is_some_and(|t| t <= max_part_size));
        match slot {
            Some(i) => {
                let bin = &mut bins[i];
                bin.total_size += f.size;
                bin.files.push(f);
            }
            None => {
                let oversize = f.size > max_part_size;
                if oversize {
                    warn!(
                        "single file {} ({} bytes) exceeds the part ceiling of {} bytes; \
                         it gets a part of its own",
                        f.rel_path, f.size, max_part_size
                    );
                }
                bins.push(Part {
                    part_id: bins.len() + 1,
                    total_size: f.size,
                    files: vec![f],
                    oversize,
                });
            }
        }
    }
    bins
}
