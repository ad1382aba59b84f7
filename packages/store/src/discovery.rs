//! Partition discovery over warehouse directories.

use std::path::{Path, PathBuf};

use toll_audit_trip_models::PartitionKey;

/// One partition file found in a warehouse directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPartition {
    /// The partition identity parsed from the file name.
    pub key: PartitionKey,
    /// Full path of the partition file.
    pub path: PathBuf,
}

/// Lists the Parquet partitions in `dir`, sorted by partition key.
///
/// A missing directory yields an empty list. Parquet files that do not
/// follow the partition naming scheme (and leftover `.tmp` staging
/// files) are skipped.
#[must_use]
pub fn discover_partitions(dir: &Path) -> Vec<DiscoveredPartition> {
    let mut partitions = Vec::new();

    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match PartitionKey::parse(name) {
                Ok(key) => partitions.push(DiscoveredPartition { key, path }),
                Err(_) => log::debug!("Skipping non-partition file: {name}"),
            }
        }
    }

    partitions.sort_by(|a, b| a.key.cmp(&b.key));
    partitions
}

/// Lists every `.parquet` file in `dir`, sorted by file name.
///
/// Used for raw source directories, whose file names follow each
/// fleet's own pattern rather than the partition scheme. A missing
/// directory yields an empty list.
#[must_use]
pub fn parquet_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}
