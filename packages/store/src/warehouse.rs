//! Canonical file paths for the audit data directory tree.
//!
//! All artifact paths are derived from one data root. Each stage
//! exclusively owns the directory it writes into; downstream stages
//! only read.

use std::path::{Path, PathBuf};

use toll_audit_trip_models::PartitionKey;

/// The audit warehouse: one data root and the directory tree under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warehouse {
    root: PathBuf,
}

impl Warehouse {
    /// Creates a warehouse rooted at `root`. No directories are touched
    /// until [`ensure_layout`](Self::ensure_layout) is called.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The data root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-fleet directory of raw source partitions.
    #[must_use]
    pub fn raw_dir(&self, fleet_id: &str) -> PathBuf {
        self.root.join("raw").join(fleet_id)
    }

    /// Directory of canonical (unified) partitions.
    #[must_use]
    pub fn unified_dir(&self) -> PathBuf {
        self.root.join("unified")
    }

    /// Directory of verified partitions.
    #[must_use]
    pub fn verified_dir(&self) -> PathBuf {
        self.root.join("verified")
    }

    /// Directory of anomaly trace partitions.
    #[must_use]
    pub fn anomalies_dir(&self) -> PathBuf {
        self.root.join("anomalies")
    }

    /// Directory of aggregate datamart artifacts.
    #[must_use]
    pub fn datamart_dir(&self) -> PathBuf {
        self.root.join("datamart")
    }

    /// Directory of synthetic (imputed) partitions and their manifests.
    #[must_use]
    pub fn synthetic_dir(&self) -> PathBuf {
        self.root.join("synthetic")
    }

    /// Directory of geospatial reference inputs.
    #[must_use]
    pub fn zones_dir(&self) -> PathBuf {
        self.root.join("zones")
    }

    /// Path of one canonical partition.
    #[must_use]
    pub fn unified_partition(&self, key: &PartitionKey) -> PathBuf {
        self.unified_dir().join(key.file_name())
    }

    /// Path of one verified partition.
    #[must_use]
    pub fn verified_partition(&self, key: &PartitionKey) -> PathBuf {
        self.verified_dir().join(key.file_name())
    }

    /// Path of one anomaly trace partition.
    #[must_use]
    pub fn anomaly_partition(&self, key: &PartitionKey) -> PathBuf {
        self.anomalies_dir().join(key.file_name())
    }

    /// Path of one synthetic partition.
    #[must_use]
    pub fn synthetic_partition(&self, key: &PartitionKey) -> PathBuf {
        self.synthetic_dir().join(key.file_name())
    }

    /// Path of the provenance manifest next to a synthetic partition.
    #[must_use]
    pub fn synthetic_manifest(&self, key: &PartitionKey) -> PathBuf {
        self.synthetic_dir().join(key.manifest_file_name())
    }

    /// Path of the zone polygon reference (`GeoJSON` feature collection).
    #[must_use]
    pub fn zone_reference(&self) -> PathBuf {
        self.zones_dir().join("zones.geojson")
    }

    /// Path of the persisted policy zone set.
    #[must_use]
    pub fn policy_zones(&self) -> PathBuf {
        self.datamart_dir().join("policy_zones.parquet")
    }

    /// Path of the daily zone category aggregate.
    #[must_use]
    pub fn daily_zone_metrics(&self) -> PathBuf {
        self.datamart_dir().join("daily_zone_metrics.parquet")
    }

    /// Path of the regional compliance telemetry artifact.
    #[must_use]
    pub fn zone_compliance_telemetry(&self) -> PathBuf {
        self.datamart_dir().join("zone_compliance_telemetry.parquet")
    }

    /// Path of the single-row compliance summary.
    #[must_use]
    pub fn compliance_summary(&self) -> PathBuf {
        self.datamart_dir().join("compliance_summary.parquet")
    }

    /// Path of the fleet dynamics matrix.
    #[must_use]
    pub fn fleet_dynamics(&self) -> PathBuf {
        self.datamart_dir().join("fleet_dynamics.parquet")
    }

    /// Creates every warehouse directory the pipeline writes into, plus
    /// the per-fleet raw drop directories.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if any directory cannot be created.
    pub fn ensure_layout<S: AsRef<str>>(&self, fleet_ids: &[S]) -> std::io::Result<()> {
        for fleet_id in fleet_ids {
            ensure_dir(&self.raw_dir(fleet_id.as_ref()))?;
        }

        ensure_dir(&self.unified_dir())?;
        ensure_dir(&self.verified_dir())?;
        ensure_dir(&self.anomalies_dir())?;
        ensure_dir(&self.datamart_dir())?;
        ensure_dir(&self.synthetic_dir())?;
        ensure_dir(&self.zones_dir())?;

        Ok(())
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_paths_sit_under_their_stage_directories() {
        let warehouse = Warehouse::new("/tmp/audit");
        let key = PartitionKey::new("yellow", 2025, 1);

        assert_eq!(
            warehouse.unified_partition(&key),
            Path::new("/tmp/audit/unified/yellow_2025-01.parquet")
        );
        assert_eq!(
            warehouse.verified_partition(&key),
            Path::new("/tmp/audit/verified/yellow_2025-01.parquet")
        );
        assert_eq!(
            warehouse.anomaly_partition(&key),
            Path::new("/tmp/audit/anomalies/yellow_2025-01.parquet")
        );
        assert_eq!(
            warehouse.synthetic_manifest(&key),
            Path::new("/tmp/audit/synthetic/yellow_2025-01.manifest.json")
        );
    }

    #[test]
    fn raw_partitions_are_segregated_per_fleet() {
        let warehouse = Warehouse::new("data");

        assert_eq!(warehouse.raw_dir("yellow"), Path::new("data/raw/yellow"));
        assert_eq!(warehouse.raw_dir("green"), Path::new("data/raw/green"));
    }

    #[test]
    fn datamart_artifacts_have_stable_names() {
        let warehouse = Warehouse::new("data");

        assert_eq!(
            warehouse.policy_zones(),
            Path::new("data/datamart/policy_zones.parquet")
        );
        assert_eq!(
            warehouse.daily_zone_metrics(),
            Path::new("data/datamart/daily_zone_metrics.parquet")
        );
        assert_eq!(
            warehouse.zone_compliance_telemetry(),
            Path::new("data/datamart/zone_compliance_telemetry.parquet")
        );
        assert_eq!(
            warehouse.compliance_summary(),
            Path::new("data/datamart/compliance_summary.parquet")
        );
        assert_eq!(
            warehouse.fleet_dynamics(),
            Path::new("data/datamart/fleet_dynamics.parquet")
        );
    }
}
