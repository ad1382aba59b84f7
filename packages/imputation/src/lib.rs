#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Weighted cycle imputation for a target month with no observed data.
//!
//! The target month is rebuilt per fleet from the same month of two
//! prior years: the older anchor carries seasonality, the recent anchor
//! carries trajectory. Both anchors are aggregated to day-of-month
//! grain, inner-joined on the day, and blended with configured weights.
//! The result is published as a synthetic partition with provenance
//! columns and a JSON manifest sidecar, so synthetic data can never be
//! mistaken for observed data.

use std::path::Path;

use duckdb::Connection;
use serde::{Deserialize, Serialize};
use toll_audit_config::{AuditConfig, ImputationConfig};
use toll_audit_fleet::FleetDefinition;
use toll_audit_store::publish::{ParquetCompression, copy_to_parquet, write_bytes_atomic};
use toll_audit_store::warehouse::ensure_dir;
use toll_audit_store::{StoreError, Warehouse, session};
use toll_audit_trip_models::PartitionKey;

/// Provenance tag stamped on every synthetic record and manifest.
pub const GENERATOR_TAG: &str = "weighted-cycle-imputation";

const BLEND_TABLE: &str = "synthetic_horizon";

/// Errors that can occur during imputation.
#[derive(Debug, thiserror::Error)]
pub enum ImputationError {
    /// Warehouse I/O or publish error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// Engine error outside the store layer.
    #[error("Engine error: {0}")]
    DuckDb(#[from] duckdb::Error),
    /// A fleet is missing one of its anchor partitions.
    #[error("Missing anchor partition {partition} for fleet {fleet}")]
    MissingAnchor { fleet: String, partition: String },
    /// Manifest serialization error.
    #[error("Manifest error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Provenance manifest written next to each synthetic partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticManifest {
    pub generator: String,
    pub fleet: String,
    pub weight_older: f64,
    pub weight_recent: f64,
    pub older_anchor: String,
    pub recent_anchor: String,
    pub created_at: String,
}

/// Outcome of one recovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Whether any configured fleet was missing the target month.
    pub gap_detected: bool,
    /// Fleets whose synthetic partition was written this run.
    pub recovered: Vec<String>,
    /// Fleets whose synthetic partition already existed.
    pub skipped: Vec<String>,
    /// Fleets that could not be recovered.
    pub failed: Vec<String>,
}

impl RecoveryReport {
    /// Whether every fleet that needed recovery now has a synthetic
    /// partition. A bypassed run (no gap) is trivially complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Rebuilds the missing target month from two anchor Decembers.
pub struct GapImputer<'a> {
    config: &'a AuditConfig,
    warehouse: &'a Warehouse,
}

impl<'a> GapImputer<'a> {
    #[must_use]
    pub const fn new(config: &'a AuditConfig, warehouse: &'a Warehouse) -> Self {
        Self { config, warehouse }
    }

    /// Scans for the gap and recovers every fleet that needs it.
    ///
    /// Fleets with observed target-month data are not candidates; a
    /// fully populated target month bypasses the run. Per-fleet
    /// failures are tallied and do not abort the batch.
    ///
    /// # Errors
    ///
    /// * If the engine session cannot be opened
    /// * If the synthetic directory cannot be created
    pub fn recover_all(
        &self,
        fleets: &[FleetDefinition],
    ) -> Result<RecoveryReport, ImputationError> {
        let imputation = &self.config.imputation;
        if !imputation.weights_are_normalized() {
            log::warn!(
                "Imputation weights sum to {}; estimates will not be renormalized",
                imputation.weight_sum()
            );
        }

        let candidates: Vec<&FleetDefinition> = fleets
            .iter()
            .filter(|fleet| {
                let key = fleet.partition_key(imputation.target_year, imputation.target_month);
                !self.warehouse.unified_partition(&key).exists()
            })
            .collect();

        if candidates.is_empty() {
            log::info!(
                "Target month {}-{:02} is fully populated; imputation bypassed",
                imputation.target_year,
                imputation.target_month
            );
            return Ok(RecoveryReport::default());
        }

        let mut report = RecoveryReport {
            gap_detected: true,
            ..RecoveryReport::default()
        };
        log::warn!(
            "Target month {}-{:02} is missing for {} of {} fleets; starting recovery",
            imputation.target_year,
            imputation.target_month,
            candidates.len(),
            fleets.len()
        );

        let conn = session::open_session(&self.config.engine)?;
        ensure_dir(&self.warehouse.synthetic_dir()).map_err(StoreError::from)?;

        for fleet in candidates {
            let target_key = fleet.partition_key(imputation.target_year, imputation.target_month);
            if self.warehouse.synthetic_partition(&target_key).exists() {
                log::info!("Skipping existing synthetic partition: {target_key}");
                report.skipped.push(fleet.id.clone());
                continue;
            }

            match self.impute_fleet(&conn, &fleet.id, &target_key) {
                Ok(projected_volume) => {
                    log::info!("Recovered {target_key}: {projected_volume} projected trips");
                    report.recovered.push(fleet.id.clone());
                }
                Err(e) => {
                    log::error!("Recovery failed for {}: {e}", fleet.id);
                    report.failed.push(fleet.id.clone());
                }
            }
        }

        log::info!(
            "Recovery run: {} recovered, {} cached, {} failed",
            report.recovered.len(),
            report.skipped.len(),
            report.failed.len()
        );

        Ok(report)
    }

    fn impute_fleet(
        &self,
        conn: &Connection,
        fleet_id: &str,
        target_key: &PartitionKey,
    ) -> Result<u64, ImputationError> {
        let imputation = &self.config.imputation;
        let older_key =
            PartitionKey::new(fleet_id, imputation.older_anchor_year, imputation.target_month);
        let recent_key =
            PartitionKey::new(fleet_id, imputation.recent_anchor_year, imputation.target_month);

        let older = self.anchor_path(fleet_id, &older_key)?;
        let recent = self.anchor_path(fleet_id, &recent_key)?;

        conn.execute_batch(&format!(
            "CREATE OR REPLACE TEMP TABLE older_cycle AS\n{};",
            day_cycle_select(&older)
        ))?;
        conn.execute_batch(&format!(
            "CREATE OR REPLACE TEMP TABLE recent_cycle AS\n{};",
            day_cycle_select(&recent)
        ))?;
        conn.execute_batch(&format!(
            "CREATE OR REPLACE TEMP TABLE {BLEND_TABLE} AS\n{};",
            blended_select(fleet_id, imputation)
        ))?;

        copy_to_parquet(
            conn,
            &format!("SELECT * FROM {BLEND_TABLE} ORDER BY day_of_month"),
            &self.warehouse.synthetic_partition(target_key),
            ParquetCompression::Zstd,
        )?;

        let manifest = SyntheticManifest {
            generator: GENERATOR_TAG.to_string(),
            fleet: fleet_id.to_string(),
            weight_older: imputation.weight_older,
            weight_recent: imputation.weight_recent,
            older_anchor: older_key.file_name(),
            recent_anchor: recent_key.file_name(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        write_bytes_atomic(
            &self.warehouse.synthetic_manifest(target_key),
            &serde_json::to_vec_pretty(&manifest)?,
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT CAST(SUM(trip_count) AS BIGINT) FROM {BLEND_TABLE}"
        ))?;
        let projected: Option<i64> = stmt.query_row([], |row| row.get(0))?;
        #[allow(clippy::cast_sign_loss)]
        Ok(projected.unwrap_or(0) as u64)
    }

    fn anchor_path(
        &self,
        fleet_id: &str,
        key: &PartitionKey,
    ) -> Result<std::path::PathBuf, ImputationError> {
        let path = self.warehouse.unified_partition(key);
        if path.exists() {
            Ok(path)
        } else {
            Err(ImputationError::MissingAnchor {
                fleet: fleet_id.to_string(),
                partition: key.file_name(),
            })
        }
    }
}

/// Day-of-month aggregation of one anchor partition.
fn day_cycle_select(path: &Path) -> String {
    format!(
        "SELECT\n    EXTRACT(DAY FROM pickup_time) AS day_of_month,\n    COUNT(*) AS volume,\n    AVG(fare) AS mean_fare,\n    AVG(total_amount) AS mean_total,\n    AVG(trip_distance) AS mean_distance,\n    AVG(COALESCE(congestion_surcharge, 0)) AS mean_surcharge,\n    MODE(pickup_loc) AS modal_pickup,\n    MODE(dropoff_loc) AS modal_dropoff\nFROM read_parquet('{}')\nGROUP BY day_of_month",
        path.display()
    )
}

/// The weighted blend of the two day-grain cycles.
///
/// Estimated volume is truncated toward zero: with the default 0.3/0.7
/// weights, day volumes of 103 and 200 blend to 170.9 and are stored
/// as 170. Modal zones always come from the recent anchor. Days absent
/// from either anchor drop out of the join.
fn blended_select(fleet_id: &str, imputation: &ImputationConfig) -> String {
    let wo = imputation.weight_older;
    let wr = imputation.weight_recent;
    format!(
        "SELECT\n    '{fleet}' AS fleet,\n    older.day_of_month,\n    CAST(TRUNC({wo:?} * older.volume + {wr:?} * recent.volume) AS INTEGER) AS trip_count,\n    {wo:?} * older.mean_fare + {wr:?} * recent.mean_fare AS fare,\n    {wo:?} * older.mean_total + {wr:?} * recent.mean_total AS total_amount,\n    {wo:?} * older.mean_distance + {wr:?} * recent.mean_distance AS trip_distance,\n    {wo:?} * older.mean_surcharge + {wr:?} * recent.mean_surcharge AS congestion_surcharge,\n    recent.modal_pickup AS pickup_loc,\n    recent.modal_dropoff AS dropoff_loc,\n    {wo:?} AS weight_older,\n    {wr:?} AS weight_recent,\n    '{tag}' AS provenance\nFROM older_cycle AS older\nJOIN recent_cycle AS recent ON older.day_of_month = recent.day_of_month",
        fleet = fleet_id.replace('\'', "''"),
        tag = GENERATOR_TAG,
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use toll_audit_config::ImputationConfig;

    use super::{GENERATOR_TAG, RecoveryReport, SyntheticManifest, blended_select, day_cycle_select};

    #[test]
    fn day_cycle_aggregates_to_calendar_days() {
        let sql = day_cycle_select(Path::new("/data/unified/yellow_2023-12.parquet"));

        assert!(sql.contains("EXTRACT(DAY FROM pickup_time) AS day_of_month"));
        assert!(sql.contains("MODE(pickup_loc) AS modal_pickup"));
        assert!(sql.contains("AVG(COALESCE(congestion_surcharge, 0)) AS mean_surcharge"));
        assert!(sql.contains("GROUP BY day_of_month"));
        assert!(sql.contains("read_parquet('/data/unified/yellow_2023-12.parquet')"));
    }

    #[test]
    fn blend_truncates_volume_toward_zero() {
        let sql = blended_select("yellow", &ImputationConfig::default());

        assert!(sql.contains(
            "CAST(TRUNC(0.3 * older.volume + 0.7 * recent.volume) AS INTEGER) AS trip_count"
        ));
    }

    #[test]
    fn blend_takes_modal_zones_from_the_recent_anchor_only() {
        let sql = blended_select("yellow", &ImputationConfig::default());

        assert!(sql.contains("recent.modal_pickup AS pickup_loc"));
        assert!(sql.contains("recent.modal_dropoff AS dropoff_loc"));
        assert!(!sql.contains("older.modal_pickup"));
    }

    #[test]
    fn blend_joins_anchors_on_day_of_month() {
        let sql = blended_select("green", &ImputationConfig::default());

        assert!(sql.contains(
            "JOIN recent_cycle AS recent ON older.day_of_month = recent.day_of_month"
        ));
        assert!(sql.contains("'green' AS fleet"));
        assert!(sql.contains(&format!("'{GENERATOR_TAG}' AS provenance")));
    }

    #[test]
    fn blend_renders_custom_weights() {
        let imputation = ImputationConfig {
            weight_older: 0.5,
            weight_recent: 0.5,
            ..ImputationConfig::default()
        };
        let sql = blended_select("yellow", &imputation);

        assert!(sql.contains("0.5 * older.mean_fare + 0.5 * recent.mean_fare AS fare"));
        assert!(sql.contains("0.5 AS weight_older"));
    }

    #[test]
    fn whole_number_weights_stay_double_literals() {
        let imputation = ImputationConfig {
            weight_older: 0.0,
            weight_recent: 1.0,
            ..ImputationConfig::default()
        };
        let sql = blended_select("yellow", &imputation);

        assert!(sql.contains("0.0 * older.mean_fare + 1.0 * recent.mean_fare"));
    }

    #[test]
    fn report_completeness_tracks_failures_only() {
        assert!(RecoveryReport::default().is_complete());

        let partial = RecoveryReport {
            gap_detected: true,
            recovered: vec!["yellow".to_string()],
            skipped: Vec::new(),
            failed: vec!["green".to_string()],
        };
        assert!(!partial.is_complete());

        let cached = RecoveryReport {
            gap_detected: true,
            recovered: Vec::new(),
            skipped: vec!["yellow".to_string(), "green".to_string()],
            failed: Vec::new(),
        };
        assert!(cached.is_complete());
    }

    #[test]
    fn manifest_serializes_provenance_fields() {
        let manifest = SyntheticManifest {
            generator: GENERATOR_TAG.to_string(),
            fleet: "yellow".to_string(),
            weight_older: 0.3,
            weight_recent: 0.7,
            older_anchor: "yellow_2023-12.parquet".to_string(),
            recent_anchor: "yellow_2024-12.parquet".to_string(),
            created_at: "2026-01-15T09:30:00+00:00".to_string(),
        };

        let json = serde_json::to_string(&manifest).unwrap();

        assert!(json.contains("\"generator\":\"weighted-cycle-imputation\""));
        assert!(json.contains("\"older_anchor\":\"yellow_2023-12.parquet\""));
        assert!(json.contains("\"weight_recent\":0.7"));

        let back: SyntheticManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
    }
}
