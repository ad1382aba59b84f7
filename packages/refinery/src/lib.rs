#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Anomaly refinement of the unified trip store.
//!
//! Every canonical partition is staged with derived duration and
//! velocity columns, classified by the anomaly cascade, and split into
//! two artifacts: a verified partition carrying only canonical columns,
//! and an anomaly trace carrying the derived columns, the assigned
//! status, and the source partition for lineage. The trace store feeds
//! the behavioral pattern audit.

pub mod cascade;

use std::collections::BTreeMap;
use std::sync::Arc;

use duckdb::Connection;
use toll_audit_config::AuditConfig;
use toll_audit_store::progress::ProgressCallback;
use toll_audit_store::publish::{ParquetCompression, copy_to_parquet};
use toll_audit_store::warehouse::ensure_dir;
use toll_audit_store::{StoreError, Warehouse, discovery, session};
use toll_audit_trip_models::{AnomalyStatus, CANONICAL_COLUMNS, PartitionKey};

/// Errors that can occur while refining partitions.
#[derive(Debug, thiserror::Error)]
pub enum RefineryError {
    /// Warehouse I/O or publish error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// Engine error outside the store layer.
    #[error("Engine error: {0}")]
    DuckDb(#[from] duckdb::Error),
    /// A status tag read back from staging did not parse.
    #[error("Unknown anomaly status in staging results: {0}")]
    UnknownStatus(String),
}

/// Record count and means for one status within one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMetric {
    pub status: AnomalyStatus,
    pub records: u64,
    /// Mean velocity in mph, rounded to two places. Null when every
    /// record in the group lacks a velocity.
    pub mean_velocity: Option<f64>,
    /// Mean fare, rounded to two places. Null when every fare is null.
    pub mean_fare: Option<f64>,
}

/// Tallies for one refinery batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefineryReport {
    pub partitions_discovered: u64,
    pub partitions_refined: u64,
    pub partitions_skipped: u64,
    pub partitions_failed: u64,
    pub gross_records: u64,
    pub verified_records: u64,
    pub anomaly_records: u64,
    /// Anomalous record counts keyed by status, over refined partitions.
    pub anomaly_distribution: BTreeMap<AnomalyStatus, u64>,
}

impl RefineryReport {
    /// Share of gross records rejected by the cascade, as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn waste_factor(&self) -> f64 {
        if self.gross_records == 0 {
            0.0
        } else {
            self.anomaly_records as f64 / self.gross_records as f64 * 100.0
        }
    }

    /// Whether the batch left the verified store complete.
    ///
    /// A fully cached re-run counts as success; an empty unified store
    /// or any failed partition does not.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.partitions_discovered > 0 && self.partitions_failed == 0
    }

    fn absorb(&mut self, metrics: &[StatusMetric]) {
        for metric in metrics {
            self.gross_records += metric.records;
            if metric.status.is_anomalous() {
                self.anomaly_records += metric.records;
                *self.anomaly_distribution.entry(metric.status).or_insert(0) +=
                    metric.records;
            } else {
                self.verified_records += metric.records;
            }
        }
    }
}

/// One row of the behavioral pattern audit over the anomaly trace store.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyPattern {
    pub status: AnomalyStatus,
    pub occurrences: u64,
    pub mean_velocity: Option<f64>,
    pub mean_fare: Option<f64>,
    pub mean_distance: Option<f64>,
}

/// Splits canonical partitions into verified data and anomaly traces.
pub struct AnomalyRefinery<'a> {
    config: &'a AuditConfig,
    warehouse: &'a Warehouse,
}

impl<'a> AnomalyRefinery<'a> {
    #[must_use]
    pub const fn new(config: &'a AuditConfig, warehouse: &'a Warehouse) -> Self {
        Self { config, warehouse }
    }

    /// Refines every discovered canonical partition.
    ///
    /// Partitions whose verified artifact already exists are skipped
    /// unless `force` is set. The trace is published before the verified
    /// artifact so a partition is only ever skipped once both exist.
    ///
    /// # Errors
    ///
    /// * If the engine session cannot be opened
    /// * If the output directories cannot be created
    pub fn refine_all(
        &self,
        force: bool,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<RefineryReport, RefineryError> {
        let conn = session::open_session(&self.config.engine)?;
        ensure_dir(&self.warehouse.verified_dir()).map_err(StoreError::from)?;
        ensure_dir(&self.warehouse.anomalies_dir()).map_err(StoreError::from)?;

        let partitions = discovery::discover_partitions(&self.warehouse.unified_dir());
        let mut report = RefineryReport {
            partitions_discovered: partitions.len() as u64,
            ..RefineryReport::default()
        };

        if partitions.is_empty() {
            log::warn!("No canonical partitions discovered; nothing to refine");
            return Ok(report);
        }

        progress.begin(partitions.len() as u64);
        for partition in &partitions {
            progress.stage(format!("Refining {}", partition.key));
            let verified_dest = self.warehouse.verified_partition(&partition.key);
            if verified_dest.exists() && !force {
                log::info!("Skipping refined partition: {}", partition.key);
                report.partitions_skipped += 1;
                progress.advance();
                continue;
            }
            match self.refine_partition(&conn, partition) {
                Ok(metrics) => {
                    report.partitions_refined += 1;
                    report.absorb(&metrics);
                    log_partition_metrics(&partition.key, &metrics);
                }
                Err(e) => {
                    log::error!("Failed to refine {}: {e}", partition.key);
                    report.partitions_failed += 1;
                }
            }
            progress.advance();
        }
        progress.complete();

        log::info!(
            "Refinery batch: {} refined, {} cached, {} failed of {} discovered",
            report.partitions_refined,
            report.partitions_skipped,
            report.partitions_failed,
            report.partitions_discovered
        );
        log::info!(
            "Records: {} gross, {} verified, {} anomalous ({:.2}% waste)",
            report.gross_records,
            report.verified_records,
            report.anomaly_records,
            report.waste_factor()
        );
        for (status, count) in &report.anomaly_distribution {
            log::info!("  {status}: {count}");
        }

        Ok(report)
    }

    fn refine_partition(
        &self,
        conn: &Connection,
        partition: &discovery::DiscoveredPartition,
    ) -> Result<Vec<StatusMetric>, RefineryError> {
        let staging = cascade::staging_select(&partition.path, &self.config.thresholds);
        conn.execute_batch(&format!(
            "CREATE OR REPLACE TEMP TABLE refinery_staging AS\n{staging};"
        ))?;

        let trace_select = format!(
            "SELECT *, '{file}' AS source_partition FROM refinery_staging WHERE anomaly_status != '{verified}'",
            file = partition.key.file_name(),
            verified = AnomalyStatus::Verified,
        );
        copy_to_parquet(
            conn,
            &trace_select,
            &self.warehouse.anomaly_partition(&partition.key),
            ParquetCompression::Zstd,
        )?;

        let verified_select = format!(
            "SELECT {columns} FROM refinery_staging WHERE anomaly_status = '{verified}'",
            columns = CANONICAL_COLUMNS.join(", "),
            verified = AnomalyStatus::Verified,
        );
        copy_to_parquet(
            conn,
            &verified_select,
            &self.warehouse.verified_partition(&partition.key),
            ParquetCompression::Zstd,
        )?;

        status_metrics(conn)
    }

    /// Aggregates the whole anomaly trace store by status.
    ///
    /// An empty trace store is not an error; the audit logs a warning
    /// and returns no rows.
    ///
    /// # Errors
    ///
    /// * If the engine session cannot be opened
    /// * If the trace store cannot be scanned
    pub fn behavioral_pattern_audit(&self) -> Result<Vec<AnomalyPattern>, RefineryError> {
        let traces = discovery::parquet_files(&self.warehouse.anomalies_dir());
        if traces.is_empty() {
            log::warn!("No anomaly traces recorded; skipping behavioral pattern audit");
            return Ok(Vec::new());
        }

        let conn = session::open_session(&self.config.engine)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT anomaly_status,
                    COUNT(*) AS occurrences,
                    ROUND(AVG(velocity_mph), 2) AS mean_velocity,
                    ROUND(AVG(fare), 2) AS mean_fare,
                    ROUND(AVG(trip_distance), 2) AS mean_distance
             FROM read_parquet('{}/*.parquet')
             GROUP BY anomaly_status
             ORDER BY occurrences DESC",
            self.warehouse.anomalies_dir().display()
        ))?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<f64>>(4)?,
            ))
        })?;

        let mut patterns = Vec::new();
        for row in rows {
            let (tag, occurrences, mean_velocity, mean_fare, mean_distance) = row?;
            let status = tag
                .parse::<AnomalyStatus>()
                .map_err(|_| RefineryError::UnknownStatus(tag.clone()))?;
            #[allow(clippy::cast_sign_loss)]
            patterns.push(AnomalyPattern {
                status,
                occurrences: occurrences as u64,
                mean_velocity,
                mean_fare,
                mean_distance,
            });
        }

        for pattern in &patterns {
            log::info!(
                "{}: {} occurrences, {} mph mean, ${} mean fare, {} mi mean",
                pattern.status,
                pattern.occurrences,
                format_mean(pattern.mean_velocity),
                format_mean(pattern.mean_fare),
                format_mean(pattern.mean_distance),
            );
        }

        Ok(patterns)
    }
}

fn status_metrics(conn: &Connection) -> Result<Vec<StatusMetric>, RefineryError> {
    let mut stmt = conn.prepare(
        "SELECT anomaly_status,
                COUNT(*) AS records,
                ROUND(AVG(velocity_mph), 2) AS mean_velocity,
                ROUND(AVG(fare), 2) AS mean_fare
         FROM refinery_staging
         GROUP BY anomaly_status
         ORDER BY records DESC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, Option<f64>>(2)?,
            row.get::<_, Option<f64>>(3)?,
        ))
    })?;

    let mut metrics = Vec::new();
    for row in rows {
        let (tag, records, mean_velocity, mean_fare) = row?;
        let status = tag
            .parse::<AnomalyStatus>()
            .map_err(|_| RefineryError::UnknownStatus(tag.clone()))?;
        #[allow(clippy::cast_sign_loss)]
        metrics.push(StatusMetric {
            status,
            records: records as u64,
            mean_velocity,
            mean_fare,
        });
    }
    Ok(metrics)
}

fn log_partition_metrics(key: &PartitionKey, metrics: &[StatusMetric]) {
    for metric in metrics {
        log::info!(
            "{key} {}: {} records, {} mph mean, ${} mean fare",
            metric.status,
            metric.records,
            format_mean(metric.mean_velocity),
            format_mean(metric.mean_fare),
        );
    }
}

fn format_mean(mean: Option<f64>) -> String {
    mean.map_or_else(|| "n/a".to_string(), |m| format!("{m:.2}"))
}

#[cfg(test)]
mod tests {
    use toll_audit_trip_models::AnomalyStatus;

    use super::{RefineryReport, StatusMetric};

    fn metric(status: AnomalyStatus, records: u64) -> StatusMetric {
        StatusMetric {
            status,
            records,
            mean_velocity: Some(12.0),
            mean_fare: Some(15.0),
        }
    }

    #[test]
    fn absorb_splits_verified_from_anomalous() {
        let mut report = RefineryReport::default();
        report.absorb(&[
            metric(AnomalyStatus::Verified, 900),
            metric(AnomalyStatus::ExcessiveVelocity, 60),
            metric(AnomalyStatus::TemporalError, 40),
        ]);
        report.absorb(&[
            metric(AnomalyStatus::Verified, 100),
            metric(AnomalyStatus::ExcessiveVelocity, 10),
        ]);

        assert_eq!(report.gross_records, 1110);
        assert_eq!(report.verified_records, 1000);
        assert_eq!(report.anomaly_records, 110);
        assert_eq!(
            report.anomaly_distribution.get(&AnomalyStatus::ExcessiveVelocity),
            Some(&70)
        );
        assert_eq!(
            report.anomaly_distribution.get(&AnomalyStatus::TemporalError),
            Some(&40)
        );
        assert_eq!(report.anomaly_distribution.get(&AnomalyStatus::Verified), None);
    }

    #[test]
    fn waste_factor_is_anomalous_share_of_gross() {
        let report = RefineryReport {
            gross_records: 200,
            verified_records: 150,
            anomaly_records: 50,
            ..RefineryReport::default()
        };
        assert!((report.waste_factor() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn waste_factor_of_empty_batch_is_zero() {
        assert!(RefineryReport::default().waste_factor().abs() < f64::EPSILON);
    }

    #[test]
    fn success_requires_discovery_and_no_failures() {
        let empty = RefineryReport::default();
        assert!(!empty.is_success());

        let cached = RefineryReport {
            partitions_discovered: 4,
            partitions_skipped: 4,
            ..RefineryReport::default()
        };
        assert!(cached.is_success());

        let failed = RefineryReport {
            partitions_discovered: 4,
            partitions_refined: 3,
            partitions_failed: 1,
            ..RefineryReport::default()
        };
        assert!(!failed.is_success());
    }
}
