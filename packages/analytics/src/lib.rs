#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Compliance audit and inter-fleet dynamics over the zone datamart and
//! the verified store.
//!
//! The compliance audit reads the Daily Category Aggregate, restricts
//! it to toll-liable cross-border trips after the policy date, and
//! publishes a single-row summary. The dynamics evaluation compares
//! per-fleet performance across two fixed partition windows and
//! publishes one record per fleet present in both.

use std::path::{Path, PathBuf};

use duckdb::Connection;
use toll_audit_analytics_models::{ComplianceSummary, FleetDynamics, FleetWindowMetrics};
use toll_audit_config::{AnalysisWindow, AuditConfig};
use toll_audit_store::discovery::DiscoveredPartition;
use toll_audit_store::publish::{ParquetCompression, copy_to_parquet};
use toll_audit_store::warehouse::ensure_dir;
use toll_audit_store::{StoreError, Warehouse, discovery, session};
use toll_audit_trip_models::ZoneCategory;

/// Errors that can occur during analytics.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// Warehouse I/O or publish error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// Engine error outside the store layer.
    #[error("Engine error: {0}")]
    DuckDb(#[from] duckdb::Error),
    /// The compliance audit needs the classifier's datamart.
    #[error("Zone datamart missing: {}; run classification first", .0.display())]
    MissingDatamart(PathBuf),
}

/// Runs the compliance audit and the fleet dynamics evaluation.
pub struct PolicyAnalytics<'a> {
    config: &'a AuditConfig,
    warehouse: &'a Warehouse,
}

impl<'a> PolicyAnalytics<'a> {
    #[must_use]
    pub const fn new(config: &'a AuditConfig, warehouse: &'a Warehouse) -> Self {
        Self { config, warehouse }
    }

    /// Audits surcharge compliance over toll-liable trips and persists
    /// the single-row summary.
    ///
    /// # Errors
    ///
    /// * If the zone datamart has not been built
    /// * If the audit query or persistence fails
    pub fn audit_compliance(&self) -> Result<ComplianceSummary, AnalyticsError> {
        let datamart = self.warehouse.daily_zone_metrics();
        if !datamart.exists() {
            return Err(AnalyticsError::MissingDatamart(datamart));
        }

        let conn = session::open_session(&self.config.engine)?;
        let mut stmt = conn.prepare(&compliance_totals_select(&datamart))?;
        let (gross, compliant, leakage, revenue) = stmt.query_row([], |row| {
            Ok((
                row.get::<_, Option<i64>>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
            ))
        })?;

        #[allow(clippy::cast_sign_loss)]
        let summary = ComplianceSummary::from_totals(
            gross.unwrap_or(0) as u64,
            compliant.unwrap_or(0) as u64,
            leakage.unwrap_or(0) as u64,
            revenue.unwrap_or(0.0),
            self.config.compliance.assumed_toll_rate,
        );

        copy_to_parquet(
            &conn,
            &summary_row_select(&summary),
            &self.warehouse.compliance_summary(),
            ParquetCompression::Snappy,
        )?;

        log::info!("Cross-border volume: {}", summary.gross_volume);
        log::info!("Compliant transactions: {}", summary.compliant_volume);
        log::info!("Detected leakage: {}", summary.leakage_volume);
        log::info!("Leakage factor: {:.2}%", summary.leakage_percent);
        log::info!("Revenue captured: ${:.2}", summary.surcharge_revenue);
        log::info!("Estimated revenue gap: ${:.2}", summary.revenue_gap_estimate);

        Ok(summary)
    }

    /// Compares per-fleet performance between the baseline and the
    /// comparison windows; persists the matrix when any fleet appears
    /// in both.
    ///
    /// # Errors
    ///
    /// * If the engine session cannot be opened
    /// * If a window scan or persistence fails
    pub fn evaluate_fleet_dynamics(&self) -> Result<Vec<FleetDynamics>, AnalyticsError> {
        let dynamics_config = &self.config.dynamics;
        let partitions = discovery::discover_partitions(&self.warehouse.verified_dir());

        let baseline_paths = partitions_in_window(&partitions, &dynamics_config.baseline);
        let comparison_paths = partitions_in_window(&partitions, &dynamics_config.comparison);
        if baseline_paths.is_empty() || comparison_paths.is_empty() {
            log::warn!(
                "Fleet dynamics skipped: no verified partitions in {} or {}",
                dynamics_config.baseline.label(),
                dynamics_config.comparison.label()
            );
            return Ok(Vec::new());
        }

        let conn = session::open_session(&self.config.engine)?;
        let baseline = read_window_metrics(&conn, &baseline_paths)?;
        let comparison = read_window_metrics(&conn, &comparison_paths)?;

        let dynamics = join_windows(&baseline, &comparison);
        if dynamics.is_empty() {
            log::warn!("Fleet dynamics skipped: no fleet appears in both windows");
            return Ok(dynamics);
        }

        for record in &dynamics {
            log::info!(
                "{}: volume {} -> {} ({:+.1}%), fare {:.2} -> {:.2} ({:+.1}%), revenue {:.2} -> {:.2} ({:+.1}%)",
                record.fleet,
                record.baseline_volume,
                record.comparison_volume,
                record.volume_change_pct,
                record.baseline_mean_fare,
                record.comparison_mean_fare,
                record.fare_change_pct,
                record.baseline_revenue,
                record.comparison_revenue,
                record.revenue_change_pct,
            );
        }

        ensure_dir(&self.warehouse.datamart_dir()).map_err(StoreError::from)?;
        copy_to_parquet(
            &conn,
            &dynamics_rows_select(&dynamics),
            &self.warehouse.fleet_dynamics(),
            ParquetCompression::Snappy,
        )?;
        log::info!("Fleet dynamics persisted: {} fleets", dynamics.len());

        Ok(dynamics)
    }
}

fn compliance_totals_select(datamart: &Path) -> String {
    format!(
        "SELECT\n    CAST(SUM(trip_count) AS BIGINT) AS gross_volume,\n    CAST(SUM(compliant_trips) AS BIGINT) AS compliant_volume,\n    CAST(SUM(leakage_trips) AS BIGINT) AS leakage_volume,\n    SUM(surcharge_total) AS surcharge_revenue\nFROM read_parquet('{}')\nWHERE post_policy = 1\n  AND zone_category IN ({})",
        datamart.display(),
        toll_liable_categories(),
    )
}

fn toll_liable_categories() -> String {
    ZoneCategory::all()
        .iter()
        .filter(|category| category.is_toll_liable())
        .map(|category| format!("'{category}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Floats are rendered with `{:?}` so whole values keep a decimal point
/// and the persisted columns stay DOUBLE.
fn summary_row_select(summary: &ComplianceSummary) -> String {
    format!(
        "SELECT {} AS gross_volume, {} AS compliant_volume, {} AS leakage_volume, {:?} AS leakage_percent, {:?} AS surcharge_revenue, {:?} AS revenue_gap_estimate",
        summary.gross_volume,
        summary.compliant_volume,
        summary.leakage_volume,
        summary.leakage_percent,
        summary.surcharge_revenue,
        summary.revenue_gap_estimate,
    )
}

fn dynamics_rows_select(dynamics: &[FleetDynamics]) -> String {
    let rows = dynamics
        .iter()
        .map(|d| {
            format!(
                "('{}', {}, {}, {:?}, {:?}, {:?}, {:?}, {:?}, {:?}, {:?})",
                d.fleet.replace('\'', "''"),
                d.baseline_volume,
                d.comparison_volume,
                d.volume_change_pct,
                d.baseline_mean_fare,
                d.comparison_mean_fare,
                d.fare_change_pct,
                d.baseline_revenue,
                d.comparison_revenue,
                d.revenue_change_pct,
            )
        })
        .collect::<Vec<_>>()
        .join(",\n       ");
    format!(
        "SELECT * FROM (VALUES {rows}) AS dynamics(fleet, baseline_volume, comparison_volume, volume_change_pct, baseline_mean_fare, comparison_mean_fare, fare_change_pct, baseline_revenue, comparison_revenue, revenue_change_pct)"
    )
}

fn partitions_in_window(
    partitions: &[DiscoveredPartition],
    window: &AnalysisWindow,
) -> Vec<PathBuf> {
    partitions
        .iter()
        .filter(|p| p.key.year == window.year && window.months.contains(&p.key.month))
        .map(|p| p.path.clone())
        .collect()
}

fn window_metrics_select(paths: &[PathBuf]) -> String {
    let list = paths
        .iter()
        .map(|p| format!("'{}'", p.display()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT fleet, COUNT(*) AS trip_volume, AVG(fare) AS mean_fare, SUM(total_amount) AS gross_revenue\nFROM read_parquet([{list}])\nGROUP BY fleet\nORDER BY fleet"
    )
}

fn read_window_metrics(
    conn: &Connection,
    paths: &[PathBuf],
) -> Result<Vec<FleetWindowMetrics>, AnalyticsError> {
    let mut stmt = conn.prepare(&window_metrics_select(paths))?;
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
        let (fleet, volume, mean_fare, revenue) = row?;
        #[allow(clippy::cast_sign_loss)]
        metrics.push(FleetWindowMetrics {
            fleet,
            trip_volume: volume as u64,
            mean_fare: mean_fare.unwrap_or(0.0),
            gross_revenue: revenue.unwrap_or(0.0),
        });
    }
    Ok(metrics)
}

fn join_windows(
    baseline: &[FleetWindowMetrics],
    comparison: &[FleetWindowMetrics],
) -> Vec<FleetDynamics> {
    baseline
        .iter()
        .filter_map(|b| {
            comparison
                .iter()
                .find(|c| c.fleet == b.fleet)
                .map(|c| FleetDynamics::from_windows(b, c))
        })
        .collect()
}
