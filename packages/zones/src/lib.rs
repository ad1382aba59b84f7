#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Geospatial classification of verified trips against the toll policy.
//!
//! Derives the Policy Zone Set from the zone reference, tags every
//! verified trip with a zone category and policy phase, and publishes
//! the daily datamart, the regional compliance telemetry, and the zone
//! set itself. All three artifacts are rebuilt wholesale on every run.

pub mod queries;
pub mod reference;

use duckdb::Connection;
use toll_audit_config::AuditConfig;
use toll_audit_store::publish::{ParquetCompression, copy_to_parquet, parquet_row_count};
use toll_audit_store::warehouse::ensure_dir;
use toll_audit_store::{StoreError, Warehouse, discovery, session};

/// Errors that can occur during classification.
#[derive(Debug, thiserror::Error)]
pub enum ZoneError {
    /// Warehouse I/O or publish error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// Engine error outside the store layer.
    #[error("Engine error: {0}")]
    DuckDb(#[from] duckdb::Error),
    /// Zone reference file I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The zone reference is not valid `GeoJSON`.
    #[error("Zone reference parse error: {0}")]
    Geometry(#[from] geojson::Error),
    /// The zone reference parsed but cannot be used.
    #[error("Zone reference error: {0}")]
    Reference(String),
    /// Derivation matched no zones, so classification cannot proceed.
    #[error("Policy zone derivation matched no zones")]
    EmptyPolicyZoneSet,
    /// Nothing to classify.
    #[error("No verified partitions available; refine the store first")]
    NoVerifiedData,
}

/// Counts from one classification run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationReport {
    pub reference_zones: u64,
    pub policy_zones: u64,
    pub verified_partitions: u64,
    pub datamart_rows: u64,
    pub telemetry_rows: u64,
}

/// Classifies verified trips and publishes the zone datamart.
pub struct ZoneClassifier<'a> {
    config: &'a AuditConfig,
    warehouse: &'a Warehouse,
}

impl<'a> ZoneClassifier<'a> {
    #[must_use]
    pub const fn new(config: &'a AuditConfig, warehouse: &'a Warehouse) -> Self {
        Self { config, warehouse }
    }

    /// Runs zone derivation, categorization, aggregation, and telemetry.
    ///
    /// # Errors
    ///
    /// * If no verified partition exists
    /// * If the zone reference is missing, unreadable, or empty after
    ///   derivation
    /// * If staging or persistence fails
    pub fn classify_all(&self) -> Result<ClassificationReport, ZoneError> {
        let verified = discovery::discover_partitions(&self.warehouse.verified_dir());
        if verified.is_empty() {
            return Err(ZoneError::NoVerifiedData);
        }

        let zones = reference::load_zone_reference(&self.warehouse.zone_reference())?;
        let policy_zones = reference::derive_policy_zones(&zones, &self.config.policy);
        if policy_zones.is_empty() {
            return Err(ZoneError::EmptyPolicyZoneSet);
        }
        log::info!(
            "Policy Zone Set: {} of {} reference zones are toll-liable",
            policy_zones.len(),
            zones.len()
        );

        let conn = session::open_session(&self.config.engine)?;
        ensure_dir(&self.warehouse.datamart_dir()).map_err(StoreError::from)?;

        copy_to_parquet(
            &conn,
            &queries::policy_zone_select(&policy_zones),
            &self.warehouse.policy_zones(),
            ParquetCompression::Snappy,
        )?;

        let id_list = queries::zone_id_list(&policy_zones);
        self.stage_categorized_trips(&conn, &id_list)?;

        let datamart = self.warehouse.daily_zone_metrics();
        copy_to_parquet(
            &conn,
            &queries::daily_metrics_select(),
            &datamart,
            ParquetCompression::Snappy,
        )?;
        let datamart_rows = parquet_row_count(&conn, &datamart)?;
        log::info!("Daily zone datamart persisted: {datamart_rows} rows");

        log_categorization_summary(&conn)?;

        let telemetry = self.warehouse.zone_compliance_telemetry();
        copy_to_parquet(
            &conn,
            &queries::regional_telemetry_select(&id_list),
            &telemetry,
            ParquetCompression::Snappy,
        )?;
        let telemetry_rows = parquet_row_count(&conn, &telemetry)?;
        log::info!("Regional compliance telemetry persisted: {telemetry_rows} rows");

        Ok(ClassificationReport {
            reference_zones: zones.len() as u64,
            policy_zones: policy_zones.len() as u64,
            verified_partitions: verified.len() as u64,
            datamart_rows,
            telemetry_rows,
        })
    }

    fn stage_categorized_trips(&self, conn: &Connection, id_list: &str) -> Result<(), ZoneError> {
        let select = queries::categorization_select(
            &self.warehouse.verified_dir(),
            id_list,
            self.config.policy.effective_date,
        );
        conn.execute_batch(&format!(
            "CREATE OR REPLACE TEMP TABLE {} AS\n{select};",
            queries::STAGING_TABLE
        ))?;
        Ok(())
    }
}

fn log_categorization_summary(conn: &Connection) -> Result<(), ZoneError> {
    let mut stmt = conn.prepare(&queries::categorization_summary_select())?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, Option<f64>>(3)?,
        ))
    })?;

    for row in rows {
        let (category, post_policy, volume, mean_surcharge) = row?;
        let phase = if post_policy == 1 { "post-policy" } else { "baseline" };
        log::info!(
            "{category} {phase}: {volume} trips, ${:.2} mean surcharge",
            mean_surcharge.unwrap_or(0.0)
        );
    }
    Ok(())
}
