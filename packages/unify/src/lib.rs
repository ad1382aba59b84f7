#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Schema unification of raw fleet partitions onto the canonical layout.
//!
//! Each fleet publishes raw monthly partitions under its own column
//! nomenclature. The unifier projects every raw partition onto the
//! canonical schema, drops rows missing any core identity field,
//! attaches the fleet id as an explicit column, and publishes the
//! result atomically into the unified store. Aligned artifacts are
//! structurally validated against the canonical column set.

pub mod mapping;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use duckdb::Connection;
use toll_audit_config::AuditConfig;
use toll_audit_fleet::FleetDefinition;
use toll_audit_store::progress::ProgressCallback;
use toll_audit_store::publish::{ParquetCompression, copy_to_parquet, parquet_row_count};
use toll_audit_store::warehouse::ensure_dir;
use toll_audit_store::{StoreError, Warehouse, discovery, session};
use toll_audit_trip_models::{CANONICAL_COLUMNS, PartitionKey};

/// Errors that can occur during schema alignment.
#[derive(Debug, thiserror::Error)]
pub enum UnifyError {
    /// Warehouse I/O or publish error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Engine error outside a publish.
    #[error("Engine error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// An aligned artifact's column set differs from the canonical
    /// schema.
    #[error("Structural defect in {artifact}: missing [{missing}], unexpected [{extra}]")]
    StructuralDefect {
        /// File name of the offending artifact.
        artifact: String,
        /// Canonical columns the artifact lacks.
        missing: String,
        /// Observed columns outside the canonical schema.
        extra: String,
    },
}

/// Alignment outcome for one fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetTally {
    /// Fleet id the tally belongs to.
    pub fleet: String,
    /// Partitions aligned this run.
    pub aligned: u64,
    /// Partitions skipped because the destination already existed.
    pub skipped: u64,
    /// Partitions that failed to align.
    pub failed: u64,
    /// Records written across aligned partitions.
    pub records: u64,
}

/// Tallies from one alignment batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentReport {
    /// Per-fleet outcomes, in registry order.
    pub fleets: Vec<FleetTally>,
    /// Aligned artifacts that failed the structural check.
    pub validation_failures: u64,
}

impl AlignmentReport {
    /// Partitions aligned across all fleets.
    #[must_use]
    pub fn aligned(&self) -> u64 {
        self.fleets.iter().map(|t| t.aligned).sum()
    }

    /// Partitions skipped across all fleets.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.fleets.iter().map(|t| t.skipped).sum()
    }

    /// Partitions failed across all fleets.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.fleets.iter().map(|t| t.failed).sum()
    }

    /// Records written across all fleets.
    #[must_use]
    pub fn records(&self) -> u64 {
        self.fleets.iter().map(|t| t.records).sum()
    }

    /// Whether the batch left the canonical store structurally sound.
    ///
    /// An empty raw store aligns nothing and is still a success;
    /// partition failures and structural defects are not.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.validation_failures == 0
    }
}

/// Aligns raw fleet partitions onto the canonical schema.
pub struct SchemaUnifier<'a> {
    config: &'a AuditConfig,
    warehouse: &'a Warehouse,
}

impl<'a> SchemaUnifier<'a> {
    /// Creates a unifier bound to one run's config and warehouse.
    #[must_use]
    pub const fn new(config: &'a AuditConfig, warehouse: &'a Warehouse) -> Self {
        Self { config, warehouse }
    }

    /// Aligns every discovered raw partition for the given fleets.
    ///
    /// Existing destinations are skipped unless `force` is set. A
    /// partition that fails to align is logged and tallied; the batch
    /// continues. After the batch, one aligned artifact per fleet is
    /// structurally validated.
    ///
    /// # Errors
    ///
    /// Returns [`UnifyError`] if the engine session or the unified
    /// directory cannot be prepared. Per-partition failures are
    /// tallied in the report, not returned.
    pub fn align_all(
        &self,
        fleets: &[FleetDefinition],
        force: bool,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<AlignmentReport, UnifyError> {
        let conn = session::open_session(&self.config.engine)?;
        ensure_dir(&self.warehouse.unified_dir()).map_err(StoreError::from)?;

        let mut report = AlignmentReport::default();

        // Collect the work list up front so progress has a known total.
        let mut work: Vec<(usize, PathBuf, PartitionKey)> = Vec::new();

        for (fleet_idx, fleet) in fleets.iter().enumerate() {
            report.fleets.push(FleetTally {
                fleet: fleet.id.clone(),
                ..FleetTally::default()
            });

            for path in discovery::parquet_files(&self.warehouse.raw_dir(&fleet.id)) {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                match fleet.parse_raw_file_name(name) {
                    Some((year, month)) => {
                        work.push((fleet_idx, path.clone(), fleet.partition_key(year, month)));
                    }
                    None => {
                        log::warn!("Ignoring unrecognized file in {} raw store: {name}", fleet.id);
                    }
                }
            }
        }

        if work.is_empty() {
            log::warn!("No raw partitions discovered; nothing to align");
            return Ok(report);
        }

        progress.begin(work.len() as u64);

        let mut validation_samples: Vec<Option<PathBuf>> = vec![None; fleets.len()];

        for (fleet_idx, raw_path, key) in &work {
            progress.stage(format!("Aligning {key}"));

            let dest = self.warehouse.unified_partition(key);

            if dest.exists() && !force {
                log::info!("Skipping cached partition: {key}");
                report.fleets[*fleet_idx].skipped += 1;
                progress.advance();
                continue;
            }

            match self.align_partition(&conn, &fleets[*fleet_idx], raw_path, &dest) {
                Ok(records) => {
                    log::info!("Aligned {key}: {records} records");
                    report.fleets[*fleet_idx].aligned += 1;
                    report.fleets[*fleet_idx].records += records;
                    if validation_samples[*fleet_idx].is_none() {
                        validation_samples[*fleet_idx] = Some(dest);
                    }
                }
                Err(e) => {
                    log::error!("Failed to align {key}: {e}");
                    report.fleets[*fleet_idx].failed += 1;
                }
            }

            progress.advance();
        }

        progress.complete();

        for (fleet_idx, sample) in validation_samples.iter().enumerate() {
            let Some(path) = sample else { continue };
            if let Err(e) = validate_structure(&conn, path) {
                log::error!("{e}");
                report.validation_failures += 1;
            } else {
                log::info!("Structural integrity validated: {}", fleets[fleet_idx].id);
            }
        }

        for tally in &report.fleets {
            log::info!(
                "{}: {} aligned, {} cached, {} failed, {} records",
                tally.fleet,
                tally.aligned,
                tally.skipped,
                tally.failed,
                tally.records,
            );
        }

        Ok(report)
    }

    fn align_partition(
        &self,
        conn: &Connection,
        fleet: &FleetDefinition,
        source: &Path,
        dest: &Path,
    ) -> Result<u64, UnifyError> {
        let select = mapping::canonical_select(fleet, source);
        copy_to_parquet(conn, &select, dest, ParquetCompression::Zstd)?;
        Ok(parquet_row_count(conn, dest)?)
    }
}

/// Checks that an aligned artifact's column set equals the canonical
/// schema exactly, in both directions.
///
/// # Errors
///
/// Returns [`UnifyError::StructuralDefect`] listing the missing and
/// unexpected columns when the sets differ.
pub fn validate_structure(conn: &Connection, path: &Path) -> Result<(), UnifyError> {
    let mut stmt = conn.prepare(&format!(
        "DESCRIBE SELECT * FROM read_parquet('{}')",
        path.display()
    ))?;
    let observed = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<String>, _>>()?;

    let (missing, extra) = schema_diff(&observed);

    if missing.is_empty() && extra.is_empty() {
        return Ok(());
    }

    Err(UnifyError::StructuralDefect {
        artifact: path.file_name().map_or_else(
            || path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        ),
        missing: missing.join(", "),
        extra: extra.join(", "),
    })
}

/// Splits the difference between observed columns and the canonical set
/// into (missing, unexpected).
fn schema_diff(observed: &[String]) -> (Vec<String>, Vec<String>) {
    let expected: BTreeSet<&str> = CANONICAL_COLUMNS.iter().copied().collect();
    let observed_set: BTreeSet<&str> = observed.iter().map(String::as_str).collect();

    let missing = expected
        .difference(&observed_set)
        .map(|c| (*c).to_string())
        .collect();
    let extra = observed_set
        .difference(&expected)
        .map(|c| (*c).to_string())
        .collect();

    (missing, extra)
}
