//! Canonical mapping SQL construction.
//!
//! Builds the SELECT that projects one fleet's raw columns onto the
//! canonical schema: casts per field kind, typed NULLs for columns the
//! fleet does not record, the fleet id as a text literal, and the
//! core-field completeness filter.

use std::path::Path;

use toll_audit_fleet::FleetDefinition;
use toll_audit_trip_models::{CanonicalField, FLEET_COLUMN};

/// Quotes a raw column identifier so mixed-case source names survive.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// One `expr AS canonical_name` segment per canonical field, plus the
/// fleet literal.
#[must_use]
pub fn mapping_segments(fleet: &FleetDefinition) -> Vec<String> {
    let mut segments: Vec<String> = CanonicalField::all()
        .iter()
        .map(|field| {
            let sql_type = field.kind().sql_type();
            fleet.fields.source_column(*field).map_or_else(
                || format!("CAST(NULL AS {sql_type}) AS {}", field.column_name()),
                |source_column| {
                    format!(
                        "CAST({} AS {sql_type}) AS {}",
                        quote_ident(source_column),
                        field.column_name(),
                    )
                },
            )
        })
        .collect();

    segments.push(format!("'{}' AS {FLEET_COLUMN}", fleet.id));
    segments
}

/// The full canonical SELECT over one raw partition.
///
/// The mapped projection is wrapped in a subquery so the completeness
/// filter references the canonical aliases unambiguously; rows missing
/// any core field are dropped here.
#[must_use]
pub fn canonical_select(fleet: &FleetDefinition, source: &Path) -> String {
    let projection = mapping_segments(fleet).join(",\n        ");

    let core_filter = CanonicalField::all()
        .iter()
        .filter(|field| field.is_core())
        .map(|field| format!("{} IS NOT NULL", field.column_name()))
        .collect::<Vec<_>>()
        .join("\n      AND ");

    format!(
        "SELECT * FROM (\n    SELECT\n        {projection}\n    FROM read_parquet('{}')\n)\nWHERE {core_filter}",
        source.display(),
    )
}
