//! SQL builders for the classification stage.
//!
//! The staging pass is materialized once as a temp table; the datamart,
//! summary, and telemetry queries all read from it so verified
//! partitions are scanned a single time per run.

use std::path::Path;

use chrono::NaiveDate;
use toll_audit_trip_models::ZoneCategory;

use crate::reference::ZonePolygon;

/// Temp table holding categorized trips for the duration of a run.
pub const STAGING_TABLE: &str = "zone_staging";

/// Renders policy zone ids as a SQL `IN` list.
#[must_use]
pub fn zone_id_list(zones: &[ZonePolygon]) -> String {
    zones
        .iter()
        .map(|z| z.location_id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A `VALUES`-backed select of the Policy Zone Set for persistence.
#[must_use]
pub fn policy_zone_select(zones: &[ZonePolygon]) -> String {
    let rows = zones
        .iter()
        .map(|z| {
            format!(
                "({}, '{}', '{}')",
                z.location_id,
                sql_literal(&z.zone),
                sql_literal(&z.borough)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT * FROM (VALUES {rows}) AS zones(location_id, zone, borough)")
}

/// The staging select: every verified trip tagged with its zone
/// category and policy phase.
#[must_use]
pub fn categorization_select(verified_dir: &Path, id_list: &str, effective: NaiveDate) -> String {
    format!(
        "SELECT *,\n    CASE\n        WHEN pickup_loc IN ({ids}) AND dropoff_loc IN ({ids}) THEN '{inside}'\n        WHEN pickup_loc NOT IN ({ids}) AND dropoff_loc IN ({ids}) THEN '{entering}'\n        WHEN pickup_loc IN ({ids}) AND dropoff_loc NOT IN ({ids}) THEN '{exiting}'\n        ELSE '{outside}'\n    END AS zone_category,\n    CASE WHEN pickup_time >= TIMESTAMP '{effective} 00:00:00' THEN 1 ELSE 0 END AS post_policy\nFROM read_parquet('{verified}/*.parquet')",
        ids = id_list,
        inside = ZoneCategory::InsideZone,
        entering = ZoneCategory::EnteringZone,
        exiting = ZoneCategory::ExitingZone,
        outside = ZoneCategory::OutsideZone,
        verified = verified_dir.display(),
    )
}

/// The Daily Category Aggregate over the staging table.
#[must_use]
pub fn daily_metrics_select() -> String {
    format!(
        "SELECT\n    DATE_TRUNC('day', pickup_time) AS trip_date,\n    zone_category,\n    post_policy,\n    COUNT(*) AS trip_count,\n    AVG(fare) AS mean_fare,\n    AVG(total_amount) AS mean_total,\n    AVG(trip_distance) AS mean_distance,\n    SUM(COALESCE(congestion_surcharge, 0)) AS surcharge_total,\n    {compliant} AS compliant_trips,\n    {leakage} AS leakage_trips\nFROM {table}\nGROUP BY trip_date, zone_category, post_policy\nORDER BY trip_date, zone_category, post_policy",
        compliant = COMPLIANT_SUM,
        leakage = LEAKAGE_SUM,
        table = STAGING_TABLE,
    )
}

/// Volume and mean surcharge per category and phase, for the run log.
#[must_use]
pub fn categorization_summary_select() -> String {
    format!(
        "SELECT zone_category, post_policy, COUNT(*) AS record_volume,\n       AVG(COALESCE(congestion_surcharge, 0)) AS mean_surcharge\nFROM {STAGING_TABLE}\nGROUP BY zone_category, post_policy\nORDER BY zone_category, post_policy"
    )
}

/// Regional telemetry: post-policy trips bound for the Policy Zone Set,
/// grouped by pickup zone, busiest first.
#[must_use]
pub fn regional_telemetry_select(id_list: &str) -> String {
    format!(
        "SELECT\n    pickup_loc,\n    COUNT(*) AS trip_count,\n    AVG(fare) AS mean_fare,\n    {compliant} AS compliant_trips,\n    {leakage} AS leakage_trips,\n    ROUND(100.0 * {compliant} / COUNT(*), 2) AS compliance_percent\nFROM {table}\nWHERE post_policy = 1 AND dropoff_loc IN ({ids})\nGROUP BY pickup_loc\nORDER BY trip_count DESC\nLIMIT 250",
        compliant = COMPLIANT_SUM,
        leakage = LEAKAGE_SUM,
        table = STAGING_TABLE,
        ids = id_list,
    )
}

/// A compliant trip carries a positive surcharge; leakage is a null or
/// zero surcharge. Negative amounts (refund adjustments) count as
/// neither. The casts keep the persisted columns BIGINT instead of the
/// HUGEINT that `SUM` over integers would otherwise produce.
const COMPLIANT_SUM: &str =
    "CAST(SUM(CASE WHEN congestion_surcharge > 0 THEN 1 ELSE 0 END) AS BIGINT)";
const LEAKAGE_SUM: &str =
    "CAST(SUM(CASE WHEN congestion_surcharge IS NULL OR congestion_surcharge = 0 THEN 1 ELSE 0 END) AS BIGINT)";

fn sql_literal(text: &str) -> String {
    text.replace('\'', "''")
}
