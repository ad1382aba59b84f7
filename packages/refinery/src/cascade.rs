//! The anomaly cascade: an ordered rule table applied to every canonical
//! trip record. The first rule whose predicate holds assigns the record's
//! status; records surviving every rule are `VERIFIED`.
//!
//! Each rule exists in two renditions that must agree: a SQL predicate
//! evaluated inside the engine over the staging table, and an in-process
//! predicate over [`TripMeasures`] used by tests and spot checks. Both
//! follow SQL comparison semantics, where a null operand means the rule
//! does not fire.

use toll_audit_config::AnomalyThresholds;
use toll_audit_trip_models::AnomalyStatus;

/// Measures of a single trip as the cascade sees them.
///
/// Duration is always present because the canonical schema requires both
/// timestamps. The monetary and distance measures are nullable.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TripMeasures {
    pub duration_seconds: f64,
    pub trip_distance: Option<f64>,
    pub fare: Option<f64>,
    pub total_amount: Option<f64>,
}

impl TripMeasures {
    /// Average speed over the trip in miles per hour.
    ///
    /// Non-positive durations yield zero rather than a division artifact,
    /// so degenerate timestamps can never register as a speed violation.
    /// A missing distance with a positive duration yields `None`.
    #[must_use]
    pub fn velocity_mph(&self) -> Option<f64> {
        if self.duration_seconds > 0.0 {
            self.trip_distance
                .map(|distance| distance / (self.duration_seconds / 3600.0))
        } else {
            Some(0.0)
        }
    }
}

struct CascadeRule {
    status: AnomalyStatus,
    sql: fn(&AnomalyThresholds) -> String,
    hits: fn(&TripMeasures, &AnomalyThresholds) -> bool,
}

/// Rule order is load-bearing: a record matching several rules takes the
/// status of the earliest one.
const CASCADE: &[CascadeRule] = &[
    CascadeRule {
        status: AnomalyStatus::ExcessiveVelocity,
        sql: |t| format!("velocity_mph > {}", t.max_velocity_mph),
        hits: |m, t| m.velocity_mph().is_some_and(|v| v > t.max_velocity_mph),
    },
    CascadeRule {
        status: AnomalyStatus::FinancialOutlier,
        sql: |t| {
            format!(
                "duration_seconds < {} AND fare > {}",
                t.min_trip_seconds, t.short_trip_fare_cap
            )
        },
        hits: |m, t| {
            m.duration_seconds < t.min_trip_seconds
                && m.fare.is_some_and(|f| f > t.short_trip_fare_cap)
        },
    },
    CascadeRule {
        status: AnomalyStatus::SpatialAnomaly,
        sql: |t| format!("trip_distance <= {} AND fare > 0", t.min_movement_miles),
        hits: |m, t| {
            m.trip_distance.is_some_and(|d| d <= t.min_movement_miles)
                && m.fare.is_some_and(|f| f > 0.0)
        },
    },
    CascadeRule {
        status: AnomalyStatus::TemporalError,
        sql: |_| "duration_seconds <= 0".to_string(),
        hits: |m, _| m.duration_seconds <= 0.0,
    },
    CascadeRule {
        status: AnomalyStatus::NegativeRevenue,
        sql: |_| "fare < 0 OR total_amount < 0".to_string(),
        hits: |m, _| {
            m.fare.is_some_and(|f| f < 0.0) || m.total_amount.is_some_and(|a| a < 0.0)
        },
    },
];

/// Runs the cascade over one record in process.
#[must_use]
pub fn classify(measures: &TripMeasures, thresholds: &AnomalyThresholds) -> AnomalyStatus {
    CASCADE
        .iter()
        .find(|rule| (rule.hits)(measures, thresholds))
        .map_or(AnomalyStatus::Verified, |rule| rule.status)
}

/// Renders the cascade as a SQL `CASE` expression over the staging
/// table's derived columns.
#[must_use]
pub fn cascade_case_expression(thresholds: &AnomalyThresholds) -> String {
    let mut case = String::from("CASE\n");
    for rule in CASCADE {
        case.push_str(&format!(
            "        WHEN {} THEN '{}'\n",
            (rule.sql)(thresholds),
            rule.status
        ));
    }
    case.push_str(&format!("        ELSE '{}'\n    END", AnomalyStatus::Verified));
    case
}

/// The staging query for one canonical partition: every canonical column
/// plus derived `duration_seconds`, `velocity_mph`, and `anomaly_status`.
///
/// The derived measures live in an inner projection so the cascade can
/// reference them by name without relying on lateral aliases.
#[must_use]
pub fn staging_select(source: &std::path::Path, thresholds: &AnomalyThresholds) -> String {
    format!(
        "SELECT *,\n    {case} AS anomaly_status\nFROM (\n    SELECT *,\n        EPOCH(dropoff_time - pickup_time) AS duration_seconds,\n        CASE WHEN EPOCH(dropoff_time - pickup_time) > 0\n             THEN trip_distance / (EPOCH(dropoff_time - pickup_time) / 3600.0)\n             ELSE 0 END AS velocity_mph\n    FROM read_parquet('{source}')\n)",
        case = cascade_case_expression(thresholds),
        source = source.display(),
    )
}
