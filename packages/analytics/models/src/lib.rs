#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result types for the compliance audit and the fleet dynamics
//! evaluation, with the derivation rules that make them safe to compute
//! from partially empty inputs.

use serde::{Deserialize, Serialize};

/// The single-row outcome of the toll compliance audit over toll-liable
/// (cross-border) trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    /// Toll-liable trips observed after the policy took effect.
    pub gross_volume: u64,
    /// Trips that carried a positive congestion surcharge.
    pub compliant_volume: u64,
    /// Trips with a null or zero surcharge.
    pub leakage_volume: u64,
    /// Leakage share of gross volume, percent, two decimals. Zero when
    /// nothing was observed.
    pub leakage_percent: f64,
    /// Surcharge revenue actually collected.
    pub surcharge_revenue: f64,
    /// Leakage volume priced at the assumed per-trip toll rate.
    pub revenue_gap_estimate: f64,
}

impl ComplianceSummary {
    /// Derives the summary from audit totals.
    ///
    /// An empty observation window yields a zero leakage percentage
    /// rather than a division artifact. The revenue gap is priced at
    /// the configured flat rate, never at an observed average.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_totals(
        gross_volume: u64,
        compliant_volume: u64,
        leakage_volume: u64,
        surcharge_revenue: f64,
        assumed_toll_rate: f64,
    ) -> Self {
        let leakage_percent = if gross_volume == 0 {
            0.0
        } else {
            round2(leakage_volume as f64 / gross_volume as f64 * 100.0)
        };

        Self {
            gross_volume,
            compliant_volume,
            leakage_volume,
            leakage_percent,
            surcharge_revenue,
            revenue_gap_estimate: leakage_volume as f64 * assumed_toll_rate,
        }
    }
}

/// Per-fleet aggregates over one analysis window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetWindowMetrics {
    /// Fleet identifier from the canonical `fleet` column.
    pub fleet: String,
    /// Trips observed in the window.
    pub trip_volume: u64,
    /// Mean fare over the window.
    pub mean_fare: f64,
    /// Summed `total_amount` over the window.
    pub gross_revenue: f64,
}

/// One fleet's baseline-versus-comparison performance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetDynamics {
    pub fleet: String,
    pub baseline_volume: u64,
    pub comparison_volume: u64,
    pub volume_change_pct: f64,
    pub baseline_mean_fare: f64,
    pub comparison_mean_fare: f64,
    pub fare_change_pct: f64,
    pub baseline_revenue: f64,
    pub comparison_revenue: f64,
    pub revenue_change_pct: f64,
}

impl FleetDynamics {
    /// Joins one fleet's baseline and comparison windows into a
    /// dynamics record. Callers match the windows by fleet id first.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_windows(baseline: &FleetWindowMetrics, comparison: &FleetWindowMetrics) -> Self {
        Self {
            fleet: baseline.fleet.clone(),
            baseline_volume: baseline.trip_volume,
            comparison_volume: comparison.trip_volume,
            volume_change_pct: percentage_delta(
                baseline.trip_volume as f64,
                comparison.trip_volume as f64,
            ),
            baseline_mean_fare: baseline.mean_fare,
            comparison_mean_fare: comparison.mean_fare,
            fare_change_pct: percentage_delta(baseline.mean_fare, comparison.mean_fare),
            baseline_revenue: baseline.gross_revenue,
            comparison_revenue: comparison.gross_revenue,
            revenue_change_pct: percentage_delta(baseline.gross_revenue, comparison.gross_revenue),
        }
    }
}

/// Percentage change from `old` to `new`, zero when the baseline is not
/// positive.
#[must_use]
pub fn percentage_delta(old: f64, new: f64) -> f64 {
    if old > 0.0 {
        (new - old) / old * 100.0
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{ComplianceSummary, FleetDynamics, FleetWindowMetrics, percentage_delta};

    #[test]
    fn summary_derives_leakage_percent_and_gap() {
        let summary = ComplianceSummary::from_totals(2000, 1500, 500, 13_500.0, 9.0);

        assert!((summary.leakage_percent - 25.0).abs() < f64::EPSILON);
        assert!((summary.revenue_gap_estimate - 4500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_rounds_leakage_percent_to_two_places() {
        let summary = ComplianceSummary::from_totals(3, 2, 1, 9.0, 9.0);
        assert!((summary.leakage_percent - 33.33).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_window_never_divides_by_zero() {
        let summary = ComplianceSummary::from_totals(0, 0, 0, 0.0, 9.0);

        assert_eq!(summary.gross_volume, 0);
        assert!(summary.leakage_percent.abs() < f64::EPSILON);
        assert!(summary.revenue_gap_estimate.abs() < f64::EPSILON);
    }

    #[test]
    fn gap_is_priced_at_the_configured_rate() {
        let summary = ComplianceSummary::from_totals(100, 90, 10, 810.0, 14.25);
        assert!((summary.revenue_gap_estimate - 142.5).abs() < f64::EPSILON);
    }

    #[test]
    fn delta_is_relative_to_the_baseline() {
        assert!((percentage_delta(200.0, 150.0) - -25.0).abs() < f64::EPSILON);
        assert!((percentage_delta(100.0, 130.0) - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn delta_with_empty_baseline_is_zero() {
        assert!(percentage_delta(0.0, 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dynamics_join_carries_both_windows() {
        let baseline = FleetWindowMetrics {
            fleet: "yellow".to_string(),
            trip_volume: 1000,
            mean_fare: 20.0,
            gross_revenue: 25_000.0,
        };
        let comparison = FleetWindowMetrics {
            fleet: "yellow".to_string(),
            trip_volume: 900,
            mean_fare: 22.0,
            gross_revenue: 24_750.0,
        };

        let dynamics = FleetDynamics::from_windows(&baseline, &comparison);

        assert_eq!(dynamics.fleet, "yellow");
        assert_eq!(dynamics.baseline_volume, 1000);
        assert_eq!(dynamics.comparison_volume, 900);
        assert!((dynamics.volume_change_pct - -10.0).abs() < f64::EPSILON);
        assert!((dynamics.fare_change_pct - 10.0).abs() < f64::EPSILON);
        assert!((dynamics.revenue_change_pct - -1.0).abs() < f64::EPSILON);
    }
}
