#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Run configuration for the toll audit pipeline.
//!
//! Every threshold, date, weight, and list the pipeline depends on lives
//! here. Defaults are compiled in; an optional TOML file overrides any
//! subset of fields. The loaded [`AuditConfig`] is immutable and passed
//! into each stage at construction, so no stage ever reads ambient
//! global state.

use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

/// Tolerance when checking that the imputation blend weights sum to 1.
const WEIGHT_SUM_EPSILON: f64 = 1e-9;

/// Default neighborhood name fragments that identify policy zones.
const POLICY_NEIGHBORHOODS: &[&str] = &[
    "Financial",
    "Battery",
    "Tribeca",
    "SoHo",
    "Chinatown",
    "Lower East Side",
    "East Village",
    "West Village",
    "Greenwich",
    "Chelsea",
    "Gramercy",
    "Murray Hill",
    "Midtown",
    "Clinton",
    "Garment",
    "Times Square",
    "Penn Station",
    "Flatiron",
];

/// Resource caps for the embedded analytical engine session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Session memory ceiling, e.g. `4GB`.
    pub memory_limit: String,
    /// Worker threads for the session. `None` lets the engine use every
    /// available core.
    pub threads: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit: "4GB".to_string(),
            threads: None,
        }
    }
}

/// Thresholds for the anomaly classification cascade.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    /// Velocity ceiling in miles per hour.
    pub max_velocity_mph: f64,
    /// Trips shorter than this many seconds are suspect.
    pub min_trip_seconds: f64,
    /// Fare cap for sub-minimum-duration trips.
    pub short_trip_fare_cap: f64,
    /// Distances at or below this many miles count as no movement.
    pub min_movement_miles: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            max_velocity_mph: 65.0,
            min_trip_seconds: 60.0,
            short_trip_fare_cap: 20.0,
            min_movement_miles: 0.01,
        }
    }
}

/// The toll policy being audited.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Borough the policy zone sits in.
    pub borough: String,
    /// Neighborhood name fragments matched (case-insensitively) against
    /// zone names to derive the policy zone set.
    pub neighborhoods: Vec<String>,
    /// First day the surcharge applies.
    pub effective_date: NaiveDate,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            borough: "Manhattan".to_string(),
            neighborhoods: POLICY_NEIGHBORHOODS
                .iter()
                .map(|n| (*n).to_string())
                .collect(),
            effective_date: default_effective_date(),
        }
    }
}

fn default_effective_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 5).expect("valid policy effective date")
}

/// Parameters for the compliance summary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Assumed per-trip toll in dollars, used only for the theoretical
    /// revenue gap. Deliberately an assumption, never derived from
    /// observed surcharge averages.
    pub assumed_toll_rate: f64,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            assumed_toll_rate: 9.0,
        }
    }
}

/// One multi-month observation window for fleet dynamics.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnalysisWindow {
    /// Calendar year of the window.
    pub year: i32,
    /// Calendar months included, 1 through 12.
    pub months: Vec<u32>,
}

impl AnalysisWindow {
    /// Human-readable label, e.g. `2024-01..2024-03`.
    #[must_use]
    pub fn label(&self) -> String {
        match (self.months.iter().min(), self.months.iter().max()) {
            (Some(first), Some(last)) => {
                format!("{}-{:02}..{}-{:02}", self.year, first, self.year, last)
            }
            _ => format!("{} (empty)", self.year),
        }
    }
}

/// The two windows compared by the fleet dynamics evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DynamicsConfig {
    /// Pre-policy baseline window.
    pub baseline: AnalysisWindow,
    /// Post-policy comparison window.
    pub comparison: AnalysisWindow,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            baseline: AnalysisWindow {
                year: 2024,
                months: vec![1, 2, 3],
            },
            comparison: AnalysisWindow {
                year: 2025,
                months: vec![1, 2, 3],
            },
        }
    }
}

/// Parameters for reconstructing a missing calendar month.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImputationConfig {
    /// Year of the month to reconstruct.
    pub target_year: i32,
    /// Month to reconstruct, 1 through 12.
    pub target_month: u32,
    /// Year of the older anchor (same calendar month).
    pub older_anchor_year: i32,
    /// Year of the recent anchor (same calendar month).
    pub recent_anchor_year: i32,
    /// Blend weight applied to the older anchor.
    pub weight_older: f64,
    /// Blend weight applied to the recent anchor.
    pub weight_recent: f64,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            target_year: 2025,
            target_month: 12,
            older_anchor_year: 2023,
            recent_anchor_year: 2024,
            weight_older: 0.3,
            weight_recent: 0.7,
        }
    }
}

impl ImputationConfig {
    /// Sum of the two blend weights.
    #[must_use]
    pub fn weight_sum(&self) -> f64 {
        self.weight_older + self.weight_recent
    }

    /// Whether the blend weights form a convex combination.
    ///
    /// When this is false the imputation model logs a warning and keeps
    /// the weights as configured; they are never renormalized silently.
    #[must_use]
    pub fn weights_are_normalized(&self) -> bool {
        (self.weight_sum() - 1.0).abs() <= WEIGHT_SUM_EPSILON
    }
}

/// The complete, immutable configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Engine session tuning.
    pub engine: EngineConfig,
    /// Anomaly cascade thresholds.
    pub thresholds: AnomalyThresholds,
    /// The audited toll policy.
    pub policy: PolicyConfig,
    /// Compliance summary parameters.
    pub compliance: ComplianceConfig,
    /// Fleet dynamics windows.
    pub dynamics: DynamicsConfig,
    /// Missing-month reconstruction parameters.
    pub imputation: ImputationConfig,
}

/// Parses an [`AuditConfig`] from TOML text. Absent fields keep their
/// compiled-in defaults.
///
/// # Errors
///
/// Returns an error string if the TOML is malformed.
pub fn parse_audit_toml(toml_str: &str) -> Result<AuditConfig, String> {
    toml::de::from_str(toml_str).map_err(|e| format!("Failed to parse audit config TOML: {e}"))
}

/// Loads the run configuration, either compiled-in defaults or a TOML
/// override file.
///
/// # Errors
///
/// Returns an error string if the file cannot be read or parsed.
pub fn load_audit_config(path: Option<&Path>) -> Result<AuditConfig, String> {
    match path {
        None => Ok(AuditConfig::default()),
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
            parse_audit_toml(&contents)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_audit_parameters() {
        let config = AuditConfig::default();

        assert_eq!(config.engine.memory_limit, "4GB");
        assert_eq!(config.engine.threads, None);
        assert!((config.thresholds.max_velocity_mph - 65.0).abs() < f64::EPSILON);
        assert!((config.thresholds.min_trip_seconds - 60.0).abs() < f64::EPSILON);
        assert!((config.thresholds.short_trip_fare_cap - 20.0).abs() < f64::EPSILON);
        assert!((config.thresholds.min_movement_miles - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.policy.borough, "Manhattan");
        assert_eq!(config.policy.neighborhoods.len(), 18);
        assert_eq!(
            config.policy.effective_date,
            NaiveDate::from_ymd_opt(2025, 1, 5).unwrap()
        );
        assert!((config.compliance.assumed_toll_rate - 9.0).abs() < f64::EPSILON);
        assert_eq!(config.dynamics.baseline.year, 2024);
        assert_eq!(config.dynamics.comparison.year, 2025);
        assert_eq!(config.dynamics.baseline.months, vec![1, 2, 3]);
        assert_eq!(config.imputation.target_year, 2025);
        assert_eq!(config.imputation.target_month, 12);
        assert_eq!(config.imputation.older_anchor_year, 2023);
        assert_eq!(config.imputation.recent_anchor_year, 2024);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config = parse_audit_toml("").unwrap();

        assert_eq!(config, AuditConfig::default());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config = parse_audit_toml(
            r#"
            [thresholds]
            max_velocity_mph = 80.0

            [compliance]
            assumed_toll_rate = 2.25

            [policy]
            effective_date = "2026-01-01"
            "#,
        )
        .unwrap();

        assert!((config.thresholds.max_velocity_mph - 80.0).abs() < f64::EPSILON);
        // Untouched threshold keeps its default.
        assert!((config.thresholds.min_trip_seconds - 60.0).abs() < f64::EPSILON);
        assert!((config.compliance.assumed_toll_rate - 2.25).abs() < f64::EPSILON);
        assert_eq!(
            config.policy.effective_date,
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        );
        assert_eq!(config.policy.neighborhoods.len(), 18);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(parse_audit_toml("[thresholds\nmax_velocity_mph=80").is_err());
    }

    #[test]
    fn default_weights_are_normalized() {
        let imputation = ImputationConfig::default();

        assert!((imputation.weight_sum() - 1.0).abs() < 1e-12);
        assert!(imputation.weights_are_normalized());
    }

    #[test]
    fn unbalanced_weights_are_flagged_not_adjusted() {
        let imputation = ImputationConfig {
            weight_older: 0.5,
            weight_recent: 0.3,
            ..ImputationConfig::default()
        };

        assert!(!imputation.weights_are_normalized());
        // The configured values survive untouched.
        assert!((imputation.weight_older - 0.5).abs() < f64::EPSILON);
        assert!((imputation.weight_recent - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn window_label_spans_min_to_max_month() {
        let window = AnalysisWindow {
            year: 2024,
            months: vec![1, 2, 3],
        };

        assert_eq!(window.label(), "2024-01..2024-03");
    }
}
