//! Full pipeline orchestrator for the toll audit toolchain.
//!
//! Chains unify -> refine -> impute -> classify -> analyze with boolean
//! success gating: a failed phase closes the gate and every dependent
//! phase downstream is skipped. Imputation is the exception, its
//! synthetic output feeds no downstream phase, so per-fleet recovery
//! failures are recorded in the summary matrix without closing the gate.

use std::time::{Duration, Instant};

use toll_audit_analytics::{AnalyticsError, PolicyAnalytics};
use toll_audit_cli_utils::{IndicatifProgress, MultiProgress};
use toll_audit_config::AuditConfig;
use toll_audit_fleet::FleetDefinition;
use toll_audit_imputation::GapImputer;
use toll_audit_refinery::AnomalyRefinery;
use toll_audit_store::Warehouse;
use toll_audit_unify::SchemaUnifier;
use toll_audit_zones::ZoneClassifier;

const PHASE_COUNT: usize = 5;

/// Outcome of one pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseOutcome {
    Succeeded,
    Failed,
    /// Not run because an upstream phase failed.
    Gated,
}

impl PhaseOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Succeeded => "ok",
            Self::Failed => "FAILED",
            Self::Gated => "gated",
        }
    }
}

/// The per-phase summary matrix printed after a full run.
#[derive(Default)]
struct PhaseMatrix {
    rows: Vec<(&'static str, PhaseOutcome, Duration)>,
}

impl PhaseMatrix {
    fn record(&mut self, phase: &'static str, succeeded: bool, elapsed: Duration) {
        let outcome = if succeeded {
            PhaseOutcome::Succeeded
        } else {
            PhaseOutcome::Failed
        };
        self.rows.push((phase, outcome, elapsed));
    }

    fn record_gated(&mut self, phase: &'static str) {
        self.rows.push((phase, PhaseOutcome::Gated, Duration::ZERO));
    }

    fn all_succeeded(&self) -> bool {
        self.rows
            .iter()
            .all(|(_, outcome, _)| *outcome == PhaseOutcome::Succeeded)
    }

    fn log(&self) {
        log::info!("Pipeline summary:");
        for (phase, outcome, elapsed) in &self.rows {
            log::info!(
                "  {phase:<8} {:<6} {:.1}s",
                outcome.label(),
                elapsed.as_secs_f64()
            );
        }
    }
}

/// Runs the five pipeline phases in order and prints the summary matrix.
///
/// Returns whether every phase succeeded. Stage errors are caught and
/// recorded as phase failures; this function never aborts mid-run.
#[allow(clippy::too_many_lines)]
pub fn run(
    multi: &MultiProgress,
    config: &AuditConfig,
    warehouse: &Warehouse,
    fleets: &[FleetDefinition],
    force: bool,
) -> bool {
    let pipeline_start = Instant::now();
    let mut matrix = PhaseMatrix::default();
    let mut gate_open = true;

    // --- [1/5] Schema unification ---
    {
        let start = Instant::now();
        log::info!("[1/{PHASE_COUNT}] Aligning fleet schemas...");
        let bar = IndicatifProgress::partition_bar(multi, "[1/5] Aligning partitions");
        let succeeded = match SchemaUnifier::new(config, warehouse).align_all(fleets, force, &bar)
        {
            Ok(report) => report.is_success(),
            Err(e) => {
                log::error!("Schema alignment failed: {e}");
                false
            }
        };
        gate_open = succeeded;
        matrix.record("unify", succeeded, start.elapsed());
    }

    // --- [2/5] Anomaly refinement ---
    if gate_open {
        let start = Instant::now();
        log::info!("[2/{PHASE_COUNT}] Refining canonical partitions...");
        let refinery = AnomalyRefinery::new(config, warehouse);
        let bar = IndicatifProgress::partition_bar(multi, "[2/5] Refining partitions");
        let succeeded = match refinery.refine_all(force, &bar) {
            Ok(report) => {
                // Supplemental telemetry; a failure here produces no
                // artifact and gates nothing.
                if let Err(e) = refinery.behavioral_pattern_audit() {
                    log::error!("Behavioral pattern audit failed: {e}");
                }
                report.is_success()
            }
            Err(e) => {
                log::error!("Anomaly refinement failed: {e}");
                false
            }
        };
        gate_open = succeeded;
        matrix.record("refine", succeeded, start.elapsed());
    } else {
        matrix.record_gated("refine");
    }

    // --- [3/5] Gap imputation ---
    if gate_open {
        let start = Instant::now();
        log::info!("[3/{PHASE_COUNT}] Recovering the missing target month...");
        let succeeded = match GapImputer::new(config, warehouse).recover_all(fleets) {
            Ok(report) => report.is_complete(),
            Err(e) => {
                log::error!("Gap imputation failed: {e}");
                false
            }
        };
        // Synthetic partitions feed no downstream phase, so recovery
        // failures never close the gate.
        matrix.record("impute", succeeded, start.elapsed());
    } else {
        matrix.record_gated("impute");
    }

    // --- [4/5] Zone classification ---
    if gate_open {
        let start = Instant::now();
        log::info!("[4/{PHASE_COUNT}] Classifying trips against the policy zone...");
        let succeeded = match ZoneClassifier::new(config, warehouse).classify_all() {
            Ok(report) => {
                log::info!(
                    "Zone datamart ready: {} rows across {} policy zones",
                    report.datamart_rows,
                    report.policy_zones
                );
                true
            }
            Err(e) => {
                log::error!("Zone classification failed: {e}");
                false
            }
        };
        gate_open = succeeded;
        matrix.record("classify", succeeded, start.elapsed());
    } else {
        matrix.record_gated("classify");
    }

    // --- [5/5] Policy analytics ---
    if gate_open {
        let start = Instant::now();
        log::info!("[5/{PHASE_COUNT}] Auditing compliance and fleet dynamics...");
        let succeeded = match run_analytics(config, warehouse) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Policy analytics failed: {e}");
                false
            }
        };
        matrix.record("analyze", succeeded, start.elapsed());
    } else {
        matrix.record_gated("analyze");
    }

    matrix.log();
    log::info!(
        "Pipeline finished in {:.1}s",
        pipeline_start.elapsed().as_secs_f64()
    );

    matrix.all_succeeded()
}

fn run_analytics(config: &AuditConfig, warehouse: &Warehouse) -> Result<(), AnalyticsError> {
    let analytics = PolicyAnalytics::new(config, warehouse);
    analytics.audit_compliance()?;
    analytics.evaluate_fleet_dynamics()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{PhaseMatrix, PhaseOutcome};

    #[test]
    fn matrix_succeeds_only_when_every_phase_did() {
        let mut matrix = PhaseMatrix::default();
        matrix.record("unify", true, Duration::from_secs(2));
        matrix.record("refine", true, Duration::from_secs(3));
        assert!(matrix.all_succeeded());

        matrix.record("impute", false, Duration::from_secs(1));
        assert!(!matrix.all_succeeded());
    }

    #[test]
    fn gated_phases_count_against_success() {
        let mut matrix = PhaseMatrix::default();
        matrix.record("unify", false, Duration::from_secs(1));
        matrix.record_gated("refine");
        matrix.record_gated("classify");

        assert!(!matrix.all_succeeded());
        assert_eq!(matrix.rows[1].1, PhaseOutcome::Gated);
    }

    #[test]
    fn outcome_labels_distinguish_the_three_states() {
        assert_eq!(PhaseOutcome::Succeeded.label(), "ok");
        assert_eq!(PhaseOutcome::Failed.label(), "FAILED");
        assert_eq!(PhaseOutcome::Gated.label(), "gated");
    }

    #[test]
    fn empty_matrix_is_vacuously_successful() {
        assert!(PhaseMatrix::default().all_succeeded());
    }
}
