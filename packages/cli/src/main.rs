#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the toll audit pipeline.
//!
//! ```text
//! toll-audit unify [--force]
//! toll-audit refine [--force]
//! toll-audit impute
//! toll-audit classify
//! toll-audit analyze
//! toll-audit run [--force]
//! toll-audit fleets
//! ```
//!
//! Uses `indicatif-log-bridge` (via [`toll_audit_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod pipeline;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use toll_audit_analytics::PolicyAnalytics;
use toll_audit_cli_utils::IndicatifProgress;
use toll_audit_config::load_audit_config;
use toll_audit_fleet::all_fleets;
use toll_audit_imputation::GapImputer;
use toll_audit_refinery::AnomalyRefinery;
use toll_audit_store::Warehouse;
use toll_audit_unify::SchemaUnifier;
use toll_audit_zones::ZoneClassifier;

#[derive(Parser)]
#[command(name = "toll-audit", about = "Congestion toll compliance audit pipeline")]
struct Cli {
    /// Data root holding the warehouse directory tree
    #[arg(long, default_value = "data", global = true)]
    data_root: PathBuf,

    /// TOML run-config override file (compiled-in defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align raw fleet partitions onto the canonical schema
    Unify {
        /// Re-align partitions whose canonical artifact already exists
        #[arg(long)]
        force: bool,
    },
    /// Split canonical partitions into verified data and anomaly traces
    Refine {
        /// Re-refine partitions whose verified artifact already exists
        #[arg(long)]
        force: bool,
    },
    /// Reconstruct the missing target month from its two anchor months
    Impute,
    /// Derive the policy zone set and build the daily zone datamart
    Classify,
    /// Compute the compliance summary and the fleet dynamics matrix
    Analyze,
    /// Run the full pipeline: unify, refine, impute, classify, analyze
    Run {
        /// Re-process partitions even when cached artifacts exist
        #[arg(long)]
        force: bool,
    },
    /// List the embedded fleet registry
    Fleets,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = toll_audit_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = load_audit_config(cli.config.as_deref())?;
    let warehouse = Warehouse::new(&cli.data_root);
    let fleets = all_fleets();

    if !matches!(cli.command, Commands::Fleets) {
        let fleet_ids: Vec<&str> = fleets.iter().map(|f| f.id.as_str()).collect();
        warehouse.ensure_layout(&fleet_ids)?;
    }

    match cli.command {
        Commands::Fleets => {
            println!("{:<10} {:<22} RAW PATTERN", "ID", "NAME");
            println!("{}", "-".repeat(70));
            for fleet in &fleets {
                println!(
                    "{:<10} {:<22} {}",
                    fleet.id, fleet.display_name, fleet.raw_file_pattern
                );
            }
        }
        Commands::Unify { force } => {
            let start = Instant::now();
            let bar = IndicatifProgress::partition_bar(&multi, "Aligning raw partitions");
            let report = SchemaUnifier::new(&config, &warehouse).align_all(&fleets, force, &bar)?;
            log::info!(
                "Alignment complete: {} aligned, {} cached, {} failed in {:.1}s",
                report.aligned(),
                report.skipped(),
                report.failed(),
                start.elapsed().as_secs_f64()
            );
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Refine { force } => {
            let start = Instant::now();
            let refinery = AnomalyRefinery::new(&config, &warehouse);
            let bar = IndicatifProgress::partition_bar(&multi, "Refining partitions");
            let report = refinery.refine_all(force, &bar)?;
            refinery.behavioral_pattern_audit()?;
            log::info!(
                "Refinement complete in {:.1}s",
                start.elapsed().as_secs_f64()
            );
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Impute => {
            let start = Instant::now();
            let report = GapImputer::new(&config, &warehouse).recover_all(&fleets)?;
            log::info!(
                "Imputation finished in {:.1}s",
                start.elapsed().as_secs_f64()
            );
            if !report.is_complete() {
                std::process::exit(1);
            }
        }
        Commands::Classify => {
            let start = Instant::now();
            let report = ZoneClassifier::new(&config, &warehouse).classify_all()?;
            log::info!(
                "Classification complete: {} datamart rows, {} telemetry rows in {:.1}s",
                report.datamart_rows,
                report.telemetry_rows,
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Analyze => {
            let start = Instant::now();
            let analytics = PolicyAnalytics::new(&config, &warehouse);
            analytics.audit_compliance()?;
            analytics.evaluate_fleet_dynamics()?;
            log::info!("Analytics complete in {:.1}s", start.elapsed().as_secs_f64());
        }
        Commands::Run { force } => {
            if !pipeline::run(&multi, &config, &warehouse, &fleets, force) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
