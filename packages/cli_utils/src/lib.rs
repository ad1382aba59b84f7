#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the toll audit toolchain.
//!
//! Wires `indicatif` progress bars into the [`ProgressCallback`] trait and
//! installs the global logger through `indicatif-log-bridge`, which parks
//! log lines while a bar redraws instead of tearing it.
//!
//! A binary only has to call [`init_logger()`] once at startup; every bar
//! created from the returned [`MultiProgress`] coexists with logging.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use toll_audit_store::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// Adapter that drives an `indicatif` [`ProgressBar`] from
/// [`ProgressCallback`] calls.
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style to switch to once `begin()` provides a known length.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Creates a progress bar for partition batch stages. Partition counts
    /// are only known after discovery, so the bar starts as a spinner and
    /// switches to a counted bar when [`ProgressCallback::begin()`] fires.
    #[must_use]
    pub fn partition_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let bar_style = ProgressStyle::with_template(
            "  {msg} {wide_bar:.cyan/dim} {pos}/{len} partitions [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Arc::new(Self { bar, bar_style })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn begin(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        // The total is known from here on, swap the spinner for a bar.
        self.bar.set_style(self.bar_style.clone());
    }

    fn stage(&self, label: String) {
        self.bar.set_message(label);
    }

    fn advance(&self) {
        self.bar.inc(1);
    }

    fn complete(&self) {
        self.bar.finish_and_clear();
    }
}

/// Installs the global logger behind `indicatif-log-bridge` so log output
/// and progress bars do not fight over the terminal.
///
/// All bars must be attached to the returned [`MultiProgress`].
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    // Assemble the pretty-env-logger instance by hand so the bridge can
    // own it. Info by default; RUST_LOG overrides.
    let mut builder = pretty_env_logger::formatted_builder();
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }
    let logger = builder.build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // A second init (tests) is harmless

    log::set_max_level(level);

    multi
}
