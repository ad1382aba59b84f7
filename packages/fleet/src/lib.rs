#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Config-driven fleet definitions.
//!
//! Each vehicle fleet publishes raw trip partitions under its own
//! column nomenclature and file naming scheme. A [`FleetDefinition`]
//! captures everything fleet-specific in a TOML config compiled into
//! the binary, so adding a fleet never touches pipeline code.

pub mod fleet_def;
pub mod registry;

pub use fleet_def::{FieldMap, FleetDefinition, parse_fleet_toml};
pub use registry::{all_fleets, fleet_by_id};
