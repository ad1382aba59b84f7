//! Embedded fleet definition registry.
//!
//! All fleet TOML configs are compiled into the binary via
//! `include_str!`, so the pipeline needs no runtime config directory to
//! know its fleets.

use crate::fleet_def::{FleetDefinition, parse_fleet_toml};

/// All embedded fleet definition TOMLs, as `(name, contents)` pairs.
const FLEET_TOMLS: &[(&str, &str)] = &[
    ("yellow", include_str!("../fleets/yellow.toml")),
    ("green", include_str!("../fleets/green.toml")),
];

/// Expected number of fleet definitions (update when adding fleets).
#[cfg(test)]
const EXPECTED_FLEET_COUNT: usize = 2;

/// Parses and returns all embedded fleet definitions.
///
/// # Panics
///
/// Panics if any embedded TOML fails to parse. That is a build defect,
/// caught by the registry tests, never a runtime condition.
#[must_use]
pub fn all_fleets() -> Vec<FleetDefinition> {
    FLEET_TOMLS
        .iter()
        .map(|(name, contents)| {
            parse_fleet_toml(contents)
                .unwrap_or_else(|e| panic!("Failed to parse embedded fleet TOML {name}: {e}"))
        })
        .collect()
}

/// Returns the fleet definition with the given ID, if present.
#[must_use]
pub fn fleet_by_id(id: &str) -> Option<FleetDefinition> {
    all_fleets().into_iter().find(|fleet| fleet.id == id)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use toll_audit_trip_models::CanonicalField;

    use super::*;

    #[test]
    fn registry_loads_all_fleets() {
        assert_eq!(all_fleets().len(), EXPECTED_FLEET_COUNT);
    }

    #[test]
    fn fleet_ids_are_unique_and_match_registry_names() {
        let fleets = all_fleets();
        let ids: BTreeSet<&str> = fleets.iter().map(|f| f.id.as_str()).collect();

        assert_eq!(ids.len(), fleets.len());

        for ((name, _), fleet) in FLEET_TOMLS.iter().zip(&fleets) {
            assert_eq!(*name, fleet.id);
        }
    }

    #[test]
    fn every_fleet_maps_all_canonical_fields() {
        for fleet in all_fleets() {
            for field in CanonicalField::all() {
                assert!(
                    fleet.fields.source_column(*field).is_some(),
                    "{} does not map {field}",
                    fleet.id
                );
            }
        }
    }

    #[test]
    fn every_raw_pattern_carries_both_placeholders() {
        for fleet in all_fleets() {
            assert!(
                fleet.raw_file_pattern.contains("{year}"),
                "{} pattern lacks a year placeholder",
                fleet.id
            );
            assert!(
                fleet.raw_file_pattern.contains("{month:02}"),
                "{} pattern lacks a month placeholder",
                fleet.id
            );
        }
    }

    #[test]
    fn fleet_lookups_by_id() {
        assert!(fleet_by_id("yellow").is_some());
        assert!(fleet_by_id("green").is_some());
        assert!(fleet_by_id("hovercraft").is_none());
    }

    #[test]
    fn yellow_and_green_use_their_own_timestamp_columns() {
        let yellow = fleet_by_id("yellow").unwrap();
        let green = fleet_by_id("green").unwrap();

        assert_eq!(
            yellow.fields.source_column(CanonicalField::PickupTime),
            Some("tpep_pickup_datetime")
        );
        assert_eq!(
            green.fields.source_column(CanonicalField::PickupTime),
            Some("lpep_pickup_datetime")
        );
        // The location and monetary columns are shared nomenclature.
        assert_eq!(
            yellow.fields.source_column(CanonicalField::Fare),
            green.fields.source_column(CanonicalField::Fare)
        );
    }
}
