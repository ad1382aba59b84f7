//! Config-driven fleet definition.
//!
//! [`FleetDefinition`] captures everything unique about a fleet's raw
//! partitions: the column names its feed uses for each canonical trip
//! field and the naming scheme of its raw files. The unifier is the
//! single generic implementation driven by these configs.

use serde::Deserialize;
use toll_audit_trip_models::{CanonicalField, PartitionKey};

/// Placeholder for the four-digit year in a raw file pattern.
const YEAR_PLACEHOLDER: &str = "{year}";
/// Placeholder for the zero-padded month in a raw file pattern.
const MONTH_PLACEHOLDER: &str = "{month:02}";

/// A complete, config-driven fleet definition.
///
/// Loaded from TOML files at compile time; [`crate::registry`] is the
/// only constructor in production code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FleetDefinition {
    /// Unique identifier (e.g. `yellow`). Also the value of the
    /// canonical fleet column for every record from this fleet.
    pub id: String,
    /// Human-readable fleet name (e.g. `Yellow Medallion`).
    pub display_name: String,
    /// Raw partition file name pattern, with `{year}` and `{month:02}`
    /// placeholders.
    pub raw_file_pattern: String,
    /// Source column names for the canonical trip fields.
    pub fields: FieldMap,
}

/// Source column names for each canonical trip field.
///
/// The four core identity columns are required; a fleet that omits
/// a measure column has that canonical column emitted as NULL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldMap {
    /// Source column for `pickup_time`.
    pub pickup_time: String,
    /// Source column for `dropoff_time`.
    pub dropoff_time: String,
    /// Source column for `pickup_loc`.
    pub pickup_loc: String,
    /// Source column for `dropoff_loc`.
    pub dropoff_loc: String,
    /// Source column for `trip_distance`, if the fleet records it.
    #[serde(default)]
    pub trip_distance: Option<String>,
    /// Source column for `fare`, if the fleet records it.
    #[serde(default)]
    pub fare: Option<String>,
    /// Source column for `total_amount`, if the fleet records it.
    #[serde(default)]
    pub total_amount: Option<String>,
    /// Source column for `congestion_surcharge`, if the fleet records it.
    #[serde(default)]
    pub congestion_surcharge: Option<String>,
}

impl FieldMap {
    /// The source column mapped to a canonical field, if any.
    #[must_use]
    pub fn source_column(&self, field: CanonicalField) -> Option<&str> {
        match field {
            CanonicalField::PickupTime => Some(&self.pickup_time),
            CanonicalField::DropoffTime => Some(&self.dropoff_time),
            CanonicalField::PickupLoc => Some(&self.pickup_loc),
            CanonicalField::DropoffLoc => Some(&self.dropoff_loc),
            CanonicalField::TripDistance => self.trip_distance.as_deref(),
            CanonicalField::Fare => self.fare.as_deref(),
            CanonicalField::TotalAmount => self.total_amount.as_deref(),
            CanonicalField::CongestionSurcharge => self.congestion_surcharge.as_deref(),
        }
    }

    /// Canonical fields this fleet does not record.
    #[must_use]
    pub fn unmapped_fields(&self) -> Vec<CanonicalField> {
        CanonicalField::all()
            .iter()
            .copied()
            .filter(|field| self.source_column(*field).is_none())
            .collect()
    }
}

impl FleetDefinition {
    /// Raw partition file name for one year-month.
    #[must_use]
    pub fn raw_file_name(&self, year: i32, month: u32) -> String {
        self.raw_file_pattern
            .replace(YEAR_PLACEHOLDER, &year.to_string())
            .replace(MONTH_PLACEHOLDER, &format!("{month:02}"))
    }

    /// Parses a raw file name back into its year and month.
    ///
    /// Returns `None` when the name does not match this fleet's
    /// pattern, when either placeholder is absent from the pattern, or
    /// when the month is out of range.
    #[must_use]
    pub fn parse_raw_file_name(&self, name: &str) -> Option<(i32, u32)> {
        let year_idx = self.raw_file_pattern.find(YEAR_PLACEHOLDER)?;
        let month_idx = self.raw_file_pattern.find(MONTH_PLACEHOLDER)?;

        // The scheme puts the year first and keeps a separator between
        // the two placeholders.
        if month_idx <= year_idx + YEAR_PLACEHOLDER.len() {
            return None;
        }

        let prefix = &self.raw_file_pattern[..year_idx];
        let mid = &self.raw_file_pattern[year_idx + YEAR_PLACEHOLDER.len()..month_idx];
        let suffix = &self.raw_file_pattern[month_idx + MONTH_PLACEHOLDER.len()..];

        let rest = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
        let (year_str, month_str) = rest.split_once(mid)?;

        if year_str.len() != 4 || !year_str.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if month_str.len() != 2 || !month_str.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let year: i32 = year_str.parse().ok()?;
        let month: u32 = month_str.parse().ok()?;

        (1..=12).contains(&month).then_some((year, month))
    }

    /// The canonical partition key for one of this fleet's months.
    #[must_use]
    pub fn partition_key(&self, year: i32, month: u32) -> PartitionKey {
        PartitionKey::new(&self.id, year, month)
    }
}

/// Parses a [`FleetDefinition`] from TOML text.
///
/// # Errors
///
/// Returns an error string if the TOML is malformed or a required field
/// is missing.
pub fn parse_fleet_toml(toml_str: &str) -> Result<FleetDefinition, String> {
    toml::de::from_str(toml_str).map_err(|e| format!("Failed to parse fleet definition TOML: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_fleet() -> FleetDefinition {
        parse_fleet_toml(
            r#"
            id = "yellow"
            display_name = "Yellow Medallion"
            raw_file_pattern = "yellow_tripdata_{year}-{month:02}.parquet"

            [fields]
            pickup_time = "tpep_pickup_datetime"
            dropoff_time = "tpep_dropoff_datetime"
            pickup_loc = "PULocationID"
            dropoff_loc = "DOLocationID"
            fare = "fare_amount"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn parses_definition_with_partial_field_map() {
        let fleet = test_fleet();

        assert_eq!(fleet.id, "yellow");
        assert_eq!(
            fleet.fields.source_column(CanonicalField::PickupTime),
            Some("tpep_pickup_datetime")
        );
        assert_eq!(
            fleet.fields.source_column(CanonicalField::Fare),
            Some("fare_amount")
        );
        assert_eq!(
            fleet.fields.source_column(CanonicalField::TripDistance),
            None
        );
        assert_eq!(
            fleet.fields.unmapped_fields(),
            vec![
                CanonicalField::TripDistance,
                CanonicalField::TotalAmount,
                CanonicalField::CongestionSurcharge
            ]
        );
    }

    #[test]
    fn missing_core_column_is_a_parse_error() {
        let result = parse_fleet_toml(
            r#"
            id = "broken"
            display_name = "Broken"
            raw_file_pattern = "broken_{year}-{month:02}.parquet"

            [fields]
            pickup_time = "pickup"
            dropoff_time = "dropoff"
            pickup_loc = "pu"
            "#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn raw_file_name_substitutes_year_and_month() {
        let fleet = test_fleet();

        assert_eq!(
            fleet.raw_file_name(2025, 1),
            "yellow_tripdata_2025-01.parquet"
        );
        assert_eq!(
            fleet.raw_file_name(2023, 12),
            "yellow_tripdata_2023-12.parquet"
        );
    }

    #[test]
    fn raw_file_name_round_trips_through_the_parser() {
        let fleet = test_fleet();

        for (year, month) in [(2023, 12), (2024, 1), (2025, 6)] {
            let name = fleet.raw_file_name(year, month);
            assert_eq!(fleet.parse_raw_file_name(&name), Some((year, month)));
        }
    }

    #[test]
    fn parse_raw_file_name_rejects_foreign_names() {
        let fleet = test_fleet();

        assert_eq!(
            fleet.parse_raw_file_name("green_tripdata_2025-01.parquet"),
            None
        );
        assert_eq!(
            fleet.parse_raw_file_name("yellow_tripdata_2025-13.parquet"),
            None
        );
        assert_eq!(
            fleet.parse_raw_file_name("yellow_tripdata_25-01.parquet"),
            None
        );
        assert_eq!(fleet.parse_raw_file_name("yellow_tripdata_2025-01"), None);
    }

    #[test]
    fn partition_key_uses_the_fleet_id() {
        let key = test_fleet().partition_key(2025, 3);

        assert_eq!(key.to_string(), "yellow_2025-03");
    }
}
