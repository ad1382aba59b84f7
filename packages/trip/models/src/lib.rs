#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Canonical trip schema, anomaly taxonomy, and zone category types.
//!
//! Every fleet's raw partitions are normalized onto one canonical column
//! set. These types are the single source of truth for that schema and
//! for the enums downstream stages stamp onto each record.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Name of the fleet identity column attached during unification.
///
/// Raw partitions never carry this column; the unifier injects it as a
/// text literal so downstream stages never infer fleet from file names.
pub const FLEET_COLUMN: &str = "fleet";

/// Every canonical column name, trip fields first, fleet identity last.
///
/// This is the column set every unified partition must match exactly.
pub const CANONICAL_COLUMNS: &[&str] = &[
    "pickup_time",
    "dropoff_time",
    "pickup_loc",
    "dropoff_loc",
    "trip_distance",
    "fare",
    "total_amount",
    "congestion_surcharge",
    FLEET_COLUMN,
];

/// Storage discipline for a canonical trip field.
///
/// Drives the SQL cast applied when a raw column is mapped onto the
/// canonical schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Event timestamps.
    Timestamp,
    /// Integer zone identifiers.
    Location,
    /// Distances and monetary amounts.
    Measure,
}

impl FieldKind {
    /// The SQL type raw values of this kind are cast to.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Timestamp => "TIMESTAMP",
            Self::Location => "INTEGER",
            Self::Measure => "DOUBLE",
        }
    }
}

/// The eight mapped trip fields of the canonical schema.
///
/// Fleet field maps are keyed by these; the fleet identity column is
/// separate because it is injected, never mapped.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CanonicalField {
    /// Trip start timestamp.
    PickupTime,
    /// Trip end timestamp.
    DropoffTime,
    /// Zone id where the trip began.
    PickupLoc,
    /// Zone id where the trip ended.
    DropoffLoc,
    /// Odometer distance in miles.
    TripDistance,
    /// Metered fare in dollars.
    Fare,
    /// Total charged amount in dollars.
    TotalAmount,
    /// Congestion surcharge component in dollars.
    CongestionSurcharge,
}

impl CanonicalField {
    /// All mapped fields in canonical column order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::PickupTime,
            Self::DropoffTime,
            Self::PickupLoc,
            Self::DropoffLoc,
            Self::TripDistance,
            Self::Fare,
            Self::TotalAmount,
            Self::CongestionSurcharge,
        ]
    }

    /// The canonical column name for this field.
    #[must_use]
    pub const fn column_name(self) -> &'static str {
        match self {
            Self::PickupTime => "pickup_time",
            Self::DropoffTime => "dropoff_time",
            Self::PickupLoc => "pickup_loc",
            Self::DropoffLoc => "dropoff_loc",
            Self::TripDistance => "trip_distance",
            Self::Fare => "fare",
            Self::TotalAmount => "total_amount",
            Self::CongestionSurcharge => "congestion_surcharge",
        }
    }

    /// The storage discipline for this field.
    #[must_use]
    pub const fn kind(self) -> FieldKind {
        match self {
            Self::PickupTime | Self::DropoffTime => FieldKind::Timestamp,
            Self::PickupLoc | Self::DropoffLoc => FieldKind::Location,
            Self::TripDistance | Self::Fare | Self::TotalAmount | Self::CongestionSurcharge => {
                FieldKind::Measure
            }
        }
    }

    /// Whether a null in this field invalidates the whole record.
    ///
    /// Rows missing any core field are dropped at unification; the
    /// measure fields may legitimately be null.
    #[must_use]
    pub const fn is_core(self) -> bool {
        matches!(
            self,
            Self::PickupTime | Self::DropoffTime | Self::PickupLoc | Self::DropoffLoc
        )
    }
}

/// Outcome of the anomaly classification cascade for one record.
///
/// Exactly one status per record, assigned by the first matching rule
/// in a fixed priority order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyStatus {
    /// Implied velocity above the plausible ceiling.
    ExcessiveVelocity,
    /// Sub-minute trip billed above the short-trip fare cap.
    FinancialOutlier,
    /// Fare charged with no meaningful movement.
    SpatialAnomaly,
    /// Non-positive trip duration.
    TemporalError,
    /// Negative fare or total amount.
    NegativeRevenue,
    /// Passed every rule.
    Verified,
}

impl AnomalyStatus {
    /// All statuses in cascade priority order, `Verified` last.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::ExcessiveVelocity,
            Self::FinancialOutlier,
            Self::SpatialAnomaly,
            Self::TemporalError,
            Self::NegativeRevenue,
            Self::Verified,
        ]
    }

    /// Whether records with this status are excluded from the verified
    /// stream.
    #[must_use]
    pub const fn is_anomalous(self) -> bool {
        !matches!(self, Self::Verified)
    }
}

/// Spatial relation of a trip to the policy zone.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ZoneCategory {
    /// Both endpoints inside the policy zone.
    InsideZone,
    /// Dropoff inside, pickup outside.
    EnteringZone,
    /// Pickup inside, dropoff outside.
    ExitingZone,
    /// Neither endpoint inside.
    OutsideZone,
}

impl ZoneCategory {
    /// All categories.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::InsideZone,
            Self::EnteringZone,
            Self::ExitingZone,
            Self::OutsideZone,
        ]
    }

    /// Categorizes a trip by policy-zone membership of its endpoints.
    #[must_use]
    pub const fn from_endpoints(pickup_in_zone: bool, dropoff_in_zone: bool) -> Self {
        match (pickup_in_zone, dropoff_in_zone) {
            (true, true) => Self::InsideZone,
            (false, true) => Self::EnteringZone,
            (true, false) => Self::ExitingZone,
            (false, false) => Self::OutsideZone,
        }
    }

    /// Whether trips in this category cross the zone boundary and owe
    /// the toll.
    #[must_use]
    pub const fn is_toll_liable(self) -> bool {
        matches!(self, Self::EnteringZone | Self::ExitingZone)
    }
}

/// Identity of one fleet-month partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Fleet identifier, e.g. `yellow`.
    pub fleet: String,
    /// Calendar year.
    pub year: i32,
    /// Calendar month, 1 through 12.
    pub month: u32,
}

impl PartitionKey {
    /// Creates a key for one fleet-month.
    #[must_use]
    pub fn new(fleet: impl Into<String>, year: i32, month: u32) -> Self {
        Self {
            fleet: fleet.into(),
            year,
            month,
        }
    }

    /// Canonical artifact file name for this partition.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{self}.parquet")
    }

    /// File name of the provenance manifest written next to a
    /// synthetic partition.
    #[must_use]
    pub fn manifest_file_name(&self) -> String {
        format!("{self}.manifest.json")
    }

    /// Parses `{fleet}_{year}-{month:02}.parquet` back into a key.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPartitionName`] if the name does not follow the
    /// partition naming scheme or the month is out of range.
    pub fn parse(file_name: &str) -> Result<Self, InvalidPartitionName> {
        let invalid = || InvalidPartitionName {
            name: file_name.to_string(),
        };

        let stem = file_name.strip_suffix(".parquet").ok_or_else(invalid)?;
        // Fleet ids may contain underscores; the year-month suffix never does.
        let (fleet, stamp) = stem.rsplit_once('_').ok_or_else(invalid)?;
        let (year, month) = stamp.split_once('-').ok_or_else(invalid)?;

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;

        if fleet.is_empty() || !(1..=12).contains(&month) {
            return Err(invalid());
        }

        Ok(Self {
            fleet: fleet.to_string(),
            year,
            month,
        })
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}-{:02}", self.fleet, self.year, self.month)
    }
}

/// Error returned when a partition file name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPartitionName {
    /// The file name that failed to parse.
    pub name: String,
}

impl fmt::Display for InvalidPartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid partition file name: {}", self.name)
    }
}

impl std::error::Error for InvalidPartitionName {}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn canonical_columns_cover_all_fields_plus_fleet() {
        assert_eq!(CANONICAL_COLUMNS.len(), CanonicalField::all().len() + 1);

        for (field, column) in CanonicalField::all().iter().zip(CANONICAL_COLUMNS) {
            assert_eq!(field.column_name(), *column);
        }

        assert_eq!(CANONICAL_COLUMNS.last(), Some(&FLEET_COLUMN));
    }

    #[test]
    fn core_fields_are_the_four_identity_columns() {
        let core: Vec<&str> = CanonicalField::all()
            .iter()
            .filter(|f| f.is_core())
            .map(|f| f.column_name())
            .collect();

        assert_eq!(
            core,
            vec!["pickup_time", "dropoff_time", "pickup_loc", "dropoff_loc"]
        );
    }

    #[test]
    fn field_kinds_map_to_sql_types() {
        assert_eq!(CanonicalField::PickupTime.kind().sql_type(), "TIMESTAMP");
        assert_eq!(CanonicalField::DropoffLoc.kind().sql_type(), "INTEGER");
        assert_eq!(CanonicalField::Fare.kind().sql_type(), "DOUBLE");
        assert_eq!(
            CanonicalField::CongestionSurcharge.kind().sql_type(),
            "DOUBLE"
        );
    }

    #[test]
    fn anomaly_status_display_names() {
        assert_eq!(
            AnomalyStatus::ExcessiveVelocity.to_string(),
            "EXCESSIVE_VELOCITY"
        );
        assert_eq!(AnomalyStatus::NegativeRevenue.to_string(), "NEGATIVE_REVENUE");
        assert_eq!(AnomalyStatus::Verified.to_string(), "VERIFIED");
    }

    #[test]
    fn anomaly_status_parses_from_wire_name() {
        assert_eq!(
            AnomalyStatus::from_str("FINANCIAL_OUTLIER").unwrap(),
            AnomalyStatus::FinancialOutlier
        );
        assert!(AnomalyStatus::from_str("financial_outlier").is_err());
    }

    #[test]
    fn verified_is_not_anomalous() {
        for status in AnomalyStatus::all() {
            assert_eq!(
                status.is_anomalous(),
                *status != AnomalyStatus::Verified,
                "{status}"
            );
        }
    }

    #[test]
    fn zone_category_from_endpoints() {
        assert_eq!(
            ZoneCategory::from_endpoints(true, true),
            ZoneCategory::InsideZone
        );
        assert_eq!(
            ZoneCategory::from_endpoints(false, true),
            ZoneCategory::EnteringZone
        );
        assert_eq!(
            ZoneCategory::from_endpoints(true, false),
            ZoneCategory::ExitingZone
        );
        assert_eq!(
            ZoneCategory::from_endpoints(false, false),
            ZoneCategory::OutsideZone
        );
    }

    #[test]
    fn only_boundary_crossings_are_toll_liable() {
        assert!(ZoneCategory::EnteringZone.is_toll_liable());
        assert!(ZoneCategory::ExitingZone.is_toll_liable());
        assert!(!ZoneCategory::InsideZone.is_toll_liable());
        assert!(!ZoneCategory::OutsideZone.is_toll_liable());
    }

    #[test]
    fn zone_category_display_names() {
        assert_eq!(ZoneCategory::EnteringZone.to_string(), "entering_zone");
        assert_eq!(ZoneCategory::OutsideZone.to_string(), "outside_zone");
    }

    #[test]
    fn partition_key_file_name_round_trips() {
        let key = PartitionKey::new("yellow", 2025, 1);

        assert_eq!(key.file_name(), "yellow_2025-01.parquet");
        assert_eq!(PartitionKey::parse(&key.file_name()).unwrap(), key);
    }

    #[test]
    fn partition_key_fleet_may_contain_underscores() {
        let key = PartitionKey::parse("for_hire_2024-12.parquet").unwrap();

        assert_eq!(key.fleet, "for_hire");
        assert_eq!(key.year, 2024);
        assert_eq!(key.month, 12);
    }

    #[test]
    fn partition_key_rejects_malformed_names() {
        assert!(PartitionKey::parse("zones.parquet").is_err());
        assert!(PartitionKey::parse("yellow_2025-01").is_err());
        assert!(PartitionKey::parse("yellow_2025-13.parquet").is_err());
        assert!(PartitionKey::parse("yellow_2025-00.parquet").is_err());
        assert!(PartitionKey::parse("_2025-01.parquet").is_err());
    }

    #[test]
    fn manifest_file_name_matches_partition_stem() {
        let key = PartitionKey::new("green", 2025, 12);

        assert_eq!(key.manifest_file_name(), "green_2025-12.manifest.json");
    }
}
