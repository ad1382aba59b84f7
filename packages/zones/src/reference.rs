//! Zone reference loading and Policy Zone Set derivation.
//!
//! The reference is a `GeoJSON` `FeatureCollection` of taxi zone
//! polygons carrying `location_id`, `zone`, and `borough` properties.
//! Features missing a property or carrying non-areal geometry are
//! skipped with a warning rather than failing the load.

use std::path::Path;

use geo::MultiPolygon;
use geojson::{Feature, GeoJson};
use toll_audit_config::PolicyConfig;

use crate::ZoneError;

/// One taxi zone from the reference: attributes plus its boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ZonePolygon {
    pub location_id: i64,
    pub zone: String,
    pub borough: String,
    pub boundary: MultiPolygon<f64>,
}

/// Loads every usable zone polygon from the reference file.
///
/// # Errors
///
/// * If the file is missing or unreadable
/// * If the contents are not a `GeoJSON` `FeatureCollection`
pub fn load_zone_reference(path: &Path) -> Result<Vec<ZonePolygon>, ZoneError> {
    if !path.exists() {
        return Err(ZoneError::Reference(format!(
            "zone reference missing: {}",
            path.display()
        )));
    }

    let contents = std::fs::read_to_string(path)?;
    let geojson: GeoJson = contents.parse()?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(ZoneError::Reference(
            "zone reference is not a FeatureCollection".to_string(),
        ));
    };

    let total = collection.features.len();
    let zones: Vec<ZonePolygon> = collection
        .features
        .into_iter()
        .enumerate()
        .filter_map(|(index, feature)| {
            let zone = zone_polygon(feature);
            if zone.is_none() {
                log::warn!(
                    "Skipping zone feature {index}: missing attributes or non-areal geometry"
                );
            }
            zone
        })
        .collect();

    log::info!(
        "Loaded {} of {total} zone polygons from {}",
        zones.len(),
        path.display()
    );
    Ok(zones)
}

fn zone_polygon(feature: Feature) -> Option<ZonePolygon> {
    let props = feature.properties.as_ref()?;

    let location_id = property_i64(props.get("location_id")?)?;
    let zone = property_text(props.get("zone")?)?;
    let borough = property_text(props.get("borough")?)?;

    let geometry = feature.geometry?;
    let geo_geometry: geo::Geometry<f64> = geometry.try_into().ok()?;
    let boundary = match geo_geometry {
        geo::Geometry::MultiPolygon(mp) => mp,
        geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
        _ => return None,
    };

    Some(ZonePolygon {
        location_id,
        zone,
        borough,
        boundary,
    })
}

/// Zone ids arrive as numbers from some exports and as numeric strings
/// from others.
fn property_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn property_text(value: &serde_json::Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Derives the Policy Zone Set: zones in the policy borough whose name
/// contains any configured neighborhood, case-insensitively.
#[must_use]
pub fn derive_policy_zones(zones: &[ZonePolygon], policy: &PolicyConfig) -> Vec<ZonePolygon> {
    zones
        .iter()
        .filter(|z| {
            z.borough == policy.borough && matches_neighborhood(&z.zone, &policy.neighborhoods)
        })
        .cloned()
        .collect()
}

fn matches_neighborhood(zone: &str, neighborhoods: &[String]) -> bool {
    let lowered = zone.to_lowercase();
    neighborhoods
        .iter()
        .any(|n| lowered.contains(&n.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use geo::MultiPolygon;
    use toll_audit_config::PolicyConfig;

    use super::{ZonePolygon, derive_policy_zones, load_zone_reference, matches_neighborhood};
    use crate::ZoneError;

    fn zone(location_id: i64, name: &str, borough: &str) -> ZonePolygon {
        ZonePolygon {
            location_id,
            zone: name.to_string(),
            borough: borough.to_string(),
            boundary: MultiPolygon(Vec::new()),
        }
    }

    fn scratch_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir()
            .join(format!("toll-audit-zones-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn derivation_filters_by_borough_and_name() {
        let zones = vec![
            zone(4, "Alphabet City", "Manhattan"),
            zone(13, "Battery Park", "Manhattan"),
            zone(33, "Brooklyn Heights", "Brooklyn"),
            zone(161, "Midtown Center", "Manhattan"),
            zone(166, "Morningside Heights", "Manhattan"),
        ];

        let policy = PolicyConfig::default();
        let derived = derive_policy_zones(&zones, &policy);
        let ids: Vec<i64> = derived.iter().map(|z| z.location_id).collect();

        assert_eq!(ids, vec![13, 161]);
    }

    #[test]
    fn name_matching_is_case_insensitive_substring() {
        let neighborhoods = vec!["Greenwich".to_string(), "SoHo".to_string()];

        assert!(matches_neighborhood("Greenwich Village South", &neighborhoods));
        assert!(matches_neighborhood("SOHO", &neighborhoods));
        assert!(matches_neighborhood("West Soho Industrial", &neighborhoods));
        assert!(!matches_neighborhood("Harlem", &neighborhoods));
    }

    #[test]
    fn loader_keeps_areal_features_and_skips_the_rest() {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"location_id": 13, "zone": "Battery Park", "borough": "Manhattan"},
                    "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]}
                },
                {
                    "type": "Feature",
                    "properties": {"location_id": 161, "borough": "Manhattan"},
                    "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]}
                },
                {
                    "type": "Feature",
                    "properties": {"location_id": 90, "zone": "Flatiron", "borough": "Manhattan"},
                    "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}
                },
                {
                    "type": "Feature",
                    "properties": {"location_id": "234", "zone": "Union Sq", "borough": "Manhattan"},
                    "geometry": {"type": "MultiPolygon", "coordinates": [[[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 0.0]]]]}
                }
            ]
        }"#;
        let path = scratch_file("reference.geojson", geojson);

        let zones = load_zone_reference(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].location_id, 13);
        assert_eq!(zones[0].boundary.0.len(), 1);
        assert_eq!(zones[1].location_id, 234);
        assert_eq!(zones[1].zone, "Union Sq");
    }

    #[test]
    fn loader_rejects_non_collection_documents() {
        let path = scratch_file(
            "point.geojson",
            r#"{"type": "Point", "coordinates": [0.0, 0.0]}"#,
        );

        let result = load_zone_reference(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ZoneError::Reference(_))));
    }

    #[test]
    fn loader_reports_a_missing_reference() {
        let path = std::env::temp_dir().join("toll-audit-zones-definitely-absent.geojson");
        assert!(matches!(
            load_zone_reference(&path),
            Err(ZoneError::Reference(_))
        ));
    }
}
