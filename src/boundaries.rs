use std::{collections::BTreeSet, fs, path::Path};

use geojson::{Feature, GeoJson};
use tracing::debug;

use crate::{ClinicMapError, dataset::Dataset};

/// Read a district boundary file and return the district name of each feature
pub fn load_district_names(path: &Path) -> Result<Vec<String>, ClinicMapError> {
    debug!("reading district boundaries from {}", path.display());
    let contents = fs::read_to_string(path)?;
    let geojson: GeoJson = contents.parse()?;
    Ok(district_names(&geojson))
}

/// District names from a boundary document, in feature order. Each feature's
/// name comes from its `dtname` property, then `name`, then "Unknown".
pub fn district_names(geojson: &GeoJson) -> Vec<String> {
    match geojson {
        GeoJson::FeatureCollection(collection) => {
            collection.features.iter().map(feature_name).collect()
        }
        GeoJson::Feature(feature) => vec![feature_name(feature)],
        GeoJson::Geometry(_) => vec![],
    }
}

fn feature_name(feature: &Feature) -> String {
    ["dtname", "name"]
        .iter()
        .find_map(|key| feature.property(key).and_then(|v| v.as_str()))
        .unwrap_or("Unknown")
        .to_string()
}

/// How the dataset's districts line up with the boundary polygons
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DistrictMatch {
    /// Districts that have both clinics and a polygon
    pub matched: Vec<String>,
    /// Districts with clinics but no polygon
    pub without_boundary: Vec<String>,
    /// Polygons with no clinics
    pub without_clinics: Vec<String>,
}

/// Compare district names exactly; names are never normalized
pub fn match_districts(dataset: &Dataset, boundary_names: &[String]) -> DistrictMatch {
    let boundaries: BTreeSet<&str> = boundary_names.iter().map(String::as_str).collect();
    let mut result = DistrictMatch::default();
    for (district, _) in dataset.districts() {
        if boundaries.contains(district) {
            result.matched.push(district.to_string());
        } else {
            result.without_boundary.push(district.to_string());
        }
    }
    result.without_clinics = boundaries
        .into_iter()
        .filter(|name| !dataset.has_district(name))
        .map(str::to_string)
        .collect();
    result
}

#[cfg(test)]
const BOUNDARIES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"dtname": "Amritsar"},
     "geometry": {"type": "Polygon", "coordinates": [[[74.5, 31.5], [75.0, 31.5], [75.0, 32.0], [74.5, 31.5]]]}},
    {"type": "Feature", "properties": {"name": "Pathankot"},
     "geometry": {"type": "Polygon", "coordinates": [[[75.5, 32.2], [75.8, 32.2], [75.8, 32.5], [75.5, 32.2]]]}},
    {"type": "Feature", "properties": {"area": 12.5},
     "geometry": null}
  ]
}"#;

#[test]
fn test_district_names() {
    let geojson: GeoJson = BOUNDARIES.parse().unwrap();
    assert_eq!(
        district_names(&geojson),
        vec!["Amritsar", "Pathankot", "Unknown"]
    );
}

#[test]
fn test_match_districts() {
    let geojson: GeoJson = BOUNDARIES.parse().unwrap();
    let dataset = Dataset::from_json(
        r#"{"clinics": [
            {"sn": 1, "district": "Amritsar", "name": "Ajnala", "latitude": 31.84, "longitude": 74.76},
            {"sn": 2, "district": "Bathinda", "name": "Rampura", "latitude": 30.25, "longitude": 75.24}
        ]}"#,
    )
    .unwrap();
    let report = match_districts(&dataset, &district_names(&geojson));
    assert_eq!(report.matched, vec!["Amritsar"]);
    assert_eq!(report.without_boundary, vec!["Bathinda"]);
    assert_eq!(report.without_clinics, vec!["Pathankot", "Unknown"]);
}

#[test]
fn test_invalid_boundaries() {
    let path = std::env::temp_dir().join("clinic-map-invalid-boundaries.geojson");
    fs::write(&path, "{\"type\": \"Nonsense\"}").unwrap();
    assert!(matches!(
        load_district_names(&path),
        Err(ClinicMapError::InvalidGeoJson(_))
    ));
    let _ = fs::remove_file(&path);
}
