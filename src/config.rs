use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ClinicMapError;

/// Optional TOML configuration; every field has a default
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub map: MapConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub dataset: PathBuf,
    pub boundaries: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            dataset: PathBuf::from("data/clinics.json"),
            boundaries: PathBuf::from("data/punjab_districts.geojson"),
        }
    }
}

/// Initial view handed to whatever draws the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct MapConfig {
    /// (latitude, longitude) in degrees
    pub center: [f64; 2],
    pub zoom: u8,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            center: [31.1471, 75.3412],
            zoom: 8,
            min_zoom: 7,
            max_zoom: 18,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ClinicMapError> {
        debug!("reading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(input: &str) -> Result<Self, ClinicMapError> {
        Ok(toml::from_str(input)?)
    }
}

#[test]
fn test_defaults() {
    let config = AppConfig::from_toml("").unwrap();
    assert_eq!(config, AppConfig::default());
    assert_eq!(config.input.dataset, PathBuf::from("data/clinics.json"));
    assert_eq!(config.map.zoom, 8);
}

#[test]
fn test_partial_config() {
    let config = AppConfig::from_toml(
        r#"
        [input]
        dataset = "/srv/clinics/latest.json"

        [map]
        center = [30.9, 75.85]
        max_zoom = 16
        "#,
    )
    .unwrap();
    assert_eq!(config.input.dataset, PathBuf::from("/srv/clinics/latest.json"));
    assert_eq!(
        config.input.boundaries,
        PathBuf::from("data/punjab_districts.geojson")
    );
    assert_eq!(config.map.center, [30.9, 75.85]);
    assert_eq!(config.map.zoom, 8);
    assert_eq!(config.map.max_zoom, 16);
}

#[test]
fn test_invalid_config() {
    assert!(matches!(
        AppConfig::from_toml("[map]\nzoom = \"close\""),
        Err(ClinicMapError::InvalidConfig(_))
    ));
}
