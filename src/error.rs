use std::{error::Error, fmt::Display, io};

use crate::dataset::ClinicId;

#[derive(Debug)]
/// Indicates a dataset validation failure or wraps a lower-level error
pub enum ClinicMapError {
    /// Failed to read a dataset, boundary, config, or event script file
    ReadFailed(io::Error),
    /// The dataset document is not valid JSON or doesn't have the expected shape
    InvalidJson(serde_json::Error),
    /// The district boundary file is not valid GeoJSON
    InvalidGeoJson(geojson::Error),
    /// The config file is not valid TOML or doesn't have the expected shape
    InvalidConfig(toml::de::Error),
    /// Two clinic records share the same sequence number
    DuplicateClinic(ClinicId),
    /// A clinic's coordinates are not finite or fall outside the valid ranges
    InvalidCoordinate {
        sn: ClinicId,
        latitude: f64,
        longitude: f64,
    },
    /// The precomputed district grouping disagrees with the flat clinic list
    InconsistentGrouping(String),
    /// A replay script line couldn't be parsed into an event
    InvalidEvent(String),
}

impl Display for ClinicMapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClinicMapError::ReadFailed(e) => write!(f, "Failed to read input: {}", e),
            ClinicMapError::InvalidJson(e) => write!(f, "Failed to parse clinic data: {}", e),
            ClinicMapError::InvalidGeoJson(e) => {
                write!(f, "Failed to parse district boundaries: {}", e)
            }
            ClinicMapError::InvalidConfig(e) => write!(f, "Failed to parse config: {}", e),
            ClinicMapError::DuplicateClinic(sn) => {
                write!(f, "Clinic {} appears more than once in the dataset", sn)
            }
            ClinicMapError::InvalidCoordinate {
                sn,
                latitude,
                longitude,
            } => write!(
                f,
                "Clinic {} has invalid coordinates: expected latitude in [-90, 90] and longitude in [-180, 180], but got ({}, {})",
                sn, latitude, longitude
            ),
            ClinicMapError::InconsistentGrouping(s) => {
                write!(f, "District grouping doesn't match clinic list: {}", s)
            }
            ClinicMapError::InvalidEvent(s) => write!(f, "Failed to parse event: {}", s),
        }
    }
}

impl Error for ClinicMapError {}

impl From<io::Error> for ClinicMapError {
    fn from(value: io::Error) -> Self {
        ClinicMapError::ReadFailed(value)
    }
}

impl From<serde_json::Error> for ClinicMapError {
    fn from(value: serde_json::Error) -> Self {
        ClinicMapError::InvalidJson(value)
    }
}

impl From<geojson::Error> for ClinicMapError {
    fn from(value: geojson::Error) -> Self {
        ClinicMapError::InvalidGeoJson(value)
    }
}

impl From<toml::de::Error> for ClinicMapError {
    fn from(value: toml::de::Error) -> Self {
        ClinicMapError::InvalidConfig(value)
    }
}
