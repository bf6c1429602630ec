//! Clinic locations, counsellor rosters, and the filter/selection model that
//! drives a clinic map.
//!
//! The pieces, leaf first:
//!
//! - [`geomath`]: great-circle distances and same-district neighbour ranking
//! - [`palette`]: the status and designation colour tables
//! - [`filter`]: [`FilterState`] and the marker colour, counsellor, and legend
//!   derivations built on it
//! - [`dataset`]: loading and validating the static clinic dataset
//! - [`render`]: plain render models and their GeoJSON and text forms
//! - [`session`]: the one mutable slot, updated one [`Event`] at a time

pub mod boundaries;
pub mod config;
pub mod dataset;
mod error;
pub mod filter;
pub mod geomath;
pub mod palette;
pub mod render;
pub mod session;

pub use config::AppConfig;
pub use dataset::{Clinic, ClinicId, Counsellor, Dataset, DatasetFile, Metadata, Status};
pub use error::ClinicMapError;
pub use filter::FilterState;
pub use geomath::{format_distance, haversine_distance, haversine_km, rank_district_neighbors};
pub use session::{Event, Session};
