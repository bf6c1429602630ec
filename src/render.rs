//! Plain-data render models for whatever draws the map, plus GeoJSON and text
//! renderings of them. Nothing in here holds state; every function derives its
//! output from the dataset and a [`FilterState`].

use std::fmt::Display;

use geo::{BoundingRect, LineString, MultiPoint, Point};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use serde::Serialize;

use crate::{
    ClinicMapError,
    config::MapConfig,
    dataset::{Clinic, ClinicId, Counsellor, Dataset, Status},
    filter::{FilterState, Legend, derive_legend, derive_marker_color, derive_visible_counsellors},
    geomath::{format_distance, rank_district_neighbors},
    palette::{self, Color},
};

const MARKER_RADIUS: u8 = 8;
const SELECTED_MARKER_RADIUS: u8 = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounsellorLine<'a> {
    pub name: &'a str,
    pub designation: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<&'a str>,
    pub color: Color,
}

impl<'a> From<&'a Counsellor> for CounsellorLine<'a> {
    fn from(counsellor: &'a Counsellor) -> Self {
        CounsellorLine {
            name: &counsellor.name,
            designation: &counsellor.designation,
            contact: counsellor.contact.as_deref(),
            color: palette::designation_color(&counsellor.designation),
        }
    }
}

fn counsellor_lines<'a>(clinic: &'a Clinic, state: &FilterState) -> Vec<CounsellorLine<'a>> {
    derive_visible_counsellors(clinic, state)
        .into_iter()
        .map(CounsellorLine::from)
        .collect()
}

/// What a marker popup shows
#[derive(Debug, Clone, PartialEq)]
pub struct PopupContent<'a> {
    pub name: &'a str,
    pub district: &'a str,
    pub status: Status,
    pub counsellors: Vec<CounsellorLine<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerInstruction<'a> {
    pub sn: ClinicId,
    pub position: Point<f64>,
    pub fill_color: Color,
    pub radius: u8,
    pub selected: bool,
    pub popup: PopupContent<'a>,
}

pub fn marker_instruction<'a>(clinic: &'a Clinic, state: &FilterState) -> MarkerInstruction<'a> {
    let selected = state.selected() == Some(clinic.sn);
    MarkerInstruction {
        sn: clinic.sn,
        position: clinic.location(),
        fill_color: if selected {
            palette::SELECTED
        } else {
            derive_marker_color(clinic, state)
        },
        radius: if selected {
            SELECTED_MARKER_RADIUS
        } else {
            MARKER_RADIUS
        },
        selected,
        popup: PopupContent {
            name: &clinic.name,
            district: &clinic.district,
            status: clinic.status,
            counsellors: counsellor_lines(clinic, state),
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeighborEntry<'a> {
    /// 1-based position in the ranking
    pub rank: usize,
    pub peer: &'a Clinic,
    pub distance_km: f64,
    pub formatted: String,
}

/// Sidebar contents for the selected clinic
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPanel<'a> {
    pub clinic: &'a Clinic,
    pub neighbors: Vec<NeighborEntry<'a>>,
    pub counsellors: Vec<CounsellorLine<'a>>,
}

/// Build the sidebar for the selected clinic, or `None` if nothing is
/// selected or the selection isn't in the dataset. Neighbours are ranked over
/// the whole dataset, not just the clinics currently on screen.
pub fn selection_panel<'a>(dataset: &'a Dataset, state: &FilterState) -> Option<SelectionPanel<'a>> {
    let clinic = dataset.clinic(state.selected()?)?;
    let neighbors = rank_district_neighbors(clinic, dataset.clinics())
        .into_iter()
        .enumerate()
        .map(|(idx, neighbor)| NeighborEntry {
            rank: idx + 1,
            peer: neighbor.clinic,
            distance_km: neighbor.distance_km(),
            formatted: format_distance(neighbor.distance_km()),
        })
        .collect();
    Some(SelectionPanel {
        clinic,
        neighbors,
        counsellors: counsellor_lines(clinic, state),
    })
}

/// A dashed line from the selected clinic to one of its ranked neighbours
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceLine {
    pub line: LineString<f64>,
    pub distance_km: f64,
    pub label: String,
    pub opacity: f64,
}

/// Nearer neighbours get more opaque lines, bottoming out at 0.15
pub fn line_opacity(index: usize) -> f64 {
    (0.6 - index as f64 * 0.03).max(0.15)
}

pub fn distance_lines(panel: &SelectionPanel) -> Vec<DistanceLine> {
    let origin = panel.clinic.location();
    panel
        .neighbors
        .iter()
        .enumerate()
        .map(|(idx, entry)| DistanceLine {
            line: LineString::from(vec![origin, entry.peer.location()]),
            distance_km: entry.distance_km,
            label: entry.formatted.clone(),
            opacity: line_opacity(idx),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: usize,
    pub functional: usize,
    /// Everything that isn't functional, matching the two-way marker colouring
    pub non_functional: usize,
}

pub fn stats<'a>(clinics: impl IntoIterator<Item = &'a Clinic>) -> Stats {
    let mut stats = Stats::default();
    for clinic in clinics {
        stats.total += 1;
        if clinic.status == Status::Functional {
            stats.functional += 1;
        }
    }
    stats.non_functional = stats.total - stats.functional;
    stats
}

/// Clinics on screen: everything, or just one district. An unknown district
/// shows nothing.
pub fn visible_clinics<'a>(dataset: &'a Dataset, district: Option<&str>) -> Vec<&'a Clinic> {
    match district {
        Some(district) => dataset.district(district).collect(),
        None => dataset.clinics().iter().collect(),
    }
}

/// Everything needed to draw one state of the map
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<'a> {
    pub markers: Vec<MarkerInstruction<'a>>,
    pub legend: Legend,
    pub stats: Stats,
    pub panel: Option<SelectionPanel<'a>>,
    pub lines: Vec<DistanceLine>,
}

pub fn render_frame<'a>(
    dataset: &'a Dataset,
    state: &FilterState,
    district: Option<&str>,
) -> Frame<'a> {
    let visible = visible_clinics(dataset, district);
    let markers = visible
        .iter()
        .map(|&clinic| marker_instruction(clinic, state))
        .collect();
    let panel = selection_panel(dataset, state);
    let lines = panel.as_ref().map(distance_lines).unwrap_or_default();
    Frame {
        markers,
        legend: derive_legend(state),
        stats: stats(visible),
        panel,
        lines,
    }
}

impl Frame<'_> {
    /// Bounds of the visible clinics as [min lon, min lat, max lon, max lat]
    pub fn bbox(&self) -> Option<Vec<f64>> {
        let points: MultiPoint<f64> = self.markers.iter().map(|m| m.position).collect();
        points
            .bounding_rect()
            .map(|rect| vec![rect.min().x, rect.min().y, rect.max().x, rect.max().y])
    }

    /// A feature collection with one point per marker and one line per
    /// neighbour of the selected clinic. The legend, stats, and initial map
    /// view ride along as foreign members.
    pub fn to_geojson(&self, map: &MapConfig) -> Result<GeoJson, ClinicMapError> {
        let mut features: Vec<Feature> =
            Vec::with_capacity(self.markers.len() + self.lines.len());
        for marker in self.markers.iter() {
            let mut properties = JsonObject::new();
            properties.insert("sn".to_string(), JsonValue::from(marker.sn.0));
            properties.insert("name".to_string(), JsonValue::from(marker.popup.name));
            properties.insert(
                "district".to_string(),
                JsonValue::from(marker.popup.district),
            );
            properties.insert(
                "status".to_string(),
                JsonValue::from(marker.popup.status.to_string()),
            );
            properties.insert(
                "fillColor".to_string(),
                JsonValue::from(marker.fill_color.0),
            );
            properties.insert("radius".to_string(), JsonValue::from(marker.radius));
            properties.insert("selected".to_string(), JsonValue::from(marker.selected));
            properties.insert(
                "counsellors".to_string(),
                serde_json::to_value(&marker.popup.counsellors)?,
            );
            features.push(Feature {
                geometry: Some((&marker.position).into()),
                properties: Some(properties),
                ..Default::default()
            });
        }
        for line in self.lines.iter() {
            let mut properties = JsonObject::new();
            properties.insert("distanceKm".to_string(), JsonValue::from(line.distance_km));
            properties.insert("label".to_string(), JsonValue::from(line.label.as_str()));
            properties.insert(
                "color".to_string(),
                JsonValue::from(palette::DISTANCE_LINE.0),
            );
            properties.insert("opacity".to_string(), JsonValue::from(line.opacity));
            features.push(Feature {
                geometry: Some((&line.line).into()),
                properties: Some(properties),
                ..Default::default()
            });
        }

        let mut foreign_members = JsonObject::new();
        foreign_members.insert(
            "map".to_string(),
            serde_json::to_value(map)?,
        );
        foreign_members.insert(
            "legend".to_string(),
            serde_json::to_value(&self.legend)?,
        );
        foreign_members.insert(
            "stats".to_string(),
            serde_json::to_value(self.stats)?,
        );

        Ok(GeoJson::FeatureCollection(FeatureCollection {
            bbox: self.bbox(),
            features,
            foreign_members: Some(foreign_members),
        }))
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Clinics | Functional: {} | Non-Functional: {}",
            self.total, self.functional, self.non_functional
        )
    }
}

impl Display for CounsellorLine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.designation)?;
        if let Some(contact) = self.contact {
            write!(f, ", {}", contact)?;
        }
        Ok(())
    }
}

impl Display for SelectionPanel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clinic = self.clinic;
        writeln!(f, "{} [{}]", clinic.name, clinic.sn)?;
        writeln!(f, "District:     {}", clinic.district)?;
        writeln!(f, "Status:       {}", clinic.status)?;
        writeln!(
            f,
            "Coordinates:  {:.4}, {:.4}",
            clinic.latitude, clinic.longitude
        )?;
        if !self.counsellors.is_empty() {
            writeln!(f, "Counsellors / POCs:")?;
            for counsellor in self.counsellors.iter() {
                writeln!(f, "  {}", counsellor)?;
            }
        }
        write!(f, "Distances within {}:", clinic.district)?;
        if self.neighbors.is_empty() {
            write!(f, "\n  No other clinics in this district.")?;
        }
        for entry in self.neighbors.iter() {
            write!(
                f,
                "\n  {: >3}. {} [{}] {: >12}",
                entry.rank, entry.peer.name, entry.peer.status, entry.formatted
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
const DATASET: &str = r#"{"clinics": [
    {"sn": 1, "district": "Amritsar", "name": "Ajnala", "latitude": 31.84, "longitude": 74.76,
     "status": "Functional",
     "counsellors": [
        {"name": "R. Kaur", "designation": "Counsellor", "contact": "98140"},
        {"name": "P. Sandhu", "designation": "Psychologist"}
     ]},
    {"sn": 2, "district": "Bathinda", "name": "Rampura", "latitude": 30.25, "longitude": 75.24,
     "status": "Non-Functional"},
    {"sn": 3, "district": "Amritsar", "name": "Attari", "latitude": 31.6, "longitude": 74.6,
     "status": "Unknown",
     "counsellors": [{"name": "G. Gill", "designation": "Social Worker"}]},
    {"sn": 4, "district": "Amritsar", "name": "Majitha", "latitude": 31.76, "longitude": 74.96,
     "status": "Functional"}
]}"#;

#[cfg(test)]
fn dataset() -> Dataset {
    Dataset::from_json(DATASET).unwrap()
}

#[test]
fn test_markers_without_filter() {
    let dataset = dataset();
    let frame = render_frame(&dataset, &FilterState::new(), None);
    let fills: Vec<Color> = frame.markers.iter().map(|m| m.fill_color).collect();
    assert_eq!(
        fills,
        vec![
            palette::FUNCTIONAL,
            palette::NON_FUNCTIONAL,
            palette::NON_FUNCTIONAL,
            palette::FUNCTIONAL
        ]
    );
    assert!(frame.markers.iter().all(|m| m.radius == MARKER_RADIUS));
    assert_eq!(frame.markers[0].position, Point::new(74.76, 31.84));
    assert_eq!(frame.markers[0].popup.counsellors.len(), 2);
    assert_eq!(
        frame.stats,
        Stats {
            total: 4,
            functional: 2,
            non_functional: 2
        }
    );
    assert!(frame.panel.is_none());
    assert!(frame.lines.is_empty());
}

#[test]
fn test_markers_with_filter_and_selection() {
    let dataset = dataset();
    let state = FilterState::new()
        .toggle_designation("Social Worker")
        .select_clinic(ClinicId(4));
    let frame = render_frame(&dataset, &state, Some("Amritsar"));
    assert_eq!(frame.markers.len(), 3);
    assert_eq!(frame.markers[0].fill_color, palette::NO_MATCH);
    assert!(frame.markers[0].popup.counsellors.is_empty());
    assert_eq!(
        frame.markers[1].fill_color,
        palette::designation_color("Social Worker")
    );
    assert_eq!(frame.markers[1].popup.counsellors[0].name, "G. Gill");
    assert_eq!(frame.markers[2].fill_color, palette::SELECTED);
    assert_eq!(frame.markers[2].radius, SELECTED_MARKER_RADIUS);
    assert!(frame.markers[2].selected);
    assert_eq!(frame.stats.total, 3);

    let panel = frame.panel.as_ref().unwrap();
    assert_eq!(panel.clinic.sn, ClinicId(4));
    let ranked: Vec<ClinicId> = panel.neighbors.iter().map(|n| n.peer.sn).collect();
    assert_eq!(ranked, vec![ClinicId(1), ClinicId(3)]);
    assert_eq!(panel.neighbors[0].rank, 1);
    assert_eq!(
        panel.neighbors[0].formatted,
        format_distance(panel.neighbors[0].distance_km)
    );
    assert_eq!(frame.lines.len(), 2);
    assert_eq!(frame.lines[0].opacity, 0.6);
    assert_eq!(frame.lines[0].line.0.len(), 2);
}

#[test]
fn test_unknown_district_is_empty() {
    let dataset = dataset();
    let frame = render_frame(&dataset, &FilterState::new(), Some("Atlantis"));
    assert!(frame.markers.is_empty());
    assert_eq!(frame.stats, Stats::default());
    assert!(frame.bbox().is_none());
}

#[test]
fn test_lonely_clinic_has_no_neighbors() {
    let dataset = dataset();
    let state = FilterState::new().select_clinic(ClinicId(2));
    let panel = selection_panel(&dataset, &state).unwrap();
    assert!(panel.neighbors.is_empty());
    assert!(distance_lines(&panel).is_empty());
    assert!(panel.to_string().ends_with("No other clinics in this district."));
}

#[test]
fn test_selection_outside_dataset_has_no_panel() {
    let dataset = dataset();
    let state = FilterState::new().select_clinic(ClinicId(99));
    assert!(selection_panel(&dataset, &state).is_none());
}

#[test]
fn test_opacity_fades_with_rank() {
    assert_eq!(line_opacity(0), 0.6);
    assert!(line_opacity(5) < line_opacity(4));
    assert_eq!(line_opacity(16), 0.15);
    assert_eq!(line_opacity(100), 0.15);
}

#[test]
fn test_geojson_export() {
    let dataset = dataset();
    let state = FilterState::new().select_clinic(ClinicId(1));
    let frame = render_frame(&dataset, &state, None);
    let geojson = frame.to_geojson(&MapConfig::default()).unwrap();
    let GeoJson::FeatureCollection(collection) = geojson else {
        panic!("expected a feature collection");
    };
    // four markers, two lines to the other Amritsar clinics
    assert_eq!(collection.features.len(), 6);
    assert_eq!(collection.bbox, Some(vec![74.6, 30.25, 75.24, 31.84]));

    let first = &collection.features[0];
    assert_eq!(first.property("fillColor").unwrap(), palette::SELECTED.0);
    assert_eq!(first.property("selected").unwrap(), true);
    assert_eq!(first.property("counsellors").unwrap()[0]["contact"], "98140");

    let line = &collection.features[4];
    assert_eq!(line.property("color").unwrap(), palette::DISTANCE_LINE.0);
    assert!(matches!(
        line.geometry.as_ref().unwrap().value,
        geojson::Value::LineString(_)
    ));

    let members = collection.foreign_members.unwrap();
    assert_eq!(members["map"]["zoom"], 8);
    assert_eq!(members["map"]["minZoom"], 7);
    assert_eq!(members["stats"]["total"], 4);
    assert_eq!(members["legend"]["entries"][0]["label"], "Functional");
}
