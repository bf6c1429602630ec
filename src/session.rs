use std::{fmt::Display, str::FromStr};

use tracing::{debug, warn};

use crate::{
    ClinicMapError,
    dataset::{ClinicId, Dataset},
    filter::FilterState,
    render::{Frame, render_frame},
};

/// One user interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ToggleDesignation(String),
    SelectClinic(ClinicId),
    ClearSelection,
    /// `None` shows every district
    ShowDistrict(Option<String>),
}

impl FromStr for Event {
    type Err = ClinicMapError;

    /// Parse one line of a replay script:
    /// `toggle <designation>`, `select <sn>`, `clear`, or `district <name|all>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };
        match (command.to_lowercase().as_str(), argument) {
            ("toggle", "") | ("select", "") | ("district", "") => Err(
                ClinicMapError::InvalidEvent(format!("'{}' needs an argument", command)),
            ),
            ("toggle", designation) => Ok(Event::ToggleDesignation(designation.to_string())),
            ("select", sn) => sn.parse().map(Event::SelectClinic).map_err(|e| {
                ClinicMapError::InvalidEvent(format!("bad sequence number '{}': {}", sn, e))
            }),
            ("clear", "") => Ok(Event::ClearSelection),
            ("district", name) if name.eq_ignore_ascii_case("all") => {
                Ok(Event::ShowDistrict(None))
            }
            ("district", name) => Ok(Event::ShowDistrict(Some(name.to_string()))),
            _ => Err(ClinicMapError::InvalidEvent(format!(
                "unrecognized event '{}'",
                line
            ))),
        }
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::ToggleDesignation(d) => write!(f, "toggle {}", d),
            Event::SelectClinic(sn) => write!(f, "select {}", sn),
            Event::ClearSelection => write!(f, "clear"),
            Event::ShowDistrict(Some(d)) => write!(f, "district {}", d),
            Event::ShowDistrict(None) => write!(f, "district all"),
        }
    }
}

/// The single mutable slot of a session: a loaded dataset, the current
/// filter state, and which district is on screen
///
/// Events are applied one at a time and each runs to completion; whatever is
/// drawn is derived from this value alone through [`Session::frame`].
#[derive(Debug)]
pub struct Session {
    dataset: Dataset,
    state: FilterState,
    district: Option<String>,
}

impl Session {
    pub fn new(dataset: Dataset) -> Self {
        Session {
            dataset,
            state: FilterState::new(),
            district: None,
        }
    }

    pub fn apply(&mut self, event: &Event) {
        debug!("applying event: {}", event);
        self.state = match event {
            Event::ToggleDesignation(designation) => self.state.toggle_designation(designation),
            Event::SelectClinic(sn) => {
                if self.dataset.clinic(*sn).is_none() {
                    warn!("ignoring selection of unknown clinic {}", sn);
                    return;
                }
                self.state.select_clinic(*sn)
            }
            Event::ClearSelection => self.state.clear_selection(),
            Event::ShowDistrict(district) => {
                if let Some(d) = district {
                    if !self.dataset.has_district(d) {
                        warn!("district '{}' has no clinics", d);
                    }
                }
                self.district = district.clone();
                // changing district closes the sidebar
                self.state.clear_selection()
            }
        };
    }

    pub fn frame(&self) -> Frame<'_> {
        render_frame(&self.dataset, &self.state, self.district.as_deref())
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn district(&self) -> Option<&str> {
        self.district.as_deref()
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }
}

#[cfg(test)]
fn session() -> Session {
    Session::new(
        Dataset::from_json(
            r#"{"clinics": [
                {"sn": 1, "district": "Moga", "name": "Baghapurana", "latitude": 30.5, "longitude": 75.1,
                 "status": "Functional", "counsellors": [{"name": "K", "designation": "Counsellor"}]},
                {"sn": 2, "district": "Moga", "name": "Nihal Singh Wala", "latitude": 30.6, "longitude": 75.3,
                 "status": "Non-Functional"},
                {"sn": 3, "district": "Mansa", "name": "Budhlada", "latitude": 29.9, "longitude": 75.6,
                 "status": "Functional"}
            ]}"#,
        )
        .unwrap(),
    )
}

#[test]
fn test_parse_events() {
    let cases = [
        ("toggle Clinical Psychologist", Event::ToggleDesignation("Clinical Psychologist".to_string())),
        ("  select 12 ", Event::SelectClinic(ClinicId(12))),
        ("clear", Event::ClearSelection),
        ("district SAS nagar Mohali", Event::ShowDistrict(Some("SAS nagar Mohali".to_string()))),
        ("district ALL", Event::ShowDistrict(None)),
        ("Toggle Counsellor", Event::ToggleDesignation("Counsellor".to_string())),
    ];
    for (line, expected) in cases {
        assert_eq!(line.parse::<Event>().unwrap(), expected, "parsing {:?}", line);
    }
    for line in ["", "select", "select twelve", "toggle", "clear now", "zoom 14", "district"] {
        assert!(
            matches!(line.parse::<Event>(), Err(ClinicMapError::InvalidEvent(_))),
            "parsing {:?}",
            line
        );
    }
}

#[test]
fn test_event_display_parses_back() {
    for event in [
        Event::ToggleDesignation("Social Worker".to_string()),
        Event::SelectClinic(ClinicId(3)),
        Event::ClearSelection,
        Event::ShowDistrict(Some("Moga".to_string())),
        Event::ShowDistrict(None),
    ] {
        assert_eq!(event.to_string().parse::<Event>().unwrap(), event);
    }
}

#[test]
fn test_select_and_clear() {
    let mut session = session();
    session.apply(&Event::SelectClinic(ClinicId(1)));
    assert_eq!(session.state().selected(), Some(ClinicId(1)));
    let frame = session.frame();
    let panel = frame.panel.as_ref().unwrap();
    assert_eq!(panel.neighbors.len(), 1);
    assert_eq!(panel.neighbors[0].peer.sn, ClinicId(2));

    session.apply(&Event::SelectClinic(ClinicId(1)));
    assert_eq!(session.state().selected(), Some(ClinicId(1)));

    session.apply(&Event::ClearSelection);
    assert_eq!(session.state().selected(), None);
    assert!(session.frame().panel.is_none());
}

#[test]
fn test_unknown_clinic_is_ignored() {
    let mut session = session();
    session.apply(&Event::SelectClinic(ClinicId(2)));
    session.apply(&Event::SelectClinic(ClinicId(40)));
    assert_eq!(session.state().selected(), Some(ClinicId(2)));
}

#[test]
fn test_toggles_keep_selection() {
    let mut session = session();
    session.apply(&Event::SelectClinic(ClinicId(3)));
    session.apply(&Event::ToggleDesignation("Counsellor".to_string()));
    assert_eq!(session.state().selected(), Some(ClinicId(3)));
    assert!(session.state().is_active("Counsellor"));
    session.apply(&Event::ToggleDesignation("Counsellor".to_string()));
    assert!(!session.state().is_filtering());
}

#[test]
fn test_district_change_clears_selection() {
    let mut session = session();
    session.apply(&Event::ToggleDesignation("Counsellor".to_string()));
    session.apply(&Event::SelectClinic(ClinicId(1)));
    session.apply(&Event::ShowDistrict(Some("Moga".to_string())));
    assert_eq!(session.state().selected(), None);
    assert!(session.state().is_active("Counsellor"));
    assert_eq!(session.district(), Some("Moga"));
    let frame = session.frame();
    assert_eq!(frame.markers.len(), 2);
    assert_eq!(frame.stats.functional, 1);

    session.apply(&Event::ShowDistrict(Some("Sangrur".to_string())));
    assert!(session.frame().markers.is_empty());

    session.apply(&Event::ShowDistrict(None));
    assert_eq!(session.frame().markers.len(), 3);
}
