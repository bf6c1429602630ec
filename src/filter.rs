use std::fmt::Display;

use serde::Serialize;

use crate::{
    dataset::{Clinic, ClinicId, Counsellor, Status},
    palette::{self, Color},
};

/// Which designations are being filtered on and which clinic is selected
///
/// The two parts are independent: any set of designations can coexist with
/// any selection. Transitions return a new state and leave `self` alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    // kept in the order designations were switched on
    active_designations: Vec<String>,
    selected: Option<ClinicId>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch `designation` off if it's active, otherwise on
    #[must_use]
    pub fn toggle_designation(&self, designation: &str) -> Self {
        let mut active_designations = self.active_designations.clone();
        match active_designations.iter().position(|d| d == designation) {
            Some(idx) => {
                active_designations.remove(idx);
            }
            None => active_designations.push(designation.to_string()),
        }
        FilterState {
            active_designations,
            selected: self.selected,
        }
    }

    #[must_use]
    pub fn select_clinic(&self, sn: ClinicId) -> Self {
        FilterState {
            active_designations: self.active_designations.clone(),
            selected: Some(sn),
        }
    }

    #[must_use]
    pub fn clear_selection(&self) -> Self {
        FilterState {
            active_designations: self.active_designations.clone(),
            selected: None,
        }
    }

    pub fn selected(&self) -> Option<ClinicId> {
        self.selected
    }

    /// Active designations, in the order they were switched on
    pub fn active_designations(&self) -> &[String] {
        &self.active_designations
    }

    pub fn is_filtering(&self) -> bool {
        !self.active_designations.is_empty()
    }

    pub fn is_active(&self, designation: &str) -> bool {
        self.active_designations.iter().any(|d| d == designation)
    }
}

/// Marker fill for `clinic`. With no designation filter the colour follows
/// status; with a filter it's the colour of the first counsellor whose
/// designation is active, or [`palette::NO_MATCH`] if there isn't one.
pub fn derive_marker_color(clinic: &Clinic, state: &FilterState) -> Color {
    if !state.is_filtering() {
        return palette::status_color(clinic.status);
    }
    clinic
        .counsellors
        .iter()
        .find(|c| state.is_active(&c.designation))
        .map(|c| palette::designation_color(&c.designation))
        .unwrap_or(palette::NO_MATCH)
}

/// Counsellors to show for `clinic`: everyone when no filter is active,
/// otherwise only those with an active designation. Order is preserved.
pub fn derive_visible_counsellors<'a>(clinic: &'a Clinic, state: &FilterState) -> Vec<&'a Counsellor> {
    clinic
        .counsellors
        .iter()
        .filter(|c| !state.is_filtering() || state.is_active(&c.designation))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Legend {
    pub entries: Vec<LegendEntry>,
}

pub fn derive_legend(state: &FilterState) -> Legend {
    let entries = if state.is_filtering() {
        state
            .active_designations()
            .iter()
            .map(|d| LegendEntry {
                label: d.clone(),
                color: palette::designation_color(d),
            })
            .chain(std::iter::once(LegendEntry {
                label: String::from("No match"),
                color: palette::NO_MATCH,
            }))
            .collect()
    } else {
        [Status::Functional, Status::NonFunctional]
            .into_iter()
            .map(|s| LegendEntry {
                label: s.to_string(),
                color: palette::status_color(s),
            })
            .collect()
    };
    Legend { entries }
}

impl Display for Legend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for entry in self.entries.iter() {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "{} {}", entry.color, entry.label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
fn counsellor(name: &str, designation: &str) -> Counsellor {
    Counsellor {
        name: name.to_string(),
        designation: designation.to_string(),
        contact: None,
        gender: None,
        facility_type: None,
    }
}

#[cfg(test)]
fn clinic(status: Status, counsellors: Vec<Counsellor>) -> Clinic {
    Clinic {
        sn: ClinicId(1),
        district: String::from("Ludhiana"),
        name: String::from("OOAT Clinic Khanna"),
        latitude: 30.7,
        longitude: 76.2,
        status,
        counsellors,
    }
}

#[cfg(test)]
fn rosters() -> Vec<Vec<Counsellor>> {
    vec![
        vec![],
        vec![counsellor("A", "Counsellor")],
        vec![
            counsellor("B", "Psychologist"),
            counsellor("C", "Social Worker"),
            counsellor("D", "Yoga Instructor"),
        ],
    ]
}

#[test]
fn test_toggle_is_its_own_inverse() {
    let state = FilterState::new()
        .toggle_designation("Counsellor")
        .select_clinic(ClinicId(7));
    let toggled = state.toggle_designation("Psychologist");
    assert!(toggled.is_active("Psychologist"));
    assert_eq!(toggled.toggle_designation("Psychologist"), state);

    let removed = state.toggle_designation("Counsellor");
    assert!(!removed.is_filtering());
    assert_eq!(removed.toggle_designation("Counsellor"), state);
}

#[test]
fn test_toggle_keeps_selection() {
    let state = FilterState::new().select_clinic(ClinicId(3));
    let state = state.toggle_designation("Social Worker");
    assert_eq!(state.selected(), Some(ClinicId(3)));
    let state = state.toggle_designation("Social Worker");
    assert_eq!(state.selected(), Some(ClinicId(3)));
}

#[test]
fn test_active_set_remembers_toggle_order() {
    let state = FilterState::new()
        .toggle_designation("Social Worker")
        .toggle_designation("Counsellor")
        .toggle_designation("Psychologist")
        .toggle_designation("Counsellor");
    assert_eq!(state.active_designations(), ["Social Worker", "Psychologist"]);
}

#[test]
fn test_selection_transitions() {
    let state = FilterState::new();
    assert_eq!(state.selected(), None);
    let selected = state.select_clinic(ClinicId(4));
    assert_eq!(selected.selected(), Some(ClinicId(4)));
    assert_eq!(selected.select_clinic(ClinicId(4)), selected);
    assert_eq!(selected.select_clinic(ClinicId(5)).selected(), Some(ClinicId(5)));
    assert_eq!(selected.clear_selection(), state);
    assert_eq!(state.clear_selection(), state);
}

#[test]
fn test_marker_color_without_filter_follows_status_only() {
    let state = FilterState::new().select_clinic(ClinicId(1));
    for roster in rosters() {
        assert_eq!(
            derive_marker_color(&clinic(Status::Functional, roster.clone()), &state),
            palette::FUNCTIONAL
        );
        assert_eq!(
            derive_marker_color(&clinic(Status::NonFunctional, roster.clone()), &state),
            palette::NON_FUNCTIONAL
        );
        assert_eq!(
            derive_marker_color(&clinic(Status::Unknown, roster), &state),
            palette::NON_FUNCTIONAL
        );
    }
}

#[test]
fn test_marker_color_uses_first_matching_counsellor() {
    let roster = vec![
        counsellor("B", "Psychologist"),
        counsellor("C", "Social Worker"),
        counsellor("D", "Yoga Instructor"),
    ];
    let c = clinic(Status::NonFunctional, roster);

    let state = FilterState::new()
        .toggle_designation("Social Worker")
        .toggle_designation("Psychologist");
    assert_eq!(derive_marker_color(&c, &state), palette::designation_color("Psychologist"));

    let state = FilterState::new().toggle_designation("Social Worker");
    assert_eq!(derive_marker_color(&c, &state), palette::designation_color("Social Worker"));

    let state = FilterState::new().toggle_designation("Yoga Instructor");
    assert_eq!(derive_marker_color(&c, &state), palette::DESIGNATION_DEFAULT);
}

#[test]
fn test_marker_color_without_match_is_neutral() {
    let state = FilterState::new().toggle_designation("Clinical Psychologist");
    for status in [Status::Functional, Status::NonFunctional, Status::Unknown] {
        for roster in rosters() {
            assert_eq!(derive_marker_color(&clinic(status, roster), &state), palette::NO_MATCH);
        }
    }
}

#[test]
fn test_visible_counsellors() {
    let roster = vec![
        counsellor("B", "Psychologist"),
        counsellor("C", "Social Worker"),
        counsellor("D", "Psychologist"),
        counsellor("E", "Counsellor"),
    ];
    let c = clinic(Status::Functional, roster.clone());

    let all = derive_visible_counsellors(&c, &FilterState::new());
    assert_eq!(all, roster.iter().collect::<Vec<_>>());

    let state = FilterState::new()
        .toggle_designation("Counsellor")
        .toggle_designation("Psychologist");
    let names: Vec<&str> = derive_visible_counsellors(&c, &state)
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["B", "D", "E"]);

    let state = FilterState::new().toggle_designation("Clinical Psychologist");
    assert!(derive_visible_counsellors(&c, &state).is_empty());
    assert!(derive_visible_counsellors(&clinic(Status::Functional, vec![]), &state).is_empty());
}

#[test]
fn test_legend() {
    let legend = derive_legend(&FilterState::new());
    assert_eq!(
        legend.entries,
        vec![
            LegendEntry {
                label: String::from("Functional"),
                color: palette::FUNCTIONAL
            },
            LegendEntry {
                label: String::from("Non-Functional"),
                color: palette::NON_FUNCTIONAL
            },
        ]
    );

    let state = FilterState::new()
        .toggle_designation("Social Worker")
        .toggle_designation("Peer Supporter");
    let legend = derive_legend(&state);
    let labels: Vec<&str> = legend.entries.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["Social Worker", "Peer Supporter", "No match"]);
    assert_eq!(legend.entries[0].color, palette::designation_color("Social Worker"));
    assert_eq!(legend.entries[1].color, palette::DESIGNATION_DEFAULT);
    assert_eq!(legend.entries[2].color, palette::NO_MATCH);
    assert_eq!(
        legend.to_string(),
        "#14b8a6 Social Worker\n#6b7280 Peer Supporter\n#d1d5db No match"
    );
}
