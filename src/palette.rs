//! The one place marker, legend, sidebar, and popup colours come from.

use std::fmt::Display;

use serde::{Serialize, Serializer};

use crate::dataset::Status;

/// A CSS hex colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub &'static str);

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

pub const FUNCTIONAL: Color = Color("#22c55e");
pub const NON_FUNCTIONAL: Color = Color("#ef4444");
/// Fill for the currently selected marker; distinct from every designation colour
pub const SELECTED: Color = Color("#f97316");
/// Fill for designations that aren't in [`DESIGNATION_COLORS`]
pub const DESIGNATION_DEFAULT: Color = Color("#6b7280");
/// Fill for a clinic with no counsellor matching an active designation filter
pub const NO_MATCH: Color = Color("#d1d5db");
pub const DISTANCE_LINE: Color = Color("#3b82f6");

pub const DESIGNATION_COLORS: [(&str, Color); 5] = [
    ("Counsellor", Color("#3b82f6")),
    ("Clinical Psychologist", Color("#a855f7")),
    ("Psychologist", Color("#8b5cf6")),
    ("Psychiatric Social Worker", Color("#f59e0b")),
    ("Social Worker", Color("#14b8a6")),
];

/// Two-way status colouring: functional clinics are green, everything else
/// (including unknown status) is red.
pub fn status_color(status: Status) -> Color {
    match status {
        Status::Functional => FUNCTIONAL,
        Status::NonFunctional | Status::Unknown => NON_FUNCTIONAL,
    }
}

/// Look up a designation's colour, falling back to [`DESIGNATION_DEFAULT`].
/// Matching is exact; designations are normalized when the dataset is built.
pub fn designation_color(designation: &str) -> Color {
    DESIGNATION_COLORS
        .iter()
        .find(|(d, _)| *d == designation)
        .map(|(_, c)| *c)
        .unwrap_or(DESIGNATION_DEFAULT)
}

#[test]
fn test_status_color() {
    assert_eq!(status_color(Status::Functional), FUNCTIONAL);
    assert_eq!(status_color(Status::NonFunctional), NON_FUNCTIONAL);
    assert_eq!(status_color(Status::Unknown), NON_FUNCTIONAL);
}

#[test]
fn test_designation_color() {
    assert_eq!(designation_color("Counsellor"), Color("#3b82f6"));
    assert_eq!(designation_color("Social Worker"), Color("#14b8a6"));
    assert_eq!(designation_color("Yoga Instructor"), DESIGNATION_DEFAULT);
    assert_eq!(designation_color("counsellor"), DESIGNATION_DEFAULT);
    assert_eq!(designation_color(""), DESIGNATION_DEFAULT);
}

#[test]
fn test_no_designation_shares_a_reserved_color() {
    for (_, color) in DESIGNATION_COLORS {
        assert_ne!(color, SELECTED);
        assert_ne!(color, NO_MATCH);
        assert_ne!(color, DESIGNATION_DEFAULT);
    }
}
