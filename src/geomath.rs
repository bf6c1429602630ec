use uom::si::{f64::Length, length::kilometer};

use crate::dataset::Clinic;

const EARTH_RADIUS_KM: f64 = 6371.;

/// Given a pair of coordinates, compute the great-circle distance between
/// them. Coordinates are (latitude, longitude) in degrees.
///
/// The intermediate haversine term is clamped to `[0, 1]` so that rounding
/// error near antipodal or coincident points can't push `sqrt` out of its
/// domain.
///
/// Math copied from [here](http://www.movable-type.co.uk/scripts/latlong.html).
pub fn haversine_distance(start_point: (f64, f64), end_point: (f64, f64)) -> Length {
    let (start_lat, start_lon) = (start_point.0.to_radians(), start_point.1.to_radians());
    let (end_lat, end_lon) = (end_point.0.to_radians(), end_point.1.to_radians());
    let haversine = ((end_lat - start_lat) / 2.).sin().powi(2)
        + start_lat.cos() * end_lat.cos() * ((end_lon - start_lon) / 2.).sin().powi(2);
    let haversine = haversine.clamp(0., 1.);
    Length::new::<kilometer>(
        EARTH_RADIUS_KM * 2. * haversine.sqrt().atan2((1. - haversine).sqrt()),
    )
}

/// Same as [`haversine_distance`], but in plain kilometers
pub fn haversine_km(start_point: (f64, f64), end_point: (f64, f64)) -> f64 {
    haversine_distance(start_point, end_point).get::<kilometer>()
}

/// A clinic in the same district as some source clinic, along with its
/// distance from that source
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a> {
    pub clinic: &'a Clinic,
    pub distance: Length,
}

impl Neighbor<'_> {
    pub fn distance_km(&self) -> f64 {
        self.distance.get::<kilometer>()
    }
}

/// Rank every other clinic in `source`'s district by distance from `source`,
/// nearest first.
///
/// The source is excluded by its sequence number rather than by position, so
/// two clinics at the same coordinates are still both considered. Clinics at
/// equal distances keep their relative order from `clinics`.
pub fn rank_district_neighbors<'a>(source: &Clinic, clinics: &'a [Clinic]) -> Vec<Neighbor<'a>> {
    let mut neighbors: Vec<Neighbor<'a>> = clinics
        .iter()
        .filter(|c| c.district == source.district && c.sn != source.sn)
        .map(|clinic| Neighbor {
            clinic,
            distance: haversine_distance(source.coordinates(), clinic.coordinates()),
        })
        .collect();
    // sort_by is stable, which is what keeps ties in dataset order
    neighbors.sort_by(|a, b| a.distance_km().total_cmp(&b.distance_km()));
    neighbors
}

/// Format a distance for display: whole meters below 1 km, otherwise
/// kilometers with two decimal places.
pub fn format_distance(km: f64) -> String {
    if km < 1. {
        format!("{} m", (km * 1000.).round() as i64)
    } else {
        format!("{:.2} km", km)
    }
}

#[cfg(test)]
fn is_equal_within_error(test_value: f64, true_value: f64, error: f64) -> bool {
    test_value >= true_value - error && test_value <= true_value + error
}

#[cfg(test)]
fn clinic(sn: u32, district: &str, latitude: f64, longitude: f64) -> Clinic {
    Clinic {
        sn: crate::dataset::ClinicId(sn),
        district: district.to_string(),
        name: format!("Clinic {}", sn),
        latitude,
        longitude,
        status: crate::dataset::Status::Functional,
        counsellors: vec![],
    }
}

#[test]
fn test_haversine_distance_reference_points() {
    let error = 0.1;
    assert!(is_equal_within_error(
        haversine_km((50.0664, -5.7147), (58.6439, -3.0700)),
        968.9,
        error
    ));
    assert!(is_equal_within_error(
        haversine_km((32.1515, 1.5073), (33.2410, 1.7384)),
        123.1,
        error
    ));
    // one degree of longitude along the equator
    assert!(is_equal_within_error(
        haversine_km((0., 0.), (0., 1.)),
        111.19,
        0.01
    ));
}

#[test]
fn test_haversine_distance_symmetric_and_zero() {
    let points = [
        (0., 0.),
        (31.1471, 75.3412),
        (-33.8688, 151.2093),
        (89.9999, -179.9999),
        (-90., 180.),
    ];
    for a in points {
        assert_eq!(haversine_km(a, a), 0.);
        for b in points {
            assert_eq!(haversine_km(a, b), haversine_km(b, a));
            assert!(haversine_km(a, b) >= 0.);
        }
    }
}

#[test]
fn test_haversine_distance_antipodal() {
    let half_circumference = std::f64::consts::PI * EARTH_RADIUS_KM;
    let distance = haversine_km((0., 0.), (0., 180.));
    assert!(!distance.is_nan());
    assert!(is_equal_within_error(distance, half_circumference, 0.001));
    let distance = haversine_km((45., 90.), (-45., -90.));
    assert!(is_equal_within_error(distance, half_circumference, 0.001));
}

#[test]
fn test_haversine_distance_tiny_separation() {
    // roughly 1.1 cm apart
    let distance = haversine_km((31.0, 75.0), (31.0000001, 75.0));
    assert!(distance > 0.);
    assert!(distance < 0.0001);
}

#[test]
fn test_format_distance() {
    let cases = [
        (0., "0 m"),
        (0.0004, "0 m"),
        (0.0005, "1 m"),
        (0.012, "12 m"),
        (0.5, "500 m"),
        (0.9994, "999 m"),
        (0.9995, "1000 m"),
        (1.0, "1.00 km"),
        (1.004, "1.00 km"),
        (1.5, "1.50 km"),
        (12.345, "12.35 km"),
        (111.19492664455873, "111.19 km"),
        (20015.086796020572, "20015.09 km"),
    ];
    for (km, expected) in cases {
        assert_eq!(format_distance(km), expected, "formatting {} km", km);
    }
}

#[test]
fn test_rank_district_neighbors_excludes_source_and_other_districts() {
    let clinics = vec![
        clinic(1, "A", 31.0, 75.0),
        clinic(2, "B", 31.0, 75.001),
        clinic(3, "A", 31.5, 75.0),
        clinic(4, "A", 31.1, 75.0),
    ];
    let ranked = rank_district_neighbors(&clinics[0], &clinics);
    let order: Vec<u32> = ranked.iter().map(|n| n.clinic.sn.0).collect();
    assert_eq!(order, vec![4, 3]);
    assert!(ranked.windows(2).all(|w| w[0].distance_km() <= w[1].distance_km()));
}

#[test]
fn test_rank_district_neighbors_keeps_coincident_peer() {
    // same coordinates, different sequence numbers
    let clinics = vec![clinic(1, "A", 31.0, 75.0), clinic(2, "A", 31.0, 75.0)];
    let ranked = rank_district_neighbors(&clinics[0], &clinics);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].clinic.sn.0, 2);
    assert_eq!(ranked[0].distance_km(), 0.);
}

#[test]
fn test_rank_district_neighbors_ties_keep_dataset_order() {
    let clinics = vec![
        clinic(10, "A", 31.0, 75.0),
        clinic(7, "A", 31.2, 75.0),
        clinic(3, "A", 31.1, 75.0),
        clinic(5, "A", 31.2, 75.0),
        clinic(1, "A", 31.2, 75.0),
    ];
    let ranked = rank_district_neighbors(&clinics[0], &clinics);
    let order: Vec<u32> = ranked.iter().map(|n| n.clinic.sn.0).collect();
    assert_eq!(order, vec![3, 7, 5, 1]);
}

#[test]
fn test_rank_district_neighbors_no_peers() {
    let clinics = vec![clinic(1, "A", 31.0, 75.0), clinic(2, "B", 31.0, 75.0)];
    assert!(rank_district_neighbors(&clinics[0], &clinics).is_empty());
    assert!(rank_district_neighbors(&clinics[0], &[]).is_empty());
}
