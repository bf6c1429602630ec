use clinic_map::{
    ClinicId, Dataset, DatasetFile, Event, Session, Status, format_distance, haversine_km,
    palette, rank_district_neighbors,
};

fn scenario_dataset() -> Dataset {
    let clinics = serde_json::json!([
        {"sn": 1, "district": "A", "name": "Origin", "latitude": 0.0, "longitude": 0.0, "status": "Functional"},
        {"sn": 2, "district": "A", "name": "East", "latitude": 0.0, "longitude": 1.0, "status": "Non-Functional",
         "counsellors": [{"name": "Jaspreet", "designation": "Counsellor"}]},
        {"sn": 3, "district": "A", "name": "North", "latitude": 1.0, "longitude": 0.0, "status": "Unknown",
         "counsellors": [{"name": "Harleen", "designation": "Psychologist"}]},
        {"sn": 4, "district": "B", "name": "Elsewhere", "latitude": 0.0, "longitude": 0.5, "status": "Functional"}
    ]);
    let file = DatasetFile::from_clinics(serde_json::from_value(clinics).unwrap(), None);
    Dataset::from_json(&serde_json::to_string(&file).unwrap()).unwrap()
}

#[test]
fn selecting_origin_ranks_its_district() {
    let dataset = scenario_dataset();
    let origin = dataset.clinic(ClinicId(1)).unwrap();
    let ranked = rank_district_neighbors(origin, dataset.clinics());

    let order: Vec<ClinicId> = ranked.iter().map(|n| n.clinic.sn).collect();
    assert_eq!(order, vec![ClinicId(2), ClinicId(3)]);
    assert!(ranked.iter().all(|n| n.clinic.district == "A"));

    let east = haversine_km((0., 0.), (0., 1.));
    let north = haversine_km((0., 0.), (1., 0.));
    assert_eq!(ranked[0].distance_km(), east);
    assert_eq!(ranked[1].distance_km(), north);
    // one degree either way along the equator is the same distance, so the
    // dataset order decides
    assert!(east <= north);
    assert!((east - 111.19).abs() < 0.01);
    assert_eq!(format_distance(east), "111.19 km");
}

#[test]
fn session_walkthrough() {
    let mut session = Session::new(scenario_dataset());

    let frame = session.frame();
    assert_eq!(frame.markers.len(), 4);
    assert_eq!(frame.stats.total, 4);
    assert_eq!(frame.stats.functional, 2);
    assert_eq!(frame.legend.entries.len(), 2);
    drop(frame);

    session.apply(&"select 1".parse::<Event>().unwrap());
    let frame = session.frame();
    let panel = frame.panel.as_ref().unwrap();
    let names: Vec<&str> = panel.neighbors.iter().map(|n| n.peer.name.as_str()).collect();
    assert_eq!(names, vec!["East", "North"]);
    assert_eq!(frame.lines.len(), 2);
    assert_eq!(frame.markers[0].fill_color, palette::SELECTED);
    drop(frame);

    session.apply(&Event::ToggleDesignation("Psychologist".to_string()));
    let frame = session.frame();
    let fills: Vec<_> = frame.markers.iter().map(|m| m.fill_color).collect();
    assert_eq!(
        fills,
        vec![
            palette::SELECTED,
            palette::NO_MATCH,
            palette::designation_color("Psychologist"),
            palette::NO_MATCH,
        ]
    );
    let labels: Vec<&str> = frame.legend.entries.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["Psychologist", "No match"]);
    assert!(frame.markers[1].popup.counsellors.is_empty());
    assert_eq!(frame.markers[2].popup.counsellors[0].name, "Harleen");
    drop(frame);

    session.apply(&Event::ShowDistrict(Some("B".to_string())));
    let frame = session.frame();
    assert_eq!(frame.markers.len(), 1);
    assert_eq!(frame.markers[0].popup.status, Status::Functional);
    assert!(frame.panel.is_none());
    assert!(frame.lines.is_empty());
}

#[test]
fn scenario_exports_geojson() {
    let mut session = Session::new(scenario_dataset());
    session.apply(&Event::SelectClinic(ClinicId(4)));
    let geojson = session.frame().to_geojson(&Default::default()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&geojson.to_string()).unwrap();
    assert_eq!(value["type"], "FeatureCollection");
    // district B has no other clinics, so there are no distance lines
    assert_eq!(value["features"].as_array().unwrap().len(), 4);
    assert_eq!(value["bbox"], serde_json::json!([0.0, 0.0, 1.0, 1.0]));
}
