use std::{collections::HashSet, io::Read};

use clinic_map::{Clinic, ClinicId, Status};
use tracing::{debug, warn};

const SN: &str = "SN";
const DISTRICT: &str = "District";
const NAME: &str = "Name of OOAT Clinics";
const LATITUDE: &str = "Latitude";
const LONGITUDE: &str = "Longitude";
const REMARKS: &str = "Remarks, if any";

/// Read a status out of the free-text remarks column
pub fn classify_status(remarks: &str) -> Status {
    let remarks = remarks.to_lowercase();
    if remarks.contains("non") && remarks.contains("functional") {
        Status::NonFunctional
    } else if remarks.contains("functional") {
        Status::Functional
    } else {
        Status::Unknown
    }
}

/// A serial number cell as a clinic id. Spreadsheet exports write whole
/// numbers as "6" or "6.0"; anything else isn't an id.
fn parse_sn(cell: &str) -> Option<ClinicId> {
    let value = cell.parse::<f64>().ok()?;
    if value.fract() == 0. && value >= 1. && value <= u32::MAX as f64 {
        Some(ClinicId(value as u32))
    } else {
        None
    }
}

/// Read the clinic sheet. Header names are matched after trimming, since the
/// export carries stray spaces ("District "). Rows without a district or
/// usable coordinates are skipped.
///
/// Ids come from the SN column. A row with a blank, malformed, or already
/// used SN gets its 1-based row position instead, or the next free id if that
/// is taken too, so every id in the output is unique.
pub fn read_clinics<R: Read>(input: R) -> Result<Vec<Clinic>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let (sn, district, name, latitude, longitude, remarks) = (
        column(SN),
        column(DISTRICT),
        column(NAME),
        column(LATITUDE),
        column(LONGITUDE),
        column(REMARKS),
    );

    let mut clinics = vec![];
    // row position of each clinic that still needs an id
    let mut unnumbered: Vec<(usize, u32)> = vec![];
    let mut used: HashSet<ClinicId> = HashSet::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let row = idx as u32 + 1;
        let field = |col: Option<usize>| {
            col.and_then(|c| record.get(c))
                .filter(|value| !value.is_empty())
        };
        let Some(district) = field(district) else {
            debug!("skipping row {}: no district", row);
            continue;
        };
        let coordinates = field(latitude)
            .zip(field(longitude))
            .map(|(lat, lon)| (lat.parse::<f64>(), lon.parse::<f64>()));
        let (latitude, longitude) = match coordinates {
            Some((Ok(lat), Ok(lon))) => (lat, lon),
            Some(_) => {
                warn!("skipping row {}: unreadable coordinates", row);
                continue;
            }
            None => {
                debug!("skipping row {}: no coordinates", row);
                continue;
            }
        };
        let sn = match field(sn) {
            None => None,
            Some(cell) => match parse_sn(cell) {
                Some(sn) if used.insert(sn) => Some(sn),
                Some(sn) => {
                    warn!("row {}: SN {} is already taken, renumbering", row, sn);
                    None
                }
                None => {
                    warn!("row {}: SN '{}' is not a whole number, renumbering", row, cell);
                    None
                }
            },
        };
        if sn.is_none() {
            unnumbered.push((clinics.len(), row));
        }
        clinics.push(Clinic {
            sn: sn.unwrap_or(ClinicId(0)),
            district: district.to_string(),
            name: field(name).unwrap_or_default().to_string(),
            latitude,
            longitude,
            status: classify_status(field(remarks).unwrap_or_default()),
            counsellors: vec![],
        });
    }

    let mut next_free = 1;
    for (position, row) in unnumbered {
        let sn = if used.insert(ClinicId(row)) {
            ClinicId(row)
        } else {
            while used.contains(&ClinicId(next_free)) {
                next_free += 1;
            }
            used.insert(ClinicId(next_free));
            ClinicId(next_free)
        };
        debug!("row {}: assigned SN {}", row, sn);
        clinics[position].sn = sn;
    }
    Ok(clinics)
}

#[test]
fn test_status_from_remarks() {
    let cases = [
        ("Functional", Status::Functional),
        ("functional since 2021", Status::Functional),
        ("Non Functional", Status::NonFunctional),
        ("non-functional, staff posted elsewhere", Status::NonFunctional),
        ("", Status::Unknown),
        ("Under construction", Status::Unknown),
    ];
    for (remarks, expected) in cases {
        assert_eq!(classify_status(remarks), expected, "{:?}", remarks);
    }
}

#[test]
fn test_read_sheet() {
    let sheet = "\
SN,District ,Name of OOAT Clinics,Latitude,Longitude,\"Remarks, if any\"
1,Amritsar,OOAT Clinic CHC Ajnala,31.84,74.76,Functional
,Amritsar,OOAT Clinic SDH Attari,31.60,74.60,Non functional
3,,Orphan row,31.0,75.0,Functional
4,Moga,No coordinates,,75.1,Functional
5,Moga,Bad coordinates,north,75.1,Functional
6.0,Moga,OOAT Clinic Baghapurana,30.51,75.09,
";
    let clinics = read_clinics(sheet.as_bytes()).unwrap();
    let sns: Vec<ClinicId> = clinics.iter().map(|c| c.sn).collect();
    assert_eq!(sns, vec![ClinicId(1), ClinicId(2), ClinicId(6)]);
    assert_eq!(clinics[0].district, "Amritsar");
    assert_eq!(clinics[1].status, Status::NonFunctional);
    assert_eq!(clinics[2].status, Status::Unknown);
    assert_eq!(clinics[2].coordinates(), (30.51, 75.09));
}

#[test]
fn test_read_sheet_keeps_ids_unique() {
    let sheet = "\
SN,District,Name of OOAT Clinics,Latitude,Longitude
,Amritsar,Ajnala,31.84,74.76
1,Amritsar,Attari,31.60,74.60
1,Moga,Baghapurana,30.51,75.09
2.5,Moga,Nihal Singh Wala,30.60,75.30
-4,Moga,Dharamkot,30.94,75.23
";
    let clinics = read_clinics(sheet.as_bytes()).unwrap();
    let sns: Vec<u32> = clinics.iter().map(|c| c.sn.0).collect();
    // explicit ids win; the rest take their row position when it's free
    assert_eq!(sns, vec![2, 1, 3, 4, 5]);
    assert_eq!(clinics[1].name, "Attari");
    assert!(clinic_map::Dataset::from_clinics(clinics).is_ok());
}

#[test]
fn test_read_sheet_fills_gaps_when_row_ids_are_taken() {
    let sheet = "\
SN,District,Name of OOAT Clinics,Latitude,Longitude
,Amritsar,Ajnala,31.84,74.76
1,Amritsar,Attari,31.60,74.60
2,Moga,Baghapurana,30.51,75.09
";
    let clinics = read_clinics(sheet.as_bytes()).unwrap();
    let sns: Vec<u32> = clinics.iter().map(|c| c.sn.0).collect();
    assert_eq!(sns, vec![3, 1, 2]);
}
