use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::Display,
    fs,
    path::Path,
    str::FromStr,
};

use chrono::{DateTime, Utc};
use geo::Point;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ClinicMapError;

/// A clinic's sequence number, unique within a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClinicId(pub u32);

impl Display for ClinicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClinicId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ClinicId(s.trim().parse()?))
    }
}

/// Operational status, as classified when the dataset was built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Functional,
    #[serde(rename = "Non-Functional", alias = "NonFunctional")]
    NonFunctional,
    #[default]
    Unknown,
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Functional => write!(f, "Functional"),
            Status::NonFunctional => write!(f, "Non-Functional"),
            Status::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counsellor {
    pub name: String,
    #[serde(default = "default_designation")]
    pub designation: String,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub contact: Option<String>,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub gender: Option<String>,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub facility_type: Option<String>,
}

fn default_designation() -> String {
    String::from("Counsellor")
}

fn blank_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        // spreadsheet exports sometimes turn phone numbers into numbers
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Accept anything for the counsellor list. Entries that aren't counsellor
/// objects are dropped, and anything that isn't a list at all becomes empty.
fn lenient_counsellors<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Counsellor>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(entries) => {
            let total = entries.len();
            let counsellors: Vec<Counsellor> = entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect();
            if counsellors.len() != total {
                warn!(
                    "dropped {} malformed counsellor entries",
                    total - counsellors.len()
                );
            }
            counsellors
        }
        Value::Null => vec![],
        other => {
            warn!("ignoring malformed counsellor list: {}", other);
            vec![]
        }
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clinic {
    pub sn: ClinicId,
    pub district: String,
    #[serde(default)]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub status: Status,
    #[serde(default, deserialize_with = "lenient_counsellors")]
    pub counsellors: Vec<Counsellor>,
}

impl Clinic {
    /// (latitude, longitude) in degrees
    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Location as a [`Point`]
    ///
    /// Note that the coordinates are reversed from (latitude, longitude) to
    /// match the `geo` convention, where `x` is the horizontal value
    /// (longitude) and `y` is the vertical value (latitude).
    pub fn location(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metadata {
    pub total: usize,
    pub districts: usize,
    pub functional: usize,
    pub non_functional: usize,
    pub designations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Compute the metadata block that describes `clinics`
    pub fn describe(clinics: &[Clinic], generated_at: Option<DateTime<Utc>>) -> Self {
        let districts: BTreeSet<&str> = clinics.iter().map(|c| c.district.as_str()).collect();
        Metadata {
            total: clinics.len(),
            districts: districts.len(),
            functional: count_status(clinics, Status::Functional),
            non_functional: count_status(clinics, Status::NonFunctional),
            designations: distinct_designations(clinics),
            generated_at,
        }
    }
}

fn count_status(clinics: &[Clinic], status: Status) -> usize {
    clinics.iter().filter(|c| c.status == status).count()
}

fn distinct_designations(clinics: &[Clinic]) -> Vec<String> {
    clinics
        .iter()
        .flat_map(|c| c.counsellors.iter().map(|co| co.designation.clone()))
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

/// The on-disk layout of a dataset: the flat clinic list, the same records
/// grouped by district, and summary metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFile {
    pub clinics: Vec<Clinic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinics_by_district: Option<BTreeMap<String, Vec<Clinic>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl DatasetFile {
    /// Build a complete document from a flat clinic list, filling in the
    /// grouping and metadata
    pub fn from_clinics(clinics: Vec<Clinic>, generated_at: Option<DateTime<Utc>>) -> Self {
        let mut grouped: BTreeMap<String, Vec<Clinic>> = BTreeMap::new();
        for clinic in clinics.iter() {
            grouped
                .entry(clinic.district.clone())
                .or_default()
                .push(clinic.clone());
        }
        let metadata = Metadata::describe(&clinics, generated_at);
        DatasetFile {
            clinics,
            clinics_by_district: Some(grouped),
            metadata: Some(metadata),
        }
    }
}

/// The static, validated clinic collection for a session
#[derive(Debug, Clone)]
pub struct Dataset {
    clinics: Vec<Clinic>,
    index: HashMap<ClinicId, usize>,
    by_district: BTreeMap<String, Vec<usize>>,
    metadata: Metadata,
}

impl Dataset {
    /// Read and validate a dataset document from disk
    pub fn load(path: &Path) -> Result<Self, ClinicMapError> {
        debug!("reading dataset from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let dataset = Dataset::from_json(&contents)?;
        info!(
            "loaded {} clinics across {} districts",
            dataset.clinics.len(),
            dataset.by_district.len()
        );
        Ok(dataset)
    }

    pub fn from_json(input: &str) -> Result<Self, ClinicMapError> {
        let file: DatasetFile = serde_json::from_str(input)?;
        Dataset::from_file(file)
    }

    pub fn from_file(file: DatasetFile) -> Result<Self, ClinicMapError> {
        let DatasetFile {
            clinics,
            clinics_by_district,
            metadata,
        } = file;
        let dataset = Dataset::from_clinics(clinics)?;
        if let Some(grouping) = clinics_by_district {
            dataset.check_grouping(&grouping)?;
        }
        match metadata {
            Some(claimed) => {
                dataset.check_metadata(&claimed);
                // counts always come from the records
                let mut metadata = Metadata::describe(&dataset.clinics, claimed.generated_at);
                if !claimed.designations.is_empty() {
                    metadata.designations = claimed.designations;
                }
                Ok(Dataset { metadata, ..dataset })
            }
            None => Ok(dataset),
        }
    }

    /// Validate a flat clinic list and derive the district grouping from it
    pub fn from_clinics(clinics: Vec<Clinic>) -> Result<Self, ClinicMapError> {
        let mut index = HashMap::with_capacity(clinics.len());
        let mut by_district: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, clinic) in clinics.iter().enumerate() {
            check_coordinates(clinic)?;
            if index.insert(clinic.sn, idx).is_some() {
                return Err(ClinicMapError::DuplicateClinic(clinic.sn));
            }
            by_district
                .entry(clinic.district.clone())
                .or_default()
                .push(idx);
        }
        let metadata = Metadata::describe(&clinics, None);
        Ok(Dataset {
            clinics,
            index,
            by_district,
            metadata,
        })
    }

    fn check_grouping(&self, grouping: &BTreeMap<String, Vec<Clinic>>) -> Result<(), ClinicMapError> {
        for (district, group) in grouping {
            if let Some(stray) = group.iter().find(|c| &c.district != district) {
                return Err(ClinicMapError::InconsistentGrouping(format!(
                    "clinic {} is filed under '{}' but belongs to '{}'",
                    stray.sn, district, stray.district
                )));
            }
            let expected: Vec<ClinicId> = self.district(district).map(|c| c.sn).collect();
            let actual: Vec<ClinicId> = group.iter().map(|c| c.sn).collect();
            if expected != actual {
                return Err(ClinicMapError::InconsistentGrouping(format!(
                    "district '{}' lists clinics {:?}, expected {:?}",
                    district, actual, expected
                )));
            }
        }
        if let Some(missing) = self.by_district.keys().find(|d| !grouping.contains_key(*d)) {
            return Err(ClinicMapError::InconsistentGrouping(format!(
                "district '{}' has clinics but no group",
                missing
            )));
        }
        Ok(())
    }

    fn check_metadata(&self, metadata: &Metadata) {
        let derived = Metadata::describe(&self.clinics, None);
        let checks = [
            ("total", metadata.total, derived.total),
            ("districts", metadata.districts, derived.districts),
            ("functional", metadata.functional, derived.functional),
            ("nonFunctional", metadata.non_functional, derived.non_functional),
        ];
        for (name, claimed, actual) in checks {
            if claimed != actual {
                warn!(
                    "metadata {} is {}, but the records give {}; using the records",
                    name, claimed, actual
                );
            }
        }
    }

    pub fn clinics(&self) -> &[Clinic] {
        &self.clinics
    }

    pub fn clinic(&self, sn: ClinicId) -> Option<&Clinic> {
        self.index.get(&sn).map(|&idx| &self.clinics[idx])
    }

    /// Clinics in `district`, in dataset order; empty for an unknown district
    pub fn district<'a>(&'a self, district: &str) -> impl Iterator<Item = &'a Clinic> + use<'a> {
        self.by_district
            .get(district)
            .into_iter()
            .flatten()
            .map(|&idx| &self.clinics[idx])
    }

    /// District names in sorted order, with their clinic counts
    pub fn districts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.by_district
            .iter()
            .map(|(name, members)| (name.as_str(), members.len()))
    }

    pub fn has_district(&self, district: &str) -> bool {
        self.by_district.contains_key(district)
    }

    /// Distinct counsellor designations, from the metadata if the producer
    /// listed them, otherwise from the records
    pub fn designations(&self) -> Vec<String> {
        if self.metadata.designations.is_empty() {
            distinct_designations(&self.clinics)
        } else {
            self.metadata.designations.clone()
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

fn check_coordinates(clinic: &Clinic) -> Result<(), ClinicMapError> {
    let (latitude, longitude) = clinic.coordinates();
    if latitude.is_finite()
        && longitude.is_finite()
        && (-90. ..=90.).contains(&latitude)
        && (-180. ..=180.).contains(&longitude)
    {
        Ok(())
    } else {
        Err(ClinicMapError::InvalidCoordinate {
            sn: clinic.sn,
            latitude,
            longitude,
        })
    }
}

impl Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unknown = count_status(&self.clinics, Status::Unknown);
        writeln!(f, "Clinics:           {: >4}", self.clinics.len())?;
        writeln!(f, "Districts:         {: >4}", self.by_district.len())?;
        writeln!(
            f,
            "Functional:        {: >4}",
            count_status(&self.clinics, Status::Functional)
        )?;
        writeln!(
            f,
            "Non-Functional:    {: >4}",
            count_status(&self.clinics, Status::NonFunctional)
        )?;
        writeln!(f, "Unknown Status:    {: >4}", unknown)?;
        writeln!(f, "Designations:      {}", self.designations().join(", "))?;
        match self.metadata.generated_at {
            Some(t) => write!(f, "Generated At:      {}", t),
            None => write!(f, "Generated At:      unknown"),
        }
    }
}

#[cfg(test)]
const SAMPLE: &str = r#"{
  "clinics": [
    {"sn": 1, "district": "Amritsar", "name": "OOAT Clinic Ajnala", "latitude": 31.84, "longitude": 74.76,
     "status": "Functional",
     "counsellors": [{"name": "R. Kaur", "designation": "Counsellor", "contact": "98140", "gender": "F", "facilityType": "OOAT"}]},
    {"sn": 2, "district": "Bathinda", "name": "OOAT Clinic Rampura", "latitude": 30.25, "longitude": 75.24,
     "status": "Non-Functional"},
    {"sn": 3, "district": "Amritsar", "name": "OOAT Clinic Attari", "latitude": 31.6, "longitude": 74.6,
     "status": "Unknown", "counsellors": null}
  ],
  "clinicsByDistrict": {
    "Amritsar": [
      {"sn": 1, "district": "Amritsar", "name": "OOAT Clinic Ajnala", "latitude": 31.84, "longitude": 74.76, "status": "Functional"},
      {"sn": 3, "district": "Amritsar", "name": "OOAT Clinic Attari", "latitude": 31.6, "longitude": 74.6, "status": "Unknown"}
    ],
    "Bathinda": [
      {"sn": 2, "district": "Bathinda", "name": "OOAT Clinic Rampura", "latitude": 30.25, "longitude": 75.24, "status": "Non-Functional"}
    ]
  },
  "metadata": {"total": 3, "districts": 2, "functional": 1, "nonFunctional": 1,
               "designations": ["Counsellor"], "generatedAt": "2025-02-03T04:05:06Z"}
}"#;

#[cfg(test)]
fn sample_with(edit: impl FnOnce(&mut Value)) -> String {
    let mut doc: Value = serde_json::from_str(SAMPLE).unwrap();
    edit(&mut doc);
    doc.to_string()
}

#[test]
fn test_from_json() {
    let dataset = Dataset::from_json(SAMPLE).unwrap();
    assert_eq!(dataset.clinics().len(), 3);
    let districts: Vec<(&str, usize)> = dataset.districts().collect();
    assert_eq!(districts, vec![("Amritsar", 2), ("Bathinda", 1)]);
    let amritsar: Vec<u32> = dataset.district("Amritsar").map(|c| c.sn.0).collect();
    assert_eq!(amritsar, vec![1, 3]);
    assert_eq!(dataset.district("Ludhiana").count(), 0);

    let ajnala = dataset.clinic(ClinicId(1)).unwrap();
    assert_eq!(ajnala.status, Status::Functional);
    assert_eq!(ajnala.counsellors[0].contact.as_deref(), Some("98140"));
    assert_eq!(ajnala.counsellors[0].facility_type.as_deref(), Some("OOAT"));
    assert_eq!(ajnala.location(), Point::new(74.76, 31.84));
    assert_eq!(dataset.clinic(ClinicId(2)).unwrap().status, Status::NonFunctional);
    assert!(dataset.clinic(ClinicId(2)).unwrap().counsellors.is_empty());
    assert!(dataset.clinic(ClinicId(3)).unwrap().counsellors.is_empty());
    assert!(dataset.clinic(ClinicId(4)).is_none());

    assert_eq!(dataset.designations(), vec!["Counsellor".to_string()]);
    assert_eq!(
        dataset.metadata().generated_at.unwrap().to_rfc3339(),
        "2025-02-03T04:05:06+00:00"
    );
}

#[test]
fn test_malformed_counsellors_become_empty() {
    let input = sample_with(|doc| {
        doc["clinics"][0]["counsellors"] = Value::String("see attached sheet".to_string());
        doc["clinics"][2]["counsellors"] = serde_json::json!([
            42,
            {"name": "S. Singh", "designation": "Psychologist", "contact": ""},
            {"designation": "Counsellor"}
        ]);
    });
    let dataset = Dataset::from_json(&input).unwrap();
    assert!(dataset.clinic(ClinicId(1)).unwrap().counsellors.is_empty());
    let attari = dataset.clinic(ClinicId(3)).unwrap();
    assert_eq!(attari.counsellors.len(), 1);
    assert_eq!(attari.counsellors[0].name, "S. Singh");
    assert_eq!(attari.counsellors[0].contact, None);
}

#[test]
fn test_metadata_counts_follow_records() {
    let input = sample_with(|doc| {
        doc["metadata"]["total"] = Value::from(99);
        doc["metadata"]["functional"] = Value::from(42);
        doc["metadata"]["districts"] = Value::from(7);
    });
    let dataset = Dataset::from_json(&input).unwrap();
    let metadata = dataset.metadata();
    assert_eq!(metadata.total, dataset.clinics().len());
    assert_eq!(metadata.functional, 1);
    assert_eq!(metadata.non_functional, 1);
    assert_eq!(metadata.districts, 2);
    assert_eq!(metadata.designations, vec!["Counsellor".to_string()]);
    assert_eq!(
        metadata.generated_at.unwrap().to_rfc3339(),
        "2025-02-03T04:05:06+00:00"
    );
}

#[test]
fn test_grouping_is_optional() {
    let input = sample_with(|doc| {
        doc.as_object_mut().unwrap().remove("clinicsByDistrict");
        doc.as_object_mut().unwrap().remove("metadata");
    });
    let dataset = Dataset::from_json(&input).unwrap();
    assert_eq!(dataset.districts().count(), 2);
    assert_eq!(dataset.metadata().total, 3);
    assert!(dataset.metadata().generated_at.is_none());
}

#[test]
fn test_inconsistent_grouping() {
    let misfiled = sample_with(|doc| {
        let stray = doc["clinicsByDistrict"]["Bathinda"][0].clone();
        doc["clinicsByDistrict"]["Amritsar"]
            .as_array_mut()
            .unwrap()
            .push(stray);
    });
    assert!(matches!(
        Dataset::from_json(&misfiled),
        Err(ClinicMapError::InconsistentGrouping(_))
    ));

    let reordered = sample_with(|doc| {
        doc["clinicsByDistrict"]["Amritsar"]
            .as_array_mut()
            .unwrap()
            .reverse();
    });
    assert!(matches!(
        Dataset::from_json(&reordered),
        Err(ClinicMapError::InconsistentGrouping(_))
    ));

    let missing_group = sample_with(|doc| {
        doc["clinicsByDistrict"]
            .as_object_mut()
            .unwrap()
            .remove("Bathinda");
    });
    assert!(matches!(
        Dataset::from_json(&missing_group),
        Err(ClinicMapError::InconsistentGrouping(_))
    ));
}

#[test]
fn test_duplicate_clinic() {
    let input = sample_with(|doc| {
        doc["clinics"][2]["sn"] = Value::from(1);
    });
    assert!(matches!(
        Dataset::from_json(&input),
        Err(ClinicMapError::DuplicateClinic(ClinicId(1)))
    ));
}

#[test]
fn test_invalid_coordinates() {
    for (latitude, longitude) in [(91., 75.), (-90.5, 75.), (31., 180.5), (31., -181.)] {
        let input = sample_with(|doc| {
            doc["clinics"][1]["latitude"] = Value::from(latitude);
            doc["clinics"][1]["longitude"] = Value::from(longitude);
        });
        match Dataset::from_json(&input) {
            Err(ClinicMapError::InvalidCoordinate { sn, .. }) => assert_eq!(sn, ClinicId(2)),
            other => panic!("expected invalid coordinate, got {:?}", other),
        }
    }
}

#[test]
fn test_missing_location_fails_to_parse() {
    let input = sample_with(|doc| {
        doc["clinics"][0].as_object_mut().unwrap().remove("latitude");
    });
    assert!(matches!(
        Dataset::from_json(&input),
        Err(ClinicMapError::InvalidJson(_))
    ));
}

#[test]
fn test_dataset_file_round_trip() {
    let dataset = Dataset::from_json(SAMPLE).unwrap();
    let file = DatasetFile::from_clinics(dataset.clinics().to_vec(), None);
    let grouped = file.clinics_by_district.as_ref().unwrap();
    assert_eq!(grouped["Amritsar"].len(), 2);
    assert_eq!(file.metadata.as_ref().unwrap().non_functional, 1);
    let rebuilt = Dataset::from_json(&serde_json::to_string(&file).unwrap()).unwrap();
    assert_eq!(rebuilt.clinics(), dataset.clinics());
}
