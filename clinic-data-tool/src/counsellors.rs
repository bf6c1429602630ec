use std::{
    collections::{BTreeSet, HashMap},
    error::Error,
    io::Read,
};

use clinic_map::{Clinic, Counsellor};
use regex::Regex;
use tracing::{debug, info, warn};

/// Minimum token overlap for a place of posting to count as a clinic
const MATCH_THRESHOLD: f64 = 0.15;

/// Spellings seen in the counsellor sheet, keyed by lowercase
const DESIGNATION_ALIASES: [(&str, &str); 7] = [
    ("counsellor", "Counsellor"),
    ("clinical psychologist", "Clinical Psychologist"),
    ("psychologist", "Psychologist"),
    ("psychiatric social worker", "Psychiatric Social Worker"),
    ("psychiatrict social worker", "Psychiatric Social Worker"),
    ("medical/psychiatric social worker", "Psychiatric Social Worker"),
    ("social worker", "Social Worker"),
];

/// Counsellor sheet district name (lowercase) to clinic sheet district name
const DISTRICT_ALIASES: [(&str, &str); 13] = [
    ("s.a.s nagar", "SAS nagar Mohali"),
    ("sbs nagar", "Shaheed Bhagat Singh Nagar"),
    ("roopnagar", "Rupnagar"),
    ("firozepur", "Ferozpur"),
    ("sri muktsar sahib", "Muktsar"),
    // Malerkotla was carved out of Sangrur after the boundaries were drawn
    ("malerkotla", "Sangrur"),
    ("pathankot", "Pathankot"),
    ("gurdaspur", "Gurdaspur"),
    ("fatehgarh sahib", "Fatehgarh Sahib"),
    ("jalandhar", "Jalandhar"),
    ("kapurthala", "Kapurthala"),
    ("faridkot", "Faridkot"),
    ("fazilka", "Fazilka"),
];

const ABBREVIATIONS: [(&str, &str); 8] = [
    (r"\bsdh\b", "sub divisional hospital"),
    (r"\bchc\b", "community health centre"),
    (r"\bphc\b", "primary health centre"),
    (r"\brh\b", "rural hospital"),
    (r"\bshc\b", "sub health centre"),
    (r"\bdh\b", "district hospital"),
    (r"\buphc\b", "urban primary health centre"),
    (r"\bmphc\b", "mini primary health centre"),
];

/// Words too common in facility names to tell clinics apart
const STOP_WORDS: [&str; 33] = [
    "ooat", "clinic", "centre", "center", "hospital", "govt", "government", "and", "the", "for",
    "health", "community", "district", "primary", "sub", "urban", "rural", "divisional", "mini",
    "medical", "college", "rehabilitation", "addiction", "drug", "deaddiction", "de", "care",
    "jail", "central", "new", "old", "general", "civil",
];

pub fn normalize_designation(designation: &str) -> String {
    let trimmed = designation.trim();
    if trimmed.is_empty() {
        return String::from("Counsellor");
    }
    let key = trimmed.to_lowercase();
    DESIGNATION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

pub struct Tokenizer {
    abbreviations: Vec<(Regex, &'static str)>,
    word: Regex,
}

impl Tokenizer {
    pub fn new() -> Result<Self, regex::Error> {
        let abbreviations = ABBREVIATIONS
            .iter()
            .map(|(pattern, expansion)| Ok((Regex::new(pattern)?, *expansion)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Tokenizer {
            abbreviations,
            word: Regex::new(r"[a-z0-9]+")?,
        })
    }

    /// Lowercase alphanumeric words longer than two characters, with facility
    /// abbreviations spelled out and stop words removed
    pub fn key_tokens(&self, name: &str) -> BTreeSet<String> {
        let mut expanded = name.to_lowercase();
        for (pattern, expansion) in self.abbreviations.iter() {
            expanded = pattern.replace_all(&expanded, *expansion).into_owned();
        }
        self.word
            .find_iter(&expanded)
            .map(|m| m.as_str())
            .filter(|t| t.len() > 2 && !STOP_WORDS.contains(t))
            .map(str::to_string)
            .collect()
    }
}

pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.;
    }
    let shared = a.intersection(b).count();
    let combined = a.union(b).count();
    shared as f64 / combined as f64
}

/// One row of the counsellor sheet, after cleanup
#[derive(Debug, Clone, PartialEq)]
pub struct CounsellorRow {
    pub district: String,
    pub place_of_posting: String,
    pub counsellor: Counsellor,
}

fn cell(record: &csv::StringRecord, idx: usize) -> Option<String> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_label_row(record: &csv::StringRecord) -> bool {
    let name = cell(record, 4).unwrap_or_default().to_lowercase();
    let posting = cell(record, 6).unwrap_or_default().to_lowercase();
    name.starts_with("name") && posting.contains("posting")
}

/// Read the counsellor sheet. Columns are positional: serial number, CRC
/// name, sub-serial, district, name, designation, place of posting, facility
/// type, contact, gender, email. The district column is only filled on the
/// first row of each block, so blanks inherit the district above.
///
/// The sheet as exported usually has a title line above the column labels.
/// The first line is always treated as a header, and a later line whose name
/// and posting cells are column labels is skipped, so both layouts read the
/// same.
pub fn read_counsellor_rows<R: Read>(input: R) -> Result<Vec<CounsellorRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let mut rows = vec![];
    let mut current_district = String::new();
    for record in reader.records() {
        let record = record?;
        if is_label_row(&record) {
            debug!(
                "skipping column labels at line {:?}",
                record.position().map(|p| p.line())
            );
            continue;
        }
        if let Some(district) = cell(&record, 3) {
            current_district = district;
        }
        let (Some(name), Some(place_of_posting)) = (cell(&record, 4), cell(&record, 6)) else {
            continue;
        };
        rows.push(CounsellorRow {
            district: current_district.clone(),
            place_of_posting,
            counsellor: Counsellor {
                name,
                designation: normalize_designation(&cell(&record, 5).unwrap_or_default()),
                contact: cell(&record, 8),
                gender: cell(&record, 9),
                facility_type: cell(&record, 7),
            },
        });
    }
    Ok(rows)
}

/// Resolve a counsellor sheet district to the spelling the clinic sheet uses
fn resolve_district(district: &str, clinic_districts: &HashMap<String, String>) -> String {
    let key = district.trim().to_lowercase();
    if let Some((_, canonical)) = DISTRICT_ALIASES.iter().find(|(alias, _)| *alias == key) {
        return canonical.to_string();
    }
    clinic_districts
        .get(&key)
        .cloned()
        .unwrap_or_else(|| district.trim().to_string())
}

#[derive(Debug, Default, PartialEq)]
pub struct MatchSummary {
    pub matched: usize,
    pub unmatched: usize,
}

/// Attach each counsellor to the clinic in their district whose name best
/// overlaps their place of posting. Counsellors from a district with no
/// clinics are matched against every clinic.
pub fn embed_counsellors(
    clinics: &mut [Clinic],
    rows: Vec<CounsellorRow>,
) -> Result<MatchSummary, Box<dyn Error>> {
    let tokenizer = Tokenizer::new()?;
    let clinic_tokens: Vec<BTreeSet<String>> =
        clinics.iter().map(|c| tokenizer.key_tokens(&c.name)).collect();
    let clinic_districts: HashMap<String, String> = clinics
        .iter()
        .map(|c| (c.district.trim().to_lowercase(), c.district.clone()))
        .collect();

    let mut summary = MatchSummary::default();
    for row in rows {
        let district = resolve_district(&row.district, &clinic_districts);
        let in_district: Vec<usize> = (0..clinics.len())
            .filter(|&idx| clinics[idx].district == district)
            .collect();
        let candidates = if in_district.is_empty() {
            (0..clinics.len()).collect()
        } else {
            in_district
        };

        let posting_tokens = tokenizer.key_tokens(&row.place_of_posting);
        let mut best: Option<(usize, f64)> = None;
        for idx in candidates {
            let score = jaccard(&posting_tokens, &clinic_tokens[idx]);
            if score > best.map_or(0., |(_, s)| s) {
                best = Some((idx, score));
            }
        }

        match best {
            Some((idx, score)) if score >= MATCH_THRESHOLD => {
                clinics[idx].counsellors.push(row.counsellor);
                summary.matched += 1;
            }
            _ => {
                warn!(
                    "no clinic for {} posted at '{}' ({}); best: {}",
                    row.counsellor.name,
                    row.place_of_posting,
                    row.district,
                    best.map_or(String::from("none"), |(idx, score)| format!(
                        "'{}' at {:.3}",
                        clinics[idx].name, score
                    ))
                );
                summary.unmatched += 1;
            }
        }
    }
    info!(
        "matched {} counsellors, {} unmatched",
        summary.matched, summary.unmatched
    );
    Ok(summary)
}

#[cfg(test)]
use clinic_map::{ClinicId, Status};

#[cfg(test)]
fn clinic(sn: u32, district: &str, name: &str) -> Clinic {
    Clinic {
        sn: ClinicId(sn),
        district: district.to_string(),
        name: name.to_string(),
        latitude: 31.,
        longitude: 75.,
        status: Status::Functional,
        counsellors: vec![],
    }
}

#[test]
fn test_designations_are_normalized() {
    assert_eq!(normalize_designation("  counsellor "), "Counsellor");
    assert_eq!(
        normalize_designation("Psychiatrict Social Worker"),
        "Psychiatric Social Worker"
    );
    assert_eq!(normalize_designation(""), "Counsellor");
    assert_eq!(normalize_designation("Peer Supporter"), "Peer Supporter");
}

#[test]
fn test_tokens_expand_abbreviations_and_drop_stop_words() {
    let tokenizer = Tokenizer::new().unwrap();
    let tokens = tokenizer.key_tokens("OOAT Clinic, CHC Bhikhiwind");
    assert_eq!(tokens, BTreeSet::from(["bhikhiwind".to_string()]));
    let tokens = tokenizer.key_tokens("SDH Baba Bakala Sahib");
    assert_eq!(
        tokens,
        BTreeSet::from([
            "baba".to_string(),
            "bakala".to_string(),
            "sahib".to_string()
        ])
    );
}

#[test]
fn test_jaccard_overlap() {
    let a = BTreeSet::from(["baba".to_string(), "bakala".to_string()]);
    let b = BTreeSet::from(["bakala".to_string(), "sahib".to_string()]);
    assert!((jaccard(&a, &b) - 1. / 3.).abs() < 1e-12);
    assert_eq!(jaccard(&a, &BTreeSet::new()), 0.);
}

#[test]
fn test_read_rows_fills_districts_down() {
    let sheet = "\
sr,crc,sub,district,name,designation,posting,facility,contact,gender,email
1,CRC,1,Amritsar,R. Kaur,counsellor,CHC Ajnala,OOAT,98140,F,
2,CRC,2,,P. Sandhu,,SDH Attari,OOAT,,M,
3,CRC,3,,,Counsellor,Vacant,,,,
4,CRC,1,Sri Muktsar Sahib,G. Gill,Social worker,CHC Lambi,OOAT,98720,F,
";
    let rows = read_counsellor_rows(sheet.as_bytes()).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].district, "Amritsar");
    assert_eq!(rows[1].counsellor.designation, "Counsellor");
    assert_eq!(rows[1].counsellor.contact, None);
    assert_eq!(rows[2].counsellor.designation, "Social Worker");
    assert_eq!(rows[2].counsellor.facility_type.as_deref(), Some("OOAT"));
}

#[test]
fn test_read_rows_skips_title_line() {
    let sheet = "\
Counsellors posted at OOAT clinics,,,,,,,,,,
Sr. No.,CRC,Sub Sr.,District,Name,Designation,Place of Posting,Facility Type,Contact,Gender,Email
1,CRC,1,Amritsar,R. Kaur,Counsellor,CHC Ajnala,OOAT,98140,F,
2,CRC,2,,P. Sandhu,Psychologist,SDH Attari,OOAT,,M,
";
    let rows = read_counsellor_rows(sheet.as_bytes()).unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r.counsellor.name.as_str()).collect();
    assert_eq!(names, vec!["R. Kaur", "P. Sandhu"]);
    assert_eq!(rows[1].district, "Amritsar");
}

#[test]
fn test_counsellors_land_on_best_matching_clinic() {
    let mut clinics = vec![
        clinic(1, "Amritsar", "OOAT Clinic CHC Ajnala"),
        clinic(2, "Amritsar", "OOAT Clinic SDH Attari"),
        clinic(3, "Muktsar", "OOAT Clinic CHC Lambi"),
        clinic(4, "Bathinda", "OOAT Clinic Ajnala Road"),
    ];
    let sheet = "\
sr,crc,sub,district,name,designation,posting,facility,contact,gender,email
1,CRC,1,Amritsar,R. Kaur,Counsellor,Community Health Centre Ajnala,OOAT,98140,F,
2,CRC,2,,P. Sandhu,Psychologist,Attari,OOAT,,M,
3,CRC,1,Sri Muktsar Sahib,G. Gill,Social Worker,CHC Lambi,OOAT,98720,F,
4,CRC,1,Mansa,H. Brar,Counsellor,Lambi,OOAT,,F,
5,CRC,1,Amritsar,J. Dhillon,Counsellor,Central Jail,OOAT,,M,
";
    let rows = read_counsellor_rows(sheet.as_bytes()).unwrap();
    let summary = embed_counsellors(&mut clinics, rows).unwrap();
    assert_eq!(
        summary,
        MatchSummary {
            matched: 4,
            unmatched: 1
        }
    );
    let names = |c: &Clinic| -> Vec<String> {
        c.counsellors.iter().map(|c| c.name.clone()).collect()
    };
    assert_eq!(names(&clinics[0]), vec!["R. Kaur"]);
    assert_eq!(names(&clinics[1]), vec!["P. Sandhu"]);
    // Mansa has no clinics, so H. Brar is matched across all districts
    assert_eq!(names(&clinics[2]), vec!["G. Gill", "H. Brar"]);
    assert!(clinics[3].counsellors.is_empty());
}
