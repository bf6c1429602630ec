use std::{error::Error, fs::File, io::Write, path::PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand};
use clinic_map::{Dataset, DatasetFile};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod clinics;
mod counsellors;

/// Build the clinic map dataset from spreadsheet exports
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct DataToolCli {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Converts the clinic sheet, and optionally the counsellor sheet, to a
    /// dataset JSON file
    Convert {
        /// Path to the clinic sheet as CSV
        clinics: PathBuf,
        /// Path to the counsellor sheet as CSV
        #[arg(long)]
        counsellors: Option<PathBuf>,
        /// Path to the output file; defaults to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn convert(
    clinic_sheet: PathBuf,
    counsellor_sheet: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let mut clinics = clinics::read_clinics(File::open(&clinic_sheet)?)?;
    info!("read {} clinics from {}", clinics.len(), clinic_sheet.display());

    if let Some(path) = counsellor_sheet {
        let rows = counsellors::read_counsellor_rows(File::open(&path)?)?;
        info!("read {} counsellors from {}", rows.len(), path.display());
        counsellors::embed_counsellors(&mut clinics, rows)?;
    }

    let file = DatasetFile::from_clinics(clinics, Some(Utc::now()));
    let json = serde_json::to_string_pretty(&file)?;
    // refuse to write anything the map would reject on load
    let dataset = Dataset::from_json(&json)?;
    info!("{}", dataset);

    match output {
        Some(path) => {
            File::create(&path)?.write_all(json.as_bytes())?;
            info!("wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match DataToolCli::parse().action {
        Action::Convert {
            clinics,
            counsellors,
            output,
        } => convert(clinics, counsellors, output)?,
    }
    Ok(())
}
