use std::{
    error::Error,
    fs,
    io::{Read, stdin},
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use clinic_map::{
    AppConfig, ClinicId, Dataset, Event, Session,
    boundaries::{load_district_names, match_districts},
    render::selection_panel,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the dataset once, before any session state exists. There's no retry:
/// on failure the whole run is over.
fn load_dataset(dataset: Option<PathBuf>, config: &AppConfig) -> Result<Dataset, Box<dyn Error>> {
    let path = dataset.unwrap_or_else(|| config.input.dataset.clone());
    match Dataset::load(&path) {
        Ok(dataset) => Ok(dataset),
        Err(e) => {
            error!("failed to load {}: {}", path.display(), e);
            Err(format!(
                "Failed to load clinic data from {}: {}. Fix the dataset and run again.",
                path.display(),
                e
            )
            .into())
        }
    }
}

fn read_script(script: &str) -> Result<String, Box<dyn Error>> {
    if script == "-" {
        let mut input = String::new();
        stdin().read_to_string(&mut input)?;
        Ok(input)
    } else {
        Ok(fs::read_to_string(script)?)
    }
}

fn print_districts(dataset: &Dataset, boundaries: &Path) -> Result<(), Box<dyn Error>> {
    for (district, count) in dataset.districts() {
        println!("{: <28} {: >4}", district, count);
    }
    let names = load_district_names(boundaries)?;
    let report = match_districts(dataset, &names);
    println!(
        "\n{} of {} districts have a boundary polygon",
        report.matched.len(),
        report.matched.len() + report.without_boundary.len()
    );
    for district in report.without_boundary.iter() {
        println!("  no boundary:  {}", district);
    }
    for district in report.without_clinics.iter() {
        println!("  no clinics:   {}", district);
    }
    Ok(())
}

fn replay(session: &mut Session, script: &str) -> Result<(), Box<dyn Error>> {
    for (line_number, line) in script.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: Event = line
            .parse()
            .map_err(|e| format!("line {}: {}", line_number + 1, e))?;
        session.apply(&event);
        let frame = session.frame();
        println!("> {}", event);
        println!("{}", frame.stats);
        println!("{}", frame.legend);
        if let Some(panel) = frame.panel.as_ref() {
            println!("{}", panel);
        }
        println!();
    }
    Ok(())
}

/// Explore a clinic dataset: nearest clinics, designation filters, and map layers
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct ClinicMapCli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Path to the clinic dataset; defaults to the configured dataset
    #[arg(short, long, global = true)]
    dataset: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Prints a summary of the dataset
    Info,
    /// Lists the other clinics in a clinic's district, nearest first
    Nearest {
        /// Sequence number of the clinic
        sn: ClinicId,
        /// Only list counsellors with this designation; may be repeated
        #[arg(long = "designation")]
        designations: Vec<String>,
    },
    /// Writes the map layers for one filter state to stdout as GeoJSON
    ToGeojson {
        /// Colour markers by this designation; may be repeated
        #[arg(long = "designation")]
        designations: Vec<String>,
        /// Sequence number of the clinic to select
        #[arg(long)]
        select: Option<ClinicId>,
        /// Only show clinics in this district
        #[arg(long)]
        district: Option<String>,
    },
    /// Lists districts and checks them against the boundary polygons
    Districts {
        /// Path to the district boundary GeoJSON; defaults to the configured file
        #[arg(long)]
        boundaries: Option<PathBuf>,
    },
    /// Applies events from a script, one per line, printing the result of each
    Replay {
        /// Path to the event script; if equal to - (hyphen), read from stdin
        script: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = ClinicMapCli::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::default(),
    };

    // every command works on the dataset, so a bad file stops the run here
    let dataset = load_dataset(args.dataset, &config)?;

    match args.action {
        Action::Info => {
            println!("{}", dataset);
        }
        Action::Nearest { sn, designations } => {
            let mut session = Session::new(dataset);
            for designation in designations {
                session.apply(&Event::ToggleDesignation(designation));
            }
            session.apply(&Event::SelectClinic(sn));
            match selection_panel(session.dataset(), session.state()) {
                Some(panel) => println!("{}", panel),
                None => return Err(format!("No clinic with sequence number {}", sn).into()),
            }
        }
        Action::ToGeojson {
            designations,
            select,
            district,
        } => {
            let mut session = Session::new(dataset);
            if district.is_some() {
                session.apply(&Event::ShowDistrict(district));
            }
            for designation in designations {
                session.apply(&Event::ToggleDesignation(designation));
            }
            if let Some(sn) = select {
                session.apply(&Event::SelectClinic(sn));
            }
            let frame = session.frame();
            info!(
                "writing {} markers and {} distance lines",
                frame.markers.len(),
                frame.lines.len()
            );
            println!("{}", frame.to_geojson(&config.map)?);
        }
        Action::Districts { boundaries } => {
            let boundaries = boundaries.unwrap_or_else(|| config.input.boundaries.clone());
            print_districts(&dataset, &boundaries)?;
        }
        Action::Replay { script } => {
            let script = read_script(&script)?;
            let mut session = Session::new(dataset);
            replay(&mut session, &script)?;
        }
    };

    Ok(())
}

#[test]
fn test_dataset_is_a_global_option() {
    for argv in [
        ["clinic-map", "--dataset", "moga.json", "nearest", "12"],
        ["clinic-map", "nearest", "12", "--dataset", "moga.json"],
    ] {
        let args = ClinicMapCli::try_parse_from(argv).unwrap();
        assert_eq!(args.dataset, Some(PathBuf::from("moga.json")));
        assert!(matches!(args.action, Action::Nearest { sn: ClinicId(12), .. }));
    }
    let args = ClinicMapCli::try_parse_from(["clinic-map", "replay", "-"]).unwrap();
    assert_eq!(args.dataset, None);
    assert!(matches!(args.action, Action::Replay { script } if script == "-"));
}
