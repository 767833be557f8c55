//! attendance-ocr
//!
//! Marks attendance from a photo of a roster or sign-in sheet by reading the
//! roll numbers in it and matching them against the enrolled students.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use attendance_ocr::config::{self, AppConfig};
use attendance_ocr::ocr::{self, PageSegMode};
use attendance_ocr::{AttendancePipeline, AttendanceReport, Roster, TracingSink};

#[derive(Parser, Debug)]
#[command(name = "attendance-ocr")]
#[command(about = "Mark attendance from roll numbers in a photo")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: config.json next to the executable)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log every pipeline step
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Match roll numbers in a photo against a roster and print a JSON report
    Mark {
        /// Photo of the roster, sign-in sheet, or classroom
        #[arg(short, long)]
        image: PathBuf,

        /// Roster CSV: student_id,roll_number,section[,name]
        #[arg(short, long)]
        roster: PathBuf,

        /// Only match students of this section
        #[arg(short, long)]
        section: Option<String>,

        /// Page segmentation mode (block, column, sparse, or a psm number)
        #[arg(long)]
        psm: Option<PageSegMode>,

        /// Include the raw OCR text on stderr
        #[arg(long)]
        show_text: bool,
    },

    /// Print the roll-number candidates found in a photo
    Scan {
        #[arg(short, long)]
        image: PathBuf,

        #[arg(long)]
        psm: Option<PageSegMode>,
    },

    /// Print the roll-number candidates found in a text file
    Parse {
        /// Text file, e.g. saved OCR output
        file: PathBuf,
    },

    /// Download the trained data for the configured language if missing
    Setup,

    /// Report where tesseract and its trained data were found
    Check,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => config::load_default_config(),
    };

    match args.command {
        Commands::Mark {
            image,
            roster,
            section,
            psm,
            show_text,
        } => run_mark(&config, &image, &roster, section.as_deref(), psm, show_text),
        Commands::Scan { image, psm } => run_scan(&config, &image, psm),
        Commands::Parse { file } => run_parse(&config, &file),
        Commands::Setup => run_setup(&config),
        Commands::Check => run_check(&config),
    }
}

fn build_pipeline(config: &AppConfig) -> Result<AttendancePipeline<ocr::TesseractCli>> {
    let engine = ocr::tesseract_from_settings(&config.ocr).context("OCR engine unavailable")?;
    info!("Using tesseract at {}", engine.executable().display());

    let pipeline = AttendancePipeline::from_config(engine, config)
        .context("Invalid parser configuration")?
        .with_event_sink(Arc::new(TracingSink));
    Ok(pipeline)
}

fn run_mark(
    config: &AppConfig,
    image: &Path,
    roster_path: &Path,
    section: Option<&str>,
    psm: Option<PageSegMode>,
    show_text: bool,
) -> Result<()> {
    let roster = Roster::from_csv(roster_path)
        .with_context(|| format!("Failed to load roster {}", roster_path.display()))?;
    let entries = match section {
        Some(name) => roster.section(name),
        None => roster.entries().to_vec(),
    };
    if entries.is_empty() {
        match section {
            Some(name) => warn!("Roster has no students in section {}", name),
            None => warn!("Roster has no students"),
        }
    }

    let bytes = std::fs::read(image).with_context(|| format!("Failed to read {}", image.display()))?;
    let pipeline = build_pipeline(config)?;
    let mode = psm.unwrap_or(config.ocr.page_segmentation_mode);

    let outcome = pipeline
        .recognize_with_mode(&bytes, &entries, mode)
        .with_context(|| format!("Recognition failed for {}", image.display()))?;

    if show_text {
        eprintln!("{}", outcome.raw_text);
    }
    if let Some(warning) = outcome.warning {
        warn!("{}", warning);
    }

    let report = AttendanceReport::from_outcome(&outcome, section);
    info!("{} ({} ms)", report.message, outcome.elapsed_ms);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_scan(config: &AppConfig, image: &Path, psm: Option<PageSegMode>) -> Result<()> {
    let bytes = std::fs::read(image).with_context(|| format!("Failed to read {}", image.display()))?;
    let pipeline = build_pipeline(config)?;
    let mode = psm.unwrap_or(config.ocr.page_segmentation_mode);

    let (candidates, _) = pipeline.scan(&bytes, mode)?;
    if candidates.is_empty() {
        warn!("No roll numbers detected");
    }
    for token in candidates.iter() {
        println!("{}", token);
    }
    Ok(())
}

fn run_parse(config: &AppConfig, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let parser = config.parser.build_parser()?;

    for token in parser.parse_candidates(&text).iter() {
        println!("{}", token);
    }
    Ok(())
}

fn run_setup(config: &AppConfig) -> Result<()> {
    let tessdata = ocr::ensure_tessdata(&config.ocr.language)
        .with_context(|| format!("Failed to set up trained data for '{}'", config.ocr.language))?;
    info!("Trained data for '{}' in {}", config.ocr.language, tessdata.display());
    Ok(())
}

fn run_check(config: &AppConfig) -> Result<()> {
    let located = ocr::locate_tesseract(&config.ocr).context("Tesseract not found")?;
    println!("executable: {}", located.executable.display());
    match &located.tessdata {
        Some(dir) => println!("tessdata:   {}", dir.display()),
        None => {
            warn!("No tessdata directory with '{}' found, run `setup`", config.ocr.language);
            println!("tessdata:   (engine default)");
        }
    }
    Ok(())
}
