use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

use crate::config::OcrSettings;
use crate::error::{Error, Result};
use crate::ocr::engine::TesseractCli;
use crate::paths;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "tesseract.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "tesseract";

#[cfg(windows)]
const COMMON_EXECUTABLE_PATHS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];
#[cfg(not(windows))]
const COMMON_EXECUTABLE_PATHS: &[&str] = &[
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
];

#[cfg(windows)]
const COMMON_TESSDATA_PATHS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
];
#[cfg(not(windows))]
const COMMON_TESSDATA_PATHS: &[&str] = &[
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
];

/// Where the OCR engine lives on this machine.
#[derive(Debug, Clone)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// `None` lets tesseract fall back to its compiled-in data path
    pub tessdata: Option<PathBuf>,
}

/// Builds a ready-to-use engine from the OCR settings.
pub fn tesseract_from_settings(settings: &OcrSettings) -> Result<TesseractCli> {
    let located = locate_tesseract(settings)?;

    let mut engine = TesseractCli::new(located.executable)
        .with_language(settings.language.clone())
        .with_transfer(settings.transfer);
    if let Some(dir) = located.tessdata {
        engine = engine.with_tessdata_dir(dir);
    }
    Ok(engine)
}

/// Finds the executable and the tessdata directory holding `settings.language`.
pub fn locate_tesseract(settings: &OcrSettings) -> Result<TesseractPaths> {
    let executable = match &settings.executable {
        Some(path) if path.exists() => path.clone(),
        Some(path) => {
            return Err(Error::OcrEngine(format!(
                "configured tesseract executable not found: {}",
                path.display()
            )));
        }
        None => find_tesseract_executable()?,
    };

    let tessdata = match &settings.tessdata_dir {
        Some(dir) => {
            if !has_traineddata(dir, &settings.language) {
                return Err(Error::OcrEngine(format!(
                    "{}.traineddata not found in configured tessdata dir {}",
                    settings.language,
                    dir.display()
                )));
            }
            Some(dir.clone())
        }
        None => find_tessdata_dir(&settings.language),
    };

    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

/// Finds the Tesseract executable, checking our local dir first, then system.
pub fn find_tesseract_executable() -> Result<PathBuf> {
    let local_exe = paths::get_tesseract_dir().join(EXECUTABLE_NAME);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    // Check PATH
    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for path in COMMON_EXECUTABLE_PATHS {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(Error::OcrEngine(
        "tesseract not found. Install Tesseract-OCR or set ocr.executable in config.json"
            .to_string(),
    ))
}

/// Finds a tessdata directory containing `<language>.traineddata`.
pub fn find_tessdata_dir(language: &str) -> Option<PathBuf> {
    let local_tessdata = paths::get_tessdata_dir();
    if has_traineddata(&local_tessdata, language) {
        return Some(local_tessdata);
    }

    // TESSDATA_PREFIX may point at the data dir itself or at its parent
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if has_traineddata(&p, language) {
            return Some(p);
        }
        let p = p.join("tessdata");
        if has_traineddata(&p, language) {
            return Some(p);
        }
    }

    COMMON_TESSDATA_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| has_traineddata(p, language))
}

fn has_traineddata(dir: &Path, language: &str) -> bool {
    dir.join(format!("{}.traineddata", language)).exists()
}

/// Ensures `<language>.traineddata` is available, downloading it into the
/// local tessdata directory when no installed copy exists.
pub fn ensure_tessdata(language: &str) -> Result<PathBuf> {
    if let Some(dir) = find_tessdata_dir(language) {
        info!("Found {}.traineddata in {}", language, dir.display());
        return Ok(dir);
    }

    let tessdata_dir = paths::get_tessdata_dir();
    fs::create_dir_all(&tessdata_dir)?;
    download_traineddata(language, &tessdata_dir)?;
    Ok(tessdata_dir)
}

/// Downloads trained data for one language from the tessdata repository.
fn download_traineddata(language: &str, tessdata_dir: &Path) -> Result<()> {
    let url = format!("{}/{}.traineddata", TESSDATA_REPO, language);
    let target = tessdata_dir.join(format!("{}.traineddata", language));

    info!("Downloading {}.traineddata from {}", language, url);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .map_err(|e| Error::OcrEngine(format!("failed to create HTTP client: {}", e)))?;

    let response = client
        .get(&url)
        .header("User-Agent", "attendance-ocr")
        .send()
        .map_err(|e| Error::OcrEngine(format!("download failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(Error::OcrEngine(format!(
            "failed to download {}.traineddata: HTTP {}",
            language,
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .map_err(|e| Error::OcrEngine(format!("download interrupted: {}", e)))?;

    // Write next to the target first so a failed download leaves no partial model
    let mut partial = tempfile::NamedTempFile::new_in(tessdata_dir)?;
    partial.write_all(&bytes)?;
    partial.persist(&target).map_err(|e| {
        warn!("Could not move downloaded model into place: {}", e);
        Error::Io(e.error)
    })?;

    info!("Downloaded {}.traineddata ({} bytes)", language, bytes.len());
    Ok(())
}
