use image::{GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};

/// Tesseract page segmentation mode.
///
/// Photos of a single printed roster read best as one block; a roll-number
/// column as a column; a classroom photo with scattered ID cards as sparse text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegMode {
    /// Fully automatic page segmentation (psm 3)
    Auto,
    /// Single column of text of variable sizes (psm 4)
    SingleColumn,
    /// Single uniform block of text (psm 6)
    #[default]
    SingleBlock,
    /// Single text line (psm 7)
    SingleLine,
    /// Sparse text in no particular order (psm 11)
    SparseText,
}

impl PageSegMode {
    /// Numeric value passed to `--psm`.
    pub fn psm(self) -> u8 {
        match self {
            PageSegMode::Auto => 3,
            PageSegMode::SingleColumn => 4,
            PageSegMode::SingleBlock => 6,
            PageSegMode::SingleLine => 7,
            PageSegMode::SparseText => 11,
        }
    }
}

impl fmt::Display for PageSegMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageSegMode::Auto => "auto",
            PageSegMode::SingleColumn => "single_column",
            PageSegMode::SingleBlock => "single_block",
            PageSegMode::SingleLine => "single_line",
            PageSegMode::SparseText => "sparse_text",
        };
        write!(f, "{} (psm {})", name, self.psm())
    }
}

impl FromStr for PageSegMode {
    type Err = Error;

    /// Accepts either the mode name or the raw psm number.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "auto" | "3" => Ok(PageSegMode::Auto),
            "single_column" | "column" | "4" => Ok(PageSegMode::SingleColumn),
            "single_block" | "block" | "6" => Ok(PageSegMode::SingleBlock),
            "single_line" | "line" | "7" => Ok(PageSegMode::SingleLine),
            "sparse_text" | "sparse" | "11" => Ok(PageSegMode::SparseText),
            other => Err(Error::Config(format!(
                "unknown page segmentation mode '{}'",
                other
            ))),
        }
    }
}

/// The OCR engine boundary.
///
/// Implementations return the engine's recognized text untouched. Engine
/// failures are errors, never an empty string.
pub trait TextExtractor {
    fn extract_text(&self, image: &GrayImage, mode: PageSegMode) -> Result<String>;
}

impl<T: TextExtractor + ?Sized> TextExtractor for &T {
    fn extract_text(&self, image: &GrayImage, mode: PageSegMode) -> Result<String> {
        (**self).extract_text(image, mode)
    }
}

impl<T: TextExtractor + ?Sized> TextExtractor for Box<T> {
    fn extract_text(&self, image: &GrayImage, mode: PageSegMode) -> Result<String> {
        (**self).extract_text(image, mode)
    }
}

/// How the image reaches the tesseract process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageTransfer {
    /// PNG bytes piped through stdin
    #[default]
    Stdin,
    /// PNG written to a temporary file that is removed when the call returns
    TempFile,
}

/// Runs the `tesseract` command-line program.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    executable: PathBuf,
    tessdata_dir: Option<PathBuf>,
    language: String,
    transfer: ImageTransfer,
}

impl TesseractCli {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            tessdata_dir: None,
            language: "eng".to_string(),
            transfer: ImageTransfer::default(),
        }
    }

    pub fn with_tessdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tessdata_dir = Some(dir.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_transfer(mut self, transfer: ImageTransfer) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn command(&self, input: &str, mode: PageSegMode) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg(input).arg("stdout");
        if let Some(dir) = &self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd.arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(mode.psm().to_string());
        cmd
    }

    fn run_with_stdin(&self, png: &[u8], mode: PageSegMode) -> Result<Output> {
        let mut child = self
            .command("stdin", mode)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.launch_error(e))?;

        // Tesseract reads all of stdin before writing, so no deadlock here.
        // Dropping the handle after the write closes the pipe.
        let sent = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(png),
            None => Ok(()),
        };

        // Always reaped, even when the engine quit before reading the image
        let output = child
            .wait_with_output()
            .map_err(|e| Error::OcrEngine(format!("tesseract did not finish: {}", e)))?;

        if let Err(e) = sent {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::OcrEngine(format!(
                "failed to send image to tesseract ({}, {}): {}",
                e,
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }

    fn run_with_temp_file(&self, png: &[u8], mode: PageSegMode) -> Result<Output> {
        // Dropped (and deleted) on every return path below
        let mut temp_input = NamedTempFile::with_suffix(".png").map_err(transfer_error)?;
        temp_input.write_all(png).map_err(transfer_error)?;
        temp_input.flush().map_err(transfer_error)?;

        let input = temp_input.path().to_string_lossy().to_string();
        self.command(&input, mode)
            .output()
            .map_err(|e| self.launch_error(e))
    }

    fn launch_error(&self, e: std::io::Error) -> Error {
        Error::OcrEngine(format!(
            "failed to launch {}: {}",
            self.executable.display(),
            e
        ))
    }
}

fn transfer_error(e: std::io::Error) -> Error {
    Error::OcrEngine(format!("failed to write image for tesseract: {}", e))
}

impl TextExtractor for TesseractCli {
    fn extract_text(&self, image: &GrayImage, mode: PageSegMode) -> Result<String> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| Error::OcrEngine(format!("failed to encode image for OCR: {}", e)))?;

        debug!(
            "Running tesseract ({:?}, {}, {} bytes)",
            self.transfer,
            mode,
            png.len()
        );

        let output = match self.transfer {
            ImageTransfer::Stdin => self.run_with_stdin(&png, mode)?,
            ImageTransfer::TempFile => self.run_with_temp_file(&png, mode)?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::OcrEngine(format!(
                "tesseract failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| Error::OcrEngine(format!("tesseract output is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_psm_values() {
        assert_eq!(PageSegMode::SingleBlock.psm(), 6);
        assert_eq!(PageSegMode::SingleColumn.psm(), 4);
        assert_eq!(PageSegMode::SparseText.psm(), 11);
        assert_eq!(PageSegMode::default(), PageSegMode::SingleBlock);
    }

    #[test]
    fn test_parse_mode_names_and_numbers() {
        assert_eq!("6".parse::<PageSegMode>().unwrap(), PageSegMode::SingleBlock);
        assert_eq!("sparse".parse::<PageSegMode>().unwrap(), PageSegMode::SparseText);
        assert_eq!("Single-Column".parse::<PageSegMode>().unwrap(), PageSegMode::SingleColumn);
        assert!("13".parse::<PageSegMode>().is_err());
    }

    #[test]
    fn test_mode_serde_names() {
        let json = serde_json::to_string(&PageSegMode::SparseText).unwrap();
        assert_eq!(json, "\"sparse_text\"");
    }

    #[test]
    fn test_missing_executable_is_engine_error() {
        let image = GrayImage::from_pixel(8, 8, Luma([255]));
        for transfer in [ImageTransfer::Stdin, ImageTransfer::TempFile] {
            let engine = TesseractCli::new("/nonexistent/bin/tesseract").with_transfer(transfer);
            let result = engine.extract_text(&image, PageSegMode::SingleBlock);
            match result {
                Err(Error::OcrEngine(msg)) => assert!(msg.contains("failed to launch")),
                other => panic!("expected OcrEngine error, got {:?}", other),
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_exiting_early_reports_status() {
        // Large enough that the pipe fills before the engine exits
        let image = GrayImage::from_fn(2000, 2000, |x, y| Luma([((x * 31) ^ (y * 17)) as u8]));
        let engine = TesseractCli::new("/bin/false");

        match engine.extract_text(&image, PageSegMode::SingleBlock) {
            Err(Error::OcrEngine(msg)) => assert!(msg.contains("exit status"), "{}", msg),
            other => panic!("expected OcrEngine error, got {:?}", other),
        }
    }

    #[test]
    fn test_transfer_error_is_retryable() {
        let err = transfer_error(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(matches!(err, Error::OcrEngine(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_command_arguments() {
        let engine = TesseractCli::new("tesseract")
            .with_tessdata_dir("/data/tessdata")
            .with_language("eng");
        let cmd = engine.command("stdin", PageSegMode::SparseText);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec!["stdin", "stdout", "--tessdata-dir", "/data/tessdata", "-l", "eng", "--psm", "11"]
        );
    }
}
