//! Error types for the recognition pipeline.

use thiserror::Error;

/// Errors raised while recognizing roll numbers from a photo.
///
/// A photo with no recognizable roll numbers is not an error; see
/// [`crate::attendance::RecognitionWarning`].
#[derive(Error, Debug)]
pub enum Error {
    /// The input bytes could not be decoded as an image.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The OCR engine could not run or produced unreadable output.
    #[error("OCR engine error: {0}")]
    OcrEngine(String),

    #[error("roster error: {0}")]
    Roster(String),

    #[error("config error: {0}")]
    Config(String),

    /// A custom roll-number pattern failed to compile.
    #[error("invalid roll-number pattern '{name}': {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for failures the caller may retry with different OCR settings.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::OcrEngine(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_image_display() {
        let error = Error::InvalidImage("zero dimensions".to_string());
        assert_eq!(error.to_string(), "invalid image: zero dimensions");
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_ocr_engine_is_retryable() {
        let error = Error::OcrEngine("tesseract exited with status 1".to_string());
        assert!(error.to_string().starts_with("OCR engine error"));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_error_from_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Json(_)));
    }

    #[test]
    fn test_pattern_error_names_pattern() {
        let source = regex::Regex::new("(").unwrap_err();
        let error = Error::Pattern {
            name: "broken".to_string(),
            source,
        };
        assert!(error.to_string().contains("'broken'"));
    }
}
