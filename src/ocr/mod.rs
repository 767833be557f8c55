pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod setup;

pub use engine::{ImageTransfer, PageSegMode, TesseractCli, TextExtractor};
pub use extract::{parse_candidates, CandidateSet, RollNumberParser, RollPattern, Specificity};
pub use preprocess::{preprocess, Binarization, ContrastOptions, NormalizedImage, PreprocessOptions};
pub use setup::{ensure_tessdata, locate_tesseract, tesseract_from_settings, TesseractPaths};
