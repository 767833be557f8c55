//! Roll-number attendance recognition.
//!
//! Turns a photo of a roster, sign-in sheet, or classroom into a presence
//! decision for every enrolled student: the photo is normalized, read by
//! Tesseract, scanned for roll-number shapes, and matched against the roster
//! exactly or by the last three characters.
//!
//! Storing the result is left to the caller.

pub mod attendance;
pub mod config;
pub mod error;
pub mod events;
pub mod ocr;
pub mod paths;

pub use attendance::{
    resolve, AttendancePipeline, AttendanceReport, MatchKind, MatchResult, PresenceSet,
    RecognitionOutcome, RecognitionWarning, Roster, RosterEntry, StudentId,
};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use events::{EventSink, MemorySink, NoopSink, PipelineEvent, Stage, TracingSink};
pub use ocr::{parse_candidates, preprocess, CandidateSet, PageSegMode, TextExtractor};
