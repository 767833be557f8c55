//! Attendance from roll numbers.
//!
//! This module provides:
//! - The roster of enrolled students and its CSV loader
//! - Exact and suffix matching of candidates against the roster
//! - The photo-to-presence pipeline
//! - A serializable report of one run

pub mod matcher;
pub mod pipeline;
pub mod report;
pub mod roster;

pub use matcher::{resolve, resolve_with, AmbiguityReport, MatchKind, MatchOptions, MatchResult, PresenceSet};
pub use pipeline::{AttendancePipeline, RecognitionOutcome, RecognitionWarning};
pub use report::AttendanceReport;
pub use roster::{Roster, RosterEntry, StudentId};
