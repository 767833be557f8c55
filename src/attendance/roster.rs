//! Roster of enrolled students.
//!
//! CSV format expected:
//! student_id,roll_number,section[,name]
//!
//! The header row is skipped, malformed rows are skipped with a warning, and a
//! roll number repeated within one section rejects the whole roster.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

use crate::error::{Error, Result};

/// Opaque student identity, owned by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StudentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for StudentId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub student_id: StudentId,
    /// Canonical form: trimmed, upper-case
    pub roll_number: String,
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RosterEntry {
    pub fn new(
        student_id: impl Into<StudentId>,
        roll_number: &str,
        section: impl Into<String>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            roll_number: canonical_roll_number(roll_number),
            section: section.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

pub fn canonical_roll_number(roll_number: &str) -> String {
    roll_number.trim().to_uppercase()
}

/// Ordered list of enrolled students across one or more sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// Builds a roster, rejecting duplicate roll numbers within a section.
    pub fn new(entries: Vec<RosterEntry>) -> Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert((entry.section.as_str(), entry.roll_number.as_str())) {
                return Err(Error::Roster(format!(
                    "roll number {} appears more than once in section '{}'",
                    entry.roll_number, entry.section
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Loads a roster from a CSV file.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::Roster(format!("failed to open roster {}: {}", path.display(), e))
        })?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;

            // Skip header row
            if line_num == 0 {
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            match Self::parse_line(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("Skipping malformed roster row {}: {}", line_num + 1, e);
                }
            }
        }

        Self::new(entries)
    }

    fn parse_line(line: &str) -> Result<RosterEntry> {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();

        if parts.len() < 3 {
            return Err(Error::Roster(format!(
                "expected at least 3 columns, got {}",
                parts.len()
            )));
        }

        if parts[0].is_empty() || parts[1].is_empty() {
            return Err(Error::Roster(
                "student_id and roll_number must not be empty".to_string(),
            ));
        }

        let mut entry = RosterEntry::new(parts[0], parts[1], parts[2]);
        if let Some(name) = parts.get(3).filter(|n| !n.is_empty()) {
            entry = entry.with_name(*name);
        }
        Ok(entry)
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// Entries enrolled in `section`, in roster order.
    pub fn section(&self, section: &str) -> Vec<RosterEntry> {
        self.entries
            .iter()
            .filter(|e| e.section == section)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
