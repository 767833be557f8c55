//! Roll-number candidate extraction from raw OCR text.
//!
//! Each known roll-number shape is a named pattern. Every pattern runs over the
//! whole text and every hit is kept, so a full-format match and a bare 3-digit
//! fallback can both come out of the same photo. Telling them apart is the
//! matcher's job.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// How much a pattern's hit can be trusted to be a whole roll number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specificity {
    /// A fragment, typically the trailing digits of an occluded number
    Partial,
    /// A complete roll number in a known format
    #[default]
    Full,
}

/// One known roll-number shape.
#[derive(Debug, Clone)]
pub struct RollPattern {
    pub name: String,
    pub specificity: Specificity,
    regex: Regex,
}

impl RollPattern {
    /// Compiles a case-insensitive pattern. Word boundaries are the caller's choice.
    pub fn new(name: impl Into<String>, pattern: &str, specificity: Specificity) -> Result<Self> {
        let name = name.into();
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| Error::Pattern {
                name: name.clone(),
                source,
            })?;
        Ok(Self {
            name,
            specificity,
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Built-in shapes, most specific first. The example beside each is a
/// roll number the shape accepts.
const BUILTIN_PATTERNS: &[(&str, &str, Specificity)] = &[
    // 22B01A1234
    ("yy-l-bb-l-nnnn", r"\b[0-9]{2}[A-Z][0-9]{2}[A-Z][0-9]{4}\b", Specificity::Full),
    // A22B01C123
    ("l-yy-l-bb-l-nnn", r"\b[A-Z][0-9]{2}[A-Z][0-9]{2}[A-Z][0-9]{3}\b", Specificity::Full),
    // 2022A1234
    ("yyyy-l-nnnn", r"\b[0-9]{4}[A-Z][0-9]{4}\b", Specificity::Full),
    // CS22A1234
    ("ll-yy-l-nnnn", r"\b[A-Z]{2}[0-9]{2}[A-Z][0-9]{4}\b", Specificity::Full),
    // 22A123456
    ("yy-l-nnnnnn", r"\b[0-9]{2}[A-Z][0-9]{6}\b", Specificity::Full),
    // 2411CS010178
    ("yyyy-ll-nnnnnn", r"\b[0-9]{4}[A-Z]{2}[0-9]{6}\b", Specificity::Full),
    // 178, what survives when the leading characters are cut off
    ("nnn", r"\b[0-9]{3}\b", Specificity::Partial),
];

pub fn builtin_patterns() -> Vec<RollPattern> {
    BUILTIN_PATTERNS
        .iter()
        .map(|&(name, pattern, specificity)| {
            RollPattern::new(name, pattern, specificity).expect("built-in roll pattern is valid")
        })
        .collect()
}

/// Deduplicated, upper-cased candidate tokens from one recognition run.
///
/// Each token remembers the highest specificity of any pattern that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    tokens: BTreeMap<String, Specificity>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token, upper-casing it. Returns false if it was already present.
    pub fn insert(&mut self, token: &str, specificity: Specificity) -> bool {
        let normalized = token.trim().to_uppercase();
        match self.tokens.get_mut(&normalized) {
            Some(existing) => {
                *existing = (*existing).max(specificity);
                false
            }
            None => {
                self.tokens.insert(normalized, specificity);
                true
            }
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains_key(token)
    }

    pub fn specificity(&self, token: &str) -> Option<Specificity> {
        self.tokens.get(token).copied()
    }

    /// Tokens in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Keeps only tokens at or above `min`.
    pub fn filtered(&self, min: Specificity) -> CandidateSet {
        CandidateSet {
            tokens: self
                .tokens
                .iter()
                .filter(|(_, s)| **s >= min)
                .map(|(t, s)| (t.clone(), *s))
                .collect(),
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.tokens.keys().cloned().collect()
    }

    /// Merges another set into this one.
    pub fn extend_from(&mut self, other: &CandidateSet) {
        for (token, specificity) in &other.tokens {
            self.insert(token, *specificity);
        }
    }
}

/// Tokens supplied directly (not parsed) are taken as full roll numbers.
impl<S: AsRef<str>> FromIterator<S> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = CandidateSet::new();
        for token in iter {
            set.insert(token.as_ref(), Specificity::Full);
        }
        set
    }
}

/// Ordered set of roll-number patterns.
#[derive(Debug, Clone)]
pub struct RollNumberParser {
    patterns: Vec<RollPattern>,
    min_specificity: Specificity,
}

impl Default for RollNumberParser {
    fn default() -> Self {
        Self {
            patterns: builtin_patterns(),
            min_specificity: Specificity::Partial,
        }
    }
}

impl RollNumberParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops patterns below `min` from every subsequent parse.
    pub fn with_min_specificity(mut self, min: Specificity) -> Self {
        self.min_specificity = min;
        self
    }

    /// Appends a custom pattern after the built-in ones.
    pub fn with_pattern(mut self, pattern: RollPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn patterns(&self) -> &[RollPattern] {
        &self.patterns
    }

    pub fn min_specificity(&self) -> Specificity {
        self.min_specificity
    }

    /// Collects every match of every active pattern.
    pub fn parse_candidates(&self, text: &str) -> CandidateSet {
        let mut candidates = CandidateSet::new();
        for pattern in self
            .patterns
            .iter()
            .filter(|p| p.specificity >= self.min_specificity)
        {
            for m in pattern.regex.find_iter(text) {
                candidates.insert(m.as_str(), pattern.specificity);
            }
        }
        candidates
    }
}

/// Parses with the built-in patterns.
pub fn parse_candidates(text: &str) -> CandidateSet {
    static DEFAULT_PARSER: OnceLock<RollNumberParser> = OnceLock::new();
    DEFAULT_PARSER
        .get_or_init(RollNumberParser::default)
        .parse_candidates(text)
}
