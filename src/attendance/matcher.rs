//! Reconciles candidate tokens against the roster.
//!
//! Per roster entry, in roster order:
//! 1. Exact: the full roll number is a candidate.
//! 2. Suffix: some candidate of at least three characters ends with the same
//!    three characters as the roll number.
//! 3. Otherwise unmatched.
//!
//! Entries are evaluated independently. One ambiguous token may mark several
//! students present, and the ambiguity is reported rather than resolved.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::roster::{RosterEntry, StudentId};
use crate::events::{EventSink, NoopSink, PipelineEvent, Stage};
use crate::ocr::CandidateSet;

pub const DEFAULT_SUFFIX_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Suffix,
    None,
}

/// Outcome for one roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub student_id: StudentId,
    pub roll_number: String,
    pub matched: bool,
    pub kind: MatchKind,
    /// Candidate that produced the match
    pub matched_token: Option<String>,
}

/// Where suffix matching was not one-to-one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AmbiguityReport {
    /// Tokens that satisfied more than one student, exactly or by suffix
    pub shared_tokens: BTreeMap<String, Vec<StudentId>>,
    /// Students whose suffix was satisfied by more than one token
    pub multi_candidate_students: Vec<StudentId>,
}

impl AmbiguityReport {
    pub fn count(&self) -> usize {
        self.shared_tokens.len() + self.multi_candidate_students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// One [`MatchResult`] per roster entry, in roster order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PresenceSet {
    pub results: Vec<MatchResult>,
    pub ambiguity: AmbiguityReport,
}

impl PresenceSet {
    pub fn present(&self) -> impl Iterator<Item = &MatchResult> {
        self.results.iter().filter(|r| r.matched)
    }

    pub fn absent(&self) -> impl Iterator<Item = &MatchResult> {
        self.results.iter().filter(|r| !r.matched)
    }

    pub fn present_count(&self) -> usize {
        self.present().count()
    }

    pub fn get(&self, student_id: &StudentId) -> Option<&MatchResult> {
        self.results.iter().find(|r| &r.student_id == student_id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Run the suffix phase when the exact phase fails
    pub suffix_fallback: bool,
    /// Characters compared in the suffix phase
    pub suffix_len: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            suffix_fallback: true,
            suffix_len: DEFAULT_SUFFIX_LEN,
        }
    }
}

/// Matches with default options and no event reporting.
pub fn resolve(candidates: &CandidateSet, roster: &[RosterEntry]) -> PresenceSet {
    resolve_with(candidates, roster, &MatchOptions::default(), &NoopSink)
}

pub fn resolve_with(
    candidates: &CandidateSet,
    roster: &[RosterEntry],
    options: &MatchOptions,
    sink: &dyn EventSink,
) -> PresenceSet {
    let mut results = Vec::with_capacity(roster.len());
    let mut token_students: BTreeMap<String, Vec<StudentId>> = BTreeMap::new();
    let mut multi_candidate_students = Vec::new();

    for entry in roster {
        if candidates.contains(&entry.roll_number) {
            token_students
                .entry(entry.roll_number.clone())
                .or_default()
                .push(entry.student_id.clone());
            sink.emit(PipelineEvent::new(
                Stage::Resolve,
                format!("{} ({}) exact match", entry.student_id, entry.roll_number),
            ));
            results.push(MatchResult {
                student_id: entry.student_id.clone(),
                roll_number: entry.roll_number.clone(),
                matched: true,
                kind: MatchKind::Exact,
                matched_token: Some(entry.roll_number.clone()),
            });
            continue;
        }

        let suffix_hits: Vec<&str> = if options.suffix_fallback {
            match suffix(&entry.roll_number, options.suffix_len) {
                Some(wanted) => candidates
                    .iter()
                    .filter(|token| suffix(token, options.suffix_len) == Some(wanted))
                    .collect(),
                None => {
                    sink.emit(PipelineEvent::new(
                        Stage::Resolve,
                        format!(
                            "{} ({}) too short for suffix match",
                            entry.student_id, entry.roll_number
                        ),
                    ));
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        // Candidates iterate in ascending order, so the first hit is the smallest token
        match suffix_hits.first() {
            Some(&token) => {
                sink.emit(PipelineEvent::new(
                    Stage::Resolve,
                    format!(
                        "{} ({}) suffix match via {}",
                        entry.student_id, entry.roll_number, token
                    ),
                ));
                if suffix_hits.len() > 1 {
                    multi_candidate_students.push(entry.student_id.clone());
                }
                for hit in &suffix_hits {
                    token_students
                        .entry(hit.to_string())
                        .or_default()
                        .push(entry.student_id.clone());
                }
                results.push(MatchResult {
                    student_id: entry.student_id.clone(),
                    roll_number: entry.roll_number.clone(),
                    matched: true,
                    kind: MatchKind::Suffix,
                    matched_token: Some(token.to_string()),
                });
            }
            None => {
                results.push(MatchResult {
                    student_id: entry.student_id.clone(),
                    roll_number: entry.roll_number.clone(),
                    matched: false,
                    kind: MatchKind::None,
                    matched_token: None,
                });
            }
        }
    }

    token_students.retain(|_, students| students.len() > 1);
    let ambiguity = AmbiguityReport {
        shared_tokens: token_students,
        multi_candidate_students,
    };

    if !ambiguity.is_empty() {
        sink.emit(PipelineEvent::new(
            Stage::Resolve,
            format!("{} ambiguous suffix matches", ambiguity.count()),
        ));
    }

    PresenceSet { results, ambiguity }
}

/// Last `len` characters, or `None` when the string is shorter.
fn suffix(s: &str, len: usize) -> Option<&str> {
    if len == 0 {
        return None;
    }
    let (start, _) = s.char_indices().rev().nth(len - 1)?;
    Some(&s[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;

    fn entry(id: &str, roll: &str) -> RosterEntry {
        RosterEntry::new(id, roll, "CS-A")
    }

    fn candidates(tokens: &[&str]) -> CandidateSet {
        tokens.iter().collect()
    }

    #[test]
    fn test_suffix_helper() {
        assert_eq!(suffix("2411CS010178", 3), Some("178"));
        assert_eq!(suffix("178", 3), Some("178"));
        assert_eq!(suffix("78", 3), None);
        assert_eq!(suffix("", 3), None);
        assert_eq!(suffix("ABC", 0), None);
    }

    #[test]
    fn test_exact_match_and_unmatched() {
        let roster = vec![entry("1", "2411CS010178"), entry("2", "2411CS010179")];
        let presence = resolve(&candidates(&["2411CS010178"]), &roster);

        assert_eq!(presence.len(), 2);
        let first = &presence.results[0];
        assert!(first.matched);
        assert_eq!(first.kind, MatchKind::Exact);
        assert_eq!(first.matched_token.as_deref(), Some("2411CS010178"));

        let second = &presence.results[1];
        assert!(!second.matched);
        assert_eq!(second.kind, MatchKind::None);
        assert_eq!(second.matched_token, None);
    }

    #[test]
    fn test_suffix_match() {
        let roster = vec![entry("1", "2411CS010178")];
        let presence = resolve(&candidates(&["178"]), &roster);

        let result = &presence.results[0];
        assert!(result.matched);
        assert_eq!(result.kind, MatchKind::Suffix);
        assert_eq!(result.matched_token.as_deref(), Some("178"));
    }

    #[test]
    fn test_suffix_from_longer_misread_token() {
        // Leading characters misread, trailing three intact
        let roster = vec![entry("1", "2411CS010178")];
        let presence = resolve(&candidates(&["2411C5010178"]), &roster);
        assert_eq!(presence.results[0].kind, MatchKind::Suffix);
    }

    #[test]
    fn test_exact_wins_over_suffix() {
        let roster = vec![entry("1", "22A123178")];
        let presence = resolve(&candidates(&["178", "22A123178"]), &roster);
        assert_eq!(presence.results[0].kind, MatchKind::Exact);
        assert!(presence.ambiguity.is_empty());
    }

    #[test]
    fn test_empty_candidates_all_unmatched() {
        let roster = vec![entry("1", "22A123456"), entry("2", "22A123457"), entry("3", "XY")];
        let presence = resolve(&CandidateSet::new(), &roster);
        assert_eq!(presence.len(), 3);
        assert_eq!(presence.present_count(), 0);
        assert!(presence.results.iter().all(|r| r.kind == MatchKind::None));
    }

    #[test]
    fn test_short_roll_number_never_suffix_matches() {
        let roster = vec![entry("1", "78")];
        let presence = resolve(&candidates(&["178", "078", "78X"]), &roster);
        assert!(!presence.results[0].matched);
    }

    #[test]
    fn test_short_roll_number_can_match_exactly() {
        let roster = vec![entry("1", "78")];
        let presence = resolve(&candidates(&["78"]), &roster);
        assert_eq!(presence.results[0].kind, MatchKind::Exact);
    }

    #[test]
    fn test_shared_suffix_marks_both_and_reports_ambiguity() {
        let roster = vec![entry("1", "2411CS010178"), entry("2", "2411EE020178")];
        let presence = resolve(&candidates(&["178"]), &roster);

        assert_eq!(presence.present_count(), 2);
        assert_eq!(
            presence.ambiguity.shared_tokens.get("178"),
            Some(&vec![StudentId::from("1"), StudentId::from("2")])
        );
        assert_eq!(presence.ambiguity.count(), 1);
    }

    #[test]
    fn test_exact_token_also_satisfying_suffix_is_ambiguous() {
        let roster = vec![entry("1", "2411CS010178"), entry("2", "2411EE020178")];
        let presence = resolve(&candidates(&["2411CS010178"]), &roster);

        let kinds: Vec<MatchKind> = presence.results.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![MatchKind::Exact, MatchKind::Suffix]);
        assert_eq!(
            presence.ambiguity.shared_tokens.get("2411CS010178"),
            Some(&vec![StudentId::from("1"), StudentId::from("2")])
        );
        assert!(presence.ambiguity.multi_candidate_students.is_empty());
    }

    #[test]
    fn test_multiple_tokens_for_one_student() {
        let roster = vec![entry("1", "2411CS010178")];
        let presence = resolve(&candidates(&["178", "22A123178"]), &roster);

        // Smallest token reported
        assert_eq!(presence.results[0].matched_token.as_deref(), Some("178"));
        assert_eq!(
            presence.ambiguity.multi_candidate_students,
            vec![StudentId::from("1")]
        );
    }

    #[test]
    fn test_results_follow_roster_order() {
        let roster = vec![entry("3", "22A123456"), entry("1", "22A123457"), entry("2", "22A123458")];
        let presence = resolve(&candidates(&["22A123457"]), &roster);
        let ids: Vec<&str> = presence.results.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
        assert!(presence.get(&StudentId::from("1")).unwrap().matched);
    }

    #[test]
    fn test_suffix_fallback_disabled() {
        let roster = vec![entry("1", "2411CS010178")];
        let options = MatchOptions {
            suffix_fallback: false,
            ..Default::default()
        };
        let presence = resolve_with(&candidates(&["178"]), &roster, &options, &NoopSink);
        assert!(!presence.results[0].matched);
    }

    #[test]
    fn test_events_emitted() {
        let roster = vec![entry("1", "2411CS010178"), entry("2", "AB")];
        let sink = MemorySink::new();
        resolve_with(&candidates(&["178"]), &roster, &MatchOptions::default(), &sink);

        let details: Vec<String> = sink.events().into_iter().map(|e| e.detail).collect();
        assert!(details[0].contains("suffix match via 178"));
        assert!(details[1].contains("too short"));
    }
}
