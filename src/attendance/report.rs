use chrono::Local;
use serde::Serialize;

use super::matcher::{AmbiguityReport, MatchResult};
use super::pipeline::RecognitionOutcome;
use crate::ocr::PageSegMode;

/// Serializable summary of one recognition run, handed to whatever records
/// attendance.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReport {
    /// Local time of the run (RFC 3339)
    pub recognized_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub page_segmentation_mode: PageSegMode,
    pub roll_numbers_found: Vec<String>,
    pub present: usize,
    pub total: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub ambiguity: AmbiguityReport,
    pub results: Vec<MatchResult>,
}

impl AttendanceReport {
    pub fn from_outcome(outcome: &RecognitionOutcome, section: Option<&str>) -> Self {
        let present = outcome.presence.present_count();
        Self {
            recognized_at: Local::now().to_rfc3339(),
            section: section.map(str::to_string),
            page_segmentation_mode: outcome.page_segmentation_mode,
            roll_numbers_found: outcome.candidates.to_vec(),
            present,
            total: outcome.presence.len(),
            message: format!("Marked attendance for {} students", present),
            warning: outcome.warning.map(|w| w.to_string()),
            ambiguity: outcome.presence.ambiguity.clone(),
            results: outcome.presence.results.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{resolve, RecognitionWarning, RosterEntry};
    use crate::ocr::CandidateSet;

    fn outcome(tokens: &[&str], warning: Option<RecognitionWarning>) -> RecognitionOutcome {
        let candidates: CandidateSet = tokens.iter().collect();
        let roster = vec![
            RosterEntry::new("1", "2411CS010178", "CS-A"),
            RosterEntry::new("2", "2411CS010179", "CS-A"),
        ];
        RecognitionOutcome {
            presence: resolve(&candidates, &roster),
            candidates,
            raw_text: String::new(),
            page_segmentation_mode: PageSegMode::SingleBlock,
            warning,
            elapsed_ms: 12,
        }
    }

    #[test]
    fn test_report_counts() {
        let report = AttendanceReport::from_outcome(&outcome(&["178"], None), Some("CS-A"));
        assert_eq!(report.present, 1);
        assert_eq!(report.total, 2);
        assert_eq!(report.message, "Marked attendance for 1 students");
        assert_eq!(report.roll_numbers_found, vec!["178".to_string()]);
        assert_eq!(report.section.as_deref(), Some("CS-A"));
    }

    #[test]
    fn test_report_json_shape() {
        let report = AttendanceReport::from_outcome(
            &outcome(&[], Some(RecognitionWarning::NoCandidates)),
            None,
        );
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["page_segmentation_mode"], "single_block");
        assert!(json.get("section").is_none());
        assert!(json["warning"].as_str().unwrap().contains("no roll numbers detected"));
        assert_eq!(json["results"][0]["kind"], "none");
        assert_eq!(json["results"][0]["student_id"], "1");
        assert_eq!(json["results"][0]["matched"], false);
    }
}
