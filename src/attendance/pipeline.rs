use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::matcher::{resolve_with, MatchOptions, PresenceSet};
use super::roster::RosterEntry;
use crate::config::AppConfig;
use crate::error::Result;
use crate::events::{EventSink, NoopSink, PipelineEvent, Stage};
use crate::ocr::{preprocess, CandidateSet, PageSegMode, PreprocessOptions, RollNumberParser, TextExtractor};

/// A run that completed but deserves the caller's attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionWarning {
    /// OCR ran but no roll numbers were found in its output.
    NoCandidates,
}

impl fmt::Display for RecognitionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionWarning::NoCandidates => f.write_str(
                "no roll numbers detected, consider adjusting capture conditions",
            ),
        }
    }
}

/// Everything one photo produced.
#[derive(Debug, Clone)]
pub struct RecognitionOutcome {
    pub presence: PresenceSet,
    pub candidates: CandidateSet,
    /// Text returned by the OCR engine for the mode that was kept
    pub raw_text: String,
    pub page_segmentation_mode: PageSegMode,
    pub warning: Option<RecognitionWarning>,
    pub elapsed_ms: u64,
}

/// Photo → presence set: preprocess, OCR, parse, resolve.
///
/// Holds no per-run state, so one pipeline can serve concurrent callers when
/// its extractor can.
pub struct AttendancePipeline<E> {
    extractor: E,
    parser: RollNumberParser,
    preprocess: PreprocessOptions,
    mode: PageSegMode,
    fallback_modes: Vec<PageSegMode>,
    matching: MatchOptions,
    sink: Arc<dyn EventSink>,
}

impl<E: TextExtractor> AttendancePipeline<E> {
    /// Pipeline with default settings and no event reporting.
    pub fn new(extractor: E) -> Self {
        Self {
            extractor,
            parser: RollNumberParser::default(),
            preprocess: PreprocessOptions::default(),
            mode: PageSegMode::default(),
            fallback_modes: Vec::new(),
            matching: MatchOptions::default(),
            sink: Arc::new(NoopSink),
        }
    }

    /// Pipeline configured from the application config.
    pub fn from_config(extractor: E, config: &AppConfig) -> Result<Self> {
        Ok(Self {
            extractor,
            parser: config.parser.build_parser()?,
            preprocess: config.preprocess.clone(),
            mode: config.ocr.page_segmentation_mode,
            fallback_modes: config.ocr.fallback_modes.clone(),
            matching: config.matching.clone(),
            sink: Arc::new(NoopSink),
        })
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_page_segmentation_mode(mut self, mode: PageSegMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_fallback_modes(mut self, modes: Vec<PageSegMode>) -> Self {
        self.fallback_modes = modes;
        self
    }

    pub fn with_parser(mut self, parser: RollNumberParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_preprocess_options(mut self, options: PreprocessOptions) -> Self {
        self.preprocess = options;
        self
    }

    pub fn with_match_options(mut self, options: MatchOptions) -> Self {
        self.matching = options;
        self
    }

    /// Recognizes roll numbers with the configured mode.
    pub fn recognize(&self, image: &[u8], roster: &[RosterEntry]) -> Result<RecognitionOutcome> {
        self.recognize_with_mode(image, roster, self.mode)
    }

    /// Recognizes roll numbers, starting with `mode`.
    ///
    /// When `mode` finds nothing, the configured fallback modes are tried in
    /// order. An OCR failure in any mode ends the run with that error.
    pub fn recognize_with_mode(
        &self,
        image: &[u8],
        roster: &[RosterEntry],
        mode: PageSegMode,
    ) -> Result<RecognitionOutcome> {
        let start = Instant::now();

        let normalized = preprocess(image, &self.preprocess)?;
        self.emit(
            Stage::Preprocess,
            format!(
                "{}x{} image, {:?} binarization{}",
                normalized.image.width(),
                normalized.image.height(),
                normalized.binarization,
                normalized
                    .threshold
                    .map(|t| format!(" at level {}", t))
                    .unwrap_or_default()
            ),
        );

        let mut modes = vec![mode];
        for fallback in &self.fallback_modes {
            if !modes.contains(fallback) {
                modes.push(*fallback);
            }
        }

        let mut raw_text = String::new();
        let mut candidates = CandidateSet::new();
        let mut used_mode = mode;

        for current in modes {
            raw_text = self.extractor.extract_text(&normalized.image, current)?;
            self.emit(
                Stage::Extract,
                format!("{}: {} characters of text", current, raw_text.len()),
            );

            candidates = self.parser.parse_candidates(&raw_text);
            used_mode = current;
            self.emit(
                Stage::Parse,
                format!("{}: {} candidates {:?}", current, candidates.len(), candidates.to_vec()),
            );

            if !candidates.is_empty() {
                break;
            }
        }

        let warning = if candidates.is_empty() {
            Some(RecognitionWarning::NoCandidates)
        } else {
            None
        };

        // Runs even with no candidates so every student gets a result
        let presence = resolve_with(&candidates, roster, &self.matching, self.sink.as_ref());
        self.emit(
            Stage::Resolve,
            format!("{} of {} students present", presence.present_count(), presence.len()),
        );

        let elapsed_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Recognition complete in {}ms: {} candidates, {} present",
            elapsed_ms,
            candidates.len(),
            presence.present_count()
        );

        Ok(RecognitionOutcome {
            presence,
            candidates,
            raw_text,
            page_segmentation_mode: used_mode,
            warning,
            elapsed_ms,
        })
    }

    /// Runs preprocessing, OCR and parsing only.
    pub fn scan(&self, image: &[u8], mode: PageSegMode) -> Result<(CandidateSet, String)> {
        let normalized = preprocess(image, &self.preprocess)?;
        let raw_text = self.extractor.extract_text(&normalized.image, mode)?;
        Ok((self.parser.parse_candidates(&raw_text), raw_text))
    }

    fn emit(&self, stage: Stage, detail: String) {
        self.sink.emit(PipelineEvent::new(stage, detail));
    }
}
