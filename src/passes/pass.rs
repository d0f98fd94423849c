// Pass contract - configure once, run on pipeline data, report statistics
// Shared error type, progress callback wrapper, and the data passed between passes

use std::collections::BTreeMap;
use thiserror::Error;

use super::gesture::GestureList;
use crate::notes::{Timeline, TrackSet};

/// Per-pass counters, keyed by statistic name
pub type Statistics = BTreeMap<String, f64>;

/// Errors raised by passes
///
/// Configuration errors come from constructors, before any data is touched.
/// Processing errors come from `run` and propagate unchanged through
/// [`SequentialPass`](super::SequentialPass).
#[derive(Debug, Error)]
pub enum PassError {
    #[error("{pass}: invalid configuration: {message}")]
    Configuration { pass: &'static str, message: String },

    #[error("{pass}: {message}")]
    Processing { pass: &'static str, message: String },
}

impl PassError {
    pub fn configuration(pass: &'static str, message: impl Into<String>) -> Self {
        PassError::Configuration {
            pass,
            message: message.into(),
        }
    }

    pub fn processing(pass: &'static str, message: impl Into<String>) -> Self {
        PassError::Processing {
            pass,
            message: message.into(),
        }
    }
}

/// Data handed from one pass to the next
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineData {
    /// Parsed multi-track input
    Tracks(TrackSet),

    /// Pitches or key indices on a single timeline
    Notes(Timeline),

    /// Final gesture groups
    Gestures(GestureList),
}

impl PipelineData {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineData::Tracks(_) => "tracks",
            PipelineData::Notes(_) => "notes",
            PipelineData::Gestures(_) => "gestures",
        }
    }

    fn mismatch(&self, pass: &'static str, expected: &str) -> PassError {
        PassError::processing(pass, format!("expected {} input, got {}", expected, self.kind()))
    }

    pub fn into_tracks(self, pass: &'static str) -> Result<TrackSet, PassError> {
        match self {
            PipelineData::Tracks(tracks) => Ok(tracks),
            other => Err(other.mismatch(pass, "tracks")),
        }
    }

    pub fn into_notes(self, pass: &'static str) -> Result<Timeline, PassError> {
        match self {
            PipelineData::Notes(notes) => Ok(notes),
            other => Err(other.mismatch(pass, "notes")),
        }
    }

    pub fn into_gestures(self, pass: &'static str) -> Result<GestureList, PassError> {
        match self {
            PipelineData::Gestures(gestures) => Ok(gestures),
            other => Err(other.mismatch(pass, "gestures")),
        }
    }
}

impl From<TrackSet> for PipelineData {
    fn from(tracks: TrackSet) -> Self {
        PipelineData::Tracks(tracks)
    }
}

impl From<Timeline> for PipelineData {
    fn from(notes: Timeline) -> Self {
        PipelineData::Notes(notes)
    }
}

impl From<GestureList> for PipelineData {
    fn from(gestures: GestureList) -> Self {
        PipelineData::Gestures(gestures)
    }
}

/// Optional synchronous progress callback: (percent 0-100, message)
pub struct Progress<'a> {
    callback: Option<&'a mut dyn FnMut(f64, &str)>,
}

impl<'a> Progress<'a> {
    /// Discard all progress reports
    pub fn none() -> Self {
        Progress { callback: None }
    }

    pub fn new(callback: &'a mut dyn FnMut(f64, &str)) -> Self {
        Progress {
            callback: Some(callback),
        }
    }

    pub fn report(&mut self, percent: f64, message: &str) {
        if let Some(callback) = self.callback.as_mut() {
            callback(percent, message);
        }
    }
}

/// One configured transformation step
pub trait Pass {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Transform `input`; the input is consumed
    fn run(&mut self, input: PipelineData, progress: &mut Progress<'_>) -> Result<PipelineData, PassError>;

    /// Counters from the last run
    fn statistics(&self) -> Statistics {
        Statistics::new()
    }
}

/// Returns its input unchanged
#[derive(Debug, Default)]
pub struct NopPass;

impl Pass for NopPass {
    fn name(&self) -> &'static str {
        "NopPass"
    }

    fn description(&self) -> &'static str {
        "No-op"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        Ok(input)
    }
}
