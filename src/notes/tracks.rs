// Track set - parsed multi-track performance handed over by format front-ends
// Mirrors the JSON shape those parsers produce

use serde::{Deserialize, Serialize};

use super::timeline::Timeline;

/// MIDI channel index conventionally reserved for percussion
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Whether source notes carry meaningful durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationType {
    #[default]
    None,
    Native,
}

/// One parsed track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Track {
    pub name: String,
    pub channel: u8,
    pub instrument_id: i32,
    pub track_index: usize,
    pub note_count: usize,
    pub notes: Timeline,
}

impl Track {
    pub fn new(name: &str, channel: u8, notes: Timeline) -> Self {
        Track {
            name: name.to_string(),
            channel,
            note_count: notes.len(),
            notes,
            ..Default::default()
        }
    }

    pub fn is_percussion(&self) -> bool {
        self.channel == PERCUSSION_CHANNEL
    }
}

/// Free-form metadata pair (title, tempo text, etc.)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub value: serde_json::Value,
}

/// Input to the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackSet {
    #[serde(alias = "haveMultipleTrack")]
    pub multi_track: bool,
    pub track_count: usize,
    pub duration_type: DurationType,
    pub tracks: Vec<Track>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<Metadata>>,
}

impl TrackSet {
    /// Build a track set, deriving the count and multi-track flag from `tracks`
    pub fn from_tracks(tracks: Vec<Track>, duration_type: DurationType) -> Self {
        TrackSet {
            multi_track: tracks.len() > 1,
            track_count: tracks.len(),
            duration_type,
            tracks,
            metadata: None,
        }
    }

    pub fn total_note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }
}
