// Pipeline settings - one serde record describing the whole note-to-gesture chain
// Optional stages are enabled by giving them a config

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::notes::DurationType;
use crate::passes::{
    ChordNoteCountLimitConfig, EstimateNoteDurationConfig, FoldFrequentSameNoteConfig, HumanifyConfig,
    InferBestPitchOffsetConfig, KeyToGestureConfig, LimitBlankDurationConfig, LyricLine, MergeKeyConfig,
    MergeTracksConfig, NoteFrequencySoftLimitConfig, SemitoneRoundingMode, SkipIntroConfig, SplitLongNoteConfig,
};

/// Notes this close together are played as one chord by default
pub const DEFAULT_MERGE_KEY_INTERVAL_MS: f64 = 50.0;

/// Settings for [`build_pipeline`](super::build_pipeline)
///
/// Keyboard-dependent parts (profile references, same-key interval, duration
/// mode) are filled in from the key profile at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    pub merge_tracks: MergeTracksConfig,

    /// Lyric lines bound to the nearest surviving chord; none = no binding
    pub lyrics: Vec<LyricLine>,

    pub humanify: Option<HumanifyConfig>,

    /// Fixed transposition in semitones; inferred from the notes when absent
    pub pitch_offset: Option<i32>,

    /// Search settings used when `pitch_offset` is absent
    pub infer_pitch_offset: InferBestPitchOffsetConfig,

    pub semitone_rounding_mode: SemitoneRoundingMode,
    pub wrap_lower_octave: u32,
    pub wrap_higher_octave: u32,

    /// Playback speed multiplier
    pub speed: Option<f64>,

    pub skip_intro: Option<SkipIntroConfig>,
    pub limit_blank_duration: Option<LimitBlankDurationConfig>,
    pub note_frequency_soft_limit: Option<NoteFrequencySoftLimitConfig>,
    pub fold_frequent_same_note: Option<FoldFrequentSameNoteConfig>,
    pub estimate_note_duration: Option<EstimateNoteDurationConfig>,
    pub split_long_note: Option<SplitLongNoteConfig>,

    /// Minimum same-key interval; the profile's value when absent
    pub same_key_min_interval_ms: Option<f64>,

    pub merge_key: MergeKeyConfig,
    pub chord_note_count_limit: Option<ChordNoteCountLimitConfig>,

    /// Gesture emission; its duration mode is replaced by `duration_mode`
    pub gesture: KeyToGestureConfig,

    /// Gesture duration mode; the profile's mode when absent
    pub duration_mode: Option<DurationType>,

    /// JSONL trace of the run, if set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_path: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            merge_tracks: MergeTracksConfig::default(),
            lyrics: Vec::new(),
            humanify: None,
            pitch_offset: None,
            infer_pitch_offset: InferBestPitchOffsetConfig::default(),
            semitone_rounding_mode: SemitoneRoundingMode::Floor,
            wrap_lower_octave: 0,
            wrap_higher_octave: 0,
            speed: None,
            skip_intro: Some(SkipIntroConfig::default()),
            limit_blank_duration: Some(LimitBlankDurationConfig::default()),
            note_frequency_soft_limit: None,
            fold_frequent_same_note: None,
            estimate_note_duration: None,
            split_long_note: None,
            same_key_min_interval_ms: None,
            merge_key: MergeKeyConfig {
                max_interval_ms: Some(DEFAULT_MERGE_KEY_INTERVAL_MS),
                ..Default::default()
            },
            chord_note_count_limit: Some(ChordNoteCountLimitConfig::default()),
            gesture: KeyToGestureConfig::default(),
            duration_mode: None,
            trace_path: None,
        }
    }
}

impl PipelineSettings {
    /// Serialize to pretty JSON bytes
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Deserialize from JSON bytes; missing fields take their defaults
    pub fn from_json_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::{LimitMode, SelectMode};

    #[test]
    fn test_default_stages() {
        let settings = PipelineSettings::default();
        assert!(settings.pitch_offset.is_none());
        assert!(settings.skip_intro.is_some());
        assert!(settings.limit_blank_duration.is_some());
        assert!(settings.humanify.is_none());
        assert_eq!(settings.merge_key.max_interval_ms, Some(DEFAULT_MERGE_KEY_INTERVAL_MS));
        assert_eq!(settings.semitone_rounding_mode, SemitoneRoundingMode::Floor);
    }

    #[test]
    fn test_json_round_trip() {
        let mut settings = PipelineSettings::default();
        settings.pitch_offset = Some(-5);
        settings.speed = Some(1.5);
        settings.lyrics = vec![LyricLine::new(100.0, "hello")];
        settings.chord_note_count_limit = Some(ChordNoteCountLimitConfig {
            max_note_count: 3,
            limit_mode: LimitMode::Split,
            select_mode: SelectMode::Low,
            ..Default::default()
        });

        let bytes = settings.to_json_bytes().unwrap();
        let loaded = PipelineSettings::from_json_bytes(&bytes).unwrap();

        assert_eq!(loaded.pitch_offset, Some(-5));
        assert_eq!(loaded.speed, Some(1.5));
        assert_eq!(loaded.lyrics, settings.lyrics);
        let limit = loaded.chord_note_count_limit.unwrap();
        assert_eq!(limit.max_note_count, 3);
        assert_eq!(limit.limit_mode, LimitMode::Split);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = br#"{
            "semitoneRoundingMode": "both",
            "skipIntro": null,
            "gesture": { "pressDurationMs": 20 }
        }"#;
        let settings = PipelineSettings::from_json_bytes(json).unwrap();

        assert_eq!(settings.semitone_rounding_mode, SemitoneRoundingMode::Both);
        assert!(settings.skip_intro.is_none());
        assert_eq!(settings.gesture.press_duration_ms, 20.0);
        assert_eq!(settings.gesture.max_gesture_size, 19);
        assert!(settings.limit_blank_duration.is_some());
    }

    #[test]
    fn test_rejects_unknown_rounding_mode() {
        let json = br#"{ "semitoneRoundingMode": "sideways" }"#;
        assert!(PipelineSettings::from_json_bytes(json).is_err());
    }
}
