// Passes module - configurable transformation steps over tracks, notes, and keys
// Every pass follows the same contract: build from a config, run once, read statistics

pub mod duration;
pub mod frequency;
pub mod gesture;
pub mod infer;
pub mod lyrics;
pub mod pass;
pub mod pitch;
pub mod sequential;
pub mod timing;
pub mod tracks;

pub use duration::{
    EstimateNoteDurationConfig, EstimateNoteDurationPass, FoldFrequentSameNoteConfig, FoldFrequentSameNotePass,
    SplitLongNoteConfig, SplitLongNotePass,
};
pub use frequency::{
    ChordNoteCountLimitConfig, ChordNoteCountLimitPass, LimitMode, MergeKeyConfig, MergeKeyPass,
    NoteFrequencySoftLimitConfig, NoteFrequencySoftLimitPass, SelectMode, SingleKeyFrequencyLimitConfig,
    SingleKeyFrequencyLimitPass, CHORD_SELECT_SEED,
};
pub use gesture::{Gesture, GestureGroup, GestureList, KeyToGestureConfig, KeyToGesturePass};
pub use infer::{InferBestPitchOffsetConfig, InferBestPitchOffsetPass};
pub use lyrics::{BindLyricsConfig, BindLyricsPass, LyricLine};
pub use pass::{NopPass, Pass, PassError, PipelineData, Progress, Statistics};
pub use pitch::{
    LegalizeConfig, LegalizeTargetNoteRangePass, NoteToKeyConfig, NoteToKeyPass, PitchOffsetConfig, PitchOffsetPass,
    SemitoneRoundingMode,
};
pub use sequential::SequentialPass;
pub use timing::{
    HumanifyConfig, HumanifyPass, LimitBlankDurationConfig, LimitBlankDurationPass, SkipIntroConfig, SkipIntroPass,
    SpeedChangeConfig, SpeedChangePass, StoreCurrentNoteTimePass,
};
pub use tracks::{MergeTracksConfig, MergeTracksPass, RemoveEmptyTracksPass};
