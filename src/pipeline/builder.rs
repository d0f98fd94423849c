// Pipeline builder - assemble the canonical pass chain for one key profile and run it

use std::collections::BTreeMap;
use std::rc::Rc;

use super::settings::PipelineSettings;
use super::trace::TraceWriter;
use crate::layout::{KeyMapper, KeyProfile};
use crate::notes::TrackSet;
use crate::passes::{
    BindLyricsConfig, BindLyricsPass, ChordNoteCountLimitPass, EstimateNoteDurationPass,
    FoldFrequentSameNotePass, GestureList, HumanifyPass, InferBestPitchOffsetConfig, InferBestPitchOffsetPass,
    KeyToGestureConfig, KeyToGesturePass, LegalizeConfig, LegalizeTargetNoteRangePass, LimitBlankDurationPass,
    MergeKeyPass, MergeTracksPass, NoteFrequencySoftLimitPass, NoteToKeyConfig, NoteToKeyPass, Pass, PassError,
    PitchOffsetConfig, PitchOffsetPass, Progress, RemoveEmptyTracksPass, SequentialPass,
    SingleKeyFrequencyLimitConfig, SingleKeyFrequencyLimitPass, SkipIntroPass, SpeedChangeConfig, SpeedChangePass,
    SplitLongNotePass, Statistics, StoreCurrentNoteTimePass,
};

/// Gestures plus per-pass statistics of one run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub gestures: GestureList,
    pub statistics: BTreeMap<String, Statistics>,
}

/// Build the full track-set-to-gesture chain
///
/// Stages, in order: empty-track removal, track merge, onset snapshot (with
/// lyrics), humanization, transposition (fixed or inferred), legalization,
/// speed, intro skip, gap cap, soft tempo limit, lyric binding, repeat
/// folding, duration estimation, long-note splitting, key mapping, same-key
/// limit, key merge, chord limit, gesture emission. Optional stages are left
/// out when their settings are absent.
pub fn build_pipeline(settings: &PipelineSettings, profile: &Rc<KeyProfile>) -> Result<SequentialPass, PassError> {
    let mapper: Rc<dyn KeyMapper> = profile.clone();
    let mut passes: Vec<Box<dyn Pass>> = Vec::new();

    passes.push(Box::new(RemoveEmptyTracksPass::new()));
    passes.push(Box::new(MergeTracksPass::new(settings.merge_tracks.clone())));

    let has_lyrics = !settings.lyrics.is_empty();
    if has_lyrics {
        passes.push(Box::new(StoreCurrentNoteTimePass));
    }
    if let Some(config) = &settings.humanify {
        passes.push(Box::new(HumanifyPass::new(config.clone())?));
    }

    match settings.pitch_offset {
        Some(offset) => passes.push(Box::new(PitchOffsetPass::new(PitchOffsetConfig { offset: Some(offset) })?)),
        None => passes.push(Box::new(InferBestPitchOffsetPass::new(InferBestPitchOffsetConfig {
            apply_offset: true,
            profile: Some(mapper.clone()),
            ..settings.infer_pitch_offset.clone()
        })?)),
    }

    passes.push(Box::new(LegalizeTargetNoteRangePass::new(LegalizeConfig {
        semitone_rounding_mode: Some(settings.semitone_rounding_mode),
        wrap_lower_octave: settings.wrap_lower_octave,
        wrap_higher_octave: settings.wrap_higher_octave,
        profile: Some(mapper.clone()),
    })?));

    if let Some(speed) = settings.speed {
        passes.push(Box::new(SpeedChangePass::new(SpeedChangeConfig { speed: Some(speed) })?));
    }
    if let Some(config) = &settings.skip_intro {
        passes.push(Box::new(SkipIntroPass::new(config.clone())));
    }
    if let Some(config) = &settings.limit_blank_duration {
        passes.push(Box::new(LimitBlankDurationPass::new(config.clone())?));
    }
    if let Some(config) = &settings.note_frequency_soft_limit {
        passes.push(Box::new(NoteFrequencySoftLimitPass::new(config.clone())?));
    }
    if has_lyrics {
        passes.push(Box::new(BindLyricsPass::new(BindLyricsConfig {
            lyrics: Some(settings.lyrics.clone()),
            use_stored_original_time: true,
        })?));
    }
    if let Some(config) = &settings.fold_frequent_same_note {
        passes.push(Box::new(FoldFrequentSameNotePass::new(config.clone())));
    }
    if let Some(config) = &settings.estimate_note_duration {
        passes.push(Box::new(EstimateNoteDurationPass::new(config.clone())));
    }
    if let Some(config) = &settings.split_long_note {
        passes.push(Box::new(SplitLongNotePass::new(config.clone())?));
    }

    passes.push(Box::new(NoteToKeyPass::new(NoteToKeyConfig {
        profile: Some(mapper.clone()),
    })?));

    let min_interval_ms = settings
        .same_key_min_interval_ms
        .unwrap_or_else(|| mapper.same_key_min_interval());
    passes.push(Box::new(SingleKeyFrequencyLimitPass::new(SingleKeyFrequencyLimitConfig {
        min_interval_ms: Some(min_interval_ms),
    })?));

    passes.push(Box::new(MergeKeyPass::new(settings.merge_key.clone())?));
    if let Some(config) = &settings.chord_note_count_limit {
        passes.push(Box::new(ChordNoteCountLimitPass::new(config.clone())?));
    }

    passes.push(Box::new(KeyToGesturePass::new(KeyToGestureConfig {
        duration_mode: settings.duration_mode.unwrap_or_else(|| profile.duration_mode()),
        profile: Some(mapper),
        ..settings.gesture.clone()
    })?));

    let mut pipeline = SequentialPass::new(passes);
    if let Some(path) = &settings.trace_path {
        pipeline = pipeline.with_trace(TraceWriter::new(path.clone()));
    }

    log::info!(
        "Built pipeline for profile '{}': {}",
        profile.name,
        pipeline.pass_names().join(" -> ")
    );
    Ok(pipeline)
}

/// Build and run the chain on a parsed track set
pub fn run_pipeline(
    tracks: TrackSet,
    settings: &PipelineSettings,
    profile: &Rc<KeyProfile>,
    progress: &mut Progress<'_>,
) -> Result<PipelineOutput, PassError> {
    let mut pipeline = build_pipeline(settings, profile)?;
    let gestures = pipeline.run(tracks.into(), progress)?.into_gestures(pipeline.name())?;

    log::info!("Pipeline produced {} gesture groups", gestures.len());
    Ok(PipelineOutput {
        gestures,
        statistics: pipeline.pass_statistics().clone(),
    })
}
