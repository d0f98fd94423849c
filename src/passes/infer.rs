// Pitch offset search - pick the transposition that loses the fewest notes
//
// Three greedy phases over a small candidate set: octaves by weighted
// out-of-range count, then semitones by rounded count at the chosen octave,
// then octaves again at the chosen semitone. Each candidate runs a throwaway
// offset + legalize pipeline on a copy of the input.

use serde::{Deserialize, Serialize};
use std::rc::Rc;

use super::pass::{Pass, PassError, PipelineData, Progress, Statistics};
use super::pitch::{
    LegalizeConfig, LegalizeTargetNoteRangePass, PitchOffsetConfig, PitchOffsetPass, SemitoneRoundingMode,
};
use super::sequential::SequentialPass;
use crate::layout::KeyMapper;
use crate::notes::Timeline;

const OCTAVE_CANDIDATES: [i32; 5] = [0, -1, 1, -2, 2];
const SEMITONE_CANDIDATES: [i32; 12] = [0, 1, -1, 2, -2, 3, -3, 4, -4, 5, 6, 7];
const TOTAL_TRIALS: usize = 2 * OCTAVE_CANDIDATES.len() + SEMITONE_CANDIDATES.len();

/// Relative improvement a candidate needs to replace the incumbent
const BETTER_RESULT_THRESHOLD: f64 = 0.05;
const INITIAL_BEST_SCORE: f64 = 10_000_000.0;

/// Settings for the offset search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InferBestPitchOffsetConfig {
    /// Cost of one note lost above the range, relative to one lost below it
    pub overflow_weight: f64,

    /// Transpose the output by the chosen offset instead of only reporting it
    pub apply_offset: bool,

    /// Target keyboard (required)
    #[serde(skip)]
    pub profile: Option<Rc<dyn KeyMapper>>,
}

impl Default for InferBestPitchOffsetConfig {
    fn default() -> Self {
        InferBestPitchOffsetConfig {
            overflow_weight: 5.0,
            apply_offset: false,
            profile: None,
        }
    }
}

/// Legalization outcome for one candidate offset
#[derive(Debug, Clone, Copy, Default)]
struct Trial {
    out_of_range_weight: f64,
    overflowed: f64,
    underflowed: f64,
    rounded: f64,
}

type Candidate = (i32, i32);

/// Finds the octave/semitone offset that fits the notes best onto the keyboard
pub struct InferBestPitchOffsetPass {
    overflow_weight: f64,
    apply_offset: bool,
    profile: Rc<dyn KeyMapper>,
    best_octave: i32,
    best_semitone: i32,
    best_trial: Trial,
}

impl InferBestPitchOffsetPass {
    pub fn new(config: InferBestPitchOffsetConfig) -> Result<Self, PassError> {
        let profile = config
            .profile
            .ok_or_else(|| PassError::configuration("InferBestPitchOffsetPass", "profile is required"))?;
        Ok(InferBestPitchOffsetPass {
            overflow_weight: config.overflow_weight,
            apply_offset: config.apply_offset,
            profile,
            best_octave: 0,
            best_semitone: 0,
            best_trial: Trial::default(),
        })
    }

    /// Chosen offset in semitones, from the last run
    pub fn best_offset(&self) -> i32 {
        self.best_octave * 12 + self.best_semitone
    }

    fn evaluate(&self, notes: &Timeline, (octave, semitone): Candidate) -> Result<Trial, PassError> {
        let mut pipeline = SequentialPass::new(vec![
            Box::new(PitchOffsetPass::new(PitchOffsetConfig {
                offset: Some(octave * 12 + semitone),
            })?),
            Box::new(LegalizeTargetNoteRangePass::new(LegalizeConfig {
                semitone_rounding_mode: Some(SemitoneRoundingMode::Floor),
                profile: Some(Rc::clone(&self.profile)),
                ..Default::default()
            })?),
        ]);
        pipeline.run(notes.clone().into(), &mut Progress::none())?;

        let stats = pipeline
            .pass_statistics()
            .get("LegalizeTargetNoteRangePass")
            .cloned()
            .unwrap_or_default();
        let count = |key: &str| stats.get(key).copied().unwrap_or(0.0);

        Ok(Trial {
            out_of_range_weight: count("overflowed") * self.overflow_weight + count("underflowed"),
            overflowed: count("overflowed"),
            underflowed: count("underflowed"),
            rounded: count("rounded"),
        })
    }

    /// Greedy scan; returns the last candidate that beat the incumbent by the threshold
    fn search(
        &self,
        notes: &Timeline,
        candidates: impl Iterator<Item = Candidate>,
        score: fn(&Trial) -> f64,
        trial_index: &mut usize,
        progress: &mut Progress<'_>,
    ) -> Option<(Candidate, Trial)> {
        let mut best = None;
        let mut best_score = INITIAL_BEST_SCORE;

        for candidate in candidates {
            progress.report(*trial_index as f64 / TOTAL_TRIALS as f64 * 100.0, self.description());
            *trial_index += 1;

            let trial = match self.evaluate(notes, candidate) {
                Ok(trial) => trial,
                Err(e) => {
                    log::debug!("Rejecting offset {:?}: {}", candidate, e);
                    continue;
                }
            };
            log::debug!("Offset {:?}: {:?}", candidate, trial);

            let candidate_score = score(&trial);
            if best_score - candidate_score > candidate_score * BETTER_RESULT_THRESHOLD {
                best_score = candidate_score;
                best = Some((candidate, trial));
            }
        }

        best
    }
}

impl Pass for InferBestPitchOffsetPass {
    fn name(&self) -> &'static str {
        "InferBestPitchOffsetPass"
    }

    fn description(&self) -> &'static str {
        "Infer the best pitch offset"
    }

    fn run(&mut self, input: PipelineData, progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        self.best_octave = 0;
        self.best_semitone = 0;
        self.best_trial = Trial::default();

        let by_range = |t: &Trial| t.out_of_range_weight;
        let by_rounding = |t: &Trial| t.rounded;
        let mut trial_index = 0;

        let octaves = OCTAVE_CANDIDATES.iter().map(|&o| (o, 0));
        if let Some(((octave, _), _)) = self.search(&notes, octaves, by_range, &mut trial_index, progress) {
            self.best_octave = octave;
        }

        let octave = self.best_octave;
        let semitones = SEMITONE_CANDIDATES.iter().map(|&s| (octave, s));
        if let Some(((_, semitone), _)) = self.search(&notes, semitones, by_rounding, &mut trial_index, progress) {
            self.best_semitone = semitone;
        }

        let semitone = self.best_semitone;
        let octaves = OCTAVE_CANDIDATES.iter().map(|&o| (o, semitone));
        if let Some(((octave, _), trial)) = self.search(&notes, octaves, by_range, &mut trial_index, progress) {
            self.best_octave = octave;
            self.best_trial = trial;
        }

        log::info!(
            "Best pitch offset: {} octave(s), {} semitone(s)",
            self.best_octave,
            self.best_semitone
        );

        if self.apply_offset {
            let offset = self.best_offset();
            for entry in notes.iter_mut() {
                entry.value += offset;
            }
        }

        Ok(notes.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([
            ("best_octave_offset".to_string(), self.best_octave as f64),
            ("best_semitone_offset".to_string(), self.best_semitone as f64),
            ("best_overflowed".to_string(), self.best_trial.overflowed),
            ("best_underflowed".to_string(), self.best_trial.underflowed),
            ("best_rounded".to_string(), self.best_trial.rounded),
        ])
    }
}
