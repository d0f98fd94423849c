// Duration passes - fold repeated notes into long ones, split long notes, estimate missing durations

use serde::{Deserialize, Serialize};

use super::pass::{Pass, PassError, PipelineData, Progress, Statistics};
use crate::notes::{Entry, NoteAttributes, Timeline};

/// Settings for folding repeated notes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FoldFrequentSameNoteConfig {
    /// Repeats closer than this to the previous repeat join the run
    pub max_interval_ms: f64,
}

impl Default for FoldFrequentSameNoteConfig {
    fn default() -> Self {
        FoldFrequentSameNoteConfig { max_interval_ms: 150.0 }
    }
}

/// Merges a fast run of one pitch into a single note spanning the run
///
/// The merged note keeps the first note's onset and attributes; its duration
/// is the distance from the first to the last onset of the run. Lyrics of the
/// absorbed notes are appended to it.
pub struct FoldFrequentSameNotePass {
    max_interval_ms: f64,
    folded: usize,
}

impl FoldFrequentSameNotePass {
    pub fn new(config: FoldFrequentSameNoteConfig) -> Self {
        FoldFrequentSameNotePass {
            max_interval_ms: config.max_interval_ms,
            folded: 0,
        }
    }
}

impl Pass for FoldFrequentSameNotePass {
    fn name(&self) -> &'static str {
        "FoldFrequentSameNotePass"
    }

    fn description(&self) -> &'static str {
        "Fold repeated notes"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let entries = input.into_notes(self.name())?.into_entries();
        self.folded = 0;

        let total = entries.len();
        let mut consumed = vec![false; total];
        let mut out = Vec::with_capacity(total);

        for i in 0..total {
            if consumed[i] {
                continue;
            }

            let mut entry = entries[i].clone();
            if !entry.is_playable() {
                out.push(entry);
                continue;
            }

            let mut last_time = entry.time_ms;
            let mut j = i + 1;
            while j < total && entries[j].time_ms - last_time < self.max_interval_ms {
                if !consumed[j] && entries[j].value == entry.value {
                    consumed[j] = true;
                    last_time = entries[j].time_ms;
                    if let Some(NoteAttributes { lyric: Some(lyric), .. }) = entries[j].attributes.transferable() {
                        entry.attributes.append_lyric(&lyric);
                    }
                    self.folded += 1;
                    entry.attributes.duration = Some(last_time - entry.time_ms);
                }
                j += 1;
            }

            out.push(entry);
        }

        Ok(Timeline::from(out).into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([("folded".to_string(), self.folded as f64)])
    }
}

/// Settings for splitting long notes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SplitLongNoteConfig {
    /// Notes at least this long are split
    pub min_duration_ms: f64,
    /// Length of each piece; must be positive
    pub split_duration_ms: f64,
}

impl Default for SplitLongNoteConfig {
    fn default() -> Self {
        SplitLongNoteConfig {
            min_duration_ms: 500.0,
            split_duration_ms: 100.0,
        }
    }
}

/// Replaces each long note by a run of short repeated presses
pub struct SplitLongNotePass {
    min_duration_ms: f64,
    split_duration_ms: f64,
    split: usize,
}

impl SplitLongNotePass {
    pub fn new(config: SplitLongNoteConfig) -> Result<Self, PassError> {
        if config.split_duration_ms <= 0.0 {
            return Err(PassError::configuration(
                "SplitLongNotePass",
                "split duration must be positive",
            ));
        }
        Ok(SplitLongNotePass {
            min_duration_ms: config.min_duration_ms,
            split_duration_ms: config.split_duration_ms,
            split: 0,
        })
    }
}

impl Pass for SplitLongNotePass {
    fn name(&self) -> &'static str {
        "SplitLongNotePass"
    }

    fn description(&self) -> &'static str {
        "Split long notes"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let notes = input.into_notes(self.name())?;
        self.split = 0;

        let step = self.split_duration_ms;
        let mut out: Timeline = Timeline::new();
        for mut entry in notes.into_entries() {
            let long = entry.attributes.duration.filter(|&d| d >= self.min_duration_ms);
            let Some(duration) = long else {
                out.push(entry);
                continue;
            };

            let (value, start) = (entry.value, entry.time_ms);
            let end = start + duration;
            entry.attributes.duration = Some(step);
            out.push(entry);

            let mut k = 1.0;
            while start + k * step < end {
                out.push(Entry::with_attributes(value, start + k * step, NoteAttributes::with_duration(step)));
                k += 1.0;
            }
            self.split += 1;
        }

        out.sort_by_time();
        Ok(out.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([("split".to_string(), self.split as f64)])
    }
}

/// Settings for duration estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EstimateNoteDurationConfig {
    /// Fraction of the gap to the next chord
    pub multiplier: f64,
}

impl Default for EstimateNoteDurationConfig {
    fn default() -> Self {
        EstimateNoteDurationConfig { multiplier: 0.75 }
    }
}

/// Gives notes without a duration a fraction of the time until the next chord
///
/// The final chord has nothing to measure against and is left as is.
pub struct EstimateNoteDurationPass {
    multiplier: f64,
    estimated: usize,
}

impl EstimateNoteDurationPass {
    pub fn new(config: EstimateNoteDurationConfig) -> Self {
        EstimateNoteDurationPass {
            multiplier: config.multiplier,
            estimated: 0,
        }
    }
}

impl Pass for EstimateNoteDurationPass {
    fn name(&self) -> &'static str {
        "EstimateNoteDurationPass"
    }

    fn description(&self) -> &'static str {
        "Estimate note durations"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        self.estimated = 0;

        let total = notes.len();
        let chords: Vec<_> = notes.chords().filter(|range| range.end < total).collect();
        for range in chords {
            let gap = notes[range.end].time_ms - notes[range.start].time_ms;
            for entry in &mut notes[range] {
                if entry.attributes.duration.is_none() {
                    entry.attributes.duration = Some(gap * self.multiplier);
                    self.estimated += 1;
                }
            }
        }

        Ok(notes.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([("estimated".to_string(), self.estimated as f64)])
    }
}
