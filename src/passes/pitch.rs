// Pitch passes - transpose, legalize into the playable range, map pitches to keys

use serde::{Deserialize, Serialize};
use std::rc::Rc;

use super::pass::{Pass, PassError, PipelineData, Progress, Statistics};
use crate::layout::KeyMapper;
use crate::notes::{Entry, Timeline};

/// Settings for a fixed transposition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PitchOffsetConfig {
    /// Semitones to add to every pitch (required)
    pub offset: Option<i32>,
}

/// Adds a fixed offset to every pitch
pub struct PitchOffsetPass {
    offset: i32,
}

impl PitchOffsetPass {
    pub fn new(config: PitchOffsetConfig) -> Result<Self, PassError> {
        let offset = config
            .offset
            .ok_or_else(|| PassError::configuration("PitchOffsetPass", "offset is required"))?;
        Ok(PitchOffsetPass { offset })
    }
}

impl Pass for PitchOffsetPass {
    fn name(&self) -> &'static str {
        "PitchOffsetPass"
    }

    fn description(&self) -> &'static str {
        "Transpose every note"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        for entry in notes.iter_mut() {
            entry.value += self.offset;
        }
        Ok(notes.into())
    }
}

/// What to do with an in-range pitch that has no key (usually a black key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemitoneRoundingMode {
    /// Keep the pitch unresolved
    None,
    /// One semitone down, if playable
    #[default]
    Floor,
    /// One semitone up, if playable
    Ceil,
    /// Remove the note
    Drop,
    /// Emit both neighbours that are playable
    Both,
    /// Alternate down/up across the run
    Alternating,
}

/// Settings for range legalization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegalizeConfig {
    /// Required
    pub semitone_rounding_mode: Option<SemitoneRoundingMode>,

    /// Notes at most this many octaves below the range are folded up into it
    pub wrap_lower_octave: u32,

    /// Notes at most this many octaves above the range are folded down into it
    pub wrap_higher_octave: u32,

    /// Target keyboard (required)
    #[serde(skip)]
    pub profile: Option<Rc<dyn KeyMapper>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct LegalizeCounters {
    underflowed: usize,
    overflowed: usize,
    rounded: usize,
    wrapped_lower: usize,
    wrapped_higher: usize,
    dropped_semitone: usize,
}

/// Makes every note playable on the target keyboard, or drops it
///
/// Out-of-range pitches are octave-wrapped when close enough to the boundary,
/// otherwise counted as underflow/overflow and dropped. In-range pitches without
/// a key are resolved by the rounding mode.
pub struct LegalizeTargetNoteRangePass {
    mode: SemitoneRoundingMode,
    wrap_lower_octave: i32,
    wrap_higher_octave: i32,
    profile: Rc<dyn KeyMapper>,
    last_is_floor: bool,
    counters: LegalizeCounters,
}

impl LegalizeTargetNoteRangePass {
    pub fn new(config: LegalizeConfig) -> Result<Self, PassError> {
        let name = "LegalizeTargetNoteRangePass";
        let mode = config
            .semitone_rounding_mode
            .ok_or_else(|| PassError::configuration(name, "semitone rounding mode is required"))?;
        let profile = config
            .profile
            .ok_or_else(|| PassError::configuration(name, "profile is required"))?;

        Ok(LegalizeTargetNoteRangePass {
            mode,
            wrap_lower_octave: config.wrap_lower_octave as i32,
            wrap_higher_octave: config.wrap_higher_octave as i32,
            profile,
            last_is_floor: false,
            counters: LegalizeCounters::default(),
        })
    }

    /// Number of notes outside the range that could not be wrapped, weighted for overflow
    pub fn out_of_range_weight(&self, overflow_weight: f64) -> f64 {
        self.counters.overflowed as f64 * overflow_weight + self.counters.underflowed as f64
    }

    pub fn overflowed(&self) -> usize {
        self.counters.overflowed
    }

    pub fn underflowed(&self) -> usize {
        self.counters.underflowed
    }

    pub fn rounded(&self) -> usize {
        self.counters.rounded
    }

    /// Copy of `entry` shifted by `delta` semitones, if that pitch has a key
    fn shifted(&self, entry: &Entry, delta: i32) -> Option<Entry> {
        let pitch = entry.value + delta;
        self.profile
            .is_playable(pitch)
            .then(|| Entry::with_attributes(pitch, entry.time_ms, entry.attributes.clone()))
    }

    fn round(&mut self, entry: Entry, out: &mut Vec<Entry>) {
        let emitted = match self.mode {
            SemitoneRoundingMode::None => {
                out.push(entry);
                return;
            }
            SemitoneRoundingMode::Drop => Vec::new(),
            SemitoneRoundingMode::Floor => self.shifted(&entry, -1).into_iter().collect(),
            SemitoneRoundingMode::Ceil => self.shifted(&entry, 1).into_iter().collect(),
            SemitoneRoundingMode::Both => self
                .shifted(&entry, -1)
                .into_iter()
                .chain(self.shifted(&entry, 1))
                .collect(),
            SemitoneRoundingMode::Alternating => {
                let delta = if self.last_is_floor { 1 } else { -1 };
                let shifted = self.shifted(&entry, delta);
                if shifted.is_some() {
                    self.last_is_floor = !self.last_is_floor;
                }
                shifted.into_iter().collect()
            }
        };

        if emitted.is_empty() {
            self.counters.dropped_semitone += 1;
        } else {
            self.counters.rounded += 1;
            out.extend(emitted);
        }
    }
}

impl Pass for LegalizeTargetNoteRangePass {
    fn name(&self) -> &'static str {
        "LegalizeTargetNoteRangePass"
    }

    fn description(&self) -> &'static str {
        "Fit notes into the playable range"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let notes = input.into_notes(self.name())?;
        self.counters = LegalizeCounters::default();
        self.last_is_floor = false;

        if notes.is_empty() {
            return Ok(notes.into());
        }

        let (low, high) = self
            .profile
            .note_range()
            .ok_or_else(|| PassError::processing(self.name(), "profile has no playable keys"))?;

        let mut out = Vec::with_capacity(notes.len());
        for mut entry in notes.into_entries() {
            let mut pitch = entry.value;

            if pitch < low {
                if pitch >= low - self.wrap_lower_octave * 12 {
                    pitch += 12 * octaves_to_cover(low - pitch);
                    self.counters.wrapped_lower += 1;
                } else {
                    self.counters.underflowed += 1;
                    continue;
                }
            }
            if pitch > high {
                if pitch <= high + self.wrap_higher_octave * 12 {
                    pitch -= 12 * octaves_to_cover(pitch - high);
                    self.counters.wrapped_higher += 1;
                } else {
                    self.counters.overflowed += 1;
                    continue;
                }
            }
            entry.value = pitch;

            if self.profile.is_playable(pitch) {
                out.push(entry);
            } else {
                self.round(entry, &mut out);
            }
        }

        Ok(Timeline::from(out).into())
    }

    fn statistics(&self) -> Statistics {
        let c = &self.counters;
        Statistics::from([
            ("underflowed".to_string(), c.underflowed as f64),
            ("overflowed".to_string(), c.overflowed as f64),
            ("rounded".to_string(), c.rounded as f64),
            ("wrapped_lower".to_string(), c.wrapped_lower as f64),
            ("wrapped_higher".to_string(), c.wrapped_higher as f64),
            ("dropped_semitone".to_string(), c.dropped_semitone as f64),
        ])
    }
}

/// Whole octaves needed to cover `semitones` (> 0)
fn octaves_to_cover(semitones: i32) -> i32 {
    (semitones + 11) / 12
}

/// Settings for pitch -> key mapping
#[derive(Debug, Clone, Default)]
pub struct NoteToKeyConfig {
    /// Target keyboard (required)
    pub profile: Option<Rc<dyn KeyMapper>>,
}

/// Replaces each pitch with its key index
///
/// Every pitch must already be playable; legalize first.
pub struct NoteToKeyPass {
    profile: Rc<dyn KeyMapper>,
}

impl NoteToKeyPass {
    pub fn new(config: NoteToKeyConfig) -> Result<Self, PassError> {
        let profile = config
            .profile
            .ok_or_else(|| PassError::configuration("NoteToKeyPass", "profile is required"))?;
        Ok(NoteToKeyPass { profile })
    }
}

impl Pass for NoteToKeyPass {
    fn name(&self) -> &'static str {
        "NoteToKeyPass"
    }

    fn description(&self) -> &'static str {
        "Convert notes to keys"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        for entry in notes.iter_mut() {
            entry.value = self.profile.key_by_pitch(entry.value).ok_or_else(|| {
                PassError::processing(self.name(), format!("no key plays pitch {}", entry.value))
            })?;
        }
        Ok(notes.into())
    }
}
