// Density passes - same-key rate limiting, key batching, chord size limits, soft tempo limiting

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::pass::{Pass, PassError, PipelineData, Progress, Statistics};
use crate::notes::NO_KEY;
use crate::random::{shuffle, Prng};

/// Settings for the same-key rate limit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SingleKeyFrequencyLimitConfig {
    /// Minimum time between two presses of one key (required)
    pub min_interval_ms: Option<f64>,
}

/// Drops repeated presses of a key that come sooner than the minimum interval
///
/// Deletions are staged, so a dropped press never suppresses a later one.
pub struct SingleKeyFrequencyLimitPass {
    min_interval_ms: f64,
    dropped: usize,
}

impl SingleKeyFrequencyLimitPass {
    pub fn new(config: SingleKeyFrequencyLimitConfig) -> Result<Self, PassError> {
        let name = "SingleKeyFrequencyLimitPass";
        let min_interval_ms = config
            .min_interval_ms
            .ok_or_else(|| PassError::configuration(name, "minimum interval is required"))?;
        if min_interval_ms < 0.0 {
            return Err(PassError::configuration(name, "minimum interval must not be negative"));
        }
        Ok(SingleKeyFrequencyLimitPass {
            min_interval_ms,
            dropped: 0,
        })
    }
}

impl Pass for SingleKeyFrequencyLimitPass {
    fn name(&self) -> &'static str {
        "SingleKeyFrequencyLimitPass"
    }

    fn description(&self) -> &'static str {
        "Limit single key frequency"
    }

    fn run(&mut self, input: PipelineData, progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        self.dropped = 0;

        let total = notes.len();
        for i in 0..total {
            if i % 10 == 0 {
                progress.report(i as f64 / total as f64 * 100.0, self.description());
            }
            if notes.is_deleted(i) || !notes[i].is_playable() {
                continue;
            }

            let (key, onset) = (notes[i].value, notes[i].time_ms);
            for j in (i + 1)..total {
                let gap = notes[j].time_ms - onset;
                if gap > self.min_interval_ms {
                    break;
                }
                if gap < self.min_interval_ms && notes[j].value == key && !notes.is_deleted(j) {
                    notes.soft_delete(j);
                    self.dropped += 1;
                }
            }
        }

        notes.apply_changes();
        Ok(notes.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([("dropped".to_string(), self.dropped as f64)])
    }
}

fn default_max_batch_size() -> usize {
    19
}

/// Settings for key batching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeKeyConfig {
    /// Notes closer than this to the batch anchor join the batch (required)
    pub max_interval_ms: Option<f64>,

    /// Batch size cap; a full batch starts a new one
    pub max_batch_size: usize,
}

impl Default for MergeKeyConfig {
    fn default() -> Self {
        MergeKeyConfig {
            max_interval_ms: None,
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// Snaps nearly simultaneous notes onto one onset and removes duplicate keys per batch
pub struct MergeKeyPass {
    max_interval_ms: f64,
    max_batch_size: usize,
    dropped_same_key: usize,
}

impl MergeKeyPass {
    pub fn new(config: MergeKeyConfig) -> Result<Self, PassError> {
        let max_interval_ms = config
            .max_interval_ms
            .ok_or_else(|| PassError::configuration("MergeKeyPass", "maximum interval is required"))?;
        Ok(MergeKeyPass {
            max_interval_ms,
            max_batch_size: config.max_batch_size,
            dropped_same_key: 0,
        })
    }
}

impl Pass for MergeKeyPass {
    fn name(&self) -> &'static str {
        "MergeKeyPass"
    }

    fn description(&self) -> &'static str {
        "Merge nearby keys"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        self.dropped_same_key = 0;

        let Some((first_key, first_time)) = notes.first().map(|e| (e.value, e.time_ms)) else {
            return Err(PassError::processing(self.name(), "no notes to merge"));
        };

        let mut anchor = first_time;
        let mut batch_size = 0;
        let mut batch_keys = BTreeSet::from([first_key]);

        for i in 1..notes.len() {
            let (key, time) = (notes[i].value, notes[i].time_ms);

            if time - anchor < self.max_interval_ms && batch_size < self.max_batch_size {
                notes.soft_change_time(i, anchor);
                if key != NO_KEY && batch_keys.contains(&key) {
                    notes.soft_delete(i);
                    self.dropped_same_key += 1;
                } else {
                    batch_keys.insert(key);
                    batch_size += 1;
                }
            } else {
                batch_keys = BTreeSet::from([key]);
                batch_size = 0;
                anchor = time;
            }
        }

        notes.apply_changes();
        Ok(notes.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([("dropped_same_key".to_string(), self.dropped_same_key as f64)])
    }
}

/// Seed for random chord member selection
pub const CHORD_SELECT_SEED: u32 = 74751;

/// How excess chord members are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitMode {
    #[default]
    Delete,
    /// Stagger the excess members after the chord
    Split,
}

/// Which chord members are kept first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectMode {
    #[default]
    High,
    Low,
    Random,
}

/// Settings for the chord size limit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChordNoteCountLimitConfig {
    /// At least 1
    pub max_note_count: usize,
    pub limit_mode: LimitMode,
    /// Delay step between staggered members in split mode
    pub split_delay_ms: f64,
    pub select_mode: SelectMode,
    pub random_seed: u32,
}

impl Default for ChordNoteCountLimitConfig {
    fn default() -> Self {
        ChordNoteCountLimitConfig {
            max_note_count: 9,
            limit_mode: LimitMode::Delete,
            split_delay_ms: 5.0,
            select_mode: SelectMode::High,
            random_seed: CHORD_SELECT_SEED,
        }
    }
}

/// Caps the number of simultaneous notes per chord
///
/// Members are ranked by the select mode; ranks past the cap are deleted or,
/// in split mode, delayed by `split_delay_ms` per excess rank.
pub struct ChordNoteCountLimitPass {
    config: ChordNoteCountLimitConfig,
    deleted: usize,
    split: usize,
}

impl ChordNoteCountLimitPass {
    pub fn new(config: ChordNoteCountLimitConfig) -> Result<Self, PassError> {
        let name = "ChordNoteCountLimitPass";
        if config.max_note_count < 1 {
            return Err(PassError::configuration(name, "maximum note count must be at least 1"));
        }
        if config.split_delay_ms < 0.0 {
            return Err(PassError::configuration(name, "split delay must not be negative"));
        }
        Ok(ChordNoteCountLimitPass {
            config,
            deleted: 0,
            split: 0,
        })
    }
}

impl Pass for ChordNoteCountLimitPass {
    fn name(&self) -> &'static str {
        "ChordNoteCountLimitPass"
    }

    fn description(&self) -> &'static str {
        "Limit notes per chord"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        self.deleted = 0;
        self.split = 0;

        // Fresh generator per run
        let mut rng = Prng::new(self.config.random_seed);
        let max = self.config.max_note_count;
        let chords: Vec<_> = notes.chords().filter(|range| range.len() > max).collect();

        for range in chords {
            let mut members: Vec<usize> = range.collect();
            match self.config.select_mode {
                SelectMode::High => members.sort_by(|&a, &b| notes[b].value.cmp(&notes[a].value)),
                SelectMode::Low => members.sort_by(|&a, &b| notes[a].value.cmp(&notes[b].value)),
                SelectMode::Random => shuffle(&mut members, &mut rng),
            }

            for (rank, &index) in members.iter().enumerate().skip(max) {
                match self.config.limit_mode {
                    LimitMode::Delete => {
                        notes.soft_delete(index);
                        self.deleted += 1;
                    }
                    LimitMode::Split => {
                        let delay = self.config.split_delay_ms * (rank - max + 1) as f64;
                        let time = notes[index].time_ms + delay;
                        notes.soft_change_time(index, time);
                        self.split += 1;
                    }
                }
            }
        }

        notes.apply_changes();
        Ok(notes.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([
            ("deleted".to_string(), self.deleted as f64),
            ("split".to_string(), self.split as f64),
        ])
    }
}

/// Settings for the soft tempo limit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoteFrequencySoftLimitConfig {
    /// Interval the note rate saturates towards; must be positive
    pub min_interval_ms: f64,
}

impl Default for NoteFrequencySoftLimitConfig {
    fn default() -> Self {
        NoteFrequencySoftLimitConfig { min_interval_ms: 150.0 }
    }
}

/// Slows down passages that are too fast, smoothly instead of clipping
///
/// Each inter-onset rate `f = 1000 / gap` becomes `cap * tanh(f / cap)` with
/// `cap = 1000 / min_interval_ms`, and onsets are rebuilt from the limited
/// rates. Simultaneous onsets become `min_interval_ms` apart.
pub struct NoteFrequencySoftLimitPass {
    min_interval_ms: f64,
    slowed: usize,
}

impl NoteFrequencySoftLimitPass {
    pub fn new(config: NoteFrequencySoftLimitConfig) -> Result<Self, PassError> {
        if config.min_interval_ms <= 0.0 {
            return Err(PassError::configuration(
                "NoteFrequencySoftLimitPass",
                "minimum interval must be positive",
            ));
        }
        Ok(NoteFrequencySoftLimitPass {
            min_interval_ms: config.min_interval_ms,
            slowed: 0,
        })
    }

    fn limited_gap(&self, gap: f64) -> f64 {
        let cap = 1000.0 / self.min_interval_ms;
        let rate = if gap > 0.0 { 1000.0 / gap } else { f64::INFINITY };
        1000.0 / (cap * (rate / cap).tanh())
    }
}

impl Pass for NoteFrequencySoftLimitPass {
    fn name(&self) -> &'static str {
        "NoteFrequencySoftLimitPass"
    }

    fn description(&self) -> &'static str {
        "Limit note frequencies"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        self.slowed = 0;

        let gaps: Vec<f64> = notes.windows(2).map(|w| w[1].time_ms - w[0].time_ms).collect();
        for (i, gap) in gaps.into_iter().enumerate() {
            let limited = self.limited_gap(gap);
            if limited > gap + 1e-6 {
                self.slowed += 1;
            }
            notes[i + 1].time_ms = notes[i].time_ms + limited;
        }

        Ok(notes.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([("slowed".to_string(), self.slowed as f64)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{Entry, Timeline};

    fn timeline(notes: &[(i32, f64)]) -> PipelineData {
        let t: Timeline = notes.iter().map(|&(v, t)| Entry::new(v, t)).collect();
        t.into()
    }

    fn pairs(data: PipelineData) -> Vec<(i32, f64)> {
        data.into_notes("test")
            .unwrap()
            .iter()
            .map(|e| (e.value, e.time_ms))
            .collect()
    }

    fn limit_pass(min_interval_ms: f64) -> SingleKeyFrequencyLimitPass {
        SingleKeyFrequencyLimitPass::new(SingleKeyFrequencyLimitConfig {
            min_interval_ms: Some(min_interval_ms),
        })
        .unwrap()
    }

    #[test]
    fn test_single_key_limit_drops_fast_repeats() {
        let mut pass = limit_pass(100.0);
        let out = pass
            .run(timeline(&[(1, 0.0), (1, 50.0), (2, 60.0), (1, 99.0), (1, 100.0)]), &mut Progress::none())
            .unwrap();

        assert_eq!(pairs(out), vec![(1, 0.0), (2, 60.0), (1, 100.0)]);
        assert_eq!(pass.statistics()["dropped"], 2.0);
    }

    #[test]
    fn test_single_key_limit_checks_every_candidate() {
        // Consecutive duplicates are each evaluated; none slips through
        let mut pass = limit_pass(100.0);
        let out = pass
            .run(timeline(&[(3, 0.0), (3, 10.0), (3, 20.0), (3, 30.0)]), &mut Progress::none())
            .unwrap();
        assert_eq!(pairs(out), vec![(3, 0.0)]);
    }

    #[test]
    fn test_single_key_limit_ignores_no_key() {
        let mut pass = limit_pass(100.0);
        let out = pass
            .run(timeline(&[(NO_KEY, 0.0), (NO_KEY, 10.0)]), &mut Progress::none())
            .unwrap();
        assert_eq!(pairs(out).len(), 2);
    }

    #[test]
    fn test_single_key_limit_requires_interval() {
        assert!(SingleKeyFrequencyLimitPass::new(SingleKeyFrequencyLimitConfig::default()).is_err());
        assert!(SingleKeyFrequencyLimitPass::new(SingleKeyFrequencyLimitConfig {
            min_interval_ms: Some(-1.0)
        })
        .is_err());
    }

    #[test]
    fn test_merge_key_snaps_to_anchor() {
        let mut pass = MergeKeyPass::new(MergeKeyConfig {
            max_interval_ms: Some(20.0),
            ..Default::default()
        })
        .unwrap();

        let out = pass
            .run(
                timeline(&[(1, 0.0), (2, 5.0), (1, 10.0), (3, 30.0), (4, 45.0)]),
                &mut Progress::none(),
            )
            .unwrap();

        assert_eq!(pairs(out), vec![(1, 0.0), (2, 0.0), (3, 30.0), (4, 30.0)]);
        assert_eq!(pass.statistics()["dropped_same_key"], 1.0);
    }

    #[test]
    fn test_merge_key_batch_size_cap() {
        let mut pass = MergeKeyPass::new(MergeKeyConfig {
            max_interval_ms: Some(100.0),
            max_batch_size: 1,
        })
        .unwrap();

        let out = pass
            .run(timeline(&[(1, 0.0), (2, 1.0), (3, 2.0), (4, 3.0)]), &mut Progress::none())
            .unwrap();
        assert_eq!(pairs(out), vec![(1, 0.0), (2, 0.0), (3, 2.0), (4, 2.0)]);
    }

    #[test]
    fn test_merge_key_rejects_empty() {
        let mut pass = MergeKeyPass::new(MergeKeyConfig {
            max_interval_ms: Some(20.0),
            ..Default::default()
        })
        .unwrap();
        assert!(pass.run(timeline(&[]), &mut Progress::none()).is_err());
    }

    fn chord_limit(limit_mode: LimitMode, select_mode: SelectMode) -> ChordNoteCountLimitPass {
        ChordNoteCountLimitPass::new(ChordNoteCountLimitConfig {
            max_note_count: 2,
            limit_mode,
            select_mode,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_chord_limit_delete_keeps_highest() {
        let mut pass = chord_limit(LimitMode::Delete, SelectMode::High);
        let out = pass
            .run(timeline(&[(60, 0.0), (64, 0.0), (67, 0.0)]), &mut Progress::none())
            .unwrap();

        let mut kept: Vec<i32> = pairs(out).iter().map(|p| p.0).collect();
        kept.sort();
        assert_eq!(kept, vec![64, 67]);
        assert_eq!(pass.statistics()["deleted"], 1.0);
    }

    #[test]
    fn test_chord_limit_split_staggers_excess() {
        let mut pass = chord_limit(LimitMode::Split, SelectMode::High);
        let out = pairs(
            pass.run(timeline(&[(60, 0.0), (64, 0.0), (67, 0.0)]), &mut Progress::none())
                .unwrap(),
        );

        assert_eq!(out.len(), 3);
        assert_eq!(out[2], (60, 5.0));
        assert_eq!(pass.statistics()["split"], 1.0);
    }

    #[test]
    fn test_chord_limit_low_and_last_chord() {
        let mut pass = chord_limit(LimitMode::Delete, SelectMode::Low);
        let out = pass
            .run(
                timeline(&[(60, 0.0), (62, 500.0), (64, 500.0), (67, 500.0)]),
                &mut Progress::none(),
            )
            .unwrap();

        let values: Vec<i32> = pairs(out).iter().map(|p| p.0).collect();
        assert_eq!(values.len(), 3);
        assert!(!values.contains(&67));
    }

    #[test]
    fn test_chord_limit_random_is_reproducible() {
        let input = [(60, 0.0), (62, 0.0), (64, 0.0), (65, 0.0), (67, 0.0)];
        let mut a = chord_limit(LimitMode::Delete, SelectMode::Random);
        let mut b = chord_limit(LimitMode::Delete, SelectMode::Random);

        let out_a = pairs(a.run(timeline(&input), &mut Progress::none()).unwrap());
        let out_b = pairs(b.run(timeline(&input), &mut Progress::none()).unwrap());
        assert_eq!(out_a, out_b);
        let again = pairs(a.run(timeline(&input), &mut Progress::none()).unwrap());
        assert_eq!(out_a, again);
        assert_eq!(out_a.len(), 2);
    }

    #[test]
    fn test_chord_limit_rejects_zero() {
        assert!(ChordNoteCountLimitPass::new(ChordNoteCountLimitConfig {
            max_note_count: 0,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_soft_limit_saturates() {
        let mut pass = NoteFrequencySoftLimitPass::new(NoteFrequencySoftLimitConfig::default()).unwrap();
        let out = pairs(
            pass.run(timeline(&[(1, 0.0), (2, 10.0), (3, 2010.0), (4, 2010.0)]), &mut Progress::none())
                .unwrap(),
        );

        // Far above the cap: slowed to about the minimum interval
        assert!(out[1].1 > 140.0 && out[1].1 <= 150.0 + 1e-6);
        // Slow gaps are stretched only slightly
        let slow_gap = out[2].1 - out[1].1;
        assert!(slow_gap > 2000.0 && slow_gap < 2010.0);
        // Simultaneous onsets are spread by the minimum interval
        assert!((out[3].1 - out[2].1 - 150.0).abs() < 1e-6);
        assert!(pass.statistics()["slowed"] >= 2.0);
    }

    #[test]
    fn test_soft_limit_rejects_zero_interval() {
        assert!(NoteFrequencySoftLimitPass::new(NoteFrequencySoftLimitConfig { min_interval_ms: 0.0 }).is_err());
    }
}
