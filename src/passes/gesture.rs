// Gesture emission - turn timed keys into grouped taps and holds at key positions
//
// Without durations every chord becomes one group of fixed-length taps. With
// durations, notes are packed into variable-size groups; the input layer cannot
// express a stroke that ends exactly where another starts, so stroke ends are
// kept at least a margin away from later onsets.

use serde::{Deserialize, Serialize};
use std::rc::Rc;

use super::pass::{Pass, PassError, PipelineData, Progress, Statistics};
use crate::layout::{KeyMapper, Point};
use crate::notes::{DurationType, Timeline};

/// Grouping tolerance for medium-sized groups
const EPS_MID_MS: f64 = 1.0;

/// One tap or hold inside a gesture group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gesture {
    /// Offset from the group start
    pub delay_ms: f64,
    pub duration_ms: f64,
    pub position: Point,
}

/// A batch of gestures dispatched together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureGroup {
    pub gestures: Vec<Gesture>,
    /// Absolute start time of the group
    pub start_time_ms: f64,
}

/// Final pipeline output, ordered by group start
pub type GestureList = Vec<GestureGroup>;

/// Settings for gesture emission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyToGestureConfig {
    /// Tap length; strokes shorter than this are discarded
    pub press_duration_ms: f64,
    pub duration_mode: DurationType,
    /// Longer strokes are cut to this length
    pub max_gesture_duration_ms: f64,
    /// Strokes per group, at least 1
    pub max_gesture_size: usize,
    pub margin_duration_ms: f64,

    /// Target keyboard (required)
    #[serde(skip)]
    pub profile: Option<Rc<dyn KeyMapper>>,
}

impl Default for KeyToGestureConfig {
    fn default() -> Self {
        KeyToGestureConfig {
            press_duration_ms: 5.0,
            duration_mode: DurationType::None,
            max_gesture_duration_ms: 10000.0,
            max_gesture_size: 19,
            margin_duration_ms: 100.0,
            profile: None,
        }
    }
}

/// A key held from `start` to `end`
#[derive(Debug, Clone, Copy)]
struct Stroke {
    key: i32,
    start: f64,
    end: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct GestureCounters {
    directly_truncated: usize,
    group_truncated: usize,
    same_key_truncated: usize,
    removed_short: usize,
    missing_position: usize,
}

/// Converts key timelines into gesture groups
pub struct KeyToGesturePass {
    config: KeyToGestureConfig,
    profile: Rc<dyn KeyMapper>,
    size_low: usize,
    size_mid: usize,
    counters: GestureCounters,
}

impl KeyToGesturePass {
    pub fn new(config: KeyToGestureConfig) -> Result<Self, PassError> {
        let name = "KeyToGesturePass";
        let profile = config
            .profile
            .clone()
            .ok_or_else(|| PassError::configuration(name, "profile is required"))?;
        if config.max_gesture_size < 1 {
            return Err(PassError::configuration(name, "maximum gesture size must be at least 1"));
        }

        // ceil(size / 3) and ceil(size * 2 / 3)
        let size = config.max_gesture_size;
        Ok(KeyToGesturePass {
            size_low: (size + 2) / 3,
            size_mid: (2 * size + 2) / 3,
            config,
            profile,
            counters: GestureCounters::default(),
        })
    }

    fn position(&mut self, key: i32) -> Option<Point> {
        let position = self.profile.key_position(key);
        if position.is_none() {
            log::warn!("Key {} has no position, discarding it", key);
            self.counters.missing_position += 1;
        }
        position
    }

    fn chord_taps(&mut self, notes: &Timeline) -> GestureList {
        let press = self.config.press_duration_ms;
        let mut groups = GestureList::new();
        for range in notes.chords() {
            let start_time_ms = notes[range.start].time_ms;
            let gestures: Vec<Gesture> = notes[range]
                .iter()
                .filter_map(|entry| self.position(entry.value))
                .map(|position| Gesture {
                    delay_ms: 0.0,
                    duration_ms: press,
                    position,
                })
                .collect();

            if !gestures.is_empty() {
                groups.push(GestureGroup { gestures, start_time_ms });
            }
        }
        groups
    }

    fn should_close(&self, size: usize, gap: f64) -> bool {
        let margin = self.config.margin_duration_ms;
        size >= self.config.max_gesture_size
            || (size < self.size_low && gap > margin)
            || (size > self.size_mid && gap > -margin)
            || (size >= self.size_low && size <= self.size_mid && gap > EPS_MID_MS)
    }

    /// Pull every stroke end that lands within the margin of `onset` back to `onset - margin`
    fn separate_tails(&self, group: &mut [Stroke], onset: f64) {
        let margin = self.config.margin_duration_ms;
        for stroke in group.iter_mut() {
            if (stroke.end - onset).abs() < margin {
                stroke.end = onset - margin;
            }
        }
    }

    fn close_group(&mut self, group: &mut [Stroke], next_onset: f64) {
        for stroke in group.iter_mut() {
            if stroke.end > next_onset {
                stroke.end = next_onset;
                self.counters.group_truncated += 1;
            }
        }
        self.separate_tails(group, next_onset);
    }

    fn stroke_groups(&mut self, notes: &Timeline) -> Vec<Vec<Stroke>> {
        let mut groups = Vec::new();
        let mut current: Vec<Stroke> = Vec::new();
        let mut group_end = 0.0;

        for entry in notes.iter() {
            let start = entry.time_ms;
            let mut duration = entry.attributes.duration.unwrap_or(self.config.press_duration_ms);
            if duration > self.config.max_gesture_duration_ms {
                duration = self.config.max_gesture_duration_ms;
                self.counters.directly_truncated += 1;
            }
            let stroke = Stroke {
                key: entry.value,
                start,
                end: start + duration,
            };

            if !current.is_empty() && self.should_close(current.len(), start - group_end) {
                self.close_group(&mut current, start);
                groups.push(std::mem::take(&mut current));
            }

            if current.is_empty() {
                group_end = stroke.end;
                current.push(stroke);
                continue;
            }

            if let Some(earlier) = current.iter_mut().find(|s| s.key == stroke.key && s.end > start) {
                earlier.end = start - self.config.margin_duration_ms;
                self.counters.same_key_truncated += 1;
            }
            self.separate_tails(&mut current, start);

            current.push(stroke);
            if stroke.end > group_end {
                group_end = stroke.end;
            }
        }

        if !current.is_empty() {
            groups.push(current);
        }
        groups
    }

    fn held_strokes(&mut self, notes: &Timeline) -> GestureList {
        let mut gesture_groups = GestureList::new();
        for group in self.stroke_groups(notes) {
            let start_time_ms = group[0].start;
            let mut gestures = Vec::with_capacity(group.len());

            for stroke in group {
                let duration_ms = stroke.end - stroke.start;
                if duration_ms < self.config.press_duration_ms {
                    self.counters.removed_short += 1;
                    continue;
                }
                let Some(position) = self.position(stroke.key) else {
                    continue;
                };
                gestures.push(Gesture {
                    delay_ms: stroke.start - start_time_ms,
                    duration_ms,
                    position,
                });
            }

            if !gestures.is_empty() {
                gesture_groups.push(GestureGroup { gestures, start_time_ms });
            }
        }
        gesture_groups
    }
}

impl Pass for KeyToGesturePass {
    fn name(&self) -> &'static str {
        "KeyToGesturePass"
    }

    fn description(&self) -> &'static str {
        "Convert keys to gestures"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let notes = input.into_notes(self.name())?;
        self.counters = GestureCounters::default();

        let Some(first) = notes.first() else {
            return Err(PassError::processing(self.name(), "no keys to convert"));
        };

        let has_duration = first.attributes.duration.is_some();
        let gestures = match self.config.duration_mode {
            DurationType::Native if has_duration => self.held_strokes(&notes),
            _ => self.chord_taps(&notes),
        };

        Ok(gestures.into())
    }

    fn statistics(&self) -> Statistics {
        let c = &self.counters;
        Statistics::from([
            ("directly_truncated".to_string(), c.directly_truncated as f64),
            ("group_truncated".to_string(), c.group_truncated as f64),
            ("same_key_truncated".to_string(), c.same_key_truncated as f64),
            ("removed_short".to_string(), c.removed_short as f64),
            ("missing_position".to_string(), c.missing_position as f64),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{presets, KeyProfile};
    use crate::notes::{Entry, NoteAttributes, NO_KEY};

    fn profile() -> Rc<dyn KeyMapper> {
        Rc::new(KeyProfile::new("white", presets::generic_3x7()).unwrap())
    }

    fn pass(duration_mode: DurationType) -> KeyToGesturePass {
        KeyToGesturePass::new(KeyToGestureConfig {
            duration_mode,
            profile: Some(profile()),
            ..Default::default()
        })
        .unwrap()
    }

    fn held(key: i32, time: f64, duration: f64) -> Entry {
        Entry::with_attributes(key, time, NoteAttributes::with_duration(duration))
    }

    fn run(pass: &mut KeyToGesturePass, entries: Vec<Entry>) -> GestureList {
        let notes: Timeline = entries.into();
        pass.run(notes.into(), &mut Progress::none())
            .unwrap()
            .into_gestures("test")
            .unwrap()
    }

    /// (delay, duration) per gesture, per group
    fn shape(groups: &GestureList) -> Vec<(f64, Vec<(f64, f64)>)> {
        groups
            .iter()
            .map(|g| (g.start_time_ms, g.gestures.iter().map(|x| (x.delay_ms, x.duration_ms)).collect()))
            .collect()
    }

    #[test]
    fn test_chord_becomes_one_tap_group() {
        let mut pass = pass(DurationType::None);
        let groups = run(&mut pass, vec![Entry::new(0, 0.0), Entry::new(4, 0.0), Entry::new(2, 100.0)]);

        assert_eq!(groups.len(), 2);
        assert_eq!(shape(&groups)[0], (0.0, vec![(0.0, 5.0), (0.0, 5.0)]));
        assert_eq!(groups[0].gestures[1].position, profile().key_position(4).unwrap());
        assert_eq!(groups[1].start_time_ms, 100.0);
    }

    #[test]
    fn test_keys_without_position_are_skipped() {
        let mut pass = pass(DurationType::None);
        let groups = run(&mut pass, vec![Entry::new(NO_KEY, 0.0), Entry::new(1, 200.0), Entry::new(99, 200.0)]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].gestures.len(), 1);
        assert_eq!(pass.statistics()["missing_position"], 2.0);
    }

    #[test]
    fn test_native_falls_back_without_durations() {
        let mut pass = pass(DurationType::Native);
        let groups = run(&mut pass, vec![Entry::new(0, 0.0), Entry::new(1, 0.0)]);
        assert_eq!(shape(&groups), vec![(0.0, vec![(0.0, 5.0), (0.0, 5.0)])]);
    }

    #[test]
    fn test_native_separate_groups_after_gap() {
        let mut pass = pass(DurationType::Native);
        let groups = run(&mut pass, vec![held(0, 0.0, 500.0), held(1, 1000.0, 200.0)]);

        assert_eq!(
            shape(&groups),
            vec![(0.0, vec![(0.0, 500.0)]), (1000.0, vec![(0.0, 200.0)])]
        );
    }

    #[test]
    fn test_native_overlap_keeps_margin() {
        let mut pass = pass(DurationType::Native);
        let groups = run(&mut pass, vec![held(0, 0.0, 300.0), held(1, 250.0, 300.0)]);

        assert_eq!(shape(&groups), vec![(0.0, vec![(0.0, 150.0), (250.0, 300.0)])]);
    }

    #[test]
    fn test_native_same_key_overlap() {
        let mut pass = pass(DurationType::Native);
        let groups = run(&mut pass, vec![held(0, 0.0, 300.0), held(0, 200.0, 100.0)]);

        assert_eq!(shape(&groups), vec![(0.0, vec![(0.0, 100.0), (200.0, 100.0)])]);
        assert_eq!(pass.statistics()["same_key_truncated"], 1.0);
    }

    #[test]
    fn test_native_truncation_and_short_removal() {
        let mut pass = pass(DurationType::Native);
        let groups = run(&mut pass, vec![held(0, 0.0, 20000.0), held(1, 30000.0, 3.0)]);

        assert_eq!(shape(&groups), vec![(0.0, vec![(0.0, 10000.0)])]);
        let stats = pass.statistics();
        assert_eq!(stats["directly_truncated"], 1.0);
        assert_eq!(stats["removed_short"], 1.0);
    }

    #[test]
    fn test_native_group_size_cap() {
        let mut pass = KeyToGesturePass::new(KeyToGestureConfig {
            duration_mode: DurationType::Native,
            max_gesture_size: 3,
            profile: Some(profile()),
            ..Default::default()
        })
        .unwrap();

        let groups = run(
            &mut pass,
            vec![
                held(0, 0.0, 1000.0),
                held(1, 200.0, 1000.0),
                held(2, 400.0, 1000.0),
                held(3, 600.0, 1000.0),
            ],
        );

        // The full group is cut off before the next onset, minus the margin
        assert_eq!(
            shape(&groups),
            vec![
                (0.0, vec![(0.0, 500.0), (200.0, 300.0), (400.0, 100.0)]),
                (600.0, vec![(0.0, 1000.0)]),
            ]
        );
        assert_eq!(pass.statistics()["group_truncated"], 3.0);
    }

    #[test]
    fn test_rejects_empty_and_missing_profile() {
        let mut pass = pass(DurationType::None);
        assert!(pass.run(Timeline::new().into(), &mut Progress::none()).is_err());
        assert!(KeyToGesturePass::new(KeyToGestureConfig::default()).is_err());
    }

    #[test]
    fn test_gesture_json_shape() {
        let group = GestureGroup {
            gestures: vec![Gesture {
                delay_ms: 0.0,
                duration_ms: 5.0,
                position: Point::new(0.5, 1.0),
            }],
            start_time_ms: 10.0,
        };
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["startTimeMs"], 10.0);
        assert_eq!(json["gestures"][0]["durationMs"], 5.0);
    }
}
