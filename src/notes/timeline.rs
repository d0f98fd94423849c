// Note timeline - canonical sorted sequence of entries
// Staged delete/retime with a single commit, chord grouping, and nearest-chord lookup

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut, Range};

use super::types::{Entry, NoteAttributes, PackedEntry, CHORD_EPSILON_MS};

/// How entry times are expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBase {
    /// Milliseconds from the start of the performance
    #[default]
    Absolute,

    /// Milliseconds since the previous entry
    Relative,
}

/// Mutable sequence of timeline entries
///
/// Entries are addressed by index. Soft mutations (`soft_delete`,
/// `soft_change_time`) are staged against those indices and leave the entries
/// themselves untouched until [`Timeline::apply_changes`] commits the whole
/// batch and re-sorts once. Queries made before the commit therefore see the
/// pre-commit order; use [`Timeline::is_deleted`] to skip staged deletions.
///
/// Serialized as a plain array of entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Entry>", into = "Vec<Entry>")]
pub struct Timeline {
    entries: Vec<Entry>,
    time_base: TimeBase,
    pending_deletes: BTreeSet<usize>,
    pending_times: BTreeMap<usize, f64>,
}

impl Timeline {
    /// Create an empty timeline in absolute time
    pub fn new() -> Self {
        Timeline::default()
    }

    /// Current time base
    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    /// Append an entry (does not re-sort)
    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Consume the timeline, discarding any staged changes
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    /// Convert absolute times to successive differences (in place)
    pub fn to_relative_time(&mut self) {
        if self.time_base == TimeBase::Relative {
            log::debug!("Timeline already in relative time");
            return;
        }

        let mut last_time = 0.0;
        for entry in self.entries.iter_mut() {
            let delta = entry.time_ms - last_time;
            last_time = entry.time_ms;
            entry.time_ms = delta;
        }
        self.time_base = TimeBase::Relative;
    }

    /// Convert successive differences back to absolute times (in place)
    pub fn to_absolute_time(&mut self) {
        if self.time_base == TimeBase::Absolute {
            log::debug!("Timeline already in absolute time");
            return;
        }

        let mut current = 0.0;
        for entry in self.entries.iter_mut() {
            current += entry.time_ms;
            entry.time_ms = current;
        }
        self.time_base = TimeBase::Absolute;
    }

    /// Stage removal of the entry at `index`
    pub fn soft_delete(&mut self, index: usize) {
        if index < self.entries.len() {
            self.pending_deletes.insert(index);
        }
    }

    /// Stage a new onset for the entry at `index`
    pub fn soft_change_time(&mut self, index: usize, time_ms: f64) {
        if index < self.entries.len() {
            self.pending_times.insert(index, time_ms);
        }
    }

    /// Whether the entry at `index` is staged for removal
    pub fn is_deleted(&self, index: usize) -> bool {
        self.pending_deletes.contains(&index)
    }

    /// The staged onset for the entry at `index`, if any
    pub fn pending_time(&self, index: usize) -> Option<f64> {
        self.pending_times.get(&index).copied()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending_deletes.is_empty() || !self.pending_times.is_empty()
    }

    /// Commit staged changes: drop deleted entries, promote staged times, re-sort by time
    ///
    /// A deletion wins over a retime of the same entry. With nothing staged this
    /// only performs a stable sort, so calling it twice in a row is a no-op the
    /// second time.
    pub fn apply_changes(&mut self) {
        if self.has_pending_changes() {
            let deletes = std::mem::take(&mut self.pending_deletes);
            let times = std::mem::take(&mut self.pending_times);
            let entries = std::mem::take(&mut self.entries);

            self.entries = entries
                .into_iter()
                .enumerate()
                .filter_map(|(index, mut entry)| {
                    if deletes.contains(&index) {
                        return None;
                    }
                    if let Some(&time) = times.get(&index) {
                        entry.time_ms = time;
                    }
                    Some(entry)
                })
                .collect();
        }

        self.sort_by_time();
    }

    /// Stable sort by onset
    pub fn sort_by_time(&mut self) {
        self.entries.sort_by(|a, b| {
            a.time_ms
                .partial_cmp(&b.time_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Index one past the chord that starts at `index`
    pub fn next_chord_start(&self, index: usize) -> usize {
        let Some(first) = self.entries.get(index) else {
            return self.entries.len();
        };

        let chord_time = first.time_ms;
        let mut next = index;
        while next < self.entries.len() && self.entries[next].time_ms - chord_time <= CHORD_EPSILON_MS {
            next += 1;
        }
        next
    }

    /// Iterate over chord index ranges, front to back
    pub fn chords(&self) -> ChordIter<'_> {
        ChordIter {
            timeline: self,
            index: 0,
        }
    }

    /// Fold each chord into a packed entry
    pub fn pack(&self) -> Vec<PackedEntry> {
        self.chords()
            .map(|range| {
                let members = &self.entries[range];
                let mut attributes: Vec<NoteAttributes> =
                    members.iter().map(|e| e.attributes.clone()).collect();

                if let Some(lyric) = members.iter().rev().find_map(|e| e.attributes.lyric.clone()) {
                    attributes[0].lyric = Some(lyric);
                }

                PackedEntry {
                    values: members.iter().map(|e| e.value).collect(),
                    time_ms: members[0].time_ms,
                    attributes,
                }
            })
            .collect()
    }

    /// Index of the first member of the chord nearest to `time_ms`
    ///
    /// Exact hits resolve to the start of their chord; misses pick the closer
    /// neighbour of the insertion point (the earlier one on ties). Times past
    /// either end clamp to the first or last chord. `None` only for an empty
    /// timeline.
    pub fn find_chord_start_at_time(&self, time_ms: f64) -> Option<usize> {
        let times: Vec<f64> = self.entries.iter().map(|e| e.time_ms).collect();
        nearest_chord_start(&times, time_ms)
    }
}

/// Nearest-chord lookup over a sorted list of onsets
pub fn nearest_chord_start(times: &[f64], time_ms: f64) -> Option<usize> {
    if times.is_empty() {
        return None;
    }

    let insertion = times.partition_point(|&t| t < time_ms);

    let nearest = if insertion < times.len() && times[insertion] == time_ms {
        insertion
    } else if insertion >= times.len() {
        times.len() - 1
    } else if insertion == 0 {
        return Some(0);
    } else if (times[insertion - 1] - time_ms).abs() <= (times[insertion] - time_ms).abs() {
        insertion - 1
    } else {
        insertion
    };

    Some(walk_back_to_chord_start(times, nearest))
}

fn walk_back_to_chord_start(times: &[f64], mut index: usize) -> usize {
    while index > 0 && (times[index] - times[index - 1]).abs() <= CHORD_EPSILON_MS {
        index -= 1;
    }
    index
}

/// Lazy, finite iterator over chord ranges of a timeline
pub struct ChordIter<'a> {
    timeline: &'a Timeline,
    index: usize,
}

impl Iterator for ChordIter<'_> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.timeline.len() {
            return None;
        }

        let start = self.index;
        self.index = self.timeline.next_chord_start(start);
        Some(start..self.index)
    }
}

impl Deref for Timeline {
    type Target = [Entry];

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl DerefMut for Timeline {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entries
    }
}

impl From<Vec<Entry>> for Timeline {
    fn from(entries: Vec<Entry>) -> Self {
        Timeline {
            entries,
            ..Default::default()
        }
    }
}

impl From<Timeline> for Vec<Entry> {
    fn from(timeline: Timeline) -> Self {
        timeline.entries
    }
}

impl FromIterator<Entry> for Timeline {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        Timeline::from(iter.into_iter().collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(notes: &[(i32, f64)]) -> Timeline {
        notes.iter().map(|&(v, t)| Entry::new(v, t)).collect()
    }

    fn reference_chords() -> Timeline {
        timeline(&[
            (60, 0.0),
            (62, 0.0),
            (64, 0.0),
            (65, 500.0),
            (67, 500.0),
            (69, 1000.0),
            (71, 1500.0),
            (72, 1500.0),
            (74, 2000.0),
        ])
    }

    fn times(t: &Timeline) -> Vec<f64> {
        t.iter().map(|e| e.time_ms).collect()
    }

    #[test]
    fn test_relative_absolute_round_trip() {
        let mut t = timeline(&[(60, 0.0), (62, 120.5), (64, 120.5), (65, 980.25), (67, 4000.0)]);
        let before = times(&t);

        t.to_relative_time();
        assert_eq!(t.time_base(), TimeBase::Relative);
        assert_eq!(times(&t), vec![0.0, 120.5, 0.0, 859.75, 3019.75]);

        t.to_absolute_time();
        assert_eq!(t.time_base(), TimeBase::Absolute);
        for (a, b) in times(&t).iter().zip(before.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_repeated_conversion_is_noop() {
        let mut t = timeline(&[(60, 100.0), (62, 300.0)]);
        t.to_absolute_time();
        assert_eq!(times(&t), vec![100.0, 300.0]);

        t.to_relative_time();
        t.to_relative_time();
        assert_eq!(times(&t), vec![100.0, 200.0]);
    }

    #[test]
    fn test_apply_changes_commits_and_sorts() {
        let mut t = timeline(&[(60, 0.0), (62, 100.0), (64, 200.0), (65, 300.0)]);
        t.soft_delete(1);
        t.soft_change_time(0, 250.0);

        // Nothing moves before the commit
        assert_eq!(t.len(), 4);
        assert!(t.is_deleted(1));
        assert_eq!(t.pending_time(0), Some(250.0));
        assert_eq!(t[0].time_ms, 0.0);

        t.apply_changes();
        assert!(!t.has_pending_changes());
        let values: Vec<i32> = t.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![64, 60, 65]);
        assert_eq!(times(&t), vec![200.0, 250.0, 300.0]);
    }

    #[test]
    fn test_apply_changes_is_idempotent() {
        let mut t = timeline(&[(60, 0.0), (62, 50.0), (64, 50.0), (65, 10.0)]);
        t.soft_delete(0);
        t.soft_change_time(2, 5.0);
        t.apply_changes();
        let once = t.clone();

        t.apply_changes();
        assert_eq!(t, once);
    }

    #[test]
    fn test_delete_wins_over_retime() {
        let mut t = timeline(&[(60, 0.0), (62, 100.0)]);
        t.soft_change_time(0, 500.0);
        t.soft_delete(0);
        t.apply_changes();

        assert_eq!(t.len(), 1);
        assert_eq!(t[0].value, 62);
    }

    #[test]
    fn test_soft_mutation_out_of_range_is_ignored() {
        let mut t = timeline(&[(60, 0.0)]);
        t.soft_delete(5);
        t.soft_change_time(9, 1.0);
        assert!(!t.has_pending_changes());
    }

    #[test]
    fn test_next_chord_start() {
        let t = reference_chords();
        assert_eq!(t.next_chord_start(0), 3);
        assert_eq!(t.next_chord_start(3), 5);
        assert_eq!(t.next_chord_start(5), 6);
        assert_eq!(t.next_chord_start(8), 9);
        assert_eq!(t.next_chord_start(9), 9);
    }

    #[test]
    fn test_chord_window_is_one_millisecond() {
        let t = timeline(&[(60, 0.0), (62, 0.6), (64, 1.0), (65, 1.5)]);
        assert_eq!(t.next_chord_start(0), 3);
    }

    #[test]
    fn test_chord_iterator() {
        let t = reference_chords();
        let chords: Vec<Range<usize>> = t.chords().collect();
        assert_eq!(chords, vec![0..3, 3..5, 5..6, 6..8, 8..9]);

        assert_eq!(Timeline::new().chords().count(), 0);
    }

    #[test]
    fn test_pack_carries_lyric_to_first_slot() {
        let mut t = timeline(&[(60, 0.0), (64, 0.0), (67, 400.0)]);
        t[1].attributes.lyric = Some("hey".to_string());

        let packed = t.pack();
        assert_eq!(packed.len(), 2);
        assert_eq!(packed[0].values, vec![60, 64]);
        assert_eq!(packed[0].time_ms, 0.0);
        assert_eq!(packed[0].attributes[0].lyric.as_deref(), Some("hey"));
        assert_eq!(packed[1].values, vec![67]);
        assert!(packed[1].attributes[0].lyric.is_none());
    }

    #[test]
    fn test_find_chord_start_exact() {
        let t = reference_chords();
        assert_eq!(t.find_chord_start_at_time(0.0), Some(0));
        assert_eq!(t.find_chord_start_at_time(500.0), Some(3));
        assert_eq!(t.find_chord_start_at_time(1000.0), Some(5));
    }

    #[test]
    fn test_find_chord_start_nearest() {
        let t = reference_chords();
        assert_eq!(t.find_chord_start_at_time(200.0), Some(0));
        assert_eq!(t.find_chord_start_at_time(300.0), Some(3));
        assert_eq!(t.find_chord_start_at_time(1501.0), Some(6));
        assert_eq!(t.find_chord_start_at_time(250.0), Some(0));
    }

    #[test]
    fn test_find_chord_start_clamps() {
        let t = reference_chords();
        assert_eq!(t.find_chord_start_at_time(-100.0), Some(0));
        assert_eq!(t.find_chord_start_at_time(3000.0), Some(8));

        let single = timeline(&[(60, 1000.0)]);
        assert_eq!(single.find_chord_start_at_time(500.0), Some(0));
        assert_eq!(Timeline::new().find_chord_start_at_time(0.0), None);
    }

    #[test]
    fn test_find_chord_start_clamps_to_last_chord_start() {
        let t = timeline(&[(60, 0.0), (62, 100.0), (64, 100.0)]);
        assert_eq!(t.find_chord_start_at_time(900.0), Some(1));
    }

    #[test]
    fn test_timeline_json_is_plain_array() {
        let t: Timeline = serde_json::from_str(r#"[[48, 0, {}], [50, 100, {"lyric": "a"}]]"#).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t[1].attributes.lyric.as_deref(), Some("a"));

        let json = serde_json::to_string(&t).unwrap();
        assert!(json.starts_with("[[48,"));
    }
}
