// Track passes - clean up parsed track sets and flatten them into one timeline

use serde::{Deserialize, Serialize};

use super::pass::{Pass, PassError, PipelineData, Progress, Statistics};
use crate::notes::{Timeline, TrackSet};

/// Settings for merging tracks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeTracksConfig {
    /// Track indices to merge; empty = all tracks
    pub selected_tracks: Vec<usize>,

    /// Leave out tracks on the percussion channel
    pub skip_percussion: bool,
}

impl Default for MergeTracksConfig {
    fn default() -> Self {
        MergeTracksConfig {
            selected_tracks: Vec::new(),
            skip_percussion: true,
        }
    }
}

/// Concatenates the notes of the selected tracks and sorts them by time
pub struct MergeTracksPass {
    config: MergeTracksConfig,
    merged_tracks: usize,
}

impl MergeTracksPass {
    pub fn new(config: MergeTracksConfig) -> Self {
        MergeTracksPass {
            config,
            merged_tracks: 0,
        }
    }
}

impl Pass for MergeTracksPass {
    fn name(&self) -> &'static str {
        "MergeTracksPass"
    }

    fn description(&self) -> &'static str {
        "Merge tracks"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut set = input.into_tracks(self.name())?;

        if !set.multi_track {
            if set.tracks.is_empty() {
                return Err(PassError::processing(self.name(), "track set has no tracks"));
            }
            self.merged_tracks = 1;
            return Ok(set.tracks.swap_remove(0).notes.into());
        }

        let selected: Vec<usize> = if self.config.selected_tracks.is_empty() {
            (0..set.tracks.len()).collect()
        } else {
            self.config.selected_tracks.clone()
        };

        let mut merged = Timeline::new();
        self.merged_tracks = 0;
        for index in selected {
            let Some(track) = set.tracks.get_mut(index) else {
                log::debug!("Skipping missing track {}", index);
                continue;
            };
            if self.config.skip_percussion && track.is_percussion() {
                continue;
            }
            for entry in std::mem::take(&mut track.notes).into_entries() {
                merged.push(entry);
            }
            self.merged_tracks += 1;
        }

        merged.sort_by_time();
        Ok(merged.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([("merged_tracks".to_string(), self.merged_tracks as f64)])
    }
}

/// Drops tracks without notes; a single survivor switches the set to single-track mode
#[derive(Debug, Default)]
pub struct RemoveEmptyTracksPass {
    removed: usize,
}

impl RemoveEmptyTracksPass {
    pub fn new() -> Self {
        RemoveEmptyTracksPass::default()
    }
}

impl Pass for RemoveEmptyTracksPass {
    fn name(&self) -> &'static str {
        "RemoveEmptyTracksPass"
    }

    fn description(&self) -> &'static str {
        "Remove empty tracks"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut set: TrackSet = input.into_tracks(self.name())?;
        self.removed = 0;

        if !set.multi_track {
            return Ok(set.into());
        }

        let before = set.tracks.len();
        set.tracks.retain(|t| !t.notes.is_empty());
        self.removed = before - set.tracks.len();

        set.track_count = set.tracks.len();
        if set.track_count == 1 {
            set.multi_track = false;
        }

        Ok(set.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([("removed_tracks".to_string(), self.removed as f64)])
    }
}
