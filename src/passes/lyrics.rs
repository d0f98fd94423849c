// Lyric binding - attach timed lyric lines to the nearest chord

use serde::{Deserialize, Serialize};

use super::pass::{Pass, PassError, PipelineData, Progress, Statistics};
use crate::notes::nearest_chord_start;

/// One timed lyric line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    #[serde(rename = "time")]
    pub time_ms: f64,
    pub text: String,
}

impl LyricLine {
    pub fn new(time_ms: f64, text: &str) -> Self {
        LyricLine {
            time_ms,
            text: text.to_string(),
        }
    }
}

/// Settings for lyric binding
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BindLyricsConfig {
    /// Required
    pub lyrics: Option<Vec<LyricLine>>,

    /// Match against `originalTime` (see `StoreCurrentNoteTimePass`) instead of the current onset
    pub use_stored_original_time: bool,
}

/// Appends each lyric line to the first member of the chord nearest its time
pub struct BindLyricsPass {
    lyrics: Vec<LyricLine>,
    use_stored_original_time: bool,
    total_error_ms: f64,
}

impl BindLyricsPass {
    pub fn new(config: BindLyricsConfig) -> Result<Self, PassError> {
        let lyrics = config
            .lyrics
            .ok_or_else(|| PassError::configuration("BindLyricsPass", "lyrics are required"))?;
        Ok(BindLyricsPass {
            lyrics,
            use_stored_original_time: config.use_stored_original_time,
            total_error_ms: 0.0,
        })
    }
}

impl Pass for BindLyricsPass {
    fn name(&self) -> &'static str {
        "BindLyricsPass"
    }

    fn description(&self) -> &'static str {
        "Bind lyrics to notes"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        self.total_error_ms = 0.0;

        if self.lyrics.is_empty() {
            return Ok(notes.into());
        }
        if notes.is_empty() {
            return Err(PassError::processing(self.name(), "no notes to bind lyrics to"));
        }

        let times: Vec<f64> = notes
            .iter()
            .map(|e| {
                if self.use_stored_original_time {
                    e.attributes.original_time.unwrap_or(e.time_ms)
                } else {
                    e.time_ms
                }
            })
            .collect();

        for line in &self.lyrics {
            let Some(index) = nearest_chord_start(&times, line.time_ms) else {
                continue;
            };
            notes[index].attributes.append_lyric(&line.text);
            self.total_error_ms += (times[index] - line.time_ms).abs();
        }

        Ok(notes.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([("total_error_ms".to_string(), self.total_error_ms)])
    }
}
