// Timing passes - gap capping, intro skipping, tempo scaling, onset snapshots, humanization

use serde::{Deserialize, Serialize};

use super::pass::{Pass, PassError, PipelineData, Progress, Statistics};
use crate::random::{Prng, DEFAULT_SEED};

/// Settings for gap capping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitBlankDurationConfig {
    pub max_blank_duration_ms: f64,
}

impl Default for LimitBlankDurationConfig {
    fn default() -> Self {
        LimitBlankDurationConfig {
            max_blank_duration_ms: 5000.0,
        }
    }
}

/// Shortens every silence longer than the cap to exactly the cap
pub struct LimitBlankDurationPass {
    max_blank_duration_ms: f64,
    capped: usize,
}

impl LimitBlankDurationPass {
    pub fn new(config: LimitBlankDurationConfig) -> Result<Self, PassError> {
        if config.max_blank_duration_ms < 0.0 {
            return Err(PassError::configuration(
                "LimitBlankDurationPass",
                "maximum blank duration must not be negative",
            ));
        }
        Ok(LimitBlankDurationPass {
            max_blank_duration_ms: config.max_blank_duration_ms,
            capped: 0,
        })
    }
}

impl Pass for LimitBlankDurationPass {
    fn name(&self) -> &'static str {
        "LimitBlankDurationPass"
    }

    fn description(&self) -> &'static str {
        "Limit long blank durations"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        self.capped = 0;

        notes.to_relative_time();
        for entry in notes.iter_mut() {
            if entry.time_ms > self.max_blank_duration_ms {
                entry.time_ms = self.max_blank_duration_ms;
                self.capped += 1;
            }
        }
        notes.to_absolute_time();

        Ok(notes.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([("capped".to_string(), self.capped as f64)])
    }
}

/// Settings for intro skipping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkipIntroConfig {
    /// Longest silence kept before the first note
    pub max_intro_time_ms: f64,
}

impl Default for SkipIntroConfig {
    fn default() -> Self {
        SkipIntroConfig {
            max_intro_time_ms: 2000.0,
        }
    }
}

/// Shifts the whole timeline left so the first note starts no later than the cap
pub struct SkipIntroPass {
    max_intro_time_ms: f64,
    skipped_ms: f64,
}

impl SkipIntroPass {
    pub fn new(config: SkipIntroConfig) -> Self {
        SkipIntroPass {
            max_intro_time_ms: config.max_intro_time_ms,
            skipped_ms: 0.0,
        }
    }
}

impl Pass for SkipIntroPass {
    fn name(&self) -> &'static str {
        "SkipIntroPass"
    }

    fn description(&self) -> &'static str {
        "Skip the intro silence"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        self.skipped_ms = 0.0;

        let first_time = match notes.first() {
            Some(first) if first.time_ms >= self.max_intro_time_ms => first.time_ms,
            _ => return Ok(notes.into()),
        };

        let shift = first_time - self.max_intro_time_ms;
        for entry in notes.iter_mut() {
            entry.time_ms -= shift;
        }
        self.skipped_ms = shift;

        Ok(notes.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([("skipped_ms".to_string(), self.skipped_ms)])
    }
}

/// Settings for tempo scaling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeedChangeConfig {
    /// Playback speed multiplier; required, must be positive
    pub speed: Option<f64>,
}

/// Divides every onset and duration by the speed
pub struct SpeedChangePass {
    speed: f64,
}

impl SpeedChangePass {
    pub fn new(config: SpeedChangeConfig) -> Result<Self, PassError> {
        let name = "SpeedChangePass";
        let speed = config
            .speed
            .ok_or_else(|| PassError::configuration(name, "speed is required"))?;
        if speed <= 0.0 || !speed.is_finite() {
            return Err(PassError::configuration(name, format!("speed must be positive, got {}", speed)));
        }
        Ok(SpeedChangePass { speed })
    }
}

impl Pass for SpeedChangePass {
    fn name(&self) -> &'static str {
        "SpeedChangePass"
    }

    fn description(&self) -> &'static str {
        "Change playback speed"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        for entry in notes.iter_mut() {
            entry.time_ms /= self.speed;
            if let Some(duration) = entry.attributes.duration.as_mut() {
                *duration /= self.speed;
            }
        }
        Ok(notes.into())
    }
}

/// Records each onset in the `originalTime` attribute
#[derive(Debug, Default)]
pub struct StoreCurrentNoteTimePass;

impl Pass for StoreCurrentNoteTimePass {
    fn name(&self) -> &'static str {
        "StoreCurrentNoteTimePass"
    }

    fn description(&self) -> &'static str {
        "Store note times"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        for entry in notes.iter_mut() {
            entry.attributes.original_time = Some(entry.time_ms);
        }
        Ok(notes.into())
    }
}

/// Settings for onset jitter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HumanifyConfig {
    /// Standard deviation of the onset jitter (required)
    pub note_abs_time_std_dev: Option<f64>,
    pub random_seed: u32,
}

impl Default for HumanifyConfig {
    fn default() -> Self {
        HumanifyConfig {
            note_abs_time_std_dev: None,
            random_seed: DEFAULT_SEED,
        }
    }
}

/// Adds zero-mean Gaussian jitter to every onset, clamped at zero, then re-sorts
pub struct HumanifyPass {
    std_dev: f64,
    seed: u32,
    clamped: usize,
}

impl HumanifyPass {
    pub fn new(config: HumanifyConfig) -> Result<Self, PassError> {
        let name = "HumanifyPass";
        let std_dev = config
            .note_abs_time_std_dev
            .ok_or_else(|| PassError::configuration(name, "onset standard deviation is required"))?;
        if std_dev < 0.0 {
            return Err(PassError::configuration(name, "standard deviation must not be negative"));
        }
        Ok(HumanifyPass {
            std_dev,
            seed: config.random_seed,
            clamped: 0,
        })
    }
}

impl Pass for HumanifyPass {
    fn name(&self) -> &'static str {
        "HumanifyPass"
    }

    fn description(&self) -> &'static str {
        "Humanize note timing"
    }

    fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        let mut notes = input.into_notes(self.name())?;
        let mut rng = Prng::new(self.seed);
        self.clamped = 0;

        for entry in notes.iter_mut() {
            entry.time_ms += rng.next_gaussian() * self.std_dev;
            if entry.time_ms < 0.0 {
                entry.time_ms = 0.0;
                self.clamped += 1;
            }
        }
        notes.sort_by_time();

        Ok(notes.into())
    }

    fn statistics(&self) -> Statistics {
        Statistics::from([("clamped".to_string(), self.clamped as f64)])
    }
}
