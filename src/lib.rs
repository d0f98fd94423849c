// Keyplay - turn parsed music into timed taps on an on-screen instrument keyboard
// Module declarations and the public surface

pub mod layout;
pub mod notes;
pub mod passes;
pub mod pipeline;
pub mod random;

pub use layout::{generate_layout, KeyMapper, KeyProfile, LayoutDescription, LayoutError, Point, ProfileError};
pub use notes::{Entry, NoteAttributes, Timeline, TrackSet};
pub use passes::{GestureGroup, GestureList, Pass, PassError, PipelineData, Progress, SequentialPass, Statistics};
pub use pipeline::{build_pipeline, run_pipeline, PipelineOutput, PipelineSettings};
