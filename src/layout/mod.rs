// Layout module - keyboard layout generation and key profiles
// Pitch naming, geometry, generator, presets, and the cached profile wrapper

pub mod generator;
pub mod geometry;
pub mod pitch;
pub mod presets;
pub mod profile;

pub use generator::{generate_layout, LayoutDescription, LayoutError, PitchSpan};
pub use geometry::{Bounds, Matrix3, Point, CENTER_FLIP_Y, IDENTITY};
pub use pitch::{is_semitone, midi_pitch_to_name, name_to_midi_pitch, transposition_key_name};
pub use profile::{Calibration, KeyMapper, KeyProfile, ProfileError, Variant};
