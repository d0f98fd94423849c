// Notes module - canonical note/key timeline and parsed track input
// Entries, staged mutation, chord queries

pub mod timeline;
pub mod tracks;
pub mod types;

pub use timeline::{nearest_chord_start, ChordIter, TimeBase, Timeline};
pub use tracks::{DurationType, Metadata, Track, TrackSet, PERCUSSION_CHANNEL};
pub use types::{Entry, NoteAttributes, PackedEntry, CHORD_EPSILON_MS, NO_KEY};
