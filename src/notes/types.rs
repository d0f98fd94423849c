// Note timeline types
// Timeline entries, their typed attributes, and packed chord groups

use serde::{Deserialize, Serialize};

/// Domain value meaning "no playable key" (dummy slot)
pub const NO_KEY: i32 = -1;

/// Entries whose onsets lie within this window of a chord's first onset are simultaneous
pub const CHORD_EPSILON_MS: f64 = 1.0;

/// Open-ended per-entry attributes with a fixed set of documented keys
///
/// Staging markers (pending delete / pending retime) are not attributes;
/// they live in the owning [`Timeline`](super::Timeline) until commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoteAttributes {
    /// Sounding length in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Source velocity, as delivered by the parser
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,

    /// Lyric text bound to this entry (newline-joined when several lines land here)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyric: Option<String>,

    /// Onset time captured before any timing pass ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_time: Option<f64>,
}

impl NoteAttributes {
    /// Attributes carrying only a duration
    pub fn with_duration(duration: f64) -> Self {
        NoteAttributes {
            duration: Some(duration),
            ..Default::default()
        }
    }

    /// Attributes that must survive when the entry holding them is deleted or replaced
    ///
    /// Returns `None` when nothing transferable is present. Currently only the lyric.
    pub fn transferable(&self) -> Option<NoteAttributes> {
        self.lyric.as_ref().map(|lyric| NoteAttributes {
            lyric: Some(lyric.clone()),
            ..Default::default()
        })
    }

    /// Append a lyric line, joining with a newline if one is already present
    pub fn append_lyric(&mut self, text: &str) {
        match self.lyric.as_mut() {
            Some(existing) if !existing.is_empty() => {
                existing.push('\n');
                existing.push_str(text);
            }
            _ => self.lyric = Some(text.to_string()),
        }
    }
}

/// One timeline entry: a pitch or key index, an onset, and attributes
///
/// Serialized as the 3-element array `[value, timeMs, attributes]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEntry", into = "RawEntry")]
pub struct Entry {
    /// MIDI pitch or resolved key index, depending on pipeline stage; [`NO_KEY`] for dummy slots
    pub value: i32,

    /// Absolute or relative milliseconds, depending on the timeline's time base
    pub time_ms: f64,

    pub attributes: NoteAttributes,
}

impl Entry {
    /// Create an entry with empty attributes
    pub fn new(value: i32, time_ms: f64) -> Self {
        Entry {
            value,
            time_ms,
            attributes: NoteAttributes::default(),
        }
    }

    /// Create an entry with attributes
    pub fn with_attributes(value: i32, time_ms: f64, attributes: NoteAttributes) -> Self {
        Entry {
            value,
            time_ms,
            attributes,
        }
    }

    /// Whether this entry is a playable pitch/key (not the dummy sentinel)
    pub fn is_playable(&self) -> bool {
        self.value != NO_KEY
    }
}

#[derive(Serialize, Deserialize)]
struct RawEntry(i32, f64, NoteAttributes);

impl From<RawEntry> for Entry {
    fn from(raw: RawEntry) -> Self {
        Entry::with_attributes(raw.0, raw.1, raw.2)
    }
}

impl From<Entry> for RawEntry {
    fn from(entry: Entry) -> Self {
        RawEntry(entry.value, entry.time_ms, entry.attributes)
    }
}

/// A resolved simultaneous group ("chord")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedEntry {
    /// Member values in timeline order
    pub values: Vec<i32>,

    /// Onset of the chord's first member
    pub time_ms: f64,

    /// Member attributes; a lyric from any member is carried onto slot 0
    pub attributes: Vec<NoteAttributes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_json_is_triple() {
        let entry = Entry::with_attributes(60, 250.0, NoteAttributes::with_duration(500.0));
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"[60,250.0,{"duration":500.0}]"#);

        let parsed: Entry = serde_json::from_str(r#"[48, 0, {"duration": 500, "originalTime": 3}]"#).unwrap();
        assert_eq!(parsed.value, 48);
        assert_eq!(parsed.time_ms, 0.0);
        assert_eq!(parsed.attributes.duration, Some(500.0));
        assert_eq!(parsed.attributes.original_time, Some(3.0));
    }

    #[test]
    fn test_transferable_attributes() {
        let mut attrs = NoteAttributes::with_duration(100.0);
        assert!(attrs.transferable().is_none());

        attrs.lyric = Some("la".to_string());
        let moved = attrs.transferable().unwrap();
        assert_eq!(moved.lyric.as_deref(), Some("la"));
        assert!(moved.duration.is_none());
    }

    #[test]
    fn test_append_lyric() {
        let mut attrs = NoteAttributes::default();
        attrs.append_lyric("first");
        attrs.append_lyric("second");
        assert_eq!(attrs.lyric.as_deref(), Some("first\nsecond"));

        let mut blank = NoteAttributes {
            lyric: Some(String::new()),
            ..Default::default()
        };
        blank.append_lyric("only");
        assert_eq!(blank.lyric.as_deref(), Some("only"));
    }

    #[test]
    fn test_sentinel_not_playable() {
        assert!(!Entry::new(NO_KEY, 0.0).is_playable());
        assert!(Entry::new(0, 0.0).is_playable());
    }
}
