// Key profile - a named layout plus variant, calibration, and cached pitch <-> key tables
// Passes consult profiles through the KeyMapper trait

use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt::Debug;
use thiserror::Error;

use super::generator::{generate_layout, LayoutDescription, LayoutError};
use super::geometry::Point;
use crate::notes::DurationType;

/// Errors raised when building or loading a profile
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Layout error: {0}")]
    LayoutError(#[from] LayoutError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Substitution {from} -> {to} lands on a pitch that already has a key")]
    SubstitutionCollision { from: i32, to: i32 },
}

/// What the pipeline needs to know about the target keyboard
pub trait KeyMapper: Debug {
    /// Lowest and highest playable pitch; `None` when no key is playable
    fn note_range(&self) -> Option<(i32, i32)>;

    /// Key index for a pitch, if a key plays it
    fn key_by_pitch(&self, pitch: i32) -> Option<i32>;

    /// Position of a key, absolute when calibrated
    fn key_position(&self, key: i32) -> Option<Point>;

    /// Shortest allowed time between two presses of the same key (ms, 0 = no limit)
    fn same_key_min_interval(&self) -> f64;

    /// Whether a pitch can be played as-is
    fn is_playable(&self, pitch: i32) -> bool {
        self.key_by_pitch(pitch).is_some()
    }
}

/// Device coordinates of the layout's top-left and bottom-right keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    pub top_left: Point,
    pub bottom_right: Point,
}

impl Calibration {
    pub fn new(top_left: Point, bottom_right: Point) -> Self {
        Calibration {
            top_left,
            bottom_right,
        }
    }

    /// Both anchors at the origin means calibration never ran
    pub fn is_set(&self) -> bool {
        self.top_left != Point::default() || self.bottom_right != Point::default()
    }

    /// Map a normalized position into device space
    pub fn to_absolute(&self, p: &Point) -> Point {
        Point {
            x: self.top_left.x + (self.bottom_right.x - self.top_left.x) * p.x,
            y: self.top_left.y + (self.bottom_right.y - self.top_left.y) * p.y,
        }
    }
}

/// Instrument variant on top of a layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Variant {
    pub name: String,

    /// Inclusive pitch window the variant can play; `None` keeps the whole layout
    pub available_note_range: Option<(i32, i32)>,

    /// Pitch substitutions, applied before the range restriction
    ///
    /// Sources are looked up in the generated layout only, so substitutions
    /// never chain. A target must not already have a key.
    pub replace_note_map: BTreeMap<i32, i32>,

    /// How the instrument realizes note length
    pub duration_mode: DurationType,

    /// Overrides the profile's same-key interval when present
    pub same_key_min_interval: Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct ResolvedKeys {
    /// Key index -> pitch, ascending
    pitches: Vec<i32>,
    pitch_to_key: BTreeMap<i32, i32>,
    normalized: Vec<Point>,
    positions: Vec<Point>,
}

/// A keyboard the pipeline can target
///
/// Lookups resolve lazily and are cached. Changing the layout, variant, or
/// calibration does NOT refresh the cache; call [`KeyProfile::clear_cache`]
/// afterwards. Key indices are recomputed on every resolve and are not stable
/// across such changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyProfile {
    pub name: String,

    layout: LayoutDescription,

    #[serde(default)]
    variant: Option<Variant>,

    /// Profile-wide same-key interval in ms; 0 = no limit
    #[serde(default)]
    same_key_min_interval: f64,

    #[serde(default)]
    calibration: Option<Calibration>,

    #[serde(skip)]
    cache: OnceCell<ResolvedKeys>,
}

impl KeyProfile {
    /// Create a profile, rejecting layouts that cannot be generated
    pub fn new(name: &str, layout: LayoutDescription) -> Result<Self, ProfileError> {
        generate_layout(&layout)?;

        Ok(KeyProfile {
            name: name.to_string(),
            layout,
            variant: None,
            same_key_min_interval: 0.0,
            calibration: None,
            cache: OnceCell::new(),
        })
    }

    pub fn with_variant(mut self, variant: Variant) -> Result<Self, ProfileError> {
        key_table(&self.layout, Some(&variant))?;
        self.variant = Some(variant);
        Ok(self)
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn with_same_key_min_interval(mut self, interval_ms: f64) -> Self {
        self.same_key_min_interval = interval_ms;
        self
    }

    /// Check the layout generates and the variant applies cleanly to it
    pub fn validate(&self) -> Result<(), ProfileError> {
        key_table(&self.layout, self.variant.as_ref()).map(|_| ())
    }

    pub fn layout(&self) -> &LayoutDescription {
        &self.layout
    }

    pub fn variant(&self) -> Option<&Variant> {
        self.variant.as_ref()
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Replace the layout; takes effect after [`KeyProfile::clear_cache`]
    pub fn set_layout(&mut self, layout: LayoutDescription) -> Result<(), ProfileError> {
        key_table(&layout, self.variant.as_ref())?;
        self.layout = layout;
        Ok(())
    }

    /// Replace the variant; takes effect after [`KeyProfile::clear_cache`]
    pub fn set_variant(&mut self, variant: Option<Variant>) -> Result<(), ProfileError> {
        key_table(&self.layout, variant.as_ref())?;
        self.variant = variant;
        Ok(())
    }

    /// Replace the calibration; takes effect after [`KeyProfile::clear_cache`]
    pub fn set_calibration(&mut self, calibration: Option<Calibration>) {
        self.calibration = calibration;
    }

    /// Drop cached lookups so the next query re-resolves
    pub fn clear_cache(&mut self) {
        self.cache = OnceCell::new();
    }

    fn resolved(&self) -> &ResolvedKeys {
        self.cache.get_or_init(|| self.resolve())
    }

    fn resolve(&self) -> ResolvedKeys {
        // Only reachable through serde's Deserialize, which skips validation
        let table = match key_table(&self.layout, self.variant.as_ref()) {
            Ok(table) => table,
            Err(e) => {
                log::error!("Profile {} cannot be resolved: {}", self.name, e);
                BTreeMap::new()
            }
        };

        let calibration = self.calibration.filter(Calibration::is_set);

        // BTreeMap iterates ascending by pitch, which is the key index order
        let mut resolved = ResolvedKeys::default();
        for (index, (pitch, pos)) in table.into_iter().enumerate() {
            resolved.pitches.push(pitch);
            resolved.pitch_to_key.insert(pitch, index as i32);
            resolved.normalized.push(pos);
            resolved.positions.push(match calibration {
                Some(c) => c.to_absolute(&pos),
                None => pos,
            });
        }

        log::debug!(
            "Resolved profile {}: {} keys, calibrated: {}",
            self.name,
            resolved.pitches.len(),
            calibration.is_some()
        );
        resolved
    }

    pub fn key_count(&self) -> usize {
        self.resolved().pitches.len()
    }

    pub fn pitch_by_key(&self, key: i32) -> Option<i32> {
        usize::try_from(key).ok().and_then(|k| self.resolved().pitches.get(k).copied())
    }

    /// First and last key index
    pub fn key_range(&self) -> Option<(i32, i32)> {
        match self.key_count() {
            0 => None,
            n => Some((0, n as i32 - 1)),
        }
    }

    /// Key positions in key index order (absolute when calibrated)
    pub fn all_key_positions(&self) -> &[Point] {
        &self.resolved().positions
    }

    /// Key positions in key index order, always in [0, 1]
    pub fn normalized_key_positions(&self) -> &[Point] {
        &self.resolved().normalized
    }

    /// Every other key with its distance from `key`, nearest first
    pub fn physical_closest_keys(&self, key: i32) -> Vec<(i32, f64)> {
        let positions = self.all_key_positions();
        let Some(origin) = usize::try_from(key).ok().and_then(|k| positions.get(k)) else {
            return Vec::new();
        };

        let mut closest: Vec<(i32, f64)> = positions
            .iter()
            .enumerate()
            .filter(|&(i, _)| i as i32 != key)
            .map(|(i, pos)| (i as i32, origin.distance(pos)))
            .collect();

        closest.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        closest
    }

    /// Smallest distance between any two keys; `None` with fewer than two keys
    pub fn physical_min_key_distance(&self) -> Option<f64> {
        let positions = self.all_key_positions();
        let mut min: Option<f64> = None;

        for (i, a) in positions.iter().enumerate() {
            for b in &positions[i + 1..] {
                let d = a.distance(b);
                min = Some(min.map_or(d, |m| m.min(d)));
            }
        }
        min
    }

    /// How the current variant realizes note length
    pub fn duration_mode(&self) -> DurationType {
        self.variant.as_ref().map(|v| v.duration_mode).unwrap_or_default()
    }

    /// Serialize profile to JSON bytes
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Deserialize profile from JSON bytes, rejecting layouts that cannot be resolved
    pub fn from_json_bytes(data: &[u8]) -> Result<Self, ProfileError> {
        let profile: KeyProfile = serde_json::from_slice(data)?;
        profile.validate()?;
        Ok(profile)
    }
}

/// Generate the layout, then apply the variant's substitutions and range
fn key_table(layout: &LayoutDescription, variant: Option<&Variant>) -> Result<BTreeMap<i32, Point>, ProfileError> {
    let mut table = generate_layout(layout)?;
    let Some(variant) = variant else {
        return Ok(table);
    };

    let moves: Vec<(i32, i32, Point)> = variant
        .replace_note_map
        .iter()
        .filter_map(|(&from, &to)| table.get(&from).map(|&pos| (from, to, pos)))
        .collect();
    for (from, _, _) in &moves {
        table.remove(from);
    }
    for (from, to, pos) in moves {
        if table.insert(to, pos).is_some() {
            return Err(ProfileError::SubstitutionCollision { from, to });
        }
    }

    if let Some((low, high)) = variant.available_note_range {
        table.retain(|&pitch, _| pitch >= low && pitch <= high);
    }
    Ok(table)
}

impl KeyMapper for KeyProfile {
    fn note_range(&self) -> Option<(i32, i32)> {
        let pitches = &self.resolved().pitches;
        Some((*pitches.first()?, *pitches.last()?))
    }

    fn key_by_pitch(&self, pitch: i32) -> Option<i32> {
        self.resolved().pitch_to_key.get(&pitch).copied()
    }

    fn key_position(&self, key: i32) -> Option<Point> {
        usize::try_from(key)
            .ok()
            .and_then(|k| self.resolved().positions.get(k).copied())
    }

    fn same_key_min_interval(&self) -> f64 {
        self.variant
            .as_ref()
            .and_then(|v| v.same_key_min_interval)
            .unwrap_or(self.same_key_min_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::presets::{generic_3x7, generic_piano36};

    fn profile_3x7() -> KeyProfile {
        KeyProfile::new("generic", generic_3x7()).unwrap()
    }

    #[test]
    fn test_key_indices_follow_pitch_order() {
        let profile = profile_3x7();

        assert_eq!(profile.key_count(), 21);
        assert_eq!(profile.key_by_pitch(48), Some(0));
        assert_eq!(profile.key_by_pitch(50), Some(1));
        assert_eq!(profile.key_by_pitch(83), Some(20));
        assert_eq!(profile.key_by_pitch(49), None);
        assert_eq!(profile.pitch_by_key(1), Some(50));
        assert_eq!(profile.pitch_by_key(21), None);
        assert_eq!(profile.pitch_by_key(-1), None);
        assert_eq!(profile.key_range(), Some((0, 20)));
        assert_eq!(profile.note_range(), Some((48, 83)));
    }

    #[test]
    fn test_variant_substitution_then_range() {
        let variant = Variant {
            name: "narrow".to_string(),
            available_note_range: Some((54, 72)),
            replace_note_map: BTreeMap::from([(53, 54), (48, 70)]),
            ..Default::default()
        };
        let profile = profile_3x7().with_variant(variant).unwrap();

        // 48 was renamed into the window, 53 renamed to 54 (a black key)
        assert_eq!(profile.note_range(), Some((54, 72)));
        assert!(profile.is_playable(54));
        assert!(profile.is_playable(70));
        assert!(!profile.is_playable(53));
        assert!(!profile.is_playable(74));
        assert_eq!(profile.key_by_pitch(54), Some(0));

        // Renamed key keeps its layout position
        let base = profile_3x7();
        assert_eq!(
            profile.normalized_key_positions()[profile.key_by_pitch(70).unwrap() as usize],
            base.normalized_key_positions()[0]
        );
    }

    #[test]
    fn test_cache_is_cleared_explicitly() {
        let mut profile = profile_3x7();
        assert_eq!(profile.key_count(), 21);

        profile
            .set_variant(Some(Variant {
                available_note_range: Some((60, 71)),
                ..Default::default()
            }))
            .unwrap();
        assert_eq!(profile.key_count(), 21);

        profile.clear_cache();
        assert_eq!(profile.key_count(), 7);
        assert_eq!(profile.key_by_pitch(60), Some(0));
    }

    #[test]
    fn test_calibration_maps_positions() {
        let calibration = Calibration::new(Point::new(100.0, 200.0), Point::new(700.0, 500.0));
        let profile = profile_3x7().with_calibration(calibration);

        // C3 is bottom-left, B5 top-right
        assert_eq!(profile.key_position(0), Some(Point::new(100.0, 500.0)));
        assert_eq!(profile.key_position(20), Some(Point::new(700.0, 200.0)));
        assert_eq!(profile.normalized_key_positions()[0], Point::new(0.0, 1.0));
        assert_eq!(profile.key_position(21), None);
    }

    #[test]
    fn test_unset_calibration_keeps_normalized() {
        assert!(!Calibration::default().is_set());

        let profile = profile_3x7().with_calibration(Calibration::default());
        assert_eq!(profile.key_position(0), Some(Point::new(0.0, 1.0)));
    }

    #[test]
    fn test_same_key_interval_override() {
        let profile = profile_3x7().with_same_key_min_interval(100.0);
        assert_eq!(profile.same_key_min_interval(), 100.0);

        let profile = profile
            .with_variant(Variant {
                same_key_min_interval: Some(20.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(profile.same_key_min_interval(), 20.0);
    }

    #[test]
    fn test_physical_distances() {
        let profile = profile_3x7();

        let closest = profile.physical_closest_keys(0);
        assert_eq!(closest.len(), 20);
        assert_eq!(closest[0].0, 1);
        assert!((closest[0].1 - 1.0 / 6.0).abs() < 1e-9);
        assert!(closest.windows(2).all(|w| w[0].1 <= w[1].1));
        assert!(profile.physical_closest_keys(99).is_empty());

        let min = profile.physical_min_key_distance().unwrap();
        assert!((min - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_piano_duration_mode_and_json() {
        let profile = KeyProfile::new("piano", generic_piano36())
            .unwrap()
            .with_variant(Variant {
                duration_mode: DurationType::Native,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(profile.duration_mode(), DurationType::Native);

        let bytes = profile.to_json_bytes().unwrap();
        let restored = KeyProfile::from_json_bytes(&bytes).unwrap();
        assert!(restored.validate().is_ok());
        assert_eq!(restored.duration_mode(), DurationType::Native);
        assert_eq!(restored.key_count(), 36);
    }

    #[test]
    fn test_rejects_invalid_layout() {
        let mut bad = generic_3x7();
        bad.rows = 0;
        assert!(KeyProfile::new("bad", bad.clone()).is_err());

        let mut profile = profile_3x7();
        assert!(profile.set_layout(bad).is_err());
        assert_eq!(profile.layout().rows, 3);
    }

    #[test]
    fn test_substitutions_do_not_chain() {
        let base = profile_3x7();
        let variant = Variant {
            replace_note_map: BTreeMap::from([(48, 49), (49, 51)]),
            ..Default::default()
        };
        let profile = profile_3x7().with_variant(variant).unwrap();

        // 49 is not in the generated layout, so only C3 moves
        let key = profile.key_by_pitch(49).unwrap() as usize;
        assert_eq!(profile.normalized_key_positions()[key], base.normalized_key_positions()[0]);
        assert_eq!(profile.key_by_pitch(51), None);
        assert_eq!(profile.key_by_pitch(48), None);
        assert_eq!(profile.key_count(), 21);
    }

    #[test]
    fn test_substitutions_swap_keys() {
        let base = profile_3x7();
        let variant = Variant {
            replace_note_map: BTreeMap::from([(48, 50), (50, 48)]),
            ..Default::default()
        };
        let profile = profile_3x7().with_variant(variant).unwrap();

        let c3 = profile.key_by_pitch(48).unwrap() as usize;
        let d3 = profile.key_by_pitch(50).unwrap() as usize;
        assert_eq!(profile.normalized_key_positions()[d3], base.normalized_key_positions()[0]);
        assert_eq!(profile.normalized_key_positions()[c3], base.normalized_key_positions()[1]);
    }

    #[test]
    fn test_substitution_onto_existing_key_is_rejected() {
        // E3 keeps its own key, so C3 cannot take its pitch
        let colliding = Variant {
            replace_note_map: BTreeMap::from([(48, 52)]),
            ..Default::default()
        };
        assert!(matches!(
            profile_3x7().with_variant(colliding.clone()),
            Err(ProfileError::SubstitutionCollision { from: 48, to: 52 })
        ));

        let mut profile = profile_3x7();
        assert!(profile.set_variant(Some(colliding)).is_err());
        assert!(profile.variant().is_none());

        // Two sources onto one target collide too
        let merged = Variant {
            replace_note_map: BTreeMap::from([(48, 49), (50, 49)]),
            ..Default::default()
        };
        assert!(profile_3x7().with_variant(merged).is_err());
    }

    #[test]
    fn test_json_load_rejects_invalid_layout() {
        let mut value: serde_json::Value = serde_json::from_slice(&profile_3x7().to_json_bytes().unwrap()).unwrap();
        value["layout"]["rows"] = serde_json::json!(0);
        let data = serde_json::to_vec(&value).unwrap();

        assert!(matches!(
            KeyProfile::from_json_bytes(&data),
            Err(ProfileError::LayoutError(LayoutError::EmptyGrid))
        ));
        assert!(matches!(
            KeyProfile::from_json_bytes(b"not json"),
            Err(ProfileError::SerializationError(_))
        ));
    }

    #[test]
    fn test_json_load_rejects_colliding_variant() {
        let json = br#"{
            "name": "bad",
            "layout": {"pitches": {"from": "C3", "to": "B5"}, "rows": 3, "columns": 7},
            "variant": {"replaceNoteMap": {"48": 52}}
        }"#;
        assert!(matches!(
            KeyProfile::from_json_bytes(json),
            Err(ProfileError::SubstitutionCollision { .. })
        ));
    }
}
