// Pitch naming - MIDI pitch numbers and note names
// "C4" is middle C (60); sharps may be written before or after the octave digit

use super::generator::LayoutError;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

const TRANSPOSITION_NAMES: [&str; 12] = ["Ab", "A", "Bb", "B", "C", "Db", "D", "Eb", "E", "F", "Gb", "G"];

/// Pitch of a natural note letter within octave 4 (C4 = 60)
fn natural_pitch(letter: char) -> Option<i32> {
    let offset = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    Some(60 + offset)
}

/// Parse a note name into a MIDI pitch
///
/// Accepted forms: `C` (octave 4), `C5`, `C#` (octave 4), `C5#`, `C#5`.
/// Letters are case-insensitive.
pub fn name_to_midi_pitch(name: &str) -> Result<i32, LayoutError> {
    let invalid = || LayoutError::InvalidPitchName(name.to_string());

    let upper: Vec<char> = name.trim().to_uppercase().chars().collect();
    let base = upper.first().and_then(|&c| natural_pitch(c)).ok_or_else(invalid)?;

    let octave = |c: char| c.to_digit(10).map(|d| 12 * (d as i32 - 4)).ok_or_else(invalid);

    match upper[1..] {
        [] => Ok(base),
        ['#'] => Ok(base + 1),
        [d] => Ok(base + octave(d)?),
        [d, '#'] | ['#', d] => Ok(base + 1 + octave(d)?),
        _ => Err(invalid()),
    }
}

/// Name of a MIDI pitch, e.g. 61 -> "C#4"
pub fn midi_pitch_to_name(pitch: i32) -> String {
    let octave = pitch.div_euclid(12) - 1;
    let note = pitch.rem_euclid(12) as usize;
    format!("{}{}", NOTE_NAMES[note], octave)
}

/// Whether a pitch falls on a black key
pub fn is_semitone(pitch: i32) -> bool {
    matches!(pitch.rem_euclid(12), 1 | 3 | 6 | 8 | 10)
}

/// Key signature a song is estimated to be in, given the transposition that made it playable
///
/// An offset of 0 means the song was already in C.
pub fn transposition_key_name(offset: i32) -> &'static str {
    TRANSPOSITION_NAMES[(4 - offset).rem_euclid(12) as usize]
}
