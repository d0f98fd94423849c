// Generic layout presets
// Common keyboard shapes that do not depend on any particular target device

use super::generator::LayoutDescription;

/// 3 rows of 7 white keys, C3 to B5
pub fn generic_3x7() -> LayoutDescription {
    LayoutDescription::grid("C3", "B5", 3, 7, false)
}

/// 3 rows of 12 chromatic keys, C3 to B5, black keys as full slots on the same row
pub fn generic_3x12() -> LayoutDescription {
    LayoutDescription {
        semitone_height_offset: 0.0,
        semitone_width: 1.0,
        ..LayoutDescription::grid("C3", "B5", 3, 12, true)
    }
}

/// 2 rows of 7 white keys, C4 to B5
pub fn generic_2x7() -> LayoutDescription {
    LayoutDescription::grid("C4", "B5", 2, 7, false)
}

/// Single-row piano, C3 to B5
pub fn generic_piano36() -> LayoutDescription {
    piano("C3", "B5", 36)
}

/// Full 88-key piano, A0 to C8
pub fn generic_piano88() -> LayoutDescription {
    piano("A0", "C8", 88)
}

fn piano(from: &str, to: &str, keys: usize) -> LayoutDescription {
    LayoutDescription {
        semitone_height_offset: 1.0,
        semitone_width: 0.0,
        ..LayoutDescription::grid(from, to, 1, keys, true)
    }
}

/// Look a preset up by name
pub fn by_name(name: &str) -> Option<LayoutDescription> {
    match name {
        "generic_3x7" => Some(generic_3x7()),
        "generic_3x12" => Some(generic_3x12()),
        "generic_2x7" => Some(generic_2x7()),
        "generic_piano36" => Some(generic_piano36()),
        "generic_piano88" => Some(generic_piano88()),
        _ => None,
    }
}
