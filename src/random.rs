// Deterministic pseudo-random utilities
// Seedable 32-bit hash generator and Fisher-Yates shuffle for reproducible chord selection

/// Seed used when a caller does not provide one
pub const DEFAULT_SEED: u32 = 0x02F6_E2B1;

/// Pseudo-random generator built on Robert Jenkins' 32-bit integer hash
///
/// Each call re-hashes the internal state and returns its low 28 bits scaled
/// to [0.0, 1.0). Identical seeds always produce identical sequences, which is
/// what chord selection and humanization rely on for reproducible output.
#[derive(Debug, Clone)]
pub struct Prng {
    state: u32,
}

impl Prng {
    /// Create a generator from a seed
    pub fn new(seed: u32) -> Self {
        Prng { state: seed }
    }

    /// Advance the state and return a value in [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        let mut s = self.state;
        s = s.wrapping_add(0x7ED5_5D16).wrapping_add(s << 12);
        s = (s ^ 0xC761_C23C) ^ (s >> 19);
        s = s.wrapping_add(0x1656_67B1).wrapping_add(s << 5);
        s = s.wrapping_add(0xD3A2_646C) ^ (s << 9);
        s = s.wrapping_add(0xFD70_46C5).wrapping_add(s << 3);
        s = (s ^ 0xB55A_4F09) ^ (s >> 16);
        self.state = s;

        (s & 0x0FFF_FFFF) as f64 / 0x1000_0000 as f64
    }

    /// Standard normal sample via Box-Muller
    pub fn next_gaussian(&mut self) -> f64 {
        // Box-Muller needs both samples in (0, 1)
        let mut u = 0.0;
        while u == 0.0 {
            u = self.next_f64();
        }
        let mut v = 0.0;
        while v == 0.0 {
            v = self.next_f64();
        }

        (-2.0 * u.ln()).sqrt() * (2.0 * std::f64::consts::PI * v).cos()
    }
}

impl Default for Prng {
    fn default() -> Self {
        Prng::new(DEFAULT_SEED)
    }
}

/// Shuffle a slice in place (Fisher-Yates, walking from the back)
pub fn shuffle<T>(items: &mut [T], rng: &mut Prng) {
    let mut i = items.len();
    if i == 0 {
        return;
    }

    i -= 1;
    while i > 0 {
        let j = (rng.next_f64() * (i + 1) as f64).floor() as usize;
        items.swap(i, j.min(i));
        i -= 1;
    }
}
