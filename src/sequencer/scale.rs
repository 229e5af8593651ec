/// Scale tables and note quantization
/// Scales are 12-bit masks with the root at the LSB.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    Chromatic,
    #[default]
    Major,
    Minor,
    HarmonicMinor,
    MajorPentatonic,
    MinorPentatonic,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
}

impl Scale {
    pub const ALL: [Scale; 10] = [
        Scale::Chromatic,
        Scale::Major,
        Scale::Minor,
        Scale::HarmonicMinor,
        Scale::MajorPentatonic,
        Scale::MinorPentatonic,
        Scale::Dorian,
        Scale::Phrygian,
        Scale::Lydian,
        Scale::Mixolydian,
    ];

    pub fn mask(self) -> u16 {
        match self {
            Scale::Chromatic => 0xfff,
            Scale::Major => 0xab5,
            Scale::Minor => 0x5ad,
            Scale::HarmonicMinor => 0x9ad,
            Scale::MajorPentatonic => 0x295,
            Scale::MinorPentatonic => 0x4a9,
            Scale::Dorian => 0x6ad,
            Scale::Phrygian => 0x5ab,
            Scale::Lydian => 0xad5,
            Scale::Mixolydian => 0x6b5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Scale::Chromatic => "Chromatic",
            Scale::Major => "Major",
            Scale::Minor => "Minor",
            Scale::HarmonicMinor => "Harmonic Minor",
            Scale::MajorPentatonic => "Major Pentatonic",
            Scale::MinorPentatonic => "Minor Pentatonic",
            Scale::Dorian => "Dorian",
            Scale::Phrygian => "Phrygian",
            Scale::Lydian => "Lydian",
            Scale::Mixolydian => "Mixolydian",
        }
    }

    /// Case-insensitive lookup, ignoring spaces, dashes and underscores
    pub fn from_name(name: &str) -> Option<Scale> {
        let wanted: String = name
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_lowercase();
        Self::ALL.into_iter().find(|scale| {
            scale.name().replace(' ', "").to_lowercase() == wanted
        })
    }
}

const OCTAVE_MASK: u16 = 0xfff;

fn rotate12_left(mask: u16, by: u8) -> u16 {
    let by = (by % 12) as u32;
    let mask = mask & OCTAVE_MASK;
    OCTAVE_MASK & ((mask << by) | (mask >> (12 - by)))
}

fn rotate12_right(mask: u16, by: u8) -> u16 {
    let by = (by % 12) as u32;
    let mask = mask & OCTAVE_MASK;
    OCTAVE_MASK & ((mask >> by) | (mask << (12 - by)))
}

/// Snap `note` up to the nearest pitch of `scale` in the key of `root`.
///
/// Looks at most two semitones up. A mask with a wider gap, or a match
/// above 127, leaves the note unchanged.
pub fn quantize(note: u8, scale: u16, root: u8) -> u8 {
    let semitone = note % 12;
    let mut mask = rotate12_left(scale, root % 12);
    let mut candidate = note;
    for _ in 0..3 {
        if candidate > 127 {
            break;
        }
        if mask & (1 << semitone) != 0 {
            return candidate;
        }
        mask = rotate12_right(mask, 1);
        candidate += 1;
    }
    note
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_key(note: u8, scale: u16, root: u8) -> bool {
        rotate12_left(scale, root % 12) & (1 << (note % 12)) != 0
    }

    #[test]
    fn test_rotation_wraps_within_octave() {
        assert_eq!(rotate12_left(0x801, 1), 0x003);
        assert_eq!(rotate12_right(0x003, 1), 0x801);
        assert_eq!(rotate12_left(0xab5, 0), 0xab5);
        assert_eq!(rotate12_left(0xab5, 12), 0xab5);
    }

    #[test]
    fn test_c_major_snaps_up() {
        let major = Scale::Major.mask();
        assert_eq!(quantize(60, major, 60), 60); // C
        assert_eq!(quantize(61, major, 60), 62); // C# -> D
        assert_eq!(quantize(66, major, 60), 67); // F# -> G
        assert_eq!(quantize(71, major, 60), 71); // B
    }

    #[test]
    fn test_root_transposes_mask() {
        let major = Scale::Major.mask();
        // D major contains F# and C#, not F or C
        assert_eq!(quantize(66, major, 62), 66);
        assert_eq!(quantize(65, major, 62), 66);
        assert_eq!(quantize(60, major, 62), 61);
    }

    #[test]
    fn test_pentatonic_within_two_semitones() {
        let pent = Scale::MinorPentatonic.mask();
        // A minor pentatonic: A C D E G
        assert_eq!(quantize(70, pent, 57), 72); // A# -> C
        assert_eq!(quantize(65, pent, 57), 67); // F -> G
    }

    #[test]
    fn test_every_builtin_scale_lands_in_key() {
        for scale in Scale::ALL {
            for root in 0..=127u8 {
                for note in 0..=125u8 {
                    let q = quantize(note, scale.mask(), root);
                    assert!(q >= note && q <= note + 2, "{} {} {}", scale.name(), root, note);
                    assert!(in_key(q, scale.mask(), root), "{} root {} note {}", scale.name(), root, note);
                }
            }
        }
    }

    #[test]
    fn test_gap_too_wide_returns_note() {
        // root and fifth only
        let sparse = 0x081;
        assert_eq!(quantize(61, sparse, 60), 61);
        assert_eq!(quantize(66, sparse, 60), 67);
    }

    #[test]
    fn test_no_match_above_range() {
        // 127 is G; in C major pentatonic G is present
        assert_eq!(quantize(127, Scale::MajorPentatonic.mask(), 0), 127);
        // A major has no G natural, and G# would be 128
        assert_eq!(quantize(127, Scale::Major.mask(), 9), 127);
        // F# out of C major snaps to the top note
        assert_eq!(quantize(126, Scale::Major.mask(), 0), 127);
        // F# minor pentatonic: the next degree above G is A at 129
        assert_eq!(quantize(127, Scale::MinorPentatonic.mask(), 6), 127);
    }

    #[test]
    fn test_scale_names_round_trip() {
        assert_eq!(Scale::from_name("harmonic-minor"), Some(Scale::HarmonicMinor));
        assert_eq!(Scale::from_name("Major Pentatonic"), Some(Scale::MajorPentatonic));
        assert_eq!(Scale::from_name("dorian"), Some(Scale::Dorian));
        assert_eq!(Scale::from_name("bebop"), None);
    }
}
