//! Notation systems, keys, and chord translation.
//!
//! Translations operate on parsed [`ChordSymbol`] values rather than on
//! text, so converting a document twice is the same as converting it
//! once. American and European notation differ only in how the root and
//! bass are spelled; roman numerals are resolved against a [`Key`].

use serde::{Deserialize, Serialize};

use crate::note::{Accidental, Note};

use super::parser::parse_root;
use super::symbol::{
    beats_suffix, Chord, ChordSymbol, Quality, RomanChord, RomanDegree, RomanSeventh, Seventh,
};

/// The notation system a document is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Notation {
    #[default]
    American,
    European,
    Roman,
}

/// Major or minor mode of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
}

/// A key signature: root plus mode. Roman-numeral chords resolve against
/// the key in effect when they are played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub root: Note,
    pub mode: Mode,
}

impl Key {
    pub const fn major(root: Note) -> Self {
        Self {
            root,
            mode: Mode::Major,
        }
    }

    pub const fn minor(root: Note) -> Self {
        Self {
            root,
            mode: Mode::Minor,
        }
    }

    /// Parse a key name like `C`, `F#m`, `Bb`, `Lam`. A trailing `m` or
    /// `min` (or a lowercase root) selects minor.
    pub fn parse(s: &str, notation: Notation) -> Option<Key> {
        let (root, lowercase, rest) = parse_root(s.trim(), notation)?;
        let mode = match rest {
            "" => {
                if lowercase {
                    Mode::Minor
                } else {
                    Mode::Major
                }
            }
            "m" | "min" => Mode::Minor,
            "M" | "maj" => Mode::Major,
            _ => return None,
        };
        Some(Key { root, mode })
    }

    /// Position on the circle of fifths of the relative major key.
    fn fifths(&self) -> i8 {
        let pc = match self.mode {
            Mode::Major => self.root.pitch_class(),
            Mode::Minor => (self.root.pitch_class() + 3) % 12,
        };
        match pc {
            0 => 0,
            1 => -5,
            2 => 2,
            3 => -3,
            4 => 4,
            5 => -1,
            6 => 6,
            7 => 1,
            8 => -4,
            9 => 3,
            10 => -2,
            _ => 5,
        }
    }

    /// Flat keys (and flat-spelled roots) read better with flat
    /// spellings for derived notes.
    pub fn prefer_flats(&self) -> bool {
        self.root.accidental == Accidental::Flat || self.fifths() < 0
    }

    fn scale(&self) -> [u8; 7] {
        match self.mode {
            Mode::Major => [0, 2, 4, 5, 7, 9, 11],
            Mode::Minor => [0, 2, 3, 5, 7, 8, 10],
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root)?;
        if self.mode == Mode::Minor {
            write!(f, "m")?;
        }
        Ok(())
    }
}

fn degree_note(degree: &RomanDegree, key: &Key) -> Note {
    let scale = key.scale();
    let pc = (key.root.pitch_class() as i8
        + scale[(degree.degree - 1) as usize] as i8
        + degree.accidental.offset())
    .rem_euclid(12) as u8;
    // A written bIII spells flat no matter the key
    let prefer_flats = match degree.accidental {
        Accidental::Flat => true,
        Accidental::Sharp => false,
        Accidental::Natural => key.prefer_flats(),
    };
    Note::from_pitch_class(pc, prefer_flats)
}

/// Resolve a roman-numeral chord to an absolute chord in the given key.
///
/// Case picks the quality (uppercase major, lowercase minor), `°` forces
/// diminished, and a spelled `7` follows the chord: dominant on major,
/// minor seventh on minor, diminished seventh on diminished.
///
/// # Example
/// ```
/// use leadsheet::{parse_chord, resolve_roman, ChordSymbol, Key, Notation, Note, NoteName};
///
/// let ChordSymbol::Roman(v7) = parse_chord("V7", Notation::American).unwrap() else {
///     panic!()
/// };
/// let g7 = resolve_roman(&v7, &Key::major(Note::natural(NoteName::C)));
/// assert_eq!(g7.to_string(), "G7");
/// ```
pub fn resolve_roman(roman: &RomanChord, key: &Key) -> Chord {
    let quality = if roman.degree.diminished {
        Quality::Diminished
    } else if roman.degree.uppercase {
        Quality::Major
    } else {
        Quality::Minor
    };
    let seventh = roman.seventh.map(|s| match s {
        RomanSeventh::MajorSeventh => Seventh::Maj7,
        RomanSeventh::Seventh => {
            if roman.degree.diminished {
                Seventh::Dim7
            } else if roman.degree.uppercase {
                Seventh::Dom7
            } else {
                Seventh::Min7
            }
        }
    });
    let mut chord = Chord::triad(degree_note(&roman.degree, key), quality);
    chord.seventh = seventh;
    chord.bass = roman.bass.as_ref().map(|b| degree_note(b, key));
    chord.beats = roman.beats;
    chord
}

/// Express an absolute chord as a roman numeral in the given key, when
/// its shape is representable (triads and plain sevenths).
pub fn to_roman(chord: &Chord, key: &Key) -> Option<RomanChord> {
    if chord.extension.is_some() || !chord.added.is_empty() || !chord.alterations.is_empty() {
        return None;
    }
    let degree = roman_degree_for(chord.root, chord.quality, key)?;
    let seventh = match chord.seventh {
        None => None,
        Some(Seventh::Maj7) => Some(RomanSeventh::MajorSeventh),
        Some(Seventh::Dom7) | Some(Seventh::Min7) | Some(Seventh::Dim7) => {
            Some(RomanSeventh::Seventh)
        }
        Some(_) => return None,
    };
    let bass = match chord.bass {
        None => None,
        Some(note) => Some(roman_degree_for(note, Quality::Major, key)?),
    };
    Some(RomanChord {
        degree,
        seventh,
        bass,
        beats: chord.beats,
    })
}

fn roman_degree_for(note: Note, quality: Quality, key: &Key) -> Option<RomanDegree> {
    let offset = (note.pitch_class() as i8 - key.root.pitch_class() as i8).rem_euclid(12) as u8;
    let scale = key.scale();
    // Prefer the natural degree, then a flattened one, then a sharpened one
    let (index, accidental) = scale
        .iter()
        .position(|&s| s == offset)
        .map(|i| (i, Accidental::Natural))
        .or_else(|| {
            scale
                .iter()
                .position(|&s| s == (offset + 1) % 12)
                .map(|i| (i, Accidental::Flat))
        })
        .or_else(|| {
            scale
                .iter()
                .position(|&s| (s + 1) % 12 == offset)
                .map(|i| (i, Accidental::Sharp))
        })?;
    let (uppercase, diminished) = match quality {
        Quality::Major => (true, false),
        Quality::Minor => (false, false),
        Quality::Diminished => (false, true),
        _ => return None,
    };
    Some(RomanDegree {
        accidental,
        degree: (index + 1) as u8,
        uppercase,
        diminished,
    })
}

fn solfege_note(note: Note) -> String {
    format!("{}{}", note.name.solfege(), note.accidental.symbol())
}

/// Render a chord symbol in the given notation. American and Roman use
/// the canonical form; European respells the root and bass as solfege.
pub fn format_chord(symbol: &ChordSymbol, notation: Notation) -> String {
    match (notation, symbol) {
        (Notation::European, ChordSymbol::Chord(chord)) => {
            let mut out = format!("{}{}", solfege_note(chord.root), chord.suffix_text());
            if let Some(bass) = chord.bass {
                out.push('/');
                out.push_str(&solfege_note(bass));
            }
            out.push_str(&beats_suffix(chord.beats));
            out
        }
        _ => symbol.to_string(),
    }
}

/// Rewrite every valid chord token of a document in the target notation.
///
/// Lines, spacing, lyrics, comments, and directives are preserved
/// byte-for-byte; invalid chord tokens are left as written.
pub fn convert_document(text: &str, from: Notation, to: Notation) -> String {
    let program = crate::song::parse_song(text, from);
    let mut out_lines: Vec<String> = Vec::with_capacity(program.lines.len());
    for (index, source) in text.split('\n').enumerate() {
        let rewritten = match program.lines.get(index) {
            Some(crate::song::Line::Chord { tokens }) => {
                let mut out = String::with_capacity(source.len());
                let mut cursor = 0;
                for token in tokens {
                    out.push_str(&source[cursor..token.span.start]);
                    match &token.parsed {
                        Ok(symbol) => out.push_str(&format_chord(symbol, to)),
                        Err(_) => out.push_str(&token.text),
                    }
                    cursor = token.span.end;
                }
                out.push_str(&source[cursor..]);
                out
            }
            _ => source.to_string(),
        };
        out_lines.push(rewritten);
    }
    out_lines.join("\n")
}

/// Chord templates used to name a set of pitch classes, smallest last so
/// richer matches win ties on dedup.
const IDENTIFY_TEMPLATES: &[(&str, &[u8])] = &[
    ("", &[0, 4, 7]),
    ("m", &[0, 3, 7]),
    ("dim", &[0, 3, 6]),
    ("aug", &[0, 4, 8]),
    ("sus2", &[0, 2, 7]),
    ("sus4", &[0, 5, 7]),
    ("5", &[0, 7]),
    ("7", &[0, 4, 7, 10]),
    ("maj7", &[0, 4, 7, 11]),
    ("m7", &[0, 3, 7, 10]),
    ("dim7", &[0, 3, 6, 9]),
    ("m7b5", &[0, 3, 6, 10]),
    ("mM7", &[0, 3, 7, 11]),
    ("aug7", &[0, 4, 8, 10]),
    ("7sus4", &[0, 5, 7, 10]),
    ("6", &[0, 4, 7, 9]),
    ("m6", &[0, 3, 7, 9]),
    ("add9", &[0, 4, 7, 2]),
    ("madd9", &[0, 3, 7, 2]),
    ("9", &[0, 4, 7, 10, 2]),
    ("maj9", &[0, 4, 7, 11, 2]),
    ("m9", &[0, 3, 7, 10, 2]),
];

/// Name the chords whose tones are exactly the given pitch classes.
///
/// Every pitch class present is tried as the root, so inversions come
/// back as all their readings (`C E G A` names both `C6` and `Am7`).
pub fn identify_chord(pitch_classes: &[u8]) -> Vec<String> {
    let mut input = [false; 12];
    for &pc in pitch_classes {
        input[(pc % 12) as usize] = true;
    }
    let count = input.iter().filter(|p| **p).count();
    let mut names = Vec::new();
    for root in 0..12u8 {
        if !input[root as usize] {
            continue;
        }
        for (suffix, intervals) in IDENTIFY_TEMPLATES {
            if intervals.len() != count {
                continue;
            }
            let matches = intervals
                .iter()
                .all(|&iv| input[((root + iv) % 12) as usize]);
            if matches {
                names.push(format!("{}{}", Note::from_pitch_class(root, false), suffix));
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::parse_chord;
    use crate::note::NoteName;

    fn roman(token: &str) -> RomanChord {
        match parse_chord(token, Notation::American).unwrap() {
            ChordSymbol::Roman(r) => r,
            other => panic!("expected roman chord, got {other:?}"),
        }
    }

    #[test]
    fn test_key_parsing() {
        let c = Key::parse("C", Notation::American).unwrap();
        assert_eq!(c.mode, Mode::Major);
        let am = Key::parse("Am", Notation::American).unwrap();
        assert_eq!(am.mode, Mode::Minor);
        assert_eq!(am.root.pitch_class(), 9);
        let fsm = Key::parse("F#m", Notation::American).unwrap();
        assert_eq!(fsm.root.pitch_class(), 6);
        let lam = Key::parse("Lam", Notation::European).unwrap();
        assert_eq!(lam, am);
        assert!(Key::parse("C7", Notation::American).is_none());
    }

    #[test]
    fn test_flat_preference() {
        assert!(Key::parse("F", Notation::American).unwrap().prefer_flats());
        assert!(Key::parse("Bb", Notation::American).unwrap().prefer_flats());
        assert!(Key::parse("Dm", Notation::American).unwrap().prefer_flats());
        assert!(!Key::parse("G", Notation::American).unwrap().prefer_flats());
        assert!(!Key::parse("C", Notation::American).unwrap().prefer_flats());
        assert!(!Key::parse("Em", Notation::American).unwrap().prefer_flats());
    }

    #[test]
    fn test_roman_resolution_in_major() {
        let c = Key::major(Note::natural(NoteName::C));
        assert_eq!(resolve_roman(&roman("I"), &c).to_string(), "C");
        assert_eq!(resolve_roman(&roman("ii"), &c).to_string(), "Dm");
        assert_eq!(resolve_roman(&roman("V7"), &c).to_string(), "G7");
        assert_eq!(resolve_roman(&roman("vi"), &c).to_string(), "Am");
        assert_eq!(resolve_roman(&roman("vii°7"), &c).to_string(), "Bdim7");
        assert_eq!(resolve_roman(&roman("Imaj7"), &c).to_string(), "Cmaj7");

        let g = Key::major(Note::natural(NoteName::G));
        assert_eq!(resolve_roman(&roman("IV"), &g).to_string(), "C");
        assert_eq!(resolve_roman(&roman("V"), &g).to_string(), "D");
    }

    #[test]
    fn test_roman_accidentals_and_bass() {
        let c = Key::major(Note::natural(NoteName::C));
        // bVII in C is Bb major
        assert_eq!(resolve_roman(&roman("bVII"), &c).to_string(), "Bb");
        // vi/I keeps the tonic in the bass
        assert_eq!(resolve_roman(&roman("vi/I"), &c).to_string(), "Am/C");
    }

    #[test]
    fn test_roman_resolution_in_minor() {
        let am = Key::minor(Note::natural(NoteName::A));
        assert_eq!(resolve_roman(&roman("i"), &am).to_string(), "Am");
        // Natural-minor third degree
        assert_eq!(resolve_roman(&roman("III"), &am).to_string(), "C");
        assert_eq!(resolve_roman(&roman("iv"), &am).to_string(), "Dm");
    }

    #[test]
    fn test_roman_round_trip() {
        let keys = [
            Key::major(Note::natural(NoteName::C)),
            Key::major(Note::natural(NoteName::G)),
            Key::major(Note::new(NoteName::B, Accidental::Flat)),
            Key::minor(Note::natural(NoteName::A)),
        ];
        for key in keys {
            for token in ["I", "ii", "iii", "IV", "V7", "vi", "bVII", "Imaj7", "vi/I"] {
                let original = roman(token);
                let absolute = resolve_roman(&original, &key);
                let back = to_roman(&absolute, &key)
                    .unwrap_or_else(|| panic!("{token} in {key} not representable"));
                assert_eq!(original, back, "{token} in {key}");
            }
        }
    }

    #[test]
    fn test_notation_idempotence() {
        for token in ["C", "Am7", "F#m7b5", "Bb/D", "Cmaj9", "NC", "C*2"] {
            let symbol = parse_chord(token, Notation::American).unwrap();
            let european = format_chord(&symbol, Notation::European);
            let back = parse_chord(&european, Notation::European).unwrap();
            assert_eq!(symbol, back, "{token} via {european}");
            // American rendering of the round-tripped symbol is canonical
            assert_eq!(
                format_chord(&back, Notation::American),
                symbol.to_string()
            );
        }
    }

    #[test]
    fn test_european_spelling() {
        let am7 = parse_chord("Am7", Notation::American).unwrap();
        assert_eq!(format_chord(&am7, Notation::European), "Lam7");
        let c_over_g = parse_chord("C/G", Notation::American).unwrap();
        assert_eq!(format_chord(&c_over_g, Notation::European), "Do/Sol");
        let sib = parse_chord("Bb*2", Notation::American).unwrap();
        assert_eq!(format_chord(&sib, Notation::European), "Sib*2");
    }

    #[test]
    fn test_identify_chord() {
        // C E G
        let names = identify_chord(&[0, 4, 7]);
        assert!(names.contains(&"C".to_string()));
        // C E G A reads as both C6 and Am7
        let names = identify_chord(&[0, 4, 7, 9]);
        assert!(names.contains(&"C6".to_string()));
        assert!(names.contains(&"Am7".to_string()));
        // C Eb Gb Bb is half-diminished
        let names = identify_chord(&[0, 3, 6, 10]);
        assert!(names.contains(&"Cm7b5".to_string()));
        assert!(identify_chord(&[]).is_empty());
    }
}
