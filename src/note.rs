//! Pitch names, accidentals, and MIDI conversion.
//!
//! Middle C is C4 = MIDI 60; octave `n` starts at MIDI `(n + 1) * 12`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Note names A through G.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NoteName {
    #[default]
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl NoteName {
    /// Semitone offset from C within one octave.
    pub fn semitone(self) -> u8 {
        match self {
            NoteName::C => 0,
            NoteName::D => 2,
            NoteName::E => 4,
            NoteName::F => 5,
            NoteName::G => 7,
            NoteName::A => 9,
            NoteName::B => 11,
        }
    }

    /// The letter used in American notation.
    pub fn letter(self) -> char {
        match self {
            NoteName::C => 'C',
            NoteName::D => 'D',
            NoteName::E => 'E',
            NoteName::F => 'F',
            NoteName::G => 'G',
            NoteName::A => 'A',
            NoteName::B => 'B',
        }
    }

    /// The solfege syllable used in European notation.
    pub fn solfege(self) -> &'static str {
        match self {
            NoteName::C => "Do",
            NoteName::D => "Re",
            NoteName::E => "Mi",
            NoteName::F => "Fa",
            NoteName::G => "Sol",
            NoteName::A => "La",
            NoteName::B => "Si",
        }
    }

    /// Parse an American letter, case-insensitively.
    pub fn from_letter(c: char) -> Option<NoteName> {
        match c.to_ascii_uppercase() {
            'C' => Some(NoteName::C),
            'D' => Some(NoteName::D),
            'E' => Some(NoteName::E),
            'F' => Some(NoteName::F),
            'G' => Some(NoteName::G),
            'A' => Some(NoteName::A),
            'B' => Some(NoteName::B),
            _ => None,
        }
    }
}

/// Accidentals: sharp, flat, or natural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Accidental {
    #[default]
    Natural,
    Sharp,
    Flat,
}

impl Accidental {
    /// Semitone offset: sharp = +1, flat = -1.
    pub fn offset(self) -> i8 {
        match self {
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
            Accidental::Flat => -1,
        }
    }

    /// ASCII suffix used when rendering a note.
    pub fn symbol(self) -> &'static str {
        match self {
            Accidental::Natural => "",
            Accidental::Sharp => "#",
            Accidental::Flat => "b",
        }
    }
}

/// A spelled pitch class: note name plus accidental, no octave.
///
/// # Example
/// ```
/// use leadsheet::{Accidental, Note, NoteName};
///
/// let fs = Note::new(NoteName::F, Accidental::Sharp);
/// assert_eq!(fs.pitch_class(), 6);
/// assert_eq!(fs.midi(4), Some(66));
/// assert_eq!(fs.to_string(), "F#");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Note {
    pub name: NoteName,
    pub accidental: Accidental,
}

impl Note {
    pub const fn new(name: NoteName, accidental: Accidental) -> Self {
        Self { name, accidental }
    }

    /// Natural note without accidental.
    pub const fn natural(name: NoteName) -> Self {
        Self::new(name, Accidental::Natural)
    }

    /// Pitch class 0-11, with C = 0.
    pub fn pitch_class(self) -> u8 {
        (self.name.semitone() as i8 + self.accidental.offset()).rem_euclid(12) as u8
    }

    /// MIDI number for this pitch in the given octave, or `None` when the
    /// result falls outside 0-127.
    pub fn midi(self, octave: i8) -> Option<u8> {
        let value = (octave as i16 + 1) * 12 + self.pitch_class() as i16;
        (0..=127).contains(&value).then_some(value as u8)
    }

    /// Spell a pitch class, preferring sharps by default and flats on
    /// request (flat keys read better with flat spellings).
    pub fn from_pitch_class(pc: u8, prefer_flats: bool) -> Note {
        // 0=C, 1=C#/Db, 2=D, 3=D#/Eb, 4=E, 5=F, 6=F#/Gb, 7=G, 8=G#/Ab,
        // 9=A, 10=A#/Bb, 11=B
        let (name, accidental) = match pc % 12 {
            0 => (NoteName::C, Accidental::Natural),
            1 if prefer_flats => (NoteName::D, Accidental::Flat),
            1 => (NoteName::C, Accidental::Sharp),
            2 => (NoteName::D, Accidental::Natural),
            3 if prefer_flats => (NoteName::E, Accidental::Flat),
            3 => (NoteName::D, Accidental::Sharp),
            4 => (NoteName::E, Accidental::Natural),
            5 => (NoteName::F, Accidental::Natural),
            6 if prefer_flats => (NoteName::G, Accidental::Flat),
            6 => (NoteName::F, Accidental::Sharp),
            7 => (NoteName::G, Accidental::Natural),
            8 if prefer_flats => (NoteName::A, Accidental::Flat),
            8 => (NoteName::G, Accidental::Sharp),
            9 => (NoteName::A, Accidental::Natural),
            10 if prefer_flats => (NoteName::B, Accidental::Flat),
            10 => (NoteName::A, Accidental::Sharp),
            _ => (NoteName::B, Accidental::Natural),
        };
        Note::new(name, accidental)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name.letter(), self.accidental.symbol())
    }
}

/// MIDI number of middle C.
pub const MIDDLE_C: u8 = 60;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_numbers() {
        assert_eq!(Note::natural(NoteName::C).midi(4), Some(60));
        assert_eq!(Note::natural(NoteName::A).midi(4), Some(69));
        assert_eq!(Note::new(NoteName::B, Accidental::Flat).midi(3), Some(58));
        assert_eq!(Note::natural(NoteName::C).midi(-1), Some(0));
        assert_eq!(Note::natural(NoteName::C).midi(-2), None);
        assert_eq!(Note::natural(NoteName::G).midi(9), Some(127));
        assert_eq!(Note::natural(NoteName::A).midi(9), None);
    }

    #[test]
    fn test_enharmonic_spelling() {
        let sharp = Note::from_pitch_class(6, false);
        assert_eq!(sharp.to_string(), "F#");
        let flat = Note::from_pitch_class(6, true);
        assert_eq!(flat.to_string(), "Gb");
        assert_eq!(sharp.pitch_class(), flat.pitch_class());

        // Naturals spell the same either way
        for pc in [0, 2, 4, 5, 7, 9, 11] {
            assert_eq!(
                Note::from_pitch_class(pc, false),
                Note::from_pitch_class(pc, true)
            );
        }
    }

    #[test]
    fn test_pitch_class_wraps() {
        // Cb is enharmonically B
        assert_eq!(Note::new(NoteName::C, Accidental::Flat).pitch_class(), 11);
        // B# is enharmonically C
        assert_eq!(Note::new(NoteName::B, Accidental::Sharp).pitch_class(), 0);
    }
}
