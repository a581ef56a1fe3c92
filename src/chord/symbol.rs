//! Chord symbol data model.
//!
//! A [`ChordSymbol`] is the parsed form of a single chord token. It is a
//! sum type so every downstream question ("does this have a seventh?",
//! "is this a rest?") is a pattern match rather than a string probe.
//!
//! The symbol keeps enough structure to serialize back to a canonical
//! American token: parsing the rendered form yields an equal symbol.

use std::fmt;

use num_rational::Ratio;

use crate::note::Note;

/// Duration in beats, kept exact so `*1.5` never drifts.
pub type Beats = Ratio<u32>;

/// Triad quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Sus2,
    Sus4,
    /// Power chord: root and fifth only.
    Power,
}

/// Seventh flavor. `HalfDim` carries the flat five with it, so `Cm7b5`
/// and `Cø` parse to the same symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seventh {
    Dom7,
    Maj7,
    Min7,
    Dim7,
    HalfDim,
    MinMaj7,
}

/// Extension degree of a tall chord (9, 11, 13). Each degree implies the
/// ones below it plus a seventh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionDegree {
    Ninth,
    Eleventh,
    Thirteenth,
}

impl ExtensionDegree {
    pub fn number(self) -> u8 {
        match self {
            ExtensionDegree::Ninth => 9,
            ExtensionDegree::Eleventh => 11,
            ExtensionDegree::Thirteenth => 13,
        }
    }
}

/// How the extension was spelled, which decides the implied seventh:
/// `C9` is dominant, `Cmaj9` major, `Cm9` minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionKind {
    Plain,
    Major,
    Minor,
}

/// An extension like the `9` of `Cmaj9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extension {
    pub degree: ExtensionDegree,
    pub kind: ExtensionKind,
}

/// Direction of an alteration: `b5` lowers, `#11` raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterDirection {
    Flat,
    Sharp,
}

/// A single alteration such as `b9` or `#11`. Degree is one of 5, 9, 11
/// or 13.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alteration {
    pub degree: u8,
    pub direction: AlterDirection,
}

impl Alteration {
    /// Semitone interval from the root after the alteration is applied.
    fn interval(self) -> u8 {
        let base = match self.degree {
            5 => 7,
            9 => 14,
            11 => 17,
            _ => 21,
        };
        match self.direction {
            AlterDirection::Flat => base - 1,
            AlterDirection::Sharp => base + 1,
        }
    }
}

/// An absolute chord: root plus structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Chord {
    pub root: Note,
    pub quality: Quality,
    pub seventh: Option<Seventh>,
    pub extension: Option<Extension>,
    /// Added degrees (`add9`, `6`) that do not imply a seventh.
    pub added: Vec<u8>,
    /// Alterations in source order.
    pub alterations: Vec<Alteration>,
    /// Slash-chord bass note.
    pub bass: Option<Note>,
    /// Explicit duration; `None` means one bar.
    pub beats: Option<Beats>,
}

impl Chord {
    /// A bare triad on the given root.
    pub fn triad(root: Note, quality: Quality) -> Self {
        Self {
            root,
            quality,
            seventh: None,
            extension: None,
            added: Vec::new(),
            alterations: Vec::new(),
            bass: None,
            beats: None,
        }
    }

    /// Semitone intervals from the root, in stacking order.
    ///
    /// Extensions expand downward (`13` implies 9 and 11), added degrees
    /// join without a seventh, and alterations are applied last so they
    /// replace the natural tone of the same degree.
    pub fn intervals(&self) -> Vec<u8> {
        let third = match self.quality {
            Quality::Major | Quality::Augmented => Some(4),
            Quality::Minor | Quality::Diminished => Some(3),
            Quality::Sus2 => Some(2),
            Quality::Sus4 => Some(5),
            Quality::Power => None,
        };
        let mut fifth = match self.quality {
            Quality::Augmented => 8,
            Quality::Diminished => 6,
            _ => 7,
        };
        let seventh = self.seventh.map(|s| match s {
            Seventh::Dom7 | Seventh::Min7 => 10,
            Seventh::Maj7 | Seventh::MinMaj7 => 11,
            Seventh::Dim7 => 9,
            Seventh::HalfDim => {
                fifth = 6;
                10
            }
        });

        let mut upper: Vec<u8> = Vec::new();
        if let Some(ext) = self.extension {
            upper.push(14);
            if ext.degree.number() >= 11 {
                upper.push(17);
            }
            if ext.degree.number() >= 13 {
                upper.push(21);
            }
        }
        for &degree in &self.added {
            upper.push(match degree {
                2 => 2,
                4 => 5,
                6 => 9,
                9 => 14,
                11 => 17,
                _ => 21,
            });
        }

        for alt in &self.alterations {
            match alt.degree {
                5 => {
                    fifth = alt.interval();
                }
                degree => {
                    let natural = match degree {
                        9 => 14,
                        11 => 17,
                        _ => 21,
                    };
                    if let Some(slot) = upper.iter_mut().find(|iv| **iv == natural) {
                        *slot = alt.interval();
                    } else {
                        upper.push(alt.interval());
                    }
                }
            }
        }

        let mut out = vec![0];
        if let Some(t) = third {
            out.push(t);
        }
        out.push(fifth);
        if let Some(s) = seventh {
            out.push(s);
        }
        out.extend(upper);
        out
    }

    /// Pitch classes relative to C, first occurrence order, root first.
    pub fn pitch_classes(&self) -> Vec<u8> {
        let root = self.root.pitch_class();
        let mut seen = [false; 12];
        let mut out = Vec::new();
        for iv in self.intervals() {
            let pc = (root + iv % 12) % 12;
            if !seen[pc as usize] {
                seen[pc as usize] = true;
                out.push(pc);
            }
        }
        out
    }

    /// Quality/seventh/extension rendered as one fused spelling, the way
    /// players write them: `m7b5`, `dim7`, `maj9`, `7sus4`.
    fn base_text(&self) -> String {
        if let Some(ext) = self.extension {
            let n = ext.degree.number();
            return match (ext.kind, self.seventh) {
                (ExtensionKind::Major, _) => format!("maj{n}"),
                (ExtensionKind::Minor, Some(Seventh::MinMaj7)) => format!("mM{n}"),
                (ExtensionKind::Minor, _) => format!("m{n}"),
                (ExtensionKind::Plain, Some(Seventh::MinMaj7)) => format!("mM{n}"),
                (ExtensionKind::Plain, _) => format!("{n}"),
            };
        }
        match (self.quality, self.seventh) {
            (Quality::Power, _) => "5".into(),
            (Quality::Major, None) => "".into(),
            (Quality::Minor, None) => "m".into(),
            (Quality::Diminished, None) => "dim".into(),
            (Quality::Augmented, None) => "aug".into(),
            (Quality::Sus2, None) => "sus2".into(),
            (Quality::Sus4, None) => "sus4".into(),
            (Quality::Minor, Some(Seventh::HalfDim)) => "m7b5".into(),
            (Quality::Minor, Some(Seventh::MinMaj7)) => "mM7".into(),
            (Quality::Minor, Some(Seventh::Maj7)) => "mM7".into(),
            (Quality::Minor, Some(_)) => "m7".into(),
            (Quality::Diminished, Some(Seventh::Dim7)) => "dim7".into(),
            (Quality::Diminished, Some(_)) => "dim7".into(),
            (Quality::Augmented, Some(Seventh::Maj7)) => "augmaj7".into(),
            (Quality::Augmented, Some(_)) => "aug7".into(),
            (Quality::Sus4, Some(_)) => "7sus4".into(),
            (Quality::Sus2, Some(_)) => "7sus2".into(),
            (Quality::Major, Some(Seventh::Maj7)) => "maj7".into(),
            (Quality::Major, Some(_)) => "7".into(),
        }
    }

    /// Everything after the root: fused base, added tones, alterations.
    /// Shared by the American and European renderings.
    pub(crate) fn suffix_text(&self) -> String {
        let mut out = self.base_text();
        for &degree in &self.added {
            if degree == 6 {
                out.push('6');
            } else {
                out.push_str(&format!("add{degree}"));
            }
        }
        for alt in &self.alterations {
            out.push(match alt.direction {
                AlterDirection::Flat => 'b',
                AlterDirection::Sharp => '#',
            });
            out.push_str(&alt.degree.to_string());
        }
        out
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.root, self.suffix_text())?;
        if let Some(bass) = self.bass {
            write!(f, "/{bass}")?;
        }
        Ok(())
    }
}

/// Roman-numeral seventh spelling. How it resolves depends on the
/// chord's case and diminished marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomanSeventh {
    Seventh,
    MajorSeventh,
}

/// The degree part of a roman chord: optional accidental prefix plus a
/// scale degree 1-7 written in a consistent case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomanDegree {
    pub accidental: crate::note::Accidental,
    pub degree: u8,
    pub uppercase: bool,
    pub diminished: bool,
}

/// A scale-degree chord such as `V7`, `ii`, `bVII` or `vii°7`. Resolved
/// against the key in effect when it is played.
#[derive(Debug, Clone, PartialEq)]
pub struct RomanChord {
    pub degree: RomanDegree,
    pub seventh: Option<RomanSeventh>,
    pub bass: Option<RomanDegree>,
    pub beats: Option<Beats>,
}

fn fmt_roman_degree(d: &RomanDegree, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", d.accidental.symbol())?;
    let numeral = match d.degree {
        1 => "I",
        2 => "II",
        3 => "III",
        4 => "IV",
        5 => "V",
        6 => "VI",
        _ => "VII",
    };
    if d.uppercase {
        write!(f, "{numeral}")?;
    } else {
        write!(f, "{}", numeral.to_lowercase())?;
    }
    if d.diminished {
        write!(f, "°")?;
    }
    Ok(())
}

impl fmt::Display for RomanChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_roman_degree(&self.degree, f)?;
        match self.seventh {
            Some(RomanSeventh::Seventh) => write!(f, "7")?,
            Some(RomanSeventh::MajorSeventh) => write!(f, "maj7")?,
            None => {}
        }
        if let Some(bass) = &self.bass {
            write!(f, "/")?;
            fmt_roman_degree(bass, f)?;
        }
        Ok(())
    }
}

/// A parsed chord token: an absolute chord, a key-relative roman chord,
/// or the `NC` rest.
#[derive(Debug, Clone, PartialEq)]
pub enum ChordSymbol {
    Chord(Chord),
    Roman(RomanChord),
    Rest { beats: Option<Beats> },
}

impl ChordSymbol {
    /// Explicit duration suffix, if any.
    pub fn beats(&self) -> Option<Beats> {
        match self {
            ChordSymbol::Chord(c) => c.beats,
            ChordSymbol::Roman(r) => r.beats,
            ChordSymbol::Rest { beats } => *beats,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, ChordSymbol::Rest { .. })
    }

    /// True for roman-numeral chords, whose meaning depends on the key.
    pub fn is_relative(&self) -> bool {
        matches!(self, ChordSymbol::Roman(_))
    }
}

/// Render an optional duration as its `*beats` suffix.
pub(crate) fn beats_suffix(beats: Option<Beats>) -> String {
    match beats {
        None => String::new(),
        Some(b) if b.is_integer() => format!("*{}", b.numer()),
        Some(b) => format!("*{}", *b.numer() as f64 / *b.denom() as f64),
    }
}

impl fmt::Display for ChordSymbol {
    /// Canonical American rendering, including the duration suffix.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChordSymbol::Chord(c) => write!(f, "{c}")?,
            ChordSymbol::Roman(r) => write!(f, "{r}")?,
            ChordSymbol::Rest { .. } => write!(f, "NC")?,
        }
        write!(f, "{}", beats_suffix(self.beats()))
    }
}
