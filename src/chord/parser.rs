//! Chord symbol parsing.
//!
//! Parses chord tokens (C, Am, G7, Dm7b5, A7b9#11, Lam/Sol, vii°7, NC*2)
//! into [`ChordSymbol`] values. Uses a compositional parser that
//! understands chord grammar rather than hardcoding combinations.
//!
//! # Chord Grammar
//! - Root: A-G with optional # or b (lowercase letter means minor), or a
//!   solfege syllable in European notation (Do..Si, lowercase = minor)
//! - Quality: major (default), minor (m, min, -), diminished (dim, °),
//!   augmented (aug, +), sus2/sus4/sus, power (5)
//! - Seventh: 7 (dominant), maj7/M7/Δ, m7, dim7/°7, m7b5/ø, mM7/m(maj7)
//! - Extensions: 9, 11, 13 (imply the lower extensions and a seventh)
//! - Added tones: add9, add11, add13, 6
//! - Alterations: b5, #5, b9, #9, #11, b13 (stackable)
//! - Slash bass: /E, /Sol# (suffixes past the accidental are dropped)
//! - Roman numerals: optional b/# prefix, I..VII or i..vii, optional
//!   °/o, optional 7/maj7, optional roman slash bass
//! - Duration: `*beats` with a positive decimal, e.g. `C*2`, `Am*1.5`
//! - `NC` is the rest token

use crate::error::ChordParseError;
use crate::note::{Accidental, Note, NoteName};

use super::notation::Notation;
use super::symbol::{
    AlterDirection, Alteration, Beats, Chord, ChordSymbol, Extension, ExtensionDegree,
    ExtensionKind, Quality, RomanChord, RomanDegree, RomanSeventh, Seventh,
};

/// Parse a single chord token.
///
/// # Example
/// ```
/// use leadsheet::{parse_chord, ChordSymbol, Notation};
///
/// let sym = parse_chord("Am7", Notation::American).unwrap();
/// let ChordSymbol::Chord(chord) = sym else { panic!() };
/// assert_eq!(chord.pitch_classes(), vec![9, 0, 4, 7]); // A C E G
/// ```
pub fn parse_chord(token: &str, notation: Notation) -> Result<ChordSymbol, ChordParseError> {
    if token.is_empty() {
        return Err(ChordParseError::EmptyToken);
    }
    let (body, beats) = match token.split_once('*') {
        Some((body, dur)) => (body, Some(parse_beats(dur)?)),
        None => (token, None),
    };
    if body.is_empty() {
        return Err(ChordParseError::EmptyToken);
    }
    if body == "NC" {
        return Ok(ChordSymbol::Rest { beats });
    }

    if let Some(result) = try_parse_roman(body) {
        let mut roman = result?;
        roman.beats = beats;
        return Ok(ChordSymbol::Roman(roman));
    }

    let (root, implicit_minor, mut rest) = parse_root(body, notation)
        .ok_or_else(|| ChordParseError::UnknownRoot(token.to_string()))?;
    let mut chord = Chord::triad(
        root,
        if implicit_minor {
            Quality::Minor
        } else {
            Quality::Major
        },
    );

    if let Some(consumed) = parse_base(&mut chord, rest) {
        rest = &rest[consumed..];
    }
    loop {
        match parse_add(&mut chord, rest, token)? {
            Some(consumed) => rest = &rest[consumed..],
            None => break,
        }
    }
    loop {
        match parse_alteration(&mut chord, rest, token)? {
            Some(consumed) => rest = &rest[consumed..],
            None => break,
        }
    }
    if let Some(after) = rest.strip_prefix('/') {
        let (bass, _, _) =
            parse_root(after, notation).ok_or_else(|| ChordParseError::BadBass(token.to_string()))?;
        // Anything past the bass accidental is dropped: C/Em reads as C/E
        chord.bass = Some(bass);
        rest = "";
    }
    if !rest.is_empty() {
        return Err(ChordParseError::UnknownQuality {
            token: token.to_string(),
            quality: rest.to_string(),
        });
    }
    if chord.quality == Quality::Power
        && (chord.seventh.is_some() || chord.extension.is_some() || !chord.added.is_empty())
    {
        return Err(ChordParseError::UnknownQuality {
            token: token.to_string(),
            quality: "power chords take no seventh or extensions".to_string(),
        });
    }
    chord.beats = beats;
    Ok(ChordSymbol::Chord(chord))
}

/// Parse the `*beats` duration suffix: a positive decimal, kept exact
/// (`1.5` becomes 3/2).
fn parse_beats(s: &str) -> Result<Beats, ChordParseError> {
    let err = || ChordParseError::BadDuration(s.to_string());
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(err());
    }
    if frac_part.len() > 6
        || !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
        || (!frac_part.is_empty() && frac_part.parse::<u32>().is_err())
    {
        return Err(err());
    }
    let scale = 10u32.pow(frac_part.len() as u32);
    let int_val: u32 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| err())?
    };
    let frac_val: u32 = if frac_part.is_empty() {
        0
    } else {
        frac_part.parse().map_err(|_| err())?
    };
    let numer = int_val
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or_else(err)?;
    if numer == 0 {
        return Err(err());
    }
    Ok(Beats::new(numer, scale))
}

fn parse_accidental(s: &str) -> (Accidental, &str) {
    for (symbol, accidental) in [
        ("#", Accidental::Sharp),
        ("♯", Accidental::Sharp),
        ("b", Accidental::Flat),
        ("♭", Accidental::Flat),
    ] {
        if let Some(rest) = s.strip_prefix(symbol) {
            return (accidental, rest);
        }
    }
    (Accidental::Natural, s)
}

/// Parse a root note. Returns `(note, wrote_lowercase, rest)`; lowercase
/// roots mean minor (`c` = Cm, `rem` = Dm).
pub(crate) fn parse_root(s: &str, notation: Notation) -> Option<(Note, bool, &str)> {
    match notation {
        Notation::European => parse_solfege_root(s),
        Notation::American | Notation::Roman => parse_letter_root(s),
    }
}

fn parse_letter_root(s: &str) -> Option<(Note, bool, &str)> {
    let first = s.chars().next()?;
    let name = NoteName::from_letter(first)?;
    let (accidental, rest) = parse_accidental(&s[first.len_utf8()..]);
    Some((Note::new(name, accidental), first.is_ascii_lowercase(), rest))
}

const SOLFEGE: [(&str, &str, NoteName); 7] = [
    ("Sol", "sol", NoteName::G),
    ("Do", "do", NoteName::C),
    ("Re", "re", NoteName::D),
    ("Mi", "mi", NoteName::E),
    ("Fa", "fa", NoteName::F),
    ("La", "la", NoteName::A),
    ("Si", "si", NoteName::B),
];

fn parse_solfege_root(s: &str) -> Option<(Note, bool, &str)> {
    for (upper, lower, name) in SOLFEGE {
        let lowercase = if s.starts_with(upper) {
            false
        } else if s.starts_with(lower) {
            true
        } else {
            continue;
        };
        let (accidental, rest) = parse_accidental(&s[upper.len()..]);
        return Some((Note::new(name, accidental), lowercase, rest));
    }
    None
}

/// One fused quality/seventh/extension spelling, longest match first.
/// Returns the number of bytes consumed, or `None` when the text starts
/// with no known base (the chord keeps its default quality).
fn parse_base(chord: &mut Chord, s: &str) -> Option<usize> {
    let set = |chord: &mut Chord,
               quality: Quality,
               seventh: Option<Seventh>,
               ext: Option<(ExtensionDegree, ExtensionKind)>| {
        chord.quality = quality;
        chord.seventh = seventh;
        chord.extension = ext.map(|(degree, kind)| Extension { degree, kind });
    };
    use ExtensionDegree::{Eleventh, Ninth, Thirteenth};

    // Minor-major sevenths (before plain minor)
    for pat in ["m(maj7)", "minmaj7", "mmaj7", "mM7"] {
        if s.starts_with(pat) {
            set(chord, Quality::Minor, Some(Seventh::MinMaj7), None);
            return Some(pat.len());
        }
    }
    for (pat, degree) in [("mM13", Thirteenth), ("mM11", Eleventh), ("mM9", Ninth)] {
        if s.starts_with(pat) {
            set(
                chord,
                Quality::Minor,
                Some(Seventh::MinMaj7),
                Some((degree, ExtensionKind::Minor)),
            );
            return Some(pat.len());
        }
    }

    // Major sevenths and tall majors (before "maj" and "M")
    for (pat, degree) in [
        ("maj13", Some(Thirteenth)),
        ("M13", Some(Thirteenth)),
        ("maj11", Some(Eleventh)),
        ("M11", Some(Eleventh)),
        ("maj9", Some(Ninth)),
        ("M9", Some(Ninth)),
        ("maj7", None),
        ("M7", None),
        ("Δ", None),
    ] {
        if s.starts_with(pat) {
            set(
                chord,
                Quality::Major,
                Some(Seventh::Maj7),
                degree.map(|d| (d, ExtensionKind::Major)),
            );
            return Some(pat.len());
        }
    }
    if s.starts_with("maj") {
        set(chord, Quality::Major, None, None);
        return Some(3);
    }

    // Half-diminished (before m7/min7)
    for pat in ["m7b5", "min7b5", "-7b5", "ø7", "ø"] {
        if s.starts_with(pat) {
            set(chord, Quality::Minor, Some(Seventh::HalfDim), None);
            return Some(pat.len());
        }
    }

    // Diminished
    for (pat, seventh) in [
        ("dim7", Some(Seventh::Dim7)),
        ("°7", Some(Seventh::Dim7)),
        ("dim", None),
        ("°", None),
    ] {
        if s.starts_with(pat) {
            set(chord, Quality::Diminished, seventh, None);
            return Some(pat.len());
        }
    }

    // Augmented (before "+" alone)
    for (pat, seventh) in [
        ("augmaj7", Some(Seventh::Maj7)),
        ("aug7", Some(Seventh::Dom7)),
        ("+7", Some(Seventh::Dom7)),
        ("aug", None),
        ("+", None),
    ] {
        if s.starts_with(pat) {
            set(chord, Quality::Augmented, seventh, None);
            return Some(pat.len());
        }
    }

    // Minor spellings, tall first
    for (pat, degree) in [
        ("min13", Some(Thirteenth)),
        ("m13", Some(Thirteenth)),
        ("-13", Some(Thirteenth)),
        ("min11", Some(Eleventh)),
        ("m11", Some(Eleventh)),
        ("-11", Some(Eleventh)),
        ("min9", Some(Ninth)),
        ("m9", Some(Ninth)),
        ("-9", Some(Ninth)),
        ("min7", None),
        ("m7", None),
        ("-7", None),
    ] {
        if s.starts_with(pat) {
            set(
                chord,
                Quality::Minor,
                Some(Seventh::Min7),
                degree.map(|d| (d, ExtensionKind::Minor)),
            );
            return Some(pat.len());
        }
    }
    for pat in ["min6", "m6", "-6"] {
        if s.starts_with(pat) {
            set(chord, Quality::Minor, None, None);
            chord.added.push(6);
            return Some(pat.len());
        }
    }
    for pat in ["min", "m", "-"] {
        if s.starts_with(pat) {
            set(chord, Quality::Minor, None, None);
            return Some(pat.len());
        }
    }

    // Suspensions, with and without a dominant seventh
    for (pat, quality, seventh) in [
        ("7sus4", Quality::Sus4, Some(Seventh::Dom7)),
        ("7sus2", Quality::Sus2, Some(Seventh::Dom7)),
        ("sus4", Quality::Sus4, None),
        ("sus2", Quality::Sus2, None),
        ("sus", Quality::Sus4, None),
    ] {
        if s.starts_with(pat) {
            set(chord, quality, seventh, None);
            return Some(pat.len());
        }
    }

    // Dominant extensions and sevenths; lowercase roots keep their minor
    // reading (c9 = Cm9)
    for (pat, degree) in [
        ("13", Some(Thirteenth)),
        ("11", Some(Eleventh)),
        ("9", Some(Ninth)),
        ("7", None),
    ] {
        if s.starts_with(pat) {
            let (seventh, kind) = if chord.quality == Quality::Minor {
                (Seventh::Min7, ExtensionKind::Minor)
            } else {
                (Seventh::Dom7, ExtensionKind::Plain)
            };
            let quality = chord.quality;
            set(chord, quality, Some(seventh), degree.map(|d| (d, kind)));
            return Some(pat.len());
        }
    }

    if s.starts_with('6') {
        chord.added.push(6);
        return Some(1);
    }
    if s.starts_with('5') {
        set(chord, Quality::Power, None, None);
        return Some(1);
    }
    if s.starts_with('M') {
        set(chord, Quality::Major, None, None);
        return Some(1);
    }
    None
}

fn parse_add(
    chord: &mut Chord,
    s: &str,
    token: &str,
) -> Result<Option<usize>, ChordParseError> {
    let Some(rest) = s.strip_prefix("add") else {
        return Ok(None);
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let degree: u8 = digits.parse().map_err(|_| ChordParseError::UnknownQuality {
        token: token.to_string(),
        quality: s.to_string(),
    })?;
    if ![2, 4, 6, 9, 11, 13].contains(&degree) {
        return Err(ChordParseError::UnknownQuality {
            token: token.to_string(),
            quality: format!("add{degree}"),
        });
    }
    chord.added.push(degree);
    Ok(Some(3 + digits.len()))
}

fn parse_alteration(
    chord: &mut Chord,
    s: &str,
    _token: &str,
) -> Result<Option<usize>, ChordParseError> {
    let (direction, rest, sign_len) = if let Some(rest) = s.strip_prefix('b') {
        (AlterDirection::Flat, rest, 1)
    } else if let Some(rest) = s.strip_prefix('♭') {
        (AlterDirection::Flat, rest, "♭".len())
    } else if let Some(rest) = s.strip_prefix('#') {
        (AlterDirection::Sharp, rest, 1)
    } else if let Some(rest) = s.strip_prefix('♯') {
        (AlterDirection::Sharp, rest, "♯".len())
    } else {
        return Ok(None);
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Ok(None);
    }
    let degree: u8 = digits
        .parse()
        .map_err(|_| ChordParseError::BadAlteration(s.to_string()))?;
    if ![5, 9, 11, 13].contains(&degree) {
        return Err(ChordParseError::BadAlteration(format!(
            "{}{degree}",
            match direction {
                AlterDirection::Flat => "b",
                AlterDirection::Sharp => "#",
            }
        )));
    }
    chord.alterations.push(Alteration { degree, direction });
    Ok(Some(sign_len + digits.len()))
}

const ROMAN_NUMERALS: [(&str, u8); 7] = [
    ("III", 3),
    ("VII", 7),
    ("II", 2),
    ("IV", 4),
    ("VI", 6),
    ("I", 1),
    ("V", 5),
];

fn parse_roman_degree(s: &str) -> Option<(RomanDegree, &str)> {
    let (accidental, rest) = parse_accidental(s);
    for (upper, degree) in ROMAN_NUMERALS {
        let lower = upper.to_lowercase();
        let (uppercase, matched_len) = if rest.starts_with(upper) {
            (true, upper.len())
        } else if rest.starts_with(lower.as_str()) {
            (false, lower.len())
        } else {
            continue;
        };
        let mut rest = &rest[matched_len..];
        let mut diminished = false;
        if let Some(r) = rest.strip_prefix('°').or_else(|| rest.strip_prefix('o')) {
            diminished = true;
            rest = r;
        }
        return Some((
            RomanDegree {
                accidental,
                degree,
                uppercase,
                diminished,
            },
            rest,
        ));
    }
    None
}

/// Try reading the body as a roman-numeral chord. Returns `None` when it
/// is not roman-shaped at all, so the caller falls through to the note
/// root parser.
fn try_parse_roman(body: &str) -> Option<Result<RomanChord, ChordParseError>> {
    let (degree, mut rest) = parse_roman_degree(body)?;
    let seventh = if let Some(r) = rest.strip_prefix("maj7") {
        rest = r;
        Some(RomanSeventh::MajorSeventh)
    } else if let Some(r) = rest.strip_prefix('7') {
        rest = r;
        Some(RomanSeventh::Seventh)
    } else {
        None
    };
    let bass = if let Some(after) = rest.strip_prefix('/') {
        let (bass_degree, r) = parse_roman_degree(after)?;
        rest = r;
        Some(bass_degree)
    } else {
        None
    };
    if !rest.is_empty() {
        return None;
    }
    Some(Ok(RomanChord {
        degree,
        seventh,
        bass,
        beats: None,
    }))
}
