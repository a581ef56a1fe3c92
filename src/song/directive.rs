//! Directive parsing.
//!
//! Directives are `{name: value}` forms that change playback context
//! without producing sound: tempo, time signature, key, labels, loops.
//! Names are case-insensitive (`tempo` aliases `bpm`); label values stay
//! case-sensitive. Malformed or unknown directives are kept as
//! [`Directive::Invalid`] so the editor can mark them, but they carry no
//! semantics.

use serde::{Deserialize, Serialize};

use crate::chord::{Key, Notation};

/// Loop count when `{loop: name}` omits it.
pub const DEFAULT_LOOP_COUNT: u32 = 2;
/// Loop counts are clamped into this range.
pub const MAX_LOOP_COUNT: u32 = 100;

/// A tempo expression, evaluated when the directive is reached.
///
/// `Delta` moves the current tempo; `Percent`, `Multiplier`, and `Reset`
/// work from the initial tempo captured when playback started, so two
/// `{bpm: 50%}` in a row do not compound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempoExpr {
    Absolute(u16),
    Delta(i16),
    Percent(f64),
    Multiplier(f64),
    Reset,
}

impl TempoExpr {
    /// Resolve to a concrete BPM, never below 1.
    pub fn eval(&self, current: u16, initial: u16) -> u16 {
        let value = match *self {
            TempoExpr::Absolute(bpm) => bpm as i64,
            TempoExpr::Delta(delta) => current as i64 + delta as i64,
            TempoExpr::Percent(pct) => (initial as f64 * pct / 100.0).round() as i64,
            TempoExpr::Multiplier(factor) => (initial as f64 * factor).round() as i64,
            TempoExpr::Reset => initial as i64,
        };
        value.clamp(1, u16::MAX as i64) as u16
    }
}

/// Time signature: beats per bar over the beat unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats: u8,
    pub unit: u8,
}

impl TimeSignature {
    /// Parse `num/unit` within the supported ranges (1-16 beats, unit a
    /// power of two up to 16).
    pub fn parse(s: &str) -> Option<TimeSignature> {
        let (beats, unit) = s.trim().split_once('/')?;
        let beats: u8 = beats.trim().parse().ok()?;
        let unit: u8 = unit.trim().parse().ok()?;
        if (1..=16).contains(&beats) && [1, 2, 4, 8, 16].contains(&unit) {
            Some(TimeSignature { beats, unit })
        } else {
            None
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { beats: 4, unit: 4 }
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.beats, self.unit)
    }
}

/// A parsed `{name: value}` directive.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Tempo(TempoExpr),
    Time(TimeSignature),
    Key(Key),
    /// A named anchor for loops.
    Label(String),
    /// Jump back to a label (or `@start`) so the section plays `count`
    /// times in total.
    Loop { target: String, count: u32 },
    Capo(u8),
    Volume(u8),
    /// Unknown name or malformed value, kept for error display.
    Invalid { name: String, reason: String },
}

impl Directive {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Directive::Invalid { .. })
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// True for label names a loop may target: an identifier or the virtual
/// `@start` anchor.
pub fn is_loop_target(s: &str) -> bool {
    s == "@start" || is_identifier(s)
}

fn parse_tempo_value(value: &str) -> Option<TempoExpr> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("reset") || value.eq_ignore_ascii_case("original") {
        return Some(TempoExpr::Reset);
    }
    if let Some(pct) = value.strip_suffix('%') {
        let pct: f64 = pct.trim().parse().ok()?;
        return (pct.is_finite() && pct > 0.0).then_some(TempoExpr::Percent(pct));
    }
    if let Some(factor) = value.strip_suffix('x').or_else(|| value.strip_suffix('×')) {
        let factor: f64 = factor.trim().parse().ok()?;
        return (factor.is_finite() && factor > 0.0).then_some(TempoExpr::Multiplier(factor));
    }
    if value.starts_with('+') || value.starts_with('-') {
        let delta: i16 = value.parse().ok()?;
        return Some(TempoExpr::Delta(delta));
    }
    let bpm: u16 = value.parse().ok()?;
    (bpm > 0).then_some(TempoExpr::Absolute(bpm))
}

/// Parse one directive from its name and value. Unknown names and bad
/// values come back as [`Directive::Invalid`] rather than an error.
pub fn parse_directive(name: &str, value: &str, notation: Notation) -> Directive {
    let invalid = |reason: &str| Directive::Invalid {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let lowered = name.trim().to_ascii_lowercase();
    let value = value.trim();
    match lowered.as_str() {
        "bpm" | "tempo" => match parse_tempo_value(value) {
            Some(expr) => Directive::Tempo(expr),
            None => invalid("tempo takes a number, +n/-n, p%, mx, or reset"),
        },
        "time" => match TimeSignature::parse(value) {
            Some(ts) => Directive::Time(ts),
            None => invalid("time signature must be beats/unit, e.g. 4/4"),
        },
        "key" => match Key::parse(value, notation) {
            Some(key) => Directive::Key(key),
            None => invalid("not a key name"),
        },
        "label" => {
            if is_identifier(value) {
                Directive::Label(value.to_string())
            } else {
                invalid("label must be an identifier")
            }
        }
        "loop" => {
            let mut parts = value.split_whitespace();
            let Some(target) = parts.next() else {
                return invalid("loop needs a label name");
            };
            if !is_loop_target(target) {
                return invalid("loop target must be a label or @start");
            }
            let count = match parts.next() {
                None => DEFAULT_LOOP_COUNT,
                Some(raw) => match raw.parse::<u32>() {
                    Ok(n) => n.clamp(1, MAX_LOOP_COUNT),
                    Err(_) => return invalid("loop count must be a number"),
                },
            };
            if parts.next().is_some() {
                return invalid("loop takes a label and an optional count");
            }
            Directive::Loop {
                target: target.to_string(),
                count,
            }
        }
        "capo" => match value.parse::<u8>() {
            Ok(fret) if fret <= 12 => Directive::Capo(fret),
            _ => invalid("capo must be a fret number 0-12"),
        },
        "volume" => match value.parse::<u8>() {
            Ok(level) if level <= 127 => Directive::Volume(level),
            _ => invalid("volume must be 0-127"),
        },
        _ => invalid("unknown directive"),
    }
}
