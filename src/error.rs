//! # Error Types
//!
//! This module defines all error types for the leadsheet engine.
//!
//! Parsing errors are data, not control flow: an unparseable chord token
//! stays in the document as an invalid marker carrying its
//! [`ChordParseError`], and the editor renders it gray without aborting
//! the parse. Only player lifecycle failures are surfaced as hard errors.
//!
//! ## Error Types
//! - `ChordParseError` - a single chord token could not be parsed
//! - `PlayerError` - the playback engine could not be started or reached
//!
//! ## Usage
//! ```rust
//! use leadsheet::{parse_chord, ChordParseError, Notation};
//!
//! match parse_chord("Hmaj7", Notation::American) {
//!     Ok(chord) => println!("parsed {chord:?}"),
//!     Err(ChordParseError::UnknownRoot(token)) => {
//!         eprintln!("'{token}' does not start with a note name");
//!     }
//!     Err(e) => eprintln!("invalid chord: {e}"),
//! }
//! ```

use thiserror::Error;

/// Why a chord token failed to parse.
///
/// Stored inside the parsed document so the editor can highlight the
/// offending token; never aborts parsing of the surrounding line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChordParseError {
    /// The token was empty (or became empty after the duration suffix).
    #[error("empty chord token")]
    EmptyToken,

    /// The token does not begin with a note name, solfege syllable, or
    /// roman numeral.
    #[error("no note name at the start of '{0}'")]
    UnknownRoot(String),

    /// The root parsed but the remaining quality text is not understood.
    ///
    /// # Example
    /// ```
    /// # use leadsheet::{parse_chord, ChordParseError, Notation};
    /// let err = parse_chord("Cxyz", Notation::American).unwrap_err();
    /// assert!(matches!(err, ChordParseError::UnknownQuality { .. }));
    /// ```
    #[error("unknown quality '{quality}' in '{token}'")]
    UnknownQuality { token: String, quality: String },

    /// An alteration names a degree that cannot be altered (only 5, 9,
    /// 11 and 13 can).
    #[error("bad alteration '{0}' (only b/# 5, 9, 11, 13 are allowed)")]
    BadAlteration(String),

    /// The `*beats` duration suffix is not a positive decimal.
    #[error("bad duration suffix '*{0}'")]
    BadDuration(String),

    /// The slash-chord bass note is not a valid note name.
    #[error("bad bass note in '{0}'")]
    BadBass(String),
}

/// Playback engine lifecycle errors.
///
/// These are the only errors the player reports as `Err`; everything
/// that happens during playback (a full event buffer, a skipped chord)
/// is recovered internally and logged.
#[derive(Error, Debug)]
pub enum PlayerError {
    /// The synthesizer backend could not be initialized. Playback is
    /// disabled for the session; the editor keeps working.
    #[error("synthesizer unavailable: {0}")]
    SynthUnavailable(String),

    /// A worker thread could not be spawned.
    #[error("player worker thread could not be started")]
    Spawn(#[source] std::io::Error),

    /// The scheduler thread has shut down and no longer accepts commands.
    #[error("player is shut down")]
    Disconnected,
}
