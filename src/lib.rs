//! # leadsheet
//!
//! A chord-sheet execution engine: parse a free-form lead sheet (chords,
//! lyrics, `{name: value}` directives, comments) and play it as a timed
//! stream of MIDI events through a pluggable synthesizer sink, with
//! voice-leading, labels and loops, and tight editor coordination.
//!
//! ## Pipeline
//! text -> [`parse_song`] -> [`SongProgram`] -> [`build_plan`] ->
//! [`PlaybackPlan`] -> scheduler thread -> [`SynthSink`]
//!
//! ## Example
//! ```rust
//! use leadsheet::{build_plan, parse_song, Notation, PlanContext, PlanStep};
//!
//! let text = "{bpm: 120}\n{label: verse}\nC  Am  F  G\n{loop: verse 2}";
//! let program = parse_song(text, Notation::American);
//! let plan = build_plan(&program, 0, &PlanContext::default());
//!
//! let chords: Vec<_> = plan
//!     .steps
//!     .iter()
//!     .filter_map(|step| match step {
//!         PlanStep::Play { chord, .. } => Some(chord.name.as_str()),
//!         _ => None,
//!     })
//!     .collect();
//! assert_eq!(chords, ["C", "Am", "F", "G", "C", "Am", "F", "G"]);
//! ```
//!
//! Playback runs on a dedicated scheduler thread behind [`Player`] (or
//! the editor-facing [`PlaybackController`]); the UI receives immutable
//! [`StateSnapshot`]s and highlight spans through callbacks and never
//! shares mutable state with the engine.

pub mod chord;
pub mod config;
pub mod error;
pub mod note;
pub mod playback;
pub mod song;

pub use chord::{
    convert_document, format_chord, identify_chord, parse_chord, resolve_roman, to_roman, Beats,
    Chord, ChordSymbol, Key, Mode, Notation, Quality, RomanChord, Seventh,
};
pub use config::{PlayerConfig, DEFAULT_BPM, MAX_BPM, MIN_BPM};
pub use error::{ChordParseError, PlayerError};
pub use note::{Accidental, Note, NoteName, MIDDLE_C};
pub use playback::{
    build_plan, CollectingSink, EventBuffer, NullSink, PlanContext, PlanStep, PlanWarning,
    PlaybackController, PlaybackPlan, PlaybackStatus, Player, PlayerCallbacks, PlayerCommand,
    ResolvedChord, SinkEvent, StateSnapshot, SynthSink, VoicedChord, Voicing, VoicingKind,
    PERCUSSION_CHANNEL, PITCHED_CHANNEL,
};
pub use song::{
    parse_song, ChordToken, Directive, DirectiveToken, Line, SongProgram, Span, TempoExpr,
    TimeSignature,
};
