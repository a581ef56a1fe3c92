//! # Playback Module
//!
//! Turns a parsed song into sound: plan building, voicing, scheduling,
//! and the buffered handoff to the synthesizer.
//!
//! ## Pipeline
//! 1. [`build_plan`] resolves the song into a flat, loop-free program
//! 2. the [`Player`]'s scheduler thread walks the plan, voicing each
//!    chord through a [`Voicing`] engine with voice-leading
//! 3. note events flow through a bounded [`EventBuffer`] to the
//!    [`SynthSink`] on its own thread
//!
//! ## Sub-modules
//! - `plan` - plan building and resolved chords
//! - `voicing` - piano and guitar voicing engines
//! - `scheduler` - the worker thread, commands, and state snapshots
//! - `buffer` - bounded producer/consumer event queue
//! - `sink` - the synthesizer interface
//! - `interactor` - the editor-facing control facade
//!
//! ## Key Types
//! - [`Player`] - handle to the scheduler; send commands, get callbacks
//! - [`PlaybackController`] - parser + player glued for an editor
//! - [`StateSnapshot`] - immutable published state

mod buffer;
mod interactor;
mod plan;
mod scheduler;
mod sink;
mod voicing;

#[cfg(test)]
mod tests;

pub use buffer::EventBuffer;
pub use interactor::PlaybackController;
pub use plan::{
    build_plan, ContextChange, PlanContext, PlanStep, PlanWarning, PlaybackPlan, ResolvedChord,
};
pub use scheduler::{
    HighlightFn, Player, PlayerCallbacks, PlayerCommand, PlaybackStatus, StateFn, StateSnapshot,
};
pub use sink::{
    CollectingSink, NullSink, SinkEvent, SynthSink, PERCUSSION_CHANNEL, PITCHED_CHANNEL,
};
pub use voicing::{
    make_voicing, GuitarTuning, GuitarVoicing, PianoVoicing, VoicedChord, Voicing, VoicingKind,
};
