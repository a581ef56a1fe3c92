//! Player configuration.
//!
//! A plain serializable record handed in at construction. Persisting it
//! to a settings file is the embedding application's job; unknown or
//! missing fields fall back to defaults so old config files keep
//! loading.

use serde::{Deserialize, Serialize};

use crate::chord::Notation;
use crate::playback::VoicingKind;
use crate::song::TimeSignature;

/// Lowest tempo the editor UI offers.
pub const MIN_BPM: u16 = 60;
/// Highest tempo the editor UI offers.
pub const MAX_BPM: u16 = 240;
/// Default tempo.
pub const DEFAULT_BPM: u16 = 120;

/// Everything the playback engine needs to know at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Tempo used until the song says otherwise; `{bpm: reset}` returns
    /// to the song's declared tempo.
    pub initial_bpm: u16,
    pub time_sig: TimeSignature,
    pub notation: Notation,
    pub voicing: VoicingKind,
    /// MIDI program: 0 is acoustic grand piano, 24-31 guitars.
    pub instrument_program: u8,
    /// Whether pausing releases sounding notes (resume re-attacks them).
    pub release_on_pause: bool,
    /// Capacity of the scheduler-to-sink event buffer.
    pub buffer_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            initial_bpm: DEFAULT_BPM,
            time_sig: TimeSignature::default(),
            notation: Notation::default(),
            voicing: VoicingKind::default(),
            instrument_program: 0,
            release_on_pause: true,
            buffer_capacity: 128,
        }
    }
}
