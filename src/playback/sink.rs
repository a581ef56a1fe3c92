//! The synthesizer sink interface.
//!
//! The engine talks to audio through this narrow trait; the real backend
//! (FluidSynth, a MIDI port, anything) lives with the embedding
//! application. Implementations should be cheap to call or queue
//! internally: the scheduler submits events right before it starts a
//! step's sleep.

use std::sync::{Arc, Mutex};

/// Channel used for pitched playback.
pub const PITCHED_CHANNEL: u8 = 0;
/// Reserved for percussion/metronome use.
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Everything the engine needs from a synthesizer.
pub trait SynthSink: Send {
    /// Select the instrument program for a channel.
    fn program_select(&mut self, channel: u8, program: u8);
    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8);
    fn note_off(&mut self, channel: u8, pitch: u8);
    fn all_notes_off(&mut self, channel: u8);
}

/// One sink call, buffered between the scheduler and the sink thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    ProgramSelect { channel: u8, program: u8 },
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    AllNotesOff { channel: u8 },
}

impl SinkEvent {
    /// Whether back-pressure may drop this event. Releases are never
    /// dropped, otherwise notes stick.
    pub fn droppable(&self) -> bool {
        matches!(
            self,
            SinkEvent::NoteOn { .. } | SinkEvent::ProgramSelect { .. }
        )
    }

    /// Deliver this event to a sink.
    pub fn dispatch(&self, sink: &mut dyn SynthSink) {
        match *self {
            SinkEvent::ProgramSelect { channel, program } => sink.program_select(channel, program),
            SinkEvent::NoteOn {
                channel,
                pitch,
                velocity,
            } => sink.note_on(channel, pitch, velocity),
            SinkEvent::NoteOff { channel, pitch } => sink.note_off(channel, pitch),
            SinkEvent::AllNotesOff { channel } => sink.all_notes_off(channel),
        }
    }
}

/// A sink that discards everything. Useful headless.
pub struct NullSink;

impl SynthSink for NullSink {
    fn program_select(&mut self, _channel: u8, _program: u8) {}
    fn note_on(&mut self, _channel: u8, _pitch: u8, _velocity: u8) {}
    fn note_off(&mut self, _channel: u8, _pitch: u8) {}
    fn all_notes_off(&mut self, _channel: u8) {}
}

/// A sink that records every event, for tests and diagnostics.
#[derive(Clone, Default)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().expect("collector poisoned").clone()
    }

    /// Pitches currently on (note_on without a matching release) per the
    /// pitched channel.
    pub fn sounding(&self) -> Vec<u8> {
        let mut on: Vec<u8> = Vec::new();
        for event in self.events() {
            match event {
                SinkEvent::NoteOn {
                    channel: PITCHED_CHANNEL,
                    pitch,
                    ..
                } => on.push(pitch),
                SinkEvent::NoteOff {
                    channel: PITCHED_CHANNEL,
                    pitch,
                } => on.retain(|&p| p != pitch),
                SinkEvent::AllNotesOff {
                    channel: PITCHED_CHANNEL,
                } => on.clear(),
                _ => {}
            }
        }
        on
    }
}

impl SynthSink for CollectingSink {
    fn program_select(&mut self, channel: u8, program: u8) {
        self.events
            .lock()
            .expect("collector poisoned")
            .push(SinkEvent::ProgramSelect { channel, program });
    }

    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        self.events.lock().expect("collector poisoned").push(SinkEvent::NoteOn {
            channel,
            pitch,
            velocity,
        });
    }

    fn note_off(&mut self, channel: u8, pitch: u8) {
        self.events
            .lock()
            .expect("collector poisoned")
            .push(SinkEvent::NoteOff { channel, pitch });
    }

    fn all_notes_off(&mut self, channel: u8) {
        self.events
            .lock()
            .expect("collector poisoned")
            .push(SinkEvent::AllNotesOff { channel });
    }
}
