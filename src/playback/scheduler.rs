//! The playback scheduler.
//!
//! A dedicated worker thread owns all playback state and walks the
//! current [`PlaybackPlan`] step by step: voice the chord, release only
//! the tones that changed, fire the highlight callback, sleep the
//! step's duration at the tempo in effect when it began. Commands from
//! the UI arrive over a channel and are honored within the command poll
//! window even mid-sleep, so pause and stop feel immediate.
//!
//! The thread never shares its state; the UI sees immutable
//! [`StateSnapshot`] values through the `on_state_change` callback and
//! the playing span through `on_highlight`.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info};
use serde::Serialize;

use crate::chord::{Beats, Key};
use crate::config::PlayerConfig;
use crate::error::PlayerError;
use crate::song::{Span, TimeSignature};

use super::buffer::EventBuffer;
use super::plan::{ContextChange, PlanStep, PlaybackPlan, ResolvedChord};
use super::sink::{SinkEvent, SynthSink, PITCHED_CHANNEL};
use super::voicing::{make_voicing, VoicedChord, Voicing, VoicingKind};

/// Sleeps are sliced to this granularity so commands take effect fast.
const COMMAND_POLL: Duration = Duration::from_millis(10);

/// Commands accepted by the scheduler thread, processed in FIFO order.
pub enum PlayerCommand {
    /// Begin playing a plan from the given step index.
    Start {
        plan: PlaybackPlan,
        start_step: usize,
    },
    Pause,
    Resume,
    Stop,
    /// Click-to-play: one chord in the foreground, voice-led against the
    /// engine's previous voicing. Ignored while a song is playing.
    PlaySingle {
        chord: ResolvedChord,
        beats: Option<Beats>,
    },
    SetInitialTempo(u16),
    SetVoicing(VoicingKind),
    Shutdown,
}

/// The player state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

/// Immutable state published to the UI on every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub status: PlaybackStatus,
    pub bpm: u16,
    pub time_sig: TimeSignature,
    pub key: Option<Key>,
    pub chord_name: Option<String>,
    /// 1-based bar number, from beats accumulated since Start.
    pub bar: u32,
}

pub type HighlightFn = dyn Fn(Option<Span>) + Send;
pub type StateFn = dyn Fn(&StateSnapshot) + Send;

/// Callbacks the embedding editor registers. Both are invoked from the
/// scheduler thread; marshal to the UI thread on receipt.
#[derive(Default)]
pub struct PlayerCallbacks {
    pub on_highlight: Option<Box<HighlightFn>>,
    pub on_state_change: Option<Box<StateFn>>,
}

impl PlayerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn highlight(mut self, f: impl Fn(Option<Span>) + Send + 'static) -> Self {
        self.on_highlight = Some(Box::new(f));
        self
    }

    pub fn state_change(mut self, f: impl Fn(&StateSnapshot) + Send + 'static) -> Self {
        self.on_state_change = Some(Box::new(f));
        self
    }
}

/// Handle to the scheduler and sink threads. Dropping it shuts both
/// down, draining queued events first.
pub struct Player {
    commands: Sender<PlayerCommand>,
    buffer: Arc<EventBuffer>,
    scheduler: Option<JoinHandle<()>>,
    sink_thread: Option<JoinHandle<()>>,
}

impl Player {
    /// Spawn the scheduler and sink threads around a synth backend.
    pub fn spawn(
        sink: Box<dyn SynthSink>,
        config: &PlayerConfig,
        callbacks: PlayerCallbacks,
    ) -> Result<Player, PlayerError> {
        let buffer = Arc::new(EventBuffer::new(config.buffer_capacity));
        let (commands, rx) = unbounded();

        let sink_buffer = Arc::clone(&buffer);
        let sink_thread = thread::Builder::new()
            .name("leadsheet-sink".to_string())
            .spawn(move || {
                let mut sink = sink;
                while let Some(event) = sink_buffer.pop() {
                    event.dispatch(sink.as_mut());
                }
            })
            .map_err(PlayerError::Spawn)?;

        let worker = Scheduler::new(rx, Arc::clone(&buffer), callbacks, config);
        let scheduler = thread::Builder::new()
            .name("leadsheet-scheduler".to_string())
            .spawn(move || worker.run())
            .map_err(PlayerError::Spawn)?;

        Ok(Player {
            commands,
            buffer,
            scheduler: Some(scheduler),
            sink_thread: Some(sink_thread),
        })
    }

    fn send(&self, command: PlayerCommand) -> Result<(), PlayerError> {
        self.commands
            .send(command)
            .map_err(|_| PlayerError::Disconnected)
    }

    pub fn start(&self, plan: PlaybackPlan) -> Result<(), PlayerError> {
        self.send(PlayerCommand::Start {
            plan,
            start_step: 0,
        })
    }

    pub fn start_at(&self, plan: PlaybackPlan, start_step: usize) -> Result<(), PlayerError> {
        self.send(PlayerCommand::Start { plan, start_step })
    }

    pub fn pause(&self) -> Result<(), PlayerError> {
        self.send(PlayerCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), PlayerError> {
        self.send(PlayerCommand::Resume)
    }

    pub fn stop(&self) -> Result<(), PlayerError> {
        self.send(PlayerCommand::Stop)
    }

    pub fn play_single(
        &self,
        chord: ResolvedChord,
        beats: Option<Beats>,
    ) -> Result<(), PlayerError> {
        self.send(PlayerCommand::PlaySingle { chord, beats })
    }

    pub fn set_initial_tempo(&self, bpm: u16) -> Result<(), PlayerError> {
        self.send(PlayerCommand::SetInitialTempo(bpm))
    }

    pub fn set_voicing(&self, kind: VoicingKind) -> Result<(), PlayerError> {
        self.send(PlayerCommand::SetVoicing(kind))
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let _ = self.commands.send(PlayerCommand::Shutdown);
        if let Some(handle) = self.scheduler.take() {
            let _ = handle.join();
        }
        self.buffer.close();
        if let Some(handle) = self.sink_thread.take() {
            let _ = handle.join();
        }
    }
}

fn beats_to_f64(beats: Beats) -> f64 {
    *beats.numer() as f64 / *beats.denom() as f64
}

/// Work left over from a paused step.
struct ResumeState {
    remaining_beats: f64,
    voiced: VoicedChord,
}

enum SleepOutcome {
    Completed,
    /// Paused mid-step with this much left.
    Interrupted { remaining_beats: f64 },
    /// Stopped, restarted, or shutting down; the step is abandoned.
    Aborted,
}

struct Scheduler {
    rx: Receiver<PlayerCommand>,
    buffer: Arc<EventBuffer>,
    callbacks: PlayerCallbacks,
    voicing: Box<dyn Voicing>,
    status: PlaybackStatus,
    plan: Option<PlaybackPlan>,
    cursor: usize,
    /// Incremented by Start so an in-flight sleep knows to bail.
    generation: u64,
    initial_tempo: u16,
    tempo: u16,
    time_sig: TimeSignature,
    key: Option<Key>,
    /// Master velocity scale, 127 = as voiced.
    volume: u8,
    program: u8,
    release_on_pause: bool,
    /// Sounding pitches, ascending.
    active: Vec<u8>,
    current_chord_name: Option<String>,
    accumulated_beats: f64,
    resume: Option<ResumeState>,
    running: bool,
}

impl Scheduler {
    fn new(
        rx: Receiver<PlayerCommand>,
        buffer: Arc<EventBuffer>,
        callbacks: PlayerCallbacks,
        config: &PlayerConfig,
    ) -> Self {
        Self {
            rx,
            buffer,
            callbacks,
            voicing: make_voicing(&config.voicing),
            status: PlaybackStatus::Stopped,
            plan: None,
            cursor: 0,
            generation: 0,
            initial_tempo: config.initial_bpm,
            tempo: config.initial_bpm,
            time_sig: config.time_sig,
            key: None,
            volume: 127,
            program: config.instrument_program,
            release_on_pause: config.release_on_pause,
            active: Vec::new(),
            current_chord_name: None,
            accumulated_beats: 0.0,
            resume: None,
            running: true,
        }
    }

    fn run(mut self) {
        self.emit(SinkEvent::ProgramSelect {
            channel: PITCHED_CHANNEL,
            program: self.program,
        });
        self.publish();
        while self.running {
            if self.status == PlaybackStatus::Playing {
                // Commands queued during the last step go first
                while let Ok(command) = self.rx.try_recv() {
                    self.handle(command);
                    if !self.running || self.status != PlaybackStatus::Playing {
                        break;
                    }
                }
                if self.running && self.status == PlaybackStatus::Playing {
                    self.advance();
                }
            } else {
                match self.rx.recv() {
                    Ok(command) => self.handle(command),
                    Err(_) => break,
                }
            }
        }
        if !self.active.is_empty() || self.status != PlaybackStatus::Stopped {
            self.release_all();
        }
    }

    fn handle(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::Start { plan, start_step } => self.start(plan, start_step),
            PlayerCommand::Pause => self.pause(),
            PlayerCommand::Resume => self.resume_playback(),
            PlayerCommand::Stop => self.stop(),
            PlayerCommand::PlaySingle { chord, beats } => self.play_single(chord, beats),
            PlayerCommand::SetInitialTempo(bpm) => {
                self.initial_tempo = bpm.max(1);
                if self.status == PlaybackStatus::Stopped {
                    self.tempo = self.initial_tempo;
                }
                self.publish();
            }
            PlayerCommand::SetVoicing(kind) => {
                self.voicing = make_voicing(&kind);
            }
            PlayerCommand::Shutdown => {
                self.running = false;
            }
        }
    }

    fn start(&mut self, plan: PlaybackPlan, start_step: usize) {
        self.release_active();
        self.voicing.reset();
        self.generation += 1;
        self.initial_tempo = plan.initial.tempo_bpm;
        self.tempo = plan.initial.tempo_bpm;
        self.time_sig = plan.initial.time_sig;
        self.key = plan.initial.key;
        self.cursor = start_step.min(plan.steps.len());
        self.accumulated_beats = 0.0;
        self.resume = None;
        self.current_chord_name = None;
        self.plan = Some(plan);
        self.status = PlaybackStatus::Playing;
        info!("playback started at step {} ({} bpm)", self.cursor, self.tempo);
        self.publish();
    }

    fn pause(&mut self) {
        if self.status != PlaybackStatus::Playing {
            return;
        }
        self.status = PlaybackStatus::Paused;
        if self.release_on_pause {
            self.release_active();
        }
        info!("playback paused");
        self.publish();
    }

    fn resume_playback(&mut self) {
        if self.status != PlaybackStatus::Paused {
            return;
        }
        self.status = PlaybackStatus::Playing;
        info!("playback resumed");
        self.publish();
    }

    fn stop(&mut self) {
        info!("playback stopped");
        self.enter_stopped();
    }

    fn finish(&mut self) {
        info!("playback finished");
        self.enter_stopped();
    }

    fn enter_stopped(&mut self) {
        self.release_all();
        self.status = PlaybackStatus::Stopped;
        self.cursor = 0;
        self.resume = None;
        self.accumulated_beats = 0.0;
        self.current_chord_name = None;
        self.highlight(None);
        self.publish();
    }

    /// Execute one plan step (or the remainder of a paused one).
    fn advance(&mut self) {
        if let Some(resume) = self.resume.take() {
            // Re-attack the interrupted step's voicing if pause released it
            if self.active.is_empty() && !resume.voiced.is_silent() {
                for (pitch, velocity) in resume.voiced.notes() {
                    self.emit_note_on(pitch, velocity);
                }
                self.active = resume.voiced.pitches.clone();
            }
            match self.sleep_beats(resume.remaining_beats) {
                SleepOutcome::Completed => self.cursor += 1,
                SleepOutcome::Interrupted { remaining_beats } => {
                    self.resume = Some(ResumeState {
                        remaining_beats,
                        voiced: resume.voiced,
                    });
                }
                SleepOutcome::Aborted => {}
            }
            return;
        }

        let step = self
            .plan
            .as_ref()
            .and_then(|plan| plan.steps.get(self.cursor).cloned());
        match step {
            None => {
                if self.plan.is_some() {
                    self.finish();
                } else {
                    self.status = PlaybackStatus::Stopped;
                    self.publish();
                }
            }
            Some(PlanStep::Context(change)) => {
                self.apply_context(&change);
                self.cursor += 1;
            }
            Some(PlanStep::Play { chord, beats, span }) => {
                let voiced = self.voicing.voice(&chord);
                self.transition_to(&voiced);
                self.current_chord_name = Some(chord.name.clone());
                self.highlight(Some(span));
                self.publish();
                let duration = beats_to_f64(beats);
                self.accumulated_beats += duration;
                match self.sleep_beats(duration) {
                    SleepOutcome::Completed => self.cursor += 1,
                    SleepOutcome::Interrupted { remaining_beats } => {
                        self.resume = Some(ResumeState {
                            remaining_beats,
                            voiced,
                        });
                    }
                    SleepOutcome::Aborted => {}
                }
            }
        }
    }

    fn apply_context(&mut self, change: &ContextChange) {
        if let Some(bpm) = change.tempo_bpm {
            debug!("tempo change: {} -> {bpm}", self.tempo);
            self.tempo = bpm;
        }
        if let Some(time_sig) = change.time_sig {
            self.time_sig = time_sig;
        }
        if let Some(key) = change.key {
            self.key = key;
        }
        if let Some(volume) = change.volume {
            self.volume = volume;
        }
        if let Some(capo) = change.capo {
            self.voicing.set_capo(capo);
        }
        self.publish();
    }

    /// Release only the sounding pitches the new voicing drops, then
    /// attack only the new ones. Common tones keep ringing.
    fn transition_to(&mut self, voiced: &VoicedChord) {
        let stale: Vec<u8> = self
            .active
            .iter()
            .copied()
            .filter(|pitch| !voiced.pitches.contains(pitch))
            .collect();
        for pitch in stale {
            self.emit(SinkEvent::NoteOff {
                channel: PITCHED_CHANNEL,
                pitch,
            });
        }
        for (pitch, velocity) in voiced.notes() {
            if !self.active.contains(&pitch) {
                self.emit_note_on(pitch, velocity);
            }
        }
        self.active = voiced.pitches.clone();
    }

    /// Click-to-play, honored when stopped or paused.
    fn play_single(&mut self, chord: ResolvedChord, beats: Option<Beats>) {
        if self.status == PlaybackStatus::Playing {
            debug!("ignoring click-to-play during playback");
            return;
        }
        let voiced = self.voicing.voice(&chord);
        self.transition_to(&voiced);
        self.current_chord_name = Some(chord.name.clone());
        self.publish();
        let duration = beats
            .map(beats_to_f64)
            .unwrap_or(self.time_sig.beats as f64);
        if matches!(self.sleep_beats(duration), SleepOutcome::Aborted) {
            return;
        }
        self.release_active();
        self.current_chord_name = None;
        self.publish();
    }

    /// Sleep for `beats` at the tempo in effect now, in command-poll
    /// slices so pause/stop interrupt within the poll window.
    fn sleep_beats(&mut self, beats: f64) -> SleepOutcome {
        let tempo = self.tempo.max(1);
        let seconds = beats * 60.0 / tempo as f64;
        let generation = self.generation;
        let entry_status = self.status;
        let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
        loop {
            let now = Instant::now();
            if now >= deadline {
                return SleepOutcome::Completed;
            }
            let slice = (deadline - now).min(COMMAND_POLL);
            match self.rx.recv_timeout(slice) {
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.running = false;
                    return SleepOutcome::Aborted;
                }
                Ok(command) => {
                    self.handle(command);
                    if !self.running || self.generation != generation {
                        return SleepOutcome::Aborted;
                    }
                    if self.status == entry_status {
                        continue;
                    }
                    match self.status {
                        PlaybackStatus::Playing => continue,
                        PlaybackStatus::Paused => {
                            let left = deadline.saturating_duration_since(Instant::now());
                            return SleepOutcome::Interrupted {
                                remaining_beats: left.as_secs_f64() * tempo as f64 / 60.0,
                            };
                        }
                        PlaybackStatus::Stopped => return SleepOutcome::Aborted,
                    }
                }
            }
        }
    }

    fn release_active(&mut self) {
        let pitches = std::mem::take(&mut self.active);
        for pitch in pitches {
            self.emit(SinkEvent::NoteOff {
                channel: PITCHED_CHANNEL,
                pitch,
            });
        }
    }

    fn release_all(&mut self) {
        self.release_active();
        self.emit(SinkEvent::AllNotesOff {
            channel: PITCHED_CHANNEL,
        });
    }

    fn emit_note_on(&mut self, pitch: u8, velocity: u8) {
        let scaled = ((velocity as u16 * self.volume as u16) / 127).max(1) as u8;
        self.emit(SinkEvent::NoteOn {
            channel: PITCHED_CHANNEL,
            pitch,
            velocity: scaled,
        });
    }

    fn emit(&mut self, event: SinkEvent) {
        if !self.buffer.push(event) {
            debug!("event not delivered: {event:?}");
        }
    }

    fn highlight(&self, span: Option<Span>) {
        if let Some(callback) = &self.callbacks.on_highlight {
            callback(span);
        }
    }

    fn publish(&self) {
        if let Some(callback) = &self.callbacks.on_state_change {
            let bar = (self.accumulated_beats / self.time_sig.beats.max(1) as f64) as u32 + 1;
            callback(&StateSnapshot {
                status: self.status,
                bpm: self.tempo,
                time_sig: self.time_sig,
                key: self.key,
                chord_name: self.current_chord_name.clone(),
                bar,
            });
        }
    }
}
