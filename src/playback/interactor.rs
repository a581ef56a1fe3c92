//! Editor-facing playback control.
//!
//! [`PlaybackController`] is the facade an editor embeds: it owns the
//! parsed program and the player handle, and turns editor gestures
//! (play, play from cursor, click a chord) into scheduler commands. The
//! program is rebuilt on every text change and cloned into the plan at
//! start, so edits never disturb an in-flight playback.

use log::{debug, warn};

use crate::chord::{Key, Notation};
use crate::config::{PlayerConfig, MAX_BPM, MIN_BPM};
use crate::error::PlayerError;
use crate::song::{parse_song, Directive, Line, SongProgram};

use super::plan::{build_plan, PlanContext, ResolvedChord};
use super::scheduler::{Player, PlayerCallbacks};
use super::sink::SynthSink;
use super::voicing::VoicingKind;

/// High-level control surface over the parser and the player.
pub struct PlaybackController {
    player: Player,
    config: PlayerConfig,
    text: String,
    program: SongProgram,
}

impl PlaybackController {
    /// Build a controller around a synth backend.
    pub fn new(
        sink: Box<dyn SynthSink>,
        config: PlayerConfig,
        callbacks: PlayerCallbacks,
    ) -> Result<Self, PlayerError> {
        let player = Player::spawn(sink, &config, callbacks)?;
        Ok(Self {
            player,
            config,
            text: String::new(),
            program: SongProgram::default(),
        })
    }

    /// Replace the document text and reparse it.
    pub fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        self.program = parse_song(text, self.config.notation);
    }

    /// The parsed program, for syntax highlighting.
    pub fn program(&self) -> &SongProgram {
        &self.program
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    fn base_context(&self) -> PlanContext {
        PlanContext {
            tempo_bpm: self.config.initial_bpm,
            time_sig: self.config.time_sig,
            key: None,
        }
    }

    /// Play the whole document from the top.
    pub fn start(&self) -> Result<(), PlayerError> {
        self.start_from(0)
    }

    /// Play from the given line. Directives above it still apply.
    pub fn start_from(&self, line: usize) -> Result<(), PlayerError> {
        let plan = build_plan(&self.program, line, &self.base_context());
        for warning in &plan.warnings {
            warn!("plan warning: {warning:?}");
        }
        if plan.is_empty() {
            debug!("nothing to play from line {line}");
        }
        self.player.start(plan)
    }

    pub fn pause(&self) -> Result<(), PlayerError> {
        self.player.pause()
    }

    pub fn resume(&self) -> Result<(), PlayerError> {
        self.player.resume()
    }

    pub fn stop(&self) -> Result<(), PlayerError> {
        self.player.stop()
    }

    /// Click-to-play: sound the chord under the given document position.
    /// Returns `Ok(false)` when no valid chord sits there.
    pub fn play_chord_at(&self, line: usize, byte: usize) -> Result<bool, PlayerError> {
        let Some(token) = self.program.token_at(line, byte) else {
            return Ok(false);
        };
        let Some(symbol) = token.symbol() else {
            debug!("clicked chord '{}' is invalid", token.text);
            return Ok(false);
        };
        let key = self.key_in_effect(line);
        let resolved = ResolvedChord::from_symbol(symbol, key.as_ref());
        self.player.play_single(resolved, symbol.beats())?;
        Ok(true)
    }

    /// The key the last `{key: ...}` directive above this line set.
    fn key_in_effect(&self, line: usize) -> Option<Key> {
        let mut key = None;
        for candidate in self.program.lines.iter().take(line) {
            if let Line::Directives { items } = candidate {
                for item in items {
                    if let Directive::Key(k) = &item.directive {
                        key = Some(*k);
                    }
                }
            }
        }
        key
    }

    /// Change the startup tempo, clamped to the editor's range.
    pub fn set_initial_tempo(&mut self, bpm: u16) -> Result<(), PlayerError> {
        self.config.initial_bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        self.player.set_initial_tempo(self.config.initial_bpm)
    }

    /// Switch between piano and guitar voicings.
    pub fn set_voicing(&mut self, kind: VoicingKind) -> Result<(), PlayerError> {
        self.config.voicing = kind.clone();
        self.player.set_voicing(kind)
    }

    /// Change the active notation and reparse the document under it.
    pub fn set_notation(&mut self, notation: Notation) {
        self.config.notation = notation;
        self.program = parse_song(&self.text, notation);
    }

    /// Rewrite the document's chords into another notation and adopt it.
    pub fn convert_notation(&mut self, to: Notation) -> String {
        let converted =
            crate::chord::convert_document(&self.text, self.config.notation, to);
        self.config.notation = to;
        self.set_text_keeping_notation(converted)
    }

    fn set_text_keeping_notation(&mut self, text: String) -> String {
        self.program = parse_song(&text, self.config.notation);
        self.text = text.clone();
        text
    }
}
