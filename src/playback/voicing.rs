//! Chord voicing with voice-leading.
//!
//! A voicing engine turns a [`ResolvedChord`] into concrete pitches.
//! Engines are stateful: each keeps the previously voiced chord and
//! leads the next one toward it, so a progression moves by small steps
//! instead of jumping between root positions. Rests leave the state
//! untouched, which keeps voice-leading continuous across silence.

use serde::{Deserialize, Serialize};

use super::plan::ResolvedChord;

/// Velocity of the piano bass note.
const PIANO_BASS_VELOCITY: u8 = 110;
/// Velocity of piano chord tones.
const PIANO_TONE_VELOCITY: u8 = 90;
/// Guitar strings all strike at the same velocity.
const GUITAR_VELOCITY: u8 = 95;

/// Octave the piano bass lands in (C2 = MIDI 36).
const PIANO_BASS_OCTAVE: i8 = 2;
/// Octave the piano stacks the first chord from.
const PIANO_CHORD_OCTAVE: i8 = 4;

/// A voiced chord: concrete pitches, velocities, and which pitch is the
/// bass. `pitches` is ascending and parallel to `velocities`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoicedChord {
    pub bass: Option<u8>,
    pub pitches: Vec<u8>,
    pub velocities: Vec<u8>,
}

impl VoicedChord {
    pub fn silence() -> Self {
        Self::default()
    }

    pub fn is_silent(&self) -> bool {
        self.pitches.is_empty()
    }

    /// Pitch/velocity pairs, bass first.
    pub fn notes(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.pitches.iter().copied().zip(self.velocities.iter().copied())
    }
}

/// Which voicing engine to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum VoicingKind {
    Piano,
    Guitar {
        /// Tuning name: `standard`, `drop_d`, `dadgad`, or `open_g`.
        tuning: String,
    },
}

impl Default for VoicingKind {
    fn default() -> Self {
        VoicingKind::Piano
    }
}

/// A stateful chord-to-pitches engine.
pub trait Voicing: Send {
    /// Voice a chord against the previously voiced one.
    fn voice(&mut self, chord: &ResolvedChord) -> VoicedChord;

    /// Forget the previous voicing (new playback session).
    fn reset(&mut self);

    /// Move every fretted/played pitch up by a capo offset, where the
    /// engine supports one. Default is a no-op.
    fn set_capo(&mut self, _fret: u8) {}
}

/// Build an engine from its configured kind.
pub fn make_voicing(kind: &VoicingKind) -> Box<dyn Voicing> {
    match kind {
        VoicingKind::Piano => Box::new(PianoVoicing::new()),
        VoicingKind::Guitar { tuning } => {
            Box::new(GuitarVoicing::new(GuitarTuning::by_name(tuning)))
        }
    }
}

/// Piano voicing: bass in octave 2, chord tones stacked near octave 4,
/// each tone led to the octave closest to the previous chord.
pub struct PianoVoicing {
    previous: Option<Vec<u8>>,
}

impl PianoVoicing {
    pub fn new() -> Self {
        Self { previous: None }
    }

    fn stack_initial(&self, classes: &[u8]) -> Vec<u8> {
        let mut pitches = Vec::with_capacity(classes.len());
        let base = (PIANO_CHORD_OCTAVE as u16 + 1) * 12;
        let mut current = base as i16 + classes[0] as i16;
        pitches.push(current as u8);
        for &pc in &classes[1..] {
            let mut candidate = (current / 12) * 12 + pc as i16;
            while candidate <= current {
                candidate += 12;
            }
            current = candidate;
            pitches.push(current as u8);
        }
        pitches
    }

    fn lead_toward(&self, classes: &[u8], previous: &[u8]) -> Vec<u8> {
        let mut pitches: Vec<u8> = classes
            .iter()
            .map(|&pc| {
                let mut best = None;
                for octave in 3..=5i16 {
                    let candidate = (octave + 1) * 12 + pc as i16;
                    let distance = previous
                        .iter()
                        .map(|&p| (candidate - p as i16).abs())
                        .min()
                        .unwrap_or(0);
                    // Strictly-less keeps ties on the lower octave
                    match best {
                        Some((_, best_distance)) if distance >= best_distance => {}
                        _ => best = Some((candidate as u8, distance)),
                    }
                }
                best.map(|(pitch, _)| pitch).unwrap_or(pc + 60)
            })
            .collect();
        pitches.sort_unstable();
        pitches.dedup();
        pitches
    }
}

impl Default for PianoVoicing {
    fn default() -> Self {
        Self::new()
    }
}

impl Voicing for PianoVoicing {
    fn voice(&mut self, chord: &ResolvedChord) -> VoicedChord {
        if chord.is_rest || chord.pitch_classes.is_empty() {
            return VoicedChord::silence();
        }
        let tones = match &self.previous {
            Some(previous) => self.lead_toward(&chord.pitch_classes, previous),
            None => self.stack_initial(&chord.pitch_classes),
        };
        self.previous = Some(tones.clone());

        let bass_class = chord
            .bass
            .or(chord.root)
            .map(|note| note.pitch_class())
            .unwrap_or(chord.pitch_classes[0]);
        let bass = (PIANO_BASS_OCTAVE as u16 + 1) as u8 * 12 + bass_class;

        let mut pitches = Vec::with_capacity(tones.len() + 1);
        let mut velocities = Vec::with_capacity(tones.len() + 1);
        pitches.push(bass);
        velocities.push(PIANO_BASS_VELOCITY);
        for tone in tones {
            pitches.push(tone);
            velocities.push(PIANO_TONE_VELOCITY);
        }
        VoicedChord {
            bass: Some(bass),
            pitches,
            velocities,
        }
    }

    fn reset(&mut self) {
        self.previous = None;
    }
}

/// A six-string tuning, low string first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuitarTuning {
    pub name: &'static str,
    pub open: [u8; 6],
}

impl GuitarTuning {
    /// Standard tuning E2 A2 D3 G3 B3 E4.
    pub fn standard() -> Self {
        Self {
            name: "standard",
            open: [40, 45, 50, 55, 59, 64],
        }
    }

    pub fn drop_d() -> Self {
        Self {
            name: "drop_d",
            open: [38, 45, 50, 55, 59, 64],
        }
    }

    pub fn dadgad() -> Self {
        Self {
            name: "dadgad",
            open: [38, 45, 50, 55, 57, 62],
        }
    }

    pub fn open_g() -> Self {
        Self {
            name: "open_g",
            open: [38, 43, 50, 55, 59, 62],
        }
    }

    /// Look up a tuning by name, falling back to standard.
    pub fn by_name(name: &str) -> Self {
        match name {
            "drop_d" => Self::drop_d(),
            "dadgad" => Self::dadgad(),
            "open_g" => Self::open_g(),
            _ => Self::standard(),
        }
    }
}

const MAX_FRET: i8 = 12;
/// A fretted shape may span at most this many frets.
const FRET_SPAN: i8 = 4;
const MUTED: i8 = -1;

/// Guitar voicing: pick a fret (or mute) per string so the sounding
/// pitches cover the chord, prefer the bass class lowest, and move as
/// little as possible from the previous shape.
pub struct GuitarVoicing {
    tuning: GuitarTuning,
    capo: u8,
    previous: Option<Vec<u8>>,
}

impl GuitarVoicing {
    pub fn new(tuning: GuitarTuning) -> Self {
        Self {
            tuning,
            capo: 0,
            previous: None,
        }
    }

    fn string_pitch(&self, string: usize, fret: i8) -> u8 {
        self.tuning.open[string] + self.capo + fret as u8
    }

    fn fingering_pitches(&self, fingering: &[i8; 6]) -> Vec<u8> {
        let mut pitches: Vec<u8> = fingering
            .iter()
            .enumerate()
            .filter(|(_, &fret)| fret >= 0)
            .map(|(string, &fret)| self.string_pitch(string, fret))
            .collect();
        pitches.sort_unstable();
        pitches
    }

    /// Candidate fingerings around each neck position whose sounding
    /// pitch classes are exactly the chord (the bass class may join in).
    fn candidates(&self, classes: &[u8], bass_class: u8) -> Vec<[i8; 6]> {
        let mut wanted = [false; 12];
        for &pc in classes {
            wanted[pc as usize] = true;
        }
        let mut allowed = wanted;
        allowed[bass_class as usize] = true;

        let mut found: Vec<[i8; 6]> = Vec::new();
        for position in 0..=(MAX_FRET - FRET_SPAN + 1) {
            let mut per_string: [Vec<i8>; 6] = Default::default();
            for string in 0..6 {
                let mut options = vec![MUTED];
                for fret in (0..=MAX_FRET).filter(|&f| {
                    f == 0 || (f >= position.max(1) && f < position.max(1) + FRET_SPAN)
                }) {
                    let pc = (self.string_pitch(string, fret) % 12) as usize;
                    if allowed[pc] {
                        options.push(fret);
                    }
                    if options.len() >= 4 {
                        break;
                    }
                }
                per_string[string] = options;
            }
            let mut fingering = [MUTED; 6];
            self.combine_from(0, &per_string, &wanted, &mut fingering, &mut found);
            if found.len() >= 200 {
                break;
            }
        }
        found
    }

    fn combine_from(
        &self,
        string: usize,
        per_string: &[Vec<i8>; 6],
        wanted: &[bool; 12],
        fingering: &mut [i8; 6],
        found: &mut Vec<[i8; 6]>,
    ) {
        if found.len() >= 200 {
            return;
        }
        if string == 6 {
            if self.verify(fingering, wanted) {
                found.push(*fingering);
            }
            return;
        }
        for &fret in &per_string[string] {
            fingering[string] = fret;
            self.combine_from(string + 1, per_string, wanted, fingering, found);
        }
        fingering[string] = MUTED;
    }

    /// A fingering is kept when it sounds every wanted class, nothing
    /// foreign, and stays within the fret span.
    fn verify(&self, fingering: &[i8; 6], wanted: &[bool; 12]) -> bool {
        let mut sounded = [false; 12];
        let mut any = false;
        for (string, &fret) in fingering.iter().enumerate() {
            if fret < 0 {
                continue;
            }
            any = true;
            sounded[(self.string_pitch(string, fret) % 12) as usize] = true;
        }
        if !any {
            return false;
        }
        for pc in 0..12 {
            if wanted[pc] && !sounded[pc] {
                return false;
            }
        }
        let fretted: Vec<i8> = fingering.iter().copied().filter(|&f| f > 0).collect();
        if let (Some(&min), Some(&max)) = (fretted.iter().min(), fretted.iter().max()) {
            if max - min > FRET_SPAN - 1 {
                return false;
            }
        }
        true
    }

    /// Score a first-chord fingering: low, open, and bass-correct wins.
    fn score_initial(&self, fingering: &[i8; 6], bass_class: u8) -> f32 {
        let fretted: Vec<i8> = fingering.iter().copied().filter(|&f| f > 0).collect();
        let mut score = 0.0f32;
        if !fretted.is_empty() {
            let avg = fretted.iter().map(|&f| f as f32).sum::<f32>() / fretted.len() as f32;
            score += avg * 2.0;
            let stretch = fretted.iter().max().unwrap() - fretted.iter().min().unwrap();
            score += stretch as f32 * 3.0;
        }
        score -= fingering.iter().filter(|&&f| f == 0).count() as f32 * 2.0;
        score += fingering.iter().filter(|&&f| f < 0).count() as f32 * 1.5;
        score += self.bass_penalty(fingering, bass_class, 10.0);
        score
    }

    /// Score a transition: summed semitone motion from the previous
    /// shape, still preferring the right bass.
    fn score_transition(&self, fingering: &[i8; 6], previous: &[u8], bass_class: u8) -> f32 {
        let pitches = self.fingering_pitches(fingering);
        let mut score = 0.0f32;
        for &pitch in &pitches {
            let nearest = previous
                .iter()
                .map(|&p| (pitch as i16 - p as i16).abs())
                .min()
                .unwrap_or(0);
            score += nearest as f32;
        }
        for &prev in previous {
            let nearest = pitches
                .iter()
                .map(|&p| (prev as i16 - p as i16).abs())
                .min()
                .unwrap_or(0);
            score += nearest as f32;
        }
        score += self.bass_penalty(fingering, bass_class, 6.0);
        score
    }

    fn bass_penalty(&self, fingering: &[i8; 6], bass_class: u8, weight: f32) -> f32 {
        let lowest = fingering
            .iter()
            .enumerate()
            .filter(|(_, &fret)| fret >= 0)
            .map(|(string, &fret)| self.string_pitch(string, fret))
            .min();
        match lowest {
            Some(pitch) if pitch % 12 == bass_class => -weight,
            Some(_) => weight * 0.5,
            None => weight,
        }
    }

    /// Last resort: sound the bass class alone on the lowest string that
    /// has it within reach.
    fn fallback(&self, bass_class: u8) -> Option<[i8; 6]> {
        for string in 0..3 {
            for fret in 0..=MAX_FRET {
                if self.string_pitch(string, fret) % 12 == bass_class {
                    let mut fingering = [MUTED; 6];
                    fingering[string] = fret;
                    return Some(fingering);
                }
            }
        }
        None
    }
}

impl Voicing for GuitarVoicing {
    fn voice(&mut self, chord: &ResolvedChord) -> VoicedChord {
        if chord.is_rest || chord.pitch_classes.is_empty() {
            return VoicedChord::silence();
        }
        let bass_class = chord
            .bass
            .or(chord.root)
            .map(|note| note.pitch_class())
            .unwrap_or(chord.pitch_classes[0]);

        let candidates = self.candidates(&chord.pitch_classes, bass_class);
        let best = match (&self.previous, candidates.is_empty()) {
            (_, true) => self.fallback(bass_class),
            (Some(previous), false) => candidates.iter().copied().min_by(|a, b| {
                self.score_transition(a, previous, bass_class)
                    .total_cmp(&self.score_transition(b, previous, bass_class))
            }),
            (None, false) => candidates.iter().copied().min_by(|a, b| {
                self.score_initial(a, bass_class)
                    .total_cmp(&self.score_initial(b, bass_class))
            }),
        };
        let Some(fingering) = best else {
            return VoicedChord::silence();
        };
        let pitches = self.fingering_pitches(&fingering);
        self.previous = Some(pitches.clone());
        let velocities = vec![GUITAR_VELOCITY; pitches.len()];
        VoicedChord {
            bass: pitches.first().copied(),
            pitches,
            velocities,
        }
    }

    fn reset(&mut self) {
        self.previous = None;
    }

    fn set_capo(&mut self, fret: u8) {
        self.capo = fret.min(MAX_FRET as u8);
        self.previous = None;
    }
}
