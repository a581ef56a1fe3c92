//! Playback plan building.
//!
//! A [`PlaybackPlan`] is the flat, fully resolved program the scheduler
//! walks: loops are unrolled, roman numerals are resolved against the
//! key in effect, and tempo expressions are evaluated to concrete BPM
//! values. Building a plan is a pure function of the song program, the
//! start line, and the initial context, so rebuilding it on every Start
//! is cheap and deterministic.

use std::collections::HashMap;

use log::{debug, warn};

use crate::chord::{resolve_roman, Beats, Chord, ChordSymbol, Key};
use crate::note::{Note, NoteName};
use crate::song::TimeSignature;
use crate::song::{
    ChordToken, Directive, DirectiveToken, Line, SongProgram, Span, TempoExpr, START_LABEL,
};

/// Hard ceiling on interpreter steps, far above anything nested loops
/// within the count bound can legitimately produce.
const MAX_WALK_STEPS: usize = 1_000_000;

/// A chord after roman-numeral resolution and normalization: ready to
/// voice. Rests carry no pitch classes.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChord {
    /// Canonical American name, `NC` for a rest.
    pub name: String,
    pub root: Option<Note>,
    pub bass: Option<Note>,
    pub pitch_classes: Vec<u8>,
    pub is_rest: bool,
}

impl ResolvedChord {
    pub fn rest() -> Self {
        Self {
            name: "NC".to_string(),
            root: None,
            bass: None,
            pitch_classes: Vec::new(),
            is_rest: true,
        }
    }

    fn from_chord(chord: &Chord) -> Self {
        Self {
            name: chord.to_string(),
            root: Some(chord.root),
            bass: chord.bass,
            pitch_classes: chord.pitch_classes(),
            is_rest: false,
        }
    }

    /// Resolve a parsed symbol. Roman numerals fall back to C major when
    /// no key has been declared.
    pub fn from_symbol(symbol: &ChordSymbol, key: Option<&Key>) -> Self {
        match symbol {
            ChordSymbol::Rest { .. } => Self::rest(),
            ChordSymbol::Chord(chord) => Self::from_chord(chord),
            ChordSymbol::Roman(roman) => {
                let fallback = Key::major(Note::natural(NoteName::C));
                Self::from_chord(&resolve_roman(roman, key.unwrap_or(&fallback)))
            }
        }
    }
}

/// The tempo/time/key state a plan starts from, and the snapshot
/// captured at each label.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanContext {
    pub tempo_bpm: u16,
    pub time_sig: TimeSignature,
    pub key: Option<Key>,
}

impl Default for PlanContext {
    fn default() -> Self {
        Self {
            tempo_bpm: 120,
            time_sig: TimeSignature::default(),
            key: None,
        }
    }
}

/// State changes applied between steps. `None` fields are unchanged;
/// `key: Some(None)` clears the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextChange {
    pub tempo_bpm: Option<u16>,
    pub time_sig: Option<TimeSignature>,
    pub key: Option<Option<Key>>,
    pub volume: Option<u8>,
    pub capo: Option<u8>,
}

impl ContextChange {
    pub fn is_empty(&self) -> bool {
        *self == ContextChange::default()
    }
}

/// One step of the resolved program.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Sound (or rest) for a duration; the span drives highlighting.
    Play {
        chord: ResolvedChord,
        beats: Beats,
        span: Span,
    },
    /// State changes applied immediately, without consuming time.
    Context(ContextChange),
}

/// Non-fatal problems found while building a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanWarning {
    /// A loop referenced a label that was not defined above it; the loop
    /// was skipped.
    MissingLoopTarget { target: String, line: usize },
    /// The interpreter step bound was hit and the plan was cut short.
    Truncated,
}

/// The resolved linear program handed to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackPlan {
    pub steps: Vec<PlanStep>,
    pub initial: PlanContext,
    pub warnings: Vec<PlanWarning>,
}

impl PlaybackPlan {
    /// True when nothing would sound: no play steps at all.
    pub fn is_empty(&self) -> bool {
        !self
            .steps
            .iter()
            .any(|step| matches!(step, PlanStep::Play { .. }))
    }
}

enum WalkItem<'a> {
    Chord(&'a ChordToken),
    Directive(&'a DirectiveToken),
}

impl WalkItem<'_> {
    fn line(&self) -> usize {
        match self {
            WalkItem::Chord(token) => token.span.line,
            WalkItem::Directive(token) => token.span.line,
        }
    }
}

/// Build the playback plan for a program, starting at `start_line`.
///
/// Lines before the start position contribute their directive effects
/// and label snapshots but no sound. Loops replay the section from their
/// label so that it plays `count` times in total, restoring the
/// tempo/time/key snapshot captured at the label before each pass. A
/// loop whose label has not appeared above it is skipped with a warning.
pub fn build_plan(
    program: &SongProgram,
    start_line: usize,
    initial: &PlanContext,
) -> PlaybackPlan {
    let mut items: Vec<WalkItem> = Vec::new();
    for line in &program.lines {
        match line {
            Line::Chord { tokens } => items.extend(tokens.iter().map(WalkItem::Chord)),
            Line::Directives { items: dirs } => {
                items.extend(dirs.iter().map(WalkItem::Directive))
            }
            _ => {}
        }
    }
    let start_pc = items
        .iter()
        .position(|item| item.line() >= start_line)
        .unwrap_or(items.len());

    let mut ctx = initial.clone();
    // Reset/percent/multiplier tempos resolve against the tempo the song
    // declares up front: an absolute tempo before the first played chord
    // redefines the reference.
    let mut reference_tempo = initial.tempo_bpm;
    let mut played_anything = false;
    let mut snapshots: HashMap<String, (usize, PlanContext)> = HashMap::new();
    let mut warnings: Vec<PlanWarning> = Vec::new();

    // Pre-walk: directive effects and labels above the start position
    for (pc, item) in items.iter().enumerate().take(start_pc) {
        if let WalkItem::Directive(token) = item {
            match &token.directive {
                Directive::Tempo(expr) => {
                    ctx.tempo_bpm = expr.eval(ctx.tempo_bpm, reference_tempo);
                    if let TempoExpr::Absolute(bpm) = expr {
                        reference_tempo = *bpm;
                    }
                }
                Directive::Time(ts) => ctx.time_sig = *ts,
                Directive::Key(key) => ctx.key = Some(*key),
                Directive::Label(name) => {
                    snapshots.insert(name.clone(), (pc + 1, ctx.clone()));
                }
                _ => {}
            }
        }
    }

    let origin = (start_pc, ctx.clone());
    let mut steps: Vec<PlanStep> = Vec::new();
    let mut loop_remaining: HashMap<usize, u32> = HashMap::new();
    let mut pc = start_pc;
    let mut walked = 0usize;

    while pc < items.len() {
        walked += 1;
        if walked > MAX_WALK_STEPS {
            warn!("plan walk exceeded {MAX_WALK_STEPS} steps, truncating");
            warnings.push(PlanWarning::Truncated);
            break;
        }
        match &items[pc] {
            WalkItem::Chord(token) => {
                match &token.parsed {
                    Ok(symbol) => {
                        let beats = symbol
                            .beats()
                            .unwrap_or_else(|| Beats::from_integer(ctx.time_sig.beats as u32));
                        steps.push(PlanStep::Play {
                            chord: ResolvedChord::from_symbol(symbol, ctx.key.as_ref()),
                            beats,
                            span: token.span,
                        });
                        played_anything = true;
                    }
                    Err(e) => {
                        debug!("skipping invalid chord '{}': {e}", token.text);
                    }
                }
                pc += 1;
            }
            WalkItem::Directive(token) => {
                match &token.directive {
                    Directive::Tempo(expr) => {
                        ctx.tempo_bpm = expr.eval(ctx.tempo_bpm, reference_tempo);
                        if !played_anything {
                            if let TempoExpr::Absolute(bpm) = expr {
                                reference_tempo = *bpm;
                            }
                        }
                        steps.push(PlanStep::Context(ContextChange {
                            tempo_bpm: Some(ctx.tempo_bpm),
                            ..ContextChange::default()
                        }));
                    }
                    Directive::Time(ts) => {
                        ctx.time_sig = *ts;
                        steps.push(PlanStep::Context(ContextChange {
                            time_sig: Some(*ts),
                            ..ContextChange::default()
                        }));
                    }
                    Directive::Key(key) => {
                        ctx.key = Some(*key);
                        steps.push(PlanStep::Context(ContextChange {
                            key: Some(Some(*key)),
                            ..ContextChange::default()
                        }));
                    }
                    Directive::Volume(level) => {
                        steps.push(PlanStep::Context(ContextChange {
                            volume: Some(*level),
                            ..ContextChange::default()
                        }));
                    }
                    Directive::Capo(fret) => {
                        steps.push(PlanStep::Context(ContextChange {
                            capo: Some(*fret),
                            ..ContextChange::default()
                        }));
                    }
                    Directive::Label(name) => {
                        snapshots.insert(name.clone(), (pc + 1, ctx.clone()));
                    }
                    Directive::Loop { target, count } => {
                        let resolved = if target == START_LABEL {
                            Some(origin.clone())
                        } else {
                            snapshots.get(target).cloned()
                        };
                        match resolved {
                            None => {
                                warn!(
                                    "loop target '{target}' not found above line {}, skipping loop",
                                    token.span.line
                                );
                                warnings.push(PlanWarning::MissingLoopTarget {
                                    target: target.clone(),
                                    line: token.span.line,
                                });
                            }
                            Some((target_pc, snapshot)) => {
                                let remaining =
                                    loop_remaining.entry(pc).or_insert(count.saturating_sub(1));
                                if *remaining > 0 {
                                    *remaining -= 1;
                                    push_restore(&mut steps, &ctx, &snapshot);
                                    ctx = snapshot;
                                    pc = target_pc;
                                    continue;
                                }
                                loop_remaining.remove(&pc);
                            }
                        }
                    }
                    Directive::Invalid { name, reason } => {
                        debug!("ignoring invalid directive '{name}': {reason}");
                    }
                }
                pc += 1;
            }
        }
    }

    PlaybackPlan {
        steps,
        initial: origin.1,
        warnings,
    }
}

/// Emit a context step restoring the label snapshot, with only the
/// fields that actually change.
fn push_restore(steps: &mut Vec<PlanStep>, current: &PlanContext, snapshot: &PlanContext) {
    let change = ContextChange {
        tempo_bpm: (snapshot.tempo_bpm != current.tempo_bpm).then_some(snapshot.tempo_bpm),
        time_sig: (snapshot.time_sig != current.time_sig).then_some(snapshot.time_sig),
        key: (snapshot.key != current.key).then_some(snapshot.key),
        ..ContextChange::default()
    };
    if !change.is_empty() {
        steps.push(PlanStep::Context(change));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::Notation;
    use crate::song::parse_song;

    fn plan_for(text: &str) -> PlaybackPlan {
        let program = parse_song(text, Notation::American);
        build_plan(&program, 0, &PlanContext::default())
    }

    fn played_names(plan: &PlaybackPlan) -> Vec<String> {
        plan.steps
            .iter()
            .filter_map(|step| match step {
                PlanStep::Play { chord, .. } => Some(chord.name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Tempo in effect at each play step.
    fn tempos_at_plays(plan: &PlaybackPlan) -> Vec<u16> {
        let mut tempo = plan.initial.tempo_bpm;
        let mut out = Vec::new();
        for step in &plan.steps {
            match step {
                PlanStep::Context(change) => {
                    if let Some(bpm) = change.tempo_bpm {
                        tempo = bpm;
                    }
                }
                PlanStep::Play { .. } => out.push(tempo),
            }
        }
        out
    }

    #[test]
    fn test_simple_progression() {
        let plan = plan_for("C  Am  F  G");
        assert_eq!(played_names(&plan), vec!["C", "Am", "F", "G"]);
        for step in &plan.steps {
            if let PlanStep::Play { beats, .. } = step {
                assert_eq!(*beats, Beats::from_integer(4));
            }
        }
    }

    #[test]
    fn test_durations_and_time_signature() {
        let plan = plan_for("{bpm: 120}\n{time: 3/4}\nC*3  G*3");
        let beats: Vec<Beats> = plan
            .steps
            .iter()
            .filter_map(|s| match s {
                PlanStep::Play { beats, .. } => Some(*beats),
                _ => None,
            })
            .collect();
        assert_eq!(beats, vec![Beats::from_integer(3), Beats::from_integer(3)]);

        // Without explicit beats, a chord lasts one bar of the active
        // time signature
        let plan = plan_for("{time: 3/4}\nC");
        let PlanStep::Play { beats, .. } = &plan.steps[1] else {
            panic!()
        };
        assert_eq!(*beats, Beats::from_integer(3));
    }

    #[test]
    fn test_relative_tempo_and_reset() {
        let plan = plan_for("{bpm: 100}\nC\n{bpm: +40}\nC\n{bpm: reset}\nC");
        assert_eq!(tempos_at_plays(&plan), vec![100, 140, 100]);
    }

    #[test]
    fn test_percent_and_multiplier_use_declared_tempo() {
        let plan = plan_for("{bpm: 100}\nC\n{bpm: 50%}\nC\n{bpm: 2x}\nC");
        assert_eq!(tempos_at_plays(&plan), vec![100, 50, 200]);
    }

    #[test]
    fn test_loop_plays_section_count_times_total() {
        let plan = plan_for("{label: v}\nC  G\n{loop: v 2}");
        assert_eq!(played_names(&plan), vec!["C", "G", "C", "G"]);

        let plan = plan_for("{label: v}\nC  G\n{loop: v 3}");
        assert_eq!(played_names(&plan), vec!["C", "G", "C", "G", "C", "G"]);

        // Count 1 means the section just plays through once
        let plan = plan_for("{label: v}\nC  G\n{loop: v 1}");
        assert_eq!(played_names(&plan), vec!["C", "G"]);
    }

    #[test]
    fn test_loop_to_start() {
        let plan = plan_for("C\n{loop: @start 2}");
        assert_eq!(played_names(&plan), vec!["C", "C"]);
    }

    #[test]
    fn test_nested_loops() {
        let text = "{label: outer}\nC\n{label: inner}\nG\n{loop: inner 2}\n{loop: outer 2}";
        let plan = plan_for(text);
        // Outer pass: C G G; replay: C G G
        assert_eq!(played_names(&plan), vec!["C", "G", "G", "C", "G", "G"]);
    }

    #[test]
    fn test_loop_restores_label_snapshot() {
        let text = "{bpm: 100}\n{label: v}\nC\n{bpm: +40}\nC\n{loop: v 2}";
        let plan = plan_for(text);
        // Pass one: 100, 140; the replay restores 100 at the label
        assert_eq!(tempos_at_plays(&plan), vec![100, 140, 100, 140]);
    }

    #[test]
    fn test_loop_restores_key_for_roman_chords() {
        let text = "{key: C}\n{label: v}\nI\n{key: G}\nI\n{loop: v 2}";
        let plan = plan_for(text);
        assert_eq!(played_names(&plan), vec!["C", "G", "C", "G"]);
    }

    #[test]
    fn test_forward_loop_target_is_skipped() {
        let plan = plan_for("{loop: later 2}\nC\n{label: later}\nG");
        assert_eq!(played_names(&plan), vec!["C", "G"]);
        assert!(matches!(
            plan.warnings[0],
            PlanWarning::MissingLoopTarget { .. }
        ));
    }

    #[test]
    fn test_missing_loop_target_is_skipped() {
        let plan = plan_for("C\n{loop: nowhere 2}\nG");
        assert_eq!(played_names(&plan), vec!["C", "G"]);
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_rest_consumes_time() {
        let plan = plan_for("C  NC*2  G");
        let PlanStep::Play { chord, beats, .. } = &plan.steps[1] else {
            panic!()
        };
        assert!(chord.is_rest);
        assert!(chord.pitch_classes.is_empty());
        assert_eq!(*beats, Beats::from_integer(2));
    }

    #[test]
    fn test_invalid_chords_are_skipped() {
        let plan = plan_for("C  Xyz9  G");
        assert_eq!(played_names(&plan), vec!["C", "G"]);
    }

    #[test]
    fn test_roman_resolution_uses_current_key() {
        let plan = plan_for("{key: G}\nI  IV  V7");
        assert_eq!(played_names(&plan), vec!["G", "C", "D7"]);
        // Without a key declaration, C major is assumed
        let plan = plan_for("I  V7");
        assert_eq!(played_names(&plan), vec!["C", "G7"]);
    }

    #[test]
    fn test_start_position_applies_earlier_directives() {
        let text = "{bpm: 90}\n{time: 3/4}\nC\nG";
        let program = parse_song(text, Notation::American);
        // Start at the last line: earlier directives still shape context
        let plan = build_plan(&program, 3, &PlanContext::default());
        assert_eq!(played_names(&plan), vec!["G"]);
        assert_eq!(plan.initial.tempo_bpm, 90);
        assert_eq!(plan.initial.time_sig.beats, 3);
    }

    #[test]
    fn test_volume_and_capo_emit_context_steps() {
        let plan = plan_for("{volume: 96} {capo: 2}\nC");
        let PlanStep::Context(change) = &plan.steps[0] else {
            panic!()
        };
        assert_eq!(change.volume, Some(96));
        let PlanStep::Context(change) = &plan.steps[1] else {
            panic!()
        };
        assert_eq!(change.capo, Some(2));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let text = "{bpm: 100}\n{label: v}\nC  G\n{bpm: +10}\n{loop: v 3}\nF";
        let program = parse_song(text, Notation::American);
        let a = build_plan(&program, 0, &PlanContext::default());
        let b = build_plan(&program, 0, &PlanContext::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_plan() {
        let plan = plan_for("just words\n// and a comment");
        assert!(plan.is_empty());
    }
}
