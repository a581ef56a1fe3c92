//! Scheduler integration tests: drive the real thread pair through a
//! collecting sink and assert on the emitted event stream. Tempos are
//! high so the suite stays fast; assertions are about ordering and
//! balance, never wall-clock precision.

use std::sync::mpsc;
use std::time::Duration;

use crate::chord::{parse_chord, Notation};
use crate::config::PlayerConfig;
use crate::song::parse_song;

use super::plan::{build_plan, PlanContext, ResolvedChord};
use super::scheduler::{Player, PlayerCallbacks, PlaybackStatus, StateSnapshot};
use super::sink::{CollectingSink, SinkEvent, PITCHED_CHANNEL};
use super::voicing::{PianoVoicing, Voicing};

fn fast_context(bpm: u16) -> PlanContext {
    PlanContext {
        tempo_bpm: bpm,
        ..PlanContext::default()
    }
}

fn spawn_player(
    sink: &CollectingSink,
    config: &PlayerConfig,
) -> (Player, mpsc::Receiver<StateSnapshot>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (tx, rx) = mpsc::channel();
    let callbacks = PlayerCallbacks::new().state_change(move |snapshot: &StateSnapshot| {
        let _ = tx.send(snapshot.clone());
    });
    let player = Player::spawn(Box::new(sink.clone()), config, callbacks).unwrap();
    (player, rx)
}

fn wait_for_status(
    rx: &mpsc::Receiver<StateSnapshot>,
    wanted: PlaybackStatus,
) -> StateSnapshot {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let left = deadline
            .checked_duration_since(std::time::Instant::now())
            .expect("timed out waiting for status");
        let snapshot = rx.recv_timeout(left).expect("player hung up");
        if snapshot.status == wanted {
            return snapshot;
        }
    }
}

/// Wait until playback has actually begun (first chord published).
fn wait_for_chord(rx: &mpsc::Receiver<StateSnapshot>) -> StateSnapshot {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let left = deadline
            .checked_duration_since(std::time::Instant::now())
            .expect("timed out waiting for a chord");
        let snapshot = rx.recv_timeout(left).expect("player hung up");
        if snapshot.chord_name.is_some() {
            return snapshot;
        }
    }
}

fn pitched_ons(events: &[SinkEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            SinkEvent::NoteOn {
                channel: PITCHED_CHANNEL,
                pitch,
                ..
            } => Some(*pitch),
            _ => None,
        })
        .collect()
}

#[test]
fn test_playback_emits_voiced_steps_in_order() {
    let sink = CollectingSink::new();
    let (player, rx) = spawn_player(&sink, &PlayerConfig::default());

    let program = parse_song("C G", Notation::American);
    let plan = build_plan(&program, 0, &fast_context(1200));
    player.start(plan).unwrap();
    wait_for_status(&rx, PlaybackStatus::Stopped);
    drop(player);

    let events = sink.events();
    assert_eq!(
        events[0],
        SinkEvent::ProgramSelect {
            channel: PITCHED_CHANNEL,
            program: 0
        }
    );

    // Replay the voicing engine to compute the expected stream
    let mut piano = PianoVoicing::new();
    let c = piano.voice(&ResolvedChord::from_symbol(
        &parse_chord("C", Notation::American).unwrap(),
        None,
    ));
    let g = piano.voice(&ResolvedChord::from_symbol(
        &parse_chord("G", Notation::American).unwrap(),
        None,
    ));

    let mut expected: Vec<SinkEvent> = Vec::new();
    for (pitch, velocity) in c.notes() {
        expected.push(SinkEvent::NoteOn {
            channel: PITCHED_CHANNEL,
            pitch,
            velocity,
        });
    }
    // Step two: release what G drops, attack what it adds
    for &pitch in &c.pitches {
        if !g.pitches.contains(&pitch) {
            expected.push(SinkEvent::NoteOff {
                channel: PITCHED_CHANNEL,
                pitch,
            });
        }
    }
    for (pitch, velocity) in g.notes() {
        if !c.pitches.contains(&pitch) {
            expected.push(SinkEvent::NoteOn {
                channel: PITCHED_CHANNEL,
                pitch,
                velocity,
            });
        }
    }
    // Stop: release everything still sounding, then all-notes-off
    for &pitch in &g.pitches {
        expected.push(SinkEvent::NoteOff {
            channel: PITCHED_CHANNEL,
            pitch,
        });
    }
    expected.push(SinkEvent::AllNotesOff {
        channel: PITCHED_CHANNEL,
    });

    assert_eq!(&events[1..], &expected[..]);
    assert!(sink.sounding().is_empty());
}

#[test]
fn test_common_tones_are_held_between_steps() {
    let sink = CollectingSink::new();
    let (player, rx) = spawn_player(&sink, &PlayerConfig::default());

    // C to Am holds C4 and E4: they must not be re-attacked
    let program = parse_song("C Am", Notation::American);
    let plan = build_plan(&program, 0, &fast_context(1200));
    player.start(plan).unwrap();
    wait_for_status(&rx, PlaybackStatus::Stopped);
    drop(player);

    let ons = pitched_ons(&sink.events());
    assert_eq!(ons.iter().filter(|&&p| p == 60).count(), 1);
    assert_eq!(ons.iter().filter(|&&p| p == 64).count(), 1);
    // A4 is new in the second chord
    assert_eq!(ons.iter().filter(|&&p| p == 69).count(), 1);
}

#[test]
fn test_stop_is_prompt_and_leaves_silence() {
    let sink = CollectingSink::new();
    let (player, rx) = spawn_player(&sink, &PlayerConfig::default());

    // One chord of 100 beats at 60 bpm: 100 seconds if left alone
    let program = parse_song("C*100", Notation::American);
    let plan = build_plan(&program, 0, &fast_context(60));
    player.start(plan).unwrap();
    wait_for_chord(&rx);

    let stop_requested = std::time::Instant::now();
    player.stop().unwrap();
    wait_for_status(&rx, PlaybackStatus::Stopped);
    let elapsed = stop_requested.elapsed();
    assert!(
        elapsed < Duration::from_secs(1),
        "stop took {elapsed:?}"
    );
    drop(player);
    assert!(sink.sounding().is_empty());
    assert!(sink
        .events()
        .contains(&SinkEvent::AllNotesOff {
            channel: PITCHED_CHANNEL
        }));
}

#[test]
fn test_pause_releases_and_resume_reattacks() {
    let sink = CollectingSink::new();
    let (player, rx) = spawn_player(&sink, &PlayerConfig::default());

    // 20 beats at 240 bpm: 5 seconds, plenty to pause inside
    let program = parse_song("C*20", Notation::American);
    let plan = build_plan(&program, 0, &fast_context(240));
    player.start(plan).unwrap();
    wait_for_chord(&rx);

    player.pause().unwrap();
    wait_for_status(&rx, PlaybackStatus::Paused);
    player.resume().unwrap();
    wait_for_status(&rx, PlaybackStatus::Playing);
    player.stop().unwrap();
    wait_for_status(&rx, PlaybackStatus::Stopped);
    drop(player);

    // The chord attacked twice: once at start, once on resume
    let ons = pitched_ons(&sink.events());
    assert_eq!(ons.iter().filter(|&&p| p == 60).count(), 2);
    assert!(sink.sounding().is_empty());
}

#[test]
fn test_play_single_voices_and_releases() {
    let sink = CollectingSink::new();
    let mut config = PlayerConfig::default();
    config.initial_bpm = 1200;
    let (player, rx) = spawn_player(&sink, &config);

    let chord = ResolvedChord::from_symbol(
        &parse_chord("C", Notation::American).unwrap(),
        None,
    );
    player.play_single(chord, None).unwrap();
    // Completion publishes a snapshot with the chord cleared
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let mut seen_chord = false;
    loop {
        let left = deadline
            .checked_duration_since(std::time::Instant::now())
            .expect("timed out waiting for click to finish");
        let snapshot = rx.recv_timeout(left).expect("player hung up");
        if snapshot.chord_name.as_deref() == Some("C") {
            seen_chord = true;
        } else if seen_chord && snapshot.chord_name.is_none() {
            break;
        }
    }
    drop(player);

    let ons = pitched_ons(&sink.events());
    assert_eq!(ons, vec![36, 60, 64, 67]);
    assert!(sink.sounding().is_empty());
}

#[test]
fn test_consecutive_clicks_voice_lead() {
    let sink = CollectingSink::new();
    let mut config = PlayerConfig::default();
    config.initial_bpm = 1200;
    let (player, rx) = spawn_player(&sink, &config);

    let parse = |token: &str| {
        ResolvedChord::from_symbol(&parse_chord(token, Notation::American).unwrap(), None)
    };
    player.play_single(parse("C"), None).unwrap();
    player.play_single(parse("Am"), None).unwrap();
    // Wait for the second click to finish
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let mut am_seen = false;
    loop {
        let left = deadline
            .checked_duration_since(std::time::Instant::now())
            .expect("timed out waiting for clicks");
        let snapshot = rx.recv_timeout(left).expect("player hung up");
        if snapshot.chord_name.as_deref() == Some("Am") {
            am_seen = true;
        } else if am_seen && snapshot.chord_name.is_none() {
            break;
        }
    }
    drop(player);

    // The Am click voice-led against the C click: A4, not A3
    let ons = pitched_ons(&sink.events());
    assert!(ons.contains(&69));
    assert!(sink.sounding().is_empty());
}

#[test]
fn test_rest_goes_silent_then_next_chord_voice_leads() {
    let sink = CollectingSink::new();
    let (player, rx) = spawn_player(&sink, &PlayerConfig::default());

    let program = parse_song("C NC*2 G", Notation::American);
    let plan = build_plan(&program, 0, &fast_context(1200));
    player.start(plan).unwrap();
    wait_for_status(&rx, PlaybackStatus::Stopped);
    drop(player);

    // G was voiced against C, not against silence: B3 and D4 in reach
    let ons = pitched_ons(&sink.events());
    assert!(ons.contains(&59));
    assert!(ons.contains(&62));
    // G4 sounded in the C chord, went silent for the rest, re-attacked
    assert_eq!(ons.iter().filter(|&&p| p == 67).count(), 2);
    assert!(sink.sounding().is_empty());
}

#[test]
fn test_context_changes_reach_snapshots() {
    let sink = CollectingSink::new();
    let (player, rx) = spawn_player(&sink, &PlayerConfig::default());

    let program = parse_song("{bpm: 100}\n{time: 3/4}\nC*1", Notation::American);
    let plan = build_plan(&program, 0, &fast_context(1200));
    player.start(plan).unwrap();
    let snapshot = wait_for_chord(&rx);
    assert_eq!(snapshot.bpm, 100);
    assert_eq!(snapshot.time_sig.beats, 3);
    wait_for_status(&rx, PlaybackStatus::Stopped);
    drop(player);
}

#[test]
fn test_highlight_spans_then_clears() {
    use std::sync::{Arc, Mutex};

    let sink = CollectingSink::new();
    let spans = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();
    let spans_cb = Arc::clone(&spans);
    let callbacks = PlayerCallbacks::new()
        .highlight(move |span| {
            spans_cb.lock().unwrap().push(span);
        })
        .state_change(move |snapshot: &StateSnapshot| {
            let _ = tx.send(snapshot.clone());
        });
    let player = Player::spawn(
        Box::new(sink.clone()),
        &PlayerConfig::default(),
        callbacks,
    )
    .unwrap();

    let program = parse_song("C G", Notation::American);
    let plan = build_plan(&program, 0, &fast_context(1200));
    player.start(plan).unwrap();
    wait_for_status(&rx, PlaybackStatus::Stopped);
    drop(player);

    let seen = spans.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    let first = seen[0].expect("first span");
    assert_eq!((first.line, first.start, first.end), (0, 0, 1));
    let second = seen[1].expect("second span");
    assert_eq!((second.line, second.start, second.end), (0, 2, 3));
    assert!(seen[2].is_none());
}
