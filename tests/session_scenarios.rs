use std::time::Duration;

use breathwork_lib::breathing::{
    pattern::{catalog, resolve},
    BreathPhase, BreathingController, BreathingEvent, BreathingSequencer, SequencerEvent,
    SessionConfig, SessionOutcome,
};

fn config(pattern: &str, minutes: u32) -> SessionConfig {
    SessionConfig::new(resolve(pattern, &[]).unwrap(), minutes).unwrap()
}

#[test]
fn box_breathing_two_minutes() {
    let mut sequencer = BreathingSequencer::new(3);
    sequencer.start(config("Box Breathing", 2));
    sequencer.advance(3);

    let mut seen = Vec::new();
    for t in 0..=120u32 {
        let state = sequencer.snapshot();
        if t % 4 == 0 && t < 120 {
            seen.push(state.current_phase);
        }
        if t == 120 {
            assert!(!state.is_active);
            assert!(state.is_complete);
        } else {
            assert!(state.is_active, "inactive at t={t}");
        }
        sequencer.advance(1);
    }

    let expected: Vec<BreathPhase> = [
        BreathPhase::Inhale,
        BreathPhase::Hold,
        BreathPhase::Exhale,
        BreathPhase::Hold,
    ]
    .into_iter()
    .cycle()
    .take(30)
    .collect();
    assert_eq!(seen, expected);
}

#[test]
fn wim_hoff_runs_exactly_fifteen_cycles() {
    let mut sequencer = BreathingSequencer::new(0);
    sequencer.start(config("Wim Hoff", 2));

    let mut events = sequencer.take_events();
    events.extend(sequencer.advance(200));

    let inhales = events
        .iter()
        .filter(|e| matches!(e, SequencerEvent::PhaseChanged { phase: BreathPhase::Inhale, .. }))
        .count();
    assert_eq!(inhales, 15);
    assert_eq!(
        events.last(),
        Some(&SequencerEvent::Completed {
            elapsed_secs: 120,
            cycles_started: 15
        })
    );
}

#[test]
fn no_phase_change_after_cancel() {
    for pattern in catalog() {
        let mut sequencer = BreathingSequencer::new(0);
        sequencer.start(SessionConfig::new(pattern, 4).unwrap());
        sequencer.advance(37);
        sequencer.take_events();

        sequencer.cancel();
        let later = sequencer.advance(10 * 60);
        assert_eq!(later, vec![SequencerEvent::Cancelled]);
        assert_eq!(sequencer.snapshot().current_phase, BreathPhase::None);
    }
}

#[tokio::test(start_paused = true)]
async fn controller_reports_every_phase_then_finishes() {
    let controller = BreathingController::new(0);
    let mut rx = controller.subscribe();
    controller.start(config("4-7-8", 2)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(121)).await;

    let mut phases = 0;
    let mut summary = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            BreathingEvent::PhaseChanged { .. } => phases += 1,
            BreathingEvent::SessionFinished(s) => summary = Some(s),
            BreathingEvent::StateChanged(_) => {}
        }
    }

    // Five full 23s cycles, then the sixth is cut after its inhale.
    assert_eq!(phases, 5 * 4 + 2);
    let summary = summary.expect("session summary");
    assert_eq!(summary.outcome, SessionOutcome::Completed);
    assert_eq!(summary.cycles_started, 6);
}
