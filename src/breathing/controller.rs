use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    pattern::{BreathingPattern, CycleStep},
    sequencer::{BreathingSequencer, SequencerEvent},
    state::{BreathPhase, SessionConfig, SessionState},
};

const EVENT_CAPACITY: usize = 256;
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BreathingSnapshot {
    pub session_id: Option<String>,
    pub pattern: Option<BreathingPattern>,
    pub duration_minutes: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub state: SessionState,
    pub remaining_display: String,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub pattern_name: String,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: u32,
    pub cycles_started: u32,
    pub outcome: SessionOutcome,
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BreathingEvent {
    StateChanged(BreathingSnapshot),
    PhaseChanged {
        step: CycleStep,
        phase: BreathPhase,
        seconds: u32,
    },
    SessionFinished(SessionSummary),
}

#[derive(Debug, Clone)]
struct ActiveSession {
    id: String,
    started_at: DateTime<Utc>,
    config: SessionConfig,
}

impl ActiveSession {
    fn summary(&self, state: &SessionState, outcome: SessionOutcome) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            pattern_name: self.config.pattern.name.clone(),
            duration_minutes: self.config.duration_minutes,
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed_secs: state.elapsed_secs,
            cycles_started: state.cycles_started,
            outcome,
        }
    }
}

#[derive(Debug)]
struct Inner {
    sequencer: BreathingSequencer,
    session: Option<ActiveSession>,
}

impl Inner {
    fn snapshot(&self) -> BreathingSnapshot {
        let state = self.sequencer.snapshot();
        BreathingSnapshot {
            session_id: self.session.as_ref().map(|s| s.id.clone()),
            pattern: self.session.as_ref().map(|s| s.config.pattern.clone()),
            duration_minutes: self.session.as_ref().map(|s| s.config.duration_minutes),
            started_at: self.session.as_ref().map(|s| s.started_at),
            remaining_display: state.remaining_display(),
            state,
        }
    }

    fn owns(&self, session_id: &str) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == session_id)
    }
}

/// Runs the breathing sequencer against the wall clock and publishes what it
/// does to every subscriber.
#[derive(Clone)]
pub struct BreathingController {
    inner: Arc<Mutex<Inner>>,
    ticker: Arc<Mutex<Option<(JoinHandle<()>, CancellationToken)>>>,
    events: broadcast::Sender<BreathingEvent>,
    tick_interval: Duration,
}

impl BreathingController {
    pub fn new(pre_roll_secs: u32) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                sequencer: BreathingSequencer::new(pre_roll_secs),
                session: None,
            })),
            ticker: Arc::new(Mutex::new(None)),
            events,
            tick_interval: Duration::from_secs(1),
        }
    }

    /// Wall-clock length of one sequencer second, at least one millisecond.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval.max(MIN_TICK_INTERVAL);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreathingEvent> {
        self.events.subscribe()
    }

    pub async fn get_snapshot(&self) -> BreathingSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn set_pre_roll_secs(&self, secs: u32) {
        self.inner.lock().await.sequencer.set_pre_roll_secs(secs);
    }

    pub async fn start(&self, config: SessionConfig) -> Result<BreathingSnapshot> {
        let session = ActiveSession {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            config: config.clone(),
        };

        let (events, snapshot) = {
            let mut inner = self.inner.lock().await;
            if inner.sequencer.is_busy() {
                bail!("breathing session already running");
            }
            if !inner.sequencer.start(config) {
                bail!("breathing session could not be started");
            }
            inner.session = Some(session.clone());
            let events = inner.sequencer.take_events();
            (events, inner.snapshot())
        };

        info!(
            "breathing session {} started ({}, {} min)",
            session.id, session.config.pattern.name, session.config.duration_minutes
        );

        self.publish(&events, &snapshot, None);
        self.spawn_ticker(session.id).await;

        Ok(snapshot)
    }

    /// Stops whatever is running. Once this returns no earlier tick can touch
    /// the session state again.
    pub async fn cancel(&self) -> Result<()> {
        let (summary, snapshot) = {
            let mut inner = self.inner.lock().await;
            let state = inner.sequencer.snapshot();
            if !inner.sequencer.cancel() {
                return Ok(());
            }
            inner.sequencer.take_events();
            let session = inner
                .session
                .take()
                .ok_or_else(|| anyhow!("no active session to cancel"))?;
            // Stopped under `inner` so a ticker installed by a later start survives.
            self.cancel_ticker().await;
            (
                session.summary(&state, SessionOutcome::Cancelled),
                inner.snapshot(),
            )
        };

        info!(
            "breathing session {} cancelled after {}s",
            summary.session_id, summary.elapsed_secs
        );
        let _ = self.events.send(BreathingEvent::StateChanged(snapshot));
        let _ = self.events.send(BreathingEvent::SessionFinished(summary));
        Ok(())
    }

    /// Installs a ticker for `session_id` unless that session has already
    /// been cancelled or replaced. Returns whether a ticker was installed.
    async fn spawn_ticker(&self, session_id: String) -> bool {
        // Lock order is `inner` then `ticker`, the same as in `cancel`.
        let owner = self.inner.lock().await;
        if !owner.owns(&session_id) {
            debug!("session {session_id} ended before its ticker started");
            return false;
        }
        let mut ticker_guard = self.ticker.lock().await;

        if let Some((handle, token)) = ticker_guard.take() {
            token.cancel();
            handle.abort();
        }

        let inner = self.inner.clone();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;
        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token_clone.cancelled() => break,
                    _ = interval.tick() => {
                        let (tick_events, snapshot, finished) = {
                            let mut guard = inner.lock().await;
                            if !guard.owns(&session_id) {
                                debug!("ticker for {session_id} outlived its session");
                                break;
                            }
                            let tick_events = guard.sequencer.advance(1);
                            let state = guard.sequencer.snapshot();
                            let finished = if state.is_complete {
                                guard
                                    .session
                                    .as_ref()
                                    .map(|s| s.summary(&state, SessionOutcome::Completed))
                            } else {
                                None
                            };
                            (tick_events, guard.snapshot(), finished)
                        };

                        let done = finished.is_some();
                        publish_to(&events, &tick_events, &snapshot, finished);
                        if done {
                            info!("breathing session {session_id} complete");
                            break;
                        }
                    }
                }
            }
        });

        *ticker_guard = Some((handle, cancel_token));
        drop(ticker_guard);
        drop(owner);
        true
    }

    async fn cancel_ticker(&self) {
        if let Some((handle, token)) = self.ticker.lock().await.take() {
            token.cancel();
            handle.abort();
        }
    }

    fn publish(
        &self,
        sequencer_events: &[SequencerEvent],
        snapshot: &BreathingSnapshot,
        finished: Option<SessionSummary>,
    ) {
        publish_to(&self.events, sequencer_events, snapshot, finished);
    }
}

fn publish_to(
    events: &broadcast::Sender<BreathingEvent>,
    sequencer_events: &[SequencerEvent],
    snapshot: &BreathingSnapshot,
    finished: Option<SessionSummary>,
) {
    for event in sequencer_events {
        if let SequencerEvent::PhaseChanged { step, phase, seconds } = event {
            let _ = events.send(BreathingEvent::PhaseChanged {
                step: *step,
                phase: *phase,
                seconds: *seconds,
            });
        }
    }

    let _ = events.send(BreathingEvent::StateChanged(snapshot.clone()));

    if let Some(summary) = finished {
        let _ = events.send(BreathingEvent::SessionFinished(summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breathing::pattern::resolve;

    fn config(pattern: &str, minutes: u32) -> SessionConfig {
        SessionConfig::new(resolve(pattern, &[]).unwrap(), minutes).unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<BreathingEvent>) -> Vec<BreathingEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn runs_to_completion_on_the_clock() {
        let controller = BreathingController::new(0);
        let mut rx = controller.subscribe();

        let snapshot = controller.start(config("box", 2)).await.unwrap();
        assert!(snapshot.state.is_active);
        assert_eq!(snapshot.remaining_display, "2:00");
        assert_eq!(snapshot.state.current_phase, BreathPhase::Inhale);

        time::sleep(Duration::from_millis(4_500)).await;
        let snapshot = controller.get_snapshot().await;
        assert_eq!(snapshot.state.current_phase, BreathPhase::Hold);
        assert_eq!(snapshot.state.total_seconds_remaining, 116);

        time::sleep(Duration::from_secs(120)).await;
        let snapshot = controller.get_snapshot().await;
        assert!(snapshot.state.is_complete);
        assert_eq!(snapshot.state.current_phase, BreathPhase::Complete);

        let events = drain(&mut rx);
        match events.last() {
            Some(BreathingEvent::SessionFinished(summary)) => {
                assert_eq!(summary.outcome, SessionOutcome::Completed);
                assert_eq!(summary.elapsed_secs, 120);
                assert_eq!(summary.pattern_name, "Box Breathing");
            }
            other => panic!("expected session summary, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_silences_the_ticker() {
        let controller = BreathingController::new(3);
        let mut rx = controller.subscribe();

        controller.start(config("4-7-8", 4)).await.unwrap();
        time::sleep(Duration::from_millis(10_500)).await;
        assert!(controller.get_snapshot().await.state.is_active);

        controller.cancel().await.unwrap();
        let events = drain(&mut rx);
        match events.last() {
            Some(BreathingEvent::SessionFinished(summary)) => {
                assert_eq!(summary.outcome, SessionOutcome::Cancelled);
                assert_eq!(summary.elapsed_secs, 7);
            }
            other => panic!("expected session summary, got {other:?}"),
        }

        time::sleep(Duration::from_secs(300)).await;
        assert!(drain(&mut rx).is_empty());

        let snapshot = controller.get_snapshot().await;
        assert_eq!(snapshot.state, SessionState::default());
        assert!(snapshot.session_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_pre_roll_keeps_session_from_starting() {
        let controller = BreathingController::new(3);
        controller.start(config("box", 2)).await.unwrap();
        time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(
            controller.get_snapshot().await.state.pre_roll_seconds_remaining,
            Some(2)
        );

        controller.cancel().await.unwrap();
        time::sleep(Duration::from_secs(10)).await;
        let state = controller.get_snapshot().await.state;
        assert!(!state.is_active);
        assert_eq!(state.current_phase, BreathPhase::None);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected() {
        let controller = BreathingController::new(0);
        controller.start(config("box", 2)).await.unwrap();
        assert!(controller.start(config("wim-hoff", 2)).await.is_err());

        controller.cancel().await.unwrap();
        controller.cancel().await.unwrap();
        assert!(controller.start(config("wim-hoff", 2)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn late_ticker_for_cancelled_session_leaves_the_next_one_running() {
        let controller = BreathingController::new(0);

        // Session A is started but has not installed its ticker yet.
        {
            let mut inner = controller.inner.lock().await;
            assert!(inner.sequencer.start(config("box", 2)));
            inner.session = Some(ActiveSession {
                id: "session-a".into(),
                started_at: Utc::now(),
                config: config("box", 2),
            });
        }

        controller.cancel().await.unwrap();
        let b = controller.start(config("wim-hoff", 2)).await.unwrap();

        assert!(!controller.spawn_ticker("session-a".into()).await);

        time::sleep(Duration::from_millis(10_500)).await;
        let snapshot = controller.get_snapshot().await;
        assert_eq!(snapshot.session_id, b.session_id);
        assert_eq!(snapshot.state.total_seconds_remaining, 110);
        assert!(snapshot.state.is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_tick_interval_is_clamped() {
        let controller = BreathingController::new(0).with_tick_interval(Duration::ZERO);
        assert_eq!(controller.tick_interval, MIN_TICK_INTERVAL);

        controller.start(config("wim-hoff", 2)).await.unwrap();
        time::sleep(Duration::from_millis(125)).await;
        assert!(controller.get_snapshot().await.state.is_complete);
    }

    #[tokio::test(start_paused = true)]
    async fn faster_tick_interval_compresses_the_session() {
        let controller =
            BreathingController::new(0).with_tick_interval(Duration::from_millis(10));
        controller.start(config("wim-hoff", 2)).await.unwrap();

        time::sleep(Duration::from_millis(1_205)).await;
        let state = controller.get_snapshot().await.state;
        assert!(state.is_complete);
        assert_eq!(state.cycles_started, 15);
    }
}
