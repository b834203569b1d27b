use log::{debug, info, warn};

use super::pattern::CycleStep;
use super::scheduler::{Scheduler, TimerToken};
use super::state::{BreathPhase, SessionConfig, SessionState, DEFAULT_PRE_ROLL_SECS};

/// Scheduled work. Declaration order is the firing order within one second:
/// total-time expiry beats any phase boundary landing on the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Cue {
    PreRollTick,
    SessionTick,
    PhaseTick,
    BeginStep(CycleStep),
    BeginCycle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerEvent {
    PreRollTick { seconds_remaining: u32 },
    SessionStarted { total_secs: u32 },
    PhaseChanged { step: CycleStep, phase: BreathPhase, seconds: u32 },
    Tick { total_seconds_remaining: u32 },
    Completed { elapsed_secs: u32, cycles_started: u32 },
    Cancelled,
}

/// Drives one breathing session at a time on a virtual clock.
///
/// Nothing here sleeps: callers move time forward with [`advance`](Self::advance)
/// and read the state back with [`snapshot`](Self::snapshot). Events raised by
/// `start` and `cancel` are handed out by the next `advance` or
/// [`take_events`](Self::take_events).
#[derive(Debug)]
pub struct BreathingSequencer {
    scheduler: Scheduler<Cue>,
    state: SessionState,
    config: Option<SessionConfig>,
    pre_roll_secs: u32,
    phase_tick: Option<TimerToken>,
    events: Vec<SequencerEvent>,
}

impl Default for BreathingSequencer {
    fn default() -> Self {
        Self::new(DEFAULT_PRE_ROLL_SECS)
    }
}

impl BreathingSequencer {
    pub fn new(pre_roll_secs: u32) -> Self {
        Self {
            scheduler: Scheduler::new(),
            state: SessionState::new(),
            config: None,
            pre_roll_secs,
            phase_tick: None,
            events: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.clone()
    }

    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn pre_roll_secs(&self) -> u32 {
        self.pre_roll_secs
    }

    /// Applies to the next `start`; a running pre-roll keeps its length.
    pub fn set_pre_roll_secs(&mut self, secs: u32) {
        self.pre_roll_secs = secs;
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    /// Returns `false` and changes nothing while a pre-roll or session runs.
    pub fn start(&mut self, config: SessionConfig) -> bool {
        if self.state.is_busy() {
            warn!("breathing session already running; start ignored");
            return false;
        }

        self.scheduler.cancel_all();
        self.phase_tick = None;
        info!(
            "starting {} for {} min ({}s pre-roll)",
            config.pattern.name, config.duration_minutes, self.pre_roll_secs
        );
        self.config = Some(config);

        if self.pre_roll_secs == 0 {
            self.begin_session();
        } else {
            self.state.begin_pre_roll(self.pre_roll_secs);
            self.scheduler.every(1, Cue::PreRollTick);
            self.events.push(SequencerEvent::PreRollTick {
                seconds_remaining: self.pre_roll_secs,
            });
        }

        // Steps at offset zero belong to the current instant.
        self.run_until(self.scheduler.now());
        true
    }

    /// Drops every pending timer and returns to the idle state. Returns
    /// whether anything was running.
    pub fn cancel(&mut self) -> bool {
        if !self.state.is_busy() {
            return false;
        }

        self.scheduler.cancel_all();
        self.phase_tick = None;
        self.config = None;
        self.state.cancel();
        self.events.push(SequencerEvent::Cancelled);
        info!("breathing session cancelled");
        true
    }

    pub fn advance(&mut self, secs: u64) -> Vec<SequencerEvent> {
        let until = self.scheduler.now() + secs;
        self.run_until(until);
        self.take_events()
    }

    pub fn take_events(&mut self) -> Vec<SequencerEvent> {
        std::mem::take(&mut self.events)
    }

    fn run_until(&mut self, until: u64) {
        while let Some((at, token, cue)) = self.scheduler.pop_due(until) {
            debug!("t={at} {cue:?}");
            self.fire(token, cue);
        }
    }

    fn fire(&mut self, token: TimerToken, cue: Cue) {
        match cue {
            Cue::PreRollTick => self.on_pre_roll_tick(token),
            Cue::SessionTick => self.on_session_tick(),
            Cue::PhaseTick => self.on_phase_tick(token),
            Cue::BeginStep(step) => self.begin_step(step),
            Cue::BeginCycle => self.begin_cycle(),
        }
    }

    fn on_pre_roll_tick(&mut self, token: TimerToken) {
        let remaining = self
            .state
            .pre_roll_seconds_remaining
            .unwrap_or(0)
            .saturating_sub(1);

        if remaining > 0 {
            self.state.pre_roll_seconds_remaining = Some(remaining);
            self.events.push(SequencerEvent::PreRollTick {
                seconds_remaining: remaining,
            });
            return;
        }

        self.scheduler.cancel(token);
        self.begin_session();
    }

    fn begin_session(&mut self) {
        let Some(total_secs) = self.config.as_ref().map(SessionConfig::total_secs) else {
            return;
        };

        self.state.begin_session(total_secs);
        self.scheduler.every(1, Cue::SessionTick);
        self.events.push(SequencerEvent::SessionStarted { total_secs });
        self.begin_cycle();
    }

    fn begin_cycle(&mut self) {
        let Some(pattern) = self.config.as_ref().map(|c| c.pattern.clone()) else {
            return;
        };

        self.state.cycles_started += 1;
        for (step, offset) in pattern.step_offsets() {
            if pattern.step_secs(step) == 0 {
                continue;
            }
            self.scheduler.after(u64::from(offset), Cue::BeginStep(step));
        }

        let cycle_secs = pattern.cycle_secs();
        if cycle_secs < self.state.total_seconds_remaining {
            self.scheduler.after(u64::from(cycle_secs), Cue::BeginCycle);
        }
    }

    fn begin_step(&mut self, step: CycleStep) {
        let Some(secs) = self.config.as_ref().map(|c| c.pattern.step_secs(step)) else {
            return;
        };

        if let Some(previous) = self.phase_tick.take() {
            self.scheduler.cancel(previous);
        }

        self.state.enter_step(step, secs);
        if secs > 0 {
            self.phase_tick = Some(self.scheduler.every(1, Cue::PhaseTick));
        }
        self.events.push(SequencerEvent::PhaseChanged {
            step,
            phase: step.phase(),
            seconds: secs,
        });
    }

    fn on_phase_tick(&mut self, token: TimerToken) {
        self.state.phase_seconds_remaining = self.state.phase_seconds_remaining.saturating_sub(1);
        if self.state.phase_seconds_remaining == 0 {
            self.scheduler.cancel(token);
            self.phase_tick = None;
        }
    }

    fn on_session_tick(&mut self) {
        self.state.total_seconds_remaining = self.state.total_seconds_remaining.saturating_sub(1);
        self.state.elapsed_secs += 1;

        if self.state.total_seconds_remaining > 0 {
            self.events.push(SequencerEvent::Tick {
                total_seconds_remaining: self.state.total_seconds_remaining,
            });
            return;
        }

        self.scheduler.cancel_all();
        self.phase_tick = None;
        self.state.complete();
        self.events.push(SequencerEvent::Completed {
            elapsed_secs: self.state.elapsed_secs,
            cycles_started: self.state.cycles_started,
        });
        info!(
            "breathing session complete after {}s ({} cycles)",
            self.state.elapsed_secs, self.state.cycles_started
        );
    }
}
