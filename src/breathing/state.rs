use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::pattern::{BreathingPattern, CycleStep};

pub const DURATION_CHOICES_MINUTES: [u32; 4] = [2, 4, 6, 8];
pub const DEFAULT_DURATION_MINUTES: u32 = 2;
pub const DEFAULT_PRE_ROLL_SECS: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum BreathPhase {
    #[default]
    None,
    Inhale,
    Hold,
    Exhale,
    Complete,
}

impl BreathPhase {
    pub fn label(self) -> &'static str {
        match self {
            BreathPhase::None => "",
            BreathPhase::Inhale => "Inhale",
            BreathPhase::Hold => "Hold",
            BreathPhase::Exhale => "Exhale",
            BreathPhase::Complete => "Complete",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CircleSize {
    #[default]
    Contracted,
    Expanded,
}

/// Animation hint for the breathing circle: where it is heading and how long
/// the transition takes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CircleCue {
    pub size: CircleSize,
    pub transition_secs: u32,
}

impl CircleCue {
    /// Holds keep the current size.
    pub fn for_step(self, step: CycleStep, secs: u32) -> Self {
        match step {
            CycleStep::Inhale => CircleCue {
                size: CircleSize::Expanded,
                transition_secs: secs,
            },
            CycleStep::Exhale => CircleCue {
                size: CircleSize::Contracted,
                transition_secs: secs,
            },
            CycleStep::InhaleHold | CycleStep::ExhaleHold => CircleCue {
                size: self.size,
                transition_secs: secs,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub pattern: BreathingPattern,
    pub duration_minutes: u32,
}

impl SessionConfig {
    pub fn new(pattern: BreathingPattern, duration_minutes: u32) -> Result<Self> {
        if duration_minutes == 0 {
            bail!("duration_minutes must be greater than zero");
        }
        if pattern.cycle_secs() == 0 {
            bail!("pattern {:?} has no non-zero phase", pattern.name);
        }
        Ok(Self {
            pattern,
            duration_minutes,
        })
    }

    pub fn total_secs(&self) -> u32 {
        self.duration_minutes.saturating_mul(60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub current_phase: BreathPhase,
    pub phase_seconds_remaining: u32,
    pub total_seconds_remaining: u32,
    pub is_active: bool,
    pub is_complete: bool,
    pub pre_roll_seconds_remaining: Option<u32>,
    pub elapsed_secs: u32,
    pub cycles_started: u32,
    pub cue: CircleCue,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pre_roll(&self) -> bool {
        self.pre_roll_seconds_remaining.is_some()
    }

    /// True while either the pre-roll or the session itself is running.
    pub fn is_busy(&self) -> bool {
        self.is_active || self.is_pre_roll()
    }

    pub fn begin_pre_roll(&mut self, secs: u32) {
        *self = Self {
            pre_roll_seconds_remaining: Some(secs),
            ..Self::default()
        };
    }

    pub fn begin_session(&mut self, total_secs: u32) {
        *self = Self {
            total_seconds_remaining: total_secs,
            is_active: true,
            ..Self::default()
        };
    }

    pub fn enter_step(&mut self, step: CycleStep, secs: u32) {
        self.current_phase = step.phase();
        self.phase_seconds_remaining = secs;
        self.cue = self.cue.for_step(step, secs);
    }

    pub fn complete(&mut self) {
        self.is_active = false;
        self.is_complete = true;
        self.current_phase = BreathPhase::Complete;
        self.total_seconds_remaining = 0;
        self.phase_seconds_remaining = 0;
        self.cue = CircleCue::default();
    }

    pub fn cancel(&mut self) {
        *self = Self::default();
    }

    /// `m:ss` rendering of the overall countdown.
    pub fn remaining_display(&self) -> String {
        format_clock(self.total_seconds_remaining)
    }
}

pub fn format_clock(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
