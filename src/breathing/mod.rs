#[cfg(feature = "desktop")]
pub mod commands;
pub mod controller;
pub mod pattern;
pub mod scheduler;
pub mod sequencer;
pub mod state;

pub use controller::{
    BreathingController, BreathingEvent, BreathingSnapshot, SessionOutcome, SessionSummary,
};
pub use pattern::{BreathingPattern, CycleStep};
pub use sequencer::{BreathingSequencer, SequencerEvent};
pub use state::{BreathPhase, SessionConfig, SessionState};
