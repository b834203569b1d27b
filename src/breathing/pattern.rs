use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::state::BreathPhase;

/// One traversal of a cycle visits these steps in declaration order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum CycleStep {
    Inhale,
    InhaleHold,
    Exhale,
    ExhaleHold,
}

impl CycleStep {
    pub const ORDER: [CycleStep; 4] = [
        CycleStep::Inhale,
        CycleStep::InhaleHold,
        CycleStep::Exhale,
        CycleStep::ExhaleHold,
    ];

    pub fn phase(self) -> BreathPhase {
        match self {
            CycleStep::Inhale => BreathPhase::Inhale,
            CycleStep::InhaleHold | CycleStep::ExhaleHold => BreathPhase::Hold,
            CycleStep::Exhale => BreathPhase::Exhale,
        }
    }
}

/// Phase lengths in whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreathingPattern {
    pub id: String,
    pub name: String,
    pub inhale: u32,
    pub inhale_hold: u32,
    pub exhale: u32,
    pub exhale_hold: u32,
}

const CATALOG: [(&str, &str, [u32; 4]); 3] = [
    ("box", "Box Breathing", [4, 4, 4, 4]),
    ("4-7-8", "4-7-8 Breathing", [4, 7, 8, 4]),
    ("wim-hoff", "Wim Hoff", [2, 2, 2, 2]),
];

pub const DEFAULT_PATTERN_ID: &str = "box";

impl BreathingPattern {
    pub fn new(id: impl Into<String>, name: impl Into<String>, secs: [u32; 4]) -> Self {
        let [inhale, inhale_hold, exhale, exhale_hold] = secs;
        Self {
            id: id.into(),
            name: name.into(),
            inhale,
            inhale_hold,
            exhale,
            exhale_hold,
        }
    }

    /// Builds a user-defined pattern, named after its timings.
    pub fn custom(secs: [u32; 4]) -> Self {
        let label = secs.map(|s| s.to_string()).join("-");
        Self::new(format!("custom-{label}"), format!("Custom {label}"), secs)
    }

    /// Parses `"4,7,8,4"` into a custom pattern.
    pub fn parse_custom(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            bail!("expected four comma-separated phase lengths, got {:?}", raw);
        }

        let mut secs = [0u32; 4];
        for (slot, part) in secs.iter_mut().zip(parts) {
            *slot = part
                .parse()
                .with_context(|| format!("invalid phase length {:?}", part))?;
        }
        Ok(Self::custom(secs))
    }

    pub fn step_secs(&self, step: CycleStep) -> u32 {
        match step {
            CycleStep::Inhale => self.inhale,
            CycleStep::InhaleHold => self.inhale_hold,
            CycleStep::Exhale => self.exhale,
            CycleStep::ExhaleHold => self.exhale_hold,
        }
    }

    pub fn cycle_secs(&self) -> u32 {
        CycleStep::ORDER.iter().map(|step| self.step_secs(*step)).sum()
    }

    /// Start offset of every step, measured from cycle start.
    pub fn step_offsets(&self) -> [(CycleStep, u32); 4] {
        let mut offset = 0;
        CycleStep::ORDER.map(|step| {
            let at = offset;
            offset += self.step_secs(step);
            (step, at)
        })
    }

    /// Step running at `secs` into a cycle, skipping zero-length steps.
    pub fn step_at(&self, secs: u32) -> Option<CycleStep> {
        let cycle = self.cycle_secs();
        if cycle == 0 {
            return None;
        }
        let within = secs % cycle;
        self.step_offsets()
            .into_iter()
            .find(|(step, at)| within >= *at && within < at + self.step_secs(*step))
            .map(|(step, _)| step)
    }
}

pub fn catalog() -> Vec<BreathingPattern> {
    CATALOG
        .iter()
        .map(|(id, name, secs)| BreathingPattern::new(*id, *name, *secs))
        .collect()
}

pub fn default_pattern() -> BreathingPattern {
    find_in(&catalog(), DEFAULT_PATTERN_ID)
        .unwrap_or_else(|| BreathingPattern::custom([4, 4, 4, 4]))
}

/// Looks a pattern up by id or display name, ignoring case.
pub fn find_in(patterns: &[BreathingPattern], key: &str) -> Option<BreathingPattern> {
    let key = key.trim();
    patterns
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(key) || p.name.eq_ignore_ascii_case(key))
        .cloned()
}

/// Searches the catalog first, then `extra` (user-defined patterns).
pub fn resolve(key: &str, extra: &[BreathingPattern]) -> Result<BreathingPattern> {
    find_in(&catalog(), key)
        .or_else(|| find_in(extra, key))
        .ok_or_else(|| anyhow!("unknown breathing pattern {:?}", key))
}
