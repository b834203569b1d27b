use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use crate::breathing::{
    pattern::{self, BreathingPattern, DEFAULT_PATTERN_ID},
    state::{DEFAULT_DURATION_MINUTES, DEFAULT_PRE_ROLL_SECS},
    SessionConfig,
};

pub const SETTINGS_ENV: &str = "BREATHWORK_SETTINGS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BreathingSettings {
    /// Pattern id or name selected last.
    pub pattern: String,
    pub duration_minutes: u32,
    pub pre_roll_secs: u32,
    pub custom_patterns: Vec<BreathingPattern>,
}

impl Default for BreathingSettings {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN_ID.into(),
            duration_minutes: DEFAULT_DURATION_MINUTES,
            pre_roll_secs: DEFAULT_PRE_ROLL_SECS,
            custom_patterns: Vec::new(),
        }
    }
}

impl BreathingSettings {
    pub fn patterns(&self) -> Vec<BreathingPattern> {
        let mut all = pattern::catalog();
        all.extend(self.custom_patterns.iter().cloned());
        all
    }

    pub fn resolve_pattern(&self, key: &str) -> Result<BreathingPattern> {
        pattern::resolve(key, &self.custom_patterns)
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        SessionConfig::new(self.resolve_pattern(&self.pattern)?, self.duration_minutes)
    }

    fn validate(&self) -> Result<()> {
        if self.duration_minutes == 0 {
            bail!("duration_minutes must be greater than zero");
        }
        if let Some(empty) = self.custom_patterns.iter().find(|p| p.cycle_secs() == 0) {
            bail!("custom pattern {:?} has no non-zero phase", empty.name);
        }
        self.resolve_pattern(&self.pattern).map(|_| ())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct UserSettings {
    breathing: BreathingSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("ignoring unreadable settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// `$BREATHWORK_SETTINGS`, else `~/.breathwork/settings.json`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(SETTINGS_ENV) {
            return Ok(PathBuf::from(path));
        }
        let home = std::env::var("HOME").context("Could not determine home directory")?;
        Ok(PathBuf::from(home).join(".breathwork").join("settings.json"))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn breathing(&self) -> BreathingSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .breathing
            .clone()
    }

    pub fn update_breathing(&self, settings: BreathingSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.breathing = settings;
        self.persist(&guard)
    }

    /// Remembers the selection the user last started a session with.
    pub fn remember_selection(
        &self,
        pattern: &BreathingPattern,
        duration_minutes: u32,
    ) -> Result<()> {
        let mut settings = self.breathing();
        settings.pattern = pattern.id.clone();
        settings.duration_minutes = duration_minutes;
        if pattern::find_in(&settings.patterns(), &pattern.id).is_none() {
            settings.custom_patterns.push(pattern.clone());
        }
        self.update_breathing(settings)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
