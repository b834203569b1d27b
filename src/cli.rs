use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::warn;
use tokio::sync::broadcast::error::RecvError;

use crate::{
    breathing::{
        state::{format_clock, DURATION_CHOICES_MINUTES},
        BreathingController, BreathingEvent, BreathingPattern, BreathingSnapshot, SessionConfig,
        SessionSummary,
    },
    settings::{SettingsStore, SETTINGS_ENV},
};

#[derive(Parser, Debug)]
#[command(name = "breathwork")]
#[command(about = "Guided breathing sessions in the terminal")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Settings file (defaults to ~/.breathwork/settings.json)
    #[arg(long, env = SETTINGS_ENV, global = true)]
    pub settings: Option<PathBuf>,

    /// Log every scheduled cue
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a breathing session; Ctrl-C cancels it
    Start(StartArgs),

    /// List the available breathing patterns
    Patterns {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show or change the saved defaults
    Settings(SettingsArgs),

    /// Open the desktop trainer
    #[cfg(feature = "desktop")]
    App,
}

#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Pattern id or name, e.g. "box", "4-7-8", "Wim Hoff"
    #[arg(short, long, conflicts_with = "custom")]
    pub pattern: Option<String>,

    /// Custom phase lengths in seconds: inhale,hold,exhale,hold
    #[arg(long, value_name = "I,H,E,H")]
    pub custom: Option<String>,

    /// Session length in minutes (2, 4, 6 or 8)
    #[arg(short, long, value_parser = parse_minutes)]
    pub minutes: Option<u32>,

    /// Countdown before the first breath
    #[arg(long)]
    pub pre_roll: Option<u32>,

    /// Emit one JSON event per line
    #[arg(long)]
    pub json: bool,

    /// Milliseconds per session second
    #[arg(long, hide = true, default_value_t = 1000)]
    pub tick_ms: u64,
}

#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    #[arg(short, long)]
    pub pattern: Option<String>,

    #[arg(short, long, value_parser = parse_minutes)]
    pub minutes: Option<u32>,

    #[arg(long)]
    pub pre_roll: Option<u32>,
}

fn parse_minutes(raw: &str) -> Result<u32, String> {
    let minutes: u32 = raw
        .parse()
        .map_err(|_| format!("{raw:?} is not a number of minutes"))?;
    if DURATION_CHOICES_MINUTES.contains(&minutes) {
        Ok(minutes)
    } else {
        Err(format!("duration must be one of {:?} minutes", DURATION_CHOICES_MINUTES))
    }
}

pub fn open_settings(cli: &Cli) -> Result<SettingsStore> {
    let path = match &cli.settings {
        Some(path) => path.clone(),
        None => SettingsStore::default_path()?,
    };
    SettingsStore::new(path)
}

/// Works out the session from flags, falling back to saved settings.
pub fn session_config(args: &StartArgs, store: &SettingsStore) -> Result<SessionConfig> {
    let saved = store.breathing();
    let pattern = match (&args.custom, &args.pattern) {
        (Some(custom), _) => BreathingPattern::parse_custom(custom)?,
        (None, Some(key)) => saved.resolve_pattern(key)?,
        (None, None) => saved.resolve_pattern(&saved.pattern)?,
    };
    SessionConfig::new(pattern, args.minutes.unwrap_or(saved.duration_minutes))
}

pub async fn start(args: StartArgs, store: &SettingsStore) -> Result<()> {
    let config = session_config(&args, store)?;
    let pre_roll = args.pre_roll.unwrap_or(store.breathing().pre_roll_secs);

    if let Err(err) = store.remember_selection(&config.pattern, config.duration_minutes) {
        warn!("could not save selection: {err:#}");
    }

    let controller = BreathingController::new(pre_roll)
        .with_tick_interval(Duration::from_millis(args.tick_ms.max(1)));
    let mut rx = controller.subscribe();
    controller.start(config).await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            signal = &mut ctrl_c, if !interrupted => {
                signal.context("failed to listen for Ctrl-C")?;
                interrupted = true;
                controller.cancel().await?;
            }
            event = rx.recv() => match event {
                Ok(event) => {
                    if args.json {
                        println!("{}", serde_json::to_string(&event)?);
                    }
                    match event {
                        BreathingEvent::StateChanged(snapshot) if !args.json => {
                            println!("{}", render_line(&snapshot));
                        }
                        BreathingEvent::SessionFinished(summary) => {
                            if !args.json {
                                println!("{}", render_summary(&summary));
                            }
                            break;
                        }
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("display fell behind by {skipped} events"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    Ok(())
}

pub fn patterns(store: &SettingsStore, json: bool) -> Result<()> {
    let patterns = store.breathing().patterns();
    if json {
        println!("{}", serde_json::to_string_pretty(&patterns)?);
        return Ok(());
    }

    for pattern in &patterns {
        println!("{}", render_pattern(pattern));
    }
    Ok(())
}

pub fn settings(args: SettingsArgs, store: &SettingsStore) -> Result<()> {
    let mut settings = store.breathing();
    let changed = args.pattern.is_some() || args.minutes.is_some() || args.pre_roll.is_some();

    if let Some(pattern) = args.pattern {
        settings.pattern = settings.resolve_pattern(&pattern)?.id;
    }
    if let Some(minutes) = args.minutes {
        settings.duration_minutes = minutes;
    }
    if let Some(pre_roll) = args.pre_roll {
        settings.pre_roll_secs = pre_roll;
    }
    if changed {
        store.update_breathing(settings.clone())?;
    }

    println!("settings file: {}", store.path().display());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

pub fn render_line(snapshot: &BreathingSnapshot) -> String {
    let state = &snapshot.state;
    if let Some(secs) = state.pre_roll_seconds_remaining {
        return format!("Get ready... {secs}");
    }
    if state.is_complete {
        return "Exercise Complete!".to_string();
    }
    if !state.is_active {
        return String::new();
    }
    format!(
        "{:<7} {:>2}s   {}",
        state.current_phase.label(),
        state.phase_seconds_remaining,
        snapshot.remaining_display
    )
}

pub fn render_summary(summary: &SessionSummary) -> String {
    format!(
        "{} {:?}: {} of {} min, {} cycles",
        summary.pattern_name,
        summary.outcome,
        format_clock(summary.elapsed_secs),
        summary.duration_minutes,
        summary.cycles_started
    )
}

fn render_pattern(pattern: &BreathingPattern) -> String {
    format!(
        "{:<16} {:<18} {}/{}/{}/{}  ({}s cycle)",
        pattern.id,
        pattern.name,
        pattern.inhale,
        pattern.inhale_hold,
        pattern.exhale,
        pattern.exhale_hold,
        pattern.cycle_secs()
    )
}
