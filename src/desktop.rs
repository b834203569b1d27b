use log::{info, warn};
use tauri::{AppHandle, Emitter, Manager};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    breathing::{
        commands::{
            cancel_breathing, get_breathing_settings, get_breathing_state, list_breathing_patterns,
            set_breathing_settings, start_breathing,
        },
        BreathingController, BreathingEvent,
    },
    settings::SettingsStore,
    AppState,
};

fn event_name(event: &BreathingEvent) -> &'static str {
    match event {
        BreathingEvent::StateChanged(_) => "breathing-state-changed",
        BreathingEvent::PhaseChanged { .. } => "breathing-phase-changed",
        BreathingEvent::SessionFinished(_) => "breathing-session-finished",
    }
}

/// Logs a failed emit; returns whether the event reached the web view.
fn report_emit<E: std::fmt::Display>(name: &str, result: Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            warn!("failed to emit {name}: {err}");
            false
        }
    }
}

/// Relays controller events to the web view until the controller goes away.
fn forward_events(app_handle: AppHandle, controller: &BreathingController) {
    let mut rx = controller.subscribe();
    tauri::async_runtime::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let name = event_name(&event);
                    report_emit(name, app_handle.emit(name, &event));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("web view missed {skipped} breathing events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

pub fn run() {
    info!("breathwork desktop starting up...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let settings = SettingsStore::new(app_data_dir.join("settings.json"))?;
                let breathing = BreathingController::new(settings.breathing().pre_roll_secs);
                forward_events(app.handle().clone(), &breathing);

                app.manage(AppState {
                    breathing,
                    settings,
                });
                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            list_breathing_patterns,
            get_breathing_state,
            start_breathing,
            cancel_breathing,
            get_breathing_settings,
            set_breathing_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
