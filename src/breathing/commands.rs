use tauri::State;

use crate::{
    breathing::{BreathingController, BreathingPattern, BreathingSnapshot, SessionConfig},
    settings::BreathingSettings,
    AppState,
};

fn controller_from_state(state: &State<'_, AppState>) -> BreathingController {
    state.breathing.clone()
}

#[tauri::command]
pub fn list_breathing_patterns(
    state: State<'_, AppState>,
) -> Result<Vec<BreathingPattern>, String> {
    Ok(state.settings.breathing().patterns())
}

#[tauri::command]
pub async fn get_breathing_state(state: State<'_, AppState>) -> Result<BreathingSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.get_snapshot().await)
}

#[tauri::command]
pub async fn start_breathing(
    state: State<'_, AppState>,
    pattern: String,
    duration_minutes: u32,
) -> Result<BreathingSnapshot, String> {
    let settings = state.settings.breathing();
    let pattern = settings.resolve_pattern(&pattern).map_err(|e| e.to_string())?;
    let config = SessionConfig::new(pattern, duration_minutes).map_err(|e| e.to_string())?;

    state
        .settings
        .remember_selection(&config.pattern, config.duration_minutes)
        .map_err(|e| e.to_string())?;

    let controller = controller_from_state(&state);
    controller.set_pre_roll_secs(settings.pre_roll_secs).await;
    controller.start(config).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn cancel_breathing(state: State<'_, AppState>) -> Result<(), String> {
    let controller = controller_from_state(&state);
    controller.cancel().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_breathing_settings(state: State<'_, AppState>) -> Result<BreathingSettings, String> {
    Ok(state.settings.breathing())
}

#[tauri::command]
pub fn set_breathing_settings(
    settings: BreathingSettings,
    state: State<'_, AppState>,
) -> Result<(), String> {
    state
        .settings
        .update_breathing(settings)
        .map_err(|e| e.to_string())
}
