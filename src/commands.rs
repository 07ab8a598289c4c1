use std::sync::Arc;
use tauri::State;

use crate::config::ScaleSettings;
use crate::scale::{ConnectionStatus, ScaleConnection, ScaleHealth, ScaleReading};
use crate::serial::AvailablePort;

/// Connection status snapshot
#[tauri::command]
pub async fn get_scale_status(
    scale: State<'_, Arc<ScaleConnection>>,
) -> Result<ConnectionStatus, String> {
    Ok(scale.current_status())
}

/// Healthy while the indicator is connected
#[tauri::command]
pub async fn get_scale_health(
    scale: State<'_, Arc<ScaleConnection>>,
) -> Result<ScaleHealth, String> {
    Ok(scale.health())
}

/// Latest parsed weight reading, if any
#[tauri::command]
pub async fn get_scale_reading(
    scale: State<'_, Arc<ScaleConnection>>,
) -> Result<Option<ScaleReading>, String> {
    Ok(scale.current_reading().as_deref().cloned())
}

/// Start (or keep) the connection task
#[tauri::command]
pub async fn start_scale(
    scale: State<'_, Arc<ScaleConnection>>,
) -> Result<ConnectionStatus, String> {
    scale
        .start()
        .map_err(|e| format!("Failed to start scale connection: {}", e))?;
    Ok(scale.current_status())
}

/// Stop the connection task and close the port
#[tauri::command]
pub async fn stop_scale(
    scale: State<'_, Arc<ScaleConnection>>,
) -> Result<ConnectionStatus, String> {
    scale.stop();
    Ok(scale.current_status())
}

/// Serial devices visible to the host
#[tauri::command]
pub async fn list_serial_ports(
    scale: State<'_, Arc<ScaleConnection>>,
) -> Result<Vec<AvailablePort>, String> {
    scale
        .list_available_ports()
        .map_err(|e| format!("Failed to list serial ports: {}", e))
}

/// Settings the connection was constructed with
#[tauri::command]
pub async fn get_scale_settings(
    scale: State<'_, Arc<ScaleConnection>>,
) -> Result<ScaleSettings, String> {
    Ok(scale.settings().clone())
}
