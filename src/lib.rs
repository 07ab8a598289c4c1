pub mod config;
pub mod scale;
pub mod serial;

#[cfg(feature = "desktop")]
pub mod commands;

#[cfg(feature = "desktop")]
use std::sync::Arc;
#[cfg(feature = "desktop")]
use scale::ScaleConnection;
#[cfg(feature = "desktop")]
use tauri::{Emitter, Manager};

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
  let (settings, load_error) = config::ScaleSettings::or_fallback(config::ScaleSettings::load());
  let load_error = load_error.map(|e| e.to_string());
  let log_level = settings.log_level_filter();
  let auto_start = settings.auto_start;

  // One connection per configured indicator, owned by the app and handed to the commands
  let scale = match ScaleConnection::new(settings) {
    Ok(scale) => Arc::new(scale),
    Err(e) => {
      eprintln!("Cannot create scale connection: {}", e);
      return;
    }
  };

  let app = tauri::Builder::default()
    .manage(scale)
    .invoke_handler(tauri::generate_handler![
      commands::get_scale_status,
      commands::get_scale_health,
      commands::get_scale_reading,
      commands::start_scale,
      commands::stop_scale,
      commands::list_serial_ports,
      commands::get_scale_settings,
    ])
    .setup(move |app| {
      app.handle().plugin(
        tauri_plugin_log::Builder::default()
          .level(log_level)
          .build(),
      )?;

      if let Some(e) = load_error {
        log::error!("Invalid scale settings ({}), using defaults without auto-start", e);
      }

      let scale: tauri::State<Arc<ScaleConnection>> = app.state();
      let scale = scale.inner().clone();

      // Forward each new reading to the frontend
      let mut readings = scale.subscribe();
      let handle = app.handle().clone();
      tauri::async_runtime::spawn(async move {
        while readings.changed().await.is_ok() {
          let reading = readings.borrow_and_update().clone();
          if let Some(reading) = reading {
            let _ = handle.emit("scale-reading", reading.as_ref());
          }
        }
      });

      if auto_start {
        tauri::async_runtime::spawn(async move {
          if let Err(e) = scale.start() {
            log::error!("Failed to start scale connection: {}", e);
          }
        });
      }

      log::info!("Scale link application started");
      Ok(())
    })
    .build(tauri::generate_context!());

  let app = match app {
    Ok(app) => app,
    Err(e) => {
      eprintln!("error while building tauri application: {}", e);
      return;
    }
  };

  app.run(|app_handle, event| {
    if let tauri::RunEvent::Exit = event {
      let scale: tauri::State<Arc<ScaleConnection>> = app_handle.state();
      scale.stop();
    }
  });
}
