//! CamClip - Webcam clips, captured and converted.
//!
//! This is the main library crate for the CamClip application.
//! It provides the Tauri application setup and all backend functionality.

pub mod capture;
pub mod commands;
pub mod recorder;
pub mod transcode;
pub mod utils;

use commands::capture::{ControllerState, EngineState};
use tauri::Manager;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the application
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camclip_lib=debug,tauri=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CamClip v{}", env!("CARGO_PKG_VERSION"));

    let app = tauri::Builder::default()
        .manage(ControllerState::default())
        .manage(EngineState::default())
        .invoke_handler(tauri::generate_handler![
            // Capture commands
            commands::capture::get_cameras,
            commands::capture::start_capture,
            commands::capture::stop_capture,
            commands::capture::get_capture_state,
            commands::capture::get_artifact,
            commands::capture::get_artifact_info,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app_handle, event| {
        if let tauri::RunEvent::Exit = event {
            // The engine keeps an on-disk workspace; remove it before
            // the process goes away
            let engine_state = app_handle.state::<EngineState>();
            tauri::async_runtime::block_on(engine_state.teardown());
        }
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_default_capability_grants_core_ipc_to_main_window() {
        let capability: serde_json::Value =
            serde_json::from_str(include_str!("../capabilities/default.json"))
                .expect("capability file parses");

        assert_eq!(capability["identifier"], "default");

        let windows: Vec<&str> = capability["windows"]
            .as_array()
            .expect("windows list")
            .iter()
            .filter_map(|w| w.as_str())
            .collect();
        assert_eq!(windows, ["main"]);

        let permissions: Vec<&str> = capability["permissions"]
            .as_array()
            .expect("permissions list")
            .iter()
            .filter_map(|p| p.as_str())
            .collect();
        assert!(permissions.contains(&"core:default"));
    }

    #[test]
    fn test_window_carries_the_label_the_capability_targets() {
        let config: serde_json::Value =
            serde_json::from_str(include_str!("../tauri.conf.json")).expect("config parses");

        let windows = config["app"]["windows"].as_array().expect("windows");
        assert_eq!(windows.len(), 1);
        // No explicit label means the window is created as "main",
        // which is the label the default capability targets.
        assert!(windows[0].get("label").is_none());
    }
}
