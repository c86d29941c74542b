pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod state;
pub mod storage;
#[cfg(feature = "desktop")]
mod commands;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use config::{AppConfig, CONFIG_FILE_NAME};
    use state::AppState;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::load(std::path::Path::new(CONFIG_FILE_NAME)).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "invalid {}, using defaults", CONFIG_FILE_NAME);
        AppConfig::default()
    });

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .manage(AppState::new(config))
        .invoke_handler(tauri::generate_handler![
            commands::default_connect_params,
            commands::connect_db,
            commands::disconnect_db,
            commands::test_connection,
            commands::list_tables,
            commands::describe_table,
            commands::create_table,
            commands::insert_record,
            commands::update_record,
            commands::delete_record,
            commands::query_table,
            commands::load_record,
            commands::setup_triggers,
            commands::setup_views,
            commands::check_triggers,
            commands::list_triggers,
            commands::set_trigger_enabled,
            commands::drop_trigger,
            commands::list_views,
            commands::execute_view,
            commands::get_active_alerts,
            commands::list_alerts,
            commands::check_new_alerts,
            commands::ensure_notification_table,
            commands::get_notification_settings,
            commands::load_notification_settings,
            commands::save_notification_settings,
            commands::set_alert_gate,
            commands::get_statistics,
            commands::save_connection,
            commands::load_connections,
            commands::delete_connection,
            commands::save_session,
            commands::load_session
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
