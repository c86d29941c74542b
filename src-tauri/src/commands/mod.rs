use std::path::PathBuf;
use std::sync::Arc;

use tauri::{AppHandle, Emitter, Manager, State};
use tokio_util::sync::CancellationToken;

use crate::db::DatabaseDriver;
use crate::error::into_ui;
use crate::gateway::watch::{AlertWatcher, WatchGate};
use crate::gateway::{admin, alerts, connection, records, schema, script, stats};
use crate::models::{
    Alert, ColumnSpec, ConnectParams, ConnectionInfo, ConnectionProfile, FieldInput, Filter,
    NotificationPreference, PriorityFlags, PriorityTier, QueryResult, Record, StatsBundle,
    TableDescriptor, TriggerDescriptor,
};
use crate::state::AppState;
use crate::storage::{self, Session};

/// Event carrying the number of new high-priority alerts.
pub const NEW_ALERTS_EVENT: &str = "new-alerts";

fn driver(state: &AppState) -> Result<Arc<dyn DatabaseDriver>, String> {
    into_ui(state.connection.current())
}

fn data_dir(app: &AppHandle) -> Result<PathBuf, String> {
    app.path().app_data_dir().map_err(|e| e.to_string())
}

/// Pre-filled values for the connect form.
#[tauri::command]
pub fn default_connect_params(state: State<'_, AppState>) -> ConnectParams {
    ConnectParams {
        server: state.config.default_server.clone(),
        database: state.config.default_database.clone(),
        username: None,
        password: None,
        port: None,
    }
}

#[tauri::command]
pub async fn connect_db(
    app: AppHandle,
    state: State<'_, AppState>,
    params: ConnectParams,
) -> Result<ConnectionInfo, String> {
    let (driver, info) = into_ui(connection::connect(&params, &state.config).await)?;

    state.replace_watcher(None);
    if let Some(previous) = state.connection.replace(driver.clone()) {
        if let Err(e) = previous.close().await {
            tracing::warn!(error = %e, "failed to close previous connection");
        }
    }

    if let Err(e) = alerts::ensure_notification_table(driver.as_ref(), &state.config.admin_email).await {
        tracing::warn!(error = %e, "notification settings table unavailable");
    }

    let token = CancellationToken::new();
    let watcher = AlertWatcher {
        interval: state.config.alert_poll_interval(),
        window_minutes: state.config.new_alert_window_minutes,
        gate: state.watch_gate.clone(),
    };
    let handle = app.clone();
    watcher.spawn(
        driver,
        move |count: i64| {
            if let Err(e) = handle.emit(NEW_ALERTS_EVENT, count) {
                tracing::warn!(error = %e, "failed to emit alert notification");
            }
        },
        token.clone(),
    );
    state.replace_watcher(Some(token));

    Ok(info)
}

#[tauri::command]
pub async fn disconnect_db(state: State<'_, AppState>) -> Result<(), String> {
    state.replace_watcher(None);
    into_ui(state.connection.close().await)
}

#[tauri::command]
pub async fn test_connection(state: State<'_, AppState>) -> Result<String, String> {
    let driver = driver(&state)?;
    into_ui(connection::test_connection(driver.as_ref()).await)
}

/// Empty while disconnected, so the table combo simply stays blank.
#[tauri::command]
pub async fn list_tables(state: State<'_, AppState>) -> Result<Vec<String>, String> {
    match state.connection.current() {
        Ok(driver) => Ok(schema::list_tables(driver.as_ref()).await),
        Err(_) => Ok(Vec::new()),
    }
}

#[tauri::command]
pub async fn describe_table(state: State<'_, AppState>, table: String) -> Result<TableDescriptor, String> {
    let driver = driver(&state)?;
    into_ui(schema::describe_table(driver.as_ref(), &table).await)
}

#[tauri::command]
pub async fn create_table(
    state: State<'_, AppState>,
    name: String,
    columns: Vec<ColumnSpec>,
) -> Result<String, String> {
    let driver = driver(&state)?;
    into_ui(records::create_table(driver.as_ref(), &name, &columns).await)
}

#[tauri::command]
pub async fn insert_record(
    state: State<'_, AppState>,
    table: String,
    fields: Vec<FieldInput>,
) -> Result<String, String> {
    let driver = driver(&state)?;
    into_ui(records::insert(driver.as_ref(), &table, &fields).await)
}

#[tauri::command]
pub async fn update_record(
    state: State<'_, AppState>,
    table: String,
    record_id: String,
    fields: Vec<FieldInput>,
) -> Result<String, String> {
    let driver = driver(&state)?;
    let primary_key = into_ui(schema::editable_key(driver.as_ref(), &table).await)?;
    into_ui(records::update(driver.as_ref(), &table, &primary_key, &record_id, &fields).await)
}

#[tauri::command]
pub async fn delete_record(
    state: State<'_, AppState>,
    table: String,
    record_id: String,
) -> Result<String, String> {
    let driver = driver(&state)?;
    let primary_key = into_ui(schema::editable_key(driver.as_ref(), &table).await)?;
    into_ui(records::delete(driver.as_ref(), &table, &primary_key, &record_id).await)
}

#[tauri::command]
pub async fn query_table(
    state: State<'_, AppState>,
    table: String,
    filter: Option<Filter>,
) -> Result<QueryResult, String> {
    let driver = driver(&state)?;
    into_ui(records::query(driver.as_ref(), &table, filter.as_ref()).await)
}

#[tauri::command]
pub async fn load_record(
    state: State<'_, AppState>,
    table: String,
    record_id: String,
) -> Result<Record, String> {
    let driver = driver(&state)?;
    let primary_key = into_ui(schema::editable_key(driver.as_ref(), &table).await)?;
    into_ui(records::load_for_update(driver.as_ref(), &table, &primary_key, &record_id).await)
}

#[tauri::command]
pub async fn setup_triggers(state: State<'_, AppState>) -> Result<String, String> {
    let driver = driver(&state)?;
    into_ui(script::setup_triggers(driver.as_ref(), &state.config).await)
}

#[tauri::command]
pub async fn setup_views(state: State<'_, AppState>) -> Result<String, String> {
    let driver = driver(&state)?;
    into_ui(script::setup_views(driver.as_ref(), &state.config).await)
}

#[tauri::command]
pub async fn check_triggers(state: State<'_, AppState>) -> Result<String, String> {
    let driver = driver(&state)?;
    into_ui(admin::check_required_triggers(driver.as_ref(), &state.config.required_triggers).await)
}

#[tauri::command]
pub async fn list_triggers(state: State<'_, AppState>) -> Result<Vec<TriggerDescriptor>, String> {
    let driver = driver(&state)?;
    into_ui(admin::list_triggers(driver.as_ref()).await)
}

#[tauri::command]
pub async fn set_trigger_enabled(
    state: State<'_, AppState>,
    trigger: String,
    enabled: bool,
) -> Result<String, String> {
    let driver = driver(&state)?;
    into_ui(admin::set_enabled(driver.as_ref(), &trigger, enabled).await)
}

/// The UI asks for confirmation before calling this.
#[tauri::command]
pub async fn drop_trigger(state: State<'_, AppState>, trigger: String) -> Result<String, String> {
    let driver = driver(&state)?;
    into_ui(admin::drop_trigger(driver.as_ref(), &trigger).await)
}

#[tauri::command]
pub fn list_views(state: State<'_, AppState>) -> Vec<String> {
    state.config.known_views.clone()
}

#[tauri::command]
pub async fn execute_view(state: State<'_, AppState>, view: String) -> Result<QueryResult, String> {
    let driver = driver(&state)?;
    into_ui(admin::execute_view(driver.as_ref(), &view).await)
}

#[tauri::command]
pub async fn get_active_alerts(
    state: State<'_, AppState>,
    tier: Option<PriorityTier>,
) -> Result<QueryResult, String> {
    let driver = driver(&state)?;
    into_ui(alerts::get_active_alerts(driver.as_ref(), tier).await)
}

#[tauri::command]
pub async fn list_alerts(state: State<'_, AppState>, tier: Option<PriorityTier>) -> Result<Vec<Alert>, String> {
    let driver = driver(&state)?;
    let result = into_ui(alerts::get_active_alerts(driver.as_ref(), tier).await)?;
    Ok(alerts::parse_alerts(&result))
}

#[tauri::command]
pub async fn check_new_alerts(state: State<'_, AppState>) -> Result<i64, String> {
    let driver = driver(&state)?;
    into_ui(
        alerts::check_new_high_priority_alerts(driver.as_ref(), state.config.new_alert_window_minutes)
            .await,
    )
}

#[tauri::command]
pub async fn ensure_notification_table(state: State<'_, AppState>) -> Result<String, String> {
    let driver = driver(&state)?;
    into_ui(alerts::ensure_notification_table(driver.as_ref(), &state.config.admin_email).await)
}

#[tauri::command]
pub async fn get_notification_settings(
    state: State<'_, AppState>,
    email: Option<String>,
) -> Result<QueryResult, String> {
    let driver = driver(&state)?;
    into_ui(alerts::get_notification_settings(driver.as_ref(), email.as_deref()).await)
}

#[tauri::command]
pub async fn load_notification_settings(
    state: State<'_, AppState>,
    email: String,
) -> Result<NotificationPreference, String> {
    let driver = driver(&state)?;
    into_ui(alerts::load_settings_for_email(driver.as_ref(), &email).await)
}

#[tauri::command]
pub async fn save_notification_settings(
    state: State<'_, AppState>,
    email: String,
    flags: PriorityFlags,
) -> Result<String, String> {
    let driver = driver(&state)?;
    into_ui(alerts::upsert_settings(driver.as_ref(), &email, flags).await)
}

/// Called by the UI whenever the visible tab or the notification email changes.
#[tauri::command]
pub fn set_alert_gate(state: State<'_, AppState>, gate: WatchGate) {
    state.set_watch_gate(gate);
}

#[tauri::command]
pub async fn get_statistics(state: State<'_, AppState>) -> Result<StatsBundle, String> {
    let driver = driver(&state)?;
    Ok(stats::get_statistics(driver.as_ref()).await)
}

/// Returns the id the profile was stored under.
#[tauri::command]
pub async fn save_connection(app: AppHandle, connection: ConnectionProfile) -> Result<String, String> {
    into_ui(storage::add_connection(&data_dir(&app)?, connection))
}

#[tauri::command]
pub async fn load_connections(app: AppHandle) -> Result<Vec<ConnectionProfile>, String> {
    into_ui(storage::load_connections(&data_dir(&app)?))
}

#[tauri::command]
pub async fn delete_connection(app: AppHandle, id: String) -> Result<(), String> {
    into_ui(storage::delete_connection(&data_dir(&app)?, &id))
}

#[tauri::command]
pub async fn save_session(app: AppHandle, session: Session) -> Result<(), String> {
    into_ui(storage::save_session(&data_dir(&app)?, &session))
}

#[tauri::command]
pub async fn load_session(app: AppHandle) -> Result<Session, String> {
    into_ui(storage::load_session(&data_dir(&app)?))
}
