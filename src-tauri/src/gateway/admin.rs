use crate::db::ident::quote_ident;
use crate::db::DatabaseDriver;
use crate::error::{DbError, DbResult};
use crate::gateway::{cell_bool, cell_string, first_column_strings};
use crate::models::{QueryResult, SqlValue, TriggerDescriptor};

/// User-defined table triggers, ordered by name.
pub async fn list_triggers(driver: &dyn DatabaseDriver) -> DbResult<Vec<TriggerDescriptor>> {
    let result = driver
        .query(
            "SELECT name, OBJECT_NAME(parent_id) AS table_name, create_date, is_disabled \
             FROM sys.triggers \
             WHERE parent_class = 1 AND is_ms_shipped = 0 \
             ORDER BY name",
            &[],
        )
        .await?;

    Ok(result
        .rows
        .iter()
        .filter_map(|row| {
            Some(TriggerDescriptor {
                name: cell_string(row.first())?,
                table: cell_string(row.get(1)),
                created: cell_string(row.get(2)),
                enabled: !cell_bool(row.get(3)).unwrap_or(false),
            })
        })
        .collect())
}

/// The table a trigger is attached to.
async fn owning_table(driver: &dyn DatabaseDriver, trigger: &str) -> DbResult<String> {
    let result = driver
        .query(
            "SELECT OBJECT_NAME(parent_id) FROM sys.triggers WHERE name = @P1",
            &[SqlValue::from(trigger.trim())],
        )
        .await?;
    if result.rows.is_empty() {
        return Err(DbError::TriggerNotFound(trigger.trim().to_string()));
    }
    cell_string(result.scalar()).ok_or_else(|| {
        DbError::Validation(format!("trigger '{}' is not attached to a table", trigger.trim()))
    })
}

/// Enable or disable a trigger on its own table.
pub async fn set_enabled(driver: &dyn DatabaseDriver, trigger: &str, enabled: bool) -> DbResult<String> {
    let table = owning_table(driver, trigger).await?;
    let verb = if enabled { "ENABLE" } else { "DISABLE" };
    let sql = format!("{} TRIGGER {} ON {}", verb, quote_ident(trigger)?, quote_ident(&table)?);

    driver.execute_committed(&sql, &[]).await?;
    tracing::info!(trigger = trigger.trim(), table = %table, enabled, "trigger state changed");
    let action = if enabled { "enabled" } else { "disabled" };
    Ok(format!("Trigger '{}' {} successfully", trigger.trim(), action))
}

/// Drop a trigger. Confirmation is the caller's job.
pub async fn drop_trigger(driver: &dyn DatabaseDriver, trigger: &str) -> DbResult<String> {
    let table = owning_table(driver, trigger).await?;
    let sql = format!("DROP TRIGGER IF EXISTS {}", quote_ident(trigger)?);

    driver.execute_committed(&sql, &[]).await?;
    tracing::info!(trigger = trigger.trim(), table = %table, "trigger dropped");
    Ok(format!("Trigger '{}' dropped from table '{}'", trigger.trim(), table))
}

/// Names in `required` that are absent from the trigger catalog.
pub fn missing_triggers(required: &[String], present: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !present.iter().any(|p| p.eq_ignore_ascii_case(name)))
        .cloned()
        .collect()
}

pub async fn check_required_triggers(driver: &dyn DatabaseDriver, required: &[String]) -> DbResult<String> {
    let present = first_column_strings(&driver.query("SELECT name FROM sys.triggers", &[]).await?);
    let missing = missing_triggers(required, &present);
    if !missing.is_empty() {
        return Err(DbError::TriggersMissing(missing));
    }
    Ok(format!("All {} required triggers are present", required.len()))
}

/// `SELECT *` from a view, after checking the view exists.
pub async fn execute_view(driver: &dyn DatabaseDriver, view: &str) -> DbResult<QueryResult> {
    let view = view.trim();
    let exists = driver
        .query(
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.VIEWS WHERE TABLE_NAME = @P1",
            &[SqlValue::from(view)],
        )
        .await?;
    if exists.rows.is_empty() {
        return Err(DbError::ViewNotFound(view.to_string()));
    }
    driver.query(&format!("SELECT * FROM {}", quote_ident(view)?), &[]).await
}
