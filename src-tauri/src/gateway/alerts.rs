use crate::db::{placeholders, DatabaseDriver};
use crate::error::{DbError, DbResult};
use crate::gateway::{cell_bool, cell_i64, cell_string};
use crate::models::{
    Alert, NotificationPreference, PriorityFlags, PriorityTier, QueryResult, SqlValue,
};

pub const NOTIFICATION_TABLE: &str = "NotificationSettings";

/// Active alerts, most urgent and most recent first.
pub async fn get_active_alerts(
    driver: &dyn DatabaseDriver,
    tier: Option<PriorityTier>,
) -> DbResult<QueryResult> {
    let mut sql = String::from(
        "SELECT a.alert_id, ast.full_name AS asteroid_name, a.alert_date, \
                a.priority_level, a.description, a.is_active \
         FROM Alert a \
         LEFT JOIN Asteroid ast ON a.asteroid_id = ast.asteroid_id \
         WHERE a.is_active = 1",
    );
    let mut params = Vec::new();

    if let Some(tier) = tier {
        let levels = tier.levels();
        sql.push_str(&format!(" AND a.priority_level IN ({})", placeholders(1, levels.len())));
        params.extend(levels.iter().map(|l| SqlValue::Int(*l)));
    }
    sql.push_str(" ORDER BY a.priority_level DESC, a.alert_date DESC");

    driver.query(&sql, &params).await
}

/// Typed view of a [`get_active_alerts`] result.
pub fn parse_alerts(result: &QueryResult) -> Vec<Alert> {
    let col = |name: &str, fallback: usize| result.column_index(name).unwrap_or(fallback);
    let (id, name, date, level, desc, active) = (
        col("alert_id", 0),
        col("asteroid_name", 1),
        col("alert_date", 2),
        col("priority_level", 3),
        col("description", 4),
        col("is_active", 5),
    );

    result
        .rows
        .iter()
        .filter_map(|row| {
            let priority_level = cell_i64(row.get(level)).unwrap_or(0);
            Some(Alert {
                id: cell_i64(row.get(id))?,
                asteroid_name: cell_string(row.get(name)),
                alert_date: cell_string(row.get(date)),
                priority_level,
                tier: PriorityTier::from_level(priority_level),
                description: cell_string(row.get(desc)),
                is_active: cell_bool(row.get(active)).unwrap_or(true),
            })
        })
        .collect()
}

/// Number of active high-tier alerts raised within the last `window_minutes`.
pub async fn check_new_high_priority_alerts(
    driver: &dyn DatabaseDriver,
    window_minutes: i64,
) -> DbResult<i64> {
    let levels = PriorityTier::High.levels();
    let sql = format!(
        "SELECT COUNT(*) FROM Alert \
         WHERE priority_level IN ({}) \
           AND is_active = 1 \
           AND alert_date > DATEADD(MINUTE, -CAST(@P{} AS INT), GETDATE())",
        placeholders(1, levels.len()),
        levels.len() + 1
    );
    let mut params: Vec<SqlValue> = levels.iter().map(|l| SqlValue::Int(*l)).collect();
    // DATEADD takes an INT; the cast covers the BIGINT an i64 binds as.
    params.push(SqlValue::Int(window_minutes.clamp(0, i32::MAX as i64)));

    let result = driver.query(&sql, &params).await?;
    Ok(cell_i64(result.scalar()).unwrap_or(0))
}

/// Create the preferences table and the admin row unless the table already exists.
pub async fn ensure_notification_table(driver: &dyn DatabaseDriver, admin_email: &str) -> DbResult<String> {
    let exists = driver
        .query(
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = @P1",
            &[SqlValue::from(NOTIFICATION_TABLE)],
        )
        .await?;
    if !exists.rows.is_empty() {
        return Ok("Notification table already exists".to_string());
    }

    // One batch, so the table, its index and the admin row commit together.
    driver
        .execute_committed(
            "CREATE TABLE NotificationSettings (\n\
                 setting_id INT IDENTITY(1,1) PRIMARY KEY,\n\
                 email NVARCHAR(255) NOT NULL UNIQUE,\n\
                 high_priority BIT DEFAULT 1,\n\
                 medium_priority BIT DEFAULT 0,\n\
                 low_priority BIT DEFAULT 0,\n\
                 created_at DATETIME DEFAULT GETDATE(),\n\
                 updated_at DATETIME DEFAULT GETDATE()\n\
             );\n\
             CREATE INDEX idx_email ON NotificationSettings(email);\n\
             INSERT INTO NotificationSettings (email, high_priority, medium_priority, low_priority) \
             VALUES (@P1, 1, 1, 1);",
            &[SqlValue::from(admin_email.trim())],
        )
        .await?;
    tracing::info!(admin = admin_email.trim(), "notification table created");
    Ok("Notification table created successfully".to_string())
}

/// Every stored preference, or just the one for `email`.
pub async fn get_notification_settings(
    driver: &dyn DatabaseDriver,
    email: Option<&str>,
) -> DbResult<QueryResult> {
    let mut sql = String::from(
        "SELECT email, high_priority, medium_priority, low_priority, updated_at \
         FROM NotificationSettings",
    );
    let mut params = Vec::new();
    if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
        sql.push_str(" WHERE email = @P1");
        params.push(SqlValue::from(email));
    }
    sql.push_str(" ORDER BY updated_at DESC");
    driver.query(&sql, &params).await
}

fn require_email(email: &str) -> DbResult<&str> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(DbError::Validation(format!("'{}' is not an email address", email)));
    }
    Ok(email)
}

/// Stored flags for `email`, or the defaults (high only) when it has none.
pub async fn load_settings_for_email(
    driver: &dyn DatabaseDriver,
    email: &str,
) -> DbResult<NotificationPreference> {
    let email = require_email(email)?;
    let result = driver
        .query(
            "SELECT high_priority, medium_priority, low_priority \
             FROM NotificationSettings WHERE email = @P1",
            &[SqlValue::from(email)],
        )
        .await?;

    let flags = match result.rows.first() {
        Some(row) => PriorityFlags {
            high: cell_bool(row.first()).unwrap_or(false),
            medium: cell_bool(row.get(1)).unwrap_or(false),
            low: cell_bool(row.get(2)).unwrap_or(false),
        },
        None => PriorityFlags::default(),
    };
    Ok(NotificationPreference {
        email: email.to_string(),
        flags,
    })
}

/// Insert or update the preference row for `email`.
pub async fn upsert_settings(
    driver: &dyn DatabaseDriver,
    email: &str,
    flags: PriorityFlags,
) -> DbResult<String> {
    let email = require_email(email)?;
    let existing = driver
        .query(
            "SELECT 1 FROM NotificationSettings WHERE email = @P1",
            &[SqlValue::from(email)],
        )
        .await?;

    let flag_params = vec![
        SqlValue::Bool(flags.high),
        SqlValue::Bool(flags.medium),
        SqlValue::Bool(flags.low),
        SqlValue::from(email),
    ];
    if existing.rows.is_empty() {
        driver
            .execute_committed(
                "INSERT INTO NotificationSettings (high_priority, medium_priority, low_priority, email) \
                 VALUES (@P1, @P2, @P3, @P4)",
                &flag_params,
            )
            .await?;
    } else {
        driver
            .execute_committed(
                "UPDATE NotificationSettings \
                 SET high_priority = @P1, medium_priority = @P2, low_priority = @P3, updated_at = GETDATE() \
                 WHERE email = @P4",
                &flag_params,
            )
            .await?;
    }
    tracing::info!(email, ?flags, "notification settings saved");
    Ok("Notification settings saved successfully".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{rows, FakeDriver, Reply};
    use serde_json::json;

    #[tokio::test]
    async fn high_tier_filter_binds_levels_three_and_four() {
        let driver = FakeDriver::new(|_, _| Ok(rows(&["alert_id"], vec![])));
        get_active_alerts(&driver, Some(PriorityTier::High)).await.unwrap();
        let call = &driver.calls()[0];
        assert!(call.contains("LEFT JOIN Asteroid"));
        assert!(call.contains("a.priority_level IN (@P1, @P2)"));
        assert_eq!(driver.params(0), vec![SqlValue::Int(3), SqlValue::Int(4)]);
    }

    #[tokio::test]
    async fn no_tier_means_no_priority_predicate() {
        let driver = FakeDriver::new(|_, _| Ok(rows(&["alert_id"], vec![])));
        get_active_alerts(&driver, None).await.unwrap();
        assert!(!driver.calls()[0].contains("IN ("));
        assert!(driver.params(0).is_empty());
    }

    #[test]
    fn parses_alert_rows_with_missing_names() {
        let result = QueryResult {
            columns: ["alert_id", "asteroid_name", "alert_date", "priority_level", "description", "is_active"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            rows: vec![
                vec![json!(7), json!(null), json!("2025-03-01 12:00:00"), json!(4), json!("PHA within 2 LD"), json!(true)],
                vec![json!(8), json!("433 Eros"), json!(null), json!(2), json!(null), json!(1)],
            ],
        };
        let alerts = parse_alerts(&result);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].asteroid_name, None);
        assert_eq!(alerts[0].tier, Some(PriorityTier::High));
        assert_eq!(alerts[1].tier, Some(PriorityTier::Medium));
        assert!(alerts[1].is_active);
    }

    #[tokio::test]
    async fn new_alert_count_uses_window() {
        let driver = FakeDriver::new(|_, _| Ok(rows(&[""], vec![vec![json!(2)]])));
        assert_eq!(check_new_high_priority_alerts(&driver, 5).await.unwrap(), 2);
        assert_eq!(driver.params(0), vec![SqlValue::Int(3), SqlValue::Int(4), SqlValue::Int(5)]);
    }

    #[tokio::test]
    async fn window_is_cast_to_int_for_dateadd() {
        let driver = FakeDriver::new(|_, _| Ok(rows(&[""], vec![vec![json!(0)]])));
        check_new_high_priority_alerts(&driver, i64::MAX).await.unwrap();
        assert!(driver.calls()[0].contains("DATEADD(MINUTE, -CAST(@P3 AS INT), GETDATE())"));
        assert_eq!(driver.params(0)[2], SqlValue::Int(i32::MAX as i64));

        check_new_high_priority_alerts(&driver, -30).await.unwrap();
        assert_eq!(driver.params(1)[2], SqlValue::Int(0));
    }

    #[tokio::test]
    async fn ensure_table_is_idempotent() {
        let driver = FakeDriver::new(|_, _| Ok(rows(&["TABLE_NAME"], vec![vec![json!("NotificationSettings")]])));
        assert_eq!(
            ensure_notification_table(&driver, "admin@localhost").await.unwrap(),
            "Notification table already exists"
        );
        assert_eq!(driver.calls().len(), 1);
    }

    #[tokio::test]
    async fn ensure_table_creates_index_and_admin_row() {
        let driver = FakeDriver::new(|sql, _| {
            if sql.contains("INFORMATION_SCHEMA") {
                Ok(rows(&["TABLE_NAME"], vec![]))
            } else {
                Ok(Reply::Affected(1))
            }
        });
        ensure_notification_table(&driver, "admin@localhost").await.unwrap();
        let calls = driver.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].starts_with("execute: CREATE TABLE NotificationSettings"));
        assert!(calls[1].contains("CREATE INDEX idx_email"));
        assert!(calls[1].contains("INSERT INTO NotificationSettings"));
        assert_eq!(driver.params(1), vec![SqlValue::from("admin@localhost")]);
        assert_eq!(calls[2], "commit");
    }

    #[tokio::test]
    async fn unknown_email_gets_default_flags() {
        let driver = FakeDriver::new(|_, _| Ok(rows(&["high_priority"], vec![])));
        let pref = load_settings_for_email(&driver, "ops@example.org").await.unwrap();
        assert_eq!(pref.flags, PriorityFlags::default());
        assert!(load_settings_for_email(&driver, "   ").await.is_err());
    }

    #[tokio::test]
    async fn upsert_inserts_new_and_updates_existing() {
        let flags = PriorityFlags { high: true, medium: true, low: false };

        let fresh = FakeDriver::new(|sql, _| {
            if sql.starts_with("SELECT 1") {
                Ok(rows(&[""], vec![]))
            } else {
                Ok(Reply::Affected(1))
            }
        });
        upsert_settings(&fresh, "ops@example.org", flags).await.unwrap();
        assert!(fresh.calls()[1].starts_with("execute: INSERT INTO NotificationSettings"));
        assert_eq!(
            fresh.params(1),
            vec![SqlValue::Bool(true), SqlValue::Bool(true), SqlValue::Bool(false), SqlValue::from("ops@example.org")]
        );

        let known = FakeDriver::new(|sql, _| {
            if sql.starts_with("SELECT 1") {
                Ok(rows(&[""], vec![vec![json!(1)]]))
            } else {
                Ok(Reply::Affected(1))
            }
        });
        upsert_settings(&known, "ops@example.org", flags).await.unwrap();
        assert!(known.calls()[1].starts_with("execute: UPDATE NotificationSettings"));
        assert_eq!(known.calls()[2], "commit");
    }
}
