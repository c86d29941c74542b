//! Batch execution of SQL script files.
//!
//! A script is split on standalone `GO` lines (or on `;` when it has none).
//! Each batch runs in its own transaction: success commits immediately, failure
//! rolls back just that batch and the run carries on with the next one.

use std::path::Path;

use crate::config::AppConfig;
use crate::db::DatabaseDriver;
use crate::error::{DbError, DbResult};
use crate::models::ScriptReport;

/// Errors listed in the failure message; the rest are counted only.
const MAX_REPORTED_ERRORS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMode {
    /// Run every batch.
    All,
    /// Run only `CREATE VIEW` / `CREATE OR ALTER VIEW` batches.
    ViewsOnly,
}

fn is_go_token(token: &str) -> bool {
    token.trim_matches(';').eq_ignore_ascii_case("GO")
}

fn is_delimiter_line(line: &str) -> bool {
    is_go_token(line.trim())
}

/// Drop `USE <db> ... GO` lines; the connection is already scoped to its database.
pub fn strip_use_lines(script: &str) -> String {
    script
        .lines()
        .filter(|line| {
            let mut tokens = line.split_whitespace();
            let starts_with_use = tokens
                .next()
                .is_some_and(|t| t.eq_ignore_ascii_case("USE"));
            !(starts_with_use && tokens.any(is_go_token))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split into batches, preserving order. A trailing batch without a
/// terminating delimiter is kept.
pub fn split_batches(script: &str) -> Vec<String> {
    let script = script.trim_start_matches('\u{feff}');

    if !script.lines().any(is_delimiter_line) {
        return script
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    let mut batches = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in script.lines() {
        if is_delimiter_line(line) {
            push_batch(&mut batches, &current);
            current.clear();
        } else {
            current.push(line);
        }
    }
    push_batch(&mut batches, &current);
    batches
}

fn push_batch(batches: &mut Vec<String>, lines: &[&str]) {
    let batch = lines.join("\n");
    let batch = batch.trim();
    if !batch.is_empty() {
        batches.push(batch.to_string());
    }
}

fn is_create_view(batch: &str) -> bool {
    let words: Vec<String> = batch
        .split_whitespace()
        .take(4)
        .map(|w| w.to_ascii_uppercase())
        .collect();
    matches!(
        words.iter().map(String::as_str).collect::<Vec<_>>().as_slice(),
        ["CREATE", "VIEW", ..] | ["CREATE", "OR", "ALTER", "VIEW", ..]
    )
}

fn preview(batch: &str) -> String {
    let first = batch.lines().next().unwrap_or_default();
    first.chars().take(60).collect()
}

/// Execute every batch of `script` in order.
///
/// Fails with [`DbError::ScriptFailed`] when any batch failed; batches that
/// succeeded before or after it remain committed.
pub async fn run_script(
    driver: &dyn DatabaseDriver,
    script: &str,
    mode: ScriptMode,
) -> DbResult<ScriptReport> {
    let batches = split_batches(&strip_use_lines(script));
    let mut report = ScriptReport {
        batches_found: batches.len(),
        ..ScriptReport::default()
    };

    for (i, batch) in batches.iter().enumerate() {
        let number = i + 1;
        if mode == ScriptMode::ViewsOnly && !is_create_view(batch) {
            report.skipped += 1;
            continue;
        }

        match driver.execute_batch_committed(batch).await {
            Ok(()) => {
                report.executed += 1;
                tracing::debug!(batch = number, sql = %preview(batch), "batch committed");
            }
            Err(e) => {
                tracing::warn!(batch = number, sql = %preview(batch), error = %e, "batch rolled back");
                report.errors.push(format!("Batch {}: {}", number, e));
            }
        }
    }

    tracing::info!(
        found = report.batches_found,
        executed = report.executed,
        skipped = report.skipped,
        failed = report.errors.len(),
        "script finished"
    );

    if report.errors.is_empty() {
        Ok(report)
    } else {
        Err(DbError::ScriptFailed {
            total: report.batches_found,
            failed: report.errors.len(),
            messages: report.errors.into_iter().take(MAX_REPORTED_ERRORS).collect(),
        })
    }
}

/// Read `path` and run it. A missing file is [`DbError::FileNotFound`].
pub async fn run_script_file(
    driver: &dyn DatabaseDriver,
    path: &Path,
    mode: ScriptMode,
) -> DbResult<ScriptReport> {
    let script = match tokio::fs::read_to_string(path).await {
        Ok(script) => script,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DbError::FileNotFound(path.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(path = %path.display(), ?mode, "running script");
    run_script(driver, &script, mode).await
}

/// Run the configured trigger-definition script.
pub async fn setup_triggers(driver: &dyn DatabaseDriver, config: &AppConfig) -> DbResult<String> {
    let report = run_script_file(driver, &config.trigger_script, ScriptMode::All).await?;
    Ok(format!("Triggers configured successfully ({} batches executed)", report.executed))
}

/// Run the `CREATE VIEW` batches of the configured view-definition script.
pub async fn setup_views(driver: &dyn DatabaseDriver, config: &AppConfig) -> DbResult<String> {
    let report = run_script_file(driver, &config.view_script, ScriptMode::ViewsOnly).await?;
    Ok(format!("{} views configured successfully", report.executed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{FakeDriver, Reply};
    use tempfile::TempDir;

    fn ok_driver() -> FakeDriver {
        FakeDriver::new(|_, _| Ok(Reply::Affected(0)))
    }

    #[test]
    fn splits_on_standalone_go_lines() {
        let script = "CREATE TABLE a (x int)\nGO\n\ngo\nINSERT INTO a VALUES (1)\n  GO  \nSELECT 1";
        assert_eq!(
            split_batches(script),
            vec!["CREATE TABLE a (x int)", "INSERT INTO a VALUES (1)", "SELECT 1"]
        );
    }

    #[test]
    fn go_inside_a_line_is_not_a_delimiter() {
        let script = "SELECT 'GO' AS word\nGO\nSELECT category FROM Goals";
        assert_eq!(split_batches(script), vec!["SELECT 'GO' AS word", "SELECT category FROM Goals"]);
    }

    #[test]
    fn falls_back_to_semicolons_without_go() {
        assert_eq!(split_batches("SELECT 1; SELECT 2;\n;"), vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn strips_use_lines_carrying_a_delimiter() {
        let script = "USE NEO_Monitoring; GO\nuse NEO go\nUSE NEO\nSELECT 1";
        assert_eq!(strip_use_lines(script), "USE NEO\nSELECT 1");
    }

    #[test]
    fn recognises_view_batches() {
        assert!(is_create_view("CREATE VIEW vw_A AS SELECT 1"));
        assert!(is_create_view("create or alter view vw_A as select 1"));
        assert!(!is_create_view("DROP VIEW IF EXISTS vw_A"));
        assert!(!is_create_view("CREATE TRIGGER trg ON t AFTER INSERT AS SELECT 1"));
    }

    #[tokio::test]
    async fn failing_middle_batch_is_rolled_back_and_run_continues() {
        let driver = FakeDriver::new(|sql, _| {
            if sql.contains("batch2") {
                Err(DbError::SqlExecution("Invalid object name 'batch2'.".into()))
            } else {
                Ok(Reply::Affected(0))
            }
        });
        let script = "SELECT 'batch1'\nGO\nSELECT * FROM batch2\nGO\nSELECT 'batch3'";

        let err = run_script(&driver, script, ScriptMode::All).await.unwrap_err();
        match err {
            DbError::ScriptFailed { total, failed, messages } => {
                assert_eq!((total, failed), (3, 1));
                assert!(messages[0].starts_with("Batch 2:"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(
            driver.calls(),
            vec![
                "batch: SELECT 'batch1'",
                "commit",
                "batch: SELECT * FROM batch2",
                "rollback",
                "batch: SELECT 'batch3'",
                "commit",
            ]
        );
    }

    #[tokio::test]
    async fn views_only_mode_skips_other_batches() {
        let driver = ok_driver();
        let script = "DROP VIEW IF EXISTS vw_A\nGO\nCREATE VIEW vw_A AS SELECT 1 AS x\nGO\nCREATE VIEW vw_B AS SELECT 2 AS y";
        let report = run_script(&driver, script, ScriptMode::ViewsOnly).await.unwrap();
        assert_eq!(report.batches_found, 3);
        assert_eq!(report.executed, 2);
        assert_eq!(report.skipped, 1);
        assert!(driver.position("DROP VIEW").is_none());
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let driver = ok_driver();
        let err = run_script_file(&driver, &dir.path().join("triggers.txt"), ScriptMode::All)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::FileNotFound(p) if p.ends_with("triggers.txt")));
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn setup_views_reads_configured_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queries.txt");
        std::fs::write(&path, "\u{feff}CREATE VIEW vw_One AS SELECT 1 AS x\nGO\n").unwrap();
        let config = AppConfig {
            view_script: path,
            ..AppConfig::default()
        };

        let driver = ok_driver();
        assert_eq!(setup_views(&driver, &config).await.unwrap(), "1 views configured successfully");
    }
}
