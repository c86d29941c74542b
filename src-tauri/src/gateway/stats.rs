//! Aggregate metrics for the statistics page.
//!
//! Every metric is read on its own. A metric that fails is logged and the
//! bundle keeps the zero/empty default, so one missing table never blanks the
//! whole page. These reads never roll back: the session transaction may hold
//! another caller's write.

use std::collections::BTreeMap;
use std::future::Future;

use crate::db::DatabaseDriver;
use crate::error::DbResult;
use crate::gateway::{cell_f64, cell_i64, cell_string};
use crate::models::{priority_label, CriticalApproach, PrecisionPoint, QueryResult, StatsBundle};

const SIZE_BUCKET: &str = "CASE \
        WHEN diameter < 0.01 THEN 'Small (<10m)' \
        WHEN diameter BETWEEN 0.01 AND 0.05 THEN 'Medium (10-50m)' \
        WHEN diameter BETWEEN 0.05 AND 0.1 THEN 'Large (50-100m)' \
        WHEN diameter > 0.1 THEN 'Very large (>100m)' \
        ELSE 'Unknown' \
    END";

async fn guarded<T, F>(metric: &str, fut: F) -> T
where
    T: Default,
    F: Future<Output = DbResult<T>>,
{
    match fut.await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(metric, error = %e, "statistic unavailable");
            T::default()
        }
    }
}

async fn count(driver: &dyn DatabaseDriver, sql: &str) -> DbResult<i64> {
    let result = driver.query(sql, &[]).await?;
    Ok(cell_i64(result.scalar()).unwrap_or(0))
}

/// `label -> count` from a two-column result; null labels become `fallback`.
fn counts_by_label(result: &QueryResult, fallback: &str) -> BTreeMap<String, i64> {
    let mut counts = BTreeMap::new();
    for row in &result.rows {
        let label = cell_string(row.first()).unwrap_or_else(|| fallback.to_string());
        *counts.entry(label).or_insert(0) += cell_i64(row.get(1)).unwrap_or(0);
    }
    counts
}

async fn alerts_by_tier(driver: &dyn DatabaseDriver) -> DbResult<BTreeMap<String, i64>> {
    let result = driver
        .query(
            "SELECT priority_level, COUNT(*) FROM Alert WHERE is_active = 1 GROUP BY priority_level",
            &[],
        )
        .await?;

    let mut counts = BTreeMap::new();
    for row in &result.rows {
        let label = cell_i64(row.first()).and_then(priority_label);
        match label {
            Some(label) => {
                *counts.entry(label.to_string()).or_insert(0) += cell_i64(row.get(1)).unwrap_or(0);
            }
            None => tracing::debug!(level = ?row.first(), "alert level outside 1..=4 ignored"),
        }
    }
    Ok(counts)
}

async fn next_critical_approach(driver: &dyn DatabaseDriver) -> DbResult<Option<CriticalApproach>> {
    let result = driver
        .query(
            "SELECT TOP 1 a.full_name, op.moid_ld, op.epoch \
             FROM Orbital_Parameters op \
             INNER JOIN Asteroid a ON op.asteroid_id = a.asteroid_id \
             WHERE op.moid_ld < 5 \
             ORDER BY op.moid_ld ASC",
            &[],
        )
        .await?;

    Ok(result.rows.first().map(|row| CriticalApproach {
        asteroid: cell_string(row.first()).unwrap_or_default(),
        distance_ld: cell_f64(row.get(1)).unwrap_or(0.0),
        date: cell_string(row.get(2)).map(|d| d.chars().take(10).collect()),
    }))
}

async fn precision_by_year(driver: &dyn DatabaseDriver) -> DbResult<Vec<PrecisionPoint>> {
    let result = driver
        .query(
            "SELECT YEAR(epoch) AS year, AVG(rms) AS avg_rms, COUNT(*) AS calculations \
             FROM Orbital_Parameters \
             WHERE epoch IS NOT NULL AND rms IS NOT NULL \
             GROUP BY YEAR(epoch) \
             ORDER BY year",
            &[],
        )
        .await?;

    Ok(result
        .rows
        .iter()
        .filter_map(|row| {
            Some(PrecisionPoint {
                year: cell_i64(row.first())?,
                avg_rms: cell_f64(row.get(1)).unwrap_or(0.0),
                calculations: cell_i64(row.get(2)).unwrap_or(0),
            })
        })
        .collect())
}

async fn grouped(driver: &dyn DatabaseDriver, sql: &str, fallback: &str) -> DbResult<BTreeMap<String, i64>> {
    let result = driver.query(sql, &[]).await?;
    Ok(counts_by_label(&result, fallback))
}

pub async fn get_statistics(driver: &dyn DatabaseDriver) -> StatsBundle {
    let size_sql = format!(
        "SELECT {bucket} AS bucket, COUNT(*) FROM Asteroid GROUP BY {bucket}",
        bucket = SIZE_BUCKET
    );

    StatsBundle {
        total_asteroids: guarded("total_asteroids", count(driver, "SELECT COUNT(*) FROM Asteroid")).await,
        total_neos: guarded("total_neos", count(driver, "SELECT COUNT(*) FROM Asteroid WHERE neo = 'Y'")).await,
        total_phas: guarded("total_phas", count(driver, "SELECT COUNT(*) FROM Asteroid WHERE pha = 'Y'")).await,
        total_phas_over_100m: guarded(
            "total_phas_over_100m",
            count(driver, "SELECT COUNT(*) FROM Asteroid WHERE pha = 'Y' AND diameter > 0.1"),
        )
        .await,
        active_alerts: guarded("active_alerts", count(driver, "SELECT COUNT(*) FROM Alert WHERE is_active = 1")).await,
        alerts_by_tier: guarded("alerts_by_tier", alerts_by_tier(driver)).await,
        next_critical_approach: guarded("next_critical_approach", next_critical_approach(driver)).await,
        new_neos_last_month: guarded(
            "new_neos_last_month",
            count(
                driver,
                "SELECT COUNT(*) FROM Asteroid \
                 WHERE neo = 'Y' \
                   AND (SELECT MAX(epoch) FROM Orbital_Parameters op \
                        WHERE op.asteroid_id = Asteroid.asteroid_id) > DATEADD(MONTH, -1, GETDATE())",
            ),
        )
        .await,
        precision_by_year: guarded("precision_by_year", precision_by_year(driver)).await,
        classifications: guarded(
            "classifications",
            grouped(
                driver,
                "SELECT COALESCE(class, 'Unclassified'), COUNT(*) FROM Asteroid GROUP BY class",
                "Unclassified",
            ),
        )
        .await,
        size_distribution: guarded("size_distribution", grouped(driver, &size_sql, "Unknown")).await,
    }
}
