//! Periodic re-check of new high-priority alerts.
//!
//! The watcher never decides on its own whether the user cares: every tick
//! reads an explicit [`WatchGate`] supplied by the UI.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::DatabaseDriver;
use crate::error::{DbError, DbResult};
use crate::gateway::alerts::{check_new_high_priority_alerts, load_settings_for_email};

/// What the UI currently shows, as far as notifications are concerned.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WatchGate {
    /// The alerts tab is the one on screen.
    pub alerts_visible: bool,
    /// Email whose preferences decide whether high-priority alerts are wanted.
    pub email: Option<String>,
}

/// Receives the count of new alerts whenever a tick finds some.
pub trait NotificationSink: Send + Sync + 'static {
    fn notify(&self, new_alerts: i64);
}

impl<F> NotificationSink for F
where
    F: Fn(i64) + Send + Sync + 'static,
{
    fn notify(&self, new_alerts: i64) {
        self(new_alerts)
    }
}

/// One tick: `Some(count)` when the user should be told about `count` new alerts.
///
/// Without an email there are no preferences to consult, so nothing is read.
pub async fn check_for_notification(
    driver: &dyn DatabaseDriver,
    gate: &WatchGate,
    window_minutes: i64,
) -> DbResult<Option<i64>> {
    if !gate.alerts_visible {
        return Ok(None);
    }

    let Some(email) = gate.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    if !load_settings_for_email(driver, email).await?.flags.high {
        return Ok(None);
    }

    let count = check_new_high_priority_alerts(driver, window_minutes).await?;
    Ok((count > 0).then_some(count))
}

pub struct AlertWatcher {
    pub interval: Duration,
    pub window_minutes: i64,
    pub gate: Arc<Mutex<WatchGate>>,
}

impl AlertWatcher {
    fn current_gate(&self) -> WatchGate {
        match self.gate.lock() {
            Ok(gate) => gate.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Run on the tokio runtime until `token` is cancelled or the connection goes away.
    pub fn spawn<S: NotificationSink>(
        self,
        driver: Arc<dyn DatabaseDriver>,
        sink: S,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; skip it so the first check
            // happens one interval after connecting.
            ticker.tick().await;

            tracing::debug!(interval = ?self.interval, "alert watcher started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let gate = self.current_gate();
                match check_for_notification(driver.as_ref(), &gate, self.window_minutes).await {
                    Ok(Some(count)) => {
                        tracing::info!(count, "new high-priority alerts");
                        sink.notify(count);
                    }
                    Ok(None) => {}
                    Err(e @ (DbError::NoActiveConnection | DbError::Connection(_))) => {
                        tracing::warn!(error = %e, "connection lost, stopping alert watcher");
                        break;
                    }
                    // Reads only: the session may hold another caller's write, so no rollback.
                    Err(e) => tracing::warn!(error = %e, "alert check failed"),
                }
            }
            tracing::debug!("alert watcher stopped");
        })
    }
}
