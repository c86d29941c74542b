use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::db::DatabaseDriver;
use crate::error::{DbError, DbResult};
use crate::gateway::watch::WatchGate;

/// Holds the one live connection. Connecting again replaces it.
pub struct ConnectionSlot {
    current: Mutex<Option<Arc<dyn DatabaseDriver>>>,
}

impl ConnectionSlot {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// The live handle. Never reconnects on its own.
    pub fn current(&self) -> DbResult<Arc<dyn DatabaseDriver>> {
        let guard = self
            .current
            .lock()
            .map_err(|e| DbError::Connection(e.to_string()))?;
        guard.clone().ok_or(DbError::NoActiveConnection)
    }

    /// Install `driver`, handing back whatever was there before.
    pub fn replace(&self, driver: Arc<dyn DatabaseDriver>) -> Option<Arc<dyn DatabaseDriver>> {
        match self.current.lock() {
            Ok(mut guard) => guard.replace(driver),
            Err(poisoned) => poisoned.into_inner().replace(driver),
        }
    }

    pub fn take(&self) -> Option<Arc<dyn DatabaseDriver>> {
        match self.current.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Idempotent: closing an empty slot is a no-op.
    pub async fn close(&self) -> DbResult<()> {
        if let Some(driver) = self.take() {
            driver.close().await?;
            tracing::info!("database connection closed");
        }
        Ok(())
    }
}

impl Default for ConnectionSlot {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub connection: ConnectionSlot,
    /// Stops the running alert watcher, if any.
    pub watcher: Mutex<Option<CancellationToken>>,
    /// Read by the watcher on every tick; written by the UI.
    pub watch_gate: Arc<Mutex<WatchGate>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            connection: ConnectionSlot::new(),
            watcher: Mutex::new(None),
            watch_gate: Arc::new(Mutex::new(WatchGate::default())),
        }
    }

    pub fn set_watch_gate(&self, gate: WatchGate) {
        match self.watch_gate.lock() {
            Ok(mut guard) => *guard = gate,
            Err(poisoned) => *poisoned.into_inner() = gate,
        }
    }

    /// Cancel the previous watcher (if any) and remember the new one.
    pub fn replace_watcher(&self, token: Option<CancellationToken>) {
        let previous = match self.watcher.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, token),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), token),
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{FakeDriver, Reply};

    fn fake() -> Arc<FakeDriver> {
        Arc::new(FakeDriver::new(|_, _| Ok(Reply::Affected(0))))
    }

    #[test]
    fn empty_slot_reports_no_connection() {
        let slot = ConnectionSlot::new();
        assert!(matches!(slot.current(), Err(DbError::NoActiveConnection)));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_closes_the_driver() {
        let slot = ConnectionSlot::new();
        let driver = fake();
        slot.replace(driver.clone());
        assert!(slot.current().is_ok());

        slot.close().await.unwrap();
        slot.close().await.unwrap();
        assert!(matches!(slot.current(), Err(DbError::NoActiveConnection)));
        assert_eq!(driver.calls(), vec!["close"]);
    }

    #[test]
    fn replace_returns_previous_handle() {
        let slot = ConnectionSlot::new();
        assert!(slot.replace(fake()).is_none());
        assert!(slot.replace(fake()).is_some());
    }

    #[test]
    fn replacing_watcher_cancels_previous() {
        let state = AppState::new(AppConfig::default());
        let first = CancellationToken::new();
        state.replace_watcher(Some(first.clone()));
        state.replace_watcher(None);
        assert!(first.is_cancelled());
    }

    #[test]
    fn watch_gate_is_shared_with_the_watcher() {
        let state = AppState::new(AppConfig::default());
        let shared = state.watch_gate.clone();
        state.set_watch_gate(WatchGate {
            alerts_visible: true,
            email: Some("ops@example.org".to_string()),
        });
        assert!(shared.lock().unwrap().alerts_visible);
    }
}
