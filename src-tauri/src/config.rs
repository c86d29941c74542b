use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DbResult;

pub const CONFIG_FILE_NAME: &str = "asterdb.json";

/// Application settings. Every field has a default so a partial file is fine.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Prefills the connect form; never used to reconnect silently.
    pub default_server: String,
    pub default_database: String,
    pub connect_timeout_secs: u64,
    pub alert_poll_interval_secs: u64,
    /// How far back a high-priority alert still counts as "new".
    pub new_alert_window_minutes: i64,
    pub trigger_script: PathBuf,
    pub view_script: PathBuf,
    pub required_triggers: Vec<String>,
    pub known_views: Vec<String>,
    pub admin_email: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_server: r"localhost\SQLEXPRESS".to_string(),
            default_database: "NEO_Monitoring".to_string(),
            connect_timeout_secs: 10,
            alert_poll_interval_secs: 60,
            new_alert_window_minutes: 24 * 60,
            trigger_script: PathBuf::from("triggers.txt"),
            view_script: PathBuf::from("queries.txt"),
            required_triggers: vec![
                "trg_Alert_New_PHA".to_string(),
                "trg_Alert_Close_Approach".to_string(),
                "trg_Alert_Large_Diameter".to_string(),
            ],
            known_views: vec![
                "vw_Ranking_Maiores_PHA".to_string(),
                "vw_Proximos_Eventos_Criticos".to_string(),
                "vw_Estatisticas_Centros".to_string(),
                "vw_Evolucao_Precisao".to_string(),
                "vw_Alertas_Ativos".to_string(),
                "vw_Estatisticas_Alertas".to_string(),
                "vw_Novos_NEOs_Ultimo_Mes".to_string(),
            ],
            admin_email: "admin@localhost".to_string(),
        }
    }
}

impl AppConfig {
    /// Read `path` if it exists (defaults otherwise), then apply `ASTERDB_*`
    /// environment overrides. A `.env` file in the working directory is honoured.
    pub fn load(path: &Path) -> DbResult<Self> {
        dotenvy::dotenv().ok();

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(v) = var("ASTERDB_SERVER") {
            self.default_server = v;
        }
        if let Some(v) = var("ASTERDB_DATABASE") {
            self.default_database = v;
        }
        if let Some(v) = var("ASTERDB_CONNECT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.connect_timeout_secs = v;
        }
        if let Some(v) = var("ASTERDB_ALERT_POLL_SECS").and_then(|v| v.parse().ok()) {
            self.alert_poll_interval_secs = v;
        }
        if let Some(v) = var("ASTERDB_ALERT_WINDOW_MINUTES").and_then(|v| v.parse().ok()) {
            self.new_alert_window_minutes = v;
        }
        if let Some(v) = var("ASTERDB_ADMIN_EMAIL") {
            self.admin_email = v;
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn alert_poll_interval(&self) -> Duration {
        Duration::from_secs(self.alert_poll_interval_secs.max(1))
    }
}
