use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the connect form collects.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectParams {
    /// Host name or address, optionally with a named instance (`HOST\SQLEXPRESS`).
    pub server: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
}

impl ConnectParams {
    /// Credentialed login is used only when both halves are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.trim().is_empty() && !pass.is_empty() => {
                Some((user.trim(), pass))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub server: String,
    pub database_name: String,
    pub server_version: String,
    pub table_count: i64,
}

/// A saved connect form. Passwords are never persisted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConnectionProfile {
    pub id: String,
    pub name: String,
    pub server: String,
    pub database: String,
    pub username: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// First cell of the first row, if any.
    pub fn scalar(&self) -> Option<&serde_json::Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub identity: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Option<String>,
}

/// A column requested in the create-table form.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
}

/// A scalar bound as a statement parameter.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Form semantics: blank text and null both mean "leave this column alone".
    pub fn is_blank(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text inputs are trimmed before binding, matching what the user sees in the form.
    pub fn normalized(&self) -> SqlValue {
        match self {
            SqlValue::Text(s) => SqlValue::Text(s.trim().to_string()),
            other => other.clone(),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

/// One input of a generated insert/update form.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FieldInput {
    pub name: String,
    pub value: SqlValue,
}

impl FieldInput {
    pub fn new(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A row keyed by column name.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = "LIKE", alias = "like", alias = "Like")]
    Like,
}

impl FilterOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::GtEq => ">=",
            FilterOperator::LtEq => "<=",
            FilterOperator::Like => "LIKE",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: SqlValue,
}

/// Alert tiers shown in the filter combo. Level 4 is the most urgent.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

impl PriorityTier {
    pub fn levels(&self) -> &'static [i64] {
        match self {
            PriorityTier::High => &[3, 4],
            PriorityTier::Medium => &[2],
            PriorityTier::Low => &[1],
        }
    }

    pub fn from_level(level: i64) -> Option<Self> {
        [PriorityTier::High, PriorityTier::Medium, PriorityTier::Low]
            .into_iter()
            .find(|tier| tier.levels().contains(&level))
    }
}

/// Colour label for a single priority level, as used by the statistics page.
pub fn priority_label(level: i64) -> Option<&'static str> {
    match level {
        4 => Some("red"),
        3 => Some("orange"),
        2 => Some("yellow"),
        1 => Some("green"),
        _ => None,
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Alert {
    pub id: i64,
    pub asteroid_name: Option<String>,
    pub alert_date: Option<String>,
    pub priority_level: i64,
    pub tier: Option<PriorityTier>,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFlags {
    pub high: bool,
    pub medium: bool,
    pub low: bool,
}

impl Default for PriorityFlags {
    fn default() -> Self {
        Self {
            high: true,
            medium: false,
            low: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotificationPreference {
    pub email: String,
    pub flags: PriorityFlags,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TriggerDescriptor {
    pub name: String,
    pub table: Option<String>,
    pub enabled: bool,
    pub created: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ScriptReport {
    pub batches_found: usize,
    pub executed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PrecisionPoint {
    pub year: i64,
    pub avg_rms: f64,
    pub calculations: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CriticalApproach {
    pub asteroid: String,
    pub distance_ld: f64,
    pub date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct StatsBundle {
    pub total_asteroids: i64,
    pub total_neos: i64,
    pub total_phas: i64,
    pub total_phas_over_100m: i64,
    pub active_alerts: i64,
    pub new_neos_last_month: i64,
    pub alerts_by_tier: BTreeMap<String, i64>,
    pub classifications: BTreeMap<String, i64>,
    pub size_distribution: BTreeMap<String, i64>,
    pub precision_by_year: Vec<PrecisionPoint>,
    pub next_critical_approach: Option<CriticalApproach>,
}
