use crate::db::DatabaseDriver;
use crate::error::{DbError, DbResult};
use crate::gateway::{cell_bool, cell_i64, cell_string, first_column_strings};
use crate::models::{ColumnDescriptor, SqlValue, TableDescriptor};

/// Base tables in the current database, sorted. Empty on any failure.
pub async fn list_tables(driver: &dyn DatabaseDriver) -> Vec<String> {
    let result = driver
        .query(
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_TYPE = 'BASE TABLE' \
             ORDER BY TABLE_NAME",
            &[],
        )
        .await;

    match result {
        Ok(result) => {
            let mut tables = first_column_strings(&result);
            tables.sort();
            tables
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to list tables");
            Vec::new()
        }
    }
}

/// Columns of `table` in physical order.
pub async fn get_columns(driver: &dyn DatabaseDriver, table: &str) -> DbResult<Vec<ColumnDescriptor>> {
    let result = driver
        .query(
            "SELECT COLUMN_NAME, DATA_TYPE, CHARACTER_MAXIMUM_LENGTH, \
                    NUMERIC_PRECISION, NUMERIC_SCALE, IS_NULLABLE, \
                    COLUMNPROPERTY(OBJECT_ID(QUOTENAME(TABLE_SCHEMA) + '.' + QUOTENAME(TABLE_NAME)), \
                                   COLUMN_NAME, 'IsIdentity') AS IS_IDENTITY \
             FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_NAME = @P1 \
             ORDER BY ORDINAL_POSITION",
            &[SqlValue::from(table.trim())],
        )
        .await?;

    let columns = result
        .rows
        .iter()
        .filter_map(|row| {
            let name = cell_string(row.first())?;
            let data_type = cell_string(row.get(1)).unwrap_or_default();
            Some(ColumnDescriptor {
                name,
                sql_type: render_sql_type(
                    &data_type,
                    cell_i64(row.get(2)),
                    cell_i64(row.get(3)),
                    cell_i64(row.get(4)),
                ),
                nullable: cell_string(row.get(5)).map(|v| v == "YES").unwrap_or(true),
                identity: cell_bool(row.get(6)).unwrap_or(false),
            })
        })
        .collect();

    Ok(columns)
}

/// `varchar(50)`, `nvarchar(max)`, `decimal(10,2)`, or the bare type name.
pub fn render_sql_type(
    data_type: &str,
    char_length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> String {
    match char_length {
        Some(-1) => return format!("{}(max)", data_type),
        Some(len) if len > 0 => return format!("{}({})", data_type, len),
        _ => {}
    }
    let lower = data_type.to_ascii_lowercase();
    if lower == "decimal" || lower == "numeric" {
        if let Some(p) = precision {
            return format!("{}({},{})", data_type, p, scale.unwrap_or(0));
        }
    }
    data_type.to_string()
}

/// The primary-key column of `table`, or `None` when the table has no key or a
/// composite one. Callers must treat `None` as "update/delete unsafe".
pub async fn get_primary_key(driver: &dyn DatabaseDriver, table: &str) -> DbResult<Option<String>> {
    let result = driver
        .query(
            "SELECT kcu.COLUMN_NAME \
             FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
             JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
               ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
              AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA \
              AND tc.TABLE_NAME = kcu.TABLE_NAME \
             WHERE tc.TABLE_NAME = @P1 AND tc.CONSTRAINT_TYPE = 'PRIMARY KEY' \
             ORDER BY kcu.ORDINAL_POSITION",
            &[SqlValue::from(table.trim())],
        )
        .await?;

    let mut keys = first_column_strings(&result);
    if keys.len() == 1 {
        Ok(keys.pop())
    } else {
        if keys.len() > 1 {
            tracing::debug!(table, columns = ?keys, "composite primary key is not editable");
        }
        Ok(None)
    }
}

/// The key update and delete go through. Tables without a single-column key
/// are refused before any row SQL is built.
pub async fn editable_key(driver: &dyn DatabaseDriver, table: &str) -> DbResult<String> {
    let table = describe_table(driver, table).await?;
    table.require_primary_key().map(str::to_string)
}

/// Columns and key of `table`, read fresh from the catalog.
pub async fn describe_table(driver: &dyn DatabaseDriver, table: &str) -> DbResult<TableDescriptor> {
    let columns = get_columns(driver, table).await?;
    if columns.is_empty() {
        return Err(DbError::Validation(format!("table '{}' does not exist or has no columns", table)));
    }
    let primary_key = get_primary_key(driver, table).await?;
    Ok(TableDescriptor {
        name: table.trim().to_string(),
        columns,
        primary_key,
    })
}

impl TableDescriptor {
    /// Fields shown on the insert form: identity columns are generated by the server.
    pub fn insert_form_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| !c.identity).collect()
    }

    /// Fields shown on the update form: everything but the key.
    pub fn update_form_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns
            .iter()
            .filter(|c| {
                self.primary_key
                    .as_deref()
                    .map_or(true, |pk| !c.name.eq_ignore_ascii_case(pk))
            })
            .collect()
    }

    /// Text for the warning banner shown instead of the update/delete forms.
    pub fn primary_key_warning(&self) -> Option<String> {
        match self.primary_key {
            Some(_) => None,
            None => Some(format!(
                "Table '{}' has no single-column primary key; update and delete are disabled.",
                self.name
            )),
        }
    }

    pub fn require_primary_key(&self) -> DbResult<&str> {
        self.primary_key.as_deref().ok_or_else(|| {
            DbError::Validation(self.primary_key_warning().unwrap_or_default())
        })
    }
}
