use crate::db::ident::{check_column_type, quote_ident};
use crate::db::{placeholders, DatabaseDriver};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnSpec, FieldInput, Filter, FilterOperator, QueryResult, Record, SqlValue};

pub async fn create_table(
    driver: &dyn DatabaseDriver,
    name: &str,
    columns: &[ColumnSpec],
) -> DbResult<String> {
    let table = quote_ident(name)?;
    if columns.is_empty() {
        return Err(DbError::Validation("a table needs at least one column".to_string()));
    }

    let mut defs = Vec::with_capacity(columns.len());
    for col in columns {
        let nullable = if col.nullable { "NULL" } else { "NOT NULL" };
        defs.push(format!(
            "    {} {} {}",
            quote_ident(&col.name)?,
            check_column_type(&col.sql_type)?,
            nullable
        ));
    }
    let sql = format!("CREATE TABLE {} (\n{}\n)", table, defs.join(",\n"));

    driver.execute_committed(&sql, &[]).await?;
    tracing::info!(table = name.trim(), columns = columns.len(), "table created");
    Ok(format!("Table '{}' created successfully", name.trim()))
}

/// Non-blank fields, trimmed, minus any column named `skip`.
fn filled_fields<'a>(fields: &'a [FieldInput], skip: Option<&str>) -> Vec<(&'a str, SqlValue)> {
    fields
        .iter()
        .filter(|f| !f.value.is_blank())
        .filter(|f| skip.map_or(true, |s| !f.name.trim().eq_ignore_ascii_case(s.trim())))
        .map(|f| (f.name.as_str(), f.value.normalized()))
        .collect()
}

fn require_id(primary_key: &str, record_id: &str) -> DbResult<SqlValue> {
    if record_id.trim().is_empty() {
        return Err(DbError::Validation(format!("enter a value for {}", primary_key.trim())));
    }
    Ok(SqlValue::from(record_id.trim()))
}

/// Insert one row. Blank fields are left out so the column takes NULL or its default.
pub async fn insert(driver: &dyn DatabaseDriver, table: &str, fields: &[FieldInput]) -> DbResult<String> {
    let filled = filled_fields(fields, None);
    if filled.is_empty() {
        return Err(DbError::EmptyInsert);
    }

    let columns = filled
        .iter()
        .map(|(name, _)| quote_ident(name))
        .collect::<DbResult<Vec<_>>>()?;
    let params: Vec<SqlValue> = filled.into_iter().map(|(_, v)| v).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table)?,
        columns.join(", "),
        placeholders(1, params.len())
    );

    driver.execute_committed(&sql, &params).await?;
    tracing::info!(table = table.trim(), fields = params.len(), "record inserted");
    Ok("Record inserted successfully".to_string())
}

/// Update the row whose key equals `record_id`. Blank fields keep their current value.
pub async fn update(
    driver: &dyn DatabaseDriver,
    table: &str,
    primary_key: &str,
    record_id: &str,
    fields: &[FieldInput],
) -> DbResult<String> {
    let id = require_id(primary_key, record_id)?;
    let filled = filled_fields(fields, Some(primary_key));
    if filled.is_empty() {
        return Err(DbError::NoFieldsToUpdate);
    }

    let mut set_clauses = Vec::with_capacity(filled.len());
    let mut params = Vec::with_capacity(filled.len() + 1);
    for (i, (name, value)) in filled.into_iter().enumerate() {
        set_clauses.push(format!("{} = @P{}", quote_ident(name)?, i + 1));
        params.push(value);
    }
    params.push(id);
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = @P{}",
        quote_ident(table)?,
        set_clauses.join(", "),
        quote_ident(primary_key)?,
        params.len()
    );

    let affected = driver.execute_committed(&sql, &params).await?;
    if affected == 0 {
        return Err(DbError::RecordNotFound {
            key: primary_key.trim().to_string(),
            id: record_id.trim().to_string(),
        });
    }
    tracing::info!(table = table.trim(), id = record_id.trim(), affected, "record updated");
    Ok(format!("Record updated successfully (rows affected: {})", affected))
}

/// Delete the row whose key equals `record_id`. Confirmation is the caller's job.
pub async fn delete(
    driver: &dyn DatabaseDriver,
    table: &str,
    primary_key: &str,
    record_id: &str,
) -> DbResult<String> {
    let id = require_id(primary_key, record_id)?;
    let sql = format!(
        "DELETE FROM {} WHERE {} = @P1",
        quote_ident(table)?,
        quote_ident(primary_key)?
    );

    let affected = driver.execute_committed(&sql, &[id]).await?;
    if affected == 0 {
        return Err(DbError::RecordNotFound {
            key: primary_key.trim().to_string(),
            id: record_id.trim().to_string(),
        });
    }
    tracing::info!(table = table.trim(), id = record_id.trim(), affected, "record deleted");
    Ok(format!("Record deleted successfully (rows affected: {})", affected))
}

fn like_pattern(value: &SqlValue) -> String {
    let text = match value {
        SqlValue::Null => String::new(),
        SqlValue::Bool(b) => (*b as i64).to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Text(s) => s.trim().to_string(),
    };
    format!("%{}%", text)
}

/// All rows of `table`, optionally narrowed by a single predicate.
pub async fn query(
    driver: &dyn DatabaseDriver,
    table: &str,
    filter: Option<&Filter>,
) -> DbResult<QueryResult> {
    let mut sql = format!("SELECT * FROM {}", quote_ident(table)?);
    let mut params = Vec::new();

    if let Some(filter) = filter {
        let column = quote_ident(&filter.column)?;
        match filter.operator {
            FilterOperator::Like => {
                sql.push_str(&format!(" WHERE {} LIKE @P1", column));
                params.push(SqlValue::Text(like_pattern(&filter.value)));
            }
            op => {
                sql.push_str(&format!(" WHERE {} {} @P1", column, op.as_sql()));
                params.push(filter.value.normalized());
            }
        }
    }

    driver.query(&sql, &params).await
}

/// The row whose key equals `record_id`, keyed by column name.
pub async fn load_for_update(
    driver: &dyn DatabaseDriver,
    table: &str,
    primary_key: &str,
    record_id: &str,
) -> DbResult<Record> {
    let id = require_id(primary_key, record_id)?;
    let sql = format!(
        "SELECT TOP 1 * FROM {} WHERE {} = @P1",
        quote_ident(table)?,
        quote_ident(primary_key)?
    );

    let result = driver.query(&sql, &[id]).await?;
    let row = result.rows.into_iter().next().ok_or_else(|| DbError::RecordNotFound {
        key: primary_key.trim().to_string(),
        id: record_id.trim().to_string(),
    })?;

    Ok(result.columns.into_iter().zip(row).collect())
}
