//! End-to-end check of the record gateway against a live SQL Server.
//!
//! Prerequisites:
//! - A reachable server and a scratch database the login may create tables in
//! - `ASTERDB_TEST_SERVER`, `ASTERDB_TEST_DATABASE`, `ASTERDB_TEST_USER`,
//!   `ASTERDB_TEST_PASSWORD` set (or present in `.env`)
//!
//! Run with: `cargo test -- --ignored`

use asterdb_lib::config::AppConfig;
use asterdb_lib::db::DatabaseDriver;
use asterdb_lib::gateway::{connection, records, schema};
use asterdb_lib::models::{ColumnSpec, ConnectParams, FieldInput, Filter, FilterOperator, SqlValue};
use serde_json::json;
use std::sync::Arc;

fn env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| panic!("{key} must be set for live tests"))
}

async fn connect() -> Arc<dyn DatabaseDriver> {
    dotenvy::dotenv().ok();
    let params = ConnectParams {
        server: env("ASTERDB_TEST_SERVER"),
        database: env("ASTERDB_TEST_DATABASE"),
        username: std::env::var("ASTERDB_TEST_USER").ok(),
        password: std::env::var("ASTERDB_TEST_PASSWORD").ok(),
        port: std::env::var("ASTERDB_TEST_PORT").ok().and_then(|p| p.parse().ok()),
    };
    let (driver, info) = connection::connect(&params, &AppConfig::default())
        .await
        .expect("Failed to connect to SQL Server");
    assert!(!info.server_version.is_empty());
    driver
}

async fn names(driver: &dyn DatabaseDriver) -> Vec<(i64, String)> {
    let result = records::query(driver, "Widget", None).await.expect("query failed");
    result
        .rows
        .iter()
        .map(|row| (row[0].as_i64().unwrap(), row[1].as_str().unwrap().to_string()))
        .collect()
}

#[tokio::test]
#[ignore] // Requires a live SQL Server
async fn widget_lifecycle() {
    let driver = connect().await;
    let driver = driver.as_ref();
    driver.execute_committed("DROP TABLE IF EXISTS [Widget]", &[]).await.unwrap();

    records::create_table(
        driver,
        "Widget",
        &[
            ColumnSpec {
                name: "id".to_string(),
                sql_type: "INT IDENTITY(1,1) PRIMARY KEY".to_string(),
                nullable: false,
            },
            ColumnSpec {
                name: "name".to_string(),
                sql_type: "VARCHAR(50)".to_string(),
                nullable: false,
            },
        ],
    )
    .await
    .expect("create table failed");

    let table = schema::describe_table(driver, "Widget").await.unwrap();
    assert_eq!(table.primary_key.as_deref(), Some("id"));
    assert_eq!(table.insert_form_columns().len(), 1);

    records::insert(driver, "Widget", &[FieldInput::new("name", "bolt")]).await.unwrap();
    assert_eq!(names(driver).await, vec![(1, "bolt".to_string())]);

    records::update(driver, "Widget", "id", "1", &[FieldInput::new("name", "nut")]).await.unwrap();
    assert_eq!(names(driver).await, vec![(1, "nut".to_string())]);

    let record = records::load_for_update(driver, "Widget", "id", "1").await.unwrap();
    assert_eq!(record.get("name"), Some(&json!("nut")));

    let filter = Filter {
        column: "name".to_string(),
        operator: FilterOperator::Like,
        value: SqlValue::from("u"),
    };
    assert_eq!(records::query(driver, "Widget", Some(&filter)).await.unwrap().rows.len(), 1);

    records::delete(driver, "Widget", "id", "1").await.unwrap();
    assert!(names(driver).await.is_empty());
    assert!(records::delete(driver, "Widget", "id", "1").await.is_err());

    driver.execute_committed("DROP TABLE IF EXISTS [Widget]", &[]).await.unwrap();
    driver.close().await.unwrap();
}
