use polars::prelude::*;
use sql_analyst::dataset::CellValue;
use sql_analyst::execution::DataEngine;
use sql_analyst::security::SqlValidator;
use sql_analyst::{AnalystError, PolarsEngine, SqlQuery};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

fn validated(sql: &str) -> SqlQuery {
    SqlValidator::validate(&SqlQuery::new(sql).unwrap())
}

fn write_csv(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("sql-analyst-{}.csv", Uuid::new_v4()));
    fs::write(&path, contents).unwrap();
    path
}

fn orders_engine() -> PolarsEngine {
    let engine = PolarsEngine::new();
    let frame = df!(
        "customer" => &["acme", "acme", "globex"],
        "amount" => &[120.5f64, 80.0, 300.0],
        "items" => &[3i64, 1, 7]
    )
    .unwrap();
    engine.register_frame("orders", frame).unwrap();
    engine
}

#[tokio::test]
async fn test_query_registered_frame() {
    let engine = orders_engine();

    let rows = engine
        .execute_query(&validated(
            "SELECT customer, SUM(items) AS items FROM orders GROUP BY customer ORDER BY customer;",
        ))
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("customer"), Some(&CellValue::Text("acme".to_string())));
    assert_eq!(rows[0].get("items"), Some(&CellValue::Integer(4)));
    assert_eq!(rows[1].get("items"), Some(&CellValue::Integer(7)));
}

#[tokio::test]
async fn test_schema_of_registered_frame() {
    let engine = orders_engine();

    let schema = engine.get_schema("orders").await.unwrap();
    assert_eq!(schema.row_count, 3);
    assert_eq!(schema.columns.len(), 3);
    assert_eq!(schema.columns[0].name, "customer");
    assert!(schema.summary.contains("orders"));
    assert!(schema.context_for_llm().starts_with("Table: orders | Columns: customer ("));
    assert!(schema.context_for_llm().ends_with("| Rows: 3"));
}

#[tokio::test]
async fn test_unsafe_query_refused_before_engine() {
    let engine = orders_engine();

    let result = engine.execute_query(&validated("DELETE FROM orders")).await;
    assert!(matches!(result, Err(AnalystError::SecurityPolicy(_))));

    let unvalidated = SqlQuery::new("SELECT * FROM orders").unwrap();
    let result = engine.execute_query(&unvalidated).await;
    assert!(matches!(result, Err(AnalystError::SecurityPolicy(_))));

    // Table is untouched
    let rows = engine
        .execute_query(&validated("SELECT * FROM orders"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn test_engine_failure_is_execution_error() {
    let engine = orders_engine();

    let result = engine
        .execute_query(&validated("SELECT no_such_column FROM orders"))
        .await;
    match result {
        Err(AnalystError::Execution(message)) => assert!(message.starts_with("Database error")),
        other => panic!("expected execution error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_load_csv_normalises_columns_and_dates() {
    let path = write_csv(
        "Order Date,Total Sales,Region-Name\n\
         2024-01-15,100,north\n\
         2024-02-20,250,south\n",
    );
    let engine = PolarsEngine::new();

    let schema = engine.load_file(&path, "dataset").await.unwrap();
    fs::remove_file(&path).ok();

    let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["order_date", "total_sales", "region_name"]);
    assert_eq!(schema.row_count, 2);
    assert_eq!(schema.table_name, "dataset");

    let rows = engine
        .execute_query(&validated(
            "SELECT order_date, total_sales FROM dataset ORDER BY total_sales DESC",
        ))
        .await
        .unwrap();

    assert_eq!(
        rows[0].get("order_date"),
        Some(&CellValue::Temporal("2024-02-20".to_string()))
    );
    assert_eq!(rows[0].get("total_sales"), Some(&CellValue::Integer(250)));

    // Temporal values serialise as plain text
    let json = serde_json::to_string(&rows[1]).unwrap();
    assert!(json.contains(r#""order_date":"2024-01-15""#));
}

#[tokio::test]
async fn test_reload_replaces_table() {
    let first = write_csv("a,b\n1,2\n");
    let second = write_csv("a,b\n1,2\n3,4\n5,6\n");
    let engine = PolarsEngine::new();

    engine.load_file(&first, "dataset").await.unwrap();
    let schema = engine.load_file(&second, "dataset").await.unwrap();
    fs::remove_file(&first).ok();
    fs::remove_file(&second).ok();

    assert_eq!(schema.row_count, 3);
}

#[tokio::test]
async fn test_missing_file_is_execution_error() {
    let engine = PolarsEngine::new();
    let path = std::env::temp_dir().join(format!("missing-{}.csv", Uuid::new_v4()));

    let result = engine.load_file(&path, "dataset").await;
    assert!(matches!(result, Err(AnalystError::Execution(_))));
}
