//! Test fixtures for Databricks adapter integration tests
//!
//! A small warehouse with two Unity catalogs and a legacy `hive_metastore`,
//! plus canned query results shaped like the ones the host sends first.

#![allow(dead_code)]

use arrow_array::{ArrayRef, Int32Array, RecordBatch};
use sqlbricks_databricks::mock::{batch_of, MockSqlClientBuilder};
use sqlbricks_databricks::{AdapterEnvironment, DatabricksOptions, MockSqlClient, MockTable};
use std::path::Path;
use std::sync::Arc;

pub const HOSTNAME: &str = "dbc-1234.cloud.databricks.com";
pub const HTTP_PATH: &str = "/sql/1.0/warehouses/abc123";

/// Options for a PAT login with no init script
pub fn options() -> DatabricksOptions {
    DatabricksOptions::new(HOSTNAME, HTTP_PATH).with_access_token("dapi-test")
}

/// An environment whose home directory holds no `.databricksrc`
pub fn empty_home() -> (tempfile::TempDir, AdapterEnvironment) {
    let home = tempfile::tempdir().expect("tempdir");
    let env = AdapterEnvironment::default()
        .with_home(home.path())
        .with_current_dir(home.path());
    (home, env)
}

/// Write an init script and return its path
pub fn write_script(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("write init script");
    path
}

fn ints(values: Vec<i32>) -> ArrayRef {
    Arc::new(Int32Array::from(values))
}

/// `select 1 as a`
pub fn select_one() -> RecordBatch {
    batch_of(vec![("a", ints(vec![1]))]).expect("batch")
}

/// `select 1 as a, 2 as a, 3 as a`
pub fn duplicate_columns() -> RecordBatch {
    batch_of(vec![
        ("a", ints(vec![1])),
        ("a", ints(vec![2])),
        ("a", ints(vec![3])),
    ])
    .expect("batch")
}

/// `select 1 as a union all select 2 union all select 3`
pub fn three_rows() -> RecordBatch {
    batch_of(vec![("a", ints(vec![1, 2, 3]))]).expect("batch")
}

/// Warehouse with the standard queries and no metadata
pub fn queries() -> MockSqlClientBuilder {
    MockSqlClient::builder()
        .with_result("select 1 as a", select_one())
        .with_result("select 1 as a, 2 as a, 3 as a", duplicate_columns())
        .with_result(
            "select 1 as a union all select 2 union all select 3",
            three_rows(),
        )
}

/// Unity catalogs `main` and `analytics`, registered out of order
pub fn unity_tables() -> Vec<MockTable> {
    vec![
        MockTable::new("main", "sales", "orders")
            .with_column("id", "bigint")
            .with_column("amount", "decimal(10,2)")
            .with_column("placed_at", "timestamp"),
        MockTable::new("analytics", "web", "sessions")
            .with_type("VIEW")
            .with_column("session_id", "string")
            .with_column("tags", "array<string>"),
        MockTable::new("main", "crm", "customers")
            .with_column("id", "int")
            .with_column("active", "boolean"),
    ]
}

/// Legacy metastore tables, including a catalog that Unity also reports
pub fn legacy_tables() -> Vec<MockTable> {
    vec![
        MockTable::new("hive_metastore", "default", "events")
            .with_type("TABLE")
            .with_column("payload", "string")
            .with_column("ts", "timestamp_ntz"),
        MockTable::new("main", "legacy_only", "old_orders")
            .with_type("TABLE")
            .with_column("id", "bigint"),
    ]
}

/// Full warehouse: standard queries, Unity and legacy metadata
pub fn warehouse() -> MockSqlClientBuilder {
    let builder = unity_tables()
        .into_iter()
        .fold(queries(), |b, t| b.with_unity_table(t));
    legacy_tables()
        .into_iter()
        .fold(builder, |b, t| b.with_legacy_table(t))
}
