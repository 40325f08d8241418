//! Integration tests for the Databricks adapter
//!
//! Everything runs against the in-memory mock driver; no warehouse or
//! credentials are needed.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sqlbricks-databricks --test integration_tests
//!
//! # With service principal support compiled in
//! cargo test -p sqlbricks-databricks --features oauth-m2m --test integration_tests
//! ```

mod fixtures;

use pretty_assertions::assert_eq;
use sqlbricks_core::error::{CONNECTION_TITLE, INIT_SCRIPT_TITLE, QUERY_TITLE};
use sqlbricks_core::{Adapter, Catalog, Connection, Cursor, RawOptions};
use sqlbricks_databricks::{
    short_type_code, DatabricksAdapter, DatabricksConnection, DatabricksOptions, MockSqlClient,
    MockStep, VendorError,
};
use std::sync::Arc;
use std::time::Duration;

async fn connect(client: &MockSqlClient, options: &DatabricksOptions) -> DatabricksConnection {
    DatabricksConnection::open(Arc::new(client.clone()), options)
        .await
        .unwrap()
}

fn shape(catalog: &Catalog) -> Vec<String> {
    fn walk(item: &sqlbricks_core::CatalogItem, depth: usize, out: &mut Vec<String>) {
        out.push(format!(
            "{}{} [{}] {}",
            "  ".repeat(depth),
            item.label(),
            item.type_label(),
            item.qualified_identifier()
        ));
        for child in item.children() {
            walk(child, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    for item in catalog.items() {
        walk(item, 0, &mut out);
    }
    out
}

// =============================================================================
// Type Mapping
// =============================================================================

#[test]
fn test_type_codes_for_parameterized_names() {
    let cases = [
        ("decimal(10,2)", "#.#"),
        ("ARRAY<STRING>", "[]"),
        ("map<string,int>", "m"),
        ("struct<a:int>", "{}"),
        ("INTERVAL DAY TO SECOND", "|-|"),
        ("timestamp_ntz", "ntz"),
        ("varchar(10)", "?"),
        ("geography", "?"),
    ];

    for (name, code) in cases {
        assert_eq!(short_type_code(name), code, "{}", name);
    }
}

// =============================================================================
// Query Execution
// =============================================================================

#[tokio::test]
async fn test_select_one() {
    let client = fixtures::queries().build();
    let conn = connect(&client, &fixtures::options()).await;

    let mut cursor = conn.execute("select 1 as a").await.unwrap().unwrap();
    assert_eq!(cursor.columns(), vec![("a".to_string(), "##".to_string())]);

    let batch = cursor.fetchall().await.unwrap().unwrap();
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(batch.num_columns(), 1);
}

#[tokio::test]
async fn test_duplicate_column_names() {
    let client = fixtures::queries().build();
    let conn = connect(&client, &fixtures::options()).await;

    let mut cursor = conn
        .execute("select 1 as a, 2 as a, 3 as a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cursor.columns().len(), 3);
    assert!(cursor.columns().iter().all(|(name, _)| name == "a"));

    let batch = cursor.fetchall().await.unwrap().unwrap();
    assert_eq!(batch.num_columns(), 3);
}

#[tokio::test]
async fn test_set_limit() {
    let client = fixtures::queries().build();
    let conn = connect(&client, &fixtures::options()).await;

    let cursor = conn
        .execute("select 1 as a union all select 2 union all select 3")
        .await
        .unwrap()
        .unwrap();
    let mut cursor = cursor.set_limit(2);
    assert_eq!(cursor.limit(), Some(2));

    let batch = cursor.fetchall().await.unwrap().unwrap();
    assert_eq!(batch.num_rows(), 2);
}

#[tokio::test]
async fn test_syntax_error_is_query_error() {
    let client = fixtures::queries().build();
    let conn = connect(&client, &fixtures::options()).await;

    let err = conn.execute("selec;").await.unwrap_err();
    assert!(err.is_query());
    assert_eq!(err.title(), QUERY_TITLE);
    assert!(err.message().contains("PARSE_SYNTAX_ERROR"));
}

#[tokio::test]
async fn test_fetch_failure_is_query_error() {
    let client = fixtures::queries()
        .fail_fetch_on("select 1 as a", VendorError::other("result expired"))
        .build();
    let conn = connect(&client, &fixtures::options()).await;

    let mut cursor = conn.execute("select 1 as a").await.unwrap().unwrap();
    let err = cursor.fetchall().await.unwrap_err();
    assert!(err.is_query());
    assert_eq!(err.message(), "result expired");
}

// =============================================================================
// Catalog Indexing
// =============================================================================

#[tokio::test]
async fn test_unity_only_catalog_is_sorted() {
    let client = fixtures::warehouse().build();
    let options = fixtures::options().with_skip_legacy_indexing(true);
    let conn = connect(&client, &options).await;

    let catalog = conn.get_catalog().await.unwrap();
    assert_eq!(
        shape(&catalog),
        vec![
            "analytics [catalog] analytics",
            "  web [s] analytics.web",
            "    sessions [VIEW] analytics.web.sessions",
            "      session_id [s] analytics.web.sessions.session_id",
            "      tags [[]] analytics.web.sessions.tags",
            "main [catalog] main",
            "  crm [s] main.crm",
            "    customers [MANAGED] main.crm.customers",
            "      id [##] main.crm.customers.id",
            "      active [t/f] main.crm.customers.active",
            "  sales [s] main.sales",
            "    orders [MANAGED] main.sales.orders",
            "      id [###] main.sales.orders.id",
            "      amount [#.#] main.sales.orders.amount",
            "      placed_at [ts] main.sales.orders.placed_at",
        ]
    );

    let executed = client.executed();
    assert_eq!(executed.len(), 2);
    assert!(executed.iter().all(|sql| sql.contains("information_schema")));
}

#[tokio::test]
async fn test_legacy_catalogs_merge_with_unity_winning() {
    let client = fixtures::warehouse().build();
    let conn = connect(&client, &fixtures::options()).await;

    let catalog = conn.get_catalog().await.unwrap();
    assert_eq!(catalog.labels(), vec!["analytics", "hive_metastore", "main"]);

    // `main` comes from Unity Catalog; its legacy-only schema is not browsed
    let main = catalog.find("main").unwrap();
    assert_eq!(main.child_labels(), vec!["crm", "sales"]);
    assert!(catalog.find("main.legacy_only").is_none());

    let events = catalog.find("hive_metastore.default.events").unwrap();
    assert_eq!(events.type_label(), "TABLE");
    assert_eq!(events.query_name(), "hive_metastore.default.events");
    assert_eq!(events.child_labels(), vec!["payload", "ts"]);
    assert_eq!(
        catalog.find("hive_metastore.default.events.ts").unwrap().type_label(),
        "ntz"
    );
}

#[tokio::test]
async fn test_backtick_identifiers() {
    let client = fixtures::warehouse().build();
    let options = fixtures::options()
        .with_identifier_style(sqlbricks_databricks::IdentifierStyle::Backtick);
    let conn = connect(&client, &options).await;

    let catalog = conn.get_catalog().await.unwrap();
    let amount = catalog.find("`main`.`sales`.`orders`.`amount`").unwrap();
    assert_eq!(amount.query_name(), "`amount`");
    assert_eq!(amount.label(), "amount");

    let events = catalog.find("`hive_metastore`.`default`.`events`").unwrap();
    assert_eq!(events.query_name(), "`hive_metastore`.`default`.`events`");
}

#[tokio::test]
async fn test_cancellation_at_any_step_returns_previous_snapshot() {
    let steps: Vec<(MockStep, bool)> = vec![
        (MockStep::from("information_schema.tables"), false),
        (MockStep::from("information_schema.tables"), true),
        (MockStep::from("information_schema.columns"), false),
        (MockStep::from("information_schema.columns"), true),
        (MockStep::Catalogs, false),
        (MockStep::Catalogs, true),
        (MockStep::schemas("hive_metastore"), false),
        (MockStep::schemas("hive_metastore"), true),
        (MockStep::tables("hive_metastore", "default"), false),
        (MockStep::tables("hive_metastore", "default"), true),
        (MockStep::columns("hive_metastore", "default", "events"), false),
        (MockStep::columns("hive_metastore", "default", "events"), true),
    ];

    for (step, on_fetch) in steps {
        let client = fixtures::warehouse().build();
        let conn = connect(&client, &fixtures::options()).await;
        let first = conn.get_catalog().await.unwrap();
        assert!(!first.is_empty());

        let error = VendorError::operation_handle_invalid("closed by cancel");
        if on_fetch {
            client.fail_fetch_on(step.clone(), error);
        } else {
            client.fail_on(step.clone(), error);
        }

        let second = conn.get_catalog().await.unwrap();
        assert_eq!(second, first, "{:?} (fetch: {})", step, on_fetch);
    }
}

#[tokio::test]
async fn test_cancelled_first_run_returns_empty_catalog() {
    let client = fixtures::warehouse()
        .fail_on(
            MockStep::Catalogs,
            VendorError::operation_handle_invalid("closed"),
        )
        .build();
    let conn = connect(&client, &fixtures::options()).await;

    assert!(conn.get_catalog().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_information_schema() {
    let client = MockSqlClient::builder()
        .without_unity_catalog()
        .with_legacy_catalog("samples")
        .build();
    let conn = connect(&client, &fixtures::options()).await;

    let catalog = conn.get_catalog().await.unwrap();
    assert_eq!(catalog.labels(), vec!["samples"]);
    assert!(catalog.items()[0].children().is_empty());
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_then_execute_uses_new_handle() {
    let client = fixtures::queries().build();
    let conn = connect(&client, &fixtures::options()).await;

    conn.cancel().await.unwrap();
    assert_eq!(client.connect_count(), 2);
    assert_eq!(client.close_count(), 1);

    let mut cursor = conn.execute("select 1 as a").await.unwrap().unwrap();
    assert_eq!(cursor.fetchall().await.unwrap().unwrap().num_rows(), 1);
}

#[tokio::test]
async fn test_cancel_interrupts_in_flight_query() {
    let client = fixtures::queries().with_latency(50).build();
    let conn = Arc::new(connect(&client, &fixtures::options()).await);

    let running = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.execute("select 1 as a").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    conn.cancel().await.unwrap();

    let outcome = running.await.unwrap().unwrap();
    assert!(outcome.is_none());

    let mut cursor = conn.execute("select 1 as a").await.unwrap().unwrap();
    assert!(cursor.fetchall().await.unwrap().is_some());
}

#[tokio::test]
async fn test_cursor_from_cancelled_handle_yields_nothing() {
    let client = fixtures::queries().build();
    let conn = connect(&client, &fixtures::options()).await;

    let mut stale = conn.execute("select 1 as a").await.unwrap().unwrap();
    conn.cancel().await.unwrap();

    let fetches = client.fetch_count();
    assert!(stale.fetchall().await.unwrap().is_none());
    assert_eq!(client.fetch_count(), fetches);
}

#[tokio::test]
async fn test_cancel_interrupts_indexing() {
    let client = fixtures::warehouse().with_latency(20).build();
    let conn = Arc::new(connect(&client, &fixtures::options()).await);
    let first = conn.get_catalog().await.unwrap();

    let running = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.get_catalog().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    conn.cancel().await.unwrap();

    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome, first);
    assert_eq!(conn.snapshot().await, first);
}

// =============================================================================
// Adapter Facade
// =============================================================================

#[tokio::test]
async fn test_half_m2m_pair_fails_before_connecting() {
    let client = MockSqlClient::new();
    let (_home, env) = fixtures::empty_home();
    let raw = RawOptions::new()
        .with("server_hostname", fixtures::HOSTNAME)
        .with("http_path", fixtures::HTTP_PATH)
        .with("client_id", "abc");

    let err = DatabricksAdapter::new(&raw, &env, Arc::new(client.clone())).unwrap_err();
    assert!(err.is_config());
    assert_eq!(client.connect_count(), 0);
}

#[cfg(not(feature = "oauth-m2m"))]
#[tokio::test]
async fn test_m2m_without_feature_is_connection_error() {
    let client = MockSqlClient::new();
    let (_home, env) = fixtures::empty_home();
    let raw = RawOptions::new()
        .with("server_hostname", fixtures::HOSTNAME)
        .with("client_id", "abc")
        .with("client_secret", "shh");
    let adapter = DatabricksAdapter::new(&raw, &env, Arc::new(client.clone())).unwrap();

    let err = adapter.connect().await.unwrap_err();
    assert!(err.is_connection());
    assert!(err.message().contains("oauth-m2m"));
    assert_eq!(client.connect_count(), 0);
}

#[cfg(feature = "oauth-m2m")]
#[tokio::test]
async fn test_m2m_injects_credentials_provider() {
    let client = MockSqlClient::new();
    let (_home, env) = fixtures::empty_home();
    let raw = RawOptions::new()
        .with("server_hostname", fixtures::HOSTNAME)
        .with("client_id", "abc")
        .with("client_secret", "shh");
    let adapter = DatabricksAdapter::new(&raw, &env, Arc::new(client.clone())).unwrap();

    adapter.connect().await.unwrap();
    let params = client.last_connect_params().unwrap();
    let provider = params.credentials_provider.unwrap();
    assert_eq!(provider.auth_type(), "oauth-m2m");
}

#[tokio::test]
async fn test_connection_failure() {
    let client = MockSqlClient::builder().with_connection_failure().build();
    let (_home, env) = fixtures::empty_home();
    let adapter = DatabricksAdapter::new(&RawOptions::new(), &env, Arc::new(client)).unwrap();

    let err = adapter.connect().await.unwrap_err();
    assert!(err.is_connection());
    assert_eq!(err.title(), CONNECTION_TITLE);
}

#[tokio::test]
async fn test_options_from_toml_profile() {
    let toml = r#"
        [profiles.dev]
        server-hostname = "dbc-1234.cloud.databricks.com"
        http-path = "/sql/1.0/warehouses/abc123"
        access-token = "dapi-test"
        skip-legacy-indexing = "yes"
        no-init = true
    "#;
    let raw = RawOptions::from_toml_profile(toml, "dev").unwrap();
    let (_home, env) = fixtures::empty_home();
    let adapter = DatabricksAdapter::new(&raw, &env, Arc::new(MockSqlClient::new())).unwrap();

    assert!(adapter.options().skip_legacy_indexing);
    assert!(adapter.options().no_init);
    assert_eq!(adapter.options().http_path.as_deref(), Some(fixtures::HTTP_PATH));
}

// =============================================================================
// Init Script
// =============================================================================

#[tokio::test]
async fn test_init_script_runs_and_reports() {
    let client = fixtures::queries()
        .with_statement("use catalog main")
        .with_statement("set time zone 'UTC'")
        .build();
    let (home, env) = fixtures::empty_home();
    let script = fixtures::write_script(
        home.path(),
        ".databricksrc",
        "USE CATALOG main;\n\nSET TIME ZONE 'UTC';\n",
    );

    let adapter =
        DatabricksAdapter::new(&RawOptions::new(), &env, Arc::new(client.clone())).unwrap();
    let conn = adapter.connect().await.unwrap();

    assert_eq!(
        conn.init_message(),
        format!("Executed 2 commands from {}", script.display())
    );
    assert_eq!(
        client.executed(),
        vec!["USE CATALOG main", "SET TIME ZONE 'UTC'"]
    );
}

#[tokio::test]
async fn test_init_script_reruns_on_cancel() {
    let client = fixtures::queries().with_statement("use catalog main").build();
    let (home, env) = fixtures::empty_home();
    let script = fixtures::write_script(home.path(), "init.sql", "use catalog main;");
    let raw = RawOptions::new().with("init-path", script.as_path());

    let adapter = DatabricksAdapter::new(&raw, &env, Arc::new(client.clone())).unwrap();
    let conn = adapter.connect().await.unwrap();
    assert_eq!(
        conn.init_message(),
        format!("Executed 1 command from {}", script.display())
    );

    conn.cancel().await.unwrap();
    assert_eq!(client.executed(), vec!["use catalog main", "use catalog main"]);
}

#[tokio::test]
async fn test_init_script_failure_names_the_path() {
    let client = fixtures::queries().build();
    let (home, env) = fixtures::empty_home();
    let script = fixtures::write_script(home.path(), "init.sql", "use catalg main;");
    let raw = RawOptions::new().with("init_path", "init.sql");

    let adapter = DatabricksAdapter::new(&raw, &env, Arc::new(client.clone())).unwrap();
    let err = adapter.connect().await.unwrap_err();

    assert!(err.is_connection());
    assert_eq!(err.title(), INIT_SCRIPT_TITLE);
    assert!(err
        .message()
        .starts_with(&format!("Attempted to execute script at {}\n", script.display())));
    assert_eq!(client.close_count(), 1);
}

#[tokio::test]
async fn test_missing_or_disabled_init_script_is_silent() {
    let client = fixtures::queries().with_statement("use catalog main").build();
    let (home, env) = fixtures::empty_home();

    let adapter =
        DatabricksAdapter::new(&RawOptions::new(), &env, Arc::new(client.clone())).unwrap();
    let conn = adapter.connect().await.unwrap();
    assert_eq!(conn.init_message(), "");

    fixtures::write_script(home.path(), ".databricksrc", "use catalog main;");
    let raw = RawOptions::new().with("no-init", "true");
    let adapter = DatabricksAdapter::new(&raw, &env, Arc::new(client.clone())).unwrap();
    let conn = adapter.connect().await.unwrap();
    assert_eq!(conn.init_message(), "");
    assert!(client.executed().is_empty());
}

#[tokio::test]
async fn test_unreadable_init_script_is_ignored() {
    let client = fixtures::queries().build();
    let (home, env) = fixtures::empty_home();
    let script = home.path().join("init.sql");
    std::fs::write(&script, [0xff, 0xfe, 0x00, 0x9f]).unwrap();

    for init_path in [script.as_path(), home.path()] {
        let raw = RawOptions::new().with("init-path", init_path);
        let adapter =
            DatabricksAdapter::new(&raw, &env, Arc::new(client.clone())).unwrap();
        let conn = adapter.connect().await.unwrap();
        assert_eq!(conn.init_message(), "");
    }
    assert!(client.executed().is_empty());
}

// =============================================================================
// Close
// =============================================================================

#[tokio::test]
async fn test_close_is_idempotent() {
    let client = fixtures::queries().build();
    let conn = connect(&client, &fixtures::options()).await;

    conn.close().await.unwrap();
    conn.close().await.unwrap();
    assert_eq!(client.close_count(), 1);

    let err = conn.execute("select 1 as a").await.unwrap_err();
    assert!(err.is_query());
}
