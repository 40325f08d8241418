//! Mock Databricks SQL client for testing
//!
//! Serves canned query results, an information schema and legacy metadata
//! from memory without connecting to any warehouse. It's useful for:
//! - Unit and integration testing the connection manager and indexer
//! - Simulating vendor failures at any step
//! - Simulating cancellation races (closing a connection invalidates all of
//!   its outstanding operations, as the real driver does)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sqlbricks_databricks::mock::{MockSqlClient, MockStep, MockTable};
//!
//! let client = MockSqlClient::builder()
//!     .with_unity_table(
//!         MockTable::new("main", "sales", "orders")
//!             .with_column("id", "bigint")
//!             .with_column("amount", "decimal(10,2)"),
//!     )
//!     .with_legacy_table(MockTable::new("hive_metastore", "default", "events"))
//!     .with_latency(50)
//!     .build();
//!
//! // Simulate a cancel landing while the legacy metastore is browsed
//! client.fail_on(
//!     MockStep::Catalogs,
//!     VendorError::operation_handle_invalid("closed"),
//! );
//! ```

use crate::vendor::{
    metadata_columns as meta, ColumnDescription, ConnectParams, SqlClient, VendorConnection,
    VendorCursor, VendorError,
};
use arrow_array::{ArrayRef, Int32Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{ArrowError, DataType, Schema};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Build a batch from named columns (names may repeat)
pub fn batch_of<N: AsRef<str>>(columns: Vec<(N, ArrayRef)>) -> Result<RecordBatch, ArrowError> {
    if columns.is_empty() {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    }
    RecordBatch::try_from_iter(columns)
}

/// A table known to the mock warehouse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTable {
    pub catalog: String,
    pub schema: String,
    pub name: String,
    pub table_type: String,
    /// `(column name, type name)` in ordinal order
    pub columns: Vec<(String, String)>,
}

impl MockTable {
    pub fn new(catalog: &str, schema: &str, name: &str) -> Self {
        Self {
            catalog: catalog.to_string(),
            schema: schema.to_string(),
            name: name.to_string(),
            table_type: "MANAGED".to_string(),
            columns: Vec::new(),
        }
    }

    pub fn with_type(mut self, table_type: &str) -> Self {
        self.table_type = table_type.to_string();
        self
    }

    pub fn with_column(mut self, name: &str, type_name: &str) -> Self {
        self.columns.push((name.to_string(), type_name.to_string()));
        self
    }
}

/// A vendor call a failure can be attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStep {
    Connect,
    /// `execute()` of any SQL containing this fragment (case and
    /// whitespace-insensitive)
    Query(String),
    Catalogs,
    Schemas(String),
    Tables(String, String),
    Columns(String, String, String),
}

impl MockStep {
    pub fn schemas(catalog: &str) -> Self {
        Self::Schemas(catalog.to_string())
    }

    pub fn tables(catalog: &str, schema: &str) -> Self {
        Self::Tables(catalog.to_string(), schema.to_string())
    }

    pub fn columns(catalog: &str, schema: &str, table: &str) -> Self {
        Self::Columns(catalog.to_string(), schema.to_string(), table.to_string())
    }

    fn matches(&self, actual: &MockStep) -> bool {
        match (self, actual) {
            (Self::Query(fragment), Self::Query(sql)) => sql.contains(&normalize_sql(fragment)),
            _ => self == actual,
        }
    }
}

impl From<&str> for MockStep {
    fn from(fragment: &str) -> Self {
        Self::Query(fragment.to_string())
    }
}

#[derive(Debug, Clone)]
struct MockFailure {
    step: MockStep,
    on_fetch: bool,
    error: VendorError,
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct MockConfig {
    results: Vec<(String, RecordBatch)>,
    statements: Vec<String>,
    unity_disabled: bool,
    unity_tables: Vec<MockTable>,
    legacy_tables: Vec<MockTable>,
    legacy_catalogs: Vec<String>,
    fail_connection: bool,
    latency_ms: u64,
}

#[derive(Debug, Default)]
struct MockRuntime {
    failures: Vec<MockFailure>,
    executed: Vec<String>,
    last_params: Option<ConnectParams>,
    fetches: usize,
}

#[derive(Debug, Default)]
struct Shared {
    config: MockConfig,
    runtime: Mutex<MockRuntime>,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl Shared {
    fn runtime(&self) -> MutexGuard<'_, MockRuntime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume the first armed failure matching this call
    fn take_failure(&self, step: &MockStep, on_fetch: bool) -> Option<VendorError> {
        let mut runtime = self.runtime();
        let failure = runtime.failures.iter_mut().find(|f| {
            f.on_fetch == on_fetch && f.remaining != Some(0) && f.step.matches(step)
        })?;

        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(failure.error.clone())
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    fn visible_tables(&self) -> impl Iterator<Item = &MockTable> {
        self.config
            .unity_tables
            .iter()
            .chain(self.config.legacy_tables.iter())
    }
}

/// In-memory [`SqlClient`]
#[derive(Debug, Clone, Default)]
pub struct MockSqlClient {
    shared: Arc<Shared>,
}

impl MockSqlClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MockSqlClientBuilder {
        MockSqlClientBuilder::default()
    }

    /// Fail every matching call from now on
    pub fn fail_on(&self, step: impl Into<MockStep>, error: VendorError) {
        self.arm(step.into(), false, error, None);
    }

    /// Fail only the next matching call
    pub fn fail_once_on(&self, step: impl Into<MockStep>, error: VendorError) {
        self.arm(step.into(), false, error, Some(1));
    }

    /// Fail fetches of results produced by a matching call
    pub fn fail_fetch_on(&self, step: impl Into<MockStep>, error: VendorError) {
        self.arm(step.into(), true, error, None);
    }

    fn arm(&self, step: MockStep, on_fetch: bool, error: VendorError, remaining: Option<u32>) {
        self.shared.runtime().failures.push(MockFailure {
            step,
            on_fetch,
            error,
            remaining,
        });
    }

    /// Number of connect attempts
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Number of connections closed
    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Number of fetches that reached the warehouse
    pub fn fetch_count(&self) -> usize {
        self.shared.runtime().fetches
    }

    /// Every SQL text passed to `execute()`, in order
    pub fn executed(&self) -> Vec<String> {
        self.shared.runtime().executed.clone()
    }

    /// Parameters of the most recent connect attempt
    pub fn last_connect_params(&self) -> Option<ConnectParams> {
        self.shared.runtime().last_params.clone()
    }
}

#[async_trait::async_trait]
impl SqlClient for MockSqlClient {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<Arc<dyn VendorConnection>, VendorError> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        self.shared.runtime().last_params = Some(params.clone());

        if self.shared.config.fail_connection {
            return Err(VendorError::other("Simulated connection failure"));
        }
        if let Some(err) = self.shared.take_failure(&MockStep::Connect, false) {
            return Err(err);
        }

        Ok(Arc::new(MockConnection {
            shared: Arc::clone(&self.shared),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

#[derive(Debug)]
struct MockConnection {
    shared: Arc<Shared>,
    closed: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl VendorConnection for MockConnection {
    async fn cursor(&self) -> Result<Box<dyn VendorCursor>, VendorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VendorError::other(
                "Cannot create cursor from closed connection",
            ));
        }

        Ok(Box::new(MockCursor {
            shared: Arc::clone(&self.shared),
            closed: Arc::clone(&self.closed),
            pending: None,
        }))
    }

    async fn close(&self) -> Result<(), VendorError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Pending {
    step: MockStep,
    batch: RecordBatch,
    offset: usize,
}

#[derive(Debug)]
struct MockCursor {
    shared: Arc<Shared>,
    closed: Arc<AtomicBool>,
    pending: Option<Pending>,
}

impl MockCursor {
    fn ensure_open(&self) -> Result<(), VendorError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(VendorError::operation_handle_invalid(
                "the connection owning this operation was closed",
            ))
        } else {
            Ok(())
        }
    }

    /// Common prologue of every server round trip
    async fn round_trip(&self, step: &MockStep, on_fetch: bool) -> Result<(), VendorError> {
        self.ensure_open()?;
        self.shared.simulate_latency().await;
        self.ensure_open()?;

        match self.shared.take_failure(step, on_fetch) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn run(
        &mut self,
        step: MockStep,
        result: impl FnOnce(&Shared) -> Result<RecordBatch, VendorError>,
    ) -> Result<(), VendorError> {
        self.pending = None;
        self.round_trip(&step, false).await?;
        let batch = result(self.shared.as_ref())?;
        self.pending = Some(Pending {
            step,
            batch,
            offset: 0,
        });
        Ok(())
    }

    async fn fetch(&mut self, size: Option<usize>) -> Result<RecordBatch, VendorError> {
        let step = match &self.pending {
            Some(pending) => pending.step.clone(),
            None => return Err(VendorError::other("No result set to fetch from")),
        };
        self.round_trip(&step, true).await?;
        self.shared.runtime().fetches += 1;

        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| VendorError::other("No result set to fetch from"))?;
        let remaining = pending.batch.num_rows() - pending.offset;
        let len = size.map_or(remaining, |size| size.min(remaining));
        let batch = pending.batch.slice(pending.offset, len);
        pending.offset += len;
        Ok(batch)
    }
}

#[async_trait::async_trait]
impl VendorCursor for MockCursor {
    async fn execute(&mut self, sql: &str) -> Result<(), VendorError> {
        self.shared.runtime().executed.push(sql.to_string());
        let normalized = normalize_sql(sql);
        self.run(MockStep::Query(normalized.clone()), |shared| {
            query_result(shared, &normalized)
        })
        .await
    }

    fn description(&self) -> Vec<ColumnDescription> {
        let Some(pending) = &self.pending else {
            return Vec::new();
        };

        pending
            .batch
            .schema()
            .fields()
            .iter()
            .map(|f| ColumnDescription::new(f.name(), type_name(f.data_type())))
            .collect()
    }

    async fn fetch_all(&mut self) -> Result<RecordBatch, VendorError> {
        self.fetch(None).await
    }

    async fn fetch_many(&mut self, size: usize) -> Result<RecordBatch, VendorError> {
        self.fetch(Some(size)).await
    }

    async fn catalogs(&mut self) -> Result<(), VendorError> {
        self.run(MockStep::Catalogs, |shared| {
            let mut names: Vec<&str> = Vec::new();
            let legacy = shared.config.legacy_catalogs.iter().map(String::as_str);
            for name in shared.visible_tables().map(|t| t.catalog.as_str()).chain(legacy) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            metadata_batch(vec![(meta::TABLE_CAT, strings(names))])
        })
        .await
    }

    async fn schemas(&mut self, catalog: &str) -> Result<(), VendorError> {
        self.run(MockStep::schemas(catalog), |shared| {
            let mut names: Vec<&str> = Vec::new();
            for table in shared.visible_tables().filter(|t| t.catalog == catalog) {
                if !names.contains(&table.schema.as_str()) {
                    names.push(&table.schema);
                }
            }
            let catalogs = vec![catalog; names.len()];
            metadata_batch(vec![
                (meta::TABLE_SCHEM, strings(names)),
                ("TABLE_CATALOG", strings(catalogs)),
            ])
        })
        .await
    }

    async fn tables(&mut self, catalog: &str, schema: &str) -> Result<(), VendorError> {
        self.run(MockStep::tables(catalog, schema), |shared| {
            let tables: Vec<&MockTable> = shared
                .visible_tables()
                .filter(|t| t.catalog == catalog && like(schema, &t.schema))
                .collect();
            metadata_batch(vec![
                (meta::TABLE_CAT, strings(tables.iter().map(|t| t.catalog.as_str()))),
                (meta::TABLE_SCHEM, strings(tables.iter().map(|t| t.schema.as_str()))),
                (meta::TABLE_NAME, strings(tables.iter().map(|t| t.name.as_str()))),
                (meta::TABLE_TYPE, strings(tables.iter().map(|t| t.table_type.as_str()))),
            ])
        })
        .await
    }

    async fn columns(
        &mut self,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> Result<(), VendorError> {
        self.run(MockStep::columns(catalog, schema, table), |shared| {
            let mut columns: Vec<(&MockTable, i32, &str, &str)> = shared
                .visible_tables()
                .filter(|t| {
                    t.catalog == catalog && like(schema, &t.schema) && like(table, &t.name)
                })
                .flat_map(|t| {
                    t.columns
                        .iter()
                        .enumerate()
                        .map(move |(i, (name, ty))| {
                            (t, i as i32 + 1, name.as_str(), ty.as_str())
                        })
                })
                .collect();
            // The warehouse makes no ordering promises
            columns.reverse();

            metadata_batch(vec![
                (meta::TABLE_CAT, strings(columns.iter().map(|c| c.0.catalog.as_str()))),
                (meta::TABLE_SCHEM, strings(columns.iter().map(|c| c.0.schema.as_str()))),
                (meta::TABLE_NAME, strings(columns.iter().map(|c| c.0.name.as_str()))),
                (meta::COLUMN_NAME, strings(columns.iter().map(|c| c.2))),
                (meta::TYPE_NAME, strings(columns.iter().map(|c| c.3))),
                (
                    meta::ORDINAL_POSITION,
                    Arc::new(Int32Array::from_iter_values(columns.iter().map(|c| c.1))),
                ),
            ])
        })
        .await
    }

    async fn close(&mut self) -> Result<(), VendorError> {
        self.pending = None;
        Ok(())
    }
}

/// SQL `LIKE` matching, which the driver applies to schema and table arguments
fn like(pattern: &str, value: &str) -> bool {
    fn matches(pattern: &[char], value: &[char]) -> bool {
        match pattern.split_first() {
            None => value.is_empty(),
            Some(('%', rest)) => (0..=value.len()).any(|i| matches(rest, &value[i..])),
            Some(('_', rest)) => !value.is_empty() && matches(rest, &value[1..]),
            Some((c, rest)) => value.first() == Some(c) && matches(rest, &value[1..]),
        }
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();
    matches(&pattern, &value)
}

fn query_result(shared: &Shared, sql: &str) -> Result<RecordBatch, VendorError> {
    let config = &shared.config;

    if sql.contains("information_schema.tables") || sql.contains("information_schema.columns") {
        if config.unity_disabled {
            return Err(VendorError::object_not_found(
                "[TABLE_OR_VIEW_NOT_FOUND] The table or view \
                 `system`.`information_schema` cannot be found.",
            ));
        }
        return if sql.contains("information_schema.tables") {
            unity_tables_batch(&config.unity_tables)
        } else {
            unity_columns_batch(&config.unity_tables)
        };
    }

    if let Some((_, batch)) = config.results.iter().find(|(q, _)| q == sql) {
        return Ok(batch.clone());
    }
    if config.statements.iter().any(|s| s == sql) {
        return metadata_batch(Vec::new());
    }

    let near = sql.split_whitespace().next().unwrap_or_default();
    Err(VendorError::other(format!(
        "[PARSE_SYNTAX_ERROR] Syntax error at or near '{}'. SQLSTATE: 42601",
        near
    )))
}

fn unity_tables_batch(tables: &[MockTable]) -> Result<RecordBatch, VendorError> {
    metadata_batch(vec![
        ("table_catalog", strings(tables.iter().map(|t| t.catalog.as_str()))),
        ("table_schema", strings(tables.iter().map(|t| t.schema.as_str()))),
        ("table_name", strings(tables.iter().map(|t| t.name.as_str()))),
        ("table_type", strings(tables.iter().map(|t| t.table_type.as_str()))),
    ])
}

fn unity_columns_batch(tables: &[MockTable]) -> Result<RecordBatch, VendorError> {
    let rows: Vec<(&MockTable, i64, &(String, String))> = tables
        .iter()
        .flat_map(|t| {
            t.columns
                .iter()
                .enumerate()
                .map(move |(i, column)| (t, i as i64, column))
        })
        .rev()
        .collect();

    metadata_batch(vec![
        ("table_catalog", strings(rows.iter().map(|r| r.0.catalog.as_str()))),
        ("table_schema", strings(rows.iter().map(|r| r.0.schema.as_str()))),
        ("table_name", strings(rows.iter().map(|r| r.0.name.as_str()))),
        ("column_name", strings(rows.iter().map(|r| r.2 .0.as_str()))),
        (
            "ordinal_position",
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
        ),
        ("data_type", strings(rows.iter().map(|r| r.2 .1.as_str()))),
    ])
}

fn strings<'a>(values: impl IntoIterator<Item = &'a str>) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(values))
}

fn metadata_batch(columns: Vec<(&str, ArrayRef)>) -> Result<RecordBatch, VendorError> {
    batch_of(columns).map_err(|e| VendorError::other(e.to_string()))
}

fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(';')
        .trim_end()
        .to_lowercase()
}

/// Databricks type name the driver would report for an Arrow type
fn type_name(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Null => "void",
        DataType::Boolean => "boolean",
        DataType::Int8 => "tinyint",
        DataType::Int16 => "smallint",
        DataType::Int32 => "int",
        DataType::Int64 => "bigint",
        DataType::Float32 => "float",
        DataType::Float64 => "double",
        DataType::Decimal128(_, _) => "decimal",
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => "string",
        DataType::Binary | DataType::LargeBinary => "binary",
        DataType::Date32 | DataType::Date64 => "date",
        DataType::Timestamp(_, None) => "timestamp_ntz",
        DataType::Timestamp(_, Some(_)) => "timestamp",
        DataType::Interval(_) => "interval",
        DataType::List(_) | DataType::LargeList(_) => "array",
        DataType::Map(_, _) => "map",
        DataType::Struct(_) => "struct",
        _ => "string",
    }
}

/// Builder for [`MockSqlClient`]
#[derive(Debug, Default)]
pub struct MockSqlClientBuilder {
    config: MockConfig,
    failures: Vec<MockFailure>,
}

impl MockSqlClientBuilder {
    /// Answer `sql` with `batch` (matching ignores case, whitespace and a
    /// trailing semicolon)
    pub fn with_result(mut self, sql: &str, batch: RecordBatch) -> Self {
        self.config.results.push((normalize_sql(sql), batch));
        self
    }

    /// Accept `sql` as a statement with an empty result
    pub fn with_statement(mut self, sql: &str) -> Self {
        self.config.statements.push(normalize_sql(sql));
        self
    }

    /// A table listed in the information schema (and visible to browsing)
    pub fn with_unity_table(mut self, table: MockTable) -> Self {
        self.config.unity_tables.push(table);
        self
    }

    /// A table reachable only through the browsing calls
    pub fn with_legacy_table(mut self, table: MockTable) -> Self {
        self.config.legacy_tables.push(table);
        self
    }

    /// A legacy catalog with no tables
    pub fn with_legacy_catalog(mut self, name: &str) -> Self {
        self.config.legacy_catalogs.push(name.to_string());
        self
    }

    /// Information-schema queries fail with "table or view not found"
    pub fn without_unity_catalog(mut self) -> Self {
        self.config.unity_disabled = true;
        self
    }

    pub fn with_connection_failure(mut self) -> Self {
        self.config.fail_connection = true;
        self
    }

    /// Delay every cursor round trip (connects stay instant)
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.config.latency_ms = latency_ms;
        self
    }

    pub fn fail_on(mut self, step: impl Into<MockStep>, error: VendorError) -> Self {
        self.failures.push(MockFailure {
            step: step.into(),
            on_fetch: false,
            error,
            remaining: None,
        });
        self
    }

    pub fn fail_fetch_on(mut self, step: impl Into<MockStep>, error: VendorError) -> Self {
        self.failures.push(MockFailure {
            step: step.into(),
            on_fetch: true,
            error,
            remaining: None,
        });
        self
    }

    pub fn build(self) -> MockSqlClient {
        let runtime = MockRuntime {
            failures: self.failures,
            ..Default::default()
        };

        MockSqlClient {
            shared: Arc::new(Shared {
                config: self.config,
                runtime: Mutex::new(runtime),
                ..Default::default()
            }),
        }
    }
}
