//! Databricks SQL adapter
//!
//! Runs queries against a Databricks SQL warehouse or cluster and indexes
//! its metadata (Unity Catalog plus legacy metastores such as
//! `hive_metastore`) into the host's data catalog tree.
//!
//! The wire driver sits behind the [`vendor::SqlClient`] trait. The crate
//! ships a [`mock::MockSqlClient`] for tests and offline development.
//!
//! ## Features
//!
//! - `oauth-m2m` - OAuth machine-to-machine (service principal) login
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlbricks_core::{Adapter, Connection, Cursor, RawOptions};
//! use sqlbricks_databricks::{AdapterEnvironment, DatabricksAdapter};
//!
//! let raw = RawOptions::from_file("sqlbricks.toml".as_ref())?;
//! let adapter = DatabricksAdapter::new(&raw, &AdapterEnvironment::from_process(), client)?;
//! let conn = adapter.connect().await?;
//! if let Some(mut cursor) = conn.execute("select 1 as a").await? {
//!     let batch = cursor.fetchall().await?;
//! }
//! ```

pub mod adapter;
pub mod auth;
pub mod connection;
pub mod fetch;
pub mod indexer;
pub mod init_script;
pub mod logging;
pub mod metadata_table;
pub mod mock;
pub mod options;
pub mod types;
pub mod vendor;

pub use adapter::DatabricksAdapter;
pub use auth::ServicePrincipal;
pub use connection::{ConnectionState, DatabricksConnection};
pub use fetch::DatabricksCursor;
pub use indexer::IdentifierStyle;
pub use init_script::InitScript;
pub use logging::{init_logging, LogConfig};
pub use mock::{MockSqlClient, MockStep, MockTable};
pub use options::{AdapterEnvironment, DatabricksOptions, DATABRICKS_ADAPTER_OPTIONS};
pub use types::short_type_code;
pub use vendor::{AuthType, ConnectParams, SqlClient, VendorError, VendorErrorKind};
