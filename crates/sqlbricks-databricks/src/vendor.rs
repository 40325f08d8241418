//! Vendor SQL client seam
//!
//! The Databricks SQL driver is an external capability: it connects, hands
//! out cursors, executes SQL, browses metadata and returns Arrow batches.
//! Everything in this crate talks to it through the traits below, so a real
//! driver binding and the in-memory [`crate::mock::MockSqlClient`] are
//! interchangeable.

use arrow_array::RecordBatch;
use std::fmt;
use std::sync::Arc;

/// Result column names produced by the metadata browsing calls
/// (`catalogs()`, `schemas()`, `tables()`, `columns()`)
pub mod metadata_columns {
    pub const TABLE_CAT: &str = "TABLE_CAT";
    pub const TABLE_SCHEM: &str = "TABLE_SCHEM";
    pub const TABLE_NAME: &str = "TABLE_NAME";
    pub const TABLE_TYPE: &str = "TABLE_TYPE";
    pub const COLUMN_NAME: &str = "COLUMN_NAME";
    pub const TYPE_NAME: &str = "TYPE_NAME";
    pub const ORDINAL_POSITION: &str = "ORDINAL_POSITION";
}

/// Message prefix the driver uses when an operation's server-side handle is gone
const OPERATION_HANDLE_INVALID_PREFIX: &str = "Invalid OperationHandle";

/// Error classes Databricks reports for missing tables, views and schemas
const OBJECT_NOT_FOUND_CLASSES: &[&str] = &[
    "TABLE_OR_VIEW_NOT_FOUND",
    "SCHEMA_NOT_FOUND",
    "CATALOG_NOT_FOUND",
];

/// Structured kind of a vendor failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VendorErrorKind {
    /// The server-side operation backing a cursor was torn down, normally
    /// because its connection was closed by a cancel
    OperationHandleInvalid,

    /// A referenced table, view, schema or catalog does not exist
    ObjectNotFound,

    /// Anything else
    Other,
}

impl VendorErrorKind {
    /// Classify a driver error message.
    ///
    /// This is the only place that knows the driver's wire-message formats.
    pub fn classify(message: &str) -> Self {
        let message = message.trim_start();
        if message.starts_with(OPERATION_HANDLE_INVALID_PREFIX) {
            Self::OperationHandleInvalid
        } else if OBJECT_NOT_FOUND_CLASSES.iter().any(|c| message.contains(c)) {
            Self::ObjectNotFound
        } else {
            Self::Other
        }
    }
}

/// A failure reported by the vendor driver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct VendorError {
    pub kind: VendorErrorKind,
    pub message: String,
}

impl VendorError {
    pub fn new(kind: VendorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error from a bare driver message, classifying it
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: VendorErrorKind::classify(&message),
            message,
        }
    }

    pub fn operation_handle_invalid(detail: impl fmt::Display) -> Self {
        Self::new(
            VendorErrorKind::OperationHandleInvalid,
            format!("{}: {}", OPERATION_HANDLE_INVALID_PREFIX, detail),
        )
    }

    pub fn object_not_found(message: impl Into<String>) -> Self {
        Self::new(VendorErrorKind::ObjectNotFound, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(VendorErrorKind::Other, message)
    }

    /// Whether this failure means "the query was cancelled"
    pub fn is_cancellation(&self) -> bool {
        self.kind == VendorErrorKind::OperationHandleInvalid
    }

    pub fn is_object_not_found(&self) -> bool {
        self.kind == VendorErrorKind::ObjectNotFound
    }
}

/// OAuth user-to-machine flavours understood by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// Username/password
    Basic,

    /// Databricks-hosted OAuth (browser login)
    DatabricksOAuth,

    /// Azure Active Directory OAuth (browser login)
    AzureOAuth,
}

impl AuthType {
    pub const CHOICES: &'static [&'static str] = &["basic", "databricks-oauth", "azure-oauth"];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "basic" => Some(Self::Basic),
            "databricks-oauth" => Some(Self::DatabricksOAuth),
            "azure-oauth" => Some(Self::AzureOAuth),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::DatabricksOAuth => "databricks-oauth",
            Self::AzureOAuth => "azure-oauth",
        }
    }
}

/// Supplies request headers for OAuth machine-to-machine authentication
#[async_trait::async_trait]
pub trait CredentialsProvider: Send + Sync + fmt::Debug {
    /// Auth scheme name, for logging
    fn auth_type(&self) -> &'static str;

    /// Headers to attach to each request (e.g. `Authorization: Bearer ...`)
    async fn headers(&self) -> Result<Vec<(String, String)>, VendorError>;
}

/// Everything the driver needs to open a connection
#[derive(Clone, Default)]
pub struct ConnectParams {
    pub server_hostname: Option<String>,
    pub http_path: Option<String>,
    pub access_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_type: Option<AuthType>,
    pub credentials_provider: Option<Arc<dyn CredentialsProvider>>,
}

impl ConnectParams {
    /// Which authentication mechanism these parameters select
    pub fn auth_method(&self) -> &'static str {
        if let Some(provider) = &self.credentials_provider {
            provider.auth_type()
        } else if let Some(auth_type) = self.auth_type {
            auth_type.as_str()
        } else if self.access_token.is_some() {
            "access-token"
        } else if self.username.is_some() || self.password.is_some() {
            "basic"
        } else {
            "none"
        }
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("server_hostname", &self.server_hostname)
            .field("http_path", &self.http_path)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("auth_type", &self.auth_type)
            .field("credentials_provider", &self.credentials_provider)
            .finish()
    }
}

/// Name and vendor type name of one result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    pub type_name: String,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Entry point of the driver
#[async_trait::async_trait]
pub trait SqlClient: Send + Sync + fmt::Debug {
    /// Open a new connection
    async fn connect(&self, params: &ConnectParams)
        -> Result<Arc<dyn VendorConnection>, VendorError>;
}

/// An open driver connection
///
/// Closing a connection invalidates every operation it started; calls on
/// those operations then fail with [`VendorErrorKind::OperationHandleInvalid`].
#[async_trait::async_trait]
pub trait VendorConnection: Send + Sync + fmt::Debug {
    async fn cursor(&self) -> Result<Box<dyn VendorCursor>, VendorError>;

    async fn close(&self) -> Result<(), VendorError>;
}

/// A driver cursor: one pending result set at a time
#[async_trait::async_trait]
pub trait VendorCursor: Send + fmt::Debug {
    async fn execute(&mut self, sql: &str) -> Result<(), VendorError>;

    /// Columns of the pending result set
    fn description(&self) -> Vec<ColumnDescription>;

    /// All remaining rows as one batch
    async fn fetch_all(&mut self) -> Result<RecordBatch, VendorError>;

    /// At most `size` of the remaining rows
    async fn fetch_many(&mut self, size: usize) -> Result<RecordBatch, VendorError>;

    /// List catalogs (`TABLE_CAT`)
    async fn catalogs(&mut self) -> Result<(), VendorError>;

    /// List schemas of a catalog (`TABLE_SCHEM`, `TABLE_CATALOG`)
    async fn schemas(&mut self, catalog: &str) -> Result<(), VendorError>;

    /// List tables of a schema (`TABLE_NAME`, `TABLE_TYPE`, ...)
    async fn tables(&mut self, catalog: &str, schema: &str) -> Result<(), VendorError>;

    /// List columns of a table (`COLUMN_NAME`, `TYPE_NAME`, `ORDINAL_POSITION`, ...)
    async fn columns(&mut self, catalog: &str, schema: &str, table: &str)
        -> Result<(), VendorError>;

    async fn close(&mut self) -> Result<(), VendorError>;
}
