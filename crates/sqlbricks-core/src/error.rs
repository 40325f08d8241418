//! Error kinds raised into the host application
//!
//! Every error carries a fixed, human readable title (shown as the heading of
//! the host's error dialog) and the original message as detail. Cancellation
//! is not an error and never appears here.

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Title for malformed adapter construction input
pub const CONFIG_TITLE: &str = "Could not initialize the Databricks adapter.";

/// Title for vendor connect failures
pub const CONNECTION_TITLE: &str = "Could not connect to Databricks SQL warehouse.";

/// Title for failures while running the initialization script
pub const INIT_SCRIPT_TITLE: &str =
    "Databricks errored while executing your initialization script.";

/// Title for failures of a user query
pub const QUERY_TITLE: &str = "Encountered an error while querying Databricks.";

/// Title for failures while indexing Unity Catalog assets
pub const UNITY_INDEX_TITLE: &str =
    "Encountered an error while querying Databricks to index the Unity Catalog assets.";

/// Title for failures while indexing legacy metastore assets
pub const LEGACY_INDEX_TITLE: &str =
    "Encountered an error while querying Databricks to index the legacy metastore assets.";

/// Errors surfaced to the host
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Bad construction input, raised before any network activity
    #[error("{} {msg}", CONFIG_TITLE)]
    Config { msg: String },

    /// Connect failure, missing optional capability, or init script failure
    #[error("{title} {msg}")]
    Connection {
        title: &'static str,
        msg: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Query or fetch failure that was not a cancellation
    #[error("{title} {msg}")]
    Query {
        title: &'static str,
        msg: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl AdapterError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config { msg: msg.into() }
    }

    pub fn connection(title: &'static str, msg: impl Into<String>) -> Self {
        Self::Connection {
            title,
            msg: msg.into(),
            source: None,
        }
    }

    pub fn query(title: &'static str, msg: impl Into<String>) -> Self {
        Self::Query {
            title,
            msg: msg.into(),
            source: None,
        }
    }

    /// Attach the underlying cause (ignored for config errors)
    pub fn with_source(mut self, cause: impl Into<BoxError>) -> Self {
        match &mut self {
            Self::Connection { source, .. } | Self::Query { source, .. } => {
                *source = Some(cause.into());
            }
            Self::Config { .. } => {}
        }
        self
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Config { .. } => CONFIG_TITLE,
            Self::Connection { title, .. } | Self::Query { title, .. } => *title,
        }
    }

    /// Detail message (the original vendor message where there is one)
    pub fn message(&self) -> &str {
        match self {
            Self::Config { msg } | Self::Connection { msg, .. } | Self::Query { msg, .. } => msg,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }
}

/// Result alias used across the adapter
pub type Result<T> = std::result::Result<T, AdapterError>;
