//! sqlbricks Core
//!
//! The contract between a SQL client host and its warehouse adapters:
//! the catalog tree, the connection/cursor capability traits, the error
//! kinds raised into the host, and the raw options layer.

pub mod catalog;
pub mod config;
pub mod error;
pub mod host;
pub mod options;

pub use catalog::{Catalog, CatalogItem};
pub use config::{ConfigError, OptionValue, RawOptions};
pub use error::{AdapterError, Result};
pub use host::{Adapter, Connection, Cursor};
pub use options::{find_option, AdapterOption, OptionKind};
