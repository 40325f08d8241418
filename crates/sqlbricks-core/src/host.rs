//! Capability interfaces the host application drives
//!
//! The host talks to every warehouse through these three traits. A
//! connection must tolerate `cancel()` being called from another task while
//! `execute()` or `get_catalog()` is still running on it.

use crate::catalog::Catalog;
use crate::error::Result;
use crate::options::AdapterOption;
use arrow_array::RecordBatch;

/// A result set produced by [`Connection::execute`]
#[async_trait::async_trait]
pub trait Cursor: Send {
    /// Column names with short type codes, in result order (names may repeat)
    fn columns(&self) -> Vec<(String, String)>;

    /// Cap the number of rows returned by [`Cursor::fetchall`]
    fn set_limit(self, limit: usize) -> Self
    where
        Self: Sized;

    /// Fetch the (possibly capped) result as one columnar batch
    ///
    /// `Ok(None)` means the query was cancelled; this is not an error.
    async fn fetchall(&mut self) -> Result<Option<RecordBatch>>;
}

/// A live session against a warehouse
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    type Cursor: Cursor;

    /// Execute a query. `Ok(None)` means it was cancelled (or produced nothing).
    async fn execute(&self, query: &str) -> Result<Option<Self::Cursor>>;

    /// Interrupt every in-flight query on this connection
    async fn cancel(&self) -> Result<()>;

    /// Index the warehouse metadata for the data catalog pane
    ///
    /// A cancelled indexing run returns the last complete catalog.
    async fn get_catalog(&self) -> Result<Catalog>;

    /// Close the connection; closing twice is a no-op
    async fn close(&self) -> Result<()>;

    /// Status text shown after connecting (e.g. init script summary)
    fn init_message(&self) -> &str;
}

/// Entry point the host instantiates from user options
#[async_trait::async_trait]
pub trait Adapter: Send + Sync {
    type Connection: Connection;

    /// Whether [`Connection::cancel`] actually interrupts queries
    const IMPLEMENTS_CANCEL: bool;

    /// Adapter name (e.g., "databricks")
    fn name(&self) -> &'static str;

    /// Options this adapter recognizes
    fn options() -> &'static [AdapterOption]
    where
        Self: Sized;

    /// Open a connection with the adapter's validated options
    async fn connect(&self) -> Result<Self::Connection>;
}
