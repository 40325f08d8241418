//! Result fetching and the host-facing cursor

use crate::types::short_type_code;
use crate::vendor::{VendorCursor, VendorError};
use arrow_array::RecordBatch;
use sqlbricks_core::error::QUERY_TITLE;
use sqlbricks_core::{AdapterError, Cursor, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Pull a result out of a vendor cursor that has executed something
///
/// Without a limit the whole result comes back as one batch. `Ok(None)`
/// means the operation was cancelled; other failures become query errors
/// carrying `title`.
pub async fn fetch(
    cursor: &mut dyn VendorCursor,
    limit: Option<usize>,
    title: &'static str,
) -> Result<Option<RecordBatch>> {
    let fetched = match limit {
        Some(limit) => cursor.fetch_many(limit).await,
        None => cursor.fetch_all().await,
    };

    match fetched {
        Ok(batch) => Ok(Some(batch)),
        Err(err) if err.is_cancellation() => {
            debug!("fetch cancelled: {}", err);
            Ok(None)
        }
        Err(err) => Err(query_error(title, err)),
    }
}

pub(crate) fn query_error(title: &'static str, err: VendorError) -> AdapterError {
    AdapterError::query(title, err.message.clone()).with_source(err)
}

/// Tracks which connection handle is current
///
/// Every swap of the active handle bumps the epoch. Anything opened on an
/// older epoch is stale.
#[derive(Debug, Clone, Default)]
pub(crate) struct HandleEpoch(Arc<AtomicU64>);

impl HandleEpoch {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }
}

/// Result of a query executed through [`crate::DatabricksConnection`]
#[derive(Debug)]
pub struct DatabricksCursor {
    inner: Box<dyn VendorCursor>,
    limit: Option<usize>,
    opened_at: u64,
    epoch: HandleEpoch,
}

impl DatabricksCursor {
    pub(crate) fn new(inner: Box<dyn VendorCursor>, opened_at: u64, epoch: HandleEpoch) -> Self {
        Self {
            inner,
            limit: None,
            opened_at,
            epoch,
        }
    }

    /// The row cap applied by `fetchall`, if any
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Whether the connection handle this cursor was opened on has been
    /// replaced by a cancel (or closed)
    pub fn is_superseded(&self) -> bool {
        !self.epoch.is_current(self.opened_at)
    }

    /// Release the vendor cursor
    pub async fn close(mut self) {
        if let Err(err) = self.inner.close().await {
            debug!("closing cursor failed: {}", err);
        }
    }
}

#[async_trait::async_trait]
impl Cursor for DatabricksCursor {
    fn columns(&self) -> Vec<(String, String)> {
        self.inner
            .description()
            .into_iter()
            .map(|c| {
                let code = short_type_code(&c.type_name);
                (c.name, code.to_string())
            })
            .collect()
    }

    fn set_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    async fn fetchall(&mut self) -> Result<Option<RecordBatch>> {
        if self.is_superseded() {
            debug!("cursor belongs to a replaced connection handle");
            return Ok(None);
        }

        let fetched = fetch(self.inner.as_mut(), self.limit, QUERY_TITLE).await;

        // A cancel that landed while the fetch was in flight wins, even over
        // whatever error the torn-down handle produced
        if self.is_superseded() {
            if let Err(err) = &fetched {
                debug!("fetch failed on a replaced handle: {}", err);
            }
            return Ok(None);
        }
        fetched
    }
}
