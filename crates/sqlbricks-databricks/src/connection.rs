//! Connection lifecycle: connect, init script, execute, cancel, close
//!
//! The vendor driver cannot interrupt a running statement at the connection
//! level, but closing a connection tears down every operation it started.
//! `cancel()` therefore opens a replacement handle, swaps it in, and then
//! closes the old one. Anything still running on the old handle fails with
//! an invalid operation handle, which surfaces as `Ok(None)`.

use crate::fetch::{query_error, DatabricksCursor, HandleEpoch};
use crate::indexer::{CatalogIndexer, IdentifierStyle};
use crate::init_script::InitScript;
use crate::options::DatabricksOptions;
use crate::vendor::{ConnectParams, SqlClient, VendorConnection, VendorCursor};
use sqlbricks_core::error::{CONNECTION_TITLE, INIT_SCRIPT_TITLE, QUERY_TITLE};
use sqlbricks_core::{AdapterError, Catalog, Connection, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Lifecycle state of a [`DatabricksConnection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Closed,
}

/// A Databricks session, shareable across tasks
#[derive(Debug)]
pub struct DatabricksConnection {
    client: Arc<dyn SqlClient>,
    params: ConnectParams,
    init_script: Option<InitScript>,
    init_message: String,
    skip_legacy_indexing: bool,
    identifier_style: IdentifierStyle,
    active: RwLock<Option<Arc<dyn VendorConnection>>>,
    epoch: HandleEpoch,
    snapshot: RwLock<Catalog>,
    /// Serializes cancels so two replacements never race each other
    swap: Mutex<()>,
}

impl DatabricksConnection {
    /// Connect and run the initialization script
    pub async fn open(client: Arc<dyn SqlClient>, options: &DatabricksOptions) -> Result<Self> {
        let params = options.connect_params()?;
        let init_script = options.init_script();

        let (handle, init_message) =
            open_handle(client.as_ref(), &params, init_script.as_ref()).await?;
        info!(
            "connected to {} ({})",
            params.server_hostname.as_deref().unwrap_or("<unknown host>"),
            params.auth_method()
        );

        Ok(Self {
            client,
            params,
            init_script,
            init_message,
            skip_legacy_indexing: options.skip_legacy_indexing,
            identifier_style: options.identifier_style,
            active: RwLock::new(Some(handle)),
            epoch: HandleEpoch::default(),
            snapshot: RwLock::new(Catalog::empty()),
            swap: Mutex::new(()),
        })
    }

    pub async fn state(&self) -> ConnectionState {
        match *self.active.read().await {
            Some(_) => ConnectionState::Connected,
            None => ConnectionState::Closed,
        }
    }

    /// The last catalog that was indexed completely
    pub async fn snapshot(&self) -> Catalog {
        self.snapshot.read().await.clone()
    }

    /// Clone the active handle together with the epoch it belongs to
    async fn current_handle(&self) -> Option<(Arc<dyn VendorConnection>, u64)> {
        let guard = self.active.read().await;
        guard
            .as_ref()
            .map(|handle| (Arc::clone(handle), self.epoch.current()))
    }
}

/// Open a vendor handle and run the init script on it
///
/// Returns the handle and the status message for the script.
async fn open_handle(
    client: &dyn SqlClient,
    params: &ConnectParams,
    script: Option<&InitScript>,
) -> Result<(Arc<dyn VendorConnection>, String)> {
    let handle = client.connect(params).await.map_err(|err| {
        AdapterError::connection(CONNECTION_TITLE, err.message.clone()).with_source(err)
    })?;

    let Some(script) = script.filter(|s| !s.is_empty()) else {
        return Ok((handle, String::new()));
    };

    match run_script(handle.as_ref(), script).await {
        Ok(count) => {
            debug!("init script ran {} statement(s)", count);
            Ok((handle, script.status_message(count)))
        }
        Err(err) => {
            if let Err(close_err) = handle.close().await {
                debug!("closing handle after init failure: {}", close_err);
            }
            Err(err)
        }
    }
}

async fn run_script(handle: &dyn VendorConnection, script: &InitScript) -> Result<usize> {
    let mut count = 0;
    for statement in script.statements() {
        debug!("init: {}", statement);
        let outcome = match handle.cursor().await {
            Ok(mut cursor) => {
                let outcome = cursor.execute(statement).await;
                close_quietly(cursor).await;
                outcome
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {}
            Err(err) if err.is_cancellation() => {
                debug!("init statement cancelled: {}", err);
            }
            Err(err) => {
                return Err(
                    AdapterError::connection(INIT_SCRIPT_TITLE, script.failure_message(&err))
                        .with_source(err),
                );
            }
        }
        count += 1;
    }
    Ok(count)
}

async fn close_quietly(mut cursor: Box<dyn VendorCursor>) {
    if let Err(err) = cursor.close().await {
        debug!("closing cursor failed: {}", err);
    }
}

#[async_trait::async_trait]
impl Connection for DatabricksConnection {
    type Cursor = DatabricksCursor;

    async fn execute(&self, query: &str) -> Result<Option<DatabricksCursor>> {
        let Some((handle, opened_at)) = self.current_handle().await else {
            return Err(AdapterError::query(QUERY_TITLE, "The connection is closed"));
        };

        let mut cursor = match handle.cursor().await {
            Ok(cursor) => cursor,
            Err(err) if err.is_cancellation() || !self.epoch.is_current(opened_at) => {
                debug!("cursor request cancelled: {}", err);
                return Ok(None);
            }
            Err(err) => return Err(query_error(QUERY_TITLE, err)),
        };

        match cursor.execute(query).await {
            Ok(()) if self.epoch.is_current(opened_at) => Ok(Some(DatabricksCursor::new(
                cursor,
                opened_at,
                self.epoch.clone(),
            ))),
            Ok(()) => {
                debug!("query finished on a replaced handle");
                close_quietly(cursor).await;
                Ok(None)
            }
            Err(err) if err.is_cancellation() || !self.epoch.is_current(opened_at) => {
                debug!("query cancelled: {}", err);
                close_quietly(cursor).await;
                Ok(None)
            }
            Err(err) => {
                close_quietly(cursor).await;
                Err(query_error(QUERY_TITLE, err))
            }
        }
    }

    async fn cancel(&self) -> Result<()> {
        let _swap = self.swap.lock().await;
        if self.state().await == ConnectionState::Closed {
            debug!("cancel on a closed connection");
            return Ok(());
        }

        let (fresh, message) =
            open_handle(self.client.as_ref(), &self.params, self.init_script.as_ref()).await?;
        if !message.is_empty() {
            debug!("{}", message);
        }

        let old = {
            let mut active = self.active.write().await;
            if active.is_none() {
                // Closed while the replacement was connecting
                drop(active);
                if let Err(err) = fresh.close().await {
                    debug!("closing unused replacement handle: {}", err);
                }
                return Ok(());
            }
            self.epoch.advance();
            active.replace(fresh)
        };

        if let Some(old) = old {
            if let Err(err) = old.close().await {
                warn!("closing the cancelled handle failed: {}", err);
            }
        }
        info!("cancelled in-flight operations");
        Ok(())
    }

    async fn get_catalog(&self) -> Result<Catalog> {
        let Some((handle, opened_at)) = self.current_handle().await else {
            return Err(AdapterError::query(QUERY_TITLE, "The connection is closed"));
        };

        let indexed = CatalogIndexer::new(
            handle.as_ref(),
            self.skip_legacy_indexing,
            self.identifier_style,
        )
        .run()
        .await;

        let catalog = match indexed {
            Ok(Some(catalog)) => catalog,
            Ok(None) => {
                info!("catalog indexing cancelled, keeping previous catalog");
                return Ok(self.snapshot().await);
            }
            Err(_) if !self.epoch.is_current(opened_at) => {
                info!("catalog indexing interrupted by cancel");
                return Ok(self.snapshot().await);
            }
            Err(err) => return Err(err),
        };

        // Hold the handle lock so a cancel cannot land between check and store
        let _active = self.active.read().await;
        if !self.epoch.is_current(opened_at) {
            info!("discarding catalog indexed on a replaced handle");
            return Ok(self.snapshot().await);
        }
        *self.snapshot.write().await = catalog.clone();
        info!("indexed {} catalog nodes", catalog.node_count());
        Ok(catalog)
    }

    async fn close(&self) -> Result<()> {
        let old = {
            let mut active = self.active.write().await;
            let old = active.take();
            if old.is_some() {
                self.epoch.advance();
            }
            old
        };

        match old {
            Some(handle) => {
                handle.close().await.map_err(|err| {
                    AdapterError::connection(CONNECTION_TITLE, err.message.clone())
                        .with_source(err)
                })?;
                info!("connection closed");
            }
            None => debug!("close on an already closed connection"),
        }
        Ok(())
    }

    fn init_message(&self) -> &str {
        &self.init_message
    }
}
