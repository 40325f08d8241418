//! The Databricks adapter entry point
//!
//! Hosts build a [`DatabricksAdapter`] from raw options, then call
//! [`Adapter::connect`] to get a live [`DatabricksConnection`].

use crate::connection::DatabricksConnection;
use crate::logging::init_logging;
use crate::options::{AdapterEnvironment, DatabricksOptions, DATABRICKS_ADAPTER_OPTIONS};
use crate::vendor::SqlClient;
use sqlbricks_core::{Adapter, AdapterOption, RawOptions, Result};
use std::sync::Arc;
use tracing::debug;

/// Databricks adapter: validated options plus the driver to connect with
#[derive(Debug, Clone)]
pub struct DatabricksAdapter {
    options: DatabricksOptions,
    client: Arc<dyn SqlClient>,
}

impl DatabricksAdapter {
    /// Validate raw options
    ///
    /// All option problems surface here as configuration errors, before any
    /// network activity.
    pub fn new(
        raw: &RawOptions,
        env: &AdapterEnvironment,
        client: Arc<dyn SqlClient>,
    ) -> Result<Self> {
        let options = DatabricksOptions::from_raw(raw, env)?;
        Ok(Self::with_options(options, client))
    }

    pub fn with_options(options: DatabricksOptions, client: Arc<dyn SqlClient>) -> Self {
        if options.log.is_set() {
            init_logging(&options.log);
        }
        debug!("databricks adapter configured: {:?}", options);
        Self { options, client }
    }

    pub fn options(&self) -> &DatabricksOptions {
        &self.options
    }
}

#[async_trait::async_trait]
impl Adapter for DatabricksAdapter {
    type Connection = DatabricksConnection;

    const IMPLEMENTS_CANCEL: bool = true;

    fn name(&self) -> &'static str {
        "databricks"
    }

    fn options() -> &'static [AdapterOption] {
        DATABRICKS_ADAPTER_OPTIONS
    }

    async fn connect(&self) -> Result<DatabricksConnection> {
        DatabricksConnection::open(Arc::clone(&self.client), &self.options).await
    }
}
