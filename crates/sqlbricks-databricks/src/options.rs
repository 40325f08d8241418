//! Databricks adapter options
//!
//! Raw, loosely typed options are validated once, up front, into
//! [`DatabricksOptions`]. Nothing here touches the network.

use crate::auth::{m2m_credentials_provider, ServicePrincipal};
use crate::indexer::IdentifierStyle;
use crate::init_script::{InitScript, DEFAULT_INIT_FILE};
use crate::logging::{LogConfig, LOG_LEVELS};
use crate::vendor::{AuthType, ConnectParams};
use sqlbricks_core::{
    find_option, AdapterError, AdapterOption, OptionKind, OptionValue, RawOptions, Result,
};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Every option the Databricks adapter recognizes
pub const DATABRICKS_ADAPTER_OPTIONS: &[AdapterOption] = &[
    AdapterOption::new(
        "server-hostname",
        "Databricks instance server hostname (ex. ****.cloud.databricks.com)",
        OptionKind::Text,
    ),
    AdapterOption::new(
        "http-path",
        "HTTP path of a Databricks SQL warehouse (ex. /sql/1.0/endpoints/1234567890abcdef) \
         or of an interactive cluster (ex. /sql/protocolv1/o/1234567890123456/1234-123456-slid123)",
        OptionKind::Text,
    ),
    AdapterOption::new(
        "access-token",
        "Your Databricks personal access token (if using PAT authentication)",
        OptionKind::Text,
    ),
    AdapterOption::new(
        "username",
        "Your Databricks user account's username (if using basic authentication)",
        OptionKind::Text,
    ),
    AdapterOption::new(
        "password",
        "Your Databricks user account's password (if using basic authentication)",
        OptionKind::Text,
    ),
    AdapterOption::new(
        "auth-type",
        "Set to `databricks-oauth` or `azure-oauth` for OAuth user-to-machine (U2M) authentication",
        OptionKind::Select(AuthType::CHOICES),
    ),
    AdapterOption::new(
        "client-id",
        "Service principal client ID (OAuth machine-to-machine authentication)",
        OptionKind::Text,
    ),
    AdapterOption::new(
        "client-secret",
        "Service principal client secret (OAuth machine-to-machine authentication)",
        OptionKind::Text,
    ),
    AdapterOption::new(
        "skip-legacy-indexing",
        "Skip indexing legacy metastores (e.g. `hive_metastore`). Indexing them is slow; with \
         this flag their assets do not appear in the data catalog",
        OptionKind::Flag,
    ),
    AdapterOption::new(
        "init-path",
        "SQL script run on every new connection. Defaults to ~/.databricksrc",
        OptionKind::Path,
    ),
    AdapterOption::new(
        "no-init",
        "Do not run the initialization script",
        OptionKind::Flag,
    ),
    AdapterOption::new(
        "identifier-style",
        "How catalog names are written: `plain` (main.sales.orders) \
         or `backtick` (`main`.`sales`.`orders`)",
        OptionKind::Select(IdentifierStyle::CHOICES),
    ),
    AdapterOption::new(
        "log-level",
        "Install a stderr logger at this level",
        OptionKind::Select(LOG_LEVELS),
    ),
    AdapterOption::new(
        "log-file",
        "Write adapter logs to this file instead of stderr",
        OptionKind::Path,
    ),
];

/// Process facts the adapter depends on, injected for testability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterEnvironment {
    pub home_dir: Option<PathBuf>,
    pub current_dir: Option<PathBuf>,
}

impl AdapterEnvironment {
    /// Read `HOME` and the working directory of this process
    pub fn from_process() -> Self {
        Self {
            home_dir: std::env::var_os("HOME")
                .filter(|h| !h.is_empty())
                .map(PathBuf::from),
            current_dir: std::env::current_dir().ok(),
        }
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home.into());
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// `~/.databricksrc`, when the home directory is known
    pub fn default_init_path(&self) -> Option<PathBuf> {
        self.home_dir.as_ref().map(|home| home.join(DEFAULT_INIT_FILE))
    }

    /// Expand `~` and anchor relative paths at the working directory
    pub fn resolve_path(&self, raw: &str) -> Result<PathBuf> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AdapterError::config("paths must not be empty"));
        }
        if trimmed.contains('\0') {
            return Err(AdapterError::config("paths must not contain NUL bytes"));
        }

        let path = if trimmed == "~" || trimmed.starts_with("~/") {
            let home = self.home_dir.as_ref().ok_or_else(|| {
                AdapterError::config(format!(
                    "cannot expand {}: home directory is unknown",
                    trimmed
                ))
            })?;
            home.join(trimmed.trim_start_matches('~').trim_start_matches('/'))
        } else {
            PathBuf::from(trimmed)
        };

        if path.is_absolute() {
            return Ok(path);
        }
        match &self.current_dir {
            Some(dir) => Ok(dir.join(path)),
            None => Ok(path),
        }
    }
}

/// Validated Databricks adapter options
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DatabricksOptions {
    pub server_hostname: Option<String>,
    pub http_path: Option<String>,
    pub access_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_type: Option<AuthType>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub skip_legacy_indexing: bool,
    pub init_path: Option<PathBuf>,
    pub no_init: bool,
    pub identifier_style: IdentifierStyle,
    pub log: LogConfig,
}

impl DatabricksOptions {
    pub fn new(server_hostname: &str, http_path: &str) -> Self {
        Self {
            server_hostname: Some(server_hostname.to_string()),
            http_path: Some(http_path.to_string()),
            ..Default::default()
        }
    }

    pub fn with_access_token(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = Some(auth_type);
        self
    }

    pub fn with_client_credentials(mut self, client_id: &str, client_secret: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self.client_secret = Some(client_secret.to_string());
        self
    }

    pub fn with_skip_legacy_indexing(mut self, skip: bool) -> Self {
        self.skip_legacy_indexing = skip;
        self
    }

    pub fn with_init_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.init_path = Some(path.into());
        self
    }

    pub fn with_no_init(mut self, no_init: bool) -> Self {
        self.no_init = no_init;
        self
    }

    pub fn with_identifier_style(mut self, style: IdentifierStyle) -> Self {
        self.identifier_style = style;
        self
    }

    /// Validate and normalize raw options
    ///
    /// Unrecognized keys are ignored.
    pub fn from_raw(raw: &RawOptions, env: &AdapterEnvironment) -> Result<Self> {
        for key in raw.keys() {
            if find_option(DATABRICKS_ADAPTER_OPTIONS, key).is_none() {
                debug!("ignoring unrecognized option {}", key);
            }
        }

        let auth_type = choice(raw, "auth_type")?
            .as_deref()
            .and_then(AuthType::parse);
        let identifier_style = choice(raw, "identifier_style")?
            .as_deref()
            .and_then(IdentifierStyle::parse)
            .unwrap_or_default();
        let level = choice(raw, "log_level")?;
        let file = match text(raw, "log_file")? {
            Some(value) => Some(env.resolve_path(&value)?.display().to_string()),
            None => None,
        };

        let init_path = match text(raw, "init_path")? {
            Some(value) => Some(env.resolve_path(&value)?),
            None => env.default_init_path(),
        };

        let options = Self {
            server_hostname: text(raw, "server_hostname")?,
            http_path: text(raw, "http_path")?,
            access_token: text(raw, "access_token")?,
            username: text(raw, "username")?,
            password: text(raw, "password")?,
            auth_type,
            client_id: text(raw, "client_id")?,
            client_secret: text(raw, "client_secret")?,
            skip_legacy_indexing: flag(raw, "skip_legacy_indexing")?,
            init_path,
            no_init: flag(raw, "no_init")?,
            identifier_style,
            log: LogConfig { level, file },
        };

        options.service_principal()?;
        Ok(options)
    }

    /// Service principal credentials, if OAuth M2M is configured
    ///
    /// Supplying only one of client id and secret is a configuration error.
    pub fn service_principal(&self) -> Result<Option<ServicePrincipal>> {
        let client_id = self.client_id.as_deref().filter(|s| !s.is_empty());
        let client_secret = self.client_secret.as_deref().filter(|s| !s.is_empty());

        match (client_id, client_secret) {
            (None, None) => Ok(None),
            (Some(id), Some(secret)) => {
                let hostname = self.server_hostname.as_deref().ok_or_else(|| {
                    AdapterError::config("OAuth M2M requires server-hostname")
                })?;
                Ok(Some(ServicePrincipal::new(hostname, id, secret)))
            }
            _ => Err(AdapterError::config(
                "To use OAuth M2M you must supply both client-id and client-secret.",
            )),
        }
    }

    /// Parameters for the vendor connect call
    ///
    /// With M2M credentials this builds the OAuth credentials provider,
    /// which fails when that support is not compiled in.
    pub fn connect_params(&self) -> Result<ConnectParams> {
        let credentials_provider = match self.service_principal()? {
            Some(principal) => Some(m2m_credentials_provider(principal)?),
            None => None,
        };

        Ok(ConnectParams {
            server_hostname: self.server_hostname.clone(),
            http_path: self.http_path.clone(),
            access_token: self.access_token.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            auth_type: self.auth_type,
            credentials_provider,
        })
    }

    /// The initialization script to run on new handles, if any
    pub fn init_script(&self) -> Option<InitScript> {
        if self.no_init {
            return None;
        }
        self.init_path.as_deref().and_then(InitScript::load)
    }

    pub fn init_path(&self) -> Option<&Path> {
        self.init_path.as_deref()
    }
}

impl fmt::Debug for DatabricksOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |s: &Option<String>| s.as_ref().map(|_| "<redacted>");
        f.debug_struct("DatabricksOptions")
            .field("server_hostname", &self.server_hostname)
            .field("http_path", &self.http_path)
            .field("access_token", &redacted(&self.access_token))
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("auth_type", &self.auth_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("skip_legacy_indexing", &self.skip_legacy_indexing)
            .field("init_path", &self.init_path)
            .field("no_init", &self.no_init)
            .field("identifier_style", &self.identifier_style)
            .field("log", &self.log)
            .finish()
    }
}

fn text(raw: &RawOptions, key: &str) -> Result<Option<String>> {
    match raw.get(key) {
        None => Ok(None),
        Some(OptionValue::Text(s)) => Ok(Some(s.clone())),
        Some(OptionValue::Integer(i)) => Ok(Some(i.to_string())),
        Some(other) => Err(wrong_type(key, "a string", other)),
    }
}

fn flag(raw: &RawOptions, key: &str) -> Result<bool> {
    match raw.get(key) {
        None => Ok(false),
        Some(OptionValue::Bool(b)) => Ok(*b),
        Some(OptionValue::Integer(0)) => Ok(false),
        Some(OptionValue::Integer(1)) => Ok(true),
        Some(OptionValue::Text(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(AdapterError::config(format!(
                "{} expects true/false, got {:?}",
                display_key(key),
                s
            ))),
        },
        Some(other) => Err(wrong_type(key, "a boolean", other)),
    }
}

fn display_key(key: &str) -> String {
    key.replace('_', "-")
}

fn wrong_type(key: &str, expected: &str, got: &OptionValue) -> AdapterError {
    AdapterError::config(format!(
        "{} expects {}, got {} {}",
        display_key(key),
        expected,
        got.type_name(),
        got
    ))
}

/// Read a `Select` option, lowercased and checked against its descriptor
fn choice(raw: &RawOptions, key: &str) -> Result<Option<String>> {
    let Some(value) = text(raw, key)? else {
        return Ok(None);
    };
    let value = value.trim().to_lowercase();

    match find_option(DATABRICKS_ADAPTER_OPTIONS, key) {
        Some(option) if !option.accepts(&value) => {
            let choices = match option.kind {
                OptionKind::Select(choices) => choices.join(", "),
                _ => String::new(),
            };
            Err(AdapterError::config(format!(
                "{} must be one of {}, got {:?}",
                option.name, choices, value
            )))
        }
        _ => Ok(Some(value)),
    }
}
