//! Raw adapter options and the options file (sqlbricks.toml)
//!
//! Options arrive loosely typed (from CLI flags, a config file or the host's
//! own settings) and are validated by the adapter that consumes them.

use crate::error::AdapterError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A single raw option value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl OptionValue {
    /// Short description of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Text(_) => "string",
        }
    }
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&Path> for OptionValue {
    fn from(value: &Path) -> Self {
        Self::Text(value.display().to_string())
    }
}

/// Loosely typed option map, keyed by snake_case option name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawOptions {
    values: BTreeMap<String, OptionValue>,
}

impl RawOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option (builder style); `server-hostname` and
    /// `server_hostname` are the same key
    pub fn with(mut self, key: &str, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<OptionValue>) {
        self.values.insert(normalize_key(key), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(&normalize_key(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(&normalize_key(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse options from the top-level table of a TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let parsed: RawOptions =
            toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(parsed.normalized())
    }

    /// Parse options from a named profile table (`[profiles.<name>]`)
    pub fn from_toml_profile(toml: &str, profile: &str) -> Result<Self, ConfigError> {
        let file: ProfilesFile =
            toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        file.profiles
            .get(profile)
            .cloned()
            .map(RawOptions::normalized)
            .ok_or_else(|| ConfigError::MissingProfile(profile.to_string()))
    }

    /// Load options from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    fn normalized(self) -> Self {
        let values = self
            .values
            .into_iter()
            .map(|(k, v)| (normalize_key(&k), v))
            .collect();
        Self { values }
    }
}

impl<K: AsRef<str>, V: Into<OptionValue>> FromIterator<(K, V)> for RawOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = RawOptions::new();
        for (k, v) in iter {
            options.insert(k.as_ref(), v);
        }
        options
    }
}

#[derive(Debug, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profiles: BTreeMap<String, RawOptions>,
}

fn normalize_key(key: &str) -> String {
    key.trim().replace('-', "_")
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Profile not found: {0}")]
    MissingProfile(String),
}

impl From<ConfigError> for AdapterError {
    fn from(err: ConfigError) -> Self {
        AdapterError::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_normalized() {
        let options = RawOptions::new()
            .with("server-hostname", "dbc.cloud.databricks.com")
            .with("no_init", true);

        assert!(options.contains("server_hostname"));
        assert_eq!(options.get("no-init"), Some(&OptionValue::Bool(true)));
        assert_eq!(options.keys().collect::<Vec<_>>(), vec!["no_init", "server_hostname"]);
    }

    #[test]
    fn toml_values_keep_their_types() {
        let options = RawOptions::from_toml_str(
            r#"
            server-hostname = "dbc.cloud.databricks.com"
            skip_legacy_indexing = true
            no-init = "yes"
            retries = 3
            "#,
        )
        .unwrap();

        assert_eq!(options.len(), 4);
        assert_eq!(options.get("skip_legacy_indexing"), Some(&OptionValue::Bool(true)));
        assert_eq!(options.get("no_init"), Some(&OptionValue::Text("yes".into())));
        assert_eq!(options.get("retries"), Some(&OptionValue::Integer(3)));
    }

    #[test]
    fn profile_selection() {
        let toml = r#"
            [profiles.prod]
            http_path = "/sql/1.0/warehouses/abc"

            [profiles.dev]
            http_path = "/sql/1.0/warehouses/dev"
        "#;

        let dev = RawOptions::from_toml_profile(toml, "dev").unwrap();
        assert_eq!(dev.get("http_path").unwrap().to_string(), "/sql/1.0/warehouses/dev");

        let missing = RawOptions::from_toml_profile(toml, "staging");
        assert!(matches!(missing, Err(ConfigError::MissingProfile(_))));
    }

    #[test]
    fn parse_errors_become_config_errors() {
        let err = RawOptions::from_toml_str("server_hostname = ").unwrap_err();
        let err: AdapterError = err.into();
        assert!(err.is_config());
    }
}
