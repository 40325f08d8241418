//! Initialization script (`~/.databricksrc` by default)
//!
//! A plain SQL file whose statements run on every freshly opened connection
//! handle, e.g. `USE CATALOG main; SET TIME ZONE 'UTC';`.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the default script in the user's home directory
pub const DEFAULT_INIT_FILE: &str = ".databricksrc";

/// Statements read from an initialization script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitScript {
    path: PathBuf,
    statements: Vec<String>,
}

impl InitScript {
    /// Read a script from disk
    ///
    /// A missing or unreadable file means there is no script.
    pub fn load(path: &Path) -> Option<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Some(Self::parse(path, &text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no init script at {}", path.display());
                None
            }
            Err(e) => {
                warn!("ignoring unreadable init script {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn parse(path: &Path, text: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            statements: split_statements(text),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Status line reported after `count` statements ran; empty when none did
    pub fn status_message(&self, count: usize) -> String {
        match count {
            0 => String::new(),
            1 => format!("Executed 1 command from {}", self.path.display()),
            n => format!("Executed {} commands from {}", n, self.path.display()),
        }
    }

    /// Detail message for a statement that failed
    pub fn failure_message(&self, error: &impl std::fmt::Display) -> String {
        format!("Attempted to execute script at {}\n{}", self.path.display(), error)
    }
}

/// Split script text on `;`, dropping blank statements
///
/// Semicolons inside string literals or comments are not special-cased.
pub fn split_statements(text: &str) -> Vec<String> {
    text.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
