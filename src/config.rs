//! Gateway configuration, loadable from a TOML file.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Which backing store a gateway runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The in-memory mock store.
    #[default]
    Mock,
    /// The `SQLite` backend.
    Sqlite,
}

/// Resolved gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Backing store to construct.
    pub backend: BackendKind,
    /// Database file for the `SQLite` backend; `None` opens an in-memory
    /// database. Ignored by the mock store.
    pub database_path: Option<PathBuf>,
}

/// TOML mirror of [`GatewayConfig`]; every field optional so partial files
/// fall back to defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    backend: Option<BackendKind>,
    database_path: Option<PathBuf>,
}

impl GatewayConfig {
    /// Loads configuration from a TOML file, filling missing fields with
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the file cannot be read or parsed.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Backend {
            operation: "load_config".to_string(),
            cause: format!("failed to read {}: {e}", path.as_ref().display()),
        })?;
        let file: ConfigFile = toml::from_str(&content).map_err(|e| Error::Backend {
            operation: "load_config".to_string(),
            cause: format!("failed to parse {}: {e}", path.as_ref().display()),
        })?;

        Ok(Self {
            backend: file.backend.unwrap_or_default(),
            database_path: file.database_path,
        })
    }

    /// Selects the backing store.
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the database file for the `SQLite` backend.
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }
}
