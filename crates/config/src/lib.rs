//! Configuration for the folio CLI.
//!
//! Layered figment: built-in defaults, then an optional TOML file, then
//! `FOLIO_*` environment variables. Paths default to platform conventions
//! via `directories`.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APPLICATION: &str = "folio";
const CONFIG_FILE: &str = "folio.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory of the book library. Must be absolute.
    pub library_root: PathBuf,
    /// Location of the catalog database file. Created on first run.
    pub database_path: PathBuf,
}

impl Settings {
    /// Platform defaults: `~/Books` as the library, the catalog database in
    /// the platform data directory.
    pub fn defaults() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", APPLICATION).ok_or_raise(|| ErrorKind::NoHome)?;
        let home = directories::UserDirs::new().ok_or_raise(|| ErrorKind::NoHome)?;
        Ok(Self {
            library_root: home.home_dir().join("Books"),
            database_path: dirs.data_dir().join("catalog.db"),
        })
    }

    /// Load settings: defaults, overridden by `file` (or the platform config
    /// file when `None`), overridden by `FOLIO_*` environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config_file = match file {
            Some(path) => path.to_path_buf(),
            None => directories::ProjectDirs::from("", "", APPLICATION)
                .ok_or_raise(|| ErrorKind::NoHome)?
                .config_dir()
                .join(CONFIG_FILE),
        };
        let settings: Self = Figment::from(Serialized::defaults(Self::defaults()?))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("FOLIO_"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        settings.validate()?;
        tracing::debug!(
            library = %settings.library_root.display(),
            database = %settings.database_path.display(),
            "configuration loaded",
        );
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if !self.library_root.is_absolute() {
            exn::bail!(ErrorKind::Invalid(format!(
                "library_root must be an absolute path, got {}",
                self.library_root.display(),
            )));
        }
        if self.database_path.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("database_path must not be empty".to_string()));
        }
        Ok(())
    }
}
