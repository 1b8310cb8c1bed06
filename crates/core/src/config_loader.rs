use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Prefix for environment overrides, e.g. `BATCH_TRADE_TRADING__DRY_RUN=false`.
pub const ENV_PREFIX: &str = "BATCH_TRADE_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging defaults, the JSON file, and environment variables.
    ///
    /// A missing file is created with the default configuration. A file that
    /// cannot be parsed is logged and the defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the default file cannot be written.
    pub fn load(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();

        if !path.exists() {
            Self::write_default(path)?;
            tracing::info!(path = %path.display(), "created default configuration file");
        }

        match Self::figment(path).extract::<AppConfig>() {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded configuration");
                Ok(config)
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "error loading config file, using defaults"
                );
                Ok(AppConfig::default())
            }
        }
    }

    /// The provider stack used by [`ConfigLoader::load`].
    #[must_use]
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Writes the default configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or serialized.
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create config file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &AppConfig::default())
            .context("failed to write default configuration")?;
        writer.flush()?;
        Ok(())
    }
}
