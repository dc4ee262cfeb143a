use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::Level;

pub const DEFAULT_CONFIG_FILE: &str = "llmeter.toml";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:11434";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://llmeter.db";
pub const DEFAULT_SUITES_DIR: &str = "suites";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_PAUSE_MS: u64 = 100;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub backend_url: Option<String>,
    pub database_url: Option<String>,
    pub suites_dir: Option<PathBuf>,
    pub port: Option<u16>,
    /// Settle time between iterations so the backend quiesces before the
    /// next request is timed.
    pub inter_iteration_pause_ms: Option<u64>,
    pub debug_level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backend_url: Some(DEFAULT_BACKEND_URL.to_string()),
            database_url: Some(DEFAULT_DATABASE_URL.to_string()),
            suites_dir: Some(PathBuf::from(DEFAULT_SUITES_DIR)),
            port: Some(DEFAULT_PORT),
            inter_iteration_pause_ms: Some(DEFAULT_PAUSE_MS),
            debug_level: Some("info".to_string()),
        }
    }
}

impl Settings {
    /// Read settings from a TOML file; a missing file yields the defaults so
    /// the tool works out of the box.
    pub fn from_path(path: &Path) -> anyhow::Result<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let raw =
            fs::read_to_string(path).context(format!("Error reading settings file {:?}", path))?;
        toml::from_str::<Settings>(&raw)
            .map_err(|e| anyhow::anyhow!("Error parsing {:?}: {}", path, e))
    }

    /// Write the default settings to a new file. Fails if the file exists.
    pub fn write_default(path: &Path) -> anyhow::Result<()> {
        let toml_string = toml::to_string_pretty(&Settings::default())?;
        if path.exists() {
            anyhow::bail!("{:?} already exists", path);
        }
        fs::write(path, toml_string).context(format!("Error writing {:?}", path))?;
        Ok(())
    }

    pub fn backend_url(&self) -> String {
        self.backend_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
    }

    /// `DATABASE_URL` in the environment takes priority over the file.
    pub fn database_url(&self) -> String {
        dotenvy::var("DATABASE_URL").ok().unwrap_or_else(|| {
            self.database_url
                .clone()
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
        })
    }

    pub fn suites_dir(&self) -> PathBuf {
        self.suites_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SUITES_DIR))
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn pause_ms(&self) -> u64 {
        self.inter_iteration_pause_ms.unwrap_or(DEFAULT_PAUSE_MS)
    }

    pub fn log_level(&self, verbose: bool) -> Level {
        if verbose {
            return Level::DEBUG;
        }
        match self.debug_level.as_deref() {
            Some("trace") => Level::TRACE,
            Some("debug") => Level::DEBUG,
            Some("warn") => Level::WARN,
            Some("error") => Level::ERROR,
            _ => Level::INFO,
        }
    }
}
