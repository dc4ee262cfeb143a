use crate::error::BenchError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const DEFAULT_MAX_TOKENS: u32 = 100;
pub const MIN_TIMEOUT_MS: u64 = 5_000;
pub const MAX_ITERATIONS: u32 = 100;

/// A single named prompt workload with a token budget.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Scenario {
    pub name: String,
    pub prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    pub expected_output_length: Option<String>,
}

/// An ordered collection of scenarios addressed by name. Suites are read-only
/// inputs to a run, defined as TOML files in the suites directory.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Suite {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub scenarios: Vec<Scenario>,
}

impl Suite {
    pub fn from_path(path: &Path) -> anyhow::Result<Suite> {
        let raw = fs::read_to_string(path).context(format!("Error reading suite {:?}", path))?;
        toml::from_str::<Suite>(&raw)
            .map_err(|e| anyhow::anyhow!("Error parsing suite {:?}: {}", path, e))
    }

    /// Keep only the named scenarios, preserving suite order. An empty
    /// selection keeps everything.
    pub fn select(mut self, names: &[String]) -> Suite {
        if names.is_empty() {
            return self;
        }
        self.scenarios.retain(|s| names.contains(&s.name));
        self
    }
}

/// List every suite defined in the given directory, ordered by name.
pub fn list_suites(dir: &Path) -> anyhow::Result<Vec<Suite>> {
    let entries = fs::read_dir(dir).context(format!("Error reading suites dir {:?}", dir))?;

    let mut suites = vec![];
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        suites.push(Suite::from_path(&path)?);
    }
    suites.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(suites)
}

pub fn find_suite(dir: &Path, name: &str) -> anyhow::Result<Option<Suite>> {
    Ok(list_suites(dir)?.into_iter().find(|s| s.name == name))
}

/// Knobs applied to every iteration of a run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_streaming")]
    pub streaming: bool,
    /// Inter-iteration settle pause; overridable so tests can zero it.
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            iterations: default_iterations(),
            timeout_ms: default_timeout_ms(),
            temperature: default_temperature(),
            streaming: default_streaming(),
            pause_ms: default_pause_ms(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.iterations < 1 || self.iterations > MAX_ITERATIONS {
            return Err(BenchError::BadInput(format!(
                "iterations must be within 1..={}, got {}",
                MAX_ITERATIONS, self.iterations
            )));
        }
        if self.timeout_ms < MIN_TIMEOUT_MS {
            return Err(BenchError::BadInput(format!(
                "timeout_ms must be at least {}, got {}",
                MIN_TIMEOUT_MS, self.timeout_ms
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(BenchError::BadInput(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_iterations() -> u32 {
    5
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_temperature() -> f64 {
    0.7
}

fn default_streaming() -> bool {
    true
}

fn default_pause_ms() -> u64 {
    crate::settings::DEFAULT_PAUSE_MS
}
