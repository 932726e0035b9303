use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub global: Option<GlobalConfig>,
    pub jobs: Vec<JobFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct GlobalConfig {
    pub control: Option<ControlConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ControlConfig {
    /// Unix socket the daemon serves the control API on
    pub sockpath: Option<String>,
}

/// One `[[jobs]]` entry. The `connect`, `filesystems` and `pruning` sections are
/// interpreted by the job builder, not here.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobFileConfig {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub interval_secs: Option<u64>,
    pub connect: Option<toml::Table>,
    pub filesystems: Option<toml::Table>,
    pub pruning: Option<toml::Table>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn sockpath(&self) -> Option<&str> {
        self.global
            .as_ref()
            .and_then(|g| g.control.as_ref())
            .and_then(|c| c.sockpath.as_deref())
    }
}
