mod file_config;

pub use file_config::{ControlConfig, FileConfig, GlobalConfig, JobFileConfig};

use crate::job::{JobKind, WakeupSchedule};
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/snaprelay/snaprelay.toml";
pub const DEFAULT_CONTROL_SOCKPATH: &str = "/var/run/snaprelay/control.sock";

/// CLI arguments that take part in config resolution.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub sockpath: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub control_sockpath: PathBuf,
    pub jobs: Vec<JobConfig>,
}

/// A validated job definition.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub name: String,
    pub kind: JobKind,
    pub schedule: WakeupSchedule,
    pub connect: toml::Table,
    pub filesystems: toml::Table,
    pub pruning: toml::Table,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and an optional TOML file.
    /// `--sockpath` wins over the file; every job entry is validated.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let control_sockpath = cli
            .sockpath
            .clone()
            .or_else(|| file.sockpath().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTROL_SOCKPATH));
        if control_sockpath.as_os_str().is_empty() {
            bail!("global.control.sockpath must not be empty");
        }

        let mut seen = HashSet::new();
        let mut jobs = Vec::with_capacity(file.jobs.len());
        for (index, entry) in file.jobs.into_iter().enumerate() {
            let job = resolve_job(entry).with_context(|| format!("Invalid job #{}", index + 1))?;
            if !seen.insert(job.name.clone()) {
                bail!("Duplicate job name: {}", job.name);
            }
            jobs.push(job);
        }

        Ok(Self {
            control_sockpath,
            jobs,
        })
    }

    /// Load `path` and resolve it. A missing file is an error.
    pub fn load(path: &Path, cli: &CliConfig) -> Result<Self> {
        let file = FileConfig::load(path)?;
        Self::resolve(cli, Some(file))
    }

    /// Like [`AppConfig::load`], but falls back to defaults when `path` does
    /// not exist. Used by client commands that only need the socket path.
    pub fn load_or_default(path: &Path, cli: &CliConfig) -> Result<Self> {
        if path.exists() {
            Self::load(path, cli)
        } else {
            Self::resolve(cli, None)
        }
    }
}

fn resolve_job(entry: JobFileConfig) -> Result<JobConfig> {
    let name = match entry.name {
        Some(name) if !name.trim().is_empty() => name,
        Some(_) => bail!("job name must not be empty"),
        None => bail!("job name is required"),
    };

    let kind = match entry.kind.as_deref() {
        Some(kind) => parse_job_kind(kind)
            .ok_or_else(|| anyhow::anyhow!("job {}: unknown job type {:?}", name, kind))?,
        None => bail!("job {}: type is required", name),
    };

    let schedule = match entry.interval_secs {
        Some(0) => bail!("job {}: interval_secs must be greater than 0", name),
        Some(secs) => WakeupSchedule::Interval(Duration::from_secs(secs)),
        None => WakeupSchedule::Manual,
    };

    let connect = match entry.connect {
        Some(connect) if !connect.is_empty() => connect,
        _ => bail!("job {}: connect section is required", name),
    };

    let filesystems = entry
        .filesystems
        .ok_or_else(|| anyhow::anyhow!("job {}: filesystems section is required", name))?;

    Ok(JobConfig {
        name,
        kind,
        schedule,
        connect,
        filesystems,
        pruning: entry.pruning.unwrap_or_default(),
    })
}

fn parse_job_kind(s: &str) -> Option<JobKind> {
    match s.to_lowercase().as_str() {
        "push" => Some(JobKind::Push),
        _ => None,
    }
}
