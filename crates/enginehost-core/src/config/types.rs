use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine_thread::EngineSettings;
use crate::legacy::DEFAULT_LEGACY_CAPACITY;

pub const DEFAULT_COMMAND_LINE_ARTIFACT: &str = "_cl_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fixed_hz: u32,
    pub idle_wait_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fixed_hz: 60,
            idle_wait_ms: 50,
            shutdown_grace_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    pub legacy_capacity: usize,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            legacy_capacity: DEFAULT_LEGACY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    pub command_line_artifact: PathBuf,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            command_line_artifact: PathBuf::from(DEFAULT_COMMAND_LINE_ARTIFACT),
        }
    }
}

/// Resolved bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub modules: ModulesConfig,
    pub startup: StartupConfig,
}

impl BridgeConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            fixed_hz: self.engine.fixed_hz.max(1),
            idle_wait: Duration::from_millis(self.engine.idle_wait_ms.max(1)),
        }
    }

    #[inline]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.engine.shutdown_grace_ms)
    }
}

/// Where to look for the optional config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub file: Option<PathBuf>,
    pub root_dir: Option<PathBuf>,
}

impl ConfigPaths {
    #[inline]
    pub fn new<P: Into<PathBuf>>(file: P, root_dir: Option<PathBuf>) -> Self {
        Self {
            file: Some(file.into()),
            root_dir,
        }
    }

    #[inline]
    pub fn none() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root_dir.into());
        self
    }

    #[inline]
    pub fn file_path(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOrigin {
    File,
    Env,
    Programmatic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigOverride {
    pub key: &'static str,
    pub origin: OverrideOrigin,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolvedFrom {
    Absolute,
    Cwd,
    RootDir,
    #[default]
    NotProvided,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// The file actually read, if any.
    pub file: Option<PathBuf>,
    pub resolved_from: ResolvedFrom,
    pub overrides: Vec<ConfigOverride>,
}

impl LoadReport {
    #[inline]
    pub fn has_overrides(&self) -> bool {
        !self.overrides.is_empty()
    }

    #[inline]
    pub fn is_defaults(&self) -> bool {
        self.overrides.is_empty()
    }

    #[inline]
    pub fn used_file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn overridden(&self, key: &str) -> Option<&ConfigOverride> {
        self.overrides.iter().rev().find(|o| o.key == key)
    }
}
