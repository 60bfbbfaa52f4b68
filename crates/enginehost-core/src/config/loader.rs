use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;

use super::types::{
    BridgeConfig, ConfigOverride, ConfigPaths, LoadReport, OverrideOrigin, ResolvedFrom,
};
use crate::error::{EngineError, EngineResult};

pub const ENV_LOG: &str = "ENGINEHOST_LOG";
pub const ENV_FIXED_HZ: &str = "ENGINEHOST_FIXED_HZ";
pub const ENV_IDLE_WAIT_MS: &str = "ENGINEHOST_IDLE_WAIT_MS";
pub const ENV_SHUTDOWN_GRACE_MS: &str = "ENGINEHOST_SHUTDOWN_GRACE_MS";
pub const ENV_LEGACY_CAPACITY: &str = "ENGINEHOST_LEGACY_CAPACITY";
pub const ENV_CMDLINE_ARTIFACT: &str = "ENGINEHOST_CMDLINE_ARTIFACT";

/// One layer of optional values. Used for the file, the environment and the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub fixed_hz: Option<u32>,
    pub idle_wait_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
    pub legacy_capacity: Option<usize>,
    pub command_line_artifact: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Unparseable values are logged and skipped.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut o = Self::default();
        for (k, v) in vars {
            let (k, v) = (k.as_ref(), v.as_ref().trim());
            match k {
                ENV_LOG => o.log_level = Some(v.to_owned()),
                ENV_FIXED_HZ => o.fixed_hz = parse_env(k, v),
                ENV_IDLE_WAIT_MS => o.idle_wait_ms = parse_env(k, v),
                ENV_SHUTDOWN_GRACE_MS => o.shutdown_grace_ms = parse_env(k, v),
                ENV_LEGACY_CAPACITY => o.legacy_capacity = parse_env(k, v),
                ENV_CMDLINE_ARTIFACT if !v.is_empty() => {
                    o.command_line_artifact = Some(PathBuf::from(v))
                }
                _ => {}
            }
        }
        o
    }

    fn apply(self, cfg: &mut BridgeConfig, report: &mut LoadReport, origin: OverrideOrigin) {
        let mut set = |key: &'static str, from: String, to: String| {
            report.overrides.push(ConfigOverride {
                key,
                origin,
                from,
                to,
            })
        };

        if let Some(v) = self.log_level {
            set("logging.level", cfg.logging.level.clone(), v.clone());
            cfg.logging.level = v;
        }
        if let Some(v) = self.fixed_hz {
            set("engine.fixed_hz", cfg.engine.fixed_hz.to_string(), v.to_string());
            cfg.engine.fixed_hz = v;
        }
        if let Some(v) = self.idle_wait_ms {
            set("engine.idle_wait_ms", cfg.engine.idle_wait_ms.to_string(), v.to_string());
            cfg.engine.idle_wait_ms = v;
        }
        if let Some(v) = self.shutdown_grace_ms {
            set(
                "engine.shutdown_grace_ms",
                cfg.engine.shutdown_grace_ms.to_string(),
                v.to_string(),
            );
            cfg.engine.shutdown_grace_ms = v;
        }
        if let Some(v) = self.legacy_capacity {
            set(
                "modules.legacy_capacity",
                cfg.modules.legacy_capacity.to_string(),
                v.to_string(),
            );
            cfg.modules.legacy_capacity = v;
        }
        if let Some(v) = self.command_line_artifact {
            set(
                "startup.command_line_artifact",
                cfg.startup.command_line_artifact.display().to_string(),
                v.display().to_string(),
            );
            cfg.startup.command_line_artifact = v;
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {key}={value:?}: not a valid number");
            None
        }
    }
}

/// Layers: defaults, optional JSON file, environment, caller overrides.
pub struct ConfigLoader {
    paths: ConfigPaths,
    env: ConfigOverrides,
    overrides: ConfigOverrides,
}

impl ConfigLoader {
    pub fn new(paths: ConfigPaths) -> Self {
        Self {
            paths,
            env: ConfigOverrides::default(),
            overrides: ConfigOverrides::default(),
        }
    }

    pub fn with_env(mut self, env: ConfigOverrides) -> Self {
        self.env = env;
        self
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// A missing file is not an error. A present but unreadable or invalid one is.
    pub fn load(self) -> EngineResult<(BridgeConfig, LoadReport)> {
        let mut cfg = BridgeConfig::default();
        let mut report = LoadReport::default();

        if let Some(raw) = self.paths.file_path() {
            if let Some((path, from)) = resolve_optional(&self.paths, raw) {
                let data = fs::read_to_string(&path).map_err(|e| EngineError::Config {
                    path: path.clone(),
                    reason: format!("read failed: {e}"),
                })?;
                let parsed: RootJson =
                    serde_json::from_str(&data).map_err(|e| EngineError::Config {
                        path: path.clone(),
                        reason: format!("parse failed (json): {e}"),
                    })?;

                parsed
                    .into_overrides()
                    .apply(&mut cfg, &mut report, OverrideOrigin::File);
                report.file = Some(path);
                report.resolved_from = from;
            }
        }

        self.env.apply(&mut cfg, &mut report, OverrideOrigin::Env);
        self.overrides
            .apply(&mut cfg, &mut report, OverrideOrigin::Programmatic);

        validate(&cfg, &report)?;
        Ok((cfg, report))
    }
}

fn validate(cfg: &BridgeConfig, report: &LoadReport) -> EngineResult<()> {
    if cfg.engine.fixed_hz == 0 || cfg.engine.fixed_hz > 1000 {
        return Err(EngineError::Config {
            path: report.file.clone().unwrap_or_default(),
            reason: format!("engine.fixed_hz must be in 1..=1000, got {}", cfg.engine.fixed_hz),
        });
    }
    Ok(())
}

fn resolve_optional(paths: &ConfigPaths, raw: &Path) -> Option<(PathBuf, ResolvedFrom)> {
    if raw.is_absolute() {
        return raw
            .is_file()
            .then(|| (raw.to_path_buf(), ResolvedFrom::Absolute));
    }

    if let Ok(cwd) = std::env::current_dir() {
        let p = cwd.join(raw);
        if p.is_file() {
            return Some((p, ResolvedFrom::Cwd));
        }
    }

    if let Some(root) = paths.root_dir.as_deref() {
        let p = root.join(raw);
        if p.is_file() {
            return Some((p, ResolvedFrom::RootDir));
        }
    }

    None
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RootJson {
    logging: Option<LoggingJson>,
    engine: Option<EngineJson>,
    modules: Option<ModulesJson>,
    startup: Option<StartupJson>,
}

#[derive(Deserialize)]
struct LoggingJson {
    level: Option<String>,
}

#[derive(Deserialize)]
struct EngineJson {
    fixed_hz: Option<u32>,
    idle_wait_ms: Option<u64>,
    shutdown_grace_ms: Option<u64>,
}

#[derive(Deserialize)]
struct ModulesJson {
    legacy_capacity: Option<usize>,
}

#[derive(Deserialize)]
struct StartupJson {
    command_line_artifact: Option<PathBuf>,
}

impl RootJson {
    fn into_overrides(self) -> ConfigOverrides {
        let engine = self.engine;
        ConfigOverrides {
            log_level: self.logging.and_then(|l| l.level),
            fixed_hz: engine.as_ref().and_then(|e| e.fixed_hz),
            idle_wait_ms: engine.as_ref().and_then(|e| e.idle_wait_ms),
            shutdown_grace_ms: engine.as_ref().and_then(|e| e.shutdown_grace_ms),
            legacy_capacity: self.modules.and_then(|m| m.legacy_capacity),
            command_line_artifact: self.startup.and_then(|s| s.command_line_artifact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let (cfg, report) = ConfigLoader::new(ConfigPaths::none()).load().unwrap();
        assert_eq!(cfg, BridgeConfig::default());
        assert!(report.is_defaults());
        assert_eq!(cfg.modules.legacy_capacity, 64);
        assert_eq!(cfg.startup.command_line_artifact, PathBuf::from("_cl_"));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::new(dir.path().join("nope.json"), None);
        let (cfg, report) = ConfigLoader::new(paths).load().unwrap();
        assert_eq!(cfg, BridgeConfig::default());
        assert!(report.used_file().is_none());
    }

    #[test]
    fn layers_apply_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("bridge.json"),
            r#"{ "engine": { "fixed_hz": 30, "idle_wait_ms": 10 }, "logging": { "level": "debug" } }"#,
        )
        .unwrap();

        let env = ConfigOverrides::from_vars([(ENV_FIXED_HZ, "90"), (ENV_LEGACY_CAPACITY, "8")]);
        let prog = ConfigOverrides {
            legacy_capacity: Some(4),
            ..Default::default()
        };

        let paths = ConfigPaths::new("bridge.json", None).with_root_dir(dir.path());
        let (cfg, report) = ConfigLoader::new(paths)
            .with_env(env)
            .with_overrides(prog)
            .load()
            .unwrap();

        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.engine.fixed_hz, 90);
        assert_eq!(cfg.engine.idle_wait_ms, 10);
        assert_eq!(cfg.modules.legacy_capacity, 4);
        assert_eq!(report.resolved_from, ResolvedFrom::RootDir);

        let hz = report.overridden("engine.fixed_hz").unwrap();
        assert_eq!(hz.origin, OverrideOrigin::Env);
        assert_eq!((hz.from.as_str(), hz.to.as_str()), ("30", "90"));
        assert_eq!(
            report.overridden("modules.legacy_capacity").map(|o| o.origin),
            Some(OverrideOrigin::Programmatic)
        );
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ engine: ").unwrap();
        let err = ConfigLoader::new(ConfigPaths::new(&path, None))
            .load()
            .unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }

    #[test]
    fn bad_env_values_are_skipped() {
        let o = ConfigOverrides::from_vars([(ENV_FIXED_HZ, "fast"), (ENV_LOG, "warn")]);
        assert_eq!(o.fixed_hz, None);
        assert_eq!(o.log_level.as_deref(), Some("warn"));
    }

    #[test]
    fn zero_rate_is_rejected() {
        let prog = ConfigOverrides {
            fixed_hz: Some(0),
            ..Default::default()
        };
        assert!(ConfigLoader::new(ConfigPaths::none())
            .with_overrides(prog)
            .load()
            .is_err());
    }
}
