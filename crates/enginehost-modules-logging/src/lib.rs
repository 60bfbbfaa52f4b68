use std::io::Write;

use env_logger::fmt::style::Style;
use env_logger::{Builder, WriteStyle};
use log::{debug, trace, LevelFilter};

use enginehost_core::{EngineError, EngineResult, ExtensionModule, HookSet, IntentData};

pub const ENV_LOG: &str = "ENGINEHOST_LOG";
pub const ENV_LOG_COLORS: &str = "ENGINEHOST_LOG_COLORS";
pub const ENV_LOG_MODULE: &str = "ENGINEHOST_LOG_MODULE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLoggerConfig {
    pub level: LevelFilter,
    pub colors: bool,
    pub include_module: bool,
}

impl ConsoleLoggerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as `from_env`, with `level` as the fallback when `ENGINEHOST_LOG` is unset.
    pub fn from_env_or(level: &str) -> Self {
        let mut cfg = Self::from_env();
        if std::env::var(ENV_LOG).is_err() {
            cfg.level = parse_level(level).unwrap_or(LevelFilter::Info);
        }
        cfg
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let level = get(ENV_LOG)
            .and_then(|v| parse_level(&v))
            .unwrap_or(LevelFilter::Info);
        let colors = get(ENV_LOG_COLORS).map(|v| v != "0").unwrap_or(true);
        let include_module = get(ENV_LOG_MODULE).map(|v| v != "0").unwrap_or(true);

        Self {
            level,
            colors,
            include_module,
        }
    }
}

impl Default for ConsoleLoggerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_level(v: &str) -> Option<LevelFilter> {
    v.trim().parse::<LevelFilter>().ok()
}

/// Installs the console backend and traces every lifecycle hook it receives.
pub struct ConsoleLoggerModule {
    config: ConsoleLoggerConfig,
    frames: u64,
}

impl ConsoleLoggerModule {
    /// Installs the global logger. Fails if another logger is already installed.
    pub fn install(config: ConsoleLoggerConfig) -> EngineResult<Self> {
        let mut builder = Builder::new();
        builder.filter_level(config.level);
        builder.write_style(if config.colors {
            WriteStyle::Auto
        } else {
            WriteStyle::Never
        });

        let fmt_cfg = config.clone();
        builder.format(move |buf, record| {
            let style = if fmt_cfg.colors {
                buf.default_level_style(record.level())
            } else {
                Style::new()
            };

            if fmt_cfg.include_module {
                writeln!(
                    buf,
                    "[{style}{:<5}{style:#}] {:<25} {}",
                    record.level(),
                    record.target(),
                    record.args()
                )
            } else {
                writeln!(buf, "[{style}{:<5}{style:#}] {}", record.level(), record.args())
            }
        });

        builder
            .try_init()
            .map_err(|e| EngineError::Other(format!("logger init failed: {e}")))?;

        Ok(Self { config, frames: 0 })
    }

    #[inline]
    pub fn config(&self) -> &ConsoleLoggerConfig {
        &self.config
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl ExtensionModule for ConsoleLoggerModule {
    fn name(&self) -> &str {
        "console-logger"
    }

    fn capabilities(&self) -> HookSet {
        HookSet::all()
    }

    fn on_setup_completed(&mut self) -> EngineResult<()> {
        debug!("hook: setup completed");
        Ok(())
    }

    fn on_main_loop_started(&mut self) -> EngineResult<()> {
        debug!("hook: main loop started");
        Ok(())
    }

    fn on_register_with_native(&mut self) -> EngineResult<()> {
        trace!("hook: register with native");
        Ok(())
    }

    fn on_activity_result(
        &mut self,
        request_code: i32,
        result_code: i32,
        data: Option<&IntentData>,
    ) -> EngineResult<()> {
        debug!(
            "hook: activity result request={request_code} result={result_code} action={:?}",
            data.and_then(|d| d.action.as_deref())
        );
        Ok(())
    }

    fn on_permission_result(
        &mut self,
        request_code: i32,
        permissions: &[String],
        grants: &[bool],
    ) -> EngineResult<()> {
        debug!("hook: permission result request={request_code} {permissions:?} {grants:?}");
        Ok(())
    }

    fn on_pause(&mut self) -> EngineResult<()> {
        debug!("hook: pause");
        Ok(())
    }

    fn on_resume(&mut self) -> EngineResult<()> {
        debug!("hook: resume");
        Ok(())
    }

    fn on_destroy(&mut self) -> EngineResult<()> {
        debug!("hook: destroy after {} frames", self.frames);
        Ok(())
    }

    fn on_back_pressed(&mut self) -> EngineResult<bool> {
        debug!("hook: back pressed");
        Ok(false)
    }

    fn on_gl_draw_frame(&mut self) -> EngineResult<()> {
        self.frames = self.frames.wrapping_add(1);
        trace!("hook: frame {}", self.frames);
        Ok(())
    }

    fn on_gl_surface_changed(&mut self, width: u32, height: u32) -> EngineResult<()> {
        debug!("hook: surface {width}x{height}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> ConsoleLoggerConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConsoleLoggerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = lookup(&[]);
        assert_eq!(cfg.level, LevelFilter::Info);
        assert!(cfg.colors);
        assert!(cfg.include_module);
    }

    #[test]
    fn env_values_are_read() {
        let cfg = lookup(&[(ENV_LOG, "trace"), (ENV_LOG_COLORS, "0"), (ENV_LOG_MODULE, "0")]);
        assert_eq!(cfg.level, LevelFilter::Trace);
        assert!(!cfg.colors);
        assert!(!cfg.include_module);
    }

    #[test]
    fn bad_level_falls_back_to_info() {
        assert_eq!(lookup(&[(ENV_LOG, "loud")]).level, LevelFilter::Info);
    }
}
