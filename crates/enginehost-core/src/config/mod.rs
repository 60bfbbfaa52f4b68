mod loader;
mod types;

pub use loader::{
    ConfigLoader, ConfigOverrides, ENV_CMDLINE_ARTIFACT, ENV_FIXED_HZ, ENV_IDLE_WAIT_MS,
    ENV_LEGACY_CAPACITY, ENV_LOG, ENV_SHUTDOWN_GRACE_MS,
};
pub use types::{
    BridgeConfig, ConfigOverride, ConfigPaths, EngineConfig, LoadReport, LoggingConfig,
    ModulesConfig, OverrideOrigin, ResolvedFrom, StartupConfig, DEFAULT_COMMAND_LINE_ARTIFACT,
};
