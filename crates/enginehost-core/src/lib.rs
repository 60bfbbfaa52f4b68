pub mod asset;
pub mod bridge;
pub mod cmdline;
pub mod config;
pub mod core_invariants;
pub mod dispatch;
pub mod engine_thread;
pub mod error;
pub mod extension;
pub mod hooks;
pub mod hub;
pub mod input;
pub mod legacy;
pub mod lifecycle;
pub mod native;
pub mod platform;
pub mod sensor;

pub mod sync;

pub use asset::{AssetFetcher, AssetSpec, FetchStatus, Integrity};
pub use bridge::{HostBridge, ResultCallback};
pub use cmdline::{CommandLine, LaunchOptions, RenderMode};
pub use config::{BridgeConfig, ConfigLoader, ConfigOverrides, ConfigPaths};
pub use dispatch::{Action, Dispatcher};
pub use engine_thread::{EngineCtx, EngineSettings, EngineSignal};
pub use error::{EngineError, EngineResult};
pub use extension::{ExtensionHandle, ExtensionRegistry};
pub use hooks::{
    ContributedView, ExtensionModule, Hook, HookEvent, HookOutcome, HookReply, HookSet, HostView,
    IntentData,
};
pub use hub::ModuleHub;
pub use legacy::{LegacyModule, LegacyModuleTable, MethodDecl, ValueType, Variant};
pub use lifecycle::{LifecycleEvent, LifecycleState};
pub use native::{NativeEngine, StepStatus};
pub use platform::HostPlatform;
pub use sensor::{DisplayRotation, SensorKind, SensorSample};
pub use sync::StopToken;
