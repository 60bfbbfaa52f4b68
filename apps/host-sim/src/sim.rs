use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info};

use enginehost_core::legacy::SingletonExport;
use enginehost_core::native::KEEP_SCREEN_ON_SETTING;
use enginehost_core::{
    ContributedView, DisplayRotation, EngineError, EngineResult, ExtensionModule, Hook, HookSet,
    HostPlatform, HostView, LegacyModule, MethodDecl, NativeEngine, StepStatus, ValueType,
    Variant,
};

/// Host side without a UI: records what the bridge asks for.
#[derive(Default)]
pub struct SimPlatform {
    pub rotation: u32,
    pub views: Vec<String>,
    pub sensors_enabled: bool,
    pub keep_screen_on: bool,
    pub terminated: bool,
}

impl HostPlatform for SimPlatform {
    fn extra_command_line(&self) -> Vec<String> {
        vec!["--verbose".to_owned()]
    }

    fn display_rotation(&self) -> DisplayRotation {
        DisplayRotation::from_degrees(self.rotation).unwrap_or_default()
    }

    fn expansion_package_path(&self) -> Option<PathBuf> {
        None
    }

    fn attach_views(&mut self, views: Vec<ContributedView>) {
        for v in views {
            info!("attach view from '{}'", v.module);
            self.views.push(v.module);
        }
    }

    fn set_sensors_enabled(&mut self, enabled: bool) {
        info!("sensors {}", if enabled { "on" } else { "off" });
        self.sensors_enabled = enabled;
    }

    fn set_immersive(&mut self, enabled: bool) {
        info!("immersive={enabled}");
    }

    fn set_keep_screen_on(&mut self, enabled: bool) {
        self.keep_screen_on = enabled;
    }

    fn asset_fetch_failed(&mut self, reason: &str) {
        info!("download failed: {reason}");
    }

    // Процесс не убиваем: main сам завершится после destroy.
    fn terminate(&mut self) {
        self.terminated = true;
    }
}

/// Native engine stand-in: counts frames and logs every call it gets.
pub struct SimEngine {
    frames: Arc<AtomicU64>,
    settings: BTreeMap<String, String>,
}

impl SimEngine {
    pub fn new(frames: Arc<AtomicU64>) -> Self {
        let mut settings = BTreeMap::new();
        settings.insert(KEEP_SCREEN_ON_SETTING.to_owned(), "True".to_owned());
        Self { frames, settings }
    }
}

impl NativeEngine for SimEngine {
    fn setup(&mut self, args: &[String]) -> EngineResult<()> {
        info!("native setup {args:?}");
        Ok(())
    }

    fn step(&mut self) -> EngineResult<StepStatus> {
        self.frames.fetch_add(1, Ordering::Relaxed);
        Ok(StepStatus::Continue)
    }

    fn key(&mut self, scancode: i32, unicode: u32, pressed: bool) {
        debug!("native key scancode={scancode} unicode={unicode} pressed={pressed}");
    }

    fn accelerometer(&mut self, x: f32, y: f32, z: f32) {
        info!("native accelerometer ({x}, {y}, {z})");
    }

    fn gyroscope(&mut self, x: f32, y: f32, z: f32) {
        info!("native gyroscope ({x}, {y}, {z})");
    }

    fn back(&mut self) {
        info!("native back");
    }

    fn request_permission_result(&mut self, permission: &str, granted: bool) {
        info!("native permission {permission} granted={granted}");
    }

    fn set_virtual_keyboard_height(&mut self, height: i32) {
        info!("native keyboard height {height}");
    }

    fn resize(&mut self, width: u32, height: u32) {
        info!("native resize {width}x{height}");
    }

    fn register_singleton(&mut self, export: &SingletonExport) {
        for m in export.methods.methods() {
            info!("native singleton {}: {}", export.name, m.signature());
        }
    }

    fn global(&self, key: &str) -> Option<String> {
        self.settings.get(key).cloned()
    }

    fn on_destroy(&mut self) {
        info!(
            "native destroy after {} frames",
            self.frames.load(Ordering::Relaxed)
        );
    }
}

/// Extension contributing an overlay view and swallowing the first back press.
pub struct OverlayModule {
    back_consumed: bool,
}

impl OverlayModule {
    pub fn new() -> Self {
        Self {
            back_consumed: false,
        }
    }
}

impl ExtensionModule for OverlayModule {
    fn name(&self) -> &str {
        "overlay"
    }

    fn capabilities(&self) -> HookSet {
        HookSet::of(&[Hook::CreateView, Hook::BackPressed, Hook::MainLoopStarted])
    }

    fn on_create_view(&mut self) -> EngineResult<Option<HostView>> {
        Ok(Some(HostView::new("overlay-layer")))
    }

    fn on_main_loop_started(&mut self) -> EngineResult<()> {
        info!("overlay: engine is live");
        Ok(())
    }

    fn on_back_pressed(&mut self) -> EngineResult<bool> {
        if self.back_consumed {
            return Ok(false);
        }
        self.back_consumed = true;
        info!("overlay: closing overlay instead of leaving");
        Ok(true)
    }
}

const STORE_METHODS: &[MethodDecl] = &[
    MethodDecl::new("purchase", ValueType::Bool, &[ValueType::String]),
    MethodDecl::new("balance", ValueType::Int, &[]),
    MethodDecl::new("debug_reset", ValueType::Void, &[]),
];

/// Legacy in-app store with two exported methods.
pub struct StoreModule {
    balance: i64,
}

impl StoreModule {
    pub fn new(balance: i64) -> Self {
        Self { balance }
    }
}

impl ExtensionModule for StoreModule {
    fn name(&self) -> &str {
        "store"
    }

    fn capabilities(&self) -> HookSet {
        HookSet::of(&[Hook::Pause, Hook::Resume, Hook::ActivityResult])
    }

    fn on_pause(&mut self) -> EngineResult<()> {
        info!("store: pause, balance={}", self.balance);
        Ok(())
    }

    fn on_resume(&mut self) -> EngineResult<()> {
        info!("store: resume");
        Ok(())
    }

    fn on_activity_result(
        &mut self,
        request_code: i32,
        result_code: i32,
        _data: Option<&enginehost_core::IntentData>,
    ) -> EngineResult<()> {
        info!("store: activity result {request_code}/{result_code}");
        Ok(())
    }
}

impl LegacyModule for StoreModule {
    fn methods(&self) -> &[MethodDecl] {
        STORE_METHODS
    }

    fn call(&mut self, method: &str, args: &[Variant]) -> EngineResult<Variant> {
        match method {
            "purchase" => {
                let sku = args.first().and_then(Variant::as_str).unwrap_or_default();
                let ok = self.balance >= 10;
                if ok {
                    self.balance -= 10;
                }
                info!("store: purchase '{sku}' -> {ok}");
                Ok(Variant::Bool(ok))
            }
            "balance" => Ok(Variant::Int(self.balance)),
            other => Err(EngineError::other(format!("store: no method {other}"))),
        }
    }
}
