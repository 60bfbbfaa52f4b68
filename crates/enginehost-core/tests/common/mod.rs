#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use enginehost_core::legacy::SingletonExport;
use enginehost_core::{
    BridgeConfig, ContributedView, DisplayRotation, EngineResult, ExtensionModule, Hook, HookSet,
    HostBridge, HostPlatform, HostView, LegacyModule, LifecycleState, MethodDecl, NativeEngine,
    StepStatus, ValueType, Variant,
};

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log, prefix: &str) -> Vec<String> {
    log.lock()
        .iter()
        .filter(|e| e.starts_with(prefix))
        .cloned()
        .collect()
}

/// Records every host-side call. Never exits the process.
#[derive(Default)]
pub struct RecordingPlatform {
    pub log: Log,
    pub rotation: DisplayRotation,
    pub package: Option<PathBuf>,
}

impl HostPlatform for RecordingPlatform {
    fn display_rotation(&self) -> DisplayRotation {
        self.rotation
    }

    fn expansion_package_path(&self) -> Option<PathBuf> {
        self.package.clone()
    }

    fn attach_views(&mut self, views: Vec<ContributedView>) {
        for v in views {
            self.log.lock().push(format!("view {}", v.module));
        }
    }

    fn set_sensors_enabled(&mut self, enabled: bool) {
        self.log.lock().push(format!("sensors {enabled}"));
    }

    fn set_immersive(&mut self, enabled: bool) {
        self.log.lock().push(format!("immersive {enabled}"));
    }

    fn set_keep_screen_on(&mut self, enabled: bool) {
        self.log.lock().push(format!("keep_screen_on {enabled}"));
    }

    fn asset_fetch_failed(&mut self, reason: &str) {
        self.log.lock().push(format!("fetch failed {reason}"));
    }

    fn terminate(&mut self) {
        self.log.lock().push("terminate".to_owned());
    }
}

/// Native engine that records calls as `native ...` lines.
pub struct RecordingNative {
    pub log: Log,
}

impl RecordingNative {
    fn push(&self, line: String) {
        self.log.lock().push(format!("native {line}"));
    }
}

impl NativeEngine for RecordingNative {
    fn setup(&mut self, args: &[String]) -> EngineResult<()> {
        self.push(format!("setup {}", args.join(" ")));
        Ok(())
    }

    fn step(&mut self) -> EngineResult<StepStatus> {
        Ok(StepStatus::Continue)
    }

    fn key(&mut self, scancode: i32, unicode: u32, pressed: bool) {
        self.push(format!("key {scancode} {unicode} {pressed}"));
    }

    fn accelerometer(&mut self, x: f32, y: f32, z: f32) {
        self.push(format!("accelerometer {x} {y} {z}"));
    }

    fn gyroscope(&mut self, x: f32, y: f32, z: f32) {
        self.push(format!("gyroscope {x} {y} {z}"));
    }

    fn back(&mut self) {
        self.push("back".to_owned());
    }

    fn request_permission_result(&mut self, permission: &str, granted: bool) {
        self.push(format!("permission {permission} {granted}"));
    }

    fn set_virtual_keyboard_height(&mut self, height: i32) {
        self.push(format!("keyboard {height}"));
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.push(format!("resize {width}x{height}"));
    }

    fn register_singleton(&mut self, export: &SingletonExport) {
        self.push(format!("singleton {} {}", export.name, export.methods.len()));
    }

    fn on_destroy(&mut self) {
        self.push("destroy".to_owned());
    }
}

/// Extension that records the hooks it receives as `<name> <hook>`.
pub struct Tracer {
    pub name: &'static str,
    pub caps: HookSet,
    pub log: Log,
    pub consume_back: bool,
}

impl Tracer {
    pub fn new(name: &'static str, caps: HookSet, log: &Log) -> Self {
        Self {
            name,
            caps,
            log: log.clone(),
            consume_back: false,
        }
    }

    fn push(&self, what: &str) {
        self.log.lock().push(format!("{} {what}", self.name));
    }
}

impl ExtensionModule for Tracer {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> HookSet {
        self.caps
    }

    fn on_pause(&mut self) -> EngineResult<()> {
        self.push("pause");
        Ok(())
    }

    fn on_resume(&mut self) -> EngineResult<()> {
        self.push("resume");
        Ok(())
    }

    fn on_destroy(&mut self) -> EngineResult<()> {
        self.push("destroy");
        Ok(())
    }

    fn on_back_pressed(&mut self) -> EngineResult<bool> {
        self.push("back");
        Ok(self.consume_back)
    }

    fn on_permission_result(
        &mut self,
        request_code: i32,
        permissions: &[String],
        grants: &[bool],
    ) -> EngineResult<()> {
        self.push(&format!("permissions {request_code} {} {}", permissions.len(), grants.len()));
        Ok(())
    }

    fn on_gl_surface_changed(&mut self, width: u32, height: u32) -> EngineResult<()> {
        self.push(&format!("surface {width}x{height}"));
        Ok(())
    }
}

/// Legacy module with one exported method and a view of its own.
pub struct Shop(pub &'static str);

const SHOP_METHODS: &[MethodDecl] = &[MethodDecl::new("price", ValueType::Int, &[])];

impl ExtensionModule for Shop {
    fn name(&self) -> &str {
        self.0
    }

    fn capabilities(&self) -> HookSet {
        HookSet::of(&[Hook::CreateView])
    }

    fn on_create_view(&mut self) -> EngineResult<Option<HostView>> {
        Ok(Some(HostView::new(self.0)))
    }
}

impl LegacyModule for Shop {
    fn methods(&self) -> &[MethodDecl] {
        SHOP_METHODS
    }

    fn call(&mut self, _method: &str, _args: &[Variant]) -> EngineResult<Variant> {
        Ok(Variant::Int(3))
    }
}

pub fn fast_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.engine.fixed_hz = 500;
    config.engine.idle_wait_ms = 5;
    config
}

pub fn bridge(platform: RecordingPlatform, log: &Log) -> HostBridge<RecordingPlatform> {
    HostBridge::new(
        fast_config(),
        platform,
        Box::new(RecordingNative { log: log.clone() }),
    )
}

pub fn poll_until(b: &mut HostBridge<RecordingPlatform>, state: LifecycleState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while b.state() != state {
        assert!(Instant::now() < deadline, "timed out waiting for {state:?}");
        b.poll();
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Waits until `cond` holds on the log (engine-thread effects are asynchronous).
pub fn wait_for_log(log: &Log, cond: impl Fn(&[String]) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if cond(&log.lock()) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out; log={:?}", log.lock());
        std::thread::sleep(Duration::from_millis(1));
    }
}
