//! Host-side context object.
//!
//! `HostBridge` is created once per host activity and passed explicitly to every host callback.
//! All methods run on the host thread; anything that touches the native engine is enqueued on
//! the dispatcher and runs on the engine thread.

use std::path::Path;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::asset::{ensure_package, AssetFetcher, AssetSpec, FetchStatus, Integrity};
use crate::cmdline::{self, CommandLine, LaunchOptions};
use crate::config::BridgeConfig;
use crate::core_invariants::bad_state;
use crate::dispatch::{self, ActionQueue, Dispatcher};
use crate::engine_thread::{EngineCtx, EngineLaunch, EngineSignal, EngineThread};
use crate::error::{EngineError, EngineResult};
use crate::extension::ExtensionHandle;
use crate::hooks::{collect_views, ExtensionModule, HookEvent, IntentData};
use crate::hub::ModuleHub;
use crate::input::{keyboard_height, EngineInput};
use crate::legacy::{LegacyHandle, LegacyModule};
use crate::lifecycle::{Effect, Lifecycle, LifecycleEvent, LifecycleState, Transition};
use crate::native::NativeEngine;
use crate::platform::HostPlatform;
use crate::sensor::{SensorReading, SensorSample};
use crate::sync::StopToken;

/// One-shot receiver for the next activity result.
pub type ResultCallback = Box<dyn FnOnce(i32, i32, Option<&IntentData>) + Send + 'static>;

pub struct HostBridge<P: HostPlatform> {
    config: BridgeConfig,
    platform: P,
    fetcher: Option<Box<dyn AssetFetcher>>,

    lifecycle: Lifecycle,
    hub: ModuleHub,

    dispatcher: Dispatcher,
    queue: Option<ActionQueue>,
    native: Option<Box<dyn NativeEngine>>,
    engine: Option<EngineThread>,
    stop: StopToken,

    signals_tx: Sender<EngineSignal>,
    signals_rx: Receiver<EngineSignal>,

    command_line: CommandLine,
    asset: Option<AssetSpec>,
    pending_result: Option<ResultCallback>,
    setup_completed: bool,
}

impl<P: HostPlatform> HostBridge<P> {
    pub fn new(config: BridgeConfig, platform: P, native: Box<dyn NativeEngine>) -> Self {
        let (dispatcher, queue) = dispatch::channel();
        let (signals_tx, signals_rx) = unbounded();
        let hub = ModuleHub::new(config.modules.legacy_capacity);

        Self {
            config,
            platform,
            fetcher: None,
            lifecycle: Lifecycle::new(),
            hub,
            dispatcher,
            queue: Some(queue),
            native: Some(native),
            engine: None,
            stop: StopToken::new(),
            signals_tx,
            signals_rx,
            command_line: CommandLine::default(),
            asset: None,
            pending_result: None,
            setup_completed: false,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn AssetFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    #[inline]
    pub fn hub(&self) -> &ModuleHub {
        &self.hub
    }

    #[inline]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[inline]
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[inline]
    pub fn launch_options(&self) -> &LaunchOptions {
        &self.command_line.options
    }

    /// Arguments the engine receives (or received) at setup.
    #[inline]
    pub fn native_args(&self) -> &[String] {
        &self.command_line.native_args
    }

    /* ---------------- registration ---------------- */

    pub fn register_extension(
        &mut self,
        module: Box<dyn ExtensionModule>,
    ) -> EngineResult<ExtensionHandle> {
        self.hub.extensions().register(module).map_err(log_fatal)
    }

    /// Registers a legacy module.
    ///
    /// Once the engine took the export list the module is announced to it on its own. Once
    /// setup completed its `CreateView` contribution is attached right away.
    pub fn register_legacy(
        &mut self,
        module: Box<dyn LegacyModule>,
        expose: &[&str],
    ) -> EngineResult<LegacyHandle> {
        let (handle, late) = self
            .hub
            .legacy()
            .register_with_export(module, expose)
            .map_err(log_fatal)?;

        if let Some(export) = late {
            self.enqueue("register singleton", move |ctx| {
                ctx.native().register_singleton(&export);
            });
        }

        if self.setup_completed {
            let outcome = handle.dispatch(&HookEvent::CreateView, "legacy");
            let views = collect_views(outcome.into_iter().collect());
            if !views.is_empty() {
                self.platform.attach_views(views);
            }
        }
        Ok(handle)
    }

    /* ---------------- startup ---------------- */

    /// Startup from the packaged command-line artifact bytes.
    pub fn create(&mut self, artifact: &[u8]) -> LifecycleState {
        let decoded = cmdline::decode(artifact);
        self.create_with_args(decoded)
    }

    /// Startup reading the artifact configured in `startup.command_line_artifact`.
    pub fn create_from_file(&mut self) -> LifecycleState {
        let decoded = cmdline::decode_file(&self.config.startup.command_line_artifact);
        self.create_with_args(decoded)
    }

    fn create_with_args(&mut self, decoded: Vec<String>) -> LifecycleState {
        if self.state() != LifecycleState::Uninitialized {
            warn!("create called in state {:?}; ignored", self.state());
            return self.state();
        }

        self.command_line = CommandLine::resolve(decoded, self.platform.extra_command_line());
        info!(
            "command line: args={:?} render_mode={}",
            self.command_line.native_args,
            self.command_line.options.render_mode.as_str()
        );

        let event = match self.resolve_asset() {
            Some(spec) => self.check_asset(spec),
            None => LifecycleEvent::AssetReady,
        };
        self.apply(event);
        self.state()
    }

    fn resolve_asset(&mut self) -> Option<AssetSpec> {
        let (md5, key) = self.command_line.options.expansion()?;
        let (md5, key) = (md5.to_owned(), key.to_owned());

        let Some(path) = self.platform.expansion_package_path() else {
            warn!("expansion package requested but the host has no package path; starting without it");
            return None;
        };

        let spec = AssetSpec { path, md5, key };
        self.asset = Some(spec.clone());
        Some(spec)
    }

    fn check_asset(&mut self, spec: AssetSpec) -> LifecycleEvent {
        let integrity = ensure_package(&spec);
        if integrity == Integrity::Valid {
            return LifecycleEvent::AssetReady;
        }
        info!("expansion package {integrity:?}: {:?}", spec.path);

        let status = match self.fetcher.as_mut() {
            Some(fetcher) => fetcher.fetch_if_needed(&spec),
            None => FetchStatus::Failed("no package fetcher installed".to_owned()),
        };

        match status {
            FetchStatus::Present => LifecycleEvent::AssetReady,
            FetchStatus::Fetching => LifecycleEvent::AssetUnavailable,
            FetchStatus::Failed(reason) => {
                warn!("package fetch failed: {reason}");
                self.platform.asset_fetch_failed(&reason);
                LifecycleEvent::AssetUnavailable
            }
        }
    }

    /// The fetch collaborator finished downloading the package.
    pub fn on_asset_fetch_completed(&mut self) -> LifecycleState {
        if self.state() != LifecycleState::AwaitingAsset {
            debug!("asset fetch completed in state {:?}; ignored", self.state());
            return self.state();
        }
        self.apply(LifecycleEvent::AssetReady);
        self.state()
    }

    /// Download failed. The bridge stays in `AwaitingAsset` so the fetcher can retry.
    pub fn on_asset_fetch_failed(&mut self, reason: &str) {
        warn!("package fetch failed: {reason}");
        self.platform.asset_fetch_failed(reason);
    }

    /* ---------------- engine → host ---------------- */

    /// Drains engine notifications. Call regularly from the host thread.
    pub fn poll(&mut self) -> usize {
        let mut n = 0usize;
        while let Ok(signal) = self.signals_rx.try_recv() {
            n += 1;
            self.handle_signal(signal);
            if self.state().is_terminal() {
                break;
            }
        }
        n
    }

    fn handle_signal(&mut self, signal: EngineSignal) {
        debug!("engine signal: {signal:?}");
        match signal {
            EngineSignal::KeepScreenOn(on) => self.platform.set_keep_screen_on(on),
            EngineSignal::SetupCompleted => {
                self.setup_completed = true;
                let views = self.hub.legacy_views();
                if !views.is_empty() {
                    self.platform.attach_views(views);
                }
            }
            EngineSignal::MainLoopStarted => self.apply(LifecycleEvent::EngineStarted),
            EngineSignal::QuitRequested => {
                info!("engine quit; destroying");
                self.on_destroy();
            }
            EngineSignal::Failed(reason) => {
                error!("engine failed: {reason}; destroying");
                self.on_destroy();
            }
        }
    }

    /* ---------------- lifecycle callbacks ---------------- */

    pub fn on_resume(&mut self) {
        self.apply(LifecycleEvent::HostResumed);
    }

    pub fn on_pause(&mut self) {
        self.apply(LifecycleEvent::HostPaused);
    }

    /// Broadcasts destroy, stops the engine and terminates the process.
    pub fn on_destroy(&mut self) {
        self.apply(LifecycleEvent::Destroy);
    }

    fn apply(&mut self, event: LifecycleEvent) {
        let Transition { effects, .. } = self.lifecycle.apply(event);
        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::AwaitAsset => info!("waiting for expansion package"),
            Effect::StartEngine => {
                if let Err(e) = self.start_engine() {
                    error!("engine start failed: {e}");
                    self.apply(LifecycleEvent::Destroy);
                }
            }
            Effect::PauseEngine => self.enqueue("pause", |ctx| ctx.set_stepping_paused(true)),
            Effect::ResumeEngine => self.enqueue("resume", |ctx| ctx.set_stepping_paused(false)),
            Effect::EnableSensors => self.platform.set_sensors_enabled(true),
            Effect::DisableSensors => self.platform.set_sensors_enabled(false),
            Effect::ApplyImmersive => {
                if self.command_line.options.use_immersive {
                    self.platform.set_immersive(true);
                }
            }
            Effect::BroadcastPause => {
                self.hub.broadcast(&HookEvent::Pause);
            }
            Effect::BroadcastResume => {
                self.hub.broadcast(&HookEvent::Resume);
            }
            Effect::BroadcastDestroy => {
                self.hub.broadcast(&HookEvent::Destroy);
            }
            Effect::StopEngine => self.stop_engine(),
            Effect::Terminate => {
                info!("terminating");
                self.platform.terminate();
            }
        }
    }

    fn start_engine(&mut self) -> EngineResult<()> {
        let (Some(native), Some(queue)) = (self.native.take(), self.queue.take()) else {
            bad_state("engine started twice");
        };

        if let Some(spec) = &self.asset {
            self.command_line.push_main_pack(&spec.path);
        }

        let engine = EngineThread::spawn(EngineLaunch {
            native,
            args: self.command_line.native_args.clone(),
            hub: self.hub.clone(),
            dispatcher: self.dispatcher.clone(),
            queue,
            signals: self.signals_tx.clone(),
            settings: self.config.engine_settings(),
            stop: self.stop.clone(),
        })?;
        self.engine = Some(engine);

        let views = self.hub.extension_views();
        if !views.is_empty() {
            self.platform.attach_views(views);
        }
        Ok(())
    }

    fn stop_engine(&mut self) {
        let Some(mut engine) = self.engine.take() else {
            return;
        };

        self.enqueue("destroy", |ctx| {
            ctx.native().on_destroy();
            ctx.request_stop();
        });

        let grace = self.config.shutdown_grace();
        if !engine.wait_stopped(grace) {
            warn!("engine thread still running after {grace:?}; terminating anyway");
            self.stop.request();
        }
    }

    /* ---------------- host → engine ---------------- */

    /// Queues `action` for the engine thread. Actions queued before the engine starts run first.
    pub fn run_on_engine_thread<F>(&self, action: F) -> EngineResult<()>
    where
        F: FnOnce(&mut EngineCtx<'_>) + Send + 'static,
    {
        self.dispatcher.enqueue(action)
    }

    fn enqueue<F>(&self, what: &str, action: F)
    where
        F: FnOnce(&mut EngineCtx<'_>) + Send + 'static,
    {
        if let Err(e) = self.dispatcher.enqueue(action) {
            warn!("dropping {what}: {e}");
        }
    }

    fn send_input(&self, input: EngineInput) {
        if self.state().is_terminal() {
            debug!("input after destroy ignored: {input:?}");
            return;
        }
        self.enqueue("input", move |ctx| input.apply(ctx.native()));
    }

    /// Keeps a single callback for the next activity result. A newer one replaces the older.
    pub fn set_result_callback(&mut self, callback: ResultCallback) {
        if self.pending_result.replace(callback).is_some() {
            warn!("replacing a pending activity result callback");
        }
    }

    /// Consumes the pending callback first, then broadcasts to modules.
    pub fn on_activity_result(
        &mut self,
        request_code: i32,
        result_code: i32,
        data: Option<&IntentData>,
    ) {
        if let Some(callback) = self.pending_result.take() {
            callback(request_code, result_code, data);
        }

        self.hub.broadcast(&HookEvent::ActivityResult {
            request_code,
            result_code,
            data,
        });
    }

    pub fn on_permissions_result(
        &mut self,
        request_code: i32,
        permissions: &[String],
        grants: &[bool],
    ) {
        self.hub.broadcast(&HookEvent::PermissionResult {
            request_code,
            permissions,
            grants,
        });
        self.send_input(EngineInput::permissions(permissions, grants));
    }

    /// Modules get the first chance; the engine sees `back` only if none consumed it.
    pub fn on_back_pressed(&mut self) {
        if self.hub.back_pressed() {
            debug!("back consumed by a module");
            return;
        }
        if self.lifecycle.state().engine_exists() {
            self.send_input(EngineInput::Back);
        }
    }

    /// Samples are only forwarded while running (sensor subscriptions are off otherwise).
    pub fn on_sensor_changed(&mut self, sample: SensorSample) {
        if self.state() != LifecycleState::Running {
            return;
        }
        let reading = SensorReading::from_sample(sample, self.platform.display_rotation());
        self.send_input(EngineInput::Sensor(reading));
    }

    pub fn on_key(&mut self, scancode: i32, unicode: u32, pressed: bool) {
        self.send_input(EngineInput::Key {
            scancode,
            unicode,
            pressed,
        });
    }

    /// Returns `false` when the text has no character to deliver.
    pub fn on_key_multiple(&mut self, text: &str) -> bool {
        match EngineInput::characters(text) {
            Some(input) => {
                self.send_input(input);
                true
            }
            None => false,
        }
    }

    pub fn on_layout_changed(&mut self, full_height: i32, visible_bottom: i32) {
        self.send_input(EngineInput::KeyboardHeight(keyboard_height(
            full_height,
            visible_bottom,
        )));
    }

    /// Resizes the engine and fires the surface hook on the engine thread.
    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        if self.state().is_terminal() {
            return;
        }
        self.enqueue("surface change", move |ctx| {
            EngineInput::Resize { width, height }.apply(ctx.native());
            ctx.hub()
                .broadcast(&HookEvent::GlSurfaceChanged { width, height });
        });
    }

    /// Overrides the packaged artifact path after construction.
    pub fn set_command_line_artifact(&mut self, path: &Path) {
        self.config.startup.command_line_artifact = path.to_path_buf();
    }
}

impl<P: HostPlatform> Drop for HostBridge<P> {
    fn drop(&mut self) {
        self.stop.request();
    }
}

fn log_fatal(e: EngineError) -> EngineError {
    if e.is_fatal() {
        error!("fatal registration error: {e}");
    } else {
        warn!("registration rejected: {e}");
    }
    e
}
