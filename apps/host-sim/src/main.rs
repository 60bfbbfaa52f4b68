mod sim;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use log::{info, warn};

use enginehost_core::cmdline;
use enginehost_core::{
    BridgeConfig, ConfigLoader, ConfigOverrides, ConfigPaths, HostBridge, IntentData,
    LifecycleState, SensorKind, SensorSample, StopToken, Variant,
};
use enginehost_modules_logging::{ConsoleLoggerConfig, ConsoleLoggerModule};

use sim::{OverlayModule, SimEngine, SimPlatform, StoreModule};

const CONFIG_FILE: &str = "enginehost.json";

fn main() -> anyhow::Result<()> {
    let root = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()));
    let paths = ConfigPaths::new(CONFIG_FILE, root);
    let (config, report) = ConfigLoader::new(paths)
        .with_env(ConfigOverrides::from_env())
        .load()
        .context("loading bridge config")?;

    let logger = ConsoleLoggerModule::install(ConsoleLoggerConfig::from_env_or(&config.logging.level))?;

    match report.used_file() {
        Some(file) => info!("config: {file:?} ({:?})", report.resolved_from),
        None => info!("config: defaults"),
    }
    for o in &report.overrides {
        info!("config override {}: {} -> {} ({:?})", o.key, o.from, o.to, o.origin);
    }

    // Ctrl-C => destroy, как системный onDestroy.
    let interrupted = StopToken::new();
    {
        let token = interrupted.clone();
        ctrlc::set_handler(move || token.request()).context("installing Ctrl-C handler")?;
    }

    run_session(config, logger, &interrupted)
}

fn run_session(
    config: BridgeConfig,
    logger: ConsoleLoggerModule,
    interrupted: &StopToken,
) -> anyhow::Result<()> {
    let frames = Arc::new(AtomicU64::new(0));
    let mut bridge = HostBridge::new(
        config,
        SimPlatform::default(),
        Box::new(SimEngine::new(frames.clone())),
    );

    bridge.register_extension(Box::new(logger))?;
    bridge.register_extension(Box::new(OverlayModule::new()))?;
    bridge.register_legacy(Box::new(StoreModule::new(25)), &["purchase", "balance"])?;

    bridge.on_resume();
    let artifact = cmdline::encode(&["--path", "res://main.scn", "--use_immersive", "  "]);
    let state = bridge.create(&artifact);
    info!("created: {state:?} args={:?}", bridge.native_args());

    wait_for(&mut bridge, LifecycleState::Running, interrupted)?;

    // Сценарий: ввод, сенсоры, back, вызовы legacy-модуля.
    bridge.on_surface_changed(1280, 720);
    bridge.platform_mut().rotation = 90;
    bridge.on_sensor_changed(SensorSample::new(SensorKind::Accelerometer, [1.0, 0.0, 0.0]));
    bridge.on_sensor_changed(SensorSample::new(SensorKind::Gyroscope, [0.1, 0.2, 0.3]));
    bridge.on_key_multiple("hi");
    bridge.on_layout_changed(1920, 1200);
    bridge.on_back_pressed();
    bridge.on_back_pressed();

    bridge.set_result_callback(Box::new(|req: i32, res: i32, data: Option<&IntentData>| {
        info!("result callback {req}/{res} data={data:?}");
    }));
    bridge.on_activity_result(7, -1, None);
    bridge.on_permissions_result(
        3,
        &["CAMERA".to_owned(), "RECORD_AUDIO".to_owned()],
        &[true, false],
    );

    bridge.run_on_engine_thread(|ctx| {
        let legacy = ctx.hub().legacy();
        match legacy.invoke("store", "purchase", &[Variant::from("sword")]) {
            Ok(v) => info!("purchase -> {v:?}"),
            Err(e) => warn!("purchase failed: {e}"),
        }
        match legacy.invoke("store", "balance", &[]) {
            Ok(v) => info!("balance -> {v:?}"),
            Err(e) => warn!("balance failed: {e}"),
        }
        if let Err(e) = legacy.invoke("store", "debug_reset", &[]) {
            info!("not exported, as expected: {e}");
        }
    })?;

    if pump(&mut bridge, Duration::from_millis(200), interrupted) {
        bridge.on_pause();
        let paused_at = frames.load(Ordering::Relaxed);
        if pump(&mut bridge, Duration::from_millis(150), interrupted) {
            info!(
                "frames while paused: {}",
                frames.load(Ordering::Relaxed).saturating_sub(paused_at)
            );
            bridge.on_resume();
            pump(&mut bridge, Duration::from_millis(150), interrupted);
        }
    }

    if interrupted.is_requested() {
        info!("interrupted; destroying");
    }
    bridge.on_destroy();
    if !bridge.platform().terminated {
        bail!("bridge did not terminate after destroy");
    }

    info!(
        "session done: frames={} views={:?} keep_screen_on={}",
        frames.load(Ordering::Relaxed),
        bridge.platform().views,
        bridge.platform().keep_screen_on
    );
    Ok(())
}

/// Polls until `state` or Ctrl-C. Ctrl-C destroys the bridge.
fn wait_for(
    bridge: &mut HostBridge<SimPlatform>,
    state: LifecycleState,
    interrupted: &StopToken,
) -> anyhow::Result<()> {
    let deadline = Instant::now() + Duration::from_secs(10);
    while bridge.state() != state {
        if interrupted.is_requested() || bridge.state().is_terminal() {
            bridge.on_destroy();
            bail!("session ended before reaching {state:?}");
        }
        if Instant::now() > deadline {
            bridge.on_destroy();
            bail!("timed out waiting for {state:?}");
        }
        bridge.poll();
        thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}

/// Polls for `dur`. Returns `false` when interrupted or the engine went away.
fn pump(bridge: &mut HostBridge<SimPlatform>, dur: Duration, interrupted: &StopToken) -> bool {
    let end = Instant::now() + dur;
    while Instant::now() < end {
        if interrupted.is_requested() || bridge.state().is_terminal() {
            return false;
        }
        bridge.poll();
        thread::sleep(Duration::from_millis(5));
    }
    true
}
