use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::dispatch::{ActionQueue, Dispatcher};
use crate::error::{EngineError, EngineResult};
use crate::hooks::{panic_message, HookEvent};
use crate::hub::ModuleHub;
use crate::native::{keep_screen_on, NativeEngine, StepStatus};
use crate::sync::StopToken;

/// Engine → host notifications, drained by the bridge on the host thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSignal {
    SetupCompleted,
    MainLoopStarted,
    KeepScreenOn(bool),
    QuitRequested,
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub fixed_hz: u32,
    /// How long a paused loop waits for actions before checking the stop token again.
    pub idle_wait: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fixed_hz: 60,
            idle_wait: Duration::from_millis(50),
        }
    }
}

impl EngineSettings {
    #[inline]
    fn frame_budget(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fixed_hz.max(1) as f64)
    }
}

#[derive(Debug, Default)]
pub(crate) struct LoopState {
    stepping_paused: bool,
    stop: bool,
}

/// Context handed to dispatched actions.
///
/// Only exists on the engine thread, so everything reachable from it is engine-owned.
pub struct EngineCtx<'a> {
    native: &'a mut dyn NativeEngine,
    hub: &'a ModuleHub,
    dispatcher: &'a Dispatcher,
    state: &'a mut LoopState,
}

impl<'a> EngineCtx<'a> {
    #[inline]
    pub(crate) fn new(
        native: &'a mut dyn NativeEngine,
        hub: &'a ModuleHub,
        dispatcher: &'a Dispatcher,
        state: &'a mut LoopState,
    ) -> Self {
        Self {
            native,
            hub,
            dispatcher,
            state,
        }
    }

    #[inline]
    pub fn native(&mut self) -> &mut dyn NativeEngine {
        &mut *self.native
    }

    #[inline]
    pub fn hub(&self) -> &ModuleHub {
        self.hub
    }

    #[inline]
    pub fn dispatcher(&self) -> &Dispatcher {
        self.dispatcher
    }

    /// Paused: the loop keeps draining actions but stops calling `step`.
    #[inline]
    pub fn set_stepping_paused(&mut self, paused: bool) {
        self.state.stepping_paused = paused;
    }

    #[inline]
    pub fn is_stepping_paused(&self) -> bool {
        self.state.stepping_paused
    }

    /// Ends the loop after the current drain.
    #[inline]
    pub fn request_stop(&mut self) {
        self.state.stop = true;
    }
}

/// Everything the engine thread takes ownership of.
pub struct EngineLaunch {
    pub native: Box<dyn NativeEngine>,
    pub args: Vec<String>,
    pub hub: ModuleHub,
    pub dispatcher: Dispatcher,
    pub queue: ActionQueue,
    pub signals: Sender<EngineSignal>,
    pub settings: EngineSettings,
    pub stop: StopToken,
}

/// Handle to the running engine thread.
pub struct EngineThread {
    join: Option<JoinHandle<()>>,
    // Disconnects when the thread exits.
    done: Receiver<()>,
    stop: StopToken,
}

impl EngineThread {
    pub fn spawn(launch: EngineLaunch) -> EngineResult<Self> {
        let (done_tx, done_rx) = bounded::<()>(1);
        let stop = launch.stop.clone();

        let join = thread::Builder::new()
            .name("engine".to_owned())
            .spawn(move || {
                let _done = done_tx;
                let signals = launch.signals.clone();
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| run(launch))) {
                    let message = panic_message(payload.as_ref());
                    error!("engine thread panicked: {message}");
                    let _ = signals
                        .send(EngineSignal::Failed(format!("engine panicked: {message}")));
                }
            })
            .map_err(|e| EngineError::other(format!("engine thread spawn failed: {e}")))?;

        Ok(Self {
            join: Some(join),
            done: done_rx,
            stop,
        })
    }

    #[inline]
    pub fn request_stop(&self) {
        self.stop.request();
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    /// Waits up to `timeout` for the thread to exit. Joins it when it did.
    pub fn wait_stopped(&mut self, timeout: Duration) -> bool {
        let stopped = matches!(
            self.done.recv_timeout(timeout),
            Ok(()) | Err(RecvTimeoutError::Disconnected)
        );

        if stopped {
            if let Some(join) = self.join.take() {
                if join.join().is_err() {
                    warn!("engine thread panicked");
                }
            }
        }
        stopped
    }
}

impl Drop for EngineThread {
    fn drop(&mut self) {
        self.stop.request();
        if self.join.is_some() && !self.wait_stopped(Duration::from_secs(2)) {
            warn!("engine thread did not stop in time; detaching");
        }
    }
}

fn run(launch: EngineLaunch) {
    let EngineLaunch {
        mut native,
        args,
        hub,
        dispatcher,
        mut queue,
        signals,
        settings,
        stop,
    } = launch;

    queue.bind_to_current_thread();

    info!("engine setup: args={args:?}");
    if let Err(e) = native.setup(&args) {
        error!("engine setup failed: {e}");
        let _ = signals.send(EngineSignal::Failed(e.to_string()));
        return;
    }

    for export in hub.legacy().announce() {
        debug!("register singleton '{}' ({} methods)", export.name, export.methods.len());
        native.register_singleton(&export);
    }
    hub.broadcast(&HookEvent::RegisterWithNative);

    let _ = signals.send(EngineSignal::KeepScreenOn(keep_screen_on(native.as_ref())));

    hub.broadcast(&HookEvent::SetupCompleted);
    let _ = signals.send(EngineSignal::SetupCompleted);

    let budget = settings.frame_budget();
    let mut state = LoopState::default();
    let mut main_loop_started = false;

    loop {
        if stop.is_requested() || state.stop {
            break;
        }

        let frame_start = Instant::now();

        {
            let mut ctx = EngineCtx::new(native.as_mut(), &hub, &dispatcher, &mut state);
            queue.drain(&mut ctx);

            if ctx.is_stepping_paused() {
                queue.drain_blocking(&mut ctx, settings.idle_wait);
                continue;
            }
        }

        if stop.is_requested() || state.stop {
            break;
        }

        match native.step() {
            Ok(StepStatus::Continue) => {}
            Ok(StepStatus::QuitRequested) => {
                info!("engine requested quit");
                let _ = signals.send(EngineSignal::QuitRequested);
                break;
            }
            Err(e) => {
                error!("engine step failed: {e}");
                let _ = signals.send(EngineSignal::Failed(e.to_string()));
                break;
            }
        }

        hub.broadcast(&HookEvent::GlDrawFrame);

        if !main_loop_started {
            main_loop_started = true;
            hub.broadcast(&HookEvent::MainLoopStarted);
            let _ = signals.send(EngineSignal::MainLoopStarted);
        }

        let elapsed = frame_start.elapsed();
        if elapsed < budget {
            thread::sleep(budget - elapsed);
        }
    }

    info!("engine thread stopped");
}
