//! Lifecycle hooks shared by the extension registry and the legacy module table.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::{trace, warn};
use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};

/// Lifecycle hook identifiers.
///
/// Frame-correlated hooks (`SetupCompleted`, `MainLoopStarted`, `RegisterWithNative`,
/// `GlDrawFrame`, `GlSurfaceChanged`) fire on the engine thread. All others fire on the host
/// thread. Modules that need engine state from a host hook must enqueue on the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hook {
    SetupCompleted,
    MainLoopStarted,
    RegisterWithNative,
    CreateView,
    ActivityResult,
    PermissionResult,
    Pause,
    Resume,
    Destroy,
    BackPressed,
    GlDrawFrame,
    GlSurfaceChanged,
}

impl Hook {
    pub const ALL: [Hook; 12] = [
        Hook::SetupCompleted,
        Hook::MainLoopStarted,
        Hook::RegisterWithNative,
        Hook::CreateView,
        Hook::ActivityResult,
        Hook::PermissionResult,
        Hook::Pause,
        Hook::Resume,
        Hook::Destroy,
        Hook::BackPressed,
        Hook::GlDrawFrame,
        Hook::GlSurfaceChanged,
    ];

    #[inline(always)]
    const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Hook::SetupCompleted => "setup_completed",
            Hook::MainLoopStarted => "main_loop_started",
            Hook::RegisterWithNative => "register_with_native",
            Hook::CreateView => "create_view",
            Hook::ActivityResult => "activity_result",
            Hook::PermissionResult => "permission_result",
            Hook::Pause => "pause",
            Hook::Resume => "resume",
            Hook::Destroy => "destroy",
            Hook::BackPressed => "back_pressed",
            Hook::GlDrawFrame => "gl_draw_frame",
            Hook::GlSurfaceChanged => "gl_surface_changed",
        }
    }
}

/// Capability set: the hooks a module implements. Hooks outside the set are never delivered.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HookSet(u32);

impl HookSet {
    pub const EMPTY: HookSet = HookSet(0);

    pub const fn of(hooks: &[Hook]) -> Self {
        let mut bits = 0u32;
        let mut i = 0;
        while i < hooks.len() {
            bits |= hooks[i].bit();
            i += 1;
        }
        HookSet(bits)
    }

    pub const fn all() -> Self {
        Self::of(&Hook::ALL)
    }

    #[inline]
    pub const fn with(self, hook: Hook) -> Self {
        HookSet(self.0 | hook.bit())
    }

    #[inline]
    pub const fn contains(self, hook: Hook) -> bool {
        self.0 & hook.bit() != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Hook> {
        Hook::ALL.into_iter().filter(move |h| self.contains(*h))
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Hook::as_str)).finish()
    }
}

/// Result data attached to an activity result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentData {
    pub action: Option<String>,
    pub uri: Option<String>,
    pub extras: BTreeMap<String, String>,
}

/// A hook invocation together with its payload.
#[derive(Debug, Clone, Copy)]
pub enum HookEvent<'a> {
    SetupCompleted,
    MainLoopStarted,
    RegisterWithNative,
    CreateView,
    ActivityResult {
        request_code: i32,
        result_code: i32,
        data: Option<&'a IntentData>,
    },
    PermissionResult {
        request_code: i32,
        permissions: &'a [String],
        grants: &'a [bool],
    },
    Pause,
    Resume,
    Destroy,
    BackPressed,
    GlDrawFrame,
    GlSurfaceChanged {
        width: u32,
        height: u32,
    },
}

impl HookEvent<'_> {
    pub fn hook(&self) -> Hook {
        match self {
            HookEvent::SetupCompleted => Hook::SetupCompleted,
            HookEvent::MainLoopStarted => Hook::MainLoopStarted,
            HookEvent::RegisterWithNative => Hook::RegisterWithNative,
            HookEvent::CreateView => Hook::CreateView,
            HookEvent::ActivityResult { .. } => Hook::ActivityResult,
            HookEvent::PermissionResult { .. } => Hook::PermissionResult,
            HookEvent::Pause => Hook::Pause,
            HookEvent::Resume => Hook::Resume,
            HookEvent::Destroy => Hook::Destroy,
            HookEvent::BackPressed => Hook::BackPressed,
            HookEvent::GlDrawFrame => Hook::GlDrawFrame,
            HookEvent::GlSurfaceChanged { .. } => Hook::GlSurfaceChanged,
        }
    }
}

/// Opaque host view contributed by a module. The bridge never looks inside.
pub struct HostView {
    inner: Box<dyn Any + Send>,
}

impl HostView {
    #[inline]
    pub fn new<T: Any + Send>(view: T) -> Self {
        Self {
            inner: Box::new(view),
        }
    }

    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn into_inner<T: Any>(self) -> Result<T, HostView> {
        match self.inner.downcast::<T>() {
            Ok(v) => Ok(*v),
            Err(inner) => Err(HostView { inner }),
        }
    }
}

impl fmt::Debug for HostView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostView(..)")
    }
}

/// A view together with the module that contributed it.
#[derive(Debug)]
pub struct ContributedView {
    pub module: String,
    pub view: HostView,
}

/// What a module answered to a hook.
#[derive(Debug)]
pub enum HookReply {
    Done,
    /// Answer to `BackPressed`: `true` consumes the event.
    Handled(bool),
    /// Answer to `CreateView`: `None` means no contribution.
    View(Option<HostView>),
}

/// Per-module broadcast result. Failures are contained here and never propagated.
#[derive(Debug)]
pub struct HookOutcome {
    pub module: String,
    pub result: EngineResult<HookReply>,
}

impl HookOutcome {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// An extension module participating in lifecycle broadcasts.
///
/// Every hook has a no-op default; `capabilities` decides which ones are delivered.
pub trait ExtensionModule: Send {
    fn name(&self) -> &str;

    fn capabilities(&self) -> HookSet;

    fn on_setup_completed(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn on_main_loop_started(&mut self) -> EngineResult<()> {
        Ok(())
    }

    /// Engine thread, right after native setup. Native-side registration goes here.
    fn on_register_with_native(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn on_create_view(&mut self) -> EngineResult<Option<HostView>> {
        Ok(None)
    }

    fn on_activity_result(
        &mut self,
        _request_code: i32,
        _result_code: i32,
        _data: Option<&IntentData>,
    ) -> EngineResult<()> {
        Ok(())
    }

    fn on_permission_result(
        &mut self,
        _request_code: i32,
        _permissions: &[String],
        _grants: &[bool],
    ) -> EngineResult<()> {
        Ok(())
    }

    fn on_pause(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn on_resume(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn on_destroy(&mut self) -> EngineResult<()> {
        Ok(())
    }

    /// Return `true` to consume the back event (the engine then does not see it).
    fn on_back_pressed(&mut self) -> EngineResult<bool> {
        Ok(false)
    }

    fn on_gl_draw_frame(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn on_gl_surface_changed(&mut self, _width: u32, _height: u32) -> EngineResult<()> {
        Ok(())
    }
}

/// Routes one event to the matching trait method.
pub(crate) fn deliver<M>(module: &mut M, event: &HookEvent<'_>) -> EngineResult<HookReply>
where
    M: ExtensionModule + ?Sized,
{
    match *event {
        HookEvent::SetupCompleted => module.on_setup_completed().map(|_| HookReply::Done),
        HookEvent::MainLoopStarted => module.on_main_loop_started().map(|_| HookReply::Done),
        HookEvent::RegisterWithNative => module.on_register_with_native().map(|_| HookReply::Done),
        HookEvent::CreateView => module.on_create_view().map(HookReply::View),
        HookEvent::ActivityResult {
            request_code,
            result_code,
            data,
        } => module
            .on_activity_result(request_code, result_code, data)
            .map(|_| HookReply::Done),
        HookEvent::PermissionResult {
            request_code,
            permissions,
            grants,
        } => module
            .on_permission_result(request_code, permissions, grants)
            .map(|_| HookReply::Done),
        HookEvent::Pause => module.on_pause().map(|_| HookReply::Done),
        HookEvent::Resume => module.on_resume().map(|_| HookReply::Done),
        HookEvent::Destroy => module.on_destroy().map(|_| HookReply::Done),
        HookEvent::BackPressed => module.on_back_pressed().map(HookReply::Handled),
        HookEvent::GlDrawFrame => module.on_gl_draw_frame().map(|_| HookReply::Done),
        HookEvent::GlSurfaceChanged { width, height } => module
            .on_gl_surface_changed(width, height)
            .map(|_| HookReply::Done),
    }
}

/// Shared handle to a registered module.
///
/// Identity and capabilities are captured once at registration. The module itself sits behind
/// a mutex because host-thread and engine-thread hooks may reach the same module.
pub struct ModuleHandle<M: ?Sized> {
    name: Arc<str>,
    capabilities: HookSet,
    module: Arc<Mutex<Box<M>>>,
}

impl<M: ?Sized> Clone for ModuleHandle<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            capabilities: self.capabilities,
            module: self.module.clone(),
        }
    }
}

impl<M: ?Sized> fmt::Debug for ModuleHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl<M: ExtensionModule + ?Sized> ModuleHandle<M> {
    pub(crate) fn new(module: Box<M>) -> Self {
        let name: Arc<str> = Arc::from(module.name());
        let capabilities = module.capabilities();
        Self {
            name,
            capabilities,
            module: Arc::new(Mutex::new(module)),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn capabilities(&self) -> HookSet {
        self.capabilities
    }

    /// Runs `f` with exclusive access to the module.
    ///
    /// Do not broadcast from inside `f` to a registry containing this module: the module lock
    /// is not re-entrant.
    pub fn with<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        let mut guard = self.module.lock();
        f(&mut **guard)
    }

    /// Delivers one event with failure isolation. `None` if the hook is not in the capability set.
    pub(crate) fn dispatch(&self, event: &HookEvent<'_>, registry: &str) -> Option<HookOutcome> {
        let hook = event.hook();
        if !self.capabilities.contains(hook) {
            return None;
        }

        let result = match catch_unwind(AssertUnwindSafe(|| self.with(|m| deliver(m, event)))) {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(EngineError::with_hook(self.name(), hook, e)),
            Err(payload) => Err(EngineError::ModulePanicked {
                module: self.name().to_string(),
                hook,
                message: panic_message(payload.as_ref()),
            }),
        };

        match &result {
            Ok(_) => trace!("{registry}: {} <- {}", self.name(), hook.as_str()),
            Err(e) => warn!("{registry}: {e}"),
        }

        Some(HookOutcome {
            module: self.name().to_string(),
            result,
        })
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Point-in-time view of a registry, in registration order.
///
/// Restartable: iterate as many times as needed. Registrations made after the snapshot was
/// taken are not visible through it.
pub struct ModuleSnapshot<M: ?Sized> {
    modules: Arc<[ModuleHandle<M>]>,
}

impl<M: ?Sized> Clone for ModuleSnapshot<M> {
    fn clone(&self) -> Self {
        Self {
            modules: self.modules.clone(),
        }
    }
}

impl<M: ExtensionModule + ?Sized> ModuleSnapshot<M> {
    pub(crate) fn new(modules: Vec<ModuleHandle<M>>) -> Self {
        Self {
            modules: modules.into(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ModuleHandle<M>> {
        self.modules.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    /// Delivers `event` to every capable module in order, continuing past failures.
    pub(crate) fn broadcast(&self, event: &HookEvent<'_>, registry: &str) -> Vec<HookOutcome> {
        self.modules
            .iter()
            .filter_map(|m| m.dispatch(event, registry))
            .collect()
    }
}

impl<'a, M: ?Sized> IntoIterator for &'a ModuleSnapshot<M> {
    type Item = &'a ModuleHandle<M>;
    type IntoIter = std::slice::Iter<'a, ModuleHandle<M>>;

    fn into_iter(self) -> Self::IntoIter {
        self.modules.iter()
    }
}

/// Pulls contributed views out of `CreateView` outcomes, preserving order.
pub fn collect_views(outcomes: Vec<HookOutcome>) -> Vec<ContributedView> {
    outcomes
        .into_iter()
        .filter_map(|o| match o.result {
            Ok(HookReply::View(Some(view))) => Some(ContributedView {
                module: o.module,
                view,
            }),
            _ => None,
        })
        .collect()
}

/// True if any module consumed a `BackPressed` event.
pub fn any_handled(outcomes: &[HookOutcome]) -> bool {
    outcomes
        .iter()
        .any(|o| matches!(o.result, Ok(HookReply::Handled(true))))
}
