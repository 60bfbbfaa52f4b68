use log::{debug, info};
use parking_lot::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::hooks::{
    collect_views, ContributedView, ExtensionModule, HookEvent, HookOutcome, ModuleHandle,
    ModuleSnapshot,
};

pub type ExtensionHandle = ModuleHandle<dyn ExtensionModule>;

struct Inner {
    modules: Vec<ExtensionHandle>,
    closed: bool,
}

/// Registered extension modules, in registration order.
///
/// Broadcasts run on a snapshot taken under the lock, so a module may register another module
/// (or the host may register from a different thread) while a broadcast is in flight.
pub struct ExtensionRegistry {
    inner: RwLock<Inner>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                modules: Vec::new(),
                closed: false,
            }),
        }
    }

    pub fn register(&self, module: Box<dyn ExtensionModule>) -> EngineResult<ExtensionHandle> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(EngineError::RegistryClosed);
        }

        let name = module.name().to_string();
        if inner.modules.iter().any(|m| m.name() == name) {
            return Err(EngineError::DuplicateModule(name));
        }

        let handle = ModuleHandle::new(module);
        info!(
            "extension registered: '{}' caps={:?}",
            handle.name(),
            handle.capabilities()
        );
        inner.modules.push(handle.clone());
        Ok(handle)
    }

    pub fn all_modules(&self) -> ModuleSnapshot<dyn ExtensionModule> {
        ModuleSnapshot::new(self.inner.read().modules.clone())
    }

    pub fn get(&self, name: &str) -> Option<ExtensionHandle> {
        self.inner
            .read()
            .modules
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.read().modules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// Delivers `event` to every module declaring the hook, in registration order.
    ///
    /// `Destroy` is delivered once and closes the registry; afterwards nothing is delivered.
    pub fn broadcast(&self, event: &HookEvent<'_>) -> Vec<HookOutcome> {
        let snapshot = match event {
            HookEvent::Destroy => {
                let mut inner = self.inner.write();
                if inner.closed {
                    return Vec::new();
                }
                inner.closed = true;
                ModuleSnapshot::new(inner.modules.clone())
            }
            _ => {
                let inner = self.inner.read();
                if inner.closed {
                    debug!("extensions: registry closed, dropping {}", event.hook().as_str());
                    return Vec::new();
                }
                ModuleSnapshot::new(inner.modules.clone())
            }
        };

        snapshot.broadcast(event, "extensions")
    }

    /// Broadcasts `CreateView` and returns the non-empty contributions in enumeration order.
    pub fn collect_views(&self) -> Vec<ContributedView> {
        collect_views(self.broadcast(&HookEvent::CreateView))
    }
}
