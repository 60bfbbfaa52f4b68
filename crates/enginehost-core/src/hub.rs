use std::sync::Arc;

use crate::extension::ExtensionRegistry;
use crate::hooks::{any_handled, collect_views, ContributedView, HookEvent, HookOutcome};
use crate::legacy::LegacyModuleTable;

/// Both registries behind one fan-out. Legacy modules always hear a hook first.
#[derive(Clone)]
pub struct ModuleHub {
    legacy: Arc<LegacyModuleTable>,
    extensions: Arc<ExtensionRegistry>,
}

impl ModuleHub {
    pub fn new(legacy_capacity: usize) -> Self {
        Self {
            legacy: Arc::new(LegacyModuleTable::with_capacity(legacy_capacity)),
            extensions: Arc::new(ExtensionRegistry::new()),
        }
    }

    #[inline]
    pub fn legacy(&self) -> &LegacyModuleTable {
        &self.legacy
    }

    #[inline]
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    pub fn broadcast(&self, event: &HookEvent<'_>) -> Vec<HookOutcome> {
        let mut out = self.legacy.broadcast(event);
        out.extend(self.extensions.broadcast(event));
        out
    }

    /// Views from legacy modules only. They are built after native setup.
    pub fn legacy_views(&self) -> Vec<ContributedView> {
        collect_views(self.legacy.broadcast(&HookEvent::CreateView))
    }

    /// Views from extension modules. They are built as soon as the video surface exists.
    pub fn extension_views(&self) -> Vec<ContributedView> {
        self.extensions.collect_views()
    }

    /// True if any module consumed the back event.
    pub fn back_pressed(&self) -> bool {
        any_handled(&self.broadcast(&HookEvent::BackPressed))
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.legacy.is_closed() && self.extensions.is_closed()
    }
}
