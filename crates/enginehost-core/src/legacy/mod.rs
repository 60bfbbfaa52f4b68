//! Older in-process modules: same hooks as extensions, plus an exported method table that the
//! native engine can call into.

mod methods;
mod table;

pub use methods::{MethodDecl, ValueType, Variant};
pub use table::{
    ExportTable, LegacyHandle, LegacyModuleTable, SingletonExport, DEFAULT_LEGACY_CAPACITY,
};

use crate::error::EngineResult;
use crate::hooks::ExtensionModule;

pub trait LegacyModule: ExtensionModule {
    /// Every method the module can serve. Filtered by the exposed names at registration.
    fn methods(&self) -> &[MethodDecl];

    /// Called only with arguments already checked against the exported signature.
    fn call(&mut self, method: &str, args: &[Variant]) -> EngineResult<Variant>;
}
