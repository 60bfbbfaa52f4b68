use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::RwLock;

use super::methods::{MethodDecl, Variant};
use super::LegacyModule;
use crate::error::{EngineError, EngineResult};
use crate::hooks::{HookEvent, HookOutcome, ModuleHandle, ModuleSnapshot};

pub const DEFAULT_LEGACY_CAPACITY: usize = 64;

pub type LegacyHandle = ModuleHandle<dyn LegacyModule>;

/// Methods a legacy module exposes, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportTable {
    methods: Vec<MethodDecl>,
}

impl ExportTable {
    /// Keeps the declared methods whose names are in `expose`.
    ///
    /// A name declared twice keeps its first position and the last declaration.
    pub fn build(module: &str, declared: &[MethodDecl], expose: &[&str]) -> Self {
        let mut methods: Vec<MethodDecl> = Vec::new();

        for decl in declared.iter().filter(|d| expose.contains(&d.name)) {
            match methods.iter_mut().find(|m| m.name == decl.name) {
                Some(slot) => {
                    warn!(
                        "legacy '{module}': method '{}' declared more than once; keeping the last declaration",
                        decl.name
                    );
                    *slot = *decl;
                }
                None => methods.push(*decl),
            }
        }

        for name in expose {
            if !declared.iter().any(|d| d.name == *name) {
                warn!("legacy '{module}': exposed method '{name}' is not declared");
            }
        }

        Self { methods }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }

    #[inline]
    pub fn methods(&self) -> &[MethodDecl] {
        &self.methods
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// What the native engine learns about one legacy module.
#[derive(Debug, Clone)]
pub struct SingletonExport {
    pub name: String,
    pub methods: Arc<ExportTable>,
}

#[derive(Clone)]
struct Entry {
    handle: LegacyHandle,
    exports: Arc<ExportTable>,
}

struct Inner {
    entries: Vec<Entry>,
    // Set once the engine took the export list; later modules are announced one by one.
    announced: bool,
    closed: bool,
}

/// Capacity-bounded registry of legacy modules.
pub struct LegacyModuleTable {
    capacity: usize,
    inner: RwLock<Inner>,
}

impl Default for LegacyModuleTable {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LEGACY_CAPACITY)
    }
}

impl LegacyModuleTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                announced: false,
                closed: false,
            }),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers `module`, exporting the declared methods named in `expose`.
    ///
    /// `RegistryFull` and `RegistryClosed` are fatal for startup.
    pub fn register(
        &self,
        module: Box<dyn LegacyModule>,
        expose: &[&str],
    ) -> EngineResult<LegacyHandle> {
        self.register_with_export(module, expose).map(|(handle, _)| handle)
    }

    /// Like [`register`](Self::register). When [`announce`](Self::announce) already ran, also
    /// returns the module's export so the caller can hand it to the engine.
    pub fn register_with_export(
        &self,
        module: Box<dyn LegacyModule>,
        expose: &[&str],
    ) -> EngineResult<(LegacyHandle, Option<SingletonExport>)> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(EngineError::RegistryClosed);
        }

        let name = module.name().to_string();
        if inner.entries.iter().any(|e| e.handle.name() == name) {
            return Err(EngineError::DuplicateModule(name));
        }

        if inner.entries.len() >= self.capacity {
            error!(
                "legacy module table is full (capacity {}); rejecting '{name}'",
                self.capacity
            );
            return Err(EngineError::RegistryFull {
                capacity: self.capacity,
            });
        }

        let exports = Arc::new(ExportTable::build(&name, module.methods(), expose));
        let handle = ModuleHandle::new(module);
        info!(
            "legacy module registered: '{}' exports={} caps={:?}",
            handle.name(),
            exports.len(),
            handle.capabilities()
        );

        let late = inner.announced.then(|| SingletonExport {
            name,
            methods: exports.clone(),
        });
        inner.entries.push(Entry {
            handle: handle.clone(),
            exports,
        });
        Ok((handle, late))
    }

    pub fn all_modules(&self) -> ModuleSnapshot<dyn LegacyModule> {
        handles(&self.inner.read().entries)
    }

    /// Every module with its export table, in registration order.
    pub fn exports(&self) -> Vec<SingletonExport> {
        export_list(&self.inner.read().entries)
    }

    /// Hands the export list to the engine. Modules registered afterwards come back from
    /// [`register_with_export`](Self::register_with_export) instead.
    pub fn announce(&self) -> Vec<SingletonExport> {
        let mut inner = self.inner.write();
        inner.announced = true;
        export_list(&inner.entries)
    }

    #[inline]
    pub fn is_announced(&self) -> bool {
        self.inner.read().announced
    }

    /// Calls an exported method after checking arity and argument types.
    ///
    /// Must not be called from inside a hook of the same module.
    pub fn invoke(&self, module: &str, method: &str, args: &[Variant]) -> EngineResult<Variant> {
        let entry = self
            .inner
            .read()
            .entries
            .iter()
            .find(|e| e.handle.name() == module)
            .cloned()
            .ok_or_else(|| EngineError::UnknownMethod {
                module: module.to_string(),
                method: method.to_string(),
            })?;

        let decl = *entry
            .exports
            .get(method)
            .ok_or_else(|| EngineError::UnknownMethod {
                module: module.to_string(),
                method: method.to_string(),
            })?;

        let invalid = |reason: String| EngineError::InvalidCall {
            module: module.to_string(),
            method: method.to_string(),
            reason,
        };

        if args.len() != decl.params.len() {
            return Err(invalid(format!(
                "expected {} argument(s), got {}",
                decl.params.len(),
                args.len()
            )));
        }

        for (i, (ty, arg)) in decl.params.iter().zip(args).enumerate() {
            if !ty.accepts(arg) {
                return Err(invalid(format!(
                    "argument {i}: expected {ty}, got {}",
                    arg.value_type()
                )));
            }
        }

        debug!("legacy call {}", decl.signature());
        let ret = entry.handle.with(|m| m.call(method, args))?;

        if !decl.return_type.accepts(&ret) {
            return Err(invalid(format!(
                "returned {}, declared {}",
                ret.value_type(),
                decl.return_type
            )));
        }
        Ok(ret)
    }

    /// Same semantics as the extension registry, including close-on-destroy.
    pub fn broadcast(&self, event: &HookEvent<'_>) -> Vec<HookOutcome> {
        let snapshot = match event {
            HookEvent::Destroy => {
                let mut inner = self.inner.write();
                if inner.closed {
                    return Vec::new();
                }
                inner.closed = true;
                handles(&inner.entries)
            }
            _ => {
                let inner = self.inner.read();
                if inner.closed {
                    debug!("legacy: table closed, dropping {}", event.hook().as_str());
                    return Vec::new();
                }
                handles(&inner.entries)
            }
        };

        snapshot.broadcast(event, "legacy")
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }
}

fn handles(entries: &[Entry]) -> ModuleSnapshot<dyn LegacyModule> {
    ModuleSnapshot::new(entries.iter().map(|e| e.handle.clone()).collect())
}

fn export_list(entries: &[Entry]) -> Vec<SingletonExport> {
    entries
        .iter()
        .map(|e| SingletonExport {
            name: e.handle.name().to_string(),
            methods: e.exports.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{ExtensionModule, Hook, HookSet};
    use crate::legacy::methods::ValueType;

    const METHODS: &[MethodDecl] = &[
        MethodDecl::new("add", ValueType::Int, &[ValueType::Int, ValueType::Int]),
        MethodDecl::new("scale", ValueType::Float, &[ValueType::Float]),
        MethodDecl::new("hidden", ValueType::Void, &[]),
        MethodDecl::new("lie", ValueType::Int, &[]),
        MethodDecl::new("add", ValueType::Int, &[ValueType::Int]),
    ];

    struct Calc(&'static str);

    impl ExtensionModule for Calc {
        fn name(&self) -> &str {
            self.0
        }

        fn capabilities(&self) -> HookSet {
            HookSet::EMPTY
        }
    }

    impl LegacyModule for Calc {
        fn methods(&self) -> &[MethodDecl] {
            METHODS
        }

        fn call(&mut self, method: &str, args: &[Variant]) -> EngineResult<Variant> {
            match method {
                "add" => Ok(Variant::Int(args.iter().filter_map(Variant::as_int).sum())),
                "scale" => Ok(Variant::Float(args[0].as_float().unwrap_or(0.0) * 2.0)),
                "lie" => Ok(Variant::from("not an int")),
                _ => Ok(Variant::Nil),
            }
        }
    }

    /// Hears `Pause`; panics on it when `explode` is set.
    struct Loud {
        name: &'static str,
        explode: bool,
        log: Arc<parking_lot::Mutex<Vec<&'static str>>>,
    }

    impl ExtensionModule for Loud {
        fn name(&self) -> &str {
            self.name
        }

        fn capabilities(&self) -> HookSet {
            HookSet::of(&[Hook::Pause])
        }

        fn on_pause(&mut self) -> EngineResult<()> {
            if self.explode {
                panic!("{} exploded", self.name);
            }
            self.log.lock().push(self.name);
            Ok(())
        }
    }

    impl LegacyModule for Loud {
        fn methods(&self) -> &[MethodDecl] {
            &[]
        }

        fn call(&mut self, _method: &str, _args: &[Variant]) -> EngineResult<Variant> {
            Ok(Variant::Nil)
        }
    }

    #[test]
    fn export_table_filters_and_keeps_last_duplicate() {
        let t = ExportTable::build("calc", METHODS, &["add", "scale", "lie", "missing"]);
        let names: Vec<_> = t.methods().iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["add", "scale", "lie"]);
        assert_eq!(t.get("add").map(|m| m.params.len()), Some(1));
        assert!(t.get("hidden").is_none());
    }

    #[test]
    fn capacity_overflow_is_fatal() {
        let table = LegacyModuleTable::with_capacity(2);
        table.register(Box::new(Calc("a")), &[]).unwrap();
        table.register(Box::new(Calc("b")), &[]).unwrap();
        let err = table.register(Box::new(Calc("c")), &[]).unwrap_err();
        assert!(matches!(err, EngineError::RegistryFull { capacity: 2 }));
        assert!(err.is_fatal());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn default_capacity_is_64() {
        let table = LegacyModuleTable::default();
        assert_eq!(table.capacity(), DEFAULT_LEGACY_CAPACITY);
        let names: Vec<&'static str> = (0..64)
            .map(|i| &*Box::leak(format!("m{i}").into_boxed_str()))
            .collect();
        for n in names {
            table.register(Box::new(Calc(n)), &[]).unwrap();
        }
        assert!(matches!(
            table.register(Box::new(Calc("overflow")), &[]),
            Err(EngineError::RegistryFull { capacity: 64 })
        ));
    }

    #[test]
    fn invoke_validates_signature() {
        let table = LegacyModuleTable::default();
        table
            .register(Box::new(Calc("calc")), &["add", "scale", "lie"])
            .unwrap();

        assert_eq!(table.invoke("calc", "add", &[Variant::Int(5)]).unwrap(), Variant::Int(5));
        assert_eq!(
            table.invoke("calc", "scale", &[Variant::Int(2)]).unwrap(),
            Variant::Float(4.0)
        );

        assert!(matches!(
            table.invoke("calc", "add", &[Variant::Int(1), Variant::Int(2)]),
            Err(EngineError::InvalidCall { .. })
        ));
        assert!(matches!(
            table.invoke("calc", "add", &[Variant::from("x")]),
            Err(EngineError::InvalidCall { .. })
        ));
        assert!(matches!(
            table.invoke("calc", "lie", &[]),
            Err(EngineError::InvalidCall { .. })
        ));
        assert!(matches!(
            table.invoke("calc", "hidden", &[]),
            Err(EngineError::UnknownMethod { .. })
        ));
        assert!(matches!(
            table.invoke("nobody", "add", &[]),
            Err(EngineError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn exports_follow_registration_order() {
        let table = LegacyModuleTable::default();
        table.register(Box::new(Calc("b")), &["add"]).unwrap();
        table.register(Box::new(Calc("a")), &["scale", "add"]).unwrap();

        let exports = table.exports();
        let names: Vec<_> = exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(exports[1].methods.len(), 2);
    }

    #[test]
    fn destroy_closes_the_table() {
        let table = LegacyModuleTable::default();
        table.register(Box::new(Calc("a")), &[]).unwrap();
        table.broadcast(&HookEvent::Destroy);
        assert!(table.is_closed());
        assert!(matches!(
            table.register(Box::new(Calc("b")), &[]),
            Err(EngineError::RegistryClosed)
        ));
    }

    #[test]
    fn modules_after_announce_come_back_with_their_export() {
        let table = LegacyModuleTable::default();
        let (_, early) = table.register_with_export(Box::new(Calc("a")), &["add"]).unwrap();
        assert!(early.is_none());
        assert!(!table.is_announced());

        let announced = table.announce();
        assert_eq!(announced.len(), 1);
        assert!(table.is_announced());

        let (handle, late) = table
            .register_with_export(Box::new(Calc("b")), &["add", "scale"])
            .unwrap();
        let late = late.expect("late module has an export");
        assert_eq!(handle.name(), "b");
        assert_eq!(late.name, "b");
        assert_eq!(late.methods.len(), 2);
    }

    #[test]
    fn panicking_module_does_not_stop_the_broadcast() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let table = LegacyModuleTable::default();
        for (name, explode) in [("a", false), ("b", true), ("c", false)] {
            let m = Loud {
                name,
                explode,
                log: log.clone(),
            };
            table.register(Box::new(m), &[]).unwrap();
        }

        let outcomes = table.broadcast(&HookEvent::Pause);
        let order: Vec<_> = outcomes.iter().map(|o| o.module.as_str()).collect();
        let ok: Vec<_> = outcomes.iter().map(|o| o.result.is_ok()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(ok, vec![true, false, true]);
        assert!(matches!(
            &outcomes[1].result,
            Err(EngineError::ModulePanicked { message, .. }) if message.contains("b exploded")
        ));
        assert_eq!(*log.lock(), vec!["a", "c"]);
    }

    #[test]
    fn broadcast_only_reads_the_table() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let table = LegacyModuleTable::default();
        let m = Loud {
            name: "a",
            explode: false,
            log: log.clone(),
        };
        table.register(Box::new(m), &[]).unwrap();

        let _reader = table.inner.read();
        assert_eq!(table.broadcast(&HookEvent::Pause).len(), 1);
        assert_eq!(*log.lock(), vec!["a"]);
    }
}
