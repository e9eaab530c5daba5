//! Module and package registry.
//!
//! A [`Module`] is a plain record: a name, an init hook, and three maps
//! (functions, classes, constants) that the init hook fills on first load.
//! A [`Package`] groups modules and tracks its load state. Importing
//! publishes a module's functions into the registry's function table,
//! its classes into the global scope as type aliases, and its constants
//! into the global scope as value bindings — all visible to the opcode
//! generator from then on. Importing an already-loaded module is a no-op.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    error::{CompileError, CompileResult, ExecResult, RuntimeError},
    intern::{Interner, StrId},
    pool::{ValueId, ValuePool},
    scope::{ScopeArena, ScopeId, Symbol},
    types::{NativeCtx, NativeFn, TypeId, TypeRegistry},
    value::ValueData,
};

mod core_mod;
mod io_mod;
mod math;

/// Bit set on a module's flag word once its maps are populated and
/// published.
pub const MODULE_LOADED: u16 = 1;

/// Init hook filling a module's export maps on first load.
pub type ModuleInit = fn(&mut ModuleExports<'_>, u16);

/// Mutable view handed to a module's init hook.
pub struct ModuleExports<'a> {
    pub interner: &'a mut Interner,
    pub pool: &'a mut ValuePool,
    pub types: &'a mut TypeRegistry,
    pub functions: &'a mut IndexMap<StrId, NativeFn>,
    pub classes: &'a mut IndexMap<StrId, TypeId>,
    pub consts: &'a mut IndexMap<StrId, ValueId>,
}

/// One importable module.
#[derive(Debug)]
pub struct Module {
    name: &'static str,
    init: ModuleInit,
    flags: u16,
    functions: IndexMap<StrId, NativeFn>,
    classes: IndexMap<StrId, TypeId>,
    consts: IndexMap<StrId, ValueId>,
}

impl Module {
    #[must_use]
    pub fn new(name: &'static str, init: ModuleInit) -> Self {
        Self {
            name,
            init,
            flags: 0,
            functions: IndexMap::new(),
            classes: IndexMap::new(),
            consts: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.flags & MODULE_LOADED != 0
    }
}

/// Load state of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Unloaded,
    /// At least one module has been loaded.
    Loaded,
    /// Every module has been loaded.
    FullyLoaded,
}

/// A named group of modules.
#[derive(Debug)]
pub struct Package {
    name: &'static str,
    state: PackageState,
    modules: IndexMap<StrId, Module>,
}

impl Package {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: PackageState::Unloaded,
            modules: IndexMap::new(),
        }
    }

    /// Adds a module, keyed by its interned name.
    pub fn add_module(&mut self, module: Module, interner: &mut Interner) {
        let key = interner.intern(module.name);
        self.modules.insert(key, module);
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn state(&self) -> PackageState {
        self.state
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.state, PackageState::Loaded | PackageState::FullyLoaded)
    }
}

/// Registry of every known package, plus the function table the opcode
/// generator resolves calls against.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    packages: IndexMap<StrId, Package>,
    functions: AHashMap<StrId, NativeFn>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a package, keyed by its interned name.
    pub fn add_package(&mut self, package: Package, interner: &mut Interner) {
        let key = interner.intern(package.name);
        self.packages.insert(key, package);
    }

    /// Resolves a published function by name.
    #[must_use]
    pub fn function(&self, name: StrId) -> Option<NativeFn> {
        self.functions.get(&name).copied()
    }

    /// Returns a package's load state, if the package exists.
    #[must_use]
    pub fn package_state(&self, name: StrId) -> Option<PackageState> {
        self.packages.get(&name).map(Package::state)
    }

    /// Imports a whole package or one of its modules.
    ///
    /// Loading is idempotent: modules that are already loaded are skipped,
    /// so re-importing is observationally a no-op.
    pub fn import(
        &mut self,
        package: StrId,
        module: Option<StrId>,
        interner: &mut Interner,
        pool: &mut ValuePool,
        types: &mut TypeRegistry,
        scopes: &mut ScopeArena,
    ) -> CompileResult<()> {
        let Self { packages, functions } = self;
        let Some(pkg) = packages.get_mut(&package) else {
            return Err(CompileError::UnknownModule(interner.get_str(package).to_owned()));
        };
        match module {
            Some(name) => {
                let Some(entry) = pkg.modules.get_mut(&name) else {
                    let full = format!("{}.{}", pkg.name, interner.get_str(name));
                    return Err(CompileError::UnknownModule(full));
                };
                load_module(entry, functions, interner, pool, types, scopes);
                if pkg.state == PackageState::Unloaded {
                    pkg.state = PackageState::Loaded;
                }
                if pkg.modules.values().all(Module::is_loaded) {
                    pkg.state = PackageState::FullyLoaded;
                }
            }
            None => {
                for entry in pkg.modules.values_mut() {
                    load_module(entry, functions, interner, pool, types, scopes);
                }
                pkg.state = PackageState::FullyLoaded;
            }
        }
        Ok(())
    }

    /// Releases every constant reference held by loaded modules. Call once
    /// on teardown before inspecting the pool.
    pub fn release_all(&mut self, pool: &mut ValuePool) {
        for package in self.packages.values_mut() {
            for module in package.modules.values_mut() {
                for (_, value) in module.consts.drain(..) {
                    pool.dec_ref(value);
                }
            }
        }
    }
}

/// Loads one module: runs its init hook once, then publishes its exports.
fn load_module(
    module: &mut Module,
    functions: &mut AHashMap<StrId, NativeFn>,
    interner: &mut Interner,
    pool: &mut ValuePool,
    types: &mut TypeRegistry,
    scopes: &mut ScopeArena,
) {
    if module.is_loaded() {
        return;
    }
    (module.init)(
        &mut ModuleExports {
            interner: &mut *interner,
            pool: &mut *pool,
            types: &mut *types,
            functions: &mut module.functions,
            classes: &mut module.classes,
            consts: &mut module.consts,
        },
        MODULE_LOADED,
    );
    for (&name, &func) in &module.functions {
        functions.insert(name, func);
    }
    for (&name, &ty) in &module.classes {
        scopes.bind_type(ScopeId::GLOBAL, name, ty);
    }
    for (&name, &value) in &module.consts {
        pool.inc_ref(value);
        if let Some(Symbol::Value(old)) = scopes.bind_value(ScopeId::GLOBAL, name, value) {
            pool.dec_ref(old);
        }
    }
    module.flags |= MODULE_LOADED;
}

/// Checks a native function's argument count.
pub(crate) fn expect_arity(name: &str, args: &[ValueId], expected: usize) -> ExecResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(RuntimeError::Arity {
            name: name.to_owned(),
            expected,
            found: args.len(),
        })
    }
}

/// A numeric argument, preserving its integer/double distinction.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    Int(i64),
    Double(f64),
}

impl Num {
    pub(crate) fn as_double(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Double(d) => d,
        }
    }
}

/// Extracts a numeric argument, rejecting everything else.
pub(crate) fn num_arg(ctx: &NativeCtx<'_>, name: &str, args: &[ValueId], index: usize) -> ExecResult<Num> {
    let resolved = ctx.pool.resolve(args[index]);
    match ctx.pool.get(resolved).data() {
        ValueData::Int(i) => Ok(Num::Int(*i)),
        ValueData::Double(d) => Ok(Num::Double(*d)),
        other => Err(RuntimeError::BadArgument {
            name: name.to_owned(),
            expected: "a number",
            found: other.tag().name(),
        }),
    }
}

/// Builds the `std` package: `core` (auto-loaded), `math`, and `io`.
#[must_use]
pub fn std_package(interner: &mut Interner) -> Package {
    let mut package = Package::new("std");
    package.add_module(Module::new("core", core_mod::init), interner);
    package.add_module(Module::new("math", math::init), interner);
    package.add_module(Module::new("io", io_mod::init), interner);
    package
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ValueCell, ValueData};

    fn setup() -> (Interner, ValuePool, TypeRegistry, ScopeArena, ModuleRegistry) {
        let mut interner = Interner::new();
        let pool = ValuePool::new();
        let types = TypeRegistry::new();
        let scopes = ScopeArena::new();
        let mut registry = ModuleRegistry::new();
        let package = std_package(&mut interner);
        registry.add_package(package, &mut interner);
        (interner, pool, types, scopes, registry)
    }

    #[test]
    fn importing_a_module_publishes_its_functions() {
        let (mut interner, mut pool, mut types, mut scopes, mut registry) = setup();
        let std_name = interner.intern("std");
        let math = interner.intern("math");
        let pow = interner.intern("pow");

        assert!(registry.function(pow).is_none());
        registry
            .import(std_name, Some(math), &mut interner, &mut pool, &mut types, &mut scopes)
            .unwrap();
        assert!(registry.function(pow).is_some());
        assert_eq!(registry.package_state(std_name), Some(PackageState::Loaded));
    }

    #[test]
    fn importing_twice_is_a_no_op() {
        let (mut interner, mut pool, mut types, mut scopes, mut registry) = setup();
        let std_name = interner.intern("std");
        let math = interner.intern("math");
        let pi = interner.intern("PI");

        registry
            .import(std_name, Some(math), &mut interner, &mut pool, &mut types, &mut scopes)
            .unwrap();
        let live_after_first = pool.live_count();
        let bound = scopes.get_value(ScopeId::GLOBAL, pi).unwrap();
        let refs_after_first = pool.refcount(bound);

        registry
            .import(std_name, Some(math), &mut interner, &mut pool, &mut types, &mut scopes)
            .unwrap();
        assert_eq!(pool.live_count(), live_after_first);
        assert_eq!(pool.refcount(bound), refs_after_first);
        assert_eq!(scopes.get_value(ScopeId::GLOBAL, pi), Some(bound));
    }

    #[test]
    fn importing_the_package_loads_every_module() {
        let (mut interner, mut pool, mut types, mut scopes, mut registry) = setup();
        let std_name = interner.intern("std");
        let strlen = interner.intern("strlen");
        let println = interner.intern("println");

        registry
            .import(std_name, None, &mut interner, &mut pool, &mut types, &mut scopes)
            .unwrap();
        assert!(registry.function(strlen).is_some());
        assert!(registry.function(println).is_some());
        assert_eq!(registry.package_state(std_name), Some(PackageState::FullyLoaded));
    }

    #[test]
    fn unknown_package_and_module_are_errors() {
        let (mut interner, mut pool, mut types, mut scopes, mut registry) = setup();
        let bogus = interner.intern("bogus");
        let std_name = interner.intern("std");

        let err = registry
            .import(bogus, None, &mut interner, &mut pool, &mut types, &mut scopes)
            .unwrap_err();
        assert_eq!(err, CompileError::UnknownModule("bogus".to_owned()));

        let err = registry
            .import(std_name, Some(bogus), &mut interner, &mut pool, &mut types, &mut scopes)
            .unwrap_err();
        assert_eq!(err, CompileError::UnknownModule("std.bogus".to_owned()));
    }

    #[test]
    fn class_exports_become_global_type_aliases() {
        fn init(exports: &mut ModuleExports<'_>, _flags: u16) {
            let name = exports.interner.intern("Widget");
            let ty = exports
                .types
                .register(crate::types::TypeDescriptor::object(name, indexmap::IndexMap::new()));
            exports.classes.insert(name, ty);
            let answer = exports.interner.intern("ANSWER");
            let value = exports.pool.alloc(ValueCell::constant(ValueData::Int(42)));
            exports.consts.insert(answer, value);
        }

        let (mut interner, mut pool, mut types, mut scopes, mut registry) = setup();
        let mut package = Package::new("gui");
        package.add_module(Module::new("widgets", init), &mut interner);
        registry.add_package(package, &mut interner);

        let gui = interner.intern("gui");
        registry
            .import(gui, None, &mut interner, &mut pool, &mut types, &mut scopes)
            .unwrap();

        let widget = interner.intern("Widget");
        assert!(scopes.get_type(ScopeId::GLOBAL, widget).is_some());
        let answer = interner.intern("ANSWER");
        assert!(scopes.get_value(ScopeId::GLOBAL, answer).is_some());
    }
}
