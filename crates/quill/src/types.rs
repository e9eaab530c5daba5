//! Type descriptors, the type registry, and the built-in types.
//!
//! A [`TypeDescriptor`] catalogues a type's name, category, and method
//! table. Templated types additionally carry an arity and a populate hook;
//! [`TypeRegistry::specialise`] composes specialised descriptors such as
//! `Array<Int>` on demand and guarantees each specialisation is a singleton
//! within the registry.

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    error::{ExecResult, RuntimeError},
    intern::{Interner, StrId},
    io::EchoWriter,
    pool::{ValueId, ValuePool},
    value::{ValueCell, ValueData},
};

/// Stable index of a type descriptor inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Broad classification of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// A built-in scalar type.
    Primitive,
    /// An object type with a method table.
    Object,
    /// An open templated type awaiting specialisation.
    Templated,
}

/// Native function entry point.
///
/// Functions receive the execution context and the ids of their argument
/// values, and return the payload for the call's result slot.
pub type NativeFn = fn(&mut NativeCtx<'_>, &[ValueId]) -> ExecResult<ValueData>;

/// Hook installing the method table on a freshly specialised descriptor.
pub type PopulateFn = fn(&mut Interner) -> IndexMap<StrId, NativeFn>;

/// Execution context handed to native functions and methods.
pub struct NativeCtx<'a> {
    pub pool: &'a mut ValuePool,
    pub interner: &'a mut Interner,
    pub types: &'a TypeRegistry,
    pub echo: &'a mut dyn EchoWriter,
    /// The receiver captured at emit time; `None` for plain functions.
    pub receiver: Option<ValueId>,
}

/// Catalogue entry for one type.
#[derive(Debug)]
pub struct TypeDescriptor {
    name: StrId,
    category: TypeCategory,
    methods: IndexMap<StrId, NativeFn>,
    /// Specialisation arguments; empty for non-specialised types.
    template_args: SmallVec<[TypeId; 2]>,
    /// Number of template arguments an open templated type requires.
    template_arity: Option<usize>,
    /// Installs the method table on each specialisation of this base.
    populate: Option<PopulateFn>,
}

impl TypeDescriptor {
    /// Creates a primitive type with an empty method table.
    #[must_use]
    pub fn primitive(name: StrId) -> Self {
        Self {
            name,
            category: TypeCategory::Primitive,
            methods: IndexMap::new(),
            template_args: SmallVec::new(),
            template_arity: None,
            populate: None,
        }
    }

    /// Creates an object type with the given method table.
    #[must_use]
    pub fn object(name: StrId, methods: IndexMap<StrId, NativeFn>) -> Self {
        Self {
            name,
            category: TypeCategory::Object,
            methods,
            template_args: SmallVec::new(),
            template_arity: None,
            populate: None,
        }
    }

    /// Creates an open templated base that produces specialisations with
    /// `populate`-installed method tables.
    #[must_use]
    pub fn templated(name: StrId, arity: usize, populate: PopulateFn) -> Self {
        Self {
            name,
            category: TypeCategory::Templated,
            methods: IndexMap::new(),
            template_args: SmallVec::new(),
            template_arity: Some(arity),
            populate: Some(populate),
        }
    }

    #[must_use]
    pub fn name(&self) -> StrId {
        self.name
    }

    #[must_use]
    pub fn category(&self) -> TypeCategory {
        self.category
    }

    /// Looks up a method by interned name.
    #[must_use]
    pub fn method(&self, name: StrId) -> Option<NativeFn> {
        self.methods.get(&name).copied()
    }

    /// Number of methods installed on this descriptor.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Specialisation arguments, outermost first.
    #[must_use]
    pub fn template_args(&self) -> &[TypeId] {
        &self.template_args
    }
}

/// Catalogue of every registered type.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Vec<TypeDescriptor>,
    by_name: ahash::AHashMap<StrId, TypeId>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor, returning its id.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> TypeId {
        let id = TypeId(self.types.len().try_into().expect("TypeId overflow"));
        self.by_name.insert(descriptor.name, id);
        self.types.push(descriptor);
        id
    }

    /// Looks up a type by interned name.
    #[must_use]
    pub fn lookup(&self, name: StrId) -> Option<TypeId> {
        self.by_name.get(&name).copied()
    }

    /// Returns the descriptor for `id`.
    ///
    /// # Panics
    ///
    /// Panics if the id is invalid.
    #[must_use]
    pub fn get(&self, id: TypeId) -> &TypeDescriptor {
        self.types.get(id.index()).expect("TypeRegistry::get: unknown TypeId")
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Validates the argument count for a templated base before
    /// specialisation. The error is a ready-to-print message.
    pub fn check_template_args(&self, base: TypeId, args: &[TypeId], interner: &Interner) -> Result<(), String> {
        let descriptor = self.get(base);
        let name = interner.get_str(descriptor.name);
        match descriptor.template_arity {
            None => Err(format!("type '{name}' is not a templated type")),
            Some(arity) if arity != args.len() => Err(format!(
                "wrong number of template arguments: '{name}' requires {arity} argument(s) and {} were given",
                args.len()
            )),
            Some(_) => Ok(()),
        }
    }

    /// Returns the specialisation of `base` for `args`, creating it on
    /// first request.
    ///
    /// The specialised name is composed from the arguments' canonical names
    /// (`Array<Int>`); repeated requests return the same descriptor, and its
    /// method table is populated exactly once.
    pub fn specialise(&mut self, base: TypeId, args: &[TypeId], interner: &mut Interner) -> Result<TypeId, String> {
        self.check_template_args(base, args, interner)?;

        let mut composed = interner.get_str(self.get(base).name).to_owned();
        composed.push('<');
        for (i, &arg) in args.iter().enumerate() {
            if i > 0 {
                composed.push(',');
            }
            composed.push_str(interner.get_str(self.get(arg).name));
        }
        composed.push('>');

        let name = interner.intern(&composed);
        if let Some(existing) = self.lookup(name) {
            return Ok(existing);
        }

        let methods = match self.get(base).populate {
            Some(populate) => populate(interner),
            None => IndexMap::new(),
        };
        let descriptor = TypeDescriptor {
            name,
            category: TypeCategory::Object,
            methods,
            template_args: SmallVec::from_slice(args),
            template_arity: None,
            populate: None,
        };
        Ok(self.register(descriptor))
    }
}

/// Ids of the built-in types, captured at registration.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTypes {
    pub int: TypeId,
    pub double: TypeId,
    pub string: TypeId,
    pub boolean: TypeId,
    pub array: TypeId,
}

/// Registers the built-in primitive types and the `Array` template.
pub fn register_builtin_types(registry: &mut TypeRegistry, interner: &mut Interner) -> BuiltinTypes {
    let int = registry.register(TypeDescriptor::primitive(interner.intern("Int")));
    let double = registry.register(TypeDescriptor::primitive(interner.intern("Double")));
    let string = registry.register(TypeDescriptor::primitive(interner.intern("String")));
    let boolean = registry.register(TypeDescriptor::primitive(interner.intern("Bool")));
    let array = registry.register(TypeDescriptor::templated(
        interner.intern("Array"),
        1,
        array::method_table,
    ));
    BuiltinTypes {
        int,
        double,
        string,
        boolean,
        array,
    }
}

/// Methods of the templated `Array<T>` container.
///
/// Elements are stored by value: writes snapshot the argument's payload into
/// a fresh cell owned by the container, and reads hand back a copy.
mod array {
    use super::{ExecResult, IndexMap, NativeCtx, NativeFn, RuntimeError, StrId, ValueCell, ValueData, ValueId};
    use crate::intern::Interner;

    /// Builds the method table installed on every `Array` specialisation.
    pub(super) fn method_table(interner: &mut Interner) -> IndexMap<StrId, NativeFn> {
        let mut methods: IndexMap<StrId, NativeFn> = IndexMap::new();
        methods.insert(interner.intern("push"), push as NativeFn);
        methods.insert(interner.intern("pop"), pop as NativeFn);
        methods.insert(interner.intern("size"), size as NativeFn);
        methods.insert(interner.intern("isEmpty"), is_empty as NativeFn);
        methods.insert(interner.intern("clear"), clear as NativeFn);
        methods.insert(interner.intern("at"), at as NativeFn);
        methods.insert(interner.intern("set"), set as NativeFn);
        methods.insert(interner.intern("toString"), to_string as NativeFn);
        methods
    }

    /// Resolves the receiver to the cell holding the element vector.
    fn receiver(ctx: &NativeCtx<'_>, method: &str) -> ExecResult<ValueId> {
        let recv = ctx.receiver.ok_or(RuntimeError::NullCallable)?;
        let target = ctx.pool.resolve(recv);
        match ctx.pool.get(target).data() {
            ValueData::Vector(_) => Ok(target),
            other => Err(RuntimeError::WrongReceiver {
                method: method.to_owned(),
                expected: "Array".to_owned(),
                found: other.tag().name(),
            }),
        }
    }

    fn expect_arity(name: &str, args: &[ValueId], expected: usize) -> ExecResult<()> {
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

    fn int_arg(ctx: &NativeCtx<'_>, name: &str, args: &[ValueId], index: usize) -> ExecResult<i64> {
        let resolved = ctx.pool.resolve(args[index]);
        match ctx.pool.get(resolved).data() {
            ValueData::Int(i) => Ok(*i),
            other => Err(RuntimeError::BadArgument {
                name: name.to_owned(),
                expected: "Int",
                found: other.tag().name(),
            }),
        }
    }

    /// Snapshots an argument's payload into a fresh container-owned cell.
    fn snapshot(ctx: &mut NativeCtx<'_>, arg: ValueId) -> ValueId {
        let resolved = ctx.pool.resolve(arg);
        let data = {
            let source = ctx.pool.get(resolved).data();
            ctx.pool.clone_data(source)
        };
        ctx.pool.alloc(ValueCell::constant(data))
    }

    fn push(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
        expect_arity("push", args, 1)?;
        let target = receiver(ctx, "push")?;
        let element = snapshot(ctx, args[0]);
        if let ValueData::Vector(elements) = ctx.pool.get_mut(target).data_mut() {
            elements.push(element);
        }
        Ok(ValueData::None)
    }

    fn pop(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
        expect_arity("pop", args, 0)?;
        let target = receiver(ctx, "pop")?;
        let popped = match ctx.pool.get_mut(target).data_mut() {
            ValueData::Vector(elements) => elements.pop(),
            _ => None,
        };
        let element = popped.ok_or(RuntimeError::PopFromEmpty)?;
        let resolved = ctx.pool.resolve(element);
        let data = {
            let source = ctx.pool.get(resolved).data();
            ctx.pool.clone_data(source)
        };
        ctx.pool.dec_ref(element);
        Ok(data)
    }

    fn size(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
        expect_arity("size", args, 0)?;
        let target = receiver(ctx, "size")?;
        let len = match ctx.pool.get(target).data() {
            ValueData::Vector(elements) => elements.len(),
            _ => 0,
        };
        Ok(ValueData::Int(len.try_into().expect("Array length exceeds i64")))
    }

    fn is_empty(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
        expect_arity("isEmpty", args, 0)?;
        let target = receiver(ctx, "isEmpty")?;
        let empty = match ctx.pool.get(target).data() {
            ValueData::Vector(elements) => elements.is_empty(),
            _ => true,
        };
        Ok(ValueData::Bool(empty))
    }

    fn clear(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
        expect_arity("clear", args, 0)?;
        let target = receiver(ctx, "clear")?;
        let drained = match ctx.pool.get_mut(target).data_mut() {
            ValueData::Vector(elements) => std::mem::take(elements),
            _ => Vec::new(),
        };
        for element in drained {
            ctx.pool.dec_ref(element);
        }
        Ok(ValueData::None)
    }

    fn at(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
        expect_arity("at", args, 1)?;
        let target = receiver(ctx, "at")?;
        let index = int_arg(ctx, "at", args, 0)?;
        let element = match ctx.pool.get(target).data() {
            ValueData::Vector(elements) => {
                let len = elements.len();
                usize::try_from(index)
                    .ok()
                    .and_then(|i| elements.get(i).copied())
                    .ok_or(RuntimeError::IndexOutOfBounds { index, len })?
            }
            _ => unreachable!("receiver() guarantees a Vector payload"),
        };
        let resolved = ctx.pool.resolve(element);
        let source = ctx.pool.get(resolved).data();
        Ok(ctx.pool.clone_data(source))
    }

    fn set(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
        expect_arity("set", args, 2)?;
        let target = receiver(ctx, "set")?;
        let index = int_arg(ctx, "set", args, 0)?;
        let len = match ctx.pool.get(target).data() {
            ValueData::Vector(elements) => elements.len(),
            _ => 0,
        };
        let slot = usize::try_from(index)
            .ok()
            .filter(|&i| i < len)
            .ok_or(RuntimeError::IndexOutOfBounds { index, len })?;
        let element = snapshot(ctx, args[1]);
        let old = match ctx.pool.get_mut(target).data_mut() {
            ValueData::Vector(elements) => std::mem::replace(&mut elements[slot], element),
            _ => element,
        };
        ctx.pool.dec_ref(old);
        Ok(ValueData::None)
    }

    fn to_string(ctx: &mut NativeCtx<'_>, args: &[ValueId]) -> ExecResult<ValueData> {
        expect_arity("toString", args, 0)?;
        let target = receiver(ctx, "toString")?;
        let rendered = ctx.pool.display(ctx.interner, target);
        Ok(ValueData::Str(ctx.interner.intern(&rendered)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_registered_types() {
        let mut interner = Interner::new();
        let mut registry = TypeRegistry::new();
        let builtins = register_builtin_types(&mut registry, &mut interner);
        assert_eq!(registry.lookup(interner.intern("Int")), Some(builtins.int));
        assert_eq!(registry.lookup(interner.intern("Array")), Some(builtins.array));
        assert_eq!(registry.lookup(interner.intern("Missing")), None);
    }

    #[test]
    fn specialisation_is_a_singleton() {
        let mut interner = Interner::new();
        let mut registry = TypeRegistry::new();
        let builtins = register_builtin_types(&mut registry, &mut interner);

        let first = registry
            .specialise(builtins.array, &[builtins.int], &mut interner)
            .unwrap();
        let count_after_first = registry.len();
        let second = registry
            .specialise(builtins.array, &[builtins.int], &mut interner)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), count_after_first);
        assert_eq!(interner.get_str(registry.get(first).name()), "Array<Int>");
        // The method table was populated exactly once, when the descriptor
        // was created.
        assert!(registry.get(first).method_count() > 0);
        assert_eq!(registry.get(first).template_args(), &[builtins.int]);
    }

    #[test]
    fn nested_specialisation_composes_names() {
        let mut interner = Interner::new();
        let mut registry = TypeRegistry::new();
        let builtins = register_builtin_types(&mut registry, &mut interner);

        let inner = registry
            .specialise(builtins.array, &[builtins.int], &mut interner)
            .unwrap();
        let outer = registry.specialise(builtins.array, &[inner], &mut interner).unwrap();
        assert_eq!(interner.get_str(registry.get(outer).name()), "Array<Array<Int>>");
    }

    #[test]
    fn template_arity_mismatch_is_reported() {
        let mut interner = Interner::new();
        let mut registry = TypeRegistry::new();
        let builtins = register_builtin_types(&mut registry, &mut interner);

        let err = registry
            .specialise(builtins.array, &[builtins.int, builtins.int], &mut interner)
            .unwrap_err();
        assert!(err.contains("'Array' requires 1 argument(s) and 2 were given"), "{err}");

        let err = registry
            .specialise(builtins.int, &[builtins.int], &mut interner)
            .unwrap_err();
        assert!(err.contains("not a templated type"), "{err}");
    }
}
