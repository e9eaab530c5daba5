//! Lexical scope tree and symbol resolution.
//!
//! Scopes form a tree rooted at the global scope. Each lexical block adds
//! an *ordinary* child; a function or class body adds an *orphaned* child.
//! Orphaned children are excluded from their parent's ordinary child list,
//! so walking a block's children never descends into a nested body — but a
//! scope's own upward resolution always climbs the parent chain, orphaned
//! or not. An orphaned scope is therefore the resolution root for its body:
//! names bound inside it are invisible to the enclosing block.
//!
//! Scopes are arena-allocated and addressed by [`ScopeId`]; releasing the
//! arena decrements every bound value's refcount.

use ahash::AHashMap;

use crate::{intern::StrId, pool::{ValueId, ValuePool}, types::TypeId};

/// Stable index of a scope inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The global scope, always present at index 0.
    pub const GLOBAL: Self = Self(0);

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What an interned name is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// A variable or constant. The binding owns one reference.
    Value(ValueId),
    /// A type alias.
    Type(TypeId),
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    orphans: Vec<ScopeId>,
    orphaned: bool,
    symbols: AHashMap<StrId, Symbol>,
}

/// Owns the whole scope tree.
#[derive(Debug)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeArena {
    /// Creates the arena with the global scope in place.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                children: Vec::new(),
                orphans: Vec::new(),
                orphaned: false,
                symbols: AHashMap::new(),
            }],
        }
    }

    fn push_scope(&mut self, parent: ScopeId, orphaned: bool) -> ScopeId {
        let id = ScopeId(self.scopes.len().try_into().expect("ScopeId overflow"));
        self.scopes.push(Scope {
            parent: Some(parent),
            children: Vec::new(),
            orphans: Vec::new(),
            orphaned,
            symbols: AHashMap::new(),
        });
        if orphaned {
            self.scopes[parent.index()].orphans.push(id);
        } else {
            self.scopes[parent.index()].children.push(id);
        }
        id
    }

    /// Creates an ordinary child scope for a lexical block.
    pub fn new_child(&mut self, parent: ScopeId) -> ScopeId {
        self.push_scope(parent, false)
    }

    /// Creates an orphaned child scope, the first scope of a function or
    /// class body.
    pub fn new_orphaned_child(&mut self, parent: ScopeId) -> ScopeId {
        self.push_scope(parent, true)
    }

    #[must_use]
    pub fn is_orphaned(&self, id: ScopeId) -> bool {
        self.scopes[id.index()].orphaned
    }

    #[must_use]
    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scopes[id.index()].parent
    }

    #[must_use]
    pub fn is_global(&self, id: ScopeId) -> bool {
        self.scopes[id.index()].parent.is_none()
    }

    /// Ordinary children of a scope. Orphaned children are deliberately not
    /// part of this list.
    #[must_use]
    pub fn children(&self, id: ScopeId) -> &[ScopeId] {
        &self.scopes[id.index()].children
    }

    /// Binds a value to an interned name. The binding takes ownership of
    /// one reference to the value (the caller's reference transfers).
    /// Returns the previously bound symbol so the caller can release a
    /// shadowed value binding.
    pub fn bind_value(&mut self, scope: ScopeId, name: StrId, value: ValueId) -> Option<Symbol> {
        self.scopes[scope.index()].symbols.insert(name, Symbol::Value(value))
    }

    /// Binds a type to an interned name.
    pub fn bind_type(&mut self, scope: ScopeId, name: StrId, ty: TypeId) -> Option<Symbol> {
        self.scopes[scope.index()].symbols.insert(name, Symbol::Type(ty))
    }

    /// Resolves a name in the given scope only.
    #[must_use]
    pub fn get_local_sym(&self, scope: ScopeId, name: StrId) -> Option<Symbol> {
        self.scopes[scope.index()].symbols.get(&name).copied()
    }

    /// Resolves a name by walking parent links up to the global scope.
    ///
    /// The orphan flag never blocks this walk: it only affects how a
    /// parent's *children* are traversed, not a scope's own lookups.
    #[must_use]
    pub fn get_sym(&self, scope: ScopeId, name: StrId) -> Option<Symbol> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(sym) = self.get_local_sym(id, name) {
                return Some(sym);
            }
            current = self.parent(id);
        }
        None
    }

    /// Resolves a name to a bound value, walking parents.
    #[must_use]
    pub fn get_value(&self, scope: ScopeId, name: StrId) -> Option<ValueId> {
        match self.get_sym(scope, name) {
            Some(Symbol::Value(id)) => Some(id),
            _ => None,
        }
    }

    /// Resolves a name to a bound type, walking parents.
    #[must_use]
    pub fn get_type(&self, scope: ScopeId, name: StrId) -> Option<TypeId> {
        match self.get_sym(scope, name) {
            Some(Symbol::Type(id)) => Some(id),
            _ => None,
        }
    }

    /// Releases every value binding in every scope. Call once on teardown,
    /// before the pool is inspected or dropped.
    pub fn release_all(&mut self, pool: &mut ValuePool) {
        for scope in &mut self.scopes {
            for (_, symbol) in scope.symbols.drain() {
                if let Symbol::Value(id) = symbol {
                    pool.dec_ref(id);
                }
            }
        }
    }
}
