//! The semantic data model: [`Kind`]/[`Type`], [`Class`], [`Method`].
//! Immutable once the symbol table is frozen at the end of the symbol
//! builder stage (see `crate::symtab`).

use indexmap::IndexMap;

use crate::symbol::Symbol;
use crate::types::idx::mk_idx;

mk_idx! {
    /// A class, indexed into the arena owned by the `SymbolTable`.
    #[derive(Debug)]
    pub struct ClassId;
}

mk_idx! {
    /// A method, indexed into the arena owned by its declaring `Class`.
    #[derive(Debug)]
    pub struct MethodId;
}

/// The closed set of value shapes in MiniJava.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Int,
    Boolean,
    IntArray,
    /// A reference to a user (or `Object`) class.
    Object(ClassId),
}

/// A `Kind` is the whole story for everything except `OBJECT`, which also
/// carries a class reference. Two `Type`s are the same newtype so call
/// sites don't need to match twice.
pub type Type = Kind;

impl Kind {
    /// Whether a value of type `rhs` may flow into a location of type
    /// `self` (assignment, argument passing). Directional: object
    /// compatibility only goes from a subclass up to a superclass, never
    /// sideways or down.
    #[must_use] pub fn compatible_with(self, rhs: Kind, classes: &Classes) -> bool {
        match (self, rhs) {
            (Kind::Int, Kind::Int) | (Kind::Boolean, Kind::Boolean) | (Kind::IntArray, Kind::IntArray) => true,
            (Kind::Object(lhs), Kind::Object(rhs)) => classes.is_subclass(rhs, lhs),
            _ => false,
        }
    }
}

/// A field or parameter/local declaration: a name plus its declared type,
/// in the order it was declared (order is load-bearing: it determines slot
/// numbers downstream).
pub type Members = IndexMap<Symbol, Type>;

/// A class: its own fields and methods, plus an optional superclass link.
/// Field and method insertion order is preserved since later stages derive
/// offsets and vtable slots from it.
#[derive(Debug)]
pub struct Class {
    pub name: Symbol,
    pub superclass: Option<ClassId>,
    pub fields: Members,
    pub methods: IndexMap<Symbol, Method>,
    /// Computed once the symbol table is frozen: own fields prefixed by
    /// every inherited field, outermost ancestor first. Cached here so
    /// later stages don't re-walk the inheritance chain per lookup.
    pub field_layout: Vec<Symbol>,
    /// Computed once frozen: the vtable layout, root to leaf, with
    /// overridden method names keeping their ancestor's slot.
    pub method_layout: Vec<Symbol>,
}

impl Class {
    pub(crate) fn new(name: Symbol, superclass: Option<ClassId>) -> Self {
        Self {
            name,
            superclass,
            fields: Members::new(),
            methods: IndexMap::new(),
            field_layout: Vec::new(),
            method_layout: Vec::new(),
        }
    }

    /// The word-offset of field `f` within an instance of this class
    /// (header word holding the vtable pointer is offset 0; fields start
    /// at offset 1).
    #[must_use] pub fn field_offset(&self, f: Symbol) -> Option<usize> {
        self.field_layout.iter().position(|&n| n == f).map(|i| i + 1)
    }

    /// The vtable slot of method `m` for this class.
    #[must_use] pub fn method_slot(&self, m: Symbol) -> Option<usize> {
        self.method_layout.iter().position(|&n| n == m)
    }

    /// Total instance size in words, including the header word.
    #[must_use] pub fn instance_size(&self) -> usize { self.field_layout.len() + 1 }
}

/// A method: parameters and locals share one namespace for lookup purposes
/// (a parameter may not be shadowed by a local of the same name), but are
/// stored separately because parameter order is also the ABI slot order.
#[derive(Debug)]
pub struct Method {
    pub name: Symbol,
    pub owner: ClassId,
    pub params: Members,
    pub locals: Members,
    pub ret: Type,
}

impl Method {
    #[must_use] pub fn new(name: Symbol, owner: ClassId, ret: Type) -> Self {
        Self { name, owner, params: Members::new(), locals: Members::new(), ret }
    }

    /// The zero-based slot of `id` among `this, param1, param2, ..., local1,
    /// ...` — `this` occupies slot 0, so parameter `k` (1-based in source
    /// order) sits at slot `k`.
    #[must_use] pub fn var_slot(&self, id: Symbol) -> Option<usize> {
        if let Some(i) = self.params.get_index_of(&id) {
            return Some(i + 1);
        }
        self.locals.get_index_of(&id).map(|i| i + 1 + self.params.len())
    }

    #[must_use] pub fn qualified_name(&self, classes: &Classes) -> String {
        format!("{}.{}", classes[self.owner].name, self.name)
    }
}

/// The arena of classes built by the symbol builder, plus the well-known
/// `Object` root. Lives inside `SymbolTable`.
#[derive(Debug, Default)]
pub struct Classes {
    arena: crate::types::idx::IdxVec<ClassId, Class>,
    by_name: IndexMap<Symbol, ClassId>,
}

impl Classes {
    #[must_use] pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, class: Class) -> ClassId {
        let name = class.name;
        let id = self.arena.push(class);
        self.by_name.insert(name, id);
        id
    }

    #[must_use] pub fn get(&self, name: Symbol) -> Option<ClassId> { self.by_name.get(&name).copied() }

    #[must_use] pub fn len(&self) -> usize { self.arena.len() }
    #[must_use] pub fn is_empty(&self) -> bool { self.arena.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &Class)> { self.arena.iter_enum() }

    /// Walk from `start` to the root, inclusive, yielding `ClassId`s leaf
    /// first.
    pub fn ancestry(&self, start: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        let mut cur = Some(start);
        std::iter::from_fn(move || {
            let c = cur?;
            cur = self[c].superclass;
            Some(c)
        })
    }

    /// Whether `sub` is `base` or a transitive subclass of `base`.
    #[must_use] pub fn is_subclass(&self, sub: ClassId, base: ClassId) -> bool {
        self.ancestry(sub).any(|c| c == base)
    }

    /// Search `start`'s own fields, then recursively up the chain.
    #[must_use] pub fn has_any_var(&self, start: ClassId, name: Symbol) -> Option<Type> {
        self.ancestry(start).find_map(|c| self[c].fields.get(&name).copied())
    }

    /// Search `start`'s own methods, then recursively up the chain.
    #[must_use] pub fn get_any_method(&self, start: ClassId, name: Symbol) -> Option<(ClassId, MethodId)> {
        self.ancestry(start).find_map(|c| {
            self[c].methods.get_index_of(&name).map(|i| (c, MethodId::from_usize(i)))
        })
    }

    /// Resolve a `(ClassId, MethodId)` pair, as returned by `get_any_method`,
    /// back to the `Method`.
    #[must_use] pub fn method(&self, class: ClassId, method: MethodId) -> &Method {
        self[class].methods.get_index(method.into_usize()).expect("stale MethodId").1
    }
}

use crate::types::idx::Idx;

impl std::ops::Index<ClassId> for Classes {
    type Output = Class;
    fn index(&self, id: ClassId) -> &Class { &self.arena[id] }
}

impl std::ops::IndexMut<ClassId> for Classes {
    fn index_mut(&mut self, id: ClassId) -> &mut Class { &mut self.arena[id] }
}
