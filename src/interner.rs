//! Hash-consing of structural types.
//!
//! `Type` is an arena index; two interned non-nominal types compare
//! equal iff they are the same index, because [`Interner::intern`]
//! always returns the existing handle for a structurally-equal
//! `TypeData`. `Struct`/`Enum` are nominal: every [`Interner::fresh_struct`]
//! / [`Interner::fresh_enum`] call allocates a brand-new arena slot that
//! is never deduplicated, even if its fields end up identical to
//! another struct's.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Opaque reference to a function, used only inside [`TypeData::Closure`].
/// The interner never dereferences it; identity and ordering are handled
/// by whichever pass owns the function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionRef(pub usize);

/// An interned type handle. Cheap to copy, compares by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct Type(u32);

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeData {
    Int,
    Void,
    String,
    StringIterator,
    Array(Type),
    Tuple(Vec<Type>),
    Struct(u32),
    Enum(u32),
    Closure(FunctionRef, Vec<Type>),
    Reference(Type),
    TypeOfType(Type),
}

/// Lifetime-of-the-compiler-invocation arena of [`TypeData`], shared by
/// every pass from its creation onward.
#[derive(Default)]
pub struct Interner {
    arena: RefCell<Vec<TypeData>>,
    structural: RefCell<HashMap<TypeData, Type>>,
    // Nominal field/case tables, indexed by the `u32` stashed in
    // `TypeData::Struct`/`TypeData::Enum`. Kept separate from `arena` so
    // that `set_struct_fields` can mutate a struct's fields after other
    // types have already been interned and without needing `RefCell`
    // borrows on `arena` itself to nest.
    struct_fields: RefCell<Vec<Option<Vec<(String, Type)>>>>,
    enum_cases: RefCell<Vec<Option<Vec<(String, Type)>>>>,
}

/// A struct type allocated but not yet populated with fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructHandle(pub Type, u32);

/// An enum type allocated but not yet populated with cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumHandle(pub Type, u32);

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&self, data: TypeData) -> Type {
        if let Some(ty) = self.structural.borrow().get(&data) {
            return *ty;
        }
        let mut arena = self.arena.borrow_mut();
        let ty = Type(arena.len() as u32);
        arena.push(data.clone());
        drop(arena);
        self.structural.borrow_mut().insert(data, ty);
        ty
    }

    pub fn int(&self) -> Type {
        self.intern(TypeData::Int)
    }
    pub fn void(&self) -> Type {
        self.intern(TypeData::Void)
    }
    pub fn string(&self) -> Type {
        self.intern(TypeData::String)
    }
    pub fn string_iterator(&self) -> Type {
        self.intern(TypeData::StringIterator)
    }
    pub fn array(&self, element: Type) -> Type {
        self.intern(TypeData::Array(element))
    }
    pub fn tuple(&self, elements: Vec<Type>) -> Type {
        self.intern(TypeData::Tuple(elements))
    }
    pub fn reference(&self, pointee: Type) -> Type {
        self.intern(TypeData::Reference(pointee))
    }
    pub fn type_of(&self, inner: Type) -> Type {
        self.intern(TypeData::TypeOfType(inner))
    }
    pub fn closure(&self, function: FunctionRef, environment: Vec<Type>) -> Type {
        self.intern(TypeData::Closure(function, environment))
    }

    pub fn fresh_struct(&self) -> StructHandle {
        let mut arena = self.arena.borrow_mut();
        let mut fields = self.struct_fields.borrow_mut();
        let id = fields.len() as u32;
        let ty = Type(arena.len() as u32);
        arena.push(TypeData::Struct(id));
        fields.push(None);
        StructHandle(ty, id)
    }

    pub fn fresh_enum(&self) -> EnumHandle {
        let mut arena = self.arena.borrow_mut();
        let mut cases = self.enum_cases.borrow_mut();
        let id = cases.len() as u32;
        let ty = Type(arena.len() as u32);
        arena.push(TypeData::Enum(id));
        cases.push(None);
        EnumHandle(ty, id)
    }

    pub fn set_struct_fields(&self, handle: StructHandle, fields: Vec<(String, Type)>) {
        self.struct_fields.borrow_mut()[handle.1 as usize] = Some(fields);
    }

    pub fn set_enum_cases(&self, handle: EnumHandle, cases: Vec<(String, Type)>) {
        self.enum_cases.borrow_mut()[handle.1 as usize] = Some(cases);
    }

    pub fn struct_fields(&self, ty: Type) -> Vec<(String, Type)> {
        match &self.arena.borrow()[ty.0 as usize] {
            TypeData::Struct(id) => self.struct_fields.borrow()[*id as usize]
                .clone()
                .unwrap_or_default(),
            _ => panic!("struct_fields called on a non-struct type"),
        }
    }

    pub fn enum_cases(&self, ty: Type) -> Vec<(String, Type)> {
        match &self.arena.borrow()[ty.0 as usize] {
            TypeData::Enum(id) => self.enum_cases.borrow()[*id as usize]
                .clone()
                .unwrap_or_default(),
            _ => panic!("enum_cases called on a non-enum type"),
        }
    }

    pub fn kind(&self, ty: Type) -> TypeKind {
        match &self.arena.borrow()[ty.0 as usize] {
            TypeData::Int => TypeKind::Int,
            TypeData::Void => TypeKind::Void,
            TypeData::String => TypeKind::String,
            TypeData::StringIterator => TypeKind::StringIterator,
            TypeData::Array(e) => TypeKind::Array(*e),
            TypeData::Tuple(es) => TypeKind::Tuple(es.clone()),
            TypeData::Struct(_) => TypeKind::Struct(ty),
            TypeData::Enum(_) => TypeKind::Enum(ty),
            TypeData::Closure(f, env) => TypeKind::Closure(*f, env.clone()),
            TypeData::Reference(p) => TypeKind::Reference(*p),
            TypeData::TypeOfType(i) => TypeKind::TypeOfType(*i),
        }
    }

    pub fn display(&self, ty: Type) -> String {
        match self.kind(ty) {
            TypeKind::Int => "Int".to_string(),
            TypeKind::Void => "Void".to_string(),
            TypeKind::String => "String".to_string(),
            TypeKind::StringIterator => "StringIterator".to_string(),
            TypeKind::Array(e) => format!("Array({})", self.display(e)),
            TypeKind::Tuple(es) => format!(
                "({})",
                es.iter().map(|t| self.display(*t)).collect::<Vec<_>>().join(", ")
            ),
            TypeKind::Struct(_) => {
                let fields = self.struct_fields(ty);
                format!(
                    "struct {{{}}}",
                    fields
                        .iter()
                        .map(|(n, t)| format!("{n}: {}", self.display(*t)))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            TypeKind::Enum(_) => {
                let cases = self.enum_cases(ty);
                format!(
                    "enum {{{}}}",
                    cases
                        .iter()
                        .map(|(n, t)| format!("{n}: {}", self.display(*t)))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            TypeKind::Closure(_, env) => format!(
                "closure[{}]",
                env.iter().map(|t| self.display(*t)).collect::<Vec<_>>().join(", ")
            ),
            TypeKind::Reference(p) => format!("&{}", self.display(p)),
            TypeKind::TypeOfType(i) => format!("type<{}>", self.display(i)),
        }
    }
}

/// Structural view of a [`Type`], cloned out for matching. Separate
/// from the private `TypeData` so callers never see the nominal `u32`
/// ids directly — struct/enum identity is the `Type` handle itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Int,
    Void,
    String,
    StringIterator,
    Array(Type),
    Tuple(Vec<Type>),
    Struct(Type),
    Enum(Type),
    Closure(FunctionRef, Vec<Type>),
    Reference(Type),
    TypeOfType(Type),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_types_are_deduplicated() {
        let interner = Interner::new();
        let a = interner.tuple(vec![interner.int(), interner.void()]);
        let b = interner.tuple(vec![interner.int(), interner.void()]);
        assert_eq!(a, b);
    }

    #[test]
    fn nominal_struct_types_never_collapse() {
        let interner = Interner::new();
        let a = interner.fresh_struct();
        let b = interner.fresh_struct();
        interner.set_struct_fields(a, vec![("x".into(), interner.int())]);
        interner.set_struct_fields(b, vec![("x".into(), interner.int())]);
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn atomic_types_are_singletons() {
        let interner = Interner::new();
        assert_eq!(interner.int(), interner.int());
        assert_ne!(interner.int(), interner.void());
    }

    #[test]
    fn array_of_array_interns_recursively() {
        let interner = Interner::new();
        let a = interner.array(interner.array(interner.int()));
        let b = interner.array(interner.array(interner.int()));
        assert_eq!(a, b);
    }
}
