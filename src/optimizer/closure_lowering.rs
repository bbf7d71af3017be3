//! Pass L: closure lowering.
//!
//! Every `Closure` value becomes a `TupleLiteral` of the same
//! environment elements, every `ClosureAccess` becomes a `TupleAccess`,
//! and every `Closure` type that appears in any type position is
//! rewritten to the corresponding tuple type. Expression topology is
//! otherwise untouched — this pass rewrites each function's arena
//! node-for-node, so `ExprId`s are stable across it.

use std::collections::HashMap;

use crate::diagnostics::CoreResult;
use crate::interner::{Interner, StructHandle, EnumHandle, Type, TypeKind};
use crate::ir::{ExprKind, Function, Program};

use super::Pass;

pub struct ClosureLowering;

impl Pass for ClosureLowering {
    fn name(&self) -> &'static str {
        "closure-lowering"
    }

    fn run(&self, interner: &Interner, program: Program) -> CoreResult<Program> {
        let mut memo = HashMap::new();
        let functions = program
            .functions
            .into_iter()
            .map(|f| lower_function(interner, &mut memo, f))
            .collect();
        Ok(Program { functions })
    }
}

fn lower_function(interner: &Interner, memo: &mut HashMap<Type, Type>, mut f: Function) -> Function {
    f.argument_types = f.argument_types.iter().map(|t| rewrite_type(interner, memo, *t)).collect();
    f.return_type = f.return_type.map(|t| rewrite_type(interner, memo, t));
    for node in &mut f.arena {
        node.ty = rewrite_type(interner, memo, node.ty);
        if let ExprKind::Closure(elements) = &node.kind {
            node.kind = ExprKind::TupleLiteral(elements.clone());
        } else if let ExprKind::ClosureAccess { closure, index } = &node.kind {
            node.kind = ExprKind::TupleAccess { tuple: *closure, index: *index };
        }
    }
    f
}

/// Rewrites `ty`, replacing every nested `Closure` type with a `Tuple`
/// of its rewritten environment. Memoized on the *input* type, with the
/// memo entry for a fresh struct/enum inserted before its fields are
/// recursively rewritten, so a type reachable from its own field
/// (through a `Reference`) resolves to the in-progress handle instead
/// of recursing forever.
fn rewrite_type(interner: &Interner, memo: &mut HashMap<Type, Type>, ty: Type) -> Type {
    if let Some(done) = memo.get(&ty) {
        return *done;
    }
    match interner.kind(ty) {
        TypeKind::Int | TypeKind::Void | TypeKind::String | TypeKind::StringIterator => ty,
        TypeKind::Array(elem) => {
            let elem = rewrite_type(interner, memo, elem);
            let rewritten = interner.array(elem);
            memo.insert(ty, rewritten);
            rewritten
        }
        TypeKind::Tuple(elems) => {
            let elems = elems.into_iter().map(|e| rewrite_type(interner, memo, e)).collect();
            let rewritten = interner.tuple(elems);
            memo.insert(ty, rewritten);
            rewritten
        }
        TypeKind::Reference(inner) => {
            let inner = rewrite_type(interner, memo, inner);
            let rewritten = interner.reference(inner);
            memo.insert(ty, rewritten);
            rewritten
        }
        TypeKind::TypeOfType(inner) => {
            let inner = rewrite_type(interner, memo, inner);
            let rewritten = interner.type_of(inner);
            memo.insert(ty, rewritten);
            rewritten
        }
        TypeKind::Closure(_, env) => {
            // Insert a placeholder first: a closure whose own environment
            // recursively contains its own type (only reachable through a
            // `Reference`, since direct self-containment has no finite size)
            // must see this tuple handle, not recurse into `rewrite_type` again.
            let placeholder = interner.tuple(Vec::new());
            memo.insert(ty, placeholder);
            let env: Vec<Type> = env.into_iter().map(|e| rewrite_type(interner, memo, e)).collect();
            let rewritten = interner.tuple(env);
            memo.insert(ty, rewritten);
            rewritten
        }
        TypeKind::Struct(_) => {
            let handle: StructHandle = interner.fresh_struct();
            memo.insert(ty, handle.0);
            let fields = interner
                .struct_fields(ty)
                .into_iter()
                .map(|(n, t)| (n, rewrite_type(interner, memo, t)))
                .collect();
            interner.set_struct_fields(handle, fields);
            handle.0
        }
        TypeKind::Enum(_) => {
            let handle: EnumHandle = interner.fresh_enum();
            memo.insert(ty, handle.0);
            let cases = interner
                .enum_cases(ty)
                .into_iter()
                .map(|(n, t)| (n, rewrite_type(interner, memo, t)))
                .collect();
            interner.set_enum_cases(handle, cases);
            handle.0
        }
    }
}
