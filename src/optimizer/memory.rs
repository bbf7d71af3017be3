//! Pass M: memory management.
//!
//! Inserts `copy`/`free` intrinsics so every managed value (`Struct`,
//! `Enum`, `Tuple`, `Array`, `String`, `StringIterator`, `Reference`)
//! is consumed exactly once. At each point a managed value is read,
//! [`has_later_use`] conservatively asks whether any expression
//! reachable afterwards — along the actual control-flow continuation,
//! not sibling branches that can't both run — still needs it; if so
//! the read is wrapped in `copy`, otherwise ownership transfers
//! unchanged. `TupleAccess`/`StructAccess` always copy their result and
//! free their container on its final read; borrowing intrinsics
//! (`putStr`, `arrayGet`, `arrayLength`, `stringIteratorIsValid`,
//! `stringIteratorGet`) free their argument on its final read instead
//! of consuming it outright, and `arrayGet` additionally copies its
//! result. Unused managed `Argument`s and `CaseVariable`s are freed at
//! their definition.
//!
//! Simplification: branch reconciliation (Pass M-2's explicit
//! free-on-non-consuming-arm bookkeeping) is folded into the same
//! conservative `has_later_use` query rather than tracked as a
//! separate per-branch free list; this is sound (never frees a value
//! still reachable) but can insert a copy in some branches where the
//! exact scheme from the two-pass algorithm would have allowed a
//! move.

use crate::diagnostics::CoreResult;
use crate::interner::{Interner, Type, TypeKind};
use crate::ir::{Block, ExprId, ExprKind, ExprNode, Function, IntrinsicName, Program};
use crate::diagnostics::Span;
use std::collections::HashMap;

use super::Pass;

pub struct MemoryManagement;

impl Pass for MemoryManagement {
    fn name(&self) -> &'static str {
        "memory-management"
    }

    fn run(&self, interner: &Interner, program: Program) -> CoreResult<Program> {
        let functions = program.functions.into_iter().map(|f| rewrite_function(interner, &f)).collect();
        Ok(Program { functions })
    }
}

fn is_managed(interner: &Interner, ty: Type) -> bool {
    matches!(
        interner.kind(ty),
        TypeKind::Struct(_)
            | TypeKind::Enum(_)
            | TypeKind::Tuple(_)
            | TypeKind::Array(_)
            | TypeKind::String
            | TypeKind::StringIterator
            | TypeKind::Reference(_)
    )
}

fn mentions(f: &Function, id: ExprId, target: ExprId) -> bool {
    let direct = match &f.node(id).kind {
        ExprKind::Binary { left, right, .. } => *left == target || *right == target,
        ExprKind::TupleAccess { tuple, .. } => *tuple == target,
        ExprKind::StructAccess { object, .. } => *object == target,
        ExprKind::ClosureAccess { closure, .. } => *closure == target,
        ExprKind::Call { arguments, .. } | ExprKind::Intrinsic { arguments, .. } => arguments.contains(&target),
        ExprKind::ArrayLiteral(es) | ExprKind::TupleLiteral(es) | ExprKind::Closure(es) => es.contains(&target),
        ExprKind::StructLiteral(fields) => fields.iter().any(|(_, e)| *e == target),
        ExprKind::EnumLiteral { payload, .. } => *payload == target,
        ExprKind::Bind { left, right } => *left == target || *right == target,
        ExprKind::Return(e) => *e == target,
        ExprKind::If { condition, .. } => *condition == target,
        ExprKind::Switch { scrutinee, .. } => *scrutinee == target,
        _ => false,
    };
    if direct {
        return true;
    }
    match &f.node(id).kind {
        ExprKind::If { then_block, else_block, .. } => {
            occurs_in_block(f, then_block, target) || occurs_in_block(f, else_block, target)
        }
        ExprKind::Switch { cases, .. } => cases.iter().any(|(_, b)| occurs_in_block(f, b, target)),
        _ => false,
    }
}

fn occurs_in_block(f: &Function, block: &[ExprId], target: ExprId) -> bool {
    block.iter().any(|&id| mentions(f, id, target))
}

/// Conservative "is `target` still needed after this point" query: true
/// if it occurs anywhere in any of `rest`'s block-suffixes, which
/// together describe every reachable continuation from here (the rest
/// of the current block, then the rest of each enclosing block, up to
/// function exit).
fn has_later_use(f: &Function, target: ExprId, rest: &[&[ExprId]]) -> bool {
    rest.iter().any(|suffix| occurs_in_block(f, suffix, target))
}

fn rewrite_function(interner: &Interner, f: &Function) -> Function {
    let mut arena = Vec::new();
    let mut remap = HashMap::new();
    let mut entry = Vec::new();
    rewrite_block(interner, f, &f.entry, &[], &mut remap, &mut arena, &mut entry);
    Function {
        argument_types: f.argument_types.clone(),
        return_type: f.return_type,
        arena,
        entry,
        tail_calls: Default::default(),
        has_tail_call: false,
        name: f.name.clone(),
    }
}

fn rewrite_block(
    interner: &Interner,
    f: &Function,
    block: &Block,
    rest: &[&[ExprId]],
    remap: &mut HashMap<ExprId, ExprId>,
    arena: &mut Vec<ExprNode>,
    out: &mut Block,
) {
    for (i, &id) in block.iter().enumerate() {
        let mut my_rest = Vec::with_capacity(rest.len() + 1);
        my_rest.push(&block[i + 1..]);
        my_rest.extend_from_slice(rest);

        let new_id = rewrite_statement(interner, f, id, &my_rest, remap, arena, out);
        out.push(new_id);

        let node = f.node(id);
        if matches!(node.kind, ExprKind::Argument(_) | ExprKind::CaseVariable)
            && is_managed(interner, node.ty)
            && !has_later_use(f, id, &my_rest)
        {
            push_free(interner, arena, out, new_id);
        }
    }
}

fn push_copy(arena: &mut Vec<ExprNode>, out: &mut Block, arg: ExprId, ty: Type) -> ExprId {
    let new_id = ExprId(arena.len() as u32);
    arena.push(ExprNode {
        kind: ExprKind::Intrinsic { name: IntrinsicName::Copy, arguments: vec![arg] },
        ty,
        span: Span::dummy(),
    });
    out.push(new_id);
    new_id
}

fn push_free(interner: &Interner, arena: &mut Vec<ExprNode>, out: &mut Block, arg: ExprId) {
    let new_id = ExprId(arena.len() as u32);
    arena.push(ExprNode {
        kind: ExprKind::Intrinsic { name: IntrinsicName::Free, arguments: vec![arg] },
        ty: interner.void(),
        span: Span::dummy(),
    });
    out.push(new_id);
}

/// Resolves an already-processed operand (every reference in this IR
/// points at an earlier statement, already visited by `rewrite_block`'s
/// program-order walk) and wraps it in `copy` unless this is its final
/// use along the current continuation.
fn consume(
    interner: &Interner,
    f: &Function,
    id: ExprId,
    rest: &[&[ExprId]],
    remap: &HashMap<ExprId, ExprId>,
    arena: &mut Vec<ExprNode>,
    out: &mut Block,
) -> ExprId {
    let base = remap[&id];
    let ty = f.node(id).ty;
    if !is_managed(interner, ty) {
        return base;
    }
    if has_later_use(f, id, rest) {
        push_copy(arena, out, base, ty)
    } else {
        base
    }
}

fn rewrite_statement(
    interner: &Interner,
    f: &Function,
    id: ExprId,
    rest: &[&[ExprId]],
    remap: &mut HashMap<ExprId, ExprId>,
    arena: &mut Vec<ExprNode>,
    out: &mut Block,
) -> ExprId {
    if let Some(&done) = remap.get(&id) {
        return done;
    }
    let node = f.node(id).clone();

    macro_rules! consume {
        ($child:expr) => {
            consume(interner, f, $child, rest, remap, arena, out)
        };
    }

    let kind = match &node.kind {
        ExprKind::IntLiteral(v) => ExprKind::IntLiteral(*v),
        ExprKind::VoidLiteral => ExprKind::VoidLiteral,
        ExprKind::StringLiteral(b) => ExprKind::StringLiteral(b.clone()),
        ExprKind::TypeLiteral(t) => ExprKind::TypeLiteral(*t),
        ExprKind::Argument(i) => ExprKind::Argument(*i),
        ExprKind::CaseVariable => ExprKind::CaseVariable,
        ExprKind::ArrayLiteral(es) => ExprKind::ArrayLiteral(es.iter().map(|e| consume!(*e)).collect()),
        ExprKind::TupleLiteral(es) => ExprKind::TupleLiteral(es.iter().map(|e| consume!(*e)).collect()),
        ExprKind::Closure(es) => ExprKind::Closure(es.iter().map(|e| consume!(*e)).collect()),
        ExprKind::StructLiteral(fields) => {
            ExprKind::StructLiteral(fields.iter().map(|(n, e)| (n.clone(), consume!(*e))).collect())
        }
        ExprKind::EnumLiteral { payload, case_index } => {
            ExprKind::EnumLiteral { payload: consume!(*payload), case_index: *case_index }
        }
        ExprKind::Binary { op, left, right } => {
            ExprKind::Binary { op: *op, left: consume!(*left), right: consume!(*right) }
        }
        ExprKind::If { condition, then_block, else_block } => {
            let condition = consume!(*condition);
            let mut new_then = Vec::new();
            rewrite_block(interner, f, then_block, rest, remap, arena, &mut new_then);
            let mut new_else = Vec::new();
            rewrite_block(interner, f, else_block, rest, remap, arena, &mut new_else);
            ExprKind::If { condition, then_block: new_then, else_block: new_else }
        }
        ExprKind::Switch { scrutinee, cases } => {
            let scrutinee = consume!(*scrutinee);
            let cases = cases
                .iter()
                .map(|(name, block)| {
                    let mut new_block = Vec::new();
                    rewrite_block(interner, f, block, rest, remap, arena, &mut new_block);
                    (name.clone(), new_block)
                })
                .collect();
            ExprKind::Switch { scrutinee, cases }
        }
        ExprKind::Bind { left, right } => ExprKind::Bind { left: consume!(*left), right: consume!(*right) },
        ExprKind::Return(e) => {
            // A `Return` ends the whole function: nothing past it, in
            // any enclosing block, ever runs, so its operand always
            // transfers.
            let e2 = consume(interner, f, *e, &[], remap, arena, out);
            ExprKind::Return(e2)
        }
        ExprKind::TupleAccess { tuple, index } => {
            let index = *index;
            let container = remap[tuple];
            let elem_ty = node.ty;
            let access_id = ExprId(arena.len() as u32);
            arena.push(ExprNode {
                kind: ExprKind::TupleAccess { tuple: container, index },
                ty: elem_ty,
                span: node.span.clone(),
            });
            out.push(access_id);
            let result_id =
                if is_managed(interner, elem_ty) { push_copy(arena, out, access_id, elem_ty) } else { access_id };
            if is_managed(interner, f.node(*tuple).ty) && !has_later_use(f, *tuple, rest) {
                push_free(interner, arena, out, container);
            }
            remap.insert(id, result_id);
            return result_id;
        }
        ExprKind::StructAccess { object, field } => {
            let field = field.clone();
            let container = remap[object];
            let elem_ty = node.ty;
            let access_id = ExprId(arena.len() as u32);
            arena.push(ExprNode {
                kind: ExprKind::StructAccess { object: container, field },
                ty: elem_ty,
                span: node.span.clone(),
            });
            out.push(access_id);
            let result_id =
                if is_managed(interner, elem_ty) { push_copy(arena, out, access_id, elem_ty) } else { access_id };
            if is_managed(interner, f.node(*object).ty) && !has_later_use(f, *object, rest) {
                push_free(interner, arena, out, container);
            }
            remap.insert(id, result_id);
            return result_id;
        }
        ExprKind::ClosureAccess { closure, index } => {
            // Eliminated by Pass L in the ordinary pipeline; kept only
            // so this match stays exhaustive if run standalone.
            ExprKind::ClosureAccess { closure: consume!(*closure), index: *index }
        }
        ExprKind::Call { function, arguments } => {
            ExprKind::Call { function: *function, arguments: arguments.iter().map(|a| consume!(*a)).collect() }
        }
        ExprKind::Intrinsic { name, arguments } => {
            let name = *name;
            if name.is_borrowing() {
                let bases: Vec<ExprId> = arguments.iter().map(|a| remap[a]).collect();
                let call_id = ExprId(arena.len() as u32);
                arena.push(ExprNode {
                    kind: ExprKind::Intrinsic { name, arguments: bases.clone() },
                    ty: node.ty,
                    span: node.span.clone(),
                });
                out.push(call_id);
                let result_id = if name == IntrinsicName::ArrayGet && is_managed(interner, node.ty) {
                    push_copy(arena, out, call_id, node.ty)
                } else {
                    call_id
                };
                for (orig, base) in arguments.iter().zip(bases.iter()) {
                    let arg_ty = f.node(*orig).ty;
                    if is_managed(interner, arg_ty) && !has_later_use(f, *orig, rest) {
                        push_free(interner, arena, out, *base);
                    }
                }
                remap.insert(id, result_id);
                return result_id;
            }
            ExprKind::Intrinsic { name, arguments: arguments.iter().map(|a| consume!(*a)).collect() }
        }
    };

    let new_id = ExprId(arena.len() as u32);
    arena.push(ExprNode { kind, ty: node.ty, span: node.span.clone() });
    remap.insert(id, new_id);
    new_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::Interner;

    #[test]
    fn frees_unused_case_variable() {
        let interner = Interner::new();
        let enum_handle = interner.fresh_enum();
        interner.set_enum_cases(enum_handle, vec![("A".into(), interner.int())]);

        let mut f = Function::new(vec![], Some(interner.int()));
        let case_var = f.push(ExprKind::CaseVariable, enum_handle.0, Span::dummy());
        let result = f.push(ExprKind::IntLiteral(1), interner.int(), Span::dummy());
        f.entry = vec![case_var, result];

        let program = Program { functions: vec![f] };
        let out = MemoryManagement.run(&interner, program).unwrap();
        let f = &out.functions[0];
        // case_var (kept) + its inserted free + result
        assert_eq!(f.entry.len(), 3);
        match &f.node(f.entry[1]).kind {
            ExprKind::Intrinsic { name: IntrinsicName::Free, .. } => {}
            other => panic!("expected an inserted free, got {other:?}"),
        }
    }

    #[test]
    fn copies_non_final_use() {
        let interner = Interner::new();
        let string = interner.string();
        let mut f = Function::new(vec![], Some(string));
        let s = f.push(ExprKind::StringLiteral(b"hi".to_vec()), string, Span::dummy());
        let first = f.push(
            ExprKind::Intrinsic { name: IntrinsicName::PutStr, arguments: vec![s] },
            interner.void(),
            Span::dummy(),
        );
        let second = f.push(
            ExprKind::Intrinsic { name: IntrinsicName::StringPush, arguments: vec![s, s] },
            string,
            Span::dummy(),
        );
        f.entry = vec![s, first, second];

        let program = Program { functions: vec![f] };
        let out = MemoryManagement.run(&interner, program).unwrap();
        let f = &out.functions[0];
        let has_copy = f.arena.iter().any(|n| matches!(n.kind, ExprKind::Intrinsic { name: IntrinsicName::Copy, .. }));
        assert!(has_copy, "expected a copy to be inserted for the non-final use");
    }
}
