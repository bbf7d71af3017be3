//! Pass D: dead-code elimination.
//!
//! Per function, a live set is computed by transitively marking from
//! the entry block's last expression; whenever marking passes through
//! an `If`/`Switch`, each branch's own last expression becomes an
//! additional root, recursively. Only live expressions survive into
//! the rebuilt blocks, in their original relative order. `Argument`
//! and `CaseVariable` nodes are kept unconditionally even when
//! unreachable — unused arguments are a deliberate non-goal here.

use std::collections::{HashMap, HashSet};

use log::trace;

use crate::diagnostics::CoreResult;
use crate::ir::{Block, ExprId, ExprKind, ExprNode, Function, Program};

use super::Pass;

pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn run(&self, _interner: &crate::interner::Interner, program: Program) -> CoreResult<Program> {
        let functions = program.functions.into_iter().map(sweep_function).collect();
        Ok(Program { functions })
    }
}

fn sweep_function(f: Function) -> Function {
    let mut live = HashSet::new();
    mark_block(&f, &mut live, &f.entry);

    let mut new_arena = Vec::new();
    let mut remap = HashMap::new();
    let entry = rebuild_block(&f, &live, &mut remap, &mut new_arena, &f.entry);

    trace!("{}: {} -> {} expressions live", f.name.as_deref().unwrap_or("<anonymous>"), f.arena.len(), new_arena.len());

    Function {
        argument_types: f.argument_types,
        return_type: f.return_type,
        arena: new_arena,
        entry,
        tail_calls: HashSet::new(),
        has_tail_call: false,
        name: f.name,
    }
}

fn keep_unconditionally(kind: &ExprKind) -> bool {
    matches!(kind, ExprKind::Argument(_) | ExprKind::CaseVariable)
}

/// Marks `block`'s last expression (if any) as a root and transitively
/// marks everything it references.
fn mark_block(f: &Function, live: &mut HashSet<ExprId>, block: &Block) {
    if let Some(&last) = block.last() {
        mark(f, live, last);
    }
}

fn mark(f: &Function, live: &mut HashSet<ExprId>, id: ExprId) {
    if !live.insert(id) {
        return;
    }
    match &f.node(id).kind {
        ExprKind::IntLiteral(_)
        | ExprKind::VoidLiteral
        | ExprKind::StringLiteral(_)
        | ExprKind::TypeLiteral(_)
        | ExprKind::Argument(_)
        | ExprKind::CaseVariable => {}
        ExprKind::ArrayLiteral(es) | ExprKind::TupleLiteral(es) | ExprKind::Closure(es) => {
            for &e in es {
                mark(f, live, e);
            }
        }
        ExprKind::StructLiteral(fields) => {
            for (_, e) in fields {
                mark(f, live, *e);
            }
        }
        ExprKind::EnumLiteral { payload, .. } => mark(f, live, *payload),
        ExprKind::Binary { left, right, .. } => {
            mark(f, live, *left);
            mark(f, live, *right);
        }
        ExprKind::If { condition, then_block, else_block } => {
            mark(f, live, *condition);
            mark_block(f, live, then_block);
            mark_block(f, live, else_block);
        }
        ExprKind::Switch { scrutinee, cases } => {
            mark(f, live, *scrutinee);
            for (_, block) in cases {
                mark_block(f, live, block);
            }
        }
        ExprKind::TupleAccess { tuple, .. } => mark(f, live, *tuple),
        ExprKind::StructAccess { object, .. } => mark(f, live, *object),
        ExprKind::ClosureAccess { closure, .. } => mark(f, live, *closure),
        ExprKind::Call { arguments, .. } | ExprKind::Intrinsic { arguments, .. } => {
            for &a in arguments {
                mark(f, live, a);
            }
        }
        ExprKind::Bind { left, right } => {
            mark(f, live, *left);
            mark(f, live, *right);
        }
        ExprKind::Return(e) => mark(f, live, *e),
    }
}

fn rebuild_block(
    f: &Function,
    live: &HashSet<ExprId>,
    remap: &mut HashMap<ExprId, ExprId>,
    new_arena: &mut Vec<ExprNode>,
    block: &Block,
) -> Block {
    let mut out = Vec::new();
    for &id in block {
        let node = f.node(id);
        if !live.contains(&id) && !keep_unconditionally(&node.kind) {
            continue;
        }
        let kind = rebuild_kind(f, live, remap, new_arena, &node.kind);
        let new_id = ExprId(new_arena.len() as u32);
        new_arena.push(ExprNode { kind, ty: node.ty, span: node.span.clone() });
        remap.insert(id, new_id);
        out.push(new_id);
    }
    out
}

fn rebuild_kind(
    f: &Function,
    live: &HashSet<ExprId>,
    remap: &mut HashMap<ExprId, ExprId>,
    new_arena: &mut Vec<ExprNode>,
    kind: &ExprKind,
) -> ExprKind {
    let r = |remap: &HashMap<ExprId, ExprId>, id: ExprId| remap[&id];
    match kind {
        ExprKind::IntLiteral(v) => ExprKind::IntLiteral(*v),
        ExprKind::VoidLiteral => ExprKind::VoidLiteral,
        ExprKind::StringLiteral(bytes) => ExprKind::StringLiteral(bytes.clone()),
        ExprKind::TypeLiteral(t) => ExprKind::TypeLiteral(*t),
        ExprKind::Argument(i) => ExprKind::Argument(*i),
        ExprKind::CaseVariable => ExprKind::CaseVariable,
        ExprKind::ArrayLiteral(es) => ExprKind::ArrayLiteral(es.iter().map(|e| r(remap, *e)).collect()),
        ExprKind::TupleLiteral(es) => ExprKind::TupleLiteral(es.iter().map(|e| r(remap, *e)).collect()),
        ExprKind::Closure(es) => ExprKind::Closure(es.iter().map(|e| r(remap, *e)).collect()),
        ExprKind::StructLiteral(fields) => {
            ExprKind::StructLiteral(fields.iter().map(|(n, e)| (n.clone(), r(remap, *e))).collect())
        }
        ExprKind::EnumLiteral { payload, case_index } => {
            ExprKind::EnumLiteral { payload: r(remap, *payload), case_index: *case_index }
        }
        ExprKind::Binary { op, left, right } => {
            ExprKind::Binary { op: *op, left: r(remap, *left), right: r(remap, *right) }
        }
        ExprKind::If { condition, then_block, else_block } => ExprKind::If {
            condition: r(remap, *condition),
            then_block: rebuild_block(f, live, remap, new_arena, then_block),
            else_block: rebuild_block(f, live, remap, new_arena, else_block),
        },
        ExprKind::Switch { scrutinee, cases } => ExprKind::Switch {
            scrutinee: r(remap, *scrutinee),
            cases: cases
                .iter()
                .map(|(name, block)| (name.clone(), rebuild_block(f, live, remap, new_arena, block)))
                .collect(),
        },
        ExprKind::TupleAccess { tuple, index } => ExprKind::TupleAccess { tuple: r(remap, *tuple), index: *index },
        ExprKind::StructAccess { object, field } => {
            ExprKind::StructAccess { object: r(remap, *object), field: field.clone() }
        }
        ExprKind::ClosureAccess { closure, index } => {
            ExprKind::ClosureAccess { closure: r(remap, *closure), index: *index }
        }
        ExprKind::Call { function, arguments } => {
            ExprKind::Call { function: *function, arguments: arguments.iter().map(|e| r(remap, *e)).collect() }
        }
        ExprKind::Intrinsic { name, arguments } => {
            ExprKind::Intrinsic { name: *name, arguments: arguments.iter().map(|e| r(remap, *e)).collect() }
        }
        ExprKind::Bind { left, right } => ExprKind::Bind { left: r(remap, *left), right: r(remap, *right) },
        ExprKind::Return(e) => ExprKind::Return(r(remap, *e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Span;
    use crate::interner::Interner;

    #[test]
    fn drops_unreferenced_non_last_expression() {
        let interner = Interner::new();
        let mut f = Function::new(vec![], Some(interner.int()));
        let dead = f.push(ExprKind::IntLiteral(1), interner.int(), Span::dummy());
        let live = f.push(ExprKind::IntLiteral(2), interner.int(), Span::dummy());
        f.entry = vec![dead, live];

        let program = Program { functions: vec![f] };
        let out = DeadCodeElimination.run(&interner, program).unwrap();
        let f = &out.functions[0];
        assert_eq!(f.entry.len(), 1);
        assert!(matches!(f.node(f.entry[0]).kind, ExprKind::IntLiteral(2)));
    }

    #[test]
    fn keeps_branch_last_expressions_as_roots() {
        let interner = Interner::new();
        let mut f = Function::new(vec![], Some(interner.int()));
        let cond = f.push(ExprKind::IntLiteral(1), interner.int(), Span::dummy());
        let then_val = f.push(ExprKind::IntLiteral(2), interner.int(), Span::dummy());
        let else_val = f.push(ExprKind::IntLiteral(3), interner.int(), Span::dummy());
        let branch = f.push(
            ExprKind::If { condition: cond, then_block: vec![then_val], else_block: vec![else_val] },
            interner.int(),
            Span::dummy(),
        );
        f.entry = vec![branch];

        let program = Program { functions: vec![f] };
        let out = DeadCodeElimination.run(&interner, program).unwrap();
        let f = &out.functions[0];
        assert_eq!(f.entry.len(), 1);
        match &f.node(f.entry[0]).kind {
            ExprKind::If { then_block, else_block, .. } => {
                assert_eq!(then_block.len(), 1);
                assert_eq!(else_block.len(), 1);
            }
            other => panic!("expected If, got {other:?}"),
        }
    }

    #[test]
    fn keeps_unreferenced_argument() {
        let interner = Interner::new();
        let mut f = Function::new(vec![interner.int()], Some(interner.int()));
        let arg = f.push(ExprKind::Argument(0), interner.int(), Span::dummy());
        let result = f.push(ExprKind::IntLiteral(9), interner.int(), Span::dummy());
        f.entry = vec![arg, result];

        let program = Program { functions: vec![f] };
        let out = DeadCodeElimination.run(&interner, program).unwrap();
        assert_eq!(out.functions[0].entry.len(), 2);
    }
}
