//! Pass TC: tail-call marking.
//!
//! Walks only the syntactic tail positions of each function's body — a
//! block's last expression, both arms of an `If` that is itself in
//! tail position, every arm of a `Switch` that is itself in tail
//! position, and a `Return`'s operand — and records every self call
//! (a `Call` targeting the function's own index) found there into
//! [`Function::tail_calls`]. This mutates its input `Program` in
//! place rather than rebuilding one, so unlike the other passes it is
//! not a [`super::Pass`].

use crate::ir::{Block, ExprId, ExprKind, Function, Program};

pub struct TailCallMarking;

impl TailCallMarking {
    pub fn run(&self, program: &mut Program) {
        for idx in 0..program.functions.len() {
            mark_function(program, idx);
        }
    }
}

fn mark_function(program: &mut Program, idx: usize) {
    let mut found = Vec::new();
    {
        let f = &program.functions[idx];
        mark_block_tail(f, idx, &f.entry, &mut found);
    }
    let f = &mut program.functions[idx];
    f.has_tail_call = !found.is_empty();
    f.tail_calls = found.into_iter().collect();
}

fn mark_block_tail(f: &Function, self_idx: usize, block: &Block, found: &mut Vec<ExprId>) {
    if let Some(&last) = block.last() {
        mark_tail(f, self_idx, last, found);
    }
}

fn mark_tail(f: &Function, self_idx: usize, id: ExprId, found: &mut Vec<ExprId>) {
    match &f.node(id).kind {
        ExprKind::Call { function, .. } if *function == self_idx => found.push(id),
        ExprKind::If { then_block, else_block, .. } => {
            mark_block_tail(f, self_idx, then_block, found);
            mark_block_tail(f, self_idx, else_block, found);
        }
        ExprKind::Switch { cases, .. } => {
            for (_, block) in cases {
                mark_block_tail(f, self_idx, block, found);
            }
        }
        ExprKind::Return(e) => mark_tail(f, self_idx, *e, found),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Span;
    use crate::interner::Interner;

    #[test]
    fn marks_self_recursive_return() {
        let interner = Interner::new();
        let mut f = Function::new(vec![interner.int()], Some(interner.int()));
        let arg = f.push(ExprKind::Argument(0), interner.int(), Span::dummy());
        let call = f.push(ExprKind::Call { function: 0, arguments: vec![arg] }, interner.int(), Span::dummy());
        let ret = f.push(ExprKind::Return(call), interner.int(), Span::dummy());
        f.entry = vec![arg, call, ret];

        let mut program = Program { functions: vec![f] };
        TailCallMarking.run(&mut program);
        let f = &program.functions[0];
        assert!(f.has_tail_call);
        assert!(f.tail_calls.contains(&call));
    }

    #[test]
    fn does_not_mark_non_tail_call() {
        let interner = Interner::new();
        let mut f = Function::new(vec![interner.int()], Some(interner.int()));
        let arg = f.push(ExprKind::Argument(0), interner.int(), Span::dummy());
        let call = f.push(ExprKind::Call { function: 0, arguments: vec![arg] }, interner.int(), Span::dummy());
        let one = f.push(ExprKind::IntLiteral(1), interner.int(), Span::dummy());
        let plus = f.push(
            ExprKind::Binary { op: crate::ir::BinOp::Add, left: call, right: one },
            interner.int(),
            Span::dummy(),
        );
        f.entry = vec![arg, call, one, plus];

        let mut program = Program { functions: vec![f] };
        TailCallMarking.run(&mut program);
        assert!(!program.functions[0].has_tail_call);
    }

    #[test]
    fn marks_both_branches_of_tail_if() {
        let interner = Interner::new();
        let mut f = Function::new(vec![interner.int()], Some(interner.int()));
        let arg = f.push(ExprKind::Argument(0), interner.int(), Span::dummy());
        let then_call = f.push(ExprKind::Call { function: 0, arguments: vec![arg] }, interner.int(), Span::dummy());
        let else_val = f.push(ExprKind::IntLiteral(0), interner.int(), Span::dummy());
        let branch = f.push(
            ExprKind::If { condition: arg, then_block: vec![then_call], else_block: vec![else_val] },
            interner.int(),
            Span::dummy(),
        );
        f.entry = vec![arg, branch];

        let mut program = Program { functions: vec![f] };
        TailCallMarking.run(&mut program);
        assert!(program.functions[0].tail_calls.contains(&then_call));
    }
}
