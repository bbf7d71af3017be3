//! Pass V: empty-type elision.
//!
//! A type is *empty* if it is an empty tuple, a tuple all of whose
//! elements are empty (recursively), or `TypeOfType` — these carry
//! zero runtime bytes. `Void` is a distinct, non-empty type: it is the
//! real "ran, produced nothing interesting" marker used by intrinsics
//! like `putStr`, so dropping an expression of `Void` type would
//! silently discard a side effect. Only empty-typed values are erased.
//!
//! Elision applies to block statements, tuple elements, struct fields,
//! and call arguments — positions the language lets you address
//! positionally (`TupleAccess.index`, `Argument.index`), which this
//! pass renumbers to match the compacted sequence. `ArrayLiteral`
//! elements are left alone: arrays carry a runtime length that
//! positional elision would silently corrupt, and the spec names only
//! tuple/struct/call positions.

use std::collections::HashMap;

use log::debug;

use crate::diagnostics::CoreResult;
use crate::interner::{EnumHandle, Interner, StructHandle, Type, TypeKind};
use crate::ir::{Block, ExprId, ExprKind, ExprNode, Function, Program};

use super::Pass;

pub struct VoidElision;

impl Pass for VoidElision {
    fn name(&self) -> &'static str {
        "void-elision"
    }

    fn run(&self, interner: &Interner, program: Program) -> CoreResult<Program> {
        let mut ctx = Ctx { interner, empty_memo: HashMap::new(), type_memo: HashMap::new(), tuple_remap_memo: HashMap::new() };

        let mut fn_remap = vec![None; program.functions.len()];
        let mut next = 0usize;
        fn_remap[Program::MAIN] = Some(next);
        next += 1;
        for (idx, f) in program.functions.iter().enumerate() {
            if idx == Program::MAIN {
                continue;
            }
            let keep = match f.return_type {
                Some(t) => !ctx.is_empty(t),
                None => true,
            };
            if keep {
                fn_remap[idx] = Some(next);
                next += 1;
            }
        }

        let dropped = fn_remap.iter().filter(|r| r.is_none()).count();
        debug!("void-elision: dropping {dropped} empty-returning functions");

        let mut functions = vec![None; next];
        for (idx, f) in program.functions.into_iter().enumerate() {
            if let Some(new_idx) = fn_remap[idx] {
                functions[new_idx] = Some(rewrite_function(&mut ctx, &f, &fn_remap));
            }
        }
        let functions = functions.into_iter().map(|f| f.expect("every surviving slot is populated")).collect();
        Ok(Program { functions })
    }
}

struct Ctx<'a> {
    interner: &'a Interner,
    empty_memo: HashMap<Type, bool>,
    type_memo: HashMap<Type, Type>,
    tuple_remap_memo: HashMap<Type, Vec<Option<usize>>>,
}

impl<'a> Ctx<'a> {
    fn is_empty(&mut self, ty: Type) -> bool {
        if let Some(done) = self.empty_memo.get(&ty) {
            return *done;
        }
        // A tuple reachable from its own element only through a
        // `Reference` would otherwise recurse forever; assume
        // non-empty until proven otherwise; any legitimate
        // self-referential case must go through a managed pointer
        // anyway, which is never itself empty.
        self.empty_memo.insert(ty, false);
        let empty = match self.interner.kind(ty) {
            TypeKind::TypeOfType(_) => true,
            TypeKind::Tuple(elems) => elems.iter().all(|e| self.is_empty(*e)),
            _ => false,
        };
        self.empty_memo.insert(ty, empty);
        empty
    }

    fn rewrite_type(&mut self, ty: Type) -> Type {
        if let Some(done) = self.type_memo.get(&ty) {
            return *done;
        }
        let rewritten = match self.interner.kind(ty) {
            TypeKind::Int | TypeKind::Void | TypeKind::String | TypeKind::StringIterator | TypeKind::TypeOfType(_) => ty,
            TypeKind::Array(elem) => {
                let elem = self.rewrite_type(elem);
                self.interner.array(elem)
            }
            TypeKind::Tuple(elems) => {
                let filtered: Vec<Type> = elems.into_iter().filter(|e| !self.is_empty(*e)).collect();
                let kept: Vec<Type> = filtered.into_iter().map(|e| self.rewrite_type(e)).collect();
                self.interner.tuple(kept)
            }
            TypeKind::Reference(inner) => {
                let inner = self.rewrite_type(inner);
                self.interner.reference(inner)
            }
            TypeKind::Closure(_, env) => {
                let filtered: Vec<Type> = env.into_iter().filter(|e| !self.is_empty(*e)).collect();
                let kept: Vec<Type> = filtered.into_iter().map(|e| self.rewrite_type(e)).collect();
                self.interner.tuple(kept)
            }
            TypeKind::Struct(_) => {
                let handle: StructHandle = self.interner.fresh_struct();
                self.type_memo.insert(ty, handle.0);
                let filtered_fields: Vec<_> = self
                    .interner
                    .struct_fields(ty)
                    .into_iter()
                    .filter(|(_, t)| !self.is_empty(*t))
                    .collect();
                let fields = filtered_fields
                    .into_iter()
                    .map(|(n, t)| (n, self.rewrite_type(t)))
                    .collect();
                self.interner.set_struct_fields(handle, fields);
                handle.0
            }
            TypeKind::Enum(_) => {
                let handle: EnumHandle = self.interner.fresh_enum();
                self.type_memo.insert(ty, handle.0);
                let cases = self
                    .interner
                    .enum_cases(ty)
                    .into_iter()
                    .map(|(n, t)| (n, self.rewrite_type(t)))
                    .collect();
                self.interner.set_enum_cases(handle, cases);
                handle.0
            }
        };
        self.type_memo.insert(ty, rewritten);
        rewritten
    }

    /// Old-index -> new-index map for a tuple type's surviving
    /// (non-empty) elements, used to renumber `TupleAccess.index`.
    fn tuple_index_remap(&mut self, ty: Type) -> Vec<Option<usize>> {
        if let Some(done) = self.tuple_remap_memo.get(&ty) {
            return done.clone();
        }
        let elems = match self.interner.kind(ty) {
            TypeKind::Tuple(elems) => elems,
            _ => panic!("tuple_index_remap called on a non-tuple type"),
        };
        let mut remap = Vec::with_capacity(elems.len());
        let mut next = 0usize;
        for e in &elems {
            if self.is_empty(*e) {
                remap.push(None);
            } else {
                remap.push(Some(next));
                next += 1;
            }
        }
        self.tuple_remap_memo.insert(ty, remap.clone());
        remap
    }
}

fn argument_index_remap(ctx: &mut Ctx, argument_types: &[Type]) -> Vec<Option<usize>> {
    let mut remap = Vec::with_capacity(argument_types.len());
    let mut next = 0usize;
    for t in argument_types {
        if ctx.is_empty(*t) {
            remap.push(None);
        } else {
            remap.push(Some(next));
            next += 1;
        }
    }
    remap
}

fn rewrite_function(ctx: &mut Ctx, f: &Function, fn_remap: &[Option<usize>]) -> Function {
    let arg_remap = argument_index_remap(ctx, &f.argument_types);
    let filtered_args: Vec<Type> =
        f.argument_types.iter().filter(|t| !ctx.is_empty(**t)).map(|t| *t).collect();
    let argument_types: Vec<Type> = filtered_args.into_iter().map(|t| ctx.rewrite_type(t)).collect();
    let return_type = f.return_type.map(|t| ctx.rewrite_type(t));

    let mut arena = Vec::new();
    let mut remap = HashMap::new();
    let entry = rewrite_block(ctx, f, &f.entry, &arg_remap, fn_remap, &mut remap, &mut arena);

    Function {
        argument_types,
        return_type,
        arena,
        entry,
        tail_calls: Default::default(),
        has_tail_call: false,
        name: f.name.clone(),
    }
}

fn rewrite_block(
    ctx: &mut Ctx,
    f: &Function,
    block: &Block,
    arg_remap: &[Option<usize>],
    fn_remap: &[Option<usize>],
    remap: &mut HashMap<ExprId, ExprId>,
    arena: &mut Vec<ExprNode>,
) -> Block {
    let mut out = Vec::new();
    for &id in block {
        if let Some(new_id) = rewrite_optional(ctx, f, id, arg_remap, fn_remap, remap, arena) {
            out.push(new_id);
        }
    }
    out
}

/// Rewrites `id`, returning `None` if its type is empty (the value is
/// elided entirely: no arena slot, no remap entry).
fn rewrite_optional(
    ctx: &mut Ctx,
    f: &Function,
    id: ExprId,
    arg_remap: &[Option<usize>],
    fn_remap: &[Option<usize>],
    remap: &mut HashMap<ExprId, ExprId>,
    arena: &mut Vec<ExprNode>,
) -> Option<ExprId> {
    if let Some(&done) = remap.get(&id) {
        return Some(done);
    }
    if ctx.is_empty(f.node(id).ty) {
        return None;
    }
    Some(rewrite_required(ctx, f, id, arg_remap, fn_remap, remap, arena))
}

/// Rewrites `id` unconditionally, keeping it even if its type turns
/// out to be empty (used for positions the spec doesn't name as
/// elidable: array elements, operands, scrutinees, intrinsic args).
fn rewrite_required(
    ctx: &mut Ctx,
    f: &Function,
    id: ExprId,
    arg_remap: &[Option<usize>],
    fn_remap: &[Option<usize>],
    remap: &mut HashMap<ExprId, ExprId>,
    arena: &mut Vec<ExprNode>,
) -> ExprId {
    if let Some(&done) = remap.get(&id) {
        return done;
    }
    let node = f.node(id).clone();
    let ty = ctx.rewrite_type(node.ty);

    macro_rules! req {
        ($child:expr) => {
            rewrite_required(ctx, f, $child, arg_remap, fn_remap, remap, arena)
        };
    }
    macro_rules! opt {
        ($child:expr) => {
            rewrite_optional(ctx, f, $child, arg_remap, fn_remap, remap, arena)
        };
    }

    let kind = match &node.kind {
        ExprKind::IntLiteral(v) => ExprKind::IntLiteral(*v),
        ExprKind::VoidLiteral => ExprKind::VoidLiteral,
        ExprKind::StringLiteral(b) => ExprKind::StringLiteral(b.clone()),
        ExprKind::TypeLiteral(t) => ExprKind::TypeLiteral(ctx.rewrite_type(*t)),
        ExprKind::CaseVariable => ExprKind::CaseVariable,
        ExprKind::Argument(i) => {
            ExprKind::Argument(arg_remap[*i].expect("referenced argument slot was elided"))
        }
        ExprKind::ArrayLiteral(es) => ExprKind::ArrayLiteral(es.iter().map(|e| req!(*e)).collect()),
        ExprKind::TupleLiteral(es) => ExprKind::TupleLiteral(es.iter().filter_map(|e| opt!(*e)).collect()),
        ExprKind::Closure(es) => ExprKind::Closure(es.iter().map(|e| req!(*e)).collect()),
        ExprKind::StructLiteral(fields) => ExprKind::StructLiteral(
            fields.iter().filter_map(|(n, e)| opt!(*e).map(|e2| (n.clone(), e2))).collect(),
        ),
        ExprKind::EnumLiteral { payload, case_index } => {
            ExprKind::EnumLiteral { payload: req!(*payload), case_index: *case_index }
        }
        ExprKind::Binary { op, left, right } => {
            ExprKind::Binary { op: *op, left: req!(*left), right: req!(*right) }
        }
        ExprKind::If { condition, then_block, else_block } => ExprKind::If {
            condition: req!(*condition),
            then_block: rewrite_block(ctx, f, then_block, arg_remap, fn_remap, remap, arena),
            else_block: rewrite_block(ctx, f, else_block, arg_remap, fn_remap, remap, arena),
        },
        ExprKind::Switch { scrutinee, cases } => ExprKind::Switch {
            scrutinee: req!(*scrutinee),
            cases: cases
                .iter()
                .map(|(name, block)| (name.clone(), rewrite_block(ctx, f, block, arg_remap, fn_remap, remap, arena)))
                .collect(),
        },
        ExprKind::TupleAccess { tuple, index } => {
            let tuple_ty = f.node(*tuple).ty;
            let index_remap = ctx.tuple_index_remap(tuple_ty);
            let new_tuple = req!(*tuple);
            let new_index = index_remap[*index].expect("referenced tuple slot was elided");
            ExprKind::TupleAccess { tuple: new_tuple, index: new_index }
        }
        ExprKind::StructAccess { object, field } => {
            ExprKind::StructAccess { object: req!(*object), field: field.clone() }
        }
        ExprKind::ClosureAccess { closure, index } => {
            ExprKind::ClosureAccess { closure: req!(*closure), index: *index }
        }
        ExprKind::Call { function, arguments } => ExprKind::Call {
            function: fn_remap[*function].expect("surviving call targets a dropped function"),
            arguments: arguments.iter().filter_map(|a| opt!(*a)).collect(),
        },
        ExprKind::Intrinsic { name, arguments } => {
            ExprKind::Intrinsic { name: *name, arguments: arguments.iter().map(|a| req!(*a)).collect() }
        }
        ExprKind::Bind { left, right } => {
            // `left` only ever matters for its side effect; if Pass V
            // already erased it as a block statement (empty type, so
            // it never entered `remap`), rebuilding it via `req!` would
            // reach a dropped function. Alias it to `right` instead —
            // `left`'s value was never observable anyway.
            let right_id = req!(*right);
            let left_id = opt!(*left).unwrap_or(right_id);
            ExprKind::Bind { left: left_id, right: right_id }
        }
        ExprKind::Return(e) => ExprKind::Return(req!(*e)),
    };

    let new_id = ExprId(arena.len() as u32);
    arena.push(ExprNode { kind, ty, span: node.span });
    remap.insert(id, new_id);
    new_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Span;

    #[test]
    fn drops_typeoftype_statement() {
        let interner = Interner::new();
        let mut f = Function::new(vec![], Some(interner.int()));
        let ty_lit = f.push(ExprKind::TypeLiteral(interner.int()), interner.type_of(interner.int()), Span::dummy());
        let result = f.push(ExprKind::IntLiteral(7), interner.int(), Span::dummy());
        f.entry = vec![ty_lit, result];

        let program = Program { functions: vec![f] };
        let out = VoidElision.run(&interner, program).unwrap();
        assert_eq!(out.functions[0].entry.len(), 1);
    }

    #[test]
    fn compacts_tuple_and_renumbers_access() {
        let interner = Interner::new();
        let unit = interner.tuple(vec![]);
        let tuple_ty = interner.tuple(vec![unit, interner.int()]);
        let mut f = Function::new(vec![], Some(interner.int()));
        let empty_elem = f.push(ExprKind::TupleLiteral(vec![]), unit, Span::dummy());
        let int_elem = f.push(ExprKind::IntLiteral(5), interner.int(), Span::dummy());
        let tuple = f.push(ExprKind::TupleLiteral(vec![empty_elem, int_elem]), tuple_ty, Span::dummy());
        let access = f.push(ExprKind::TupleAccess { tuple, index: 1 }, interner.int(), Span::dummy());
        f.entry = vec![tuple, access];

        let program = Program { functions: vec![f] };
        let out = VoidElision.run(&interner, program).unwrap();
        let f = &out.functions[0];
        match &f.node(*f.entry.last().unwrap()).kind {
            ExprKind::TupleAccess { index, .. } => assert_eq!(*index, 0),
            other => panic!("expected TupleAccess, got {other:?}"),
        }
    }

    #[test]
    fn bind_over_a_dropped_empty_returning_call_does_not_panic() {
        let interner = Interner::new();
        let unit = interner.tuple(vec![]);

        let mut helper = Function::new(vec![], Some(unit));
        let helper_body = helper.push(ExprKind::TupleLiteral(vec![]), unit, Span::dummy());
        helper.entry = vec![helper_body];

        let mut main = Function::new(vec![], Some(interner.int()));
        let call = main.push(ExprKind::Call { function: 1, arguments: vec![] }, unit, Span::dummy());
        let constant = main.push(ExprKind::IntLiteral(42), interner.int(), Span::dummy());
        let bind = main.push(ExprKind::Bind { left: call, right: constant }, interner.int(), Span::dummy());
        main.entry = vec![bind];

        let program = Program { functions: vec![main, helper] };
        let out = VoidElision.run(&interner, program).unwrap();
        let f = &out.functions[0];
        match &f.node(*f.entry.last().unwrap()).kind {
            ExprKind::Bind { left, right } => assert_eq!(left, right),
            other => panic!("expected Bind, got {other:?}"),
        }
    }
}
