//! Pass I: call-graph analysis followed by selective inlining.
//!
//! *Analyze* walks the static call graph from `main`, recording per
//! callee its expression count, how many `Call`s its own body makes,
//! how many call sites target it, and whether it is ever re-entered
//! while still on the walk's stack (recursive). *Replace* then
//! rewrites the program: a non-recursive callee with exactly one
//! caller, or with a small enough body and no further calls, is
//! spliced directly into each call site; everything else is copied
//! into a fresh `Function`, built lazily the first time some surviving
//! call site references it. Functions no longer reachable from `main`
//! (zero callers) are simply never built and so drop out.

use std::collections::HashMap;

use log::trace;

use crate::diagnostics::CoreResult;
use crate::interner::Interner;
use crate::ir::{Block, ExprId, ExprKind, ExprNode, Function, Program};

use super::Pass;

pub struct Inlining {
    pub inline_expression_budget: usize,
}

impl Pass for Inlining {
    fn name(&self) -> &'static str {
        "inlining"
    }

    fn run(&self, _interner: &Interner, program: Program) -> CoreResult<Program> {
        let stats = analyze(&program);
        let mut inliner = Inliner {
            program: &program,
            stats,
            budget: self.inline_expression_budget,
            mapped: HashMap::new(),
            new_functions: Vec::new(),
        };
        inliner.get_or_build(Program::MAIN);
        log::debug!("inlining: {} -> {} functions", program.functions.len(), inliner.new_functions.len());
        Ok(Program { functions: inliner.new_functions })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    expr_count: usize,
    call_count: usize,
    callers: usize,
    recursive: bool,
}

fn callees_of(f: &Function) -> Vec<usize> {
    f.arena
        .iter()
        .filter_map(|node| match &node.kind {
            ExprKind::Call { function, .. } => Some(*function),
            _ => None,
        })
        .collect()
}

fn analyze(program: &Program) -> HashMap<usize, Stats> {
    let mut stats = HashMap::new();
    let mut visiting = std::collections::HashSet::new();
    let mut visited = std::collections::HashSet::new();
    walk(program, Program::MAIN, &mut visiting, &mut visited, &mut stats);
    stats
}

fn stats_for(program: &Program, idx: usize) -> Stats {
    let f = &program.functions[idx];
    Stats { expr_count: f.arena.len(), call_count: callees_of(f).len(), callers: 0, recursive: false }
}

fn walk(
    program: &Program,
    idx: usize,
    visiting: &mut std::collections::HashSet<usize>,
    visited: &mut std::collections::HashSet<usize>,
    stats: &mut HashMap<usize, Stats>,
) {
    if visiting.contains(&idx) {
        stats.entry(idx).or_insert_with(|| stats_for(program, idx)).recursive = true;
        return;
    }
    if visited.contains(&idx) {
        return;
    }
    stats.entry(idx).or_insert_with(|| stats_for(program, idx));
    visiting.insert(idx);
    let callees = callees_of(&program.functions[idx]);
    for &callee in &callees {
        stats.entry(callee).or_insert_with(|| stats_for(program, callee)).callers += 1;
    }
    for callee in callees {
        walk(program, callee, visiting, visited, stats);
    }
    visiting.remove(&idx);
    visited.insert(idx);
}

struct Inliner<'a> {
    program: &'a Program,
    stats: HashMap<usize, Stats>,
    budget: usize,
    mapped: HashMap<usize, usize>,
    new_functions: Vec<Function>,
}

impl<'a> Inliner<'a> {
    fn should_inline(&self, idx: usize) -> bool {
        if idx == Program::MAIN {
            return false;
        }
        match self.stats.get(&idx) {
            Some(s) if !s.recursive => s.callers == 1 || (s.expr_count <= self.budget && s.call_count == 0),
            _ => false,
        }
    }

    /// Returns the new index of `old_idx`, building it (and recursively
    /// whatever it still calls) the first time it's referenced.
    fn get_or_build(&mut self, old_idx: usize) -> usize {
        if let Some(&n) = self.mapped.get(&old_idx) {
            return n;
        }
        let old_f = self.program.functions[old_idx].clone();
        let placeholder = self.new_functions.len();
        self.new_functions.push(Function::new(old_f.argument_types.clone(), old_f.return_type));
        self.mapped.insert(old_idx, placeholder);

        let mut dest_arena = Vec::new();
        let mut remap = HashMap::new();
        let mut entry = Vec::new();
        self.copy_block(&old_f, &old_f.entry, None, &mut remap, &mut dest_arena, &mut entry);

        self.new_functions[placeholder] = Function {
            argument_types: old_f.argument_types,
            return_type: old_f.return_type,
            arena: dest_arena,
            entry,
            tail_calls: Default::default(),
            has_tail_call: false,
            name: old_f.name,
        };
        placeholder
    }

    fn copy_block(
        &mut self,
        old_f: &Function,
        block: &Block,
        args: Option<&[ExprId]>,
        remap: &mut HashMap<ExprId, ExprId>,
        dest_arena: &mut Vec<ExprNode>,
        out: &mut Block,
    ) {
        for &id in block {
            self.copy_into(old_f, id, args, remap, dest_arena, out);
        }
    }

    /// Copies `id` (from `old_f`'s arena) into `dest_arena`, returning
    /// its destination id. `args`, when present, means we're splicing
    /// an inlined callee body: `Argument(i)` aliases `args[i]` instead
    /// of becoming a new node, and `Return(e)` aliases `e` instead of
    /// becoming a new node — both already live in `out` (or alias
    /// something that does), so neither is pushed again.
    fn copy_into(
        &mut self,
        old_f: &Function,
        id: ExprId,
        args: Option<&[ExprId]>,
        remap: &mut HashMap<ExprId, ExprId>,
        dest_arena: &mut Vec<ExprNode>,
        out: &mut Block,
    ) -> ExprId {
        if let Some(&done) = remap.get(&id) {
            return done;
        }
        let node = old_f.node(id).clone();

        macro_rules! fresh {
            ($kind:expr) => {{
                let dest_id = ExprId(dest_arena.len() as u32);
                dest_arena.push(ExprNode { kind: $kind, ty: node.ty, span: node.span.clone() });
                remap.insert(id, dest_id);
                out.push(dest_id);
                dest_id
            }};
        }

        match &node.kind {
            ExprKind::IntLiteral(v) => fresh!(ExprKind::IntLiteral(*v)),
            ExprKind::VoidLiteral => fresh!(ExprKind::VoidLiteral),
            ExprKind::StringLiteral(b) => fresh!(ExprKind::StringLiteral(b.clone())),
            ExprKind::TypeLiteral(t) => fresh!(ExprKind::TypeLiteral(*t)),
            ExprKind::CaseVariable => fresh!(ExprKind::CaseVariable),
            ExprKind::Argument(i) => match args {
                Some(actual) => {
                    let dest_id = actual[*i];
                    remap.insert(id, dest_id);
                    dest_id
                }
                None => fresh!(ExprKind::Argument(*i)),
            },
            ExprKind::Return(e) => {
                let e2 = self.copy_into(old_f, *e, args, remap, dest_arena, out);
                if args.is_some() {
                    remap.insert(id, e2);
                    e2
                } else {
                    fresh!(ExprKind::Return(e2))
                }
            }
            ExprKind::ArrayLiteral(es) => {
                let es: Vec<_> = es.iter().map(|e| self.copy_into(old_f, *e, args, remap, dest_arena, out)).collect();
                fresh!(ExprKind::ArrayLiteral(es))
            }
            ExprKind::TupleLiteral(es) => {
                let es: Vec<_> = es.iter().map(|e| self.copy_into(old_f, *e, args, remap, dest_arena, out)).collect();
                fresh!(ExprKind::TupleLiteral(es))
            }
            ExprKind::Closure(es) => {
                let es: Vec<_> = es.iter().map(|e| self.copy_into(old_f, *e, args, remap, dest_arena, out)).collect();
                fresh!(ExprKind::Closure(es))
            }
            ExprKind::StructLiteral(fields) => {
                let fields: Vec<_> = fields
                    .iter()
                    .map(|(n, e)| (n.clone(), self.copy_into(old_f, *e, args, remap, dest_arena, out)))
                    .collect();
                fresh!(ExprKind::StructLiteral(fields))
            }
            ExprKind::EnumLiteral { payload, case_index } => {
                let p = self.copy_into(old_f, *payload, args, remap, dest_arena, out);
                let case_index = *case_index;
                fresh!(ExprKind::EnumLiteral { payload: p, case_index })
            }
            ExprKind::Binary { op, left, right } => {
                let op = *op;
                let l = self.copy_into(old_f, *left, args, remap, dest_arena, out);
                let r = self.copy_into(old_f, *right, args, remap, dest_arena, out);
                fresh!(ExprKind::Binary { op, left: l, right: r })
            }
            ExprKind::If { condition, then_block, else_block } => {
                let c = self.copy_into(old_f, *condition, args, remap, dest_arena, out);
                let mut new_then = Vec::new();
                self.copy_block(old_f, then_block, args, remap, dest_arena, &mut new_then);
                let mut new_else = Vec::new();
                self.copy_block(old_f, else_block, args, remap, dest_arena, &mut new_else);
                fresh!(ExprKind::If { condition: c, then_block: new_then, else_block: new_else })
            }
            ExprKind::Switch { scrutinee, cases } => {
                let s = self.copy_into(old_f, *scrutinee, args, remap, dest_arena, out);
                let mut new_cases = Vec::new();
                for (name, block) in cases {
                    let mut new_block = Vec::new();
                    self.copy_block(old_f, block, args, remap, dest_arena, &mut new_block);
                    new_cases.push((name.clone(), new_block));
                }
                fresh!(ExprKind::Switch { scrutinee: s, cases: new_cases })
            }
            ExprKind::TupleAccess { tuple, index } => {
                let index = *index;
                let t = self.copy_into(old_f, *tuple, args, remap, dest_arena, out);
                fresh!(ExprKind::TupleAccess { tuple: t, index })
            }
            ExprKind::StructAccess { object, field } => {
                let field = field.clone();
                let o = self.copy_into(old_f, *object, args, remap, dest_arena, out);
                fresh!(ExprKind::StructAccess { object: o, field })
            }
            ExprKind::ClosureAccess { closure, index } => {
                let index = *index;
                let c = self.copy_into(old_f, *closure, args, remap, dest_arena, out);
                fresh!(ExprKind::ClosureAccess { closure: c, index })
            }
            ExprKind::Intrinsic { name, arguments } => {
                let name = *name;
                let args2: Vec<_> =
                    arguments.iter().map(|a| self.copy_into(old_f, *a, args, remap, dest_arena, out)).collect();
                fresh!(ExprKind::Intrinsic { name, arguments: args2 })
            }
            ExprKind::Bind { left, right } => {
                let l = self.copy_into(old_f, *left, args, remap, dest_arena, out);
                let r = self.copy_into(old_f, *right, args, remap, dest_arena, out);
                fresh!(ExprKind::Bind { left: l, right: r })
            }
            ExprKind::Call { function, arguments } => {
                let callee_idx = *function;
                let new_args: Vec<_> =
                    arguments.iter().map(|a| self.copy_into(old_f, *a, args, remap, dest_arena, out)).collect();
                if self.should_inline(callee_idx) {
                    trace!("inlining: splicing call to function {callee_idx} into caller");
                    let callee_f = self.program.functions[callee_idx].clone();
                    let mut inner_remap = HashMap::new();
                    self.copy_block(&callee_f, &callee_f.entry, Some(&new_args), &mut inner_remap, dest_arena, out);
                    let last = callee_f.entry.last().copied().expect("inlined function body is empty");
                    let value_id = inner_remap[&last];
                    remap.insert(id, value_id);
                    value_id
                } else {
                    let target = self.get_or_build(callee_idx);
                    fresh!(ExprKind::Call { function: target, arguments: new_args })
                }
            }
        }
    }
}
