//! The optimizer: passes L, D, I, V, M, TC, run in that fixed order
//! after Pass T. Grounded on why_lib's `OptimizerPass` trait/`optimize()`
//! driver shape, generalized from a `Vec<Box<&dyn OptimizerPass>>` over
//! one AST type to a pipeline where each pass rebuilds a fresh
//! [`crate::ir::Program`] rather than mutating its input.

mod closure_lowering;
mod dead_code;
mod inlining;
mod memory;
mod tail_call;
mod void_elision;

use log::debug;

use crate::diagnostics::CoreResult;
use crate::interner::Interner;
use crate::ir::Program;
use crate::options::PipelineOptions;

/// One optimization pass over the core IR. Implementors borrow the
/// interner (new types may need interning, e.g. Pass L's `ClosureType`
/// -> `TupleType` rewrite) but own their output `Program` outright.
pub trait Pass {
    fn name(&self) -> &'static str;
    fn run(&self, interner: &Interner, program: Program) -> CoreResult<Program>;
}

pub use closure_lowering::ClosureLowering;
pub use dead_code::DeadCodeElimination;
pub use inlining::Inlining;
pub use memory::MemoryManagement;
pub use tail_call::TailCallMarking;
pub use void_elision::VoidElision;

/// Runs L, D, I, V, M in sequence, then TC if enabled. Each stage feeds
/// the next a freshly built `Program`; TC instead mutates its input in
/// place, since it only ever adds side-table metadata and never
/// rewrites expressions, so it is not a [`Pass`].
pub fn run(interner: &Interner, program: Program, options: &PipelineOptions) -> CoreResult<Program> {
    let passes: Vec<Box<dyn Pass>> = vec![
        Box::new(ClosureLowering),
        Box::new(DeadCodeElimination),
        Box::new(Inlining { inline_expression_budget: options.inline_expression_budget }),
        Box::new(VoidElision),
        Box::new(MemoryManagement),
    ];

    let mut program = program;
    for pass in &passes {
        let functions_before = program.functions.len();
        program = pass.run(interner, program)?;
        debug!("{}: {} -> {} functions", pass.name(), functions_before, program.functions.len());
    }

    if options.mark_tail_calls {
        TailCallMarking.run(&mut program);
        let marked = program.functions.iter().filter(|f| f.has_tail_call).count();
        debug!("tail-call-marking: {marked} functions carry a self tail call");
    }

    Ok(program)
}
