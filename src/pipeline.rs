//! The single public entry point: surface tree in, optimized core IR
//! out.

use crate::diagnostics::CoreResult;
use crate::interner::Interner;
use crate::ir::Program;
use crate::options::PipelineOptions;
use crate::surface::SurfaceProgram;
use crate::typechecker::{self, ImportResolver};
use crate::optimizer;

/// Runs Pass T over `root` (resolving `import`s through `resolver`),
/// then the optimizer pipeline (L, D, I, V, M, and TC if enabled).
/// Owns the [`Interner`] for the whole compilation — every interned
/// type produced along the way stays valid in the returned `Program`.
pub fn run(root: SurfaceProgram, resolver: &dyn ImportResolver, options: &PipelineOptions) -> CoreResult<Program> {
    let interner = Interner::new();
    let program = typechecker::run(&interner, root, resolver)?;
    optimizer::run(&interner, program, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ExprKind;
    use crate::surface::{SurfaceBlock, SurfaceExpr, SurfaceFunction, SurfaceKind};
    use crate::diagnostics::Span;

    struct NoImports;
    impl ImportResolver for NoImports {
        fn resolve(&self, _normalized_path: &str) -> Option<SurfaceProgram> {
            None
        }
    }

    #[test]
    fn runs_end_to_end_on_a_constant_main() {
        let body: SurfaceBlock =
            vec![SurfaceExpr::new(SurfaceKind::IntLiteral(42), Span::dummy())];
        let main = SurfaceFunction { num_arguments: 0, body, span: Span::dummy(), name: Some("main".into()) };
        let root = SurfaceProgram { path: "main.why".into(), functions: vec![main], entry: 0 };

        let program = run(root, &NoImports, &PipelineOptions::default()).unwrap();
        let entry = &program.functions[Program::MAIN].entry;
        let last = *entry.last().unwrap();
        assert!(matches!(program.functions[Program::MAIN].node(last).kind, ExprKind::IntLiteral(42)));
    }

    #[test]
    fn tuple_type_builds_a_tuple_of_matching_arity() {
        let int_lit = SurfaceExpr::new(SurfaceKind::IntLiteral(5), Span::dummy());
        let str_lit = SurfaceExpr::new(SurfaceKind::StringLiteral(b"hi".to_vec()), Span::dummy());
        let type_of_int = SurfaceExpr::new(
            SurfaceKind::Intrinsic { name: "typeOf".into(), arguments: vec![int_lit] },
            Span::dummy(),
        );
        let type_of_str = SurfaceExpr::new(
            SurfaceKind::Intrinsic { name: "typeOf".into(), arguments: vec![str_lit] },
            Span::dummy(),
        );
        let tuple_of_types = SurfaceExpr::new(
            SurfaceKind::TupleLiteral(vec![type_of_int, type_of_str]),
            Span::dummy(),
        );
        let tuple_type = SurfaceExpr::new(
            SurfaceKind::Intrinsic { name: "tupleType".into(), arguments: vec![tuple_of_types] },
            Span::dummy(),
        );
        let body: SurfaceBlock = vec![tuple_type];
        let main = SurfaceFunction { num_arguments: 0, body, span: Span::dummy(), name: Some("main".into()) };
        let root = SurfaceProgram { path: "main.why".into(), functions: vec![main], entry: 0 };

        let interner = Interner::new();
        let program = typechecker::run(&interner, root, &NoImports).unwrap();
        let entry = &program.functions[Program::MAIN].entry;
        let last = *entry.last().unwrap();
        match &program.functions[Program::MAIN].node(last).kind {
            ExprKind::TypeLiteral(t) => match interner.kind(*t) {
                crate::interner::TypeKind::Tuple(elements) => {
                    assert_eq!(elements.len(), 2);
                    assert_eq!(elements[0], interner.int());
                    assert_eq!(elements[1], interner.string());
                }
                other => panic!("expected a 2-element tuple type, got {other:?}"),
            },
            other => panic!("expected TypeLiteral, got {other:?}"),
        }
    }

    #[test]
    fn copy_and_free_accept_a_plain_int() {
        let arg = SurfaceExpr::new(SurfaceKind::IntLiteral(5), Span::dummy());
        let copied = SurfaceExpr::new(
            SurfaceKind::Intrinsic { name: "copy".into(), arguments: vec![arg] },
            Span::dummy(),
        );
        let freed = SurfaceExpr::new(
            SurfaceKind::Intrinsic { name: "free".into(), arguments: vec![copied] },
            Span::dummy(),
        );
        let tail = SurfaceExpr::new(SurfaceKind::IntLiteral(1), Span::dummy());
        let body: SurfaceBlock = vec![freed, tail];
        let main = SurfaceFunction { num_arguments: 0, body, span: Span::dummy(), name: Some("main".into()) };
        let root = SurfaceProgram { path: "main.why".into(), functions: vec![main], entry: 0 };

        run(root, &NoImports, &PipelineOptions::default()).expect("copy/free must accept a non-managed type");
    }
}
