//! Pass T: typecheck, monomorphize, and constant-fold the surface IR
//! into [`crate::ir::Program`].
//!
//! Grounded on why_lib's typechecker module split (a dedicated
//! evaluator struct plus a standalone error/signature table). The
//! algorithm itself — monomorphization keyed by argument types, lazy
//! import compilation, recursion detection via a return-type sentinel —
//! is this crate's own.

mod checker;
mod intrinsics;

pub use checker::{run, ImportResolver};
