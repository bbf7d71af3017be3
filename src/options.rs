//! The pipeline's only configuration surface.
//!
//! There is no config file format and no environment-variable story
//! here — an embedding CLI owns that. This struct only exists so Pass
//! I's inlining threshold isn't a bare literal buried in the pass, and
//! so a caller can turn tail-call marking off entirely for a backend
//! that has no use for it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// A non-recursive function with more callers than one, and no
    /// calls of its own, is still inlined at a call site if its body
    /// has at most this many expressions.
    pub inline_expression_budget: usize,
    /// Whether Pass TC runs at all.
    pub mark_tail_calls: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            inline_expression_budget: 5,
            mark_tail_calls: true,
        }
    }
}
