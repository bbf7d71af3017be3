//! The typed core IR: the shape produced by Pass T and consumed by
//! every later pass.
//!
//! Ownership is arena-shaped: each [`Function`] owns a flat arena of
//! [`ExprNode`]; a [`Block`] is just an ordered list of arena indices,
//! so nested blocks (`If` branches, `Switch` cases) borrow into the
//! same arena instead of owning a separate one. Cross-expression
//! references inside a function are non-owning `ExprId`s into that
//! same arena.

use std::collections::HashSet;

use serde::Serialize;

use crate::diagnostics::Span;
use crate::interner::Type;

/// Index into a [`Function`]'s expression arena. Never valid across
/// functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExprId(pub u32);

/// An ordered sequence of expressions; its last element is the
/// block's value.
pub type Block = Vec<ExprId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Intrinsic names available in the core IR. Compile-time-only
/// intrinsics (`typeOf`, `arrayType`, and friends) are resolved away by
/// Pass T and must never survive into this enum's surviving variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IntrinsicName {
    PutChar,
    PutStr,
    GetChar,
    ArrayGet,
    ArrayLength,
    ArraySplice,
    StringPush,
    StringIterator,
    StringIteratorIsValid,
    StringIteratorGet,
    StringIteratorNext,
    Reference,
    Copy,
    Free,
}

impl IntrinsicName {
    /// `putStr`, `arrayGet`, `arrayLength`, `stringIteratorIsValid`,
    /// `stringIteratorGet` read their managed arguments without
    /// consuming them.
    pub fn is_borrowing(self) -> bool {
        matches!(
            self,
            IntrinsicName::PutStr
                | IntrinsicName::ArrayGet
                | IntrinsicName::ArrayLength
                | IntrinsicName::StringIteratorIsValid
                | IntrinsicName::StringIteratorGet
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntrinsicName::PutChar => "putChar",
            IntrinsicName::PutStr => "putStr",
            IntrinsicName::GetChar => "getChar",
            IntrinsicName::ArrayGet => "arrayGet",
            IntrinsicName::ArrayLength => "arrayLength",
            IntrinsicName::ArraySplice => "arraySplice",
            IntrinsicName::StringPush => "stringPush",
            IntrinsicName::StringIterator => "stringIterator",
            IntrinsicName::StringIteratorIsValid => "stringIteratorIsValid",
            IntrinsicName::StringIteratorGet => "stringIteratorGet",
            IntrinsicName::StringIteratorNext => "stringIteratorNext",
            IntrinsicName::Reference => "reference",
            IntrinsicName::Copy => "copy",
            IntrinsicName::Free => "free",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum ExprKind {
    IntLiteral(i32),
    VoidLiteral,
    StringLiteral(Vec<u8>),
    /// A compile-time type value. Its own type is `TypeOfType`, which
    /// is empty at runtime (elided by Pass V).
    TypeLiteral(Type),
    ArrayLiteral(Vec<ExprId>),
    TupleLiteral(Vec<ExprId>),
    StructLiteral(Vec<(String, ExprId)>),
    EnumLiteral { payload: ExprId, case_index: usize },
    Binary { op: BinOp, left: ExprId, right: ExprId },
    If { condition: ExprId, then_block: Block, else_block: Block },
    Switch { scrutinee: ExprId, cases: Vec<(String, Block)> },
    TupleAccess { tuple: ExprId, index: usize },
    StructAccess { object: ExprId, field: String },
    /// Eliminated by Pass L.
    Closure(Vec<ExprId>),
    /// Eliminated by Pass L.
    ClosureAccess { closure: ExprId, index: usize },
    Argument(usize),
    CaseVariable,
    /// `function` indexes the enclosing [`Program`]'s function list.
    Call { function: usize, arguments: Vec<ExprId> },
    Intrinsic { name: IntrinsicName, arguments: Vec<ExprId> },
    Bind { left: ExprId, right: ExprId },
    Return(ExprId),
}

#[derive(Debug, Clone, Serialize)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub ty: Type,
    #[serde(skip)]
    pub span: Span,
}

/// `(argument_types, return_type, entry_block)` plus the owning arena.
#[derive(Debug, Clone, Serialize)]
pub struct Function {
    pub argument_types: Vec<Type>,
    /// `None` only transiently, during Pass T, before the body of a
    /// function under specialization has finished being monomorphized.
    pub return_type: Option<Type>,
    pub arena: Vec<ExprNode>,
    pub entry: Block,
    /// Populated by Pass TC: expressions within `entry` that are
    /// self-recursive calls in tail position.
    pub tail_calls: HashSet<ExprId>,
    pub has_tail_call: bool,
    /// Carried through from the surface IR purely for diagnostics
    /// (e.g. reporting which file/function an error originated in);
    /// never consulted by pass logic.
    pub name: Option<String>,
}

impl Function {
    pub fn new(argument_types: Vec<Type>, return_type: Option<Type>) -> Self {
        Function {
            argument_types,
            return_type,
            arena: Vec::new(),
            entry: Vec::new(),
            tail_calls: HashSet::new(),
            has_tail_call: false,
            name: None,
        }
    }

    /// Append a node to the arena and return its id. Does not add it
    /// to any block — callers push the returned id onto whichever
    /// `Block` they're building.
    pub fn push(&mut self, kind: ExprKind, ty: Type, span: Span) -> ExprId {
        let id = ExprId(self.arena.len() as u32);
        self.arena.push(ExprNode { kind, ty, span });
        id
    }

    pub fn node(&self, id: ExprId) -> &ExprNode {
        &self.arena[id.0 as usize]
    }

    pub fn last_of(&self, block: &Block) -> Option<ExprId> {
        block.last().copied()
    }
}

/// Ordered list of functions; `functions[0]` is `main`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Program {
    pub functions: Vec<Function>,
}

impl Program {
    pub const MAIN: usize = 0;

    pub fn main(&self) -> &Function {
        &self.functions[Self::MAIN]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::Interner;

    #[test]
    fn program_round_trips_through_json() {
        let interner = Interner::new();
        let mut f = Function::new(vec![], Some(interner.int()));
        let lit = f.push(ExprKind::IntLiteral(42), interner.int(), Span::dummy());
        f.entry = vec![lit];
        let program = Program { functions: vec![f] };

        let json = serde_json::to_string(&program).expect("program serializes");
        assert!(json.contains("IntLiteral"));
        assert!(json.contains("42"));
    }
}
