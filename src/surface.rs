//! The surface IR: what a parser collaborator hands this crate. Every
//! typed field is optional — Pass T is the only pass that ever reads or
//! writes one — and calls are still in their unresolved
//! `ClosureCall`/`MethodCall` form.
//!
//! Mirrors `why_lib::typechecker::TypeInformation`'s staged-AST idiom
//! (an `Rc<RefCell<Option<Type>>>` type slot) rather than re-deriving a
//! parser: there is no lexer or parser in this crate, so surface trees
//! are built directly (by tests, or by an embedding parser crate)
//! instead of being produced here.

use std::cell::RefCell;
use std::rc::Rc;

use crate::diagnostics::Span;
use crate::interner::Type;

/// A type slot a parser leaves empty and Pass T fills in, mirroring
/// `why_lib`'s inference-context type cells.
pub type TypeSlot = Rc<RefCell<Option<Type>>>;

pub fn empty_slot() -> TypeSlot {
    Rc::new(RefCell::new(None))
}

/// A type *expression* as written in source: resolved structurally by
/// Pass T every time it is evaluated. `Struct`/`Enum` nodes each denote
/// a freshly created nominal type — two structurally identical struct
/// types created separately are still distinct — so evaluating the same
/// `SurfaceType::Struct` twice yields two distinct interned types.
#[derive(Debug, Clone)]
pub enum SurfaceType {
    Int,
    Void,
    String,
    StringIterator,
    Array(Box<SurfaceType>),
    Tuple(Vec<SurfaceType>),
    Struct(Vec<(String, SurfaceType)>),
    Enum(Vec<(String, SurfaceType)>),
    Reference(Box<SurfaceType>),
}

/// Index of a function within the enclosing [`Program`]'s function
/// list, used by `Closure` (environment capture) and resolved method
/// calls. Not yet a [`crate::interner::FunctionRef`] — that only
/// exists once Pass T has created a concrete, monomorphized
/// `ir::Function`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFunctionRef(pub usize);

#[derive(Debug, Clone)]
pub struct SurfaceExpr {
    pub kind: SurfaceKind,
    pub ty: TypeSlot,
    pub span: Span,
}

impl SurfaceExpr {
    pub fn new(kind: SurfaceKind, span: Span) -> Self {
        SurfaceExpr {
            kind,
            ty: empty_slot(),
            span,
        }
    }
}

pub type SurfaceBlock = Vec<SurfaceExpr>;

#[derive(Debug, Clone)]
pub enum SurfaceKind {
    IntLiteral(i32),
    VoidLiteral,
    StringLiteral(Vec<u8>),
    TypeLiteral(SurfaceType),
    ArrayLiteral(Vec<SurfaceExpr>),
    TupleLiteral(Vec<SurfaceExpr>),
    StructLiteral {
        /// An explicit struct-type annotation, when the source writes
        /// one (`Point { x: 1, y: 2 }` vs. the inferred-shape form).
        type_expr: Option<Box<SurfaceExpr>>,
        fields: Vec<(String, SurfaceExpr)>,
    },
    /// A directly-constructed enum value, e.g. `Option.some(5)`.
    /// Nullary cases referenced bare (`Option.none`) arrive instead as
    /// `StructAccess` on a `TypeLiteral(SurfaceType::Enum(_))`, per the
    /// rule that a struct access on a type value denotes a case lookup.
    EnumLiteral {
        enum_type: Box<SurfaceExpr>,
        case_name: String,
        payload: Option<Box<SurfaceExpr>>,
    },
    Binary {
        op: crate::ir::BinOp,
        left: Box<SurfaceExpr>,
        right: Box<SurfaceExpr>,
    },
    If {
        condition: Box<SurfaceExpr>,
        then_block: SurfaceBlock,
        else_block: SurfaceBlock,
    },
    Switch {
        scrutinee: Box<SurfaceExpr>,
        cases: Vec<(String, SurfaceBlock)>,
    },
    TupleAccess {
        tuple: Box<SurfaceExpr>,
        index: usize,
    },
    StructAccess {
        object: Box<SurfaceExpr>,
        field: String,
    },
    Closure {
        function: SurfaceFunctionRef,
        environment: Vec<SurfaceExpr>,
    },
    ClosureAccess {
        closure: Box<SurfaceExpr>,
        index: usize,
    },
    Argument(usize),
    CaseVariable,
    ClosureCall {
        closure: Box<SurfaceExpr>,
        arguments: Vec<SurfaceExpr>,
    },
    /// `obj.method(args)`. `resolved_method` is the parser's pre-bound
    /// target for a genuine associated function; Pass T still checks,
    /// before using it, whether `method_name` is instead a
    /// closure-valued *field* of the receiver's struct type, in which
    /// case it is lowered as a `ClosureCall` on that field instead
    /// (uniform call syntax).
    MethodCall {
        object: Box<SurfaceExpr>,
        method_name: String,
        resolved_method: SurfaceFunctionRef,
        arguments: Vec<SurfaceExpr>,
    },
    /// Intrinsic names include the compile-time-only
    /// `typeOf`/`arrayType`/`tupleType`/`referenceType`/`error`/`import`
    /// alongside the runtime ones in `ir::IntrinsicName`; kept as a
    /// plain name here since they aren't all representable by
    /// `ir::IntrinsicName`.
    Intrinsic {
        name: String,
        arguments: Vec<SurfaceExpr>,
    },
    Bind {
        left: Box<SurfaceExpr>,
        right: Box<SurfaceExpr>,
    },
    Return(Box<SurfaceExpr>),
}

#[derive(Debug, Clone)]
pub struct SurfaceFunction {
    pub num_arguments: usize,
    pub body: SurfaceBlock,
    pub span: Span,
    pub name: Option<String>,
}

/// A whole compilation unit as the parser would hand it over: the
/// entry file's functions plus enough identity to resolve `import`
/// paths relative to it.
#[derive(Debug, Clone)]
pub struct SurfaceProgram {
    pub path: String,
    pub functions: Vec<SurfaceFunction>,
    /// Index into `functions` of the file's entry point (`main` for
    /// the root file; the sole function for an imported file, which is
    /// compiled as a zero-argument function).
    pub entry: usize,
}
