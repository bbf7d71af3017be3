//! Source positions and the fatal-error taxonomy of the pipeline.
//!
//! Every pass reports failures as a [`CoreError`] rather than printing
//! anything: this crate has no file I/O and never calls `process::exit`.
//! An embedding CLI owns turning a `CoreError` into terminal output.

use std::fmt::{self, Display};
use std::rc::Rc;

use colored::Colorize;

/// A half-open `(line, column)` range into a single source file, both
/// zero-indexed. Cheap to clone: the source text is held behind an `Rc`.
#[derive(Debug, Clone)]
pub struct Span {
    pub start: (usize, usize),
    pub end: (usize, usize),
    pub file: Rc<str>,
    pub source: Rc<str>,
}

impl Span {
    pub fn new(file: Rc<str>, source: Rc<str>, start: (usize, usize), end: (usize, usize)) -> Self {
        Span {
            start,
            end,
            file,
            source,
        }
    }

    /// A zero-length span over an empty, unnamed source. Used by passes
    /// that synthesize expressions with no direct surface counterpart
    /// (e.g. an inserted `copy`/`free`) and by tests.
    pub fn dummy() -> Self {
        Span {
            start: (0, 0),
            end: (0, 0),
            file: Rc::from(""),
            source: Rc::from(""),
        }
    }

    /// Merge two spans from the same file into one spanning both.
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
            file: self.file.clone(),
            source: self.source.clone(),
        }
    }

    /// Render `file:line:column: message` followed by the offending
    /// source line with the span underlined in red.
    pub fn render(&self, message: impl Display) -> String {
        let lines: Vec<&str> = self.source.lines().collect();
        let (line, col) = self.start;
        let header = format!(
            "{}:{}:{}: {}",
            self.file,
            line + 1,
            col + 1,
            message
        );
        let Some(line_str) = lines.get(line) else {
            return header;
        };
        let end_col = if self.end.0 == self.start.0 {
            self.end.1.max(col + 1)
        } else {
            line_str.len()
        };
        let end_col = end_col.min(line_str.len());
        let (before, rest) = line_str.split_at(col.min(line_str.len()));
        let (marked, after) = rest.split_at((end_col - col).min(rest.len()));
        let underline = " ".repeat(col) + &"^".repeat(marked.len().max(1));
        format!(
            "{header}\n{before}{marked}{after}\n{underline}",
            marked = marked.red()
        )
    }
}

impl PartialEq for Span {
    fn eq(&self, _other: &Span) -> bool {
        // Source position is not part of semantic equality anywhere it
        // is embedded (expressions compare by structure, not by origin).
        true
    }
}
impl Eq for Span {}

/// Every fatal condition the pipeline can raise, each carrying the
/// [`Span`] of the offending construct. Implements
/// [`std::error::Error`] so an embedding binary can use `?`/`anyhow`
/// freely; this crate itself never prints or exits on these.
#[derive(Debug, Clone)]
pub enum CoreError {
    TypeMismatch(TypeMismatch, Span),
    NonCallable(NonCallable, Span),
    ArgumentCountMismatch(ArgumentCountMismatch, Span),
    IntrinsicSignature(IntrinsicSignature, Span),
    StructFieldMismatch(StructFieldMismatch, Span),
    MissingSwitchCase(MissingSwitchCase, Span),
    UnexpectedSwitchCase(UnexpectedSwitchCase, Span),
    SuperfluousSwitchCase(SuperfluousSwitchCase, Span),
    IndexOutOfBounds(IndexOutOfBounds, Span),
    RecursiveReturnType(RecursiveReturnType, Span),
    CompileTimeError(CompileTimeError, Span),
    NonLiteralArgument(NonLiteralArgument, Span),
    UnsupportedFeature(UnsupportedFeature, Span),
    UndefinedImport(UndefinedImport, Span),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (msg, span): (String, &Span) = match self {
            CoreError::TypeMismatch(e, s) => (e.to_string(), s),
            CoreError::NonCallable(e, s) => (e.to_string(), s),
            CoreError::ArgumentCountMismatch(e, s) => (e.to_string(), s),
            CoreError::IntrinsicSignature(e, s) => (e.to_string(), s),
            CoreError::StructFieldMismatch(e, s) => (e.to_string(), s),
            CoreError::MissingSwitchCase(e, s) => (e.to_string(), s),
            CoreError::UnexpectedSwitchCase(e, s) => (e.to_string(), s),
            CoreError::SuperfluousSwitchCase(e, s) => (e.to_string(), s),
            CoreError::IndexOutOfBounds(e, s) => (e.to_string(), s),
            CoreError::RecursiveReturnType(e, s) => (e.to_string(), s),
            CoreError::CompileTimeError(e, s) => (e.to_string(), s),
            CoreError::NonLiteralArgument(e, s) => (e.to_string(), s),
            CoreError::UnsupportedFeature(e, s) => (e.to_string(), s),
            CoreError::UndefinedImport(e, s) => (e.to_string(), s),
        };
        f.write_str(&span.render(msg))
    }
}

impl std::error::Error for CoreError {}

macro_rules! error_kind {
    ($name:ident { $($field:ident : $ty:ty),* $(,)? }, $fmt:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            $(pub $field: $ty),*
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                #[allow(unused_variables)]
                let $name { $($field),* } = self;
                write!(f, $fmt)
            }
        }
    };
}

error_kind!(TypeMismatch { expected: String, actual: String }, "expected type {expected}, found {actual}");
error_kind!(NonCallable { found: String }, "cannot call a value of type {found}");
error_kind!(ArgumentCountMismatch { expected: usize, actual: usize }, "call with {actual} argument(s) to a function that accepts {expected}");
error_kind!(IntrinsicSignature { name: String, detail: String }, "invalid call to intrinsic '{name}': {detail}");
error_kind!(StructFieldMismatch { detail: String }, "struct literal field mismatch: {detail}");
error_kind!(MissingSwitchCase { case_name: String }, "missing case \"{case_name}\"");
error_kind!(UnexpectedSwitchCase { expected: String, actual: String }, "expected case \"{expected}\" instead of \"{actual}\"");
error_kind!(SuperfluousSwitchCase { case_name: String }, "superfluous case \"{case_name}\"");
error_kind!(IndexOutOfBounds { index: i64, len: usize }, "index {index} out of bounds for length {len}");
error_kind!(RecursiveReturnType {}, "cannot determine return type of recursive call");
error_kind!(CompileTimeError { message: String }, "{message}");
error_kind!(NonLiteralArgument { intrinsic: String }, "argument to '{intrinsic}' must be a compile-time literal");
error_kind!(UnsupportedFeature { feature: String }, "unsupported feature: {feature}");
error_kind!(UndefinedImport { path: String }, "cannot resolve import \"{path}\"");

pub type CoreResult<T> = Result<T, CoreError>;
