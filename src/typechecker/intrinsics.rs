//! The intrinsic signature table. Arity and the compile-time-vs-runtime
//! split are static; argument/result *types* depend on the live
//! [`Interner`], so the table only records shape and this module's
//! functions do the actual checking against it.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::interner::{Interner, Type, TypeKind};
use crate::ir::IntrinsicName;

/// Intrinsics evaluated entirely by Pass T; never reach `ir::ExprKind::Intrinsic`.
static COMPILE_TIME_ONLY: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["typeOf", "arrayType", "tupleType", "referenceType", "error", "import"]
        .into_iter()
        .collect()
});

pub fn is_compile_time_only(name: &str) -> bool {
    COMPILE_TIME_ONLY.contains(name)
}

/// Checks a runtime intrinsic call against its signature and returns the
/// matching [`IntrinsicName`] plus result type, or a plain-text detail
/// message on mismatch. `name` must not be one of [`is_compile_time_only`]'s
/// names — those are handled directly by the checker, since they operate
/// on syntax rather than typed values. The caller attaches a span.
pub fn check(interner: &Interner, name: &str, arg_types: &[Type]) -> Result<(IntrinsicName, Type), String> {
    let int = interner.int();
    let void = interner.void();
    let string = interner.string();
    let string_iterator = interner.string_iterator();

    let mismatch = |detail: &str| Err(detail.to_string());

    match name {
        "putChar" => {
            if arg_types == [int] {
                Ok((IntrinsicName::PutChar, void))
            } else {
                mismatch("expected (Int)")
            }
        }
        "putStr" => {
            if arg_types == [string] {
                Ok((IntrinsicName::PutStr, void))
            } else {
                mismatch("expected (String)")
            }
        }
        "getChar" => {
            if arg_types.is_empty() {
                Ok((IntrinsicName::GetChar, int))
            } else {
                mismatch("expected no arguments")
            }
        }
        "arrayGet" => match arg_types {
            [arr, idx] if *idx == int => match interner.kind(*arr) {
                TypeKind::Array(elem) => Ok((IntrinsicName::ArrayGet, elem)),
                _ => mismatch("expected (Array(T), Int)"),
            },
            _ => mismatch("expected (Array(T), Int)"),
        },
        "arrayLength" => match arg_types {
            [arr] => match interner.kind(*arr) {
                TypeKind::Array(_) => Ok((IntrinsicName::ArrayLength, int)),
                _ => mismatch("expected (Array(T))"),
            },
            _ => mismatch("expected (Array(T))"),
        },
        "arraySplice" => match arg_types {
            [arr, start, count, replacement] if *start == int && *count == int => match interner.kind(*arr) {
                TypeKind::Array(elem) => {
                    let single_ok = *replacement == elem;
                    let array_ok = matches!(interner.kind(*replacement), TypeKind::Array(e) if e == elem);
                    if single_ok || array_ok {
                        Ok((IntrinsicName::ArraySplice, *arr))
                    } else {
                        mismatch("replacement must be T or Array(T)")
                    }
                }
                _ => mismatch("expected (Array(T), Int, Int, T|Array(T))"),
            },
            _ => mismatch("expected (Array(T), Int, Int, T|Array(T))"),
        },
        "stringPush" => match arg_types {
            [s, n] if *s == string && (*n == int || *n == string) => Ok((IntrinsicName::StringPush, string)),
            _ => mismatch("expected (String, Int) or (String, String)"),
        },
        "stringIterator" => match arg_types {
            [s] if *s == string => Ok((IntrinsicName::StringIterator, string_iterator)),
            _ => mismatch("expected (String)"),
        },
        "stringIteratorIsValid" => match arg_types {
            [it] if *it == string_iterator => Ok((IntrinsicName::StringIteratorIsValid, int)),
            _ => mismatch("expected (StringIterator)"),
        },
        "stringIteratorGet" => match arg_types {
            [it] if *it == string_iterator => Ok((IntrinsicName::StringIteratorGet, int)),
            _ => mismatch("expected (StringIterator)"),
        },
        "stringIteratorNext" => match arg_types {
            [it] if *it == string_iterator => Ok((IntrinsicName::StringIteratorNext, string_iterator)),
            _ => mismatch("expected (StringIterator)"),
        },
        "reference" => match arg_types {
            [t] => match interner.kind(*t) {
                TypeKind::Struct(_) | TypeKind::Enum(_) => Ok((IntrinsicName::Reference, interner.reference(*t))),
                _ => mismatch("expected (Struct or Enum)"),
            },
            _ => mismatch("expected (Struct or Enum)"),
        },
        "copy" => match arg_types {
            [t] => Ok((IntrinsicName::Copy, *t)),
            _ => mismatch("expected (T)"),
        },
        "free" => match arg_types {
            [_] => Ok((IntrinsicName::Free, void)),
            _ => mismatch("expected (T)"),
        },
        _ => mismatch("unknown intrinsic"),
    }
}
