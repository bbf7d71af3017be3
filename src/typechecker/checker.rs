//! Pass T's recursive evaluator, adapted to Rust ownership: one
//! [`Evaluator`] per compilation, `&mut self` recursion instead of raw
//! pointers, and `HashMap` lookups instead of pointer-keyed `std::map`.

use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use crate::diagnostics::{
    ArgumentCountMismatch, CompileTimeError, CoreError, CoreResult, IndexOutOfBounds,
    IntrinsicSignature, MissingSwitchCase, NonCallable, NonLiteralArgument, RecursiveReturnType,
    Span, StructFieldMismatch, SuperfluousSwitchCase, TypeMismatch, UndefinedImport,
    UnexpectedSwitchCase, UnsupportedFeature,
};
use crate::interner::{FunctionRef, Interner, StructHandle, Type, TypeKind};
use crate::ir::{self, BinOp, ExprId, ExprKind};
use crate::surface::{
    SurfaceBlock, SurfaceExpr, SurfaceFunction, SurfaceFunctionRef, SurfaceKind, SurfaceProgram,
    SurfaceType,
};

use super::intrinsics;

/// A resolver for `import(path)`: given a path already normalized
/// relative to the importing file, hands back the parsed file. This
/// crate has no lexer or filesystem access of its own; an embedding
/// CLI backs this trait with an actual parser and `std::fs`.
pub trait ImportResolver {
    fn resolve(&self, normalized_path: &str) -> Option<SurfaceProgram>;
}

/// Globally-stable identity for a surface function: which file it came
/// from plus its index within that file's function list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FunctionId {
    file: Rc<str>,
    index: usize,
}

/// Maps `(original function, argument types)` to its specialization's
/// index in the output program. A key present with the callee's
/// `return_type` still `None` means the body is mid-compilation — the
/// marker that lets mutually- and self-recursive calls resolve to the
/// in-progress specialization instead of looping forever.
type FunctionTable = HashMap<(FunctionId, Vec<Type>), usize>;

/// How a `CaseVariable` reference should resolve within the block
/// currently being evaluated: either it denotes a value of a statically
/// known type (the ordinary, non-constant-folded switch case), or it is
/// a direct alias for an already-evaluated payload expression (the
/// compile-time switch-on-literal fold).
#[derive(Clone, Copy)]
enum CaseVar {
    None,
    Type(Type),
    Literal(ExprId),
}

/// What evaluating one surface expression contributed to the
/// surrounding block.
enum Residual {
    /// A newly pushed node; the caller still needs to append it to `out`.
    Fresh(ExprId),
    /// A reference to a node that already lives in some block (a
    /// constant-folded container access, or a `CaseVariable` literal
    /// redirect) — must not be appended again.
    Alias(ExprId),
    /// A literal-folded `If`/`Switch` already spliced its chosen
    /// branch's whole sequence into `out`; this is simply its last id.
    Spliced(Option<ExprId>),
}

pub fn run(interner: &Interner, root: SurfaceProgram, resolver: &dyn ImportResolver) -> CoreResult<ir::Program> {
    let mut eval = Evaluator {
        interner,
        resolver,
        file_table: HashMap::new(),
        function_table: HashMap::new(),
        program: ir::Program::default(),
    };
    let root_path = root.path.clone();
    let root = Rc::new(root);
    eval.file_table.insert(root_path, root.clone());

    let fid = FunctionId { file: Rc::from(root.path.as_str()), index: root.entry };
    eval.specialize(&root, fid, Vec::new())?;
    Ok(eval.program)
}

struct Evaluator<'a> {
    interner: &'a Interner,
    resolver: &'a dyn ImportResolver,
    file_table: HashMap<String, Rc<SurfaceProgram>>,
    function_table: FunctionTable,
    program: ir::Program,
}

impl<'a> Evaluator<'a> {
    fn specialize(&mut self, file: &Rc<SurfaceProgram>, fid: FunctionId, arg_types: Vec<Type>) -> CoreResult<usize> {
        let key = (fid.clone(), arg_types.clone());
        if let Some(&index) = self.function_table.get(&key) {
            if self.program.functions[index].return_type.is_none() {
                return Err(CoreError::RecursiveReturnType(RecursiveReturnType {}, Span::dummy()));
            }
            return Ok(index);
        }

        let src: &SurfaceFunction = &file.functions[fid.index];
        let index = self.program.functions.len();
        trace!("monomorphization: specializing {} as function {index}", src.name.as_deref().unwrap_or("<anonymous>"));
        let mut function = ir::Function::new(arg_types, None);
        function.name = src.name.clone();
        self.program.functions.push(function);
        self.function_table.insert(key, index);

        let mut mapping: HashMap<*const SurfaceExpr, ExprId> = HashMap::new();
        let (block, last) = self.eval_block(index, &mut mapping, file, &src.body, CaseVar::None)?;
        let return_type = last
            .map(|id| self.program.functions[index].node(id).ty)
            .unwrap_or_else(|| self.interner.void());
        let f = &mut self.program.functions[index];
        f.entry = block;
        f.return_type = Some(return_type);
        Ok(index)
    }

    fn push(&mut self, func: usize, kind: ExprKind, ty: Type, span: Span) -> ExprId {
        self.program.functions[func].push(kind, ty, span)
    }

    fn node_kind(&self, func: usize, id: ExprId) -> &ExprKind {
        &self.program.functions[func].node(id).kind
    }

    fn ty(&self, func: usize, id: ExprId) -> Type {
        self.program.functions[func].node(id).ty
    }

    /// Evaluates a whole block into a fresh `ir::Block`.
    fn eval_block(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        block: &SurfaceBlock,
        case_var: CaseVar,
    ) -> CoreResult<(ir::Block, Option<ExprId>)> {
        let mut out = Vec::with_capacity(block.len());
        self.eval_block_into(func, mapping, file, block, case_var, &mut out)?;
        let last = out.last().copied();
        Ok((out, last))
    }

    /// Evaluates a block's expressions, appending their residuals onto
    /// an existing `out` — used both for a block's own fresh list and
    /// for splicing a literal `If`/`Switch` branch directly into its
    /// surrounding block, eliding the branch node entirely.
    fn eval_block_into(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        block: &SurfaceBlock,
        case_var: CaseVar,
        out: &mut ir::Block,
    ) -> CoreResult<()> {
        for expr in block {
            self.eval_expr(func, mapping, file, expr, case_var, out)?;
        }
        Ok(())
    }

    /// Evaluates one surface expression. Ordinary expressions push
    /// exactly one node and append it to `out`; a literal-folded
    /// `If`/`Switch` instead splices its chosen branch's whole residual
    /// sequence into `out`. Returns the id standing for the
    /// expression's value (`None` only for a compile-time-only
    /// intrinsic, which contributes nothing to `out`).
    fn eval_expr(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        expr: &SurfaceExpr,
        case_var: CaseVar,
        out: &mut ir::Block,
    ) -> CoreResult<Option<ExprId>> {
        let span = expr.span.clone();
        let residual: Option<Residual> = match &expr.kind {
            SurfaceKind::IntLiteral(v) => Some(Residual::Fresh(self.push(func, ExprKind::IntLiteral(*v), self.interner.int(), span))),
            SurfaceKind::VoidLiteral => Some(Residual::Fresh(self.push(func, ExprKind::VoidLiteral, self.interner.void(), span))),
            SurfaceKind::StringLiteral(bytes) => Some(Residual::Fresh(self.push(
                func,
                ExprKind::StringLiteral(bytes.clone()),
                self.interner.string(),
                span,
            ))),
            SurfaceKind::TypeLiteral(ty) => {
                let resolved = self.eval_type(ty)?;
                let kind_ty = self.interner.type_of(resolved);
                Some(Residual::Fresh(self.push(func, ExprKind::TypeLiteral(resolved), kind_ty, span)))
            }
            SurfaceKind::ArrayLiteral(elements) => {
                let mut ids = Vec::with_capacity(elements.len());
                let mut elem_ty = None;
                for e in elements {
                    let id = self.require(func, mapping, file, e, case_var, out)?;
                    let t = self.ty(func, id);
                    match elem_ty {
                        Some(prev) => self.expect_eq(prev, t, &e.span)?,
                        None => elem_ty = Some(t),
                    }
                    ids.push(id);
                }
                let elem_ty = elem_ty.unwrap_or_else(|| self.interner.void());
                let ty = self.interner.array(elem_ty);
                Some(Residual::Fresh(self.push(func, ExprKind::ArrayLiteral(ids), ty, span)))
            }
            SurfaceKind::TupleLiteral(elements) => {
                let mut ids = Vec::with_capacity(elements.len());
                let mut tys = Vec::with_capacity(elements.len());
                for e in elements {
                    let id = self.require(func, mapping, file, e, case_var, out)?;
                    tys.push(self.ty(func, id));
                    ids.push(id);
                }
                let ty = self.interner.tuple(tys);
                Some(Residual::Fresh(self.push(func, ExprKind::TupleLiteral(ids), ty, span)))
            }
            SurfaceKind::StructLiteral { type_expr, fields } => Some(Residual::Fresh(self.eval_struct_literal(
                func,
                mapping,
                file,
                type_expr.as_deref(),
                fields,
                case_var,
                out,
                span,
            )?)),
            SurfaceKind::EnumLiteral { enum_type, case_name, payload } => Some(Residual::Fresh(self.eval_enum_literal(
                func,
                mapping,
                file,
                enum_type,
                case_name,
                payload.as_deref(),
                case_var,
                out,
                span,
            )?)),
            SurfaceKind::Binary { op, left, right } => {
                Some(Residual::Fresh(self.eval_binary(func, mapping, file, *op, left, right, case_var, out, span)?))
            }
            SurfaceKind::If { condition, then_block, else_block } => {
                self.eval_if(func, mapping, file, condition, then_block, else_block, case_var, out, span)?
            }
            SurfaceKind::Switch { scrutinee, cases } => {
                self.eval_switch(func, mapping, file, scrutinee, cases, case_var, out, span)?
            }
            SurfaceKind::TupleAccess { tuple, index } => {
                Some(self.eval_tuple_access(func, mapping, file, tuple, *index, case_var, out, span)?)
            }
            SurfaceKind::StructAccess { object, field } => {
                Some(self.eval_struct_access(func, mapping, file, object, field, case_var, out, span)?)
            }
            SurfaceKind::Closure { function, environment } => {
                let mut ids = Vec::with_capacity(environment.len());
                let mut tys = Vec::with_capacity(environment.len());
                for e in environment {
                    let id = self.require(func, mapping, file, e, case_var, out)?;
                    tys.push(self.ty(func, id));
                    ids.push(id);
                }
                let ty = self.interner.closure(FunctionRef(function.0), tys);
                Some(Residual::Fresh(self.push(func, ExprKind::Closure(ids), ty, span)))
            }
            SurfaceKind::ClosureAccess { closure, index } => {
                let cid = self.require(func, mapping, file, closure, case_var, out)?;
                let ct = self.ty(func, cid);
                let elem_ty = match self.interner.kind(ct) {
                    TypeKind::Closure(_, env) => *env
                        .get(*index)
                        .ok_or_else(|| out_of_bounds(*index as i64, env.len(), &expr.span))?,
                    _ => return Err(type_mismatch(self.interner, "Closure", ct, &expr.span)),
                };
                Some(Residual::Fresh(self.push(func, ExprKind::ClosureAccess { closure: cid, index: *index }, elem_ty, span)))
            }
            SurfaceKind::Argument(index) => {
                let ty = self.program.functions[func].argument_types[*index];
                Some(Residual::Fresh(self.push(func, ExprKind::Argument(*index), ty, span)))
            }
            SurfaceKind::CaseVariable => match case_var {
                CaseVar::Literal(id) => Some(Residual::Alias(id)),
                CaseVar::Type(ty) => Some(Residual::Fresh(self.push(func, ExprKind::CaseVariable, ty, span))),
                CaseVar::None => {
                    return Err(CoreError::UnsupportedFeature(
                        UnsupportedFeature { feature: "caseVariable outside a switch case".into() },
                        expr.span.clone(),
                    ))
                }
            },
            SurfaceKind::ClosureCall { closure, arguments } => {
                Some(Residual::Fresh(self.eval_closure_call(func, mapping, file, closure, arguments, case_var, out, span)?))
            }
            SurfaceKind::MethodCall { object, method_name, resolved_method, arguments } => {
                Some(Residual::Fresh(self.eval_method_call(
                    func,
                    mapping,
                    file,
                    object,
                    method_name,
                    *resolved_method,
                    arguments,
                    case_var,
                    out,
                    span,
                )?))
            }
            SurfaceKind::Intrinsic { name, arguments } => self
                .eval_intrinsic(func, mapping, file, name, arguments, case_var, out, span)?
                .map(Residual::Fresh),
            SurfaceKind::Bind { left, right } => {
                let left_id = self.require(func, mapping, file, left, case_var, out)?;
                let right_id = self.require(func, mapping, file, right, case_var, out)?;
                let ty = self.ty(func, right_id);
                Some(Residual::Fresh(self.push(func, ExprKind::Bind { left: left_id, right: right_id }, ty, span)))
            }
            SurfaceKind::Return(value) => {
                let id = self.require(func, mapping, file, value, case_var, out)?;
                let ty = self.ty(func, id);
                Some(Residual::Fresh(self.push(func, ExprKind::Return(id), ty, span)))
            }
        };

        let result = match residual {
            Some(Residual::Fresh(id)) => {
                out.push(id);
                Some(id)
            }
            Some(Residual::Alias(id)) => Some(id),
            Some(Residual::Spliced(last)) => last,
            None => None,
        };
        if let Some(id) = result {
            mapping.insert(expr as *const SurfaceExpr, id);
        }
        Ok(result)
    }

    fn require(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        expr: &SurfaceExpr,
        case_var: CaseVar,
        out: &mut ir::Block,
    ) -> CoreResult<ExprId> {
        self.eval_expr(func, mapping, file, expr, case_var, out)?.ok_or_else(|| {
            CoreError::UnsupportedFeature(
                UnsupportedFeature { feature: "compile-time-only expression used as a value".into() },
                expr.span.clone(),
            )
        })
    }

    fn expect_eq(&self, expected: Type, actual: Type, span: &Span) -> CoreResult<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(type_mismatch(self.interner, &self.interner.display(expected), actual, span))
        }
    }

    fn eval_type(&mut self, ty: &SurfaceType) -> CoreResult<Type> {
        Ok(match ty {
            SurfaceType::Int => self.interner.int(),
            SurfaceType::Void => self.interner.void(),
            SurfaceType::String => self.interner.string(),
            SurfaceType::StringIterator => self.interner.string_iterator(),
            SurfaceType::Array(e) => {
                let e = self.eval_type(e)?;
                self.interner.array(e)
            }
            SurfaceType::Tuple(elems) => {
                let elems = elems.iter().map(|e| self.eval_type(e)).collect::<CoreResult<Vec<_>>>()?;
                self.interner.tuple(elems)
            }
            SurfaceType::Reference(inner) => {
                let inner = self.eval_type(inner)?;
                self.interner.reference(inner)
            }
            SurfaceType::Struct(fields) => {
                let handle: StructHandle = self.interner.fresh_struct();
                let fields = fields
                    .iter()
                    .map(|(n, t)| Ok((n.clone(), self.eval_type(t)?)))
                    .collect::<CoreResult<Vec<_>>>()?;
                self.interner.set_struct_fields(handle, fields);
                handle.0
            }
            SurfaceType::Enum(cases) => {
                let handle = self.interner.fresh_enum();
                let cases = cases
                    .iter()
                    .map(|(n, t)| Ok((n.clone(), self.eval_type(t)?)))
                    .collect::<CoreResult<Vec<_>>>()?;
                self.interner.set_enum_cases(handle, cases);
                handle.0
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_struct_literal(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        type_expr: Option<&SurfaceExpr>,
        fields: &[(String, SurfaceExpr)],
        case_var: CaseVar,
        out: &mut ir::Block,
        span: Span,
    ) -> CoreResult<ExprId> {
        let mut ids = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            let id = self.require(func, mapping, file, value, case_var, out)?;
            ids.push((name.clone(), id));
        }
        let ty = if let Some(texpr) = type_expr {
            let declared_id = self.require(func, mapping, file, texpr, case_var, out)?;
            let declared = match self.node_kind(func, declared_id) {
                ExprKind::TypeLiteral(t) => *t,
                _ => return Err(not_literal("struct type annotation", &texpr.span)),
            };
            match self.interner.kind(declared) {
                TypeKind::Struct(_) => {
                    let declared_fields = self.interner.struct_fields(declared);
                    if declared_fields.len() != ids.len() {
                        return Err(CoreError::StructFieldMismatch(
                            StructFieldMismatch {
                                detail: format!("expected {} fields, found {}", declared_fields.len(), ids.len()),
                            },
                            span.clone(),
                        ));
                    }
                    for (i, (expected_name, expected_ty)) in declared_fields.iter().enumerate() {
                        let (actual_name, actual_id) = &ids[i];
                        if actual_name != expected_name {
                            return Err(CoreError::StructFieldMismatch(
                                StructFieldMismatch {
                                    detail: format!(
                                        "expected field \"{expected_name}\" at position {i}, found \"{actual_name}\""
                                    ),
                                },
                                span.clone(),
                            ));
                        }
                        let actual_ty = self.ty(func, *actual_id);
                        self.expect_eq(*expected_ty, actual_ty, &span)?;
                    }
                    declared
                }
                _ => return Err(type_mismatch(self.interner, "Struct", declared, &texpr.span)),
            }
        } else {
            let handle = self.interner.fresh_struct();
            let field_types = ids.iter().map(|(n, id)| (n.clone(), self.ty(func, *id))).collect();
            self.interner.set_struct_fields(handle, field_types);
            handle.0
        };
        Ok(self.push(func, ExprKind::StructLiteral(ids), ty, span))
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_enum_literal(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        enum_type: &SurfaceExpr,
        case_name: &str,
        payload: Option<&SurfaceExpr>,
        case_var: CaseVar,
        out: &mut ir::Block,
        span: Span,
    ) -> CoreResult<ExprId> {
        let type_id = self.require(func, mapping, file, enum_type, case_var, out)?;
        let ty = match self.node_kind(func, type_id) {
            ExprKind::TypeLiteral(t) => *t,
            _ => return Err(not_literal("enum type", &enum_type.span)),
        };
        let cases = match self.interner.kind(ty) {
            TypeKind::Enum(_) => self.interner.enum_cases(ty),
            _ => return Err(type_mismatch(self.interner, "Enum", ty, &enum_type.span)),
        };
        let case_index = cases.iter().position(|(n, _)| n == case_name).ok_or_else(|| {
            CoreError::StructFieldMismatch(
                StructFieldMismatch { detail: format!("enum has no case \"{case_name}\"") },
                span.clone(),
            )
        })?;
        let payload_ty = cases[case_index].1;
        let payload_id = match payload {
            Some(p) => {
                let id = self.require(func, mapping, file, p, case_var, out)?;
                let actual = self.ty(func, id);
                self.expect_eq(payload_ty, actual, &p.span)?;
                id
            }
            None => {
                let id = self.push(func, ExprKind::VoidLiteral, self.interner.void(), span.clone());
                out.push(id);
                id
            }
        };
        Ok(self.push(func, ExprKind::EnumLiteral { payload: payload_id, case_index }, ty, span))
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_binary(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        op: BinOp,
        left: &SurfaceExpr,
        right: &SurfaceExpr,
        case_var: CaseVar,
        out: &mut ir::Block,
        span: Span,
    ) -> CoreResult<ExprId> {
        let left_id = self.require(func, mapping, file, left, case_var, out)?;
        let right_id = self.require(func, mapping, file, right, case_var, out)?;
        let lt = self.ty(func, left_id);
        let rt = self.ty(func, right_id);
        let int = self.interner.int();

        if let TypeKind::TypeOfType(lv) = self.interner.kind(lt) {
            if let TypeKind::TypeOfType(rv) = self.interner.kind(rt) {
                let result = match op {
                    BinOp::Eq => (lv == rv) as i32,
                    BinOp::Ne => (lv != rv) as i32,
                    _ => {
                        return Err(CoreError::UnsupportedFeature(
                            UnsupportedFeature { feature: "non-equality comparison between type values".into() },
                            span,
                        ))
                    }
                };
                return Ok(self.push(func, ExprKind::IntLiteral(result), int, span));
            }
        }

        self.expect_eq(int, lt, &left.span)?;
        self.expect_eq(int, rt, &right.span)?;

        if let (ExprKind::IntLiteral(a), ExprKind::IntLiteral(b)) = (self.node_kind(func, left_id), self.node_kind(func, right_id)) {
            let (a, b) = (*a, *b);
            let folded = match op {
                BinOp::Add => a.wrapping_add(b),
                BinOp::Sub => a.wrapping_sub(b),
                BinOp::Mul => a.wrapping_mul(b),
                BinOp::Div => {
                    if b == 0 {
                        return Err(compile_time_error("division by zero", &span));
                    }
                    a.wrapping_div(b)
                }
                BinOp::Rem => {
                    if b == 0 {
                        return Err(compile_time_error("division by zero", &span));
                    }
                    a.wrapping_rem(b)
                }
                BinOp::Eq => (a == b) as i32,
                BinOp::Ne => (a != b) as i32,
                BinOp::Lt => (a < b) as i32,
                BinOp::Le => (a <= b) as i32,
                BinOp::Gt => (a > b) as i32,
                BinOp::Ge => (a >= b) as i32,
            };
            return Ok(self.push(func, ExprKind::IntLiteral(folded), int, span));
        }

        Ok(self.push(func, ExprKind::Binary { op, left: left_id, right: right_id }, int, span))
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_if(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        condition: &SurfaceExpr,
        then_block: &SurfaceBlock,
        else_block: &SurfaceBlock,
        case_var: CaseVar,
        out: &mut ir::Block,
        span: Span,
    ) -> CoreResult<Option<Residual>> {
        let cond_id = self.require(func, mapping, file, condition, case_var, out)?;
        let cond_ty = self.ty(func, cond_id);
        self.expect_eq(self.interner.int(), cond_ty, &condition.span)?;

        if let ExprKind::IntLiteral(v) = self.node_kind(func, cond_id) {
            let chosen = if *v != 0 { then_block } else { else_block };
            self.eval_block_into(func, mapping, file, chosen, case_var, out)?;
            return Ok(Some(Residual::Spliced(out.last().copied())));
        }

        let (then_ids, then_last) = self.eval_block(func, mapping, file, then_block, case_var)?;
        let (else_ids, else_last) = self.eval_block(func, mapping, file, else_block, case_var)?;
        let then_ty = then_last.map(|id| self.ty(func, id)).unwrap_or_else(|| self.interner.void());
        let else_ty = else_last.map(|id| self.ty(func, id)).unwrap_or_else(|| self.interner.void());
        self.expect_eq(then_ty, else_ty, &span)?;
        Ok(Some(Residual::Fresh(self.push(
            func,
            ExprKind::If { condition: cond_id, then_block: then_ids, else_block: else_ids },
            then_ty,
            span,
        ))))
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_switch(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        scrutinee: &SurfaceExpr,
        cases: &[(String, SurfaceBlock)],
        case_var: CaseVar,
        out: &mut ir::Block,
        span: Span,
    ) -> CoreResult<Option<Residual>> {
        let scrutinee_id = self.require(func, mapping, file, scrutinee, case_var, out)?;
        let scrutinee_ty = self.ty(func, scrutinee_id);
        let enum_cases = match self.interner.kind(scrutinee_ty) {
            TypeKind::Enum(_) => self.interner.enum_cases(scrutinee_ty),
            _ => return Err(type_mismatch(self.interner, "Enum", scrutinee_ty, &scrutinee.span)),
        };
        if cases.len() > enum_cases.len() {
            return Err(CoreError::SuperfluousSwitchCase(
                SuperfluousSwitchCase { case_name: cases[enum_cases.len()].0.clone() },
                span,
            ));
        }
        if cases.len() < enum_cases.len() {
            return Err(CoreError::MissingSwitchCase(
                MissingSwitchCase { case_name: enum_cases[cases.len()].0.clone() },
                span,
            ));
        }
        for (i, (expected, _)) in enum_cases.iter().enumerate() {
            if &cases[i].0 != expected {
                return Err(CoreError::UnexpectedSwitchCase(
                    UnexpectedSwitchCase { expected: expected.clone(), actual: cases[i].0.clone() },
                    span,
                ));
            }
        }

        if let ExprKind::EnumLiteral { payload, case_index } = *self.node_kind(func, scrutinee_id) {
            let (_, body) = &cases[case_index];
            self.eval_block_into(func, mapping, file, body, CaseVar::Literal(payload), out)?;
            return Ok(Some(Residual::Spliced(out.last().copied())));
        }

        let mut result_ty = None;
        let mut lowered = Vec::with_capacity(cases.len());
        for (i, (name, body)) in cases.iter().enumerate() {
            let payload_ty = enum_cases[i].1;
            let (block, last) = self.eval_block(func, mapping, file, body, CaseVar::Type(payload_ty))?;
            let ty = last.map(|id| self.ty(func, id)).unwrap_or_else(|| self.interner.void());
            match result_ty {
                Some(prev) => self.expect_eq(prev, ty, &span)?,
                None => result_ty = Some(ty),
            }
            lowered.push((name.clone(), block));
        }
        let ty = result_ty.unwrap_or_else(|| self.interner.void());
        Ok(Some(Residual::Fresh(self.push(func, ExprKind::Switch { scrutinee: scrutinee_id, cases: lowered }, ty, span))))
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_tuple_access(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        tuple: &SurfaceExpr,
        index: usize,
        case_var: CaseVar,
        out: &mut ir::Block,
        span: Span,
    ) -> CoreResult<Residual> {
        let tuple_id = self.require(func, mapping, file, tuple, case_var, out)?;
        let tuple_ty = self.ty(func, tuple_id);
        let elems = match self.interner.kind(tuple_ty) {
            TypeKind::Tuple(elems) => elems,
            _ => return Err(type_mismatch(self.interner, "Tuple", tuple_ty, &tuple.span)),
        };
        let elem_ty = *elems.get(index).ok_or_else(|| out_of_bounds(index as i64, elems.len(), &span))?;
        if let ExprKind::TupleLiteral(ids) = self.node_kind(func, tuple_id) {
            return Ok(Residual::Alias(ids[index]));
        }
        Ok(Residual::Fresh(self.push(func, ExprKind::TupleAccess { tuple: tuple_id, index }, elem_ty, span)))
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_struct_access(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        object: &SurfaceExpr,
        field: &str,
        case_var: CaseVar,
        out: &mut ir::Block,
        span: Span,
    ) -> CoreResult<Residual> {
        let object_id = self.require(func, mapping, file, object, case_var, out)?;
        let object_ty = self.ty(func, object_id);

        // A type-value struct access denotes a nullary enum case
        // construction when the referent is an enum.
        if let TypeKind::TypeOfType(inner) = self.interner.kind(object_ty) {
            if let TypeKind::Enum(_) = self.interner.kind(inner) {
                let cases = self.interner.enum_cases(inner);
                let case_index = cases.iter().position(|(n, _)| n == field).ok_or_else(|| {
                    CoreError::StructFieldMismatch(
                        StructFieldMismatch { detail: format!("enum has no case \"{field}\"") },
                        span.clone(),
                    )
                })?;
                let payload = self.push(func, ExprKind::VoidLiteral, self.interner.void(), span.clone());
                out.push(payload);
                return Ok(Residual::Fresh(self.push(func, ExprKind::EnumLiteral { payload, case_index }, inner, span)));
            }
        }

        let fields = match self.interner.kind(object_ty) {
            TypeKind::Struct(_) => self.interner.struct_fields(object_ty),
            _ => return Err(type_mismatch(self.interner, "Struct", object_ty, &object.span)),
        };
        let field_index = fields.iter().position(|(n, _)| n == field).ok_or_else(|| {
            CoreError::StructFieldMismatch(StructFieldMismatch { detail: format!("no field \"{field}\"") }, span.clone())
        })?;
        let field_ty = fields[field_index].1;
        if let ExprKind::StructLiteral(ids) = self.node_kind(func, object_id) {
            return Ok(Residual::Alias(ids[field_index].1));
        }
        Ok(Residual::Fresh(self.push(func, ExprKind::StructAccess { object: object_id, field: field.to_string() }, field_ty, span)))
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_closure_call(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        closure: &SurfaceExpr,
        arguments: &[SurfaceExpr],
        case_var: CaseVar,
        out: &mut ir::Block,
        span: Span,
    ) -> CoreResult<ExprId> {
        let closure_id = self.require(func, mapping, file, closure, case_var, out)?;
        let closure_ty = self.ty(func, closure_id);
        let fn_ref = match self.interner.kind(closure_ty) {
            TypeKind::Closure(f, _env) => f,
            _ => return Err(not_callable(self.interner, closure_ty, &closure.span)),
        };
        self.call(func, mapping, file, fn_ref, None, arguments, case_var, out, span)
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_method_call(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        object: &SurfaceExpr,
        method_name: &str,
        resolved_method: SurfaceFunctionRef,
        arguments: &[SurfaceExpr],
        case_var: CaseVar,
        out: &mut ir::Block,
        span: Span,
    ) -> CoreResult<ExprId> {
        let object_id = self.require(func, mapping, file, object, case_var, out)?;
        let object_ty = self.ty(func, object_id);

        // Uniform call syntax: a closure-valued field on the receiver's
        // struct type takes priority over the resolved associated function.
        if let TypeKind::Struct(_) = self.interner.kind(object_ty) {
            let fields = self.interner.struct_fields(object_ty);
            if let Some(pos) = fields.iter().position(|(n, _)| n == method_name) {
                if let TypeKind::Closure(fn_ref, _env) = self.interner.kind(fields[pos].1) {
                    let field_id = if let ExprKind::StructLiteral(ids) = self.node_kind(func, object_id) {
                        ids[pos].1
                    } else {
                        self.push(
                            func,
                            ExprKind::StructAccess { object: object_id, field: method_name.to_string() },
                            fields[pos].1,
                            span.clone(),
                        )
                    };
                    return self.call(func, mapping, file, fn_ref, Some(field_id), arguments, case_var, out, span);
                }
            }
        }

        self.call(func, mapping, file, FunctionRef(resolved_method.0), Some(object_id), arguments, case_var, out, span)
    }

    /// Resolves and specializes a call to surface function `fn_ref` in
    /// `file`. `receiver` (a closure's captured value, or a method's
    /// `self`) is prepended to the evaluated arguments — the surface
    /// function sees it as an ordinary leading argument.
    #[allow(clippy::too_many_arguments)]
    fn call(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        fn_ref: FunctionRef,
        receiver: Option<ExprId>,
        arguments: &[SurfaceExpr],
        case_var: CaseVar,
        out: &mut ir::Block,
        span: Span,
    ) -> CoreResult<ExprId> {
        let mut arg_ids = Vec::with_capacity(arguments.len() + 1);
        arg_ids.extend(receiver);
        for a in arguments {
            arg_ids.push(self.require(func, mapping, file, a, case_var, out)?);
        }
        let arg_types: Vec<Type> = arg_ids.iter().map(|id| self.ty(func, *id)).collect();

        let fid = FunctionId { file: Rc::from(file.path.as_str()), index: fn_ref.0 };
        let callee_index = self.specialize(file, fid, arg_types)?;

        let expected_len = self.program.functions[callee_index].argument_types.len();
        if expected_len != arg_ids.len() {
            return Err(CoreError::ArgumentCountMismatch(
                ArgumentCountMismatch { expected: expected_len, actual: arg_ids.len() },
                span,
            ));
        }
        let return_ty = self.program.functions[callee_index].return_type.expect("specialize always sets return_type");
        Ok(self.push(func, ExprKind::Call { function: callee_index, arguments: arg_ids }, return_ty, span))
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_intrinsic(
        &mut self,
        func: usize,
        mapping: &mut HashMap<*const SurfaceExpr, ExprId>,
        file: &Rc<SurfaceProgram>,
        name: &str,
        arguments: &[SurfaceExpr],
        case_var: CaseVar,
        out: &mut ir::Block,
        span: Span,
    ) -> CoreResult<Option<ExprId>> {
        match name {
            "typeOf" => {
                let [arg] = arguments else { return Err(arity_error(name, &span)) };
                let id = self.require(func, mapping, file, arg, case_var, out)?;
                let ty = self.ty(func, id);
                let kind_ty = self.interner.type_of(ty);
                return Ok(Some(self.push(func, ExprKind::TypeLiteral(ty), kind_ty, span)));
            }
            "arrayType" | "referenceType" => {
                let [arg] = arguments else { return Err(arity_error(name, &span)) };
                let id = self.require(func, mapping, file, arg, case_var, out)?;
                let inner = match self.node_kind(func, id) {
                    ExprKind::TypeLiteral(t) => *t,
                    _ => return Err(not_literal(name, &arg.span)),
                };
                let result = if name == "arrayType" { self.interner.array(inner) } else { self.interner.reference(inner) };
                let kind_ty = self.interner.type_of(result);
                return Ok(Some(self.push(func, ExprKind::TypeLiteral(result), kind_ty, span)));
            }
            "tupleType" => {
                let [arg] = arguments else { return Err(arity_error(name, &span)) };
                let id = self.require(func, mapping, file, arg, case_var, out)?;
                let elements = match self.node_kind(func, id) {
                    ExprKind::TupleLiteral(elements) => elements.clone(),
                    _ => return Err(not_literal(name, &arg.span)),
                };
                let mut element_types = Vec::with_capacity(elements.len());
                for element in elements {
                    match self.node_kind(func, element) {
                        ExprKind::TypeLiteral(t) => element_types.push(*t),
                        _ => return Err(not_literal(name, &arg.span)),
                    }
                }
                let result = self.interner.tuple(element_types);
                let kind_ty = self.interner.type_of(result);
                return Ok(Some(self.push(func, ExprKind::TypeLiteral(result), kind_ty, span)));
            }
            "error" => {
                let [arg] = arguments else { return Err(arity_error(name, &span)) };
                let id = self.require(func, mapping, file, arg, case_var, out)?;
                let message = match self.node_kind(func, id) {
                    ExprKind::StringLiteral(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                    _ => return Err(not_literal("error", &arg.span)),
                };
                return Err(compile_time_error(&message, &span));
            }
            "import" => {
                let [arg] = arguments else { return Err(arity_error(name, &span)) };
                let id = self.require(func, mapping, file, arg, case_var, out)?;
                let path = match self.node_kind(func, id) {
                    ExprKind::StringLiteral(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                    _ => return Err(not_literal("import", &arg.span)),
                };
                let normalized = normalize_import_path(&file.path, &path);
                let imported = match self.file_table.get(&normalized) {
                    Some(cached) => cached.clone(),
                    None => {
                        let parsed = self.resolver.resolve(&normalized).ok_or_else(|| {
                            CoreError::UndefinedImport(UndefinedImport { path: normalized.clone() }, span.clone())
                        })?;
                        let rc = Rc::new(parsed);
                        self.file_table.insert(normalized.clone(), rc.clone());
                        rc
                    }
                };
                let entry = imported.entry;
                let fid = FunctionId { file: Rc::from(normalized.as_str()), index: entry };
                let callee_index = self.specialize(&imported, fid, Vec::new())?;
                let return_ty = self.program.functions[callee_index].return_type.unwrap();
                return Ok(Some(self.push(
                    func,
                    ExprKind::Call { function: callee_index, arguments: Vec::new() },
                    return_ty,
                    span,
                )));
            }
            _ => {}
        }

        let mut arg_ids = Vec::with_capacity(arguments.len());
        for a in arguments {
            arg_ids.push(self.require(func, mapping, file, a, case_var, out)?);
        }
        let arg_types: Vec<Type> = arg_ids.iter().map(|id| self.ty(func, *id)).collect();
        let (ir_name, result_ty) = intrinsics::check(self.interner, name, &arg_types).map_err(|detail| {
            CoreError::IntrinsicSignature(IntrinsicSignature { name: name.to_string(), detail }, span.clone())
        })?;
        Ok(Some(self.push(func, ExprKind::Intrinsic { name: ir_name, arguments: arg_ids }, result_ty, span)))
    }
}

/// Resolves `imported` (a path written in an `import(...)` call) against
/// the directory containing `current_file`, collapsing `..` components.
/// Absolute paths (leading `/`) pass through unchanged.
fn normalize_import_path(current_file: &str, imported: &str) -> String {
    if let Some(stripped) = imported.strip_prefix('/') {
        return format!("/{stripped}");
    }
    let base = std::path::Path::new(current_file).parent().unwrap_or_else(|| std::path::Path::new(""));
    let joined = base.join(imported);
    let mut parts: Vec<&str> = Vec::new();
    for component in joined.components() {
        match component {
            std::path::Component::ParentDir => {
                parts.pop();
            }
            std::path::Component::Normal(s) => parts.push(s.to_str().unwrap_or("")),
            _ => {}
        }
    }
    parts.join("/")
}

fn type_mismatch(interner: &Interner, expected: &str, actual: Type, span: &Span) -> CoreError {
    CoreError::TypeMismatch(TypeMismatch { expected: expected.to_string(), actual: interner.display(actual) }, span.clone())
}

fn not_callable(interner: &Interner, found: Type, span: &Span) -> CoreError {
    CoreError::NonCallable(NonCallable { found: interner.display(found) }, span.clone())
}

fn not_literal(what: &str, span: &Span) -> CoreError {
    CoreError::NonLiteralArgument(NonLiteralArgument { intrinsic: what.to_string() }, span.clone())
}

fn out_of_bounds(index: i64, len: usize, span: &Span) -> CoreError {
    CoreError::IndexOutOfBounds(IndexOutOfBounds { index, len }, span.clone())
}

fn compile_time_error(message: &str, span: &Span) -> CoreError {
    CoreError::CompileTimeError(CompileTimeError { message: message.to_string() }, span.clone())
}

fn arity_error(name: &str, span: &Span) -> CoreError {
    CoreError::IntrinsicSignature(
        IntrinsicSignature { name: name.to_string(), detail: "expected exactly one argument".to_string() },
        span.clone(),
    )
}
