//! Per-function lowering of statements and expressions.

use crate::codegen::CodeGen;
use crate::diagnostics::Diagnostic;
use glyph_ast::{Expr, FunctionId, Stmt};
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValue, BasicValueEnum, FunctionValue, PointerValue};

/// Lowers one Glyph function into an LLVM function body. Local variables
/// are addressed by the dense ids the semantic scoper assigned; each id
/// maps to one stack slot, allocated when its declaration is reached
/// (argument slots are allocated up front).
pub struct FunctionCodeGenerator<'g, 'a> {
    pub cg: &'g CodeGen<'a>,
    pub function: FunctionValue<'a>,
    pub fid: FunctionId,
    locals: Vec<Option<(PointerValue<'a>, BasicTypeEnum<'a>)>>,
}

impl<'g, 'a> FunctionCodeGenerator<'g, 'a> {
    pub fn new(cg: &'g CodeGen<'a>, fid: FunctionId, function: FunctionValue<'a>) -> Self {
        let variable_count = cg.package.function(fid).variable_count;
        FunctionCodeGenerator {
            cg,
            function,
            fid,
            locals: vec![None; variable_count],
        }
    }

    pub fn has_receiver(&self) -> bool {
        let func = self.cg.package.function(self.fid);
        func.owner.is_some() && !func.type_method
    }

    pub fn generate(&mut self) -> Result<(), Diagnostic> {
        let entry = self.cg.context.append_basic_block(self.function, "entry");
        self.cg.builder.position_at_end(entry);

        let func = self.cg.package.function(self.fid);
        let param_offset = if self.has_receiver() { 1u32 } else { 0u32 };
        for (i, argument) in func.arguments.iter().enumerate() {
            let ty = self.cg.llvm_type_for(&argument.ty);
            let slot = self
                .cg
                .builder
                .build_alloca(ty, &argument.name)
                .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
            let value = self
                .function
                .get_nth_param(i as u32 + param_offset)
                .ok_or_else(|| Diagnostic::simple("missing function parameter"))?;
            self.cg
                .builder
                .build_store(slot, value)
                .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
            self.set_local(i, slot, ty)?;
        }

        let body = func.body.as_deref().unwrap_or_default();
        self.lower_block(body)?;

        if !self.block_terminated() {
            match func.return_type {
                None => {
                    self.cg
                        .builder
                        .build_return(None)
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                }
                Some(_) => {
                    self.cg
                        .builder
                        .build_unreachable()
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                }
            }
        }
        Ok(())
    }

    fn set_local(
        &mut self,
        id: usize,
        slot: PointerValue<'a>,
        ty: BasicTypeEnum<'a>,
    ) -> Result<(), Diagnostic> {
        if id >= self.locals.len() {
            return Err(Diagnostic::simple("variable id out of range"));
        }
        self.locals[id] = Some((slot, ty));
        Ok(())
    }

    fn local(&self, id: usize) -> Result<(PointerValue<'a>, BasicTypeEnum<'a>), Diagnostic> {
        self.locals
            .get(id)
            .copied()
            .flatten()
            .ok_or_else(|| Diagnostic::simple("variable slot not allocated"))
    }

    pub(super) fn block_terminated(&self) -> bool {
        self.cg
            .builder
            .get_insert_block()
            .and_then(|b| b.get_terminator())
            .is_some()
    }

    pub(super) fn receiver(&self) -> Result<BasicValueEnum<'a>, Diagnostic> {
        if !self.has_receiver() {
            return Err(Diagnostic::simple(
                "receiver is not available in this context",
            ));
        }
        self.function
            .get_nth_param(0)
            .ok_or_else(|| Diagnostic::simple("missing receiver parameter"))
    }

    pub fn lower_block(&mut self, stmts: &[Stmt]) -> Result<(), Diagnostic> {
        for stmt in stmts {
            if self.block_terminated() {
                break;
            }
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    pub fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match stmt {
            Stmt::VariableDeclaration {
                name,
                ty,
                init,
                position,
                id,
                ..
            } => {
                let id = id.ok_or_else(|| {
                    Diagnostic::at(*position, "variable declaration was not analysed")
                })?;
                let llvm_ty = self.cg.llvm_type_for(ty);
                let slot = self
                    .cg
                    .builder
                    .build_alloca(llvm_ty, name)
                    .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                self.set_local(id, slot, llvm_ty)?;
                if let Some(init) = init {
                    let value = self.lower_expr_value(init)?;
                    self.cg
                        .builder
                        .build_store(slot, value)
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                }
                Ok(())
            }
            Stmt::Assignment {
                name,
                value,
                position,
                id,
                in_instance_scope,
            } => {
                let value = self.lower_expr_value(value)?;
                if *in_instance_scope {
                    let slot = self.instance_variable_slot(name, *position)?;
                    self.cg
                        .builder
                        .build_store(slot, value)
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                } else {
                    let id = id
                        .ok_or_else(|| Diagnostic::at(*position, "assignment was not analysed"))?;
                    let (slot, _) = self.local(id)?;
                    self.cg
                        .builder
                        .build_store(slot, value)
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                }
                Ok(())
            }
            Stmt::ExprStmt(expr) => {
                self.lower_expr(expr)?;
                Ok(())
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let cond = self.lower_expr_value(condition)?.into_int_value();
                let then_bb = self.cg.context.append_basic_block(self.function, "then");
                let else_bb = self.cg.context.append_basic_block(self.function, "else");
                let merge_bb = self.cg.context.append_basic_block(self.function, "merge");
                self.cg
                    .builder
                    .build_conditional_branch(cond, then_bb, else_bb)
                    .map_err(|_| Diagnostic::simple("LLVM builder error"))?;

                self.cg.builder.position_at_end(then_bb);
                self.lower_block(then_branch)?;
                if !self.block_terminated() {
                    self.cg
                        .builder
                        .build_unconditional_branch(merge_bb)
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                }

                self.cg.builder.position_at_end(else_bb);
                if let Some(else_branch) = else_branch {
                    self.lower_block(else_branch)?;
                }
                if !self.block_terminated() {
                    self.cg
                        .builder
                        .build_unconditional_branch(merge_bb)
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                }

                self.cg.builder.position_at_end(merge_bb);
                Ok(())
            }
            Stmt::While {
                condition, body, ..
            } => {
                let cond_bb = self.cg.context.append_basic_block(self.function, "cond");
                let body_bb = self.cg.context.append_basic_block(self.function, "loop");
                let merge_bb = self.cg.context.append_basic_block(self.function, "after");
                self.cg
                    .builder
                    .build_unconditional_branch(cond_bb)
                    .map_err(|_| Diagnostic::simple("LLVM builder error"))?;

                self.cg.builder.position_at_end(cond_bb);
                let cond = self.lower_expr_value(condition)?.into_int_value();
                self.cg
                    .builder
                    .build_conditional_branch(cond, body_bb, merge_bb)
                    .map_err(|_| Diagnostic::simple("LLVM builder error"))?;

                self.cg.builder.position_at_end(body_bb);
                self.lower_block(body)?;
                if !self.block_terminated() {
                    self.cg
                        .builder
                        .build_unconditional_branch(cond_bb)
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                }

                self.cg.builder.position_at_end(merge_bb);
                Ok(())
            }
            Stmt::Block(stmts) => self.lower_block(stmts),
            Stmt::Return(value, _) => {
                match value {
                    Some(value) => {
                        let value = self.lower_expr_value(value)?;
                        self.cg
                            .builder
                            .build_return(Some(&value))
                            .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                    }
                    None => {
                        self.cg
                            .builder
                            .build_return(None)
                            .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Lowers an expression, requiring it to produce a value.
    pub fn lower_expr_value(&mut self, expr: &Expr) -> Result<BasicValueEnum<'a>, Diagnostic> {
        self.lower_expr(expr)?
            .ok_or_else(|| Diagnostic::at(expr.position(), "expression produces no value"))
    }

    pub fn lower_expr(&mut self, expr: &Expr) -> Result<Option<BasicValueEnum<'a>>, Diagnostic> {
        match expr {
            Expr::IntegerLiteral(v, _) => {
                Ok(Some(self.cg.i64_t.const_int(*v as u64, true).into()))
            }
            Expr::BooleanLiteral(v, _) => {
                Ok(Some(self.cg.bool_t.const_int(*v as u64, false).into()))
            }
            Expr::DoubleLiteral(v, _) => Ok(Some(self.cg.f64_t.const_float(*v).into())),
            Expr::NothingnessLiteral(_) => Ok(Some(self.cg.ptr_t.const_null().into())),
            Expr::This(_) => Ok(Some(self.receiver()?)),
            Expr::Variable {
                name,
                position,
                id,
                in_instance_scope,
            } => {
                if *in_instance_scope {
                    let slot = self.instance_variable_slot(name, *position)?;
                    let variable = self
                        .cg
                        .lookup_instance_variable(self.fid, name)
                        .ok_or_else(|| Diagnostic::at(*position, "unknown instance variable"))?;
                    let ty = self.cg.llvm_type_for(&variable.ty);
                    let value = self
                        .cg
                        .builder
                        .build_load(ty, slot, name)
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                    return Ok(Some(value));
                }
                let id =
                    id.ok_or_else(|| Diagnostic::at(*position, "variable was not analysed"))?;
                let (slot, ty) = self.local(id)?;
                let value = self
                    .cg
                    .builder
                    .build_load(ty, slot, name)
                    .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                Ok(Some(value))
            }
            Expr::Method(method) => self.lower_method_expr(method),
            Expr::Box { inner, .. } => {
                let value = self.lower_expr_value(inner)?;
                let size = self.cg.i64_t.const_int(16, false);
                let call = self
                    .cg
                    .builder
                    .build_call(self.cg.get_box_alloc(), &[size.into()], "box")
                    .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                let box_ptr = match call.try_as_basic_value() {
                    inkwell::Either::Left(v) => v.into_pointer_value(),
                    _ => return Err(Diagnostic::simple("box allocation returned no value")),
                };
                let payload = self.box_payload_slot(box_ptr)?;
                self.cg
                    .builder
                    .build_store(payload, value)
                    .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                Ok(Some(box_ptr.as_basic_value_enum()))
            }
            Expr::Unbox { inner, ty } => {
                let box_ptr = self.lower_expr_value(inner)?.into_pointer_value();
                let payload = self.box_payload_slot(box_ptr)?;
                let llvm_ty = self.cg.llvm_type_for(ty);
                let value = self
                    .cg
                    .builder
                    .build_load(llvm_ty, payload, "unboxed")
                    .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                Ok(Some(value))
            }
        }
    }

    /// Address of the value slot of a box: one word past the box header.
    fn box_payload_slot(&self, box_ptr: PointerValue<'a>) -> Result<PointerValue<'a>, Diagnostic> {
        let offset = self.cg.i64_t.const_int(8, false);
        unsafe {
            self.cg
                .builder
                .build_gep(self.cg.i8_t, box_ptr, &[offset], "box_payload")
                .map_err(|_| Diagnostic::simple("LLVM builder error"))
        }
    }

    /// Address of an instance variable slot on the receiver: the header
    /// pointer occupies word zero, fields follow one word each.
    fn instance_variable_slot(
        &self,
        name: &str,
        position: glyph_ast::SourcePosition,
    ) -> Result<PointerValue<'a>, Diagnostic> {
        let index = self
            .cg
            .instance_variable_index(self.fid, name)
            .ok_or_else(|| Diagnostic::at(position, "unknown instance variable"))?;
        let receiver = self.receiver()?.into_pointer_value();
        let offset = self
            .cg
            .i64_t
            .const_int(self.cg.instance_variable_offset(index), false);
        unsafe {
            self.cg
                .builder
                .build_gep(self.cg.i8_t, receiver, &[offset], name)
                .map_err(|_| Diagnostic::simple("LLVM builder error"))
        }
    }
}
