//! Lowering of method invocations.
//!
//! Built-in primitives lower directly to target instructions; everything
//! else goes through the call-kind dispatch in `calls`. The low-level
//! memory primitives encode the retain/release discipline managed values
//! demand: boxed and by-reference values are retained through the slot
//! address, simple managed values through the value itself.

use crate::codegen::FunctionCodeGenerator;
use crate::diagnostics::Diagnostic;
use crate::types::{is_managed, is_managed_by_reference};
use glyph_ast::{BuiltIn, MethodExpr, Type};
use inkwell::values::{BasicValue, BasicValueEnum, PointerValue};

impl<'g, 'a> FunctionCodeGenerator<'g, 'a> {
    pub(super) fn lower_method_expr(
        &mut self,
        method: &MethodExpr,
    ) -> Result<Option<BasicValueEnum<'a>>, Diagnostic> {
        if method.built_in != BuiltIn::None {
            let callee = self.lower_expr_value(&method.callee)?;
            match method.built_in {
                BuiltIn::IntegerNot => {
                    let not = self
                        .cg
                        .builder
                        .build_not(callee.into_int_value(), "not")
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                    return Ok(Some(not.as_basic_value_enum()));
                }
                BuiltIn::IntegerToDouble => {
                    let converted = self
                        .cg
                        .builder
                        .build_signed_int_to_float(callee.into_int_value(), self.cg.f64_t, "conv")
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                    return Ok(Some(converted.as_basic_value_enum()));
                }
                BuiltIn::BooleanNegate => {
                    let negated = self
                        .cg
                        .builder
                        .build_int_compare(
                            inkwell::IntPredicate::EQ,
                            self.cg.bool_t.const_zero(),
                            callee.into_int_value(),
                            "negate",
                        )
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                    return Ok(Some(negated.as_basic_value_enum()));
                }
                BuiltIn::Store => {
                    let ty = self.generic_argument(method, 0)?;
                    let offset = self.lower_expr_value(self.parameter(method, 1)?)?;
                    let ptr = self.build_memory_address(callee, offset)?;
                    let value = self.lower_expr_value(self.parameter(method, 0)?)?;
                    self.cg
                        .builder
                        .build_store(ptr, value)
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                    if is_managed(&ty, self.cg.package) {
                        if is_managed_by_reference(&ty, self.cg.package) {
                            self.retain(ptr.as_basic_value_enum())?;
                        } else {
                            self.retain(value)?;
                        }
                    }
                    return Ok(None);
                }
                BuiltIn::Load => {
                    let ty = self.generic_argument(method, 0)?;
                    let offset = self.lower_expr_value(self.parameter(method, 0)?)?;
                    let ptr = self.build_memory_address(callee, offset)?;
                    let value = self
                        .cg
                        .builder
                        .build_load(self.cg.llvm_type_for(&ty), ptr, "loaded")
                        .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                    if is_managed(&ty, self.cg.package) {
                        if is_managed_by_reference(&ty, self.cg.package) {
                            self.retain(ptr.as_basic_value_enum())?;
                        } else {
                            self.retain(value)?;
                        }
                    }
                    return Ok(Some(value));
                }
                BuiltIn::Release => {
                    let ty = self.generic_argument(method, 0)?;
                    if is_managed(&ty, self.cg.package) {
                        let offset = self.lower_expr_value(self.parameter(method, 0)?)?;
                        let ptr = self.build_memory_address(callee, offset)?;
                        if is_managed_by_reference(&ty, self.cg.package) {
                            self.release(ptr.as_basic_value_enum())?;
                        } else {
                            let value = self
                                .cg
                                .builder
                                .build_load(self.cg.llvm_type_for(&ty), ptr, "released")
                                .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
                            self.release(value)?;
                        }
                    }
                    return Ok(None);
                }
                BuiltIn::Multiprotocol => {
                    return self.generate_multiprotocol_call(callee, method);
                }
                BuiltIn::None => unreachable!("guarded above"),
            }
        }

        let callee = self.lower_expr_value(&method.callee)?;
        let result = self.generate_call(method.call_kind, callee, method)?;
        self.handle_result(result, method)
    }

    /// Computes the target address of the memory primitives: the offset is
    /// shifted past the mandatory header pointer at offset zero.
    pub(super) fn build_memory_address(
        &mut self,
        memory: BasicValueEnum<'a>,
        offset: BasicValueEnum<'a>,
    ) -> Result<PointerValue<'a>, Diagnostic> {
        let header = self.cg.ptr_t.size_of();
        let ad_offset = self
            .cg
            .builder
            .build_int_add(offset.into_int_value(), header, "ad_offset")
            .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
        unsafe {
            self.cg
                .builder
                .build_gep(
                    self.cg.i8_t,
                    memory.into_pointer_value(),
                    &[ad_offset],
                    "slot",
                )
                .map_err(|_| Diagnostic::simple("LLVM builder error"))
        }
    }

    pub(super) fn retain(&mut self, target: BasicValueEnum<'a>) -> Result<(), Diagnostic> {
        self.cg
            .builder
            .build_call(self.cg.get_retain(), &[target.into()], "")
            .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
        Ok(())
    }

    pub(super) fn release(&mut self, target: BasicValueEnum<'a>) -> Result<(), Diagnostic> {
        self.cg
            .builder
            .build_call(self.cg.get_release(), &[target.into()], "")
            .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
        Ok(())
    }

    fn parameter<'m>(
        &self,
        method: &'m MethodExpr,
        index: usize,
    ) -> Result<&'m glyph_ast::Expr, Diagnostic> {
        method
            .args
            .parameters
            .get(index)
            .ok_or_else(|| Diagnostic::at(method.position, "missing argument"))
    }

    fn generic_argument(&self, method: &MethodExpr, index: usize) -> Result<Type, Diagnostic> {
        method
            .args
            .generic_arguments
            .get(index)
            .copied()
            .ok_or_else(|| Diagnostic::at(method.position, "missing generic argument"))
    }
}
