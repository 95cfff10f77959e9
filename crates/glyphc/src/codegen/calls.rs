//! The general call path, parameterised by call kind.
//!
//! A single tagged [`CallKind`] selector replaces a hierarchy of code
//! generators: statically resolved kinds emit a direct call to the target
//! symbol, dynamic kinds load a function pointer out of the receiver's
//! class table or a protocol conformance table and call indirectly. All
//! kinds share argument lowering and result handling.

use crate::codegen::FunctionCodeGenerator;
use crate::diagnostics::Diagnostic;
use crate::types::is_managed;
use glyph_ast::{CallKind, FunctionId, MethodExpr};
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, CallSiteValue, PointerValue};

impl<'g, 'a> FunctionCodeGenerator<'g, 'a> {
    /// Emits a call of `method` on the already-lowered `callee` value.
    pub(super) fn generate_call(
        &mut self,
        kind: CallKind,
        callee: BasicValueEnum<'a>,
        method: &MethodExpr,
    ) -> Result<Option<BasicValueEnum<'a>>, Diagnostic> {
        let args = self.lower_call_arguments(callee, method)?;
        let call = match kind {
            CallKind::Static | CallKind::DynamicStatic | CallKind::TypeMethod => {
                let target = self.cg.resolve_heir(method.method);
                let function = self.cg.declare_function(target);
                self.cg
                    .builder
                    .build_call(function, &args, "call")
                    .map_err(|_| Diagnostic::simple("LLVM builder error"))?
            }
            CallKind::Dynamic => {
                // The class table pointer occupies the first word of every
                // object.
                let object = callee.into_pointer_value();
                let table = self
                    .cg
                    .builder
                    .build_load(self.cg.ptr_t, object, "class_table")
                    .map_err(|_| Diagnostic::simple("LLVM builder error"))?
                    .into_pointer_value();
                let index = self.method_table_index(method.method, method)?;
                self.build_table_call(table, index, method, &args, "dynamic_call")?
            }
            CallKind::ProtocolDispatch => {
                let table = self.load_conformance_table(callee, None)?;
                let index = self.method_table_index(method.method, method)?;
                self.build_table_call(table, index, method, &args, "protocol_call")?
            }
            CallKind::Multiprotocol => {
                let table =
                    self.load_conformance_table(callee, Some(method.args.multiprotocol_n))?;
                let index = self.method_table_index(method.method, method)?;
                self.build_table_call(table, index, method, &args, "multiprotocol_call")?
            }
        };
        match call.try_as_basic_value() {
            inkwell::Either::Left(value) => Ok(Some(value)),
            inkwell::Either::Right(_) => Ok(None),
        }
    }

    /// Emits a multiprotocol dispatch: the n-th protocol table is selected
    /// from the callee's conformance vector and the call goes through it.
    pub(super) fn generate_multiprotocol_call(
        &mut self,
        callee: BasicValueEnum<'a>,
        method: &MethodExpr,
    ) -> Result<Option<BasicValueEnum<'a>>, Diagnostic> {
        self.generate_call(CallKind::Multiprotocol, callee, method)
    }

    /// Roots managed return values for the duration of the statement.
    pub(super) fn handle_result(
        &mut self,
        result: Option<BasicValueEnum<'a>>,
        method: &MethodExpr,
    ) -> Result<Option<BasicValueEnum<'a>>, Diagnostic> {
        let Some(value) = result else {
            return Ok(None);
        };
        let returns_managed = self
            .cg
            .package
            .function(method.method)
            .return_type
            .map(|t| is_managed(&t, self.cg.package))
            .unwrap_or(false);
        if returns_managed {
            self.cg
                .builder
                .build_call(self.cg.get_root_temporary(), &[value.into()], "")
                .map_err(|_| Diagnostic::simple("LLVM builder error"))?;
        }
        Ok(Some(value))
    }

    fn lower_call_arguments(
        &mut self,
        callee: BasicValueEnum<'a>,
        method: &MethodExpr,
    ) -> Result<Vec<BasicMetadataValueEnum<'a>>, Diagnostic> {
        let mut args: Vec<BasicMetadataValueEnum<'a>> = Vec::new();
        args.push(callee.into());
        for parameter in &method.args.parameters {
            args.push(self.lower_expr_value(parameter)?.into());
        }
        Ok(args)
    }

    /// Loads the conformance table out of a boxed callee. The table
    /// pointer lives one word into the box; for multiprotocol values that
    /// word holds a vector of tables and `multiprotocol_n` selects one.
    fn load_conformance_table(
        &mut self,
        callee: BasicValueEnum<'a>,
        multiprotocol_n: Option<usize>,
    ) -> Result<PointerValue<'a>, Diagnostic> {
        let box_ptr = callee.into_pointer_value();
        let offset = self.cg.i64_t.const_int(8, false);
        let slot = unsafe {
            self.cg
                .builder
                .build_gep(self.cg.i8_t, box_ptr, &[offset], "conformance_slot")
                .map_err(|_| Diagnostic::simple("LLVM builder error"))?
        };
        let mut table = self
            .cg
            .builder
            .build_load(self.cg.ptr_t, slot, "conformance")
            .map_err(|_| Diagnostic::simple("LLVM builder error"))?
            .into_pointer_value();
        if let Some(n) = multiprotocol_n {
            let entry = unsafe {
                self.cg
                    .builder
                    .build_gep(
                        self.cg.ptr_t,
                        table,
                        &[self.cg.i64_t.const_int(n as u64, false)],
                        "protocol_table_slot",
                    )
                    .map_err(|_| Diagnostic::simple("LLVM builder error"))?
            };
            table = self
                .cg
                .builder
                .build_load(self.cg.ptr_t, entry, "protocol_table")
                .map_err(|_| Diagnostic::simple("LLVM builder error"))?
                .into_pointer_value();
        }
        Ok(table)
    }

    /// Loads the function pointer at `index` in a dispatch table and calls
    /// it indirectly with the signature of the invoked method.
    fn build_table_call(
        &mut self,
        table: PointerValue<'a>,
        index: usize,
        method: &MethodExpr,
        args: &[BasicMetadataValueEnum<'a>],
        name: &str,
    ) -> Result<CallSiteValue<'a>, Diagnostic> {
        let slot = unsafe {
            self.cg
                .builder
                .build_gep(
                    self.cg.ptr_t,
                    table,
                    &[self.cg.i64_t.const_int(index as u64, false)],
                    "method_slot",
                )
                .map_err(|_| Diagnostic::simple("LLVM builder error"))?
        };
        let target = self
            .cg
            .builder
            .build_load(self.cg.ptr_t, slot, "method_fn")
            .map_err(|_| Diagnostic::simple("LLVM builder error"))?
            .into_pointer_value();
        let fn_type = self.cg.llvm_function_type(method.method);
        self.cg
            .builder
            .build_indirect_call(fn_type, target, args, name)
            .map_err(|_| Diagnostic::simple("LLVM builder error"))
    }

    /// Index of a method in its owner's dispatch table.
    fn method_table_index(
        &self,
        function: FunctionId,
        method: &MethodExpr,
    ) -> Result<usize, Diagnostic> {
        let owner = self
            .cg
            .package
            .function(function)
            .owner
            .ok_or_else(|| Diagnostic::at(method.position, "method has no owning type"))?;
        self.cg
            .package
            .def(owner)
            .methods
            .iter()
            .position(|&m| m == function)
            .ok_or_else(|| Diagnostic::at(method.position, "method missing from dispatch table"))
    }
}
