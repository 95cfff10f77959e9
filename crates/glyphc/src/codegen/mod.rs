//! Top-level codegen module
//!
//! This module provides the `CodeGen` structure which holds the LLVM
//! `Context`, `Module`, `Builder`, caches for frequently used LLVM types,
//! and lazily added declarations of runtime helper functions. The lowering
//! pipeline is organized across submodules:
//! - `function` : per-function lowering of statements and expressions
//! - `method`   : method invocations, including the built-in primitives
//! - `calls`    : call-kind dispatch for the general call path
//!
//! `CodeGen` exposes getters for runtime helper functions (for example
//! `get_retain`, `get_release`) which lazily add declarations to the LLVM
//! module. This centralization ensures consistent ABI types for these
//! helpers and avoids duplicate declarations.

use crate::diagnostics::Diagnostic;
use glyph_ast::{FunctionId, Package, PrimitiveKind, Type, TypeDefKind};
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType};
use inkwell::values::FunctionValue;
use inkwell::AddressSpace;
use std::cell::RefCell;
use std::collections::HashMap;

pub mod calls;
pub mod function;
pub mod method;

pub use function::FunctionCodeGenerator;

/// Names of the runtime entry points the generated code calls into.
pub mod runtime_names {
    pub const RETAIN: &str = "glyph_retain";
    pub const RELEASE: &str = "glyph_release";
    pub const ROOT_TEMPORARY: &str = "glyph_root_temporary";
    pub const BOX_ALLOC: &str = "glyph_box_alloc";
}

/// Main code generation context holding LLVM state and caches.
pub struct CodeGen<'a> {
    /// LLVM context
    pub context: &'a Context,
    /// LLVM module being generated
    pub module: Module<'a>,
    /// LLVM IR builder
    pub builder: Builder<'a>,
    /// The analysed package being lowered
    pub package: &'a Package,
    /// Appointed-heir table produced by protocol finalisation
    pub heirs: &'a HashMap<FunctionId, FunctionId>,
    /// Cached LLVM type: f64
    pub f64_t: inkwell::types::FloatType<'a>,
    /// Cached LLVM type: i64
    pub i64_t: inkwell::types::IntType<'a>,
    /// Cached LLVM type: i32
    pub i32_t: inkwell::types::IntType<'a>,
    /// Cached LLVM type: i8
    pub i8_t: inkwell::types::IntType<'a>,
    /// Cached LLVM type: bool (i1)
    pub bool_t: inkwell::types::IntType<'a>,
    /// Cached LLVM type: opaque pointer
    pub ptr_t: inkwell::types::PointerType<'a>,
    /// Runtime function: glyph_retain
    fn_retain: RefCell<Option<FunctionValue<'a>>>,
    /// Runtime function: glyph_release
    fn_release: RefCell<Option<FunctionValue<'a>>>,
    /// Runtime function: glyph_root_temporary
    fn_root_temporary: RefCell<Option<FunctionValue<'a>>>,
    /// Runtime function: glyph_box_alloc
    fn_box_alloc: RefCell<Option<FunctionValue<'a>>>,
}

impl<'a> CodeGen<'a> {
    pub fn new(
        context: &'a Context,
        package: &'a Package,
        heirs: &'a HashMap<FunctionId, FunctionId>,
        module_name: &str,
    ) -> Self {
        let module = context.create_module(module_name);
        let builder = context.create_builder();
        CodeGen {
            context,
            module,
            builder,
            package,
            heirs,
            f64_t: context.f64_type(),
            i64_t: context.i64_type(),
            i32_t: context.i32_type(),
            i8_t: context.i8_type(),
            bool_t: context.bool_type(),
            ptr_t: context.ptr_type(AddressSpace::default()),
            fn_retain: RefCell::new(None),
            fn_release: RefCell::new(None),
            fn_root_temporary: RefCell::new(None),
            fn_box_alloc: RefCell::new(None),
        }
    }

    // --- Runtime Helper Function Getters ---

    pub fn get_retain(&self) -> FunctionValue<'a> {
        if let Some(f) = *self.fn_retain.borrow() {
            return f;
        }
        let fn_type = self
            .context
            .void_type()
            .fn_type(&[self.ptr_t.into()], false);
        let f = self.module.add_function(runtime_names::RETAIN, fn_type, None);
        *self.fn_retain.borrow_mut() = Some(f);
        f
    }

    pub fn get_release(&self) -> FunctionValue<'a> {
        if let Some(f) = *self.fn_release.borrow() {
            return f;
        }
        let fn_type = self
            .context
            .void_type()
            .fn_type(&[self.ptr_t.into()], false);
        let f = self
            .module
            .add_function(runtime_names::RELEASE, fn_type, None);
        *self.fn_release.borrow_mut() = Some(f);
        f
    }

    pub fn get_root_temporary(&self) -> FunctionValue<'a> {
        if let Some(f) = *self.fn_root_temporary.borrow() {
            return f;
        }
        let fn_type = self
            .context
            .void_type()
            .fn_type(&[self.ptr_t.into()], false);
        let f = self
            .module
            .add_function(runtime_names::ROOT_TEMPORARY, fn_type, None);
        *self.fn_root_temporary.borrow_mut() = Some(f);
        f
    }

    pub fn get_box_alloc(&self) -> FunctionValue<'a> {
        if let Some(f) = *self.fn_box_alloc.borrow() {
            return f;
        }
        // glyph_box_alloc(i64) -> ptr
        let fn_type = self.ptr_t.fn_type(&[self.i64_t.into()], false);
        let f = self
            .module
            .add_function(runtime_names::BOX_ALLOC, fn_type, None);
        *self.fn_box_alloc.borrow_mut() = Some(f);
        f
    }

    // --- Types and symbols ---

    /// Maps a Glyph type to its LLVM ABI type. Class references, boxes,
    /// and by-reference composites lower to opaque pointers.
    pub fn llvm_type_for(&self, ty: &Type) -> BasicTypeEnum<'a> {
        match &self.package.def(ty.def).kind {
            TypeDefKind::ValueType { primitive } => match primitive {
                Some(PrimitiveKind::Integer) => self.i64_t.into(),
                Some(PrimitiveKind::Boolean) => self.bool_t.into(),
                Some(PrimitiveKind::Double) => self.f64_t.into(),
                Some(PrimitiveKind::Symbol) => self.i32_t.into(),
                Some(PrimitiveKind::Memory) => self.ptr_t.into(),
                None => self.ptr_t.into(),
            },
            TypeDefKind::Class { .. } | TypeDefKind::Protocol => self.ptr_t.into(),
        }
    }

    /// The LLVM function type of a Glyph function. Instance callables take
    /// the receiver as the leading parameter.
    pub fn llvm_function_type(&self, function: FunctionId) -> FunctionType<'a> {
        let func = self.package.function(function);
        let mut params: Vec<BasicMetadataTypeEnum<'a>> = Vec::new();
        if func.owner.is_some() && !func.type_method {
            params.push(self.ptr_t.into());
        }
        for argument in &func.arguments {
            params.push(self.llvm_type_for(&argument.ty).into());
        }
        match &func.return_type {
            Some(ret) => self.llvm_type_for(ret).fn_type(&params, false),
            None => self.context.void_type().fn_type(&params, false),
        }
    }

    /// The linkage symbol of a function: owner-qualified, with a marker
    /// separating the initializer namespace and the interrogative form.
    pub fn function_symbol(&self, function: FunctionId) -> String {
        let func = self.package.function(function);
        let mut symbol = match func.owner {
            Some(owner) => {
                if func.initializer {
                    format!("{}_new_{}", self.package.def(owner).name, func.name)
                } else {
                    format!("{}_{}", self.package.def(owner).name, func.name)
                }
            }
            None => func.name.clone(),
        };
        if !func.imperative {
            symbol.push_str("_q");
        }
        if func.boxing_layer {
            // A layer shares its name with the method it adapts.
            symbol.push_str("_boxing");
        }
        symbol
    }

    /// Declares (or retrieves) the LLVM function for a Glyph function.
    pub fn declare_function(&self, function: FunctionId) -> FunctionValue<'a> {
        let symbol = self.function_symbol(function);
        if let Some(f) = self.module.get_function(&symbol) {
            return f;
        }
        self.module
            .add_function(&symbol, self.llvm_function_type(function), None)
    }

    /// Follows the appointed-heir chain from a protocol method to the
    /// implementation that answers dispatch.
    pub fn resolve_heir(&self, method: FunctionId) -> FunctionId {
        let mut current = method;
        // The chain is acyclic; the bound guards against corrupt tables.
        for _ in 0..self.heirs.len() + 1 {
            match self.heirs.get(&current) {
                Some(&next) => current = next,
                None => break,
            }
        }
        current
    }

    /// Generates the body of a function into the module.
    pub fn gen_function_ir(&self, function: FunctionId) -> Result<(), Diagnostic> {
        let func = self.package.function(function);
        if func.external || func.body.is_none() {
            return Ok(());
        }
        let value = self.declare_function(function);
        FunctionCodeGenerator::new(self, function, value).generate()
    }

    /// Lowers every analysed function of the package.
    pub fn generate_package(&self) -> Result<(), Diagnostic> {
        for id in 0..self.package.functions.len() {
            self.gen_function_ir(FunctionId(id))?;
        }
        Ok(())
    }

    pub(crate) fn lookup_instance_variable(
        &self,
        function: FunctionId,
        name: &str,
    ) -> Option<&'a glyph_ast::InstanceVariable> {
        let owner = self.package.function(function).owner?;
        self.package
            .def(owner)
            .instance_variables
            .iter()
            .find(|iv| iv.name == name)
    }

    /// Byte offset of an instance variable slot: a header pointer occupies
    /// word zero, fields follow one word each.
    pub(crate) fn instance_variable_offset(&self, index: usize) -> u64 {
        (1 + index as u64) * 8
    }

    pub(crate) fn instance_variable_index(
        &self,
        function: FunctionId,
        name: &str,
    ) -> Option<usize> {
        let owner = self.package.function(function).owner?;
        self.package
            .def(owner)
            .instance_variables
            .iter()
            .position(|iv| iv.name == name)
    }
}
