//! Whole-package semantic analysis.
//!
//! Drives analysis in declaration order: extensions are applied first,
//! then value types (protocol finalisation, instance-variable declaration,
//! function enqueueing), then classes (inheritance, protocol finalisation,
//! enqueueing), then free functions, and finally the queue is drained with
//! per-function error recovery. Protocol finalisation verifies the
//! promises every implementation makes to its protocol method and
//! synthesises a boxing layer where the storage representations disagree.

use crate::compiler::{Compiler, CompilerError};
use crate::sema::boxing::build_boxing_layer_ast;
use crate::sema::function::FunctionAnalyser;
use crate::sema::scope::Scope;
use crate::types::{compatible_to, display_type, resolve_on, storage_type, TypeContext};
use glyph_ast::{
    Extension, Function, FunctionId, Package, Parameter, Type, TypeDefId,
};
use std::collections::{HashMap, HashSet, VecDeque};

pub struct SemanticAnalyser<'a> {
    package: &'a mut Package,
    compiler: &'a mut Compiler,
    queue: VecDeque<FunctionId>,
    instance_scopes: HashMap<TypeDefId, Scope>,
    /// Protocol method -> implementation that answers dispatch on a
    /// conforming type; a lookup-only association, never an owning link.
    heirs: HashMap<FunctionId, FunctionId>,
}

impl<'a> SemanticAnalyser<'a> {
    pub fn new(package: &'a mut Package, compiler: &'a mut Compiler) -> Self {
        SemanticAnalyser {
            package,
            compiler,
            queue: VecDeque::new(),
            instance_scopes: HashMap::new(),
            heirs: HashMap::new(),
        }
    }

    /// Analyses the package. In executable mode the package must provide
    /// the start-flag function.
    pub fn analyse(&mut self, executable: bool) {
        let extensions = std::mem::take(&mut self.package.extensions);
        for extension in &extensions {
            self.apply_extension(extension);
        }
        self.package.extensions = extensions;

        for vt in self.package.value_types.clone() {
            self.finalize_protocols(Type::new(vt));
            self.declare_instance_variables(vt);
            self.enqueue_functions_of(vt);
        }
        for class in self.package.classes.clone() {
            self.inherit(class);
            self.finalize_protocols(Type::new(class));
            self.enqueue_functions_of(class);
        }
        for function in self.package.free_functions.clone() {
            self.enqueue_function(function);
        }

        self.analyse_queue();

        if executable && !self.package.has_start_flag_function() {
            self.compiler.error(CompilerError::new(
                self.package.position,
                format!("No {} block was found.", glyph_ast::START_FLAG),
            ));
        }
    }

    /// The appointed-heir table built during protocol finalisation.
    pub fn heirs(&self) -> &HashMap<FunctionId, FunctionId> {
        &self.heirs
    }

    pub fn into_heirs(self) -> HashMap<FunctionId, FunctionId> {
        self.heirs
    }

    fn analyse_queue(&mut self) {
        while let Some(function) = self.queue.pop_front() {
            let owner = self.package.function(function).owner;
            let instance_scope = owner
                .filter(|_| !self.package.function(function).type_method)
                .and_then(|o| self.instance_scopes.remove(&o));
            let mut analyser =
                FunctionAnalyser::new(self.package, self.compiler, function, instance_scope);
            let result = analyser.analyse();
            let returned_scope = analyser.into_instance_scope();
            if let (Some(owner), Some(scope)) = (owner, returned_scope) {
                self.instance_scopes.insert(owner, scope);
            }
            if let Err(error) = result {
                self.compiler.error(error);
            }
        }
    }

    fn enqueue_function(&mut self, function: FunctionId) {
        if !self.package.function(function).external {
            self.queue.push_back(function);
        }
    }

    fn enqueue_functions_of(&mut self, def: TypeDefId) {
        let mut functions = self.package.def(def).methods.clone();
        functions.extend(self.package.def(def).initializers.iter().copied());
        for function in functions {
            // Inherited entries are enqueued by the definition that owns them.
            if self.package.function(function).owner == Some(def) {
                self.enqueue_function(function);
            }
        }
    }

    fn apply_extension(&mut self, extension: &Extension) {
        for &method in &extension.methods {
            self.package.function_mut(method).owner = Some(extension.target);
            self.package.defs[extension.target.0].methods.push(method);
        }
        for &protocol in &extension.protocols {
            let def = self.package.def_mut(extension.target);
            if !def.protocols.iter().any(|p| p.def == protocol.def) {
                def.protocols.push(protocol);
            }
        }
    }

    /// Materialises instance-variable declarations into the definition's
    /// instance scope and warns when variables exist without initializers.
    fn declare_instance_variables(&mut self, def: TypeDefId) {
        let mut scope = self.instance_scopes.remove(&def).unwrap_or_default();
        for variable in self.package.def(def).instance_variables.clone() {
            scope.declare_variable(variable.name, variable.ty, false, variable.position);
        }
        self.instance_scopes.insert(def, scope);

        let def = self.package.def(def);
        if !def.instance_variables.is_empty() && def.initializers.is_empty() {
            self.compiler.warn(
                def.position,
                format!(
                    "Type defines {} instance variables but has no initializers.",
                    def.instance_variables.len()
                ),
            );
        }
    }

    /// Resolves inheritance for a class: methods and protocol conformances
    /// of the superclass chain become visible on the class, deduplicated
    /// by their `(name, imperative)` pair with the nearest definition
    /// winning. Instance variables of the chain are declared into the
    /// class's instance scope alongside its own.
    fn inherit(&mut self, class: TypeDefId) {
        let mut seen: HashSet<(String, bool)> = self
            .package
            .def(class)
            .methods
            .iter()
            .map(|&m| {
                let f = self.package.function(m);
                (f.name.clone(), f.imperative)
            })
            .collect();

        let mut inherited_methods = Vec::new();
        let mut inherited_protocols: Vec<Type> = Vec::new();
        let mut current = self.package.def(class).superclass();
        while let Some(superclass) = current {
            for &method in &self.package.def(superclass).methods {
                let f = self.package.function(method);
                if seen.insert((f.name.clone(), f.imperative)) {
                    inherited_methods.push(method);
                }
            }
            for protocol in &self.package.def(superclass).protocols {
                if !inherited_protocols.iter().any(|p| p.def == protocol.def)
                    && !self
                        .package
                        .def(class)
                        .protocols
                        .iter()
                        .any(|p| p.def == protocol.def)
                {
                    inherited_protocols.push(*protocol);
                }
            }
            current = self.package.def(superclass).superclass();
        }

        let def = self.package.def_mut(class);
        def.methods.extend(inherited_methods);
        def.protocols.extend(inherited_protocols);

        self.declare_instance_variables(class);
    }

    fn finalize_protocols(&mut self, ty: Type) {
        for protocol in self.package.def(ty.def).protocols.clone() {
            self.finalize_protocol(ty, protocol);
        }
    }

    /// Checks that `ty` provides every method of `protocol` and appoints
    /// each method's heir: the implementation itself when the storage
    /// representations agree, a synthesised boxing layer otherwise.
    fn finalize_protocol(&mut self, ty: Type, protocol: Type) {
        for method in self.package.def(protocol.def).methods.clone() {
            let (name, imperative) = {
                let f = self.package.function(method);
                (f.name.clone(), f.imperative)
            };
            let implementation = match self.package.lookup_method(ty.def, &name, imperative) {
                Some(implementation) => implementation,
                None => {
                    self.compiler.error(CompilerError::new(
                        self.package.def(ty.def).position,
                        format!(
                            "{} does not conform to protocol {}: Method {} not provided.",
                            display_type(&ty, self.package),
                            display_type(&protocol, self.package),
                            name
                        ),
                    ));
                    continue;
                }
            };

            self.package
                .function_mut(implementation)
                .create_unspecific_reification();
            if self.enforce_promises(
                implementation,
                method,
                protocol,
                &TypeContext::new(ty),
                &TypeContext::new(protocol),
            ) {
                self.heirs.insert(method, implementation);
            } else {
                self.build_boxing_layer(ty, protocol, method, implementation);
            }
        }
    }

    /// Verifies the promises `sub` makes by implementing `super`. Returns
    /// false when a storage representation mismatch requires a boxing
    /// layer; type-level violations are reported but do not stop the walk.
    fn enforce_promises(
        &mut self,
        sub: FunctionId,
        sup: FunctionId,
        super_source: Type,
        sub_context: &TypeContext,
        super_context: &TypeContext,
    ) -> bool {
        let sub_position = self.package.function(sub).position;
        let sub_name = self.package.function(sub).name.clone();
        if self.package.function(sup).is_final {
            self.compiler.error(CompilerError::new(
                sub_position,
                format!(
                    "{}'s implementation of {} was marked final.",
                    display_type(&super_source, self.package),
                    sub_name
                ),
            ));
        }
        if self.package.function(sub).access_level != self.package.function(sup).access_level {
            self.compiler.error(CompilerError::new(
                sub_position,
                format!(
                    "Access level of {}'s implementation of {} does not match.",
                    display_type(&super_source, self.package),
                    sub_name
                ),
            ));
        }

        let super_return = self
            .package
            .function(sup)
            .return_type
            .map(|t| resolve_on(&t, super_context));
        let sub_return = self
            .package
            .function(sub)
            .return_type
            .map(|t| resolve_on(&t, sub_context));
        match (&sub_return, &super_return) {
            (Some(sub_ret), Some(super_ret)) => {
                if !compatible_to(sub_ret, super_ret, self.package) {
                    self.compiler.error(CompilerError::new(
                        sub_position,
                        format!(
                            "Return type {} of {} is not compatible with the return type {} declared in {}.",
                            display_type(sub_ret, self.package),
                            sub_name,
                            display_type(super_ret, self.package),
                            display_type(&super_source, self.package)
                        ),
                    ));
                }
                if storage_type(sub_ret, self.package) != storage_type(super_ret, self.package) {
                    return false; // boxing layer required for the return
                }
            }
            (None, None) => {}
            _ => {
                self.compiler.error(CompilerError::new(
                    sub_position,
                    format!(
                        "{} must not return a value, as declared in {}.",
                        sub_name,
                        display_type(&super_source, self.package)
                    ),
                ));
            }
        }

        self.check_argument_promise(sub, sup, sub_context, super_context)
    }

    fn check_argument_promise(
        &mut self,
        sub: FunctionId,
        sup: FunctionId,
        sub_context: &TypeContext,
        super_context: &TypeContext,
    ) -> bool {
        let sub_position = self.package.function(sub).position;
        if self.package.function(sup).arguments.len()
            != self.package.function(sub).arguments.len()
        {
            self.compiler.error(CompilerError::new(
                sub_position,
                "Argument count does not match.",
            ));
            return true;
        }

        let mut compatible = true;
        for i in 0..self.package.function(sup).arguments.len() {
            // More general arguments are acceptable.
            let super_argument =
                resolve_on(&self.package.function(sup).arguments[i].ty, super_context);
            let sub_argument = resolve_on(&self.package.function(sub).arguments[i].ty, sub_context);
            if !compatible_to(&super_argument, &sub_argument, self.package) {
                self.compiler.error(CompilerError::new(
                    sub_position,
                    format!(
                        "Type {} of argument {} is not compatible with the declared argument type {}.",
                        display_type(&sub_argument, self.package),
                        i + 1,
                        display_type(&super_argument, self.package)
                    ),
                ));
            }
            // Optional-wrapping differences do not influence the storage
            // representation and are ignored here.
            if storage_type(&sub_argument, self.package)
                != storage_type(&super_argument, self.package)
            {
                compatible = false; // boxing layer required for argument i
            }
        }
        compatible
    }

    /// Synthesises a boxing layer: a thunk with the protocol method's
    /// signature that forwards to the implementation, adapting every
    /// mismatched representation. The thunk joins the type's methods and
    /// becomes the protocol method's appointed heir.
    fn build_boxing_layer(
        &mut self,
        ty: Type,
        protocol: Type,
        method: FunctionId,
        implementation: FunctionId,
    ) {
        let protocol_context = TypeContext::new(protocol);
        let arguments: Vec<Parameter> = self
            .package
            .function(method)
            .arguments
            .iter()
            .map(|argument| Parameter {
                name: argument.name.clone(),
                ty: resolve_on(&argument.ty, &protocol_context),
            })
            .collect();
        let return_type = self
            .package
            .function(method)
            .return_type
            .map(|t| resolve_on(&t, &protocol_context));

        let mut layer = Function::new(
            self.package.function(method).name.clone(),
            return_type,
            self.package.function(implementation).position,
        );
        layer.imperative = self.package.function(method).imperative;
        layer.access_level = self.package.function(method).access_level;
        layer.arguments = arguments;
        layer.boxing_layer = true;

        build_boxing_layer_ast(&mut layer, self.package, ty, implementation);

        let layer = self.package.add_method(ty.def, layer);
        self.enqueue_function(layer);
        self.heirs.insert(method, layer);
    }
}
