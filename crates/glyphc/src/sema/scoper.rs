//! The scoper used during semantic analysis.
//!
//! Maintains a stack of lexical scopes (front is the current scope) and
//! assigns dense variable ids that the code generator later uses to size
//! the local slot table. Nested scopes seed their id counter from the
//! enclosing scope so ids never overlap within one function; popping a
//! scope releases its ids for textual reuse by a sibling.

use crate::compiler::{Compiler, CompilerError};
use crate::sema::scope::{Scope, ScopeStats, Variable};
use glyph_ast::{Parameter, SourcePosition};
use std::collections::VecDeque;

/// The result of a variable lookup: the variable and whether it was found
/// in the instance scope rather than a local one.
pub struct ResolvedVariable<'a> {
    pub variable: &'a mut Variable,
    pub in_instance_scope: bool,
}

enum FoundIn {
    Local(usize),
    Instance,
}

/// Scoper used during semantic analysis. Assigns ids to variables that the
/// lowering phase addresses by slot.
#[derive(Debug)]
pub struct SemanticScoper {
    scopes: VecDeque<Scope>,
    instance_scope: Option<Scope>,
    max_initialization_level: i32,
    max_variable_id: usize,
}

impl Default for SemanticScoper {
    fn default() -> Self {
        SemanticScoper::new()
    }
}

impl SemanticScoper {
    pub fn new() -> Self {
        SemanticScoper {
            scopes: VecDeque::new(),
            instance_scope: None,
            max_initialization_level: 1,
            max_variable_id: 0,
        }
    }

    /// Creates a scoper whose lookups fall back to the given instance
    /// scope, as used for object methods and initializers.
    pub fn with_instance_scope(instance_scope: Scope) -> Self {
        SemanticScoper {
            scopes: VecDeque::new(),
            instance_scope: Some(instance_scope),
            max_initialization_level: 1,
            max_variable_id: 0,
        }
    }

    /// Returns the current subscope.
    pub fn current_scope(&mut self) -> &mut Scope {
        debug_assert!(!self.scopes.is_empty());
        &mut self.scopes[0]
    }

    /// Pushes a new subscope, seeding its id counter so that ids assigned
    /// in it never collide with ids of enclosing scopes.
    pub fn push_scope(&mut self) {
        let seed = self
            .scopes
            .front()
            .map(|s| s.max_variable_id())
            .unwrap_or(self.max_variable_id);
        self.scopes.push_front(Scope::new(seed));
    }

    /// Pushes a new subscope and declares each argument as a frozen
    /// variable in it.
    pub fn push_arguments_scope(&mut self, arguments: &[Parameter], position: SourcePosition) {
        self.push_scope();
        for argument in arguments {
            self.current_scope()
                .declare_variable(argument.name.clone(), argument.ty, true, position);
        }
    }

    /// Pops the current scope, recommending frozen variables and lifting
    /// the scoper's id watermark. Returns the popped scope's statistics.
    pub fn pop_scope(&mut self, compiler: &mut Compiler) -> ScopeStats {
        self.update_max_variable_id_for_popping();
        let scope = match self.scopes.pop_front() {
            Some(scope) => scope,
            None => return ScopeStats { variables: 0, max_variable_id: self.max_variable_id },
        };
        scope.recommend_frozen_variables(compiler);
        ScopeStats {
            variables: scope.variable_count(),
            max_variable_id: scope.max_variable_id(),
        }
    }

    /// Retrieves a variable, searching the local scopes front to back and
    /// then the instance scope. Fails with a variable-not-found error.
    pub fn get_variable(
        &mut self,
        name: &str,
        position: SourcePosition,
    ) -> Result<ResolvedVariable<'_>, CompilerError> {
        let found = if let Some(i) = self.scopes.iter().position(|s| s.contains(name)) {
            Some(FoundIn::Local(i))
        } else if self.instance_scope.as_ref().is_some_and(|s| s.contains(name)) {
            Some(FoundIn::Instance)
        } else {
            None
        };
        let not_found =
            || CompilerError::new(position, format!("Variable \"{}\" not defined.", name));
        match found {
            Some(FoundIn::Local(i)) => self.scopes[i]
                .variable_mut(name)
                .map(|variable| ResolvedVariable {
                    variable,
                    in_instance_scope: false,
                })
                .ok_or_else(|| not_found()),
            Some(FoundIn::Instance) => self
                .instance_scope
                .as_mut()
                .and_then(|s| s.variable_mut(name))
                .map(|variable| ResolvedVariable {
                    variable,
                    in_instance_scope: true,
                })
                .ok_or_else(|| not_found()),
            None => Err(not_found()),
        }
    }

    /// Warns if `name` is already visible. Called before declaring a
    /// variable; does not alter any state.
    pub fn check_for_shadowing(
        &self,
        name: &str,
        position: SourcePosition,
        compiler: &mut Compiler,
    ) {
        let shadows = self.scopes.iter().any(|s| s.contains(name))
            || self.instance_scope.as_ref().is_some_and(|s| s.contains(name));
        if shadows {
            compiler.warn(
                position,
                format!("This declaration shadows variable \"{}\".", name),
            );
        }
    }

    /// Returns the instance scope, if this scoper has one.
    pub fn instance_scope(&mut self) -> Option<&mut Scope> {
        self.instance_scope.as_mut()
    }

    /// Consumes the scoper, handing the instance scope back to its owner.
    pub fn into_instance_scope(self) -> Option<Scope> {
        self.instance_scope
    }

    /// The number of variable ids that were assigned: one greater than the
    /// largest id observed across all pushed scopes.
    pub fn variable_id_count(&self) -> usize {
        self.max_variable_id
    }

    pub fn max_initialization_level(&self) -> i32 {
        self.max_initialization_level
    }

    fn update_max_variable_id_for_popping(&mut self) {
        if let Some(scope) = self.scopes.front() {
            if scope.max_variable_id() > self.max_variable_id {
                self.max_variable_id = scope.max_variable_id();
            }
        }
    }
}
