//! Lexical scopes and the variables declared in them.

use crate::compiler::Compiler;
use glyph_ast::{SourcePosition, Type};
use std::collections::HashMap;

/// A variable declared in a scope.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    /// Dense id, unique within the enclosing function.
    pub id: usize,
    pub ty: Type,
    /// Frozen variables cannot be reassigned after declaration.
    pub frozen: bool,
    /// Whether any assignment to this variable was seen.
    pub mutated: bool,
    pub position: SourcePosition,
    /// Initialization level at which the variable became readable; used by
    /// initializers to reject reads before all instance fields are set.
    pub initialization_level: i32,
}

/// Statistics returned when a scope is popped.
#[derive(Debug, Clone, Copy)]
pub struct ScopeStats {
    pub variables: usize,
    pub max_variable_id: usize,
}

/// A mapping from variable names to [`Variable`]s. Ids are assigned
/// densely starting from the seed the scope was created with, so sibling
/// scopes may reuse the ids of a popped predecessor while nested scopes
/// never overlap.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    variables: HashMap<String, Variable>,
    max_variable_id: usize,
}

impl Scope {
    pub fn new(first_variable_id: usize) -> Self {
        Scope {
            variables: HashMap::new(),
            max_variable_id: first_variable_id,
        }
    }

    /// One greater than the largest id assigned in this scope (or the seed
    /// if nothing was declared).
    pub fn max_variable_id(&self) -> usize {
        self.max_variable_id
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.get_mut(name)
    }

    /// Declares a variable and returns the dense id assigned to it. A
    /// redeclaration of the same name replaces the previous entry.
    pub fn declare_variable(
        &mut self,
        name: impl Into<String>,
        ty: Type,
        frozen: bool,
        position: SourcePosition,
    ) -> usize {
        let name = name.into();
        let id = self.max_variable_id;
        self.max_variable_id += 1;
        self.variables.insert(
            name.clone(),
            Variable {
                name,
                id,
                ty,
                frozen,
                mutated: false,
                position,
                initialization_level: 1,
            },
        );
        id
    }

    /// Emits a recommendation for every non-frozen variable that was never
    /// mutated. Called when the scope is popped.
    pub fn recommend_frozen_variables(&self, compiler: &mut Compiler) {
        for variable in self.variables.values() {
            if !variable.frozen && !variable.mutated {
                compiler.warn(
                    variable.position,
                    format!(
                        "Variable \"{}\" is never mutated; consider making it a frozen variable.",
                        variable.name
                    ),
                );
            }
        }
    }
}
