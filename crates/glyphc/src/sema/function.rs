//! Per-function semantic analysis.
//!
//! Walks a function body, resolving variable names to dense ids through
//! the scoper and recording mutation so the scoper can recommend freezing
//! on pop. The resolved ids are written back into the AST for the lowering
//! phase, and the function's final id count is recorded for slot-table
//! sizing.

use crate::compiler::{Compiler, CompilerError};
use crate::sema::scope::Scope;
use crate::sema::scoper::SemanticScoper;
use glyph_ast::{Expr, FunctionId, Package, Stmt};

pub struct FunctionAnalyser<'a> {
    package: &'a mut Package,
    compiler: &'a mut Compiler,
    scoper: SemanticScoper,
    function: FunctionId,
}

impl<'a> FunctionAnalyser<'a> {
    pub fn new(
        package: &'a mut Package,
        compiler: &'a mut Compiler,
        function: FunctionId,
        instance_scope: Option<Scope>,
    ) -> Self {
        let scoper = match instance_scope {
            Some(scope) => SemanticScoper::with_instance_scope(scope),
            None => SemanticScoper::new(),
        };
        FunctionAnalyser {
            package,
            compiler,
            scoper,
            function,
        }
    }

    pub fn analyse(&mut self) -> Result<(), CompilerError> {
        let func = self.package.function(self.function);
        if func.external {
            return Ok(());
        }
        let arguments = func.arguments.clone();
        let position = func.position;
        let mut body = match self.package.function_mut(self.function).body.take() {
            Some(body) => body,
            None => return Ok(()),
        };

        self.scoper.push_arguments_scope(&arguments, position);
        let result = self.analyse_block(&mut body);
        self.scoper.pop_scope(self.compiler);

        let variable_count = self.scoper.variable_id_count();
        let func = self.package.function_mut(self.function);
        func.body = Some(body);
        func.variable_count = variable_count;
        result
    }

    /// Hands the instance scope back so the driver can reinstall it on the
    /// owning definition for the next method.
    pub fn into_instance_scope(self) -> Option<Scope> {
        self.scoper.into_instance_scope()
    }

    fn analyse_block(&mut self, stmts: &mut [Stmt]) -> Result<(), CompilerError> {
        for stmt in stmts {
            self.analyse_stmt(stmt)?;
        }
        Ok(())
    }

    fn analyse_scoped_block(&mut self, stmts: &mut [Stmt]) -> Result<(), CompilerError> {
        self.scoper.push_scope();
        let result = self.analyse_block(stmts);
        self.scoper.pop_scope(self.compiler);
        result
    }

    fn analyse_stmt(&mut self, stmt: &mut Stmt) -> Result<(), CompilerError> {
        match stmt {
            Stmt::VariableDeclaration {
                name,
                ty,
                frozen,
                init,
                position,
                id,
            } => {
                if let Some(init) = init {
                    self.analyse_expr(init)?;
                } else if *frozen {
                    return Err(CompilerError::new(
                        *position,
                        format!("Frozen variable \"{}\" must be initialized.", name),
                    ));
                }
                self.scoper
                    .check_for_shadowing(name, *position, self.compiler);
                let assigned =
                    self.scoper
                        .current_scope()
                        .declare_variable(name.clone(), *ty, *frozen, *position);
                *id = Some(assigned);
                Ok(())
            }
            Stmt::Assignment {
                name,
                value,
                position,
                id,
                in_instance_scope,
            } => {
                self.analyse_expr(value)?;
                let resolved = self.scoper.get_variable(name, *position)?;
                if resolved.variable.frozen {
                    return Err(CompilerError::new(
                        *position,
                        format!("Cannot modify frozen variable \"{}\".", name),
                    ));
                }
                resolved.variable.mutated = true;
                *id = Some(resolved.variable.id);
                *in_instance_scope = resolved.in_instance_scope;
                Ok(())
            }
            Stmt::ExprStmt(expr) => self.analyse_expr(expr),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.analyse_expr(condition)?;
                self.analyse_scoped_block(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.analyse_scoped_block(else_branch)?;
                }
                Ok(())
            }
            Stmt::While {
                condition, body, ..
            } => {
                self.analyse_expr(condition)?;
                self.analyse_scoped_block(body)
            }
            Stmt::Block(stmts) => self.analyse_scoped_block(stmts),
            Stmt::Return(value, _) => {
                if let Some(value) = value {
                    self.analyse_expr(value)?;
                }
                Ok(())
            }
        }
    }

    fn analyse_expr(&mut self, expr: &mut Expr) -> Result<(), CompilerError> {
        match expr {
            Expr::Variable {
                name,
                position,
                id,
                in_instance_scope,
            } => {
                let resolved = self.scoper.get_variable(name, *position)?;
                *id = Some(resolved.variable.id);
                *in_instance_scope = resolved.in_instance_scope;
                Ok(())
            }
            Expr::This(position) => {
                if self.scoper.instance_scope().is_none() {
                    return Err(CompilerError::new(
                        *position,
                        "The receiver is not available in this context.",
                    ));
                }
                Ok(())
            }
            Expr::Method(method) => {
                self.analyse_expr(&mut method.callee)?;
                let expected = self.package.function(method.method).arguments.len();
                if method.args.parameters.len() != expected {
                    return Err(CompilerError::new(
                        method.position,
                        format!(
                            "\"{}\" expects {} arguments but {} were supplied.",
                            self.package.function(method.method).name,
                            expected,
                            method.args.parameters.len()
                        ),
                    ));
                }
                for parameter in &mut method.args.parameters {
                    self.analyse_expr(parameter)?;
                }
                Ok(())
            }
            Expr::Box { inner, .. } | Expr::Unbox { inner, .. } => self.analyse_expr(inner),
            Expr::IntegerLiteral(..)
            | Expr::BooleanLiteral(..)
            | Expr::DoubleLiteral(..)
            | Expr::NothingnessLiteral(..) => Ok(()),
        }
    }
}
