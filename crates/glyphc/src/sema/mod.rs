//! Semantic analysis: scoping, whole-package finalisation, and protocol
//! conformance.

pub mod analyser;
pub mod boxing;
pub mod function;
pub mod scope;
pub mod scoper;

pub use analyser::SemanticAnalyser;
pub use scope::{Scope, ScopeStats, Variable};
pub use scoper::{ResolvedVariable, SemanticScoper};
