//! The compiler value: diagnostic sink and build fitness.
//!
//! A [`Compiler`] is passed explicitly into every analysis phase; nothing
//! here is ambient state. Errors make the build unfit to emit, warnings do
//! not.

use crate::diagnostics;
use glyph_ast::SourcePosition;

/// A typed analysis failure carrying a source position and message.
///
/// Raised as an error value inside function analysis and caught at
/// function granularity by the analyser driver, so one bad function does
/// not suppress diagnostics for the rest of the package.
#[derive(Debug, Clone)]
pub struct CompilerError {
    pub position: SourcePosition,
    pub message: String,
}

impl CompilerError {
    pub fn new(position: SourcePosition, message: impl Into<String>) -> Self {
        CompilerError {
            position,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CompilerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.position, self.message)
    }
}

impl std::error::Error for CompilerError {}

/// Diagnostic sink shared by all analysis phases of a compilation.
#[derive(Debug, Default)]
pub struct Compiler {
    errors: Vec<CompilerError>,
    warnings: Vec<(SourcePosition, String)>,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler::default()
    }

    /// Records an error and reports it. The build becomes unfit to emit.
    pub fn error(&mut self, e: CompilerError) {
        diagnostics::report_error(Some(e.position), &e.message);
        self.errors.push(e);
    }

    /// Records a warning and reports it without interrupting analysis.
    pub fn warn(&mut self, position: SourcePosition, message: impl Into<String>) {
        let message = message.into();
        diagnostics::report_warning(Some(position), &message);
        self.warnings.push((position, message));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[CompilerError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[(SourcePosition, String)] {
        &self.warnings
    }
}
