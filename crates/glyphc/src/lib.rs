pub mod codegen;
pub mod compiler;
pub mod diagnostics;
pub mod sema;
pub mod types;

use compiler::Compiler;
use glyph_ast::Package;
use inkwell::context::Context;
use sema::SemanticAnalyser;

/// Compilation options for the Glyph compiler.
///
/// This structure provides a clean API for configuring a compilation,
/// separating it from package loading and build orchestration, which live
/// outside the compiler core. The compiler accepts explicit options rather
/// than discovering project structure.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Name of the LLVM module to emit
    pub module_name: String,

    /// Whether the build produces an executable. Executables must declare
    /// the start-flag function; libraries need not.
    pub executable: bool,
}

impl CompileOptions {
    /// Create options for an executable build.
    pub fn executable(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            executable: true,
        }
    }

    /// Create options for a library build.
    pub fn library(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            executable: false,
        }
    }
}

/// Analyses and lowers a package with the given options.
///
/// This is the primary API for invoking the Glyph compiler core
/// programmatically. It runs whole-package semantic analysis, bails if any
/// error was raised (or if an executable build lacks the start-flag
/// function), and otherwise lowers every analysed function.
///
/// # Returns
/// The textual LLVM IR of the generated module on success.
pub fn compile(package: &mut Package, options: &CompileOptions) -> anyhow::Result<String> {
    let mut compiler = Compiler::new();
    let mut analyser = SemanticAnalyser::new(package, &mut compiler);
    analyser.analyse(options.executable);
    let heirs = analyser.into_heirs();
    if compiler.has_errors() {
        anyhow::bail!(
            "compilation failed with {} error(s)",
            compiler.errors().len()
        );
    }

    let context = Context::create();
    let cg = codegen::CodeGen::new(&context, package, &heirs, &options.module_name);
    cg.generate_package()
        .map_err(|d| anyhow::anyhow!("{}", d.message))?;
    Ok(cg.module.print_to_string().to_string())
}
