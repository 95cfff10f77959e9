//! Diagnostic reporting utilities for the Glyph compiler.
//!
//! This module provides lightweight, rustc-style error reporting functions
//! that emit colored diagnostic messages to stderr. Analysis errors carry a
//! source position (line and column assigned by the parser); code
//! generation failures are conveyed as [`Diagnostic`] values without
//! position information when none is available.
//!
//! Emission is decoupled from collection: the [`crate::compiler::Compiler`]
//! sink records every error and warning for the final fitness decision,
//! while this module prints them as they occur. A global enable flag with
//! an RAII [`suppress`] guard keeps test output clean.

use glyph_ast::SourcePosition;
use std::sync::atomic::{AtomicBool, Ordering};

static DIAGNOSTICS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Prints a compact, rustc-style error message to stderr.
///
/// # Example Output
/// ```text
/// error: Variable "x" not defined.
///   --> 5:12
/// ```
pub fn report_error(position: Option<SourcePosition>, message: &str) {
    if !DIAGNOSTICS_ENABLED.load(Ordering::SeqCst) {
        return;
    }
    let red = "\x1b[31m";
    let reset = "\x1b[0m";
    eprintln!("{}error{}: {}", red, reset, message);
    if let Some(p) = position {
        eprintln!("  --> {}", p);
    }
}

/// Prints a warning to stderr. Warnings never affect build fitness.
pub fn report_warning(position: Option<SourcePosition>, message: &str) {
    if !DIAGNOSTICS_ENABLED.load(Ordering::SeqCst) {
        return;
    }
    let yellow = "\x1b[33m";
    let reset = "\x1b[0m";
    eprintln!("{}warning{}: {}", yellow, reset, message);
    if let Some(p) = position {
        eprintln!("  --> {}", p);
    }
}

/// Structured diagnostic container used by the code generation phase.
///
/// Code generation reports failures as values rather than printing
/// directly, so callers can decide whether to surface them (the analysis
/// phase has usually reported the underlying cause already).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary error message describing the issue
    pub message: String,
    /// Optional source position where the error occurred
    pub position: Option<SourcePosition>,
}

impl Diagnostic {
    /// Creates a diagnostic with only an error message.
    pub fn simple(msg: impl Into<String>) -> Self {
        Diagnostic {
            message: msg.into(),
            position: None,
        }
    }

    /// Creates a diagnostic anchored to a source position.
    pub fn at(position: SourcePosition, msg: impl Into<String>) -> Self {
        Diagnostic {
            message: msg.into(),
            position: Some(position),
        }
    }
}

/// Temporarily suppresses diagnostic output for testing scenarios.
///
/// The returned guard automatically restores the previous diagnostic state
/// when dropped.
pub fn suppress() -> SuppressGuard {
    let prev = DIAGNOSTICS_ENABLED.swap(false, Ordering::SeqCst);
    SuppressGuard { prev }
}

/// RAII guard that restores the diagnostic output state on drop.
pub struct SuppressGuard {
    prev: bool,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        DIAGNOSTICS_ENABLED.store(self.prev, Ordering::SeqCst);
    }
}
