//! Common testing utilities for the Glyph compiler test suite.
//!
//! Provides package fixtures with the built-in value types installed and
//! an IR generation helper that runs the full analyse-and-lower pipeline,
//! returning the textual IR for containment assertions. Diagnostic output
//! is suppressed to keep test output clean.

use glyph_ast::{
    Package, PrimitiveKind, SourcePosition, Type, TypeDefId, TypeDefinition, TypeDefKind,
};
use glyphc::CompileOptions;

/// Handles to the built-in value types every fixture package carries.
#[allow(dead_code)]
pub struct Builtins {
    pub integer: TypeDefId,
    pub boolean: TypeDefId,
    pub double: TypeDefId,
    pub memory: TypeDefId,
}

#[allow(dead_code)]
pub fn pos(line: u32) -> SourcePosition {
    SourcePosition::new(line, 1)
}

/// A fresh package with the built-in value types registered.
#[allow(dead_code)]
pub fn base_package() -> (Package, Builtins) {
    let mut package = Package::new("test", pos(1));
    let integer = package.add_type(TypeDefinition::new(
        "Integer",
        TypeDefKind::ValueType {
            primitive: Some(PrimitiveKind::Integer),
        },
        pos(1),
    ));
    let boolean = package.add_type(TypeDefinition::new(
        "Boolean",
        TypeDefKind::ValueType {
            primitive: Some(PrimitiveKind::Boolean),
        },
        pos(1),
    ));
    let double = package.add_type(TypeDefinition::new(
        "Double",
        TypeDefKind::ValueType {
            primitive: Some(PrimitiveKind::Double),
        },
        pos(1),
    ));
    let memory = package.add_type(TypeDefinition::new(
        "Memory",
        TypeDefKind::ValueType {
            primitive: Some(PrimitiveKind::Memory),
        },
        pos(1),
    ));
    (
        package,
        Builtins {
            integer,
            boolean,
            double,
            memory,
        },
    )
}

#[allow(dead_code)]
pub fn ty(def: TypeDefId) -> Type {
    Type::new(def)
}

/// Runs analysis and lowering on a package and returns the textual IR.
#[allow(dead_code)]
pub fn gen_ir(package: &mut Package) -> anyhow::Result<String> {
    let _guard = glyphc::diagnostics::suppress();
    glyphc::compile(package, &CompileOptions::library("test_module"))
}
