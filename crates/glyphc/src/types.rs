//! Semantic queries over Glyph types.
//!
//! The parser produces [`Type`] values referencing definitions in the
//! package arena; this module answers the questions the analyser and the
//! code generator ask of them: the lowered storage representation, whether
//! values are collector-traced, whether managed access goes through the
//! slot address or the value itself, and assignability.

use glyph_ast::{Package, PrimitiveKind, Type, TypeDefKind};

/// The lowered representation category of a type, used to decide calling
/// convention and memory operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// A single machine word: primitives and class references.
    Simple,
    /// An unboxed multi-word value type.
    Composite,
    /// A uniform boxed slot; protocol-typed values always take this form.
    Boxed,
}

/// Returns the storage representation of a type. The optional wrapping
/// flag does not influence the category.
pub fn storage_type(ty: &Type, package: &Package) -> StorageType {
    match &package.def(ty.def).kind {
        TypeDefKind::Protocol => StorageType::Boxed,
        TypeDefKind::Class { .. } => StorageType::Simple,
        TypeDefKind::ValueType { primitive } => match primitive {
            Some(_) => StorageType::Simple,
            None => StorageType::Composite,
        },
    }
}

/// Whether values of this type are traced by the collector and require
/// retain/release bookkeeping around reads and writes.
pub fn is_managed(ty: &Type, package: &Package) -> bool {
    match &package.def(ty.def).kind {
        TypeDefKind::Class { .. } | TypeDefKind::Protocol => true,
        TypeDefKind::ValueType { primitive } => match primitive {
            Some(PrimitiveKind::Memory) => true,
            Some(_) => false,
            None => package
                .def(ty.def)
                .instance_variables
                .iter()
                .any(|iv| is_managed(&iv.ty, package)),
        },
    }
}

/// Whether managed values of this type are retained and released through
/// the address of their slot rather than the value itself. Multi-word and
/// boxed representations cannot be handed around by value.
pub fn is_managed_by_reference(ty: &Type, package: &Package) -> bool {
    is_managed(ty, package) && storage_type(ty, package) != StorageType::Simple
}

/// Assignability of `sub` to `sup`: identity, class inheritance, and
/// declared protocol conformance. An optional never narrows to a
/// non-optional; a non-optional widens to its optional.
pub fn compatible_to(sub: &Type, sup: &Type, package: &Package) -> bool {
    if sub.optional && !sup.optional {
        return false;
    }
    if sub.def == sup.def {
        return true;
    }
    let sup_def = package.def(sup.def);
    if sup_def.is_protocol() {
        return conforms_to(sub, sup, package);
    }
    if sup_def.is_class() {
        let mut current = package.def(sub.def).superclass();
        while let Some(c) = current {
            if c == sup.def {
                return true;
            }
            current = package.def(c).superclass();
        }
    }
    false
}

/// Whether `ty` (or one of its superclasses) declares conformance to the
/// protocol `protocol`.
pub fn conforms_to(ty: &Type, protocol: &Type, package: &Package) -> bool {
    let mut current = Some(ty.def);
    while let Some(def) = current {
        if package
            .def(def)
            .protocols
            .iter()
            .any(|p| p.def == protocol.def)
        {
            return true;
        }
        current = package.def(def).superclass();
    }
    false
}

/// A type resolution context. The unspecific reification carries no
/// generic substitutions, so resolution is currently the identity; the
/// calling type is kept for diagnostic rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeContext {
    pub calling_type: Option<Type>,
}

impl TypeContext {
    pub fn new(calling_type: Type) -> Self {
        TypeContext {
            calling_type: Some(calling_type),
        }
    }
}

/// Resolves a type in a context. Generic parameters are substituted here
/// once specialised reifications exist; the unspecific reification
/// resolves every type to itself.
pub fn resolve_on(ty: &Type, _context: &TypeContext) -> Type {
    *ty
}

/// Renders a type for diagnostics. Optionals carry the candy prefix the
/// language uses in source.
pub fn display_type(ty: &Type, package: &Package) -> String {
    let name = &package.def(ty.def).name;
    if ty.optional {
        format!("\u{1F36C}{}", name)
    } else {
        name.clone()
    }
}
