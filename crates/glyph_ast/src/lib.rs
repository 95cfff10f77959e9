//! Glyph AST and package model
//!
//! This crate defines the abstract syntax tree and the package model for the
//! Glyph language. It serves as the contract between the parser and the
//! compiler core: the parser produces a [`Package`] holding type definitions
//! and functions in index arenas, and the semantic analyser and code
//! generator consume it through [`TypeDefId`] and [`FunctionId`] handles.

use std::fmt;

/// The identifier of the program entry point.
pub const START_FLAG: &str = "\u{1F3C1}";

/// A line/column pair attached to every declaration and diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub fn new(line: u32, column: u32) -> Self {
        SourcePosition { line, column }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Index of a type definition in [`Package::defs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeDefId(pub usize);

/// Index of a function in [`Package::functions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub usize);

/// A semantic type: a reference to a type definition plus an optional
/// wrapping flag. Copied freely; all heavyweight data lives in the
/// definition arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Type {
    pub def: TypeDefId,
    pub optional: bool,
}

impl Type {
    pub fn new(def: TypeDefId) -> Self {
        Type {
            def,
            optional: false,
        }
    }

    pub fn optional(def: TypeDefId) -> Self {
        Type {
            def,
            optional: true,
        }
    }
}

/// Built-in primitive kinds a value type may represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Integer,
    Boolean,
    Double,
    Symbol,
    /// Raw managed memory, the receiver of the low-level load/store/release
    /// primitives.
    Memory,
}

/// The three variants of a type definition. Shared fields live in
/// [`TypeDefinition`]; behaviour that diverges (inheritance, dispatch
/// tables) is selected by matching on this tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDefKind {
    ValueType { primitive: Option<PrimitiveKind> },
    Class { superclass: Option<TypeDefId> },
    Protocol,
}

/// An instance variable declaration of a value type or class.
#[derive(Debug, Clone)]
pub struct InstanceVariable {
    pub name: String,
    pub ty: Type,
    pub position: SourcePosition,
}

/// A type definition: value type, class, or protocol.
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    pub name: String,
    pub position: SourcePosition,
    pub kind: TypeDefKind,
    pub instance_variables: Vec<InstanceVariable>,
    pub methods: Vec<FunctionId>,
    pub initializers: Vec<FunctionId>,
    /// Protocols this definition declares conformance to.
    pub protocols: Vec<Type>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, kind: TypeDefKind, position: SourcePosition) -> Self {
        TypeDefinition {
            name: name.into(),
            position,
            kind,
            instance_variables: Vec::new(),
            methods: Vec::new(),
            initializers: Vec::new(),
            protocols: Vec::new(),
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, TypeDefKind::Class { .. })
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self.kind, TypeDefKind::Protocol)
    }

    pub fn superclass(&self) -> Option<TypeDefId> {
        match self.kind {
            TypeDefKind::Class { superclass } => superclass,
            _ => None,
        }
    }
}

/// Method visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Public,
    Protected,
    Private,
}

/// A declared function argument.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
}

/// A per-instantiation copy of a function. The unspecific reification (no
/// generic arguments) is the template used before specialisation and is
/// materialised on demand.
#[derive(Debug, Clone, Default)]
pub struct Reification {
    pub generic_arguments: Vec<Type>,
}

/// A method, initializer, or free function.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// Imperative and interrogative methods of the same name are distinct;
    /// dispatch ties break on the `(name, imperative)` pair.
    pub imperative: bool,
    pub arguments: Vec<Parameter>,
    /// `None` for functions that produce no value.
    pub return_type: Option<Type>,
    pub access_level: AccessLevel,
    pub is_final: bool,
    /// External functions are provided by the runtime and are not analysed
    /// or lowered.
    pub external: bool,
    pub position: SourcePosition,
    pub owner: Option<TypeDefId>,
    pub initializer: bool,
    /// Type methods are dispatched on the type, not an instance, and have
    /// no receiver or instance scope.
    pub type_method: bool,
    /// Synthesised thunk adapting storage representations between a
    /// protocol signature and a concrete implementation.
    pub boxing_layer: bool,
    pub body: Option<Vec<Stmt>>,
    pub reifications: Vec<Reification>,
    /// Number of dense variable ids this function's body uses; written by
    /// the semantic analyser and read by the code generator to size the
    /// local slot table.
    pub variable_count: usize,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        return_type: Option<Type>,
        position: SourcePosition,
    ) -> Self {
        Function {
            name: name.into(),
            imperative: true,
            arguments: Vec::new(),
            return_type,
            access_level: AccessLevel::Public,
            is_final: false,
            external: false,
            position,
            owner: None,
            initializer: false,
            type_method: false,
            boxing_layer: false,
            body: None,
            reifications: Vec::new(),
            variable_count: 0,
        }
    }

    /// Materialises the unspecific reification if it does not exist yet.
    pub fn create_unspecific_reification(&mut self) {
        if self.unspecific_reification().is_none() {
            self.reifications.push(Reification::default());
        }
    }

    pub fn unspecific_reification(&self) -> Option<&Reification> {
        self.reifications
            .iter()
            .find(|r| r.generic_arguments.is_empty())
    }
}

/// An extension adds methods and protocol conformances to an existing
/// definition before analysis begins.
#[derive(Debug, Clone)]
pub struct Extension {
    pub target: TypeDefId,
    pub methods: Vec<FunctionId>,
    pub protocols: Vec<Type>,
    pub position: SourcePosition,
}

/// Call dispatch selector for a method invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Statically resolved call.
    Static,
    /// Class table dispatch.
    Dynamic,
    /// Super call: dynamic lookup position, statically known target.
    DynamicStatic,
    /// Type (non-instance) method call.
    TypeMethod,
    /// Dispatch through a protocol conformance table.
    ProtocolDispatch,
    /// Dispatch through the n-th table of a multiprotocol conformance
    /// vector.
    Multiprotocol,
}

/// Built-in primitive operations lowered directly to target instructions
/// instead of calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltIn {
    None,
    IntegerNot,
    IntegerToDouble,
    BooleanNegate,
    Store,
    Load,
    Release,
    Multiprotocol,
}

/// Arguments of a method invocation, including generic argument types for
/// the built-in memory primitives and the table index for multiprotocol
/// dispatch.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub parameters: Vec<Expr>,
    pub generic_arguments: Vec<Type>,
    pub multiprotocol_n: usize,
}

/// A method invocation node. The parser resolves the callee type, the
/// method reference, the call kind, and the built-in tag before analysis.
#[derive(Debug, Clone)]
pub struct MethodExpr {
    pub callee: Box<Expr>,
    pub callee_type: Type,
    pub call_kind: CallKind,
    pub method: FunctionId,
    pub args: Args,
    pub built_in: BuiltIn,
    pub position: SourcePosition,
}

/// Expressions.
#[derive(Debug, Clone)]
pub enum Expr {
    IntegerLiteral(i64, SourcePosition),
    BooleanLiteral(bool, SourcePosition),
    DoubleLiteral(f64, SourcePosition),
    /// The no-value sentinel produced for empty optionals.
    NothingnessLiteral(SourcePosition),
    /// The receiver of the enclosing method or initializer.
    This(SourcePosition),
    /// A named variable use. `id` and `in_instance_scope` are written by
    /// the semantic analyser.
    Variable {
        name: String,
        position: SourcePosition,
        id: Option<usize>,
        in_instance_scope: bool,
    },
    Method(MethodExpr),
    /// Adapt an unboxed value into a uniform boxed slot.
    Box { inner: Box<Expr>, ty: Type },
    /// Extract an unboxed value out of a uniform boxed slot.
    Unbox { inner: Box<Expr>, ty: Type },
}

impl Expr {
    pub fn variable(name: impl Into<String>, position: SourcePosition) -> Self {
        Expr::Variable {
            name: name.into(),
            position,
            id: None,
            in_instance_scope: false,
        }
    }

    pub fn position(&self) -> SourcePosition {
        match self {
            Expr::IntegerLiteral(_, p)
            | Expr::BooleanLiteral(_, p)
            | Expr::DoubleLiteral(_, p)
            | Expr::NothingnessLiteral(p)
            | Expr::This(p) => *p,
            Expr::Variable { position, .. } => *position,
            Expr::Method(m) => m.position,
            Expr::Box { inner, .. } | Expr::Unbox { inner, .. } => inner.position(),
        }
    }
}

/// Statements.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `declaration` introduces a variable into the current scope. `id` is
    /// written by the semantic analyser.
    VariableDeclaration {
        name: String,
        ty: Type,
        frozen: bool,
        init: Option<Expr>,
        position: SourcePosition,
        id: Option<usize>,
    },
    /// Assignment to a previously declared variable.
    Assignment {
        name: String,
        value: Expr,
        position: SourcePosition,
        id: Option<usize>,
        in_instance_scope: bool,
    },
    ExprStmt(Expr),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        position: SourcePosition,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
        position: SourcePosition,
    },
    Block(Vec<Stmt>),
    Return(Option<Expr>, SourcePosition),
}

/// A package: the unit the parser hands to the semantic analyser.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub position: SourcePosition,
    /// Type definition arena; indexed by [`TypeDefId`].
    pub defs: Vec<TypeDefinition>,
    /// Function arena; indexed by [`FunctionId`]. Holds methods,
    /// initializers, and free functions alike.
    pub functions: Vec<Function>,
    pub extensions: Vec<Extension>,
    pub value_types: Vec<TypeDefId>,
    pub classes: Vec<TypeDefId>,
    pub protocols: Vec<TypeDefId>,
    pub free_functions: Vec<FunctionId>,
}

impl Package {
    pub fn new(name: impl Into<String>, position: SourcePosition) -> Self {
        Package {
            name: name.into(),
            position,
            defs: Vec::new(),
            functions: Vec::new(),
            extensions: Vec::new(),
            value_types: Vec::new(),
            classes: Vec::new(),
            protocols: Vec::new(),
            free_functions: Vec::new(),
        }
    }

    pub fn def(&self, id: TypeDefId) -> &TypeDefinition {
        &self.defs[id.0]
    }

    pub fn def_mut(&mut self, id: TypeDefId) -> &mut TypeDefinition {
        &mut self.defs[id.0]
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.0]
    }

    /// Adds a type definition and registers it in the per-kind list.
    pub fn add_type(&mut self, def: TypeDefinition) -> TypeDefId {
        let id = TypeDefId(self.defs.len());
        match def.kind {
            TypeDefKind::ValueType { .. } => self.value_types.push(id),
            TypeDefKind::Class { .. } => self.classes.push(id),
            TypeDefKind::Protocol => self.protocols.push(id),
        }
        self.defs.push(def);
        id
    }

    /// Adds a function to the arena without attaching it anywhere; used
    /// for functions carried by extensions until they are applied.
    pub fn add_function(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len());
        self.functions.push(function);
        id
    }

    /// Adds a method to a definition, recording ownership on the function.
    pub fn add_method(&mut self, def: TypeDefId, mut function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len());
        function.owner = Some(def);
        self.functions.push(function);
        self.defs[def.0].methods.push(id);
        id
    }

    /// Adds an initializer to a definition. Initializers form a namespace
    /// separate from methods.
    pub fn add_initializer(&mut self, def: TypeDefId, mut function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len());
        function.owner = Some(def);
        function.initializer = true;
        self.functions.push(function);
        self.defs[def.0].initializers.push(id);
        id
    }

    pub fn add_free_function(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len());
        self.functions.push(function);
        self.free_functions.push(id);
        id
    }

    /// Looks up a method on a definition by its `(name, imperative)` pair.
    pub fn lookup_method(
        &self,
        def: TypeDefId,
        name: &str,
        imperative: bool,
    ) -> Option<FunctionId> {
        self.defs[def.0].methods.iter().copied().find(|&f| {
            let func = self.function(f);
            func.name == name && func.imperative == imperative
        })
    }

    pub fn lookup_initializer(&self, def: TypeDefId, name: &str) -> Option<FunctionId> {
        self.defs[def.0]
            .initializers
            .iter()
            .copied()
            .find(|&f| self.function(f).name == name)
    }

    /// Whether the package declares the program entry point.
    pub fn has_start_flag_function(&self) -> bool {
        self.free_functions
            .iter()
            .any(|&f| self.function(f).name == START_FLAG)
    }
}
