//! Boxing layer body construction.
//!
//! A boxing layer is a thunk whose signature matches the protocol method
//! but whose body forwards to the concrete implementation, adapting each
//! value whose storage representation differs between the two signatures.
//! The body is ordinary AST, so the thunk flows through the same analysis
//! and lowering as any other method.

use crate::types::{storage_type, StorageType};
use glyph_ast::{
    Args, BuiltIn, CallKind, Expr, Function, FunctionId, MethodExpr, Package, Stmt, Type,
};

/// Adapts `expr` from representation `from` to representation `to`.
fn adapt(expr: Expr, from: &Type, to: &Type, package: &Package) -> Expr {
    let from_storage = storage_type(from, package);
    let to_storage = storage_type(to, package);
    if from_storage == to_storage {
        return expr;
    }
    match to_storage {
        StorageType::Boxed => Expr::Box {
            inner: Box::new(expr),
            ty: *from,
        },
        _ => Expr::Unbox {
            inner: Box::new(expr),
            ty: *to,
        },
    }
}

/// Builds the forwarding body of a boxing layer in place. `layer` carries
/// the protocol method's signature; the synthesised body calls
/// `implementation` on the same receiver with every argument adapted to
/// the implementation's representation, and adapts the result back.
pub fn build_boxing_layer_ast(
    layer: &mut Function,
    package: &Package,
    ty: Type,
    implementation: FunctionId,
) {
    let target = package.function(implementation);
    let parameters: Vec<Expr> = layer
        .arguments
        .iter()
        .zip(target.arguments.iter())
        .map(|(layer_argument, target_argument)| {
            let reference = Expr::variable(layer_argument.name.clone(), layer.position);
            adapt(reference, &layer_argument.ty, &target_argument.ty, package)
        })
        .collect();

    let call = Expr::Method(MethodExpr {
        callee: Box::new(Expr::This(layer.position)),
        callee_type: Type::new(ty.def),
        call_kind: CallKind::Static,
        method: implementation,
        args: Args {
            parameters,
            generic_arguments: Vec::new(),
            multiprotocol_n: 0,
        },
        built_in: BuiltIn::None,
        position: layer.position,
    });

    let body = match (&layer.return_type, &target.return_type) {
        (Some(layer_return), Some(target_return)) => {
            let adapted = adapt(call, target_return, layer_return, package);
            vec![Stmt::Return(Some(adapted), layer.position)]
        }
        (None, _) => vec![Stmt::ExprStmt(call)],
        (Some(_), None) => vec![Stmt::Return(None, layer.position)],
    };
    layer.body = Some(body);
}
