use super::constant_value;
use crate::ast::expr::*;
use crate::ast::optimizer::OptimizationPass;
use crate::ast::types::{FunctionKind, TypedValue};
use crate::ast::visitor::{walk_function_call, Visitor};

/// Constant-folds function calls whose outcome is known without a server:
/// `x IN ()` is false (`x NOT IN ()` true), and `Concat` over string literals
/// is the concatenated literal.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedundantFunctionCallRemover;

impl OptimizationPass for RedundantFunctionCallRemover {
    fn name(&self) -> &str {
        "redundant_function_call_remover"
    }

    fn description(&self) -> &str {
        "Folds IN over empty collections and Concat over string literals"
    }

    fn transform(&self, root: &Node) -> Node {
        RedundantFunctionCallRemover.visit(root)
    }
}

impl Visitor for RedundantFunctionCallRemover {
    fn visit_function_call(&mut self, node: &Node, call: &FunctionCallExpr) -> Node {
        let node = walk_function_call(self, node, call);
        let Expr::FunctionCall(call) = node.as_ref() else {
            return node;
        };
        match call.function {
            FunctionKind::In | FunctionKind::NotIn => match call.args.get(1) {
                Some(list) if is_empty_collection(list) => {
                    Expr::constant(call.function == FunctionKind::NotIn)
                }
                _ => node,
            },
            FunctionKind::Concat => match concat_literals(&call.args) {
                Some(text) => Expr::constant(text),
                None => node,
            },
            _ => node,
        }
    }
}

fn is_empty_collection(node: &Node) -> bool {
    match node.as_ref() {
        Expr::Constant(c) => matches!(&c.value, TypedValue::List(items) if items.is_empty()),
        Expr::Tuple(t) => t.items.is_empty(),
        _ => false,
    }
}

fn concat_literals(args: &[Node]) -> Option<String> {
    if args.is_empty() {
        return None;
    }
    let mut out = String::new();
    for arg in args {
        out.push_str(constant_value(arg)?.as_str()?);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::SqlType;
    use std::sync::Arc;

    fn column() -> Node {
        Expr::column("t0", "id", SqlType::Int32)
    }

    #[test]
    fn test_in_empty_list_is_false() {
        let tree = Expr::function(
            FunctionKind::In,
            vec![column(), Expr::constant(TypedValue::List(vec![]))],
        );
        assert_eq!(RedundantFunctionCallRemover.transform(&tree), Expr::constant(false));

        let tree = Expr::function(
            FunctionKind::NotIn,
            vec![column(), Expr::constant(TypedValue::List(vec![]))],
        );
        assert_eq!(RedundantFunctionCallRemover.transform(&tree), Expr::constant(true));
    }

    #[test]
    fn test_in_non_empty_list_is_kept() {
        let tree = Expr::function(
            FunctionKind::In,
            vec![column(), Expr::constant(TypedValue::List(vec![TypedValue::Int32(1)]))],
        );
        assert!(Arc::ptr_eq(&tree, &RedundantFunctionCallRemover.transform(&tree)));
    }

    #[test]
    fn test_concat_of_literals_folds() {
        let tree = Expr::function(
            FunctionKind::Concat,
            vec![Expr::constant("a"), Expr::constant("b"), Expr::constant("c")],
        );
        assert_eq!(RedundantFunctionCallRemover.transform(&tree), Expr::constant("abc"));
    }

    #[test]
    fn test_concat_with_column_or_number_is_kept() {
        let tree = Expr::function(
            FunctionKind::Concat,
            vec![Expr::constant("a"), Expr::column("t0", "s", SqlType::String)],
        );
        assert!(Arc::ptr_eq(&tree, &RedundantFunctionCallRemover.transform(&tree)));

        let tree = Expr::function(
            FunctionKind::Concat,
            vec![Expr::constant("a"), Expr::constant(1)],
        );
        assert!(Arc::ptr_eq(&tree, &RedundantFunctionCallRemover.transform(&tree)));

        let tree = Expr::function(
            FunctionKind::Concat,
            vec![Expr::constant("a"), Expr::placeholder(0, "b")],
        );
        assert!(Arc::ptr_eq(&tree, &RedundantFunctionCallRemover.transform(&tree)));
    }
}
