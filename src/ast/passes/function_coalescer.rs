use std::sync::Arc;

use super::is_null_literal;
use crate::ast::expr::*;
use crate::ast::optimizer::OptimizationPass;
use crate::ast::types::{BinaryOp, FunctionKind};
use crate::ast::visitor::{walk_binary, walk_function_call, Visitor};

/// Rewrites `x = NULL` / `x <> NULL` into `IsNull(x)` / `IsNotNull(x)` and
/// flattens `Concat(Concat(a, b), c)` into `Concat(a, b, c)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FunctionCoalescer;

impl OptimizationPass for FunctionCoalescer {
    fn name(&self) -> &str {
        "function_coalescer"
    }

    fn description(&self) -> &str {
        "Turns NULL comparisons into IS [NOT] NULL and flattens nested Concat calls"
    }

    fn transform(&self, root: &Node) -> Node {
        FunctionCoalescer.visit(root)
    }
}

impl Visitor for FunctionCoalescer {
    fn visit_binary(&mut self, node: &Node, binary: &BinaryExpr) -> Node {
        let node = walk_binary(self, node, binary);
        let Expr::Binary(binary) = node.as_ref() else {
            return node;
        };
        let function = match binary.op {
            BinaryOp::Equal => FunctionKind::IsNull,
            BinaryOp::NotEqual => FunctionKind::IsNotNull,
            _ => return node,
        };
        let operand = if is_null_literal(&binary.right) {
            binary.left.clone()
        } else if is_null_literal(&binary.left) {
            binary.right.clone()
        } else {
            return node;
        };
        Expr::function(function, vec![operand])
    }

    fn visit_function_call(&mut self, node: &Node, call: &FunctionCallExpr) -> Node {
        let node = walk_function_call(self, node, call);
        let Expr::FunctionCall(call) = node.as_ref() else {
            return node;
        };
        if call.function != FunctionKind::Concat || !call.args.iter().any(|a| is_concat(a)) {
            return node;
        }

        // Children were flattened on the way up, so one level is enough.
        let mut args = Vec::with_capacity(call.args.len() + 2);
        for arg in &call.args {
            match arg.as_ref() {
                Expr::FunctionCall(inner) if inner.function == FunctionKind::Concat => {
                    args.extend(inner.args.iter().cloned())
                }
                _ => args.push(arg.clone()),
            }
        }
        Arc::new(Expr::FunctionCall(FunctionCallExpr {
            function: FunctionKind::Concat,
            args,
            ty: call.ty.clone(),
        }))
    }
}

fn is_concat(node: &Node) -> bool {
    matches!(node.as_ref(), Expr::FunctionCall(f) if f.function == FunctionKind::Concat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::SqlType;
    use pretty_assertions::assert_eq;

    fn concat(args: Vec<Node>) -> Node {
        Expr::function(FunctionKind::Concat, args)
    }

    #[test]
    fn test_nested_concat_is_flattened() {
        let tree = concat(vec![
            concat(vec![Expr::constant("a"), Expr::constant("b")]),
            Expr::constant("c"),
        ]);
        let out = FunctionCoalescer.transform(&tree);
        let call = out.as_function_call().unwrap();
        assert_eq!(call.function, FunctionKind::Concat);
        assert_eq!(call.args.len(), 3);
        assert_eq!(
            call.args,
            vec![Expr::constant("a"), Expr::constant("b"), Expr::constant("c")]
        );
    }

    #[test]
    fn test_deeply_nested_concat_is_flattened() {
        let tree = concat(vec![
            Expr::constant("a"),
            concat(vec![
                concat(vec![Expr::constant("b"), Expr::constant("c")]),
                Expr::constant("d"),
            ]),
        ]);
        let out = FunctionCoalescer.transform(&tree);
        assert_eq!(out.as_function_call().unwrap().args.len(), 4);
    }

    #[test]
    fn test_null_comparison_becomes_is_null() {
        let x = Expr::column("t0", "x", SqlType::Int32.nullable());
        let tree = Expr::equal(x.clone(), Expr::null(SqlType::Int32));
        let out = FunctionCoalescer.transform(&tree);
        assert_eq!(out, Expr::function(FunctionKind::IsNull, vec![x.clone()]));

        let tree = Expr::binary(BinaryOp::NotEqual, Expr::null(SqlType::Int32), x.clone());
        let out = FunctionCoalescer.transform(&tree);
        assert_eq!(out, Expr::function(FunctionKind::IsNotNull, vec![x]));
    }

    #[test]
    fn test_non_null_comparison_is_untouched() {
        let tree = Expr::equal(
            Expr::column("t0", "x", SqlType::Int32),
            Expr::placeholder(0, 5),
        );
        let out = FunctionCoalescer.transform(&tree);
        assert!(Arc::ptr_eq(&tree, &out));
    }

    #[test]
    fn test_idempotent() {
        let tree = Expr::and(
            Expr::equal(Expr::column("t0", "x", SqlType::String), Expr::null(SqlType::String)),
            Expr::equal(
                concat(vec![concat(vec![Expr::constant("a")]), Expr::constant("b")]),
                Expr::constant("ab"),
            ),
        );
        let once = FunctionCoalescer.transform(&tree);
        let twice = FunctionCoalescer.transform(&once);
        assert_eq!(once, twice);
        assert!(Arc::ptr_eq(&once, &twice));
    }
}
