use super::{constant_bool, is_null_literal};
use crate::ast::expr::*;
use crate::ast::optimizer::OptimizationPass;
use crate::ast::visitor::{walk_conditional, Visitor};

/// Folds conditionals whose test is a literal: `if true then a else b` is `a`.
/// A NULL test selects the else branch, as `CASE WHEN NULL` does.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionalEliminator;

impl OptimizationPass for ConditionalEliminator {
    fn name(&self) -> &str {
        "conditional_eliminator"
    }

    fn description(&self) -> &str {
        "Folds conditionals with a constant test"
    }

    fn transform(&self, root: &Node) -> Node {
        ConditionalEliminator.visit(root)
    }
}

impl Visitor for ConditionalEliminator {
    fn visit_conditional(&mut self, node: &Node, conditional: &ConditionalExpr) -> Node {
        let node = walk_conditional(self, node, conditional);
        let Expr::Conditional(conditional) = node.as_ref() else {
            return node;
        };
        match constant_bool(&conditional.test) {
            Some(true) => conditional.if_true.clone(),
            Some(false) => conditional.if_false.clone(),
            None if is_null_literal(&conditional.test) => conditional.if_false.clone(),
            None => node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::SqlType;
    use std::sync::Arc;

    fn pick(test: Node) -> Node {
        ConditionalEliminator.transform(&Expr::conditional(
            test,
            Expr::constant("yes"),
            Expr::constant("no"),
        ))
    }

    #[test]
    fn test_constant_tests_fold() {
        assert_eq!(pick(Expr::constant(true)), Expr::constant("yes"));
        assert_eq!(pick(Expr::constant(false)), Expr::constant("no"));
        assert_eq!(pick(Expr::null(SqlType::Boolean)), Expr::constant("no"));
    }

    #[test]
    fn test_nested_conditionals_fold_inside_out() {
        let inner = Expr::conditional(Expr::constant(false), Expr::constant(1), Expr::constant(2));
        let tree = Expr::conditional(Expr::constant(true), inner, Expr::constant(3));
        assert_eq!(ConditionalEliminator.transform(&tree), Expr::constant(2));
    }

    #[test]
    fn test_placeholder_test_is_kept() {
        let tree = Expr::conditional(
            Expr::placeholder(0, true),
            Expr::constant(1),
            Expr::constant(2),
        );
        let out = ConditionalEliminator.transform(&tree);
        assert!(Arc::ptr_eq(&tree, &out));

        let tree = Expr::conditional(
            Expr::column("t0", "flag", SqlType::Boolean),
            Expr::constant(1),
            Expr::constant(2),
        );
        assert!(Arc::ptr_eq(&tree, &ConditionalEliminator.transform(&tree)));
    }
}
