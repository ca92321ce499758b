use std::sync::Arc;

use crate::ast::expr::*;
use crate::ast::optimizer::OptimizationPass;
use crate::ast::visitor::Visitor;

/// Turns partial indexes into full ones for engines without index conditions.
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexConditionStripper;

impl OptimizationPass for IndexConditionStripper {
    fn name(&self) -> &str {
        "strip_index_conditions"
    }

    fn description(&self) -> &str {
        "Drops the WHERE condition of partial indexes"
    }

    fn transform(&self, root: &Node) -> Node {
        IndexConditionStripper.visit(root)
    }
}

impl Visitor for IndexConditionStripper {
    // The condition is dropped outright, so there is nothing below the index
    // worth walking.
    fn visit_create_index(&mut self, node: &Node, index: &CreateIndexExpr) -> Node {
        if index.filter.is_none() {
            return node.clone();
        }
        Arc::new(Expr::CreateIndex(CreateIndexExpr {
            filter: None,
            ..index.clone()
        }))
    }
}
