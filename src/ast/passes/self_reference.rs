use crate::ast::expr::*;
use crate::ast::optimizer::OptimizationPass;
use crate::ast::visitor::{walk_select, ChildRewriter, Visitor};

/// Lets an `UPDATE` or `DELETE` read its own target table in a subquery.
///
/// Some engines refuse `UPDATE t ... WHERE x IN (SELECT ... FROM t)`. Every
/// read of the target inside the filter or the assigned values is replaced
/// with a derived table, `(SELECT * FROM t) AS alias`, which the engine
/// materializes before the modification starts.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfReferencingUpdateAmender;

impl OptimizationPass for SelfReferencingUpdateAmender {
    fn name(&self) -> &str {
        "self_referencing_update"
    }

    fn description(&self) -> &str {
        "Wraps reads of a modified table in derived tables"
    }

    fn transform(&self, root: &Node) -> Node {
        SelfReferencingUpdateAmender.visit(root)
    }
}

impl Visitor for SelfReferencingUpdateAmender {
    fn visit_update(&mut self, node: &Node, update: &UpdateExpr) -> Node {
        let Some(target) = update.table.as_table() else {
            return node.clone();
        };
        let mut wrapper = TargetWrapper {
            target: &target.name,
        };
        let mut r = ChildRewriter::new();
        let assignments: Vec<Assignment> = update
            .assignments
            .iter()
            .map(|a| Assignment {
                column: a.column.clone(),
                value: r.node(&mut wrapper, &a.value),
            })
            .collect();
        let filter = r.opt(&mut wrapper, &update.filter);
        r.finish(node, || {
            Expr::Update(UpdateExpr {
                table: update.table.clone(),
                assignments,
                filter,
            })
        })
    }

    fn visit_delete(&mut self, node: &Node, delete: &DeleteExpr) -> Node {
        let Some(target) = delete.table.as_table() else {
            return node.clone();
        };
        let mut wrapper = TargetWrapper {
            target: &target.name,
        };
        let mut r = ChildRewriter::new();
        let filter = r.opt(&mut wrapper, &delete.filter);
        r.finish(node, || {
            Expr::Delete(DeleteExpr {
                table: delete.table.clone(),
                filter,
            })
        })
    }
}

struct TargetWrapper<'a> {
    target: &'a str,
}

impl Visitor for TargetWrapper<'_> {
    fn visit_select(&mut self, node: &Node, select: &SelectExpr) -> Node {
        if is_wrapper(select) {
            return node.clone();
        }
        walk_select(self, node, select)
    }

    fn visit_table(&mut self, node: &Node, table: &TableExpr) -> Node {
        if table.name != self.target {
            return node.clone();
        }
        SelectExpr::new(table.reference_name())
            .with_from(Expr::table(table.name.clone()))
            .into_node()
    }
}

/// `SELECT * FROM t`, as produced by this pass.
fn is_wrapper(select: &SelectExpr) -> bool {
    select.columns.is_empty()
        && select.filter.is_none()
        && select.group_by.is_empty()
        && select.order_by.is_empty()
        && !select.is_paginated()
        && matches!(select.from.as_deref(), Some(Expr::Table(t)) if t.alias.is_none())
}
