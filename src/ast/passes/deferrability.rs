use std::sync::Arc;

use crate::ast::expr::*;
use crate::ast::optimizer::OptimizationPass;
use crate::ast::types::Deferrability;
use crate::ast::visitor::{walk_references_column, Visitor};

/// Clears foreign key deferrability for engines that cannot express it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeferrabilityStripper;

impl OptimizationPass for DeferrabilityStripper {
    fn name(&self) -> &str {
        "strip_deferrability"
    }

    fn description(&self) -> &str {
        "Removes deferrability clauses from foreign keys"
    }

    fn transform(&self, root: &Node) -> Node {
        DeferrabilityStripper.visit(root)
    }
}

impl Visitor for DeferrabilityStripper {
    fn visit_references_column(&mut self, node: &Node, references: &ReferencesColumnExpr) -> Node {
        let node = walk_references_column(self, node, references);
        match node.as_ref() {
            Expr::ReferencesColumn(r) if r.deferrability != Deferrability::Unspecified => {
                Arc::new(Expr::ReferencesColumn(ReferencesColumnExpr {
                    deferrability: Deferrability::Unspecified,
                    ..r.clone()
                }))
            }
            _ => node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::ForeignKeyAction;

    fn foreign_key(deferrability: Deferrability) -> Node {
        Arc::new(Expr::ForeignKeyConstraint(ForeignKeyConstraintExpr {
            name: Some("fk_order".into()),
            columns: vec!["order_id".into()],
            references: Arc::new(Expr::ReferencesColumn(ReferencesColumnExpr {
                table: Expr::table("Orders"),
                columns: vec!["id".into()],
                deferrability,
                on_delete: ForeignKeyAction::Cascade,
                on_update: ForeignKeyAction::NoAction,
            })),
        }))
    }

    #[test]
    fn test_deferrability_is_cleared() {
        let out = DeferrabilityStripper.transform(&foreign_key(Deferrability::InitiallyDeferred));
        let references = out
            .as_foreign_key_constraint()
            .unwrap()
            .references
            .as_references_column()
            .unwrap()
            .clone();
        assert_eq!(references.deferrability, Deferrability::Unspecified);
        assert_eq!(references.on_delete, ForeignKeyAction::Cascade);
    }

    #[test]
    fn test_unspecified_is_untouched() {
        let tree = foreign_key(Deferrability::Unspecified);
        assert!(Arc::ptr_eq(&tree, &DeferrabilityStripper.transform(&tree)));
    }
}
