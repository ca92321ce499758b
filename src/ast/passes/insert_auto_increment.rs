use std::sync::Arc;

use crate::ast::expr::*;
use crate::ast::optimizer::OptimizationPass;
use crate::ast::types::FunctionKind;
use crate::ast::visitor::Visitor;

/// For an insert that explicitly supplies a value for a column it also reads
/// back, routes that value through `LastInsertIdWith` so the trailing
/// last-insert-id query sees it.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertAutoIncrementAmender;

impl OptimizationPass for InsertAutoIncrementAmender {
    fn name(&self) -> &str {
        "insert_auto_increment_value"
    }

    fn description(&self) -> &str {
        "Wraps explicit auto-increment insert values so they can be read back"
    }

    fn transform(&self, root: &Node) -> Node {
        InsertAutoIncrementAmender.visit(root)
    }
}

impl Visitor for InsertAutoIncrementAmender {
    fn visit_insert_into(&mut self, node: &Node, insert: &InsertIntoExpr) -> Node {
        if insert.returning.is_empty() {
            return node.clone();
        }
        let mut changed = false;
        let values: Vec<Node> = insert
            .columns
            .iter()
            .zip(&insert.values)
            .map(|(column, value)| {
                let wrapped = matches!(value.as_ref(),
                    Expr::FunctionCall(f) if f.function == FunctionKind::LastInsertIdWith);
                if wrapped || !insert.returning.contains(column) {
                    return value.clone();
                }
                changed = true;
                Expr::function(FunctionKind::LastInsertIdWith, vec![value.clone()])
            })
            .collect();
        if !changed {
            return node.clone();
        }
        Arc::new(Expr::InsertInto(InsertIntoExpr {
            values,
            ..insert.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(returning: Vec<String>) -> Node {
        Arc::new(Expr::InsertInto(InsertIntoExpr {
            table: Expr::table("Orders"),
            columns: vec!["id".into(), "customer".into()],
            values: vec![Expr::placeholder(0, 42), Expr::placeholder(1, "acme")],
            returning,
        }))
    }

    #[test]
    fn test_returned_column_value_is_wrapped_once() {
        let once = InsertAutoIncrementAmender.transform(&insert(vec!["id".into()]));
        let values = &once.as_insert_into().unwrap().values;
        let call = values[0].as_function_call().unwrap();
        assert_eq!(call.function, FunctionKind::LastInsertIdWith);
        assert_eq!(call.args[0], Expr::placeholder(0, 42));
        assert!(values[1].is_constant_placeholder());

        let twice = InsertAutoIncrementAmender.transform(&once);
        assert!(Arc::ptr_eq(&once, &twice));
    }

    #[test]
    fn test_insert_without_returning_is_untouched() {
        let tree = insert(Vec::new());
        assert!(Arc::ptr_eq(&tree, &InsertAutoIncrementAmender.transform(&tree)));
    }
}
