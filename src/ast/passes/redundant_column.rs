use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::expr::*;
use crate::ast::optimizer::OptimizationPass;
use crate::ast::visitor::{walk_select, Visitor};

/// Drops duplicate column declarations from nested selects.
///
/// Two declarations are duplicates when they are the same node, or both refer
/// to the same `(alias, column)`. Outer references to the dropped column are
/// redirected to the one that is kept. Columns that merely compute equal
/// values from different sources are never merged. The column list of a
/// root-level select is the result contract and is left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedundantColumnRemover;

impl OptimizationPass for RedundantColumnRemover {
    fn name(&self) -> &str {
        "redundant_column_remover"
    }

    fn description(&self) -> &str {
        "Removes duplicate column declarations from nested selects"
    }

    fn transform(&self, root: &Node) -> Node {
        let mut protected = Vec::new();
        match root.as_ref() {
            Expr::Select(_) => protected.push(Arc::as_ptr(root)),
            Expr::StatementList(list) => protected.extend(
                list.statements
                    .iter()
                    .filter(|s| s.is_select())
                    .map(Arc::as_ptr),
            ),
            _ => {}
        }
        Remover {
            protected,
            redirects: HashMap::new(),
        }
        .visit(root)
    }
}

struct Remover {
    protected: Vec<*const Expr>,
    /// `(select alias, dropped column)` to the column that replaces it.
    redirects: HashMap<(String, String), Node>,
}

impl Visitor for Remover {
    fn visit_column(&mut self, node: &Node, column: &ColumnExpr) -> Node {
        self.redirects
            .get(&(column.select_alias.clone(), column.name.clone()))
            .cloned()
            .unwrap_or_else(|| node.clone())
    }

    fn visit_select(&mut self, node: &Node, select: &SelectExpr) -> Node {
        let is_protected = self.protected.contains(&Arc::as_ptr(node));
        // Children first: the from clause is walked before anything that can
        // refer to it, so its redirects are in place in time.
        let node = walk_select(self, node, select);
        if is_protected {
            return node;
        }
        let Expr::Select(select) = node.as_ref() else {
            return node;
        };

        let mut kept: Vec<ColumnDeclaration> = Vec::with_capacity(select.columns.len());
        let mut dropped = false;
        for column in &select.columns {
            let original = match &column.name {
                Some(_) => kept
                    .iter()
                    .find(|k| k.name.is_some() && same_source(&k.expr, &column.expr))
                    .and_then(|k| k.name.clone()),
                None => None,
            };
            match (original, &column.name) {
                (Some(original), Some(name)) => {
                    let target = Expr::column(&select.alias, original, column.expr.sql_type());
                    self.redirects
                        .insert((select.alias.clone(), name.clone()), target);
                    dropped = true;
                }
                _ => kept.push(column.clone()),
            }
        }
        if !dropped {
            return node;
        }
        Arc::new(Expr::Select(SelectExpr {
            columns: kept,
            ..select.clone()
        }))
    }
}

fn same_source(a: &Node, b: &Node) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    match (a.as_ref(), b.as_ref()) {
        (Expr::Column(a), Expr::Column(b)) => a.select_alias == b.select_alias && a.name == b.name,
        _ => false,
    }
}
