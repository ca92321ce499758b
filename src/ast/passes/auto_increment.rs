use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::expr::*;
use crate::ast::optimizer::OptimizationPass;
use crate::ast::types::{ConstraintKind, SqlType};
use crate::ast::visitor::{walk_column_definition, walk_create_table, Visitor};

#[derive(Debug, Clone)]
enum Style {
    /// Replace the column type with a serial type and drop the constraint.
    Serial(HashMap<SqlType, &'static str>),
    /// Make the column `INTEGER PRIMARY KEY AUTOINCREMENT`, moving the table's
    /// primary key onto it and demoting any other key to a unique constraint.
    RowIdAlias,
}

/// Rewrites auto-increment columns into the dialect's native form.
#[derive(Debug, Clone)]
pub struct AutoIncrementAmender {
    style: Style,
}

impl AutoIncrementAmender {
    pub fn serial(types: HashMap<SqlType, &'static str>) -> Self {
        Self {
            style: Style::Serial(types),
        }
    }

    pub fn row_id_alias() -> Self {
        Self {
            style: Style::RowIdAlias,
        }
    }
}

impl OptimizationPass for AutoIncrementAmender {
    fn name(&self) -> &str {
        "auto_increment"
    }

    fn description(&self) -> &str {
        "Rewrites auto-increment columns into the dialect's native form"
    }

    fn transform(&self, root: &Node) -> Node {
        AutoIncrementVisitor { style: &self.style }.visit(root)
    }
}

struct AutoIncrementVisitor<'a> {
    style: &'a Style,
}

impl Visitor for AutoIncrementVisitor<'_> {
    fn visit_column_definition(&mut self, node: &Node, column: &ColumnDefinitionExpr) -> Node {
        let node = walk_column_definition(self, node, column);
        let Style::Serial(types) = self.style else {
            return node;
        };
        let Expr::ColumnDefinition(column) = node.as_ref() else {
            return node;
        };
        if !column.has_constraint(ConstraintKind::AutoIncrement) {
            return node;
        }
        let Some(serial) = types.get(column.ty.non_nullable()) else {
            return node;
        };
        Arc::new(Expr::ColumnDefinition(ColumnDefinitionExpr {
            name: column.name.clone(),
            ty: column.ty.clone(),
            type_name: Some(serial.to_string()),
            constraints: without(&column.constraints, &[ConstraintKind::AutoIncrement]),
        }))
    }

    fn visit_create_table(&mut self, node: &Node, create: &CreateTableExpr) -> Node {
        let node = walk_create_table(self, node, create);
        if !matches!(self.style, Style::RowIdAlias) {
            return node;
        }
        let Expr::CreateTable(create) = node.as_ref() else {
            return node;
        };
        match relocate_primary_key(create) {
            Some(rewritten) => rewritten,
            None => node,
        }
    }
}

fn constraint_kind(node: &Node) -> Option<ConstraintKind> {
    node.as_constraint().map(|c| c.kind)
}

fn without(constraints: &[Node], kinds: &[ConstraintKind]) -> Vec<Node> {
    constraints
        .iter()
        .filter(|c| !constraint_kind(c).is_some_and(|k| kinds.contains(&k)))
        .cloned()
        .collect()
}

fn relocate_primary_key(create: &CreateTableExpr) -> Option<Node> {
    let auto_columns: Vec<&ColumnDefinitionExpr> = create
        .column_definitions
        .iter()
        .filter_map(|d| d.as_column_definition())
        .filter(|d| d.has_constraint(ConstraintKind::AutoIncrement))
        .collect();
    let [auto] = auto_columns.as_slice() else {
        return None;
    };
    let auto_name = auto.name.clone();

    let column_definitions: Vec<Node> = create
        .column_definitions
        .iter()
        .map(|node| {
            let Some(def) = node.as_column_definition() else {
                return node.clone();
            };
            let rewritten = if def.name == auto_name {
                let mut constraints = without(
                    &def.constraints,
                    &[ConstraintKind::PrimaryKey, ConstraintKind::AutoIncrement],
                );
                constraints.push(ConstraintExpr::column_level(ConstraintKind::PrimaryKey));
                constraints.push(ConstraintExpr::column_level(ConstraintKind::AutoIncrement));
                ColumnDefinitionExpr {
                    name: def.name.clone(),
                    ty: def.ty.clone(),
                    type_name: Some("INTEGER".to_string()),
                    constraints,
                }
            } else {
                ColumnDefinitionExpr {
                    constraints: def
                        .constraints
                        .iter()
                        .map(|c| demote_primary_key(c))
                        .collect(),
                    ..def.clone()
                }
            };
            if &rewritten == def {
                node.clone()
            } else {
                Arc::new(Expr::ColumnDefinition(rewritten))
            }
        })
        .collect();

    let table_constraints: Vec<Node> = create
        .table_constraints
        .iter()
        .filter(|c| {
            !matches!(c.as_ref(), Expr::Constraint(k)
                if k.kind == ConstraintKind::PrimaryKey && k.columns == [auto_name.clone()])
        })
        .map(demote_primary_key)
        .collect();

    let unchanged = column_definitions
        .iter()
        .zip(&create.column_definitions)
        .all(|(a, b)| Arc::ptr_eq(a, b))
        && table_constraints.len() == create.table_constraints.len()
        && table_constraints
            .iter()
            .zip(&create.table_constraints)
            .all(|(a, b)| Arc::ptr_eq(a, b));
    if unchanged {
        return None;
    }
    Some(Arc::new(Expr::CreateTable(CreateTableExpr {
        table: create.table.clone(),
        if_not_exists: create.if_not_exists,
        column_definitions,
        table_constraints,
    })))
}

/// Any primary key other than the row id alias becomes a unique constraint
/// over the same columns.
fn demote_primary_key(node: &Node) -> Node {
    match node.as_ref() {
        Expr::Constraint(c) if c.kind == ConstraintKind::PrimaryKey => {
            Arc::new(Expr::Constraint(ConstraintExpr {
                kind: ConstraintKind::Unique,
                ..c.clone()
            }))
        }
        _ => node.clone(),
    }
}
