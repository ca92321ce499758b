use std::sync::Arc;

use super::subquery::replace_references;
use crate::ast::expr::*;
use crate::ast::optimizer::OptimizationPass;
use crate::ast::visitor::{walk_select, Visitor};

/// Folds `SELECT AGG(x) FROM (SELECT <expr> AS x FROM ... WHERE ...)` into
/// `SELECT AGG(<expr>) FROM ... WHERE ...`.
///
/// The inner select must declare exactly one named column and must not be
/// distinct, paginated, grouped, aggregating or locking. The outer select
/// may only hold aggregates over that column (or `COUNT(*)`) and must not
/// filter, group or join. Any ordering of the inner select is dropped, since
/// it cannot affect an aggregate.
#[derive(Debug, Default, Clone, Copy)]
pub struct AggregateSubqueryMerger;

impl OptimizationPass for AggregateSubqueryMerger {
    fn name(&self) -> &str {
        "aggregate_subquery_merger"
    }

    fn description(&self) -> &str {
        "Folds aggregates over single-column derived tables into one select"
    }

    fn transform(&self, root: &Node) -> Node {
        AggregateSubqueryMerger.visit(root)
    }
}

impl Visitor for AggregateSubqueryMerger {
    fn visit_select(&mut self, node: &Node, select: &SelectExpr) -> Node {
        let node = walk_select(self, node, select);
        let Expr::Select(outer) = node.as_ref() else {
            return node;
        };
        match fold(outer) {
            Some(folded) => folded,
            None => node,
        }
    }
}

fn fold(outer: &SelectExpr) -> Option<Node> {
    let inner = outer.from.as_ref()?.as_select()?;
    if outer.filter.is_some() || !outer.group_by.is_empty() || outer.columns.is_empty() {
        return None;
    }
    let [column] = inner.columns.as_slice() else {
        return None;
    };
    let column_name = column.name.as_deref()?;
    if inner.from.is_none()
        || inner.distinct
        || inner.is_paginated()
        || !inner.group_by.is_empty()
        || inner.has_aggregates()
        || inner.for_update
    {
        return None;
    }

    let aggregates_inner_column = outer.columns.iter().all(|c| match c.expr.as_ref() {
        Expr::Aggregate(a) => match a.arg.as_deref() {
            None => true,
            Some(Expr::Column(col)) => col.select_alias == inner.alias && col.name == column_name,
            Some(_) => false,
        },
        _ => false,
    });
    if !aggregates_inner_column {
        return None;
    }
    // The outer ordering or pagination may still mention the inner column.
    let outer_node = Expr::Select(outer.clone());
    if !super::subquery::references_resolve(&outer_node, inner) {
        return None;
    }

    let merged = Arc::new(Expr::Select(SelectExpr {
        alias: outer.alias.clone(),
        columns: outer.columns.clone(),
        from: inner.from.clone(),
        filter: inner.filter.clone(),
        order_by: outer.order_by.clone(),
        group_by: Vec::new(),
        distinct: outer.distinct,
        skip: outer.skip.clone(),
        take: outer.take.clone(),
        for_update: outer.for_update,
    }));
    Some(replace_references(&merged, inner))
}
