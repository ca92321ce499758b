//! Removal and merging of nested selects in FROM position.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::expr::*;
use crate::ast::optimizer::OptimizationPass;
use crate::ast::types::JoinType;
use crate::ast::visitor::{walk_select, ColumnReplacer, Visitor};

/// Removes nested selects that only pass columns through.
///
/// A select in FROM position (directly, or on either side of a join) with
/// bare column or literal columns and no filter, ordering, grouping,
/// distinct, pagination or locking is replaced by its own source, and every
/// reference to it is replaced by the expression it declared. On the
/// optional side of an outer join only selects of bare columns qualify, and
/// a select whose literal column is used as a sort or grouping key is kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedundantSubqueryRemover;

impl OptimizationPass for RedundantSubqueryRemover {
    fn name(&self) -> &str {
        "redundant_subquery_remover"
    }

    fn description(&self) -> &str {
        "Removes pass-through selects from FROM clauses"
    }

    fn transform(&self, root: &Node) -> Node {
        RedundantSubqueryRemover.visit(root)
    }
}

impl Visitor for RedundantSubqueryRemover {
    fn visit_select(&mut self, node: &Node, select: &SelectExpr) -> Node {
        let node = walk_select(self, node, select);
        let Expr::Select(outer) = node.as_ref() else {
            return node;
        };
        let Some(from) = &outer.from else {
            return node;
        };

        let mut removed: Vec<Node> = Vec::new();
        collect_redundant(from, &node, false, &mut removed);
        if removed.is_empty() {
            return node;
        }

        let mut new_from = from.clone();
        for inner in &removed {
            if let (Expr::Select(s), Some(source)) = (inner.as_ref(), &inner_from(inner)) {
                new_from = replace_source(&new_from, &s.alias, source);
            }
        }
        let merged = Arc::new(Expr::Select(SelectExpr {
            from: Some(new_from),
            ..outer.clone()
        }));
        removed
            .iter()
            .filter_map(|inner| inner.as_select())
            .fold(merged, |acc, inner| replace_references(&acc, inner))
    }
}

fn inner_from(node: &Node) -> Option<Node> {
    node.as_select().and_then(|s| s.from.clone())
}

/// `nullable` marks a source on the optional side of an outer join, whose
/// columns read NULL for unmatched rows. A literal column there cannot be
/// hoisted into the outer select.
fn collect_redundant(source: &Node, outer: &Node, nullable: bool, out: &mut Vec<Node>) {
    match source.as_ref() {
        Expr::Select(s)
            if is_redundant(s)
                && (!nullable || has_only_column_references(s))
                && references_resolve(outer, s)
                && !keys_on_literal_column(outer, s) =>
        {
            out.push(source.clone())
        }
        Expr::Join(j) => {
            let outer_join = matches!(j.join_type, JoinType::LeftOuter | JoinType::OuterApply);
            collect_redundant(&j.left, outer, nullable, out);
            collect_redundant(&j.right, outer, nullable || outer_join, out);
        }
        _ => {}
    }
}

fn has_only_column_references(select: &SelectExpr) -> bool {
    select
        .columns
        .iter()
        .all(|c| matches!(c.expr.as_ref(), Expr::Column(_)))
}

/// True when an ORDER BY or GROUP BY key under `scope` is a bare reference to
/// a column `inner` declares as a literal. Substituted, the key would become
/// a literal integer, which every dialect reads as a column position.
fn keys_on_literal_column(scope: &Expr, inner: &SelectExpr) -> bool {
    let literal_column = |key: &Node| {
        let key = match key.as_ref() {
            Expr::OrderBy(o) => &o.expr,
            _ => key,
        };
        match key.as_ref() {
            Expr::Column(c) if c.select_alias == inner.alias => inner
                .column_named(&c.name)
                .is_some_and(|d| matches!(d.expr.as_ref(), Expr::Constant(_) | Expr::ConstantPlaceholder(_))),
            _ => false,
        }
    };
    scope.any(&mut |e| match e {
        Expr::Select(s) => s.order_by.iter().chain(&s.group_by).any(literal_column),
        _ => false,
    })
}

fn is_redundant(select: &SelectExpr) -> bool {
    select.from.is_some()
        && !select.columns.is_empty()
        && select.is_pure_projection()
        && select.filter.is_none()
        && select.order_by.is_empty()
        && select.group_by.is_empty()
        && !select.distinct
        && !select.is_paginated()
        && !select.for_update
}

/// Every reference to `inner`'s alias under `scope` names a declared column.
pub(super) fn references_resolve(scope: &Expr, inner: &SelectExpr) -> bool {
    !scope.any(&mut |e| match e {
        Expr::Column(c) => c.select_alias == inner.alias && inner.column_named(&c.name).is_none(),
        _ => false,
    })
}

/// Replaces references to `inner`'s columns with the expressions it declares.
pub(super) fn replace_references(scope: &Node, inner: &SelectExpr) -> Node {
    let declared: HashMap<&str, &Node> = inner
        .columns
        .iter()
        .filter_map(|c| c.name.as_deref().map(|n| (n, &c.expr)))
        .collect();
    let lookup = |column: &ColumnExpr| {
        if column.select_alias == inner.alias {
            declared.get(column.name.as_str()).map(|n| Node::clone(n))
        } else {
            None
        }
    };
    ColumnReplacer::new(&lookup).visit(scope)
}

/// Replaces the select aliased `alias` in a FROM source (possibly nested in
/// joins) with `replacement`.
pub(super) fn replace_source(source: &Node, alias: &str, replacement: &Node) -> Node {
    match source.as_ref() {
        Expr::Select(s) if s.alias == alias => replacement.clone(),
        Expr::Join(j) => {
            let left = replace_source(&j.left, alias, replacement);
            let right = replace_source(&j.right, alias, replacement);
            if Arc::ptr_eq(&left, &j.left) && Arc::ptr_eq(&right, &j.right) {
                return source.clone();
            }
            Arc::new(Expr::Join(JoinExpr {
                join_type: j.join_type,
                left,
                right,
                condition: j.condition.clone(),
            }))
        }
        _ => source.clone(),
    }
}

/// Merges a nested select into the select that reads from it when doing so
/// keeps the result rows and their order.
///
/// The nested select must be the leftmost FROM source and a column
/// projection. Merging is refused when:
///
/// - both selects order, or both group;
/// - the inner select orders and the outer groups, aggregates or is distinct;
/// - the inner select groups at all;
/// - the outer select groups and the inner select filters;
/// - the inner select paginates and the outer filters or orders;
/// - the inner select takes and the outer paginates, is distinct,
///   aggregates, groups or joins;
/// - the inner select skips and the outer skips, is distinct, aggregates,
///   groups or joins;
/// - the inner select is distinct and the outer paginates, groups,
///   aggregates, joins, orders below the top level, or is not a plain
///   name-for-name projection of it;
/// - the outer select sorts or groups on an inner literal column.
///
/// Merged filters are AND-ed with the inner one first. The outer ordering and
/// grouping win, pagination is inherited and distinct is OR-ed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubqueryMerger;

impl OptimizationPass for SubqueryMerger {
    fn name(&self) -> &str {
        "subquery_merger"
    }

    fn description(&self) -> &str {
        "Merges nested column-projection selects into their parent"
    }

    fn transform(&self, root: &Node) -> Node {
        Merger { top_level: true }.visit(root)
    }
}

struct Merger {
    top_level: bool,
}

impl Visitor for Merger {
    fn visit_select(&mut self, node: &Node, select: &SelectExpr) -> Node {
        let was_top_level = self.top_level;
        self.top_level = false;
        let mut current = walk_select(self, node, select);
        loop {
            let merged = match current.as_ref() {
                Expr::Select(outer) => match leftmost_select(outer.from.as_ref()) {
                    Some(inner) if can_merge(outer, inner, was_top_level) => merge(outer, inner),
                    _ => None,
                },
                _ => None,
            };
            match merged {
                Some(next) => current = next,
                None => return current,
            }
        }
    }
}

fn leftmost_select(source: Option<&Node>) -> Option<&SelectExpr> {
    match source?.as_ref() {
        Expr::Select(s) => Some(s),
        Expr::Join(j) => leftmost_select(Some(&j.left)),
        _ => None,
    }
}

/// Every outer column is a bare reference to the inner column at the same
/// position, under the same name.
fn is_name_map_projection(outer: &SelectExpr, inner: &SelectExpr) -> bool {
    let direct = matches!(outer.from.as_deref(), Some(Expr::Select(s)) if s.alias == inner.alias);
    direct
        && outer.columns.len() == inner.columns.len()
        && outer.columns.iter().zip(&inner.columns).all(|(o, i)| {
            matches!(o.expr.as_ref(), Expr::Column(c) if Some(&c.name) == i.name.as_ref())
        })
}

pub(super) fn can_merge(outer: &SelectExpr, inner: &SelectExpr, top_level: bool) -> bool {
    if inner.from.is_none()
        || inner.columns.is_empty()
        || !inner.is_pure_projection()
        || inner.for_update
    {
        return false;
    }

    let sel_order = !outer.order_by.is_empty();
    let sel_group = !outer.group_by.is_empty();
    let sel_aggregates = outer.has_aggregates();
    let sel_join = matches!(outer.from.as_deref(), Some(Expr::Join(_)));
    let sel_paginated = outer.is_paginated();
    let frm_order = !inner.order_by.is_empty();
    let frm_group = !inner.group_by.is_empty();
    let frm_aggregates = inner.has_aggregates();

    if sel_order && frm_order {
        return false;
    }
    if sel_group && frm_group {
        return false;
    }
    if frm_order && (sel_group || sel_aggregates || outer.distinct) {
        return false;
    }
    if frm_group {
        return false;
    }
    if sel_group && inner.filter.is_some() {
        return false;
    }
    if inner.is_paginated() && (outer.filter.is_some() || sel_order) {
        return false;
    }
    if inner.take.is_some()
        && (sel_paginated || outer.distinct || sel_aggregates || sel_group || sel_join)
    {
        return false;
    }
    if inner.skip.is_some()
        && (outer.skip.is_some() || outer.distinct || sel_aggregates || sel_group || sel_join)
    {
        return false;
    }
    if inner.distinct
        && (sel_paginated
            || !is_name_map_projection(outer, inner)
            || sel_group
            || sel_aggregates
            || (sel_order && !top_level)
            || sel_join)
    {
        return false;
    }
    if frm_aggregates
        && (sel_paginated || outer.distinct || sel_aggregates || sel_group || sel_join)
    {
        return false;
    }

    let outer_node = Expr::Select(outer.clone());
    references_resolve(&outer_node, inner) && !keys_on_literal_column(&outer_node, inner)
}

fn merge(outer: &SelectExpr, inner: &SelectExpr) -> Option<Node> {
    let inner_source = inner.from.as_ref()?;
    let from = replace_source(outer.from.as_ref()?, &inner.alias, inner_source);
    let filter = match (&inner.filter, &outer.filter) {
        (Some(i), Some(o)) => Some(Expr::and(i.clone(), o.clone())),
        (i, o) => i.clone().or_else(|| o.clone()),
    };
    let order_by = if outer.order_by.is_empty() {
        inner.order_by.clone()
    } else {
        outer.order_by.clone()
    };
    let group_by = if outer.group_by.is_empty() {
        inner.group_by.clone()
    } else {
        outer.group_by.clone()
    };
    let merged = Arc::new(Expr::Select(SelectExpr {
        alias: outer.alias.clone(),
        columns: outer.columns.clone(),
        from: Some(from),
        filter,
        order_by,
        group_by,
        distinct: outer.distinct || inner.distinct,
        skip: outer.skip.clone().or_else(|| inner.skip.clone()),
        take: outer.take.clone().or_else(|| inner.take.clone()),
        for_update: outer.for_update,
    }));
    Some(replace_references(&merged, inner))
}
