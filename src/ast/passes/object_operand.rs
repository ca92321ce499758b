use super::is_null_literal;
use crate::ast::expr::*;
use crate::ast::optimizer::OptimizationPass;
use crate::ast::types::BinaryOp;
use crate::ast::visitor::{walk_binary, ChildRewriter, Visitor};

/// Expands `=`/`<>` between object operands into per-key-column comparisons:
/// `a = b` becomes `a.k1 = b.k1 AND a.k2 = b.k2`, and `a <> b` the matching
/// OR chain. Comparing an object operand with NULL compares every key column
/// with NULL.
///
/// Comparisons inside a projector (select columns, or a projection's host-side
/// projector) are left as they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectOperandComparisonExpander;

impl OptimizationPass for ObjectOperandComparisonExpander {
    fn name(&self) -> &str {
        "object_operand_comparison_expander"
    }

    fn description(&self) -> &str {
        "Expands object comparisons in predicates into key column comparisons"
    }

    fn transform(&self, root: &Node) -> Node {
        Expander { in_projector: false }.visit(root)
    }
}

struct Expander {
    in_projector: bool,
}

impl Expander {
    fn with_projector<T>(&mut self, in_projector: bool, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = self.in_projector;
        self.in_projector = in_projector;
        let out = f(self);
        self.in_projector = saved;
        out
    }
}

impl Visitor for Expander {
    fn visit_select(&mut self, node: &Node, select: &SelectExpr) -> Node {
        let mut r = ChildRewriter::new();
        let (from, filter, order_by, group_by, skip, take) = self.with_projector(false, |v| {
            (
                r.opt(v, &select.from),
                r.opt(v, &select.filter),
                r.list(v, &select.order_by),
                r.list(v, &select.group_by),
                r.opt(v, &select.skip),
                r.opt(v, &select.take),
            )
        });
        let columns = self.with_projector(true, |v| r.columns(v, &select.columns));
        r.finish(node, || {
            Expr::Select(SelectExpr {
                alias: select.alias.clone(),
                columns,
                from,
                filter,
                order_by,
                group_by,
                distinct: select.distinct,
                skip,
                take,
                for_update: select.for_update,
            })
        })
    }

    fn visit_projection(&mut self, node: &Node, projection: &ProjectionExpr) -> Node {
        let mut r = ChildRewriter::new();
        let select = self.with_projector(false, |v| r.node(v, &projection.select));
        let (projector, default_value) = self.with_projector(true, |v| {
            (
                r.node(v, &projection.projector),
                r.opt(v, &projection.default_value),
            )
        });
        r.finish(node, || {
            Expr::Projection(ProjectionExpr {
                select,
                projector,
                default_value,
            })
        })
    }

    fn visit_binary(&mut self, node: &Node, binary: &BinaryExpr) -> Node {
        let node = walk_binary(self, node, binary);
        if self.in_projector {
            return node;
        }
        let Expr::Binary(binary) = node.as_ref() else {
            return node;
        };
        if !matches!(binary.op, BinaryOp::Equal | BinaryOp::NotEqual) {
            return node;
        }
        match expand(binary.op, &binary.left, &binary.right) {
            Some(expanded) => expanded,
            None => node,
        }
    }
}

fn expand(op: BinaryOp, left: &Node, right: &Node) -> Option<Node> {
    let pairs: Vec<(Node, Node)> = match (left.as_ref(), right.as_ref()) {
        (Expr::ObjectOperand(l), Expr::ObjectOperand(r)) => {
            if l.members.len() != r.members.len() {
                return None;
            }
            l.members
                .iter()
                .map(|(name, lv)| {
                    r.members
                        .iter()
                        .find(|(other, _)| other == name)
                        .map(|(_, rv)| (lv.clone(), rv.clone()))
                })
                .collect::<Option<Vec<_>>>()?
        }
        (Expr::ObjectOperand(o), _) if is_null_literal(right) => o
            .members
            .iter()
            .map(|(_, v)| (v.clone(), right.clone()))
            .collect(),
        (_, Expr::ObjectOperand(o)) if is_null_literal(left) => o
            .members
            .iter()
            .map(|(_, v)| (v.clone(), left.clone()))
            .collect(),
        _ => return None,
    };

    let join = if op == BinaryOp::Equal {
        BinaryOp::And
    } else {
        BinaryOp::Or
    };
    pairs
        .into_iter()
        .map(|(l, r)| Expr::binary(op, l, r))
        .reduce(|acc, next| Expr::binary(join, acc, next))
}
