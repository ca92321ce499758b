//! Constant placeholders.
//!
//! A [`ConstantPlaceholderExpr`] is a literal whose value changes between
//! executions of the same command. The formatter always binds placeholders as
//! parameters and records where each bound value comes from, so a cached
//! command can be re-bound to fresh values without formatting it again.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::expr::*;
use super::types::TypedValue;
use super::visitor::Visitor;
use crate::error::{CompileError, Result};

/// Where the value of one emitted parameter comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterSource {
    /// The value of placeholder `index`.
    Placeholder(usize),
    /// One element of a list-valued placeholder expanded for `IN`.
    PlaceholderElement { index: usize, position: usize },
    /// A literal that is part of the command shape itself.
    Literal(TypedValue),
}

impl ParameterSource {
    pub fn resolve(&self, values: &BTreeMap<usize, TypedValue>) -> Result<TypedValue> {
        match self {
            ParameterSource::Literal(value) => Ok(value.clone()),
            ParameterSource::Placeholder(index) => values
                .get(index)
                .cloned()
                .ok_or_else(|| CompileError::invariant(format!("no value for placeholder {}", index))),
            ParameterSource::PlaceholderElement { index, position } => match values.get(index) {
                Some(TypedValue::List(items)) => items.get(*position).cloned().ok_or_else(|| {
                    CompileError::invariant(format!(
                        "placeholder {} has no element {}",
                        index, position
                    ))
                }),
                Some(_) => Err(CompileError::invariant(format!(
                    "placeholder {} is not a list",
                    index
                ))),
                None => Err(CompileError::invariant(format!(
                    "no value for placeholder {}",
                    index
                ))),
            },
        }
    }
}

/// Resolves every parameter of a formatted command against placeholder values.
pub fn bind(
    sources: &[ParameterSource],
    values: &BTreeMap<usize, TypedValue>,
) -> Result<Vec<TypedValue>> {
    sources.iter().map(|s| s.resolve(values)).collect()
}

/// Placeholder values by index. When an index occurs more than once the first
/// occurrence in traversal order wins.
pub fn placeholder_values(root: &Node) -> BTreeMap<usize, TypedValue> {
    let mut out = BTreeMap::new();
    collect_values(root, &mut out);
    out
}

fn collect_values(node: &Expr, out: &mut BTreeMap<usize, TypedValue>) {
    if let Expr::ConstantPlaceholder(p) = node {
        out.entry(p.index)
            .or_insert_with(|| p.constant.value.clone());
    }
    for child in node.children() {
        collect_values(child, out);
    }
}

/// The command shape: the same tree with every placeholder value replaced by
/// `NULL`. A list keeps its length, since that decides how many parameters
/// `IN` expands to.
pub fn erase_placeholder_values(root: &Node) -> Node {
    Eraser.visit(root)
}

struct Eraser;

impl Visitor for Eraser {
    fn visit_constant_placeholder(&mut self, node: &Node, placeholder: &ConstantPlaceholderExpr) -> Node {
        let erased = match &placeholder.constant.value {
            TypedValue::List(items) => TypedValue::List(vec![TypedValue::Null; items.len()]),
            _ => TypedValue::Null,
        };
        if erased == placeholder.constant.value {
            return node.clone();
        }
        Arc::new(Expr::ConstantPlaceholder(ConstantPlaceholderExpr {
            index: placeholder.index,
            constant: ConstantExpr {
                value: erased,
                ty: placeholder.constant.ty.clone(),
            },
        }))
    }
}

/// Turns plain constants into placeholders so that queries differing only in
/// those literals share one command shape.
///
/// Nulls, booleans and lists stay constants, since passes fold on them and the
/// formatter renders them structurally. DDL is left alone. New placeholders
/// are numbered after the highest index already in the tree, in traversal
/// order.
pub fn parameterize(root: &Node) -> Node {
    let next = placeholder_values(root)
        .keys()
        .next_back()
        .map(|max| max + 1)
        .unwrap_or(0);
    Parameterizer { next }.visit(root)
}

struct Parameterizer {
    next: usize,
}

impl Visitor for Parameterizer {
    fn visit_constant(&mut self, node: &Node, constant: &ConstantExpr) -> Node {
        if matches!(
            constant.value,
            TypedValue::Null | TypedValue::Boolean(_) | TypedValue::List(_)
        ) {
            return node.clone();
        }
        let index = self.next;
        self.next += 1;
        Arc::new(Expr::ConstantPlaceholder(ConstantPlaceholderExpr {
            index,
            constant: constant.clone(),
        }))
    }

    fn visit_create_table(&mut self, node: &Node, _create: &CreateTableExpr) -> Node {
        node.clone()
    }

    fn visit_alter_table(&mut self, node: &Node, _alter: &AlterTableExpr) -> Node {
        node.clone()
    }

    fn visit_create_index(&mut self, node: &Node, _index: &CreateIndexExpr) -> Node {
        node.clone()
    }
}
