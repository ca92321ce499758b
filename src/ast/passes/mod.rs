//! Individual optimization passes.
//!
//! The first group is engine independent and makes up
//! [`Optimizer::with_defaults`](super::optimizer::Optimizer::with_defaults).
//! The second group are dialect amenders, appended per dialect by
//! [`Optimizer::for_dialect`](super::optimizer::Optimizer::for_dialect).

mod aggregate_subquery;
mod conditional_eliminator;
mod function_coalescer;
mod object_operand;
mod redundant_column;
mod redundant_function_call;
mod subquery;

mod auto_increment;
mod deferrability;
mod index_condition;
mod insert_auto_increment;
mod self_reference;

pub use aggregate_subquery::AggregateSubqueryMerger;
pub use conditional_eliminator::ConditionalEliminator;
pub use function_coalescer::FunctionCoalescer;
pub use object_operand::ObjectOperandComparisonExpander;
pub use redundant_column::RedundantColumnRemover;
pub use redundant_function_call::RedundantFunctionCallRemover;
pub use subquery::{RedundantSubqueryRemover, SubqueryMerger};

pub use auto_increment::AutoIncrementAmender;
pub use deferrability::DeferrabilityStripper;
pub use index_condition::IndexConditionStripper;
pub use insert_auto_increment::InsertAutoIncrementAmender;
pub use self_reference::SelfReferencingUpdateAmender;

use super::expr::{Expr, Node};
use super::types::TypedValue;

fn is_null_literal(node: &Node) -> bool {
    matches!(node.as_ref(), Expr::Constant(c) if c.value.is_null())
}

/// Boolean value of a plain constant. Placeholders never qualify: their value
/// changes between executions of the same command.
fn constant_bool(node: &Node) -> Option<bool> {
    match node.as_ref() {
        Expr::Constant(c) => c.value.as_bool(),
        _ => None,
    }
}

fn constant_value(node: &Node) -> Option<&TypedValue> {
    match node.as_ref() {
        Expr::Constant(c) => Some(&c.value),
        _ => None,
    }
}
