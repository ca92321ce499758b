/// Optimization pipeline.
///
/// Each pass is a rewrite visitor run once over the whole tree. Passes are
/// infallible: input they cannot improve comes back untouched, and a pass that
/// changes nothing returns the very same `Arc` it was given.
use std::sync::Arc;

use tracing::trace;

use super::dialect::{AmenderKind, AutoIncrementStyle, Dialect};
use super::expr::Node;
use super::passes::*;

/// A single rewrite over an IR tree.
///
/// # Example
///
/// ```ignore
/// struct DropForUpdate;
///
/// impl OptimizationPass for DropForUpdate {
///     fn name(&self) -> &str { "drop_for_update" }
///     fn transform(&self, root: &Node) -> Node {
///         // return `root.clone()` when nothing applies
///     }
/// }
/// ```
pub trait OptimizationPass: Send + Sync {
    /// Unique name identifying this pass.
    fn name(&self) -> &str;

    /// Optional description of what this pass does.
    fn description(&self) -> &str {
        ""
    }

    /// Rewrite the tree, returning `root` itself if nothing applies.
    fn transform(&self, root: &Node) -> Node;
}

/// Manages and executes a pipeline of optimization passes.
#[derive(Default)]
pub struct Optimizer {
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl Optimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The engine-independent pipeline.
    pub fn with_defaults() -> Self {
        let mut opt = Self::new();
        opt.add_pass(Box::new(ObjectOperandComparisonExpander));
        opt.add_pass(Box::new(FunctionCoalescer));
        opt.add_pass(Box::new(ConditionalEliminator));
        opt.add_pass(Box::new(RedundantFunctionCallRemover));
        opt.add_pass(Box::new(RedundantSubqueryRemover));
        opt.add_pass(Box::new(SubqueryMerger));
        opt.add_pass(Box::new(AggregateSubqueryMerger));
        opt.add_pass(Box::new(RedundantColumnRemover));
        // Merging and column removal can expose new nested concatenations.
        opt.add_pass(Box::new(FunctionCoalescer));
        opt
    }

    /// The default pipeline followed by the dialect's amenders.
    pub fn for_dialect(dialect: &Dialect) -> Self {
        let mut opt = Self::with_defaults();
        for amender in dialect.amenders() {
            opt.add_pass(amender_pass(*amender, dialect));
        }
        opt
    }

    /// Add an optimization pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn OptimizationPass>) {
        self.passes.push(pass);
    }

    /// Run all optimization passes on a tree in order.
    pub fn optimize(&self, root: &Node) -> Node {
        let mut current = root.clone();
        for pass in &self.passes {
            let next = pass.transform(&current);
            trace!(
                pass = pass.name(),
                changed = !Arc::ptr_eq(&next, &current),
                "optimization pass"
            );
            current = next;
        }
        current
    }

    /// List registered pass names.
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}

fn amender_pass(kind: AmenderKind, dialect: &Dialect) -> Box<dyn OptimizationPass> {
    match kind {
        AmenderKind::AutoIncrement => match dialect.auto_increment {
            AutoIncrementStyle::Serial => Box::new(AutoIncrementAmender::serial(
                dialect.types.serial_types().clone(),
            )),
            _ => Box::new(AutoIncrementAmender::row_id_alias()),
        },
        AmenderKind::StripDeferrability => Box::new(DeferrabilityStripper),
        AmenderKind::StripIndexConditions => Box::new(IndexConditionStripper),
        AmenderKind::InsertAutoIncrementValue => Box::new(InsertAutoIncrementAmender),
        AmenderKind::SelfReferencingUpdate => Box::new(SelfReferencingUpdateAmender),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::{Expr, SelectExpr};
    use crate::ast::types::*;

    #[test]
    fn test_default_pipeline_order() {
        let opt = Optimizer::with_defaults();
        assert_eq!(
            opt.pass_names(),
            vec![
                "object_operand_comparison_expander",
                "function_coalescer",
                "conditional_eliminator",
                "redundant_function_call_remover",
                "redundant_subquery_remover",
                "subquery_merger",
                "aggregate_subquery_merger",
                "redundant_column_remover",
                "function_coalescer",
            ]
        );
    }

    #[test]
    fn test_dialect_amenders_run_last() {
        let names = Optimizer::for_dialect(&Dialect::mysql()).pass_names().join(",");
        assert!(names.ends_with(
            "strip_deferrability,strip_index_conditions,insert_auto_increment_value,self_referencing_update"
        ));

        let pg = Optimizer::for_dialect(&Dialect::postgres());
        assert_eq!(pg.pass_names().last(), Some(&"auto_increment"));
    }

    #[test]
    fn test_untouched_tree_is_returned_as_is() {
        let tree = SelectExpr::new("s0")
            .with_column("a", Expr::column("t0", "a", SqlType::Int32))
            .with_from(Expr::aliased_table("T", "t0"))
            .into_node();
        let out = Optimizer::for_dialect(&Dialect::postgres()).optimize(&tree);
        assert!(Arc::ptr_eq(&tree, &out));
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let inner = SelectExpr::new("s1")
            .with_column("n", Expr::column("t0", "n", SqlType::String))
            .with_from(Expr::aliased_table("T", "t0"))
            .with_filter(Expr::equal(
                Expr::column("t0", "n", SqlType::String),
                Expr::null(SqlType::String),
            ))
            .into_node();
        let tree = SelectExpr::new("s0")
            .with_column(
                "n",
                Expr::function(
                    FunctionKind::Concat,
                    vec![
                        Expr::function(
                            FunctionKind::Concat,
                            vec![Expr::column("s1", "n", SqlType::String), Expr::constant("b")],
                        ),
                        Expr::constant("c"),
                    ],
                ),
            )
            .with_from(inner)
            .into_node();

        let opt = Optimizer::for_dialect(&Dialect::sqlite());
        let once = opt.optimize(&tree);
        let twice = opt.optimize(&once);
        assert_eq!(once, twice);
        assert!(Arc::ptr_eq(&once, &twice));
    }
}
