/// Query compilation core.
///
/// Lowers a typed expression tree produced by an object/relational mapper
/// into command text and bound parameters for one SQL dialect:
///
/// ```text
/// IR tree                   (expr.rs, types.rs)
///       ↓
/// Optimization passes       (optimizer.rs, passes/)
///       ↓
/// Dialect amenders          (passes/, chosen by dialect.rs)
///       ↓
/// Dialect formatter         (formatter.rs)
///       ↓
/// {command text, parameters}
/// ```
///
/// The command-shape cache (cache.rs) memoizes the last three steps for trees
/// that differ only in placeholder values (placeholder.rs).
pub mod cache;
pub mod compiler;
pub mod dialect;
pub mod expr;
pub mod formatter;
pub mod optimizer;
pub mod passes;
pub mod placeholder;
pub mod types;
pub mod validate;
pub mod visitor;

// Re-export key types for convenience
pub use cache::{CacheStats, CommandCache, ShapeKey};
pub use compiler::{compile, CompileOptions, CompiledCommand, Compiler};
pub use dialect::{Capability, Dialect, DialectKind, SyntaxSymbol, TypeDescriptorProvider};
pub use expr::*;
pub use formatter::{format, FormattedCommand};
pub use optimizer::{OptimizationPass, Optimizer};
pub use placeholder::{parameterize, ParameterSource};
pub use types::*;
pub use validate::validate_sql;
pub use visitor::Visitor;
