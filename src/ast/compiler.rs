/// IR → command compiler.
///
/// Ties the pipeline together: optimize the tree for a dialect, format it,
/// then bind parameter values. [`compile`] runs the whole pipeline every
/// time; [`Compiler`] memoizes the first two steps per command shape.
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cache::{CacheStats, CommandCache, ShapeKey};
use super::dialect::{Dialect, NoTypeDescriptors, TypeDescriptorProvider};
use super::expr::Node;
use super::formatter::{format_with_types, FormattedCommand};
use super::optimizer::Optimizer;
use super::placeholder::{bind, erase_placeholder_values, placeholder_values};
use super::types::TypedValue;
use crate::error::Result;

/// Per-call formatting switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Inline boolean and integer constants instead of binding them.
    pub evaluate_constants: bool,
    /// Add `FOR UPDATE` to the root select where the dialect supports it.
    pub for_update: bool,
    /// Schema prefix for every table name.
    pub schema_name: Option<String>,
}

/// Command text plus the values to bind, in marker order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledCommand {
    pub text: String,
    pub parameters: Vec<TypedValue>,
}

/// Compile an IR tree without any caching.
pub fn compile(ir: &Node, dialect: &Dialect, options: &CompileOptions) -> Result<CompiledCommand> {
    let optimized = Optimizer::for_dialect(dialect).optimize(ir);
    let formatted = format_with_types(&optimized, dialect, options, &NoTypeDescriptors)?;
    let parameters = bind(&formatted.parameters, &placeholder_values(ir))?;
    Ok(CompiledCommand {
        text: formatted.text,
        parameters,
    })
}

/// A compiler for one dialect backed by a command-shape cache.
///
/// The cache is owned by whoever builds the compiler and may be shared
/// between compilers with [`Compiler::with_cache`].
pub struct Compiler {
    dialect: Dialect,
    options: CompileOptions,
    optimizer: Optimizer,
    types: Arc<dyn TypeDescriptorProvider>,
    /// Dialect fingerprint mixed with the type descriptor identity.
    profile: u64,
    cache: Arc<CommandCache>,
}

impl Compiler {
    pub fn new(dialect: Dialect, options: CompileOptions) -> Self {
        Self::with_cache(dialect, options, Arc::new(CommandCache::default()))
    }

    pub fn with_cache(dialect: Dialect, options: CompileOptions, cache: Arc<CommandCache>) -> Self {
        let optimizer = Optimizer::for_dialect(&dialect);
        let profile = profile(&dialect, None);
        Self {
            dialect,
            options,
            optimizer,
            types: Arc::new(NoTypeDescriptors),
            profile,
            cache,
        }
    }

    /// Use `types` for enum DDL names. Compilers sharing a cache only share
    /// entries when they share the same provider instance.
    pub fn with_type_descriptors(mut self, types: Arc<dyn TypeDescriptorProvider>) -> Self {
        self.profile = profile(&self.dialect, Some(&types));
        self.types = types;
        self
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<CommandCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Compile `ir`. Trees that differ only in placeholder values share one
    /// cache entry; on a hit only the parameters are rebuilt.
    pub fn compile(&self, ir: &Node) -> Result<CompiledCommand> {
        let values = placeholder_values(ir);
        let shape = erase_placeholder_values(ir);
        let key = ShapeKey::new(
            self.dialect.name(),
            self.profile,
            self.options.clone(),
            shape.clone(),
        );

        let (command, hit) = self.cache.get_or_insert_with(key, || self.format_shape(&shape))?;
        let parameters = bind(&command.parameters, &values)?;
        debug!(
            dialect = self.dialect.name(),
            cache = if hit { "hit" } else { "miss" },
            parameters = parameters.len(),
            "compiled command"
        );
        Ok(CompiledCommand {
            text: command.text.clone(),
            parameters,
        })
    }

    fn format_shape(&self, shape: &Node) -> Result<FormattedCommand> {
        let optimized = self.optimizer.optimize(shape);
        format_with_types(&optimized, &self.dialect, &self.options, self.types.as_ref())
    }
}

fn profile(dialect: &Dialect, types: Option<&Arc<dyn TypeDescriptorProvider>>) -> u64 {
    let mut hasher = DefaultHasher::new();
    dialect.fingerprint().hash(&mut hasher);
    // The provider instance stands in for its contents, which are opaque.
    types
        .map(|t| Arc::as_ptr(t) as *const () as usize)
        .hash(&mut hasher);
    hasher.finish()
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("dialect", &self.dialect.kind)
            .field("options", &self.options)
            .field("passes", &self.optimizer.pass_names())
            .finish()
    }
}
