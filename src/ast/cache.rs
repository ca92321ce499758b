/// Command-shape cache.
///
/// Maps the shape of an IR tree (its structure with placeholder values erased)
/// plus the dialect profile and compile options to the formatted command. A hit skips
/// the optimizer and formatter entirely; only parameters are re-bound.
///
/// The cache is a bounded LRU split across a few shards, each behind its own
/// mutex. Two threads missing on the same novel shape both compile it and the
/// later insert wins; both results are identical since formatting is
/// deterministic.
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use super::compiler::CompileOptions;
use super::expr::Node;
use super::formatter::FormattedCommand;
use crate::error::Result;

const MAX_SHARDS: usize = 8;

/// Cache key: dialect, options and the erased tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeKey {
    pub dialect: &'static str,
    /// Identifies the dialect tables and type descriptors the command is
    /// formatted with; customized dialects of one kind differ here.
    pub profile: u64,
    pub options: CompileOptions,
    pub shape: Node,
}

impl ShapeKey {
    pub fn new(dialect: &'static str, profile: u64, options: CompileOptions, shape: Node) -> Self {
        Self {
            dialect,
            profile,
            options,
            shape,
        }
    }

    fn shard_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Counters exposed for instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    /// Times the optimize + format pipeline actually ran.
    pub compilations: u64,
    pub entries: usize,
    pub capacity: usize,
}

pub struct CommandCache {
    shards: Vec<Mutex<LruCache<ShapeKey, Arc<FormattedCommand>>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    compilations: AtomicU64,
}

impl CommandCache {
    /// A cache holding at most roughly `capacity` commands. A capacity of 0
    /// is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let shard_count = capacity.min(MAX_SHARDS);
        let per_shard = NonZeroUsize::new(capacity.div_ceil(shard_count)).unwrap_or(NonZeroUsize::MIN);
        let shards = (0..shard_count)
            .map(|_| Mutex::new(LruCache::new(per_shard)))
            .collect();
        Self {
            shards,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
        }
    }

    fn shard(&self, key: &ShapeKey) -> &Mutex<LruCache<ShapeKey, Arc<FormattedCommand>>> {
        let index = (key.shard_hash() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    pub fn get(&self, key: &ShapeKey) -> Option<Arc<FormattedCommand>> {
        let found = self.shard(key).lock().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, key: ShapeKey, command: Arc<FormattedCommand>) {
        let mut shard = self.shard(&key).lock();
        if !shard.contains(&key) && shard.len() == shard.cap().get() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        shard.put(key, command);
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the cached command for `key`, running `compile` on a miss.
    /// The shard lock is not held while compiling. The flag is true on a hit.
    pub fn get_or_insert_with<F>(&self, key: ShapeKey, compile: F) -> Result<(Arc<FormattedCommand>, bool)>
    where
        F: FnOnce() -> Result<FormattedCommand>,
    {
        if let Some(command) = self.get(&key) {
            return Ok((command, true));
        }
        self.compilations.fetch_add(1, Ordering::Relaxed);
        let command = Arc::new(compile()?);
        self.insert(key, Arc::clone(&command));
        Ok((command, false))
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity,
        }
    }
}

impl Default for CommandCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for CommandCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandCache")
            .field("shards", &self.shards.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::{Expr, SelectExpr};
    use crate::ast::types::SqlType;
    use crate::error::CompileError;
    use pretty_assertions::assert_eq;

    fn key(table: &str) -> ShapeKey {
        let shape = SelectExpr::new("s0")
            .with_column("id", Expr::column("t0", "id", SqlType::Int32))
            .with_from(Expr::aliased_table(table, "t0"))
            .into_node();
        ShapeKey::new("postgres", 0, CompileOptions::default(), shape)
    }

    fn command(text: &str) -> FormattedCommand {
        FormattedCommand {
            text: text.to_string(),
            parameters: Vec::new(),
        }
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = CommandCache::new(16);
        let (first, hit) = cache
            .get_or_insert_with(key("A"), || Ok(command("SELECT 1")))
            .unwrap();
        assert!(!hit);
        let (second, hit) = cache
            .get_or_insert_with(key("A"), || panic!("must not recompile"))
            .unwrap();
        assert!(hit);
        assert!(Arc::ptr_eq(&first, &second));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.compilations, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_dialect_and_options_are_part_of_the_key() {
        let cache = CommandCache::new(16);
        cache.insert(key("A"), Arc::new(command("pg")));
        let mut mysql = key("A");
        mysql.dialect = "mysql";
        assert!(cache.get(&mysql).is_none());

        let mut options = key("A");
        options.options.evaluate_constants = true;
        assert!(cache.get(&options).is_none());

        let mut profile = key("A");
        profile.profile = 1;
        assert!(cache.get(&profile).is_none());
        assert!(cache.get(&key("A")).is_some());
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = CommandCache::new(4);
        let err = cache
            .get_or_insert_with(key("A"), || Err(CompileError::unsupported("nope")))
            .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedConstruct(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_compilers_share_one_cache() {
        use crate::ast::compiler::{compile, Compiler};
        use crate::ast::dialect::Dialect;
        use crate::ast::types::TypedValue;

        let by_key = |table: &str, value: i32| {
            SelectExpr::new("s0")
                .with_column("id", Expr::column("t0", "id", SqlType::Int32))
                .with_from(Expr::aliased_table(table, "t0"))
                .with_filter(Expr::equal(
                    Expr::column("t0", "id", SqlType::Int32),
                    Expr::placeholder(0, value),
                ))
                .into_node()
        };
        let tables = ["Customers", "Orders", "Lines"];
        let cache = Arc::new(CommandCache::new(64));
        let compiler = Compiler::with_cache(Dialect::postgres(), CompileOptions::default(), cache.clone());

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let compiler = &compiler;
                scope.spawn(move || {
                    for round in 0..50 {
                        let table = tables[(worker + round) % tables.len()];
                        let value = worker as i32 * 1000 + round as i32;
                        let tree = by_key(table, value);
                        let cached = compiler.compile(&tree).unwrap();
                        let direct =
                            compile(&tree, &Dialect::postgres(), &CompileOptions::default()).unwrap();
                        assert_eq!(cached, direct);
                        assert_eq!(cached.parameters, vec![TypedValue::Int32(value)]);
                    }
                });
            }
        });

        let stats = cache.stats();
        assert_eq!(stats.entries, tables.len());
        assert_eq!(stats.hits + stats.misses, 8 * 50);
        assert!(stats.compilations >= tables.len() as u64);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = CommandCache::new(1);
        cache.insert(key("A"), Arc::new(command("a")));
        cache.insert(key("B"), Arc::new(command("b")));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("A")).is_none());
        assert_eq!(cache.stats().evictions, 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
