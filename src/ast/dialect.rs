//! Dialect descriptors.
//!
//! A dialect is plain data: a capability set, a handful of syntax symbols, a
//! table of function recipes layered over a shared base table, a DDL type
//! table and the list of amender passes the optimizer appends for it. No
//! dialect subclasses anything; the formatter reads these tables once when it
//! is constructed.
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::types::{FunctionKind, SqlType};
use crate::error::{CompileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    MySql,
    Postgres,
    Sqlite,
    Ansi,
}

impl DialectKind {
    pub const ALL: [DialectKind; 4] = [
        DialectKind::MySql,
        DialectKind::Postgres,
        DialectKind::Sqlite,
        DialectKind::Ansi,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DialectKind::MySql => "mysql",
            DialectKind::Postgres => "postgres",
            DialectKind::Sqlite => "sqlite",
            DialectKind::Ansi => "ansi",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DialectKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(DialectKind::MySql),
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "sqlite" | "sqlite3" => Ok(DialectKind::Sqlite),
            "ansi" | "sql92" => Ok(DialectKind::Ansi),
            other => Err(anyhow::anyhow!("unknown dialect: {}", other)),
        }
    }
}

/// Optional engine features the formatter asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// `$1, $2, ...` rather than one repeated indicator.
    NumberedParameters,
    ForUpdate,
    LateralJoin,
    Deferrability,
    PartialIndexes,
    TableIfNotExists,
    IndexIfNotExists,
    AlterTableConstraints,
    /// Backslash is an escape character inside string literals.
    BackslashEscapes,
}

/// Symbols spliced into command text verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxSymbol {
    IdentifierQuote,
    ParameterPrefix,
    Like,
    AutoIncrementSuffix,
    /// LIMIT value meaning "no limit", for OFFSET without LIMIT.
    UnboundedLimit,
    /// Insert clause used when no column is given a value.
    DefaultValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaginationStyle {
    LimitOffset,
    Top,
    Unsupported,
}

/// How the generated value of an auto-increment column is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertRetrieval {
    /// `INSERT ... RETURNING col`
    Returning,
    /// `INSERT ...; <query>`
    TrailingQuery(&'static str),
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoIncrementStyle {
    /// A column suffix such as `AUTO_INCREMENT`.
    ColumnSuffix,
    /// The column type is replaced with a serial type.
    Serial,
    /// The column becomes the table's row id alias.
    RowIdAlias,
    /// `GENERATED BY DEFAULT AS IDENTITY`
    Identity,
}

/// Dialect-specific passes appended after the generic pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmenderKind {
    AutoIncrement,
    StripDeferrability,
    StripIndexConditions,
    InsertAutoIncrementValue,
    SelfReferencingUpdate,
}

/// How one abstract function is lowered to text.
///
/// A recipe either renders `prefix_text name(prefix_args, args, suffix_args) suffix_text`
/// (with `omit_parens` dropping the argument list, and `infix` joining the
/// arguments with `name` instead), or fills a `template` in which `{0}`, `{1}`
/// stand for the arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FunctionRecipe {
    pub name: &'static str,
    pub infix: bool,
    pub prefix_args: &'static [&'static str],
    pub suffix_args: &'static [&'static str],
    pub prefix_text: &'static str,
    pub suffix_text: &'static str,
    pub omit_parens: bool,
    pub template: Option<&'static str>,
}

impl FunctionRecipe {
    pub fn call(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn infix(op: &'static str) -> Self {
        Self {
            name: op,
            infix: true,
            ..Self::default()
        }
    }

    pub fn bare(name: &'static str) -> Self {
        Self {
            name,
            omit_parens: true,
            ..Self::default()
        }
    }

    pub fn template(template: &'static str) -> Self {
        Self {
            template: Some(template),
            ..Self::default()
        }
    }

    pub fn with_prefix_args(mut self, args: &'static [&'static str]) -> Self {
        self.prefix_args = args;
        self
    }

    pub fn with_suffix_args(mut self, args: &'static [&'static str]) -> Self {
        self.suffix_args = args;
        self
    }

    pub fn wrapped(mut self, prefix_text: &'static str, suffix_text: &'static str) -> Self {
        self.prefix_text = prefix_text;
        self.suffix_text = suffix_text;
        self
    }
}

/// Looks up DDL names for host types the type table cannot name by itself.
pub trait TypeDescriptorProvider: Send + Sync {
    /// DDL type name for a named enum type, if the host maps it specially.
    fn enum_sql_name(&self, type_name: &str) -> Option<String>;
}

/// Provider that knows no types; every enum falls back to the dialect default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTypeDescriptors;

impl TypeDescriptorProvider for NoTypeDescriptors {
    fn enum_sql_name(&self, _type_name: &str) -> Option<String> {
        None
    }
}

/// DDL names for static result types.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    names: HashMap<SqlType, &'static str>,
    serial: HashMap<SqlType, &'static str>,
    enum_fallback: &'static str,
}

impl TypeTable {
    fn new(entries: &[(SqlType, &'static str)], enum_fallback: &'static str) -> Self {
        Self {
            names: entries.iter().cloned().collect(),
            serial: HashMap::new(),
            enum_fallback,
        }
    }

    fn with_serial(mut self, entries: &[(SqlType, &'static str)]) -> Self {
        self.serial = entries.iter().cloned().collect();
        self
    }

    /// DDL type name for `ty`. Nullability is expressed by constraints, so a
    /// `Nullable` wrapper is ignored.
    pub fn name_for(&self, ty: &SqlType, types: &dyn TypeDescriptorProvider) -> Result<String> {
        match ty.non_nullable() {
            SqlType::Enum(name) => Ok(types
                .enum_sql_name(name)
                .unwrap_or_else(|| self.enum_fallback.to_string())),
            other => self
                .names
                .get(other)
                .map(|n| n.to_string())
                .ok_or_else(|| CompileError::invariant(format!("no DDL type for {:?}", other))),
        }
    }

    /// Serial replacement type for an auto-increment column of type `ty`.
    pub fn serial_name_for(&self, ty: &SqlType) -> Option<&'static str> {
        self.serial.get(ty.non_nullable()).copied()
    }

    pub fn serial_types(&self) -> &HashMap<SqlType, &'static str> {
        &self.serial
    }
}

pub type FunctionOverrides = HashMap<FunctionKind, Option<FunctionRecipe>>;

#[derive(Debug, Clone)]
pub struct Dialect {
    pub kind: DialectKind,
    capabilities: BTreeSet<Capability>,
    symbols: HashMap<SyntaxSymbol, &'static str>,
    pub pagination: PaginationStyle,
    pub insert_retrieval: InsertRetrieval,
    pub auto_increment: AutoIncrementStyle,
    /// Entries here shadow the base table; `None` marks a function the
    /// dialect cannot express even though the base table can.
    functions: FunctionOverrides,
    pub types: TypeTable,
    amenders: Vec<AmenderKind>,
}

impl Dialect {
    pub fn for_kind(kind: DialectKind) -> Self {
        match kind {
            DialectKind::MySql => Self::mysql(),
            DialectKind::Postgres => Self::postgres(),
            DialectKind::Sqlite => Self::sqlite(),
            DialectKind::Ansi => Self::ansi(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    pub fn syntax_symbol(&self, symbol: SyntaxSymbol) -> Option<&'static str> {
        self.symbols.get(&symbol).copied()
    }

    pub fn amenders(&self) -> &[AmenderKind] {
        &self.amenders
    }

    /// Hash of every table that shapes the emitted text. Dialects with equal
    /// fingerprints format every tree identically.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.kind.hash(&mut hasher);
        self.capabilities.hash(&mut hasher);
        unordered_hash(&self.symbols).hash(&mut hasher);
        self.pagination.hash(&mut hasher);
        self.insert_retrieval.hash(&mut hasher);
        self.auto_increment.hash(&mut hasher);
        unordered_hash(&self.functions).hash(&mut hasher);
        unordered_hash(&self.types.names).hash(&mut hasher);
        unordered_hash(&self.types.serial).hash(&mut hasher);
        self.types.enum_fallback.hash(&mut hasher);
        self.amenders.hash(&mut hasher);
        hasher.finish()
    }

    /// Resolves an abstract function through the dialect's overrides and then
    /// the base table.
    pub fn resolve_function(&self, function: FunctionKind) -> Result<&FunctionRecipe> {
        let recipe = match self.functions.get(&function) {
            Some(entry) => entry.as_ref(),
            None => base_functions().get(&function),
        };
        recipe.ok_or_else(|| {
            CompileError::unsupported(format!(
                "function {} is not available in dialect {}",
                function, self.kind
            ))
        })
    }

    /// Turns index-condition stripping on or off regardless of the dialect's
    /// default.
    pub fn with_index_condition_stripping(mut self, strip: bool) -> Self {
        self.amenders.retain(|a| *a != AmenderKind::StripIndexConditions);
        if strip {
            self.amenders.push(AmenderKind::StripIndexConditions);
        }
        self
    }

    pub fn with_capability(mut self, capability: Capability, enabled: bool) -> Self {
        if enabled {
            self.capabilities.insert(capability);
        } else {
            self.capabilities.remove(&capability);
        }
        self
    }

    pub fn with_symbol(mut self, symbol: SyntaxSymbol, text: &'static str) -> Self {
        self.symbols.insert(symbol, text);
        self
    }

    pub fn with_function(mut self, function: FunctionKind, recipe: Option<FunctionRecipe>) -> Self {
        self.functions.insert(function, recipe);
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationStyle) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn postgres() -> Self {
        use FunctionKind::*;
        let functions: FunctionOverrides = [
            (Concat, Some(FunctionRecipe::infix("||"))),
            (Truncate, Some(FunctionRecipe::call("TRUNC"))),
            (
                DayOfWeek,
                Some(FunctionRecipe::call("date_part").with_prefix_args(&["'dow'"])),
            ),
            (DayOfYear, Some(FunctionRecipe::template("EXTRACT(DOY FROM {0})"))),
            (Week, Some(FunctionRecipe::template("EXTRACT(WEEK FROM {0})"))),
            (
                Millisecond,
                Some(FunctionRecipe::template(
                    "(CAST(EXTRACT(MILLISECONDS FROM {0}) AS INTEGER) % 1000)",
                )),
            ),
            (
                ServerUtcNow,
                Some(FunctionRecipe::template("(NOW() AT TIME ZONE 'UTC')")),
            ),
            (
                DateTimeAddSeconds,
                Some(FunctionRecipe::template("({0} + ({1}) * INTERVAL '1 second')")),
            ),
            (
                DateTimeAddDays,
                Some(FunctionRecipe::template("({0} + ({1}) * INTERVAL '1 day')")),
            ),
            (NewGuid, Some(FunctionRecipe::call("gen_random_uuid"))),
        ]
        .into_iter()
        .collect();

        Self {
            kind: DialectKind::Postgres,
            capabilities: [
                Capability::NumberedParameters,
                Capability::ForUpdate,
                Capability::LateralJoin,
                Capability::Deferrability,
                Capability::PartialIndexes,
                Capability::TableIfNotExists,
                Capability::IndexIfNotExists,
                Capability::AlterTableConstraints,
            ]
            .into_iter()
            .collect(),
            symbols: [
                (SyntaxSymbol::IdentifierQuote, "\""),
                (SyntaxSymbol::ParameterPrefix, "$"),
                (SyntaxSymbol::Like, "LIKE"),
                (SyntaxSymbol::DefaultValues, "DEFAULT VALUES"),
            ]
            .into_iter()
            .collect(),
            pagination: PaginationStyle::LimitOffset,
            insert_retrieval: InsertRetrieval::Returning,
            auto_increment: AutoIncrementStyle::Serial,
            functions,
            types: TypeTable::new(
                &[
                    (SqlType::Boolean, "BOOLEAN"),
                    (SqlType::Int8, "SMALLINT"),
                    (SqlType::UInt8, "SMALLINT"),
                    (SqlType::Int16, "SMALLINT"),
                    (SqlType::UInt16, "INTEGER"),
                    (SqlType::Int32, "INTEGER"),
                    (SqlType::UInt32, "BIGINT"),
                    (SqlType::Int64, "BIGINT"),
                    (SqlType::UInt64, "NUMERIC(20)"),
                    (SqlType::Decimal, "NUMERIC(57, 28)"),
                    (SqlType::Float32, "REAL"),
                    (SqlType::Float64, "DOUBLE PRECISION"),
                    (SqlType::String, "VARCHAR(255)"),
                    (SqlType::Guid, "UUID"),
                    (SqlType::DateTime, "TIMESTAMP"),
                    (SqlType::TimeSpan, "BIGINT"),
                    (SqlType::Blob, "BYTEA"),
                ],
                "VARCHAR(64)",
            )
            .with_serial(&[
                (SqlType::Int16, "SMALLSERIAL"),
                (SqlType::UInt16, "SERIAL"),
                (SqlType::Int32, "SERIAL"),
                (SqlType::UInt32, "BIGSERIAL"),
                (SqlType::Int64, "BIGSERIAL"),
            ]),
            amenders: vec![AmenderKind::AutoIncrement],
        }
    }

    pub fn mysql() -> Self {
        use FunctionKind::*;
        let functions: FunctionOverrides = [
            (IndexOf, Some(FunctionRecipe::template("LOCATE({1}, {0})"))),
            (
                DayOfWeek,
                Some(FunctionRecipe::call("DAYOFWEEK").wrapped("(", " - 1)")),
            ),
            (DayOfYear, Some(FunctionRecipe::call("DAYOFYEAR"))),
            (Week, Some(FunctionRecipe::call("WEEK"))),
            (
                Millisecond,
                Some(FunctionRecipe::template("FLOOR(MICROSECOND({0}) / 1000)")),
            ),
            (Date, Some(FunctionRecipe::call("DATE"))),
            (ServerNow, Some(FunctionRecipe::call("NOW"))),
            (ServerUtcNow, Some(FunctionRecipe::call("UTC_TIMESTAMP"))),
            (
                DateTimeAddSeconds,
                Some(FunctionRecipe::template("DATE_ADD({0}, INTERVAL {1} SECOND)")),
            ),
            (
                DateTimeAddDays,
                Some(FunctionRecipe::template("DATE_ADD({0}, INTERVAL {1} DAY)")),
            ),
            (NewGuid, Some(FunctionRecipe::call("UUID"))),
            (LastInsertIdWith, Some(FunctionRecipe::call("LAST_INSERT_ID"))),
        ]
        .into_iter()
        .collect();

        Self {
            kind: DialectKind::MySql,
            capabilities: [
                Capability::ForUpdate,
                Capability::LateralJoin,
                Capability::TableIfNotExists,
                Capability::AlterTableConstraints,
                Capability::BackslashEscapes,
            ]
            .into_iter()
            .collect(),
            symbols: [
                (SyntaxSymbol::IdentifierQuote, "`"),
                (SyntaxSymbol::ParameterPrefix, "?"),
                (SyntaxSymbol::Like, "LIKE"),
                (SyntaxSymbol::AutoIncrementSuffix, "AUTO_INCREMENT"),
                (SyntaxSymbol::UnboundedLimit, "18446744073709551615"),
                (SyntaxSymbol::DefaultValues, "() VALUES ()"),
            ]
            .into_iter()
            .collect(),
            pagination: PaginationStyle::LimitOffset,
            insert_retrieval: InsertRetrieval::TrailingQuery("SELECT LAST_INSERT_ID()"),
            auto_increment: AutoIncrementStyle::ColumnSuffix,
            functions,
            types: TypeTable::new(
                &[
                    (SqlType::Boolean, "TINYINT(1)"),
                    (SqlType::Int8, "TINYINT"),
                    (SqlType::UInt8, "TINYINT UNSIGNED"),
                    (SqlType::Int16, "SMALLINT"),
                    (SqlType::UInt16, "SMALLINT UNSIGNED"),
                    (SqlType::Int32, "INT"),
                    (SqlType::UInt32, "INT UNSIGNED"),
                    (SqlType::Int64, "BIGINT"),
                    (SqlType::UInt64, "BIGINT UNSIGNED"),
                    (SqlType::Decimal, "DECIMAL(60, 30)"),
                    (SqlType::Float32, "FLOAT"),
                    (SqlType::Float64, "DOUBLE"),
                    (SqlType::String, "VARCHAR(255)"),
                    (SqlType::Guid, "CHAR(36)"),
                    (SqlType::DateTime, "DATETIME(6)"),
                    (SqlType::TimeSpan, "BIGINT"),
                    (SqlType::Blob, "LONGBLOB"),
                ],
                "VARCHAR(64)",
            ),
            amenders: vec![
                AmenderKind::StripDeferrability,
                AmenderKind::StripIndexConditions,
                AmenderKind::InsertAutoIncrementValue,
                AmenderKind::SelfReferencingUpdate,
            ],
        }
    }

    pub fn sqlite() -> Self {
        use FunctionKind::*;
        let functions: FunctionOverrides = [
            (Concat, Some(FunctionRecipe::infix("||"))),
            (StringLength, Some(FunctionRecipe::call("LENGTH"))),
            (IndexOf, Some(FunctionRecipe::call("INSTR"))),
            (Substring, Some(FunctionRecipe::call("SUBSTR"))),
            (TrimLeft, Some(FunctionRecipe::call("LTRIM"))),
            (TrimRight, Some(FunctionRecipe::call("RTRIM"))),
            (Truncate, None),
            (
                Year,
                Some(FunctionRecipe::template("CAST(STRFTIME('%Y', {0}) AS INTEGER)")),
            ),
            (
                Month,
                Some(FunctionRecipe::template("CAST(STRFTIME('%m', {0}) AS INTEGER)")),
            ),
            (
                Day,
                Some(FunctionRecipe::template("CAST(STRFTIME('%d', {0}) AS INTEGER)")),
            ),
            (
                DayOfWeek,
                Some(FunctionRecipe::template("CAST(STRFTIME('%w', {0}) AS INTEGER)")),
            ),
            (
                DayOfYear,
                Some(FunctionRecipe::template("CAST(STRFTIME('%j', {0}) AS INTEGER)")),
            ),
            (
                Week,
                Some(FunctionRecipe::template("CAST(STRFTIME('%W', {0}) AS INTEGER)")),
            ),
            (
                Hour,
                Some(FunctionRecipe::template("CAST(STRFTIME('%H', {0}) AS INTEGER)")),
            ),
            (
                Minute,
                Some(FunctionRecipe::template("CAST(STRFTIME('%M', {0}) AS INTEGER)")),
            ),
            (
                Second,
                Some(FunctionRecipe::template("CAST(STRFTIME('%S', {0}) AS INTEGER)")),
            ),
            (
                Millisecond,
                Some(FunctionRecipe::template(
                    "(CAST(STRFTIME('%f', {0}) * 1000 AS INTEGER) % 1000)",
                )),
            ),
            (Date, Some(FunctionRecipe::call("DATE"))),
            (
                ServerNow,
                Some(FunctionRecipe::call("DATETIME").with_prefix_args(&["'now'", "'localtime'"])),
            ),
            (
                ServerUtcNow,
                Some(FunctionRecipe::call("DATETIME").with_prefix_args(&["'now'"])),
            ),
            (
                DateTimeAddSeconds,
                Some(FunctionRecipe::template("DATETIME({0}, ({1}) || ' seconds')")),
            ),
            (
                DateTimeAddDays,
                Some(FunctionRecipe::template("DATETIME({0}, ({1}) || ' days')")),
            ),
            (
                NewGuid,
                Some(FunctionRecipe::template("LOWER(HEX(RANDOMBLOB(16)))")),
            ),
        ]
        .into_iter()
        .collect();

        Self {
            kind: DialectKind::Sqlite,
            capabilities: [
                Capability::PartialIndexes,
                Capability::TableIfNotExists,
                Capability::IndexIfNotExists,
                Capability::Deferrability,
            ]
            .into_iter()
            .collect(),
            symbols: [
                (SyntaxSymbol::IdentifierQuote, "\""),
                (SyntaxSymbol::ParameterPrefix, "?"),
                (SyntaxSymbol::Like, "LIKE"),
                (SyntaxSymbol::AutoIncrementSuffix, "AUTOINCREMENT"),
                (SyntaxSymbol::UnboundedLimit, "-1"),
                (SyntaxSymbol::DefaultValues, "DEFAULT VALUES"),
            ]
            .into_iter()
            .collect(),
            pagination: PaginationStyle::LimitOffset,
            insert_retrieval: InsertRetrieval::TrailingQuery("SELECT last_insert_rowid()"),
            auto_increment: AutoIncrementStyle::RowIdAlias,
            functions,
            types: TypeTable::new(
                &[
                    (SqlType::Boolean, "INTEGER"),
                    (SqlType::Int8, "INTEGER"),
                    (SqlType::UInt8, "INTEGER"),
                    (SqlType::Int16, "INTEGER"),
                    (SqlType::UInt16, "INTEGER"),
                    (SqlType::Int32, "INTEGER"),
                    (SqlType::UInt32, "INTEGER"),
                    (SqlType::Int64, "INTEGER"),
                    (SqlType::UInt64, "INTEGER"),
                    (SqlType::Decimal, "NUMERIC"),
                    (SqlType::Float32, "REAL"),
                    (SqlType::Float64, "REAL"),
                    (SqlType::String, "TEXT"),
                    (SqlType::Guid, "TEXT"),
                    (SqlType::DateTime, "TEXT"),
                    (SqlType::TimeSpan, "INTEGER"),
                    (SqlType::Blob, "BLOB"),
                ],
                "TEXT",
            ),
            amenders: vec![AmenderKind::AutoIncrement],
        }
    }

    /// The SQL-92 baseline. Its function table is the base table itself.
    pub fn ansi() -> Self {
        Self {
            kind: DialectKind::Ansi,
            capabilities: [Capability::ForUpdate, Capability::Deferrability]
                .into_iter()
                .collect(),
            symbols: [
                (SyntaxSymbol::IdentifierQuote, "\""),
                (SyntaxSymbol::ParameterPrefix, "?"),
                (SyntaxSymbol::Like, "LIKE"),
                (SyntaxSymbol::DefaultValues, "DEFAULT VALUES"),
            ]
            .into_iter()
            .collect(),
            pagination: PaginationStyle::Unsupported,
            insert_retrieval: InsertRetrieval::Unsupported,
            auto_increment: AutoIncrementStyle::Identity,
            functions: HashMap::new(),
            types: TypeTable::new(
                &[
                    (SqlType::Boolean, "BOOLEAN"),
                    (SqlType::Int8, "SMALLINT"),
                    (SqlType::UInt8, "SMALLINT"),
                    (SqlType::Int16, "SMALLINT"),
                    (SqlType::UInt16, "INTEGER"),
                    (SqlType::Int32, "INTEGER"),
                    (SqlType::UInt32, "BIGINT"),
                    (SqlType::Int64, "BIGINT"),
                    (SqlType::UInt64, "DECIMAL(20)"),
                    (SqlType::Decimal, "DECIMAL(38, 9)"),
                    (SqlType::Float32, "REAL"),
                    (SqlType::Float64, "DOUBLE PRECISION"),
                    (SqlType::String, "VARCHAR(255)"),
                    (SqlType::Guid, "CHAR(36)"),
                    (SqlType::DateTime, "TIMESTAMP"),
                    (SqlType::TimeSpan, "BIGINT"),
                    (SqlType::Blob, "BLOB"),
                ],
                "VARCHAR(64)",
            ),
            amenders: vec![AmenderKind::StripIndexConditions],
        }
    }
}

/// Order-independent hash of a map's entries.
fn unordered_hash<K: Hash, V: Hash>(map: &HashMap<K, V>) -> u64 {
    map.iter().fold(0u64, |acc, entry| {
        let mut hasher = DefaultHasher::new();
        entry.hash(&mut hasher);
        acc.wrapping_add(hasher.finish())
    })
}

/// Recipes shared by every dialect unless overridden. Predicate functions
/// (`IsNull`, `In`, `Like`, ...) are lowered by the formatter directly and are
/// absent here.
pub fn base_functions() -> &'static HashMap<FunctionKind, FunctionRecipe> {
    static BASE: OnceLock<HashMap<FunctionKind, FunctionRecipe>> = OnceLock::new();
    BASE.get_or_init(|| {
        use FunctionKind::*;
        [
            (Concat, FunctionRecipe::call("CONCAT")),
            (StringLength, FunctionRecipe::call("CHAR_LENGTH")),
            (Substring, FunctionRecipe::call("SUBSTRING")),
            (Trim, FunctionRecipe::call("TRIM")),
            (TrimLeft, FunctionRecipe::template("TRIM(LEADING ' ' FROM {0})")),
            (TrimRight, FunctionRecipe::template("TRIM(TRAILING ' ' FROM {0})")),
            (Upper, FunctionRecipe::call("UPPER")),
            (Lower, FunctionRecipe::call("LOWER")),
            (IndexOf, FunctionRecipe::template("POSITION({1} IN {0})")),
            (Replace, FunctionRecipe::call("REPLACE")),
            (Round, FunctionRecipe::call("ROUND")),
            (Truncate, FunctionRecipe::call("TRUNCATE")),
            (Abs, FunctionRecipe::call("ABS")),
            (Ceiling, FunctionRecipe::call("CEILING")),
            (Floor, FunctionRecipe::call("FLOOR")),
            (Coalesce, FunctionRecipe::call("COALESCE")),
            (Year, FunctionRecipe::template("EXTRACT(YEAR FROM {0})")),
            (Month, FunctionRecipe::template("EXTRACT(MONTH FROM {0})")),
            (Day, FunctionRecipe::template("EXTRACT(DAY FROM {0})")),
            (Hour, FunctionRecipe::template("EXTRACT(HOUR FROM {0})")),
            (Minute, FunctionRecipe::template("EXTRACT(MINUTE FROM {0})")),
            (Second, FunctionRecipe::template("EXTRACT(SECOND FROM {0})")),
            (Date, FunctionRecipe::template("CAST({0} AS DATE)")),
            (ServerNow, FunctionRecipe::bare("CURRENT_TIMESTAMP")),
        ]
        .into_iter()
        .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_kind_parsing() {
        assert_eq!("PostgreSQL".parse::<DialectKind>().unwrap(), DialectKind::Postgres);
        assert_eq!("mysql".parse::<DialectKind>().unwrap(), DialectKind::MySql);
        assert!("oracle".parse::<DialectKind>().is_err());
        for kind in DialectKind::ALL {
            assert_eq!(kind.name().parse::<DialectKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_overrides_shadow_base() {
        let pg = Dialect::postgres();
        assert_eq!(pg.resolve_function(FunctionKind::Concat).unwrap().name, "||");
        assert!(pg.resolve_function(FunctionKind::Concat).unwrap().infix);

        let ansi = Dialect::ansi();
        assert_eq!(ansi.resolve_function(FunctionKind::Concat).unwrap().name, "CONCAT");
    }

    #[test]
    fn test_missing_function_is_unsupported() {
        let ansi = Dialect::ansi();
        assert!(matches!(
            ansi.resolve_function(FunctionKind::DayOfWeek),
            Err(CompileError::UnsupportedConstruct(_))
        ));

        // Present in the base table but switched off for SQLite.
        let sqlite = Dialect::sqlite();
        assert!(sqlite.resolve_function(FunctionKind::Truncate).is_err());
        assert!(sqlite.resolve_function(FunctionKind::Upper).is_ok());
    }

    #[test]
    fn test_capabilities_and_symbols() {
        let pg = Dialect::postgres();
        assert!(pg.supports(Capability::NumberedParameters));
        assert_eq!(pg.syntax_symbol(SyntaxSymbol::ParameterPrefix), Some("$"));

        let sqlite = Dialect::sqlite();
        assert!(!sqlite.supports(Capability::ForUpdate));
        assert_eq!(sqlite.syntax_symbol(SyntaxSymbol::UnboundedLimit), Some("-1"));
        assert_eq!(Dialect::mysql().syntax_symbol(SyntaxSymbol::IdentifierQuote), Some("`"));
    }

    #[test]
    fn test_index_condition_override() {
        let mysql = Dialect::mysql().with_index_condition_stripping(false);
        assert!(!mysql.amenders().contains(&AmenderKind::StripIndexConditions));

        let pg = Dialect::postgres().with_index_condition_stripping(true);
        assert!(pg.amenders().contains(&AmenderKind::StripIndexConditions));
    }

    #[test]
    fn test_fingerprint_tracks_every_table() {
        let pg = Dialect::postgres();
        assert_eq!(pg.fingerprint(), Dialect::postgres().fingerprint());
        assert_eq!(pg.fingerprint(), pg.clone().fingerprint());

        let variants = [
            Dialect::mysql(),
            pg.clone().with_pagination(PaginationStyle::Top),
            pg.clone().with_capability(Capability::NumberedParameters, false),
            pg.clone().with_symbol(SyntaxSymbol::IdentifierQuote, "`"),
            pg.clone().with_function(FunctionKind::Upper, Some(FunctionRecipe::call("UCASE"))),
            pg.clone().with_index_condition_stripping(true),
        ];
        for variant in &variants {
            assert_ne!(pg.fingerprint(), variant.fingerprint(), "{:?}", variant.kind);
        }
    }

    #[test]
    fn test_type_table() {
        let pg = Dialect::postgres();
        let types = NoTypeDescriptors;
        assert_eq!(pg.types.name_for(&SqlType::Guid, &types).unwrap(), "UUID");
        assert_eq!(
            pg.types.name_for(&SqlType::Int32.nullable(), &types).unwrap(),
            "INTEGER"
        );
        assert_eq!(pg.types.serial_name_for(&SqlType::Int64), Some("BIGSERIAL"));
        assert!(pg.types.name_for(&SqlType::Void, &types).is_err());

        struct Named;
        impl TypeDescriptorProvider for Named {
            fn enum_sql_name(&self, type_name: &str) -> Option<String> {
                (type_name == "Color").then(|| "color_enum".to_string())
            }
        }
        assert_eq!(
            pg.types.name_for(&SqlType::Enum("Color".into()), &Named).unwrap(),
            "color_enum"
        );
        assert_eq!(
            pg.types.name_for(&SqlType::Enum("Shape".into()), &Named).unwrap(),
            "VARCHAR(64)"
        );
    }
}
