//! Static result types, literal values and the closed enums shared by IR nodes.
//!
//! Everything in here is plain data: it derives structural equality and hashing
//! so that whole trees can be compared and used as cache keys.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Static result type of an expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Boolean,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Decimal,
    Float32,
    Float64,
    String,
    Guid,
    DateTime,
    TimeSpan,
    Blob,
    /// A host enum, identified by its type name.
    Enum(String),
    Nullable(Box<SqlType>),
    Void,
    Tuple(Vec<SqlType>),
    /// A reference to a mapped object, identified by its type descriptor name.
    ObjectReference(String),
}

impl SqlType {
    /// Wraps the type in `Nullable` unless it already is.
    pub fn nullable(self) -> Self {
        match self {
            SqlType::Nullable(_) => self,
            other => SqlType::Nullable(Box::new(other)),
        }
    }

    /// The underlying type with any `Nullable` wrapper removed.
    pub fn non_nullable(&self) -> &SqlType {
        match self {
            SqlType::Nullable(inner) => inner.non_nullable(),
            other => other,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, SqlType::Nullable(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.non_nullable(),
            SqlType::Int8
                | SqlType::UInt8
                | SqlType::Int16
                | SqlType::UInt16
                | SqlType::Int32
                | SqlType::UInt32
                | SqlType::Int64
                | SqlType::UInt64
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(self.non_nullable(), SqlType::String)
    }

    /// True for the 64-bit integer types.
    pub fn is_wide_integer(&self) -> bool {
        matches!(self.non_nullable(), SqlType::Int64 | SqlType::UInt64)
    }
}

/// A literal value carried by a constant or placeholder node.
///
/// Floats compare and hash by bit pattern so that `TypedValue` can take part in
/// structural equality of whole trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypedValue {
    Null,
    Boolean(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Decimal(rust_decimal::Decimal),
    Float32(f32),
    Float64(f64),
    String(String),
    Guid(uuid::Uuid),
    DateTime(chrono::NaiveDateTime),
    /// Duration in milliseconds.
    TimeSpan(i64),
    Blob(Vec<u8>),
    Enum { type_name: String, member: String },
    /// A collection literal, only meaningful as the right operand of `In`.
    List(Vec<TypedValue>),
}

impl TypedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypedValue::Int8(_)
                | TypedValue::UInt8(_)
                | TypedValue::Int16(_)
                | TypedValue::UInt16(_)
                | TypedValue::Int32(_)
                | TypedValue::UInt32(_)
                | TypedValue::Int64(_)
                | TypedValue::UInt64(_)
        )
    }

    /// Booleans and integers can be written into command text without any
    /// quoting or escaping.
    pub fn is_inline_safe(&self) -> bool {
        matches!(self, TypedValue::Boolean(_)) || self.is_integer()
    }

    /// The integer value widened to `i128`, if this is an integer.
    pub fn as_i128(&self) -> Option<i128> {
        Some(match self {
            TypedValue::Int8(v) => *v as i128,
            TypedValue::UInt8(v) => *v as i128,
            TypedValue::Int16(v) => *v as i128,
            TypedValue::UInt16(v) => *v as i128,
            TypedValue::Int32(v) => *v as i128,
            TypedValue::UInt32(v) => *v as i128,
            TypedValue::Int64(v) => *v as i128,
            TypedValue::UInt64(v) => *v as i128,
            _ => return None,
        })
    }

    /// Static type of the literal. `Null` is typed as a nullable void.
    pub fn sql_type(&self) -> SqlType {
        match self {
            TypedValue::Null => SqlType::Void.nullable(),
            TypedValue::Boolean(_) => SqlType::Boolean,
            TypedValue::Int8(_) => SqlType::Int8,
            TypedValue::UInt8(_) => SqlType::UInt8,
            TypedValue::Int16(_) => SqlType::Int16,
            TypedValue::UInt16(_) => SqlType::UInt16,
            TypedValue::Int32(_) => SqlType::Int32,
            TypedValue::UInt32(_) => SqlType::UInt32,
            TypedValue::Int64(_) => SqlType::Int64,
            TypedValue::UInt64(_) => SqlType::UInt64,
            TypedValue::Decimal(_) => SqlType::Decimal,
            TypedValue::Float32(_) => SqlType::Float32,
            TypedValue::Float64(_) => SqlType::Float64,
            TypedValue::String(_) => SqlType::String,
            TypedValue::Guid(_) => SqlType::Guid,
            TypedValue::DateTime(_) => SqlType::DateTime,
            TypedValue::TimeSpan(_) => SqlType::TimeSpan,
            TypedValue::Blob(_) => SqlType::Blob,
            TypedValue::Enum { type_name, .. } => SqlType::Enum(type_name.clone()),
            TypedValue::List(items) => {
                SqlType::Tuple(items.iter().map(TypedValue::sql_type).collect())
            }
        }
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        use TypedValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Int8(a), Int8(b)) => a == b,
            (UInt8(a), UInt8(b)) => a == b,
            (Int16(a), Int16(b)) => a == b,
            (UInt16(a), UInt16(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (UInt32(a), UInt32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (UInt64(a), UInt64(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            (Float32(a), Float32(b)) => a.to_bits() == b.to_bits(),
            (Float64(a), Float64(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (Guid(a), Guid(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (TimeSpan(a), TimeSpan(b)) => a == b,
            (Blob(a), Blob(b)) => a == b,
            (
                Enum {
                    type_name: ta,
                    member: ma,
                },
                Enum {
                    type_name: tb,
                    member: mb,
                },
            ) => ta == tb && ma == mb,
            (List(a), List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypedValue {}

impl Hash for TypedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            TypedValue::Null => {}
            TypedValue::Boolean(v) => v.hash(state),
            TypedValue::Int8(v) => v.hash(state),
            TypedValue::UInt8(v) => v.hash(state),
            TypedValue::Int16(v) => v.hash(state),
            TypedValue::UInt16(v) => v.hash(state),
            TypedValue::Int32(v) => v.hash(state),
            TypedValue::UInt32(v) => v.hash(state),
            TypedValue::Int64(v) => v.hash(state),
            TypedValue::UInt64(v) => v.hash(state),
            TypedValue::Decimal(v) => v.hash(state),
            TypedValue::Float32(v) => v.to_bits().hash(state),
            TypedValue::Float64(v) => v.to_bits().hash(state),
            TypedValue::String(v) => v.hash(state),
            TypedValue::Guid(v) => v.hash(state),
            TypedValue::DateTime(v) => v.hash(state),
            TypedValue::TimeSpan(v) => v.hash(state),
            TypedValue::Blob(v) => v.hash(state),
            TypedValue::Enum { type_name, member } => {
                type_name.hash(state);
                member.hash(state);
            }
            TypedValue::List(v) => v.hash(state),
        }
    }
}

impl From<bool> for TypedValue {
    fn from(v: bool) -> Self {
        TypedValue::Boolean(v)
    }
}

impl From<i32> for TypedValue {
    fn from(v: i32) -> Self {
        TypedValue::Int32(v)
    }
}

impl From<i64> for TypedValue {
    fn from(v: i64) -> Self {
        TypedValue::Int64(v)
    }
}

impl From<f64> for TypedValue {
    fn from(v: f64) -> Self {
        TypedValue::Float64(v)
    }
}

impl From<&str> for TypedValue {
    fn from(v: &str) -> Self {
        TypedValue::String(v.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(v: String) -> Self {
        TypedValue::String(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Cross,
    OuterApply,
    CrossApply,
    LeftOuter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

/// Dialect-independent functions. Each dialect resolves these through its
/// function table when the tree is formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    // Predicates
    IsNull,
    IsNotNull,
    In,
    NotIn,
    Like,
    NotLike,
    StartsWith,
    EndsWith,
    ContainsString,
    // Strings
    Concat,
    StringLength,
    /// `(string, start, length)` with a 1-based start.
    Substring,
    Trim,
    TrimLeft,
    TrimRight,
    Upper,
    Lower,
    /// `(haystack, needle)`, 1-based result, 0 when absent.
    IndexOf,
    Replace,
    // Numbers
    /// `(value, digits)`
    Round,
    Truncate,
    Abs,
    Ceiling,
    Floor,
    Coalesce,
    // Dates and times
    Year,
    Month,
    Day,
    /// 0-based, Sunday = 0.
    DayOfWeek,
    DayOfYear,
    Week,
    Hour,
    Minute,
    Second,
    Millisecond,
    Date,
    ServerNow,
    ServerUtcNow,
    /// `(datetime, seconds)`
    DateTimeAddSeconds,
    /// `(datetime, days)`
    DateTimeAddDays,
    // Misc
    NewGuid,
    /// Sets the connection's last-insert-id to its argument and returns it.
    LastInsertIdWith,
}

impl FunctionKind {
    /// Result type of a call given its (already typed) arguments.
    pub fn result_type(&self, first_arg: Option<&SqlType>) -> SqlType {
        use FunctionKind::*;
        match self {
            IsNull | IsNotNull | In | NotIn | Like | NotLike | StartsWith | EndsWith
            | ContainsString => SqlType::Boolean,
            Concat | Trim | TrimLeft | TrimRight | Upper | Lower | Replace | Substring => {
                SqlType::String
            }
            StringLength | IndexOf | Year | Month | Day | DayOfWeek | DayOfYear | Week | Hour
            | Minute | Second | Millisecond => SqlType::Int32,
            Round | Truncate | Abs | Ceiling | Floor | Coalesce | LastInsertIdWith => {
                first_arg.cloned().unwrap_or(SqlType::Void)
            }
            Date | ServerNow | ServerUtcNow | DateTimeAddSeconds | DateTimeAddDays => {
                SqlType::DateTime
            }
            NewGuid => SqlType::Guid,
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    Count,
    LongCount,
    Sum,
    Min,
    Max,
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Comparison
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessOrEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterOrEqual
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "<>",
            BinaryOp::Less => "<",
            BinaryOp::LessOrEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterOrEqual => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        }
    }
}

/// Kinds of the simple (non foreign key) constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    NotNull,
    Unique,
    PrimaryKey,
    AutoIncrement,
    DefaultValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Deferrability {
    #[default]
    Unspecified,
    NotDeferrable,
    InitiallyDeferred,
    InitiallyImmediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    pub fn keyword(&self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_nullable_wrapping_is_not_repeated() {
        let ty = SqlType::Int32.nullable().nullable();
        assert_eq!(ty, SqlType::Nullable(Box::new(SqlType::Int32)));
        assert_eq!(ty.non_nullable(), &SqlType::Int32);
        assert!(ty.is_integer());
    }

    #[test]
    fn test_float_values_compare_by_bits() {
        assert_eq!(TypedValue::Float64(1.5), TypedValue::Float64(1.5));
        assert_eq!(TypedValue::Float64(f64::NAN), TypedValue::Float64(f64::NAN));
        assert_ne!(TypedValue::Float64(0.0), TypedValue::Float64(-0.0));
        assert_eq!(
            hash_of(&TypedValue::Float64(2.25)),
            hash_of(&TypedValue::Float64(2.25))
        );
    }

    #[test]
    fn test_different_variants_are_not_equal() {
        assert_ne!(TypedValue::Int32(1), TypedValue::Int64(1));
        assert_ne!(TypedValue::Null, TypedValue::Boolean(false));
    }

    #[test]
    fn test_inline_safe_values() {
        assert!(TypedValue::Boolean(true).is_inline_safe());
        assert!(TypedValue::UInt64(7).is_inline_safe());
        assert!(!TypedValue::String("1".into()).is_inline_safe());
        assert!(!TypedValue::Float64(1.0).is_inline_safe());
    }

    #[test]
    fn test_function_result_types() {
        assert_eq!(FunctionKind::IsNull.result_type(None), SqlType::Boolean);
        assert_eq!(
            FunctionKind::Abs.result_type(Some(&SqlType::Decimal)),
            SqlType::Decimal
        );
        assert_eq!(FunctionKind::DayOfWeek.result_type(None), SqlType::Int32);
    }
}
