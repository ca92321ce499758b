/// Errors raised while lowering an IR tree to command text.
///
/// Optimization passes never fail; only the formatter rejects input, at the
/// point of final lowering.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The active dialect has no way to express a function or feature.
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// The tree is malformed, which points at a bug in whatever produced it.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl CompileError {
    pub fn unsupported(what: impl Into<String>) -> Self {
        CompileError::UnsupportedConstruct(what.into())
    }

    pub fn invariant(what: impl Into<String>) -> Self {
        CompileError::InvariantViolation(what.into())
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CompileError::unsupported("DayOfWeek on ansi");
        assert_eq!(err.to_string(), "unsupported construct: DayOfWeek on ansi");

        let err = CompileError::invariant("dangling alias t9");
        assert_eq!(err.to_string(), "invariant violation: dangling alias t9");
    }
}
