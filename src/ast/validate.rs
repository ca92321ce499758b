/// Round-trip check of generated command text through a real SQL parser.
///
/// Used by tests and by the CLI's `--check` flag to confirm that a command is
/// accepted by the target dialect's grammar.
use anyhow::{Context, Result};
use sqlparser::dialect::{AnsiDialect, Dialect as ParserDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use super::dialect::DialectKind;

fn parser_dialect(kind: DialectKind) -> Box<dyn ParserDialect> {
    match kind {
        DialectKind::MySql => Box::new(MySqlDialect {}),
        DialectKind::Postgres => Box::new(PostgreSqlDialect {}),
        DialectKind::Sqlite => Box::new(SQLiteDialect {}),
        DialectKind::Ansi => Box::new(AnsiDialect {}),
    }
}

/// Parses `sql` with the grammar of `kind` and returns the number of
/// statements it contains.
pub fn validate_sql(sql: &str, kind: DialectKind) -> Result<usize> {
    let dialect = parser_dialect(kind);
    let statements = Parser::parse_sql(dialect.as_ref(), sql)
        .with_context(|| format!("{} parser rejected: {}", kind, sql))?;
    Ok(statements.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_statements() {
        assert_eq!(validate_sql("SELECT 1", DialectKind::Ansi).unwrap(), 1);
        assert_eq!(
            validate_sql("INSERT INTO t (a) VALUES (?); SELECT LAST_INSERT_ID()", DialectKind::MySql).unwrap(),
            2
        );
    }

    #[test]
    fn test_rejects_broken_text() {
        let err = validate_sql("SELECT * FROM", DialectKind::Postgres).unwrap_err();
        assert!(err.to_string().contains("postgres parser rejected"));
    }
}
