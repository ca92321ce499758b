/// Dialect formatter.
///
/// Lowers an optimized IR tree to command text for one dialect. Literals are
/// bound as parameters (or inlined where allowed) and every bound parameter
/// records where its value comes from, in the order the markers appear in the
/// text. The dialect's capability flags and symbols are read once when the
/// formatter is built.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::compiler::CompileOptions;
use super::dialect::*;
use super::expr::*;
use super::placeholder::ParameterSource;
use super::types::*;
use crate::error::{CompileError, Result};

/// Command text plus the sources of its parameters, in marker order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedCommand {
    pub text: String,
    pub parameters: Vec<ParameterSource>,
}

/// Format `root` for `dialect`, naming enum column types with the dialect's
/// fallback type.
pub fn format(root: &Node, dialect: &Dialect, options: &CompileOptions) -> Result<FormattedCommand> {
    format_with_types(root, dialect, options, &NoTypeDescriptors)
}

pub fn format_with_types(
    root: &Node,
    dialect: &Dialect,
    options: &CompileOptions,
    types: &dyn TypeDescriptorProvider,
) -> Result<FormattedCommand> {
    let mut formatter = SqlFormatter::new(dialect, options, types);
    let text = formatter.statement(root)?;
    Ok(FormattedCommand {
        text,
        parameters: formatter.parameters,
    })
}

// Binding strength, loosest first.
const OR: u8 = 1;
const AND: u8 = 2;
const NOT: u8 = 3;
const PREDICATE: u8 = 4;
const ADDITIVE: u8 = 5;
const MULTIPLICATIVE: u8 = 6;
const NEGATE: u8 = 7;
const ATOM: u8 = 8;

/// A function argument: a node, or text spliced in verbatim.
#[derive(Clone, Copy)]
enum Arg<'n> {
    Node(&'n Node),
    Raw(&'static str),
}

struct SqlFormatter<'a> {
    dialect: &'a Dialect,
    options: &'a CompileOptions,
    types: &'a dyn TypeDescriptorProvider,
    quote: &'static str,
    parameter_prefix: &'static str,
    like: &'static str,
    numbered_parameters: bool,
    for_update: bool,
    lateral_join: bool,
    deferrability: bool,
    partial_indexes: bool,
    table_if_not_exists: bool,
    index_if_not_exists: bool,
    alter_constraints: bool,
    backslash_escapes: bool,
    parameters: Vec<ParameterSource>,
    /// Inside DDL every literal is inlined and placeholders are rejected.
    ddl: bool,
    /// Column references are written without their alias (index conditions).
    unqualified: bool,
    /// Select nesting; 0 means the next select is a root statement.
    depth: usize,
    /// Alias of an UPDATE/DELETE target, replaced by the table name.
    target_alias: Option<(String, String)>,
    /// Row-source aliases visible to column references, innermost last.
    scopes: Vec<BTreeSet<String>>,
}

impl<'a> SqlFormatter<'a> {
    fn new(
        dialect: &'a Dialect,
        options: &'a CompileOptions,
        types: &'a dyn TypeDescriptorProvider,
    ) -> Self {
        Self {
            dialect,
            options,
            types,
            quote: dialect
                .syntax_symbol(SyntaxSymbol::IdentifierQuote)
                .unwrap_or("\""),
            parameter_prefix: dialect
                .syntax_symbol(SyntaxSymbol::ParameterPrefix)
                .unwrap_or("?"),
            like: dialect.syntax_symbol(SyntaxSymbol::Like).unwrap_or("LIKE"),
            numbered_parameters: dialect.supports(Capability::NumberedParameters),
            for_update: dialect.supports(Capability::ForUpdate),
            lateral_join: dialect.supports(Capability::LateralJoin),
            deferrability: dialect.supports(Capability::Deferrability),
            partial_indexes: dialect.supports(Capability::PartialIndexes),
            table_if_not_exists: dialect.supports(Capability::TableIfNotExists),
            index_if_not_exists: dialect.supports(Capability::IndexIfNotExists),
            alter_constraints: dialect.supports(Capability::AlterTableConstraints),
            backslash_escapes: dialect.supports(Capability::BackslashEscapes),
            parameters: Vec::new(),
            ddl: false,
            unqualified: false,
            depth: 0,
            target_alias: None,
            scopes: Vec::new(),
        }
    }

    fn unsupported(&self, what: &str) -> CompileError {
        CompileError::unsupported(format!("{} is not available in dialect {}", what, self.dialect.kind))
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn statement(&mut self, node: &Node) -> Result<String> {
        match node.as_ref() {
            Expr::Select(s) => self.select(s),
            Expr::Projection(p) => self.statement(&p.select),
            Expr::InsertInto(i) => self.insert(i),
            Expr::Update(u) => self.update(u),
            Expr::Delete(d) => self.delete(d),
            Expr::CreateTable(c) => self.in_ddl(|f| f.create_table(c)),
            Expr::AlterTable(a) => self.in_ddl(|f| f.alter_table(a)),
            Expr::CreateIndex(i) => self.in_ddl(|f| f.create_index(i)),
            Expr::StatementList(list) => {
                let mut statements = Vec::with_capacity(list.statements.len());
                for statement in &list.statements {
                    statements.push(self.statement(statement)?);
                }
                Ok(statements.join("; "))
            }
            _ => self.expr(node),
        }
    }

    fn in_ddl<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.ddl;
        self.ddl = true;
        let out = f(self);
        self.ddl = saved;
        out
    }

    fn select(&mut self, select: &SelectExpr) -> Result<String> {
        let is_root = self.depth == 0;
        let aliases = select.from.as_ref().map(source_aliases).unwrap_or_default();
        self.depth += 1;
        let out = self.in_scope(aliases, |f| f.select_body(select, is_root));
        self.depth -= 1;
        out
    }

    /// Runs `f` with `aliases` visible on top of every enclosing scope, so a
    /// correlated subquery can still reach its outer sources.
    fn in_scope<T>(
        &mut self,
        aliases: BTreeSet<String>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.scopes.push(aliases);
        let out = f(self);
        self.scopes.pop();
        out
    }

    fn select_body(&mut self, select: &SelectExpr, is_root: bool) -> Result<String> {
        let mut parts = Vec::new();

        // SELECT [DISTINCT] [TOP n]
        let mut head = String::from("SELECT");
        if select.distinct {
            head.push_str(" DISTINCT");
        }
        if select.is_paginated() {
            match self.dialect.pagination {
                PaginationStyle::Top => {
                    if select.skip.is_some() {
                        return Err(self.unsupported("skipping rows"));
                    }
                    if let Some(take) = &select.take {
                        head.push_str(&format!(" TOP {}", self.row_count(take)?));
                    }
                }
                PaginationStyle::Unsupported => return Err(self.unsupported("pagination")),
                PaginationStyle::LimitOffset => {}
            }
        }
        if select.columns.is_empty() {
            head.push_str(" *");
        } else {
            let mut columns = Vec::with_capacity(select.columns.len());
            for column in &select.columns {
                let expr = self.expr(&column.expr)?;
                columns.push(match &column.name {
                    Some(name) => format!("{} AS {}", expr, self.quote(name)),
                    None => expr,
                });
            }
            head.push(' ');
            head.push_str(&columns.join(", "));
        }
        parts.push(head);

        // FROM
        if let Some(from) = &select.from {
            parts.push(format!("FROM {}", self.source(from)?));
        }

        // WHERE
        if let Some(filter) = &select.filter {
            parts.push(format!("WHERE {}", self.expr(filter)?));
        }

        // GROUP BY
        if !select.group_by.is_empty() {
            let mut groups = Vec::with_capacity(select.group_by.len());
            for group in &select.group_by {
                groups.push(self.expr(group)?);
            }
            parts.push(format!("GROUP BY {}", groups.join(", ")));
        }

        // ORDER BY
        if !select.order_by.is_empty() {
            let mut orders = Vec::with_capacity(select.order_by.len());
            for order in &select.order_by {
                orders.push(self.expr(order)?);
            }
            parts.push(format!("ORDER BY {}", orders.join(", ")));
        }

        // LIMIT / OFFSET
        if self.dialect.pagination == PaginationStyle::LimitOffset {
            match (&select.take, &select.skip) {
                (Some(take), skip) => {
                    parts.push(format!("LIMIT {}", self.row_count(take)?));
                    if let Some(skip) = skip {
                        parts.push(format!("OFFSET {}", self.row_count(skip)?));
                    }
                }
                (None, Some(skip)) => {
                    if let Some(unbounded) = self.dialect.syntax_symbol(SyntaxSymbol::UnboundedLimit) {
                        parts.push(format!("LIMIT {}", unbounded));
                    }
                    parts.push(format!("OFFSET {}", self.row_count(skip)?));
                }
                (None, None) => {}
            }
        }

        // FOR UPDATE
        if (select.for_update || (is_root && self.options.for_update)) && self.for_update {
            parts.push("FOR UPDATE".to_string());
        }

        Ok(parts.join(" "))
    }

    /// Integer literals in LIMIT/OFFSET/TOP are written out; some servers
    /// reject a bound parameter there.
    fn row_count(&mut self, node: &Node) -> Result<String> {
        match node.as_ref() {
            Expr::Constant(c) => match c.value.as_i128() {
                Some(n) => Ok(n.to_string()),
                None => self.expr(node),
            },
            _ => self.expr(node),
        }
    }

    fn source(&mut self, node: &Node) -> Result<String> {
        match node.as_ref() {
            Expr::Table(t) => Ok(match &t.alias {
                Some(alias) => format!("{} AS {}", self.table_name(&t.name), self.quote(alias)),
                None => self.table_name(&t.name),
            }),
            Expr::Select(s) => {
                let body = self.select(s)?;
                Ok(format!("({}) AS {}", body, self.quote(&s.alias)))
            }
            Expr::Join(j) => self.join(j),
            other => Err(CompileError::invariant(format!(
                "{} cannot be used as a row source",
                other.kind()
            ))),
        }
    }

    fn join(&mut self, join: &JoinExpr) -> Result<String> {
        let left = self.source(&join.left)?;
        if matches!(join.join_type, JoinType::CrossApply | JoinType::OuterApply) && !self.lateral_join {
            return Err(self.unsupported("a lateral join"));
        }
        let right = self.source(&join.right)?;
        let condition = match &join.condition {
            Some(condition) => Some(self.expr(condition)?),
            None => None,
        };
        Ok(match (join.join_type, condition) {
            (JoinType::Cross, _) | (JoinType::Inner, None) => format!("{} CROSS JOIN {}", left, right),
            (JoinType::Inner, Some(on)) => format!("{} INNER JOIN {} ON {}", left, right, on),
            (JoinType::LeftOuter, on) => format!(
                "{} LEFT OUTER JOIN {} ON {}",
                left,
                right,
                on.as_deref().unwrap_or("TRUE")
            ),
            (JoinType::CrossApply, None) => format!("{} CROSS JOIN LATERAL {}", left, right),
            (JoinType::CrossApply, Some(on)) => {
                format!("{} INNER JOIN LATERAL {} ON {}", left, right, on)
            }
            (JoinType::OuterApply, on) => format!(
                "{} LEFT OUTER JOIN LATERAL {} ON {}",
                left,
                right,
                on.as_deref().unwrap_or("TRUE")
            ),
        })
    }

    /// Name of an INSERT/UPDATE/DELETE target. Its alias, if any, is returned
    /// so column references through it can be rewritten.
    fn target(&self, node: &Node) -> Result<(String, Option<(String, String)>)> {
        match node.as_ref() {
            Expr::Table(t) => Ok((
                self.table_name(&t.name),
                t.alias.clone().map(|alias| (alias, t.name.clone())),
            )),
            other => Err(CompileError::invariant(format!(
                "{} cannot be the target of a modification",
                other.kind()
            ))),
        }
    }

    fn with_target<T>(
        &mut self,
        alias: Option<(String, String)>,
        aliases: BTreeSet<String>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let saved = std::mem::replace(&mut self.target_alias, alias);
        let out = self.in_scope(aliases, f);
        self.target_alias = saved;
        out
    }

    fn insert(&mut self, insert: &InsertIntoExpr) -> Result<String> {
        let (table, _) = self.target(&insert.table)?;
        if insert.columns.len() != insert.values.len() {
            return Err(CompileError::invariant(format!(
                "insert into {} names {} columns but supplies {} values",
                table,
                insert.columns.len(),
                insert.values.len()
            )));
        }
        let mut text = format!("INSERT INTO {}", table);
        if insert.columns.is_empty() {
            let default_values = self
                .dialect
                .syntax_symbol(SyntaxSymbol::DefaultValues)
                .unwrap_or("DEFAULT VALUES");
            text.push(' ');
            text.push_str(default_values);
        } else {
            let columns: Vec<String> = insert.columns.iter().map(|c| self.quote(c)).collect();
            // VALUES has no row source of its own.
            let values = self.in_scope(BTreeSet::new(), |f| {
                let mut values = Vec::with_capacity(insert.values.len());
                for value in &insert.values {
                    values.push(f.expr(value)?);
                }
                Ok(values)
            })?;
            text.push_str(&format!(" ({}) VALUES ({})", columns.join(", "), values.join(", ")));
        }

        if !insert.returning.is_empty() {
            match self.dialect.insert_retrieval {
                InsertRetrieval::Returning => {
                    let columns: Vec<String> = insert.returning.iter().map(|c| self.quote(c)).collect();
                    text.push_str(&format!(" RETURNING {}", columns.join(", ")));
                }
                InsertRetrieval::TrailingQuery(query) => {
                    if insert.returning.len() > 1 {
                        return Err(self.unsupported("reading back more than one generated column"));
                    }
                    text.push_str("; ");
                    text.push_str(query);
                }
                InsertRetrieval::Unsupported => {
                    return Err(self.unsupported("reading back generated columns"))
                }
            }
        }
        Ok(text)
    }

    fn update(&mut self, update: &UpdateExpr) -> Result<String> {
        let (table, alias) = self.target(&update.table)?;
        if update.assignments.is_empty() {
            return Err(CompileError::invariant(format!("update of {} assigns nothing", table)));
        }
        let aliases = source_aliases(&update.table);
        self.with_target(alias, aliases, |f| {
            let mut assignments = Vec::with_capacity(update.assignments.len());
            for assignment in &update.assignments {
                let value = f.expr(&assignment.value)?;
                assignments.push(format!("{} = {}", f.quote(&assignment.column), value));
            }
            let mut parts = vec![format!("UPDATE {} SET {}", table, assignments.join(", "))];
            if let Some(filter) = &update.filter {
                parts.push(format!("WHERE {}", f.expr(filter)?));
            }
            Ok(parts.join(" "))
        })
    }

    fn delete(&mut self, delete: &DeleteExpr) -> Result<String> {
        let (table, alias) = self.target(&delete.table)?;
        let aliases = source_aliases(&delete.table);
        self.with_target(alias, aliases, |f| {
            let mut parts = vec![format!("DELETE FROM {}", table)];
            if let Some(filter) = &delete.filter {
                parts.push(format!("WHERE {}", f.expr(filter)?));
            }
            Ok(parts.join(" "))
        })
    }

    // -----------------------------------------------------------------------
    // DDL
    // -----------------------------------------------------------------------

    fn create_table(&mut self, create: &CreateTableExpr) -> Result<String> {
        let (table, _) = self.target(&create.table)?;
        if create.if_not_exists && !self.table_if_not_exists {
            return Err(self.unsupported("CREATE TABLE IF NOT EXISTS"));
        }
        let mut items = Vec::new();
        for definition in &create.column_definitions {
            items.push(self.column_definition(definition)?);
        }
        if items.is_empty() {
            return Err(CompileError::invariant(format!("table {} has no columns", table)));
        }
        for constraint in &create.table_constraints {
            items.push(self.table_constraint(constraint)?);
        }
        let if_not_exists = if create.if_not_exists { "IF NOT EXISTS " } else { "" };
        Ok(format!("CREATE TABLE {}{} ({})", if_not_exists, table, items.join(", ")))
    }

    fn column_definition(&mut self, node: &Node) -> Result<String> {
        let Expr::ColumnDefinition(definition) = node.as_ref() else {
            return Err(CompileError::invariant(format!(
                "expected a column definition, found {}",
                node.kind()
            )));
        };
        let ty = match &definition.type_name {
            Some(name) => name.clone(),
            None => self.dialect.types.name_for(&definition.ty, self.types)?,
        };
        let mut parts = vec![self.quote(&definition.name), ty];
        for constraint in &definition.constraints {
            parts.push(self.column_constraint(&definition.name, constraint)?);
        }
        Ok(parts.join(" "))
    }

    fn column_constraint(&mut self, column: &str, node: &Node) -> Result<String> {
        match node.as_ref() {
            Expr::Constraint(c) => {
                let body = match c.kind {
                    ConstraintKind::NotNull => "NOT NULL".to_string(),
                    ConstraintKind::Unique => "UNIQUE".to_string(),
                    ConstraintKind::PrimaryKey => "PRIMARY KEY".to_string(),
                    ConstraintKind::DefaultValue => {
                        let value = c.default_value.as_ref().ok_or_else(|| {
                            CompileError::invariant(format!("default for {} has no value", column))
                        })?;
                        let rendered = self.expr(value)?;
                        if value.is_constant() {
                            format!("DEFAULT {}", rendered)
                        } else {
                            format!("DEFAULT ({})", rendered)
                        }
                    }
                    ConstraintKind::AutoIncrement => self.auto_increment(column)?,
                };
                Ok(self.named(&c.name, body))
            }
            Expr::ReferencesColumn(r) => self.references(r),
            other => Err(CompileError::invariant(format!(
                "{} cannot constrain column {}",
                other.kind(),
                column
            ))),
        }
    }

    fn auto_increment(&self, column: &str) -> Result<String> {
        match self.dialect.auto_increment {
            AutoIncrementStyle::ColumnSuffix | AutoIncrementStyle::RowIdAlias => self
                .dialect
                .syntax_symbol(SyntaxSymbol::AutoIncrementSuffix)
                .map(str::to_string)
                .ok_or_else(|| {
                    CompileError::invariant(format!(
                        "dialect {} has no auto-increment suffix",
                        self.dialect.kind
                    ))
                }),
            AutoIncrementStyle::Identity => Ok("GENERATED BY DEFAULT AS IDENTITY".to_string()),
            AutoIncrementStyle::Serial => Err(CompileError::invariant(format!(
                "auto-increment column {} was not rewritten to a serial type",
                column
            ))),
        }
    }

    fn table_constraint(&mut self, node: &Node) -> Result<String> {
        match node.as_ref() {
            Expr::Constraint(c) => {
                if c.columns.is_empty() {
                    return Err(CompileError::invariant(format!(
                        "table constraint {:?} names no columns",
                        c.kind
                    )));
                }
                let keyword = match c.kind {
                    ConstraintKind::PrimaryKey => "PRIMARY KEY",
                    ConstraintKind::Unique => "UNIQUE",
                    other => {
                        return Err(CompileError::invariant(format!(
                            "{:?} cannot be a table constraint",
                            other
                        )))
                    }
                };
                let body = format!("{} ({})", keyword, self.column_list(&c.columns));
                Ok(self.named(&c.name, body))
            }
            Expr::ForeignKeyConstraint(fk) => {
                let Expr::ReferencesColumn(references) = fk.references.as_ref() else {
                    return Err(CompileError::invariant(format!(
                        "foreign key references a {}",
                        fk.references.kind()
                    )));
                };
                let body = format!(
                    "FOREIGN KEY ({}) {}",
                    self.column_list(&fk.columns),
                    self.references(references)?
                );
                Ok(self.named(&fk.name, body))
            }
            other => Err(CompileError::invariant(format!(
                "{} cannot be a table constraint",
                other.kind()
            ))),
        }
    }

    fn references(&self, references: &ReferencesColumnExpr) -> Result<String> {
        let (table, _) = self.target(&references.table)?;
        let mut text = format!("REFERENCES {} ({})", table, self.column_list(&references.columns));
        if references.on_delete != ForeignKeyAction::NoAction {
            text.push_str(&format!(" ON DELETE {}", references.on_delete.keyword()));
        }
        if references.on_update != ForeignKeyAction::NoAction {
            text.push_str(&format!(" ON UPDATE {}", references.on_update.keyword()));
        }
        let deferrability = match references.deferrability {
            Deferrability::Unspecified => None,
            Deferrability::NotDeferrable => Some("NOT DEFERRABLE"),
            Deferrability::InitiallyDeferred => Some("DEFERRABLE INITIALLY DEFERRED"),
            Deferrability::InitiallyImmediate => Some("DEFERRABLE INITIALLY IMMEDIATE"),
        };
        if let Some(clause) = deferrability {
            if !self.deferrability {
                return Err(self.unsupported("foreign key deferrability"));
            }
            text.push(' ');
            text.push_str(clause);
        }
        Ok(text)
    }

    fn alter_table(&mut self, alter: &AlterTableExpr) -> Result<String> {
        let (table, _) = self.target(&alter.table)?;
        if alter.actions.is_empty() {
            return Err(CompileError::invariant(format!("alter table {} has no actions", table)));
        }
        let mut statements = Vec::with_capacity(alter.actions.len());
        for action in &alter.actions {
            let clause = match action {
                AlterTableAction::AddColumn(definition) => {
                    format!("ADD COLUMN {}", self.column_definition(definition)?)
                }
                AlterTableAction::AddConstraint(constraint) => {
                    if !self.alter_constraints {
                        return Err(self.unsupported("adding a constraint to an existing table"));
                    }
                    format!("ADD {}", self.table_constraint(constraint)?)
                }
                AlterTableAction::DropConstraint(name) => {
                    if !self.alter_constraints {
                        return Err(self.unsupported("dropping a constraint"));
                    }
                    format!("DROP CONSTRAINT {}", self.quote(name))
                }
            };
            statements.push(format!("ALTER TABLE {} {}", table, clause));
        }
        Ok(statements.join("; "))
    }

    fn create_index(&mut self, index: &CreateIndexExpr) -> Result<String> {
        let (table, _) = self.target(&index.table)?;
        if index.if_not_exists && !self.index_if_not_exists {
            return Err(self.unsupported("CREATE INDEX IF NOT EXISTS"));
        }
        if index.columns.is_empty() {
            return Err(CompileError::invariant(format!("index {} has no columns", index.name)));
        }
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| match c.direction {
                Some(OrderDirection::Ascending) => format!("{} ASC", self.quote(&c.name)),
                Some(OrderDirection::Descending) => format!("{} DESC", self.quote(&c.name)),
                None => self.quote(&c.name),
            })
            .collect();
        let mut text = format!(
            "CREATE {}INDEX {}{} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            if index.if_not_exists { "IF NOT EXISTS " } else { "" },
            self.quote(&index.name),
            table,
            columns.join(", ")
        );
        if let Some(filter) = &index.filter {
            if !self.partial_indexes {
                return Err(self.unsupported("a partial index"));
            }
            self.unqualified = true;
            let condition = self.expr(filter);
            self.unqualified = false;
            text.push_str(&format!(" WHERE {}", condition?));
        }
        Ok(text)
    }

    fn named(&self, name: &Option<String>, body: String) -> String {
        match name {
            Some(name) => format!("CONSTRAINT {} {}", self.quote(name), body),
            None => body,
        }
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn expr(&mut self, node: &Node) -> Result<String> {
        match node.as_ref() {
            Expr::Column(c) => self.column(c),
            Expr::Constant(c) => self.constant(c),
            Expr::ConstantPlaceholder(p) => self.placeholder(p),
            Expr::FunctionCall(f) => self.function_call(f),
            Expr::Aggregate(a) => self.aggregate(a),
            Expr::AggregateSubquery(a) => self.expr(&a.aggregate_as_subquery),
            Expr::Subquery(s) => self.subquery(s),
            Expr::Select(s) => Ok(format!("({})", self.select(s)?)),
            Expr::Projection(p) => self.expr(&p.select),
            Expr::Unary(u) => self.unary(u),
            Expr::Binary(b) => self.binary(b),
            Expr::Conditional(c) => {
                let test = self.expr(&c.test)?;
                let if_true = self.expr(&c.if_true)?;
                let if_false = self.expr(&c.if_false)?;
                Ok(format!("CASE WHEN {} THEN {} ELSE {} END", test, if_true, if_false))
            }
            Expr::OrderBy(o) => {
                let expr = self.expr(&o.expr)?;
                Ok(match o.direction {
                    OrderDirection::Ascending => format!("{} ASC", expr),
                    OrderDirection::Descending => format!("{} DESC", expr),
                })
            }
            Expr::Tuple(t) => {
                let mut items = Vec::with_capacity(t.items.len());
                for item in &t.items {
                    items.push(self.expr(item)?);
                }
                Ok(format!("({})", items.join(", ")))
            }
            Expr::ObjectOperand(o) => Err(CompileError::invariant(format!(
                "object operand of {} reached the formatter",
                o.type_name
            ))),
            other => Err(CompileError::invariant(format!(
                "{} cannot be used as a value",
                other.kind()
            ))),
        }
    }

    /// A qualified column reference. Inside a statement its alias must name
    /// a row source of the current select or of one enclosing it.
    fn column(&self, column: &ColumnExpr) -> Result<String> {
        if self.unqualified {
            return Ok(self.quote(&column.name));
        }
        let scoped = !self.ddl && !self.scopes.is_empty();
        if scoped && !self.scopes.iter().any(|s| s.contains(&column.select_alias)) {
            return Err(CompileError::invariant(format!(
                "column {}.{} refers to {}, which is not in scope",
                column.select_alias, column.name, column.select_alias
            )));
        }
        let alias = match &self.target_alias {
            Some((alias, table)) if *alias == column.select_alias => table,
            _ => &column.select_alias,
        };
        Ok(format!("{}.{}", self.quote(alias), self.quote(&column.name)))
    }

    fn constant(&mut self, constant: &ConstantExpr) -> Result<String> {
        match &constant.value {
            _ if self.ddl => self.literal(&constant.value),
            TypedValue::Null => Ok("NULL".to_string()),
            TypedValue::List(_) => Err(CompileError::invariant(
                "a collection literal can only be the right side of IN",
            )),
            value if self.options.evaluate_constants && value.is_inline_safe() => self.literal(value),
            value => Ok(self.bind(ParameterSource::Literal(value.clone()))),
        }
    }

    fn placeholder(&mut self, placeholder: &ConstantPlaceholderExpr) -> Result<String> {
        if self.ddl {
            return Err(CompileError::invariant(format!(
                "placeholder {} inside a schema statement",
                placeholder.index
            )));
        }
        if matches!(placeholder.constant.value, TypedValue::List(_)) {
            return Err(CompileError::invariant(
                "a collection placeholder can only be the right side of IN",
            ));
        }
        Ok(self.bind(ParameterSource::Placeholder(placeholder.index)))
    }

    fn bind(&mut self, source: ParameterSource) -> String {
        self.parameters.push(source);
        if self.numbered_parameters {
            format!("{}{}", self.parameter_prefix, self.parameters.len())
        } else {
            self.parameter_prefix.to_string()
        }
    }

    fn literal(&self, value: &TypedValue) -> Result<String> {
        Ok(match value {
            TypedValue::Null => "NULL".to_string(),
            TypedValue::Boolean(true) => "TRUE".to_string(),
            TypedValue::Boolean(false) => "FALSE".to_string(),
            TypedValue::Decimal(d) => d.to_string(),
            TypedValue::Float32(v) if v.is_finite() => v.to_string(),
            TypedValue::Float64(v) if v.is_finite() => v.to_string(),
            TypedValue::Float32(_) | TypedValue::Float64(_) => {
                return Err(self.unsupported("a non-finite floating point literal"))
            }
            TypedValue::String(s) => self.quote_string(s),
            TypedValue::Guid(g) => self.quote_string(&g.to_string()),
            TypedValue::DateTime(dt) => {
                self.quote_string(&dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
            TypedValue::TimeSpan(ms) => ms.to_string(),
            TypedValue::Blob(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
                match self.dialect.kind {
                    DialectKind::Postgres => format!("'\\x{}'", hex),
                    _ => format!("X'{}'", hex),
                }
            }
            TypedValue::Enum { member, .. } => self.quote_string(member),
            TypedValue::List(_) => {
                return Err(CompileError::invariant(
                    "a collection literal can only be the right side of IN",
                ))
            }
            integer => match integer.as_i128() {
                Some(n) => n.to_string(),
                None => return Err(CompileError::invariant(format!("cannot inline {:?}", integer))),
            },
        })
    }

    fn function_call(&mut self, call: &FunctionCallExpr) -> Result<String> {
        use FunctionKind::*;
        match call.function {
            IsNull | IsNotNull => {
                let operand = self.operand(self.arg(call, 0)?, PREDICATE, true)?;
                let not = if call.function == IsNotNull { "NOT " } else { "" };
                Ok(format!("{} IS {}NULL", operand, not))
            }
            In | NotIn => self.in_list(call),
            Like | NotLike => {
                let operand = self.operand(self.arg(call, 0)?, PREDICATE, true)?;
                let pattern = self.operand(self.arg(call, 1)?, PREDICATE, true)?;
                let not = if call.function == NotLike { "NOT " } else { "" };
                Ok(format!("{} {}{} {}", operand, not, self.like, pattern))
            }
            StartsWith | EndsWith | ContainsString => {
                let operand = self.operand(self.arg(call, 0)?, PREDICATE, true)?;
                let needle = Arg::Node(self.arg(call, 1)?);
                let wildcard = Arg::Raw("'%'");
                let pieces = match call.function {
                    StartsWith => vec![needle, wildcard],
                    EndsWith => vec![wildcard, needle],
                    _ => vec![wildcard, needle, wildcard],
                };
                let dialect = self.dialect;
                let pattern = self.recipe(dialect.resolve_function(Concat)?, &pieces)?;
                Ok(format!("{} {} {}", operand, self.like, pattern))
            }
            function => {
                let dialect = self.dialect;
                let recipe = dialect.resolve_function(function)?;
                let args: Vec<Arg> = call.args.iter().map(Arg::Node).collect();
                self.recipe(recipe, &args)
            }
        }
    }

    fn arg<'n>(&self, call: &'n FunctionCallExpr, index: usize) -> Result<&'n Node> {
        call.args.get(index).ok_or_else(|| {
            CompileError::invariant(format!(
                "{} is missing argument {}",
                call.function, index
            ))
        })
    }

    fn recipe(&mut self, recipe: &FunctionRecipe, args: &[Arg]) -> Result<String> {
        if let Some(template) = recipe.template {
            return self.template(template, args);
        }
        if recipe.omit_parens {
            return Ok(format!("{}{}{}", recipe.prefix_text, recipe.name, recipe.suffix_text));
        }
        if recipe.infix {
            let mut items = Vec::with_capacity(args.len());
            for arg in args {
                items.push(self.wrapped_arg(*arg)?);
            }
            let separator = format!(" {} ", recipe.name);
            return Ok(format!(
                "{}{}{}",
                recipe.prefix_text,
                items.join(&separator),
                recipe.suffix_text
            ));
        }
        let mut items: Vec<String> = recipe.prefix_args.iter().map(|a| a.to_string()).collect();
        for arg in args {
            items.push(match arg {
                Arg::Node(node) => self.expr(node)?,
                Arg::Raw(text) => text.to_string(),
            });
        }
        items.extend(recipe.suffix_args.iter().map(|a| a.to_string()));
        Ok(format!(
            "{}{}({}){}",
            recipe.prefix_text,
            recipe.name,
            items.join(", "),
            recipe.suffix_text
        ))
    }

    /// Fills `{n}` slots left to right, formatting each argument when its slot
    /// is reached so parameter markers stay in text order.
    fn template(&mut self, template: &str, args: &[Arg]) -> Result<String> {
        let mut out = String::with_capacity(template.len() + 16);
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let slot = after
                .find('}')
                .and_then(|close| after[..close].parse::<usize>().ok().map(|i| (i, close)));
            match slot {
                Some((index, close)) => {
                    let arg = args.get(index).copied().ok_or_else(|| {
                        CompileError::invariant(format!(
                            "template {:?} needs argument {}",
                            template, index
                        ))
                    })?;
                    out.push_str(&self.wrapped_arg(arg)?);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    fn wrapped_arg(&mut self, arg: Arg) -> Result<String> {
        match arg {
            Arg::Node(node) => self.operand(node, ATOM, false),
            Arg::Raw(text) => Ok(text.to_string()),
        }
    }

    fn in_list(&mut self, call: &FunctionCallExpr) -> Result<String> {
        let negated = call.function == FunctionKind::NotIn;
        let test = self.arg(call, 0)?;
        let list = self.arg(call, 1)?;
        let empty = match list.as_ref() {
            Expr::Constant(c) => matches!(&c.value, TypedValue::List(items) if items.is_empty()),
            Expr::ConstantPlaceholder(p) => {
                matches!(&p.constant.value, TypedValue::List(items) if items.is_empty())
            }
            Expr::Tuple(t) => t.items.is_empty(),
            _ => false,
        };
        if empty {
            return Ok(if negated { "1 = 1" } else { "1 = 0" }.to_string());
        }

        let test = self.operand(test, PREDICATE, true)?;
        let items = match list.as_ref() {
            Expr::Constant(c) => match &c.value {
                TypedValue::List(values) => {
                    let mut items = Vec::with_capacity(values.len());
                    for value in values {
                        items.push(
                            if self.ddl
                                || value.is_null()
                                || (self.options.evaluate_constants && value.is_inline_safe())
                            {
                                self.literal(value)?
                            } else {
                                self.bind(ParameterSource::Literal(value.clone()))
                            },
                        );
                    }
                    items.join(", ")
                }
                _ => self.constant(c)?,
            },
            Expr::ConstantPlaceholder(p) => match &p.constant.value {
                TypedValue::List(values) => {
                    if self.ddl {
                        return Err(CompileError::invariant(format!(
                            "placeholder {} inside a schema statement",
                            p.index
                        )));
                    }
                    (0..values.len())
                        .map(|position| {
                            self.bind(ParameterSource::PlaceholderElement {
                                index: p.index,
                                position,
                            })
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                }
                _ => self.placeholder(p)?,
            },
            Expr::Tuple(t) => {
                let mut items = Vec::with_capacity(t.items.len());
                for item in &t.items {
                    items.push(self.expr(item)?);
                }
                items.join(", ")
            }
            Expr::Select(s) => self.select(s)?,
            _ => self.expr(list)?,
        };
        let keyword = if negated { "NOT IN" } else { "IN" };
        Ok(format!("{} {} ({})", test, keyword, items))
    }

    fn aggregate(&mut self, aggregate: &AggregateExpr) -> Result<String> {
        let name = match aggregate.kind {
            AggregateKind::Count | AggregateKind::LongCount => "COUNT",
            AggregateKind::Sum => "SUM",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
            AggregateKind::Average => "AVG",
        };
        match &aggregate.arg {
            None => Ok(format!("{}(*)", name)),
            Some(arg) => {
                let distinct = if aggregate.distinct { "DISTINCT " } else { "" };
                Ok(format!("{}({}{})", name, distinct, self.expr(arg)?))
            }
        }
    }

    fn subquery(&mut self, subquery: &SubqueryExpr) -> Result<String> {
        match &subquery.kind {
            SubqueryKind::Scalar => Ok(format!("({})", self.nested_select(&subquery.select)?)),
            SubqueryKind::Exists => Ok(format!("EXISTS ({})", self.nested_select(&subquery.select)?)),
            SubqueryKind::In(test) => {
                let test = self.operand(test, PREDICATE, true)?;
                Ok(format!("{} IN ({})", test, self.nested_select(&subquery.select)?))
            }
        }
    }

    fn nested_select(&mut self, node: &Node) -> Result<String> {
        match node.as_ref() {
            Expr::Select(s) => self.select(s),
            Expr::Projection(p) => self.nested_select(&p.select),
            other => Err(CompileError::invariant(format!(
                "subquery over a {} instead of a select",
                other.kind()
            ))),
        }
    }

    fn unary(&mut self, unary: &UnaryExpr) -> Result<String> {
        match unary.op {
            UnaryOp::Not => Ok(format!("NOT {}", self.operand(&unary.operand, NOT, false)?)),
            UnaryOp::Negate => {
                let operand = self.operand(&unary.operand, NEGATE, true)?;
                // `--` would start a comment.
                if operand.starts_with('-') {
                    Ok(format!("-({})", operand))
                } else {
                    Ok(format!("-{}", operand))
                }
            }
        }
    }

    fn binary(&mut self, binary: &BinaryExpr) -> Result<String> {
        if binary.op == BinaryOp::Add && (binary.ty.is_string() || binary.left.sql_type().is_string()) {
            let dialect = self.dialect;
            let recipe = dialect.resolve_function(FunctionKind::Concat)?;
            return self.recipe(recipe, &[Arg::Node(&binary.left), Arg::Node(&binary.right)]);
        }
        let precedence = binary_precedence(binary.op);
        let strict_left = binary.op.is_comparison();
        let strict_right = !matches!(
            binary.op,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Add | BinaryOp::Multiply
        );
        let left = self.operand(&binary.left, precedence, strict_left)?;
        let right = self.operand(&binary.right, precedence, strict_right)?;
        Ok(format!("{} {} {}", left, binary.op.symbol(), right))
    }

    /// Formats `node` as an operand of an operator binding at `parent`,
    /// parenthesizing it when it binds more loosely (or equally, if `strict`).
    fn operand(&mut self, node: &Node, parent: u8, strict: bool) -> Result<String> {
        let own = self.precedence(node);
        let text = self.expr(node)?;
        if own < parent || (strict && own == parent) {
            Ok(format!("({})", text))
        } else {
            Ok(text)
        }
    }

    fn precedence(&self, node: &Node) -> u8 {
        use FunctionKind::*;
        match node.as_ref() {
            Expr::Binary(b) => binary_precedence(b.op),
            Expr::Unary(u) => match u.op {
                UnaryOp::Not => NOT,
                UnaryOp::Negate => NEGATE,
            },
            Expr::FunctionCall(f) => match f.function {
                IsNull | IsNotNull | In | NotIn | Like | NotLike | StartsWith | EndsWith
                | ContainsString => PREDICATE,
                function => match self.dialect.resolve_function(function) {
                    Ok(recipe) if recipe.infix => ADDITIVE,
                    _ => ATOM,
                },
            },
            Expr::Subquery(SubqueryExpr {
                kind: SubqueryKind::In(_),
                ..
            }) => PREDICATE,
            _ => ATOM,
        }
    }

    // -----------------------------------------------------------------------
    // Names and literals
    // -----------------------------------------------------------------------

    fn quote(&self, ident: &str) -> String {
        let doubled = format!("{}{}", self.quote, self.quote);
        format!("{}{}{}", self.quote, ident.replace(self.quote, &doubled), self.quote)
    }

    fn table_name(&self, name: &str) -> String {
        match &self.options.schema_name {
            Some(schema) => format!("{}.{}", self.quote(schema), self.quote(name)),
            None => self.quote(name),
        }
    }

    fn quote_string(&self, s: &str) -> String {
        let escaped = if self.backslash_escapes {
            s.replace('\\', "\\\\")
        } else {
            s.to_string()
        };
        format!("'{}'", escaped.replace('\'', "''"))
    }
}

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => OR,
        BinaryOp::And => AND,
        BinaryOp::Add | BinaryOp::Subtract => ADDITIVE,
        BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => MULTIPLICATIVE,
        _ => PREDICATE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::validate::validate_sql;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn col(name: &str, ty: SqlType) -> Node {
        Expr::column("t0", name, ty)
    }

    fn orders() -> SelectExpr {
        SelectExpr::new("s0")
            .with_column("id", col("id", SqlType::Int32))
            .with_from(Expr::aliased_table("Orders", "t0"))
    }

    fn by_id() -> Node {
        orders()
            .with_filter(Expr::equal(col("id", SqlType::Int32), Expr::placeholder(0, 5)))
            .into_node()
    }

    fn fmt(node: &Node, dialect: Dialect) -> FormattedCommand {
        format(node, &dialect, &CompileOptions::default()).unwrap()
    }

    fn fmt_err(node: &Node, dialect: Dialect) -> CompileError {
        format(node, &dialect, &CompileOptions::default()).unwrap_err()
    }

    #[test]
    fn test_postgres_numbers_parameters() {
        let command = fmt(&by_id(), Dialect::postgres());
        assert_eq!(
            command.text,
            r#"SELECT "t0"."id" AS "id" FROM "Orders" AS "t0" WHERE "t0"."id" = $1"#
        );
        assert_eq!(command.parameters, vec![ParameterSource::Placeholder(0)]);
    }

    #[test]
    fn test_mysql_quotes_with_backticks() {
        let command = fmt(&by_id(), Dialect::mysql());
        assert_eq!(
            command.text,
            "SELECT `t0`.`id` AS `id` FROM `Orders` AS `t0` WHERE `t0`.`id` = ?"
        );
        validate_sql(&command.text, DialectKind::MySql).unwrap();
    }

    #[test]
    fn test_parameters_follow_text_order() {
        // Columns are written before the filter although the filter is
        // visited first.
        let tree = SelectExpr::new("s0")
            .with_column("label", Expr::placeholder(1, "x"))
            .with_from(Expr::aliased_table("Orders", "t0"))
            .with_filter(Expr::equal(col("id", SqlType::Int32), Expr::placeholder(0, 5)))
            .into_node();
        let command = fmt(&tree, Dialect::postgres());
        assert!(command.text.starts_with(r#"SELECT $1 AS "label""#));
        assert_eq!(
            command.parameters,
            vec![ParameterSource::Placeholder(1), ParameterSource::Placeholder(0)]
        );
    }

    #[test]
    fn test_evaluate_constants_inlines_safe_literals_only() {
        let tree = orders()
            .with_filter(Expr::and(
                Expr::equal(col("id", SqlType::Int32), Expr::constant(5)),
                Expr::equal(col("name", SqlType::String), Expr::constant("it's")),
            ))
            .into_node();
        let options = CompileOptions {
            evaluate_constants: true,
            ..CompileOptions::default()
        };
        let command = format(&tree, &Dialect::postgres(), &options).unwrap();
        assert!(command.text.ends_with(r#"WHERE "t0"."id" = 5 AND "t0"."name" = $1"#));
        assert_eq!(
            command.parameters,
            vec![ParameterSource::Literal(TypedValue::from("it's"))]
        );

        let bound = fmt(&tree, Dialect::postgres());
        assert_eq!(bound.parameters.len(), 2);
    }

    #[test]
    fn test_day_of_week_diverges_per_dialect() {
        let tree = orders()
            .with_column(
                "dow",
                Expr::function(FunctionKind::DayOfWeek, vec![col("placed", SqlType::DateTime)]),
            )
            .into_node();

        let mysql = fmt(&tree, Dialect::mysql());
        assert!(mysql.text.contains("(DAYOFWEEK(`t0`.`placed`) - 1)"));
        assert!(mysql.text.contains("- 1)"));
        validate_sql(&mysql.text, DialectKind::MySql).unwrap();

        let sqlite = fmt(&tree, Dialect::sqlite());
        assert!(sqlite.text.contains(r#"STRFTIME('%w', "t0"."placed")"#));
        validate_sql(&sqlite.text, DialectKind::Sqlite).unwrap();

        let pg = fmt(&tree, Dialect::postgres());
        assert!(pg.text.contains(r#"date_part('dow', "t0"."placed")"#));
        validate_sql(&pg.text, DialectKind::Postgres).unwrap();

        assert!(matches!(
            fmt_err(&tree, Dialect::ansi()),
            CompileError::UnsupportedConstruct(_)
        ));
    }

    #[test]
    fn test_pagination_styles() {
        let skip_only = orders().with_skip(Expr::constant(20)).into_node();
        assert!(fmt(&skip_only, Dialect::sqlite()).text.ends_with("LIMIT -1 OFFSET 20"));
        assert!(fmt(&skip_only, Dialect::mysql())
            .text
            .ends_with("LIMIT 18446744073709551615 OFFSET 20"));
        assert!(fmt(&skip_only, Dialect::postgres()).text.ends_with(r#""t0" OFFSET 20"#));

        let page = orders()
            .with_skip(Expr::constant(20))
            .with_take(Expr::placeholder(0, 10))
            .into_node();
        let command = fmt(&page, Dialect::postgres());
        assert!(command.text.ends_with("LIMIT $1 OFFSET 20"));
        validate_sql(&command.text, DialectKind::Postgres).unwrap();

        assert!(matches!(
            fmt_err(&page, Dialect::ansi()),
            CompileError::UnsupportedConstruct(_)
        ));

        let top = fmt(
            &orders().with_take(Expr::constant(3)).into_node(),
            Dialect::ansi().with_pagination(PaginationStyle::Top),
        );
        assert!(top.text.starts_with("SELECT TOP 3 "));
    }

    #[test]
    fn test_in_expands_collections() {
        let list = |values: Vec<i32>| {
            Expr::typed_constant(
                TypedValue::List(values.into_iter().map(TypedValue::from).collect()),
                SqlType::Int32,
            )
        };
        let in_list = |rhs: Node| {
            orders()
                .with_filter(Expr::function(FunctionKind::In, vec![col("id", SqlType::Int32), rhs]))
                .into_node()
        };

        let command = fmt(&in_list(list(vec![1, 2, 3])), Dialect::postgres());
        assert!(command.text.ends_with(r#"WHERE "t0"."id" IN ($1, $2, $3)"#));
        assert_eq!(command.parameters.len(), 3);

        let empty = fmt(&in_list(list(vec![])), Dialect::postgres());
        assert!(empty.text.ends_with("WHERE 1 = 0"));
        assert!(empty.parameters.is_empty());

        let placeholder = Expr::placeholder(
            4,
            TypedValue::List(vec![TypedValue::from("a"), TypedValue::from("b")]),
        );
        let command = fmt(&in_list(placeholder), Dialect::sqlite());
        assert!(command.text.ends_with(r#"IN (?, ?)"#));
        assert_eq!(
            command.parameters,
            vec![
                ParameterSource::PlaceholderElement { index: 4, position: 0 },
                ParameterSource::PlaceholderElement { index: 4, position: 1 },
            ]
        );
        validate_sql(&command.text, DialectKind::Sqlite).unwrap();
    }

    #[test]
    fn test_string_predicates_use_dialect_concat() {
        let starts = orders()
            .with_filter(Expr::function(
                FunctionKind::StartsWith,
                vec![col("name", SqlType::String), Expr::placeholder(0, "ab")],
            ))
            .into_node();
        let pg = fmt(&starts, Dialect::postgres());
        assert!(pg.text.ends_with(r#"WHERE "t0"."name" LIKE $1 || '%'"#));
        validate_sql(&pg.text, DialectKind::Postgres).unwrap();

        let mysql = fmt(&starts, Dialect::mysql());
        assert!(mysql.text.ends_with("WHERE `t0`.`name` LIKE CONCAT(?, '%')"));
        validate_sql(&mysql.text, DialectKind::MySql).unwrap();
    }

    #[test]
    fn test_operator_precedence_adds_parentheses() {
        let a = Expr::equal(col("a", SqlType::Int32), Expr::constant(1));
        let b = Expr::equal(col("b", SqlType::Int32), Expr::constant(2));
        let c = Expr::equal(col("c", SqlType::Int32), Expr::constant(3));
        let tree = orders()
            .with_filter(Expr::and(Expr::binary(BinaryOp::Or, a, b), c))
            .with_column(
                "d",
                Expr::binary(
                    BinaryOp::Subtract,
                    col("x", SqlType::Int32),
                    Expr::binary(BinaryOp::Subtract, col("y", SqlType::Int32), col("z", SqlType::Int32)),
                ),
            )
            .into_node();
        let options = CompileOptions {
            evaluate_constants: true,
            ..CompileOptions::default()
        };
        let command = format(&tree, &Dialect::postgres(), &options).unwrap();
        assert!(command.text.contains(r#""t0"."x" - ("t0"."y" - "t0"."z")"#));
        assert!(command
            .text
            .ends_with(r#"WHERE ("t0"."a" = 1 OR "t0"."b" = 2) AND "t0"."c" = 3"#));
        validate_sql(&command.text, DialectKind::Postgres).unwrap();
    }

    #[test]
    fn test_for_update_only_where_supported() {
        let options = CompileOptions {
            for_update: true,
            ..CompileOptions::default()
        };
        let pg = format(&by_id(), &Dialect::postgres(), &options).unwrap();
        assert!(pg.text.ends_with("FOR UPDATE"));
        let sqlite = format(&by_id(), &Dialect::sqlite(), &options).unwrap();
        assert!(!sqlite.text.contains("FOR UPDATE"));
    }

    #[test]
    fn test_schema_and_identifier_quoting() {
        let tree = SelectExpr::new("s0")
            .with_column("say \"hi\"", col("id", SqlType::Int32))
            .with_from(Expr::aliased_table("Orders", "t0"))
            .into_node();
        let options = CompileOptions {
            schema_name: Some("sales".into()),
            ..CompileOptions::default()
        };
        let command = format(&tree, &Dialect::postgres(), &options).unwrap();
        assert_eq!(
            command.text,
            r#"SELECT "t0"."id" AS "say ""hi""" FROM "sales"."Orders" AS "t0""#
        );
    }

    #[test]
    fn test_insert_retrieval_per_dialect() {
        let insert = Arc::new(Expr::InsertInto(InsertIntoExpr {
            table: Expr::table("Orders"),
            columns: vec!["customer".into()],
            values: vec![Expr::placeholder(0, "acme")],
            returning: vec!["id".into()],
        }));
        assert_eq!(
            fmt(&insert, Dialect::postgres()).text,
            r#"INSERT INTO "Orders" ("customer") VALUES ($1) RETURNING "id""#
        );
        let mysql = fmt(&insert, Dialect::mysql());
        assert_eq!(
            mysql.text,
            "INSERT INTO `Orders` (`customer`) VALUES (?); SELECT LAST_INSERT_ID()"
        );
        assert_eq!(validate_sql(&mysql.text, DialectKind::MySql).unwrap(), 2);
        assert!(fmt(&insert, Dialect::sqlite())
            .text
            .ends_with("; SELECT last_insert_rowid()"));
        assert!(matches!(
            fmt_err(&insert, Dialect::ansi()),
            CompileError::UnsupportedConstruct(_)
        ));

        let defaults = Arc::new(Expr::InsertInto(InsertIntoExpr {
            table: Expr::table("Orders"),
            columns: Vec::new(),
            values: Vec::new(),
            returning: Vec::new(),
        }));
        assert_eq!(
            fmt(&defaults, Dialect::sqlite()).text,
            r#"INSERT INTO "Orders" DEFAULT VALUES"#
        );
    }

    #[test]
    fn test_update_rewrites_target_alias() {
        let update = Arc::new(Expr::Update(UpdateExpr {
            table: Expr::aliased_table("Orders", "t0"),
            assignments: vec![Assignment {
                column: "status".into(),
                value: Expr::placeholder(0, 2),
            }],
            filter: Some(Expr::equal(col("id", SqlType::Int32), Expr::placeholder(1, 9))),
        }));
        let command = fmt(&update, Dialect::postgres());
        assert_eq!(
            command.text,
            r#"UPDATE "Orders" SET "status" = $1 WHERE "Orders"."id" = $2"#
        );
        validate_sql(&command.text, DialectKind::Postgres).unwrap();

        let delete = Arc::new(Expr::Delete(DeleteExpr {
            table: Expr::aliased_table("Orders", "t0"),
            filter: Some(Expr::equal(col("id", SqlType::Int32), Expr::placeholder(0, 9))),
        }));
        assert_eq!(
            fmt(&delete, Dialect::mysql()).text,
            "DELETE FROM `Orders` WHERE `Orders`.`id` = ?"
        );
    }

    fn column(name: &str, ty: SqlType, constraints: Vec<Node>) -> Node {
        Arc::new(Expr::ColumnDefinition(ColumnDefinitionExpr {
            name: name.into(),
            ty,
            type_name: None,
            constraints,
        }))
    }

    fn default_of(value: Node) -> Node {
        Arc::new(Expr::Constraint(ConstraintExpr {
            name: None,
            kind: ConstraintKind::DefaultValue,
            columns: Vec::new(),
            default_value: Some(value),
        }))
    }

    #[test]
    fn test_create_table_inlines_and_escapes_defaults() {
        let table = Arc::new(Expr::CreateTable(CreateTableExpr {
            table: Expr::table("Notes"),
            if_not_exists: true,
            column_definitions: vec![
                column(
                    "id",
                    SqlType::Int64,
                    vec![ConstraintExpr::column_level(ConstraintKind::NotNull)],
                ),
                column("body", SqlType::String, vec![default_of(Expr::constant(r"it's \ here"))]),
            ],
            table_constraints: vec![ConstraintExpr::table_level(
                ConstraintKind::PrimaryKey,
                vec!["id".into()],
            )],
        }));
        let mysql = fmt(&table, Dialect::mysql());
        assert_eq!(
            mysql.text,
            r"CREATE TABLE IF NOT EXISTS `Notes` (`id` BIGINT NOT NULL, `body` VARCHAR(255) DEFAULT 'it''s \\ here', PRIMARY KEY (`id`))"
        );
        assert!(mysql.parameters.is_empty());
        validate_sql(&mysql.text, DialectKind::MySql).unwrap();

        let pg = fmt(&table, Dialect::postgres());
        assert!(pg.text.contains(r"DEFAULT 'it''s \ here'"));
        validate_sql(&pg.text, DialectKind::Postgres).unwrap();

        assert!(matches!(
            fmt_err(&table, Dialect::ansi()),
            CompileError::UnsupportedConstruct(_)
        ));
    }

    #[test]
    fn test_placeholder_in_ddl_is_rejected() {
        let table = Arc::new(Expr::CreateTable(CreateTableExpr {
            table: Expr::table("Notes"),
            if_not_exists: false,
            column_definitions: vec![column(
                "n",
                SqlType::Int32,
                vec![default_of(Expr::placeholder(0, 1))],
            )],
            table_constraints: Vec::new(),
        }));
        assert!(matches!(
            fmt_err(&table, Dialect::postgres()),
            CompileError::InvariantViolation(_)
        ));
    }

    #[test]
    fn test_unamended_serial_column_is_rejected() {
        let table = Arc::new(Expr::CreateTable(CreateTableExpr {
            table: Expr::table("Notes"),
            if_not_exists: false,
            column_definitions: vec![column(
                "id",
                SqlType::Int32,
                vec![ConstraintExpr::column_level(ConstraintKind::AutoIncrement)],
            )],
            table_constraints: Vec::new(),
        }));
        assert!(matches!(
            fmt_err(&table, Dialect::postgres()),
            CompileError::InvariantViolation(_)
        ));
        assert_eq!(
            fmt(&table, Dialect::mysql()).text,
            "CREATE TABLE `Notes` (`id` INT AUTO_INCREMENT)"
        );
    }

    #[test]
    fn test_foreign_keys_and_deferrability() {
        let references = Arc::new(Expr::ReferencesColumn(ReferencesColumnExpr {
            table: Expr::table("Orders"),
            columns: vec!["id".into()],
            deferrability: Deferrability::InitiallyDeferred,
            on_delete: ForeignKeyAction::Cascade,
            on_update: ForeignKeyAction::NoAction,
        }));
        let table = Arc::new(Expr::CreateTable(CreateTableExpr {
            table: Expr::table("Lines"),
            if_not_exists: false,
            column_definitions: vec![column("order_id", SqlType::Int32, vec![])],
            table_constraints: vec![Arc::new(Expr::ForeignKeyConstraint(
                ForeignKeyConstraintExpr {
                    name: Some("fk_lines_order".into()),
                    columns: vec!["order_id".into()],
                    references,
                },
            ))],
        }));
        let pg = fmt(&table, Dialect::postgres());
        assert_eq!(
            pg.text,
            r#"CREATE TABLE "Lines" ("order_id" INTEGER, CONSTRAINT "fk_lines_order" FOREIGN KEY ("order_id") REFERENCES "Orders" ("id") ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED)"#
        );
        validate_sql(&pg.text, DialectKind::Postgres).unwrap();

        // Without the stripping amender MySQL cannot express it.
        assert!(matches!(
            fmt_err(&table, Dialect::mysql()),
            CompileError::UnsupportedConstruct(_)
        ));
    }

    fn partial_index() -> Node {
        Arc::new(Expr::CreateIndex(CreateIndexExpr {
            name: "ix_users_email".into(),
            table: Expr::table("Users"),
            columns: vec![IndexedColumn {
                name: "email".into(),
                direction: Some(OrderDirection::Descending),
            }],
            unique: true,
            if_not_exists: false,
            filter: Some(Expr::equal(
                Expr::column("Users", "active", SqlType::Boolean),
                Expr::constant(true),
            )),
        }))
    }

    #[test]
    fn test_partial_index() {
        let pg = fmt(&partial_index(), Dialect::postgres());
        assert_eq!(
            pg.text,
            r#"CREATE UNIQUE INDEX "ix_users_email" ON "Users" ("email" DESC) WHERE "active" = TRUE"#
        );
        validate_sql(&pg.text, DialectKind::Postgres).unwrap();
        assert!(matches!(
            fmt_err(&partial_index(), Dialect::mysql()),
            CompileError::UnsupportedConstruct(_)
        ));
    }

    #[test]
    fn test_alter_table_emits_one_statement_per_action() {
        let alter = Arc::new(Expr::AlterTable(AlterTableExpr {
            table: Expr::table("Orders"),
            actions: vec![
                AlterTableAction::AddColumn(column("note", SqlType::String, vec![])),
                AlterTableAction::DropConstraint("uq_orders_ref".into()),
            ],
        }));
        let pg = fmt(&alter, Dialect::postgres());
        assert_eq!(
            pg.text,
            r#"ALTER TABLE "Orders" ADD COLUMN "note" VARCHAR(255); ALTER TABLE "Orders" DROP CONSTRAINT "uq_orders_ref""#
        );
        assert_eq!(validate_sql(&pg.text, DialectKind::Postgres).unwrap(), 2);
        assert!(matches!(
            fmt_err(&alter, Dialect::sqlite()),
            CompileError::UnsupportedConstruct(_)
        ));
    }

    #[test]
    fn test_joins_and_lateral_support() {
        let lines = SelectExpr::new("s1")
            .with_column("total", Expr::column("l", "total", SqlType::Int32))
            .with_from(Expr::aliased_table("Lines", "l"))
            .with_filter(Expr::equal(
                Expr::column("l", "order_id", SqlType::Int32),
                col("id", SqlType::Int32),
            ))
            .with_take(Expr::constant(1))
            .into_node();
        let tree = |join_type| {
            SelectExpr::new("s0")
                .with_column("id", col("id", SqlType::Int32))
                .with_from(Expr::join(
                    join_type,
                    Expr::aliased_table("Orders", "t0"),
                    lines.clone(),
                    None,
                ))
                .into_node()
        };
        let pg = fmt(&tree(JoinType::OuterApply), Dialect::postgres());
        assert!(pg.text.contains("LEFT OUTER JOIN LATERAL (SELECT"));
        assert!(pg.text.ends_with(r#"AS "s1" ON TRUE"#));
        validate_sql(&pg.text, DialectKind::Postgres).unwrap();

        assert!(matches!(
            fmt_err(&tree(JoinType::CrossApply), Dialect::sqlite()),
            CompileError::UnsupportedConstruct(_)
        ));
        let cross = fmt(&tree(JoinType::Cross), Dialect::sqlite());
        assert!(cross.text.contains(r#""Orders" AS "t0" CROSS JOIN (SELECT"#));
    }

    #[test]
    fn test_scalar_functions_and_conditionals() {
        let tree = orders()
            .with_column(
                "label",
                Expr::conditional(
                    Expr::function(FunctionKind::IsNull, vec![col("name", SqlType::String)]),
                    Expr::constant("n/a"),
                    Expr::function(FunctionKind::Upper, vec![col("name", SqlType::String)]),
                ),
            )
            .with_column(
                "at",
                Expr::function(
                    FunctionKind::IndexOf,
                    vec![col("name", SqlType::String), Expr::placeholder(0, "x")],
                ),
            )
            .into_node();
        let pg = fmt(&tree, Dialect::postgres());
        assert!(pg.text.contains(
            r#"CASE WHEN "t0"."name" IS NULL THEN $1 ELSE UPPER("t0"."name") END AS "label""#
        ));
        assert!(pg.text.contains(r#"POSITION($2 IN "t0"."name") AS "at""#));
        assert_eq!(
            pg.parameters,
            vec![
                ParameterSource::Literal(TypedValue::from("n/a")),
                ParameterSource::Placeholder(0),
            ]
        );
        validate_sql(&pg.text, DialectKind::Postgres).unwrap();

        let mysql = fmt(&tree, Dialect::mysql());
        assert!(mysql.text.contains("LOCATE(?, `t0`.`name`)"));
    }

    #[test]
    fn test_aggregates_and_subqueries() {
        let count = SelectExpr::new("s1")
            .with_anonymous_column(Expr::aggregate(AggregateKind::Count, None))
            .with_from(Expr::aliased_table("Lines", "l"))
            .with_filter(Expr::equal(
                Expr::column("l", "order_id", SqlType::Int32),
                col("id", SqlType::Int32),
            ))
            .into_node();
        let tree = orders()
            .with_column("lines", Expr::scalar_subquery(count.clone()))
            .with_filter(Expr::exists(count))
            .into_node();
        let sqlite = fmt(&tree, Dialect::sqlite());
        assert!(sqlite.text.contains(r#"(SELECT COUNT(*) FROM "Lines" AS "l" WHERE "l"."order_id" = "t0"."id") AS "lines""#));
        assert!(sqlite.text.contains("WHERE EXISTS (SELECT COUNT(*)"));
        validate_sql(&sqlite.text, DialectKind::Sqlite).unwrap();
    }

    #[test]
    fn test_dangling_alias_is_an_invariant_violation() {
        let tree = SelectExpr::new("s0")
            .with_column("id", Expr::column("zz", "id", SqlType::Int32))
            .with_from(Expr::aliased_table("Customers", "t0"))
            .into_node();
        assert!(matches!(
            fmt_err(&tree, Dialect::postgres()),
            CompileError::InvariantViolation(_)
        ));

        // The inner select's own source does not leak to its parent.
        let inner = SelectExpr::new("s1")
            .with_column("id", Expr::column("l", "id", SqlType::Int32))
            .with_from(Expr::aliased_table("Lines", "l"))
            .into_node();
        let leaked = SelectExpr::new("s0")
            .with_column("id", Expr::column("l", "id", SqlType::Int32))
            .with_from(inner)
            .into_node();
        assert!(matches!(
            fmt_err(&leaked, Dialect::sqlite()),
            CompileError::InvariantViolation(_)
        ));

        let delete = Arc::new(Expr::Delete(DeleteExpr {
            table: Expr::aliased_table("Orders", "t0"),
            filter: Some(Expr::equal(
                Expr::column("t9", "id", SqlType::Int32),
                Expr::placeholder(0, 1),
            )),
        }));
        assert!(matches!(
            fmt_err(&delete, Dialect::mysql()),
            CompileError::InvariantViolation(_)
        ));

        let insert = Arc::new(Expr::InsertInto(InsertIntoExpr {
            table: Expr::table("Orders"),
            columns: vec!["id".into()],
            values: vec![col("id", SqlType::Int32)],
            returning: vec![],
        }));
        assert!(matches!(
            fmt_err(&insert, Dialect::postgres()),
            CompileError::InvariantViolation(_)
        ));
    }

    #[test]
    fn test_correlated_references_reach_outer_scopes() {
        let latest = SelectExpr::new("s1")
            .with_column("placed", Expr::column("l", "placed", SqlType::DateTime))
            .with_from(Expr::aliased_table("Lines", "l"))
            .with_filter(Expr::equal(
                Expr::column("l", "order_id", SqlType::Int32),
                col("id", SqlType::Int32),
            ))
            .into_node();
        let tree = orders().with_filter(Expr::exists(latest)).into_node();
        let command = fmt(&tree, Dialect::postgres());
        assert!(command.text.contains(r#"WHERE "l"."order_id" = "t0"."id""#));
    }

    #[test]
    fn test_output_is_deterministic() {
        for dialect in DialectKind::ALL {
            let dialect = Dialect::for_kind(dialect);
            let a = format(&by_id(), &dialect, &CompileOptions::default()).unwrap();
            let b = format(&by_id(), &dialect, &CompileOptions::default()).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_blob_and_date_literals() {
        let options = CompileOptions::default();
        let dialect = Dialect::postgres();
        let f = SqlFormatter::new(&dialect, &options, &NoTypeDescriptors);
        assert_eq!(f.literal(&TypedValue::Blob(vec![0xde, 0xad])).unwrap(), r"'\xDEAD'");
        let at = chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
            .and_then(|d| d.and_hms_opt(13, 5, 0))
            .unwrap();
        assert_eq!(f.literal(&TypedValue::DateTime(at)).unwrap(), "'2024-02-29 13:05:00'");

        let mysql = Dialect::mysql();
        let f = SqlFormatter::new(&mysql, &options, &NoTypeDescriptors);
        assert_eq!(f.literal(&TypedValue::Blob(vec![1, 2])).unwrap(), "X'0102'");
        assert!(f.literal(&TypedValue::Float64(f64::NAN)).is_err());
    }
}
