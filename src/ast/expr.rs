//! The expression node model.
//!
//! Every query and DDL statement is a tree of [`Expr`] values behind [`Node`]
//! (`Arc<Expr>`). Nodes are never mutated: a rewrite builds a replacement node
//! and shares every child it did not touch with the original tree.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use super::types::*;

/// Shared, immutable handle to an expression node.
pub type Node = Arc<Expr>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumAsInner)]
pub enum Expr {
    Table(TableExpr),
    Column(ColumnExpr),
    Select(SelectExpr),
    Join(JoinExpr),
    Projection(ProjectionExpr),
    FunctionCall(FunctionCallExpr),
    Aggregate(AggregateExpr),
    AggregateSubquery(AggregateSubqueryExpr),
    Subquery(SubqueryExpr),
    ObjectOperand(ObjectOperandExpr),
    Constant(ConstantExpr),
    ConstantPlaceholder(ConstantPlaceholderExpr),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Conditional(ConditionalExpr),
    OrderBy(OrderByExpr),
    Tuple(TupleExpr),
    Delete(DeleteExpr),
    Update(UpdateExpr),
    InsertInto(InsertIntoExpr),
    CreateTable(CreateTableExpr),
    AlterTable(AlterTableExpr),
    CreateIndex(CreateIndexExpr),
    ColumnDefinition(ColumnDefinitionExpr),
    Constraint(ConstraintExpr),
    ForeignKeyConstraint(ForeignKeyConstraintExpr),
    ReferencesColumn(ReferencesColumnExpr),
    StatementList(StatementListExpr),
}

/// Discriminant of [`Expr`], handy for logging and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Table,
    Column,
    Select,
    Join,
    Projection,
    FunctionCall,
    Aggregate,
    AggregateSubquery,
    Subquery,
    ObjectOperand,
    Constant,
    ConstantPlaceholder,
    Unary,
    Binary,
    Conditional,
    OrderBy,
    Tuple,
    Delete,
    Update,
    InsertInto,
    CreateTable,
    AlterTable,
    CreateIndex,
    ColumnDefinition,
    Constraint,
    ForeignKeyConstraint,
    ReferencesColumn,
    StatementList,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ---------------------------------------------------------------------------
// Query nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableExpr {
    pub name: String,
    pub alias: Option<String>,
}

/// A reference to a column of some select or table in scope, by alias.
/// It never owns what it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnExpr {
    pub select_alias: String,
    pub name: String,
    pub ty: SqlType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDeclaration {
    /// `None` for anonymous columns such as a bare aggregate.
    pub name: Option<String>,
    pub expr: Node,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectExpr {
    pub alias: String,
    pub columns: Vec<ColumnDeclaration>,
    pub from: Option<Node>,
    pub filter: Option<Node>,
    /// `OrderBy` nodes.
    pub order_by: Vec<Node>,
    pub group_by: Vec<Node>,
    pub distinct: bool,
    pub skip: Option<Node>,
    pub take: Option<Node>,
    pub for_update: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinExpr {
    pub join_type: JoinType,
    pub left: Node,
    pub right: Node,
    pub condition: Option<Node>,
}

/// A select together with the host-side projector that materializes its rows.
/// Only the select is ever formatted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectionExpr {
    pub select: Node,
    pub projector: Node,
    pub default_value: Option<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionCallExpr {
    pub function: FunctionKind,
    pub args: Vec<Node>,
    pub ty: SqlType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub kind: AggregateKind,
    /// `None` means `COUNT(*)`.
    pub arg: Option<Node>,
    pub distinct: bool,
    pub ty: SqlType,
}

/// An aggregate that can be computed either inside an enclosing group select
/// or as a correlated subquery. The subquery form is the one that is formatted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateSubqueryExpr {
    pub group_by_alias: String,
    pub aggregate_in_group_select: Node,
    pub aggregate_as_subquery: Node,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubqueryKind {
    Scalar,
    Exists,
    /// `test IN (select)`
    In(Node),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubqueryExpr {
    pub kind: SubqueryKind,
    pub select: Node,
    pub ty: SqlType,
}

/// An object compared by its flattened primary key columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectOperandExpr {
    pub type_name: String,
    pub members: Vec<(String, Node)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstantExpr {
    pub value: TypedValue,
    pub ty: SqlType,
}

/// A literal whose value varies between executions of the same command shape.
/// `index` is its slot in the caller's value list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstantPlaceholderExpr {
    pub index: usize,
    pub constant: ConstantExpr,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Node,
    pub ty: SqlType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: Node,
    pub right: Node,
    pub ty: SqlType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConditionalExpr {
    pub test: Node,
    pub if_true: Node,
    pub if_false: Node,
    pub ty: SqlType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderByExpr {
    pub expr: Node,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleExpr {
    pub items: Vec<Node>,
}

// ---------------------------------------------------------------------------
// Data modification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeleteExpr {
    pub table: Node,
    pub filter: Option<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: Node,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdateExpr {
    pub table: Node,
    pub assignments: Vec<Assignment>,
    pub filter: Option<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InsertIntoExpr {
    pub table: Node,
    pub columns: Vec<String>,
    pub values: Vec<Node>,
    /// Auto-increment columns whose generated value is read back.
    pub returning: Vec<String>,
}

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreateTableExpr {
    pub table: Node,
    pub if_not_exists: bool,
    /// `ColumnDefinition` nodes.
    pub column_definitions: Vec<Node>,
    /// `Constraint` and `ForeignKeyConstraint` nodes.
    pub table_constraints: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlterTableAction {
    AddColumn(Node),
    AddConstraint(Node),
    DropConstraint(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlterTableExpr {
    pub table: Node,
    pub actions: Vec<AlterTableAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexedColumn {
    pub name: String,
    pub direction: Option<OrderDirection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreateIndexExpr {
    pub name: String,
    pub table: Node,
    pub columns: Vec<IndexedColumn>,
    pub unique: bool,
    pub if_not_exists: bool,
    /// Partial index condition.
    pub filter: Option<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDefinitionExpr {
    pub name: String,
    pub ty: SqlType,
    /// Explicit DDL type name, bypassing the dialect's type table.
    pub type_name: Option<String>,
    /// `Constraint` and `ReferencesColumn` nodes.
    pub constraints: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstraintExpr {
    pub name: Option<String>,
    pub kind: ConstraintKind,
    /// Constrained columns for table-level constraints; empty on a column.
    pub columns: Vec<String>,
    pub default_value: Option<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyConstraintExpr {
    pub name: Option<String>,
    pub columns: Vec<String>,
    /// A `ReferencesColumn` node.
    pub references: Node,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferencesColumnExpr {
    /// Referenced table, looked up by name.
    pub table: Node,
    pub columns: Vec<String>,
    pub deferrability: Deferrability,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementListExpr {
    pub statements: Vec<Node>,
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

impl Expr {
    pub fn kind(&self) -> NodeKind {
        match self {
            Expr::Table(_) => NodeKind::Table,
            Expr::Column(_) => NodeKind::Column,
            Expr::Select(_) => NodeKind::Select,
            Expr::Join(_) => NodeKind::Join,
            Expr::Projection(_) => NodeKind::Projection,
            Expr::FunctionCall(_) => NodeKind::FunctionCall,
            Expr::Aggregate(_) => NodeKind::Aggregate,
            Expr::AggregateSubquery(_) => NodeKind::AggregateSubquery,
            Expr::Subquery(_) => NodeKind::Subquery,
            Expr::ObjectOperand(_) => NodeKind::ObjectOperand,
            Expr::Constant(_) => NodeKind::Constant,
            Expr::ConstantPlaceholder(_) => NodeKind::ConstantPlaceholder,
            Expr::Unary(_) => NodeKind::Unary,
            Expr::Binary(_) => NodeKind::Binary,
            Expr::Conditional(_) => NodeKind::Conditional,
            Expr::OrderBy(_) => NodeKind::OrderBy,
            Expr::Tuple(_) => NodeKind::Tuple,
            Expr::Delete(_) => NodeKind::Delete,
            Expr::Update(_) => NodeKind::Update,
            Expr::InsertInto(_) => NodeKind::InsertInto,
            Expr::CreateTable(_) => NodeKind::CreateTable,
            Expr::AlterTable(_) => NodeKind::AlterTable,
            Expr::CreateIndex(_) => NodeKind::CreateIndex,
            Expr::ColumnDefinition(_) => NodeKind::ColumnDefinition,
            Expr::Constraint(_) => NodeKind::Constraint,
            Expr::ForeignKeyConstraint(_) => NodeKind::ForeignKeyConstraint,
            Expr::ReferencesColumn(_) => NodeKind::ReferencesColumn,
            Expr::StatementList(_) => NodeKind::StatementList,
        }
    }

    /// Static result type of the node. Statements are `Void`.
    pub fn sql_type(&self) -> SqlType {
        match self {
            Expr::Column(c) => c.ty.clone(),
            Expr::Select(s) => match s.columns.as_slice() {
                [single] => single.expr.sql_type(),
                columns => SqlType::Tuple(columns.iter().map(|c| c.expr.sql_type()).collect()),
            },
            Expr::Projection(p) => p.select.sql_type(),
            Expr::FunctionCall(f) => f.ty.clone(),
            Expr::Aggregate(a) => a.ty.clone(),
            Expr::AggregateSubquery(a) => a.aggregate_as_subquery.sql_type(),
            Expr::Subquery(s) => s.ty.clone(),
            Expr::ObjectOperand(o) => SqlType::ObjectReference(o.type_name.clone()),
            Expr::Constant(c) => c.ty.clone(),
            Expr::ConstantPlaceholder(p) => p.constant.ty.clone(),
            Expr::Unary(u) => u.ty.clone(),
            Expr::Binary(b) => b.ty.clone(),
            Expr::Conditional(c) => c.ty.clone(),
            Expr::OrderBy(o) => o.expr.sql_type(),
            Expr::Tuple(t) => SqlType::Tuple(t.items.iter().map(|i| i.sql_type()).collect()),
            _ => SqlType::Void,
        }
    }

    /// The literal value of a constant or placeholder node.
    pub fn literal(&self) -> Option<&TypedValue> {
        match self {
            Expr::Constant(c) => Some(&c.value),
            Expr::ConstantPlaceholder(p) => Some(&p.constant.value),
            _ => None,
        }
    }

    /// True for statements that define schema rather than query or modify data.
    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            Expr::CreateTable(_)
                | Expr::AlterTable(_)
                | Expr::CreateIndex(_)
                | Expr::ColumnDefinition(_)
                | Expr::Constraint(_)
                | Expr::ForeignKeyConstraint(_)
                | Expr::ReferencesColumn(_)
        )
    }

    /// Direct children in visiting order.
    pub fn children(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        match self {
            Expr::Table(_) | Expr::Column(_) | Expr::Constant(_) | Expr::ConstantPlaceholder(_) => {}
            Expr::Select(s) => {
                out.extend(s.from.iter());
                out.extend(s.filter.iter());
                out.extend(s.order_by.iter());
                out.extend(s.group_by.iter());
                out.extend(s.skip.iter());
                out.extend(s.take.iter());
                out.extend(s.columns.iter().map(|c| &c.expr));
            }
            Expr::Join(j) => {
                out.push(&j.left);
                out.push(&j.right);
                out.extend(j.condition.iter());
            }
            Expr::Projection(p) => {
                out.push(&p.select);
                out.push(&p.projector);
                out.extend(p.default_value.iter());
            }
            Expr::FunctionCall(f) => out.extend(f.args.iter()),
            Expr::Aggregate(a) => out.extend(a.arg.iter()),
            Expr::AggregateSubquery(a) => {
                out.push(&a.aggregate_in_group_select);
                out.push(&a.aggregate_as_subquery);
            }
            Expr::Subquery(s) => {
                if let SubqueryKind::In(test) = &s.kind {
                    out.push(test);
                }
                out.push(&s.select);
            }
            Expr::ObjectOperand(o) => out.extend(o.members.iter().map(|(_, n)| n)),
            Expr::Unary(u) => out.push(&u.operand),
            Expr::Binary(b) => {
                out.push(&b.left);
                out.push(&b.right);
            }
            Expr::Conditional(c) => {
                out.push(&c.test);
                out.push(&c.if_true);
                out.push(&c.if_false);
            }
            Expr::OrderBy(o) => out.push(&o.expr),
            Expr::Tuple(t) => out.extend(t.items.iter()),
            Expr::Delete(d) => {
                out.push(&d.table);
                out.extend(d.filter.iter());
            }
            Expr::Update(u) => {
                out.push(&u.table);
                out.extend(u.assignments.iter().map(|a| &a.value));
                out.extend(u.filter.iter());
            }
            Expr::InsertInto(i) => {
                out.push(&i.table);
                out.extend(i.values.iter());
            }
            Expr::CreateTable(c) => {
                out.push(&c.table);
                out.extend(c.column_definitions.iter());
                out.extend(c.table_constraints.iter());
            }
            Expr::AlterTable(a) => {
                out.push(&a.table);
                for action in &a.actions {
                    match action {
                        AlterTableAction::AddColumn(n) | AlterTableAction::AddConstraint(n) => {
                            out.push(n)
                        }
                        AlterTableAction::DropConstraint(_) => {}
                    }
                }
            }
            Expr::CreateIndex(c) => {
                out.push(&c.table);
                out.extend(c.filter.iter());
            }
            Expr::ColumnDefinition(c) => out.extend(c.constraints.iter()),
            Expr::Constraint(c) => out.extend(c.default_value.iter()),
            Expr::ForeignKeyConstraint(f) => out.push(&f.references),
            Expr::ReferencesColumn(r) => out.push(&r.table),
            Expr::StatementList(s) => out.extend(s.statements.iter()),
        }
        out
    }

    /// Pre-order search for a node satisfying `pred`.
    pub fn any(&self, pred: &mut dyn FnMut(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        self.children().into_iter().any(|child| child.any(pred))
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

impl Expr {
    pub fn table(name: impl Into<String>) -> Node {
        Arc::new(Expr::Table(TableExpr {
            name: name.into(),
            alias: None,
        }))
    }

    pub fn aliased_table(name: impl Into<String>, alias: impl Into<String>) -> Node {
        Arc::new(Expr::Table(TableExpr {
            name: name.into(),
            alias: Some(alias.into()),
        }))
    }

    pub fn column(alias: impl Into<String>, name: impl Into<String>, ty: SqlType) -> Node {
        Arc::new(Expr::Column(ColumnExpr {
            select_alias: alias.into(),
            name: name.into(),
            ty,
        }))
    }

    pub fn constant(value: impl Into<TypedValue>) -> Node {
        let value = value.into();
        let ty = value.sql_type();
        Arc::new(Expr::Constant(ConstantExpr { value, ty }))
    }

    pub fn typed_constant(value: TypedValue, ty: SqlType) -> Node {
        Arc::new(Expr::Constant(ConstantExpr { value, ty }))
    }

    /// A `NULL` literal of the given type.
    pub fn null(ty: SqlType) -> Node {
        Self::typed_constant(TypedValue::Null, ty.nullable())
    }

    pub fn placeholder(index: usize, value: impl Into<TypedValue>) -> Node {
        let value = value.into();
        let ty = value.sql_type();
        Arc::new(Expr::ConstantPlaceholder(ConstantPlaceholderExpr {
            index,
            constant: ConstantExpr { value, ty },
        }))
    }

    pub fn unary(op: UnaryOp, operand: Node) -> Node {
        let ty = match op {
            UnaryOp::Not => SqlType::Boolean,
            UnaryOp::Negate => operand.sql_type(),
        };
        Arc::new(Expr::Unary(UnaryExpr { op, operand, ty }))
    }

    pub fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
        let ty = if op.is_comparison() || op.is_logical() {
            SqlType::Boolean
        } else {
            left.sql_type()
        };
        Arc::new(Expr::Binary(BinaryExpr {
            op,
            left,
            right,
            ty,
        }))
    }

    pub fn equal(left: Node, right: Node) -> Node {
        Self::binary(BinaryOp::Equal, left, right)
    }

    pub fn and(left: Node, right: Node) -> Node {
        Self::binary(BinaryOp::And, left, right)
    }

    pub fn function(function: FunctionKind, args: Vec<Node>) -> Node {
        let first = args.first().map(|a| a.sql_type());
        let ty = function.result_type(first.as_ref());
        Arc::new(Expr::FunctionCall(FunctionCallExpr { function, args, ty }))
    }

    pub fn aggregate(kind: AggregateKind, arg: Option<Node>) -> Node {
        let ty = match kind {
            AggregateKind::Count => SqlType::Int32,
            AggregateKind::LongCount => SqlType::Int64,
            AggregateKind::Average => SqlType::Float64,
            AggregateKind::Sum | AggregateKind::Min | AggregateKind::Max => arg
                .as_ref()
                .map(|a| a.sql_type())
                .unwrap_or(SqlType::Void),
        };
        Arc::new(Expr::Aggregate(AggregateExpr {
            kind,
            arg,
            distinct: false,
            ty,
        }))
    }

    pub fn conditional(test: Node, if_true: Node, if_false: Node) -> Node {
        let ty = if_true.sql_type();
        Arc::new(Expr::Conditional(ConditionalExpr {
            test,
            if_true,
            if_false,
            ty,
        }))
    }

    pub fn order_by(expr: Node, direction: OrderDirection) -> Node {
        Arc::new(Expr::OrderBy(OrderByExpr { expr, direction }))
    }

    pub fn scalar_subquery(select: Node) -> Node {
        let ty = select.sql_type();
        Arc::new(Expr::Subquery(SubqueryExpr {
            kind: SubqueryKind::Scalar,
            select,
            ty,
        }))
    }

    pub fn exists(select: Node) -> Node {
        Arc::new(Expr::Subquery(SubqueryExpr {
            kind: SubqueryKind::Exists,
            select,
            ty: SqlType::Boolean,
        }))
    }

    pub fn in_subquery(test: Node, select: Node) -> Node {
        Arc::new(Expr::Subquery(SubqueryExpr {
            kind: SubqueryKind::In(test),
            select,
            ty: SqlType::Boolean,
        }))
    }

    pub fn join(join_type: JoinType, left: Node, right: Node, condition: Option<Node>) -> Node {
        Arc::new(Expr::Join(JoinExpr {
            join_type,
            left,
            right,
            condition,
        }))
    }

    pub fn statements(statements: Vec<Node>) -> Node {
        Arc::new(Expr::StatementList(StatementListExpr { statements }))
    }
}

impl TableExpr {
    /// Name used to qualify columns of this table.
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl SelectExpr {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            columns: Vec::new(),
            from: None,
            filter: None,
            order_by: Vec::new(),
            group_by: Vec::new(),
            distinct: false,
            skip: None,
            take: None,
            for_update: false,
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, expr: Node) -> Self {
        self.columns.push(ColumnDeclaration {
            name: Some(name.into()),
            expr,
        });
        self
    }

    pub fn with_anonymous_column(mut self, expr: Node) -> Self {
        self.columns.push(ColumnDeclaration { name: None, expr });
        self
    }

    pub fn with_from(mut self, from: Node) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_filter(mut self, filter: Node) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order_by(mut self, expr: Node, direction: OrderDirection) -> Self {
        self.order_by.push(Expr::order_by(expr, direction));
        self
    }

    pub fn with_group_by(mut self, expr: Node) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn with_skip(mut self, skip: Node) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_take(mut self, take: Node) -> Self {
        self.take = Some(take);
        self
    }

    pub fn with_for_update(mut self) -> Self {
        self.for_update = true;
        self
    }

    pub fn into_node(self) -> Node {
        Arc::new(Expr::Select(self))
    }

    pub fn column_named(&self, name: &str) -> Option<&ColumnDeclaration> {
        self.columns
            .iter()
            .find(|c| c.name.as_deref() == Some(name))
    }

    /// Every column is a bare column reference or a literal.
    pub fn is_pure_projection(&self) -> bool {
        self.columns.iter().all(|c| {
            matches!(
                c.expr.as_ref(),
                Expr::Column(_) | Expr::Constant(_) | Expr::ConstantPlaceholder(_)
            )
        })
    }

    pub fn is_paginated(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }

    /// True if any column computes an aggregate at this select's level.
    pub fn has_aggregates(&self) -> bool {
        self.columns.iter().any(|c| contains_aggregate(&c.expr))
    }
}

/// Aggregates inside nested selects belong to those selects and are skipped.
fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Aggregate(_) | Expr::AggregateSubquery(_) => true,
        Expr::Select(_) | Expr::Subquery(_) => false,
        other => other.children().into_iter().any(|c| contains_aggregate(c)),
    }
}

impl ColumnDefinitionExpr {
    pub fn has_constraint(&self, kind: ConstraintKind) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c.as_ref(), Expr::Constraint(k) if k.kind == kind))
    }
}

impl ConstraintExpr {
    pub fn column_level(kind: ConstraintKind) -> Node {
        Arc::new(Expr::Constraint(ConstraintExpr {
            name: None,
            kind,
            columns: Vec::new(),
            default_value: None,
        }))
    }

    pub fn table_level(kind: ConstraintKind, columns: Vec<String>) -> Node {
        Arc::new(Expr::Constraint(ConstraintExpr {
            name: None,
            kind,
            columns,
            default_value: None,
        }))
    }
}

/// Aliases introduced by a FROM source: table aliases (or names), select
/// aliases, and everything on either side of a join.
pub fn source_aliases(source: &Node) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_source_aliases(source, &mut out);
    out
}

fn collect_source_aliases(source: &Node, out: &mut BTreeSet<String>) {
    match source.as_ref() {
        Expr::Table(t) => {
            out.insert(t.reference_name().to_string());
        }
        Expr::Select(s) => {
            out.insert(s.alias.clone());
        }
        Expr::Join(j) => {
            collect_source_aliases(&j.left, out);
            collect_source_aliases(&j.right, out);
        }
        Expr::Subquery(s) => collect_source_aliases(&s.select, out),
        _ => {}
    }
}

/// Table names read anywhere beneath `node`.
pub fn referenced_tables(node: &Expr, out: &mut BTreeSet<String>) {
    if let Expr::Table(t) = node {
        out.insert(t.name.clone());
    }
    for child in node.children() {
        referenced_tables(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_select() -> Node {
        SelectExpr::new("s0")
            .with_column("n", Expr::column("t0", "n", SqlType::Int32))
            .with_from(Expr::aliased_table("T", "t0"))
            .with_filter(Expr::equal(
                Expr::column("t0", "n", SqlType::Int32),
                Expr::constant(5),
            ))
            .into_node()
    }

    #[test]
    fn test_structural_equality_ignores_identity() {
        let a = sample_select();
        let b = sample_select();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_children_follow_select_order() {
        let select = sample_select();
        let kinds: Vec<NodeKind> = select.children().iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Table, NodeKind::Binary, NodeKind::Column]
        );
    }

    #[test]
    fn test_builder_types() {
        let cmp = Expr::equal(Expr::column("t", "a", SqlType::String), Expr::constant("x"));
        assert_eq!(cmp.sql_type(), SqlType::Boolean);

        let sum = Expr::aggregate(
            AggregateKind::Sum,
            Some(Expr::column("t", "a", SqlType::Decimal)),
        );
        assert_eq!(sum.sql_type(), SqlType::Decimal);

        let null = Expr::null(SqlType::Int32);
        assert_eq!(null.sql_type(), SqlType::Int32.nullable());
        assert!(null.literal().is_some_and(TypedValue::is_null));
    }

    #[test]
    fn test_source_aliases_through_joins() {
        let join = Expr::join(
            JoinType::Inner,
            Expr::aliased_table("A", "a"),
            SelectExpr::new("s1")
                .with_from(Expr::table("B"))
                .into_node(),
            None,
        );
        let aliases: Vec<String> = source_aliases(&join).into_iter().collect();
        assert_eq!(aliases, vec!["a".to_string(), "s1".to_string()]);
    }

    #[test]
    fn test_select_predicates() {
        let select = sample_select();
        let select = select.as_select().unwrap();
        assert!(select.is_pure_projection());
        assert!(!select.is_paginated());
        assert!(!select.has_aggregates());
        assert!(select.column_named("n").is_some());
    }

    #[test]
    fn test_ir_round_trips_through_json() {
        let select = sample_select();
        let json = serde_json::to_string(&select).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(select, back);
    }
}
