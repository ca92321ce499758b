//! Structure-sharing rewrite visitor.
//!
//! [`Visitor::visit`] dispatches on the node variant to one overridable method
//! per variant. The default methods walk every child and rebuild the node only
//! when at least one child came back as a different `Arc`; otherwise the very
//! same `Arc` is returned. Passes and the command-shape cache depend on that:
//! an untouched tree must come back pointer-identical.
//!
//! Select children are walked in dependency order:
//! from, filter, order by, group by, skip, take, columns.

use std::sync::Arc;

use super::expr::*;

pub trait Visitor {
    fn visit(&mut self, node: &Node) -> Node {
        match node.as_ref() {
            Expr::Table(e) => self.visit_table(node, e),
            Expr::Column(e) => self.visit_column(node, e),
            Expr::Select(e) => self.visit_select(node, e),
            Expr::Join(e) => self.visit_join(node, e),
            Expr::Projection(e) => self.visit_projection(node, e),
            Expr::FunctionCall(e) => self.visit_function_call(node, e),
            Expr::Aggregate(e) => self.visit_aggregate(node, e),
            Expr::AggregateSubquery(e) => self.visit_aggregate_subquery(node, e),
            Expr::Subquery(e) => self.visit_subquery(node, e),
            Expr::ObjectOperand(e) => self.visit_object_operand(node, e),
            Expr::Constant(e) => self.visit_constant(node, e),
            Expr::ConstantPlaceholder(e) => self.visit_constant_placeholder(node, e),
            Expr::Unary(e) => self.visit_unary(node, e),
            Expr::Binary(e) => self.visit_binary(node, e),
            Expr::Conditional(e) => self.visit_conditional(node, e),
            Expr::OrderBy(e) => self.visit_order_by(node, e),
            Expr::Tuple(e) => self.visit_tuple(node, e),
            Expr::Delete(e) => self.visit_delete(node, e),
            Expr::Update(e) => self.visit_update(node, e),
            Expr::InsertInto(e) => self.visit_insert_into(node, e),
            Expr::CreateTable(e) => self.visit_create_table(node, e),
            Expr::AlterTable(e) => self.visit_alter_table(node, e),
            Expr::CreateIndex(e) => self.visit_create_index(node, e),
            Expr::ColumnDefinition(e) => self.visit_column_definition(node, e),
            Expr::Constraint(e) => self.visit_constraint(node, e),
            Expr::ForeignKeyConstraint(e) => self.visit_foreign_key_constraint(node, e),
            Expr::ReferencesColumn(e) => self.visit_references_column(node, e),
            Expr::StatementList(e) => self.visit_statement_list(node, e),
        }
    }

    fn visit_table(&mut self, node: &Node, _table: &TableExpr) -> Node {
        node.clone()
    }

    fn visit_column(&mut self, node: &Node, _column: &ColumnExpr) -> Node {
        node.clone()
    }

    fn visit_constant(&mut self, node: &Node, _constant: &ConstantExpr) -> Node {
        node.clone()
    }

    fn visit_constant_placeholder(
        &mut self,
        node: &Node,
        _placeholder: &ConstantPlaceholderExpr,
    ) -> Node {
        node.clone()
    }

    fn visit_select(&mut self, node: &Node, select: &SelectExpr) -> Node {
        walk_select(self, node, select)
    }

    fn visit_join(&mut self, node: &Node, join: &JoinExpr) -> Node {
        walk_join(self, node, join)
    }

    fn visit_projection(&mut self, node: &Node, projection: &ProjectionExpr) -> Node {
        walk_projection(self, node, projection)
    }

    fn visit_function_call(&mut self, node: &Node, call: &FunctionCallExpr) -> Node {
        walk_function_call(self, node, call)
    }

    fn visit_aggregate(&mut self, node: &Node, aggregate: &AggregateExpr) -> Node {
        walk_aggregate(self, node, aggregate)
    }

    fn visit_aggregate_subquery(&mut self, node: &Node, aggregate: &AggregateSubqueryExpr) -> Node {
        walk_aggregate_subquery(self, node, aggregate)
    }

    fn visit_subquery(&mut self, node: &Node, subquery: &SubqueryExpr) -> Node {
        walk_subquery(self, node, subquery)
    }

    fn visit_object_operand(&mut self, node: &Node, operand: &ObjectOperandExpr) -> Node {
        walk_object_operand(self, node, operand)
    }

    fn visit_unary(&mut self, node: &Node, unary: &UnaryExpr) -> Node {
        walk_unary(self, node, unary)
    }

    fn visit_binary(&mut self, node: &Node, binary: &BinaryExpr) -> Node {
        walk_binary(self, node, binary)
    }

    fn visit_conditional(&mut self, node: &Node, conditional: &ConditionalExpr) -> Node {
        walk_conditional(self, node, conditional)
    }

    fn visit_order_by(&mut self, node: &Node, order_by: &OrderByExpr) -> Node {
        walk_order_by(self, node, order_by)
    }

    fn visit_tuple(&mut self, node: &Node, tuple: &TupleExpr) -> Node {
        walk_tuple(self, node, tuple)
    }

    fn visit_delete(&mut self, node: &Node, delete: &DeleteExpr) -> Node {
        walk_delete(self, node, delete)
    }

    fn visit_update(&mut self, node: &Node, update: &UpdateExpr) -> Node {
        walk_update(self, node, update)
    }

    fn visit_insert_into(&mut self, node: &Node, insert: &InsertIntoExpr) -> Node {
        walk_insert_into(self, node, insert)
    }

    fn visit_create_table(&mut self, node: &Node, create: &CreateTableExpr) -> Node {
        walk_create_table(self, node, create)
    }

    fn visit_alter_table(&mut self, node: &Node, alter: &AlterTableExpr) -> Node {
        walk_alter_table(self, node, alter)
    }

    fn visit_create_index(&mut self, node: &Node, index: &CreateIndexExpr) -> Node {
        walk_create_index(self, node, index)
    }

    fn visit_column_definition(&mut self, node: &Node, column: &ColumnDefinitionExpr) -> Node {
        walk_column_definition(self, node, column)
    }

    fn visit_constraint(&mut self, node: &Node, constraint: &ConstraintExpr) -> Node {
        walk_constraint(self, node, constraint)
    }

    fn visit_foreign_key_constraint(
        &mut self,
        node: &Node,
        constraint: &ForeignKeyConstraintExpr,
    ) -> Node {
        walk_foreign_key_constraint(self, node, constraint)
    }

    fn visit_references_column(&mut self, node: &Node, references: &ReferencesColumnExpr) -> Node {
        walk_references_column(self, node, references)
    }

    fn visit_statement_list(&mut self, node: &Node, list: &StatementListExpr) -> Node {
        walk_statement_list(self, node, list)
    }
}

/// Visits children on behalf of a walk and remembers whether any of them was
/// replaced.
#[derive(Debug, Default)]
pub struct ChildRewriter {
    changed: bool,
}

impl ChildRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Marks the node as changed for reasons other than a replaced child.
    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub fn node<V: Visitor + ?Sized>(&mut self, visitor: &mut V, node: &Node) -> Node {
        let out = visitor.visit(node);
        if !Arc::ptr_eq(&out, node) {
            self.changed = true;
        }
        out
    }

    pub fn opt<V: Visitor + ?Sized>(&mut self, visitor: &mut V, node: &Option<Node>) -> Option<Node> {
        node.as_ref().map(|n| self.node(visitor, n))
    }

    pub fn list<V: Visitor + ?Sized>(&mut self, visitor: &mut V, nodes: &[Node]) -> Vec<Node> {
        nodes.iter().map(|n| self.node(visitor, n)).collect()
    }

    pub fn columns<V: Visitor + ?Sized>(
        &mut self,
        visitor: &mut V,
        columns: &[ColumnDeclaration],
    ) -> Vec<ColumnDeclaration> {
        columns
            .iter()
            .map(|c| ColumnDeclaration {
                name: c.name.clone(),
                expr: self.node(visitor, &c.expr),
            })
            .collect()
    }

    /// Returns `original` unless something changed, in which case `build` makes
    /// the replacement.
    pub fn finish(&self, original: &Node, build: impl FnOnce() -> Expr) -> Node {
        if self.changed {
            Arc::new(build())
        } else {
            original.clone()
        }
    }
}

/// Pointer equality for optional children.
pub fn same_opt(a: &Option<Node>, b: &Option<Node>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Pointer equality, element by element.
pub fn same_list(a: &[Node], b: &[Node]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| Arc::ptr_eq(a, b))
}

pub fn walk_select<V: Visitor + ?Sized>(v: &mut V, node: &Node, select: &SelectExpr) -> Node {
    let mut r = ChildRewriter::new();
    let from = r.opt(v, &select.from);
    let filter = r.opt(v, &select.filter);
    let order_by = r.list(v, &select.order_by);
    let group_by = r.list(v, &select.group_by);
    let skip = r.opt(v, &select.skip);
    let take = r.opt(v, &select.take);
    let columns = r.columns(v, &select.columns);
    r.finish(node, || {
        Expr::Select(SelectExpr {
            alias: select.alias.clone(),
            columns,
            from,
            filter,
            order_by,
            group_by,
            distinct: select.distinct,
            skip,
            take,
            for_update: select.for_update,
        })
    })
}

pub fn walk_join<V: Visitor + ?Sized>(v: &mut V, node: &Node, join: &JoinExpr) -> Node {
    let mut r = ChildRewriter::new();
    let left = r.node(v, &join.left);
    let right = r.node(v, &join.right);
    let condition = r.opt(v, &join.condition);
    r.finish(node, || {
        Expr::Join(JoinExpr {
            join_type: join.join_type,
            left,
            right,
            condition,
        })
    })
}

pub fn walk_projection<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    projection: &ProjectionExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let select = r.node(v, &projection.select);
    let projector = r.node(v, &projection.projector);
    let default_value = r.opt(v, &projection.default_value);
    r.finish(node, || {
        Expr::Projection(ProjectionExpr {
            select,
            projector,
            default_value,
        })
    })
}

pub fn walk_function_call<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    call: &FunctionCallExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let args = r.list(v, &call.args);
    r.finish(node, || {
        Expr::FunctionCall(FunctionCallExpr {
            function: call.function,
            args,
            ty: call.ty.clone(),
        })
    })
}

pub fn walk_aggregate<V: Visitor + ?Sized>(v: &mut V, node: &Node, aggregate: &AggregateExpr) -> Node {
    let mut r = ChildRewriter::new();
    let arg = r.opt(v, &aggregate.arg);
    r.finish(node, || {
        Expr::Aggregate(AggregateExpr {
            kind: aggregate.kind,
            arg,
            distinct: aggregate.distinct,
            ty: aggregate.ty.clone(),
        })
    })
}

pub fn walk_aggregate_subquery<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    aggregate: &AggregateSubqueryExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let in_group = r.node(v, &aggregate.aggregate_in_group_select);
    let as_subquery = r.node(v, &aggregate.aggregate_as_subquery);
    r.finish(node, || {
        Expr::AggregateSubquery(AggregateSubqueryExpr {
            group_by_alias: aggregate.group_by_alias.clone(),
            aggregate_in_group_select: in_group,
            aggregate_as_subquery: as_subquery,
        })
    })
}

pub fn walk_subquery<V: Visitor + ?Sized>(v: &mut V, node: &Node, subquery: &SubqueryExpr) -> Node {
    let mut r = ChildRewriter::new();
    let kind = match &subquery.kind {
        SubqueryKind::In(test) => SubqueryKind::In(r.node(v, test)),
        other => other.clone(),
    };
    let select = r.node(v, &subquery.select);
    r.finish(node, || {
        Expr::Subquery(SubqueryExpr {
            kind,
            select,
            ty: subquery.ty.clone(),
        })
    })
}

pub fn walk_object_operand<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    operand: &ObjectOperandExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let members: Vec<(String, Node)> = operand
        .members
        .iter()
        .map(|(name, value)| (name.clone(), r.node(v, value)))
        .collect();
    r.finish(node, || {
        Expr::ObjectOperand(ObjectOperandExpr {
            type_name: operand.type_name.clone(),
            members,
        })
    })
}

pub fn walk_unary<V: Visitor + ?Sized>(v: &mut V, node: &Node, unary: &UnaryExpr) -> Node {
    let mut r = ChildRewriter::new();
    let operand = r.node(v, &unary.operand);
    r.finish(node, || {
        Expr::Unary(UnaryExpr {
            op: unary.op,
            operand,
            ty: unary.ty.clone(),
        })
    })
}

pub fn walk_binary<V: Visitor + ?Sized>(v: &mut V, node: &Node, binary: &BinaryExpr) -> Node {
    let mut r = ChildRewriter::new();
    let left = r.node(v, &binary.left);
    let right = r.node(v, &binary.right);
    r.finish(node, || {
        Expr::Binary(BinaryExpr {
            op: binary.op,
            left,
            right,
            ty: binary.ty.clone(),
        })
    })
}

pub fn walk_conditional<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    conditional: &ConditionalExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let test = r.node(v, &conditional.test);
    let if_true = r.node(v, &conditional.if_true);
    let if_false = r.node(v, &conditional.if_false);
    r.finish(node, || {
        Expr::Conditional(ConditionalExpr {
            test,
            if_true,
            if_false,
            ty: conditional.ty.clone(),
        })
    })
}

pub fn walk_order_by<V: Visitor + ?Sized>(v: &mut V, node: &Node, order_by: &OrderByExpr) -> Node {
    let mut r = ChildRewriter::new();
    let expr = r.node(v, &order_by.expr);
    r.finish(node, || {
        Expr::OrderBy(OrderByExpr {
            expr,
            direction: order_by.direction,
        })
    })
}

pub fn walk_tuple<V: Visitor + ?Sized>(v: &mut V, node: &Node, tuple: &TupleExpr) -> Node {
    let mut r = ChildRewriter::new();
    let items = r.list(v, &tuple.items);
    r.finish(node, || Expr::Tuple(TupleExpr { items }))
}

pub fn walk_delete<V: Visitor + ?Sized>(v: &mut V, node: &Node, delete: &DeleteExpr) -> Node {
    let mut r = ChildRewriter::new();
    let table = r.node(v, &delete.table);
    let filter = r.opt(v, &delete.filter);
    r.finish(node, || Expr::Delete(DeleteExpr { table, filter }))
}

pub fn walk_update<V: Visitor + ?Sized>(v: &mut V, node: &Node, update: &UpdateExpr) -> Node {
    let mut r = ChildRewriter::new();
    let table = r.node(v, &update.table);
    let assignments: Vec<Assignment> = update
        .assignments
        .iter()
        .map(|a| Assignment {
            column: a.column.clone(),
            value: r.node(v, &a.value),
        })
        .collect();
    let filter = r.opt(v, &update.filter);
    r.finish(node, || {
        Expr::Update(UpdateExpr {
            table,
            assignments,
            filter,
        })
    })
}

pub fn walk_insert_into<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    insert: &InsertIntoExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let table = r.node(v, &insert.table);
    let values = r.list(v, &insert.values);
    r.finish(node, || {
        Expr::InsertInto(InsertIntoExpr {
            table,
            columns: insert.columns.clone(),
            values,
            returning: insert.returning.clone(),
        })
    })
}

pub fn walk_create_table<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    create: &CreateTableExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let table = r.node(v, &create.table);
    let column_definitions = r.list(v, &create.column_definitions);
    let table_constraints = r.list(v, &create.table_constraints);
    r.finish(node, || {
        Expr::CreateTable(CreateTableExpr {
            table,
            if_not_exists: create.if_not_exists,
            column_definitions,
            table_constraints,
        })
    })
}

pub fn walk_alter_table<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    alter: &AlterTableExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let table = r.node(v, &alter.table);
    let actions: Vec<AlterTableAction> = alter
        .actions
        .iter()
        .map(|action| match action {
            AlterTableAction::AddColumn(n) => AlterTableAction::AddColumn(r.node(v, n)),
            AlterTableAction::AddConstraint(n) => AlterTableAction::AddConstraint(r.node(v, n)),
            AlterTableAction::DropConstraint(name) => AlterTableAction::DropConstraint(name.clone()),
        })
        .collect();
    r.finish(node, || Expr::AlterTable(AlterTableExpr { table, actions }))
}

pub fn walk_create_index<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    index: &CreateIndexExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let table = r.node(v, &index.table);
    let filter = r.opt(v, &index.filter);
    r.finish(node, || {
        Expr::CreateIndex(CreateIndexExpr {
            name: index.name.clone(),
            table,
            columns: index.columns.clone(),
            unique: index.unique,
            if_not_exists: index.if_not_exists,
            filter,
        })
    })
}

pub fn walk_column_definition<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    column: &ColumnDefinitionExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let constraints = r.list(v, &column.constraints);
    r.finish(node, || {
        Expr::ColumnDefinition(ColumnDefinitionExpr {
            name: column.name.clone(),
            ty: column.ty.clone(),
            type_name: column.type_name.clone(),
            constraints,
        })
    })
}

pub fn walk_constraint<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    constraint: &ConstraintExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let default_value = r.opt(v, &constraint.default_value);
    r.finish(node, || {
        Expr::Constraint(ConstraintExpr {
            name: constraint.name.clone(),
            kind: constraint.kind,
            columns: constraint.columns.clone(),
            default_value,
        })
    })
}

pub fn walk_foreign_key_constraint<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    constraint: &ForeignKeyConstraintExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let references = r.node(v, &constraint.references);
    r.finish(node, || {
        Expr::ForeignKeyConstraint(ForeignKeyConstraintExpr {
            name: constraint.name.clone(),
            columns: constraint.columns.clone(),
            references,
        })
    })
}

pub fn walk_references_column<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    references: &ReferencesColumnExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let table = r.node(v, &references.table);
    r.finish(node, || {
        Expr::ReferencesColumn(ReferencesColumnExpr {
            table,
            columns: references.columns.clone(),
            deferrability: references.deferrability,
            on_delete: references.on_delete,
            on_update: references.on_update,
        })
    })
}

pub fn walk_statement_list<V: Visitor + ?Sized>(
    v: &mut V,
    node: &Node,
    list: &StatementListExpr,
) -> Node {
    let mut r = ChildRewriter::new();
    let statements = r.list(v, &list.statements);
    r.finish(node, || Expr::StatementList(StatementListExpr { statements }))
}

/// Replaces column references by `(alias, name)` lookup. Used when a nested
/// select is folded away and its declared expressions take over.
pub struct ColumnReplacer<'a> {
    lookup: &'a dyn Fn(&ColumnExpr) -> Option<Node>,
}

impl<'a> ColumnReplacer<'a> {
    pub fn new(lookup: &'a dyn Fn(&ColumnExpr) -> Option<Node>) -> Self {
        Self { lookup }
    }
}

impl Visitor for ColumnReplacer<'_> {
    fn visit_column(&mut self, node: &Node, column: &ColumnExpr) -> Node {
        (self.lookup)(column).unwrap_or_else(|| node.clone())
    }
}
