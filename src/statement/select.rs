use std::sync::Arc;

use super::{Render, Scope, SourceColumns, SqlWriter, Statement};
use crate::error::{QueryBuildError, Result};
use crate::expr::{AsExpr, ExprNode};
use crate::schema::Table;
use crate::types::{Bool, SqlType};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One ORDER BY term; built with `asc()` / `desc()` on an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingTerm {
    node: ExprNode,
    direction: Direction,
}

impl OrderingTerm {
    pub(crate) fn new(node: ExprNode, direction: Direction) -> Self {
        Self { node, direction }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SelectItem {
    node: ExprNode,
    alias: Option<Arc<str>>,
}

impl SelectItem {
    fn new(node: ExprNode, alias: Option<Arc<str>>) -> Self {
        Self { node, alias }
    }

    fn output_name(&self) -> Option<Arc<str>> {
        self.alias.clone().or_else(|| self.node.output_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    Cross,
}

impl JoinKind {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => " INNER JOIN ",
            Self::LeftOuter => " LEFT OUTER JOIN ",
            Self::Cross => " CROSS JOIN ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Source {
    Table(Table),
    Subquery { query: Box<Select>, alias: Arc<str> },
}

impl Source {
    fn columns(&self) -> SourceColumns {
        match self {
            Self::Table(table) => table.source_columns(),
            Self::Subquery { query, alias } => {
                SourceColumns::new(alias.clone(), query.result_columns())
            }
        }
    }

    fn write(&self, w: &mut SqlWriter, parent: Option<&Scope<'_>>) -> Result<(), QueryBuildError> {
        match self {
            Self::Table(table) => {
                w.ident(table.name());
                if let Some(alias) = table.alias_name() {
                    w.push(" AS ");
                    w.ident(alias);
                }
            }
            Self::Subquery { query, alias } => {
                w.push("(");
                query.write(w, parent)?;
                w.push(") AS ");
                w.ident(alias);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Join {
    kind: JoinKind,
    source: Source,
    on: Option<ExprNode>,
}

/// A SELECT statement.
///
/// Clauses render in the fixed order `SELECT [DISTINCT] ... FROM ... [JOIN ...]
/// [WHERE] [GROUP BY] [HAVING] [ORDER BY] [LIMIT]` regardless of the order the
/// builder methods were called in.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    source: Source,
    joins: Vec<Join>,
    items: Vec<SelectItem>,
    distinct: bool,
    filter: Option<ExprNode>,
    group_by: Vec<ExprNode>,
    having: Option<ExprNode>,
    order_by: Vec<OrderingTerm>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Select {
    pub fn from_table(table: &Table) -> Self {
        Self::with_source(Source::Table(table.clone()))
    }

    /// Selects from a derived table.
    pub fn from_subquery(query: Select, alias: &str) -> Self {
        Self::with_source(Source::Subquery {
            query: Box::new(query),
            alias: alias.into(),
        })
    }

    fn with_source(source: Source) -> Self {
        Self {
            source,
            joins: Vec::new(),
            items: Vec::new(),
            distinct: false,
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Appends an expression to the select list. With no items the
    /// statement selects `*`.
    pub fn column<E: AsExpr>(mut self, expr: E) -> Self {
        self.items.push(SelectItem::new(expr.as_expr().node, None));
        self
    }

    /// Appends `expr AS alias`. The alias is visible to GROUP BY, HAVING and
    /// ORDER BY, and is the name the row reports for the column.
    pub fn column_as<E: AsExpr>(mut self, expr: E, alias: &str) -> Self {
        self.items.push(SelectItem::new(expr.as_expr().node, Some(alias.into())));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Adds a WHERE predicate; repeated calls are combined with AND.
    pub fn filter<P>(mut self, predicate: P) -> Self
    where
        P: AsExpr,
        P::Sql: SqlType<Base = Bool>,
    {
        self.filter = Some(ExprNode::conjoin(self.filter.take(), predicate.as_expr().node));
        self
    }

    pub fn join<P>(mut self, kind: JoinKind, table: &Table, on: P) -> Self
    where
        P: AsExpr,
        P::Sql: SqlType<Base = Bool>,
    {
        self.joins.push(Join {
            kind,
            source: Source::Table(table.clone()),
            on: Some(on.as_expr().node),
        });
        self
    }

    pub fn inner_join<P>(self, table: &Table, on: P) -> Self
    where
        P: AsExpr,
        P::Sql: SqlType<Base = Bool>,
    {
        self.join(JoinKind::Inner, table, on)
    }

    pub fn left_join<P>(self, table: &Table, on: P) -> Self
    where
        P: AsExpr,
        P::Sql: SqlType<Base = Bool>,
    {
        self.join(JoinKind::LeftOuter, table, on)
    }

    pub fn cross_join(mut self, table: &Table) -> Self {
        self.joins.push(Join {
            kind: JoinKind::Cross,
            source: Source::Table(table.clone()),
            on: None,
        });
        self
    }

    /// Joins a derived table under `alias`.
    pub fn join_subquery<P>(mut self, kind: JoinKind, query: Select, alias: &str, on: P) -> Self
    where
        P: AsExpr,
        P::Sql: SqlType<Base = Bool>,
    {
        self.joins.push(Join {
            kind,
            source: Source::Subquery {
                query: Box::new(query),
                alias: alias.into(),
            },
            on: Some(on.as_expr().node),
        });
        self
    }

    pub fn group_by<E: AsExpr>(mut self, expr: E) -> Self {
        self.group_by.push(expr.as_expr().node);
        self
    }

    /// Adds a HAVING predicate; repeated calls are combined with AND.
    pub fn having<P>(mut self, predicate: P) -> Self
    where
        P: AsExpr,
        P::Sql: SqlType<Base = Bool>,
    {
        self.having = Some(ExprNode::conjoin(self.having.take(), predicate.as_expr().node));
        self
    }

    pub fn order_by(mut self, term: OrderingTerm) -> Self {
        self.order_by.push(term);
        self
    }

    pub fn limit(mut self, count: i64) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Output column names, where they are predictable: aliases, bare column
    /// references, and every source column for `SELECT *`.
    pub(crate) fn result_columns(&self) -> Vec<Arc<str>> {
        if self.items.is_empty() {
            let mut columns = self.source.columns().columns;
            for join in &self.joins {
                columns.extend(join.source.columns().columns);
            }
            return columns;
        }
        self.items.iter().filter_map(SelectItem::output_name).collect()
    }

    pub(crate) fn write(&self, w: &mut SqlWriter, parent: Option<&Scope<'_>>) -> Result<(), QueryBuildError> {
        let mut scope = Scope::new(parent);
        scope.add_source(self.source.columns())?;
        for join in &self.joins {
            scope.add_source(join.source.columns())?;
        }

        w.push("SELECT ");
        if self.distinct {
            w.push("DISTINCT ");
        }
        if self.items.is_empty() {
            w.push("*");
        } else {
            w.list(&self.items, |w, item| {
                item.node.write(w, &scope)?;
                if let Some(alias) = &item.alias {
                    w.push(" AS ");
                    w.ident(alias);
                }
                Ok(())
            })?;
        }

        w.push(" FROM ");
        self.source.write(w, parent)?;
        for join in &self.joins {
            w.push(join.kind.as_sql());
            join.source.write(w, parent)?;
            if let Some(on) = &join.on {
                w.push(" ON ");
                on.write(w, &scope)?;
            }
        }

        if let Some(filter) = &self.filter {
            w.push(" WHERE ");
            filter.write(w, &scope)?;
        }

        let aliased = scope.with_aliases(self.items.iter().filter_map(|i| i.alias.clone()).collect());
        if !self.group_by.is_empty() {
            w.push(" GROUP BY ");
            w.list(&self.group_by, |w, node| node.write(w, &aliased))?;
        }
        if let Some(having) = &self.having {
            w.push(" HAVING ");
            having.write(w, &aliased)?;
        }
        if !self.order_by.is_empty() {
            w.push(" ORDER BY ");
            w.list(&self.order_by, |w, term| {
                term.node.write(w, &aliased)?;
                w.push(match term.direction {
                    Direction::Asc => " ASC",
                    Direction::Desc => " DESC",
                });
                Ok(())
            })?;
        }

        match (self.limit, self.offset) {
            (None, None) => {}
            (Some(count), None) => {
                w.push(" LIMIT ");
                w.literal(&Value::Integer(count));
            }
            (count, Some(offset)) => {
                w.push(" LIMIT ");
                w.literal(&Value::Integer(offset));
                w.push(", ");
                w.literal(&Value::Integer(count.unwrap_or(-1)));
            }
        }
        Ok(())
    }
}

impl Render for Select {
    fn render(&self) -> Result<Statement> {
        let mut w = SqlWriter::new();
        self.write(&mut w, None)?;
        Ok(w.finish())
    }
}
