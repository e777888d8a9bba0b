use std::collections::HashSet;
use std::sync::Arc;

use super::{Render, Scope, SqlWriter, Statement};
use crate::error::{QueryBuildError, Result};
use crate::expr::{AsExpr, ExprNode};
use crate::schema::Table;
use crate::types::{Bool, SqlType};

/// `column = value`, produced by [`Column::to`](crate::expr::Column::to).
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    table: Option<Arc<str>>,
    column: Arc<str>,
    value: ExprNode,
}

impl Assignment {
    pub(crate) fn new(table: Option<Arc<str>>, column: Arc<str>, value: ExprNode) -> Self {
        Self {
            table,
            column,
            value,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Checks the assignment targets `table` and returns the column's
    /// declaration index.
    fn position(&self, table: &Table) -> Result<usize, QueryBuildError> {
        if let Some(qualifier) = self.table.as_deref() {
            if qualifier != table.qualifier() && qualifier != table.name() {
                return Err(QueryBuildError::UnknownSource(qualifier.to_string()));
            }
        }
        table
            .columns()
            .iter()
            .position(|c| c.name == *self.column)
            .ok_or_else(|| QueryBuildError::UnknownColumn {
                table: Some(table.name().to_string()),
                column: self.column.to_string(),
            })
    }
}

/// What the engine does when an INSERT or UPDATE violates a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    #[default]
    Abort,
    Fail,
    Ignore,
    Replace,
    Rollback,
}

impl ConflictPolicy {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Abort => " OR ABORT",
            Self::Fail => " OR FAIL",
            Self::Ignore => " OR IGNORE",
            Self::Replace => " OR REPLACE",
            Self::Rollback => " OR ROLLBACK",
        }
    }
}

fn write_conflict(w: &mut SqlWriter, policy: Option<ConflictPolicy>) {
    if let Some(policy) = policy {
        w.push(policy.as_sql());
    }
}

fn write_target(w: &mut SqlWriter, table: &Table) {
    w.ident(table.name());
    if let Some(alias) = table.alias_name() {
        w.push(" AS ");
        w.ident(alias);
    }
}

/// An INSERT statement. Each call to [`values`](Insert::values) adds one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    table: Table,
    rows: Vec<Vec<Assignment>>,
    conflict: Option<ConflictPolicy>,
}

impl Insert {
    pub fn into_table(table: &Table) -> Self {
        Self {
            table: table.clone(),
            rows: Vec::new(),
            conflict: None,
        }
    }

    pub fn values<I>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = Assignment>,
    {
        self.rows.push(row.into_iter().collect());
        self
    }

    pub fn on_conflict(mut self, policy: ConflictPolicy) -> Self {
        self.conflict = Some(policy);
        self
    }

    pub fn or_replace(self) -> Self {
        self.on_conflict(ConflictPolicy::Replace)
    }

    pub fn or_ignore(self) -> Self {
        self.on_conflict(ConflictPolicy::Ignore)
    }

    /// Sorts one row into column-declaration order.
    fn ordered_row<'a>(&self, row: &'a [Assignment]) -> Result<Vec<(usize, &'a Assignment)>, QueryBuildError> {
        let mut ordered = Vec::with_capacity(row.len());
        let mut seen = HashSet::new();
        for assignment in row {
            let position = assignment.position(&self.table)?;
            if !seen.insert(position) {
                return Err(QueryBuildError::DuplicateColumn {
                    context: format!("INSERT into \"{}\"", self.table.name()),
                    column: assignment.column.to_string(),
                });
            }
            ordered.push((position, assignment));
        }
        ordered.sort_by_key(|(position, _)| *position);
        Ok(ordered)
    }
}

impl Render for Insert {
    fn render(&self) -> Result<Statement> {
        let mut w = SqlWriter::new();
        w.push("INSERT");
        write_conflict(&mut w, self.conflict);
        w.push(" INTO ");
        w.ident(self.table.name());

        let rows = self
            .rows
            .iter()
            .map(|row| self.ordered_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        let Some(first) = rows.first().filter(|row| !row.is_empty()) else {
            if let Some(row) = rows.iter().position(|row| !row.is_empty()) {
                return Err(QueryBuildError::InsertColumnMismatch { row }.into());
            }
            if rows.len() > 1 {
                return Err(QueryBuildError::EmptyColumnList("multi-row INSERT").into());
            }
            w.push(" DEFAULT VALUES");
            return Ok(w.finish());
        };

        let positions: Vec<usize> = first.iter().map(|(p, _)| *p).collect();
        for (i, row) in rows.iter().enumerate().skip(1) {
            if !row.iter().map(|(p, _)| *p).eq(positions.iter().copied()) {
                return Err(QueryBuildError::InsertColumnMismatch { row: i }.into());
            }
        }

        w.push(" (");
        w.list(first, |w, (_, assignment)| {
            w.ident(&assignment.column);
            Ok(())
        })?;
        w.push(") VALUES ");

        // Values cannot refer to columns of the row being inserted.
        let scope = Scope::new(None);
        w.list(&rows, |w, row| {
            w.push("(");
            w.list(row, |w, (_, assignment)| assignment.value.write(w, &scope))?;
            w.push(")");
            Ok(())
        })?;
        Ok(w.finish())
    }
}

/// An UPDATE statement. Renders only with a filter or an explicit
/// [`all_rows`](Update::all_rows).
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    table: Table,
    assignments: Vec<Assignment>,
    filter: Option<ExprNode>,
    all_rows: bool,
    conflict: Option<ConflictPolicy>,
}

impl Update {
    pub fn table(table: &Table) -> Self {
        Self {
            table: table.clone(),
            assignments: Vec::new(),
            filter: None,
            all_rows: false,
            conflict: None,
        }
    }

    pub fn set(mut self, assignment: Assignment) -> Self {
        self.assignments.push(assignment);
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

    /// Allows the statement to touch every row of the table.
    pub fn all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }

    pub fn on_conflict(mut self, policy: ConflictPolicy) -> Self {
        self.conflict = Some(policy);
        self
    }

    pub fn or_replace(self) -> Self {
        self.on_conflict(ConflictPolicy::Replace)
    }

    pub fn or_ignore(self) -> Self {
        self.on_conflict(ConflictPolicy::Ignore)
    }
}

impl Render for Update {
    fn render(&self) -> Result<Statement> {
        if self.assignments.is_empty() {
            return Err(QueryBuildError::EmptyUpdate(self.table.name().to_string()).into());
        }
        if self.filter.is_none() && !self.all_rows {
            return Err(QueryBuildError::MissingFilter("UPDATE").into());
        }

        let scope = self.table.target_scope();
        let mut seen = HashSet::new();
        for assignment in &self.assignments {
            let position = assignment.position(&self.table)?;
            if !seen.insert(position) {
                return Err(QueryBuildError::DuplicateColumn {
                    context: format!("UPDATE of \"{}\"", self.table.name()),
                    column: assignment.column.to_string(),
                }
                .into());
            }
        }

        let mut w = SqlWriter::new();
        w.push("UPDATE");
        write_conflict(&mut w, self.conflict);
        w.push(" ");
        write_target(&mut w, &self.table);
        w.push(" SET ");
        w.list(&self.assignments, |w, assignment| {
            w.ident(&assignment.column);
            w.push(" = ");
            assignment.value.write(w, &scope)
        })?;
        if let Some(filter) = &self.filter {
            w.push(" WHERE ");
            filter.write(&mut w, &scope)?;
        }
        Ok(w.finish())
    }
}

/// A DELETE statement. Renders only with a filter or an explicit
/// [`all_rows`](Delete::all_rows).
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    table: Table,
    filter: Option<ExprNode>,
    all_rows: bool,
}

impl Delete {
    pub fn from_table(table: &Table) -> Self {
        Self {
            table: table.clone(),
            filter: None,
            all_rows: false,
        }
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

    pub fn all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }
}

impl Render for Delete {
    fn render(&self) -> Result<Statement> {
        let mut w = SqlWriter::new();
        w.push("DELETE FROM ");
        write_target(&mut w, &self.table);
        match &self.filter {
            Some(filter) => {
                w.push(" WHERE ");
                filter.write(&mut w, &self.table.target_scope())?;
            }
            None if self.all_rows => {}
            None => return Err(QueryBuildError::MissingFilter("DELETE").into()),
        }
        Ok(w.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::expr::{col, ExprOps};
    use crate::schema::{ColumnDefinition, TableDefinition};
    use crate::types::{Integer, Nullable, Real, Text};
    use crate::value::Value;

    fn accounts() -> Table {
        TableDefinition::new("accounts")
            .column(ColumnDefinition::new::<Integer>("id").primary_key())
            .column(ColumnDefinition::new::<Text>("owner"))
            .column(ColumnDefinition::new::<Real>("balance"))
            .column(ColumnDefinition::new::<Nullable<Text>>("note"))
            .build()
            .unwrap()
    }

    fn build_error(result: Result<Statement>) -> QueryBuildError {
        match result {
            Err(Error::QueryBuild(err)) => err,
            other => panic!("expected a build error, got {other:?}"),
        }
    }

    #[test]
    fn insert_orders_columns_by_declaration() {
        let t = accounts();
        let owner = t.column::<Text>("owner").unwrap();
        let balance = t.column::<Real>("balance").unwrap();
        let stmt = t
            .insert()
            .values([balance.to(10.5), owner.to("ann")])
            .values([owner.to("bob"), balance.to(0.0)])
            .render()
            .unwrap();
        assert_eq!(
            stmt.sql(),
            "INSERT INTO \"accounts\" (\"owner\", \"balance\") VALUES (?, ?), (?, ?)"
        );
        assert_eq!(
            stmt.params(),
            &[
                Value::Text("ann".into()),
                Value::Real(10.5),
                Value::Text("bob".into()),
                Value::Real(0.0),
            ]
        );
    }

    #[test]
    fn insert_conflict_policy_is_a_rendering_flag() {
        let t = accounts();
        let id = t.column::<Integer>("id").unwrap();
        let replace = t.insert().or_replace().values([id.to(1)]).render().unwrap();
        assert_eq!(replace.sql(), "INSERT OR REPLACE INTO \"accounts\" (\"id\") VALUES (?)");
        let ignore = t.insert().or_ignore().values([id.to(1)]).render().unwrap();
        assert_eq!(ignore.sql(), "INSERT OR IGNORE INTO \"accounts\" (\"id\") VALUES (?)");
    }

    #[test]
    fn insert_without_rows_uses_defaults() {
        let stmt = accounts().insert().render().unwrap();
        assert_eq!(stmt.sql(), "INSERT INTO \"accounts\" DEFAULT VALUES");
        assert!(stmt.params().is_empty());
    }

    #[test]
    fn insert_rows_must_agree() {
        let t = accounts();
        let owner = t.column::<Text>("owner").unwrap();
        let balance = t.column::<Real>("balance").unwrap();
        let err = build_error(
            t.insert()
                .values([owner.to("ann"), balance.to(1.0)])
                .values([owner.to("bob")])
                .render(),
        );
        assert_eq!(err, QueryBuildError::InsertColumnMismatch { row: 1 });

        let err = build_error(t.insert().values([owner.to("a"), owner.to("b")]).render());
        assert!(matches!(err, QueryBuildError::DuplicateColumn { .. }));
    }

    #[test]
    fn insert_rejects_foreign_columns() {
        let t = accounts();
        let err = build_error(t.insert().values([col::<Text>("nope").to("x")]).render());
        assert!(matches!(err, QueryBuildError::UnknownColumn { .. }));

        let other = TableDefinition::new("other")
            .column(ColumnDefinition::new::<Text>("owner"))
            .build()
            .unwrap();
        let foreign = other.column::<Text>("owner").unwrap();
        let err = build_error(t.insert().values([foreign.to("x")]).render());
        assert_eq!(err, QueryBuildError::UnknownSource("other".into()));
    }

    #[test]
    fn update_renders_set_and_where() {
        let t = accounts();
        let id = t.column::<Integer>("id").unwrap();
        let balance = t.column::<Real>("balance").unwrap();
        let note = t.column::<Nullable<Text>>("note").unwrap();
        let stmt = t
            .update()
            .set(balance.to(&balance + 5))
            .set(note.to(None::<String>))
            .filter(id.eq(3))
            .render()
            .unwrap();
        assert_eq!(
            stmt.sql(),
            "UPDATE \"accounts\" SET \"balance\" = (\"accounts\".\"balance\" + ?), \"note\" = ? \
             WHERE (\"accounts\".\"id\" = ?)"
        );
        assert_eq!(
            stmt.params(),
            &[Value::Integer(5), Value::Null, Value::Integer(3)]
        );
    }

    #[test]
    fn update_and_delete_require_a_filter() {
        let t = accounts();
        let balance = t.column::<Real>("balance").unwrap();
        let err = build_error(t.update().set(balance.to(0.0)).render());
        assert_eq!(err, QueryBuildError::MissingFilter("UPDATE"));
        let err = build_error(t.delete().render());
        assert_eq!(err, QueryBuildError::MissingFilter("DELETE"));

        let all = t.update().set(balance.to(0.0)).all_rows().render().unwrap();
        assert_eq!(all.sql(), "UPDATE \"accounts\" SET \"balance\" = ?");
        let all = t.delete().all_rows().render().unwrap();
        assert_eq!(all.sql(), "DELETE FROM \"accounts\"");
    }

    #[test]
    fn empty_update_is_rejected() {
        let err = build_error(accounts().update().all_rows().render());
        assert_eq!(err, QueryBuildError::EmptyUpdate("accounts".into()));
    }

    #[test]
    fn delete_through_alias() {
        let a = accounts().alias("a");
        let owner = a.column::<Text>("owner").unwrap();
        let stmt = a.delete().filter(owner.like("x%")).render().unwrap();
        assert_eq!(
            stmt.sql(),
            "DELETE FROM \"accounts\" AS \"a\" WHERE (\"a\".\"owner\" LIKE ?)"
        );
    }
}
