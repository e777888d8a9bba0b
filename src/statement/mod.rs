//! Statement rendering.
//!
//! Builders ([`Select`], [`Insert`], [`Update`], [`Delete`] and the schema
//! statements) render through [`Render`] into a [`Statement`]: SQL text with
//! `?` placeholders plus the values bound to them, in the order they appear in
//! the text. Rendering is deterministic and validates every column reference
//! against the sources visible to the statement before the engine is touched.

use std::fmt;
use std::sync::Arc;

use crate::error::{QueryBuildError, Result};
use crate::value::Value;

mod ddl;
mod dml;
mod select;

pub use ddl::{AlterAction, AlterTable, CreateIndex, CreateTable, DropIndex, DropTable};
pub use dml::{Assignment, ConflictPolicy, Delete, Insert, Update};
pub use select::{Direction, JoinKind, OrderingTerm, Select};

/// A rendered statement: SQL text and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    /// Wraps hand-written SQL. The escape hatch for anything the builders do
    /// not cover; `params` bind to `?` placeholders in order.
    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Anything that renders to a [`Statement`].
pub trait Render {
    fn render(&self) -> Result<Statement>;
}

impl Render for Statement {
    fn render(&self) -> Result<Statement> {
        Ok(self.clone())
    }
}

impl<R: Render + ?Sized> Render for &R {
    fn render(&self) -> Result<Statement> {
        (**self).render()
    }
}

/// Accumulates SQL text and bound parameters.
pub(crate) struct SqlWriter {
    sql: String,
    params: Vec<Value>,
    inline_literals: bool,
}

impl SqlWriter {
    pub(crate) fn new() -> Self {
        Self {
            sql: String::with_capacity(128),
            params: Vec::new(),
            inline_literals: false,
        }
    }

    /// Writer for schema statements. SQLite rejects parameters in DDL, so
    /// literals (defaults, CHECK operands) are written as escaped SQL literals.
    pub(crate) fn ddl() -> Self {
        Self {
            inline_literals: true,
            ..Self::new()
        }
    }

    pub(crate) fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Writes a double-quoted identifier.
    pub(crate) fn ident(&mut self, name: &str) {
        self.sql.push('"');
        for c in name.chars() {
            if c == '"' {
                self.sql.push('"');
            }
            self.sql.push(c);
        }
        self.sql.push('"');
    }

    pub(crate) fn qualified(&mut self, table: Option<&str>, column: &str) {
        if let Some(table) = table {
            self.ident(table);
            self.sql.push('.');
        }
        self.ident(column);
    }

    pub(crate) fn literal(&mut self, value: &Value) {
        if self.inline_literals {
            write_inline_literal(&mut self.sql, value);
        } else {
            self.sql.push('?');
            self.params.push(value.clone());
        }
    }

    /// Writes `items` separated by `, `.
    pub(crate) fn list<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        mut write: impl FnMut(&mut Self, T) -> Result<(), QueryBuildError>,
    ) -> Result<(), QueryBuildError> {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            write(self, item)?;
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

pub(crate) fn write_inline_literal(sql: &mut String, value: &Value) {
    match value {
        Value::Null => sql.push_str("NULL"),
        Value::Integer(i) => sql.push_str(&i.to_string()),
        Value::Real(r) => sql.push_str(&format!("{r:?}")),
        Value::Text(t) => {
            sql.push('\'');
            sql.push_str(&t.replace('\'', "''"));
            sql.push('\'');
        }
        Value::Blob(b) => {
            sql.push_str("X'");
            for byte in b {
                sql.push_str(&format!("{byte:02X}"));
            }
            sql.push('\'');
        }
    }
}

/// Columns one source exposes under one qualifier.
#[derive(Debug, Clone)]
pub(crate) struct SourceColumns {
    pub(crate) qualifier: Arc<str>,
    /// Second name the same source answers to, such as the bare table name
    /// of an aliased UPDATE or DELETE target.
    pub(crate) alternate: Option<Arc<str>>,
    pub(crate) columns: Vec<Arc<str>>,
}

impl SourceColumns {
    pub(crate) fn new(qualifier: Arc<str>, columns: Vec<Arc<str>>) -> Self {
        Self {
            qualifier,
            alternate: None,
            columns,
        }
    }

    fn answers_to(&self, qualifier: &str) -> bool {
        &*self.qualifier == qualifier || self.alternate.as_deref() == Some(qualifier)
    }

    fn has(&self, column: &str) -> bool {
        self.columns.iter().any(|c| &**c == column)
    }
}

/// Name-resolution scope for column references. Subqueries chain to the
/// enclosing scope so correlated references resolve.
#[derive(Debug, Default)]
pub(crate) struct Scope<'p> {
    sources: Vec<SourceColumns>,
    aliases: Vec<Arc<str>>,
    parent: Option<&'p Scope<'p>>,
}

impl<'p> Scope<'p> {
    pub(crate) fn new(parent: Option<&'p Scope<'p>>) -> Self {
        Self {
            sources: Vec::new(),
            aliases: Vec::new(),
            parent,
        }
    }

    /// A top-level scope over sources already known to be distinct.
    pub(crate) fn from_sources(sources: Vec<SourceColumns>) -> Scope<'static> {
        Scope {
            sources,
            aliases: Vec::new(),
            parent: None,
        }
    }

    pub(crate) fn add_source(&mut self, source: SourceColumns) -> Result<(), QueryBuildError> {
        if self.sources.iter().any(|s| s.qualifier == source.qualifier) {
            return Err(QueryBuildError::DuplicateSource(source.qualifier.to_string()));
        }
        self.sources.push(source);
        Ok(())
    }

    pub(crate) fn with_aliases(&self, aliases: Vec<Arc<str>>) -> Scope<'p> {
        Scope {
            sources: self.sources.clone(),
            aliases,
            parent: self.parent,
        }
    }

    pub(crate) fn resolve(&self, table: Option<&str>, column: &str) -> Result<(), QueryBuildError> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            match table {
                Some(qualifier) => {
                    if let Some(source) = current.sources.iter().find(|s| s.answers_to(qualifier)) {
                        if source.has(column) {
                            return Ok(());
                        }
                        return Err(QueryBuildError::UnknownColumn {
                            table: Some(qualifier.to_string()),
                            column: column.to_string(),
                        });
                    }
                }
                None => {
                    if current.aliases.iter().any(|a| &**a == column) {
                        return Ok(());
                    }
                    match current.sources.iter().filter(|s| s.has(column)).count() {
                        0 => {}
                        1 => return Ok(()),
                        _ => return Err(QueryBuildError::AmbiguousColumn(column.to_string())),
                    }
                }
            }
            scope = current.parent;
        }
        Err(match table {
            Some(qualifier) => QueryBuildError::UnknownSource(qualifier.to_string()),
            None => QueryBuildError::UnknownColumn {
                table: None,
                column: column.to_string(),
            },
        })
    }
}
