use std::collections::HashSet;
use std::sync::Arc;

use super::{Render, Scope, SqlWriter, Statement};
use crate::error::{QueryBuildError, Result};
use crate::schema::{ColumnDefinition, DefaultValue, IndexDefinition, Table};

/// `CREATE TABLE` for a built [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    table: Table,
    if_not_exists: bool,
}

impl CreateTable {
    pub fn new(table: &Table) -> Self {
        Self {
            table: table.clone(),
            if_not_exists: false,
        }
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }
}

impl Render for CreateTable {
    fn render(&self) -> Result<Statement> {
        let mut w = SqlWriter::ddl();
        self.table.write_create(&mut w, self.if_not_exists)?;
        Ok(w.finish())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    table: Table,
    index: IndexDefinition,
    if_not_exists: bool,
}

impl CreateIndex {
    pub fn new(table: &Table, index: IndexDefinition) -> Self {
        Self {
            table: table.clone(),
            index,
            if_not_exists: false,
        }
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub(crate) fn write(&self, w: &mut SqlWriter) -> Result<(), QueryBuildError> {
        if self.index.columns.is_empty() {
            return Err(QueryBuildError::EmptyColumnList("CREATE INDEX"));
        }
        let mut seen = HashSet::new();
        for column in &self.index.columns {
            if self.table.column_definition(column).is_none() {
                return Err(QueryBuildError::UnknownColumn {
                    table: Some(self.table.name().to_string()),
                    column: column.clone(),
                });
            }
            if !seen.insert(column.as_str()) {
                return Err(QueryBuildError::DuplicateColumn {
                    context: format!("index \"{}\"", self.index.name),
                    column: column.clone(),
                });
            }
        }

        w.push("CREATE ");
        if self.index.unique {
            w.push("UNIQUE ");
        }
        w.push("INDEX ");
        if self.if_not_exists {
            w.push("IF NOT EXISTS ");
        }
        w.ident(&self.index.name);
        w.push(" ON ");
        w.ident(self.table.name());
        w.push(" (");
        w.list(&self.index.columns, |w, column| {
            w.ident(column);
            Ok(())
        })?;
        w.push(")");
        Ok(())
    }
}

impl Render for CreateIndex {
    fn render(&self) -> Result<Statement> {
        let mut w = SqlWriter::ddl();
        self.write(&mut w)?;
        Ok(w.finish())
    }
}

/// The change an [`AlterTable`] makes.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    RenameTo(String),
    RenameColumn { from: String, to: String },
    /// The column may not be a primary key or unique, and a NOT NULL column
    /// needs a non-NULL default so existing rows stay valid.
    AddColumn(ColumnDefinition),
    DropColumn(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterTable {
    table: Table,
    action: AlterAction,
}

impl AlterTable {
    pub fn new(table: &Table, action: AlterAction) -> Self {
        Self {
            table: table.clone(),
            action,
        }
    }

    fn require_column(&self, name: &str) -> Result<&ColumnDefinition, QueryBuildError> {
        self.table
            .column_definition(name)
            .ok_or_else(|| QueryBuildError::UnknownColumn {
                table: Some(self.table.name().to_string()),
                column: name.to_string(),
            })
    }

    fn reject_existing(&self, name: &str) -> Result<(), QueryBuildError> {
        if self.table.column_definition(name).is_some() {
            return Err(QueryBuildError::DuplicateColumn {
                context: format!("table \"{}\"", self.table.name()),
                column: name.to_string(),
            });
        }
        Ok(())
    }

    fn check_added(&self, column: &ColumnDefinition) -> Result<(), QueryBuildError> {
        self.reject_existing(&column.name)?;
        column.validate(self.table.name())?;
        if column.is_primary_key() || column.is_unique() {
            return Err(QueryBuildError::InvalidSchema(format!(
                "cannot add PRIMARY KEY or UNIQUE column \"{}\" to an existing table",
                column.name
            )));
        }
        let has_default = matches!(&column.default_value, Some(d) if *d != DefaultValue::Null);
        if !column.nullable && !has_default {
            return Err(QueryBuildError::InvalidSchema(format!(
                "NOT NULL column \"{}\" needs a non-NULL default to be added",
                column.name
            )));
        }
        Ok(())
    }
}

impl Render for AlterTable {
    fn render(&self) -> Result<Statement> {
        let mut w = SqlWriter::ddl();
        w.push("ALTER TABLE ");
        w.ident(self.table.name());
        match &self.action {
            AlterAction::RenameTo(name) => {
                if name.trim().is_empty() {
                    return Err(QueryBuildError::InvalidSchema("table name is empty".to_string()).into());
                }
                w.push(" RENAME TO ");
                w.ident(name);
            }
            AlterAction::RenameColumn { from, to } => {
                self.require_column(from)?;
                if to.trim().is_empty() {
                    return Err(QueryBuildError::InvalidSchema(format!(
                        "new name for \"{from}\" is empty"
                    ))
                    .into());
                }
                self.reject_existing(to)?;
                w.push(" RENAME COLUMN ");
                w.ident(from);
                w.push(" TO ");
                w.ident(to);
            }
            AlterAction::AddColumn(column) => {
                self.check_added(column)?;
                let mut source = self.table.source_columns();
                source.qualifier = Arc::from(self.table.name());
                source.columns.push(Arc::from(column.name.as_str()));
                let scope = Scope::from_sources(vec![source]);
                w.push(" ADD COLUMN ");
                column.write(&mut w, &scope)?;
            }
            AlterAction::DropColumn(name) => {
                let column = self.require_column(name)?;
                if column.is_primary_key() || column.is_unique() {
                    return Err(QueryBuildError::InvalidSchema(format!(
                        "cannot drop PRIMARY KEY or UNIQUE column \"{name}\""
                    ))
                    .into());
                }
                if self.table.columns().len() == 1 {
                    return Err(QueryBuildError::InvalidSchema(format!(
                        "cannot drop \"{name}\", the only column of \"{}\"",
                        self.table.name()
                    ))
                    .into());
                }
                w.push(" DROP COLUMN ");
                w.ident(name);
            }
        }
        Ok(w.finish())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTable {
    name: String,
    if_exists: bool,
}

impl DropTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            if_exists: false,
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }
}

impl Render for DropTable {
    fn render(&self) -> Result<Statement> {
        Ok(write_drop("TABLE", &self.name, self.if_exists))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropIndex {
    name: String,
    if_exists: bool,
}

impl DropIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            if_exists: false,
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }
}

impl Render for DropIndex {
    fn render(&self) -> Result<Statement> {
        Ok(write_drop("INDEX", &self.name, self.if_exists))
    }
}

fn write_drop(kind: &str, name: &str, if_exists: bool) -> Statement {
    let mut w = SqlWriter::ddl();
    w.push("DROP ");
    w.push(kind);
    if if_exists {
        w.push(" IF EXISTS");
    }
    w.push(" ");
    w.ident(name);
    w.finish()
}
