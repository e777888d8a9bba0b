//! Schema definitions.
//!
//! A [`TableDefinition`] is assembled with builder calls and validated once by
//! [`TableDefinition::build`], producing an immutable [`Table`]. Tables hand out
//! typed [`Column`] handles and start every statement that targets them.
//!
//! # Intention
//!
//! - Describe tables the way SQLite sees them: a storage affinity per column,
//!   nullability taken from the column's marker, and constraints in a fixed order.
//! - Reject malformed definitions when the table is built, not when the engine
//!   first sees the DDL.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{QueryBuildError, Result};
use crate::expr::{AsExpr, Column, ExprNode};
use crate::statement::{
    AlterAction, AlterTable, CreateIndex, CreateTable, Delete, DropTable, Insert, Render, Scope,
    Select, SourceColumns, SqlWriter, Statement, Update,
};
use crate::types::{BaseType, Bool, Nullness, SqlType};
use crate::value::Value;

/// Storage affinity of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Text,
    Real,
    Blob,
}

impl DataType {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
            Self::Real => "REAL",
            Self::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnConstraint {
    PrimaryKey { autoincrement: bool },
    Unique,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Integer(i64),
    Text(String),
    Real(f64),
    Blob(Vec<u8>),
    Null,
    CurrentTimestamp,
    CurrentDate,
    CurrentTime,
}

impl DefaultValue {
    fn accepts(&self, data_type: DataType) -> bool {
        match self {
            Self::Integer(_) => matches!(data_type, DataType::Integer | DataType::Real),
            Self::Real(r) => r.is_finite() && data_type == DataType::Real,
            Self::Text(_) | Self::CurrentTimestamp | Self::CurrentDate | Self::CurrentTime => {
                data_type == DataType::Text
            }
            Self::Blob(_) => data_type == DataType::Blob,
            Self::Null => true,
        }
    }

    fn write(&self, w: &mut SqlWriter) {
        match self {
            Self::Integer(i) => w.literal(&Value::Integer(*i)),
            Self::Real(r) => w.literal(&Value::Real(*r)),
            Self::Text(t) => w.literal(&Value::Text(t.clone())),
            Self::Blob(b) => w.literal(&Value::Blob(b.clone())),
            Self::Null => w.push("NULL"),
            Self::CurrentTimestamp => w.push("CURRENT_TIMESTAMP"),
            Self::CurrentDate => w.push("CURRENT_DATE"),
            Self::CurrentTime => w.push("CURRENT_TIME"),
        }
    }
}

/// One declared column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub constraints: Vec<ColumnConstraint>,
    pub default_value: Option<DefaultValue>,
    check: Option<ExprNode>,
    marker: &'static str,
}

impl ColumnDefinition {
    /// A column whose affinity and nullability come from the marker `T`:
    /// `Nullable<Text>` declares a nullable TEXT column, `Text` a NOT NULL one.
    pub fn new<T: SqlType>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: <T::Base as BaseType>::DATA_TYPE,
            nullable: <T::Null as Nullness>::NULLABLE,
            constraints: Vec::new(),
            default_value: None,
            check: None,
            marker: <T::Base as BaseType>::NAME,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.constraints
            .push(ColumnConstraint::PrimaryKey { autoincrement: false });
        self
    }

    /// Marks the primary key AUTOINCREMENT (INTEGER primary keys only).
    pub fn autoincrement(mut self) -> Self {
        let mut found = false;
        for constraint in &mut self.constraints {
            if let ColumnConstraint::PrimaryKey { autoincrement } = constraint {
                *autoincrement = true;
                found = true;
            }
        }
        if !found {
            self.constraints
                .push(ColumnConstraint::PrimaryKey { autoincrement: true });
        }
        self
    }

    pub fn unique(mut self) -> Self {
        self.constraints.push(ColumnConstraint::Unique);
        self
    }

    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Column-level CHECK constraint. Literals in the predicate are rendered
    /// inline because SQLite does not accept parameters in DDL.
    pub fn check<P>(mut self, predicate: P) -> Self
    where
        P: AsExpr,
        P::Sql: SqlType<Base = Bool>,
    {
        self.check = Some(predicate.as_expr().node);
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, ColumnConstraint::PrimaryKey { .. }))
    }

    pub(crate) fn is_unique(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::Unique)
    }

    fn autoincrements(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, ColumnConstraint::PrimaryKey { autoincrement: true }))
    }

    pub(crate) fn validate(&self, table: &str) -> Result<(), QueryBuildError> {
        if self.name.trim().is_empty() {
            return Err(QueryBuildError::InvalidSchema(format!(
                "table \"{table}\" has a column with an empty name"
            )));
        }
        if self.autoincrements() && self.data_type != DataType::Integer {
            return Err(QueryBuildError::InvalidSchema(format!(
                "AUTOINCREMENT on \"{}\" requires an INTEGER primary key",
                self.name
            )));
        }
        if let Some(default) = &self.default_value {
            if *default == DefaultValue::Null && !self.nullable {
                return Err(QueryBuildError::InvalidSchema(format!(
                    "NOT NULL column \"{}\" cannot default to NULL",
                    self.name
                )));
            }
            if !default.accepts(self.data_type) {
                return Err(QueryBuildError::InvalidSchema(format!(
                    "default {default:?} does not fit {} column \"{}\"",
                    self.data_type.as_sql(),
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Writes `"name" TYPE` followed by constraints in the order primary key,
    /// unique, not null, default, check.
    pub(crate) fn write(&self, w: &mut SqlWriter, scope: &Scope<'_>) -> Result<(), QueryBuildError> {
        w.ident(&self.name);
        w.push(" ");
        w.push(self.data_type.as_sql());
        if let Some(autoincrement) = self.constraints.iter().find_map(|c| match c {
            ColumnConstraint::PrimaryKey { autoincrement } => Some(*autoincrement),
            ColumnConstraint::Unique => None,
        }) {
            w.push(" PRIMARY KEY");
            if autoincrement {
                w.push(" AUTOINCREMENT");
            }
        }
        if self.is_unique() {
            w.push(" UNIQUE");
        }
        // An INTEGER primary key aliases the rowid and can never hold NULL.
        // Any other primary key accepts NULL unless told otherwise.
        if !self.nullable && !(self.is_primary_key() && self.data_type == DataType::Integer) {
            w.push(" NOT NULL");
        }
        if let Some(default) = &self.default_value {
            w.push(" DEFAULT ");
            default.write(w);
        }
        if let Some(check) = &self.check {
            w.push(" CHECK (");
            check.write(w, scope)?;
            w.push(")");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
}

impl ForeignKeyAction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::Restrict => "RESTRICT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    pub fn new(
        column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            foreign_table: foreign_table.into(),
            foreign_column: foreign_column.into(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }

    fn write(&self, w: &mut SqlWriter) {
        w.push("FOREIGN KEY (");
        w.ident(&self.column);
        w.push(") REFERENCES ");
        w.ident(&self.foreign_table);
        w.push(" (");
        w.ident(&self.foreign_column);
        w.push(")");
        if self.on_delete != ForeignKeyAction::NoAction {
            w.push(" ON DELETE ");
            w.push(self.on_delete.as_sql());
        }
        if self.on_update != ForeignKeyAction::NoAction {
            w.push(" ON UPDATE ");
            w.push(self.on_update.as_sql());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Builder for a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexDefinition>,
    checks: Vec<ExprNode>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Table-level (possibly composite) primary key.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    /// Table-level CHECK constraint.
    pub fn check<P>(mut self, predicate: P) -> Self
    where
        P: AsExpr,
        P::Sql: SqlType<Base = Bool>,
    {
        self.checks.push(predicate.as_expr().node);
        self
    }

    /// Validates the definition and freezes it into a [`Table`].
    pub fn build(self) -> Result<Table, QueryBuildError> {
        if self.name.trim().is_empty() {
            return Err(QueryBuildError::InvalidSchema(
                "table name is empty".to_string(),
            ));
        }
        if self.columns.is_empty() {
            return Err(QueryBuildError::InvalidSchema(format!(
                "table \"{}\" has no columns",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            column.validate(&self.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(QueryBuildError::DuplicateColumn {
                    context: format!("table \"{}\"", self.name),
                    column: column.name.clone(),
                });
            }
        }

        let column_keys = self.columns.iter().filter(|c| c.is_primary_key()).count();
        if column_keys > 1 {
            return Err(QueryBuildError::InvalidSchema(format!(
                "table \"{}\" declares {column_keys} column primary keys; use a table-level primary key",
                self.name
            )));
        }
        if column_keys == 1 && !self.primary_key.is_empty() {
            return Err(QueryBuildError::InvalidSchema(format!(
                "table \"{}\" declares both a column and a table primary key",
                self.name
            )));
        }
        self.check_columns_exist("primary key", &self.primary_key, &seen)?;

        for fk in &self.foreign_keys {
            if !seen.contains(fk.column.as_str()) {
                return Err(QueryBuildError::UnknownColumn {
                    table: Some(self.name.clone()),
                    column: fk.column.clone(),
                });
            }
        }

        let mut index_names = HashSet::new();
        for index in &self.indexes {
            if !index_names.insert(index.name.as_str()) {
                return Err(QueryBuildError::InvalidSchema(format!(
                    "index \"{}\" declared twice",
                    index.name
                )));
            }
        }

        let table = Table {
            name: self.name.as_str().into(),
            alias: None,
            definition: Arc::new(self),
        };
        // Rendering the DDL resolves CHECK constraints and index columns.
        table.write_create(&mut SqlWriter::ddl(), false)?;
        for index in &table.definition.indexes {
            CreateIndex::new(&table, index.clone()).write(&mut SqlWriter::ddl())?;
        }
        Ok(table)
    }

    fn check_columns_exist(
        &self,
        context: &str,
        columns: &[String],
        declared: &HashSet<&str>,
    ) -> Result<(), QueryBuildError> {
        let mut seen = HashSet::new();
        for column in columns {
            if !declared.contains(column.as_str()) {
                return Err(QueryBuildError::UnknownColumn {
                    table: Some(self.name.clone()),
                    column: column.clone(),
                });
            }
            if !seen.insert(column.as_str()) {
                return Err(QueryBuildError::DuplicateColumn {
                    context: format!("{context} of \"{}\"", self.name),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A validated, immutable table. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: Arc<str>,
    alias: Option<Arc<str>>,
    definition: Arc<TableDefinition>,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name columns of this table are qualified with: the alias if set,
    /// otherwise the table name.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The same table under another name, for self-joins.
    pub fn alias(&self, alias: &str) -> Table {
        Table {
            alias: Some(alias.into()),
            ..self.clone()
        }
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.definition.columns
    }

    pub fn column_definition(&self, name: &str) -> Option<&ColumnDefinition> {
        self.definition.columns.iter().find(|c| c.name == name)
    }

    /// A typed handle to a declared column. Fails if the column does not
    /// exist or was declared with a different marker or nullability than `T`.
    pub fn column<T: SqlType>(&self, name: &str) -> Result<Column<T>, QueryBuildError> {
        let def = self
            .column_definition(name)
            .ok_or_else(|| QueryBuildError::UnknownColumn {
                table: Some(self.name.to_string()),
                column: name.to_string(),
            })?;
        let marker = <T::Base as BaseType>::NAME;
        let nullable = <T::Null as Nullness>::NULLABLE;
        // Bool and Integer share an affinity, so the marker decides.
        if def.marker != marker || def.nullable != nullable {
            return Err(QueryBuildError::ColumnTypeMismatch {
                column: name.to_string(),
                declared: if def.nullable {
                    format!("Nullable<{}>", def.marker)
                } else {
                    def.marker.to_string()
                },
                requested: T::name(),
            });
        }
        Ok(Column::qualified(self.qualifier().into(), def.name.as_str().into()))
    }

    pub fn select(&self) -> Select {
        Select::from_table(self)
    }

    pub fn insert(&self) -> Insert {
        Insert::into_table(self)
    }

    pub fn update(&self) -> Update {
        Update::table(self)
    }

    pub fn delete(&self) -> Delete {
        Delete::from_table(self)
    }

    pub fn create(&self) -> CreateTable {
        CreateTable::new(self)
    }

    pub fn drop_table(&self) -> DropTable {
        DropTable::new(self.name())
    }

    pub fn alter(&self, action: AlterAction) -> AlterTable {
        AlterTable::new(self, action)
    }

    /// CREATE INDEX statements for every index declared on the table.
    pub fn create_indexes(&self) -> Vec<CreateIndex> {
        self.definition
            .indexes
            .iter()
            .map(|index| CreateIndex::new(self, index.clone()))
            .collect()
    }

    pub(crate) fn source_columns(&self) -> SourceColumns {
        SourceColumns::new(
            self.qualifier().into(),
            self.definition
                .columns
                .iter()
                .map(|c| Arc::from(c.name.as_str()))
                .collect(),
        )
    }

    /// Scope for statements that target this table directly. Both the bare
    /// table name and the alias resolve.
    pub(crate) fn target_scope(&self) -> Scope<'static> {
        let mut source = self.source_columns();
        if self.alias.is_some() {
            source.alternate = Some(self.name.clone());
        }
        Scope::from_sources(vec![source])
    }

    pub(crate) fn write_create(&self, w: &mut SqlWriter, if_not_exists: bool) -> Result<(), QueryBuildError> {
        let definition = &self.definition;
        let scope = self.target_scope();
        w.push("CREATE TABLE ");
        if if_not_exists {
            w.push("IF NOT EXISTS ");
        }
        w.ident(&self.name);
        w.push(" (");
        w.list(&definition.columns, |w, column| column.write(w, &scope))?;
        if !definition.primary_key.is_empty() {
            w.push(", PRIMARY KEY (");
            w.list(&definition.primary_key, |w, column| {
                w.ident(column);
                Ok(())
            })?;
            w.push(")");
        }
        for fk in &definition.foreign_keys {
            w.push(", ");
            fk.write(w);
        }
        for check in &definition.checks {
            w.push(", CHECK (");
            check.write(w, &scope)?;
            w.push(")");
        }
        w.push(")");
        Ok(())
    }
}

/// Schema definition for the SQLite database
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub tables: Vec<Table>,
}

impl Schema {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    pub fn add_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// CREATE TABLE / CREATE INDEX statements, all guarded with IF NOT EXISTS,
    /// in declaration order.
    pub fn statements(&self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        for table in &self.tables {
            statements.push(table.create().if_not_exists().render()?);
            for index in table.create_indexes() {
                statements.push(index.if_not_exists().render()?);
            }
        }
        Ok(statements)
    }
}
