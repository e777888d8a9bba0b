//! Glob-importable names for everyday use.

pub use crate::config::{JournalMode, SqliteConfig, TransactionBehavior};
pub use crate::connection::{Connection, Cursor, ExecuteResult, Prepared, StatementId, StepResult};
pub use crate::error::{DecodeError, Error, QueryBuildError, Result};
pub use crate::expr::func::*;
pub use crate::expr::{col, exists, sql, AsExpr, Column, Expr, ExprOps};
pub use crate::row::{FromRow, Row};
pub use crate::schema::{
    ColumnDefinition, DataType, DefaultValue, ForeignKey, ForeignKeyAction, IndexDefinition, Schema, Table,
    TableDefinition,
};
pub use crate::statement::{
    AlterAction, ConflictPolicy, DropIndex, JoinKind, Render, Select, Statement,
};
pub use crate::transaction::Transaction;
pub use crate::types::{Blob, Bool, Integer, Nullable, Real, SqlType, Text};
pub use crate::value::{FromValue, StorageClass, ToValue, Value};
