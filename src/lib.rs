//! Typed SQL statement construction and execution over SQLite.
//!
//! # Intention
//!
//! - Build SELECT, INSERT, UPDATE, DELETE and schema statements from typed
//!   expression trees, so that comparing or combining incompatible SQL types
//!   fails to compile.
//! - Render every statement deterministically, with quoted identifiers and `?`
//!   placeholders, and reject unknown columns before the engine sees the text.
//! - Run rendered statements through a per-connection statement cache and
//!   decode rows into host types with explicit, typed errors.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite/database code belongs here.
//! - No connection pooling, migrations or ORM-style object mapping.
//!
//! ```
//! use typed_sqlite::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let users = TableDefinition::new("users")
//!     .column(ColumnDefinition::new::<Integer>("id").primary_key())
//!     .column(ColumnDefinition::new::<Text>("name"))
//!     .column(ColumnDefinition::new::<Nullable<Integer>>("age"))
//!     .build()?;
//! let conn = Connection::open_with_config(
//!     &SqliteConfig::in_memory().with_schema(Schema::new().add_table(users.clone())),
//! )?;
//!
//! let name = users.column::<Text>("name")?;
//! let age = users.column::<Nullable<Integer>>("age")?;
//! conn.execute(users.insert().values([name.to("ada"), age.to(Some(36))]))?;
//!
//! let adults: Vec<(String,)> = conn.fetch_all(
//!     users.select().column(&name).filter(age.ge(18)),
//! )?;
//! assert_eq!(adults, vec![("ada".to_string(),)]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod expr;
pub mod prelude;
pub mod row;
pub mod schema;
pub mod statement;
pub mod transaction;
pub mod types;
pub mod value;

pub use config::SqliteConfig;
pub use connection::Connection;
pub use error::{Error, Result};
pub use transaction::Transaction;
pub use value::Value;
