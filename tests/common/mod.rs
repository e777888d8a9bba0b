#![allow(dead_code)]

use std::sync::Once;

use tempfile::NamedTempFile;
use typed_sqlite::prelude::*;

static TRACING: Once = Once::new();

// Installs a test subscriber once; RUST_LOG controls the output.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn users_table() -> Table {
    TableDefinition::new("users")
        .column(ColumnDefinition::new::<Integer>("id").primary_key())
        .column(ColumnDefinition::new::<Nullable<Text>>("name"))
        .column(ColumnDefinition::new::<Text>("email").unique())
        .column(ColumnDefinition::new::<Nullable<Integer>>("age"))
        .index(IndexDefinition::new("idx_users_name", ["name"]))
        .build()
        .expect("users table is valid")
}

pub fn posts_table() -> Table {
    TableDefinition::new("posts")
        .column(ColumnDefinition::new::<Integer>("id").primary_key().autoincrement())
        .column(ColumnDefinition::new::<Integer>("user_id"))
        .column(ColumnDefinition::new::<Text>("title"))
        .column(ColumnDefinition::new::<Real>("score").default(DefaultValue::Real(0.0)))
        .foreign_key(ForeignKey::new("user_id", "users", "id").on_delete(ForeignKeyAction::Cascade))
        .build()
        .expect("posts table is valid")
}

pub fn schema() -> Schema {
    Schema::new().add_table(users_table()).add_table(posts_table())
}

// Helper function to create an in-memory database for testing
pub fn create_test_db() -> Result<Connection> {
    init_tracing();
    Connection::open_with_config(&SqliteConfig::in_memory().with_schema(schema()))
}

// Helper function to create a temporary file-based database
pub fn create_temp_db() -> Result<(Connection, NamedTempFile)> {
    init_tracing();
    let temp_file = NamedTempFile::new().expect("temp file");
    let path = temp_file.path().to_str().expect("utf-8 temp path").to_string();
    let conn = Connection::open_with_config(&SqliteConfig::new(path, schema()))?;
    Ok((conn, temp_file))
}

pub fn insert_user(conn: &Connection, name: &str, email: &str, age: Option<i64>) -> Result<i64> {
    let users = users_table();
    let result = conn.execute(users.insert().values([
        users.column::<Nullable<Text>>("name")?.to(Some(name)),
        users.column::<Text>("email")?.to(email),
        users.column::<Nullable<Integer>>("age")?.to(age),
    ]))?;
    Ok(result.last_insert_rowid)
}

pub fn count_rows(conn: &Connection, table: &Table) -> Result<i64> {
    conn.scalar(table.select().column(count_star()))
}
