//! Connection configuration.

use serde::{Deserialize, Serialize};

use crate::schema::Schema;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 16;

/// Journal mode applied when the connection opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Delete,
    Wal,
    Memory,
}

impl JournalMode {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Wal => "WAL",
            Self::Memory => "MEMORY",
        }
    }
}

/// How the outermost transaction acquires its locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionBehavior {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl TransactionBehavior {
    pub(crate) fn begin_sql(self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED",
            Self::Immediate => "BEGIN IMMEDIATE",
            Self::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// SQLite connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub db_path: String,
    /// How long a statement waits on a locked database before failing as busy
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub foreign_keys: bool,
    /// Left at the engine default when unset
    #[serde(default)]
    pub journal_mode: Option<JournalMode>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub transaction_behavior: TransactionBehavior,
    /// Initial size of the prepared-statement cache; it grows on demand
    #[serde(default = "default_statement_cache_capacity")]
    pub statement_cache_capacity: usize,
    /// Schema definition for the database
    #[serde(skip)]
    pub schema: Schema,
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

fn default_statement_cache_capacity() -> usize {
    DEFAULT_STATEMENT_CACHE_CAPACITY
}

impl SqliteConfig {
    /// Create a new SQLite config with path and schema
    pub fn new(db_path: impl Into<String>, schema: Schema) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
            journal_mode: None,
            read_only: false,
            transaction_behavior: TransactionBehavior::Deferred,
            statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
            schema,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(":memory:", Schema::new())
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_busy_timeout_ms(mut self, millis: u64) -> Self {
        self.busy_timeout_ms = millis;
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = Some(mode);
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_transaction_behavior(mut self, behavior: TransactionBehavior) -> Self {
        self.transaction_behavior = behavior;
        self
    }

    pub fn with_statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    pub(crate) fn is_in_memory(&self) -> bool {
        self.db_path == ":memory:"
    }
}
