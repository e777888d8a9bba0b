//! Scoped transactions.
//!
//! [`Connection::begin`] opens a transaction, or a savepoint when one is
//! already open. The returned [`Transaction`] rolls back when it is dropped
//! without [`commit`](Transaction::commit), including during a panic.

use std::ops::Deref;

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};

/// An open transaction or savepoint. Derefs to the [`Connection`], so
/// statements run through it directly.
pub struct Transaction<'c> {
    conn: &'c Connection,
    savepoint: Option<String>,
    finished: bool,
}

impl Connection {
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let savepoint = if self.is_autocommit() {
            self.execute_raw(self.transaction_behavior().begin_sql())?;
            debug!("transaction started");
            None
        } else {
            let name = self.next_savepoint();
            self.execute_raw(&format!("SAVEPOINT \"{name}\""))?;
            debug!(savepoint = %name, "savepoint started");
            Some(name)
        };
        Ok(Transaction {
            conn: self,
            savepoint,
            finished: false,
        })
    }

    /// Runs `f` inside a transaction. Commits when `f` returns `Ok`; rolls
    /// back when it returns `Err` or panics.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<Error>,
    {
        let tx = self.begin()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback()?;
                Err(err)
            }
        }
    }
}

impl<'c> Transaction<'c> {
    /// `true` for a nested transaction running as a savepoint.
    pub fn is_savepoint(&self) -> bool {
        self.savepoint.is_some()
    }

    pub fn commit(mut self) -> Result<()> {
        match &self.savepoint {
            Some(name) => self.conn.execute_raw(&format!("RELEASE \"{name}\""))?,
            None => self.conn.execute_raw("COMMIT")?,
        }
        self.finished = true;
        debug!(savepoint = ?self.savepoint, "transaction committed");
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finish_rollback()
    }

    fn finish_rollback(&mut self) -> Result<()> {
        self.finished = true;
        match &self.savepoint {
            Some(name) => self
                .conn
                .execute_raw(&format!("ROLLBACK TO \"{name}\"; RELEASE \"{name}\""))?,
            // The engine may already have rolled back, e.g. after ON CONFLICT ROLLBACK.
            None if self.conn.is_autocommit() => {}
            None => self.conn.execute_raw("ROLLBACK")?,
        }
        debug!(savepoint = ?self.savepoint, "transaction rolled back");
        Ok(())
    }
}

impl Deref for Transaction<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.finish_rollback() {
            warn!("rollback on drop failed: {err}");
        }
    }
}
