//! Request-scoped transaction manager and the handle storers rebind onto.
//!
//! # Responsibility
//! - Begin, commit and roll back one transaction per logical request.
//! - Expose the transaction to storers only as an opaque `TransactionHandle`.
//!
//! # Invariants
//! - Storers never begin, commit or roll back; they only run statements on
//!   the connection a handle carries.
//! - A closure error (or panic) always rolls the transaction back.

use log::{debug, error};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Opaque capability for running statements inside an active transaction.
pub trait TransactionHandle {
    /// Connection the transaction's statements run on, or `None` when the
    /// handle does not carry a SQLite connection.
    fn sqlite_connection(&self) -> Option<&Connection>;
}

impl TransactionHandle for Transaction<'_> {
    fn sqlite_connection(&self) -> Option<&Connection> {
        let conn: &Connection = self;
        Some(conn)
    }
}

/// For callers that manage `BEGIN`/`COMMIT` on the connection themselves.
impl TransactionHandle for Connection {
    fn sqlite_connection(&self) -> Option<&Connection> {
        Some(self)
    }
}

/// Runs `work` inside an immediate transaction on `conn`.
///
/// Commits when `work` returns `Ok`, rolls back when it returns `Err`.
/// Takes a shared connection so that cores already borrowing `conn` can
/// rebind onto the transaction; nesting fails with a SQLite error.
pub fn execute_in_transaction<T, E, F>(conn: &Connection, work: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<rusqlite::Error>,
{
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    debug!("event=tx_begin module=db status=ok");

    match work(&tx) {
        Ok(value) => {
            tx.commit()?;
            debug!("event=tx_commit module=db status=ok");
            Ok(value)
        }
        Err(err) => {
            match tx.rollback() {
                Ok(()) => debug!("event=tx_rollback module=db status=ok"),
                Err(rollback_err) => error!(
                    "event=tx_rollback module=db status=error error={rollback_err}"
                ),
            }
            Err(err)
        }
    }
}
