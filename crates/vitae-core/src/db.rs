use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

/// A connection shared between the stores of one subsystem.
///
/// Every store wraps the same `Arc<Mutex<Connection>>`; locks are held for a
/// single statement (or a short read-modify-write) and never across an await.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Open the database file with the pragmas every Vitae connection expects.
pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Private in-memory database, used by tests and one-shot tooling.
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn shared(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}
