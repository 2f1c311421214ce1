use rusqlite::Connection;
use std::path::Path;

/// Open a SQLite connection with the pragmas every on-disk database in the
/// workspace shares: WAL journaling (so worker threads can read pages while
/// the coordinator writes), foreign keys, and a busy timeout so concurrent
/// writers back off instead of erroring immediately.
pub fn open_connection(path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(conn)
}
