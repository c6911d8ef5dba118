//! A minimal connection pool over `rusqlite::Connection`.
//!
//! Spec §5 "Shared-resource policy": writers acquire and release a
//! connection per batch, and no worker may hold more than one at a time.
//! `max_open_conns` bounds how many connections the pool will ever create;
//! `max_idle_conns` bounds how many sit idle between uses.

use crate::error::{StoreError, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Mutex;

pub struct ConnectionPool {
    path: PoolTarget,
    idle: Mutex<Vec<Connection>>,
    max_open: usize,
    max_idle: usize,
    opened: std::sync::atomic::AtomicUsize,
}

#[derive(Clone)]
enum PoolTarget {
    File(PathBuf),
    Memory,
}

impl ConnectionPool {
    pub fn open_file(path: impl Into<PathBuf>, max_open: usize, max_idle: usize) -> Result<Self> {
        let pool = Self {
            path: PoolTarget::File(path.into()),
            idle: Mutex::new(Vec::new()),
            max_open: max_open.max(1),
            max_idle: max_idle.max(1),
            opened: std::sync::atomic::AtomicUsize::new(0),
        };
        // Eagerly open and initialize one connection so schema creation and
        // connection errors surface at construction time, not on first use.
        let conn = pool.new_connection()?;
        pool.idle.lock().unwrap().push(conn);
        Ok(pool)
    }

    /// An in-memory pool backed by a single shared connection (SQLite's
    /// `:memory:` databases are not shared across connections, so the pool
    /// degenerates to size 1 — adequate for tests and single-process
    /// embedding).
    pub fn open_in_memory() -> Result<Self> {
        let pool = Self {
            path: PoolTarget::Memory,
            idle: Mutex::new(Vec::new()),
            max_open: 1,
            max_idle: 1,
            opened: std::sync::atomic::AtomicUsize::new(0),
        };
        let conn = pool.new_connection()?;
        pool.idle.lock().unwrap().push(conn);
        Ok(pool)
    }

    fn new_connection(&self) -> Result<Connection> {
        let conn = match &self.path {
            PoolTarget::File(p) => Connection::open(p)?,
            PoolTarget::Memory => Connection::open_in_memory()?,
        };
        crate::schema::initialize(&conn)?;
        self.opened.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(conn)
    }

    /// Acquire a connection, blocking the current (sync) caller. Intended
    /// to be invoked from inside `tokio::task::spawn_blocking`.
    pub fn acquire(&self) -> Result<PooledConnection<'_>> {
        if let Some(conn) = self.idle.lock().unwrap().pop() {
            return Ok(PooledConnection {
                conn: Some(conn),
                pool: self,
            });
        }
        if self.opened.load(std::sync::atomic::Ordering::Relaxed) >= self.max_open {
            return Err(StoreError::PoolExhausted);
        }
        let conn = self.new_connection()?;
        Ok(PooledConnection {
            conn: Some(conn),
            pool: self,
        })
    }

    fn release(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
        // else: drop the connection, shrinking back toward max_idle.
    }
}

pub struct PooledConnection<'p> {
    conn: Option<Connection>,
    pool: &'p ConnectionPool,
}

impl std::ops::Deref for PooledConnection<'_> {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken")
    }
}

impl std::ops::DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_reuses_connection() {
        let pool = ConnectionPool::open_in_memory().unwrap();
        {
            let _c = pool.acquire().unwrap();
        }
        let _c2 = pool.acquire().unwrap();
        assert_eq!(pool.opened.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn pool_exhausts_past_max_open() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open_file(tmp.path().join("db.sqlite"), 1, 1).unwrap();
        let _held = pool.acquire().unwrap();
        let second = pool.acquire();
        assert!(matches!(second, Err(StoreError::PoolExhausted)));
    }
}
