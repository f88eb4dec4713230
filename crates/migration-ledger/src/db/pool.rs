//! Bounded pool of reusable SQLite sessions.
//!
//! Sessions are opened lazily up to `max_sessions`; `min_idle` sessions are
//! opened eagerly and kept warm. For the shared-cache in-memory store the warm
//! session is what keeps the database alive between calls.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use rusqlite::{Connection, OpenFlags};

use super::StoreError;

/// Where and how new sessions are opened.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Path or `file:` URI passed to SQLite.
    pub target: String,
    /// Enables WAL journaling (file-backed stores only).
    pub wal: bool,
    pub busy_timeout: Duration,
}

/// Pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct PoolLimits {
    pub max_sessions: usize,
    pub min_idle: usize,
    pub acquire_timeout: Duration,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_sessions: 10,
            min_idle: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

struct PoolState {
    idle: VecDeque<Connection>,
    /// Sessions currently alive, idle or checked out.
    total: usize,
    closed: bool,
}

/// A bounded session pool.
pub struct SessionPool {
    options: SessionOptions,
    limits: PoolLimits,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl SessionPool {
    /// Creates the pool and opens `min_idle` sessions up front.
    pub fn new(options: SessionOptions, limits: PoolLimits) -> Result<Self, StoreError> {
        let limits = PoolLimits {
            max_sessions: limits.max_sessions.max(1),
            min_idle: limits.min_idle.clamp(1, limits.max_sessions.max(1)),
            acquire_timeout: limits.acquire_timeout,
        };

        let mut idle = VecDeque::with_capacity(limits.max_sessions);
        for _ in 0..limits.min_idle {
            idle.push_back(open_session(&options)?);
        }

        log::debug!(
            "Session pool ready ({} warm, max {})",
            limits.min_idle,
            limits.max_sessions
        );

        Ok(Self {
            options,
            limits,
            state: Mutex::new(PoolState {
                total: idle.len(),
                idle,
                closed: false,
            }),
            returned: Condvar::new(),
        })
    }

    /// Checks out a session, waiting up to the acquire timeout when the pool
    /// is at capacity.
    pub fn acquire(&self) -> Result<PooledSession<'_>, StoreError> {
        let start = Instant::now();
        let mut state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;

        loop {
            if state.closed {
                return Err(StoreError::PoolClosed);
            }

            if let Some(conn) = state.idle.pop_front() {
                return Ok(PooledSession {
                    conn: Some(conn),
                    pool: self,
                });
            }

            if state.total < self.limits.max_sessions {
                // Reserve the slot before releasing the lock to open the file.
                state.total += 1;
                drop(state);
                return match open_session(&self.options) {
                    Ok(conn) => Ok(PooledSession {
                        conn: Some(conn),
                        pool: self,
                    }),
                    Err(e) => {
                        if let Ok(mut state) = self.state.lock() {
                            state.total -= 1;
                        }
                        self.returned.notify_one();
                        Err(e)
                    }
                };
            }

            let elapsed = start.elapsed();
            if elapsed >= self.limits.acquire_timeout {
                return Err(StoreError::PoolExhausted {
                    waited_ms: elapsed.as_millis() as u64,
                });
            }

            let (guard, _) = self
                .returned
                .wait_timeout(state, self.limits.acquire_timeout - elapsed)
                .map_err(|_| StoreError::LockPoisoned)?;
            state = guard;
        }
    }

    /// Drops every idle session and refuses further checkouts. Sessions still
    /// checked out are closed when they are returned.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
            let idle = state.idle.len();
            state.idle.clear();
            state.total -= idle;
        }
        self.returned.notify_all();
    }

    /// Number of sessions currently alive.
    pub fn size(&self) -> usize {
        self.state.lock().map(|s| s.total).unwrap_or(0)
    }

    /// Number of idle sessions.
    pub fn idle(&self) -> usize {
        self.state.lock().map(|s| s.idle.len()).unwrap_or(0)
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    fn release(&self, conn: Connection) {
        match self.state.lock() {
            Ok(mut state) if !state.closed => state.idle.push_back(conn),
            Ok(mut state) => state.total -= 1,
            Err(_) => log::error!("Session pool lock poisoned, dropping session"),
        }
        self.returned.notify_one();
    }
}

/// A checked-out session. Returned to the pool on drop.
pub struct PooledSession<'a> {
    conn: Option<Connection>,
    pool: &'a SessionPool,
}

impl Deref for PooledSession<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("session taken before drop")
    }
}

impl DerefMut for PooledSession<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("session taken before drop")
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

fn open_session(options: &SessionOptions) -> Result<Connection, StoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(&options.target, flags)?;
    conn.busy_timeout(options.busy_timeout)?;
    if options.wal {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    }
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_options() -> SessionOptions {
        SessionOptions {
            target: format!(
                "file:pool-test-{}?mode=memory&cache=shared",
                uuid::Uuid::new_v4()
            ),
            wal: false,
            busy_timeout: Duration::from_millis(100),
        }
    }

    fn limits(max: usize) -> PoolLimits {
        PoolLimits {
            max_sessions: max,
            min_idle: 1,
            acquire_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_warm_session_on_create() {
        let pool = SessionPool::new(memory_options(), limits(3)).unwrap();
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_sessions_share_memory_database() {
        let pool = SessionPool::new(memory_options(), limits(2)).unwrap();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        a.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);")
            .unwrap();
        let x: i64 = b.query_row("SELECT x FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(x, 7);
    }

    #[test]
    fn test_exhausted_pool_times_out() {
        let pool = SessionPool::new(memory_options(), limits(1)).unwrap();
        let _held = pool.acquire().unwrap();
        let err = pool.acquire().err().unwrap();
        assert!(matches!(err, StoreError::PoolExhausted { .. }));
    }

    #[test]
    fn test_session_returned_on_drop() {
        let pool = SessionPool::new(memory_options(), limits(1)).unwrap();
        {
            let _s = pool.acquire().unwrap();
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_min_idle_clamped_to_max() {
        let pool = SessionPool::new(
            memory_options(),
            PoolLimits {
                max_sessions: 2,
                min_idle: 5,
                acquire_timeout: Duration::from_millis(10),
            },
        )
        .unwrap();
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.limits().min_idle, 2);
    }

    #[test]
    fn test_closed_pool_refuses_checkout() {
        let pool = SessionPool::new(memory_options(), limits(2)).unwrap();
        pool.close();
        assert_eq!(pool.size(), 0);
        assert!(matches!(pool.acquire().err().unwrap(), StoreError::PoolClosed));
    }
}
