//! Advisory-lock coordination between processes
//!
//! Only one process per database runs a migration batch. The lock is a PostgreSQL
//! session-level advisory lock taken without waiting on a connection dedicated to it, so
//! it disappears with that connection even if the process dies mid-batch.

use crate::connection::ConnectionSource;
use crate::executor::{SqlExecutor, StoreError};

/// Yields a row only when the lock was free (or already ours)
const TRY_LOCK_SQL: &str = "SELECT 1 WHERE pg_try_advisory_lock(hashtext($1))";
const UNLOCK_SQL: &str = "SELECT pg_advisory_unlock(hashtext($1))";

/// Lock guard that releases the advisory lock, then the connection, when dropped
///
/// The release also runs when the guarded work panics and unwinds.
pub struct AdvisoryLockGuard {
    connection: Box<dyn SqlExecutor>,
    key: String,
}

impl AdvisoryLockGuard {
    /// Try to take the lock named `key` without waiting
    ///
    /// Returns `Ok(None)` if another session holds it; the connection acquired for the
    /// attempt is released before returning.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if no connection can be acquired or the lock query fails.
    pub fn try_acquire(
        connections: &dyn ConnectionSource,
        key: &str,
    ) -> Result<Option<Self>, StoreError> {
        let connection = connections.acquire()?;
        if connection.query_exists(TRY_LOCK_SQL, &[&key])? {
            Ok(Some(Self {
                connection,
                key: key.to_string(),
            }))
        } else {
            Ok(None)
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for AdvisoryLockGuard {
    fn drop(&mut self) {
        let key = self.key.as_str();
        // Closing the connection frees the lock anyway; an unlock failure is only noise
        if let Err(e) = self.connection.execute(UNLOCK_SQL, &[&key]) {
            log::warn!("failed to release migration lock {}: {}", key, e);
        }
    }
}

/// Run `work` while holding the advisory lock `key`
///
/// Returns `Ok(None)` without calling `work` when another process holds the lock. That is
/// the expected outcome for every instance but one when several start together.
///
/// # Errors
///
/// Returns `StoreError` if the lock connection cannot be opened or the lock query fails.
pub fn try_run_exclusive<R>(
    connections: &dyn ConnectionSource,
    key: &str,
    work: impl FnOnce() -> R,
) -> Result<Option<R>, StoreError> {
    let Some(_guard) = AdvisoryLockGuard::try_acquire(connections, key)? else {
        log::debug!("migration lock {} is held elsewhere, skipping", key);
        return Ok(None);
    };

    Ok(Some(work()))
}
