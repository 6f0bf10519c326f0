//! Per-user lock registry.
//!
//! Every balance mutation for a user runs while that user's lock is held.
//! Locks are created on first use and never removed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use coffer_shared::types::UserId;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::LedgerError;

/// Map from user to mutex, with a bounded acquisition wait.
#[derive(Debug)]
pub struct UserLocks {
    locks: DashMap<UserId, Arc<Mutex<()>>>,
    timeout: Duration,
}

/// Exclusive hold on one user's balances. Released on drop.
#[derive(Debug)]
pub struct UserLockGuard {
    user_id: UserId,
    acquired_at: Instant,
    _guard: OwnedMutexGuard<()>,
}

impl UserLockGuard {
    /// The locked user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        tracing::debug!(
            user_id = %self.user_id,
            held_us = self.acquired_at.elapsed().as_micros(),
            "user lock released"
        );
    }
}

impl UserLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Acquires the lock of `user_id`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the lock is not free within the configured wait.
    pub async fn acquire(&self, user_id: UserId) -> Result<UserLockGuard, LedgerError> {
        let lock = self.lock_for(user_id);
        let started = Instant::now();

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => {
                tracing::debug!(
                    user_id = %user_id,
                    waited_us = started.elapsed().as_micros(),
                    "user lock acquired"
                );
                Ok(UserLockGuard {
                    user_id,
                    acquired_at: Instant::now(),
                    _guard: guard,
                })
            }
            Err(_) => {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(user_id = %user_id, waited_ms, "user lock wait timed out");
                Err(LedgerError::LockTimeout { user_id, waited_ms })
            }
        }
    }

    /// Number of users with a lock.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if no lock was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn lock_for(&self, user_id: UserId) -> Arc<Mutex<()>> {
        // The shard guard returned by `entry` is dropped at the end of this statement.
        Arc::clone(
            self.locks
                .entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}
