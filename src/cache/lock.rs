use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Poison-tolerant acquisition for the cache's `RwLock`s.
///
/// Cache state is plain data, so a poisoned guard is still usable; we log
/// and keep serving instead of propagating the panic to every reader.
pub(crate) trait RwLockExt<T> {
    fn read_recovered(&self, op: &'static str) -> RwLockReadGuard<'_, T>;
    fn write_recovered(&self, op: &'static str) -> RwLockWriteGuard<'_, T>;
}

/// Poison-tolerant acquisition for the cache's `Mutex`es.
pub(crate) trait MutexExt<T> {
    fn lock_recovered(&self, op: &'static str) -> MutexGuard<'_, T>;
}

impl<T> RwLockExt<T> for RwLock<T> {
    fn read_recovered(&self, op: &'static str) -> RwLockReadGuard<'_, T> {
        self.read()
            .unwrap_or_else(|poisoned| recover(poisoned, op, "rwlock.read"))
    }

    fn write_recovered(&self, op: &'static str) -> RwLockWriteGuard<'_, T> {
        self.write()
            .unwrap_or_else(|poisoned| recover(poisoned, op, "rwlock.write"))
    }
}

impl<T> MutexExt<T> for Mutex<T> {
    fn lock_recovered(&self, op: &'static str) -> MutexGuard<'_, T> {
        self.lock()
            .unwrap_or_else(|poisoned| recover(poisoned, op, "mutex.lock"))
    }
}

fn recover<G>(poisoned: PoisonError<G>, op: &'static str, lock_kind: &'static str) -> G {
    warn!(
        op,
        lock_kind,
        result = "poisoned_recovered",
        hint = "state may be stale after panic in another task",
        "Recovered from poisoned cache lock"
    );
    poisoned.into_inner()
}
