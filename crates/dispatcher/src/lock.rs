use std::sync::{Mutex, MutexGuard, PoisonError};

/// Run `f` with the lock held, tracing acquisition and release
///
/// Handlers never run while a dispatcher lock is held, so a poisoned lock
/// still guards consistent data and is recovered rather than propagated.
pub(crate) fn with_lock<T, F, R>(name: &str, lock: &Mutex<T>, f: F) -> R
where
    F: FnOnce(MutexGuard<'_, T>) -> R,
{
    tracing::trace!(%name, "taking lock");
    let inner = lock.lock().unwrap_or_else(PoisonError::into_inner);
    let res = f(inner);
    tracing::trace!(%name, "releasing lock");
    res
}
