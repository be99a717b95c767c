//! Thread-safe execution context: a lock plus a UUID that tags every log
//! line emitted while the context is held.
//!
//! ```text
//! let ctx = ContextManager::new();
//! ctx.scope(|guard| work(guard.id()))?;   // lock held for the closure
//! ```
//!
//! Errors raised inside [`ContextManager::scope`] are logged and then
//! propagated unchanged; the context never swallows them.

use std::fmt::Display;
use std::sync::{Mutex, MutexGuard};

use tracing::{error, info};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug)]
pub struct ContextManager {
    id: Uuid,
    lock: Mutex<()>,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextManager {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4(), lock: Mutex::new(()) }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Block until the lock is free and enter the context.
    pub fn enter(&self) -> Result<ContextGuard<'_>, AppError> {
        let held = self
            .lock
            .lock()
            .map_err(|_| AppError::Context(format!("context {} lock poisoned", self.id)))?;
        info!(context = %self.id, "entering context");
        Ok(ContextGuard { id: self.id, _held: held })
    }

    /// Enter without blocking; `Ok(None)` when another holder has the lock.
    pub fn try_enter(&self) -> Result<Option<ContextGuard<'_>>, AppError> {
        match self.lock.try_lock() {
            Ok(held) => {
                info!(context = %self.id, "entering context");
                Ok(Some(ContextGuard { id: self.id, _held: held }))
            }
            Err(std::sync::TryLockError::WouldBlock) => Ok(None),
            Err(std::sync::TryLockError::Poisoned(_)) => {
                Err(AppError::Context(format!("context {} lock poisoned", self.id)))
            }
        }
    }

    /// Run `f` with the context held. An `Err` from `f` is logged with the
    /// context id and returned as-is.
    pub fn scope<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ContextGuard<'_>) -> Result<T, E>,
        E: Display + From<AppError>,
    {
        let guard = self.enter()?;
        let result = f(&guard);
        if let Err(e) = &result {
            error!(context = %self.id, error = %e, "exception caught in context");
        }
        result
    }
}

/// Proof that the context lock is held. Dropping it exits the context.
#[derive(Debug)]
pub struct ContextGuard<'a> {
    id: Uuid,
    _held: MutexGuard<'a, ()>,
}

impl ContextGuard<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        info!(context = %self.id, "exiting context");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn ids_are_unique() {
        assert_ne!(ContextManager::new().id(), ContextManager::new().id());
    }

    #[test]
    fn guard_carries_manager_id() {
        let ctx = ContextManager::new();
        let guard = ctx.enter().unwrap();
        assert_eq!(guard.id(), ctx.id());
    }

    #[test]
    fn lock_is_exclusive_until_guard_drops() {
        let ctx = ContextManager::new();
        let guard = ctx.enter().unwrap();
        assert!(ctx.try_enter().unwrap().is_none());
        drop(guard);
        assert!(ctx.try_enter().unwrap().is_some());
    }

    #[test]
    fn scope_returns_value() {
        let ctx = ContextManager::new();
        let out: Result<u32, AppError> = ctx.scope(|_| Ok(7));
        assert_eq!(out.unwrap(), 7);
    }

    #[test]
    fn scope_propagates_error_and_releases_lock() {
        let ctx = ContextManager::new();
        let out: Result<(), AppError> = ctx.scope(|_| Err(AppError::Runtime("boom".into())));
        assert!(out.unwrap_err().to_string().contains("boom"));
        assert!(ctx.try_enter().unwrap().is_some());
    }

    #[test]
    fn poisoned_lock_is_a_context_error() {
        let ctx = Arc::new(ContextManager::new());
        let holder = Arc::clone(&ctx);
        let panicked = thread::spawn(move || {
            let _guard = holder.enter().unwrap();
            panic!("worker died inside the context");
        })
        .join();
        assert!(panicked.is_err());

        assert!(matches!(ctx.enter(), Err(AppError::Context(_))));
        assert!(matches!(ctx.try_enter(), Err(AppError::Context(_))));
        let scoped: Result<(), AppError> = ctx.scope(|_| Ok(()));
        assert!(scoped.unwrap_err().to_string().contains("poisoned"));
    }

    #[test]
    fn scopes_serialise_across_threads() {
        let ctx = Arc::new(ContextManager::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctx = Arc::clone(&ctx);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    ctx.scope(|_| {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, AppError>(())
                    })
                    .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
