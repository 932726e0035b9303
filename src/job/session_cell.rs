use std::sync::{Arc, Mutex, MutexGuard};

/// Last-writer-wins holder for the job's current session.
///
/// The mutex is only ever held for an `Arc` clone or swap; callers get an
/// owned `Arc` back and do any further work (report generation, I/O) after
/// the lock is released.
pub struct SessionCell<T: ?Sized> {
    current: Mutex<Option<Arc<T>>>,
}

impl<T: ?Sized> SessionCell<T> {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Replace the current value, returning the previous one.
    pub fn install(&self, value: Arc<T>) -> Option<Arc<T>> {
        self.lock().replace(value)
    }

    /// Copy out the current value.
    pub fn current(&self) -> Option<Arc<T>> {
        self.lock().clone()
    }

    // A panic while holding the lock can only happen inside `Option::replace`
    // or `clone`, neither of which leaves the slot half-written.
    fn lock(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: ?Sized> Default for SessionCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
