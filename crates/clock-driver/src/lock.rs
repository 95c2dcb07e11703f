//! Spin lock guarding the clock peripheral's I/O port.
//!
//! The sync handler runs in interrupt context and cannot sleep, so the port
//! is guarded by a spin lock rather than a blocking mutex. The lock owns the
//! port; the only way to touch it is through a [`PortGuard`], and dropping
//! the guard releases the lock.
//!
//! The lock is not reentrant. Acquiring it twice from the same context
//! spins forever.

use crossbeam_utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// Non-sleeping mutual exclusion over a value of type `T`.
pub struct PortLock<T> {
    locked: CachePadded<AtomicBool>,
    port: UnsafeCell<T>,
}

// SAFETY: access to `port` is serialized by `locked`.
unsafe impl<T: Send> Sync for PortLock<T> {}
unsafe impl<T: Send> Send for PortLock<T> {}

/// RAII ownership of the locked port.
#[must_use = "the port is released as soon as the guard is dropped"]
pub struct PortGuard<'a, T> {
    lock: &'a PortLock<T>,
    // Auto traits as for `&mut T`: `Sync` only when `T: Sync`.
    _port: PhantomData<&'a mut T>,
}

impl<T> PortLock<T> {
    /// Create an unlocked lock around `port`.
    pub const fn new(port: T) -> Self {
        Self {
            locked: CachePadded::new(AtomicBool::new(false)),
            port: UnsafeCell::new(port),
        }
    }

    /// Acquire the lock, spinning until it becomes available.
    #[inline]
    pub fn lock(&self) -> PortGuard<'_, T> {
        let backoff = Backoff::new();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // Spin on a plain load to keep the cache line shared
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
        PortGuard {
            lock: self,
            _port: PhantomData,
        }
    }

    /// Try to acquire the lock without spinning.
    #[inline]
    pub fn try_lock(&self) -> Option<PortGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| PortGuard {
                lock: self,
                _port: PhantomData,
            })
    }

    /// Whether some context currently holds the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl<T> Deref for PortGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock.
        unsafe { &*self.lock.port.get() }
    }
}

impl<T> DerefMut for PortGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock exclusively.
        unsafe { &mut *self.lock.port.get() }
    }
}

impl<T> Drop for PortGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

impl<T> std::fmt::Debug for PortLock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortLock")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}
