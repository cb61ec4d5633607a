//! Pool of reusable I/O handles onto one backing path.
//!
//! Checkout never blocks: when no idle handle is available a new one is
//! opened. On return a handle is rewound and kept only while fewer than
//! `retain` handles are idle; the rest are dropped.

use std::collections::VecDeque;
use std::fmt;
use std::io::{Seek, SeekFrom};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::Result;

type HandleFactory<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

/// Statistics for a handle pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Handles opened by the factory
    pub created: u64,
    /// Checkouts served from the idle list
    pub reused: u64,
    /// Returned handles dropped past the retention threshold
    pub discarded: u64,
    /// Handles currently idle
    pub idle: usize,
    /// Retention threshold
    pub retain: usize,
}

/// Bounded pool of idle handles for one backing path.
pub struct HandlePool<T: Seek + Send + 'static> {
    idle: Mutex<VecDeque<T>>,
    retain: usize,
    factory: HandleFactory<T>,
    created: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

impl<T: Seek + Send + 'static> fmt::Debug for HandlePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlePool")
            .field("retain", &self.retain)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<T: Seek + Send + 'static> HandlePool<T> {
    /// Create a pool that opens new handles with `factory`.
    pub fn new(retain: usize, factory: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self {
            idle: Mutex::new(VecDeque::with_capacity(retain)),
            retain,
            factory: Box::new(factory),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Borrow a handle positioned at the start. It returns to the pool when
    /// the guard is dropped.
    pub fn checkout(self: &Arc<Self>) -> Result<PooledHandle<T>> {
        let idle = self.idle.lock().pop_front();
        let handle = match idle {
            Some(mut handle) => {
                handle.seek(SeekFrom::Start(0))?;
                self.reused.fetch_add(1, Ordering::Relaxed);
                handle
            }
            None => {
                let handle = (self.factory)()?;
                self.created.fetch_add(1, Ordering::Relaxed);
                handle
            }
        };

        Ok(PooledHandle {
            handle: Some(handle),
            pool: Some(Arc::clone(self)),
        })
    }

    fn release(&self, mut handle: T) {
        if handle.seek(SeekFrom::Start(0)).is_err() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut idle = self.idle.lock();
        if idle.len() < self.retain {
            idle.push_back(handle);
        } else {
            drop(idle);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!("Handle pool full ({}), dropping returned handle", self.retain);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub const fn retain(&self) -> usize {
        self.retain
    }

    /// Drop every idle handle.
    pub fn clear(&self) {
        self.idle.lock().clear();
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            idle: self.idle_count(),
            retain: self.retain,
        }
    }
}

/// Scoped checkout from a [`HandlePool`].
///
/// Returned to its pool exactly once, on drop, whatever path the borrower
/// leaves by. A detached handle belongs to no pool and is simply dropped.
#[must_use = "PooledHandle returns to its pool when dropped"]
pub struct PooledHandle<T: Seek + Send + 'static> {
    handle: Option<T>,
    pool: Option<Arc<HandlePool<T>>>,
}

impl<T: Seek + Send + 'static> PooledHandle<T> {
    /// Wrap a single-use handle that is never retained.
    pub fn detached(mut handle: T) -> Result<Self> {
        handle.seek(SeekFrom::Start(0))?;
        Ok(Self {
            handle: Some(handle),
            pool: None,
        })
    }

    pub const fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    /// Take ownership of the handle; it will not go back to the pool.
    #[allow(clippy::expect_used)] // only taken here and in drop
    pub fn into_inner(mut self) -> T {
        self.pool = None;
        self.handle.take().expect("handle present until dropped")
    }
}

impl<T: Seek + Send + 'static> Deref for PooledHandle<T> {
    type Target = T;

    #[allow(clippy::expect_used)] // only taken by into_inner and drop
    fn deref(&self) -> &T {
        self.handle.as_ref().expect("handle present until dropped")
    }
}

impl<T: Seek + Send + 'static> DerefMut for PooledHandle<T> {
    #[allow(clippy::expect_used)] // only taken by into_inner and drop
    fn deref_mut(&mut self) -> &mut T {
        self.handle.as_mut().expect("handle present until dropped")
    }
}

impl<T: Seek + Send + 'static> Drop for PooledHandle<T> {
    fn drop(&mut self) {
        if let (Some(handle), Some(pool)) = (self.handle.take(), self.pool.take()) {
            pool.release(handle);
        }
    }
}
