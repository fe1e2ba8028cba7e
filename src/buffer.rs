use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

static GLOBAL_POOL: Lazy<BufferPool> = Lazy::new(BufferPool::new);

/// Configuration of a [`BufferPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Capacity, in bytes, of buffers allocated on a pool miss.
    pub initial_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 2048,
        }
    }
}

/// A snapshot of a pool's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Buffers freshly allocated because the idle set was empty.
    pub allocated: u64,
    /// Acquires served from the idle set.
    pub reused: u64,
    /// Buffers handed back to the pool.
    pub released: u64,
    /// Buffers currently idle.
    pub idle: usize,
}

/// A thread-safe reuse cache of growable byte buffers.
///
/// Cloning gives another handle to the same pool. There is no capacity limit and
/// no eviction: every released buffer is kept, along with its capacity.
#[derive(Clone, Debug)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    idle: Mutex<Vec<Vec<u8>>>,
    config: PoolConfig,
    allocated: AtomicU64,
    reused: AtomicU64,
    released: AtomicU64,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    /// Creates a new, empty pool with the default configuration.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Creates a new, empty pool with the given configuration.
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                config,
                allocated: AtomicU64::new(0),
                reused: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// The process-wide pool, for callers that don't want to carry a handle around.
    pub fn global() -> &'static BufferPool {
        &GLOBAL_POOL
    }

    /// Leases an empty buffer. Never fails; allocates when no idle buffer exists.
    #[inline]
    pub fn acquire(&self) -> BuffMut {
        let popped = self.inner.idle.lock().pop();
        let mut inner = match popped {
            Some(v) => {
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                v
            }
            None => {
                let capacity = self.inner.config.initial_capacity;
                tracing::debug!("pool empty, allocating {} bytes", capacity);
                self.inner.allocated.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(capacity)
            }
        };
        inner.clear();
        BuffMut {
            inner,
            pool: self.clone(),
        }
    }

    /// Hands a buffer back for reuse.
    ///
    /// A buffer always returns to the pool it was leased from, which is not
    /// necessarily `self`.
    #[inline]
    pub fn release(&self, buf: BuffMut) {
        if !self.same_pool(&buf.pool) {
            tracing::debug!("releasing a buffer leased from another pool");
        }
        drop(buf)
    }

    /// Number of buffers currently idle.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Counters since the pool was created.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            reused: self.inner.reused.load(Ordering::Relaxed),
            released: self.inner.released.load(Ordering::Relaxed),
            idle: self.idle_count(),
        }
    }

    /// The configuration this pool was built with.
    pub fn config(&self) -> PoolConfig {
        self.inner.config
    }

    fn same_pool(&self, other: &BufferPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn put_back(&self, v: Vec<u8>) {
        tracing::trace!("returning buffer with capacity {}", v.capacity());
        self.inner.released.fetch_add(1, Ordering::Relaxed);
        self.inner.idle.lock().push(v);
    }
}

/// A *mutable* buffer on loan from a [`BufferPool`]. Returns itself to the pool when dropped.
#[derive(Debug)]
pub struct BuffMut {
    inner: Vec<u8>,
    pool: BufferPool,
}

impl Deref for BuffMut {
    type Target = Vec<u8>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for BuffMut {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Drop for BuffMut {
    #[inline]
    fn drop(&mut self) {
        self.pool.put_back(std::mem::take(&mut self.inner));
    }
}

impl Default for BuffMut {
    /// Leases from the global pool.
    #[inline]
    fn default() -> Self {
        BufferPool::global().acquire()
    }
}

impl BuffMut {
    /// The pool this buffer will return to.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}
