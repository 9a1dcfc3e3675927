//! Pure-function result memoization.
//!
//! Unlike [`super::TtlCache`], memoized results never expire: the wrapped
//! function must be pure (deterministic, side-effect free). That is a caller
//! contract, not something enforced here.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Caches results of a pure function keyed by its arguments.
///
/// Arguments are compared by value (`Eq + Hash`), so structurally equal
/// inputs share one stored result. Under concurrent first calls with the
/// same arguments the function may run more than once; the last result
/// written wins, which is harmless for a pure function.
///
/// # Example
///
/// ```
/// use hybrid_engine::Memoizer;
///
/// let memo = Memoizer::new(|n: &u64| n * n);
///
/// assert_eq!(memo.call(12), 144);
/// assert_eq!(memo.call(12), 144); // served from the store
/// assert_eq!(memo.len(), 1);
/// ```
pub struct Memoizer<A, R> {
    func: Box<dyn Fn(&A) -> R + Send + Sync>,
    store: DashMap<A, R>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<A, R> Memoizer<A, R>
where
    A: Eq + Hash + Clone + Send + Sync,
    R: Clone + Send + Sync,
{
    pub fn new(func: impl Fn(&A) -> R + Send + Sync + 'static) -> Self {
        Self {
            func: Box::new(func),
            store: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Invoke the wrapped function, or return the stored result for
    /// value-equal arguments.
    pub fn call(&self, args: A) -> R {
        if let Some(result) = self.store.get(&args) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return result.value().clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = (self.func)(&args);
        self.store.insert(args, result.clone());
        result
    }

    /// Drop all stored results.
    pub fn clear(&self) {
        self.store.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
