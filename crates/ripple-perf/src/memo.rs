//! Namespaced, time-limited memoization.
//!
//! Eviction approximates recency by access count: when a namespace is full,
//! expired entries go first, then the least-accessed ones (oldest first on
//! ties).

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::rc::Rc;
use std::time::Duration;

use ripple_core::collections::map::HashMap;
use ripple_core::Clock;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MAX_SIZE: usize = 100;

type KeyFn<A> = Rc<dyn Fn(&A) -> String>;

/// Options for [`MemoCache::memoize`]. Without a key function the cache key
/// is the `Debug` rendering of the arguments.
pub struct MemoizeOptions<A> {
    pub namespace: String,
    pub key_fn: Option<KeyFn<A>>,
    pub ttl: Duration,
    pub max_size: usize,
}

impl<A> MemoizeOptions<A> {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key_fn: None,
            ttl: DEFAULT_TTL,
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    pub fn key_fn(mut self, key_fn: impl Fn(&A) -> String + 'static) -> Self {
        self.key_fn = Some(Rc::new(key_fn));
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
}

impl<A> Default for MemoizeOptions<A> {
    fn default() -> Self {
        Self::new("default")
    }
}

impl<A> Clone for MemoizeOptions<A> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            key_fn: self.key_fn.clone(),
            ttl: self.ttl,
            max_size: self.max_size,
        }
    }
}

impl<A> Debug for MemoizeOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizeOptions")
            .field("namespace", &self.namespace)
            .field("key_fn", &self.key_fn.is_some())
            .field("ttl", &self.ttl)
            .field("max_size", &self.max_size)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CacheEntry {
    value: Box<dyn Any>,
    created: Duration,
    access_count: u64,
    sequence: u64,
}

struct CacheInner {
    clock: Rc<dyn Clock>,
    namespaces: RefCell<HashMap<String, HashMap<String, CacheEntry>>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
    next_sequence: Cell<u64>,
}

impl CacheInner {
    fn lookup<R: Clone + 'static>(&self, namespace: &str, key: &str, ttl: Duration) -> Option<R> {
        let now = self.clock.now();
        let mut namespaces = self.namespaces.borrow_mut();
        let entries = namespaces.get_mut(namespace)?;
        let expired = {
            let entry = entries.get(key)?;
            now.saturating_sub(entry.created) >= ttl
        };
        if expired {
            entries.remove(key);
            return None;
        }
        let entry = entries.get_mut(key)?;
        let value = entry.value.downcast_ref::<R>()?.clone();
        entry.access_count += 1;
        Some(value)
    }

    fn insert<R: 'static>(
        &self,
        namespace: &str,
        key: String,
        value: R,
        ttl: Duration,
        max_size: usize,
    ) {
        let now = self.clock.now();
        let sequence = self.next_sequence.get();
        self.next_sequence.set(sequence + 1);
        let mut namespaces = self.namespaces.borrow_mut();
        let entries = namespaces.entry(namespace.to_string()).or_default();
        if !entries.contains_key(&key) && entries.len() >= max_size {
            evict(entries, now, ttl, max_size);
        }
        entries.insert(
            key,
            CacheEntry {
                value: Box::new(value),
                created: now,
                access_count: 1,
                sequence,
            },
        );
    }
}

/// Makes room for one more entry.
fn evict(entries: &mut HashMap<String, CacheEntry>, now: Duration, ttl: Duration, max_size: usize) {
    let before = entries.len();
    entries.retain(|_, entry| now.saturating_sub(entry.created) < ttl);
    while !entries.is_empty() && entries.len() >= max_size {
        let victim = entries
            .iter()
            .min_by_key(|(_, entry)| (entry.access_count, entry.sequence))
            .map(|(key, _)| key.clone());
        match victim {
            Some(key) => {
                entries.remove(&key);
            }
            None => break,
        }
    }
    log::trace!("memo cache evicted {} entr(ies)", before - entries.len());
}

/// Shared store behind every memoized function. Namespaces keep the keys of
/// different functions apart.
#[derive(Clone)]
pub struct MemoCache {
    inner: Rc<CacheInner>,
}

impl MemoCache {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(CacheInner {
                clock,
                namespaces: RefCell::new(HashMap::default()),
                hits: Cell::new(0),
                misses: Cell::new(0),
                next_sequence: Cell::new(0),
            }),
        }
    }

    pub fn memoize<A, R>(
        &self,
        f: impl Fn(&A) -> R + 'static,
        options: MemoizeOptions<A>,
    ) -> Memoized<A, R>
    where
        A: Debug + 'static,
        R: Clone + 'static,
    {
        Memoized {
            cache: self.clone(),
            function: Box::new(f),
            options,
            _args: PhantomData,
        }
    }

    /// Live entries in `namespace`, expired ones included until they are
    /// looked up or evicted.
    pub fn len(&self, namespace: &str) -> usize {
        self.inner
            .namespaces
            .borrow()
            .get(namespace)
            .map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .namespaces
            .borrow()
            .values()
            .all(|entries| entries.is_empty())
    }

    pub fn clear_namespace(&self, namespace: &str) {
        self.inner.namespaces.borrow_mut().remove(namespace);
    }

    pub fn clear(&self) {
        self.inner.namespaces.borrow_mut().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.get(),
            misses: self.inner.misses.get(),
            entries: self
                .inner
                .namespaces
                .borrow()
                .values()
                .map(|entries| entries.len())
                .sum(),
        }
    }
}

impl Debug for MemoCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCache").field("stats", &self.stats()).finish()
    }
}

/// A function wrapped by [`MemoCache::memoize`].
pub struct Memoized<A, R> {
    cache: MemoCache,
    function: Box<dyn Fn(&A) -> R>,
    options: MemoizeOptions<A>,
    _args: PhantomData<fn(&A) -> R>,
}

impl<A, R> Memoized<A, R>
where
    A: Debug + 'static,
    R: Clone + 'static,
{
    pub fn call(&self, args: &A) -> R {
        let key = match &self.options.key_fn {
            Some(key_fn) => key_fn(args),
            None => format!("{args:?}"),
        };
        let inner = &self.cache.inner;
        let namespace = &self.options.namespace;
        if let Some(value) = inner.lookup::<R>(namespace, &key, self.options.ttl) {
            inner.hits.set(inner.hits.get() + 1);
            return value;
        }
        inner.misses.set(inner.misses.get() + 1);
        let value = (self.function)(args);
        inner.insert(
            namespace,
            key,
            value.clone(),
            self.options.ttl,
            self.options.max_size,
        );
        value
    }

    pub fn namespace(&self) -> &str {
        &self.options.namespace
    }

    pub fn options(&self) -> &MemoizeOptions<A> {
        &self.options
    }
}

impl<A, R> Debug for Memoized<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("options", &self.options)
            .finish()
    }
}
