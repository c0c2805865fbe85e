// src/store.rs
//! In-memory snapshot store with synchronous subscribers
//!
//! Holds one value, always defined, and hands out clones of it. Writes are
//! serialized and each accepted write notifies every subscriber with the new
//! snapshot, in write order. Nothing here is persisted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct Store<T> {
    value: Mutex<T>,
    /// Held across mutate + notify so subscribers see writes in order
    write_lock: Mutex<()>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber<T>)>>,
    next_id: AtomicU64,
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Clone + PartialEq> Store<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: Mutex::new(initial),
            write_lock: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Current snapshot
    pub fn read(&self) -> T {
        lock(&self.value).clone()
    }

    /// Borrow the current snapshot without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*lock(&self.value))
    }

    /// Replace the whole value. Returns `false` and stays silent when the new
    /// value equals the current one.
    pub fn set(&self, next: T) -> bool {
        let _writer = lock(&self.write_lock);
        let snapshot = {
            let mut value = lock(&self.value);
            if *value == next {
                return false;
            }
            *value = next;
            value.clone()
        };
        self.notify(&snapshot);
        true
    }

    /// Mutate in place and always notify.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let _writer = lock(&self.write_lock);
        let snapshot = {
            let mut value = lock(&self.value);
            f(&mut *value);
            value.clone()
        };
        self.notify(&snapshot);
    }

    /// Mutate a copy and commit it only if it differs from the current value.
    pub fn update_strict(&self, f: impl FnOnce(&mut T)) -> bool {
        let _writer = lock(&self.write_lock);
        let snapshot = {
            let mut value = lock(&self.value);
            let mut next = value.clone();
            f(&mut next);
            if *value == next {
                return false;
            }
            *value = next;
            value.clone()
        };
        self.notify(&snapshot);
        true
    }

    /// Register a callback for every accepted write. Callbacks run on the
    /// writing thread; they may read this store but must not write to it.
    pub fn subscribe(&self, f: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).push((id, Arc::new(f)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    fn notify(&self, snapshot: &T) {
        let subscribers: Vec<Subscriber<T>> = lock(&self.subscribers)
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for subscriber in subscribers {
            subscriber(snapshot);
        }
    }
}

impl<T: Clone + PartialEq + Default> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
