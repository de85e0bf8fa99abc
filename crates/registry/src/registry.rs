//! The registry table and its lock guard.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::{Mutex, MutexGuard};

use crate::error::RegistryError;

/// How a registry assigns keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationMode {
    /// Keys come from an internal monotonic counter.
    AutoIncrement,
    /// Keys are supplied by the caller.
    ExplicitKey,
}

/// Integer types usable as registry keys.
pub trait RegistryKey: Copy + Ord + fmt::Debug + Send + 'static {
    /// First key handed out in auto-increment mode.
    const FIRST: Self;

    /// The key following `self`, or `None` on overflow.
    fn successor(self) -> Option<Self>;
}

macro_rules! impl_registry_key {
    ($($ty:ty),*) => {
        $(
            impl RegistryKey for $ty {
                const FIRST: Self = 1;

                fn successor(self) -> Option<Self> {
                    self.checked_add(1)
                }
            }
        )*
    };
}

impl_registry_key!(u32, u64, usize, isize);

struct Table<K, V> {
    /// Next key to hand out; `None` once the key space is exhausted.
    next: Option<K>,
    entries: BTreeMap<K, V>,
}

/// A lock-protected table of `K -> V`.
pub struct IdRegistry<K: RegistryKey, V> {
    mode: AllocationMode,
    table: Mutex<Table<K, V>>,
}

impl<K: RegistryKey, V> IdRegistry<K, V> {
    /// Creates a registry that allocates its own keys.
    pub fn auto_increment() -> Self {
        Self::with_mode(AllocationMode::AutoIncrement)
    }

    /// Creates a registry keyed by caller-supplied keys.
    pub fn explicit_keys() -> Self {
        Self::with_mode(AllocationMode::ExplicitKey)
    }

    fn with_mode(mode: AllocationMode) -> Self {
        Self {
            mode,
            table: Mutex::new(Table {
                next: Some(K::FIRST),
                entries: BTreeMap::new(),
            }),
        }
    }

    pub fn mode(&self) -> AllocationMode {
        self.mode
    }

    /// Acquires the registry lock for a multi-step critical section.
    pub fn lock(&self) -> RegistryGuard<'_, K, V> {
        RegistryGuard {
            mode: self.mode,
            table: self.table.lock(),
        }
    }

    /// Stores `data` under a freshly allocated key.
    pub fn allocate(&self, data: V) -> Result<K, RegistryError> {
        self.lock().allocate(data)
    }

    /// Allocates a key and stores the value built from it.
    ///
    /// Allocation and insertion happen under one lock acquisition, so the
    /// value may embed its own key.
    pub fn allocate_with(&self, build: impl FnOnce(K) -> V) -> Result<K, RegistryError> {
        self.lock().allocate_with(build)
    }

    /// Stores `data` under `key` (explicit-key mode only).
    pub fn put(&self, key: K, data: V) -> Result<(), RegistryError> {
        self.lock().put(key, data)
    }

    /// Removes `key`, returning the value it mapped to.
    pub fn delete(&self, key: K) -> Result<V, RegistryError> {
        self.lock().delete(key)
    }

    pub fn contains(&self, key: K) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: RegistryKey, V: Clone> IdRegistry<K, V> {
    /// Returns a clone of the value stored under `key`.
    pub fn get(&self, key: K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    /// Copies every entry out of the table in key order.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.lock().snapshot()
    }
}

impl<K: RegistryKey, V> fmt::Debug for IdRegistry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdRegistry")
            .field("mode", &self.mode)
            .field("len", &self.len())
            .finish()
    }
}

/// Exclusive access to a registry's table.
///
/// The table cannot change while the guard is alive, so [`iter`](Self::iter)
/// walks a stable view.
pub struct RegistryGuard<'a, K: RegistryKey, V> {
    mode: AllocationMode,
    table: MutexGuard<'a, Table<K, V>>,
}

impl<K: RegistryKey, V> RegistryGuard<'_, K, V> {
    pub fn allocate(&mut self, data: V) -> Result<K, RegistryError> {
        self.allocate_with(|_| data)
    }

    pub fn allocate_with(&mut self, build: impl FnOnce(K) -> V) -> Result<K, RegistryError> {
        if self.mode != AllocationMode::AutoIncrement {
            return Err(RegistryError::WrongMode {
                operation: "allocate",
                mode: self.mode,
            });
        }
        let key = self.table.next.ok_or(RegistryError::Exhausted)?;
        self.table.next = key.successor();
        let value = build(key);
        self.table.entries.insert(key, value);
        Ok(key)
    }

    pub fn put(&mut self, key: K, data: V) -> Result<(), RegistryError> {
        if self.mode != AllocationMode::ExplicitKey {
            return Err(RegistryError::WrongMode {
                operation: "put",
                mode: self.mode,
            });
        }
        if self.table.entries.contains_key(&key) {
            return Err(RegistryError::Occupied(format!("{key:?}")));
        }
        self.table.entries.insert(key, data);
        Ok(())
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.table.entries.get(&key)
    }

    pub fn delete(&mut self, key: K) -> Result<V, RegistryError> {
        self.table
            .entries
            .remove(&key)
            .ok_or_else(|| RegistryError::NotFound(format!("{key:?}")))
    }

    pub fn contains(&self, key: K) -> bool {
        self.table.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.table.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.entries.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.table.entries.iter().map(|(k, v)| (*k, v))
    }
}

impl<K: RegistryKey, V: Clone> RegistryGuard<'_, K, V> {
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.iter().map(|(k, v)| (k, v.clone())).collect()
    }
}
