//! Generation-checked handle table.
//!
//! Managed callers only ever see a non-zero `i64`.  The low 32 bits index a
//! slot, the high 32 bits carry the slot's generation at insertion time.
//! Removing an entry bumps the generation, so a stale handle (double release,
//! use after release) or a foreign integer is rejected instead of being
//! reinterpreted as a pointer.
//!
//! Entries are stored as `Arc<T>`: a lookup clones the `Arc`, so a release
//! that races an in-flight call only drops the table's reference and the
//! resource is freed when that call finishes.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{BridgeError, Result};

/// Largest generation before wrapping back to 1 (keeps handles positive).
const MAX_GENERATION: u32 = i32::MAX as u32;

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

/// Thread-safe arena mapping opaque integer handles to shared resources.
pub struct HandleTable<T> {
    inner: RwLock<Slots<T>>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(index: u32, generation: u32) -> i64 {
    ((generation as i64) << 32) | index as i64
}

fn decode(handle: i64) -> Option<(usize, u32)> {
    if handle <= 0 {
        return None;
    }
    let index = (handle & 0xFFFF_FFFF) as usize;
    let generation = (handle >> 32) as u32;
    (generation != 0).then_some((index, generation))
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Slots { slots: Vec::new(), free: Vec::new(), live: 0 }) }
    }

    fn read(&self) -> RwLockReadGuard<'_, Slots<T>> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots<T>> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Store `value` and return its handle (never 0).
    pub fn insert(&self, value: T) -> i64 {
        let mut inner = self.write();
        inner.live += 1;
        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index as usize];
            slot.value = Some(Arc::new(value));
            return encode(index, slot.generation);
        }
        let index = inner.slots.len() as u32;
        inner.slots.push(Slot { generation: 1, value: Some(Arc::new(value)) });
        encode(index, 1)
    }

    /// Resolve a handle to a shared reference to its resource.
    pub fn get(&self, handle: i64) -> Result<Arc<T>> {
        let (index, generation) = decode(handle).ok_or(BridgeError::InvalidHandle(handle))?;
        let inner = self.read();
        match inner.slots.get(index) {
            Some(Slot { generation: g, value: Some(value) }) if *g == generation => {
                Ok(Arc::clone(value))
            }
            _ => Err(BridgeError::InvalidHandle(handle)),
        }
    }

    /// Remove the resource behind `handle`.
    ///
    /// Returns `None` for 0, foreign, or already-removed handles.
    pub fn remove(&self, handle: i64) -> Option<Arc<T>> {
        let (index, generation) = decode(handle)?;
        let mut inner = self.write();
        let slot = inner.slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = if slot.generation >= MAX_GENERATION { 1 } else { slot.generation + 1 };
        inner.free.push(index as u32);
        inner.live -= 1;
        Some(value)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.read().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
