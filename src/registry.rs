//! Generational handle registry
//!
//! Owns every resource handed across the C boundary. A [`Handle`] packs the
//! registry's tag, the slot's generation and the slot index:
//!
//! ```text
//!  63      56 55             32 31                0
//! +----------+-----------------+-------------------+
//! |   tag    |   generation    |       index       |
//! +----------+-----------------+-------------------+
//! ```
//!
//! A released handle never resolves again, even after its slot is reused, and
//! a handle from one registry never resolves in another.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{BridgeError, Result};

/// Opaque token for a live resource. `0` is never a valid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

const GENERATION_BITS: u32 = 24;
const MAX_GENERATION: u32 = (1 << GENERATION_BITS) - 1;

impl Handle {
    fn new(tag: u8, index: u32, generation: u32) -> Self {
        Self((u64::from(tag) << 56) | (u64::from(generation) << 32) | u64::from(index))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn into_raw(self) -> u64 {
        self.0
    }

    fn index(self) -> usize {
        (self.0 & 0xffff_ffff) as usize
    }

    fn generation(self) -> u32 {
        ((self.0 >> 32) as u32) & MAX_GENERATION
    }

    fn tag(self) -> u8 {
        (self.0 >> 56) as u8
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.tag(), self.index(), self.generation())
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

/// Table of resources of one kind, addressed by [`Handle`].
///
/// The slot table lock is held only to locate or append a slot. Each slot has
/// its own lock, so releasing one resource never blocks lookups of another.
pub struct HandleRegistry<T> {
    kind: &'static str,
    tag: u8,
    slots: RwLock<Vec<Arc<Mutex<Slot<T>>>>>,
    free: Mutex<Vec<u32>>,
}

impl<T> HandleRegistry<T> {
    /// `tag` must be unique among registries that share a handle namespace.
    pub fn new(kind: &'static str, tag: u8) -> Self {
        Self {
            kind,
            tag,
            slots: RwLock::new(Vec::new()),
            free: Mutex::new(Vec::new()),
        }
    }

    /// Register a resource and return its handle.
    pub fn create(&self, resource: T) -> Handle {
        let value = Arc::new(resource);

        let recycled = self
            .free
            .lock()
            .pop()
            .and_then(|index| self.slot(index as usize).map(|slot| (index, slot)));

        if let Some((index, slot)) = recycled {
            let mut slot = slot.lock();
            slot.value = Some(value);
            let handle = Handle::new(self.tag, index, slot.generation);
            debug!("Registered {} handle {}", self.kind, handle);
            return handle;
        }

        let mut slots = self.slots.write();
        let index = slots.len() as u32;
        slots.push(Arc::new(Mutex::new(Slot {
            generation: 1,
            value: Some(value),
        })));
        let handle = Handle::new(self.tag, index, 1);
        debug!("Registered {} handle {}", self.kind, handle);
        handle
    }

    /// Look up a live resource.
    pub fn resolve(&self, handle: Handle) -> Result<Arc<T>> {
        let slot = self.lookup(handle)?;
        let slot = slot.lock();
        match &slot.value {
            Some(value) if slot.generation == handle.generation() => Ok(Arc::clone(value)),
            _ => Err(BridgeError::InvalidHandle),
        }
    }

    /// Remove a resource, handing it to the single caller that released it.
    ///
    /// A second release of the same handle returns `InvalidHandle`.
    pub fn release(&self, handle: Handle) -> Result<Arc<T>> {
        let slot = self.lookup(handle)?;
        let mut slot = slot.lock();
        if slot.generation != handle.generation() || slot.value.is_none() {
            return Err(BridgeError::InvalidHandle);
        }

        let value = slot.value.take().ok_or(BridgeError::InvalidHandle)?;
        // A slot whose generation would wrap is retired instead of recycled.
        if slot.generation < MAX_GENERATION {
            slot.generation += 1;
            self.free.lock().push(handle.index() as u32);
        }
        debug!("Released {} handle {}", self.kind, handle);
        Ok(value)
    }

    /// Number of live resources.
    pub fn len(&self) -> usize {
        let slots = self.slots.read().clone();
        slots.iter().filter(|slot| slot.lock().value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, handle: Handle) -> Result<Arc<Mutex<Slot<T>>>> {
        if handle.tag() != self.tag {
            return Err(BridgeError::InvalidHandle);
        }
        self.slot(handle.index()).ok_or(BridgeError::InvalidHandle)
    }

    fn slot(&self, index: usize) -> Option<Arc<Mutex<Slot<T>>>> {
        self.slots.read().get(index).cloned()
    }
}
