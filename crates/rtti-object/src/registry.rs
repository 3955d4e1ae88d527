//! Weak global object registry.
//!
//! Objects are kept in a generational slab of weak entries. An [`ObjectId`]
//! packs the slot index and the slot generation, so an id of a destroyed
//! object never matches the object that later reuses its slot.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Weak;

use crate::object::{ObjectCell, ObjectPtr};

/// Identity of a registered object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Packed form, generation in the high half.
    pub fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bits())
    }
}

/// Object model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectConfig {
    /// Slots reserved up front in the weak registry.
    pub initial_capacity: usize,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
        }
    }
}

impl ObjectConfig {
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}

struct Slot {
    generation: u32,
    entry: Option<Weak<ObjectCell>>,
}

#[derive(Default)]
struct Slab {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

/// Id to object table holding weak references only.
pub struct ObjectRegistry {
    slab: Mutex<Slab>,
}

impl ObjectRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slab: Mutex::new(Slab {
                slots: Vec::with_capacity(capacity),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    pub(crate) fn register(&self, object: Weak<ObjectCell>) -> ObjectId {
        let mut slab = self.slab.lock();
        slab.live += 1;
        if let Some(index) = slab.free.pop() {
            let slot = &mut slab.slots[index as usize];
            slot.entry = Some(object);
            return ObjectId {
                index,
                generation: slot.generation,
            };
        }
        let index = slab.slots.len() as u32;
        slab.slots.push(Slot {
            generation: 1,
            entry: Some(object),
        });
        ObjectId {
            index,
            generation: 1,
        }
    }

    /// Remove the entry of `id`; false if it is not registered.
    pub(crate) fn unregister(&self, id: ObjectId) -> bool {
        let mut slab = self.slab.lock();
        let Some(slot) = slab.slots.get_mut(id.index as usize) else {
            return false;
        };
        if slot.generation != id.generation || slot.entry.is_none() {
            return false;
        }
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        slab.free.push(id.index);
        slab.live -= 1;
        true
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn find_object(&self, id: ObjectId) -> Option<ObjectPtr> {
        let slab = self.slab.lock();
        let slot = slab.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()?.upgrade()
    }

    /// Visit every live object.
    ///
    /// The callback runs with the registry locked: it must not create or
    /// destroy objects. References taken for the visit are released after
    /// the lock.
    pub fn for_each_object(&self, mut f: impl FnMut(&ObjectPtr)) {
        let mut visited = Vec::new();
        {
            let slab = self.slab.lock();
            for slot in &slab.slots {
                if let Some(object) = slot.entry.as_ref().and_then(Weak::upgrade) {
                    f(&object);
                    visited.push(object);
                }
            }
        }
        drop(visited);
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.slab.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_pack_index_and_generation() {
        let id = ObjectId {
            index: 3,
            generation: 7,
        };
        assert_eq!(ObjectId::from_bits(id.to_bits()), id);
        assert_eq!(format!("{id:?}"), "ObjectId(3v7)");
    }

    #[test]
    fn freed_slots_get_a_new_generation() {
        let registry = ObjectRegistry::default();
        let a = registry.register(Weak::new());
        assert!(registry.unregister(a));
        assert!(!registry.unregister(a));
        let b = registry.register(Weak::new());
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 1);
        assert!(registry.find_object(a).is_none());
    }
}
