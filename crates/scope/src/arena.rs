//! Generational arena backing the resource tree.
//!
//! Nodes are addressed by `NodeIndex` values that pair a slot number with a
//! generation counter, so an index kept past its node's teardown is detected
//! instead of aliasing whatever reuses the slot. Every index also carries the
//! identity of the arena that issued it, so an index handed to a different
//! arena never matches. Insertion reserves capacity fallibly: running out of
//! memory is reported, never aborted on.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(0);

/// An index into the arena with a generation counter for ABA safety.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex {
    arena: u32,
    index: u32,
    generation: u32,
}

#[cfg(test)]
impl NodeIndex {
    pub(crate) const fn index(self) -> u32 {
        self.index
    }

    pub(crate) const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NodeIndex({}:{}:{})",
            self.arena, self.index, self.generation
        )
    }
}

/// The arena could not grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("resource arena exhausted")]
pub struct ArenaFull;

#[derive(Debug)]
enum Slot<T> {
    Occupied { value: T, generation: u32 },
    Vacant { next_free: Option<u32>, generation: u32 },
}

/// Slot storage with a free list and generation-checked access.
#[derive(Debug)]
pub(crate) struct Arena<T> {
    id: u32,
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Number of live nodes.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Inserts `value`, growing the slot vector fallibly when no slot is free.
    pub(crate) fn try_insert(&mut self, value: T) -> Result<NodeIndex, ArenaFull> {
        if let Some(free_index) = self.free_head {
            let slot = &mut self.slots[free_index as usize];
            let Slot::Vacant {
                next_free,
                generation,
            } = *slot
            else {
                unreachable!("free list pointed to occupied slot");
            };
            self.free_head = next_free;
            *slot = Slot::Occupied { value, generation };
            self.len += 1;
            return Ok(NodeIndex {
                arena: self.id,
                index: free_index,
                generation,
            });
        }

        let index = u32::try_from(self.slots.len()).map_err(|_| ArenaFull)?;
        self.slots.try_reserve(1).map_err(|_| ArenaFull)?;
        self.slots.push(Slot::Occupied {
            value,
            generation: 0,
        });
        self.len += 1;
        Ok(NodeIndex {
            arena: self.id,
            index,
            generation: 0,
        })
    }

    /// Removes and returns the value at `index`, bumping the slot generation.
    pub(crate) fn remove(&mut self, index: NodeIndex) -> Option<T> {
        if index.arena != self.id {
            return None;
        }
        let slot = self.slots.get_mut(index.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == index.generation => {
                let vacant = Slot::Vacant {
                    next_free: self.free_head,
                    generation: generation.wrapping_add(1),
                };
                let Slot::Occupied { value, .. } = std::mem::replace(slot, vacant) else {
                    unreachable!();
                };
                self.free_head = Some(index.index);
                self.len -= 1;
                Some(value)
            }
            _ => None,
        }
    }

    pub(crate) fn get(&self, index: NodeIndex) -> Option<&T> {
        if index.arena != self.id {
            return None;
        }
        match self.slots.get(index.index as usize)? {
            Slot::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, index: NodeIndex) -> Option<&mut T> {
        if index.arena != self.id {
            return None;
        }
        match self.slots.get_mut(index.index as usize)? {
            Slot::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }
}
