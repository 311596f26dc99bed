use std::collections::VecDeque;

use crate::physics::ControlledBody;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    #[error("all {0} body slots are in use")]
    Exhausted(usize),
}

/// Generation-checked reference to a body slot. The slot index doubles as
/// the body id on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle {
    index: u16,
    generation: u32,
}

impl BodyHandle {
    pub fn id(&self) -> u16 {
        self.index
    }
}

#[derive(Default)]
struct Slot {
    generation: u32,
    body: Option<ControlledBody>,
}

/// Freed ids held back before reuse, so a just-released id is not handed
/// straight to the next spawn.
const DEFAULT_QUARANTINE: usize = 256;

/// Owns every live controlled body. Freed ids are recycled oldest first once
/// more than `quarantine` are waiting or the arena is at capacity.
pub struct BodyArena {
    slots: Vec<Slot>,
    free: VecDeque<u16>,
    capacity: usize,
    quarantine: usize,
    len: usize,
}

impl Default for BodyArena {
    fn default() -> Self {
        Self::new(u16::MAX as usize + 1)
    }
}

impl BodyArena {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            capacity: capacity.min(u16::MAX as usize + 1),
            quarantine: DEFAULT_QUARANTINE,
            len: 0,
        }
    }

    pub fn with_quarantine(mut self, quarantine: usize) -> Self {
        self.quarantine = quarantine;
        self
    }

    /// Slots allocated so far, live or free.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reserves a slot and fills it with the body `build` makes for its id.
    pub fn insert(
        &mut self,
        build: impl FnOnce(u16) -> ControlledBody,
    ) -> Result<BodyHandle, ArenaError> {
        let recycle = self.free.len() > self.quarantine || self.slots.len() >= self.capacity;
        let index = if recycle {
            self.free
                .pop_front()
                .ok_or(ArenaError::Exhausted(self.capacity))?
        } else {
            self.slots.push(Slot::default());
            (self.slots.len() - 1) as u16
        };

        let slot = &mut self.slots[index as usize];
        slot.body = Some(build(index));
        self.len += 1;
        Ok(BodyHandle {
            index,
            generation: slot.generation,
        })
    }

    pub fn get(&self, handle: BodyHandle) -> Option<&ControlledBody> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.body.as_ref()
    }

    pub fn get_mut(&mut self, handle: BodyHandle) -> Option<&mut ControlledBody> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.body.as_mut()
    }

    pub fn remove(&mut self, handle: BodyHandle) -> Option<ControlledBody> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let body = slot.body.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push_back(handle.index);
        self.len -= 1;
        Some(body)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlledBody> {
        self.slots.iter().filter_map(|slot| slot.body.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ControlledBody> {
        self.slots.iter_mut().filter_map(|slot| slot.body.as_mut())
    }

    /// Frees every slot whose body has been killed.
    pub fn prune_dead(&mut self) -> usize {
        let mut pruned = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.body.as_ref().is_some_and(ControlledBody::is_dead) {
                slot.body = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push_back(index as u16);
                pruned += 1;
            }
        }
        self.len -= pruned;
        pruned
    }
}
