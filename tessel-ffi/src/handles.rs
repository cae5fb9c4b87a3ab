//! Generation-checked handle table
//!
//! A handle packs a slot index (low 32 bits, offset by one so that 0 is never
//! a valid handle) and the slot's generation (high 32 bits). Removing a value
//! bumps the slot's generation, so handles to released values stop resolving
//! even after the slot is reused.

use crate::{FfiError, Result};

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

pub(crate) struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> HandleTable<T> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> Result<u64> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .ok()
                    .filter(|&i| i < u32::MAX)
                    .ok_or(FfiError::TableFull)?;
                self.slots.push(Slot {
                    generation: 1,
                    value: None,
                });
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        Ok(pack(index, slot.generation))
    }

    pub fn get(&self, handle: u64) -> Result<&T> {
        let (index, generation) = unpack(handle)?;
        self.slots
            .get(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_ref())
            .ok_or(FfiError::InvalidHandle(handle))
    }

    pub fn remove(&mut self, handle: u64) -> Result<T> {
        let (index, generation) = unpack(handle)?;
        let slot = self
            .slots
            .get_mut(index as usize)
            .filter(|slot| slot.generation == generation && slot.value.is_some())
            .ok_or(FfiError::InvalidHandle(handle))?;

        let value = slot.value.take().ok_or(FfiError::InvalidHandle(handle))?;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push(index);
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

fn pack(index: u32, generation: u32) -> u64 {
    ((generation as u64) << 32) | (index as u64 + 1)
}

fn unpack(handle: u64) -> Result<(u32, u32)> {
    let low = (handle & 0xFFFF_FFFF) as u32;
    if low == 0 {
        return Err(FfiError::InvalidHandle(handle));
    }
    Ok((low - 1, (handle >> 32) as u32))
}
