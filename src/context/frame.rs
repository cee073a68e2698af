//! Variable frames and the frame pool.

use rustc_hash::FxHashMap;

use crate::access::AccessError;
use crate::value::Value;

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    read_only: bool,
}

/// One nesting level of variable storage: names mapped to values, each with a
/// read-only flag.
#[derive(Debug, Default, Clone)]
pub struct Frame {
    slots: FxHashMap<String, Slot>,
}

impl Frame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).map(|slot| &slot.value)
    }

    /// Whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Bind or overwrite `name`, refusing read-only names.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), AccessError> {
        match self.slots.get_mut(name) {
            Some(slot) if slot.read_only => Err(AccessError::ReadOnly),
            Some(slot) => {
                slot.value = value;
                Ok(())
            }
            None => {
                self.slots.insert(
                    name.to_owned(),
                    Slot {
                        value,
                        read_only: false,
                    },
                );
                Ok(())
            }
        }
    }

    /// Bind `name` unconditionally, replacing its value and read-only flag.
    pub fn define(&mut self, name: &str, value: Value, read_only: bool) {
        self.slots
            .insert(name.to_owned(), Slot { value, read_only });
    }

    /// Whether writes to `name` are refused.
    pub fn is_read_only(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|slot| slot.read_only)
    }

    /// Change the read-only flag of `name`. An unbound name is bound to
    /// [`Value::Undefined`] so the flag sticks.
    pub fn set_read_only(&mut self, name: &str, read_only: bool) {
        self.slots
            .entry(name.to_owned())
            .or_insert(Slot {
                value: Value::Undefined,
                read_only: false,
            })
            .read_only = read_only;
    }

    /// Bound names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Bindings with their read-only flags.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (&str, &Value, bool)> {
        self.slots
            .iter()
            .map(|(name, slot)| (name.as_str(), &slot.value, slot.read_only))
    }

    /// Number of bound names.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every binding, keeping the allocation.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Arena of frame slots plus a free list of indices.
///
/// Acquiring reuses a released slot when one is available; releasing clears
/// the slot's bindings and returns its index to the free list.
#[derive(Debug, Default)]
pub(crate) struct FramePool {
    slots: Vec<Frame>,
    free: Vec<usize>,
}

impl FramePool {
    pub(crate) fn acquire(&mut self) -> usize {
        match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Frame::new());
                self.slots.len() - 1
            }
        }
    }

    pub(crate) fn release(&mut self, index: usize) {
        if let Some(frame) = self.slots.get_mut(index) {
            frame.clear();
            self.free.push(index);
        }
    }

    pub(crate) fn get(&self, index: usize) -> &Frame {
        &self.slots[index]
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut Frame {
        &mut self.slots[index]
    }

    /// Frames ever allocated.
    #[cfg(test)]
    pub(crate) fn allocated(&self) -> usize {
        self.slots.len()
    }
}
