//! Fixed-capacity slot arrays.
//!
//! Each node kind lives in one [`NodeStorage`]. Slots never move, so an
//! index handed out by [`NodeStorage::allocate`] stays valid until it is
//! freed. Free slots are found by scanning forward from a rotating cursor,
//! which bounds the cost of an allocation and never compacts.

use std::ops::Range;

use bytemuck::Pod;

use crate::world::NodeHandle;

/// Index of a node inside its kind's storage array.
pub type ImplHandle = usize;

/// Finds the first unset flag at or after `cursor`, wrapping once.
pub(crate) fn scan_free(allocated: &[bool], cursor: usize) -> Option<usize> {
    let len = allocated.len();
    (0..len)
        .map(|step| (cursor + step) % len)
        .find(|&index| !allocated[index])
}

pub struct NodeStorage<T> {
    slots: Vec<T>,
    allocated: Vec<bool>,
    owners: Vec<Option<NodeHandle>>,
    cursor: usize,
    live: usize,
}

impl<T: Pod> NodeStorage<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![T::zeroed(); capacity],
            allocated: vec![false; capacity],
            owners: vec![None; capacity],
            cursor: 0,
            live: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of allocated slots.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Claims the next free slot and stores `value` in it. Returns `None`
    /// when every slot is taken.
    pub fn allocate(&mut self, value: T, owner: Option<NodeHandle>) -> Option<ImplHandle> {
        if self.capacity() == 0 {
            return None;
        }
        let index = scan_free(&self.allocated, self.cursor)?;
        self.allocated[index] = true;
        self.owners[index] = owner;
        self.slots[index] = value;
        self.cursor = (index + 1) % self.capacity();
        self.live += 1;
        Some(index)
    }

    pub fn allocate_zeroed(&mut self, owner: Option<NodeHandle>) -> Option<ImplHandle> {
        self.allocate(T::zeroed(), owner)
    }

    /// Releases a slot and zeroes it. Returns `false` if the slot was not
    /// allocated, leaving the storage untouched.
    pub fn free(&mut self, index: ImplHandle) -> bool {
        if !self.is_allocated(index) {
            return false;
        }
        self.allocated[index] = false;
        self.owners[index] = None;
        self.slots[index] = T::zeroed();
        self.live -= 1;
        true
    }

    /// Places `value` at exactly `index`. Used when restoring a snapshot.
    pub fn restore(&mut self, index: ImplHandle, value: T, owner: Option<NodeHandle>) -> bool {
        if index >= self.capacity() || self.allocated[index] {
            return false;
        }
        self.allocated[index] = true;
        self.owners[index] = owner;
        self.slots[index] = value;
        self.live += 1;
        self.cursor = (index + 1) % self.capacity();
        true
    }

    pub fn is_allocated(&self, index: ImplHandle) -> bool {
        self.allocated.get(index).copied().unwrap_or(false)
    }

    pub fn get(&self, index: ImplHandle) -> Option<&T> {
        self.is_allocated(index).then(|| &self.slots[index])
    }

    pub fn get_mut(&mut self, index: ImplHandle) -> Option<&mut T> {
        if self.is_allocated(index) {
            Some(&mut self.slots[index])
        } else {
            None
        }
    }

    pub fn owner(&self, index: ImplHandle) -> Option<NodeHandle> {
        self.owners.get(index).copied().flatten()
    }

    pub fn bytes(&self, index: ImplHandle) -> Option<&[u8]> {
        self.get(index).map(bytemuck::bytes_of)
    }

    pub fn bytes_mut(&mut self, index: ImplHandle) -> Option<&mut [u8]> {
        self.get_mut(index).map(bytemuck::bytes_of_mut)
    }

    /// Next contiguous run of allocated slots starting at or after `from`.
    pub fn next_run(&self, from: usize) -> Option<Range<usize>> {
        let start = (from..self.capacity()).find(|&i| self.allocated[i])?;
        let end = (start..self.capacity())
            .find(|&i| !self.allocated[i])
            .unwrap_or(self.capacity());
        Some(start..end)
    }

    pub fn run_mut(&mut self, range: Range<usize>) -> NodeRun<'_, T> {
        NodeRun {
            first: range.start,
            nodes: &mut self.slots[range.clone()],
            owners: &self.owners[range],
        }
    }

    /// Allocated slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (ImplHandle, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(index, _)| self.allocated[*index])
    }

    /// Allocated slots that belong to a world node.
    pub fn iter_owned(&self) -> impl Iterator<Item = (NodeHandle, &T)> + '_ {
        self.iter()
            .filter_map(|(index, node)| self.owners[index].map(|owner| (owner, node)))
    }
}

/// A contiguous run of allocated nodes handed to a kind's update hook.
pub struct NodeRun<'a, T> {
    first: ImplHandle,
    nodes: &'a mut [T],
    owners: &'a [Option<NodeHandle>],
}

impl<'a, T> NodeRun<'a, T> {
    /// Storage index of the first node in the run.
    pub fn first(&self) -> ImplHandle {
        self.first
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes_mut(&mut self) -> &mut [T] {
        &mut *self.nodes
    }

    /// Nodes of the run paired with the world handle that owns them.
    /// Slots allocated outside a world are skipped.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeHandle, &mut T)> + '_ {
        self.owners
            .iter()
            .zip(self.nodes.iter_mut())
            .filter_map(|(owner, node)| owner.map(|owner| (owner, node)))
    }
}

impl<T> std::fmt::Debug for NodeRun<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRun")
            .field("first", &self.first)
            .field("len", &self.nodes.len())
            .finish()
    }
}
