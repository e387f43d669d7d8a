//! Work stacks for one light propagation pass.
//!
//! Both stacks are LIFO. Additions are keyed by chunk and packed local cell
//! and never queued twice while pending; removals carry world coordinates
//! and the level the cell held before it was cleared.

use nebula_voxel::ChunkKey;
use rustc_hash::FxHashSet;

/// Packs a chunk-local cell as `(y << 8) | (z << 4) | x`.
#[inline]
pub fn pack_local(lx: usize, ly: usize, lz: usize) -> u16 {
    debug_assert!(lx < 16 && lz < 16 && ly < 256);
    ((ly << 8) | (lz << 4) | lx) as u16
}

/// Inverse of [`pack_local`].
#[inline]
pub fn unpack_local(local: u16) -> (usize, usize, usize) {
    let v = usize::from(local);
    (v & 0xF, v >> 8, (v >> 4) & 0xF)
}

/// A cell whose light must be retracted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoveEntry {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// Level the cell held before it was cleared.
    pub level: u8,
}

/// Addition and removal stacks plus the set of pending additions.
#[derive(Debug, Default)]
pub struct LightQueues {
    add: Vec<(ChunkKey, u16)>,
    add_seen: FxHashSet<(ChunkKey, u16)>,
    remove: Vec<RemoveEntry>,
}

impl LightQueues {
    pub fn new() -> Self {
        Self {
            add: Vec::with_capacity(1024),
            add_seen: FxHashSet::default(),
            remove: Vec::with_capacity(1024),
        }
    }

    /// Drops all queued work.
    pub fn clear(&mut self) {
        self.add.clear();
        self.add_seen.clear();
        self.remove.clear();
    }

    /// Queues a cell for outward spread unless it is already pending. A
    /// popped cell can be queued again if a later step raises it.
    pub fn push_add(&mut self, key: ChunkKey, local: u16) {
        if self.add_seen.insert((key, local)) {
            self.add.push((key, local));
        }
    }

    pub fn pop_add(&mut self) -> Option<(ChunkKey, u16)> {
        let entry = self.add.pop()?;
        self.add_seen.remove(&entry);
        Some(entry)
    }

    pub fn add_len(&self) -> usize {
        self.add.len()
    }

    pub fn push_remove(&mut self, x: i32, y: i32, z: i32, level: u8) {
        self.remove.push(RemoveEntry { x, y, z, level });
    }

    pub fn pop_remove(&mut self) -> Option<RemoveEntry> {
        self.remove.pop()
    }

    pub fn remove_len(&self) -> usize {
        self.remove.len()
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_packing_covers_chunk() {
        assert_eq!(pack_local(0, 0, 0), 0);
        assert_eq!(pack_local(15, 255, 15), 0xFFFF);
        assert_eq!(unpack_local(pack_local(3, 200, 9)), (3, 200, 9));
    }

    #[test]
    fn test_pending_add_is_not_duplicated() {
        let mut q = LightQueues::new();
        let key = ChunkKey::new(1, -1);
        q.push_add(key, 7);
        q.push_add(key, 7);
        q.push_add(key, 8);
        assert_eq!(q.add_len(), 2);

        assert_eq!(q.pop_add(), Some((key, 8)));
        q.push_add(key, 8);
        q.push_add(key, 7);
        assert_eq!(q.add_len(), 2);
    }

    #[test]
    fn test_stacks_are_lifo_and_clearable() {
        let mut q = LightQueues::new();
        q.push_remove(1, 2, 3, 5);
        q.push_remove(4, 5, 6, 4);
        assert_eq!(q.pop_remove().map(|e| e.level), Some(4));
        assert_eq!(q.remove_len(), 1);

        q.push_add(ChunkKey::new(0, 0), 1);
        q.clear();
        assert!(q.is_empty());
    }
}
