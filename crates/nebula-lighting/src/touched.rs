//! Chunks whose light changed during a pass.

use nebula_voxel::{Chunk, ChunkKey, ChunkStore, RemeshSink};
use rustc_hash::FxHashSet;

/// Insertion-ordered set of chunk keys to remesh after a pass.
#[derive(Debug, Default)]
pub struct TouchedChunks {
    order: Vec<ChunkKey>,
    seen: FxHashSet<ChunkKey>,
}

impl TouchedChunks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_pass(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    pub fn mark(&mut self, chunk: &Chunk) {
        let key = chunk.key();
        if self.seen.insert(key) {
            self.order.push(key);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Forces a remesh of every touched chunk that is still resident and
    /// ready, then forgets them. Returns how many were requested.
    pub fn flush(&mut self, store: &ChunkStore, sink: &dyn RemeshSink) -> usize {
        let mut requested = 0;
        for key in self.order.drain(..) {
            if let Some(chunk) = store.get_by_key(key) {
                if chunk.is_ready() {
                    sink.request_remesh_force(&chunk);
                    requested += 1;
                }
            }
        }
        self.seen.clear();
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nebula_voxel::ChunkStatus;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Sink(Mutex<Vec<ChunkKey>>);

    impl RemeshSink for Sink {
        fn request_remesh_force(&self, chunk: &Arc<Chunk>) {
            self.0.lock().unwrap().push(chunk.key());
        }
    }

    #[test]
    fn test_flush_skips_evicted_and_loading_chunks() {
        let store = ChunkStore::new();
        let (ready, _) = store.get_or_create_placeholder(0, 0);
        ready.set_status(ChunkStatus::Ready);
        let (loading, _) = store.get_or_create_placeholder(1, 0);
        let evicted = Chunk::new(5, 5);

        let mut touched = TouchedChunks::new();
        touched.mark(&ready);
        touched.mark(&ready);
        touched.mark(&loading);
        touched.mark(&evicted);
        assert_eq!(touched.len(), 3);

        let sink = Sink::default();
        assert_eq!(touched.flush(&store, &sink), 1);
        assert_eq!(*sink.0.lock().unwrap(), vec![ChunkKey::new(0, 0)]);
        assert!(touched.is_empty());
    }
}
