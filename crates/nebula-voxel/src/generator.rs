//! Seam to the procedural terrain source.

/// Produces the initial block array for a chunk that has no saved data.
///
/// Called from IO worker threads. The returned array uses the chunk layout
/// (x fastest, then z, then y) and should hold `sx * sy * sz` ids; a shorter
/// array leaves the remaining cells as air.
pub trait ChunkGenerator: Send + Sync {
    /// Generates chunk `(cx, cz)` with dimensions `sx × sy × sz`.
    fn generate(&self, cx: i32, cz: i32, sx: usize, sy: usize, sz: usize) -> Vec<u8>;
}

/// Generator that leaves every chunk empty.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyGenerator;

impl ChunkGenerator for EmptyGenerator {
    fn generate(&self, _cx: i32, _cz: i32, sx: usize, sy: usize, sz: usize) -> Vec<u8> {
        vec![0; sx * sy * sz]
    }
}
