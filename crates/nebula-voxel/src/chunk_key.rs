//! Packing of a chunk's `(cx, cz)` column coordinate into one `i64`.
//!
//! Layout: the high 32 bits hold `cx`, the low 32 bits hold `cz` as an
//! unsigned bit pattern. The packing is a bijection over all `i32` pairs.

use std::fmt;

/// Identity of a chunk column, usable as a hash key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey(pub i64);

impl ChunkKey {
    /// Packs a chunk coordinate pair.
    #[inline]
    pub const fn new(cx: i32, cz: i32) -> Self {
        Self(((cx as i64) << 32) ^ (cz as u32 as i64))
    }

    /// Chunk X coordinate.
    #[inline]
    pub const fn x(self) -> i32 {
        (self.0 >> 32) as i32
    }

    /// Chunk Z coordinate.
    #[inline]
    pub const fn z(self) -> i32 {
        self.0 as i32
    }

    /// Both coordinates as a tuple.
    #[inline]
    pub const fn coords(self) -> (i32, i32) {
        (self.x(), self.z())
    }

    /// Key of the column offset by `(dx, dz)` chunks.
    #[inline]
    pub const fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.x().wrapping_add(dx), self.z().wrapping_add(dz))
    }

    /// Squared chunk distance to `(cx, cz)`, saturating at `i64::MAX`.
    pub fn dist2_to(self, cx: i32, cz: i32) -> i64 {
        let dx = i64::from(self.x()) - i64::from(cx);
        let dz = i64::from(self.z()) - i64::from(cz);
        dx.saturating_mul(dx).saturating_add(dz.saturating_mul(dz))
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x(), self.z())
    }
}
