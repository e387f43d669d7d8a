//! Per-chunk files under `<world>/chunks/`.
//!
//! Current files are `c_<cx>_<cz>.bin.z` (zlib, version 2). Worlds written by
//! older builds may still hold `c_<cx>_<cz>.bin.gz` (gzip, version 1); those
//! are read when no current file exists, or when the current file is damaged.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::chunk_serial::{ChunkDims, ChunkSerError, decode_chunk, encode_chunk};

/// Subdirectory of a world holding chunk files.
pub const CHUNK_DIR_NAME: &str = "chunks";

/// Suffix counter so concurrent writers never share a temporary file.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Errors produced when writing a chunk file.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("chunk file I/O on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The block array could not be encoded.
    #[error("chunk encoding failed: {0}")]
    Encode(#[from] ChunkSerError),
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads and writes chunk block arrays for one world.
#[derive(Clone, Debug)]
pub struct ChunkStorage {
    chunk_dir: PathBuf,
    dims: ChunkDims,
}

impl ChunkStorage {
    /// Opens storage below `world_dir`, creating the chunk directory.
    pub fn open(world_dir: &Path) -> Result<Self, StorageError> {
        Self::with_dims(world_dir, ChunkDims::STANDARD)
    }

    /// Opens storage for chunks of non-standard dimensions.
    pub fn with_dims(world_dir: &Path, dims: ChunkDims) -> Result<Self, StorageError> {
        let chunk_dir = world_dir.join(CHUNK_DIR_NAME);
        fs::create_dir_all(&chunk_dir).map_err(|e| io_error(&chunk_dir, e))?;
        Ok(Self { chunk_dir, dims })
    }

    /// Directory holding the chunk files.
    pub fn chunk_dir(&self) -> &Path {
        &self.chunk_dir
    }

    /// Path of the current-format file for `(cx, cz)`.
    pub fn chunk_path(&self, cx: i32, cz: i32) -> PathBuf {
        self.chunk_dir.join(format!("c_{cx}_{cz}.bin.z"))
    }

    /// Path of the legacy gzip file for `(cx, cz)`.
    pub fn legacy_path(&self, cx: i32, cz: i32) -> PathBuf {
        self.chunk_dir.join(format!("c_{cx}_{cz}.bin.gz"))
    }

    /// Loads the block array for `(cx, cz)`.
    ///
    /// Returns `None` when no file exists or every candidate fails
    /// validation; failures are logged, never propagated.
    pub fn try_load(&self, cx: i32, cz: i32) -> Option<Vec<u8>> {
        let current = self.chunk_path(cx, cz);
        let legacy = self.legacy_path(cx, cz);

        if current.exists() {
            match self.load_file(&current) {
                Ok(blocks) => return Some(blocks),
                Err(e) => {
                    warn!("chunk ({cx}, {cz}) unreadable at {}: {e}", current.display());
                    if !legacy.exists() {
                        return None;
                    }
                }
            }
        } else if !legacy.exists() {
            return None;
        }

        match self.load_file(&legacy) {
            Ok(blocks) => Some(blocks),
            Err(e) => {
                warn!("legacy chunk ({cx}, {cz}) unreadable at {}: {e}", legacy.display());
                None
            }
        }
    }

    fn load_file(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
        Ok(decode_chunk(&bytes, self.dims)?)
    }

    /// Writes the block array for `(cx, cz)` in the current format.
    ///
    /// The stream goes to a temporary `<file>.<pid>.<n>.tmp` unique to this
    /// call and then replaces the target by rename, falling back to
    /// copy-and-delete where rename is refused. A failed write never leaves a
    /// half-written target behind.
    pub fn save(&self, cx: i32, cz: i32, blocks: &[u8]) -> Result<(), StorageError> {
        let encoded = encode_chunk(self.dims, blocks)?;

        let target = self.chunk_path(cx, cz);
        let mut tmp_name = target.clone().into_os_string();
        tmp_name.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let tmp = PathBuf::from(tmp_name);

        fs::create_dir_all(&self.chunk_dir).map_err(|e| io_error(&self.chunk_dir, e))?;
        if let Err(e) = fs::write(&tmp, &encoded) {
            let _ = fs::remove_file(&tmp);
            return Err(io_error(&tmp, e));
        }

        if fs::rename(&tmp, &target).is_ok() {
            return Ok(());
        }
        // Some platforms refuse to rename over an existing file.
        let _ = fs::remove_file(&target);
        if fs::rename(&tmp, &target).is_err() {
            let copied = fs::copy(&tmp, &target);
            let _ = fs::remove_file(&tmp);
            copied.map_err(|e| io_error(&target, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_serial::tests::encode_legacy_gzip;

    const SMALL: ChunkDims = ChunkDims {
        sx: 2,
        sy: 2,
        sz: 2,
    };

    #[test]
    fn test_missing_chunk_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ChunkStorage::open(dir.path()).unwrap();
        assert!(storage.chunk_dir().is_dir());
        assert!(storage.try_load(0, 0).is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ChunkStorage::with_dims(dir.path(), SMALL).unwrap();
        let blocks = vec![1, 0, 2, 0, 3, 0, 4, 5];

        storage.save(-3, 7, &blocks).unwrap();
        assert!(storage.chunk_path(-3, 7).ends_with("chunks/c_-3_7.bin.z"));
        assert!(storage.chunk_path(-3, 7).exists());
        assert_eq!(storage.try_load(-3, 7), Some(blocks));

        let leftovers: Vec<_> = fs::read_dir(storage.chunk_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_save_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ChunkStorage::with_dims(dir.path(), SMALL).unwrap();
        storage.save(0, 0, &[1; 8]).unwrap();
        storage.save(0, 0, &[2; 8]).unwrap();
        assert_eq!(storage.try_load(0, 0), Some(vec![2; 8]));
    }

    #[test]
    fn test_wrong_length_is_rejected_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ChunkStorage::with_dims(dir.path(), SMALL).unwrap();
        assert!(matches!(storage.save(0, 0, &[1; 3]), Err(StorageError::Encode(_))));
        assert!(!storage.chunk_path(0, 0).exists());
    }

    #[test]
    fn test_legacy_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ChunkStorage::with_dims(dir.path(), SMALL).unwrap();
        fs::write(storage.legacy_path(4, 4), encode_legacy_gzip(SMALL, &[9; 8])).unwrap();
        assert_eq!(storage.try_load(4, 4), Some(vec![9; 8]));
    }

    #[test]
    fn test_corrupt_current_falls_back_to_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ChunkStorage::with_dims(dir.path(), SMALL).unwrap();
        fs::write(storage.chunk_path(1, 1), b"garbage").unwrap();
        assert!(storage.try_load(1, 1).is_none());

        fs::write(storage.legacy_path(1, 1), encode_legacy_gzip(SMALL, &[6; 8])).unwrap();
        assert_eq!(storage.try_load(1, 1), Some(vec![6; 8]));
    }

    #[test]
    fn test_dimension_mismatch_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let small = ChunkStorage::with_dims(dir.path(), SMALL).unwrap();
        small.save(0, 0, &[1; 8]).unwrap();
        let standard = ChunkStorage::open(dir.path()).unwrap();
        assert!(standard.try_load(0, 0).is_none());
    }

    #[test]
    fn test_concurrent_writers_of_one_chunk_never_expose_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = std::sync::Arc::new(ChunkStorage::with_dims(dir.path(), SMALL).unwrap());
        storage.save(2, 2, &[1; 8]).unwrap();

        let writers: Vec<_> = (1..=4u8)
            .map(|fill| {
                let storage = std::sync::Arc::clone(&storage);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        storage.save(2, 2, &[fill; 8]).unwrap();
                    }
                })
            })
            .collect();
        for _ in 0..50 {
            // Every read sees one writer's complete array, never a mix.
            if let Some(blocks) = storage.try_load(2, 2) {
                assert!(blocks.iter().all(|&b| b == blocks[0]), "{blocks:?}");
            }
        }
        for w in writers {
            w.join().unwrap();
        }

        let loaded = storage.try_load(2, 2).unwrap();
        assert!((1..=4).contains(&loaded[0]));
        let leftovers = fs::read_dir(storage.chunk_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
