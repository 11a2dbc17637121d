// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Persistent cell grid
//!
//! One learning cell per (camera sample slot, dense LED pixel), kept in a
//! memory-mapped file so memory survives restarts (warm start).
//!
//! Format:
//! ```text
//! Header (64 bytes):
//!   [0:8]    Magic "VISMEMRY" (8 bytes ASCII)
//!   [8:12]   Format version (u32 LE)
//!   [12:16]  Sampler blocks wide (u32 LE)
//!   [16:20]  Sampler blocks high (u32 LE)
//!   [20:24]  Dense LED count (u32 LE)
//!   [24:28]  Cell size in bytes (u32 LE, always 16)
//!   [28:64]  Padding (zeros)
//!
//! Then blocks_wide * blocks_high * dense_len cells, sample-major:
//!   [0:8]    short-term memory (f64, native byte order)
//!   [8:16]   long-term memory (f64, native byte order)
//! ```
//!
//! Files written before the header existed hold only the cell array. Such a file is
//! recognised by its exact length and migrated in place on open.
//!
//! Concurrent access to the same file from several processes is not supported.

use crate::error::MemoryStoreError;
use crate::geometry::GridShape;
use bytemuck::{Pod, Zeroable};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MAGIC: &[u8; 8] = b"VISMEMRY";
const VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 64;
pub const CELL_SIZE: usize = std::mem::size_of::<Cell>();

/// Fast- and slow-adapting correlation estimate for one (sample slot, pixel) pair
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Cell {
    pub short_term: f64,
    pub long_term: f64,
}

/// Memory-mapped cell grid
pub struct MemoryStore {
    path: PathBuf,
    mmap: MmapMut,
    shape: GridShape,
}

impl MemoryStore {
    /// Open (or create) the cell grid at `path` for the given shape
    ///
    /// A missing or empty file is created with a zeroed grid. An existing file is
    /// reused as-is when its header matches `shape`; a legacy headerless file of the
    /// exact cell-array length is migrated. Anything else is rejected without
    /// touching the file.
    pub fn open(path: impl AsRef<Path>, shape: GridShape) -> Result<Self, MemoryStoreError> {
        let path = path.as_ref().to_path_buf();
        let expected = file_len(shape);

        let file = open_file(&path).map_err(|source| MemoryStoreError::Open {
            path: path.clone(),
            source,
        })?;
        let actual = file
            .metadata()
            .map_err(|source| MemoryStoreError::Open {
                path: path.clone(),
                source,
            })?
            .len();

        let created = if actual == 0 {
            initialize_new(&file, &path, shape)?;
            true
        } else if actual == expected {
            false
        } else if shape.cell_count() > 0 && actual == legacy_len(shape) {
            migrate_headerless(&file, &path, shape)?;
            false
        } else {
            return Err(MemoryStoreError::SizeMismatch {
                path,
                expected,
                actual,
            });
        };

        // Safety: the file stays open for the lifetime of the mapping's use here and the
        // store is the only writer (single process access is a documented requirement).
        let mut mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|source| {
            MemoryStoreError::Map {
                path: path.clone(),
                source,
            }
        })?;

        if created {
            info!(
                "[VISMEM-STORE] Created {:?} ({} cells, {} bytes)",
                path,
                shape.cell_count(),
                expected
            );
        } else {
            let found = parse_header(&mmap[..HEADER_SIZE])
                .map_err(|reason| MemoryStoreError::IncompatibleHeader {
                    path: path.clone(),
                    reason,
                })?;
            if found != shape {
                return Err(MemoryStoreError::IncompatibleHeader {
                    path,
                    reason: format!("file holds {:?}, expected {:?}", found, shape),
                });
            }
            debug!("[VISMEM-STORE] Reusing existing memory in {:?}", path);
        }

        bytemuck::try_cast_slice::<u8, Cell>(&mmap[HEADER_SIZE..]).map_err(|e| {
            MemoryStoreError::Map {
                path: path.clone(),
                source: std::io::Error::other(format!("cell array not addressable: {:?}", e)),
            }
        })?;

        info!(
            "[VISMEM-STORE] Mapped {} cells from {:?}",
            shape.cell_count(),
            path
        );

        Ok(Self { path, mmap, shape })
    }

    /// Read the grid shape recorded in an existing file's header without mapping it
    pub fn inspect(path: impl AsRef<Path>) -> Result<GridShape, MemoryStoreError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| MemoryStoreError::Open {
            path: path.clone(),
            source,
        };

        let mut file = File::open(&path).map_err(open_err)?;
        let actual = file.metadata().map_err(open_err)?.len();
        if actual < HEADER_SIZE as u64 {
            return Err(MemoryStoreError::IncompatibleHeader {
                path,
                reason: format!("file is {} bytes, shorter than the header", actual),
            });
        }

        let mut header = [0u8; HEADER_SIZE];
        file.read_exact(&mut header).map_err(open_err)?;
        let shape = parse_header(&header)
            .map_err(|reason| MemoryStoreError::IncompatibleHeader {
                path: path.clone(),
                reason,
            })?;

        let expected = file_len(shape);
        if actual != expected {
            return Err(MemoryStoreError::SizeMismatch {
                path,
                expected,
                actual,
            });
        }
        Ok(shape)
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All cells, sample-major
    pub fn cells(&self) -> &[Cell] {
        bytemuck::cast_slice(&self.mmap[HEADER_SIZE..])
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        bytemuck::cast_slice_mut(&mut self.mmap[HEADER_SIZE..])
    }

    /// Cells of one sample slot, indexed by dense pixel
    pub fn slot_cells(&self, slot: usize) -> &[Cell] {
        let dense = self.shape.dense_len();
        &self.cells()[slot * dense..(slot + 1) * dense]
    }

    pub fn slot_cells_mut(&mut self, slot: usize) -> &mut [Cell] {
        let dense = self.shape.dense_len();
        &mut self.cells_mut()[slot * dense..(slot + 1) * dense]
    }

    /// Write dirty pages back to the file
    pub fn flush(&self) -> Result<(), MemoryStoreError> {
        self.mmap.flush().map_err(|source| MemoryStoreError::Flush {
            path: self.path.clone(),
            source,
        })
    }

    /// Flush and release the mapping. The file and its contents stay on disk.
    pub fn close(self) -> Result<(), MemoryStoreError> {
        self.flush()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Err(e) = self.mmap.flush() {
            warn!("[VISMEM-STORE] Flush on release failed for {:?}: {}", self.path, e);
        }
        info!("[VISMEM-STORE] Released mapping of {:?}", self.path);
    }
}

fn open_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);
    #[cfg(unix)]
    options.mode(0o666); // rw-rw-rw-
    options.open(path)
}

fn file_len(shape: GridShape) -> u64 {
    (HEADER_SIZE + shape.cell_count() * CELL_SIZE) as u64
}

fn legacy_len(shape: GridShape) -> u64 {
    (shape.cell_count() * CELL_SIZE) as u64
}

fn write_header(header: &mut [u8], shape: GridShape) {
    header.fill(0);
    header[0..8].copy_from_slice(MAGIC);
    header[8..12].copy_from_slice(&VERSION.to_le_bytes());
    header[12..16].copy_from_slice(&shape.blocks_wide.to_le_bytes());
    header[16..20].copy_from_slice(&shape.blocks_high.to_le_bytes());
    header[20..24].copy_from_slice(&shape.dense_len.to_le_bytes());
    header[24..28].copy_from_slice(&(CELL_SIZE as u32).to_le_bytes());
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}

fn parse_header(header: &[u8]) -> Result<GridShape, String> {
    if &header[0..8] != MAGIC {
        return Err("bad magic".to_string());
    }
    let version = read_u32(header, 8);
    if version != VERSION {
        return Err(format!("unsupported format version {}", version));
    }
    let cell_size = read_u32(header, 24);
    if cell_size as usize != CELL_SIZE {
        return Err(format!("cell size {} != {}", cell_size, CELL_SIZE));
    }
    Ok(GridShape {
        blocks_wide: read_u32(header, 12),
        blocks_high: read_u32(header, 16),
        dense_len: read_u32(header, 20),
    })
}

/// Size a new file and persist its header before anything maps it
///
/// On failure the file is truncated back to empty, so the next open starts over.
fn initialize_new(file: &File, path: &Path, shape: GridShape) -> Result<(), MemoryStoreError> {
    let result = write_new_header(file, path, shape);
    if result.is_err() {
        if let Err(e) = file.set_len(0) {
            warn!("[VISMEM-STORE] Could not roll back {:?}: {}", path, e);
        }
    }
    result
}

fn write_new_header(file: &File, path: &Path, shape: GridShape) -> Result<(), MemoryStoreError> {
    let len = file_len(shape);
    file.set_len(len).map_err(|source| MemoryStoreError::Resize {
        path: path.to_path_buf(),
        len,
        source,
    })?;

    let flush_err = |source| MemoryStoreError::Flush {
        path: path.to_path_buf(),
        source,
    };
    let mut header = [0u8; HEADER_SIZE];
    write_header(&mut header, shape);

    let mut writer = file;
    writer.seek(SeekFrom::Start(0)).map_err(flush_err)?;
    writer.write_all(&header).map_err(flush_err)?;
    writer.sync_all().map_err(flush_err)?;
    Ok(())
}

/// Prepend a header to a headerless cell array
fn migrate_headerless(file: &File, path: &Path, shape: GridShape) -> Result<(), MemoryStoreError> {
    let migrate_err = |source| MemoryStoreError::Migrate {
        path: path.to_path_buf(),
        source,
    };

    let mut cells = Vec::with_capacity(legacy_len(shape) as usize);
    let mut reader = file;
    reader.seek(SeekFrom::Start(0)).map_err(migrate_err)?;
    reader.read_to_end(&mut cells).map_err(migrate_err)?;

    let mut header = [0u8; HEADER_SIZE];
    write_header(&mut header, shape);

    let mut writer = file;
    writer.set_len(file_len(shape)).map_err(migrate_err)?;
    writer.seek(SeekFrom::Start(0)).map_err(migrate_err)?;
    writer.write_all(&header).map_err(migrate_err)?;
    writer.write_all(&cells).map_err(migrate_err)?;
    writer.sync_all().map_err(migrate_err)?;

    warn!(
        "[VISMEM-STORE] Migrated headerless memory file {:?} ({} cells)",
        path,
        shape.cell_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn shape() -> GridShape {
        GridShape {
            blocks_wide: 3,
            blocks_high: 2,
            dense_len: 5,
        }
    }

    #[test]
    fn test_create_sizes_file_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mem.bin");

        let store = MemoryStore::open(&path, shape()).unwrap();
        assert_eq!(store.cells().len(), 30);
        assert!(store.cells().iter().all(|c| *c == Cell::default()));
        drop(store);

        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, (HEADER_SIZE + 30 * 16) as u64);
    }

    #[test]
    fn test_new_file_header_persisted_before_mapping() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mem.bin");

        // Simulates a failure right after initialization: nothing was ever mapped
        let file = open_file(&path).unwrap();
        initialize_new(&file, &path, shape()).unwrap();
        drop(file);

        assert_eq!(MemoryStore::inspect(&path).unwrap(), shape());
        let store = MemoryStore::open(&path, shape()).unwrap();
        assert!(store.cells().iter().all(|c| *c == Cell::default()));
    }

    #[test]
    fn test_failed_create_leaves_file_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mem.bin");
        std::fs::write(&path, b"").unwrap();

        // A read-only handle cannot be resized
        let file = File::open(&path).unwrap();
        assert!(initialize_new(&file, &path, shape()).is_err());
        drop(file);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        MemoryStore::open(&path, shape()).unwrap();
        assert_eq!(MemoryStore::inspect(&path).unwrap(), shape());
    }

    #[test]
    fn test_reopen_preserves_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mem.bin");

        let mut store = MemoryStore::open(&path, shape()).unwrap();
        for (i, cell) in store.cells_mut().iter_mut().enumerate() {
            cell.short_term = i as f64 * 0.5;
            cell.long_term = -(i as f64) / 3.0;
        }
        store.close().unwrap();
        let before = std::fs::read(&path).unwrap();

        let store = MemoryStore::open(&path, shape()).unwrap();
        assert_eq!(store.cells()[7].short_term, 3.5);
        drop(store);

        let after = std::fs::read(&path).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_slot_cells_are_sample_major() {
        let dir = tempdir().unwrap();
        let mut store = MemoryStore::open(dir.path().join("mem.bin"), shape()).unwrap();

        store.slot_cells_mut(2)[4].long_term = 9.0;
        assert_eq!(store.cells()[2 * 5 + 4].long_term, 9.0);
        assert_eq!(store.slot_cells(2).len(), 5);
    }

    #[test]
    fn test_wrong_size_rejected_without_mutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mem.bin");
        std::fs::write(&path, vec![7u8; 100]).unwrap();

        let result = MemoryStore::open(&path, shape());
        assert!(matches!(
            result,
            Err(MemoryStoreError::SizeMismatch { actual: 100, .. })
        ));
        assert_eq!(std::fs::read(&path).unwrap(), vec![7u8; 100]);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mem.bin");
        MemoryStore::open(&path, shape()).unwrap();

        // Same cell count, different layout
        let other = GridShape {
            blocks_wide: 2,
            blocks_high: 3,
            dense_len: 5,
        };
        let result = MemoryStore::open(&path, other);
        assert!(matches!(
            result,
            Err(MemoryStoreError::IncompatibleHeader { .. })
        ));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mem.bin");
        std::fs::write(&path, vec![0u8; file_len(shape()) as usize]).unwrap();

        let result = MemoryStore::open(&path, shape());
        assert!(matches!(
            result,
            Err(MemoryStoreError::IncompatibleHeader { .. })
        ));
    }

    #[test]
    fn test_headerless_file_migrated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.bin");

        let legacy: Vec<Cell> = (0..30)
            .map(|i| Cell {
                short_term: i as f64,
                long_term: 1.0 / (i as f64 + 1.0),
            })
            .collect();
        std::fs::write(&path, bytemuck::cast_slice::<Cell, u8>(&legacy)).unwrap();

        let store = MemoryStore::open(&path, shape()).unwrap();
        assert_eq!(store.cells(), legacy.as_slice());
        drop(store);

        assert_eq!(MemoryStore::inspect(&path).unwrap(), shape());
    }

    #[test]
    fn test_inspect_reads_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mem.bin");
        MemoryStore::open(&path, shape()).unwrap();

        assert_eq!(MemoryStore::inspect(&path).unwrap(), shape());
        assert!(MemoryStore::inspect(dir.path().join("missing.bin")).is_err());
    }

    #[test]
    fn test_open_in_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("mem.bin");
        assert!(matches!(
            MemoryStore::open(&path, shape()),
            Err(MemoryStoreError::Open { .. })
        ));
    }
}
