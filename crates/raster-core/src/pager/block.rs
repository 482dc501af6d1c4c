//! Shared backing memory for zero-copy pages.

use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::File;

use crate::error::Result;

enum BlockStorage {
    Heap(Box<[u8]>),
    MappedMut(MmapMut),
    Mapped(Mmap),
}

/// A contiguous byte region that pages point into.
///
/// The region is either a heap allocation or a file mapping. Read-only
/// mappings are never handed out as writable pages.
pub struct PageBlock {
    ptr: *mut u8,
    len: usize,
    writable: bool,
    storage: BlockStorage,
}

// SAFETY: the pointer targets memory owned by `storage`, which moves with the
// block and is never reallocated. Writes go through pages whose pager holds an
// exclusive writable lease on the block.
unsafe impl Send for PageBlock {}
unsafe impl Sync for PageBlock {}

impl PageBlock {
    /// Zero-filled heap block of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self::from_vec(vec![0u8; len])
    }

    /// Heap block taking ownership of `data`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let mut heap = data.into_boxed_slice();
        let ptr = heap.as_mut_ptr();
        let len = heap.len();
        Self {
            ptr,
            len,
            writable: true,
            storage: BlockStorage::Heap(heap),
        }
    }

    /// Map `file` into memory.
    pub fn map_file(file: &File, writable: bool) -> Result<Self> {
        if writable {
            // SAFETY: the file is owned by the caller for the mapping's life;
            // external modification of the file is not supported.
            let mut mapping = unsafe { MmapOptions::new().map_mut(file)? };
            let ptr = mapping.as_mut_ptr();
            let len = mapping.len();
            Ok(Self {
                ptr,
                len,
                writable: true,
                storage: BlockStorage::MappedMut(mapping),
            })
        } else {
            // SAFETY: as above.
            let mapping = unsafe { MmapOptions::new().map(file)? };
            let ptr = mapping.as_ptr() as *mut u8;
            let len = mapping.len();
            Ok(Self {
                ptr,
                len,
                writable: false,
                storage: BlockStorage::Mapped(mapping),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_mapped(&self) -> bool {
        !matches!(self.storage, BlockStorage::Heap(_))
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr/len describe memory owned by `storage`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Raw pointer to the start of the block for writable pages.
    pub(crate) fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Flush a writable mapping to its file.
    pub fn flush(&self) -> Result<()> {
        if let BlockStorage::MappedMut(mapping) = &self.storage {
            mapping.flush()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PageBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageBlock")
            .field("len", &self.len)
            .field("writable", &self.writable)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_heap_block() {
        let block = PageBlock::from_vec(vec![1, 2, 3]);
        assert_eq!(block.len(), 3);
        assert!(block.is_writable());
        assert!(!block.is_mapped());
        assert_eq!(block.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_read_only_mapping() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[5, 6, 7, 8]).unwrap();
        let block = PageBlock::map_file(&file, false).unwrap();
        assert!(!block.is_writable());
        assert!(block.is_mapped());
        assert_eq!(block.as_slice(), &[5, 6, 7, 8]);
    }
}
