use crate::error::{BloomError, Result};
use bitvec::{order::Lsb0, vec::BitVec};
use byteorder::{ByteOrder, LittleEndian};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

// Trait for the bit-array backends
pub trait BitStore {
    /// Returns the bit at `index`.
    fn get_bit(&self, index: u64) -> Result<bool>;
    /// Sets the bit at `index`; setting an already-set bit is a no-op.
    fn set_bit(&mut self, index: u64) -> Result<()>;
    /// The bit array as raw bytes, bit `i` stored at `byte[i / 8]`
    /// position `i % 8`.
    fn bytes(&self) -> Result<&[u8]>;
    /// Number of set bits across the whole array.
    fn count_set_bits(&self) -> Result<u64> {
        Ok(self
            .bytes()?
            .iter()
            .map(|byte| u64::from(byte.count_ones()))
            .sum())
    }
    /// Clears every bit.
    fn clear(&mut self) -> Result<()>;
    /// Persists the element counter where the backend is durable.
    fn record_elements_added(&mut self, count: u64) -> Result<()>;
    /// Backing file, if any.
    fn path(&self) -> Option<&Path> {
        None
    }
    fn is_on_disk(&self) -> bool {
        false
    }
}

/// In-process bit array. All operations are pure, no I/O.
pub struct MemoryBits {
    // Lsb0 over u8 gives exactly the persisted layout: bit i lives in
    // byte i/8 at position i%8.
    bits: BitVec<u8, Lsb0>,
}

impl MemoryBits {
    pub fn zeroed(byte_length: usize) -> Self {
        Self {
            bits: BitVec::repeat(false, byte_length * 8),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bits: BitVec::from_vec(bytes),
        }
    }
}

impl BitStore for MemoryBits {
    fn get_bit(&self, index: u64) -> Result<bool> {
        self.bits
            .get(index as usize)
            .map(|bit| *bit)
            .ok_or(BloomError::IndexOutOfBounds {
                index,
                capacity: self.bits.len() as u64,
            })
    }

    fn set_bit(&mut self, index: u64) -> Result<()> {
        let idx = index as usize;
        if idx >= self.bits.len() {
            return Err(BloomError::IndexOutOfBounds {
                index,
                capacity: self.bits.len() as u64,
            });
        }
        self.bits.set(idx, true);
        Ok(())
    }

    fn bytes(&self) -> Result<&[u8]> {
        Ok(self.bits.as_raw_slice())
    }

    fn count_set_bits(&self) -> Result<u64> {
        Ok(self.bits.count_ones() as u64)
    }

    fn clear(&mut self) -> Result<()> {
        self.bits.fill(false);
        Ok(())
    }

    fn record_elements_added(&mut self, _count: u64) -> Result<()> {
        Ok(())
    }
}

/// Memory-mapped window over a filter file.
///
/// The mapping covers the whole file: the bit array occupies the leading
/// `byte_length` bytes and the metadata trailer sits behind it, so the
/// element counter can be updated in place. Mutations are visible to any
/// reader mapping the same region; the model is single-writer,
/// single-process, with no cross-process lock taken.
pub struct MmapBits {
    inner: Option<MmapInner>,
    path: PathBuf,
    byte_length: usize,
}

struct MmapInner {
    map: MmapMut,
    file: File,
}

impl MmapBits {
    /// Maps an existing filter file. The caller has already validated
    /// that the file length matches the derived geometry.
    pub fn open(path: &Path, byte_length: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        // Safety: file length was validated against the filter geometry
        // and the single-writer model leaves concurrent truncation by
        // another process out of scope.
        let map = unsafe { MmapMut::map_mut(&file)? };
        debug!(
            path = %path.display(),
            bytes = byte_length,
            "attached bloom filter mapping"
        );
        Ok(Self {
            inner: Some(MmapInner { map, file }),
            path: path.to_path_buf(),
            byte_length,
        })
    }

    /// Flushes outstanding writes, then releases the mapping and the
    /// file handle. Terminal: every later operation fails with
    /// `ClosedFilter`.
    pub fn close(&mut self) -> Result<()> {
        let inner = self.inner.take().ok_or(BloomError::ClosedFilter)?;
        inner.map.flush()?;
        inner.file.sync_all()?;
        debug!(path = %self.path.display(), "closed bloom filter mapping");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn inner(&self) -> Result<&MmapInner> {
        self.inner.as_ref().ok_or(BloomError::ClosedFilter)
    }

    fn inner_mut(&mut self) -> Result<&mut MmapInner> {
        self.inner.as_mut().ok_or(BloomError::ClosedFilter)
    }
}

impl BitStore for MmapBits {
    fn get_bit(&self, index: u64) -> Result<bool> {
        let capacity = (self.byte_length * 8) as u64;
        let inner = self.inner()?;
        if index >= capacity {
            return Err(BloomError::IndexOutOfBounds { index, capacity });
        }
        let idx = index as usize;
        Ok(inner.map[idx / 8] & (1 << (idx % 8)) != 0)
    }

    fn set_bit(&mut self, index: u64) -> Result<()> {
        let capacity = (self.byte_length * 8) as u64;
        let inner = self.inner_mut()?;
        if index >= capacity {
            return Err(BloomError::IndexOutOfBounds { index, capacity });
        }
        let idx = index as usize;
        inner.map[idx / 8] |= 1 << (idx % 8);
        // Durability point: the modified byte reaches the mapping, then
        // the file handle, before this returns.
        inner.map.flush_range(idx / 8, 1)?;
        inner.file.sync_data()?;
        Ok(())
    }

    fn bytes(&self) -> Result<&[u8]> {
        Ok(&self.inner()?.map[..self.byte_length])
    }

    fn clear(&mut self) -> Result<()> {
        let byte_length = self.byte_length;
        let inner = self.inner_mut()?;
        inner.map[..byte_length].fill(0);
        inner.map.flush()?;
        inner.file.sync_data()?;
        Ok(())
    }

    fn record_elements_added(&mut self, count: u64) -> Result<()> {
        // The counter is the second u64 of the trailer behind the array.
        let offset = self.byte_length + 8;
        let inner = self.inner_mut()?;
        LittleEndian::write_u64(&mut inner.map[offset..offset + 8], count);
        inner.map.flush_range(offset, 8)?;
        inner.file.sync_data()?;
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn is_on_disk(&self) -> bool {
        true
    }
}

impl Drop for MmapBits {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let _ = inner.map.flush();
        }
    }
}
