//! Memory-mapped persistence plumbing
//!
//! Engines persist as a header followed by raw arrays of fixed-width cells.
//! Loading aliases the file through a shared read-only mapping: sections are
//! handed out as typed views into the map, validated for alignment and
//! bounds once at construction. Writing streams the same representation
//! through a buffered writer.

use crate::error::{Error, Result};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::Write;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

/// Marker for types that are plain fixed-width data: no padding surprises,
/// any bit pattern valid. Implementors must be `#[repr(C)]`.
///
/// # Safety
///
/// Implementors guarantee that every byte pattern of `size_of::<Self>()`
/// bytes is a valid value and that the type contains no padding whose
/// content could differ between equal values.
pub unsafe trait Pod: Copy {}

unsafe impl Pod for u8 {}
unsafe impl Pod for i32 {}
unsafe impl Pod for u32 {}

/// View a POD slice as raw bytes for writing.
pub fn pod_slice_bytes<T: Pod>(slice: &[T]) -> &[u8] {
    // Safety: T is Pod, so its bytes are plain data; lifetime is tied to
    // the input slice.
    unsafe {
        std::slice::from_raw_parts(
            slice.as_ptr() as *const u8,
            std::mem::size_of_val(slice),
        )
    }
}

/// View a single POD value as raw bytes for writing.
pub fn pod_bytes<T: Pod>(value: &T) -> &[u8] {
    pod_slice_bytes(std::slice::from_ref(value))
}

/// Write one POD value to a stream.
pub fn write_pod<T: Pod, W: Write>(out: &mut W, value: &T) -> Result<()> {
    out.write_all(pod_bytes(value))?;
    Ok(())
}

/// Write a POD slice to a stream.
pub fn write_pod_slice<T: Pod, W: Write>(out: &mut W, slice: &[T]) -> Result<()> {
    out.write_all(pod_slice_bytes(slice))?;
    Ok(())
}

/// A typed, read-only section of a shared file mapping.
///
/// Holds the mapping alive through an `Arc`; the pointed-to bytes stay at a
/// stable address until the last section (or file) handle is dropped.
pub struct MappedSlice<T> {
    map: Arc<Mmap>,
    offset: usize,
    count: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> MappedSlice<T> {
    /// Borrow the section as a typed slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // Safety: offset/count were validated against the map bounds and
        // T's alignment when the view was created, T is Pod, and the Arc
        // keeps the mapping (and thus the address range) alive.
        unsafe {
            std::slice::from_raw_parts(
                self.map.as_ptr().add(self.offset) as *const T,
                self.count,
            )
        }
    }

    /// Number of `T` elements in the section.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the section is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<T> std::fmt::Debug for MappedSlice<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedSlice")
            .field("offset", &self.offset)
            .field("count", &self.count)
            .finish()
    }
}

/// Read-only memory-mapped file, consumed as a sequence of typed sections.
///
/// Mirrors the on-disk layout: callers take the header struct, then each
/// array section in order, and finish by checking the file is exhausted.
pub struct MappedFile {
    map: Arc<Mmap>,
    position: usize,
}

impl MappedFile {
    /// Map a file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the mapping is private and read-only; mutation of the
        // underlying file by other processes is outside the supported
        // resource model.
        let map = unsafe { MmapOptions::new().map(&file)? };
        Ok(MappedFile {
            map: Arc::new(map),
            position: 0,
        })
    }

    /// Total length of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.map.len().saturating_sub(self.position)
    }

    fn check_take(&self, bytes: usize, align: usize) -> Result<()> {
        if self.remaining() < bytes {
            return Err(Error::corrupted(format!(
                "file truncated: need {} bytes at offset {}, have {}",
                bytes,
                self.position,
                self.remaining()
            )));
        }
        let addr = self.map.as_ptr() as usize + self.position;
        if addr % align != 0 {
            return Err(Error::corrupted(format!(
                "section at offset {} is not {}-byte aligned",
                self.position, align
            )));
        }
        Ok(())
    }

    /// Copy one POD struct out of the file and advance past it.
    pub fn take_struct<T: Pod>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        self.check_take(size, std::mem::align_of::<T>())?;
        // Safety: bounds and alignment checked above; T is Pod.
        let value = unsafe {
            std::ptr::read(self.map.as_ptr().add(self.position) as *const T)
        };
        self.position += size;
        Ok(value)
    }

    /// Hand out a typed view of the next `count` elements and advance
    /// past them. Zero-copy: the view aliases the mapping.
    pub fn take_slice<T: Pod>(&mut self, count: usize) -> Result<MappedSlice<T>> {
        let bytes = count
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| Error::corrupted("section size overflow"))?;
        self.check_take(bytes, std::mem::align_of::<T>())?;
        let section = MappedSlice {
            map: Arc::clone(&self.map),
            offset: self.position,
            count,
            _marker: PhantomData,
        };
        self.position += bytes;
        Ok(section)
    }

    /// Fail unless every byte of the file has been consumed.
    pub fn finish(self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::corrupted(format!(
                "{} trailing bytes after the last section",
                self.remaining()
            )));
        }
        Ok(())
    }
}

/// Table storage shared by the engines: owned and growable while building,
/// or aliasing a section of a read-only mapping after a load.
pub(crate) enum Table<T: Pod> {
    /// Heap-owned, mutable cells.
    Owned(Vec<T>),
    /// Read-only view into a mapped file.
    Mapped(MappedSlice<T>),
}

impl<T: Pod> Table<T> {
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        match self {
            Table::Owned(cells) => cells,
            Table::Mapped(view) => view.as_slice(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Table::Mapped(_))
    }

    /// Mutable access to existing cells; fails on a mapped table.
    pub fn as_mut_slice(&mut self) -> Result<&mut [T]> {
        match self {
            Table::Owned(cells) => Ok(cells),
            Table::Mapped(_) => Err(Error::unsupported(
                "mutation of a memory-mapped trie",
            )),
        }
    }

    /// The owned backing vector, for growth; fails on a mapped table.
    pub fn as_vec_mut(&mut self) -> Result<&mut Vec<T>> {
        match self {
            Table::Owned(cells) => Ok(cells),
            Table::Mapped(_) => Err(Error::unsupported(
                "mutation of a memory-mapped trie",
            )),
        }
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Table::Owned(cells) => write!(f, "Table::Owned(len={})", cells.len()),
            Table::Mapped(view) => write!(f, "Table::Mapped(len={})", view.len()),
        }
    }
}

/// Humanize a byte count for log output.
pub fn pretty_size(size: usize) -> String {
    const GB: f64 = (1024 * 1024 * 1024) as f64;
    const MB: f64 = (1024 * 1024) as f64;
    const KB: f64 = 1024.0;
    let size = size as f64;
    if size > GB {
        format!("{:.2}G", size / GB)
    } else if size > MB {
        format!("{:.2}M", size / MB)
    } else if size > KB {
        format!("{:.2}K", size / KB)
    } else {
        format!("{:.2}", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn test_take_struct_and_slice() {
        let mut file = NamedTempFile::new().unwrap();
        let header: [i32; 2] = [7, 3];
        let body: [i32; 3] = [10, 20, 30];
        file.write_all(pod_slice_bytes(&header[..])).unwrap();
        file.write_all(pod_slice_bytes(&body[..])).unwrap();
        file.flush().unwrap();

        let mut mapped = MappedFile::open(file.path()).unwrap();
        assert_eq!(mapped.len(), 20);
        assert_eq!(mapped.take_struct::<i32>().unwrap(), 7);
        assert_eq!(mapped.take_struct::<i32>().unwrap(), 3);
        let view = mapped.take_slice::<i32>(3).unwrap();
        assert_eq!(view.as_slice(), &[10, 20, 30]);
        mapped.finish().unwrap();
    }

    #[test]
    fn test_truncated_file_is_corrupted() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        file.flush().unwrap();

        let mut mapped = MappedFile::open(file.path()).unwrap();
        let err = mapped.take_struct::<i32>().unwrap_err();
        assert_eq!(err.category(), "corrupted");
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(pod_bytes(&5i32)).unwrap();
        file.write_all(&[0u8; 2]).unwrap();
        file.flush().unwrap();

        let mut mapped = MappedFile::open(file.path()).unwrap();
        mapped.take_struct::<i32>().unwrap();
        assert!(mapped.finish().is_err());
    }

    #[test]
    fn test_pretty_size() {
        assert_eq!(pretty_size(512), "512.00");
        assert_eq!(pretty_size(2048), "2.00K");
        assert_eq!(pretty_size(3 * 1024 * 1024), "3.00M");
    }
}
