//! # Byte Writer
//!
//! Cursor-based writer over a mutable byte slice plus a matching reader.

use std::ops::Range;

use bytemuck::Pod;

use crate::error::{StoreError, StoreResult};

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a non-zero power of two.
#[inline]
#[must_use]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Validates `offset..offset + len` against a buffer of `capacity` bytes.
#[inline]
fn checked_range(offset: usize, len: usize, capacity: usize) -> StoreResult<Range<usize>> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(offset..end),
        _ => Err(StoreError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}

/// Bounds-checked sequential writer.
///
/// Every write either lands completely inside the slice or fails without
/// touching it.
///
/// # Example
///
/// ```rust
/// use tessera_core::ByteWriter;
///
/// let mut bytes = [0u8; 8];
/// let mut writer = ByteWriter::new(&mut bytes);
/// writer.write_pod(&1.5f32).unwrap();
/// writer.write_pod(&7u32).unwrap();
/// assert!(writer.write_pod(&0u8).is_err());
/// ```
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    cursor: usize,
}

impl<'a> ByteWriter<'a> {
    /// Creates a writer positioned at the start of `buf`.
    #[inline]
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    /// Creates a writer positioned at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if `offset` is past the end of `buf`.
    #[inline]
    pub fn at(buf: &'a mut [u8], offset: usize) -> StoreResult<Self> {
        checked_range(offset, 0, buf.len())?;
        Ok(Self { buf, cursor: offset })
    }

    /// Current cursor position in bytes.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor
    }

    /// Total size of the underlying slice.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes left between the cursor and the end of the slice.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Moves the cursor to an absolute offset.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if `offset` is past the end of the slice.
    pub fn seek(&mut self, offset: usize) -> StoreResult<()> {
        checked_range(offset, 0, self.buf.len())?;
        self.cursor = offset;
        Ok(())
    }

    /// Copies `bytes` at the cursor and advances past them.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the bytes do not fit.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> StoreResult<()> {
        let range = checked_range(self.cursor, bytes.len(), self.buf.len())?;
        self.cursor = range.end;
        self.buf[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Copies a plain-old-data value at the cursor.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the value does not fit.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> StoreResult<()> {
        self.write_bytes(bytemuck::bytes_of(value))
    }

    /// Writes `len` zero bytes.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the zeros do not fit.
    pub fn write_zeros(&mut self, len: usize) -> StoreResult<()> {
        let range = checked_range(self.cursor, len, self.buf.len())?;
        self.cursor = range.end;
        self.buf[range].fill(0);
        Ok(())
    }

    /// Zero-fills up to the next multiple of `alignment`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the padding does not fit.
    pub fn pad_to(&mut self, alignment: usize) -> StoreResult<()> {
        let target = align_up(self.cursor as u64, alignment as u64) as usize;
        self.write_zeros(target - self.cursor)
    }
}

/// Bounds-checked random-access reader.
#[derive(Clone, Copy)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
}

impl<'a> ByteReader<'a> {
    /// Wraps a byte slice.
    #[inline]
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Borrows `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range leaves the slice.
    #[inline]
    pub fn slice(&self, offset: usize, len: usize) -> StoreResult<&'a [u8]> {
        let range = checked_range(offset, len, self.buf.len())?;
        Ok(&self.buf[range])
    }

    /// Reads a plain-old-data value at `offset` (no alignment requirement).
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the value leaves the slice.
    #[inline]
    pub fn read_pod<T: Pod>(&self, offset: usize) -> StoreResult<T> {
        let bytes = self.slice(offset, std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(288 * 3, 256), 1024);
    }

    #[test]
    fn test_write_and_read_back() {
        let mut bytes = [0u8; 32];
        let mut writer = ByteWriter::new(&mut bytes);
        writer.write_pod(&[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        writer.write_pod(&0xDEAD_BEEFu32).unwrap();
        assert_eq!(writer.position(), 20);
        assert_eq!(writer.remaining(), 12);

        let reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_pod::<[f32; 4]>(0).unwrap(), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(reader.read_pod::<u32>(16).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_overflowing_write_leaves_buffer_untouched() {
        let mut bytes = [7u8; 6];
        let mut writer = ByteWriter::at(&mut bytes, 4).unwrap();
        let err = writer.write_pod(&1u32).unwrap_err();
        assert_eq!(
            err,
            StoreError::OutOfBounds {
                offset: 4,
                len: 4,
                capacity: 6
            }
        );
        assert_eq!(writer.position(), 4);
        assert_eq!(bytes, [7u8; 6]);
    }

    #[test]
    fn test_seek_past_end_fails() {
        let mut bytes = [0u8; 4];
        assert!(ByteWriter::at(&mut bytes, 5).is_err());
        let mut writer = ByteWriter::new(&mut bytes);
        assert!(writer.seek(4).is_ok());
        assert!(writer.seek(5).is_err());
    }

    #[test]
    fn test_pad_to_zero_fills() {
        let mut bytes = [0xFFu8; 16];
        let mut writer = ByteWriter::new(&mut bytes);
        writer.write_bytes(&[1, 2, 3]).unwrap();
        writer.pad_to(8).unwrap();
        assert_eq!(writer.position(), 8);
        assert_eq!(&bytes[..8], &[1, 2, 3, 0, 0, 0, 0, 0]);
        assert_eq!(bytes[8], 0xFF);
    }

    #[test]
    fn test_reader_rejects_out_of_range() {
        let bytes = [0u8; 4];
        let reader = ByteReader::new(&bytes);
        assert!(reader.read_pod::<u64>(0).is_err());
        assert!(reader.slice(usize::MAX, 2).is_err());
    }
}
