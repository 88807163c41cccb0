//! Persisted layout primitives.
//!
//! Nothing in the crash record is ever reinterpreted in place. A structure is
//! read by copying its bytes out of the region and decoding them field by
//! field, and written by encoding into a buffer and copying that back. All
//! multi-byte integers are little-endian; there is no implicit padding.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;
extern crate self as bbox_layout;

mod fixed_str;

use alloc::vec;
use alloc::vec::Vec;

pub use bbox_layout_derive::Persist;
pub use fixed_str::{copy_truncated, fixed_str, terminate};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("buffer of {have} bytes is shorter than the {need}-byte encoding")]
    TooShort { need: usize, have: usize },
}

/// A type with a fixed-size little-endian encoding.
///
/// `write_le` and `read_le` receive slices of exactly [`SIZE`](Self::SIZE)
/// bytes; use [`encode`] / [`decode`] at call sites, which check lengths.
pub trait Persist: Sized {
    const SIZE: usize;

    fn write_le(&self, out: &mut [u8]);

    fn read_le(buf: &[u8]) -> Self;
}

/// Encode `value` into the front of `out`.
pub fn encode<T: Persist>(value: &T, out: &mut [u8]) -> Result<(), LayoutError> {
    let have = out.len();
    let dst = out.get_mut(..T::SIZE).ok_or(LayoutError::TooShort { need: T::SIZE, have })?;
    value.write_le(dst);
    Ok(())
}

/// Decode a `T` from the front of `buf`.
pub fn decode<T: Persist>(buf: &[u8]) -> Result<T, LayoutError> {
    let src = buf.get(..T::SIZE).ok_or(LayoutError::TooShort {
        need: T::SIZE,
        have: buf.len(),
    })?;
    Ok(T::read_le(src))
}

/// Encode into a fresh buffer.
#[must_use]
pub fn to_vec<T: Persist>(value: &T) -> Vec<u8> {
    let mut out = vec![0u8; T::SIZE];
    value.write_le(&mut out);
    out
}

macro_rules! persist_int {
    ($($t:ty),*) => {$(
        impl Persist for $t {
            const SIZE: usize = size_of::<$t>();

            #[inline]
            fn write_le(&self, out: &mut [u8]) {
                out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn read_le(buf: &[u8]) -> Self {
                let mut b = [0u8; size_of::<$t>()];
                b.copy_from_slice(&buf[..Self::SIZE]);
                <$t>::from_le_bytes(b)
            }
        }
    )*};
}

persist_int!(u8, u16, u32, u64);

/// Stored as a full `u32` so records stay 4-byte aligned; any nonzero value
/// reads back as `true`.
impl Persist for bool {
    const SIZE: usize = 4;

    fn write_le(&self, out: &mut [u8]) {
        u32::from(*self).write_le(out);
    }

    fn read_le(buf: &[u8]) -> Self {
        u32::read_le(buf) != 0
    }
}

impl<const N: usize> Persist for [u8; N] {
    const SIZE: usize = N;

    fn write_le(&self, out: &mut [u8]) {
        out[..N].copy_from_slice(self);
    }

    fn read_le(buf: &[u8]) -> Self {
        let mut a = [0u8; N];
        a.copy_from_slice(&buf[..N]);
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, Persist)]
    struct Sample {
        magic: u32,
        flag: bool,
        addr: u64,
        name: [u8; 6],
        #[persist(skip)]
        cache: u16,
    }

    #[test]
    fn derived_layout_is_packed_in_order() {
        assert_eq!(<Sample as Persist>::SIZE, 4 + 4 + 8 + 6);
        assert_eq!(Sample::MAGIC_OFFSET, 0);
        assert_eq!(Sample::FLAG_OFFSET, 4);
        assert_eq!(Sample::ADDR_OFFSET, 8);
        assert_eq!(Sample::NAME_OFFSET, 16);
    }

    #[test]
    fn bytes_are_little_endian() {
        let s = Sample {
            magic: 0xDEAE_AABE,
            flag: true,
            addr: 0x1122_3344_5566_7788,
            name: *b"rdrmem",
            cache: 9,
        };
        let bytes = to_vec(&s);
        assert_eq!(&bytes[0..4], &[0xBE, 0xAA, 0xAE, 0xDE]);
        assert_eq!(&bytes[4..8], &[1, 0, 0, 0]);
        assert_eq!(bytes[8], 0x88);
        assert_eq!(&bytes[16..], b"rdrmem");

        let back: Sample = decode(&bytes).unwrap();
        assert_eq!(back.addr, s.addr);
        // skipped fields come back defaulted
        assert_eq!(back.cache, 0);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let mut small = [0u8; 8];
        assert_eq!(
            encode(&Sample::default(), &mut small),
            Err(LayoutError::TooShort { need: 22, have: 8 })
        );
        assert!(decode::<u64>(&[1, 2, 3]).is_err());
    }

    #[test]
    fn nonzero_bool_reads_true() {
        assert!(bool::read_le(&[0, 0, 2, 0]));
        assert!(!bool::read_le(&[0, 0, 0, 0]));
    }
}
