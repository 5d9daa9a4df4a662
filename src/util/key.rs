//! Key types accepted by the index.

use std::fmt;

/// Fixed-width unsigned key stored in a sorted array.
///
/// All tree arithmetic happens on the `u64` widening of the key, so the
/// trait only needs the conversions in both directions.
pub trait Key: Copy + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Width of the key in bytes (persisted in dumps).
    const BYTES: u8;

    /// Smallest representable key.
    const MIN: Self;

    /// Widen to `u64`.
    fn to_u64(self) -> u64;

    /// Narrow from `u64`, failing if the value does not fit.
    fn from_u64(value: u64) -> Option<Self>;
}

impl Key for u32 {
    const BYTES: u8 = 4;
    const MIN: Self = 0;

    #[inline]
    fn to_u64(self) -> u64 {
        u64::from(self)
    }

    #[inline]
    fn from_u64(value: u64) -> Option<Self> {
        u32::try_from(value).ok()
    }
}

impl Key for u64 {
    const BYTES: u8 = 8;
    const MIN: Self = 0;

    #[inline]
    fn to_u64(self) -> u64 {
        self
    }

    #[inline]
    fn from_u64(value: u64) -> Option<Self> {
        Some(value)
    }
}
