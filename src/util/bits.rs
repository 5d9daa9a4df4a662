//! Integer log2 and power-of-two helpers
//!
//! Bin widths, shifts and branching factors are all powers of two, so every
//! piece of geometry in the tree reduces to these few operations.

/// Log/power-of-two arithmetic over unsigned machine words.
pub trait Log2: Copy {
    /// `⌊log2(self)⌋`, or `None` for zero.
    fn floor_log2(self) -> Option<u32>;

    /// `⌈log2(self)⌉`, or `None` for zero.
    fn ceil_log2(self) -> Option<u32>;

    /// Number of bits needed to represent `self` (0 for zero).
    fn bit_length(self) -> u32;

    /// Smallest power of two `>= self`, or `None` on overflow.
    fn round_up_pow2(self) -> Option<Self>;
}

macro_rules! impl_log2 {
    ($($ty:ty),*) => {
        $(
            impl Log2 for $ty {
                #[inline]
                fn floor_log2(self) -> Option<u32> {
                    if self == 0 {
                        None
                    } else {
                        Some(<$ty>::BITS - 1 - self.leading_zeros())
                    }
                }

                #[inline]
                fn ceil_log2(self) -> Option<u32> {
                    self.floor_log2()
                        .map(|lg| lg + u32::from(self & (self - 1) != 0))
                }

                #[inline]
                fn bit_length(self) -> u32 {
                    <$ty>::BITS - self.leading_zeros()
                }

                #[inline]
                fn round_up_pow2(self) -> Option<Self> {
                    self.checked_next_power_of_two()
                }
            }
        )*
    };
}

impl_log2!(u32, u64, usize);
