//! Port width algebra
//!
//! A port is as wide as one of the unsigned integers `u8`, `u16`, `u32` or
//! `u64`. Each width bounds the addressable pins and defines the one-hot
//! mask of a pin.

use core::fmt::Debug;
use core::ops::{BitAnd, BitOr, Not, Shl, Shr};

use crate::error::{Error, Result};

/// Highest addressable pin index of a port `bytes` wide
///
/// Only 1, 2, 4 and 8 byte ports exist; any other width is a programming
/// error and fails const evaluation.
pub const fn max_pin_for_bytes(bytes: usize) -> u8 {
    match bytes {
        1 => 7,
        2 => 15,
        4 => 31,
        8 => 63,
        _ => panic!("unsupported port width"),
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Unsigned integer type usable as a port value
///
/// Implemented for `u8`, `u16`, `u32` and `u64` only.
pub trait PortWidth:
    sealed::Sealed
    + Copy
    + Eq
    + Debug
    + Send
    + Sync
    + 'static
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + Not<Output = Self>
    + Shl<u32, Output = Self>
    + Shr<u32, Output = Self>
{
    /// Number of bits in the port
    const BITS: u32;
    /// Highest addressable pin index
    const MAX_PIN: u8;
    /// All bits cleared
    const ZERO: Self;
    /// Only bit 0 set
    const ONE: Self;
    /// All bits set
    const ALL_ONES: Self;

    /// One-hot mask of `pin`, or `None` if the pin does not exist on this width
    fn mask(pin: u8) -> Option<Self> {
        if pin > Self::MAX_PIN {
            None
        } else {
            Some(Self::ONE << u32::from(pin))
        }
    }

    /// Like [`PortWidth::mask`], reporting a missing pin as
    /// [`Error::InvalidArgument`]
    fn checked_mask(pin: u8) -> Result<Self> {
        Self::mask(pin).ok_or(Error::InvalidArgument)
    }

    /// Number of trailing zero bits
    fn trailing_zeros(self) -> u32;

    /// Number of set bits
    fn count_ones(self) -> u32;

    /// Widen to `u64` without loss
    fn to_u64(self) -> u64;
}

macro_rules! impl_port_width {
    ($($ty:ty),*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl PortWidth for $ty {
                const BITS: u32 = <$ty>::BITS;
                const MAX_PIN: u8 = max_pin_for_bytes(core::mem::size_of::<$ty>());
                const ZERO: Self = 0;
                const ONE: Self = 1;
                const ALL_ONES: Self = <$ty>::MAX;

                fn trailing_zeros(self) -> u32 {
                    <$ty>::trailing_zeros(self)
                }

                fn count_ones(self) -> u32 {
                    <$ty>::count_ones(self)
                }

                fn to_u64(self) -> u64 {
                    u64::from(self)
                }
            }
        )*
    };
}

impl_port_width!(u8, u16, u32, u64);
