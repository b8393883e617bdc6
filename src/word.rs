//! 16-bit word primitives.
//!
//! The 2100/1000 is a two's complement machine with 16-bit words and a
//! 15-bit logical address space. Every arithmetic step in the simulation is
//! masked back to these widths; nothing relies on host-width overflow.

/// Mask for a full data word.
pub const DMASK: u32 = 0o177777;

/// Sign bit of a data word.
pub const SIGN: u16 = 0o100000;

/// Mask for a logical (15-bit) address.
pub const VAMASK: u16 = 0o077777;

/// Indirect bit of an address word.
pub const INDIRECT: u16 = 0o100000;

/// Number of words in the logical address space.
pub const ADDRESS_SPACE: usize = 1 << 15;

/// Sign-extend a word to 32 bits.
#[inline]
pub fn sext(word: u16) -> i32 {
    word as i16 as i32
}

/// Two's complement negation within 16 bits.
#[inline]
pub fn negate(word: u16) -> u16 {
    (!word).wrapping_add(1)
}

/// True if the sign bit is set.
#[inline]
pub fn is_negative(word: u16) -> bool {
    word & SIGN != 0
}

/// Compose a double word from its high and low halves.
#[inline]
pub fn dword(high: u16, low: u16) -> u32 {
    (high as u32) << 16 | low as u32
}

/// Split a double word into (high, low).
#[inline]
pub fn split(value: u32) -> (u16, u16) {
    ((value >> 16) as u16, (value & DMASK) as u16)
}

/// Advance a logical address by `offset` words, wrapping within the address space.
#[inline]
pub fn address_add(address: u16, offset: u16) -> u16 {
    address.wrapping_add(offset) & VAMASK
}
