//! CPU registers touched by the instruction core.
//!
//! - A, B: 16-bit accumulators, paired as B'A for double-word shifts
//!   and as A'B for double-integer operands
//! - P: 15-bit program counter
//! - O: overflow flag

use serde::{Deserialize, Serialize};

use crate::word::{address_add, dword, split};

/// The register file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// A: accumulator
    pub a: u16,

    /// B: accumulator
    pub b: u16,

    /// P: program counter
    pub p: u16,

    /// O: overflow. Set or cleared as a side effect of EAU arithmetic.
    pub o: bool,
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Increment the program counter by 1, wrapping within the address space.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> u16 {
        let old = self.p;
        self.p = address_add(self.p, 1);
        old
    }

    /// B'A as one 32-bit register, B high.
    pub fn ba(&self) -> u32 {
        dword(self.b, self.a)
    }

    pub fn set_ba(&mut self, value: u32) {
        (self.b, self.a) = split(value);
    }

    /// A'B as one 32-bit value, A high.
    pub fn ab(&self) -> u32 {
        dword(self.a, self.b)
    }

    pub fn set_ab(&mut self, value: u32) {
        (self.a, self.b) = split(value);
    }
}
