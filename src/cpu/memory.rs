//! Main memory as seen by the instruction core.
//!
//! Address translation (DMS mapping) happens outside the core, so the core
//! only ever sees 15-bit logical addresses. Every access masks its address;
//! an out-of-range address cannot occur.

use crate::word::{address_add, ADDRESS_SPACE, VAMASK};

/// Word-level access to the current logical address space.
pub trait MemoryAccess {
    fn read_word(&self, address: u16) -> u16;
    fn write_word(&mut self, address: u16, value: u16);
}

/// 32K words of memory.
#[derive(Clone)]
pub struct Memory {
    cells: Vec<u16>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; ADDRESS_SPACE],
        }
    }

    /// Store `words` starting at `start`, wrapping at the top of memory.
    pub fn load(&mut self, start: u16, words: &[u16]) {
        let mut address = start & VAMASK;
        for &word in words {
            self.cells[address as usize] = word;
            address = address_add(address, 1);
        }
    }

    /// Contents of `count` words starting at `start` (for debugging).
    pub fn dump(&self, start: u16, count: usize) -> Vec<(u16, u16)> {
        let mut address = start & VAMASK;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push((address, self.cells[address as usize]));
            address = address_add(address, 1);
        }
        out
    }
}

impl MemoryAccess for Memory {
    #[inline]
    fn read_word(&self, address: u16) -> u16 {
        self.cells[(address & VAMASK) as usize]
    }

    #[inline]
    fn write_word(&mut self, address: u16, value: u16) {
        self.cells[(address & VAMASK) as usize] = value;
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only show non-zero cells
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &ADDRESS_SPACE)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_write() {
        let mut mem = Memory::new();
        mem.write_word(0o1000, 0o123456);
        assert_eq!(mem.read_word(0o1000), 0o123456);
    }

    #[test]
    fn test_address_is_masked() {
        let mut mem = Memory::new();
        mem.write_word(0o100005, 7);
        assert_eq!(mem.read_word(0o5), 7);
    }

    #[test]
    fn test_load_wraps() {
        let mut mem = Memory::new();
        mem.load(0o77776, &[1, 2, 3]);
        assert_eq!(mem.dump(0o77776, 3), vec![(0o77776, 1), (0o77777, 2), (0, 3)]);
    }
}
