//! The state the instruction core operates on.
//!
//! The operand processor (`operand.rs`) and the EAU (`eau.rs`) add their
//! methods to [`Machine`] in their own `impl` blocks. Firmware handlers
//! receive it by exclusive reference.
//!
//! Memory is reached only through [`MemoryAccess`], so an integrator with
//! mapped memory (the 1000 Dynamic Mapping System) supplies its own `M` and
//! every operand is fetched through the current map. The plain 32K
//! [`Memory`] is the default.

use crate::cpu::{CpuOptions, Memory, MemoryAccess, Registers};

#[derive(Debug, Clone)]
pub struct Machine<M = Memory> {
    pub regs: Registers,
    pub mem: M,
    /// Read-only while instructions execute.
    pub options: CpuOptions,
    /// Address of the instruction being executed. An instruction that
    /// repeats in place sets P back to this.
    pub err_p: u16,
}

impl Machine {
    pub fn new(options: CpuOptions) -> Self {
        Self::with_memory(options, Memory::new())
    }
}

impl<M: MemoryAccess> Machine<M> {
    pub fn with_memory(options: CpuOptions, mem: M) -> Self {
        Self {
            regs: Registers::new(),
            mem,
            options,
            err_p: 0,
        }
    }

    /// Arrange for the current instruction to execute again.
    pub fn repeat_instruction(&mut self) {
        self.regs.p = self.err_p;
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(CpuOptions::default())
    }
}
