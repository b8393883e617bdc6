//! # HP 2100/1000 microcode core
//!
//! Instruction-group decoding, the Extended Arithmetic Unit and the
//! firmware option dispatchers of the HP 2100 and 1000 M/E/F-Series
//! minicomputers, with the shared operand processor that firmware
//! instructions use to fetch their in-line arguments.
//!
//! The base memory-reference, shift-rotate and I/O instruction sets are
//! simulated elsewhere; [`Cpu::classify_and_execute`] is called for the
//! instructions this crate owns.

pub mod cpu;
pub mod image;
pub mod word;

// Re-export commonly used types
pub use cpu::{
    Cpu, CpuError, CpuModel, CpuOption, CpuOptions, CpuState, Feature, InstructionWord, Machine,
    Memory, MemoryAccess, Registers, Status,
};
pub use image::{ImageError, MachineImage};
