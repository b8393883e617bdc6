//! HP 2100/1000 CPU microcode support.
//!
//! This module implements the parts of the CPU that sit beside the base
//! instruction set:
//! - the Extended Arithmetic Unit (shifts, rotates, MPY, DIV, DLD, DST)
//! - the two User Instruction Group dispatchers and the firmware handler table
//! - the operand processor used by every firmware instruction

pub mod decode;
pub mod dispatch;
pub mod eau;
pub mod execute;
pub mod firmware;
pub mod machine;
pub mod memory;
pub mod operand;
pub mod options;
pub mod registers;

pub use decode::{EauGroup, Group, InstructionWord};
pub use execute::{Cpu, CpuError, CpuState, InternalError, Status};
pub use firmware::{Feature, FirmwareHandler, FirmwareTable, Invocation};
pub use machine::Machine;
pub use memory::{Memory, MemoryAccess};
pub use operand::{OperandPattern, OperandTag, OperandValue, Precision, Resolution};
pub use options::{CpuModel, CpuOption, CpuOptions, CpuType, FloatingPointMode};
pub use registers::Registers;
