//! Instruction execution for the EAU and the User Instruction Groups.
//!
//! [`Cpu::classify_and_execute`] is the entry point the base instruction
//! simulator calls for every instruction in groups 200-213. [`Cpu::step`]
//! and [`Cpu::run`] form a minimal fetch loop around it for driving the
//! core on its own.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{event, Level};

use crate::cpu::decode::{self, Group, InstructionWord};
use crate::cpu::dispatch::{self, Route};
use crate::cpu::firmware::{Feature, FirmwareHandler, FirmwareTable, Invocation};
use crate::cpu::operand::Precision;
use crate::cpu::eau::{self, EauDecode};
use crate::cpu::{CpuOptions, Machine, Memory, MemoryAccess};

/// Outcome of an instruction that did not stop the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Completed,
    /// An interrupt is pending and the instruction must be restarted after
    /// it is serviced.
    Deferred,
    /// Not an EAU or UIG instruction.
    NotHandled,
}

/// Execution state of the fetch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    Running,
    /// Reached an instruction outside the EAU and UIGs.
    Halted,
    /// Stopped on an error.
    Stopped,
}

/// Machine stops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("undefined instruction {0}")]
    UndefinedInstruction(InstructionWord),

    #[error("indirect address loop at {address:05o}")]
    IndirectLoop { address: u16 },

    #[error("internal error: {0}")]
    Internal(#[from] InternalError),

    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),
}

/// Inconsistencies inside the simulator itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("operand tag {0} is out of range")]
    BadOperandTag(u8),

    #[error("expected a {expected:?} operand, found {found:?}")]
    PrecisionMismatch { expected: Precision, found: Precision },

    #[error("{0} is not an EAU instruction")]
    NotEauGroup(InstructionWord),
}

/// The EAU, the UIG dispatchers and the firmware bound into them.
pub struct Cpu<M = Memory> {
    pub machine: Machine<M>,
    firmware: FirmwareTable<M>,
    pub state: CpuState,
    /// Instructions executed, including deferred attempts.
    pub steps: u64,
    /// Interrupt-pending level presented to instructions by [`Cpu::run`].
    pub intrq: bool,
}

impl Cpu {
    pub fn new(options: CpuOptions) -> Self {
        Self::with_machine(Machine::new(options))
    }
}

impl<M: MemoryAccess> Cpu<M> {
    pub fn with_machine(machine: Machine<M>) -> Self {
        Self {
            machine,
            firmware: FirmwareTable::new(),
            state: CpuState::Running,
            steps: 0,
            intrq: false,
        }
    }

    /// Reset registers and the fetch loop. Memory, options and bound
    /// handlers are kept.
    pub fn reset(&mut self) {
        self.machine.regs.reset();
        self.machine.err_p = 0;
        self.state = CpuState::Running;
        self.steps = 0;
    }

    /// Bind the handler for a firmware feature, returning the one it replaces.
    pub fn bind(
        &mut self,
        feature: Feature,
        handler: impl FirmwareHandler<M> + 'static,
    ) -> Option<Box<dyn FirmwareHandler<M>>> {
        self.firmware.bind(feature, Box::new(handler))
    }

    pub fn firmware(&self) -> &FirmwareTable<M> {
        &self.firmware
    }

    pub fn firmware_mut(&mut self) -> &mut FirmwareTable<M> {
        &mut self.firmware
    }

    /// Execute `ir` if it belongs to the EAU or a UIG.
    ///
    /// P must already point past the instruction and `machine.err_p` at it.
    pub fn classify_and_execute(
        &mut self,
        ir: InstructionWord,
        intrq: bool,
    ) -> Result<Status, CpuError> {
        self.execute_instruction(ir, intrq, false)
    }

    /// As [`Cpu::classify_and_execute`], for an instruction fetched from an
    /// I/O trap cell.
    pub fn execute_trap(&mut self, ir: InstructionWord, intrq: bool) -> Result<Status, CpuError> {
        self.execute_instruction(ir, intrq, true)
    }

    fn execute_instruction(
        &mut self,
        ir: InstructionWord,
        intrq: bool,
        iotrap: bool,
    ) -> Result<Status, CpuError> {
        let route = match decode::classify(ir) {
            Group::Eau(group) => return self.execute_eau(group, ir, intrq),
            Group::Uig0 => dispatch::route_uig0(&self.machine.options, ir),
            Group::Uig1 => dispatch::route_uig1(&self.machine.options, ir),
            Group::Other => return Ok(Status::NotHandled),
        };

        match route {
            Route::To { feature, ir } => {
                event!(Level::TRACE, "{} dispatched to {:?}", ir, feature);
                let call = Invocation { ir, intrq, iotrap };
                self.firmware.execute(feature, &mut self.machine, call)
            }
            Route::Undefined => Err(undefined(ir)),
        }
    }

    fn execute_eau(
        &mut self,
        group: decode::EauGroup,
        ir: InstructionWord,
        intrq: bool,
    ) -> Result<Status, CpuError> {
        match eau::decode_eau(&self.machine.options, group, ir) {
            EauDecode::Nop => return Ok(Status::Completed),
            EauDecode::Undefined => return Err(undefined(ir)),
            EauDecode::Op(_) => (),
        }
        self.machine
            .execute_eau(group, ir, intrq)
            .map_err(|err| match err {
                CpuError::UndefinedInstruction(ir) => undefined(ir),
                other => other,
            })
    }

    /// Fetch and execute the instruction at P.
    ///
    /// P is left at the instruction on anything but completion, so a
    /// deferred instruction restarts once the interrupt has been serviced.
    pub fn step(&mut self, intrq: bool) -> Result<Status, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let address = self.machine.regs.p;
        let ir = InstructionWord::new(self.machine.mem.read_word(address));
        self.machine.err_p = address;
        self.machine.regs.advance_pc();

        let result = self.classify_and_execute(ir, intrq);
        match &result {
            Ok(Status::Completed) => self.steps += 1,
            Ok(Status::Deferred) => {
                event!(Level::DEBUG, "{} at {:05o} deferred for interrupt", ir, address);
                self.machine.regs.p = address;
                self.steps += 1;
            }
            Ok(Status::NotHandled) => {
                event!(Level::INFO, "halted at {:05o} on {}", address, ir);
                self.machine.regs.p = address;
                self.state = CpuState::Halted;
            }
            Err(err) => {
                event!(Level::INFO, "stopped at {:05o}: {}", address, err);
                self.machine.regs.p = address;
                self.state = CpuState::Stopped;
            }
        }
        result
    }

    /// Step at most `max_steps` times, stopping early on an instruction this
    /// core does not handle. Returns the number of instructions executed.
    pub fn run(&mut self, max_steps: u64) -> Result<u64, CpuError> {
        let start = self.steps;
        for _ in 0..max_steps {
            if self.step(self.intrq)? == Status::NotHandled {
                break;
            }
        }
        Ok(self.steps - start)
    }

    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(CpuOptions::default())
    }
}

impl<M> std::fmt::Debug for Cpu<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("steps", &self.steps)
            .field("regs", &self.machine.regs)
            .field("firmware", &self.firmware)
            .finish()
    }
}

fn undefined(ir: InstructionWord) -> CpuError {
    event!(Level::WARN, "undefined instruction {}", ir);
    CpuError::UndefinedInstruction(ir)
}
