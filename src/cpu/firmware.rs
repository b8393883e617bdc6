//! Firmware feature handlers.
//!
//! The instruction sets of the optional firmware modules (floating point,
//! Fast FORTRAN, DMS and so on) are simulated outside this crate. An
//! integrator binds one [`FirmwareHandler`] per [`Feature`] into a
//! [`FirmwareTable`] when configuring the machine; the dispatchers then route
//! decoded instructions to whatever is bound. Choosing between alternate
//! implementations of a feature (e.g. firmware floating point or the
//! F-Series Floating Point Processor) is a matter of which handler is bound.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use crate::cpu::decode::InstructionWord;
use crate::cpu::execute::{CpuError, Status};
use crate::cpu::{CpuOption, CpuOptions, Machine, Memory, MemoryAccess};

/// A firmware feature reachable through the User Instruction Groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// 2000 I/O Processor
    IoProcessor,
    FloatingPoint,
    /// Fast FORTRAN Processor
    FastFortran,
    /// RTE-IVA/B EMA and RTE-6/VM VMA
    ExtendedMemory,
    DistributedSystem,
    DoubleInteger,
    ScientificInstructions,
    /// RTE-6/VM OS
    RteOs,
    VectorInstructions,
    /// SIGNAL/1000
    Signal,
    DynamicMapping,
    ExtendedInstructionGroup,
}

impl Feature {
    pub const ALL: [Feature; 12] = [
        Feature::IoProcessor,
        Feature::FloatingPoint,
        Feature::FastFortran,
        Feature::ExtendedMemory,
        Feature::DistributedSystem,
        Feature::DoubleInteger,
        Feature::ScientificInstructions,
        Feature::RteOs,
        Feature::VectorInstructions,
        Feature::Signal,
        Feature::DynamicMapping,
        Feature::ExtendedInstructionGroup,
    ];

    /// Options, any one of which makes the feature's instructions live.
    pub fn options(self) -> &'static [CpuOption] {
        match self {
            Feature::IoProcessor => &[CpuOption::IoProcessor],
            Feature::FloatingPoint => &[CpuOption::FloatingPoint],
            Feature::FastFortran => &[CpuOption::FastFortran],
            Feature::ExtendedMemory => &[CpuOption::ExtendedMemory, CpuOption::VirtualMemory],
            Feature::DistributedSystem => &[CpuOption::DistributedSystem],
            Feature::DoubleInteger => &[CpuOption::DoubleInteger],
            Feature::ScientificInstructions => &[CpuOption::ScientificInstructions],
            Feature::RteOs => &[CpuOption::RteOs],
            Feature::VectorInstructions => &[CpuOption::VectorInstructions],
            Feature::Signal => &[CpuOption::Signal],
            Feature::DynamicMapping => &[CpuOption::DynamicMapping],
            Feature::ExtendedInstructionGroup => &[CpuOption::ExtendedInstructionGroup],
        }
    }

    pub fn is_installed(self, options: &CpuOptions) -> bool {
        self.options().iter().any(|&option| options.has(option))
    }
}

/// Everything a handler is told about the instruction it is asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    /// The instruction, after any remapping by the dispatcher.
    pub ir: InstructionWord,
    /// An interrupt is pending.
    pub intrq: bool,
    /// The instruction was reached through an I/O trap cell.
    pub iotrap: bool,
}

/// Simulation of one firmware feature's instructions.
///
/// Handlers fetch operands with [`Machine::resolve_operands`] and return
/// `Status::Deferred` when it defers.
pub trait FirmwareHandler<M = Memory> {
    fn execute(&mut self, machine: &mut Machine<M>, call: Invocation) -> Result<Status, CpuError>;
}

impl<M, F> FirmwareHandler<M> for F
where
    F: FnMut(&mut Machine<M>, Invocation) -> Result<Status, CpuError>,
{
    fn execute(&mut self, machine: &mut Machine<M>, call: Invocation) -> Result<Status, CpuError> {
        self(machine, call)
    }
}

/// The handlers bound into the dispatchers.
pub struct FirmwareTable<M = Memory> {
    handlers: BTreeMap<Feature, Box<dyn FirmwareHandler<M>>>,
}

impl<M> Default for FirmwareTable<M> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<M: MemoryAccess> FirmwareTable<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `feature`, returning the handler it replaces.
    pub fn bind(
        &mut self,
        feature: Feature,
        handler: Box<dyn FirmwareHandler<M>>,
    ) -> Option<Box<dyn FirmwareHandler<M>>> {
        event!(Level::DEBUG, "binding firmware handler for {:?}", feature);
        self.handlers.insert(feature, handler)
    }

    pub fn unbind(&mut self, feature: Feature) -> Option<Box<dyn FirmwareHandler<M>>> {
        self.handlers.remove(&feature)
    }

    pub fn is_bound(&self, feature: Feature) -> bool {
        self.handlers.contains_key(&feature)
    }

    /// Run `call` on the handler bound to `feature`.
    ///
    /// A feature with no handler behaves like missing microcode.
    pub fn execute(
        &mut self,
        feature: Feature,
        machine: &mut Machine<M>,
        call: Invocation,
    ) -> Result<Status, CpuError> {
        match self.handlers.get_mut(&feature) {
            Some(handler) => handler.execute(machine, call),
            None => {
                event!(
                    Level::WARN,
                    "{} routed to {:?}, but no handler is bound",
                    call.ir,
                    feature
                );
                Err(CpuError::UndefinedInstruction(call.ir))
            }
        }
    }
}

impl<M> fmt::Debug for FirmwareTable<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
