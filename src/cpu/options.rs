//! CPU models and firmware options.
//!
//! Option implementation by CPU:
//!
//! ```text
//!   Option                      2114  2115  2116  2100  1000-M  1000-E  1000-F
//!   --------------------------  ----  ----  ----  ----  ------  ------  ------
//!   Extended Arithmetic Unit     -    opt   opt   std    std     std     std
//!   Floating Point               -     -     -    opt    std     std     std
//!   Fast FORTRAN Processor       -     -     -    opt    opt     opt     std
//!   2000 I/O Processor           -     -     -    opt    opt     opt      -
//!   Dynamic Mapping System       -     -     -     -     opt     opt     std
//!   Extended Instruction Group   -     -     -     -     std     std     std
//!   RTE-IVA/B Extended Memory    -     -     -     -      -      opt     opt
//!   RTE-6/VM Virtual Memory      -     -     -     -      -      opt     opt
//!   RTE-6/VM Operating System    -     -     -     -      -      opt     opt
//!   Distributed System           -     -     -     -     opt     opt     opt
//!   Double Integer               -     -     -     -      -      opt      -
//!   Scientific Instruction Set   -     -     -     -      -       -      std
//!   Vector Instruction Set       -     -     -     -      -       -      opt
//!   SIGNAL/1000                  -     -     -     -      -       -      opt
//! ```
//!
//! The option set is fixed at configuration time and only read while
//! instructions execute.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{event, Level};

/// Default number of indirect levels followed before declaring a loop.
pub const DEFAULT_INDIRECT_LIMIT: u32 = 16;

/// CPU family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuType {
    /// 2114, 2115 and 2116.
    Hp211x,
    Hp2100,
    /// 1000 M/E/F-Series (21MX).
    Hp1000,
}

/// CPU model, in order of introduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CpuModel {
    Hp2114,
    Hp2115,
    Hp2116,
    Hp2100,
    Hp1000M,
    Hp1000E,
    Hp1000F,
}

impl CpuModel {
    pub const ALL: [CpuModel; 7] = [
        CpuModel::Hp2114,
        CpuModel::Hp2115,
        CpuModel::Hp2116,
        CpuModel::Hp2100,
        CpuModel::Hp1000M,
        CpuModel::Hp1000E,
        CpuModel::Hp1000F,
    ];

    pub fn cpu_type(self) -> CpuType {
        match self {
            CpuModel::Hp2114 | CpuModel::Hp2115 | CpuModel::Hp2116 => CpuType::Hp211x,
            CpuModel::Hp2100 => CpuType::Hp2100,
            CpuModel::Hp1000M | CpuModel::Hp1000E | CpuModel::Hp1000F => CpuType::Hp1000,
        }
    }

    /// How `option` is offered on this model.
    pub fn availability(self, option: CpuOption) -> Availability {
        use Availability::{Optional as O, Standard as S, Unavailable as U};
        use CpuModel::*;

        let column = |m2114, m2115, m2116, m2100, m1000m, m1000e, m1000f| match self {
            Hp2114 => m2114,
            Hp2115 => m2115,
            Hp2116 => m2116,
            Hp2100 => m2100,
            Hp1000M => m1000m,
            Hp1000E => m1000e,
            Hp1000F => m1000f,
        };

        match option {
            CpuOption::Eau => column(U, O, O, S, S, S, S),
            CpuOption::FloatingPoint => column(U, U, U, O, S, S, S),
            CpuOption::FastFortran => column(U, U, U, O, O, O, S),
            CpuOption::IoProcessor => column(U, U, U, O, O, O, U),
            CpuOption::DynamicMapping => column(U, U, U, U, O, O, S),
            CpuOption::ExtendedInstructionGroup => column(U, U, U, U, S, S, S),
            CpuOption::ExtendedMemory => column(U, U, U, U, U, O, O),
            CpuOption::VirtualMemory => column(U, U, U, U, U, O, O),
            CpuOption::RteOs => column(U, U, U, U, U, O, O),
            CpuOption::DistributedSystem => column(U, U, U, U, O, O, O),
            CpuOption::DoubleInteger => column(U, U, U, U, U, O, U),
            CpuOption::ScientificInstructions => column(U, U, U, U, U, U, S),
            CpuOption::VectorInstructions => column(U, U, U, U, U, U, O),
            CpuOption::Signal => column(U, U, U, U, U, U, O),
        }
    }

    /// Options that come with every machine of this model.
    pub fn standard_options(self) -> BTreeSet<CpuOption> {
        CpuOption::ALL
            .into_iter()
            .filter(|&option| self.availability(option) == Availability::Standard)
            .collect()
    }
}

impl fmt::Display for CpuModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CpuModel::Hp2114 => "2114",
            CpuModel::Hp2115 => "2115",
            CpuModel::Hp2116 => "2116",
            CpuModel::Hp2100 => "2100",
            CpuModel::Hp1000M => "1000-M",
            CpuModel::Hp1000E => "1000-E",
            CpuModel::Hp1000F => "1000-F",
        };
        f.write_str(name)
    }
}

impl FromStr for CpuModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        CpuModel::ALL
            .into_iter()
            .find(|model| model.to_string() == wanted || model.to_string().replace('-', "") == wanted)
            .ok_or_else(|| ConfigError::UnknownModel(s.to_string()))
    }
}

/// Whether an option exists for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Unavailable,
    Optional,
    Standard,
}

/// Firmware or hardware option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CpuOption {
    /// Extended Arithmetic Unit.
    Eau,
    FloatingPoint,
    FastFortran,
    /// 2000 I/O Processor.
    IoProcessor,
    DynamicMapping,
    ExtendedInstructionGroup,
    /// RTE-IVA/B extended memory area.
    ExtendedMemory,
    /// RTE-6/VM virtual memory area.
    VirtualMemory,
    /// RTE-6/VM operating system.
    RteOs,
    DistributedSystem,
    DoubleInteger,
    ScientificInstructions,
    VectorInstructions,
    /// SIGNAL/1000.
    Signal,
}

impl CpuOption {
    pub const ALL: [CpuOption; 14] = [
        CpuOption::Eau,
        CpuOption::FloatingPoint,
        CpuOption::FastFortran,
        CpuOption::IoProcessor,
        CpuOption::DynamicMapping,
        CpuOption::ExtendedInstructionGroup,
        CpuOption::ExtendedMemory,
        CpuOption::VirtualMemory,
        CpuOption::RteOs,
        CpuOption::DistributedSystem,
        CpuOption::DoubleInteger,
        CpuOption::ScientificInstructions,
        CpuOption::VectorInstructions,
        CpuOption::Signal,
    ];
}

/// Which floating-point implementation is present.
///
/// `Processor` models the F-Series Floating Point Processor, which also
/// brings the Scientific Instruction Set into the 105320 range. Only the
/// 1000-F has one, and it is standard there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloatingPointMode {
    Firmware,
    Processor,
}

impl FloatingPointMode {
    /// What a machine of `model` comes with.
    pub fn standard_for(model: CpuModel) -> Self {
        match model {
            CpuModel::Hp1000F => FloatingPointMode::Processor,
            _ => FloatingPointMode::Firmware,
        }
    }
}

/// Configuration of one simulated CPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredOptions")]
pub struct CpuOptions {
    model: CpuModel,
    installed: BTreeSet<CpuOption>,
    /// Floating-point implementation.
    pub floating_point: FloatingPointMode,
    /// Remap F-Series double-integer codes onto the E-Series handler so the
    /// F-Series diagnostic can run with firmware floating point.
    #[serde(default)]
    pub dbi_diagnostic: bool,
    /// Indirect levels followed before an indirect-loop stop.
    #[serde(default = "default_indirect_limit")]
    pub indirect_limit: u32,
}

fn default_indirect_limit() -> u32 {
    DEFAULT_INDIRECT_LIMIT
}

/// `CpuOptions` as written in an image. A missing floating-point mode
/// takes the model's standard one.
#[derive(Deserialize)]
struct StoredOptions {
    model: CpuModel,
    installed: BTreeSet<CpuOption>,
    floating_point: Option<FloatingPointMode>,
    #[serde(default)]
    dbi_diagnostic: bool,
    #[serde(default = "default_indirect_limit")]
    indirect_limit: u32,
}

impl From<StoredOptions> for CpuOptions {
    fn from(stored: StoredOptions) -> Self {
        Self {
            model: stored.model,
            installed: stored.installed,
            floating_point: stored
                .floating_point
                .unwrap_or_else(|| FloatingPointMode::standard_for(stored.model)),
            dbi_diagnostic: stored.dbi_diagnostic,
            indirect_limit: stored.indirect_limit,
        }
    }
}

impl CpuOptions {
    /// A machine of the given model with its standard options.
    pub fn new(model: CpuModel) -> Self {
        Self {
            model,
            installed: model.standard_options(),
            floating_point: FloatingPointMode::standard_for(model),
            dbi_diagnostic: false,
            indirect_limit: DEFAULT_INDIRECT_LIMIT,
        }
    }

    pub fn model(&self) -> CpuModel {
        self.model
    }

    pub fn cpu_type(&self) -> CpuType {
        self.model.cpu_type()
    }

    /// Change the model. The option set and floating-point mode revert to
    /// the new model's standard ones.
    pub fn set_model(&mut self, model: CpuModel) {
        event!(Level::DEBUG, "CPU model {} -> {}", self.model, model);
        self.model = model;
        self.installed = model.standard_options();
        self.floating_point = FloatingPointMode::standard_for(model);
    }

    pub fn has(&self, option: CpuOption) -> bool {
        self.installed.contains(&option)
    }

    pub fn installed(&self) -> impl Iterator<Item = CpuOption> + '_ {
        self.installed.iter().copied()
    }

    /// Install an option.
    ///
    /// The 2100 I/O Processor occupies the microcode space of the
    /// floating-point and Fast FORTRAN options, so installing it on a 2100
    /// removes both.
    pub fn install(&mut self, option: CpuOption) -> Result<(), ConfigError> {
        if self.model.availability(option) == Availability::Unavailable {
            return Err(ConfigError::NotAvailable {
                option,
                model: self.model,
            });
        }
        if self.model == CpuModel::Hp2100 {
            let conflicts: &[CpuOption] = match option {
                CpuOption::IoProcessor => &[CpuOption::FloatingPoint, CpuOption::FastFortran],
                CpuOption::FloatingPoint | CpuOption::FastFortran => &[CpuOption::IoProcessor],
                _ => &[],
            };
            for conflict in conflicts {
                if self.installed.remove(conflict) {
                    event!(Level::DEBUG, "{:?} removed to make room for {:?}", conflict, option);
                }
            }
        }
        self.installed.insert(option);
        Ok(())
    }

    /// Remove an option. Standard equipment cannot be removed.
    pub fn remove(&mut self, option: CpuOption) -> Result<(), ConfigError> {
        if self.model.availability(option) == Availability::Standard {
            return Err(ConfigError::Standard {
                option,
                model: self.model,
            });
        }
        self.installed.remove(&option);
        Ok(())
    }

    /// Check a configuration that did not come through `install`/`remove`,
    /// e.g. one read from a machine image.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for option in CpuOption::ALL {
            match self.model.availability(option) {
                Availability::Unavailable if self.has(option) => {
                    return Err(ConfigError::NotAvailable {
                        option,
                        model: self.model,
                    })
                }
                Availability::Standard if !self.has(option) => {
                    return Err(ConfigError::Standard {
                        option,
                        model: self.model,
                    })
                }
                _ => (),
            }
        }
        if self.model == CpuModel::Hp2100
            && self.has(CpuOption::IoProcessor)
            && (self.has(CpuOption::FloatingPoint) || self.has(CpuOption::FastFortran))
        {
            return Err(ConfigError::Conflict {
                option: CpuOption::IoProcessor,
                model: self.model,
            });
        }
        if self.floating_point == FloatingPointMode::Processor && self.model != CpuModel::Hp1000F {
            return Err(ConfigError::FloatingPointProcessor(self.model));
        }
        if self.indirect_limit == 0 {
            return Err(ConfigError::IndirectLimit);
        }
        Ok(())
    }
}

impl Default for CpuOptions {
    fn default() -> Self {
        Self::new(CpuModel::Hp1000E)
    }
}

/// Errors that can occur while configuring a CPU.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{option:?} is not available on the {model}")]
    NotAvailable { option: CpuOption, model: CpuModel },

    #[error("{option:?} is standard on the {model} and cannot be removed")]
    Standard { option: CpuOption, model: CpuModel },

    #[error("{option:?} cannot coexist with the other options installed on the {model}")]
    Conflict { option: CpuOption, model: CpuModel },

    #[error("the {0} has no floating point processor")]
    FloatingPointProcessor(CpuModel),

    #[error("indirect limit must be at least 1")]
    IndirectLimit,

    #[error("unknown CPU model: {0}")]
    UnknownModel(String),
}
