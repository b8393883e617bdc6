//! User Instruction Group dispatchers.
//!
//! UIG 0 (105000-105377) is assigned to firmware options as follows:
//!
//! ```text
//!     Instructions   Option Name                  2100   1000-M  1000-E  1000-F
//!     -------------  --------------------------  ------  ------  ------  ------
//!     105000-105362  2000 I/O Processor           opt      -       -       -
//!     105000-105137  Floating Point               opt     std     std     std
//!     105200-105237  Fast FORTRAN Processor       opt     opt     opt     std
//!     105240-105257  RTE-IVA/B Extended Memory     -       -      opt     opt
//!     105240-105257  RTE-6/VM Virtual Memory       -       -      opt     opt
//!     105300-105317  Distributed System            -       -      opt     opt
//!     105320-105337  Double Integer                -       -      opt      -
//!     105320-105337  Scientific Instruction Set    -       -       -      std
//!     105340-105357  RTE-6/VM Operating System     -       -      opt     opt
//! ```
//!
//! The 2100 I/O Processor uses the whole 2100 microcode space, so when it
//! is installed on a 2100 every UIG 0 instruction belongs to it.
//!
//! UIG 1 (101400-101777 and 105400-105777, "x" is 1 or 5) exists only on
//! the 1000:
//!
//! ```text
//!     Instructions   Option Name                   1000-M  1000-E  1000-F
//!     -------------  ----------------------------  ------  ------  ------
//!     10x400-10x437  2000 IOP                       opt     opt      -
//!     10x460-10x477  2000 IOP                       opt     opt      -
//!     10x460-10x477  Vector Instruction Set          -       -      opt
//!     105520-105537  Distributed System             opt      -       -
//!     105600-105617  SIGNAL/1000 Instruction Set     -       -      opt
//!     10x700-10x737  Dynamic Mapping System         opt     opt     std
//!     10x740-10x777  Extended Instruction Group     std     std     std
//! ```
//!
//! The M-Series Distributed System range is remapped onto the UIG 0 codes
//! before dispatch.

use tracing::{event, Level};

use crate::cpu::decode::InstructionWord;
use crate::cpu::firmware::Feature;
use crate::cpu::{CpuModel, CpuOption, CpuOptions, CpuType, FloatingPointMode};

/// Remaps 105520-105537 onto 105300-105317.
pub const DS_REMAP: u16 = 0o000620;

/// Where a UIG instruction goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    To { feature: Feature, ir: InstructionWord },
    Undefined,
}

/// F-Series double-integer codes and their E-Series equivalents.
const DBI_DIAGNOSTIC_MAP: [(u16, u16); 12] = [
    (0o014, 0o105321), // .DAD
    (0o034, 0o105327), // .DSB
    (0o054, 0o105322), // .DMP
    (0o074, 0o105325), // .DDI
    (0o114, 0o105334), // .DSBR
    (0o134, 0o105326), // .DDIR
    (0o203, 0o105323), // .DNG
    (0o204, 0o105324), // .DCO
    (0o210, 0o105330), // .DIN
    (0o211, 0o105331), // .DDE
    (0o212, 0o105332), // .DIS
    (0o213, 0o105333), // .DDS
];

fn gated(options: &CpuOptions, feature: Feature, ir: InstructionWord) -> Route {
    if feature.is_installed(options) {
        Route::To { feature, ir }
    } else {
        event!(Level::TRACE, "{} belongs to {:?}, which is not installed", ir, feature);
        Route::Undefined
    }
}

/// Route a UIG 0 instruction.
pub fn route_uig0(options: &CpuOptions, ir: InstructionWord) -> Route {
    if options.has(CpuOption::IoProcessor) && options.cpu_type() == CpuType::Hp2100 {
        return Route::To {
            feature: Feature::IoProcessor,
            ir,
        };
    }

    if options.dbi_diagnostic
        && options.floating_point == FloatingPointMode::Firmware
        && !options.has(CpuOption::FastFortran)
    {
        let code = ir.raw() & 0o377;
        if let Some(&(_, remapped)) = DBI_DIAGNOSTIC_MAP.iter().find(|(from, _)| *from == code) {
            return gated(options, Feature::DoubleInteger, InstructionWord::new(remapped));
        }
    }

    let feature = match ir.module() {
        0o00..=0o05 => Feature::FloatingPoint,
        0o10 | 0o11 => Feature::FastFortran,
        0o12 => Feature::ExtendedMemory,
        0o14 => Feature::DistributedSystem,
        0o15 if options.model() == CpuModel::Hp1000F
            && options.floating_point == FloatingPointMode::Processor =>
        {
            Feature::ScientificInstructions
        }
        0o15 => Feature::DoubleInteger,
        0o16 => Feature::RteOs,
        _ => return Route::Undefined,
    };
    gated(options, feature, ir)
}

/// Route a UIG 1 instruction.
pub fn route_uig1(options: &CpuOptions, ir: InstructionWord) -> Route {
    if options.cpu_type() != CpuType::Hp1000 {
        return Route::Undefined;
    }

    let (feature, ir) = match ir.module() {
        0o00 | 0o01 => (Feature::IoProcessor, ir),
        0o03 if options.model() == CpuModel::Hp1000F => (Feature::VectorInstructions, ir),
        0o03 => (Feature::IoProcessor, ir),
        0o05 => (Feature::DistributedSystem, ir.remap(DS_REMAP)),
        0o10 => (Feature::Signal, ir),
        0o14 | 0o15 => (Feature::DynamicMapping, ir),
        0o16 | 0o17 => (Feature::ExtendedInstructionGroup, ir),
        _ => return Route::Undefined,
    };
    gated(options, feature, ir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to(feature: Feature, ir: u16) -> Route {
        Route::To {
            feature,
            ir: InstructionWord::new(ir),
        }
    }

    fn uig0(options: &CpuOptions, ir: u16) -> Route {
        route_uig0(options, InstructionWord::new(ir))
    }

    fn uig1(options: &CpuOptions, ir: u16) -> Route {
        route_uig1(options, InstructionWord::new(ir))
    }

    #[test]
    fn test_2100_iop_claims_all_of_uig0() {
        let mut opts = CpuOptions::new(CpuModel::Hp2100);
        opts.install(CpuOption::IoProcessor).unwrap();
        for module in 0..16u16 {
            for entry in [0, 7, 15] {
                let ir = 0o105000 | module << 4 | entry;
                assert_eq!(uig0(&opts, ir), to(Feature::IoProcessor, ir));
            }
        }
    }

    #[test]
    fn test_1000_iop_does_not_claim_uig0() {
        let mut opts = CpuOptions::new(CpuModel::Hp1000M);
        opts.install(CpuOption::IoProcessor).unwrap();
        assert_eq!(uig0(&opts, 0o105000), to(Feature::FloatingPoint, 0o105000));
        assert_eq!(uig1(&opts, 0o105400), to(Feature::IoProcessor, 0o105400));
    }

    #[test]
    fn test_uig0_modules() {
        let mut opts = CpuOptions::new(CpuModel::Hp1000E);
        for option in [
            CpuOption::FastFortran,
            CpuOption::ExtendedMemory,
            CpuOption::DistributedSystem,
            CpuOption::DoubleInteger,
            CpuOption::RteOs,
        ] {
            opts.install(option).unwrap();
        }
        assert_eq!(uig0(&opts, 0o105137), to(Feature::FloatingPoint, 0o105137));
        assert_eq!(uig0(&opts, 0o105200), to(Feature::FastFortran, 0o105200));
        assert_eq!(uig0(&opts, 0o105237), to(Feature::FastFortran, 0o105237));
        assert_eq!(uig0(&opts, 0o105240), to(Feature::ExtendedMemory, 0o105240));
        assert_eq!(uig0(&opts, 0o105300), to(Feature::DistributedSystem, 0o105300));
        assert_eq!(uig0(&opts, 0o105320), to(Feature::DoubleInteger, 0o105320));
        assert_eq!(uig0(&opts, 0o105340), to(Feature::RteOs, 0o105340));
    }

    #[test]
    fn test_uig0_undefined_modules() {
        let mut opts = CpuOptions::new(CpuModel::Hp1000E);
        for option in CpuOption::ALL {
            let _ = opts.install(option);
        }
        for ir in [0o105140, 0o105160, 0o105260, 0o105360, 0o105377] {
            assert_eq!(uig0(&opts, ir), Route::Undefined, "{:06o}", ir);
        }
    }

    #[test]
    fn test_uig0_requires_option() {
        let opts = CpuOptions::new(CpuModel::Hp1000E);
        assert_eq!(uig0(&opts, 0o105200), Route::Undefined);
        assert_eq!(uig0(&opts, 0o105320), Route::Undefined);

        let opts = CpuOptions::new(CpuModel::Hp2100);
        assert_eq!(uig0(&opts, 0o105000), Route::Undefined);
    }

    #[test]
    fn test_sis_needs_fpp_on_f_series() {
        // the FPP is standard, so a stock 1000-F reaches SIS
        let mut opts = CpuOptions::new(CpuModel::Hp1000F);
        assert_eq!(uig0(&opts, 0o105320), to(Feature::ScientificInstructions, 0o105320));
        assert_eq!(uig0(&opts, 0o105337), to(Feature::ScientificInstructions, 0o105337));

        opts.floating_point = FloatingPointMode::Firmware;
        assert_eq!(uig0(&opts, 0o105320), Route::Undefined);
    }

    #[test]
    fn test_dbi_diagnostic_remap() {
        let mut opts = CpuOptions::new(CpuModel::Hp1000E);
        opts.install(CpuOption::DoubleInteger).unwrap();
        assert_eq!(uig0(&opts, 0o105014), to(Feature::FloatingPoint, 0o105014));

        opts.dbi_diagnostic = true;
        assert_eq!(uig0(&opts, 0o105014), to(Feature::DoubleInteger, 0o105321));
        assert_eq!(uig0(&opts, 0o105213), to(Feature::DoubleInteger, 0o105333));
        assert_eq!(uig0(&opts, 0o105015), to(Feature::FloatingPoint, 0o105015));

        opts.install(CpuOption::FastFortran).unwrap();
        assert_eq!(uig0(&opts, 0o105203), to(Feature::FastFortran, 0o105203));
    }

    #[test]
    fn test_uig1_only_on_1000() {
        for model in [CpuModel::Hp2114, CpuModel::Hp2116, CpuModel::Hp2100] {
            let opts = CpuOptions::new(model);
            assert_eq!(uig1(&opts, 0o105740), Route::Undefined);
        }
    }

    #[test]
    fn test_uig1_modules() {
        let mut opts = CpuOptions::new(CpuModel::Hp1000M);
        opts.install(CpuOption::DynamicMapping).unwrap();
        opts.install(CpuOption::DistributedSystem).unwrap();
        opts.install(CpuOption::IoProcessor).unwrap();

        assert_eq!(uig1(&opts, 0o101740), to(Feature::ExtendedInstructionGroup, 0o101740));
        assert_eq!(uig1(&opts, 0o105777), to(Feature::ExtendedInstructionGroup, 0o105777));
        assert_eq!(uig1(&opts, 0o105700), to(Feature::DynamicMapping, 0o105700));
        assert_eq!(uig1(&opts, 0o105460), to(Feature::IoProcessor, 0o105460));
        assert_eq!(uig1(&opts, 0o105527), to(Feature::DistributedSystem, 0o105307));
    }

    #[test]
    fn test_uig1_vector_on_f_series() {
        let mut opts = CpuOptions::new(CpuModel::Hp1000F);
        assert_eq!(uig1(&opts, 0o105460), Route::Undefined);
        opts.install(CpuOption::VectorInstructions).unwrap();
        opts.install(CpuOption::Signal).unwrap();
        assert_eq!(uig1(&opts, 0o105460), to(Feature::VectorInstructions, 0o105460));
        assert_eq!(uig1(&opts, 0o105600), to(Feature::Signal, 0o105600));
        // no I/O Processor on the F-Series
        assert_eq!(uig1(&opts, 0o105400), Route::Undefined);
    }

    #[test]
    fn test_uig1_undefined_modules() {
        let mut opts = CpuOptions::new(CpuModel::Hp1000F);
        for option in CpuOption::ALL {
            let _ = opts.install(option);
        }
        for ir in [0o105440, 0o105500, 0o105540, 0o105620, 0o105640, 0o105660] {
            assert_eq!(uig1(&opts, ir), Route::Undefined, "{:06o}", ir);
        }
    }
}
