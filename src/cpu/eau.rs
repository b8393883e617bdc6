//! Extended Arithmetic Unit.
//!
//! The EAU adds double-word shifts and rotates, multiply, divide, and
//! double load/store. The instruction codes map to operations as follows:
//!
//! ```text
//!     Instr.    Bits
//!      Code   15-8 7-4   2116    2100   1000-M  1000-E  1000-F  Note
//!     ------  ---- ---  ------  ------  ------  ------  ------  ---------------------
//!     100000   200  00                          [diag]  [diag]  [self test]
//!     100020   200  01   ASL     ASL     ASL     ASL     ASL    Bits 3-0 encode shift
//!     100040   200  02   LSL     LSL     LSL     LSL     LSL    Bits 3-0 encode shift
//!     100060   200  03                  [MPY]   TIMER   TIMER   [deterministic delay]
//!     100100   200  04   RRL     RRL     RRL     RRL     RRL    Bits 3-0 encode shift
//!     100200   200  10   MPY     MPY     MPY     MPY     MPY
//!     100400   201  xx   DIV     DIV     DIV     DIV     DIV
//!     101020   202  01   ASR     ASR     ASR     ASR     ASR    Bits 3-0 encode shift
//!     101040   202  02   LSR     LSR     LSR     LSR     LSR    Bits 3-0 encode shift
//!     101100   202  04   RRR     RRR     RRR     RRR     RRR    Bits 3-0 encode shift
//!     104200   210  xx   DLD     DLD     DLD     DLD     DLD
//!     104400   211  xx   DST     DST     DST     DST     DST
//! ```
//!
//! All other module codes are undefined. TIMER is used by HP software to
//! tell the M-Series from the E/F-Series, which is why the M-Series decodes
//! it as MPY rather than stopping. DIAG performs a destructive memory test
//! when executed from the front panel and is a NOP in a running program; it
//! is only accepted on the 1000-E.

use std::fmt;

use tracing::{event, Level};

use crate::cpu::decode::{self, EauGroup, Group, InstructionWord};
use crate::cpu::execute::{CpuError, InternalError, Status};
use crate::cpu::operand::{OperandPattern, OperandValue, Precision, Resolution};
use crate::cpu::{CpuModel, CpuOption, CpuOptions, CpuType, Machine, MemoryAccess};
use crate::word::{is_negative, negate, sext, split, DMASK, SIGN};

/// RRR 16, used as a NOP by 2114 software. The 2114 has no EAU.
pub const RRR_16: u16 = 0o101100;

/// An EAU operation, after model-dependent decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EauOp {
    Diag,
    Asl,
    Lsl,
    Timer,
    Rrl,
    Mpy,
    Div,
    Asr,
    Lsr,
    Rrr,
    Dld,
    Dst,
}

impl fmt::Display for EauOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EauOp::Diag => "DIAG",
            EauOp::Asl => "ASL",
            EauOp::Lsl => "LSL",
            EauOp::Timer => "TIMER",
            EauOp::Rrl => "RRL",
            EauOp::Mpy => "MPY",
            EauOp::Div => "DIV",
            EauOp::Asr => "ASR",
            EauOp::Lsr => "LSR",
            EauOp::Rrr => "RRR",
            EauOp::Dld => "DLD",
            EauOp::Dst => "DST",
        };
        f.write_str(name)
    }
}

/// The EAU decode table. `None` means the code is undefined on `model`.
pub fn eau_op(model: CpuModel, group: EauGroup, module: u8) -> Option<EauOp> {
    match group {
        EauGroup::Left => match module {
            0o00 if model == CpuModel::Hp1000E => Some(EauOp::Diag),
            0o01 => Some(EauOp::Asl),
            0o02 => Some(EauOp::Lsl),
            0o03 => match (model.cpu_type(), model) {
                (CpuType::Hp1000, CpuModel::Hp1000M) => Some(EauOp::Mpy),
                (CpuType::Hp1000, _) => Some(EauOp::Timer),
                _ => None,
            },
            0o04 => Some(EauOp::Rrl),
            0o10 => Some(EauOp::Mpy),
            _ => None,
        },
        EauGroup::Divide => Some(EauOp::Div),
        EauGroup::Right => match module {
            0o01 => Some(EauOp::Asr),
            0o02 => Some(EauOp::Lsr),
            0o04 => Some(EauOp::Rrr),
            _ => None,
        },
        EauGroup::DoubleLoad => Some(EauOp::Dld),
        EauGroup::DoubleStore => Some(EauOp::Dst),
    }
}

/// What an EAU-group word does on a configured machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EauDecode {
    Op(EauOp),
    /// RRR 16 on a 2114.
    Nop,
    Undefined,
}

/// Decode an EAU-group word against the installed options.
pub fn decode_eau(options: &CpuOptions, group: EauGroup, ir: InstructionWord) -> EauDecode {
    if !options.has(CpuOption::Eau) {
        return if options.model() == CpuModel::Hp2114 && ir.raw() == RRR_16 {
            EauDecode::Nop
        } else {
            EauDecode::Undefined
        };
    }
    match eau_op(options.model(), group, ir.module()) {
        Some(op) => EauDecode::Op(op),
        None => EauDecode::Undefined,
    }
}

/// The EAU group of `ir`.
pub fn eau_group(ir: InstructionWord) -> Result<EauGroup, InternalError> {
    match decode::classify(ir) {
        Group::Eau(group) => Ok(group),
        _ => Err(InternalError::NotEauGroup(ir)),
    }
}

/// Arithmetic left shift of B'A by `count` bits.
///
/// The sign bit stays put while the other 31 bits shift. Overflow is set if
/// any bit shifted into the sign position differs from the sign.
pub fn arithmetic_left(ba: u32, count: u32) -> (u32, bool) {
    let (mut b, mut a) = split(ba);
    let mut overflow = false;
    for _ in 0..count {
        let t = (b as u32) << 1;
        b = (b & SIGN) | (t & 0o077777) as u16 | (a >> 15);
        a = ((a as u32) << 1 & DMASK) as u16;
        if (b as u32 ^ t) & SIGN as u32 != 0 {
            overflow = true;
        }
    }
    ((b as u32) << 16 | a as u32, overflow)
}

/// Result of a 32-by-16 signed divide, or `None` if the quotient overflows.
///
/// Returns (quotient, remainder). The remainder takes the dividend's sign.
pub fn divide(ba: u32, divisor: u16) -> Option<(u16, u16)> {
    let (mut b, mut a) = split(ba);
    let dividend_negative = is_negative(b);
    let mut quotient_negative = dividend_negative;

    if dividend_negative {
        a = negate(a);
        b = (!b).wrapping_add((a == 0) as u16);
    }
    let mut magnitude = divisor;
    if is_negative(magnitude) {
        magnitude = negate(magnitude);
        quotient_negative = !quotient_negative;
    }
    if b >= magnitude {
        return None;
    }

    let v1 = (b as u32) << 16 | a as u32;
    let mut quotient = (v1 / magnitude as u32) as u16;
    let mut remainder = (v1 % magnitude as u32) as u16;
    if quotient != 0 {
        if quotient_negative {
            quotient = negate(quotient);
        }
        if is_negative(quotient) != quotient_negative {
            return None;
        }
    }
    if dividend_negative {
        remainder = negate(remainder);
    }
    Some((quotient, remainder))
}

impl<M: MemoryAccess> Machine<M> {
    /// Execute an EAU instruction. The caller has checked that the EAU is installed.
    pub fn execute_eau(
        &mut self,
        group: EauGroup,
        ir: InstructionWord,
        intrq: bool,
    ) -> Result<Status, CpuError> {
        let op = eau_op(self.options.model(), group, ir.module())
            .ok_or(CpuError::UndefinedInstruction(ir))?;
        event!(Level::TRACE, "{} {} at P={:05o}", ir, op, self.err_p);

        let sc = ir.shift_count();
        let regs = &mut self.regs;
        match op {
            EauOp::Diag => (),

            EauOp::Asl => {
                let (ba, overflow) = arithmetic_left(regs.ba(), sc);
                regs.set_ba(ba);
                regs.o = overflow;
            }

            EauOp::Lsl => regs.set_ba(regs.ba() << sc),

            EauOp::Timer => {
                regs.b = regs.b.wrapping_add(1);
                if regs.b != 0 {
                    self.repeat_instruction();
                }
            }

            EauOp::Rrl => regs.set_ba(regs.ba().rotate_left(sc)),

            EauOp::Mpy => {
                let operand = match self.resolve_operands(OperandPattern::K, intrq)? {
                    Resolution::Ready(ops) => ops[0].word()?,
                    Resolution::Deferred => return Ok(Status::Deferred),
                };
                let product = sext(self.regs.a) * sext(operand);
                self.regs.set_ba(product as u32);
                self.regs.o = false;
            }

            EauOp::Div => {
                let divisor = match self.resolve_operands(OperandPattern::K, intrq)? {
                    Resolution::Ready(ops) => ops[0].word()?,
                    Resolution::Deferred => return Ok(Status::Deferred),
                };
                // On overflow the hardware result is undefined; A and B keep
                // their prior values.
                match divide(self.regs.ba(), divisor) {
                    Some((quotient, remainder)) => {
                        self.regs.a = quotient;
                        self.regs.b = remainder;
                        self.regs.o = false;
                    }
                    None => self.regs.o = true,
                }
            }

            EauOp::Asr => {
                regs.set_ba(((regs.ba() as i32) >> sc) as u32);
                regs.o = false;
            }

            EauOp::Lsr => regs.set_ba(regs.ba() >> sc),

            EauOp::Rrr => regs.set_ba(regs.ba().rotate_right(sc)),

            EauOp::Dld => {
                let value = match self.resolve_operands(OperandPattern::D, intrq)? {
                    Resolution::Ready(ops) => ops[0].dword()?,
                    Resolution::Deferred => return Ok(Status::Deferred),
                };
                self.regs.set_ab(value);
            }

            EauOp::Dst => {
                let address = match self.resolve_operands(OperandPattern::A, intrq)? {
                    Resolution::Ready(ops) => ops[0].word()?,
                    Resolution::Deferred => return Ok(Status::Deferred),
                };
                let value = OperandValue::DoubleWord(self.regs.ab());
                self.store_operand(address, &value, Precision::DoubleInt)?;
            }
        }
        Ok(Status::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::INDIRECT;
    use proptest::prelude::*;

    fn machine(model: CpuModel) -> Machine {
        let mut m = Machine::new(CpuOptions::new(model));
        m.err_p = 0o1777;
        m.regs.p = 0o2000;
        m
    }

    fn run(m: &mut Machine, ir: u16) -> Result<Status, CpuError> {
        let ir = InstructionWord::new(ir);
        m.execute_eau(eau_group(ir)?, ir, false)
    }

    #[test]
    fn test_eau_group() {
        assert_eq!(eau_group(InstructionWord::new(0o101100)), Ok(EauGroup::Right));
        assert_eq!(eau_group(InstructionWord::new(0o104400)), Ok(EauGroup::DoubleStore));
        assert_eq!(
            eau_group(InstructionWord::new(0o105000)),
            Err(InternalError::NotEauGroup(InstructionWord::new(0o105000)))
        );
    }

    #[test]
    fn test_decode_table() {
        use CpuModel::*;
        assert_eq!(eau_op(Hp1000M, EauGroup::Left, 0o03), Some(EauOp::Mpy));
        assert_eq!(eau_op(Hp1000E, EauGroup::Left, 0o03), Some(EauOp::Timer));
        assert_eq!(eau_op(Hp1000F, EauGroup::Left, 0o03), Some(EauOp::Timer));
        assert_eq!(eau_op(Hp2100, EauGroup::Left, 0o03), None);
        assert_eq!(eau_op(Hp1000E, EauGroup::Left, 0o00), Some(EauOp::Diag));
        assert_eq!(eau_op(Hp1000F, EauGroup::Left, 0o00), None);
        assert_eq!(eau_op(Hp2100, EauGroup::Left, 0o05), None);
        assert_eq!(eau_op(Hp2100, EauGroup::Right, 0o03), None);
        assert_eq!(eau_op(Hp2116, EauGroup::Divide, 0o17), Some(EauOp::Div));
    }

    #[test]
    fn test_decode_against_options() {
        let rrr16 = InstructionWord::new(RRR_16);
        let asl1 = InstructionWord::new(0o100021);

        let opts = CpuOptions::new(CpuModel::Hp2114);
        assert_eq!(decode_eau(&opts, EauGroup::Right, rrr16), EauDecode::Nop);
        assert_eq!(decode_eau(&opts, EauGroup::Left, asl1), EauDecode::Undefined);

        let mut opts = CpuOptions::new(CpuModel::Hp2116);
        assert_eq!(decode_eau(&opts, EauGroup::Right, rrr16), EauDecode::Undefined);
        opts.install(CpuOption::Eau).unwrap();
        assert_eq!(decode_eau(&opts, EauGroup::Right, rrr16), EauDecode::Op(EauOp::Rrr));
        assert_eq!(decode_eau(&opts, EauGroup::Left, asl1), EauDecode::Op(EauOp::Asl));

        let opts = CpuOptions::new(CpuModel::Hp1000F);
        let diag = InstructionWord::new(0o100000);
        assert_eq!(decode_eau(&opts, EauGroup::Left, diag), EauDecode::Undefined);
    }

    #[test]
    fn test_multiply_minus_one_squared() {
        let mut m = machine(CpuModel::Hp1000E);
        m.regs.a = 0xFFFF;
        m.regs.o = true;
        m.mem.write_word(0o2000, 0o3000);
        m.mem.write_word(0o3000, 0xFFFF);

        assert_eq!(run(&mut m, 0o100200).unwrap(), Status::Completed);
        assert_eq!((m.regs.b, m.regs.a), (0x0000, 0x0001));
        assert!(!m.regs.o);
        assert_eq!(m.regs.p, 0o2001);
    }

    #[test]
    fn test_multiply_signed() {
        let mut m = machine(CpuModel::Hp2100);
        m.regs.a = 300;
        m.mem.write_word(0o2000, 0o3000);
        m.mem.write_word(0o3000, negate(400));

        run(&mut m, 0o100200).unwrap();
        assert_eq!(m.regs.ba() as i32, -120_000);
    }

    #[test]
    fn test_timer_aliases_multiply_on_1000m() {
        let mut m = machine(CpuModel::Hp1000M);
        m.regs.a = 7;
        m.mem.write_word(0o2000, 0o3000);
        m.mem.write_word(0o3000, 6);

        run(&mut m, 0o100060).unwrap();
        assert_eq!(m.regs.ba(), 42);
        assert_eq!(m.regs.p, 0o2001);
    }

    #[test]
    fn test_timer_repeats_until_b_wraps() {
        let mut m = machine(CpuModel::Hp1000E);
        m.regs.b = 0xFFFE;

        run(&mut m, 0o100060).unwrap();
        assert_eq!(m.regs.b, 0xFFFF);
        assert_eq!(m.regs.p, 0o1777);

        m.regs.p = 0o2000;
        run(&mut m, 0o100060).unwrap();
        assert_eq!(m.regs.b, 0);
        assert_eq!(m.regs.p, 0o2000);
    }

    #[test]
    fn test_divide() {
        let mut m = machine(CpuModel::Hp1000E);
        m.regs.set_ba(16);
        m.mem.write_word(0o2000, 0o3000);
        m.mem.write_word(0o3000, 3);

        run(&mut m, 0o100400).unwrap();
        assert_eq!((m.regs.a, m.regs.b), (5, 1));
        assert!(!m.regs.o);
    }

    #[test]
    fn test_divide_signs() {
        assert_eq!(divide((-16i32) as u32, 3), Some((negate(5), negate(1))));
        assert_eq!(divide(16, negate(3)), Some((negate(5), 1)));
        assert_eq!(divide((-16i32) as u32, negate(3)), Some((5, negate(1))));
        assert_eq!(divide((-32768i32) as u32, 1), Some((0o100000, 0)));
    }

    #[test]
    fn test_divide_overflow() {
        assert_eq!(divide(0x0003_0000, 3), None);
        assert_eq!(divide(0x0001_0000, 0), None);
        // magnitude fits in 16 bits but not in a positive quotient
        assert_eq!(divide(0x0000_8000, 1), None);

        let mut m = machine(CpuModel::Hp1000E);
        m.regs.set_ba(0x0005_0000);
        m.mem.write_word(0o2000, 0o3000);
        m.mem.write_word(0o3000, 3);
        run(&mut m, 0o100400).unwrap();
        assert!(m.regs.o);
    }

    #[test]
    fn test_shifts() {
        let mut m = machine(CpuModel::Hp2100);

        m.regs.set_ba(0x0000_8001);
        run(&mut m, 0o100041).unwrap(); // LSL 1
        assert_eq!(m.regs.ba(), 0x0001_0002);

        run(&mut m, 0o100040).unwrap(); // LSL 16
        assert_eq!(m.regs.ba(), 0x0002_0000);

        run(&mut m, 0o101044).unwrap(); // LSR 4
        assert_eq!(m.regs.ba(), 0x0000_2000);

        m.regs.set_ba(0x8000_0001);
        run(&mut m, 0o100104).unwrap(); // RRL 4
        assert_eq!(m.regs.ba(), 0x0000_0018);

        run(&mut m, 0o101104).unwrap(); // RRR 4
        assert_eq!(m.regs.ba(), 0x8000_0001);

        m.regs.o = true;
        run(&mut m, 0o101021).unwrap(); // ASR 1
        assert_eq!(m.regs.ba(), 0xC000_0000);
        assert!(!m.regs.o);
    }

    #[test]
    fn test_arithmetic_left_overflow() {
        let mut m = machine(CpuModel::Hp2100);
        m.regs.set_ba(0x4000_0000);
        run(&mut m, 0o100021).unwrap(); // ASL 1
        assert_eq!(m.regs.ba(), 0x0000_0000);
        assert!(m.regs.o);

        m.regs.set_ba(0xFFFF_FFFF);
        run(&mut m, 0o100024).unwrap(); // ASL 4
        assert_eq!(m.regs.ba(), 0xFFFF_FFF0);
        assert!(!m.regs.o);
    }

    #[test]
    fn test_arithmetic_left_overflow_on_intermediate_bit() {
        // the first bit out changes the sign, the second does not
        assert_eq!(arithmetic_left(0x4000_0000, 2), (0x0000_0000, true));
        assert_eq!(arithmetic_left(0x2000_0001, 1), (0x4000_0002, false));

        let mut m = machine(CpuModel::Hp1000E);
        m.regs.set_ba(0x4000_0000);
        run(&mut m, 0o100022).unwrap(); // ASL 2
        assert_eq!(m.regs.ba(), 0x0000_0000);
        assert!(m.regs.o);

        // 0110... shifted by 3 overflows on the first two bits only
        m.regs.set_ba(0x6000_0001);
        run(&mut m, 0o100023).unwrap(); // ASL 3
        assert_eq!(m.regs.ba(), 0x0000_0008);
        assert!(m.regs.o);
    }

    #[test]
    fn test_double_load_store() {
        let mut m = machine(CpuModel::Hp1000F);
        m.mem.write_word(0o2000, INDIRECT | 0o2100);
        m.mem.write_word(0o2100, 0o3000);
        m.mem.load(0o3000, &[0o111111, 0o122222]);

        run(&mut m, 0o104200).unwrap();
        assert_eq!((m.regs.a, m.regs.b), (0o111111, 0o122222));

        m.mem.write_word(0o2001, 0o4000);
        run(&mut m, 0o104400).unwrap();
        assert_eq!(m.mem.dump(0o4000, 2), vec![(0o4000, 0o111111), (0o4001, 0o122222)]);
        assert_eq!(m.regs.p, 0o2002);
    }

    #[test]
    fn test_deferred_multiply_leaves_state() {
        let mut m = machine(CpuModel::Hp1000E);
        m.regs.a = 5;
        let mut address = 0o2000;
        for next in [0o2100u16, 0o2200, 0o2300, 0o2400] {
            m.mem.write_word(address, INDIRECT | next);
            address = next;
        }
        m.mem.write_word(0o2400, 0o3000);

        let ir = InstructionWord::new(0o100200);
        let status = m.execute_eau(EauGroup::Left, ir, true).unwrap();
        assert_eq!(status, Status::Deferred);
        assert_eq!(m.regs.a, 5);
        assert_eq!(m.regs.p, 0o2000);
    }

    #[test]
    fn test_undefined_module() {
        let mut m = machine(CpuModel::Hp1000F);
        assert!(matches!(
            run(&mut m, 0o101060),
            Err(CpuError::UndefinedInstruction(ir)) if ir.raw() == 0o101060
        ));
    }

    proptest! {
        #[test]
        fn asl_n_matches_repeated_asl_1(ba in any::<u32>(), count in 1u32..=16) {
            let (expected, overflow) = (0..count).fold((ba, false), |(value, o), _| {
                let (next, step_o) = arithmetic_left(value, 1);
                (next, o || step_o)
            });
            prop_assert_eq!(arithmetic_left(ba, count), (expected, overflow));
        }

        #[test]
        fn divide_matches_signed_arithmetic(dividend in any::<i32>(), divisor in any::<i16>()) {
            prop_assume!(divisor != 0);
            let q = dividend as i64 / divisor as i64;
            let r = dividend as i64 % divisor as i64;
            match divide(dividend as u32, divisor as u16) {
                Some((quotient, remainder)) => {
                    prop_assert_eq!(quotient as i16 as i64, q);
                    prop_assert_eq!(remainder as i16 as i64, r);
                }
                None => prop_assert!(q < i16::MIN as i64 || q > i16::MAX as i64),
            }
        }
    }
}
