//! Instruction word fields and top-level group decode.
//!
//! The 1000 decodes these instruction sets as a series of microcoded jumps.
//! Bits 15-8 select the group: EAU (200, 201, 202, 210 and 211), UIG 0
//! (212) or UIG 1 (203 and 213). Bits 7-4 select one of sixteen modules
//! within a group, and bits 3-0 select an entry point within a module or
//! hold a shift count. The 2100 decodes EAU and UIG 0 separately in
//! hardware, but the simulation follows the 1000 scheme for every model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A fetched instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstructionWord(u16);

impl InstructionWord {
    #[inline]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Bits 15-8.
    #[inline]
    pub const fn group(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Bits 7-4.
    #[inline]
    pub const fn module(self) -> u8 {
        ((self.0 >> 4) & 0o17) as u8
    }

    /// Bits 3-0.
    #[inline]
    pub const fn immediate(self) -> u8 {
        (self.0 & 0o17) as u8
    }

    /// Shift count held in bits 3-0, where zero means sixteen.
    #[inline]
    pub const fn shift_count(self) -> u32 {
        match self.immediate() {
            0 => 16,
            n => n as u32,
        }
    }

    /// The same word with `mask` exclusive-ORed in.
    #[inline]
    pub const fn remap(self, mask: u16) -> Self {
        Self(self.0 ^ mask)
    }
}

impl From<u16> for InstructionWord {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for InstructionWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o}", self.0)
    }
}

/// The five EAU groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EauGroup {
    /// 200: DIAG, ASL, LSL, TIMER, RRL, MPY
    Left,
    /// 201: DIV
    Divide,
    /// 202: ASR, LSR, RRR
    Right,
    /// 210: DLD
    DoubleLoad,
    /// 211: DST
    DoubleStore,
}

/// Result of the top-level classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Group {
    Eau(EauGroup),
    /// User Instruction Group 0 (105000-105377).
    Uig0,
    /// User Instruction Group 1 (101400-101777 and 105400-105777).
    Uig1,
    /// Not part of the EAU or the UIGs.
    Other,
}

impl Group {
    pub const EAU_LEFT: u8 = 0o200;
    pub const EAU_DIVIDE: u8 = 0o201;
    pub const EAU_RIGHT: u8 = 0o202;
    pub const UIG1_A: u8 = 0o203;
    pub const EAU_DLD: u8 = 0o210;
    pub const EAU_DST: u8 = 0o211;
    pub const UIG0: u8 = 0o212;
    pub const UIG1_B: u8 = 0o213;
}

/// Classify an instruction by bits 15-8.
pub fn classify(ir: InstructionWord) -> Group {
    match ir.group() {
        Group::EAU_LEFT => Group::Eau(EauGroup::Left),
        Group::EAU_DIVIDE => Group::Eau(EauGroup::Divide),
        Group::EAU_RIGHT => Group::Eau(EauGroup::Right),
        Group::EAU_DLD => Group::Eau(EauGroup::DoubleLoad),
        Group::EAU_DST => Group::Eau(EauGroup::DoubleStore),
        Group::UIG0 => Group::Uig0,
        Group::UIG1_A | Group::UIG1_B => Group::Uig1,
        _ => Group::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields() {
        let ir = InstructionWord::new(0o101137);
        assert_eq!(ir.group(), 0o202);
        assert_eq!(ir.module(), 0o05);
        assert_eq!(ir.immediate(), 0o17);
        assert_eq!(ir.to_string(), "101137");
    }

    #[test]
    fn test_shift_count_zero_is_sixteen() {
        assert_eq!(InstructionWord::new(0o100020).shift_count(), 16);
        assert_eq!(InstructionWord::new(0o100021).shift_count(), 1);
        assert_eq!(InstructionWord::new(0o100037).shift_count(), 15);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(0o100200.into()), Group::Eau(EauGroup::Left));
        assert_eq!(classify(0o100400.into()), Group::Eau(EauGroup::Divide));
        assert_eq!(classify(0o101100.into()), Group::Eau(EauGroup::Right));
        assert_eq!(classify(0o104200.into()), Group::Eau(EauGroup::DoubleLoad));
        assert_eq!(classify(0o104400.into()), Group::Eau(EauGroup::DoubleStore));
        assert_eq!(classify(0o105000.into()), Group::Uig0);
        assert_eq!(classify(0o101740.into()), Group::Uig1);
        assert_eq!(classify(0o105740.into()), Group::Uig1);
        assert_eq!(classify(0o002400.into()), Group::Other);
        assert_eq!(classify(0o106000.into()), Group::Other);
    }

    #[test]
    fn test_remap() {
        assert_eq!(InstructionWord::new(0o105520).remap(0o620).raw(), 0o105300);
    }
}
