//! Generalized instruction operand processing.
//!
//! Operands for a firmware instruction are described by an operand pattern:
//! an ordered list of tags saying where each operand lives and whether its
//! value or its address is wanted. The processor walks the pattern, pulls
//! each operand from the registers, the words following the instruction, or
//! through an inline (possibly indirect) address, and returns the values in
//! pattern order.
//!
//! ```text
//!   Tag  Operand                                  Example     Returns
//!   ---  ---------------------------------------  ----------  -----------
//!    I   integer in A                               LDA I      value of I
//!    J   double integer in A/B                      DLD J      value of J
//!    R   2-word real in A/B                         DLD F      value of F
//!    C   inline 1-word constant                   C DEC 0      value of C
//!    V   inline 1-word variable                   V BSS 1      address of V
//!    A   inline address                             DEF A      address of A
//!    K   address of integer                         DEF K      value of K
//!    D   address of double integer                  DEF D      value of D
//!    F   address of 2-word real                     DEF F      value of F
//!    X   address of 3-word extended real            DEF X      value of X
//!    T   address of 4-word double real              DEF T      value of T
//!    E   address of 5-word expanded real            DEF E      value of E
//! ```
//!
//! Inline addresses are resolved to direct addresses. If an interrupt is
//! pending and more than three levels of indirection are needed, processing
//! stops and the instruction is retried after the interrupt is serviced.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use crate::cpu::execute::{CpuError, InternalError};
use crate::cpu::{Machine, MemoryAccess};
use crate::word::{address_add, split, INDIRECT, VAMASK};

/// Most operands a single instruction can take.
pub const MAX_OPERANDS: usize = 8;

/// Indirect levels that may be followed while an interrupt is pending.
pub const INDIRECT_BUDGET: u32 = 3;

/// Floating-point formats, by word count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatPrecision {
    /// 2-word single precision
    Real,
    /// 3-word extended precision
    Extended,
    /// 4-word double precision
    Double,
    /// 5-word expanded exponent
    Expanded,
}

impl FloatPrecision {
    pub const fn words(self) -> usize {
        match self {
            FloatPrecision::Real => 2,
            FloatPrecision::Extended => 3,
            FloatPrecision::Double => 4,
            FloatPrecision::Expanded => 5,
        }
    }
}

/// Width and kind of a memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Precision {
    Int,
    DoubleInt,
    Float(FloatPrecision),
}

impl Precision {
    pub const fn words(self) -> usize {
        match self {
            Precision::Int => 1,
            Precision::DoubleInt => 2,
            Precision::Float(fp) => fp.words(),
        }
    }
}

/// One element of an operand pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandTag {
    None,
    IntInAcc,
    DoubleIntInAcc,
    FloatInAcc,
    InlineConstant,
    InlineVariable,
    InlineAddress,
    AddressOfInt,
    AddressOfDoubleInt,
    AddressOfFloat(FloatPrecision),
}

impl OperandTag {
    /// Packed 4-bit code. Inline tags start at 4 and address tags at 6.
    pub const fn code(self) -> u8 {
        match self {
            OperandTag::None => 0,
            OperandTag::IntInAcc => 1,
            OperandTag::DoubleIntInAcc => 2,
            OperandTag::FloatInAcc => 3,
            OperandTag::InlineConstant => 4,
            OperandTag::InlineVariable => 5,
            OperandTag::InlineAddress => 6,
            OperandTag::AddressOfInt => 7,
            OperandTag::AddressOfDoubleInt => 8,
            OperandTag::AddressOfFloat(FloatPrecision::Real) => 9,
            OperandTag::AddressOfFloat(FloatPrecision::Extended) => 10,
            OperandTag::AddressOfFloat(FloatPrecision::Double) => 11,
            OperandTag::AddressOfFloat(FloatPrecision::Expanded) => 12,
        }
    }

    /// Operand is reached through an address word following the instruction.
    #[inline]
    pub const fn is_address(self) -> bool {
        self.code() >= OperandTag::InlineAddress.code()
    }

    /// Operand occupies a word following the instruction.
    #[inline]
    pub const fn is_inline(self) -> bool {
        self.code() >= OperandTag::InlineConstant.code()
    }

    pub const fn letter(self) -> char {
        match self {
            OperandTag::None => 'N',
            OperandTag::IntInAcc => 'I',
            OperandTag::DoubleIntInAcc => 'J',
            OperandTag::FloatInAcc => 'R',
            OperandTag::InlineConstant => 'C',
            OperandTag::InlineVariable => 'V',
            OperandTag::InlineAddress => 'A',
            OperandTag::AddressOfInt => 'K',
            OperandTag::AddressOfDoubleInt => 'D',
            OperandTag::AddressOfFloat(FloatPrecision::Real) => 'F',
            OperandTag::AddressOfFloat(FloatPrecision::Extended) => 'X',
            OperandTag::AddressOfFloat(FloatPrecision::Double) => 'T',
            OperandTag::AddressOfFloat(FloatPrecision::Expanded) => 'E',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        let tag = match letter.to_ascii_uppercase() {
            'N' => OperandTag::None,
            'I' => OperandTag::IntInAcc,
            'J' => OperandTag::DoubleIntInAcc,
            'R' => OperandTag::FloatInAcc,
            'C' => OperandTag::InlineConstant,
            'V' => OperandTag::InlineVariable,
            'A' => OperandTag::InlineAddress,
            'K' => OperandTag::AddressOfInt,
            'D' => OperandTag::AddressOfDoubleInt,
            'F' => OperandTag::AddressOfFloat(FloatPrecision::Real),
            'X' => OperandTag::AddressOfFloat(FloatPrecision::Extended),
            'T' => OperandTag::AddressOfFloat(FloatPrecision::Double),
            'E' => OperandTag::AddressOfFloat(FloatPrecision::Expanded),
            _ => return None,
        };
        Some(tag)
    }
}

impl TryFrom<u8> for OperandTag {
    type Error = InternalError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        let tag = match code {
            0 => OperandTag::None,
            1 => OperandTag::IntInAcc,
            2 => OperandTag::DoubleIntInAcc,
            3 => OperandTag::FloatInAcc,
            4 => OperandTag::InlineConstant,
            5 => OperandTag::InlineVariable,
            6 => OperandTag::InlineAddress,
            7 => OperandTag::AddressOfInt,
            8 => OperandTag::AddressOfDoubleInt,
            9 => OperandTag::AddressOfFloat(FloatPrecision::Real),
            10 => OperandTag::AddressOfFloat(FloatPrecision::Extended),
            11 => OperandTag::AddressOfFloat(FloatPrecision::Double),
            12 => OperandTag::AddressOfFloat(FloatPrecision::Expanded),
            _ => return Err(InternalError::BadOperandTag(code)),
        };
        Ok(tag)
    }
}

use OperandTag as Tag;

/// Ordered operand tags for one instruction.
///
/// Processing stops at the first `None` tag, so anything after it is inert.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperandPattern {
    tags: [OperandTag; MAX_OPERANDS],
}

impl OperandPattern {
    const REAL: OperandTag = Tag::AddressOfFloat(FloatPrecision::Real);
    const EXT: OperandTag = Tag::AddressOfFloat(FloatPrecision::Extended);
    const DBL: OperandTag = Tag::AddressOfFloat(FloatPrecision::Double);
    const EXP: OperandTag = Tag::AddressOfFloat(FloatPrecision::Expanded);

    pub const N: Self = Self::new(&[]);
    pub const I: Self = Self::new(&[Tag::IntInAcc]);
    pub const J: Self = Self::new(&[Tag::DoubleIntInAcc]);
    pub const R: Self = Self::new(&[Tag::FloatInAcc]);
    pub const C: Self = Self::new(&[Tag::InlineConstant]);
    pub const V: Self = Self::new(&[Tag::InlineVariable]);
    pub const A: Self = Self::new(&[Tag::InlineAddress]);
    pub const K: Self = Self::new(&[Tag::AddressOfInt]);
    pub const D: Self = Self::new(&[Tag::AddressOfDoubleInt]);
    pub const F: Self = Self::new(&[Self::REAL]);
    pub const X: Self = Self::new(&[Self::EXT]);
    pub const T: Self = Self::new(&[Self::DBL]);
    pub const E: Self = Self::new(&[Self::EXP]);

    pub const IA: Self = Self::new(&[Tag::IntInAcc, Tag::InlineAddress]);
    pub const JA: Self = Self::new(&[Tag::DoubleIntInAcc, Tag::InlineAddress]);
    pub const JD: Self = Self::new(&[Tag::DoubleIntInAcc, Tag::AddressOfDoubleInt]);
    pub const RC: Self = Self::new(&[Tag::FloatInAcc, Tag::InlineConstant]);
    pub const RK: Self = Self::new(&[Tag::FloatInAcc, Tag::AddressOfInt]);
    pub const RF: Self = Self::new(&[Tag::FloatInAcc, Self::REAL]);
    pub const CC: Self = Self::new(&[Tag::InlineConstant, Tag::InlineConstant]);
    pub const CV: Self = Self::new(&[Tag::InlineConstant, Tag::InlineVariable]);
    pub const AC: Self = Self::new(&[Tag::InlineAddress, Tag::InlineConstant]);
    pub const AA: Self = Self::new(&[Tag::InlineAddress, Tag::InlineAddress]);
    pub const AK: Self = Self::new(&[Tag::InlineAddress, Tag::AddressOfInt]);
    pub const AX: Self = Self::new(&[Tag::InlineAddress, Self::EXT]);
    pub const AT: Self = Self::new(&[Tag::InlineAddress, Self::DBL]);
    pub const KV: Self = Self::new(&[Tag::AddressOfInt, Tag::InlineVariable]);
    pub const KA: Self = Self::new(&[Tag::AddressOfInt, Tag::InlineAddress]);
    pub const KK: Self = Self::new(&[Tag::AddressOfInt, Tag::AddressOfInt]);
    pub const FF: Self = Self::new(&[Self::REAL, Self::REAL]);

    pub const IIF: Self = Self::new(&[Tag::IntInAcc, Tag::IntInAcc, Self::REAL]);
    pub const IAT: Self = Self::new(&[Tag::IntInAcc, Tag::InlineAddress, Self::DBL]);
    pub const CVA: Self = Self::new(&[Tag::InlineConstant, Tag::InlineVariable, Tag::InlineAddress]);
    pub const AAF: Self = Self::new(&[Tag::InlineAddress, Tag::InlineAddress, Self::REAL]);
    pub const AAX: Self = Self::new(&[Tag::InlineAddress, Tag::InlineAddress, Self::EXT]);
    pub const AAT: Self = Self::new(&[Tag::InlineAddress, Tag::InlineAddress, Self::DBL]);
    pub const AKK: Self = Self::new(&[Tag::InlineAddress, Tag::AddressOfInt, Tag::AddressOfInt]);
    pub const AXX: Self = Self::new(&[Tag::InlineAddress, Self::EXT, Self::EXT]);
    pub const ATT: Self = Self::new(&[Tag::InlineAddress, Self::DBL, Self::DBL]);
    pub const AEE: Self = Self::new(&[Tag::InlineAddress, Self::EXP, Self::EXP]);

    pub const AAXX: Self = Self::new(&[Tag::InlineAddress, Tag::InlineAddress, Self::EXT, Self::EXT]);
    pub const KKKK: Self = Self::new(&[
        Tag::AddressOfInt,
        Tag::AddressOfInt,
        Tag::AddressOfInt,
        Tag::AddressOfInt,
    ]);
    pub const CATAKK: Self = Self::new(&[
        Tag::InlineConstant,
        Tag::InlineAddress,
        Self::DBL,
        Tag::InlineAddress,
        Tag::AddressOfInt,
        Tag::AddressOfInt,
    ]);
    pub const KKKAKK: Self = Self::new(&[
        Tag::AddressOfInt,
        Tag::AddressOfInt,
        Tag::AddressOfInt,
        Tag::InlineAddress,
        Tag::AddressOfInt,
        Tag::AddressOfInt,
    ]);
    pub const CCACACCA: Self = Self::new(&[
        Tag::InlineConstant,
        Tag::InlineConstant,
        Tag::InlineAddress,
        Tag::InlineConstant,
        Tag::InlineAddress,
        Tag::InlineConstant,
        Tag::InlineConstant,
        Tag::InlineAddress,
    ]);

    /// Build a pattern from up to eight tags.
    pub const fn new(tags: &[OperandTag]) -> Self {
        assert!(tags.len() <= MAX_OPERANDS, "operand pattern longer than eight tags");
        let mut out = [OperandTag::None; MAX_OPERANDS];
        let mut i = 0;
        while i < tags.len() {
            out[i] = tags[i];
            i += 1;
        }
        Self { tags: out }
    }

    /// Build a pattern from its letter mnemonic, e.g. `"CATAKK"`.
    pub fn parse(mnemonic: &str) -> Option<Self> {
        let mut tags = [OperandTag::None; MAX_OPERANDS];
        let mut count = 0;
        for letter in mnemonic.chars() {
            if count == MAX_OPERANDS {
                return None;
            }
            tags[count] = OperandTag::from_letter(letter)?;
            count += 1;
        }
        Some(Self { tags })
    }

    /// Decode the packed form: 4 bits per tag, first operand lowest.
    ///
    /// Decoding stops at the first `None` nibble, exactly as processing does,
    /// so only nibbles ahead of it are checked.
    pub fn from_packed(packed: u32) -> Result<Self, InternalError> {
        let mut tags = [OperandTag::None; MAX_OPERANDS];
        for (i, slot) in tags.iter_mut().enumerate() {
            let tag = OperandTag::try_from(((packed >> (4 * i)) & 0o17) as u8)?;
            if tag == OperandTag::None {
                break;
            }
            *slot = tag;
        }
        Ok(Self { tags })
    }

    pub fn packed(&self) -> u32 {
        self.iter()
            .enumerate()
            .fold(0, |acc, (i, tag)| acc | (tag.code() as u32) << (4 * i))
    }

    /// Tags up to the first `None`.
    pub fn iter(&self) -> impl Iterator<Item = OperandTag> + '_ {
        self.tags.iter().copied().take_while(|&tag| tag != OperandTag::None)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for OperandPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperandPattern({})", self)
    }
}

impl fmt::Display for OperandPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("N");
        }
        for tag in self.iter() {
            write!(f, "{}", tag.letter())?;
        }
        Ok(())
    }
}

/// A packed floating-point number in memory order, two to five words.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackedFloat {
    precision: FloatPrecision,
    words: [u16; 5],
}

impl PackedFloat {
    /// Words beyond the precision's width are ignored.
    pub fn new(precision: FloatPrecision, words: &[u16]) -> Self {
        let mut packed = [0; 5];
        let n = precision.words().min(words.len());
        packed[..n].copy_from_slice(&words[..n]);
        Self {
            precision,
            words: packed,
        }
    }

    pub fn precision(&self) -> FloatPrecision {
        self.precision
    }

    pub fn words(&self) -> &[u16] {
        &self.words[..self.precision.words()]
    }
}

impl fmt::Debug for PackedFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[", self.precision)?;
        for (i, word) in self.words().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:06o}", word)?;
        }
        f.write_str("]")
    }
}

/// One operand, its shape fixed by the tag that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandValue {
    Word(u16),
    /// High word first in memory.
    DoubleWord(u32),
    Float(PackedFloat),
}

impl OperandValue {
    pub fn precision(&self) -> Precision {
        match self {
            OperandValue::Word(_) => Precision::Int,
            OperandValue::DoubleWord(_) => Precision::DoubleInt,
            OperandValue::Float(fp) => Precision::Float(fp.precision()),
        }
    }

    pub fn word(&self) -> Result<u16, InternalError> {
        match *self {
            OperandValue::Word(word) => Ok(word),
            _ => Err(self.mismatch(Precision::Int)),
        }
    }

    pub fn dword(&self) -> Result<u32, InternalError> {
        match *self {
            OperandValue::DoubleWord(value) => Ok(value),
            _ => Err(self.mismatch(Precision::DoubleInt)),
        }
    }

    pub fn float(&self) -> Result<&PackedFloat, InternalError> {
        match self {
            OperandValue::Float(fp) => Ok(fp),
            _ => Err(self.mismatch(Precision::Float(FloatPrecision::Real))),
        }
    }

    fn mismatch(&self, expected: Precision) -> InternalError {
        InternalError::PrecisionMismatch {
            expected,
            found: self.precision(),
        }
    }
}

/// Operands of one instruction, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperandArray {
    values: Vec<OperandValue>,
}

impl OperandArray {
    fn new() -> Self {
        Self {
            values: Vec::with_capacity(MAX_OPERANDS),
        }
    }

    fn push(&mut self, value: OperandValue) {
        debug_assert!(self.values.len() < MAX_OPERANDS);
        self.values.push(value);
    }
}

impl Deref for OperandArray {
    type Target = [OperandValue];

    fn deref(&self) -> &[OperandValue] {
        &self.values
    }
}

/// Outcome of a step that may have to give way to a pending interrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Ready(T),
    /// Retry the whole instruction after the interrupt is serviced.
    Deferred,
}

impl<M: MemoryAccess> Machine<M> {
    /// Read a multiple-precision operand starting at `address`.
    pub fn read_operand(&self, address: u16, precision: Precision) -> OperandValue {
        match precision {
            Precision::Int => OperandValue::Word(self.mem.read_word(address)),
            Precision::DoubleInt => {
                let high = self.mem.read_word(address);
                let low = self.mem.read_word(address_add(address, 1));
                OperandValue::DoubleWord((high as u32) << 16 | low as u32)
            }
            Precision::Float(fp) => {
                let mut words = [0; 5];
                let mut va = address;
                for word in words.iter_mut().take(fp.words()) {
                    *word = self.mem.read_word(va);
                    va = address_add(va, 1);
                }
                OperandValue::Float(PackedFloat::new(fp, &words))
            }
        }
    }

    /// Write a multiple-precision operand starting at `address`, high-order
    /// word first.
    pub fn store_operand(
        &mut self,
        address: u16,
        value: &OperandValue,
        precision: Precision,
    ) -> Result<(), InternalError> {
        if value.precision() != precision {
            return Err(InternalError::PrecisionMismatch {
                expected: precision,
                found: value.precision(),
            });
        }
        match value {
            OperandValue::Word(word) => self.mem.write_word(address, *word),
            OperandValue::DoubleWord(dword) => {
                let (high, low) = split(*dword);
                self.mem.write_word(address, high);
                self.mem.write_word(address_add(address, 1), low);
            }
            OperandValue::Float(fp) => {
                let mut va = address;
                for &word in fp.words() {
                    self.mem.write_word(va, word);
                    va = address_add(va, 1);
                }
            }
        }
        Ok(())
    }

    /// Follow an address word through its indirect chain.
    ///
    /// With an interrupt pending, only `INDIRECT_BUDGET` levels are followed
    /// before giving way. Without one, the chain is followed up to the
    /// configured indirect limit, beyond which the machine stops.
    pub fn resolve(&self, address_word: u16, intrq: bool) -> Result<Resolution<u16>, CpuError> {
        let mut address = address_word;
        let mut budget = INDIRECT_BUDGET;
        let mut levels = 0;

        while address & INDIRECT != 0 {
            if intrq && budget == 0 {
                return Ok(Resolution::Deferred);
            }
            if levels >= self.options.indirect_limit {
                return Err(CpuError::IndirectLoop {
                    address: address & VAMASK,
                });
            }
            budget = budget.saturating_sub(1);
            levels += 1;
            address = self.mem.read_word(address & VAMASK);
        }
        Ok(Resolution::Ready(address & VAMASK))
    }

    /// Fetch the operands described by `pattern`.
    ///
    /// P advances past every inline operand consumed. On deferral, P is
    /// returned to its value on entry and nothing else has changed.
    pub fn resolve_operands(
        &mut self,
        pattern: OperandPattern,
        intrq: bool,
    ) -> Result<Resolution<OperandArray>, CpuError> {
        let entry_p = self.regs.p;
        let mut operands = OperandArray::new();

        for tag in pattern.iter() {
            let address = if tag.is_address() {
                match self.resolve(self.mem.read_word(self.regs.p), intrq)? {
                    Resolution::Ready(address) => address,
                    Resolution::Deferred => {
                        event!(
                            Level::DEBUG,
                            "operand {} of {} deferred at P={:05o} for pending interrupt",
                            operands.len() + 1,
                            pattern,
                            self.regs.p
                        );
                        self.regs.p = entry_p;
                        return Ok(Resolution::Deferred);
                    }
                }
            } else {
                0
            };

            let value = match tag {
                OperandTag::None => break,
                OperandTag::IntInAcc => OperandValue::Word(self.regs.a),
                OperandTag::DoubleIntInAcc => OperandValue::DoubleWord(self.regs.ab()),
                OperandTag::FloatInAcc => OperandValue::Float(PackedFloat::new(
                    FloatPrecision::Real,
                    &[self.regs.a, self.regs.b],
                )),
                OperandTag::InlineConstant => self.read_operand(self.regs.p, Precision::Int),
                OperandTag::InlineVariable => OperandValue::Word(self.regs.p),
                OperandTag::InlineAddress => OperandValue::Word(address),
                OperandTag::AddressOfInt => self.read_operand(address, Precision::Int),
                OperandTag::AddressOfDoubleInt => self.read_operand(address, Precision::DoubleInt),
                OperandTag::AddressOfFloat(fp) => self.read_operand(address, Precision::Float(fp)),
            };
            event!(Level::TRACE, "operand {:?} -> {:?}", tag, value);
            operands.push(value);

            if tag.is_inline() {
                self.regs.advance_pc();
            }
        }
        Ok(Resolution::Ready(operands))
    }
}
