//! Instruction operands and their types.
use std::fmt::{self, Display, Formatter};

/// The type of an instruction operand, as used for matching a parsed
/// statement against instruction signatures.
///
/// The integer types form a widening chain: a narrower integer is accepted
/// anywhere a wider one is expected, with the exception that `u16` does not
/// accept `s16` since a negative value has no unsigned equivalent of the
/// same width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
#[rustfmt::skip]
pub enum OperandType {
    U3,           // u3
    U5,           // u5
    U15,          // u15
    S16,          // s16
    U16,          // u16
    I16,          // i16
    I32,          // i32
    Gpr,          // gpr
    Fpr,          // fpr
    ParenGpr,     // (gpr)
    Label,        // label
    LabelOffset,  // label+
    BranchOffset, // broff
    JumpLabel,    // jlabel
}

impl OperandType {
    #[rustfmt::skip]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "u3"     => Some(Self::U3),
            "u5"     => Some(Self::U5),
            "u15"    => Some(Self::U15),
            "s16"    => Some(Self::S16),
            "u16"    => Some(Self::U16),
            "i16"    => Some(Self::I16),
            "i32"    => Some(Self::I32),
            "gpr"    => Some(Self::Gpr),
            "fpr"    => Some(Self::Fpr),
            "(gpr)"  => Some(Self::ParenGpr),
            "label"  => Some(Self::Label),
            "label+" => Some(Self::LabelOffset),
            "broff"  => Some(Self::BranchOffset),
            "jlabel" => Some(Self::JumpLabel),
            _        => None,
        }
    }

    #[rustfmt::skip]
    pub fn name(&self) -> &'static str {
        match self {
            Self::U3           => "u3",
            Self::U5           => "u5",
            Self::U15          => "u15",
            Self::S16          => "s16",
            Self::U16          => "u16",
            Self::I16          => "i16",
            Self::I32          => "i32",
            Self::Gpr          => "gpr",
            Self::Fpr          => "fpr",
            Self::ParenGpr     => "(gpr)",
            Self::Label        => "label",
            Self::LabelOffset  => "label+",
            Self::BranchOffset => "broff",
            Self::JumpLabel    => "jlabel",
        }
    }

    /// Number of bits the operand occupies in an encoded instruction.
    #[rustfmt::skip]
    pub fn bit_width(&self) -> u32 {
        match self {
            Self::U3           => 3,
            Self::U5           => 5,
            Self::U15          => 15,
            Self::S16          => 16,
            Self::U16          => 16,
            Self::I16          => 16,
            Self::I32          => 32,
            Self::Gpr          => 5,
            Self::Fpr          => 5,
            Self::ParenGpr     => 5,
            Self::Label        => 32,
            Self::LabelOffset  => 32,
            Self::BranchOffset => 16,
            Self::JumpLabel    => 26,
        }
    }

    /// Bitmask covering [`bit_width`](Self::bit_width) bits.
    pub fn mask(&self) -> u32 {
        // Computed in 64 bits since a 32-bit width would overflow the shift.
        ((1u64 << self.bit_width()) - 1) as u32
    }

    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::U3 | Self::U5 | Self::U15 | Self::S16 | Self::U16 | Self::I16 | Self::I32
        )
    }

    /// Whether an operand of type `from` can be used directly where this type
    /// is expected. This is the matching rule used when selecting an
    /// instruction variant for a parsed statement.
    pub fn accepts(&self, from: OperandType) -> bool {
        if *self == from {
            true
        } else if self.is_integer() && from.is_integer() {
            (*self as u8) > (from as u8) && !(*self == Self::U16 && from == Self::S16)
        } else if *self == Self::BranchOffset {
            from == Self::Label
                || from == Self::LabelOffset
                || (from.is_integer() && (from as u8) <= (Self::U16 as u8))
        } else if *self == Self::JumpLabel {
            from == Self::Label || from == Self::LabelOffset || from.is_integer()
        } else if *self == Self::LabelOffset {
            from == Self::Label
        } else {
            false
        }
    }

    /// A relaxed version of [`accepts`](Self::accepts) used when matching
    /// expansion template statements, where operand types are only known
    /// symbolically. Integer types match on width alone, and the label kinds
    /// are interchangeable.
    pub fn accepts_loosely(&self, from: OperandType) -> bool {
        if *self == from {
            true
        } else if self.is_integer() && from.is_integer() {
            self.bit_width() >= from.bit_width()
        } else if *self == Self::BranchOffset {
            from == Self::Label
                || from == Self::LabelOffset
                || (from.is_integer() && from.bit_width() <= 16)
        } else if *self == Self::JumpLabel {
            from == Self::Label || from == Self::LabelOffset || from.is_integer()
        } else if *self == Self::Label || *self == Self::LabelOffset {
            from == Self::Label || from == Self::LabelOffset
        } else if *self == Self::Gpr || *self == Self::ParenGpr {
            from == Self::Gpr || from == Self::ParenGpr
        } else {
            false
        }
    }

    /// The narrowest type which accepts both `a` and `b`, if one exists.
    /// Used to type an operand whose value depends on an assembler flag.
    pub fn union(a: OperandType, b: OperandType) -> Option<OperandType> {
        if a.accepts(b) {
            Some(a)
        } else if b.accepts(a) {
            Some(b)
        } else if (a == Self::S16 && b == Self::U16) || (a == Self::U16 && b == Self::S16) {
            Some(Self::I16)
        } else {
            None
        }
    }
}

impl Display for OperandType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fully resolved operand value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operand {
    pub kind: OperandType,
    pub value: i32,
}

impl Operand {
    pub fn new(kind: OperandType, value: i32) -> Self {
        Self { kind, value }
    }

    pub fn with_type(&self, kind: OperandType) -> Operand {
        Operand::new(kind, self.value)
    }

    /// Convert this operand for use in a slot of type `to` in a statement
    /// placed at `address`. A resolved label fed into a branch offset slot
    /// becomes the offset, in words, relative to the delay slot.
    pub fn convert_to_type(&self, to: OperandType, address: u32) -> Operand {
        let value = match (self.kind, to) {
            (OperandType::Label | OperandType::LabelOffset, OperandType::BranchOffset) => {
                (self.value.wrapping_sub(address as i32) >> 2).wrapping_sub(1)
            }
            _ => self.value,
        };
        Operand::new(to, value)
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind {
            OperandType::Gpr => write!(f, "${}", self.value),
            OperandType::ParenGpr => write!(f, "(${})", self.value),
            OperandType::Fpr => write!(f, "$f{}", self.value),
            OperandType::Label | OperandType::LabelOffset | OperandType::JumpLabel => {
                write!(f, "0x{:08x}", self.value)
            }
            _ => write!(f, "{}", self.value),
        }
    }
}
