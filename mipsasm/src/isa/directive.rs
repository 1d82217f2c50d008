//! Assembler directives.
use std::fmt::{self, Display, Formatter};

/// A directive recognized by the assembler.
///
/// Directives marked as allowing continuation may spread their operands over
/// several lines; any line starting with an integer, real, character or
/// string literal continues the previous directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Directive {
    Data,
    Text,
    KData,
    KText,
    Byte,
    Half,
    Word,
    Float,
    Double,
    Ascii,
    Asciiz,
    Globl,
    Space,
    Align,
    Extern,
    Eqv,
    Macro,
    EndMacro,
    Include,
    Set,
}

impl Directive {
    #[rustfmt::skip]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            ".data"      => Some(Self::Data),
            ".text"      => Some(Self::Text),
            ".kdata"     => Some(Self::KData),
            ".ktext"     => Some(Self::KText),
            ".byte"      => Some(Self::Byte),
            ".half"      => Some(Self::Half),
            ".word"      => Some(Self::Word),
            ".float"     => Some(Self::Float),
            ".double"    => Some(Self::Double),
            ".ascii"     => Some(Self::Ascii),
            ".asciiz"    => Some(Self::Asciiz),
            ".globl"     => Some(Self::Globl),
            ".space"     => Some(Self::Space),
            ".align"     => Some(Self::Align),
            ".extern"    => Some(Self::Extern),
            ".eqv"       => Some(Self::Eqv),
            ".macro"     => Some(Self::Macro),
            ".end_macro" => Some(Self::EndMacro),
            ".include"   => Some(Self::Include),
            ".set"       => Some(Self::Set),
            _            => None,
        }
    }

    #[rustfmt::skip]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data     => ".data",
            Self::Text     => ".text",
            Self::KData    => ".kdata",
            Self::KText    => ".ktext",
            Self::Byte     => ".byte",
            Self::Half     => ".half",
            Self::Word     => ".word",
            Self::Float    => ".float",
            Self::Double   => ".double",
            Self::Ascii    => ".ascii",
            Self::Asciiz   => ".asciiz",
            Self::Globl    => ".globl",
            Self::Space    => ".space",
            Self::Align    => ".align",
            Self::Extern   => ".extern",
            Self::Eqv      => ".eqv",
            Self::Macro    => ".macro",
            Self::EndMacro => ".end_macro",
            Self::Include  => ".include",
            Self::Set      => ".set",
        }
    }

    /// Whether operands for this directive may continue onto following lines.
    pub fn allows_continuation(&self) -> bool {
        matches!(
            self,
            Self::Byte
                | Self::Half
                | Self::Word
                | Self::Float
                | Self::Double
                | Self::Ascii
                | Self::Asciiz
                | Self::Globl
        )
    }
}

impl Display for Directive {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for name in [".data", ".word", ".end_macro", ".asciiz"] {
            let directive = Directive::from_name(name).unwrap();
            assert_eq!(directive.name(), name);
        }
        assert_eq!(Directive::from_name(".unknown"), None);
        assert_eq!(Directive::from_name("data"), None);
    }

    #[test]
    fn test_continuation() {
        assert!(Directive::Word.allows_continuation());
        assert!(Directive::Asciiz.allows_continuation());
        assert!(Directive::Globl.allows_continuation());
        assert!(!Directive::Data.allows_continuation());
        assert!(!Directive::Space.allows_continuation());
        assert!(!Directive::Macro.allows_continuation());
    }
}
