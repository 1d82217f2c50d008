//! Tokens and tokenized source lines.
use std::fmt::{self, Display, Formatter, Write};

use smol_str::SmolStr;

use crate::diag::SourceLocation;
use crate::isa::{Directive, Instruction};

use super::operand::{Operand, OperandType};

/// The classification of a single token, along with any value derived from
/// its literal text during scanning.
#[derive(Debug, Clone)]
pub enum TokenKind {
    /// A token the scanner could not make sense of. An error has already
    /// been logged by the time one of these is produced.
    Error,
    /// `,`
    Delimiter,
    /// `#` up to the end of the line.
    Comment,
    Directive(Directive),
    /// An instruction mnemonic, carrying every instruction variant sharing
    /// that mnemonic.
    Operator(Vec<Instruction>),
    /// A general purpose register given by number, e.g. `$9`.
    RegisterNumber(u8),
    /// A general purpose register given by name, e.g. `$t1`.
    RegisterName(u8),
    /// A floating point register, e.g. `$f12`.
    FpRegisterName(u8),
    Identifier,
    IntegerU3(i32),
    IntegerU5(i32),
    IntegerU15(i32),
    IntegerS16(i32),
    IntegerU16(i32),
    Integer32(i32),
    RealNumber(f64),
    /// A character literal, stored as its integer value.
    Character(i32),
    /// A string literal, stored with escapes applied.
    String(SmolStr),
    Plus,
    Minus,
    Colon,
    LeftParen,
    RightParen,
    /// `%name`, usable inside macro definitions.
    MacroParameter,
    /// `{...}` in an expansion template, carrying the tokenized content.
    TemplateSubstitution(Vec<Token>),
}

impl TokenKind {
    /// Classify an integer literal by the narrowest type holding its value.
    /// Matching later widens as needed, so `5` can serve as a shift amount
    /// or a 32-bit immediate alike.
    pub fn from_integer(value: i32) -> TokenKind {
        if (0..8).contains(&value) {
            TokenKind::IntegerU3(value)
        } else if (0..32).contains(&value) {
            TokenKind::IntegerU5(value)
        } else if (0..32768).contains(&value) {
            TokenKind::IntegerU15(value)
        } else if (-32768..32768).contains(&value) {
            TokenKind::IntegerS16(value)
        } else if (0..65536).contains(&value) {
            TokenKind::IntegerU16(value)
        } else {
            TokenKind::Integer32(value)
        }
    }

    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TokenKind::IntegerU3(_)
                | TokenKind::IntegerU5(_)
                | TokenKind::IntegerU15(_)
                | TokenKind::IntegerS16(_)
                | TokenKind::IntegerU16(_)
                | TokenKind::Integer32(_)
        )
    }

    /// The value of an integer token, if this is one.
    pub fn integer_value(&self) -> Option<i32> {
        match self {
            TokenKind::IntegerU3(value)
            | TokenKind::IntegerU5(value)
            | TokenKind::IntegerU15(value)
            | TokenKind::IntegerS16(value)
            | TokenKind::IntegerU16(value)
            | TokenKind::Integer32(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether a line starting with this token continues the operand list of
    /// a preceding directive such as `.word`.
    pub fn is_directive_continuation(&self) -> bool {
        self.is_integer()
            || matches!(
                self,
                TokenKind::RealNumber(_) | TokenKind::Character(_) | TokenKind::String(_)
            )
    }
}

/// A token scanned from a source line.
///
/// When a token is produced by substitution (an `.eqv` equivalence or a
/// macro expansion), `original` refers to the token it was copied from,
/// forming a chain back to where the text was actually written.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: SmolStr,
    pub location: SourceLocation,
    pub original: Option<Box<Token>>,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<SmolStr>, location: SourceLocation) -> Self {
        Self {
            kind,
            literal: literal.into(),
            location,
            original: None,
        }
    }

    /// A copy of this token placed at `location`, remembering this token as
    /// its origin. Used when pasting tokens during substitution.
    pub fn cloned_to(&self, location: SourceLocation) -> Token {
        Token {
            kind: self.kind.clone(),
            literal: self.literal.clone(),
            location,
            original: Some(Box::new(self.clone())),
        }
    }

    /// Interpret this token as an instruction operand, if possible.
    pub fn as_operand(&self) -> Option<Operand> {
        match &self.kind {
            TokenKind::Character(value) => {
                let kind = match TokenKind::from_integer(*value) {
                    TokenKind::IntegerU3(_) => OperandType::U3,
                    TokenKind::IntegerU5(_) => OperandType::U5,
                    TokenKind::IntegerU15(_) => OperandType::U15,
                    TokenKind::IntegerS16(_) => OperandType::S16,
                    TokenKind::IntegerU16(_) => OperandType::U16,
                    _ => OperandType::I32,
                };
                Some(Operand::new(kind, *value))
            }
            TokenKind::RegisterNumber(number) | TokenKind::RegisterName(number) => {
                Some(Operand::new(OperandType::Gpr, *number as i32))
            }
            TokenKind::FpRegisterName(number) => Some(Operand::new(OperandType::Fpr, *number as i32)),
            TokenKind::IntegerU3(value) => Some(Operand::new(OperandType::U3, *value)),
            TokenKind::IntegerU5(value) => Some(Operand::new(OperandType::U5, *value)),
            TokenKind::IntegerU15(value) => Some(Operand::new(OperandType::U15, *value)),
            TokenKind::IntegerS16(value) => Some(Operand::new(OperandType::S16, *value)),
            TokenKind::IntegerU16(value) => Some(Operand::new(OperandType::U16, *value)),
            TokenKind::Integer32(value) => Some(Operand::new(OperandType::I32, *value)),
            _ => None,
        }
    }

    /// Whether this token could be a SPIM-style macro parameter, which is an
    /// ordinary identifier starting with `$` rather than a `%name` parameter.
    pub fn is_spim_style_parameter(&self) -> bool {
        matches!(self.kind, TokenKind::Identifier)
            && self.literal.len() > 1
            && self.literal.starts_with('$')
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

/// A tokenized line of source.
///
/// Lines produced by macro expansion carry the definition line they were
/// copied from in `original`, while `location` points at the call site.
#[derive(Debug, Clone)]
pub struct SourceLine {
    pub location: SourceLocation,
    pub content: String,
    pub tokens: Vec<Token>,
    pub original: Option<Box<SourceLine>>,
}

impl SourceLine {
    pub fn new(location: SourceLocation, content: impl Into<String>, tokens: Vec<Token>) -> Self {
        Self {
            location,
            content: content.into(),
            tokens,
            original: None,
        }
    }

    /// Human readable location including the chain of lines this one was
    /// expanded from, e.g. `program.asm, line 14 → 3`.
    pub fn location_trace(&self) -> String {
        let mut output = String::new();
        if let Some(filename) = &self.location.filename {
            output.push_str(filename);
        }
        if let Some(line_index) = self.location.line_index {
            if !output.is_empty() {
                output.push_str(", ");
            }
            let _ = write!(output, "line {}", line_index + 1);
        }
        let mut original = self.original.as_deref();
        while let Some(line) = original {
            if let Some(line_index) = line.location.line_index {
                let _ = write!(output, " → {}", line_index + 1);
            }
            original = line.original.as_deref();
        }
        output
    }
}

/// A fully tokenized source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: SmolStr,
    pub lines: Vec<SourceLine>,
}

impl SourceFile {
    pub fn new(name: impl Into<SmolStr>, lines: Vec<SourceLine>) -> Self {
        Self {
            name: name.into(),
            lines,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_integer_narrowing() {
        assert!(matches!(TokenKind::from_integer(0), TokenKind::IntegerU3(0)));
        assert!(matches!(TokenKind::from_integer(7), TokenKind::IntegerU3(7)));
        assert!(matches!(TokenKind::from_integer(8), TokenKind::IntegerU5(8)));
        assert!(matches!(TokenKind::from_integer(31), TokenKind::IntegerU5(31)));
        assert!(matches!(TokenKind::from_integer(32), TokenKind::IntegerU15(32)));
        assert!(matches!(TokenKind::from_integer(32767), TokenKind::IntegerU15(32767)));
        assert!(matches!(TokenKind::from_integer(-1), TokenKind::IntegerS16(-1)));
        assert!(matches!(TokenKind::from_integer(-32768), TokenKind::IntegerS16(-32768)));
        assert!(matches!(TokenKind::from_integer(32768), TokenKind::IntegerU16(32768)));
        assert!(matches!(TokenKind::from_integer(65535), TokenKind::IntegerU16(65535)));
        assert!(matches!(TokenKind::from_integer(65536), TokenKind::Integer32(65536)));
        assert!(matches!(TokenKind::from_integer(-32769), TokenKind::Integer32(-32769)));
    }

    #[test]
    fn test_character_operand_narrows() {
        let token = Token::new(
            TokenKind::Character('A' as i32),
            "'A'",
            SourceLocation::column("test.asm", 0, 0),
        );
        let operand = token.as_operand().unwrap();
        assert_eq!(operand.kind, OperandType::U15);
        assert_eq!(operand.value, 65);
    }

    #[test]
    fn test_spim_style_parameter() {
        let location = SourceLocation::column("test.asm", 0, 0);
        let param = Token::new(TokenKind::Identifier, "$arg", location.clone());
        assert!(param.is_spim_style_parameter());

        let plain = Token::new(TokenKind::Identifier, "arg", location.clone());
        assert!(!plain.is_spim_style_parameter());

        let lone = Token::new(TokenKind::Identifier, "$", location);
        assert!(!lone.is_spim_style_parameter());
    }

    #[test]
    fn test_location_trace() {
        let mut definition = SourceLine::new(SourceLocation::line("macros.asm", 2), "add $t0, $t0, $t1", vec![]);
        definition.original = None;
        let mut instance = SourceLine::new(SourceLocation::line("macros.asm", 13), "add $t0, $t0, $t1", vec![]);
        instance.original = Some(Box::new(definition));
        assert_eq!(instance.location_trace(), "macros.asm, line 14 → 3");
    }
}
