//! Lexical analysis.
//!
//! Source is scanned one line at a time. Every produced token is routed
//! through the preprocessor so `.eqv` equivalences are substituted as the
//! line is scanned, and every completed line is handed to the preprocessor
//! so macros and `.include` are expanded before parsing ever sees them.
use std::path::Path;

use smol_str::SmolStr;

use crate::diag::{AssemblerLog, SourceLocation};
use crate::isa::{Directive, InstructionSet};

use super::preprocess::Preprocessor;
use super::tokens::{SourceFile, SourceLine, Token, TokenKind};

/// Tokenize the file at `path`, expanding preprocessor constructs with the
/// given preprocessor. If the file cannot be read, an error is logged and
/// the returned file has no lines.
pub fn tokenize_file(
    path: &Path,
    preprocessor: &mut Preprocessor,
    isa: &InstructionSet,
    log: &mut AssemblerLog,
) -> SourceFile {
    let filename = SmolStr::new(path.to_string_lossy());
    match std::fs::read_to_string(path) {
        Ok(source) => tokenize(filename, &source, preprocessor, isa, log),
        Err(_) => {
            log.log_error(
                SourceLocation::file(filename.clone()),
                format!("Unable to read file: {}", filename),
            );
            SourceFile::new(filename, Vec::new())
        }
    }
}

/// Tokenize in-memory source, expanding preprocessor constructs with the
/// given preprocessor.
pub fn tokenize(
    filename: impl Into<SmolStr>,
    source: &str,
    preprocessor: &mut Preprocessor,
    isa: &InstructionSet,
    log: &mut AssemblerLog,
) -> SourceFile {
    let filename = filename.into();
    let mut lines = Vec::new();
    for (line_index, content) in source.lines().enumerate() {
        let line = tokenize_line(&filename, line_index, content, preprocessor, isa, log);
        preprocessor.process_line(&mut lines, line, isa, log);
        if log.has_exceeded_max_error_count() {
            break;
        }
    }
    SourceFile::new(filename, lines)
}

/// Tokenize a single line of source.
pub fn tokenize_line(
    filename: &SmolStr,
    line_index: usize,
    content: &str,
    preprocessor: &Preprocessor,
    isa: &InstructionSet,
    log: &mut AssemblerLog,
) -> SourceLine {
    scan_line(filename, line_index, content, false, Some(preprocessor), isa, log)
}

/// Tokenize a line of an expansion template. Template lines allow `{...}`
/// substitution syntax, forbid directives, and see no preprocessor.
pub fn tokenize_template_line(
    filename: &SmolStr,
    line_index: usize,
    content: &str,
    isa: &InstructionSet,
    log: &mut AssemblerLog,
) -> SourceLine {
    scan_line(filename, line_index, content, true, None, isa, log)
}

fn scan_line(
    filename: &SmolStr,
    line_index: usize,
    content: &str,
    template_mode: bool,
    preprocessor: Option<&Preprocessor>,
    isa: &InstructionSet,
    log: &mut AssemblerLog,
) -> SourceLine {
    let mut scanner = LineScanner {
        filename,
        line_index,
        chars: content.chars().collect(),
        index: 0,
        template_mode,
        preprocessor,
        isa,
        tokens: Vec::new(),
    };
    scanner.scan(log);
    SourceLine::new(
        SourceLocation::line(filename.clone(), line_index),
        content,
        scanner.tokens,
    )
}

struct LineScanner<'a> {
    filename: &'a SmolStr,
    line_index: usize,
    chars: Vec<char>,
    /// Index of the next character to examine.
    index: usize,
    template_mode: bool,
    preprocessor: Option<&'a Preprocessor>,
    isa: &'a InstructionSet,
    tokens: Vec<Token>,
}

impl<'a> LineScanner<'a> {
    fn location(&self, column: usize) -> SourceLocation {
        SourceLocation::column(self.filename.clone(), self.line_index, column)
    }

    fn literal_from(&self, start: usize) -> SmolStr {
        self.chars[start..self.index].iter().collect::<String>().into()
    }

    /// Append a token, giving the preprocessor a chance to substitute it.
    fn emit(&mut self, token: Token) {
        match self.preprocessor {
            Some(preprocessor) => preprocessor.process_token(&mut self.tokens, token),
            None => self.tokens.push(token),
        }
    }

    fn last_token_is_identifier(&self) -> bool {
        matches!(
            self.tokens.last(),
            Some(token) if matches!(token.kind, TokenKind::Identifier)
        )
    }

    fn scan(&mut self, log: &mut AssemblerLog) {
        while self.index < self.chars.len() {
            let start = self.index;
            match self.chars[self.index] {
                ' ' | '\t' | '\r' => {
                    self.index += 1;
                }
                ',' => {
                    self.index += 1;
                    self.emit(Token::new(TokenKind::Delimiter, ",", self.location(start)));
                }
                '#' => {
                    // The rest of the line is one comment token.
                    self.index = self.chars.len();
                    self.emit(Token::new(
                        TokenKind::Comment,
                        self.literal_from(start),
                        self.location(start),
                    ));
                }
                ':' => {
                    self.index += 1;
                    self.emit(Token::new(TokenKind::Colon, ":", self.location(start)));
                }
                '(' => {
                    self.index += 1;
                    self.emit(Token::new(TokenKind::LeftParen, "(", self.location(start)));
                }
                ')' => {
                    self.index += 1;
                    self.emit(Token::new(TokenKind::RightParen, ")", self.location(start)));
                }
                '\'' => self.scan_char_literal(log),
                '"' => self.scan_string_literal(log),
                '{' if self.template_mode => self.scan_substitution(log),
                '+' if self.last_token_is_identifier() => {
                    self.index += 1;
                    self.emit(Token::new(TokenKind::Plus, "+", self.location(start)));
                }
                '-' if self.last_token_is_identifier() => {
                    self.index += 1;
                    self.emit(Token::new(TokenKind::Minus, "-", self.location(start)));
                }
                c if is_word_start(c) => self.scan_word(log),
                c => {
                    self.index += 1;
                    log.log_error(
                        self.location(start),
                        format!("Unexpected character: {} (0x{:02X})", c, c as u32),
                    );
                    self.emit(Token::new(
                        TokenKind::Error,
                        self.literal_from(start),
                        self.location(start),
                    ));
                }
            }
        }
    }

    /// Scan a word: an identifier, number, register, directive, mnemonic or
    /// macro parameter. The continuation set is narrower than the start set,
    /// and a sign is only absorbed into a number after an exponent marker.
    fn scan_word(&mut self, log: &mut AssemblerLog) {
        let start = self.index;
        let first = self.chars[self.index];
        let is_number = first.is_ascii_digit()
            || (matches!(first, '.' | '+' | '-')
                && matches!(self.chars.get(self.index + 1), Some(c) if c.is_ascii_digit()));

        self.index += 1;
        while self.index < self.chars.len() {
            let c = self.chars[self.index];
            if c.is_alphanumeric() || matches!(c, '_' | '.' | '$') {
                self.index += 1;
            } else if matches!(c, '+' | '-')
                && is_number
                && matches!(self.chars[self.index - 1], 'e' | 'E')
            {
                self.index += 1;
            } else {
                break;
            }
        }

        let literal = self.literal_from(start);
        self.classify_word(literal, start, is_number, log);
    }

    fn classify_word(&mut self, literal: SmolStr, start: usize, is_number: bool, log: &mut AssemblerLog) {
        use crate::isa::registers;

        let location = self.location(start);

        if literal.starts_with('%') {
            if literal.len() == 1 {
                log.log_error(location.clone(), "'%' is not a valid macro parameter name");
                self.emit(Token::new(TokenKind::Error, literal, location));
            } else {
                self.emit(Token::new(TokenKind::MacroParameter, literal, location));
            }
            return;
        }
        if let Some(number) = registers::gpr_number(&literal) {
            self.emit(Token::new(TokenKind::RegisterNumber(number), literal, location));
            return;
        }
        if let Some(number) = registers::gpr_name_number(&literal) {
            self.emit(Token::new(TokenKind::RegisterName(number), literal, location));
            return;
        }
        if let Some(number) = registers::fp_register_number(&literal) {
            self.emit(Token::new(TokenKind::FpRegisterName(number), literal, location));
            return;
        }
        if let Some(value) = decode_integer(&literal) {
            self.emit(Token::new(TokenKind::from_integer(value), literal, location));
            return;
        }
        if let Some(value) = parse_real(&literal) {
            self.emit(Token::new(TokenKind::RealNumber(value), literal, location));
            return;
        }
        if literal.starts_with('.') {
            if let Some(directive) = Directive::from_name(&literal) {
                if self.template_mode {
                    log.log_error(
                        location,
                        format!(
                            "Directives such as '{}' are not allowed in expansion templates",
                            directive
                        ),
                    );
                } else {
                    self.emit(Token::new(TokenKind::Directive(directive), literal, location));
                }
                return;
            }
        }
        if let Some(candidates) = self.isa.match_mnemonic(&literal) {
            self.emit(Token::new(
                TokenKind::Operator(candidates.to_vec()),
                literal,
                location,
            ));
            return;
        }
        if is_valid_identifier(&literal) {
            self.emit(Token::new(TokenKind::Identifier, literal, location));
            return;
        }

        let message = if is_number {
            format!("Invalid number: {}", literal)
        } else {
            format!("Invalid language element: {}", literal)
        };
        log.log_error(location.clone(), message);
        self.emit(Token::new(TokenKind::Error, literal, location));
    }

    fn scan_char_literal(&mut self, log: &mut AssemblerLog) {
        let start = self.index;
        self.index += 1;

        if self.chars.get(self.index) == Some(&'\'') {
            self.index += 1;
            log.log_error(self.location(start), "Empty character literal");
            return;
        }

        let mut value = String::new();
        match self.chars.get(self.index) {
            None => {
                log.log_error(self.location(start), "Unclosed character literal");
                return;
            }
            Some('\\') => self.handle_char_escape(&mut value, log),
            Some(&c) => {
                value.push(c);
                self.index += 1;
            }
        }

        match self.chars.get(self.index) {
            Some('\'') => {
                self.index += 1;
                self.emit_char_token(start, &value);
            }
            Some(_) => {
                // Consume up to the closing quote to recover, but the literal
                // is only valid with a single character.
                let mut closed = false;
                while let Some(&c) = self.chars.get(self.index) {
                    if c == '\'' {
                        self.index += 1;
                        closed = true;
                        break;
                    } else if c == '\\' {
                        self.handle_char_escape(&mut value, log);
                    } else {
                        value.push(c);
                        self.index += 1;
                    }
                }
                if closed {
                    log.log_error(self.location(start), "Too many characters in character literal");
                    self.emit_char_token(start, &value);
                } else {
                    log.log_error(self.location(start), "Unclosed character literal");
                    if !value.is_empty() {
                        self.emit_char_token(start, &value);
                    }
                }
            }
            None => {
                log.log_error(self.location(start), "Unclosed character literal");
                if !value.is_empty() {
                    self.emit_char_token(start, &value);
                }
            }
        }
    }

    /// Emit a character token holding the first scanned character.
    fn emit_char_token(&mut self, start: usize, value: &str) {
        if let Some(c) = value.chars().next() {
            self.emit(Token::new(
                TokenKind::Character(c as i32),
                self.literal_from(start),
                self.location(start),
            ));
        }
    }

    fn scan_string_literal(&mut self, log: &mut AssemblerLog) {
        let start = self.index;
        self.index += 1;

        let mut value = String::new();
        let mut closed = false;
        while let Some(&c) = self.chars.get(self.index) {
            match c {
                '"' => {
                    self.index += 1;
                    closed = true;
                    break;
                }
                '\\' => self.handle_char_escape(&mut value, log),
                _ => {
                    value.push(c);
                    self.index += 1;
                }
            }
        }
        if !closed {
            log.log_error(self.location(start), "Unclosed string literal");
        }

        self.emit(Token::new(
            TokenKind::String(value.into()),
            self.literal_from(start),
            self.location(start),
        ));
    }

    /// Append the character encoded by an escape sequence to `value`,
    /// consuming the sequence. `self.index` points at the backslash.
    fn handle_char_escape(&mut self, value: &mut String, log: &mut AssemblerLog) {
        let start = self.index;
        let Some(&c) = self.chars.get(self.index + 1) else {
            // A lone backslash at the end of the line encodes nothing.
            self.index += 1;
            return;
        };

        match c {
            'n' => {
                value.push('\n');
                self.index += 2;
            }
            't' => {
                value.push('\t');
                self.index += 2;
            }
            'r' => {
                value.push('\r');
                self.index += 2;
            }
            'b' => {
                value.push('\u{0008}');
                self.index += 2;
            }
            'f' => {
                value.push('\u{000C}');
                self.index += 2;
            }
            '\\' | '\'' | '"' => {
                value.push(c);
                self.index += 2;
            }
            'x' => {
                let mut char_value: u32 = 0;
                let mut digits = 0;
                while digits < 2 {
                    match self.chars.get(self.index + 2 + digits) {
                        Some(&d) if d.is_ascii_hexdigit() => {
                            char_value = (char_value << 4) | d.to_digit(16).unwrap_or(0);
                            digits += 1;
                        }
                        Some(&d) => {
                            log.log_error(
                                self.location(start),
                                format!("Expected two hexadecimal digits following \\x, got: {}", d),
                            );
                            break;
                        }
                        None => {
                            log.log_error(
                                self.location(start),
                                "Expected two hexadecimal digits following \\x, got: end of line",
                            );
                            break;
                        }
                    }
                }
                value.push(char::from(char_value as u8));
                self.index += 2 + digits;
            }
            d @ '0'..='7' => {
                let mut char_value = d.to_digit(8).unwrap_or(0);
                // Three octal digits only fit in a byte if the first is 0-3.
                let max_digits = if d >= '4' { 2 } else { 3 };
                let mut consumed = 1;
                while consumed < max_digits {
                    match self.chars.get(self.index + 1 + consumed) {
                        Some(&d) if ('0'..='7').contains(&d) => {
                            char_value = (char_value << 3) | d.to_digit(8).unwrap_or(0);
                            consumed += 1;
                        }
                        _ => break,
                    }
                }
                value.push(char::from(char_value as u8));
                self.index += 1 + consumed;
            }
            other => {
                log.log_error(
                    self.location(start),
                    format!("Unrecognized character escape: \\{}", other),
                );
                value.push(other);
                self.index += 2;
            }
        }
    }

    /// Scan `{...}` substitution syntax in an expansion template. The braces
    /// nest, and the content is tokenized recursively.
    fn scan_substitution(&mut self, log: &mut AssemblerLog) {
        let start = self.index;
        let mut nesting = 1;
        self.index += 1;
        while let Some(&c) = self.chars.get(self.index) {
            match c {
                '{' => nesting += 1,
                '}' => {
                    nesting -= 1;
                    if nesting == 0 {
                        break;
                    }
                }
                _ => {}
            }
            self.index += 1;
        }

        if nesting != 0 {
            log.log_error(
                self.location(start),
                "Unclosed substitution syntax in expansion template",
            );
            return;
        }

        let inner: String = self.chars[start + 1..self.index].iter().collect();
        self.index += 1;
        let content = scan_line(
            self.filename,
            self.line_index,
            &inner,
            true,
            None,
            self.isa,
            log,
        )
        .tokens;
        self.emit(Token::new(
            TokenKind::TemplateSubstitution(content),
            self.literal_from(start),
            self.location(start),
        ));
    }
}

fn is_word_start(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '+' | '-' | '_' | '.' | '$' | '%')
}

fn is_valid_identifier(literal: &str) -> bool {
    let mut chars = literal.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || matches!(c, '_' | '.' | '$') => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '$'))
}

/// Decode an integer literal: decimal, hexadecimal with `0x`, or octal with
/// a leading zero. Values which overflow a signed 32-bit integer are
/// reinterpreted from their unsigned bit pattern, so `0xFFFFFFFF` is -1.
pub fn decode_integer(literal: &str) -> Option<i32> {
    decode_signed(literal).or_else(|| decode_unsigned(literal))
}

fn decode_signed(literal: &str) -> Option<i32> {
    // The sign precedes the radix prefix: -0x10 is -16.
    let (negative, rest) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal.strip_prefix('+').unwrap_or(literal)),
    };
    let (radix, digits) = split_radix(rest);
    if digits.is_empty() || digits.starts_with('+') || digits.starts_with('-') {
        return None;
    }
    let value = i64::from_str_radix(digits, radix).ok()?;
    let value = if negative { -value } else { value };
    i32::try_from(value).ok()
}

fn split_radix(text: &str) -> (u32, &str) {
    if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (16, digits)
    } else if text.len() > 1 && text.starts_with('0') {
        (8, &text[1..])
    } else {
        (10, text)
    }
}

fn decode_unsigned(literal: &str) -> Option<i32> {
    let (radix, digits) = match literal.strip_prefix("0x").or_else(|| literal.strip_prefix("0X")) {
        Some(digits) => (16, digits),
        None => (10, literal),
    };
    if digits.is_empty() || digits.starts_with('+') || digits.starts_with('-') {
        return None;
    }
    u32::from_str_radix(digits, radix).ok().map(|value| value as i32)
}

/// Parse a real number literal. A trailing `f` or `d` width suffix is
/// accepted and ignored.
fn parse_real(literal: &str) -> Option<f64> {
    let text = literal
        .strip_suffix(['f', 'F', 'd', 'D'])
        .unwrap_or(literal);
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::isa::InstructionSet;

    fn scan(content: &str) -> (SourceLine, AssemblerLog) {
        let isa = InstructionSet::standard().expect("standard instruction set");
        let mut log = AssemblerLog::new();
        let preprocessor = Preprocessor::new();
        let filename = SmolStr::new("test.asm");
        let line = tokenize_line(&filename, 0, content, &preprocessor, &isa, &mut log);
        (line, log)
    }

    fn scan_template(content: &str) -> (SourceLine, AssemblerLog) {
        let isa = InstructionSet::standard().expect("standard instruction set");
        let mut log = AssemblerLog::new();
        let filename = SmolStr::new("template");
        let line = tokenize_template_line(&filename, 0, content, &isa, &mut log);
        (line, log)
    }

    #[test]
    fn test_punctuation_and_registers() {
        let (line, log) = scan("lw $t3, 8($t4) # comment");
        assert_eq!(log.message_count(), 0);

        let kinds: Vec<_> = line.tokens.iter().map(|t| &t.kind).collect();
        assert_eq!(kinds.len(), 8);
        assert!(matches!(kinds[0], TokenKind::Operator(_)));
        assert!(matches!(kinds[1], TokenKind::RegisterName(11)));
        assert!(matches!(kinds[2], TokenKind::Delimiter));
        assert!(matches!(kinds[3], TokenKind::IntegerU5(8)));
        assert!(matches!(kinds[4], TokenKind::LeftParen));
        assert!(matches!(kinds[5], TokenKind::RegisterName(12)));
        assert!(matches!(kinds[6], TokenKind::RightParen));
        assert!(matches!(kinds[7], TokenKind::Comment));
    }

    #[test]
    fn test_register_numbers() {
        let (line, log) = scan("add $8, $9, $31");
        assert_eq!(log.message_count(), 0);
        assert!(matches!(line.tokens[1].kind, TokenKind::RegisterNumber(8)));
        assert!(matches!(line.tokens[5].kind, TokenKind::RegisterNumber(31)));
        // $32 is out of range and lexes as an identifier instead.
        let (line, _) = scan("$32");
        assert!(matches!(line.tokens[0].kind, TokenKind::Identifier));
    }

    #[test]
    fn test_integer_literals() {
        let (line, log) = scan("7 31 0x10 -5 32767 65535 0xFFFFFFFF 2147483648 08");
        assert_eq!(log.message_count(), 0);
        assert!(matches!(line.tokens[0].kind, TokenKind::IntegerU3(7)));
        assert!(matches!(line.tokens[1].kind, TokenKind::IntegerU5(31)));
        assert!(matches!(line.tokens[2].kind, TokenKind::IntegerU5(16)));
        assert!(matches!(line.tokens[3].kind, TokenKind::IntegerS16(-5)));
        assert!(matches!(line.tokens[4].kind, TokenKind::IntegerU15(32767)));
        assert!(matches!(line.tokens[5].kind, TokenKind::IntegerU16(65535)));
        // Too large for i32, reinterpreted from the unsigned bit pattern.
        assert!(matches!(line.tokens[6].kind, TokenKind::IntegerS16(-1)));
        assert!(matches!(line.tokens[7].kind, TokenKind::Integer32(i32::MIN)));
        // Not valid octal, but valid decimal.
        assert!(matches!(line.tokens[8].kind, TokenKind::IntegerU5(8)));
    }

    #[test]
    fn test_octal_and_sign_prefix() {
        let (line, log) = scan("010 -0x10 +12");
        assert_eq!(log.message_count(), 0);
        assert!(matches!(line.tokens[0].kind, TokenKind::IntegerU5(8)));
        assert!(matches!(line.tokens[1].kind, TokenKind::IntegerS16(-16)));
        assert!(matches!(line.tokens[2].kind, TokenKind::IntegerU5(12)));
    }

    #[test]
    fn test_real_literals() {
        let (line, log) = scan("3.5 .5 1e5 -2.5e-3");
        assert_eq!(log.message_count(), 0);
        assert!(matches!(line.tokens[0].kind, TokenKind::RealNumber(v) if v == 3.5));
        assert!(matches!(line.tokens[1].kind, TokenKind::RealNumber(v) if v == 0.5));
        assert!(matches!(line.tokens[2].kind, TokenKind::RealNumber(v) if v == 1e5));
        assert!(matches!(line.tokens[3].kind, TokenKind::RealNumber(v) if v == -2.5e-3));
    }

    #[test]
    fn test_plus_after_identifier() {
        // After an identifier, a sign is its own token for label offsets.
        let (line, log) = scan("target+4");
        assert_eq!(log.message_count(), 0);
        assert!(matches!(line.tokens[0].kind, TokenKind::Identifier));
        assert!(matches!(line.tokens[1].kind, TokenKind::Plus));
        assert!(matches!(line.tokens[2].kind, TokenKind::IntegerU3(4)));

        // Anywhere else it starts a number.
        let (line, log) = scan("-4");
        assert_eq!(log.message_count(), 0);
        assert_eq!(line.tokens.len(), 1);
        assert!(matches!(line.tokens[0].kind, TokenKind::IntegerS16(-4)));
    }

    #[test]
    fn test_comment() {
        let (line, log) = scan("add $t0, $t0, $t1 # running total");
        assert_eq!(log.message_count(), 0);
        let last = line.tokens.last().unwrap();
        assert!(matches!(last.kind, TokenKind::Comment));
        assert_eq!(last.literal, "# running total");
    }

    #[test]
    fn test_char_literals() {
        let (line, log) = scan("'A' '\\n' '\\x41' '\\101'");
        assert_eq!(log.message_count(), 0);
        assert!(matches!(line.tokens[0].kind, TokenKind::Character(65)));
        assert!(matches!(line.tokens[1].kind, TokenKind::Character(10)));
        assert!(matches!(line.tokens[2].kind, TokenKind::Character(65)));
        assert!(matches!(line.tokens[3].kind, TokenKind::Character(65)));
    }

    #[test]
    fn test_char_literal_errors() {
        let (line, log) = scan("''");
        assert_eq!(log.message_count(), 1);
        assert!(line.tokens.is_empty());
        assert!(log.messages()[0].content().contains("Empty character literal"));

        let (line, log) = scan("'ab'");
        assert_eq!(log.message_count(), 1);
        assert!(log.messages()[0].content().contains("Too many characters"));
        // Still produces a token with the first character.
        assert!(matches!(line.tokens[0].kind, TokenKind::Character(97)));

        let (line, log) = scan("'a");
        assert_eq!(log.message_count(), 1);
        assert!(log.messages()[0].content().contains("Unclosed character literal"));
        assert!(matches!(line.tokens[0].kind, TokenKind::Character(97)));
    }

    #[test]
    fn test_string_literals() {
        let (line, log) = scan("\"hi\\tthere\\x21\"");
        assert_eq!(log.message_count(), 0);
        match &line.tokens[0].kind {
            TokenKind::String(value) => assert_eq!(value.as_str(), "hi\tthere!"),
            other => panic!("expected string, got {:?}", other),
        }

        let (line, log) = scan("\"unclosed");
        assert_eq!(log.message_count(), 1);
        assert!(log.messages()[0].content().contains("Unclosed string literal"));
        assert!(matches!(line.tokens[0].kind, TokenKind::String(_)));
    }

    #[test]
    fn test_bad_escape() {
        let (line, log) = scan("\"a\\qb\"");
        assert_eq!(log.message_count(), 1);
        assert!(log.messages()[0].content().contains("Unrecognized character escape"));
        // The escaped character is kept literally.
        match &line.tokens[0].kind {
            TokenKind::String(value) => assert_eq!(value.as_str(), "aqb"),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_directives_and_unknown_dot_words() {
        let (line, log) = scan(".data");
        assert_eq!(log.message_count(), 0);
        assert!(matches!(line.tokens[0].kind, TokenKind::Directive(Directive::Data)));

        // Unknown dot-words stay identifiers; the parser warns about them.
        let (line, log) = scan(".frobnicate");
        assert_eq!(log.message_count(), 0);
        assert!(matches!(line.tokens[0].kind, TokenKind::Identifier));
    }

    #[test]
    fn test_macro_parameters() {
        let (line, log) = scan("%count");
        assert_eq!(log.message_count(), 0);
        assert!(matches!(line.tokens[0].kind, TokenKind::MacroParameter));

        let (line, log) = scan("%");
        assert_eq!(log.message_count(), 1);
        assert!(log.messages()[0]
            .content()
            .contains("'%' is not a valid macro parameter name"));
        assert!(matches!(line.tokens[0].kind, TokenKind::Error));
    }

    #[test]
    fn test_unexpected_character() {
        let (line, log) = scan("`");
        assert_eq!(log.message_count(), 1);
        assert!(log.messages()[0].content().contains("Unexpected character: ` (0x60)"));
        assert!(matches!(line.tokens[0].kind, TokenKind::Error));
    }

    #[test]
    fn test_template_substitution() {
        let (line, log) = scan_template("addi {0}, {0}, {1 : l}");
        assert_eq!(log.message_count(), 0, "{:?}", log.messages());
        assert!(matches!(line.tokens[0].kind, TokenKind::Operator(_)));
        assert!(matches!(line.tokens[1].kind, TokenKind::TemplateSubstitution(_)));
        match &line.tokens[5].kind {
            TokenKind::TemplateSubstitution(content) => {
                assert!(matches!(content[0].kind, TokenKind::IntegerU3(1)));
                assert!(matches!(content[1].kind, TokenKind::Colon));
                assert!(matches!(content[2].kind, TokenKind::Identifier));
            }
            other => panic!("expected substitution, got {:?}", other),
        }
    }

    #[test]
    fn test_template_rejects_directives() {
        let (line, log) = scan_template(".word 5");
        assert_eq!(log.message_count(), 1);
        assert!(log.messages()[0]
            .content()
            .contains("not allowed in expansion templates"));
        // The directive itself produces no token.
        assert!(matches!(line.tokens[0].kind, TokenKind::IntegerU3(5)));
    }

    #[test]
    fn test_unclosed_substitution() {
        let (line, log) = scan_template("{0 : l");
        assert_eq!(log.message_count(), 1);
        assert!(log.messages()[0]
            .content()
            .contains("Unclosed substitution syntax"));
        assert!(line.tokens.is_empty());
    }

    #[test]
    fn test_braces_outside_templates() {
        let (_, log) = scan("{0}");
        assert!(log.message_count() > 0);
        assert!(log.messages()[0].content().contains("Unexpected character: {"));
    }

    #[test]
    fn test_decode_integer() {
        assert_eq!(decode_integer("0"), Some(0));
        assert_eq!(decode_integer("-1"), Some(-1));
        assert_eq!(decode_integer("0x7FFFFFFF"), Some(i32::MAX));
        assert_eq!(decode_integer("-2147483648"), Some(i32::MIN));
        assert_eq!(decode_integer("0xFFFFFFFF"), Some(-1));
        assert_eq!(decode_integer("2147483648"), Some(i32::MIN));
        assert_eq!(decode_integer("4294967295"), Some(-1));
        assert_eq!(decode_integer("4294967296"), None);
        assert_eq!(decode_integer("017"), Some(15));
        assert_eq!(decode_integer("08"), Some(8));
        assert_eq!(decode_integer("0x"), None);
        assert_eq!(decode_integer("--5"), None);
        assert_eq!(decode_integer("x10"), None);
    }
}
