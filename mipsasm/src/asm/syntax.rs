//! Syntax parsing.
//!
//! The parser walks preprocessed token lines and produces labels, directives
//! and instruction statements. Instruction mnemonics were already resolved
//! to candidate instructions by the lexer; the parser picks the overload
//! whose operand list matches what was written.
use std::rc::Rc;

use itertools::Itertools;

use crate::diag::AssemblerLog;
use crate::isa::{Directive, Instruction};

use super::operand::{Operand, OperandType};
use super::tokens::{SourceLine, Token, TokenKind};

/// One parsed element of the program.
#[derive(Debug, Clone)]
pub enum Syntax {
    Label(LabelSyntax),
    Directive(DirectiveSyntax),
    Statement(Rc<StatementSyntax>),
}

/// A label declaration: `name:`.
#[derive(Debug, Clone)]
pub struct LabelSyntax {
    pub token: Token,
}

/// A directive with its argument tokens, continuation lines included.
#[derive(Debug, Clone)]
pub struct DirectiveSyntax {
    pub directive: Directive,
    pub token: Token,
    pub content: Vec<Token>,
}

/// An instruction statement matched to one instruction overload.
#[derive(Debug, Clone)]
pub struct StatementSyntax {
    pub instruction: Instruction,
    pub token: Token,
    pub operands: Vec<SyntaxOperand>,
}

/// An instruction operand as written: either a concrete value or a label
/// reference to be resolved against the symbol table later.
#[derive(Debug, Clone)]
pub enum SyntaxOperand {
    Value(Operand),
    Label {
        token: Token,
        offset: i32,
        kind: OperandType,
    },
}

impl SyntaxOperand {
    pub fn operand_type(&self) -> OperandType {
        match self {
            SyntaxOperand::Value(operand) => operand.kind,
            SyntaxOperand::Label { kind, .. } => *kind,
        }
    }
}

/// Parses preprocessed lines into syntax elements. Delimiters and comments
/// are skipped; a one-token pushback cache supports the lookahead the
/// grammar needs.
pub struct SyntaxParser<'a> {
    lines: &'a [SourceLine],
    line_index: usize,
    token_index: usize,
    cached_token: Option<Token>,
}

impl<'a> SyntaxParser<'a> {
    pub fn new(lines: &'a [SourceLine]) -> Self {
        SyntaxParser {
            lines,
            line_index: 0,
            token_index: 0,
            cached_token: None,
        }
    }

    /// Parse every syntax element, logging recoverable errors as they are
    /// found. A malformed statement is dropped and parsing resumes on the
    /// next line.
    pub fn parse(mut self, log: &mut AssemblerLog) -> Vec<Syntax> {
        let mut elements = Vec::new();
        while let Some(token) = self.next_token() {
            if log.has_exceeded_max_error_count() {
                break;
            }
            if let Some(element) = self.parse_element(token, log) {
                elements.push(element);
            }
        }
        elements
    }

    fn parse_element(&mut self, token: Token, log: &mut AssemblerLog) -> Option<Syntax> {
        match &token.kind {
            TokenKind::Identifier => {
                if self.consume_colon() {
                    Some(Syntax::Label(LabelSyntax { token }))
                } else if token.literal.starts_with('.') {
                    log.log_warning(
                        token.location.clone(),
                        format!("Directive '{}' is not supported; ignored", token.literal),
                    );
                    self.skip_rest_of_line();
                    None
                } else {
                    log.log_error(
                        token.location.clone(),
                        format!(
                            "Mnemonic '{}' does not correspond to any known instruction",
                            token.literal
                        ),
                    );
                    self.skip_rest_of_line();
                    None
                }
            }
            TokenKind::Directive(directive) => {
                let directive = *directive;
                Some(self.parse_directive(directive, token))
            }
            TokenKind::Operator(_) => {
                if self.consume_colon() {
                    // A label is allowed to shadow a mnemonic.
                    Some(Syntax::Label(LabelSyntax {
                        token: morph_to_identifier(token),
                    }))
                } else {
                    self.parse_statement(token, log)
                }
            }
            _ => {
                log.log_error(
                    token.location.clone(),
                    format!("Unexpected token: {}", token.literal),
                );
                None
            }
        }
    }

    /// Collect the directive's arguments: the rest of the line, plus any
    /// following lines that begin with a continuation value.
    fn parse_directive(&mut self, directive: Directive, token: Token) -> Syntax {
        let mut content = Vec::new();
        while let Some(argument) = self.next_token_in_line() {
            content.push(argument);
        }
        if directive.allows_continuation() {
            while let Some(next) = self.next_token() {
                if next.kind.is_directive_continuation() {
                    content.push(next);
                    while let Some(argument) = self.next_token_in_line() {
                        content.push(argument);
                    }
                } else {
                    self.cached_token = Some(next);
                    break;
                }
            }
        }
        Syntax::Directive(DirectiveSyntax {
            directive,
            token,
            content,
        })
    }

    fn parse_statement(&mut self, token: Token, log: &mut AssemblerLog) -> Option<Syntax> {
        let mut operands = Vec::new();
        while self.cached_token.is_some() || self.has_more_tokens_in_line() {
            match self.parse_next_operand(log) {
                Some(operand) => operands.push(operand),
                None => {
                    // The statement is beyond saving. Drop the rest of it.
                    self.cached_token = None;
                    self.skip_rest_of_line();
                    return None;
                }
            }
        }

        let types: Vec<OperandType> = operands.iter().map(SyntaxOperand::operand_type).collect();
        let chosen = match &token.kind {
            TokenKind::Operator(candidates) => candidates
                .iter()
                .find(|candidate| candidate.accepts_operands(&types))
                .cloned(),
            _ => None,
        };
        match chosen {
            Some(instruction) => Some(Syntax::Statement(Rc::new(StatementSyntax {
                instruction,
                token,
                operands,
            }))),
            None => {
                log.log_error(
                    token.location.clone(),
                    format!(
                        "No instruction '{}' found matching operands [{}]",
                        token.literal,
                        types.iter().join(", ")
                    ),
                );
                None
            }
        }
    }

    fn parse_next_operand(&mut self, log: &mut AssemblerLog) -> Option<SyntaxOperand> {
        let token = self.next_token_in_line()?;

        if matches!(token.kind, TokenKind::LeftParen) {
            return self.parse_parenthesized(&token, log);
        }
        if let Some(operand) = token.as_operand() {
            return Some(SyntaxOperand::Value(operand));
        }

        // What remains must be a label reference. Mnemonics double as label
        // names here too.
        let token = if matches!(token.kind, TokenKind::Operator(_)) {
            morph_to_identifier(token)
        } else {
            token
        };
        if !matches!(token.kind, TokenKind::Identifier) {
            log.log_error(
                token.location.clone(),
                format!("Unexpected instruction operand: {}", token),
            );
            return None;
        }

        match self.next_token_in_line() {
            Some(sign) if matches!(sign.kind, TokenKind::Plus | TokenKind::Minus) => {
                let negative = matches!(sign.kind, TokenKind::Minus);
                match self.next_token_in_line() {
                    Some(offset_token) if offset_token.kind.is_integer() => {
                        let value = offset_token.kind.integer_value().unwrap_or(0);
                        let offset = if negative { value.wrapping_neg() } else { value };
                        Some(SyntaxOperand::Label {
                            token,
                            offset,
                            kind: OperandType::LabelOffset,
                        })
                    }
                    _ => {
                        log.log_error(
                            sign.location.clone(),
                            format!("Expected an integer offset following '{}'", sign.literal),
                        );
                        None
                    }
                }
            }
            Some(other) => {
                self.cached_token = Some(other);
                Some(SyntaxOperand::Label {
                    token,
                    offset: 0,
                    kind: OperandType::Label,
                })
            }
            None => Some(SyntaxOperand::Label {
                token,
                offset: 0,
                kind: OperandType::Label,
            }),
        }
    }

    fn parse_parenthesized(&mut self, open: &Token, log: &mut AssemblerLog) -> Option<SyntaxOperand> {
        let inner = match self.next_token_in_line() {
            Some(inner) => inner,
            None => {
                log.log_error(open.location.clone(), "Unclosed '('");
                return None;
            }
        };
        match self.next_token_in_line() {
            Some(close) if matches!(close.kind, TokenKind::RightParen) => {}
            _ => {
                log.log_error(open.location.clone(), "Unclosed '('");
                return None;
            }
        }
        match inner.as_operand() {
            Some(operand) if matches!(operand.kind, OperandType::Gpr) => {
                Some(SyntaxOperand::Value(operand.with_type(OperandType::ParenGpr)))
            }
            Some(operand) if matches!(operand.kind, OperandType::ParenGpr) => {
                Some(SyntaxOperand::Value(operand))
            }
            _ => {
                log.log_error(
                    inner.location.clone(),
                    format!("Parentheses can only contain CPU registers, not {}", inner),
                );
                None
            }
        }
    }

    /// Consume the next token in the line if it is a colon.
    fn consume_colon(&mut self) -> bool {
        match self.next_token_in_line() {
            Some(token) if matches!(token.kind, TokenKind::Colon) => true,
            Some(token) => {
                self.cached_token = Some(token);
                false
            }
            None => false,
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        if let Some(token) = self.cached_token.take() {
            return Some(token);
        }
        while self.line_index < self.lines.len() {
            let line = &self.lines[self.line_index];
            while self.token_index < line.tokens.len() {
                let token = &line.tokens[self.token_index];
                self.token_index += 1;
                if !matches!(token.kind, TokenKind::Delimiter | TokenKind::Comment) {
                    return Some(token.clone());
                }
            }
            self.line_index += 1;
            self.token_index = 0;
        }
        None
    }

    fn next_token_in_line(&mut self) -> Option<Token> {
        if let Some(token) = self.cached_token.take() {
            return Some(token);
        }
        let line = self.lines.get(self.line_index)?;
        while self.token_index < line.tokens.len() {
            let token = &line.tokens[self.token_index];
            self.token_index += 1;
            if !matches!(token.kind, TokenKind::Delimiter | TokenKind::Comment) {
                return Some(token.clone());
            }
        }
        None
    }

    fn has_more_tokens_in_line(&self) -> bool {
        match self.lines.get(self.line_index) {
            Some(line) => line.tokens[self.token_index..]
                .iter()
                .any(|token| !matches!(token.kind, TokenKind::Delimiter | TokenKind::Comment)),
            None => false,
        }
    }

    fn skip_rest_of_line(&mut self) {
        if let Some(line) = self.lines.get(self.line_index) {
            self.token_index = line.tokens.len();
        }
    }
}

fn morph_to_identifier(token: Token) -> Token {
    Token {
        kind: TokenKind::Identifier,
        literal: token.literal,
        location: token.location,
        original: token.original,
    }
}
