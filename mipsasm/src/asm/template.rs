//! Expansion templates for pseudo instructions.
//!
//! A pseudo instruction carries a template: a list of basic instruction
//! statements with `{...}` substitutions. `{N}` stands for the pseudo
//! statement's Nth operand, optionally pushed through modifiers, and
//! `{flag : a : b}` selects between alternatives by assembler flag, either
//! for one operand or for a whole statement.
use std::rc::Rc;

use itertools::Itertools;

use crate::diag::AssemblerLog;
use crate::isa::{BasicInstruction, InstructionSet};

use super::assembler::{AssemblerConfig, BasicStatement};
use super::lexer;
use super::operand::{Operand, OperandType};
use super::syntax::StatementSyntax;
use super::tokens::{SourceLine, Token, TokenKind};

const FLAG_USAGE: &str = "Usage: {<flag> : [<enabledValue>] : [<disabledValue>]}";

/// A boolean assembler option that expansion templates can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerFlag {
    DelayedBranching,
    BigEndian,
}

impl AssemblerFlag {
    pub fn key(&self) -> &'static str {
        match self {
            Self::DelayedBranching => "db",
            Self::BigEndian => "be",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_lowercase().as_str() {
            "db" => Some(Self::DelayedBranching),
            "be" => Some(Self::BigEndian),
            _ => None,
        }
    }

    pub fn is_enabled(&self, config: &AssemblerConfig) -> bool {
        match self {
            Self::DelayedBranching => config.delayed_branching,
            Self::BigEndian => config.big_endian,
        }
    }
}

/// A transformation applied to a substituted operand value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandModifier {
    /// `l`: the low halfword, for `ori`.
    Low,
    /// `h`: the high halfword, for `lui`.
    High,
    /// `al`: the low halfword sign-extended, for `addi`.
    AddLow,
    /// `ah`: the high halfword corrected for the carry a following `al`
    /// addition produces.
    AddHigh,
    /// `b`: a branch offset in words relative to the delay slot.
    Branch,
    /// `-`: the two's complement within the operand's width.
    Negate,
    /// `+N`: a constant addition.
    Plus(i32),
}

impl OperandModifier {
    pub fn parse(text: &str) -> Option<Self> {
        let lowered = text.to_lowercase();
        match lowered.as_str() {
            "l" => Some(Self::Low),
            "h" => Some(Self::High),
            "al" => Some(Self::AddLow),
            "ah" => Some(Self::AddHigh),
            "b" => Some(Self::Branch),
            "-" => Some(Self::Negate),
            _ => {
                let rest = lowered.strip_prefix('+')?;
                let amount = lexer::decode_integer(rest.trim_start())?;
                Some(Self::Plus(amount))
            }
        }
    }

    /// The operand type produced from the given input type.
    pub fn result_type(&self, from: OperandType) -> OperandType {
        match self {
            Self::Low | Self::High => OperandType::U16,
            Self::AddLow | Self::AddHigh => OperandType::S16,
            Self::Branch => OperandType::S16,
            Self::Negate | Self::Plus(_) => from,
        }
    }

    pub fn apply(&self, value: i32, kind: OperandType, address: u32) -> i32 {
        match self {
            Self::Low => value & 0xFFFF,
            Self::High => value >> 16,
            Self::AddLow => (value << 16) >> 16,
            Self::AddHigh => value.wrapping_add((value & 0x8000) << 1) >> 16,
            Self::Branch => (value.wrapping_sub(address as i32) >> 2).wrapping_sub(1),
            Self::Negate => ((1i64 << kind.bit_width()) - value as i64) as i32,
            Self::Plus(amount) => value.wrapping_add(*amount),
        }
    }
}

/// One operand slot of a template statement.
#[derive(Debug, Clone)]
pub enum TemplateOperand {
    /// A literal value written in the template.
    Value(Operand),
    /// `{N : mods}`: the pseudo statement's Nth operand, modified.
    Substitution {
        index: usize,
        modifiers: Vec<OperandModifier>,
        kind: OperandType,
    },
    /// `{flag : a : b}`: one of two operands selected by flag state.
    Flag {
        flag: AssemblerFlag,
        enabled: Option<Box<TemplateOperand>>,
        disabled: Option<Box<TemplateOperand>>,
        kind: OperandType,
    },
}

impl TemplateOperand {
    pub fn operand_type(&self) -> OperandType {
        match self {
            Self::Value(operand) => operand.kind,
            Self::Substitution { kind, .. } => *kind,
            Self::Flag { kind, .. } => *kind,
        }
    }

    /// Produce the concrete operand for a statement placed at `address`,
    /// given the operands written on the pseudo statement.
    pub fn resolve(
        &self,
        original_operands: &[Operand],
        config: &AssemblerConfig,
        address: u32,
    ) -> Operand {
        match self {
            Self::Value(operand) => *operand,
            Self::Substitution { index, modifiers, .. } => {
                let original = original_operands
                    .get(*index)
                    .copied()
                    .unwrap_or_else(|| Operand::new(OperandType::I32, 0));
                let mut value = original.value;
                let mut kind = original.kind;
                for modifier in modifiers {
                    value = modifier.apply(value, kind, address);
                    kind = modifier.result_type(kind);
                }
                Operand::new(kind, value)
            }
            Self::Flag { flag, enabled, disabled, kind } => {
                let active = if flag.is_enabled(config) { enabled } else { disabled };
                match active {
                    Some(operand) => operand.resolve(original_operands, config, address),
                    None => Operand::new(*kind, 0),
                }
            }
        }
    }
}

/// One statement of a template: a basic instruction with template operands,
/// or a flag choice between two alternatives.
#[derive(Debug, Clone)]
pub enum TemplateStatement {
    Basic {
        instruction: Rc<BasicInstruction>,
        operands: Vec<TemplateOperand>,
    },
    Flag {
        flag: AssemblerFlag,
        enabled: Option<Box<TemplateStatement>>,
        disabled: Option<Box<TemplateStatement>>,
    },
}

impl TemplateStatement {
    /// The basic instruction this statement produces under the given
    /// configuration, if any.
    pub fn instruction(&self, config: &AssemblerConfig) -> Option<&Rc<BasicInstruction>> {
        match self {
            Self::Basic { instruction, .. } => Some(instruction),
            Self::Flag { flag, enabled, disabled } => {
                let active = if flag.is_enabled(config) { enabled } else { disabled };
                active
                    .as_ref()
                    .and_then(|statement| statement.instruction(config))
            }
        }
    }

    /// Resolve into a concrete statement at `address`, or nothing when the
    /// active flag branch is empty.
    pub fn resolve(
        &self,
        original_operands: &[Operand],
        syntax: &Rc<StatementSyntax>,
        config: &AssemblerConfig,
        address: u32,
    ) -> Option<BasicStatement> {
        match self {
            Self::Basic { instruction, operands } => {
                let resolved = operands
                    .iter()
                    .zip(instruction.operand_types.iter())
                    .map(|(operand, slot)| {
                        operand
                            .resolve(original_operands, config, address)
                            .convert_to_type(*slot, address)
                    })
                    .collect();
                Some(BasicStatement::new(
                    Rc::clone(syntax),
                    Rc::clone(instruction),
                    resolved,
                ))
            }
            Self::Flag { flag, enabled, disabled } => {
                let active = if flag.is_enabled(config) { enabled } else { disabled };
                active.as_ref().and_then(|statement| {
                    statement.resolve(original_operands, syntax, config, address)
                })
            }
        }
    }
}

/// The full expansion of one pseudo instruction form.
#[derive(Debug, Clone)]
pub struct ExpansionTemplate {
    statements: Vec<TemplateStatement>,
}

impl ExpansionTemplate {
    pub fn new(statements: Vec<TemplateStatement>) -> Self {
        ExpansionTemplate { statements }
    }

    /// The size in bytes of the expansion under the given configuration,
    /// including the delay slot filler appended when the expansion ends in
    /// a control transfer and delayed branching is off.
    pub fn size_bytes(&self, config: &AssemblerConfig) -> u32 {
        let mut size = 0;
        let mut last_instruction: Option<&Rc<BasicInstruction>> = None;
        for statement in &self.statements {
            if let Some(instruction) = statement.instruction(config) {
                size += 4;
                last_instruction = Some(instruction);
            }
        }
        if !config.delayed_branching {
            if let Some(instruction) = last_instruction {
                if instruction.control_transfer {
                    size += 4;
                }
            }
        }
        size
    }

    /// Resolve every statement of the template, laying them out from
    /// `address`.
    pub fn resolve(
        &self,
        original_operands: &[Operand],
        syntax: &Rc<StatementSyntax>,
        config: &AssemblerConfig,
        mut address: u32,
    ) -> Vec<BasicStatement> {
        let mut statements = Vec::new();
        for statement in &self.statements {
            if let Some(resolved) = statement.resolve(original_operands, syntax, config, address) {
                address += 4;
                statements.push(resolved);
            }
        }
        statements
    }
}

/// Parses tokenized template lines against the pseudo instruction's
/// declared operand types.
pub struct TemplateParser<'a> {
    isa: &'a InstructionSet,
    operand_types: &'a [OperandType],
}

impl<'a> TemplateParser<'a> {
    pub fn new(isa: &'a InstructionSet, operand_types: &'a [OperandType]) -> Self {
        TemplateParser { isa, operand_types }
    }

    pub fn parse(&self, lines: &[SourceLine], log: &mut AssemblerLog) -> ExpansionTemplate {
        let mut statements = Vec::new();
        for line in lines {
            if let Some(statement) = self.parse_line(line, log) {
                statements.push(statement);
            }
        }
        ExpansionTemplate::new(statements)
    }

    fn parse_line(&self, line: &SourceLine, log: &mut AssemblerLog) -> Option<TemplateStatement> {
        let tokens: Vec<&Token> = line
            .tokens
            .iter()
            .filter(|token| !matches!(token.kind, TokenKind::Comment | TokenKind::Delimiter))
            .collect();
        let first = *tokens.first()?;

        match &first.kind {
            TokenKind::Operator(_) => self.parse_basic(first, &tokens[1..], log),
            TokenKind::TemplateSubstitution(content) => {
                if tokens.len() > 1 {
                    log.log_error(
                        tokens[1].location.clone(),
                        "Unexpected tokens following statement substitution",
                    );
                    return None;
                }
                self.parse_flag_statement(first, content, log)
            }
            _ => {
                log.log_error(
                    first.location.clone(),
                    format!("Unexpected token: {}", first.literal),
                );
                None
            }
        }
    }

    fn parse_basic(
        &self,
        mnemonic: &Token,
        rest: &[&Token],
        log: &mut AssemblerLog,
    ) -> Option<TemplateStatement> {
        let mut operands = Vec::with_capacity(rest.len());
        let mut index = 0;
        while index < rest.len() {
            let token = rest[index];
            if matches!(token.kind, TokenKind::LeftParen) {
                let inner = rest.get(index + 1);
                let close = rest.get(index + 2);
                match (inner, close) {
                    (Some(inner), Some(close)) if matches!(close.kind, TokenKind::RightParen) => {
                        let operand = self.parse_token_operand(inner, log)?;
                        operands.push(self.parenthesize(operand, inner, log)?);
                        index += 3;
                    }
                    _ => {
                        log.log_error(token.location.clone(), "Unclosed '('");
                        return None;
                    }
                }
            } else {
                operands.push(self.parse_token_operand(token, log)?);
                index += 1;
            }
        }

        let types: Vec<OperandType> = operands.iter().map(TemplateOperand::operand_type).collect();
        match self
            .isa
            .match_basic_instruction_loosely(&mnemonic.literal, &types)
        {
            Some(instruction) => Some(TemplateStatement::Basic { instruction, operands }),
            None => {
                log.log_error(
                    mnemonic.location.clone(),
                    format!(
                        "No basic instruction '{}' found matching operands [{}]",
                        mnemonic.literal,
                        types.iter().join(", ")
                    ),
                );
                None
            }
        }
    }

    /// Mark an operand written inside parentheses as register indirect.
    fn parenthesize(
        &self,
        operand: TemplateOperand,
        inner: &Token,
        log: &mut AssemblerLog,
    ) -> Option<TemplateOperand> {
        match operand {
            TemplateOperand::Value(value)
                if matches!(value.kind, OperandType::Gpr | OperandType::ParenGpr) =>
            {
                Some(TemplateOperand::Value(value.with_type(OperandType::ParenGpr)))
            }
            TemplateOperand::Substitution { index, modifiers, kind }
                if matches!(kind, OperandType::Gpr | OperandType::ParenGpr) =>
            {
                Some(TemplateOperand::Substitution {
                    index,
                    modifiers,
                    kind: OperandType::ParenGpr,
                })
            }
            _ => {
                log.log_error(
                    inner.location.clone(),
                    format!("Parentheses can only contain CPU registers, not {}", inner.literal),
                );
                None
            }
        }
    }

    fn parse_token_operand(&self, token: &Token, log: &mut AssemblerLog) -> Option<TemplateOperand> {
        match &token.kind {
            TokenKind::TemplateSubstitution(content) => self.parse_substitution(token, content, log),
            _ => match token.as_operand() {
                Some(operand) => Some(TemplateOperand::Value(operand)),
                None => {
                    log.log_error(
                        token.location.clone(),
                        format!("Unexpected template operand: {}", token.literal),
                    );
                    None
                }
            },
        }
    }

    fn parse_substitution(
        &self,
        whole: &Token,
        content: &[Token],
        log: &mut AssemblerLog,
    ) -> Option<TemplateOperand> {
        let content: Vec<&Token> = content
            .iter()
            .filter(|token| !matches!(token.kind, TokenKind::Comment | TokenKind::Delimiter))
            .collect();
        let Some(head) = content.first() else {
            log.log_error(whole.location.clone(), "Empty template substitution");
            return None;
        };

        if head.kind.is_integer() {
            self.parse_operand_substitution(head, &content[1..], log)
        } else {
            self.parse_flag_operand(whole, head, &content[1..], log)
        }
    }

    fn parse_operand_substitution(
        &self,
        head: &Token,
        rest: &[&Token],
        log: &mut AssemblerLog,
    ) -> Option<TemplateOperand> {
        let index = head.kind.integer_value().unwrap_or(0);
        if index < 0 || index as usize >= self.operand_types.len() {
            log.log_error(
                head.location.clone(),
                format!("Invalid operand index: {}", index),
            );
            return None;
        }
        let index = index as usize;

        let mut kind = self.operand_types[index];
        let mut modifiers = Vec::new();
        if let Some((first, modifier_tokens)) = rest.split_first() {
            if !matches!(first.kind, TokenKind::Colon) {
                log.log_error(
                    first.location.clone(),
                    format!("Expected ':', got: {}", first.literal),
                );
                return None;
            }
            for token in modifier_tokens {
                match OperandModifier::parse(&token.literal) {
                    Some(modifier) => {
                        kind = modifier.result_type(kind);
                        modifiers.push(modifier);
                    }
                    None => {
                        log.log_error(
                            token.location.clone(),
                            format!("Unrecognized operand modifier: {}", token.literal),
                        );
                        return None;
                    }
                }
            }
        }

        Some(TemplateOperand::Substitution { index, modifiers, kind })
    }

    fn parse_flag_operand(
        &self,
        whole: &Token,
        head: &Token,
        rest: &[&Token],
        log: &mut AssemblerLog,
    ) -> Option<TemplateOperand> {
        let Some(flag) = AssemblerFlag::from_key(&head.literal) else {
            log.log_error(
                head.location.clone(),
                format!("Unrecognized assembler flag: {}", head.literal),
            );
            return None;
        };
        let (enabled_part, disabled_part) = self.split_flag_branches(whole, rest, log)?;

        let enabled = match enabled_part {
            Some(tokens) if tokens.len() == 1 => {
                Some(Box::new(self.parse_token_operand(tokens[0], log)?))
            }
            Some(tokens) if !tokens.is_empty() => {
                log.log_error(tokens[1].location.clone(), FLAG_USAGE);
                return None;
            }
            _ => None,
        };
        let disabled = match disabled_part {
            Some(tokens) if tokens.len() == 1 => {
                Some(Box::new(self.parse_token_operand(tokens[0], log)?))
            }
            Some(tokens) if !tokens.is_empty() => {
                log.log_error(tokens[1].location.clone(), FLAG_USAGE);
                return None;
            }
            _ => None,
        };

        let kind = match (&enabled, &disabled) {
            (Some(enabled), Some(disabled)) => {
                let (enabled_type, disabled_type) =
                    (enabled.operand_type(), disabled.operand_type());
                match OperandType::union(enabled_type, disabled_type) {
                    Some(kind) => kind,
                    None => {
                        log.log_error(
                            head.location.clone(),
                            format!(
                                "Flag substitution branches have incompatible operand types: \
                                 {} and {}",
                                enabled_type, disabled_type
                            ),
                        );
                        return None;
                    }
                }
            }
            (Some(enabled), None) => enabled.operand_type(),
            (None, Some(disabled)) => disabled.operand_type(),
            (None, None) => {
                log.log_error(whole.location.clone(), FLAG_USAGE);
                return None;
            }
        };

        Some(TemplateOperand::Flag { flag, enabled, disabled, kind })
    }

    fn parse_flag_statement(
        &self,
        whole: &Token,
        content: &[Token],
        log: &mut AssemblerLog,
    ) -> Option<TemplateStatement> {
        let content: Vec<&Token> = content
            .iter()
            .filter(|token| !matches!(token.kind, TokenKind::Comment | TokenKind::Delimiter))
            .collect();
        let Some(head) = content.first() else {
            log.log_error(whole.location.clone(), "Empty template substitution");
            return None;
        };
        let Some(flag) = AssemblerFlag::from_key(&head.literal) else {
            log.log_error(
                head.location.clone(),
                format!("Unrecognized assembler flag: {}", head.literal),
            );
            return None;
        };
        let (enabled_part, disabled_part) = self.split_flag_branches(whole, &content[1..], log)?;

        let enabled = match enabled_part {
            Some(tokens) if !tokens.is_empty() => {
                Some(Box::new(self.parse_branch_statement(whole, tokens, log)?))
            }
            _ => None,
        };
        let disabled = match disabled_part {
            Some(tokens) if !tokens.is_empty() => {
                Some(Box::new(self.parse_branch_statement(whole, tokens, log)?))
            }
            _ => None,
        };

        if enabled.is_none() && disabled.is_none() {
            log.log_error(whole.location.clone(), FLAG_USAGE);
            return None;
        }

        Some(TemplateStatement::Flag { flag, enabled, disabled })
    }

    /// Split `: [branch] : [branch]` into its two optional branch token
    /// lists, validating the overall shape.
    fn split_flag_branches<'s, 't>(
        &self,
        whole: &Token,
        rest: &'s [&'t Token],
        log: &mut AssemblerLog,
    ) -> Option<(Option<&'s [&'t Token]>, Option<&'s [&'t Token]>)> {
        let sections: Vec<&[&'t Token]> = rest
            .split(|token| matches!(token.kind, TokenKind::Colon))
            .collect();
        if sections.len() > 3 || !sections[0].is_empty() {
            log.log_error(whole.location.clone(), FLAG_USAGE);
            return None;
        }
        Some((sections.get(1).copied(), sections.get(2).copied()))
    }

    fn parse_branch_statement(
        &self,
        whole: &Token,
        tokens: &[&Token],
        log: &mut AssemblerLog,
    ) -> Option<TemplateStatement> {
        let tokens: Vec<Token> = tokens.iter().map(|token| (*token).clone()).collect();
        let line = SourceLine::new(whole.location.clone(), "", tokens);
        self.parse_line(&line, log)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::diag::SourceLocation;
    use crate::isa::Instruction;
    use smol_str::SmolStr;

    fn parse_template(
        source: &str,
        operand_types: &[OperandType],
    ) -> (ExpansionTemplate, AssemblerLog, InstructionSet) {
        let isa = InstructionSet::standard().expect("standard instruction set");
        let mut log = AssemblerLog::new();
        let filename = SmolStr::new("template");
        let lines: Vec<SourceLine> = source
            .lines()
            .enumerate()
            .map(|(index, content)| {
                lexer::tokenize_template_line(&filename, index, content, &isa, &mut log)
            })
            .collect();
        let template = TemplateParser::new(&isa, operand_types).parse(&lines, &mut log);
        (template, log, isa)
    }

    fn dummy_syntax(isa: &InstructionSet) -> Rc<StatementSyntax> {
        let instruction: Instruction = isa
            .match_mnemonic("add")
            .and_then(|candidates| candidates.first().cloned())
            .expect("add instruction");
        Rc::new(StatementSyntax {
            instruction,
            token: Token::new(
                TokenKind::Identifier,
                "add",
                SourceLocation::line("test.asm", 0),
            ),
            operands: Vec::new(),
        })
    }

    #[test]
    fn test_simple_substitution() {
        let (template, log, isa) =
            parse_template("addi {0}, {0}, {1}", &[OperandType::Gpr, OperandType::S16]);
        assert_eq!(log.message_count(), 0, "{:?}", log.messages());

        let config = AssemblerConfig::default();
        assert_eq!(template.size_bytes(&config), 4);

        let original = [
            Operand::new(OperandType::Gpr, 8),
            Operand::new(OperandType::S16, 5),
        ];
        let syntax = dummy_syntax(&isa);
        let statements = template.resolve(&original, &syntax, &config, 0x0040_0000);
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].instruction.mnemonic, "addi");
        assert_eq!(statements[0].operands[0].value, 8);
        assert_eq!(statements[0].operands[2].value, 5);
    }

    #[test]
    fn test_halfword_modifiers() {
        let (template, log, isa) = parse_template(
            "lui {0}, {1 : h}\nori {0}, {0}, {1 : l}",
            &[OperandType::Gpr, OperandType::I32],
        );
        assert_eq!(log.message_count(), 0, "{:?}", log.messages());

        let config = AssemblerConfig::default();
        assert_eq!(template.size_bytes(&config), 8);

        let original = [
            Operand::new(OperandType::Gpr, 9),
            Operand::new(OperandType::I32, 0x1234_5678),
        ];
        let syntax = dummy_syntax(&isa);
        let statements = template.resolve(&original, &syntax, &config, 0x0040_0000);
        assert_eq!(statements[0].operands[1].value, 0x1234);
        assert_eq!(statements[1].operands[2].value, 0x5678);
    }

    #[test]
    fn test_branch_modifier() {
        let (template, log, isa) = parse_template(
            "bne {0}, {1}, {2 : b}",
            &[OperandType::Gpr, OperandType::Gpr, OperandType::Label],
        );
        assert_eq!(log.message_count(), 0, "{:?}", log.messages());

        let config = AssemblerConfig::default();
        let original = [
            Operand::new(OperandType::Gpr, 8),
            Operand::new(OperandType::Gpr, 9),
            Operand::new(OperandType::Label, 0x0040_0010),
        ];
        let syntax = dummy_syntax(&isa);
        let statements = template.resolve(&original, &syntax, &config, 0x0040_0000);
        // (0x10 bytes ahead / 4) - 1 for the delay slot.
        assert_eq!(statements[0].operands[2].value, 3);
    }

    #[test]
    fn test_memory_operand_template() {
        let (template, log, isa) = parse_template(
            "lui $1, {1 : ah}\nlw {0}, {1 : al}($1)",
            &[OperandType::Gpr, OperandType::Label],
        );
        assert_eq!(log.message_count(), 0, "{:?}", log.messages());

        let config = AssemblerConfig::default();
        let original = [
            Operand::new(OperandType::Gpr, 8),
            Operand::new(OperandType::Label, 0x1001_8765),
        ];
        let syntax = dummy_syntax(&isa);
        let statements = template.resolve(&original, &syntax, &config, 0x0040_0000);
        assert_eq!(statements.len(), 2);
        // The upper half carries one because the low half sign-extends
        // negative.
        assert_eq!(statements[0].operands[1].value, 0x1002);
        assert_eq!(statements[1].operands[1].value, 0x8765 - 0x1_0000);
        assert_eq!(statements[1].operands[2].kind, OperandType::ParenGpr);
        assert_eq!(statements[1].operands[2].value, 1);
    }

    #[test]
    fn test_flag_statement() {
        let (template, log, isa) = parse_template("{db :  : nop}", &[]);
        assert_eq!(log.message_count(), 0, "{:?}", log.messages());

        let delayed = AssemblerConfig {
            delayed_branching: true,
            ..AssemblerConfig::default()
        };
        let config = AssemblerConfig::default();
        assert_eq!(template.size_bytes(&config), 4);
        assert_eq!(template.size_bytes(&delayed), 0);

        let syntax = dummy_syntax(&isa);
        let statements = template.resolve(&[], &syntax, &config, 0x0040_0000);
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].instruction.mnemonic, "nop");
        assert!(template.resolve(&[], &syntax, &delayed, 0x0040_0000).is_empty());
    }

    #[test]
    fn test_flag_operand() {
        let (template, log, isa) = parse_template(
            "addi {0}, {0}, {db : 4 : 8}",
            &[OperandType::Gpr],
        );
        assert_eq!(log.message_count(), 0, "{:?}", log.messages());

        let syntax = dummy_syntax(&isa);
        let original = [Operand::new(OperandType::Gpr, 8)];

        let config = AssemblerConfig::default();
        let statements = template.resolve(&original, &syntax, &config, 0x0040_0000);
        assert_eq!(statements[0].operands[2].value, 8);

        let delayed = AssemblerConfig {
            delayed_branching: true,
            ..AssemblerConfig::default()
        };
        let statements = template.resolve(&original, &syntax, &delayed, 0x0040_0000);
        assert_eq!(statements[0].operands[2].value, 4);
    }

    #[test]
    fn test_invalid_operand_index() {
        let (_, log, _) = parse_template("add {0}, {1}, {5}", &[OperandType::Gpr, OperandType::Gpr]);
        assert!(log.has_errors());
        assert!(log.messages()[0].content().contains("Invalid operand index: 5"));
    }

    #[test]
    fn test_unrecognized_flag() {
        let (_, log, _) = parse_template("{zz : nop : nop}", &[]);
        assert!(log.has_errors());
        assert!(log.messages()[0]
            .content()
            .contains("Unrecognized assembler flag: zz"));
    }

    #[test]
    fn test_unrecognized_modifier() {
        let (_, log, _) = parse_template("addi {0}, {0}, {0 : q}", &[OperandType::Gpr]);
        assert!(log.has_errors());
        assert!(log.messages()[0]
            .content()
            .contains("Unrecognized operand modifier: q"));
    }

    #[test]
    fn test_flag_without_branches() {
        let (_, log, _) = parse_template("{db}", &[]);
        assert!(log.has_errors());
        assert!(log.messages()[0].content().contains("Usage:"));
    }

    #[test]
    fn test_modifier_arithmetic() {
        let address = 0x0040_0000;
        assert_eq!(
            OperandModifier::Low.apply(0x1234_5678, OperandType::I32, address),
            0x5678
        );
        assert_eq!(
            OperandModifier::High.apply(0x1234_5678, OperandType::I32, address),
            0x1234
        );
        // The high half is arithmetic, matching `lui` + `ori` reassembly.
        assert_eq!(
            OperandModifier::High.apply(i32::MIN, OperandType::I32, address),
            -32768
        );
        assert_eq!(
            OperandModifier::AddLow.apply(0x1234_8765, OperandType::I32, address),
            0x8765 - 0x1_0000
        );
        // `ah` pre-corrects for the carry `al` will produce.
        assert_eq!(
            OperandModifier::AddHigh.apply(0x1234_8765, OperandType::I32, address),
            0x1235
        );
        assert_eq!(
            OperandModifier::Branch.apply(0x0040_0008, OperandType::Label, address),
            1
        );
        // Backward branches come out negative.
        assert_eq!(
            OperandModifier::Branch.apply(0x003f_fff8, OperandType::Label, address),
            -3
        );
        assert_eq!(
            OperandModifier::Negate.apply(5, OperandType::U16, address),
            65531
        );
        assert_eq!(
            OperandModifier::Plus(3).apply(4, OperandType::U3, address),
            7
        );
    }

    #[test]
    fn test_modifier_parsing() {
        assert_eq!(OperandModifier::parse("l"), Some(OperandModifier::Low));
        assert_eq!(OperandModifier::parse("AH"), Some(OperandModifier::AddHigh));
        assert_eq!(OperandModifier::parse("-"), Some(OperandModifier::Negate));
        assert_eq!(OperandModifier::parse("+12"), Some(OperandModifier::Plus(12)));
        assert_eq!(OperandModifier::parse("+ 0x10"), Some(OperandModifier::Plus(16)));
        assert_eq!(OperandModifier::parse("q"), None);
        assert_eq!(OperandModifier::parse("+"), None);
    }
}
