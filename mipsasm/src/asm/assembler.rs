//! The assembly driver.
//!
//! Assembly runs in stages over one or more source files: tokenizing with
//! preprocessing, syntax parsing, placement, and resolution. Each stage
//! runs to completion so diagnostics accumulate, and assembly only proceeds
//! to the next stage when the log holds no errors.
//!
//! Placement walks the parsed elements assigning segment addresses and
//! binding labels. Resolution then substitutes symbol addresses into
//! operands and expands pseudo instructions into their final basic
//! statement sequences.
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter, Write};
use std::mem;
use std::path::Path;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::diag::{AssemblerLog, LogLevel, LogMessage, SourceLocation};
use crate::error::{AsmError, AsmResult};
use crate::isa::{BasicInstruction, Directive, Instruction, InstructionSet};

use super::lexer;
use super::operand::{Operand, OperandType};
use super::preprocess::Preprocessor;
use super::syntax::{DirectiveSyntax, StatementSyntax, Syntax, SyntaxOperand, SyntaxParser};
use super::tokens::{SourceLine, Token, TokenKind};

/// Options controlling assembly.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Expose branch delay slots to the program instead of padding each
    /// control transfer with a trailing `nop`.
    pub delayed_branching: bool,
    /// Lay out multi-byte data big-endian.
    pub big_endian: bool,
    /// Fail assembly at the end when warnings were logged.
    pub warnings_are_errors: bool,
    /// Errors beyond this count halt assembly.
    pub max_error_count: Option<usize>,
    pub text_base: u32,
    pub data_base: u32,
    pub ktext_base: u32,
    pub kdata_base: u32,
    /// Where `.extern` symbols are allocated.
    pub extern_base: u32,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        AssemblerConfig {
            delayed_branching: false,
            big_endian: false,
            warnings_are_errors: false,
            max_error_count: Some(200),
            text_base: 0x0040_0000,
            data_base: 0x1001_0000,
            ktext_base: 0x8000_0000,
            kdata_base: 0x9000_0000,
            extern_base: 0x1000_0000,
        }
    }
}

/// The memory segment statements and data are placed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Text,
    Data,
    KText,
    KData,
}

impl Segment {
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, Segment::Text | Segment::KText)
    }
}

/// Labels bound to addresses. Each source file gets its own table; symbols
/// declared `.globl` or `.extern` are shared through a second, global table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<SmolStr, u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Bind `name` to `address`. Returns false when the name is already
    /// bound, leaving the original binding in place.
    pub fn define(&mut self, name: impl Into<SmolStr>, address: u32) -> bool {
        match self.symbols.entry(name.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(address);
                true
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.symbols.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// A fully resolved machine instruction with concrete operand values.
#[derive(Debug, Clone)]
pub struct BasicStatement {
    /// The statement as written, for diagnostics and listings. Statements
    /// expanded from one pseudo instruction share its syntax.
    pub syntax: Rc<StatementSyntax>,
    pub instruction: Rc<BasicInstruction>,
    pub operands: Vec<Operand>,
}

impl BasicStatement {
    pub fn new(
        syntax: Rc<StatementSyntax>,
        instruction: Rc<BasicInstruction>,
        operands: Vec<Operand>,
    ) -> Self {
        BasicStatement {
            syntax,
            instruction,
            operands,
        }
    }
}

impl Display for BasicStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.instruction.mnemonic)?;
        for (index, operand) in self.operands.iter().enumerate() {
            if index == 0 {
                write!(f, " {}", operand)?;
            } else if operand.kind == OperandType::ParenGpr {
                write!(f, "{}", operand)?;
            } else {
                write!(f, ", {}", operand)?;
            }
        }
        Ok(())
    }
}

/// A resolved statement at its final address.
#[derive(Debug, Clone)]
pub struct AssembledStatement {
    pub address: u32,
    pub statement: BasicStatement,
}

/// The product of a successful assembly.
#[derive(Debug)]
pub struct Assembly {
    pub statements: Vec<AssembledStatement>,
    /// Symbols exported with `.globl` or allocated with `.extern`.
    pub globals: SymbolTable,
}

impl Assembly {
    /// Render the statements as an address-annotated listing.
    pub fn listing(&self) -> String {
        let mut output = String::new();
        for statement in &self.statements {
            let _ = writeln!(output, "0x{:08x}  {}", statement.address, statement.statement);
        }
        output
    }
}

/// Drives the assembly stages and collects diagnostics.
pub struct Assembler {
    config: AssemblerConfig,
    log: AssemblerLog,
}

impl Assembler {
    pub fn new(config: AssemblerConfig) -> Self {
        let mut log = AssemblerLog::new();
        log.set_max_error_count(config.max_error_count);
        Assembler { config, log }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// The diagnostics recorded so far. On failure the log travels inside
    /// the returned error instead.
    pub fn log(&self) -> &AssemblerLog {
        &self.log
    }

    /// Assemble the given files as one program. Labels are file-local
    /// unless exported with `.globl`; segments are laid out continuously
    /// across files in the order given.
    pub fn assemble_files(&mut self, paths: &[impl AsRef<Path>]) -> AsmResult<Assembly> {
        let isa = InstructionSet::standard()?;
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let mut preprocessor = Preprocessor::new();
            let file = lexer::tokenize_file(path.as_ref(), &mut preprocessor, &isa, &mut self.log);
            self.check_open_macro(&preprocessor, &file.name);
            files.push(file);
            if self.log.has_exceeded_max_error_count() {
                break;
            }
        }
        self.assemble_tokenized(&isa, &files.iter().map(|file| &file.lines).collect::<Vec<_>>())
    }

    /// Assemble a single in-memory source, e.g. for tests or tooling.
    pub fn assemble_source(&mut self, filename: &str, source: &str) -> AsmResult<Assembly> {
        let isa = InstructionSet::standard()?;
        let mut preprocessor = Preprocessor::new();
        let file = lexer::tokenize(filename, source, &mut preprocessor, &isa, &mut self.log);
        self.check_open_macro(&preprocessor, filename);
        self.assemble_tokenized(&isa, &[&file.lines])
    }

    fn check_open_macro(&mut self, preprocessor: &Preprocessor, filename: &str) {
        if let Some(name) = preprocessor.current_macro_name() {
            self.log.log_error(
                SourceLocation::file(filename),
                format!(
                    "Macro '{}' does not have a matching '.end_macro' directive",
                    name
                ),
            );
        }
    }

    fn assemble_tokenized(
        &mut self,
        isa: &InstructionSet,
        files: &[&Vec<SourceLine>],
    ) -> AsmResult<Assembly> {
        if self.log.has_errors() {
            return self.fail();
        }

        let mut parsed = Vec::with_capacity(files.len());
        for lines in files {
            parsed.push(SyntaxParser::new(lines).parse(&mut self.log));
        }
        if self.log.has_errors() {
            return self.fail();
        }

        let mut placer = Placer::new(&self.config, &mut self.log);
        for elements in &parsed {
            placer.place_file(elements);
        }
        let layout = placer.finish();
        if self.log.has_errors() {
            return self.fail();
        }

        let statements = self.resolve(isa, &layout);
        if self.config.warnings_are_errors && self.log.has_warnings() {
            self.log.log(LogMessage::new(
                LogLevel::Error,
                None,
                "Assembly failed because warnings are treated as errors",
            ));
        }
        if self.log.has_errors() {
            return self.fail();
        }

        Ok(Assembly {
            statements,
            globals: layout.globals,
        })
    }

    /// Substitute symbol addresses into operands and expand each statement
    /// into its final basic instructions.
    fn resolve(&mut self, isa: &InstructionSet, layout: &Layout) -> Vec<AssembledStatement> {
        let nop = isa.match_basic_instruction("nop", &[]);
        let mut assembled = Vec::with_capacity(layout.pending.len());
        for pending in &layout.pending {
            if self.log.has_exceeded_max_error_count() {
                break;
            }
            let operands = self.resolve_operands(pending, layout);
            let statements = match &pending.syntax.instruction {
                Instruction::Basic(basic) => {
                    let converted = operands
                        .iter()
                        .zip(basic.operand_types.iter())
                        .map(|(operand, slot)| operand.convert_to_type(*slot, pending.address))
                        .collect();
                    vec![BasicStatement::new(
                        Rc::clone(&pending.syntax),
                        Rc::clone(basic),
                        converted,
                    )]
                }
                Instruction::Pseudo(pseudo) => {
                    pseudo
                        .template
                        .resolve(&operands, &pending.syntax, &self.config, pending.address)
                }
            };

            let mut address = pending.address;
            let mut transfers_control = false;
            for statement in statements {
                transfers_control = statement.instruction.control_transfer;
                assembled.push(AssembledStatement { address, statement });
                address += 4;
            }
            // Pad the delay slot; placement accounted for these 4 bytes.
            if transfers_control && !self.config.delayed_branching {
                if let Some(nop) = &nop {
                    assembled.push(AssembledStatement {
                        address,
                        statement: BasicStatement::new(
                            Rc::clone(&pending.syntax),
                            Rc::clone(nop),
                            Vec::new(),
                        ),
                    });
                }
            }
        }
        assembled
    }

    fn resolve_operands(&mut self, pending: &PendingStatement, layout: &Layout) -> Vec<Operand> {
        pending
            .syntax
            .operands
            .iter()
            .map(|operand| match operand {
                SyntaxOperand::Value(operand) => *operand,
                SyntaxOperand::Label {
                    token,
                    offset,
                    kind,
                } => {
                    let name = token.literal.as_str();
                    let address = layout.locals[pending.file_index]
                        .lookup(name)
                        .or_else(|| layout.globals.lookup(name));
                    let address = match address {
                        Some(address) => address,
                        None => {
                            self.log.log_error(
                                token.location.clone(),
                                format!("Undefined symbol '{}'", name),
                            );
                            0xDEAD_BEEF
                        }
                    };
                    Operand::new(*kind, (address as i32).wrapping_add(*offset))
                }
            })
            .collect()
    }

    fn fail<T>(&mut self) -> AsmResult<T> {
        let log = mem::take(&mut self.log);
        self.log.set_max_error_count(self.config.max_error_count);
        Err(AsmError::Assembly(log))
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Assembler::new(AssemblerConfig::default())
    }
}

/// A statement with an address but unresolved operands.
struct PendingStatement {
    address: u32,
    file_index: usize,
    syntax: Rc<StatementSyntax>,
}

/// Placement output: addressed statements plus the symbol tables resolution
/// works against.
struct Layout {
    pending: Vec<PendingStatement>,
    locals: Vec<SymbolTable>,
    globals: SymbolTable,
}

struct SegmentCounters {
    text: u32,
    data: u32,
    ktext: u32,
    kdata: u32,
}

/// Walks parsed elements assigning addresses, binding labels, and sizing
/// data directives. Segment counters persist across files; the current
/// segment and local symbols reset per file.
struct Placer<'a> {
    config: &'a AssemblerConfig,
    log: &'a mut AssemblerLog,
    counters: SegmentCounters,
    extern_counter: u32,
    segment: Segment,
    current_locals: SymbolTable,
    exported: Vec<(SmolStr, SourceLocation)>,
    locals: Vec<SymbolTable>,
    globals: SymbolTable,
    pending: Vec<PendingStatement>,
}

impl<'a> Placer<'a> {
    fn new(config: &'a AssemblerConfig, log: &'a mut AssemblerLog) -> Self {
        Placer {
            counters: SegmentCounters {
                text: config.text_base,
                data: config.data_base,
                ktext: config.ktext_base,
                kdata: config.kdata_base,
            },
            extern_counter: config.extern_base,
            segment: Segment::Text,
            current_locals: SymbolTable::new(),
            exported: Vec::new(),
            locals: Vec::new(),
            globals: SymbolTable::new(),
            pending: Vec::new(),
            config,
            log,
        }
    }

    fn finish(self) -> Layout {
        Layout {
            pending: self.pending,
            locals: self.locals,
            globals: self.globals,
        }
    }

    fn place_file(&mut self, elements: &[Syntax]) {
        self.segment = Segment::Text;
        for element in elements {
            if self.log.has_exceeded_max_error_count() {
                break;
            }
            self.place_element(element);
        }
        self.export_globals();
        let locals = mem::take(&mut self.current_locals);
        self.locals.push(locals);
    }

    fn place_element(&mut self, element: &Syntax) {
        match element {
            Syntax::Label(label) => {
                let address = self.counter();
                if !self.current_locals.define(label.token.literal.clone(), address) {
                    self.log.log_error(
                        label.token.location.clone(),
                        format!("Label '{}' has already been defined", label.token.literal),
                    );
                }
            }
            Syntax::Statement(statement) => self.place_statement(statement),
            Syntax::Directive(directive) => self.place_directive(directive),
        }
    }

    fn place_statement(&mut self, statement: &Rc<StatementSyntax>) {
        if !self.segment.is_text() {
            self.log.log_error(
                statement.token.location.clone(),
                "Instructions cannot be placed in the data segment",
            );
            return;
        }
        let size = match &statement.instruction {
            Instruction::Basic(basic) => {
                if basic.control_transfer && !self.config.delayed_branching {
                    8
                } else {
                    4
                }
            }
            Instruction::Pseudo(pseudo) => pseudo.template.size_bytes(self.config),
        };
        self.pending.push(PendingStatement {
            address: self.counter(),
            file_index: self.locals.len(),
            syntax: Rc::clone(statement),
        });
        *self.counter_mut() += size;
    }

    fn place_directive(&mut self, directive: &DirectiveSyntax) {
        match directive.directive {
            Directive::Text => self.switch_segment(directive, Segment::Text),
            Directive::Data => self.switch_segment(directive, Segment::Data),
            Directive::KText => self.switch_segment(directive, Segment::KText),
            Directive::KData => self.switch_segment(directive, Segment::KData),
            Directive::Word => self.place_integers(directive, 4),
            Directive::Half => self.place_integers(directive, 2),
            Directive::Byte => self.place_integers(directive, 1),
            Directive::Float => self.place_reals(directive, 4),
            Directive::Double => self.place_reals(directive, 8),
            Directive::Ascii => self.place_strings(directive, 0),
            Directive::Asciiz => self.place_strings(directive, 1),
            Directive::Space => self.place_space(directive),
            Directive::Align => self.place_align(directive),
            Directive::Extern => self.place_extern(directive),
            Directive::Globl => self.collect_globals(directive),
            Directive::Set => self.log.log_warning(
                directive.token.location.clone(),
                "Directive '.set' is not currently supported; ignored",
            ),
            // Already consumed during preprocessing.
            Directive::Eqv | Directive::Macro | Directive::EndMacro | Directive::Include => {}
        }
    }

    fn switch_segment(&mut self, directive: &DirectiveSyntax, segment: Segment) {
        self.segment = segment;
        let mut arguments = directive_arguments(&directive.content);
        let first = match arguments.next() {
            Some(first) => first,
            None => return,
        };
        match first.kind.integer_value() {
            Some(address) => {
                let address = address as u32;
                if segment.is_text() && address % 4 != 0 {
                    self.log.log_error(
                        first.location.clone(),
                        format!("Text segment address must be word aligned: {}", first.literal),
                    );
                } else {
                    *self.counter_mut() = address;
                }
                if arguments.next().is_some() {
                    self.log.log_warning(
                        directive.token.location.clone(),
                        format!("Ignoring extra arguments to '{}'", directive.directive),
                    );
                }
            }
            None => self.log.log_warning(
                first.location.clone(),
                format!("Ignoring extra arguments to '{}'", directive.directive),
            ),
        }
    }

    fn place_integers(&mut self, directive: &DirectiveSyntax, size: u32) {
        if !self.require_data_segment(directive) {
            return;
        }
        let aligned = align_up(self.counter(), size);
        *self.counter_mut() = aligned;
        for token in directive_arguments(&directive.content) {
            if token.kind.is_integer() || matches!(token.kind, TokenKind::Character(_)) {
                *self.counter_mut() += size;
            } else {
                self.log.log_error(
                    token.location.clone(),
                    format!(
                        "Directive '{}' expects integer values, got: {}",
                        directive.directive, token.literal
                    ),
                );
            }
        }
    }

    fn place_reals(&mut self, directive: &DirectiveSyntax, size: u32) {
        if !self.require_data_segment(directive) {
            return;
        }
        let aligned = align_up(self.counter(), size);
        *self.counter_mut() = aligned;
        for token in directive_arguments(&directive.content) {
            if token.kind.is_integer() || matches!(token.kind, TokenKind::RealNumber(_)) {
                *self.counter_mut() += size;
            } else {
                self.log.log_error(
                    token.location.clone(),
                    format!(
                        "Directive '{}' expects numeric values, got: {}",
                        directive.directive, token.literal
                    ),
                );
            }
        }
    }

    fn place_strings(&mut self, directive: &DirectiveSyntax, terminator: u32) {
        if !self.require_data_segment(directive) {
            return;
        }
        for token in directive_arguments(&directive.content) {
            match &token.kind {
                TokenKind::String(text) => {
                    *self.counter_mut() += text.len() as u32 + terminator;
                }
                _ => self.log.log_error(
                    token.location.clone(),
                    format!(
                        "Directive '{}' expects string operands, got: {}",
                        directive.directive, token.literal
                    ),
                ),
            }
        }
    }

    fn place_space(&mut self, directive: &DirectiveSyntax) {
        if !self.require_data_segment(directive) {
            return;
        }
        let mut arguments = directive_arguments(&directive.content);
        let size = arguments.next().and_then(|token| token.kind.integer_value());
        match size {
            Some(size) if size >= 0 => *self.counter_mut() += size as u32,
            _ => {
                self.log.log_error(
                    directive.token.location.clone(),
                    format!(
                        "Directive '{}' expects a non-negative size in bytes",
                        directive.directive
                    ),
                );
                return;
            }
        }
        if arguments.next().is_some() {
            self.log.log_warning(
                directive.token.location.clone(),
                format!("Ignoring extra arguments to '{}'", directive.directive),
            );
        }
    }

    fn place_align(&mut self, directive: &DirectiveSyntax) {
        let mut arguments = directive_arguments(&directive.content);
        let exponent = arguments.next().and_then(|token| token.kind.integer_value());
        match exponent {
            Some(exponent) if (0..=31).contains(&exponent) => {
                let aligned = align_up(self.counter(), 1u32 << exponent);
                *self.counter_mut() = aligned;
            }
            _ => {
                self.log.log_error(
                    directive.token.location.clone(),
                    format!(
                        "Directive '{}' expects an alignment exponent from 0 to 31",
                        directive.directive
                    ),
                );
                return;
            }
        }
        if arguments.next().is_some() {
            self.log.log_warning(
                directive.token.location.clone(),
                format!("Ignoring extra arguments to '{}'", directive.directive),
            );
        }
    }

    fn place_extern(&mut self, directive: &DirectiveSyntax) {
        let mut arguments = directive_arguments(&directive.content);
        let name = arguments.next();
        let size = arguments.next().and_then(|token| token.kind.integer_value());
        match (name, size) {
            (Some(name), Some(size))
                if matches!(name.kind, TokenKind::Identifier) && size >= 0 =>
            {
                if self.globals.define(name.literal.clone(), self.extern_counter) {
                    self.extern_counter += size as u32;
                } else {
                    self.log.log_error(
                        name.location.clone(),
                        format!("Label '{}' has already been defined", name.literal),
                    );
                }
            }
            _ => self.log.log_error(
                directive.token.location.clone(),
                format!(
                    "Directive '{}' expects an identifier followed by a size in bytes",
                    directive.directive
                ),
            ),
        }
    }

    fn collect_globals(&mut self, directive: &DirectiveSyntax) {
        for token in directive_arguments(&directive.content) {
            if matches!(token.kind, TokenKind::Identifier | TokenKind::Operator(_)) {
                self.exported
                    .push((token.literal.clone(), token.location.clone()));
            } else {
                self.log.log_error(
                    token.location.clone(),
                    format!(
                        "Directive '{}' expects label operands, got: {}",
                        directive.directive, token.literal
                    ),
                );
            }
        }
    }

    /// Move this file's `.globl` symbols into the global table.
    fn export_globals(&mut self) {
        let exported = mem::take(&mut self.exported);
        for (name, location) in exported {
            match self.current_locals.lookup(&name) {
                Some(address) => {
                    if !self.globals.define(name.clone(), address) {
                        self.log.log_error(
                            location,
                            format!("Label '{}' has already been defined", name),
                        );
                    }
                }
                None => self.log.log_error(
                    location,
                    format!("Symbol '{}' was declared global but is never defined", name),
                ),
            }
        }
    }

    fn require_data_segment(&mut self, directive: &DirectiveSyntax) -> bool {
        if self.segment.is_text() {
            self.log.log_error(
                directive.token.location.clone(),
                format!(
                    "Directive '{}' is not allowed in the text segment",
                    directive.directive
                ),
            );
            false
        } else {
            true
        }
    }

    fn counter(&self) -> u32 {
        match self.segment {
            Segment::Text => self.counters.text,
            Segment::Data => self.counters.data,
            Segment::KText => self.counters.ktext,
            Segment::KData => self.counters.kdata,
        }
    }

    fn counter_mut(&mut self) -> &mut u32 {
        match self.segment {
            Segment::Text => &mut self.counters.text,
            Segment::Data => &mut self.counters.data,
            Segment::KText => &mut self.counters.ktext,
            Segment::KData => &mut self.counters.kdata,
        }
    }
}

fn directive_arguments(content: &[Token]) -> impl Iterator<Item = &Token> {
    content
        .iter()
        .filter(|token| !matches!(token.kind, TokenKind::Comment | TokenKind::Delimiter))
}

fn align_up(value: u32, alignment: u32) -> u32 {
    let alignment = alignment as u64;
    (((value as u64 + alignment - 1) / alignment) * alignment) as u32
}
