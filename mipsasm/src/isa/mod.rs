//! The target instruction set: basic machine instructions, pseudo
//! instructions with their expansion templates, registers, and assembler
//! directives.
//!
//! [`InstructionSet::standard`] builds the full set. Basic instructions are
//! defined in code; pseudo instructions are loaded from a definition file
//! bundled into the binary.
mod directive;
pub mod registers;

pub use directive::Directive;

use std::collections::HashMap;
use std::rc::Rc;

use itertools::Itertools;
use serde::Deserialize;
use smol_str::SmolStr;

use crate::asm::lexer;
use crate::asm::operand::OperandType;
use crate::asm::template::{ExpansionTemplate, TemplateParser};
use crate::asm::tokens::SourceLine;
use crate::diag::AssemblerLog;
use crate::error::AsmResult;

const PSEUDO_DEFINITIONS: &str = include_str!("../../config/pseudo_instructions.yaml");

/// An instruction the target machine executes directly. One mnemonic can
/// carry several definitions distinguished by operand types.
#[derive(Debug, Clone)]
pub struct BasicInstruction {
    pub mnemonic: SmolStr,
    pub operand_types: Vec<OperandType>,
    /// Whether this instruction can transfer control, placing the statement
    /// after it in a delay slot.
    pub control_transfer: bool,
    pub title: &'static str,
    pub description: &'static str,
}

impl BasicInstruction {
    pub fn accepts_operands(&self, types: &[OperandType]) -> bool {
        types_accept(&self.operand_types, types)
    }

    /// Relaxed matching for expansion template statements, where operand
    /// types are only known symbolically.
    pub fn accepts_operands_loosely(&self, types: &[OperandType]) -> bool {
        self.operand_types.len() == types.len()
            && self
                .operand_types
                .iter()
                .zip(types)
                .all(|(expected, given)| expected.accepts_loosely(*given))
    }
}

/// An instruction assembled by expanding a template of basic instructions.
#[derive(Debug, Clone)]
pub struct PseudoInstruction {
    pub mnemonic: SmolStr,
    pub operand_types: Vec<OperandType>,
    pub title: String,
    pub description: String,
    pub template: ExpansionTemplate,
}

impl PseudoInstruction {
    pub fn accepts_operands(&self, types: &[OperandType]) -> bool {
        types_accept(&self.operand_types, types)
    }
}

fn types_accept(expected: &[OperandType], given: &[OperandType]) -> bool {
    expected.len() == given.len()
        && expected
            .iter()
            .zip(given)
            .all(|(expected, given)| expected.accepts(*given))
}

/// Either kind of instruction under one name, as carried on mnemonic tokens
/// and parsed statements.
#[derive(Debug, Clone)]
pub enum Instruction {
    Basic(Rc<BasicInstruction>),
    Pseudo(Rc<PseudoInstruction>),
}

impl Instruction {
    pub fn mnemonic(&self) -> &str {
        match self {
            Self::Basic(instruction) => &instruction.mnemonic,
            Self::Pseudo(instruction) => &instruction.mnemonic,
        }
    }

    pub fn operand_types(&self) -> &[OperandType] {
        match self {
            Self::Basic(instruction) => &instruction.operand_types,
            Self::Pseudo(instruction) => &instruction.operand_types,
        }
    }

    pub fn accepts_operands(&self, types: &[OperandType]) -> bool {
        types_accept(self.operand_types(), types)
    }
}

/// Every known instruction, indexed by lowercase mnemonic.
///
/// Basic instructions are listed before pseudo instructions sharing their
/// mnemonic, so a statement assembles to the machine instruction whenever
/// one accepts its operands.
#[derive(Debug, Default)]
pub struct InstructionSet {
    instructions: HashMap<SmolStr, Vec<Instruction>>,
    basics: HashMap<SmolStr, Vec<Rc<BasicInstruction>>>,
}

impl InstructionSet {
    /// Build the standard instruction set.
    pub fn standard() -> AsmResult<Self> {
        let mut set = InstructionSet::default();
        for instruction in standard_basic_instructions() {
            set.insert_basic(instruction);
        }

        // Expansion templates reference basic instructions only, so the
        // pseudo definitions can be parsed against the set built so far.
        let definitions: Vec<PseudoInstructionDef> = serde_yaml::from_str(PSEUDO_DEFINITIONS)?;
        let mut pseudos = Vec::new();
        for definition in &definitions {
            for form in &definition.forms {
                if let Some(pseudo) = set.parse_pseudo_form(definition, form) {
                    pseudos.push(pseudo);
                }
            }
        }
        for pseudo in pseudos {
            set.insert_pseudo(pseudo);
        }
        Ok(set)
    }

    /// All instructions defined under a mnemonic. Lookup ignores case.
    pub fn match_mnemonic(&self, mnemonic: &str) -> Option<&[Instruction]> {
        self.instructions
            .get(mnemonic.to_lowercase().as_str())
            .map(Vec::as_slice)
    }

    /// The first instruction under `mnemonic` accepting the given operand
    /// types.
    pub fn match_instruction(
        &self,
        mnemonic: &str,
        types: &[OperandType],
    ) -> Option<&Instruction> {
        self.match_mnemonic(mnemonic)?
            .iter()
            .find(|candidate| candidate.accepts_operands(types))
    }

    pub fn match_basic_instruction(
        &self,
        mnemonic: &str,
        types: &[OperandType],
    ) -> Option<Rc<BasicInstruction>> {
        self.basics
            .get(mnemonic.to_lowercase().as_str())?
            .iter()
            .find(|candidate| candidate.accepts_operands(types))
            .cloned()
    }

    /// Like [`match_basic_instruction`](Self::match_basic_instruction), but
    /// falling back to relaxed matching. Used for expansion template
    /// statements, whose operand types are symbolic until resolution.
    pub fn match_basic_instruction_loosely(
        &self,
        mnemonic: &str,
        types: &[OperandType],
    ) -> Option<Rc<BasicInstruction>> {
        let candidates = self.basics.get(mnemonic.to_lowercase().as_str())?;
        candidates
            .iter()
            .find(|candidate| candidate.accepts_operands(types))
            .or_else(|| {
                candidates
                    .iter()
                    .find(|candidate| candidate.accepts_operands_loosely(types))
            })
            .cloned()
    }

    fn insert_basic(&mut self, instruction: BasicInstruction) {
        let instruction = Rc::new(instruction);
        self.basics
            .entry(instruction.mnemonic.clone())
            .or_default()
            .push(Rc::clone(&instruction));
        self.instructions
            .entry(instruction.mnemonic.clone())
            .or_default()
            .push(Instruction::Basic(instruction));
    }

    fn insert_pseudo(&mut self, instruction: PseudoInstruction) {
        let instruction = Rc::new(instruction);
        self.instructions
            .entry(instruction.mnemonic.clone())
            .or_default()
            .push(Instruction::Pseudo(instruction));
    }

    /// Parse one operand list and expansion template from the definition
    /// file. A malformed definition is reported and skipped rather than
    /// failing the whole set.
    fn parse_pseudo_form(
        &self,
        definition: &PseudoInstructionDef,
        form: &PseudoFormDef,
    ) -> Option<PseudoInstruction> {
        let mut operand_types = Vec::with_capacity(form.operands.len());
        for name in &form.operands {
            match OperandType::from_name(name) {
                Some(operand_type) => operand_types.push(operand_type),
                None => {
                    log::warn!(
                        "Skipping pseudo instruction '{}': unknown operand type '{}'",
                        definition.mnemonic,
                        name
                    );
                    return None;
                }
            }
        }

        // Synthetic filename so template diagnostics name the definition.
        let filename = SmolStr::new(format!(
            "{}[{}]",
            definition.mnemonic,
            operand_types.iter().join(", ")
        ));
        let mut log = AssemblerLog::new();
        let lines: Vec<SourceLine> = form
            .expansion
            .lines()
            .enumerate()
            .map(|(index, content)| {
                lexer::tokenize_template_line(&filename, index, content, self, &mut log)
            })
            .collect();
        let template = TemplateParser::new(self, &operand_types).parse(&lines, &mut log);
        if log.has_errors() {
            for message in log.messages() {
                log::warn!("Skipping pseudo instruction definition: {}", message);
            }
            return None;
        }

        Some(PseudoInstruction {
            mnemonic: SmolStr::new(definition.mnemonic.to_lowercase()),
            operand_types,
            title: form
                .title
                .clone()
                .unwrap_or_else(|| definition.title.clone()),
            description: form
                .description
                .clone()
                .unwrap_or_else(|| definition.description.clone()),
            template,
        })
    }
}

/// One pseudo instruction entry in the bundled definition file.
#[derive(Debug, Deserialize)]
struct PseudoInstructionDef {
    mnemonic: String,
    title: String,
    description: String,
    forms: Vec<PseudoFormDef>,
}

/// One operand list and expansion template for a pseudo instruction. The
/// title and description default to the entry's.
#[derive(Debug, Deserialize)]
struct PseudoFormDef {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    operands: Vec<String>,
    expansion: String,
}

#[rustfmt::skip]
fn standard_basic_instructions() -> Vec<BasicInstruction> {
    use OperandType::{BranchOffset as Bro, Fpr, Gpr, JumpLabel as Jmp, ParenGpr as Mem, S16, U16, U5};

    let table: Vec<(&str, Vec<OperandType>, bool, &str, &str)> = vec![
        // Arithmetic and logic.
        ("add",     vec![Gpr, Gpr, Gpr], false, "Addition with overflow",                  "set $t1 to ($t2 plus $t3)"),
        ("addu",    vec![Gpr, Gpr, Gpr], false, "Addition unsigned without overflow",      "set $t1 to ($t2 plus $t3), no overflow"),
        ("sub",     vec![Gpr, Gpr, Gpr], false, "Subtraction with overflow",               "set $t1 to ($t2 minus $t3)"),
        ("subu",    vec![Gpr, Gpr, Gpr], false, "Subtraction unsigned without overflow",   "set $t1 to ($t2 minus $t3), no overflow"),
        ("and",     vec![Gpr, Gpr, Gpr], false, "Bitwise AND",                             "set $t1 to ($t2 bitwise-AND $t3)"),
        ("or",      vec![Gpr, Gpr, Gpr], false, "Bitwise OR",                              "set $t1 to ($t2 bitwise-OR $t3)"),
        ("xor",     vec![Gpr, Gpr, Gpr], false, "Bitwise XOR",                             "set $t1 to ($t2 bitwise-XOR $t3)"),
        ("nor",     vec![Gpr, Gpr, Gpr], false, "Bitwise NOR",                             "set $t1 to inverse of ($t2 bitwise-OR $t3)"),
        ("slt",     vec![Gpr, Gpr, Gpr], false, "Set less than",                           "set $t1 to 1 if $t2 less than $t3, 0 otherwise"),
        ("sltu",    vec![Gpr, Gpr, Gpr], false, "Set less than unsigned",                  "set $t1 to 1 if $t2 less than $t3 unsigned, 0 otherwise"),
        ("mult",    vec![Gpr, Gpr],      false, "Multiplication",                          "set HI to high-order 32 bits, LO to low-order 32 bits of ($t1 times $t2)"),
        ("multu",   vec![Gpr, Gpr],      false, "Multiplication unsigned",                 "set HI to high-order 32 bits, LO to low-order 32 bits of unsigned ($t1 times $t2)"),
        ("div",     vec![Gpr, Gpr],      false, "Division with overflow",                  "divide $t1 by $t2, then set LO to quotient and HI to remainder"),
        ("divu",    vec![Gpr, Gpr],      false, "Division unsigned without overflow",      "divide $t1 by $t2 unsigned, then set LO to quotient and HI to remainder"),
        ("mfhi",    vec![Gpr],           false, "Move from HI register",                   "set $t1 to contents of HI"),
        ("mflo",    vec![Gpr],           false, "Move from LO register",                   "set $t1 to contents of LO"),
        ("mthi",    vec![Gpr],           false, "Move to HI register",                     "set HI to contents of $t1"),
        ("mtlo",    vec![Gpr],           false, "Move to LO register",                     "set LO to contents of $t1"),
        // Immediate arithmetic and logic.
        ("addi",    vec![Gpr, Gpr, S16], false, "Addition immediate with overflow",        "set $t1 to ($t2 plus signed 16-bit immediate)"),
        ("addiu",   vec![Gpr, Gpr, S16], false, "Addition immediate unsigned",             "set $t1 to ($t2 plus signed 16-bit immediate), no overflow"),
        ("andi",    vec![Gpr, Gpr, U16], false, "Bitwise AND immediate",                   "set $t1 to ($t2 bitwise-AND unsigned 16-bit immediate)"),
        ("ori",     vec![Gpr, Gpr, U16], false, "Bitwise OR immediate",                    "set $t1 to ($t2 bitwise-OR unsigned 16-bit immediate)"),
        ("xori",    vec![Gpr, Gpr, U16], false, "Bitwise XOR immediate",                   "set $t1 to ($t2 bitwise-XOR unsigned 16-bit immediate)"),
        ("slti",    vec![Gpr, Gpr, S16], false, "Set less than immediate",                 "set $t1 to 1 if $t2 less than signed 16-bit immediate, 0 otherwise"),
        ("sltiu",   vec![Gpr, Gpr, S16], false, "Set less than immediate unsigned",        "set $t1 to 1 if $t2 less than 16-bit immediate unsigned, 0 otherwise"),
        ("lui",     vec![Gpr, U16],      false, "Load upper immediate",                    "set high-order 16 bits of $t1 to 16-bit immediate and low-order 16 bits to 0"),
        // Shifts.
        ("sll",     vec![Gpr, Gpr, U5],  false, "Shift left logical",                      "set $t1 to result of shifting $t2 left by number of bits specified by immediate"),
        ("srl",     vec![Gpr, Gpr, U5],  false, "Shift right logical",                     "set $t1 to result of shifting $t2 right by number of bits specified by immediate"),
        ("sra",     vec![Gpr, Gpr, U5],  false, "Shift right arithmetic",                  "set $t1 to result of sign-extended shifting $t2 right by number of bits specified by immediate"),
        ("sllv",    vec![Gpr, Gpr, Gpr], false, "Shift left logical variable",             "set $t1 to result of shifting $t2 left by number of bits specified by value in low-order 5 bits of $t3"),
        ("srlv",    vec![Gpr, Gpr, Gpr], false, "Shift right logical variable",            "set $t1 to result of shifting $t2 right by number of bits specified by value in low-order 5 bits of $t3"),
        ("srav",    vec![Gpr, Gpr, Gpr], false, "Shift right arithmetic variable",         "set $t1 to result of sign-extended shifting $t2 right by number of bits specified by value in low-order 5 bits of $t3"),
        // Loads and stores.
        ("lw",      vec![Gpr, S16, Mem], false, "Load word",                               "set $t1 to contents of effective memory word address"),
        ("lh",      vec![Gpr, S16, Mem], false, "Load halfword",                           "set $t1 to sign-extended 16-bit value from effective memory halfword address"),
        ("lhu",     vec![Gpr, S16, Mem], false, "Load halfword unsigned",                  "set $t1 to zero-extended 16-bit value from effective memory halfword address"),
        ("lb",      vec![Gpr, S16, Mem], false, "Load byte",                               "set $t1 to sign-extended 8-bit value from effective memory byte address"),
        ("lbu",     vec![Gpr, S16, Mem], false, "Load byte unsigned",                      "set $t1 to zero-extended 8-bit value from effective memory byte address"),
        ("sw",      vec![Gpr, S16, Mem], false, "Store word",                              "store contents of $t1 into effective memory word address"),
        ("sh",      vec![Gpr, S16, Mem], false, "Store halfword",                          "store low-order 16 bits of $t1 into effective memory halfword address"),
        ("sb",      vec![Gpr, S16, Mem], false, "Store byte",                              "store low-order 8 bits of $t1 into effective memory byte address"),
        // Branches.
        ("beq",     vec![Gpr, Gpr, Bro], true,  "Branch if equal",                         "branch to statement at label's address if $t1 and $t2 are equal"),
        ("bne",     vec![Gpr, Gpr, Bro], true,  "Branch if not equal",                     "branch to statement at label's address if $t1 and $t2 are not equal"),
        ("blez",    vec![Gpr, Bro],      true,  "Branch if less than or equal to zero",    "branch to statement at label's address if $t1 is less than or equal to zero"),
        ("bgtz",    vec![Gpr, Bro],      true,  "Branch if greater than zero",             "branch to statement at label's address if $t1 is greater than zero"),
        ("bltz",    vec![Gpr, Bro],      true,  "Branch if less than zero",                "branch to statement at label's address if $t1 is less than zero"),
        ("bgez",    vec![Gpr, Bro],      true,  "Branch if greater than or equal to zero", "branch to statement at label's address if $t1 is greater than or equal to zero"),
        ("bltzal",  vec![Gpr, Bro],      true,  "Branch if less than zero and link",       "if $t1 is less than zero, set $ra to the return address then branch to statement at label's address"),
        ("bgezal",  vec![Gpr, Bro],      true,  "Branch if greater than or equal to zero and link", "if $t1 is greater than or equal to zero, set $ra to the return address then branch to statement at label's address"),
        // Jumps.
        ("j",       vec![Jmp],           true,  "Jump unconditionally",                    "jump to statement at target address"),
        ("jal",     vec![Jmp],           true,  "Jump and link",                           "set $ra to the return address then jump to statement at target address"),
        ("jr",      vec![Gpr],           true,  "Jump register unconditionally",           "jump to statement whose address is in $t1"),
        ("jalr",    vec![Gpr, Gpr],      true,  "Jump and link register",                  "set $t1 to the return address then jump to statement whose address is in $t2"),
        ("jalr",    vec![Gpr],           true,  "Jump and link register",                  "set $ra to the return address then jump to statement whose address is in $t1"),
        // System.
        ("syscall", vec![],              false, "Issue a system call",                     "execute the system call specified by value in $v0"),
        ("break",   vec![],              false, "Break execution",                         "terminate program execution with exception"),
        ("nop",     vec![],              false, "Null operation",                          "machine code is all zeroes"),
        // Floating point.
        ("add.s",   vec![Fpr, Fpr, Fpr], false, "Floating point addition single precision",       "set $f0 to single-precision ($f1 plus $f2)"),
        ("sub.s",   vec![Fpr, Fpr, Fpr], false, "Floating point subtraction single precision",    "set $f0 to single-precision ($f1 minus $f2)"),
        ("mul.s",   vec![Fpr, Fpr, Fpr], false, "Floating point multiplication single precision", "set $f0 to single-precision ($f1 times $f2)"),
        ("div.s",   vec![Fpr, Fpr, Fpr], false, "Floating point division single precision",       "set $f0 to single-precision ($f1 divided by $f2)"),
        ("mov.s",   vec![Fpr, Fpr],      false, "Move floating point single precision",           "set single-precision $f0 to value of $f1"),
        ("mfc1",    vec![Gpr, Fpr],      false, "Move from Coprocessor 1 (FPU)",                  "set $t1 to value in FPU register $f1"),
        ("mtc1",    vec![Gpr, Fpr],      false, "Move to Coprocessor 1 (FPU)",                    "set FPU register $f1 to value in $t1"),
        ("lwc1",    vec![Fpr, S16, Mem], false, "Load word into Coprocessor 1 (FPU)",             "set $f1 to 32-bit value from effective memory word address"),
        ("swc1",    vec![Fpr, S16, Mem], false, "Store word from Coprocessor 1 (FPU)",            "store 32-bit value in $f1 at effective memory word address"),
    ];

    table
        .into_iter()
        .map(|(mnemonic, operand_types, control_transfer, title, description)| BasicInstruction {
            mnemonic: SmolStr::new(mnemonic),
            operand_types,
            control_transfer,
            title,
            description,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::asm::assembler::AssemblerConfig;
    use crate::asm::operand::OperandType::*;

    #[test]
    fn test_standard_set_builds() {
        let set = InstructionSet::standard().expect("standard instruction set");
        assert!(set.match_mnemonic("add").is_some());
        assert!(set.match_mnemonic("ADD").is_some());
        assert!(set.match_mnemonic("frobnicate").is_none());
    }

    #[test]
    fn test_overload_selection() {
        let set = InstructionSet::standard().expect("standard instruction set");
        // A narrow integer widens to the declared immediate type.
        let chosen = set
            .match_instruction("addi", &[Gpr, Gpr, U3])
            .expect("addi form");
        assert_eq!(chosen.operand_types(), &[Gpr, Gpr, S16]);
        assert!(set.match_instruction("addi", &[Gpr, Gpr, Label]).is_none());
    }

    #[test]
    fn test_basic_listed_before_pseudo() {
        let set = InstructionSet::standard().expect("standard instruction set");
        // `add` has both a machine form and a pseudo immediate form. The
        // machine form must win for register operands.
        let candidates = set.match_mnemonic("add").expect("add");
        assert!(candidates.len() >= 2);
        assert!(matches!(candidates[0], Instruction::Basic(_)));
        let chosen = set
            .match_instruction("add", &[Gpr, Gpr, Gpr])
            .expect("add form");
        assert!(matches!(chosen, Instruction::Basic(_)));
        let chosen = set
            .match_instruction("add", &[Gpr, Gpr, S16])
            .expect("add immediate form");
        assert!(matches!(chosen, Instruction::Pseudo(_)));
    }

    #[test]
    fn test_loose_basic_matching() {
        let set = InstructionSet::standard().expect("standard instruction set");
        // Strict matching refuses a signed value for an unsigned immediate;
        // template matching goes by width alone.
        assert!(set.match_basic_instruction("ori", &[Gpr, Gpr, S16]).is_none());
        assert!(set
            .match_basic_instruction_loosely("ori", &[Gpr, Gpr, S16])
            .is_some());
    }

    #[test]
    fn test_control_transfer_flags() {
        let set = InstructionSet::standard().expect("standard instruction set");
        let beq = set
            .match_basic_instruction("beq", &[Gpr, Gpr, BranchOffset])
            .expect("beq");
        assert!(beq.control_transfer);
        let jr = set.match_basic_instruction("jr", &[Gpr]).expect("jr");
        assert!(jr.control_transfer);
        let addi = set
            .match_basic_instruction("addi", &[Gpr, Gpr, S16])
            .expect("addi");
        assert!(!addi.control_transfer);
    }

    #[test]
    fn test_pseudo_instructions_loaded() {
        let set = InstructionSet::standard().expect("standard instruction set");
        let li = set.match_mnemonic("li").expect("li defined");
        assert!(li
            .iter()
            .all(|candidate| matches!(candidate, Instruction::Pseudo(_))));

        // The 32-bit form needs a lui/ori pair.
        let chosen = set
            .match_instruction("li", &[Gpr, I32])
            .expect("li 32-bit form");
        match chosen {
            Instruction::Pseudo(pseudo) => {
                assert_eq!(pseudo.template.size_bytes(&AssemblerConfig::default()), 8);
            }
            Instruction::Basic(_) => panic!("li must be a pseudo instruction"),
        }
    }

    #[test]
    fn test_no_operand_instructions() {
        let set = InstructionSet::standard().expect("standard instruction set");
        assert!(set.match_basic_instruction("nop", &[]).is_some());
        assert!(set.match_basic_instruction("syscall", &[]).is_some());
    }
}
