//! The assembly pipeline: lexing, preprocessing, syntax parsing, and
//! resolution.
pub mod assembler;
pub mod lexer;
pub mod macros;
pub mod operand;
pub mod preprocess;
pub mod syntax;
pub mod template;
pub mod tokens;

pub use assembler::{
    AssembledStatement, Assembler, AssemblerConfig, Assembly, BasicStatement, Segment, SymbolTable,
};
pub use operand::{Operand, OperandType};

use crate::error::AsmResult;

/// Assemble in-memory source with the default configuration.
pub fn assemble(filename: &str, source: &str) -> AsmResult<Assembly> {
    let mut assembler = Assembler::default();
    assembler.assemble_source(filename, source)
}
