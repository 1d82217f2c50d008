pub mod asm;
pub mod diag;
mod error;
pub mod isa;

pub use self::asm::assemble;
pub use self::error::{AsmError, AsmResult};

pub mod prelude {
    pub use super::{
        asm::{assemble, Assembler, AssemblerConfig, Assembly},
        diag::{AssemblerLog, LogLevel, LogMessage, SourceLocation},
        error::{AsmError, AsmResult},
        isa::InstructionSet,
    };
}
