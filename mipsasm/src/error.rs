//! Error type for the assembler's public entry points.
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;

use crate::diag::AssemblerLog;

pub type AsmResult<T> = Result<T, AsmError>;

#[derive(Debug)]
pub enum AsmError {
    /// A file could not be read or written.
    Io(io::Error),
    /// The bundled instruction set definitions could not be parsed.
    Config(serde_yaml::Error),
    /// Assembly recorded errors. The log carries every diagnostic, warnings
    /// included.
    Assembly(AssemblerLog),
}

impl Display for AsmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AsmError::Io(err) => write!(f, "io error: {}", err),
            AsmError::Config(err) => write!(f, "instruction set definition error: {}", err),
            AsmError::Assembly(log) => {
                writeln!(f, "assembly failed")?;
                for message in log.messages() {
                    writeln!(f, "{}", message)?;
                }
                Ok(())
            }
        }
    }
}

impl Error for AsmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AsmError::Io(err) => Some(err),
            AsmError::Config(err) => Some(err),
            AsmError::Assembly(_) => None,
        }
    }
}

impl From<io::Error> for AsmError {
    fn from(err: io::Error) -> Self {
        AsmError::Io(err)
    }
}

impl From<serde_yaml::Error> for AsmError {
    fn from(err: serde_yaml::Error) -> Self {
        AsmError::Config(err)
    }
}
