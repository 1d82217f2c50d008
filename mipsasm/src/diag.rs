//! Assembly diagnostics.
//!
//! Problems found while tokenizing, preprocessing, parsing or resolving are
//! collected in an [`AssemblerLog`] instead of aborting on the first failure,
//! so one run can report everything it finds.
use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

/// Severity of a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Error => "Error",
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Some location in a source file given to the assembler. The location can
/// reference a file as a whole, a line as a whole, or a specific column
/// within a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub filename: Option<SmolStr>,
    /// Zero-based line index.
    pub line_index: Option<usize>,
    /// Zero-based column index.
    pub column_index: Option<usize>,
}

impl SourceLocation {
    /// Location referencing a file as a whole.
    pub fn file(filename: impl Into<SmolStr>) -> Self {
        Self {
            filename: Some(filename.into()),
            line_index: None,
            column_index: None,
        }
    }

    /// Location referencing a line as a whole.
    pub fn line(filename: impl Into<SmolStr>, line_index: usize) -> Self {
        Self {
            filename: Some(filename.into()),
            line_index: Some(line_index),
            column_index: None,
        }
    }

    /// Location referencing a specific column in a line.
    pub fn column(filename: impl Into<SmolStr>, line_index: usize, column_index: usize) -> Self {
        Self {
            filename: Some(filename.into()),
            line_index: Some(line_index),
            column_index: Some(column_index),
        }
    }

    /// The same location with any column reference removed.
    pub fn to_line_location(&self) -> Self {
        Self {
            filename: self.filename.clone(),
            line_index: self.line_index,
            column_index: None,
        }
    }

    /// A location referencing a column in the line referenced by this location.
    pub fn to_column_location(&self, column_index: usize) -> Self {
        Self {
            filename: self.filename.clone(),
            line_index: self.line_index,
            column_index: Some(column_index),
        }
    }
}

/// Formats as `(filename, line N, column M)` with one-based line and column
/// numbers. Fields which are not applicable are omitted.
impl Display for SourceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        let mut written = false;
        if let Some(filename) = &self.filename {
            write!(f, "{}", filename)?;
            written = true;
        }
        if let Some(line_index) = self.line_index {
            if written {
                write!(f, ", ")?;
            }
            write!(f, "line {}", line_index + 1)?;
            written = true;
        }
        if let Some(column_index) = self.column_index {
            if written {
                write!(f, ", ")?;
            }
            write!(f, "column {}", column_index + 1)?;
        }
        write!(f, ")")
    }
}

/// A single diagnostic produced during assembly.
#[derive(Debug, Clone)]
pub struct LogMessage {
    level: LogLevel,
    location: Option<SourceLocation>,
    content: String,
}

impl LogMessage {
    pub fn new(level: LogLevel, location: Option<SourceLocation>, content: impl Into<String>) -> Self {
        Self {
            level,
            location,
            content: content.into(),
        }
    }

    pub fn info(location: SourceLocation, content: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, Some(location), content)
    }

    pub fn warning(location: SourceLocation, content: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, Some(location), content)
    }

    pub fn error(location: SourceLocation, content: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, Some(location), content)
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

impl Display for LogMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} {}:\n    {}", self.level, location, self.content),
            None => write!(f, "{}:\n    {}", self.level, self.content),
        }
    }
}

/// A log for keeping track of messages occurring during the assembly process,
/// whether during tokenizing, parsing, or resolution.
///
/// Once the number of errors passes [`max_error_count`](Self::max_error_count),
/// a final cutoff error is recorded and all further messages are dropped.
#[derive(Debug, Default)]
pub struct AssemblerLog {
    messages: Vec<LogMessage>,
    level_counts: [usize; 3],
    max_error_count: Option<usize>,
}

impl AssemblerLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all messages from the log.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.level_counts = [0; 3];
    }

    /// All logged messages, regardless of level, in chronological order.
    pub fn messages(&self) -> &[LogMessage] {
        &self.messages
    }

    /// Total number of logged messages, regardless of level.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Number of logged messages with the given level.
    pub fn level_count(&self, level: LogLevel) -> usize {
        self.level_counts[level as usize]
    }

    pub fn has_errors(&self) -> bool {
        self.level_count(LogLevel::Error) > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.level_count(LogLevel::Warning) > 0
    }

    /// Maximum number of errors which can be produced by a single assembler
    /// run, or `None` for no limit.
    pub fn max_error_count(&self) -> Option<usize> {
        self.max_error_count
    }

    pub fn set_max_error_count(&mut self, max_error_count: Option<usize>) {
        self.max_error_count = max_error_count;
    }

    /// Whether the number of errors logged exceeds the maximum error count,
    /// indicating that the assembler should exit as soon as possible.
    pub fn has_exceeded_max_error_count(&self) -> bool {
        match self.max_error_count {
            Some(max) => self.level_count(LogLevel::Error) > max,
            None => false,
        }
    }

    /// Log a message for the current assembler run. After this call, the newly
    /// logged message is the last message in chronological order.
    pub fn log(&mut self, message: LogMessage) {
        let mut message = message;
        if let Some(max) = self.max_error_count {
            let error_count = self.level_count(LogLevel::Error);
            if error_count >= max {
                // The cutoff message below must only be logged once.
                if error_count > max {
                    return;
                }
                message = LogMessage::new(
                    LogLevel::Error,
                    None,
                    "Maximum error count exceeded; halting assembly",
                );
            }
        }

        self.level_counts[message.level as usize] += 1;
        log::debug!("{}", message);
        self.messages.push(message);
    }

    pub fn log_info(&mut self, location: SourceLocation, content: impl Into<String>) {
        self.log(LogMessage::info(location, content));
    }

    pub fn log_warning(&mut self, location: SourceLocation, content: impl Into<String>) {
        self.log(LogMessage::warning(location, content));
    }

    pub fn log_error(&mut self, location: SourceLocation, content: impl Into<String>) {
        self.log(LogMessage::error(location, content));
    }
}
