//! Preprocessing: equivalences, file inclusion and macro definitions.
//!
//! The preprocessor sits between the lexer and the parser. Lines pass
//! through it as they are tokenized, so by the time the parser runs, macro
//! calls and `.include` directives have been replaced by the lines they
//! expand to, and `.eqv` equivalences have been substituted token by token.
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use smol_str::SmolStr;

use crate::diag::AssemblerLog;
use crate::isa::{Directive, InstructionSet};

use super::lexer;
use super::macros::{Macro, MacroHandler};
use super::tokens::{SourceLine, Token, TokenKind};

#[derive(Debug, Default)]
pub struct Preprocessor {
    equivalences: HashMap<SmolStr, Vec<Token>>,
    macro_handler: MacroHandler,
    /// Definition currently being accumulated, between `.macro` and
    /// `.end_macro`.
    current_macro: Option<Macro>,
    /// `.include` sites already expanded, keyed by including file and line,
    /// so an include cycle cannot recurse forever.
    known_include_locations: HashSet<(PathBuf, usize)>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Preprocessor::default()
    }

    pub fn in_macro_definition(&self) -> bool {
        self.current_macro.is_some()
    }

    pub fn current_macro_name(&self) -> Option<&str> {
        self.current_macro.as_ref().map(Macro::name)
    }

    /// Append a token to the destination, substituting its replacement
    /// tokens when an equivalence is defined for the identifier.
    pub fn process_token(&self, destination: &mut Vec<Token>, token: Token) {
        if matches!(token.kind, TokenKind::Identifier) {
            // The key position of a `.eqv` line is never substituted, or a
            // defined equivalence could not be mentioned there again.
            let defines_equivalence = matches!(
                destination.last(),
                Some(previous) if matches!(previous.kind, TokenKind::Directive(Directive::Eqv))
            );
            if !defines_equivalence {
                if let Some(replacement) = self.equivalences.get(token.literal.as_str()) {
                    for substituted in replacement {
                        destination.push(substituted.cloned_to(token.location.clone()));
                    }
                    return;
                }
            }
        }
        destination.push(token);
    }

    /// Process one tokenized line, appending the lines it expands to. Most
    /// lines pass through unchanged; lines holding preprocessor constructs
    /// are consumed, replaced or accumulated into a macro definition.
    pub fn process_line(
        &mut self,
        destination: &mut Vec<SourceLine>,
        line: SourceLine,
        isa: &InstructionSet,
        log: &mut AssemblerLog,
    ) {
        for index in 0..line.tokens.len() {
            let at_statement_start =
                index == 0 || matches!(line.tokens[index - 1].kind, TokenKind::Colon);

            // A macro call: an identifier at the start of a statement whose
            // arguments match a known definition.
            if self.current_macro.is_none()
                && at_statement_start
                && matches!(line.tokens[index].kind, TokenKind::Identifier)
            {
                let arguments = MacroHandler::call_arguments(&line.tokens[index + 1..]);
                if let Some(definition) = self
                    .macro_handler
                    .find_matching_macro(&line.tokens[index].literal, arguments.len())
                {
                    let mut call_line = line;
                    call_line.tokens.truncate(index);
                    let instance =
                        self.macro_handler
                            .instantiate(&definition, &call_line, &arguments, log);
                    self.emit(destination, call_line);
                    for instance_line in instance {
                        self.emit(destination, instance_line);
                    }
                    return;
                }
            }

            if matches!(line.tokens[index].kind, TokenKind::Directive(Directive::Include)) {
                let directive_location = line.tokens[index].location.clone();
                let filename = match line.tokens.get(index + 1) {
                    Some(Token { kind: TokenKind::String(value), .. }) => value.clone(),
                    Some(other) => {
                        log.log_error(
                            other.location.clone(),
                            "Directive '.include' expects a string filename",
                        );
                        continue;
                    }
                    None => {
                        log.log_error(
                            directive_location,
                            "Directive '.include' expects a string filename",
                        );
                        continue;
                    }
                };

                let including_path = absolute_path(Path::new(
                    line.location.filename.as_deref().unwrap_or(""),
                ));
                let line_index = line.location.line_index.unwrap_or(0);
                if !self
                    .known_include_locations
                    .insert((including_path.clone(), line_index))
                {
                    log.log_error(
                        directive_location,
                        "Recursive include detected at this directive",
                    );
                    continue;
                }

                // Included files are located relative to the including file.
                let include_path = match including_path.parent() {
                    Some(parent) => parent.join(filename.as_str()),
                    None => PathBuf::from(filename.as_str()),
                };
                let file = lexer::tokenize_file(&include_path, self, isa, log);

                if let Some(extra) = line.tokens[index + 2..]
                    .iter()
                    .find(|token| !matches!(token.kind, TokenKind::Comment))
                {
                    log.log_warning(
                        extra.location.clone(),
                        "Ignoring extra arguments to '.include'",
                    );
                }

                let mut outer_line = line;
                outer_line.tokens.truncate(index);
                self.emit(destination, outer_line);
                for included in file.lines {
                    self.emit(destination, included);
                }
                return;
            }

            if matches!(line.tokens[index].kind, TokenKind::Directive(Directive::Eqv)) {
                if line.tokens.len() < index + 3 {
                    log.log_error(
                        line.tokens[index].location.clone(),
                        "Directive '.eqv' requires an identifier followed by replacement",
                    );
                    continue;
                }
                if !matches!(line.tokens[index + 1].kind, TokenKind::Identifier) {
                    log.log_error(
                        line.tokens[index + 1].location.clone(),
                        format!(
                            "Directive '.eqv' expected an identifier, got: {}",
                            line.tokens[index + 1]
                        ),
                    );
                    continue;
                }
                let key = line.tokens[index + 1].literal.clone();
                if self.equivalences.contains_key(&key) {
                    // The first definition wins.
                    log.log_warning(
                        line.tokens[index + 1].location.clone(),
                        format!("The equivalence '{}' has already been defined", key),
                    );
                } else {
                    let replacement: Vec<Token> = line.tokens[index + 2..]
                        .iter()
                        .filter(|token| !matches!(token.kind, TokenKind::Comment))
                        .cloned()
                        .collect();
                    self.equivalences.insert(key, replacement);
                }
                let mut directive_line = line;
                directive_line.tokens.truncate(index);
                self.emit(destination, directive_line);
                return;
            }

            if self.current_macro.is_some() {
                // Labels declared in the body are renamed per expansion.
                if at_statement_start
                    && matches!(
                        line.tokens[index].kind,
                        TokenKind::Identifier | TokenKind::Operator(_)
                    )
                    && matches!(
                        line.tokens.get(index + 1),
                        Some(token) if matches!(token.kind, TokenKind::Colon)
                    )
                {
                    let literal = line.tokens[index].literal.clone();
                    let location = line.tokens[index].location.clone();
                    if let Some(current) = self.current_macro.as_mut() {
                        if !current.add_label(literal.clone()) {
                            log.log_error(
                                location,
                                format!(
                                    "Label '{}' has already been used in this macro definition",
                                    literal
                                ),
                            );
                        }
                    }
                    continue;
                }

                if matches!(line.tokens[index].kind, TokenKind::Directive(Directive::EndMacro)) {
                    if let Some(extra) = line.tokens[index + 1..]
                        .iter()
                        .find(|token| !matches!(token.kind, TokenKind::Comment))
                    {
                        log.log_warning(
                            extra.location.clone(),
                            "Ignoring extra content following '.end_macro'",
                        );
                    }
                    let mut body_line = line;
                    body_line.tokens.truncate(index);
                    if let Some(mut finished) = self.current_macro.take() {
                        finished.push_line(body_line);
                        self.macro_handler.define_macro(finished);
                    }
                    return;
                }

                if matches!(line.tokens[index].kind, TokenKind::Directive(Directive::Macro)) {
                    log.log_error(
                        line.tokens[index].location.clone(),
                        "Nested macro definitions are not permitted",
                    );
                    continue;
                }
            } else {
                if matches!(line.tokens[index].kind, TokenKind::Directive(Directive::Macro)) {
                    let name = match line.tokens.get(index + 1) {
                        Some(token) if matches!(token.kind, TokenKind::Identifier) => {
                            token.literal.clone()
                        }
                        Some(other) => {
                            log.log_error(
                                other.location.clone(),
                                format!("Directive '.macro' expected a macro name, got: {}", other),
                            );
                            continue;
                        }
                        None => {
                            log.log_error(
                                line.tokens[index].location.clone(),
                                "Directive '.macro' requires a macro name followed by the list \
                                 of macro parameters, if any",
                            );
                            continue;
                        }
                    };

                    let mut parameters = Vec::new();
                    for token in &line.tokens[index + 2..] {
                        match token.kind {
                            TokenKind::MacroParameter => parameters.push(token.clone()),
                            TokenKind::Delimiter
                            | TokenKind::LeftParen
                            | TokenKind::RightParen
                            | TokenKind::Comment => {}
                            _ if token.is_spim_style_parameter() => parameters.push(token.clone()),
                            _ => log.log_error(
                                token.location.clone(),
                                format!(
                                    "Directive '.macro' expected a macro parameter, got: {}",
                                    token
                                ),
                            ),
                        }
                    }
                    self.current_macro = Some(Macro::new(name, parameters));
                    return;
                }

                if matches!(line.tokens[index].kind, TokenKind::Directive(Directive::EndMacro)) {
                    log.log_error(
                        line.tokens[index].location.clone(),
                        "Directive '.end_macro' must follow '.macro'",
                    );
                    continue;
                }
            }
        }

        self.emit(destination, line);
    }

    /// Lines accumulate into the open macro definition when one exists.
    fn emit(&mut self, destination: &mut Vec<SourceLine>, line: SourceLine) {
        match self.current_macro.as_mut() {
            Some(current) => current.push_line(line),
            None => destination.push(line),
        }
    }
}

/// Absolutize a path without touching the filesystem, so include guards
/// work for sources that were never read from disk.
fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(current) => current.join(path),
            Err(_) => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::isa::InstructionSet;

    fn process(source: &str) -> (Vec<SourceLine>, AssemblerLog) {
        let isa = InstructionSet::standard().expect("standard instruction set");
        let mut log = AssemblerLog::new();
        let mut preprocessor = Preprocessor::new();
        let file = lexer::tokenize("test.asm", source, &mut preprocessor, &isa, &mut log);
        (file.lines, log)
    }

    fn statement_lines(lines: &[SourceLine]) -> Vec<&SourceLine> {
        lines.iter().filter(|line| !line.tokens.is_empty()).collect()
    }

    #[test]
    fn test_eqv_substitution() {
        let (lines, log) = process(".eqv LIMIT 10\nadd $t0, $t0, LIMIT");
        assert_eq!(log.message_count(), 0);

        let statements = statement_lines(&lines);
        assert_eq!(statements.len(), 1);
        let token = &statements[0].tokens[5];
        assert!(matches!(token.kind, TokenKind::IntegerU5(10)));
        assert_eq!(token.literal, "10");
        // The substituted token remembers where it was written.
        assert_eq!(token.location.line_index, Some(1));
    }

    #[test]
    fn test_eqv_first_definition_wins() {
        let (lines, log) = process(".eqv X 1\n.eqv X 2\nadd $t0, $t0, X");
        assert_eq!(log.level_count(crate::diag::LogLevel::Warning), 1);
        assert!(log.messages()[0]
            .content()
            .contains("The equivalence 'X' has already been defined"));

        let statements = statement_lines(&lines);
        assert!(matches!(statements[0].tokens[5].kind, TokenKind::IntegerU3(1)));
    }

    #[test]
    fn test_eqv_requires_identifier() {
        let (_, log) = process(".eqv 5 10");
        assert!(log.has_errors());
        assert!(log.messages()[0]
            .content()
            .contains("Directive '.eqv' expected an identifier, got: 5"));
    }

    #[test]
    fn test_macro_expansion() {
        const CODE: &str = "\
.macro push (%reg)
addi $sp, $sp, -4
sw %reg, 0($sp)
.end_macro
push $t0
";
        let (lines, log) = process(CODE);
        assert_eq!(log.message_count(), 0, "{:?}", log.messages());

        let statements = statement_lines(&lines);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].tokens[0].literal, "addi");
        // The parameter is replaced by the call argument.
        assert_eq!(statements[1].tokens[1].literal, "$t0");
        assert!(matches!(statements[1].tokens[1].kind, TokenKind::RegisterName(8)));
    }

    #[test]
    fn test_spim_style_parameters() {
        const CODE: &str = "\
.macro inc2 ($x)
addi $x, $x, 2
.end_macro
inc2 $s0
";
        let (lines, log) = process(CODE);
        assert_eq!(log.message_count(), 0, "{:?}", log.messages());

        let statements = statement_lines(&lines);
        assert_eq!(statements[0].tokens[1].literal, "$s0");
    }

    #[test]
    fn test_macro_labels_renamed_per_instance() {
        const CODE: &str = "\
.macro delay
loop: addi $t0, $t0, -1
bne $t0, $zero, loop
.end_macro
delay
delay
";
        let (lines, log) = process(CODE);
        assert_eq!(log.message_count(), 0, "{:?}", log.messages());

        let literals: Vec<&str> = lines
            .iter()
            .flat_map(|line| line.tokens.iter())
            .map(|token| token.literal.as_str())
            .collect();
        assert_eq!(literals.iter().filter(|l| **l == "loop_M0").count(), 2);
        assert_eq!(literals.iter().filter(|l| **l == "loop_M1").count(), 2);
        assert!(!literals.contains(&"loop"));
    }

    #[test]
    fn test_duplicate_macro_label() {
        const CODE: &str = "\
.macro twice
here: sll $zero, $zero, 0
here: sll $zero, $zero, 0
.end_macro
";
        let (_, log) = process(CODE);
        assert!(log.has_errors());
        assert!(log.messages()[0]
            .content()
            .contains("Label 'here' has already been used in this macro definition"));
    }

    #[test]
    fn test_wrong_arity_call_left_alone() {
        const CODE: &str = "\
.macro push (%reg)
sw %reg, 0($sp)
.end_macro
push
";
        let (lines, log) = process(CODE);
        assert_eq!(log.message_count(), 0);

        // No matching definition, so the line passes through untouched.
        let statements = statement_lines(&lines);
        assert_eq!(statements.len(), 1);
        assert!(matches!(statements[0].tokens[0].kind, TokenKind::Identifier));
        assert_eq!(statements[0].tokens[0].literal, "push");
    }

    #[test]
    fn test_nested_macro_definition() {
        let (_, log) = process(".macro a\n.macro b\n.end_macro");
        assert!(log.has_errors());
        assert!(log.messages()[0]
            .content()
            .contains("Nested macro definitions are not permitted"));
    }

    #[test]
    fn test_stray_end_macro() {
        let (_, log) = process(".end_macro");
        assert!(log.has_errors());
        assert!(log.messages()[0]
            .content()
            .contains("Directive '.end_macro' must follow '.macro'"));
    }

    #[test]
    fn test_recursive_macro_call() {
        const CODE: &str = "\
.macro forever
forever
.end_macro
forever
";
        let (_, log) = process(CODE);
        assert!(log.has_errors());
        assert!(log.messages()[0]
            .content()
            .contains("Recursive macro call detected: forever -> forever"));
    }

    #[test]
    fn test_include_requires_string() {
        let (_, log) = process(".include foo");
        assert!(log.has_errors());
        assert!(log.messages()[0]
            .content()
            .contains("Directive '.include' expects a string filename"));
    }

    #[test]
    fn test_missing_include_file() {
        let (lines, log) = process(".include \"definitely_not_a_real_file.asm\"");
        assert!(log.has_errors());
        assert!(log.messages()[0].content().contains("Unable to read file"));
        // The directive line is still consumed.
        assert!(statement_lines(&lines).is_empty());
    }

    #[test]
    fn test_label_before_macro_call() {
        const CODE: &str = "\
.macro nothing
sll $zero, $zero, 0
.end_macro
start: nothing
";
        let (lines, log) = process(CODE);
        assert_eq!(log.message_count(), 0, "{:?}", log.messages());

        let statements = statement_lines(&lines);
        // The label stays on the truncated call line.
        assert_eq!(statements[0].tokens[0].literal, "start");
        assert!(matches!(statements[0].tokens[1].kind, TokenKind::Colon));
        assert_eq!(statements[1].tokens[0].literal, "sll");
    }
}
