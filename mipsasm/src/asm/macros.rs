//! Macro definition and expansion.
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use itertools::Itertools;
use smol_str::SmolStr;

use crate::diag::AssemblerLog;

use super::tokens::{SourceLine, Token, TokenKind};

/// A macro is identified by its name and parameter count, so variants with
/// different arities can coexist.
type MacroSignature = (SmolStr, usize);

/// A macro definition accumulated between `.macro` and `.end_macro`.
#[derive(Debug, Clone)]
pub struct Macro {
    name: SmolStr,
    parameters: Vec<Token>,
    lines: Vec<SourceLine>,
    labels: HashSet<SmolStr>,
}

impl Macro {
    pub fn new(name: impl Into<SmolStr>, parameters: Vec<Token>) -> Self {
        Macro {
            name: name.into(),
            parameters,
            lines: Vec::new(),
            labels: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn push_line(&mut self, line: SourceLine) {
        self.lines.push(line);
    }

    /// Record a label declared in the definition body. Returns false if the
    /// label was already recorded.
    pub fn add_label(&mut self, label: impl Into<SmolStr>) -> bool {
        self.labels.insert(label.into())
    }

    fn signature(&self) -> MacroSignature {
        (self.name.clone(), self.parameters.len())
    }

    fn parameter_index(&self, literal: &str) -> Option<usize> {
        self.parameters
            .iter()
            .position(|parameter| parameter.literal == literal)
    }
}

/// Stores macro definitions and expands calls into fresh source lines.
#[derive(Debug, Default)]
pub struct MacroHandler {
    macros: HashMap<MacroSignature, Rc<Macro>>,
    /// Instance counter used to give expanded labels unique names.
    next_instance_id: usize,
    /// Signatures currently being expanded, for cycle detection.
    expansion_stack: Vec<MacroSignature>,
}

impl MacroHandler {
    pub fn new() -> Self {
        MacroHandler::default()
    }

    /// Define a macro. A macro with the same name and parameter count
    /// replaces the previous definition.
    pub fn define_macro(&mut self, definition: Macro) {
        self.macros
            .insert(definition.signature(), Rc::new(definition));
    }

    pub fn find_matching_macro(&self, name: &str, argument_count: usize) -> Option<Rc<Macro>> {
        self.macros
            .get(&(SmolStr::new(name), argument_count))
            .cloned()
    }

    /// Extract the argument tokens of a macro call from the tokens following
    /// the call name. A trailing comment, one enclosing pair of parentheses
    /// and all delimiters are discarded.
    pub fn call_arguments(tokens: &[Token]) -> Vec<Token> {
        let mut arguments: Vec<&Token> = tokens.iter().collect();
        if matches!(arguments.last(), Some(token) if matches!(token.kind, TokenKind::Comment)) {
            arguments.pop();
        }
        if arguments.len() >= 2
            && matches!(arguments[0].kind, TokenKind::LeftParen)
            && matches!(arguments[arguments.len() - 1].kind, TokenKind::RightParen)
        {
            arguments.remove(0);
            arguments.pop();
        }
        arguments
            .into_iter()
            .filter(|token| !matches!(token.kind, TokenKind::Delimiter))
            .cloned()
            .collect()
    }

    /// Expand a macro call into fresh source lines placed at the call site.
    /// Parameters are replaced by the call arguments, and labels declared in
    /// the body are renamed per instance.
    pub fn instantiate(
        &mut self,
        definition: &Rc<Macro>,
        call_line: &SourceLine,
        arguments: &[Token],
        log: &mut AssemblerLog,
    ) -> Vec<SourceLine> {
        let signature = definition.signature();
        if self.expansion_stack.contains(&signature) {
            let first = self
                .expansion_stack
                .iter()
                .position(|entry| *entry == signature)
                .unwrap_or(0);
            let chain = self.expansion_stack[first..]
                .iter()
                .map(|(name, _)| name.as_str())
                .chain([definition.name()])
                .join(" -> ");
            log.log_error(
                call_line.location.clone(),
                format!("Recursive macro call detected: {}", chain),
            );
            return Vec::new();
        }

        self.expansion_stack.push(signature);
        let instance_id = self.next_instance_id;
        self.next_instance_id += 1;

        let mut instance_lines = Vec::with_capacity(definition.lines.len());
        for line in &definition.lines {
            let tokens = line
                .tokens
                .iter()
                .map(|token| {
                    self.substitute_token(definition, token, arguments, instance_id, call_line, log)
                })
                .collect();
            let mut instance =
                SourceLine::new(call_line.location.clone(), line.content.clone(), tokens);
            instance.original = Some(Box::new(line.clone()));
            instance_lines.push(instance);
        }

        // The body may itself call macros.
        let expanded = self.expand_nested_calls(instance_lines, log);

        self.expansion_stack.pop();
        expanded
    }

    fn substitute_token(
        &self,
        definition: &Rc<Macro>,
        token: &Token,
        arguments: &[Token],
        instance_id: usize,
        call_line: &SourceLine,
        log: &mut AssemblerLog,
    ) -> Token {
        match &token.kind {
            TokenKind::MacroParameter => {
                if let Some(index) = definition.parameter_index(&token.literal) {
                    return substituted_argument(&arguments[index], token, call_line);
                }
                log.log_error(
                    token.location.clone(),
                    format!("Undefined macro parameter '{}'", token.literal),
                );
                token.cloned_to(call_line.location.clone())
            }
            TokenKind::Identifier | TokenKind::Operator(_) => {
                if token.is_spim_style_parameter() {
                    if let Some(index) = definition.parameter_index(&token.literal) {
                        return substituted_argument(&arguments[index], token, call_line);
                    }
                }
                if definition.labels.contains(token.literal.as_str()) {
                    let literal = format!("{}_M{}", token.literal, instance_id);
                    let mut renamed =
                        Token::new(TokenKind::Identifier, literal, call_line.location.clone());
                    renamed.original = Some(Box::new(token.clone()));
                    return renamed;
                }
                token.cloned_to(call_line.location.clone())
            }
            _ => token.cloned_to(call_line.location.clone()),
        }
    }

    fn expand_nested_calls(
        &mut self,
        lines: Vec<SourceLine>,
        log: &mut AssemblerLog,
    ) -> Vec<SourceLine> {
        let mut expanded = Vec::with_capacity(lines.len());
        for line in lines {
            match self.find_call(&line) {
                Some((index, definition, arguments)) => {
                    let mut call_line = line;
                    call_line.tokens.truncate(index);
                    let instance = self.instantiate(&definition, &call_line, &arguments, log);
                    expanded.push(call_line);
                    expanded.extend(instance);
                }
                None => expanded.push(line),
            }
        }
        expanded
    }

    /// Find a macro call in the line: an identifier at the start of a
    /// statement whose following tokens match a known definition.
    fn find_call(&self, line: &SourceLine) -> Option<(usize, Rc<Macro>, Vec<Token>)> {
        for (index, token) in line.tokens.iter().enumerate() {
            let at_statement_start =
                index == 0 || matches!(line.tokens[index - 1].kind, TokenKind::Colon);
            if !at_statement_start || !matches!(token.kind, TokenKind::Identifier) {
                continue;
            }
            let arguments = MacroHandler::call_arguments(&line.tokens[index + 1..]);
            if let Some(definition) = self.find_matching_macro(&token.literal, arguments.len()) {
                return Some((index, definition, arguments));
            }
        }
        None
    }
}

/// Clone a call argument into the expansion, remembering the parameter
/// token it replaced.
fn substituted_argument(argument: &Token, parameter: &Token, call_line: &SourceLine) -> Token {
    let mut token = Token::new(
        argument.kind.clone(),
        argument.literal.clone(),
        call_line.location.clone(),
    );
    token.original = Some(Box::new(parameter.clone()));
    token
}
