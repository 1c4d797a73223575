//! Diagnostic rendering and warning configuration.
//!
//! Diagnostics are built up line by line so every error and warning can
//! show the offending source excerpt with a caret run underneath it.
//! Warning behavior is controlled per category through
//! `-- @vela_warnings:` comment directives, which stack in source order
//! and govern all tokens that begin after them.

use crate::error::CompileError;
use crate::lexer::RawWarnDirective;
use crate::token::Span;
use serde::Serialize;
use std::fmt;

/// Warning categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    VarShadow,
    GlobalShadow,
    FieldShadow,
    TypeMismatch,
    UnknownType,
    UnreachableCode,
    ExcessiveArguments,
    DiscardedReturn,
    ImplicitGlobal,
    Deprecated,
    NonPortable,
}

impl WarningKind {
    pub const COUNT: usize = 11;

    pub const ALL: [WarningKind; WarningKind::COUNT] = [
        WarningKind::VarShadow,
        WarningKind::GlobalShadow,
        WarningKind::FieldShadow,
        WarningKind::TypeMismatch,
        WarningKind::UnknownType,
        WarningKind::UnreachableCode,
        WarningKind::ExcessiveArguments,
        WarningKind::DiscardedReturn,
        WarningKind::ImplicitGlobal,
        WarningKind::Deprecated,
        WarningKind::NonPortable,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WarningKind::VarShadow => "var-shadow",
            WarningKind::GlobalShadow => "global-shadow",
            WarningKind::FieldShadow => "field-shadow",
            WarningKind::TypeMismatch => "type-mismatch",
            WarningKind::UnknownType => "unknown-type",
            WarningKind::UnreachableCode => "unreachable-code",
            WarningKind::ExcessiveArguments => "excessive-arguments",
            WarningKind::DiscardedReturn => "discarded-return",
            WarningKind::ImplicitGlobal => "implicit-global",
            WarningKind::Deprecated => "deprecated",
            WarningKind::NonPortable => "non-portable",
        }
    }

    pub fn from_name(name: &str) -> Option<WarningKind> {
        WarningKind::ALL.iter().copied().find(|k| k.name() == name)
    }

    fn index(self) -> usize {
        WarningKind::ALL
            .iter()
            .position(|k| *k == self)
            .unwrap_or(0)
    }

    /// `non-portable` is opt-in; every other category starts enabled.
    fn default_state(self) -> WarnState {
        match self {
            WarningKind::NonPortable => WarnState::Off,
            _ => WarnState::On,
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What happens when a warning of some category fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnState {
    Off,
    On,
    /// Escalate to a compile error.
    Error,
}

/// Per-category warning states at one point in the chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct WarningConfig {
    states: [WarnState; WarningKind::COUNT],
}

impl Default for WarningConfig {
    fn default() -> Self {
        let mut states = [WarnState::On; WarningKind::COUNT];
        for kind in WarningKind::ALL {
            states[kind.index()] = kind.default_state();
        }
        Self { states }
    }
}

impl WarningConfig {
    pub fn get(&self, kind: WarningKind) -> WarnState {
        self.states[kind.index()]
    }

    pub fn set(&mut self, kind: WarningKind, state: WarnState) {
        self.states[kind.index()] = state;
    }

    pub fn set_all(&mut self, state: WarnState) {
        self.states = [state; WarningKind::COUNT];
    }
}

/// The stack of warning configurations for a chunk, keyed by the byte
/// offset of the directive that introduced each one.
#[derive(Debug, Default)]
pub struct WarningMap {
    entries: Vec<(usize, WarningConfig)>,
    base: WarningConfig,
    /// Lines fully silenced by a `disable-next` on the line above.
    suppressed_lines: Vec<u32>,
}

impl WarningMap {
    pub fn build(directives: &[RawWarnDirective]) -> WarningMap {
        WarningMap::build_with_base(directives, WarningConfig::default())
    }

    /// Like [`WarningMap::build`], starting from host-supplied default
    /// states instead of the built-in ones.
    pub fn build_with_base(directives: &[RawWarnDirective], base: WarningConfig) -> WarningMap {
        let mut map = WarningMap {
            base: base.clone(),
            ..WarningMap::default()
        };
        let mut current = base;
        for directive in directives {
            let mut changed = false;
            for item in directive
                .text
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
            {
                if item == "disable-next" {
                    map.suppressed_lines.push(directive.line + 1);
                    continue;
                }
                let (state, name) = if let Some(rest) = item.strip_prefix("enable-") {
                    (WarnState::On, rest)
                } else if let Some(rest) = item.strip_prefix("disable-") {
                    (WarnState::Off, rest)
                } else if let Some(rest) = item.strip_prefix("error-") {
                    (WarnState::Error, rest)
                } else {
                    continue;
                };
                if name == "all" {
                    current.set_all(state);
                    changed = true;
                } else if let Some(kind) = WarningKind::from_name(name) {
                    current.set(kind, state);
                    changed = true;
                }
            }
            if changed {
                map.entries.push((directive.offset, current.clone()));
            }
        }
        map.suppressed_lines.sort_unstable();
        map
    }

    /// The configuration in effect for a token beginning at `offset`.
    pub fn config_at(&self, offset: usize) -> &WarningConfig {
        match self
            .entries
            .iter()
            .rev()
            .find(|(at, _)| *at < offset)
        {
            Some((_, config)) => config,
            None => &self.base,
        }
    }

    pub fn is_line_suppressed(&self, line: u32) -> bool {
        self.suppressed_lines.binary_search(&line).is_ok()
    }
}

/// A warning produced during compilation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub line: u32,
    pub column: u32,
    /// Fully rendered text, including the source excerpt.
    pub message: String,
}

/// Incremental builder for a multi-line diagnostic.
///
/// The layout is one header line followed by an optional source excerpt
/// with a caret run, followed by optional notes:
///
/// ```text
/// chunk.vela:3: bad thing happened
///     3 | local x = y
///       |           ^ here: while reading this
/// note: a helpful remark
/// ```
pub struct ErrorMessage<'src> {
    source: &'src str,
    chunk_name: &'src str,
    buf: String,
}

impl<'src> ErrorMessage<'src> {
    pub fn new(source: &'src str, chunk_name: &'src str) -> Self {
        Self {
            source,
            chunk_name,
            buf: String::new(),
        }
    }

    pub fn add_msg(mut self, line: u32, msg: &str) -> Self {
        self.buf
            .push_str(&format!("{}:{}: {}", self.chunk_name, line, msg));
        self
    }

    /// Appends the full source line the span starts on.
    pub fn add_src_line(mut self, span: Span) -> Self {
        let text = self.line_text(span);
        self.buf
            .push_str(&format!("\n    {} | {}", span.line, text));
        self
    }

    /// Appends a caret run under the span, with `here: <msg>` after it.
    pub fn add_here(mut self, span: Span, msg: &str) -> Self {
        self.push_carets(span);
        self.buf.push_str(" here: ");
        self.buf.push_str(msg);
        self
    }

    /// Appends a bare caret run under the span.
    pub fn add_carets(mut self, span: Span) -> Self {
        self.push_carets(span);
        self
    }

    pub fn add_note(mut self, msg: &str) -> Self {
        self.buf.push_str("\nnote: ");
        self.buf.push_str(msg);
        self
    }

    pub fn finish(self) -> String {
        self.buf
    }

    fn line_text(&self, span: Span) -> &'src str {
        let start = self.source[..span.start]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let end = self.source[span.start..]
            .find('\n')
            .map(|i| span.start + i)
            .unwrap_or(self.source.len());
        self.source[start..end].trim_end_matches('\r')
    }

    fn push_carets(&mut self, span: Span) {
        let gutter = count_digits(span.line) + 4;
        self.buf.push('\n');
        for _ in 0..gutter {
            self.buf.push(' ');
        }
        self.buf.push_str(" | ");
        for _ in 1..span.column {
            self.buf.push(' ');
        }
        let width = self
            .line_text(span)
            .len()
            .saturating_sub(span.column as usize - 1)
            .min(span.len())
            .max(1);
        for _ in 0..width {
            self.buf.push('^');
        }
    }
}

fn count_digits(mut n: u32) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Collects warnings for a chunk and applies the directive
/// configuration, including `disable-next` suppression and escalation
/// to errors.
pub struct Reporter<'src> {
    source: &'src str,
    chunk_name: &'src str,
    map: WarningMap,
    warnings: Vec<Warning>,
}

impl<'src> Reporter<'src> {
    pub fn new(source: &'src str, chunk_name: &'src str, map: WarningMap) -> Self {
        Self {
            source,
            chunk_name,
            map,
            warnings: Vec::new(),
        }
    }

    pub fn message(&self) -> ErrorMessage<'src> {
        ErrorMessage::new(self.source, self.chunk_name)
    }

    /// Renders a syntax error at `span`.
    pub fn syntax_error(&self, span: Span, msg: &str, here: &str) -> CompileError {
        let message = self
            .message()
            .add_msg(span.line, msg)
            .add_src_line(span)
            .add_here(span, here)
            .finish();
        CompileError::Syntax {
            message,
            line: span.line,
            column: span.column,
        }
    }

    /// Same rendering as [`Reporter::syntax_error`], for source that
    /// parses but breaks a scoping or mutability rule.
    pub fn semantic_error(&self, span: Span, msg: &str, here: &str) -> CompileError {
        let message = self
            .message()
            .add_msg(span.line, msg)
            .add_src_line(span)
            .add_here(span, here)
            .finish();
        CompileError::Semantic {
            message,
            line: span.line,
            column: span.column,
        }
    }

    /// Reports a warning at `span`. Returns an error when the category
    /// is escalated by a directive.
    pub fn warn(
        &mut self,
        kind: WarningKind,
        span: Span,
        msg: &str,
        here: &str,
    ) -> Result<(), CompileError> {
        let state = self.map.config_at(span.start).get(kind);
        if state == WarnState::Off || self.map.is_line_suppressed(span.line) {
            return Ok(());
        }

        let severity = if state == WarnState::Error {
            "error"
        } else {
            "warning"
        };
        let headline = format!("{}: {} [-W{}]", severity, msg, kind.name());
        let message = self
            .message()
            .add_msg(span.line, &headline)
            .add_src_line(span)
            .add_here(span, here)
            .finish();

        if state == WarnState::Error {
            return Err(CompileError::EscalatedWarning {
                message,
                line: span.line,
                column: span.column,
            });
        }
        self.warnings.push(Warning {
            kind,
            line: span.line,
            column: span.column,
            message,
        });
        Ok(())
    }

    /// Like [`warn`], with an extra note line.
    pub fn warn_with_note(
        &mut self,
        kind: WarningKind,
        span: Span,
        msg: &str,
        here: &str,
        note: &str,
    ) -> Result<(), CompileError> {
        let state = self.map.config_at(span.start).get(kind);
        if state == WarnState::Off || self.map.is_line_suppressed(span.line) {
            return Ok(());
        }

        let severity = if state == WarnState::Error {
            "error"
        } else {
            "warning"
        };
        let headline = format!("{}: {} [-W{}]", severity, msg, kind.name());
        let message = self
            .message()
            .add_msg(span.line, &headline)
            .add_src_line(span)
            .add_here(span, here)
            .add_note(note)
            .finish();

        if state == WarnState::Error {
            return Err(CompileError::EscalatedWarning {
                message,
                line: span.line,
                column: span.column,
            });
        }
        self.warnings.push(Warning {
            kind,
            line: span.line,
            column: span.column,
            message,
        });
        Ok(())
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn map_for(source: &str) -> WarningMap {
        let output = Lexer::new(source).tokenize().unwrap();
        WarningMap::build(&output.warn_directives)
    }

    #[test]
    fn default_config_enables_everything_but_non_portable() {
        let config = WarningConfig::default();
        assert_eq!(config.get(WarningKind::VarShadow), WarnState::On);
        assert_eq!(config.get(WarningKind::NonPortable), WarnState::Off);
    }

    #[test]
    fn directives_stack_in_source_order() {
        let map = map_for(
            "x = 1\n-- @vela_warnings: disable-var-shadow\ny = 2\n-- @vela_warnings: enable-var-shadow\nz = 3",
        );
        assert_eq!(map.config_at(0).get(WarningKind::VarShadow), WarnState::On);
        assert_eq!(
            map.config_at(40).get(WarningKind::VarShadow),
            WarnState::Off
        );
        assert_eq!(
            map.config_at(100).get(WarningKind::VarShadow),
            WarnState::On
        );
    }

    #[test]
    fn error_directive_escalates() {
        let map = map_for("-- @vela_warnings: error-unreachable-code\nx = 1");
        assert_eq!(
            map.config_at(50).get(WarningKind::UnreachableCode),
            WarnState::Error
        );
    }

    #[test]
    fn disable_all_turns_everything_off() {
        let map = map_for("-- @vela_warnings: disable-all\nx = 1");
        for kind in WarningKind::ALL {
            assert_eq!(map.config_at(40).get(kind), WarnState::Off);
        }
    }

    #[test]
    fn disable_next_suppresses_the_following_line() {
        let map = map_for("-- @vela_warnings: disable-next\nx = 1\ny = 2");
        assert!(map.is_line_suppressed(2));
        assert!(!map.is_line_suppressed(3));
    }

    #[test]
    fn error_message_layout() {
        let source = "local x = y";
        let span = Span::new(10, 11, 1, 11);
        let text = ErrorMessage::new(source, "test.vela")
            .add_msg(1, "unknown thing")
            .add_src_line(span)
            .add_here(span, "this one")
            .add_note("try something else")
            .finish();
        assert_eq!(
            text,
            "test.vela:1: unknown thing\n    1 | local x = y\n      |           ^ here: this one\nnote: try something else"
        );
    }

    #[test]
    fn reporter_collects_and_escalates() {
        let source = "-- @vela_warnings: error-deprecated\nfoo()";
        let map = map_for(source);
        let mut reporter = Reporter::new(source, "test.vela", map);
        let span = Span::new(36, 39, 2, 1);
        assert!(reporter
            .warn(WarningKind::VarShadow, span, "shadowed", "here")
            .is_ok());
        assert!(reporter
            .warn(WarningKind::Deprecated, span, "deprecated thing", "here")
            .is_err());
        assert_eq!(reporter.into_warnings().len(), 1);
    }
}
