//! Vela Compiler - Source to Bytecode
//!
//! Scanner, keyword-compatibility resolver, and single-pass compiler
//! that turns Vela source text into register-machine bytecode.

pub mod codegen;
pub mod diag;
pub mod error;
pub mod keywords;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod typehint;

pub use diag::{WarnState, Warning, WarningConfig, WarningKind};
pub use error::{CompileError, CompileResult};
pub use keywords::{resolve_keywords, KeywordState};
pub use lexer::{LexError, Lexer};
pub use parser::Parser;
pub use token::{Span, ToggledWord, Token};
pub use typehint::{PrimType, TypeHint};

pub use vela_bytecode::Proto;

use diag::{Reporter, WarningMap};
use rustc_hash::FxHashMap;

/// Host-side knobs for one compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Per-word keyword defaults set by the embedding host, applied
    /// before any directive in the chunk itself.
    pub keyword_overrides: FxHashMap<ToggledWord, bool>,
    /// Per-category default warning states; `@vela_warnings` directives
    /// in the chunk still override these from their position onward.
    pub warning_defaults: Vec<(WarningKind, WarnState)>,
}

impl CompileOptions {
    pub fn with_keyword(mut self, word: ToggledWord, enabled: bool) -> Self {
        self.keyword_overrides.insert(word, enabled);
        self
    }

    pub fn with_warning(mut self, kind: WarningKind, state: WarnState) -> Self {
        self.warning_defaults.push((kind, state));
        self
    }
}

/// Result of a successful compilation.
#[derive(Debug)]
pub struct CompileOutput {
    /// The chunk's top-level function.
    pub proto: Proto,
    /// Warnings emitted during scanning and compilation, in source order.
    pub warnings: Vec<Warning>,
}

/// Compiles one chunk of Vela source into bytecode.
///
/// `chunk_name` appears in diagnostics and in the emitted prototype's
/// debug information.
pub fn compile(
    source: &str,
    chunk_name: &str,
    options: &CompileOptions,
) -> CompileResult<CompileOutput> {
    let scan = Lexer::new(source).tokenize().map_err(|errors| {
        let first = errors
            .into_iter()
            .next()
            .unwrap_or_else(|| unreachable!());
        let span = first.span();
        let message = diag::ErrorMessage::new(source, chunk_name)
            .add_msg(span.line, &format!("error: {}", first))
            .add_src_line(span)
            .add_carets(span)
            .finish();
        CompileError::Lexical {
            message,
            line: span.line,
            column: span.column,
        }
    })?;

    let mut base = WarningConfig::default();
    for (kind, state) in &options.warning_defaults {
        base.set(*kind, *state);
    }
    let map = WarningMap::build_with_base(&scan.warn_directives, base);
    let mut reporter = Reporter::new(source, chunk_name, map);
    let mut tokens = scan.tokens;
    let states = resolve_keywords(&mut tokens, &options.keyword_overrides, &mut reporter)?;
    let (proto, warnings) = Parser::new(tokens, chunk_name, reporter, states).parse()?;
    Ok(CompileOutput { proto, warnings })
}
