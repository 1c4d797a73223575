//! Lexer for the Vela programming language.
//!
//! This module implements the scanner using the logos library. It converts
//! source code into a stream of tokens with precise source location
//! information. Comment directives (`@vela_use`, `@vela_warnings`) are
//! surfaced here so later passes never have to re-scan comment text.

use crate::token::{AugOp, Span, Token};
use logos::{FilterResult, Logos};
use unicode_xid::UnicodeXID;

/// A `-- @vela_warnings: ...` directive captured during scanning.
///
/// `offset` is the byte position of the comment opener; the directive
/// governs tokens that begin after it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWarnDirective {
    pub offset: usize,
    pub line: u32,
    pub text: String,
}

/// Mutable state threaded through logos callbacks.
#[derive(Debug, Default)]
pub struct LexExtras {
    warn_directives: Vec<(usize, String)>,
}

/// Error detail produced inside logos callbacks, before span
/// information is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ScanErrorKind {
    #[default]
    Unexpected,
    UnterminatedString,
    UnterminatedLongString,
    UnterminatedComment,
    InvalidLongStringDelimiter,
    InvalidEscape,
    MalformedNumber,
}

/// A numeral before integer/float classification is folded into the
/// public token type.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Numeral {
    Int(i64),
    Float(f64),
}

/// Logos-based token enum for lexing.
///
/// This enum is used internally by logos for efficient tokenization.
/// It's converted to our main Token enum after lexing.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(extras = LexExtras)]
#[logos(error = ScanErrorKind)]
enum LogosToken {
    // Whitespace (skip)
    #[regex(r"[ \t\r\n\x0B\x0C]+", logos::skip)]
    Whitespace,

    // Comments. Plain comments are skipped; `-- @vela_use` comments are
    // surfaced as a directive token carrying the text after the marker.
    #[token("--", lex_comment)]
    UseAnnotation(String),

    // Keywords (must come before identifiers)
    #[token("and")]
    And,

    #[token("break")]
    Break,

    #[token("do")]
    Do,

    #[token("else")]
    Else,

    #[token("elseif")]
    Elseif,

    #[token("end")]
    End,

    #[token("false")]
    False,

    #[token("for")]
    For,

    #[token("function")]
    Function,

    #[token("goto")]
    Goto,

    #[token("if")]
    If,

    #[token("in")]
    In,

    #[token("local")]
    Local,

    #[token("nil")]
    Nil,

    #[token("not")]
    Not,

    #[token("or")]
    Or,

    #[token("repeat")]
    Repeat,

    #[token("return")]
    Return,

    #[token("then")]
    Then,

    #[token("true")]
    True,

    #[token("until")]
    Until,

    #[token("while")]
    While,

    // Togglable extension keywords. These are always lexed as keywords;
    // the compatibility resolver rewrites them back to identifiers when
    // the word is disabled for the chunk.
    #[token("switch")]
    Switch,

    #[token("continue")]
    Continue,

    #[token("enum")]
    Enum,

    #[token("class")]
    Class,

    #[token("parent")]
    Parent,

    #[token("export")]
    Export,

    #[token("global")]
    Global,

    #[token("vela_switch")]
    VelaSwitch,

    #[token("vela_continue")]
    VelaContinue,

    #[token("vela_enum")]
    VelaEnum,

    #[token("vela_class")]
    VelaClass,

    #[token("vela_parent")]
    VelaParent,

    #[token("vela_export")]
    VelaExport,

    #[token("vela_global")]
    VelaGlobal,

    #[token("let")]
    Let,

    #[token("const")]
    Const,

    #[token("vela_use")]
    Use,

    // Identifiers. The regex covers the ASCII start; the callback
    // extends the match over Unicode continuation characters.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", lex_identifier)]
    Identifier(String),

    // Literals
    #[regex(
        r"0[xX][0-9a-fA-F_]*\.?[0-9a-fA-F_]*([pP][+-]?[0-9_]+)?",
        lex_hex_numeral
    )]
    #[regex(r"[0-9][0-9_]*(\.[0-9_]*)?([eE][+-]?[0-9_]+)?", lex_dec_numeral)]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9_]+)?", lex_dec_numeral)]
    Numeral(Numeral),

    #[token("\"", |lex| lex_short_string(lex, '"'))]
    #[token("'", |lex| lex_short_string(lex, '\''))]
    StringLiteral(String),

    #[regex(r"\[=*\[", lex_long_string)]
    #[regex(r"\[=+", lex_broken_long_bracket)]
    LongString(String),

    // Compound assignment (must come before the shorter operators)
    #[token("+=")]
    PlusEqual,

    #[token("-=")]
    MinusEqual,

    #[token("*=")]
    StarEqual,

    #[token("/=")]
    SlashEqual,

    #[token("//=")]
    SlashSlashEqual,

    #[token("%=")]
    PercentEqual,

    #[token("^=")]
    CaretEqual,

    #[token("**=")]
    StarStarEqual,

    #[token("..=")]
    DotDotEqual,

    #[token("<<=")]
    LessLessEqual,

    #[token(">>=")]
    GreaterGreaterEqual,

    #[token("&=")]
    AmpEqual,

    #[token("|=")]
    PipeEqual,

    // Multi-character operators
    #[token("==")]
    EqualEqual,

    #[token("~=")]
    TildeEqual,

    #[token("!=")]
    BangEqual,

    #[token("<=")]
    LessEqual,

    #[token(">=")]
    GreaterEqual,

    #[token("<<")]
    LessLess,

    #[token(">>")]
    GreaterGreater,

    #[token("//")]
    SlashSlash,

    #[token("**")]
    StarStar,

    #[token("...")]
    DotDotDot,

    #[token("..")]
    DotDot,

    #[token("::")]
    ColonColon,

    // Single-character tokens
    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("^")]
    Caret,

    #[token("#")]
    Hash,

    #[token("&")]
    Amp,

    #[token("~")]
    Tilde,

    #[token("|")]
    Pipe,

    #[token("!")]
    Bang,

    #[token("<")]
    Less,

    #[token(">")]
    Greater,

    #[token("=")]
    Equal,

    #[token("(")]
    LeftParen,

    #[token(")")]
    RightParen,

    #[token("{")]
    LeftBrace,

    #[token("}")]
    RightBrace,

    #[token("[")]
    LeftBracket,

    #[token("]")]
    RightBracket,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,

    #[token("?")]
    Question,
}

// Helper parsing functions

fn lex_identifier(lex: &mut logos::Lexer<LogosToken>) -> String {
    let mut extra = 0;
    for c in lex.remainder().chars() {
        if UnicodeXID::is_xid_continue(c) {
            extra += c.len_utf8();
        } else {
            break;
        }
    }
    if extra > 0 {
        lex.bump(extra);
    }
    lex.slice().to_owned()
}

fn lex_comment(lex: &mut logos::Lexer<LogosToken>) -> FilterResult<String, ScanErrorKind> {
    let rem = lex.remainder();
    let bytes = rem.as_bytes();

    // `--[=*[` opens a long comment
    if !bytes.is_empty() && bytes[0] == b'[' {
        let mut level = 0;
        while 1 + level < bytes.len() && bytes[1 + level] == b'=' {
            level += 1;
        }
        if 1 + level < bytes.len() && bytes[1 + level] == b'[' {
            let closing = closing_bracket(level);
            return match rem[2 + level..].find(&closing) {
                Some(end) => {
                    lex.bump(2 + level + end + closing.len());
                    FilterResult::Skip
                }
                None => {
                    lex.bump(rem.len());
                    FilterResult::Error(ScanErrorKind::UnterminatedComment)
                }
            };
        }
    }

    // Line comment
    let line_len = rem.find('\n').unwrap_or(rem.len());
    let text = rem[..line_len].trim_end_matches('\r');
    let offset = lex.span().start;
    let body = text.trim_start();

    let result = if let Some(rest) = body.strip_prefix("@vela_use") {
        FilterResult::Emit(rest.trim().to_owned())
    } else {
        if let Some(rest) = body.strip_prefix("@vela_warnings") {
            let directive = rest.trim_start().trim_start_matches(':').trim().to_owned();
            lex.extras.warn_directives.push((offset, directive));
        }
        FilterResult::Skip
    };
    lex.bump(line_len);
    result
}

fn closing_bracket(level: usize) -> String {
    let mut s = String::with_capacity(level + 2);
    s.push(']');
    for _ in 0..level {
        s.push('=');
    }
    s.push(']');
    s
}

fn lex_long_string(lex: &mut logos::Lexer<LogosToken>) -> Result<String, ScanErrorKind> {
    let level = lex.slice().len() - 2;
    let rem = lex.remainder();
    let closing = closing_bracket(level);

    let Some(end) = rem.find(&closing) else {
        lex.bump(rem.len());
        return Err(ScanErrorKind::UnterminatedLongString);
    };

    // A newline immediately after the opening bracket is not part of
    // the string
    let mut content = &rem[..end];
    if let Some(stripped) = content.strip_prefix("\r\n") {
        content = stripped;
    } else if let Some(stripped) = content.strip_prefix(['\n', '\r']) {
        content = stripped;
    }

    let owned = content.to_owned();
    lex.bump(end + closing.len());
    Ok(owned)
}

// `[=` without a matching second `[` is never a valid token.
fn lex_broken_long_bracket(
    _lex: &mut logos::Lexer<LogosToken>,
) -> Result<String, ScanErrorKind> {
    Err(ScanErrorKind::InvalidLongStringDelimiter)
}

fn lex_short_string(
    lex: &mut logos::Lexer<LogosToken>,
    quote: char,
) -> Result<String, ScanErrorKind> {
    let rem = lex.remainder();
    let mut out = String::new();
    let mut chars = rem.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => {
                lex.bump(i + c.len_utf8());
                return Ok(out);
            }
            '\n' | '\r' => return Err(ScanErrorKind::UnterminatedString),
            '\\' => {
                let Some((_, e)) = chars.next() else {
                    return Err(ScanErrorKind::UnterminatedString);
                };
                match e {
                    'a' => out.push('\x07'),
                    'b' => out.push('\x08'),
                    'f' => out.push('\x0C'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'v' => out.push('\x0B'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    '\'' => out.push('\''),
                    // Escaped line break becomes a newline in the string
                    '\n' => out.push('\n'),
                    '\r' => {
                        out.push('\n');
                        if matches!(chars.peek(), Some((_, '\n'))) {
                            chars.next();
                        }
                    }
                    // `\z` skips following whitespace, line breaks included
                    'z' => {
                        while matches!(chars.peek(), Some((_, c)) if c.is_ascii_whitespace()) {
                            chars.next();
                        }
                    }
                    'x' => {
                        let hi = next_hex_digit(&mut chars)?;
                        let lo = next_hex_digit(&mut chars)?;
                        push_scalar(&mut out, hi * 16 + lo)?;
                    }
                    'u' => {
                        if !matches!(chars.next(), Some((_, '{'))) {
                            return Err(ScanErrorKind::InvalidEscape);
                        }
                        let mut value: u32 = 0;
                        let mut digits = 0;
                        loop {
                            match chars.next() {
                                Some((_, '}')) => break,
                                Some((_, c)) => {
                                    let d = c
                                        .to_digit(16)
                                        .ok_or(ScanErrorKind::InvalidEscape)?;
                                    value = value
                                        .checked_mul(16)
                                        .and_then(|v| v.checked_add(d))
                                        .ok_or(ScanErrorKind::InvalidEscape)?;
                                    digits += 1;
                                }
                                None => return Err(ScanErrorKind::UnterminatedString),
                            }
                        }
                        if digits == 0 {
                            return Err(ScanErrorKind::InvalidEscape);
                        }
                        push_scalar(&mut out, value)?;
                    }
                    d @ '0'..='9' => {
                        // Up to three decimal digits, value must fit a byte
                        let mut value = d.to_digit(10).unwrap_or(0);
                        for _ in 0..2 {
                            match chars.peek() {
                                Some((_, c)) if c.is_ascii_digit() => {
                                    value = value * 10 + c.to_digit(10).unwrap_or(0);
                                    chars.next();
                                }
                                _ => break,
                            }
                        }
                        if value > 255 {
                            return Err(ScanErrorKind::InvalidEscape);
                        }
                        push_scalar(&mut out, value)?;
                    }
                    _ => return Err(ScanErrorKind::InvalidEscape),
                }
            }
            c => out.push(c),
        }
    }
    Err(ScanErrorKind::UnterminatedString)
}

fn next_hex_digit(
    chars: &mut std::iter::Peekable<std::str::CharIndices>,
) -> Result<u32, ScanErrorKind> {
    match chars.next() {
        Some((_, c)) => c.to_digit(16).ok_or(ScanErrorKind::InvalidEscape),
        None => Err(ScanErrorKind::UnterminatedString),
    }
}

fn push_scalar(out: &mut String, value: u32) -> Result<(), ScanErrorKind> {
    match char::from_u32(value) {
        Some(c) => {
            out.push(c);
            Ok(())
        }
        None => Err(ScanErrorKind::InvalidEscape),
    }
}

fn lex_dec_numeral(lex: &mut logos::Lexer<LogosToken>) -> Result<Numeral, ScanErrorKind> {
    let s = lex.slice().replace('_', "");
    if s.contains(['.', 'e', 'E']) {
        // Normalize a trailing dot so the stdlib float parser accepts it
        let normalized = match s.find('.') {
            Some(i) if !s[i + 1..].starts_with(|c: char| c.is_ascii_digit()) => {
                format!("{}0{}", &s[..=i], &s[i + 1..])
            }
            _ => s,
        };
        normalized
            .parse::<f64>()
            .map(Numeral::Float)
            .map_err(|_| ScanErrorKind::MalformedNumber)
    } else if let Ok(n) = s.parse::<i64>() {
        Ok(Numeral::Int(n))
    } else {
        // Decimal integer constants that overflow become floats
        s.parse::<f64>()
            .map(Numeral::Float)
            .map_err(|_| ScanErrorKind::MalformedNumber)
    }
}

fn lex_hex_numeral(lex: &mut logos::Lexer<LogosToken>) -> Result<Numeral, ScanErrorKind> {
    let s = lex.slice()[2..].replace('_', "");
    if s.is_empty() {
        return Err(ScanErrorKind::MalformedNumber);
    }
    if s.contains(['.', 'p', 'P']) {
        parse_hex_float(&s).map(Numeral::Float)
    } else {
        // Hexadecimal integer constants wrap around on overflow
        let mut acc: i64 = 0;
        for c in s.chars() {
            let d = c.to_digit(16).ok_or(ScanErrorKind::MalformedNumber)?;
            acc = acc.wrapping_mul(16).wrapping_add(d as i64);
        }
        Ok(Numeral::Int(acc))
    }
}

fn parse_hex_float(s: &str) -> Result<f64, ScanErrorKind> {
    let (mantissa, exponent) = match s.find(['p', 'P']) {
        Some(i) => {
            let exp = s[i + 1..]
                .parse::<i32>()
                .map_err(|_| ScanErrorKind::MalformedNumber)?;
            (&s[..i], exp)
        }
        None => (s, 0),
    };

    let (int_part, frac_part) = match mantissa.find('.') {
        Some(i) => (&mantissa[..i], &mantissa[i + 1..]),
        None => (mantissa, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(ScanErrorKind::MalformedNumber);
    }

    let mut value = 0.0f64;
    for c in int_part.chars() {
        let d = c.to_digit(16).ok_or(ScanErrorKind::MalformedNumber)?;
        value = value * 16.0 + d as f64;
    }
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        let d = c.to_digit(16).ok_or(ScanErrorKind::MalformedNumber)?;
        value += d as f64 * scale;
        scale /= 16.0;
    }
    Ok(value * 2.0f64.powi(exponent))
}

/// Main lexer structure.
pub struct Lexer<'a> {
    source: &'a str,
    tokens: Vec<(Token, Span)>,
    errors: Vec<LexError>,
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("unexpected character '{char}'")]
    UnexpectedCharacter { char: char, span: Span },
    #[error("unterminated string literal")]
    UnterminatedString { span: Span },
    #[error("unterminated long string literal")]
    UnterminatedLongString { span: Span },
    #[error("unterminated long comment")]
    UnterminatedComment { span: Span },
    #[error("invalid long string delimiter")]
    InvalidLongStringDelimiter { span: Span },
    #[error("invalid escape sequence")]
    InvalidEscape { span: Span },
    #[error("malformed number near '{text}'")]
    MalformedNumber { text: String, span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedCharacter { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::UnterminatedLongString { span }
            | LexError::UnterminatedComment { span }
            | LexError::InvalidLongStringDelimiter { span }
            | LexError::InvalidEscape { span }
            | LexError::MalformedNumber { span, .. } => *span,
        }
    }
}

/// Everything the scanner produces for one chunk.
#[derive(Debug)]
pub struct ScanOutput {
    pub tokens: Vec<(Token, Span)>,
    pub warn_directives: Vec<RawWarnDirective>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Tokenizes the source.
    ///
    /// Returns the token stream with an explicit `Eof` sentinel, plus
    /// any warning directives found in comments, or all scan errors.
    pub fn tokenize(mut self) -> Result<ScanOutput, Vec<LexError>> {
        let mut logos_lexer = LogosToken::lexer(self.source);
        let mut line = 1u32;
        let mut column = 1u32;
        let mut last_end = 0;

        // A `#` first line is skipped, so chunks can carry a shebang
        if self.source.starts_with('#') {
            let skip = self.source.find('\n').unwrap_or(self.source.len());
            logos_lexer.bump(skip);
        }

        while let Some(token_result) = logos_lexer.next() {
            let range = logos_lexer.span();

            // Update line and column based on consumed text
            for c in self.source[last_end..range.start].chars() {
                if c == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
            }

            let span = Span::new(range.start, range.end, line, column);

            match token_result {
                Ok(logos_token) => {
                    let token = convert_token(logos_token);
                    // Adjacent string literals concatenate into one token
                    if let (Some((Token::StringLiteral(prev), prev_span)), Token::StringLiteral(s)) =
                        (self.tokens.last_mut(), &token)
                    {
                        prev.push_str(s);
                        prev_span.end = span.end;
                    } else {
                        self.tokens.push((token, span));
                    }
                }
                Err(kind) => self.errors.push(scan_error(kind, span, self.source)),
            }

            // Update column for this token
            for c in self.source[range.start..range.end].chars() {
                if c == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
            }

            last_end = range.end;
        }

        // Add EOF token
        let eof_span = Span::new(self.source.len(), self.source.len(), line, column);
        self.tokens.push((Token::Eof, eof_span));

        if self.errors.is_empty() {
            let warn_directives = directives_with_lines(
                self.source,
                std::mem::take(&mut logos_lexer.extras.warn_directives),
            );
            Ok(ScanOutput {
                tokens: self.tokens,
                warn_directives,
            })
        } else {
            Err(self.errors)
        }
    }
}

fn scan_error(kind: ScanErrorKind, span: Span, source: &str) -> LexError {
    match kind {
        ScanErrorKind::Unexpected => {
            let char = source[span.start..].chars().next().unwrap_or('\0');
            LexError::UnexpectedCharacter { char, span }
        }
        ScanErrorKind::UnterminatedString => LexError::UnterminatedString { span },
        ScanErrorKind::UnterminatedLongString => LexError::UnterminatedLongString { span },
        ScanErrorKind::UnterminatedComment => LexError::UnterminatedComment { span },
        ScanErrorKind::InvalidLongStringDelimiter => LexError::InvalidLongStringDelimiter { span },
        ScanErrorKind::InvalidEscape => LexError::InvalidEscape { span },
        ScanErrorKind::MalformedNumber => LexError::MalformedNumber {
            text: span.slice(source).to_owned(),
            span,
        },
    }
}

fn directives_with_lines(source: &str, raw: Vec<(usize, String)>) -> Vec<RawWarnDirective> {
    let mut out = Vec::with_capacity(raw.len());
    let mut line = 1u32;
    let mut pos = 0;
    for (offset, text) in raw {
        line += source[pos..offset].matches('\n').count() as u32;
        pos = offset;
        out.push(RawWarnDirective { offset, line, text });
    }
    out
}

fn convert_token(logos_token: LogosToken) -> Token {
    match logos_token {
        LogosToken::And => Token::And,
        LogosToken::Break => Token::Break,
        LogosToken::Do => Token::Do,
        LogosToken::Else => Token::Else,
        LogosToken::Elseif => Token::Elseif,
        LogosToken::End => Token::End,
        LogosToken::False => Token::False,
        LogosToken::For => Token::For,
        LogosToken::Function => Token::Function,
        LogosToken::Goto => Token::Goto,
        LogosToken::If => Token::If,
        LogosToken::In => Token::In,
        LogosToken::Local => Token::Local,
        LogosToken::Nil => Token::Nil,
        LogosToken::Not => Token::Not,
        LogosToken::Or => Token::Or,
        LogosToken::Repeat => Token::Repeat,
        LogosToken::Return => Token::Return,
        LogosToken::Then => Token::Then,
        LogosToken::True => Token::True,
        LogosToken::Until => Token::Until,
        LogosToken::While => Token::While,
        LogosToken::Switch => Token::Switch,
        LogosToken::Continue => Token::Continue,
        LogosToken::Enum => Token::Enum,
        LogosToken::Class => Token::Class,
        LogosToken::Parent => Token::Parent,
        LogosToken::Export => Token::Export,
        LogosToken::Global => Token::Global,
        LogosToken::VelaSwitch => Token::VelaSwitch,
        LogosToken::VelaContinue => Token::VelaContinue,
        LogosToken::VelaEnum => Token::VelaEnum,
        LogosToken::VelaClass => Token::VelaClass,
        LogosToken::VelaParent => Token::VelaParent,
        LogosToken::VelaExport => Token::VelaExport,
        LogosToken::VelaGlobal => Token::VelaGlobal,
        LogosToken::Let => Token::Let,
        LogosToken::Const => Token::Const,
        LogosToken::Use => Token::Use,
        LogosToken::UseAnnotation(text) => Token::UseAnnotation(text),
        LogosToken::Identifier(s) => Token::Identifier(s),
        LogosToken::Numeral(Numeral::Int(n)) => Token::IntLiteral(n),
        LogosToken::Numeral(Numeral::Float(n)) => Token::FloatLiteral(n),
        LogosToken::StringLiteral(s) => Token::StringLiteral(s),
        LogosToken::LongString(s) => Token::StringLiteral(s),
        LogosToken::PlusEqual => Token::Compound(AugOp::Add),
        LogosToken::MinusEqual => Token::Compound(AugOp::Sub),
        LogosToken::StarEqual => Token::Compound(AugOp::Mul),
        LogosToken::SlashEqual => Token::Compound(AugOp::Div),
        LogosToken::SlashSlashEqual => Token::Compound(AugOp::IDiv),
        LogosToken::PercentEqual => Token::Compound(AugOp::Mod),
        LogosToken::CaretEqual => Token::Compound(AugOp::Pow),
        LogosToken::StarStarEqual => Token::Compound(AugOp::Pow),
        LogosToken::DotDotEqual => Token::Compound(AugOp::Concat),
        LogosToken::LessLessEqual => Token::Compound(AugOp::Shl),
        LogosToken::GreaterGreaterEqual => Token::Compound(AugOp::Shr),
        LogosToken::AmpEqual => Token::Compound(AugOp::BAnd),
        LogosToken::PipeEqual => Token::Compound(AugOp::BOr),
        LogosToken::EqualEqual => Token::EqualEqual,
        LogosToken::TildeEqual => Token::TildeEqual,
        LogosToken::BangEqual => Token::BangEqual,
        LogosToken::LessEqual => Token::LessEqual,
        LogosToken::GreaterEqual => Token::GreaterEqual,
        LogosToken::LessLess => Token::LessLess,
        LogosToken::GreaterGreater => Token::GreaterGreater,
        LogosToken::SlashSlash => Token::SlashSlash,
        LogosToken::StarStar => Token::StarStar,
        LogosToken::DotDotDot => Token::DotDotDot,
        LogosToken::DotDot => Token::DotDot,
        LogosToken::ColonColon => Token::ColonColon,
        LogosToken::Plus => Token::Plus,
        LogosToken::Minus => Token::Minus,
        LogosToken::Star => Token::Star,
        LogosToken::Slash => Token::Slash,
        LogosToken::Percent => Token::Percent,
        LogosToken::Caret => Token::Caret,
        LogosToken::Hash => Token::Hash,
        LogosToken::Amp => Token::Amp,
        LogosToken::Tilde => Token::Tilde,
        LogosToken::Pipe => Token::Pipe,
        LogosToken::Bang => Token::Bang,
        LogosToken::Less => Token::Less,
        LogosToken::Greater => Token::Greater,
        LogosToken::Equal => Token::Equal,
        LogosToken::LeftParen => Token::LeftParen,
        LogosToken::RightParen => Token::RightParen,
        LogosToken::LeftBrace => Token::LeftBrace,
        LogosToken::RightBrace => Token::RightBrace,
        LogosToken::LeftBracket => Token::LeftBracket,
        LogosToken::RightBracket => Token::RightBracket,
        LogosToken::Semicolon => Token::Semicolon,
        LogosToken::Colon => Token::Colon,
        LogosToken::Comma => Token::Comma,
        LogosToken::Dot => Token::Dot,
        LogosToken::Question => Token::Question,
        LogosToken::Whitespace => {
            unreachable!("Whitespace should be skipped")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        let output = Lexer::new(source).tokenize().unwrap();
        output.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        assert_eq!(
            lex("local abc = nil"),
            vec![
                Token::Local,
                Token::Identifier("abc".into()),
                Token::Equal,
                Token::Nil,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn extension_keywords_lex_as_keywords() {
        assert_eq!(
            lex("switch vela_switch continue"),
            vec![
                Token::Switch,
                Token::VelaSwitch,
                Token::Continue,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn narrow_words_lex_as_identifiers() {
        assert_eq!(
            lex("case default extends"),
            vec![
                Token::Identifier("case".into()),
                Token::Identifier("default".into()),
                Token::Identifier("extends".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn numerals() {
        assert_eq!(lex("42"), vec![Token::IntLiteral(42), Token::Eof]);
        assert_eq!(lex("1_000_000"), vec![Token::IntLiteral(1_000_000), Token::Eof]);
        assert_eq!(lex("0xFF"), vec![Token::IntLiteral(255), Token::Eof]);
        assert_eq!(lex("3.5"), vec![Token::FloatLiteral(3.5), Token::Eof]);
        assert_eq!(lex(".5"), vec![Token::FloatLiteral(0.5), Token::Eof]);
        assert_eq!(lex("1."), vec![Token::FloatLiteral(1.0), Token::Eof]);
        assert_eq!(lex("1e2"), vec![Token::FloatLiteral(100.0), Token::Eof]);
        assert_eq!(lex("0x1p4"), vec![Token::FloatLiteral(16.0), Token::Eof]);
        assert_eq!(lex("0x.8"), vec![Token::FloatLiteral(0.5), Token::Eof]);
    }

    #[test]
    fn hex_integer_overflow_wraps() {
        assert_eq!(
            lex("0xFFFFFFFFFFFFFFFF"),
            vec![Token::IntLiteral(-1), Token::Eof]
        );
    }

    #[test]
    fn decimal_integer_overflow_becomes_float() {
        assert_eq!(
            lex("9223372036854775808"),
            vec![Token::FloatLiteral(9223372036854775808.0), Token::Eof]
        );
    }

    #[test]
    fn short_strings_with_escapes() {
        assert_eq!(
            lex(r#""a\nb""#),
            vec![Token::StringLiteral("a\nb".into()), Token::Eof]
        );
        assert_eq!(
            lex(r#""\x41\65\u{1F600}""#),
            vec![Token::StringLiteral("AA\u{1F600}".into()), Token::Eof]
        );
        assert_eq!(
            lex("\"a\\z  \n  b\""),
            vec![Token::StringLiteral("ab".into()), Token::Eof]
        );
    }

    #[test]
    fn adjacent_strings_concatenate() {
        assert_eq!(
            lex(r#""foo" 'bar'"#),
            vec![Token::StringLiteral("foobar".into()), Token::Eof]
        );
    }

    #[test]
    fn long_strings_strip_first_newline() {
        assert_eq!(
            lex("[[\nhello]]"),
            vec![Token::StringLiteral("hello".into()), Token::Eof]
        );
        assert_eq!(
            lex("[==[a]] b ]==]"),
            vec![Token::StringLiteral("a]] b ".into()), Token::Eof]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            lex("a -- comment\nb --[[ long\ncomment ]] c"),
            vec![
                Token::Identifier("a".into()),
                Token::Identifier("b".into()),
                Token::Identifier("c".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn use_annotation_comment_becomes_token() {
        assert_eq!(
            lex("-- @vela_use switch\nx"),
            vec![
                Token::UseAnnotation("switch".into()),
                Token::Identifier("x".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn warning_directives_are_collected() {
        let output = Lexer::new("x = 1\n-- @vela_warnings: disable-var-shadow\ny = 2")
            .tokenize()
            .unwrap();
        assert_eq!(output.warn_directives.len(), 1);
        assert_eq!(output.warn_directives[0].text, "disable-var-shadow");
        assert_eq!(output.warn_directives[0].line, 2);
    }

    #[test]
    fn compound_operators() {
        assert_eq!(
            lex("a += 1"),
            vec![
                Token::Identifier("a".into()),
                Token::Compound(AugOp::Add),
                Token::IntLiteral(1),
                Token::Eof,
            ]
        );
        assert_eq!(lex("a ..= b")[1], Token::Compound(AugOp::Concat));
        assert_eq!(lex("a //= b")[1], Token::Compound(AugOp::IDiv));
        assert_eq!(lex("a **= b")[1], Token::Compound(AugOp::Pow));
    }

    #[test]
    fn spans_track_lines_and_columns() {
        let output = Lexer::new("local x\nreturn x").tokenize().unwrap();
        let spans: Vec<(u32, u32)> = output.tokens.iter().map(|(_, s)| (s.line, s.column)).collect();
        assert_eq!(spans, vec![(1, 1), (1, 7), (2, 1), (2, 8), (2, 9)]);
    }

    #[test]
    fn shebang_line_is_skipped() {
        assert_eq!(
            lex("#!/usr/bin/env vela\nreturn 1"),
            vec![Token::Return, Token::IntLiteral(1), Token::Eof]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let errors = Lexer::new("x = \"abc").tokenize().unwrap_err();
        assert!(matches!(errors[0], LexError::UnterminatedString { .. }));
    }

    #[test]
    fn unterminated_long_comment_is_an_error() {
        let errors = Lexer::new("--[[ never closed").tokenize().unwrap_err();
        assert!(matches!(errors[0], LexError::UnterminatedComment { .. }));
    }
}
