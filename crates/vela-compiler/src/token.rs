//! Token definitions for the Vela programming language.
//!
//! This module defines all tokens that can appear in Vela source code,
//! including keywords, operators, literals, and special tokens. Extended
//! keywords come in two spellings: the bare word (subject to
//! compatibility resolution) and a permanent `vela_`-prefixed alias.

use std::fmt;

/// A token in the Vela programming language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Core Lua keywords (always reserved)
    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,

    // Togglable extension keywords (bare spelling)
    Switch,
    Continue,
    Enum,
    Class,
    Parent,
    Export,
    Global,

    // Permanent `vela_`-prefixed aliases of the above
    VelaSwitch,
    VelaContinue,
    VelaEnum,
    VelaClass,
    VelaParent,
    VelaExport,
    VelaGlobal,

    // Opt-in keywords (disabled until a directive enables them)
    Let,
    Const,

    // Compatibility directive, statement form
    Use,
    /// `-- @vela_use ...` surfaced from a line comment. Payload is the
    /// directive text after `@vela_use`.
    UseAnnotation(String),

    // Literals
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),

    // Identifiers
    Identifier(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    Caret,
    StarStar, // alias for `^`
    Hash,
    Amp,
    Tilde,
    Pipe,
    LessLess,
    GreaterGreater,

    EqualEqual,
    TildeEqual,
    BangEqual, // alias for `~=`
    Bang,      // alias for `not`
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    Equal,
    /// Compound assignment, e.g. `+=`. The payload names the operation.
    Compound(AugOp),

    DotDot,
    DotDotDot,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    ColonColon,
    Semicolon,
    Colon,
    Comma,
    Dot,
    /// Nilable marker in type hints.
    Question,

    // Special
    Eof,
}

/// Operation carried by a compound assignment token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Shl,
    Shr,
    BAnd,
    BOr,
}

impl Token {
    /// Folds the permanent `vela_`-prefixed aliases onto their bare
    /// counterparts so the parser can dispatch on a single spelling.
    pub fn normalized(&self) -> &Token {
        match self {
            Token::VelaSwitch => &Token::Switch,
            Token::VelaContinue => &Token::Continue,
            Token::VelaEnum => &Token::Enum,
            Token::VelaClass => &Token::Class,
            Token::VelaParent => &Token::Parent,
            Token::VelaExport => &Token::Export,
            Token::VelaGlobal => &Token::Global,
            other => other,
        }
    }

    /// Identifier or string payload, if this token carries one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Token::Identifier(s) | Token::StringLiteral(s) => Some(s),
            _ => None,
        }
    }
}

/// Which compatibility tier a reserved word belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordTier {
    /// Reserved in every chunk; never subject to resolution.
    Permanent,
    /// Enabled by default but may be disabled by directive, host
    /// configuration, or the identifier-usage heuristic.
    Togglable,
    /// Disabled by default; a directive or host configuration must
    /// enable it.
    OptIn,
    /// Only reserved inside its governing construct; lexed as an
    /// identifier and recognized contextually by the parser.
    Narrow,
}

/// Identity of a word whose keyword status can change per chunk.
/// Used to index compatibility state in the keyword resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToggledWord {
    Switch,
    Continue,
    Enum,
    Class,
    Parent,
    Export,
    Global,
    Let,
    Const,
}

impl ToggledWord {
    pub const ALL: [ToggledWord; 9] = [
        ToggledWord::Switch,
        ToggledWord::Continue,
        ToggledWord::Enum,
        ToggledWord::Class,
        ToggledWord::Parent,
        ToggledWord::Export,
        ToggledWord::Global,
        ToggledWord::Let,
        ToggledWord::Const,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToggledWord::Switch => "switch",
            ToggledWord::Continue => "continue",
            ToggledWord::Enum => "enum",
            ToggledWord::Class => "class",
            ToggledWord::Parent => "parent",
            ToggledWord::Export => "export",
            ToggledWord::Global => "global",
            ToggledWord::Let => "let",
            ToggledWord::Const => "const",
        }
    }

    pub fn from_name(name: &str) -> Option<ToggledWord> {
        ToggledWord::ALL.iter().copied().find(|w| w.name() == name)
    }

    /// The keyword token this word lexes to when enabled.
    pub fn token(self) -> Token {
        match self {
            ToggledWord::Switch => Token::Switch,
            ToggledWord::Continue => Token::Continue,
            ToggledWord::Enum => Token::Enum,
            ToggledWord::Class => Token::Class,
            ToggledWord::Parent => Token::Parent,
            ToggledWord::Export => Token::Export,
            ToggledWord::Global => Token::Global,
            ToggledWord::Let => Token::Let,
            ToggledWord::Const => Token::Const,
        }
    }

    pub fn tier(self) -> KeywordTier {
        match self {
            ToggledWord::Let | ToggledWord::Const => KeywordTier::OptIn,
            _ => KeywordTier::Togglable,
        }
    }

    /// The toggled word a keyword token corresponds to, for both the
    /// bare and the `vela_`-prefixed spelling. Prefixed aliases still
    /// map here so directive bookkeeping can tell usage was informed.
    pub fn of_token(token: &Token) -> Option<ToggledWord> {
        match token {
            Token::Switch | Token::VelaSwitch => Some(ToggledWord::Switch),
            Token::Continue | Token::VelaContinue => Some(ToggledWord::Continue),
            Token::Enum | Token::VelaEnum => Some(ToggledWord::Enum),
            Token::Class | Token::VelaClass => Some(ToggledWord::Class),
            Token::Parent | Token::VelaParent => Some(ToggledWord::Parent),
            Token::Export | Token::VelaExport => Some(ToggledWord::Export),
            Token::Global | Token::VelaGlobal => Some(ToggledWord::Global),
            Token::Let => Some(ToggledWord::Let),
            Token::Const => Some(ToggledWord::Const),
            _ => None,
        }
    }
}

/// A source location span with position information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

impl Default for Span {
    fn default() -> Self {
        Span::new(0, 0, 1, 1)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::And => write!(f, "and"),
            Token::Break => write!(f, "break"),
            Token::Do => write!(f, "do"),
            Token::Else => write!(f, "else"),
            Token::Elseif => write!(f, "elseif"),
            Token::End => write!(f, "end"),
            Token::False => write!(f, "false"),
            Token::For => write!(f, "for"),
            Token::Function => write!(f, "function"),
            Token::Goto => write!(f, "goto"),
            Token::If => write!(f, "if"),
            Token::In => write!(f, "in"),
            Token::Local => write!(f, "local"),
            Token::Nil => write!(f, "nil"),
            Token::Not => write!(f, "not"),
            Token::Or => write!(f, "or"),
            Token::Repeat => write!(f, "repeat"),
            Token::Return => write!(f, "return"),
            Token::Then => write!(f, "then"),
            Token::True => write!(f, "true"),
            Token::Until => write!(f, "until"),
            Token::While => write!(f, "while"),
            Token::Switch => write!(f, "switch"),
            Token::Continue => write!(f, "continue"),
            Token::Enum => write!(f, "enum"),
            Token::Class => write!(f, "class"),
            Token::Parent => write!(f, "parent"),
            Token::Export => write!(f, "export"),
            Token::Global => write!(f, "global"),
            Token::VelaSwitch => write!(f, "vela_switch"),
            Token::VelaContinue => write!(f, "vela_continue"),
            Token::VelaEnum => write!(f, "vela_enum"),
            Token::VelaClass => write!(f, "vela_class"),
            Token::VelaParent => write!(f, "vela_parent"),
            Token::VelaExport => write!(f, "vela_export"),
            Token::VelaGlobal => write!(f, "vela_global"),
            Token::Let => write!(f, "let"),
            Token::Const => write!(f, "const"),
            Token::Use => write!(f, "vela_use"),
            Token::UseAnnotation(_) => write!(f, "@vela_use"),
            Token::IntLiteral(n) => write!(f, "{}", n),
            Token::FloatLiteral(n) => write!(f, "{}", n),
            Token::StringLiteral(_) => write!(f, "<string>"),
            Token::Identifier(name) => write!(f, "{}", name),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::SlashSlash => write!(f, "//"),
            Token::Percent => write!(f, "%"),
            Token::Caret => write!(f, "^"),
            Token::StarStar => write!(f, "**"),
            Token::Hash => write!(f, "#"),
            Token::Amp => write!(f, "&"),
            Token::Tilde => write!(f, "~"),
            Token::Pipe => write!(f, "|"),
            Token::LessLess => write!(f, "<<"),
            Token::GreaterGreater => write!(f, ">>"),
            Token::EqualEqual => write!(f, "=="),
            Token::TildeEqual => write!(f, "~="),
            Token::BangEqual => write!(f, "!="),
            Token::Bang => write!(f, "!"),
            Token::Less => write!(f, "<"),
            Token::LessEqual => write!(f, "<="),
            Token::Greater => write!(f, ">"),
            Token::GreaterEqual => write!(f, ">="),
            Token::Equal => write!(f, "="),
            Token::Compound(op) => write!(f, "{}=", op),
            Token::DotDot => write!(f, ".."),
            Token::DotDotDot => write!(f, "..."),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::LeftBrace => write!(f, "{{"),
            Token::RightBrace => write!(f, "}}"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::ColonColon => write!(f, "::"),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Question => write!(f, "?"),
            Token::Eof => write!(f, "<eof>"),
        }
    }
}

impl fmt::Display for AugOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AugOp::Add => write!(f, "+"),
            AugOp::Sub => write!(f, "-"),
            AugOp::Mul => write!(f, "*"),
            AugOp::Div => write!(f, "/"),
            AugOp::IDiv => write!(f, "//"),
            AugOp::Mod => write!(f, "%"),
            AugOp::Pow => write!(f, "^"),
            AugOp::Concat => write!(f, ".."),
            AugOp::Shl => write!(f, "<<"),
            AugOp::Shr => write!(f, ">>"),
            AugOp::BAnd => write!(f, "&"),
            AugOp::BOr => write!(f, "|"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_aliases_normalize_to_bare_keywords() {
        assert_eq!(Token::VelaSwitch.normalized(), &Token::Switch);
        assert_eq!(Token::VelaParent.normalized(), &Token::Parent);
        assert_eq!(Token::Switch.normalized(), &Token::Switch);
        assert_eq!(Token::While.normalized(), &Token::While);
    }

    #[test]
    fn toggled_word_round_trips_through_name() {
        for word in ToggledWord::ALL {
            assert_eq!(ToggledWord::from_name(word.name()), Some(word));
        }
        assert_eq!(ToggledWord::from_name("while"), None);
    }

    #[test]
    fn span_slices_source() {
        let src = "local x = 1";
        let span = Span::new(6, 7, 1, 7);
        assert_eq!(span.slice(src), "x");
        assert_eq!(span.len(), 1);
    }
}
