//! Keyword compatibility resolution.
//!
//! Extended keywords like `switch` are ordinary identifiers in plenty of
//! existing code, so their keyword status is settled per chunk before
//! parsing begins. The resolver runs over the frozen token stream in two
//! passes: the first collects `vela_use` directives and heuristic
//! evidence of identifier usage, the second rewrites every occurrence of
//! a disabled word back into an identifier token.
//!
//! Resolution priority, strongest first: directive, host configuration,
//! usage heuristic, default. The heuristic degrades a word for the whole
//! chunk, including occurrences before the one that triggered it, so a
//! token never changes meaning between passes over the same file.

use crate::diag::{Reporter, WarningKind};
use crate::error::CompileResult;
use crate::token::{Span, ToggledWord, Token};
use rustc_hash::{FxHashMap, FxHashSet};

/// How a word arrived at its current keyword status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordState {
    EnabledByDefault,
    DisabledByDefault,
    DisabledByHeuristic,
    EnabledByHost,
    DisabledByHost,
    EnabledByDirective,
    DisabledByDirective,
}

impl KeywordState {
    pub fn enabled(self) -> bool {
        matches!(
            self,
            KeywordState::EnabledByDefault
                | KeywordState::EnabledByHost
                | KeywordState::EnabledByDirective
        )
    }
}

/// First version that carries each togglable word, for `vela_use`
/// version bundles. Opt-in words are never part of a bundle.
fn introduced_in(word: ToggledWord) -> Option<(u16, u16, u16)> {
    match word {
        ToggledWord::Switch | ToggledWord::Continue => Some((0, 2, 0)),
        ToggledWord::Enum => Some((0, 5, 0)),
        ToggledWord::Class | ToggledWord::Parent | ToggledWord::Export => Some((0, 6, 0)),
        ToggledWord::Global => Some((0, 8, 0)),
        ToggledWord::Let | ToggledWord::Const => None,
    }
}

fn parse_version(text: &str) -> Option<(u16, u16, u16)> {
    let mut parts = text.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// One parsed `vela_use` request.
#[derive(Debug, Clone, PartialEq)]
enum UseItem {
    Word { word: ToggledWord, enable: bool },
    Version(u16, u16, u16),
    Star,
}

fn default_state(word: ToggledWord) -> KeywordState {
    match word.tier() {
        crate::token::KeywordTier::OptIn => KeywordState::DisabledByDefault,
        _ => KeywordState::EnabledByDefault,
    }
}

/// Resolves keyword compatibility for a chunk, rewriting disabled
/// extension keywords into identifier tokens in place. Consumes
/// `@vela_use` annotation tokens; `vela_use` statements are left for
/// the parser, which re-reads them for syntax only.
///
/// Returns the states in effect at the end of the chunk, which the
/// parser consults for keyword-dependent warnings.
pub fn resolve_keywords(
    tokens: &mut Vec<(Token, Span)>,
    host_overrides: &FxHashMap<ToggledWord, bool>,
    reporter: &mut Reporter<'_>,
) -> CompileResult<FxHashMap<ToggledWord, KeywordState>> {
    let base = base_states(host_overrides);

    // Pass 1: find words used as identifiers while still uninformed.
    let mut states = base.clone();
    let mut degraded: FxHashSet<ToggledWord> = FxHashSet::default();
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i].0 {
            Token::Use => {
                let (items, next) = parse_use_statement(tokens, i, reporter)?;
                for (item, _) in items {
                    apply_item(&mut states, &item);
                }
                i = next;
                continue;
            }
            Token::UseAnnotation(text) => {
                let items = parse_annotation(text, tokens[i].1, reporter)?;
                for item in items {
                    apply_item(&mut states, &item);
                }
            }
            token => {
                // `parent` is exempt: its keyword use is exactly
                // `parent.m(...)` / `parent:m(...)`, which the suffix
                // triggers would otherwise match.
                if let Some(word) = bare_word(token) {
                    if word != ToggledWord::Parent
                        && states[&word] == KeywordState::EnabledByDefault
                        && in_identifier_position(tokens, i)
                    {
                        degraded.insert(word);
                    }
                }
            }
        }
        i += 1;
    }

    // Pass 2: settle final states and rewrite disabled words.
    let mut states = base;
    for word in &degraded {
        if states[word] == KeywordState::EnabledByDefault {
            states.insert(*word, KeywordState::DisabledByHeuristic);
        }
    }
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i].0 {
            Token::Use => {
                let (items, next) = parse_use_statement(tokens, i, reporter)?;
                for (item, span) in items {
                    warn_for_item(&item, span, reporter)?;
                    apply_item(&mut states, &item);
                }
                i = next;
                continue;
            }
            Token::UseAnnotation(text) => {
                let span = tokens[i].1;
                let items = parse_annotation(text, span, reporter)?;
                for item in items {
                    warn_for_item(&item, span, reporter)?;
                    apply_item(&mut states, &item);
                }
            }
            token => {
                if let Some(word) = bare_word(token) {
                    let span = tokens[i].1;
                    if !states[&word].enabled() {
                        tokens[i].0 = Token::Identifier(word.name().to_owned());
                        // The name still collides with a keyword other
                        // chunks may have active.
                        if word != ToggledWord::Parent
                            && states[&word] != KeywordState::DisabledByDirective
                        {
                            reporter.warn_with_note(
                                WarningKind::NonPortable,
                                span,
                                &format!("'{}' is a non-portable name", word.name()),
                                "used here",
                                "use a different name, or disable the keyword with 'vela_use'",
                            )?;
                        }
                    } else if matches!(
                        states[&word],
                        KeywordState::EnabledByDefault | KeywordState::EnabledByHost
                    ) {
                        // Opt-in words have no prefixed alias token.
                        let note = if introduced_in(word).is_some() {
                            format!(
                                "use 'vela_{}' instead, or 'vela_use' this keyword",
                                word.name()
                            )
                        } else {
                            format!("'vela_use {}' makes this explicit", word.name())
                        };
                        reporter.warn_with_note(
                            WarningKind::NonPortable,
                            span,
                            "non-portable keyword usage",
                            "used here",
                            &note,
                        )?;
                    }
                }
            }
        }
        i += 1;
    }

    tokens.retain(|(token, _)| !matches!(token, Token::UseAnnotation(_)));
    Ok(states)
}

fn base_states(host_overrides: &FxHashMap<ToggledWord, bool>) -> FxHashMap<ToggledWord, KeywordState> {
    let mut states = FxHashMap::default();
    for word in ToggledWord::ALL {
        let state = match host_overrides.get(&word) {
            Some(true) => KeywordState::EnabledByHost,
            Some(false) => KeywordState::DisabledByHost,
            None => default_state(word),
        };
        states.insert(word, state);
    }
    states
}

/// The toggled word behind a bare keyword token. Prefixed aliases are
/// permanent and never resolved, so they are excluded here.
fn bare_word(token: &Token) -> Option<ToggledWord> {
    match token {
        Token::VelaSwitch
        | Token::VelaContinue
        | Token::VelaEnum
        | Token::VelaClass
        | Token::VelaParent
        | Token::VelaExport
        | Token::VelaGlobal => None,
        token => ToggledWord::of_token(token),
    }
}

/// A keyword token sits in identifier position when no reading of the
/// grammar lets a statement start with that keyword there. Assignment
/// targets and declared names are the give-aways; a following name is
/// not, since `local class Point` and `enum Color` are keyword uses.
fn in_identifier_position(tokens: &[(Token, Span)], i: usize) -> bool {
    matches!(
        tokens.get(i + 1).map(|(t, _)| t),
        Some(
            Token::Equal
                | Token::Compound(_)
                | Token::Dot
                | Token::Colon
                | Token::LeftBracket
                | Token::Comma
        )
    )
}

fn apply_item(states: &mut FxHashMap<ToggledWord, KeywordState>, item: &UseItem) {
    match item {
        UseItem::Word { word, enable } => {
            let state = if *enable {
                KeywordState::EnabledByDirective
            } else {
                KeywordState::DisabledByDirective
            };
            states.insert(*word, state);
        }
        UseItem::Version(major, minor, patch) => {
            let version = (*major, *minor, *patch);
            for word in ToggledWord::ALL {
                if let Some(intro) = introduced_in(word) {
                    if intro <= version {
                        states.insert(word, KeywordState::EnabledByDirective);
                    }
                }
            }
        }
        UseItem::Star => {
            for word in ToggledWord::ALL {
                if introduced_in(word).is_some() {
                    states.insert(word, KeywordState::EnabledByDirective);
                }
            }
        }
    }
}

fn warn_for_item(item: &UseItem, span: Span, reporter: &mut Reporter<'_>) -> CompileResult<()> {
    match item {
        UseItem::Star => reporter.warn_with_note(
            WarningKind::NonPortable,
            span,
            "'vela_use *' enables keywords this chunk may not use",
            "declared here",
            "name the keywords or a version instead",
        ),
        UseItem::Word { word, enable: true }
            if matches!(word, ToggledWord::Let | ToggledWord::Const) =>
        {
            reporter.warn_with_note(
                WarningKind::Deprecated,
                span,
                &format!("keyword '{}' is deprecated", word.name()),
                "enabled here",
                "use 'local' instead",
            )
        }
        _ => Ok(()),
    }
}

/// Parses the argument list of a `vela_use` statement starting at the
/// `vela_use` token. Returns the items with their spans and the index
/// of the first token after the statement.
fn parse_use_statement(
    tokens: &[(Token, Span)],
    at: usize,
    reporter: &Reporter<'_>,
) -> CompileResult<(Vec<(UseItem, Span)>, usize)> {
    let mut items = Vec::new();
    let mut i = at + 1;
    loop {
        let (token, span) = &tokens[i];
        let item = match token {
            Token::Star => UseItem::Star,
            Token::StringLiteral(text) => match parse_version(text) {
                Some((major, minor, patch)) => UseItem::Version(major, minor, patch),
                None => {
                    return Err(reporter.syntax_error(
                        *span,
                        &format!("unknown version '{}' in 'vela_use'", text),
                        "expected a version like \"0.6.0\"",
                    ));
                }
            },
            token => {
                let word = match word_from_argument(token) {
                    Some(word) => word,
                    None => {
                        return Err(reporter.syntax_error(
                            *span,
                            "malformed 'vela_use' directive",
                            "expected a keyword name, version string, or '*'",
                        ));
                    }
                };
                // Optional `= true` / `= false`
                if matches!(tokens.get(i + 1).map(|(t, _)| t), Some(Token::Equal)) {
                    let enable = match tokens.get(i + 2).map(|(t, _)| t) {
                        Some(Token::True) => true,
                        Some(Token::False) => false,
                        _ => {
                            return Err(reporter.syntax_error(
                                tokens[i + 1].1,
                                "malformed 'vela_use' directive",
                                "expected 'true' or 'false' after '='",
                            ));
                        }
                    };
                    i += 2;
                    UseItem::Word { word, enable }
                } else {
                    UseItem::Word { word, enable: true }
                }
            }
        };
        items.push((item, *span));
        if matches!(tokens.get(i + 1).map(|(t, _)| t), Some(Token::Comma)) {
            i += 2;
        } else {
            return Ok((items, i + 1));
        }
    }
}

fn word_from_argument(token: &Token) -> Option<ToggledWord> {
    match token {
        Token::Identifier(name) => ToggledWord::from_name(name),
        token => ToggledWord::of_token(token),
    }
}

/// Parses the text of a `-- @vela_use ...` comment directive. The same
/// items as the statement form, in plain text.
fn parse_annotation(
    text: &str,
    span: Span,
    reporter: &Reporter<'_>,
) -> CompileResult<Vec<UseItem>> {
    let mut items = Vec::new();
    for part in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if part == "*" {
            items.push(UseItem::Star);
            continue;
        }
        if let Some(version) = part
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .and_then(parse_version)
        {
            items.push(UseItem::Version(version.0, version.1, version.2));
            continue;
        }
        let (name, enable) = match part.split_once('=') {
            Some((name, value)) => match value.trim() {
                "true" => (name.trim(), true),
                "false" => (name.trim(), false),
                _ => {
                    return Err(reporter.syntax_error(
                        span,
                        "malformed '@vela_use' directive",
                        "expected 'true' or 'false' after '='",
                    ));
                }
            },
            None => (part, true),
        };
        match ToggledWord::from_name(name) {
            Some(word) => items.push(UseItem::Word { word, enable }),
            None => {
                return Err(reporter.syntax_error(
                    span,
                    &format!("unknown keyword '{}' in '@vela_use'", name),
                    "expected a keyword name, version string, or '*'",
                ));
            }
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::WarningMap;
    use crate::error::CompileError;
    use crate::lexer::Lexer;

    fn resolve(source: &str) -> Vec<Token> {
        resolve_with(source, &FxHashMap::default())
    }

    fn resolve_with(source: &str, overrides: &FxHashMap<ToggledWord, bool>) -> Vec<Token> {
        let output = Lexer::new(source).tokenize().unwrap();
        let map = WarningMap::build(&output.warn_directives);
        let mut reporter = Reporter::new(source, "test.vela", map);
        let mut tokens = output.tokens;
        resolve_keywords(&mut tokens, overrides, &mut reporter).unwrap();
        tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords_stay_keywords_without_evidence() {
        let tokens = resolve("switch x do end");
        assert_eq!(tokens[0], Token::Switch);
    }

    #[test]
    fn identifier_usage_degrades_the_whole_chunk() {
        // The assignment on line 2 degrades the occurrence on line 1 too
        let tokens = resolve("print(switch)\nswitch = 1");
        assert_eq!(tokens[2], Token::Identifier("switch".into()));
        assert_eq!(tokens[4], Token::Identifier("switch".into()));
    }

    #[test]
    fn local_declaration_counts_as_identifier_usage() {
        let tokens = resolve("local continue = 1");
        assert_eq!(tokens[1], Token::Identifier("continue".into()));
    }

    #[test]
    fn local_class_declaration_keeps_the_keyword() {
        let tokens = resolve("local class Point do end");
        assert_eq!(tokens[1], Token::Class);
    }

    #[test]
    fn parent_member_access_keeps_the_keyword() {
        let tokens = resolve("parent.greet(self)\nparent:greet()");
        assert_eq!(tokens[0], Token::Parent);
        assert_eq!(tokens[6], Token::Parent);
    }

    #[test]
    fn directive_beats_heuristic() {
        let tokens = resolve("vela_use switch\nswitch = 1");
        // `switch` stays a keyword even though it is assigned to
        assert_eq!(tokens[2], Token::Switch);
    }

    #[test]
    fn disabling_directive_rewrites_keywords() {
        let tokens = resolve("vela_use continue = false\ncontinue = 1");
        assert_eq!(tokens[4], Token::Identifier("continue".into()));
    }

    #[test]
    fn annotation_form_enables_keywords() {
        let tokens = resolve("-- @vela_use switch\nswitch = 1");
        assert_eq!(tokens[0], Token::Switch);
    }

    #[test]
    fn version_bundle_enables_its_keywords() {
        let tokens = resolve("-- @vela_use \"0.5.0\"\nenum = 1\nclass = 1");
        // enum arrived in 0.5.0, class only in 0.6.0
        assert_eq!(tokens[0], Token::Enum);
        assert_eq!(tokens[3], Token::Identifier("class".into()));
    }

    #[test]
    fn opt_in_words_are_identifiers_by_default() {
        let tokens = resolve("let = 1");
        assert_eq!(tokens[0], Token::Identifier("let".into()));
    }

    #[test]
    fn opt_in_words_need_a_directive() {
        let tokens = resolve("-- @vela_use let\nlet x = 1");
        assert_eq!(tokens[0], Token::Let);
    }

    #[test]
    fn enabling_opt_in_word_warns_deprecated() {
        let source = "-- @vela_use let\nlet x = 1";
        let output = Lexer::new(source).tokenize().unwrap();
        let map = WarningMap::build(&output.warn_directives);
        let mut reporter = Reporter::new(source, "test.vela", map);
        let mut tokens = output.tokens;
        resolve_keywords(&mut tokens, &FxHashMap::default(), &mut reporter).unwrap();
        let warnings = reporter.into_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::Deprecated);
    }

    #[test]
    fn star_enables_everything_togglable_and_warns() {
        let source = "vela_use *\nswitch = 1";
        let output = Lexer::new(source).tokenize().unwrap();
        let map = WarningMap::build(&output.warn_directives);
        let mut reporter = Reporter::new(source, "test.vela", map);
        let mut tokens = output.tokens;
        resolve_keywords(&mut tokens, &FxHashMap::default(), &mut reporter).unwrap();
        assert_eq!(tokens[2].0, Token::Switch);
        // non-portable is off by default, so no warning is collected
        assert!(reporter.into_warnings().is_empty());
    }

    #[test]
    fn star_warns_when_non_portable_enabled() {
        let source = "-- @vela_warnings: enable-non-portable\nvela_use *";
        let output = Lexer::new(source).tokenize().unwrap();
        let map = WarningMap::build(&output.warn_directives);
        let mut reporter = Reporter::new(source, "test.vela", map);
        let mut tokens = output.tokens;
        resolve_keywords(&mut tokens, &FxHashMap::default(), &mut reporter).unwrap();
        let warnings = reporter.into_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::NonPortable);
    }

    fn warnings_for(source: &str) -> Vec<crate::diag::Warning> {
        let output = Lexer::new(source).tokenize().unwrap();
        let map = WarningMap::build(&output.warn_directives);
        let mut reporter = Reporter::new(source, "test.vela", map);
        let mut tokens = output.tokens;
        resolve_keywords(&mut tokens, &FxHashMap::default(), &mut reporter).unwrap();
        reporter.into_warnings()
    }

    #[test]
    fn environment_enabled_keyword_usage_warns_non_portable() {
        let warnings = warnings_for("-- @vela_warnings: enable-non-portable\nswitch x do end");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::NonPortable);
        assert!(warnings[0].message.contains("non-portable keyword usage"));
    }

    #[test]
    fn directive_enabled_keyword_usage_is_portable() {
        let warnings = warnings_for(
            "-- @vela_warnings: enable-non-portable\nvela_use switch\nswitch x do end",
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn degraded_word_used_as_a_name_warns_non_portable() {
        let warnings = warnings_for("-- @vela_warnings: enable-non-portable\nlocal switch = 1");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::NonPortable);
        assert!(warnings[0].message.contains("non-portable name"));
    }

    #[test]
    fn directive_disabled_word_is_a_portable_name() {
        let warnings = warnings_for(
            "-- @vela_warnings: enable-non-portable\nvela_use switch = false\nlocal switch = 1",
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn host_override_disables_a_word() {
        let mut overrides = FxHashMap::default();
        overrides.insert(ToggledWord::Switch, false);
        let tokens = resolve_with("switch x do end", &overrides);
        assert_eq!(tokens[0], Token::Identifier("switch".into()));
    }

    #[test]
    fn directive_beats_host_override() {
        let mut overrides = FxHashMap::default();
        overrides.insert(ToggledWord::Switch, false);
        let tokens = resolve_with("vela_use switch\nswitch x do end", &overrides);
        assert_eq!(tokens[2], Token::Switch);
    }

    #[test]
    fn prefixed_aliases_are_never_rewritten() {
        let tokens = resolve("switch = 1\nvela_switch x do end");
        assert_eq!(tokens[0], Token::Identifier("switch".into()));
        assert_eq!(tokens[3], Token::VelaSwitch);
    }

    #[test]
    fn unknown_version_is_an_error() {
        let source = "vela_use \"approximately six\"";
        let output = Lexer::new(source).tokenize().unwrap();
        let map = WarningMap::build(&output.warn_directives);
        let mut reporter = Reporter::new(source, "test.vela", map);
        let mut tokens = output.tokens;
        let result = resolve_keywords(&mut tokens, &FxHashMap::default(), &mut reporter);
        assert!(matches!(result, Err(CompileError::Syntax { .. })));
    }
}
