//! The type hint model.
//!
//! Hints are advisory: they never change generated code, only feed the
//! `type-mismatch` and `unknown-type` warnings. A hint holds up to
//! [`MAX_TYPE_DESCS`] primitive types. Writing a wider union collapses
//! the hint to the wildcard, keeping only nilability, so a hint is
//! always cheap to store and compare.

use std::fmt;

/// Primitive types a hint can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimType {
    Nil,
    Boolean,
    Number,
    Int,
    Float,
    String,
    Table,
    Function,
    Userdata,
    /// Only valid as a sole return hint.
    Void,
}

impl PrimType {
    pub fn from_name(name: &str) -> Option<PrimType> {
        match name {
            "nil" => Some(PrimType::Nil),
            "boolean" | "bool" => Some(PrimType::Boolean),
            "number" => Some(PrimType::Number),
            "int" => Some(PrimType::Int),
            "float" => Some(PrimType::Float),
            "string" => Some(PrimType::String),
            "table" => Some(PrimType::Table),
            "function" => Some(PrimType::Function),
            "userdata" => Some(PrimType::Userdata),
            "void" => Some(PrimType::Void),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimType::Nil => "nil",
            PrimType::Boolean => "boolean",
            PrimType::Number => "number",
            PrimType::Int => "int",
            PrimType::Float => "float",
            PrimType::String => "string",
            PrimType::Table => "table",
            PrimType::Function => "function",
            PrimType::Userdata => "userdata",
            PrimType::Void => "void",
        }
    }
}

/// How many primitive types one hint can carry before collapsing.
pub const MAX_TYPE_DESCS: usize = 3;

/// A type hint attached to a local, parameter, or return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeHint {
    descs: [Option<PrimType>; MAX_TYPE_DESCS],
    /// Collapsed union: matches every type except a bare nil.
    wildcard: bool,
}

impl TypeHint {
    pub fn of(t: PrimType) -> TypeHint {
        let mut hint = TypeHint::default();
        hint.emplace(t);
        hint
    }

    pub fn any() -> TypeHint {
        TypeHint {
            descs: [None; MAX_TYPE_DESCS],
            wildcard: true,
        }
    }

    /// An absent hint carries no information.
    pub fn is_empty(&self) -> bool {
        !self.wildcard && self.descs[0].is_none()
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn contains(&self, t: PrimType) -> bool {
        self.descs.iter().any(|d| *d == Some(t))
    }

    pub fn nilable(&self) -> bool {
        self.contains(PrimType::Nil)
    }

    /// True for hints that promise a useful value: non-empty and
    /// neither `void` nor plain `nil`.
    pub fn promises_value(&self) -> bool {
        if self.is_empty() || self.contains(PrimType::Void) {
            return false;
        }
        self.wildcard || self.descs.iter().flatten().any(|d| *d != PrimType::Nil)
    }

    /// Adds a primitive type to the hint. Adding `int` to a hint that
    /// holds `float` (or vice versa) widens both into `number`. When
    /// the hint is full it collapses to the wildcard, preserving only
    /// whether nil was allowed.
    pub fn emplace(&mut self, t: PrimType) {
        if self.contains(t) || (self.wildcard && t != PrimType::Nil) {
            return;
        }

        // int|float is just number
        let t = match t {
            PrimType::Int if self.contains(PrimType::Float) => {
                self.remove(PrimType::Float);
                PrimType::Number
            }
            PrimType::Float if self.contains(PrimType::Int) => {
                self.remove(PrimType::Int);
                PrimType::Number
            }
            PrimType::Int | PrimType::Float if self.contains(PrimType::Number) => return,
            other => other,
        };
        if self.contains(t) {
            return;
        }

        for slot in &mut self.descs {
            if slot.is_none() {
                *slot = Some(t);
                return;
            }
        }

        // Full: collapse to the wildcard, keeping nilability
        let nilable = self.nilable() || t == PrimType::Nil;
        self.descs = [None; MAX_TYPE_DESCS];
        self.wildcard = true;
        if nilable {
            self.descs[0] = Some(PrimType::Nil);
        }
    }

    fn remove(&mut self, t: PrimType) {
        let mut write = 0;
        let old = self.descs;
        self.descs = [None; MAX_TYPE_DESCS];
        for d in old.into_iter().flatten() {
            if d != t {
                self.descs[write] = Some(d);
                write += 1;
            }
        }
    }

    /// Whether a value described by `value` is acceptable where this
    /// hint applies. Hints overlap when any type of the value matches
    /// any type of the hint; warnings only fire when there is no
    /// overlap at all.
    pub fn compatible_with(&self, value: &TypeHint) -> bool {
        if self.is_empty() || value.is_empty() {
            return true;
        }
        if value.wildcard {
            return true;
        }
        if self.wildcard {
            // A definitely-nil value needs an explicitly nilable hint
            let only_nil = value.descs.iter().flatten().all(|d| *d == PrimType::Nil);
            return !only_nil || self.nilable();
        }
        value.descs.iter().flatten().any(|v| {
            self.descs
                .iter()
                .flatten()
                .any(|h| prim_compatible(*h, *v))
        })
    }
}

fn prim_compatible(hint: PrimType, value: PrimType) -> bool {
    if hint == value {
        return true;
    }
    matches!(
        (hint, value),
        (PrimType::Number, PrimType::Int | PrimType::Float)
            | (PrimType::Int | PrimType::Float, PrimType::Number)
    )
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("unknown");
        }
        if self.nilable() {
            let others = self.wildcard || self.descs.iter().flatten().any(|d| *d != PrimType::Nil);
            if !others {
                return f.write_str("nil");
            }
            f.write_str("?")?;
        }
        if self.wildcard {
            return f.write_str("any");
        }
        let mut first = true;
        for d in self.descs.iter().flatten() {
            if *d == PrimType::Nil {
                continue;
            }
            if !first {
                f.write_str("|")?;
            }
            f.write_str(d.name())?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hint_is_compatible_with_everything() {
        let empty = TypeHint::default();
        assert!(empty.compatible_with(&TypeHint::of(PrimType::String)));
        assert!(TypeHint::of(PrimType::String).compatible_with(&empty));
    }

    #[test]
    fn int_and_float_widen_to_number() {
        let mut hint = TypeHint::of(PrimType::Int);
        hint.emplace(PrimType::Float);
        assert!(hint.contains(PrimType::Number));
        assert!(!hint.contains(PrimType::Int));
        assert!(!hint.contains(PrimType::Float));
    }

    #[test]
    fn number_accepts_int_and_float() {
        let number = TypeHint::of(PrimType::Number);
        assert!(number.compatible_with(&TypeHint::of(PrimType::Int)));
        assert!(number.compatible_with(&TypeHint::of(PrimType::Float)));
        assert!(!number.compatible_with(&TypeHint::of(PrimType::String)));
    }

    #[test]
    fn overflow_collapses_to_wildcard() {
        let mut hint = TypeHint::of(PrimType::String);
        hint.emplace(PrimType::Table);
        hint.emplace(PrimType::Function);
        assert!(!hint.is_wildcard());
        hint.emplace(PrimType::Boolean);
        assert!(hint.is_wildcard());
        assert!(!hint.nilable());
        assert!(hint.compatible_with(&TypeHint::of(PrimType::Userdata)));
    }

    #[test]
    fn collapse_preserves_nilability() {
        let mut hint = TypeHint::of(PrimType::Nil);
        hint.emplace(PrimType::String);
        hint.emplace(PrimType::Table);
        hint.emplace(PrimType::Boolean);
        assert!(hint.is_wildcard());
        assert!(hint.nilable());
        assert!(hint.compatible_with(&TypeHint::of(PrimType::Nil)));

        let mut plain = TypeHint::of(PrimType::String);
        plain.emplace(PrimType::Table);
        plain.emplace(PrimType::Boolean);
        plain.emplace(PrimType::Userdata);
        assert!(plain.is_wildcard());
        assert!(!plain.compatible_with(&TypeHint::of(PrimType::Nil)));
    }

    #[test]
    fn duplicate_emplace_is_a_no_op() {
        let mut hint = TypeHint::of(PrimType::String);
        hint.emplace(PrimType::String);
        hint.emplace(PrimType::String);
        assert_eq!(hint, TypeHint::of(PrimType::String));
    }

    #[test]
    fn display_formats_unions() {
        let mut hint = TypeHint::of(PrimType::String);
        hint.emplace(PrimType::Int);
        assert_eq!(hint.to_string(), "string|int");

        let mut nilable = TypeHint::of(PrimType::Nil);
        nilable.emplace(PrimType::String);
        assert_eq!(nilable.to_string(), "?string");

        assert_eq!(TypeHint::of(PrimType::Nil).to_string(), "nil");
        assert_eq!(TypeHint::any().to_string(), "any");
        assert_eq!(TypeHint::default().to_string(), "unknown");
    }

    #[test]
    fn promises_value() {
        assert!(TypeHint::of(PrimType::String).promises_value());
        assert!(TypeHint::any().promises_value());
        assert!(!TypeHint::default().promises_value());
        assert!(!TypeHint::of(PrimType::Void).promises_value());
        assert!(!TypeHint::of(PrimType::Nil).promises_value());
    }
}
