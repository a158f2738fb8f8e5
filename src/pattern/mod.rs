//! Job display class patterns.
//!
//! Some job classes are represented by class and method name (e.g.
//! `OnboardingMailer#welcome`); patterns handle both forms.
//!
//! # Special characters
//! - `*` matches any number of alphanumerics and underscores within one
//!   component: `Foo`, `FooBar`, `method_name`.
//! - `**` matches any number of components: `Foo`, `Foo::Bar`,
//!   `Foo::Bar#method_name`.
//! - `{A,B,C}` matches literal `A`, `B`, or `C`.
//!
//! Matching is case-insensitive and covers the whole display class.

mod compiler;
mod matcher;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PatternError;
use compiler::Token;

/// Compiled, immutable class pattern.
///
/// Two patterns are equal when their (trimmed) sources are equal.
#[derive(Clone)]
pub struct Pattern {
    source: Arc<str>,
    tokens: Arc<[Token]>,
}

impl Pattern {
    /// Compiles `source` after trimming surrounding whitespace.
    pub fn compile(source: &str) -> Result<Self, PatternError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(PatternError::Blank);
        }

        let tokens = compiler::compile(source)?;
        Ok(Self {
            source: Arc::from(source),
            tokens: Arc::from(tokens),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns true if `display_class` matches the whole pattern.
    #[inline]
    pub fn is_match(&self, display_class: &str) -> bool {
        matcher::is_match(&self.tokens, display_class)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl Hash for Pattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::compile(&source).map_err(serde::de::Error::custom)
    }
}
