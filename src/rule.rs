//! Inhibition rule: class pattern plus treatment.

use std::fmt;

use crate::error::{AntidoteError, Result};
use crate::pattern::Pattern;
use crate::types::Treatment;

/// Single inhibition rule. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rule {
    id: String,
    treatment: Treatment,
    pattern: Pattern,
}

impl Rule {
    /// Builds a rule from typed parts. Fails on an empty id.
    pub fn new(id: impl Into<String>, treatment: Treatment, pattern: Pattern) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(AntidoteError::Validation(format!("invalid id: {:?}", id)));
        }

        Ok(Self {
            id,
            treatment,
            pattern,
        })
    }

    /// Builds a rule from raw stored strings, validating every field.
    ///
    /// Pattern compilation errors are propagated unchanged.
    pub fn parse(id: &str, treatment: &str, pattern: &str) -> Result<Self> {
        let pattern = Pattern::compile(pattern)?;
        if id.is_empty() {
            return Err(AntidoteError::Validation(format!("invalid id: {:?}", id)));
        }
        let treatment = treatment.parse()?;

        Self::new(id, treatment, pattern)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn treatment(&self) -> Treatment {
        self.treatment
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Returns true if the job's display class matches this rule.
    #[inline]
    pub fn matches(&self, display_class: &str) -> bool {
        self.pattern.is_match(display_class)
    }

    /// Lethal rules move matched jobs to the permanent-failure set.
    pub fn is_lethal(&self) -> bool {
        self.treatment == Treatment::Kill
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.treatment, self.pattern)
    }
}
