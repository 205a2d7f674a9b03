//! # Input validators.
//!
//! A [`Validator`] checks the current values of one named target. Values are
//! read through the dispatcher's [`ValueSource`](crate::ValueSource); a target
//! the source does not know validates as having no values.
//!
//! Built-ins: [`Required`], [`CharLength`], [`ByteLength`], [`Pattern`].

use std::fmt;

use regex::Regex;

use crate::binding::ValueSource;

/// Checks the values of one target.
pub trait Validator: Send + Sync {
    /// Name of the target whose values are checked.
    fn target(&self) -> &str;

    /// Message reported when the check fails.
    fn message(&self) -> String;

    /// `true` when every value passes.
    fn validate(&self, values: &[String]) -> bool;
}

/// One failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub target: String,
    pub message: String,
}

/// Failed validations of one invocation, in validator order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// True if some validator of `target` failed.
    pub fn contains(&self, target: &str) -> bool {
        self.errors.iter().any(|e| e.target == target)
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for e in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", e.target, e.message)?;
        }
        Ok(())
    }
}

/// Runs every validator and collects the failures.
pub fn run_validators(validators: &[Box<dyn Validator>], source: Option<&dyn ValueSource>) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    for v in validators {
        let values = source.and_then(|s| s.values(v.target())).unwrap_or_default();
        if !v.validate(&values) {
            errors.push(ValidationError {
                target: v.target().to_string(),
                message: v.message(),
            });
        }
    }
    errors
}

/// Every value must be non-empty, and there must be at least one.
#[derive(Clone, Debug)]
pub struct Required {
    target: String,
    message: Option<String>,
}

impl Required {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Validator for Required {
    fn target(&self) -> &str {
        &self.target
    }

    fn message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("{} is required", self.target))
    }

    fn validate(&self, values: &[String]) -> bool {
        !values.is_empty() && values.iter().all(|v| !v.is_empty())
    }
}

/// Every value must have between `min` and `max` characters.
#[derive(Clone, Debug)]
pub struct CharLength {
    target: String,
    min: usize,
    max: usize,
}

impl CharLength {
    pub fn new(target: impl Into<String>, min: usize, max: usize) -> Self {
        Self {
            target: target.into(),
            min,
            max,
        }
    }
}

impl Validator for CharLength {
    fn target(&self) -> &str {
        &self.target
    }

    fn message(&self) -> String {
        format!("{} must be {}-{} characters long", self.target, self.min, self.max)
    }

    fn validate(&self, values: &[String]) -> bool {
        values.iter().all(|v| (self.min..=self.max).contains(&v.chars().count()))
    }
}

/// Every value must take between `min` and `max` bytes in UTF-8.
#[derive(Clone, Debug)]
pub struct ByteLength {
    target: String,
    min: usize,
    max: usize,
}

impl ByteLength {
    pub fn new(target: impl Into<String>, min: usize, max: usize) -> Self {
        Self {
            target: target.into(),
            min,
            max,
        }
    }
}

impl Validator for ByteLength {
    fn target(&self) -> &str {
        &self.target
    }

    fn message(&self) -> String {
        format!("{} must be {}-{} bytes long", self.target, self.min, self.max)
    }

    fn validate(&self, values: &[String]) -> bool {
        values.iter().all(|v| (self.min..=self.max).contains(&v.len()))
    }
}

/// Every value must match the whole pattern.
#[derive(Clone, Debug)]
pub struct Pattern {
    target: String,
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles `pattern`, anchored at both ends.
    pub fn new(target: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            target: target.into(),
            source: pattern.to_string(),
            regex: Regex::new(&format!("^(?:{pattern})$"))?,
        })
    }
}

impl Validator for Pattern {
    fn target(&self) -> &str {
        &self.target
    }

    fn message(&self) -> String {
        format!("{} must match {}", self.target, self.source)
    }

    fn validate(&self, values: &[String]) -> bool {
        values.iter().all(|v| self.regex.is_match(v))
    }
}
