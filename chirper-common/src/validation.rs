//! Ordered form validation.
//!
//! A [`Validator`] is a list of `(field, predicate, message)` rules. Every rule
//! runs, in declaration order, and each failing rule appends its message to
//! the errors of its field. Nothing short-circuits, so a submission comes back
//! with every problem at once.

use serde::Serialize;
use std::collections::BTreeMap;

/// Key for errors that belong to the form as a whole.
pub const NON_FIELD_ERRORS: &str = "__all__";

pub const REQUIRED_MESSAGE: &str = "This field is required.";

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<&'static str, Vec<String>>);

impl FormErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.add(NON_FIELD_ERRORS, message);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn non_field(&self) -> &[String] {
        self.field(NON_FIELD_ERRORS)
    }

    /// `Ok(())` when no rule failed.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

struct Rule<T> {
    field: &'static str,
    is_valid: Predicate<T>,
    message: String,
}

pub struct Validator<T> {
    rules: Vec<Rule<T>>,
}

impl<T> Default for Validator<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T> Validator<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule that fails when `is_valid` returns `false`.
    #[must_use]
    pub fn rule(
        mut self,
        field: &'static str,
        is_valid: impl Fn(&T) -> bool + Send + Sync + 'static,
        message: impl Into<String>,
    ) -> Self {
        self.rules.push(Rule {
            field,
            is_valid: Box::new(is_valid),
            message: message.into(),
        });
        self
    }

    /// Shorthand for a non-empty check with the standard message.
    #[must_use]
    pub fn required(
        self,
        field: &'static str,
        value: impl Fn(&T) -> &str + Send + Sync + 'static,
    ) -> Self {
        self.rule(field, move |form| !value(form).is_empty(), REQUIRED_MESSAGE)
    }

    #[must_use]
    pub fn validate(&self, form: &T) -> FormErrors {
        let mut errors = FormErrors::new();
        for rule in &self.rules {
            if !(rule.is_valid)(form) {
                errors.add(rule.field, rule.message.clone());
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use crate::validation::{FormErrors, NON_FIELD_ERRORS, REQUIRED_MESSAGE, Validator};

    struct Pair {
        left: String,
        right: String,
    }

    fn validator() -> Validator<Pair> {
        Validator::new()
            .required("left", |pair: &Pair| pair.left.as_str())
            .required("right", |pair: &Pair| pair.right.as_str())
            .rule("right", |pair| pair.right.len() < 4, "too long")
            .rule("right", |pair| !pair.right.contains('x'), "has an x")
            .rule("right", |pair| pair.left == pair.right, "mismatch")
    }

    #[test]
    fn collects_every_failure_in_order() {
        let errors = validator().validate(&Pair {
            left: String::new(),
            right: "xxxxx".to_owned(),
        });

        assert_eq!(errors.field("left"), [REQUIRED_MESSAGE]);
        assert_eq!(errors.field("right"), ["too long", "has an x", "mismatch"]);
        assert!(errors.non_field().is_empty());
    }

    #[test]
    fn valid_input_has_no_errors() {
        let errors = validator().validate(&Pair {
            left: "ab".to_owned(),
            right: "ab".to_owned(),
        });

        assert!(errors.is_empty());
        assert_eq!(errors.into_result(), Ok(()));
    }

    #[test]
    fn non_field_errors_serialize_under_all() {
        let mut errors = FormErrors::new();
        errors.add_non_field("bad credentials");

        assert_eq!(errors.field(NON_FIELD_ERRORS), ["bad credentials"]);
        assert!(errors.into_result().is_err());
    }
}
