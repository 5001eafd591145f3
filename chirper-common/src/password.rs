//! Password strength policy applied at signup.

use std::{collections::HashMap, ops::RangeInclusive};

pub const DEFAULT_MIN_LENGTH: usize = 8;
pub const DEFAULT_MAX_SIMILARITY: f64 = 0.7;
pub const MAX_SIMILARITY_RANGE: RangeInclusive<f64> = 0.1..=1.0;

#[derive(Copy, Clone, PartialEq, Debug)]
pub struct PasswordPolicy {
    pub min_length: usize,
    /// Passwords whose similarity ratio to an account attribute reaches this
    /// value are rejected. Must lie in [`MAX_SIMILARITY_RANGE`].
    pub max_similarity: f64,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            max_similarity: DEFAULT_MAX_SIMILARITY,
        }
    }
}

impl PasswordPolicy {
    #[must_use]
    pub fn is_too_short(&self, password: &str) -> bool {
        password.chars().count() < self.min_length
    }

    /// Compares case-insensitively against the whole attribute and against
    /// each of its parts split on non-word characters, so `test@test.com`
    /// is also checked as `test`, `test` and `com`.
    #[must_use]
    pub fn is_too_similar(&self, password: &str, attribute: &str) -> bool {
        if password.is_empty() || attribute.is_empty() {
            return false;
        }

        let password = password.to_lowercase();
        let attribute = attribute.to_lowercase();

        attribute
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|part| !part.is_empty())
            .chain(std::iter::once(attribute.as_str()))
            .filter(|part| !self.is_negligible_part(&password, part))
            .any(|part| similarity_ratio(&password, part) >= self.max_similarity)
    }

    /// A very short attribute part inside a much longer password cannot make
    /// the password guessable on its own.
    #[allow(clippy::cast_precision_loss)]
    fn is_negligible_part(&self, password: &str, part: &str) -> bool {
        let password_len = password.chars().count();
        let part_len = part.chars().count();
        let length_bound = self.max_similarity / 2.0 * password_len as f64;

        password_len >= 10 * part_len && (part_len as f64) < length_bound
    }
}

#[must_use]
pub fn is_entirely_numeric(password: &str) -> bool {
    !password.is_empty() && password.chars().all(char::is_numeric)
}

/// `2 * common / (len(a) + len(b))`, where `common` counts characters shared
/// by both strings with multiplicity, ignoring order.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 1.0;
    }

    let mut available: HashMap<char, usize> = HashMap::new();
    for c in b.chars() {
        *available.entry(c).or_default() += 1;
    }

    let mut common = 0_usize;
    for c in a.chars() {
        if let Some(count) = available.get_mut(&c)
            && *count > 0
        {
            *count -= 1;
            common += 1;
        }
    }

    (2 * common) as f64 / total as f64
}
