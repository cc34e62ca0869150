//! Sensitive data marker for automatic redaction.
//!
//! Wraps values (session variables, credentials passed through a rule
//! matcher) that must never be accidentally logged.

use std::fmt;

/// Wrapper for sensitive data that redacts itself in `Debug` and `Display`.
///
/// ```
/// use tridb_core_types::Sensitive;
///
/// let token = Sensitive::new("secret123");
/// assert_eq!(format!("{:?}", token), "***REDACTED***");
/// assert_eq!(token.expose(), &"secret123");
/// ```
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Access the underlying value. Use sparingly.
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

impl<T: Clone> Clone for Sensitive<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let secret = Sensitive::new("my-secret-password");
        let out = format!("{:?}", secret);
        assert_eq!(out, "***REDACTED***");
    }

    #[test]
    fn expose_returns_value() {
        let secret = Sensitive::new(42);
        assert_eq!(secret.expose(), &42);
    }

    #[test]
    fn into_inner_consumes_wrapper() {
        let secret = Sensitive::new(String::from("test"));
        assert_eq!(secret.into_inner(), "test");
    }
}
