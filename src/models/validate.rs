//! Field validation helpers
//!
//! A [`Validator`] collects every failing rule instead of stopping at the
//! first one, so a rejected hit reports all of its problems at once.

use std::fmt;

/// One or more fields failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub errors: Vec<(String, String)>,
}

impl ValidationError {
    /// Check whether `field` has at least one recorded error
    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|(f, _)| f == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, msg)) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<(String, String)>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, field: &str, msg: impl Into<String>) {
        self.errors.push((field.to_string(), msg.into()));
    }

    pub fn required(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.append(field, "must be set");
        }
    }

    /// Length bounds in bytes, inclusive
    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.len();
        if len < min {
            self.append(field, format!("must be at least {min} bytes"));
        } else if len > max {
            self.append(field, format!("must be at most {max} bytes (got {len})"));
        }
    }

    pub fn printable(&mut self, field: &str, value: &str) {
        if value.chars().any(char::is_control) {
            self.append(field, "must not contain control characters");
        }
    }

    pub fn error(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                errors: self.errors,
            })
        }
    }
}
