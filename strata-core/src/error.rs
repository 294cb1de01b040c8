//! Commit-time validation errors
//!
//! A pipeline definition is rejected as a whole; nothing is stored and no
//! environment is touched when validation fails.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Two steps or two packages share a name.
    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    /// A step dependency does not resolve to a declared step.
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    /// The step graph contains a cycle; the path names the offending steps.
    #[error("step dependency cycle: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A required draft field was never set.
    #[error("{field} is unset")]
    Incomplete { field: &'static str },

    /// `set key=value` used a key the current item does not have.
    #[error("unknown attribute for {kind}: {key}")]
    UnknownAttribute { kind: &'static str, key: String },

    #[error("unknown package provider: {0}")]
    UnknownProvider(String),

    /// Pipeline names feed zone and dataset names, so the charset is
    /// restricted to `[a-z0-9_-]` and the length to 32.
    #[error("invalid pipeline name '{0}': lowercase alphanumerics, '-' and '_' only, max 32 chars")]
    InvalidPipelineName(String),

    #[error("{kind} name cannot be empty")]
    EmptyName { kind: &'static str },

    /// Two repositories would clone into the same directory.
    #[error("repositories '{first}' and '{second}' clone into the same directory '{dir}'")]
    CheckoutCollision {
        first: String,
        second: String,
        dir: String,
    },
}

/// Checks a pipeline name against the zone/dataset naming constraints.
pub fn validate_pipeline_name(name: &str) -> Result<(), ValidationError> {
    let valid = !name.is_empty()
        && name.len() <= 32
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidPipelineName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_pipeline_names() {
        assert!(validate_pipeline_name("katarineko").is_ok());
        assert!(validate_pipeline_name("web_api-2").is_ok());
    }

    #[test]
    fn test_invalid_pipeline_names() {
        assert!(validate_pipeline_name("").is_err());
        assert!(validate_pipeline_name("Big").is_err());
        assert!(validate_pipeline_name("has space").is_err());
        assert!(validate_pipeline_name(&"x".repeat(33)).is_err());
    }
}
