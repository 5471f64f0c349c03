//! Deferred pre-flight validations.
//!
//! Operations expose checks as closures so a broader validation runner
//! can collect and execute them alongside checks from other subsystems.

use crate::gitops::error::GitOpsError;

/// Outcome of a single validation.
#[derive(Debug)]
pub struct ValidationResult {
    /// Human-readable name of the check.
    pub name: String,
    /// Remediation hint shown on failure.
    pub remediation: String,
    /// The failure, if the check did not pass.
    pub err: Option<GitOpsError>,
}

impl ValidationResult {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remediation: String::new(),
            err: None,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        remediation: impl Into<String>,
        err: GitOpsError,
    ) -> Self {
        Self {
            name: name.into(),
            remediation: remediation.into(),
            err: Some(err),
        }
    }
}

/// A deferred check; run it to get a result.
pub type Validation<'a> = Box<dyn FnOnce() -> ValidationResult + 'a>;

/// Runs a set of validations, returning the first failure.
pub fn run_validations(validations: Vec<Validation<'_>>) -> Result<(), GitOpsError> {
    for validation in validations {
        let result = validation();
        if let Some(err) = result.err {
            return Err(err);
        }
    }
    Ok(())
}
