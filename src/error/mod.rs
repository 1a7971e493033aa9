//! Error and diagnostic types shared by every analysis in the crate.
//!
//! Hard failures are reported through [`AnalysisError`]. Conditions that still leave a usable
//! answer behind (a varimax rotation that hit its iteration cap, for instance) are reported as
//! [`Diagnostic`] values attached to the corresponding result.

use serde::Serialize;
use thiserror::Error;

use crate::scores::IdenticalElements;

/// Failures raised by the analysis routines.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AnalysisError {
    /// A matrix row does not have the same length as the first row.
    #[error("Ragged matrix: row {row} has {actual} entries, expected {expected}")]
    RaggedMatrix {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// Not enough items, persons or trials for the requested operation.
    #[error("Insufficient data for {operation}: need at least {required} {what}, got {actual}")]
    InsufficientData {
        operation: &'static str,
        what: &'static str,
        required: usize,
        actual: usize,
    },

    /// Input values that can never be analysed (non-finite scores, mismatched lengths, ...).
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A computation with no documented fallback hit a degenerate case.
    #[error("Degenerate computation in {operation}: {reason}")]
    DegenerateComputation {
        operation: &'static str,
        reason: String,
    },

    /// A configuration value is out of range for the data it is applied to.
    #[error("Configuration error: {parameter} = {value}, {reason}")]
    Configuration {
        parameter: &'static str,
        value: String,
        reason: String,
    },

    /// A probability distribution could not be constructed.
    #[error("Distribution error: {0}")]
    Distribution(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        AnalysisError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate(operation: &'static str, reason: impl Into<String>) -> Self {
        AnalysisError::DegenerateComputation {
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn configuration(
        parameter: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        AnalysisError::Configuration {
            parameter,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Advisory conditions attached to otherwise valid results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    /// Varimax stopped at its iteration cap; the returned loadings are the last pass.
    VarimaxNotConverged {
        iterations: usize,
        tolerance: f64,
        last_change: f64,
        /// Rows or columns of identical values in the data commonly stall the criterion
        /// while the returned values remain correct.
        identical_elements: IdenticalElements,
    },
    /// The rotated loadings carry no variance, so they were left unscaled.
    ZeroRotatedVariance,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::VarimaxNotConverged {
                iterations,
                tolerance,
                last_change,
                identical_elements,
            } => {
                write!(
                    f,
                    "varimax rotation not converged after {} iterations (tolerance {:e}, last change {:e})",
                    iterations, tolerance, last_change
                )?;
                if *identical_elements != IdenticalElements::None {
                    write!(
                        f,
                        "; identical row/column elements in the data probably impede convergence"
                    )?;
                }
                Ok(())
            }
            Diagnostic::ZeroRotatedVariance => {
                write!(f, "rotated loadings have zero total variance, scaling skipped")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AnalysisError::RaggedMatrix {
            row: 2,
            expected: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Ragged matrix: row 2 has 3 entries, expected 4"
        );

        let err = AnalysisError::configuration("n_components", 7, "only 5 items available");
        assert!(err.to_string().contains("n_components = 7"));
    }

    #[test]
    fn test_diagnostic_display_mentions_identical_elements() {
        let diag = Diagnostic::VarimaxNotConverged {
            iterations: 10,
            tolerance: 1e-8,
            last_change: 1e-3,
            identical_elements: IdenticalElements::Rows,
        };
        assert!(diag.to_string().contains("identical"));

        let diag = Diagnostic::VarimaxNotConverged {
            iterations: 10,
            tolerance: 1e-8,
            last_change: 1e-3,
            identical_elements: IdenticalElements::None,
        };
        assert!(!diag.to_string().contains("identical"));
    }
}
