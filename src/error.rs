//! Error taxonomy for the gridding pipeline.
//!
//! Every failure is fatal to the fit that raised it; nothing is retried.
//! [`GridError::category`] groups variants into the four classes callers
//! usually branch on (configuration, data quality, numerical, resource).

use thiserror::Error;

/// Broad class of a [`GridError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Contradictory or missing settings, detected before any data is used.
    Configuration,
    /// The observations themselves cannot be gridded as given.
    DataQuality,
    /// Elimination or decomposition failed.
    Numerical,
    /// The dense system does not fit in the allowed (or available) memory.
    Resource,
}

/// Gridding error variants.
#[derive(Debug, Error)]
pub enum GridError {
    /// Poisson's ratio outside the physically meaningful range.
    #[error("Poisson's ratio must be finite and greater than -1, got {0}")]
    InvalidPoissonRatio(f64),

    /// Fudge value that cannot keep the Green's functions finite.
    #[error("fudge value must be finite and positive, got {0}")]
    InvalidFudge(f64),

    /// SVD cutoff outside its valid domain.
    #[error("invalid SVD cutoff: {0}")]
    InvalidCutoff(String),

    /// Output lattice description is inconsistent.
    #[error("invalid output lattice: {0}")]
    InvalidLattice(String),

    /// Mask does not cover the lattice it restricts.
    #[error("mask has {got} cells but the lattice has {expected} nodes")]
    MaskSizeMismatch { expected: usize, got: usize },

    /// Coefficient vectors do not pair up with each other or with their sources.
    #[error("expected {expected} coefficient pairs, got {got}")]
    CoefficientMismatch { expected: usize, got: usize },

    /// Weighting was requested but an observation carries no weight columns.
    #[error("weights requested but observation {0} has none")]
    MissingWeights(usize),

    /// Nothing to grid.
    #[error("no observations were supplied")]
    NoObservations,

    /// An observation holds a non-finite value or an unusable weight.
    #[error("observation {index} is invalid: {reason}")]
    InvalidObservation { index: usize, reason: &'static str },

    /// Coincident locations with different observations under a solver that
    /// cannot tolerate the resulting singular system.
    #[error(
        "{count} data constraint(s) share a location but differ in observation \
         (first: {a} and {b}); reconcile duplicates (e.g. block-average them) before gridding, \
         or solve by truncated SVD with a positive cutoff",
        a = first.0,
        b = first.1
    )]
    ConflictingDuplicates { count: usize, first: (usize, usize) },

    /// Gauss-Jordan elimination hit a zero pivot.
    #[error(
        "matrix is singular{note}; nearly duplicate data constraints are the usual cause, \
         preprocess the data to remove them or solve by truncated SVD",
        note = if *coincident { " (coincident data constraints present)" } else { "" }
    )]
    SingularMatrix { coincident: bool },

    /// Singular value decomposition did not converge.
    #[error("singular value decomposition failed: {0}")]
    DecompositionFailed(String),

    /// The dense matrix would exceed the configured memory cap.
    #[error("{constraints} constraints need a {bytes}-byte matrix, above the {limit}-byte limit")]
    MatrixTooLarge {
        constraints: usize,
        bytes: usize,
        limit: usize,
    },

    /// The allocator refused the dense matrix.
    #[error("could not allocate {bytes} bytes for the linear system")]
    AllocationFailed { bytes: usize },

    /// A fitted model could not be (de)serialized.
    #[error("model serialization failed: {0}")]
    Serialization(String),
}

impl GridError {
    /// The taxonomy class of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            GridError::InvalidPoissonRatio(_)
            | GridError::InvalidFudge(_)
            | GridError::InvalidCutoff(_)
            | GridError::InvalidLattice(_)
            | GridError::MaskSizeMismatch { .. }
            | GridError::CoefficientMismatch { .. }
            | GridError::MissingWeights(_) => ErrorCategory::Configuration,
            GridError::NoObservations
            | GridError::InvalidObservation { .. }
            | GridError::ConflictingDuplicates { .. } => ErrorCategory::DataQuality,
            GridError::SingularMatrix { .. } | GridError::DecompositionFailed(_) => {
                ErrorCategory::Numerical
            }
            GridError::MatrixTooLarge { .. }
            | GridError::AllocationFailed { .. }
            | GridError::Serialization(_) => ErrorCategory::Resource,
        }
    }
}

/// Result type for gridding operations.
pub type Result<T> = std::result::Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            GridError::InvalidCutoff("x".into()).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            GridError::ConflictingDuplicates {
                count: 1,
                first: (0, 3)
            }
            .category(),
            ErrorCategory::DataQuality
        );
        assert_eq!(
            GridError::SingularMatrix { coincident: false }.category(),
            ErrorCategory::Numerical
        );
        assert_eq!(
            GridError::AllocationFailed { bytes: 8 }.category(),
            ErrorCategory::Resource
        );
    }

    #[test]
    fn test_messages_are_actionable() {
        let msg = GridError::ConflictingDuplicates {
            count: 2,
            first: (1, 4),
        }
        .to_string();
        assert!(msg.contains("reconcile duplicates"), "{msg}");
        assert!(msg.contains("1 and 4"), "{msg}");

        let msg = GridError::SingularMatrix { coincident: true }.to_string();
        assert!(msg.contains("nearly duplicate"), "{msg}");
        assert!(msg.contains("coincident"), "{msg}");
    }
}
