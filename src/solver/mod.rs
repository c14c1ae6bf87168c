//! Solving the assembled system for the body-force coefficients.
//!
//! Two interchangeable strategies consume a [`LinearSystem`] and produce the
//! same [`Coefficients`] layout (`αx` then `αy`):
//!
//! - [`Solver::GaussJordan`]: exact elimination. Fast, but fails on the
//!   singular systems produced by coincident or nearly coincident data.
//! - [`Solver::TruncatedSvd`]: singular value decomposition that discards the
//!   small end of the spectrum, trading exact interpolation for robustness.
//!   It can also report the singular-value spectrum for inspection.
//!
//! Either way the system is consumed: the matrix is dropped once the
//! coefficients exist.

pub mod gauss_jordan;
pub mod svd;

use nalgebra::DVector;
use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use crate::error::{GridError, Result};
use crate::system::LinearSystem;

pub use svd::{EigenSpectrum, SpectrumEntry, SpectrumKind, SvdReport};

// ── Configuration ───────────────────────────────────────────────────────────

/// Which part of the singular-value spectrum the SVD solve keeps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SvdCutoff {
    /// Keep values `s ≥ ratio · s_max`. `0.0` keeps the full numerical rank.
    Ratio(f64),
    /// Keep this many of the largest values.
    Count(usize),
    /// Keep the fewest largest values whose squares explain this percentage
    /// (0–100] of the total.
    Variance(f64),
}

impl SvdCutoff {
    /// `true` when the cutoff can drop nonzero singular values. Only such
    /// cutoffs solve systems made singular by conflicting duplicates.
    pub fn truncates(&self) -> bool {
        match *self {
            SvdCutoff::Ratio(r) => r > 0.0,
            SvdCutoff::Count(_) | SvdCutoff::Variance(_) => true,
        }
    }
}

/// Whether the SVD solve reports its spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpectrumRequest {
    /// No spectrum.
    #[default]
    None,
    /// Report the spectrum and solve.
    Report,
    /// Report the spectrum and stop without solving.
    ReportOnly,
}

/// Settings for [`Solver::TruncatedSvd`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvdSettings {
    pub cutoff: SvdCutoff,
    pub spectrum: SpectrumRequest,
}

impl Default for SvdSettings {
    fn default() -> Self {
        Self {
            cutoff: SvdCutoff::Ratio(0.0),
            spectrum: SpectrumRequest::None,
        }
    }
}

/// Solve strategy, chosen once per fit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Solver {
    /// Gauss-Jordan elimination.
    #[default]
    GaussJordan,
    /// Truncated singular value decomposition.
    TruncatedSvd(SvdSettings),
}

impl Solver {
    /// Truncated SVD with the given cutoff and no spectrum report.
    pub fn svd(cutoff: SvdCutoff) -> Self {
        Solver::TruncatedSvd(SvdSettings {
            cutoff,
            spectrum: SpectrumRequest::None,
        })
    }

    /// Check the cutoff values.
    pub fn validate(&self) -> Result<()> {
        let Solver::TruncatedSvd(settings) = self else {
            return Ok(());
        };
        match settings.cutoff {
            SvdCutoff::Ratio(r) if !r.is_finite() || r < 0.0 => Err(GridError::InvalidCutoff(
                format!("eigenvalue ratio must be finite and non-negative, got {r}"),
            )),
            SvdCutoff::Count(0) => Err(GridError::InvalidCutoff(
                "must keep at least one eigenvalue".to_string(),
            )),
            SvdCutoff::Variance(p) if !p.is_finite() || p <= 0.0 || p > 100.0 => {
                Err(GridError::InvalidCutoff(format!(
                    "variance explained must lie in (0, 100] %, got {p}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Whether this strategy can solve a system with conflicting coincident
    /// observations (which is singular by construction).
    pub fn tolerates_conflicting_duplicates(&self) -> bool {
        match self {
            Solver::GaussJordan => false,
            Solver::TruncatedSvd(s) => {
                s.cutoff.truncates() || s.spectrum == SpectrumRequest::ReportOnly
            }
        }
    }

    /// Solve `system`, consuming it.
    pub fn solve(&self, system: LinearSystem) -> Result<SolveOutcome> {
        let n = system.n();
        let LinearSystem {
            matrix,
            rhs,
            column_weights,
        } = system;

        match self {
            Solver::GaussJordan => {
                info!("Solve linear equations by Gauss-Jordan elimination");
                let y = gauss_jordan::solve(matrix.into_matrix(), rhs)?;
                Ok(SolveOutcome::Solved(Solution {
                    coefficients: Coefficients::from_scaled(n, y, column_weights.as_ref()),
                    svd: None,
                    spectrum: None,
                }))
            }
            Solver::TruncatedSvd(settings) => {
                info!("Solve linear equations by SVD");
                match svd::solve(matrix.into_matrix(), &rhs, settings)? {
                    svd::SvdOutcome::SpectrumOnly(spectrum) => {
                        Ok(SolveOutcome::SpectrumOnly(spectrum))
                    }
                    svd::SvdOutcome::Solved {
                        solution,
                        report,
                        spectrum,
                    } => Ok(SolveOutcome::Solved(Solution {
                        coefficients: Coefficients::from_scaled(
                            n,
                            solution,
                            column_weights.as_ref(),
                        ),
                        svd: Some(report),
                        spectrum,
                    })),
                }
            }
        }
    }
}

// ── Results ─────────────────────────────────────────────────────────────────

/// Body-force strengths, one `(αx, αy)` pair per retained observation.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Coefficients {
    n: usize,
    alpha: Vec<f64>,
}

impl Coefficients {
    /// Wrap a `2n` solution of the scaled system, undoing column weights.
    pub(crate) fn from_scaled(n: usize, y: DVector<f64>, weights: Option<&DVector<f64>>) -> Self {
        let mut alpha: Vec<f64> = y.as_slice().to_vec();
        if let Some(d) = weights {
            for (a, w) in alpha.iter_mut().zip(d.iter()) {
                *a *= w;
            }
        }
        Self { n, alpha }
    }

    /// Build from explicit `αx`, `αy` vectors of equal length.
    pub fn from_parts(alpha_x: &[f64], alpha_y: &[f64]) -> Result<Self> {
        if alpha_x.len() != alpha_y.len() {
            return Err(GridError::CoefficientMismatch {
                expected: alpha_x.len(),
                got: alpha_y.len(),
            });
        }
        let mut alpha = Vec::with_capacity(2 * alpha_x.len());
        alpha.extend_from_slice(alpha_x);
        alpha.extend_from_slice(alpha_y);
        Ok(Self {
            n: alpha_x.len(),
            alpha,
        })
    }

    /// Unvalidated parts, for exercising the checks on archived models.
    #[cfg(test)]
    pub(crate) fn from_raw(n: usize, alpha: Vec<f64>) -> Self {
        Self { n, alpha }
    }

    /// `true` when the stored vector holds exactly `n` pairs. Always the case
    /// for values built here; archived bytes may say otherwise.
    pub(crate) fn is_consistent(&self) -> bool {
        self.n.checked_mul(2) == Some(self.alpha.len())
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Returns `true` when there are no sources.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn alpha_x(&self) -> &[f64] {
        &self.alpha[..self.n]
    }

    pub fn alpha_y(&self) -> &[f64] {
        &self.alpha[self.n..]
    }

    /// The full `[αx…, αy…]` vector.
    pub fn as_slice(&self) -> &[f64] {
        &self.alpha
    }
}

/// A successful solve.
#[derive(Debug, Clone)]
pub struct Solution {
    pub coefficients: Coefficients,
    /// Truncation summary (SVD only).
    pub svd: Option<SvdReport>,
    /// Spectrum, when requested (SVD only).
    pub spectrum: Option<EigenSpectrum>,
}

/// What a solve produced.
#[derive(Debug, Clone)]
pub enum SolveOutcome {
    Solved(Solution),
    /// Only the spectrum was requested.
    SpectrumOnly(EigenSpectrum),
}
