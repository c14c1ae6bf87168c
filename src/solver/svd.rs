//! Truncated singular value decomposition solve.
//!
//! With `A = U·S·Vᵀ` the solution keeps only the `k` largest singular values:
//!
//! ```text
//! x = Σ_{m < k} (u_mᵀ·b / s_m) · v_m
//! ```
//!
//! Values that are exactly zero, or below `s_max · dim · ε`, are never
//! inverted, whatever the cutoff asks for.

use nalgebra::{DMatrix, DVector, SVD};
use tracing::{debug, info};

use crate::error::{GridError, Result};

use super::{SpectrumRequest, SvdCutoff, SvdSettings};

/// What the spectrum values mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumKind {
    /// Raw singular values.
    SingularValues,
    /// Singular values divided by the largest.
    RatioToLargest,
}

/// One ranked spectrum value; rank 1 is the largest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumEntry {
    pub rank: usize,
    pub value: f64,
}

/// Singular-value spectrum, sorted in descending order.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenSpectrum {
    pub kind: SpectrumKind,
    pub entries: Vec<SpectrumEntry>,
}

impl EigenSpectrum {
    fn new(sorted: &[f64], kind: SpectrumKind) -> Self {
        let s_max = sorted.first().copied().unwrap_or(0.0);
        let entries = sorted
            .iter()
            .enumerate()
            .map(|(i, &s)| SpectrumEntry {
                rank: i + 1,
                value: match kind {
                    SpectrumKind::SingularValues => s,
                    SpectrumKind::RatioToLargest if s_max > 0.0 => s / s_max,
                    SpectrumKind::RatioToLargest => 0.0,
                },
            })
            .collect();
        Self { kind, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Summary of a truncated solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvdReport {
    /// Singular values used.
    pub used: usize,
    /// Singular values available.
    pub total: usize,
    /// Percentage of Σs² carried by the used values.
    pub variance_explained: f64,
}

pub(crate) enum SvdOutcome {
    Solved {
        solution: DVector<f64>,
        report: SvdReport,
        spectrum: Option<EigenSpectrum>,
    },
    SpectrumOnly(EigenSpectrum),
}

/// Decompose `a` and solve `a · x = b` under `settings`.
pub(crate) fn solve(a: DMatrix<f64>, b: &DVector<f64>, settings: &SvdSettings) -> Result<SvdOutcome> {
    let dim = a.nrows();
    let max_niter = 100 * dim + 1000;
    let svd = SVD::try_new(a, true, true, f64::EPSILON, max_niter).ok_or_else(|| {
        GridError::DecompositionFailed(format!(
            "no convergence for a {dim}×{dim} matrix within {max_niter} iterations"
        ))
    })?;
    let s = &svd.singular_values;

    let mut order: Vec<usize> = (0..s.len()).collect();
    order.sort_by(|&i, &j| s[j].total_cmp(&s[i]));
    let sorted: Vec<f64> = order.iter().map(|&i| s[i]).collect();

    let spectrum = match settings.spectrum {
        SpectrumRequest::None => None,
        SpectrumRequest::Report | SpectrumRequest::ReportOnly => {
            let kind = match settings.cutoff {
                SvdCutoff::Variance(_) => SpectrumKind::SingularValues,
                _ => SpectrumKind::RatioToLargest,
            };
            Some(EigenSpectrum::new(&sorted, kind))
        }
    };
    if settings.spectrum == SpectrumRequest::ReportOnly {
        info!("Reporting {} eigenvalues without solving", sorted.len());
        return Ok(SvdOutcome::SpectrumOnly(spectrum.unwrap_or_else(|| {
            EigenSpectrum::new(&sorted, SpectrumKind::RatioToLargest)
        })));
    }

    let used = retained_count(&sorted, settings.cutoff);
    let u = svd
        .u
        .as_ref()
        .ok_or_else(|| GridError::DecompositionFailed("left singular vectors missing".into()))?;
    let v_t = svd
        .v_t
        .as_ref()
        .ok_or_else(|| GridError::DecompositionFailed("right singular vectors missing".into()))?;

    let mut x = DVector::<f64>::zeros(v_t.ncols());
    for &m in &order[..used] {
        let coef = u.column(m).dot(b) / s[m];
        for c in 0..x.len() {
            x[c] += coef * v_t[(m, c)];
        }
    }

    let report = SvdReport {
        used,
        total: sorted.len(),
        variance_explained: variance_explained(&sorted, used),
    };
    info!(
        "[{} of {} eigen-values used to explain {:.2} % of data variance]",
        report.used, report.total, report.variance_explained
    );
    if let (Some(first), Some(last)) = (sorted.first(), sorted.get(used.saturating_sub(1))) {
        debug!("Largest singular value {:.6e}, smallest used {:.6e}", first, last);
    }

    Ok(SvdOutcome::Solved {
        solution: x,
        report,
        spectrum,
    })
}

/// Number of leading values of the descending spectrum `sorted` to keep.
pub(crate) fn retained_count(sorted: &[f64], cutoff: SvdCutoff) -> usize {
    let Some(&s_max) = sorted.first() else {
        return 0;
    };
    let floor = s_max * sorted.len() as f64 * f64::EPSILON;
    let numerical_rank = sorted.iter().take_while(|&&s| s > floor).count();

    let requested = match cutoff {
        SvdCutoff::Ratio(ratio) => sorted.iter().take_while(|&&s| s >= ratio * s_max).count(),
        SvdCutoff::Count(count) => count,
        SvdCutoff::Variance(percent) => {
            let total: f64 = sorted.iter().map(|s| s * s).sum();
            // Relative slack so that 100 % keeps everything despite rounding
            let target = total * (percent / 100.0) * (1.0 - 1e-12);
            let mut cumulative = 0.0;
            let mut k = 0;
            while k < sorted.len() && cumulative < target {
                cumulative += sorted[k] * sorted[k];
                k += 1;
            }
            k
        }
    };
    requested.min(numerical_rank)
}

/// Percentage of Σs² carried by the `used` largest values.
fn variance_explained(sorted: &[f64], used: usize) -> f64 {
    let total: f64 = sorted.iter().map(|s| s * s).sum();
    if total == 0.0 {
        return 0.0;
    }
    let kept: f64 = sorted[..used].iter().map(|s| s * s).sum();
    100.0 * kept / total
}
