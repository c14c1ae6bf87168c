//! Green's functions of a thin elastic sheet loaded by an in-plane point force.
//!
//! A unit body force at the origin produces the displacement response
//!
//! ```text
//! r²  = dx² + dy² + δ
//! q   = c1·ln(r²) + c2·dx²/r²        (x response to an x force)
//! p   = c1·ln(r²) + c2·dy²/r²        (y response to a y force)
//! w   = c2·dx·dy/r²                  (cross response)
//! c1  = (3 − ε)/2,  c2 = 1 + ε
//! ```
//!
//! where `ε` is derived from Poisson's ratio and `δ` is a small positive
//! "fudge" added to the squared radius so the self-coupling term at zero
//! separation stays finite. All three responses are even in `(dx, dy)`, so
//! swapping source and evaluation point leaves them unchanged.

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::{GridError, Result};

/// How the squared-radius fudge `δ` is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FudgePolicy {
    /// Add this value to every squared radius.
    Absolute(f64),
    /// Add `factor × r_min`, with `r_min` the shortest non-zero separation
    /// between retained observations.
    RelativeToMinSeparation(f64),
}

impl Default for FudgePolicy {
    fn default() -> Self {
        FudgePolicy::RelativeToMinSeparation(0.01)
    }
}

impl FudgePolicy {
    pub(crate) fn validate(&self) -> Result<()> {
        let value = match *self {
            FudgePolicy::Absolute(v) | FudgePolicy::RelativeToMinSeparation(v) => v,
        };
        if !value.is_finite() || value <= 0.0 {
            return Err(GridError::InvalidFudge(value));
        }
        Ok(())
    }

    /// Resolve the fudge value given the minimum observed separation.
    ///
    /// With fewer than two distinct locations there is no separation to scale
    /// by, and the factor is used as an absolute value.
    pub fn resolve(&self, min_separation: Option<f64>) -> f64 {
        match *self {
            FudgePolicy::Absolute(delta) => delta,
            FudgePolicy::RelativeToMinSeparation(factor) => match min_separation {
                Some(r_min) if r_min.is_finite() && r_min > 0.0 => factor * r_min,
                _ => factor,
            },
        }
    }
}

/// The two constants shaping the Green's functions, fixed for a whole fit.
#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub struct ShapeParameters {
    /// `ε = (1 − ν)/(1 + ν) + ½`.
    pub eps_term: f64,
    /// Squared-radius offset `δ > 0`.
    pub fudge: f64,
}

impl ShapeParameters {
    /// Derive the shape parameters from Poisson's ratio `nu` and a resolved fudge.
    pub fn from_poisson_ratio(nu: f64, fudge: f64) -> Result<Self> {
        validate_poisson_ratio(nu)?;
        if !fudge.is_finite() || fudge <= 0.0 {
            return Err(GridError::InvalidFudge(fudge));
        }
        // half of 2ε + 1 with ε = (1 − ν)/(1 + ν)
        let eps_term = 0.5 * (2.0 * (1.0 - nu) / (1.0 + nu) + 1.0);
        Ok(Self { eps_term, fudge })
    }

    /// Evaluate the three responses for an offset `(dx, dy)`.
    #[inline]
    pub fn evaluate(&self, dx: f64, dy: f64) -> GreensResponse {
        let dx2 = dx * dx;
        let dy2 = dy * dy;
        let r2 = dx2 + dy2 + self.fudge;
        let c1 = 0.5 * (3.0 - self.eps_term);
        let c2 = 1.0 + self.eps_term;

        let log_term = c1 * r2.ln();
        let inv_r2 = 1.0 / r2;
        GreensResponse {
            xx: log_term + c2 * dx2 * inv_r2,
            yy: log_term + c2 * dy2 * inv_r2,
            xy: c2 * dx * dy * inv_r2,
        }
    }
}

pub(crate) fn validate_poisson_ratio(nu: f64) -> Result<()> {
    if !nu.is_finite() || nu <= -1.0 {
        return Err(GridError::InvalidPoissonRatio(nu));
    }
    Ok(())
}

/// Green's function values coupling one source to one evaluation point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreensResponse {
    /// x response to an x force (q).
    pub xx: f64,
    /// y response to a y force (p).
    pub yy: f64,
    /// Cross response (w), shared by both off-diagonal couplings.
    pub xy: f64,
}
