//! Removal and restoration of the mean, planar trend and range of the data.
//!
//! The forward pass always removes the mean `u` and `v`. Optionally it also
//! removes a least-squares plane in `(x − x̄, y − ȳ)` and scales the residuals
//! into [-1, 1] by their largest absolute value. The inverse runs the steps in
//! reverse order at any location:
//!
//! ```text
//! u(x, y) = u' · range_u + ū + slope_ux·(x − x̄) + slope_uy·(y − ȳ)
//! v(x, y) = v' · range_v + v̄ + slope_vx·(x − x̄) + slope_vy·(y − ȳ)
//! ```
//!
//! With geographic input the trend is a plane in longitude, which has no
//! single value at a meridian written as both `180` and `-180`. Longitudes
//! are therefore unwrapped about the first observation's longitude, in the
//! forward pass and again at every location passed to `restore`.

use rkyv::{Archive, Deserialize, Serialize};
use tracing::debug;

use crate::distance::{unwrap_longitude, DistanceModel};
use crate::observation::Observation;

/// Which optional steps of the normalization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct NormalizationMode {
    /// Remove (and later restore) a least-squares plane.
    pub remove_trend: bool,
    /// Scale residuals by their largest absolute value.
    pub normalize_range: bool,
}

impl Default for NormalizationMode {
    fn default() -> Self {
        Self {
            remove_trend: true,
            normalize_range: true,
        }
    }
}

impl NormalizationMode {
    /// Mean removal only.
    pub const MEAN_ONLY: Self = Self {
        remove_trend: false,
        normalize_range: false,
    };
}

/// Coefficients needed to undo the forward normalization.
///
/// `mean_x`, `mean_y` and the slopes stay zero unless the trend was removed;
/// the ranges stay one unless range scaling ran, and are never zero.
/// `lon_ref` is set only for a geographic trend.
#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub struct NormalizationCoefficients {
    pub mean_x: f64,
    pub mean_y: f64,
    pub mean_u: f64,
    pub mean_v: f64,
    pub slope_ux: f64,
    pub slope_uy: f64,
    pub slope_vx: f64,
    pub slope_vy: f64,
    pub range_u: f64,
    pub range_v: f64,
    /// Longitude that trend longitudes are unwrapped about.
    pub lon_ref: Option<f64>,
}

impl Default for NormalizationCoefficients {
    fn default() -> Self {
        Self {
            mean_x: 0.0,
            mean_y: 0.0,
            mean_u: 0.0,
            mean_v: 0.0,
            slope_ux: 0.0,
            slope_uy: 0.0,
            slope_vx: 0.0,
            slope_vy: 0.0,
            range_u: 1.0,
            range_v: 1.0,
            lon_ref: None,
        }
    }
}

/// A normalized observation: original location, residual components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residual {
    pub x: f64,
    pub y: f64,
    pub u: f64,
    pub v: f64,
}

/// Normalize `observations`, returning the residuals and the coefficients
/// that undo the transform. The input is left untouched.
pub fn forward(
    observations: &[Observation],
    mode: NormalizationMode,
    distance: DistanceModel,
) -> (Vec<Residual>, NormalizationCoefficients) {
    let mut c = NormalizationCoefficients::default();
    let Some(first) = observations.first() else {
        return (Vec::new(), c);
    };
    let n = observations.len() as f64;
    if mode.remove_trend && distance.is_geographic() {
        c.lon_ref = Some(first.x);
    }

    for obs in observations {
        c.mean_u += obs.u;
        c.mean_v += obs.v;
        if mode.remove_trend {
            c.mean_x += c.trend_x(obs.x);
            c.mean_y += obs.y;
        }
    }
    c.mean_u /= n;
    c.mean_v /= n;

    if mode.remove_trend {
        c.mean_x /= n;
        c.mean_y /= n;
        fit_plane(observations, &mut c);
    }

    let mut residuals: Vec<Residual> = observations
        .iter()
        .map(|obs| {
            let (du, dv) = c.trend_at(mode, obs.x, obs.y);
            Residual {
                x: obs.x,
                y: obs.y,
                u: obs.u - c.mean_u - du,
                v: obs.v - c.mean_v - dv,
            }
        })
        .collect();

    if mode.normalize_range {
        let (mut umin, mut umax) = (f64::MAX, f64::MIN);
        let (mut vmin, mut vmax) = (f64::MAX, f64::MIN);
        for r in &residuals {
            umin = umin.min(r.u);
            umax = umax.max(r.u);
            vmin = vmin.min(r.v);
            vmax = vmax.max(r.v);
        }
        c.range_u = nonzero_range(umin.abs().max(umax.abs()));
        c.range_v = nonzero_range(vmin.abs().max(vmax.abs()));
        for r in &mut residuals {
            r.u /= c.range_u;
            r.v /= c.range_v;
        }
    }

    debug!(
        "Normalization u: mean={:.6e} slope_x={:.6e} slope_y={:.6e} range={:.6e}",
        c.mean_u, c.slope_ux, c.slope_uy, c.range_u
    );
    debug!(
        "Normalization v: mean={:.6e} slope_x={:.6e} slope_y={:.6e} range={:.6e} (x̄={:.6e}, ȳ={:.6e})",
        c.mean_v, c.slope_vx, c.slope_vy, c.range_v, c.mean_x, c.mean_y
    );

    (residuals, c)
}

impl NormalizationCoefficients {
    /// Undo the forward transform for normalized components `(u, v)` at `(x, y)`.
    #[inline]
    pub fn restore(&self, mode: NormalizationMode, x: f64, y: f64, u: f64, v: f64) -> (f64, f64) {
        let (mut u, mut v) = (u, v);
        if mode.normalize_range {
            u *= self.range_u;
            v *= self.range_v;
        }
        let (du, dv) = self.trend_at(mode, x, y);
        (u + self.mean_u + du, v + self.mean_v + dv)
    }

    /// Planar trend contribution at `(x, y)`, zero when no trend was removed.
    #[inline]
    fn trend_at(&self, mode: NormalizationMode, x: f64, y: f64) -> (f64, f64) {
        if !mode.remove_trend {
            return (0.0, 0.0);
        }
        let xx = self.trend_x(x) - self.mean_x;
        let yy = y - self.mean_y;
        (
            self.slope_ux * xx + self.slope_uy * yy,
            self.slope_vx * xx + self.slope_vy * yy,
        )
    }

    /// `x` as seen by the trend: unwrapped about `lon_ref` when set.
    #[inline]
    fn trend_x(&self, x: f64) -> f64 {
        match self.lon_ref {
            Some(reference) => unwrap_longitude(reference, x),
            None => x,
        }
    }
}

/// Least-squares plane through the de-meaned data via the 2×2 normal equations.
/// A singular system (collinear or single location) leaves the slopes at zero.
fn fit_plane(observations: &[Observation], c: &mut NormalizationCoefficients) {
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    let (mut sxu, mut sxv, mut syu, mut syv) = (0.0, 0.0, 0.0, 0.0);
    for obs in observations {
        let xx = c.trend_x(obs.x) - c.mean_x;
        let yy = obs.y - c.mean_y;
        let uu = obs.u - c.mean_u;
        let vv = obs.v - c.mean_v;
        sxx += xx * xx;
        sxy += xx * yy;
        syy += yy * yy;
        sxu += xx * uu;
        sxv += xx * vv;
        syu += yy * uu;
        syv += yy * vv;
    }

    let det = sxx * syy - sxy * sxy;
    if det == 0.0 {
        debug!("Trend fit is degenerate; keeping zero slopes");
        return;
    }
    c.slope_ux = (sxu * syy - sxy * syu) / det;
    c.slope_uy = (sxx * syu - sxy * sxu) / det;
    c.slope_vx = (sxv * syy - sxy * syv) / det;
    c.slope_vy = (sxx * syv - sxy * sxv) / det;
}

#[inline]
fn nonzero_range(r: f64) -> f64 {
    if r == 0.0 {
        1.0
    } else {
        r
    }
}
