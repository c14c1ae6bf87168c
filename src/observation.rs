//! Vector observations: a location and the two horizontal components measured there.

use crate::error::{GridError, Result};

/// One vector observation, e.g. a GPS station velocity.
///
/// `x`, `y` are Cartesian coordinates in user units, or longitude / latitude in
/// degrees when gridding with [`DistanceModel::Geographic`](crate::DistanceModel).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub x: f64,
    pub y: f64,
    /// East (x) component.
    pub u: f64,
    /// North (y) component.
    pub v: f64,
    /// Optional per-component uncertainty columns `[u, v]`.
    /// Interpreted as weights or as sigmas according to [`WeightPolicy`].
    pub weights: Option<[f64; 2]>,
}

impl Observation {
    /// An unweighted observation.
    pub fn new(x: f64, y: f64, u: f64, v: f64) -> Self {
        Self {
            x,
            y,
            u,
            v,
            weights: None,
        }
    }

    /// An observation carrying two extra columns (weights or sigmas).
    pub fn with_weights(x: f64, y: f64, u: f64, v: f64, wu: f64, wv: f64) -> Self {
        Self {
            x,
            y,
            u,
            v,
            weights: Some([wu, wv]),
        }
    }

    /// Location as `[x, y]`.
    pub fn location(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// How the optional weight columns of an [`Observation`] are used.
///
/// Weights scale rows and columns of the linear system symmetrically. With an
/// exactly interpolating solve (Gauss-Jordan, or SVD keeping every singular
/// value) the fitted field is unchanged by weighting; weights only matter once
/// the SVD discards part of the spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightPolicy {
    /// Ignore any weight columns (all weights 1).
    #[default]
    Ignore,
    /// The columns hold weights directly.
    Weights,
    /// The columns hold standard deviations; weight = 1 / sigma.
    Sigmas,
}

impl WeightPolicy {
    /// Returns `true` when the columns are required.
    pub fn is_active(&self) -> bool {
        !matches!(self, WeightPolicy::Ignore)
    }

    /// Resolve the `[w_u, w_v]` weight pair for observation `index`.
    pub fn resolve(&self, index: usize, obs: &Observation) -> Result<[f64; 2]> {
        let cols = match self {
            WeightPolicy::Ignore => return Ok([1.0, 1.0]),
            WeightPolicy::Weights | WeightPolicy::Sigmas => {
                obs.weights.ok_or(GridError::MissingWeights(index))?
            }
        };

        let mut w = [0.0; 2];
        for (k, &c) in cols.iter().enumerate() {
            if !c.is_finite() || c <= 0.0 {
                return Err(GridError::InvalidObservation {
                    index,
                    reason: match self {
                        WeightPolicy::Sigmas => "sigma must be finite and positive",
                        _ => "weight must be finite and positive",
                    },
                });
            }
            w[k] = match self {
                WeightPolicy::Sigmas => 1.0 / c,
                _ => c,
            };
        }
        Ok(w)
    }
}

/// Reject observations with non-finite coordinates or components.
pub(crate) fn check_finite(index: usize, obs: &Observation) -> Result<()> {
    if !(obs.x.is_finite() && obs.y.is_finite()) {
        return Err(GridError::InvalidObservation {
            index,
            reason: "location is not finite",
        });
    }
    if !(obs.u.is_finite() && obs.v.is_finite()) {
        return Err(GridError::InvalidObservation {
            index,
            reason: "vector components are not finite",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigma_becomes_reciprocal_weight() {
        let obs = Observation::with_weights(0.0, 0.0, 1.0, 2.0, 0.5, 4.0);
        let w = WeightPolicy::Sigmas.resolve(0, &obs).unwrap();
        assert!((w[0] - 2.0).abs() < 1e-15);
        assert!((w[1] - 0.25).abs() < 1e-15);

        let w = WeightPolicy::Weights.resolve(0, &obs).unwrap();
        assert_eq!(w, [0.5, 4.0]);
    }

    #[test]
    fn test_ignore_uses_unit_weights() {
        let obs = Observation::with_weights(0.0, 0.0, 1.0, 2.0, 0.5, 4.0);
        assert_eq!(WeightPolicy::Ignore.resolve(0, &obs).unwrap(), [1.0, 1.0]);
    }

    #[test]
    fn test_missing_and_bad_weights() {
        let obs = Observation::new(0.0, 0.0, 1.0, 2.0);
        assert!(matches!(
            WeightPolicy::Weights.resolve(7, &obs),
            Err(GridError::MissingWeights(7))
        ));

        let obs = Observation::with_weights(0.0, 0.0, 1.0, 2.0, 0.0, 1.0);
        assert!(matches!(
            WeightPolicy::Sigmas.resolve(3, &obs),
            Err(GridError::InvalidObservation { index: 3, .. })
        ));
    }

    #[test]
    fn test_check_finite() {
        assert!(check_finite(0, &Observation::new(1.0, 2.0, 3.0, 4.0)).is_ok());
        assert!(check_finite(0, &Observation::new(f64::NAN, 2.0, 3.0, 4.0)).is_err());
        assert!(check_finite(0, &Observation::new(1.0, 2.0, f64::INFINITY, 4.0)).is_err());
    }
}
