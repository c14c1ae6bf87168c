//! Reconstruction of the fitted field at output locations.
//!
//! Every query point sums the response of all sources:
//!
//! ```text
//! u' = Σ_i αx_i·q + αy_i·w
//! v' = Σ_i αy_i·p + αx_i·w
//! ```
//!
//! and the normalization is then undone at the point's own coordinates.
//! Points are independent, so the sums run as a rayon map over the query
//! list followed by a sequential write-back into the output layout.

use rayon::prelude::*;
use tracing::info;

use crate::distance::DistanceModel;
use crate::error::{GridError, Result};
use crate::greens::ShapeParameters;
use crate::lattice::{Lattice, OutputLocations};
use crate::normalize::{NormalizationCoefficients, NormalizationMode};
use crate::solver::Coefficients;

/// A single reconstructed vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldPoint {
    pub x: f64,
    pub y: f64,
    pub u: f64,
    pub v: f64,
}

/// Co-registered `u` and `v` grids over one lattice.
///
/// Both vectors are row-major with row 0 at `y_max`; masked-out cells are NaN.
#[derive(Debug, Clone)]
pub struct GridField {
    pub lattice: Lattice,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
}

impl GridField {
    /// `(u, v)` at node `(row, col)`, or `None` outside the lattice.
    pub fn get(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        if row >= self.lattice.ny() || col >= self.lattice.nx() {
            return None;
        }
        let k = self.lattice.index(row, col);
        Some((self.u[k], self.v[k]))
    }

    /// Number of nodes holding a value.
    pub fn n_valid(&self) -> usize {
        self.u.iter().filter(|v| !v.is_nan()).count()
    }
}

/// Evaluation result, shaped after the requested [`OutputLocations`].
#[derive(Debug, Clone)]
pub enum FieldOutput {
    Grid(GridField),
    /// One record per requested point, in request order.
    Points(Vec<FieldPoint>),
}

/// Read-only view of a solved model, shareable across worker threads.
#[derive(Debug, Clone, Copy)]
pub struct FieldEvaluator<'a> {
    sources: &'a [[f64; 2]],
    coefficients: &'a Coefficients,
    shape: ShapeParameters,
    distance: DistanceModel,
    mode: NormalizationMode,
    normalization: NormalizationCoefficients,
}

impl<'a> FieldEvaluator<'a> {
    /// `sources` are the retained observation locations, in the order used to
    /// assemble the system that produced `coefficients`.
    pub fn new(
        sources: &'a [[f64; 2]],
        coefficients: &'a Coefficients,
        shape: ShapeParameters,
        distance: DistanceModel,
        mode: NormalizationMode,
        normalization: NormalizationCoefficients,
    ) -> Result<Self> {
        if sources.len() != coefficients.len() {
            return Err(GridError::CoefficientMismatch {
                expected: sources.len(),
                got: coefficients.len(),
            });
        }
        Ok(Self::from_checked(
            sources,
            coefficients,
            shape,
            distance,
            mode,
            normalization,
        ))
    }

    /// Caller guarantees one coefficient pair per source.
    pub(crate) fn from_checked(
        sources: &'a [[f64; 2]],
        coefficients: &'a Coefficients,
        shape: ShapeParameters,
        distance: DistanceModel,
        mode: NormalizationMode,
        normalization: NormalizationCoefficients,
    ) -> Self {
        Self {
            sources,
            coefficients,
            shape,
            distance,
            mode,
            normalization,
        }
    }

    /// Physical `(u, v)` at `(x, y)`.
    pub fn predict(&self, x: f64, y: f64) -> (f64, f64) {
        let ax = self.coefficients.alpha_x();
        let ay = self.coefficients.alpha_y();
        let (mut u, mut v) = (0.0, 0.0);
        for (i, &src) in self.sources.iter().enumerate() {
            let (dx, dy) = self.distance.offset([x, y], src);
            let g = self.shape.evaluate(dx, dy);
            u += ax[i] * g.xx + ay[i] * g.xy;
            v += ay[i] * g.yy + ax[i] * g.xy;
        }
        self.normalization.restore(self.mode, x, y, u, v)
    }

    /// Evaluate an explicit list, preserving its order.
    pub fn evaluate_points(&self, points: &[[f64; 2]]) -> Vec<FieldPoint> {
        points
            .par_iter()
            .map(|&[x, y]| {
                let (u, v) = self.predict(x, y);
                FieldPoint { x, y, u, v }
            })
            .collect()
    }

    /// Evaluate at every location of `locations`.
    pub fn evaluate(&self, locations: &OutputLocations) -> FieldOutput {
        info!(
            "Evaluate solution at {} output locations from {} sources",
            locations.n_queries(),
            self.sources.len()
        );
        match locations {
            OutputLocations::Points(points) => FieldOutput::Points(self.evaluate_points(points)),
            OutputLocations::Lattice(lattice) => FieldOutput::Grid(self.evaluate_nodes(lattice, None)),
            OutputLocations::Masked(masked) => {
                FieldOutput::Grid(self.evaluate_nodes(masked.lattice(), Some(masked.mask())))
            }
        }
    }

    /// `mask`, when given, holds one entry per node.
    fn evaluate_nodes(&self, lattice: &Lattice, mask: Option<&[bool]>) -> GridField {
        let nodes: Vec<usize> = (0..lattice.len())
            .filter(|&k| mask.map_or(true, |m| m[k]))
            .collect();
        let nx = lattice.nx();

        let predictions: Vec<(usize, (f64, f64))> = nodes
            .par_iter()
            .map(|&k| (k, self.predict(lattice.x(k % nx), lattice.y(k / nx))))
            .collect();

        let mut u = vec![f64::NAN; lattice.len()];
        let mut v = vec![f64::NAN; lattice.len()];
        for (k, (pu, pv)) in predictions {
            u[k] = pu;
            v[k] = pv;
        }
        GridField {
            lattice: lattice.clone(),
            u,
            v,
        }
    }
}
