//! # velgrid
//!
//! Gridding of **2-D vector fields** (such as GPS horizontal velocities) with
//! the Green's functions of a thin elastic sheet.
//!
//! Given irregularly spaced observations `(x, y, u, v)`, `velgrid` finds the
//! in-plane body forces at each observation location whose combined elastic
//! response reproduces the data, then evaluates that response anywhere: on a
//! regular lattice, a masked subset of one, or an explicit list of points.
//! Coupling `u` and `v` through the elastic model yields smoother, physically
//! consistent fields than gridding each component separately.
//!
//! ## Features
//!
//! - **Coupled interpolation**: both components are fitted jointly through the
//!   elastic-sheet Green's functions, shaped by Poisson's ratio
//! - **Two solve strategies**: exact Gauss-Jordan elimination, or truncated SVD
//!   with ratio, count or variance cutoffs for noisy and near-duplicate data
//! - **Normalization**: mean, planar trend and range are removed before the
//!   fit and restored in every prediction
//! - **Duplicate handling**: identical records are dropped, conflicting ones
//!   are reported or regularized
//! - **Geographic coordinates**: flat-Earth distances in km with longitude wrap
//! - **Parallel evaluation**: output locations are evaluated with [rayon](https://docs.rs/rayon)
//! - **Persistent models**: fitted fields serialize with [rkyv](https://docs.rs/rkyv)
//!
//! ## Example
//!
//! ```no_run
//! use velgrid::{
//!     FieldOutput, Gridder, GridderConfig, Lattice, Observation, OutputLocations,
//!     Registration, Solver, SvdCutoff,
//! };
//!
//! let observations = vec![
//!     Observation::new(0.0, 0.0, 1.0, 0.0),
//!     Observation::new(1.0, 0.0, 0.0, 1.0),
//!     Observation::new(0.0, 1.0, -1.0, 0.0),
//!     Observation::new(1.0, 1.0, 0.0, -1.0),
//! ];
//!
//! let config = GridderConfig {
//!     solver: Solver::svd(SvdCutoff::Variance(99.0)),
//!     ..Default::default()
//! };
//! let gridder = Gridder::new(config).unwrap();
//! let (field, report) = gridder.fit(&observations).unwrap().into_fitted().unwrap();
//! println!("{} of {} constraints retained", report.n_retained, report.n_read);
//!
//! let lattice = Lattice::new([0.0, 1.0, 0.0, 1.0], [0.25, 0.25], Registration::Gridline).unwrap();
//! if let FieldOutput::Grid(grid) = field.evaluate(&OutputLocations::Lattice(lattice)) {
//!     println!("u at the north-west corner: {:?}", grid.get(0, 0));
//! }
//!
//! // Keep the fit for later
//! let bytes = field.to_rkyv_bytes().unwrap();
//! let restored = velgrid::FittedField::from_rkyv_bytes(&bytes).unwrap();
//! assert_eq!(restored, field);
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Duplicate scan**: coincident records with equal observations are dropped;
//!    coincident records that disagree make the system singular and are rejected
//!    unless a truncating SVD will absorb them
//! 2. **Normalization**: remove the mean, optionally a least-squares plane, and
//!    optionally scale residuals into [-1, 1]
//! 3. **Assembly**: a dense `2n × 2n` matrix couples every pair of observations
//!    through the Green's functions (`q`, `p`, `w`)
//! 4. **Solve**: Gauss-Jordan or truncated SVD for the `2n` body-force strengths
//! 5. **Evaluation**: sum every source's response at each output location and
//!    undo the normalization there
//!
//! The dense matrix grows as `(2n)²` doubles, so memory, not time, usually caps
//! the number of observations; see [`GridderConfig::max_matrix_bytes`].
//!

pub mod distance;
pub mod duplicates;
mod error;
pub mod evaluate;
pub mod greens;
mod gridder;
pub mod lattice;
pub mod normalize;
pub mod observation;
pub mod solver;
pub mod system;

pub use distance::DistanceModel;
pub use duplicates::{resolve_duplicates, ConflictingPair, DuplicateReport};
pub use error::{ErrorCategory, GridError, Result};
pub use evaluate::{FieldEvaluator, FieldOutput, FieldPoint, GridField};
pub use greens::{FudgePolicy, GreensResponse, ShapeParameters};
pub use gridder::{FitOutcome, FitReport, FittedField, Gridder, GridderConfig};
pub use lattice::{Lattice, MaskedLattice, OutputLocations, Registration};
pub use normalize::{NormalizationCoefficients, NormalizationMode, Residual};
pub use observation::{Observation, WeightPolicy};
pub use solver::{
    Coefficients, EigenSpectrum, SolveOutcome, Solution, Solver, SpectrumEntry, SpectrumKind,
    SpectrumRequest, SvdCutoff, SvdReport, SvdSettings,
};
pub use system::{build_system, matrix_bytes, Block, BlockMatrix, LinearSystem};
