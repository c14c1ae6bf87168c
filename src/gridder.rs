//! End-to-end fitting pipeline.
//!
//! [`Gridder::fit`] runs the stages in a fixed order, each consuming the
//! previous stage's output:
//!
//! 1. validate observations and resolve their weights
//! 2. drop identical duplicates, reject or tolerate conflicting ones
//! 3. fix the shape parameters (the fudge may depend on the data spacing)
//! 4. normalize the retained observations
//! 5. assemble and solve the linear system
//!
//! The result is a [`FittedField`] that owns everything needed to evaluate
//! the field again, and can be persisted with rkyv.

use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::distance::DistanceModel;
use crate::duplicates::{resolve_duplicates, DuplicateReport};
use crate::error::{GridError, Result};
use crate::evaluate::{FieldEvaluator, FieldOutput, FieldPoint};
use crate::greens::{validate_poisson_ratio, FudgePolicy, ShapeParameters};
use crate::lattice::OutputLocations;
use crate::normalize::{self, NormalizationCoefficients, NormalizationMode};
use crate::observation::{check_finite, Observation, WeightPolicy};
use crate::solver::{Coefficients, EigenSpectrum, SolveOutcome, Solver, SvdReport};
use crate::system::build_system;

/// Below this fraction of the largest separation two constraints count as
/// nearly coincident when explaining a singular matrix.
const NEAR_COINCIDENT_FRACTION: f64 = 1e-6;

// ── Configuration ───────────────────────────────────────────────────────────

/// Configuration for [`Gridder`].
#[derive(Debug, Clone, PartialEq)]
pub struct GridderConfig {
    /// Poisson's ratio of the elastic sheet. Must exceed -1. Default 0.25.
    pub poisson_ratio: f64,
    /// How the squared-radius fudge is chosen.
    /// Default: 0.01 × the shortest separation between constraints.
    pub fudge: FudgePolicy,
    /// Solve strategy. Default: Gauss-Jordan elimination.
    pub solver: Solver,
    /// Normalization steps applied before the solve.
    /// Default: mean, planar trend and range are all removed.
    pub normalization: NormalizationMode,
    /// Cartesian or geographic coordinates. Default: Cartesian.
    pub distance: DistanceModel,
    /// Interpretation of the optional weight columns. Default: ignored.
    ///
    /// Uniform weights leave the coefficients unchanged; only relative
    /// weights between constraints matter, and then mostly when the SVD
    /// solve truncates the spectrum.
    pub weights: WeightPolicy,
    /// Refuse systems whose dense matrix would need more bytes than this.
    /// None = no limit.
    pub max_matrix_bytes: Option<usize>,
}

impl Default for GridderConfig {
    fn default() -> Self {
        Self {
            poisson_ratio: 0.25,
            fudge: FudgePolicy::default(),
            solver: Solver::GaussJordan,
            normalization: NormalizationMode::default(),
            distance: DistanceModel::Cartesian,
            weights: WeightPolicy::Ignore,
            max_matrix_bytes: None,
        }
    }
}

impl GridderConfig {
    /// Check every setting without looking at any data.
    pub fn validate(&self) -> Result<()> {
        validate_poisson_ratio(self.poisson_ratio)?;
        self.fudge.validate()?;
        self.solver.validate()
    }
}

// ── Results ─────────────────────────────────────────────────────────────────

/// Summary of one fit.
#[derive(Debug, Clone)]
pub struct FitReport {
    /// Observations supplied.
    pub n_read: usize,
    /// Observations that entered the system.
    pub n_retained: usize,
    /// Identical duplicates dropped.
    pub n_skipped: usize,
    /// Coincident pairs with differing observations (SVD only).
    pub n_conflicting: usize,
    pub min_separation: Option<f64>,
    pub max_separation: Option<f64>,
    pub shape: ShapeParameters,
    pub normalization: NormalizationCoefficients,
    /// Truncation summary when the SVD solve was used.
    pub svd: Option<SvdReport>,
    /// Singular-value spectrum, when requested.
    pub spectrum: Option<EigenSpectrum>,
}

/// What a fit produced.
#[derive(Debug, Clone)]
pub enum FitOutcome {
    Fitted {
        field: FittedField,
        report: FitReport,
    },
    /// Only the spectrum was requested; nothing was solved.
    SpectrumOnly(EigenSpectrum),
}

impl FitOutcome {
    /// The fitted field, if a solve took place.
    pub fn field(&self) -> Option<&FittedField> {
        match self {
            FitOutcome::Fitted { field, .. } => Some(field),
            FitOutcome::SpectrumOnly(_) => None,
        }
    }

    /// Consume the outcome, keeping the fitted field and its report.
    pub fn into_fitted(self) -> Option<(FittedField, FitReport)> {
        match self {
            FitOutcome::Fitted { field, report } => Some((field, report)),
            FitOutcome::SpectrumOnly(_) => None,
        }
    }
}

/// A solved model: source locations, coefficients and everything needed to
/// map normalized predictions back to physical units.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct FittedField {
    sources: Vec<[f64; 2]>,
    coefficients: Coefficients,
    shape: ShapeParameters,
    distance: DistanceModel,
    mode: NormalizationMode,
    normalization: NormalizationCoefficients,
}

impl FittedField {
    pub fn sources(&self) -> &[[f64; 2]] {
        &self.sources
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }

    pub fn shape(&self) -> ShapeParameters {
        self.shape
    }

    pub fn distance(&self) -> DistanceModel {
        self.distance
    }

    pub fn normalization_mode(&self) -> NormalizationMode {
        self.mode
    }

    pub fn normalization(&self) -> &NormalizationCoefficients {
        &self.normalization
    }

    /// Borrowing evaluator over this model.
    pub fn evaluator(&self) -> FieldEvaluator<'_> {
        // Pairing is checked when the model is built or restored
        FieldEvaluator::from_checked(
            &self.sources,
            &self.coefficients,
            self.shape,
            self.distance,
            self.mode,
            self.normalization,
        )
    }

    /// Evaluate the field at `locations`.
    pub fn evaluate(&self, locations: &OutputLocations) -> FieldOutput {
        self.evaluator().evaluate(locations)
    }

    /// Evaluate the field at a single location.
    pub fn evaluate_point(&self, x: f64, y: f64) -> FieldPoint {
        let (u, v) = self.evaluator().predict(x, y);
        FieldPoint { x, y, u, v }
    }

    /// Evaluate the field at `points`, preserving their order.
    pub fn evaluate_points(&self, points: &[[f64; 2]]) -> Vec<FieldPoint> {
        self.evaluator().evaluate_points(points)
    }

    /// Serialize the model to bytes using rkyv.
    pub fn to_rkyv_bytes(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<RkyvError>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| GridError::Serialization(e.to_string()))
    }

    /// Restore a model written by [`FittedField::to_rkyv_bytes`].
    pub fn from_rkyv_bytes(bytes: &[u8]) -> Result<Self> {
        // Archived f64 fields need aligned storage
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        let field = rkyv::from_bytes::<Self, RkyvError>(&aligned)
            .map_err(|e| GridError::Serialization(e.to_string()))?;
        if field.sources.len() != field.coefficients.len() {
            return Err(GridError::Serialization(format!(
                "{} sources but {} coefficient pairs",
                field.sources.len(),
                field.coefficients.len()
            )));
        }
        if !field.coefficients.is_consistent() {
            return Err(GridError::Serialization(format!(
                "{} coefficient pairs stored as {} values",
                field.coefficients.len(),
                field.coefficients.as_slice().len()
            )));
        }
        Ok(field)
    }
}

// ── Pipeline ────────────────────────────────────────────────────────────────

/// Fits vector fields under one validated configuration.
#[derive(Debug, Clone)]
pub struct Gridder {
    config: GridderConfig,
}

impl Gridder {
    /// Validate `config` and build a gridder.
    pub fn new(config: GridderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GridderConfig {
        &self.config
    }

    /// Fit the field to `observations`.
    pub fn fit(&self, observations: &[Observation]) -> Result<FitOutcome> {
        let cfg = &self.config;
        if observations.is_empty() {
            return Err(GridError::NoObservations);
        }

        let mut weights = Vec::new();
        for (k, obs) in observations.iter().enumerate() {
            check_finite(k, obs)?;
            if cfg.weights.is_active() {
                weights.push(cfg.weights.resolve(k, obs)?);
            }
        }
        info!("Read {} data constraints", observations.len());

        let dups = resolve_duplicates(observations, cfg.distance);
        if let Some(first) = dups.conflicts.first() {
            if !cfg.solver.tolerates_conflicting_duplicates() {
                return Err(GridError::ConflictingDuplicates {
                    count: dups.conflicts.len(),
                    first: (first.first, first.second),
                });
            }
            warn!(
                "{} coincident constraint pair(s) with different observations left to the truncated SVD",
                dups.conflicts.len()
            );
        }
        info!(
            "Found {} unique data constraints ({} identical duplicates skipped)",
            dups.n_retained(),
            dups.skipped.len()
        );

        let retained: Vec<Observation> = dups.retained.iter().map(|&i| observations[i]).collect();
        let retained_weights: Option<Vec<[f64; 2]>> = cfg
            .weights
            .is_active()
            .then(|| dups.retained.iter().map(|&i| weights[i]).collect());

        let fudge = cfg.fudge.resolve(dups.min_separation);
        let shape = ShapeParameters::from_poisson_ratio(cfg.poisson_ratio, fudge)?;
        debug!(
            "Separations min={:?} max={:?}; eps_term={:.6} fudge={:.6e}",
            dups.min_separation, dups.max_separation, shape.eps_term, shape.fudge
        );

        let (residuals, normalization) =
            normalize::forward(&retained, cfg.normalization, cfg.distance);
        let system = build_system(
            &residuals,
            retained_weights.as_deref(),
            &shape,
            cfg.distance,
            cfg.max_matrix_bytes,
        )?;

        let solution = match cfg.solver.solve(system) {
            Ok(SolveOutcome::Solved(solution)) => solution,
            Ok(SolveOutcome::SpectrumOnly(spectrum)) => {
                return Ok(FitOutcome::SpectrumOnly(spectrum))
            }
            Err(GridError::SingularMatrix { .. }) => {
                return Err(GridError::SingularMatrix {
                    coincident: nearly_coincident(&dups),
                })
            }
            Err(e) => return Err(e),
        };

        let report = FitReport {
            n_read: observations.len(),
            n_retained: dups.n_retained(),
            n_skipped: dups.skipped.len(),
            n_conflicting: dups.conflicts.len(),
            min_separation: dups.min_separation,
            max_separation: dups.max_separation,
            shape,
            normalization,
            svd: solution.svd,
            spectrum: solution.spectrum,
        };
        let field = FittedField {
            sources: retained.iter().map(Observation::location).collect(),
            coefficients: solution.coefficients,
            shape,
            distance: cfg.distance,
            mode: cfg.normalization,
            normalization,
        };
        Ok(FitOutcome::Fitted { field, report })
    }

    /// Fit `observations` and evaluate the result at `locations`.
    ///
    /// Returns `None` for the field when only the spectrum was requested.
    pub fn grid(
        &self,
        observations: &[Observation],
        locations: &OutputLocations,
    ) -> Result<Option<(FieldOutput, FitReport)>> {
        Ok(self
            .fit(observations)?
            .into_fitted()
            .map(|(field, report)| (field.evaluate(locations), report)))
    }
}

fn nearly_coincident(dups: &DuplicateReport) -> bool {
    if !dups.conflicts.is_empty() {
        return true;
    }
    match (dups.min_separation, dups.max_separation) {
        (Some(lo), Some(hi)) => lo < NEAR_COINCIDENT_FRACTION * hi,
        _ => false,
    }
}
