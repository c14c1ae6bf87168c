//! Detection of data constraints that share a location.
//!
//! Records are scanned in input order and compared against every record
//! already retained. A coincident record with the same observation adds
//! nothing and is dropped. A coincident record with a different observation
//! is kept but reported: together they make the linear system singular.

use tracing::{info, warn};

use crate::distance::DistanceModel;
use crate::observation::Observation;

/// Separations below this are treated as zero.
pub const COINCIDENT_TOLERANCE: f64 = 1e-8;

/// Two retained records at the same location with different observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictingPair {
    /// Input index of the earlier record.
    pub first: usize,
    /// Input index of the later record.
    pub second: usize,
}

/// Outcome of the duplicate scan.
#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    /// Input indices of the retained records, in input order.
    pub retained: Vec<usize>,
    /// `(dropped, kept)` input index pairs for identical duplicates.
    pub skipped: Vec<(usize, usize)>,
    /// Coincident pairs whose observations differ.
    pub conflicts: Vec<ConflictingPair>,
    /// Shortest non-zero separation between retained records.
    pub min_separation: Option<f64>,
    /// Longest separation between retained records.
    pub max_separation: Option<f64>,
}

impl DuplicateReport {
    /// Number of retained records.
    pub fn n_retained(&self) -> usize {
        self.retained.len()
    }
}

/// Scan `observations` for coincident locations.
pub fn resolve_duplicates(observations: &[Observation], distance: DistanceModel) -> DuplicateReport {
    let mut report = DuplicateReport::default();
    let mut r_min = f64::MAX;
    let mut r_max = f64::MIN;
    let mut separations = Vec::new();
    let mut coincident = Vec::new();

    for (k, obs) in observations.iter().enumerate() {
        separations.clear();
        coincident.clear();
        let mut identical_to = None;

        for &i in &report.retained {
            let kept = &observations[i];
            let r = distance.radius(kept.location(), obs.location());
            if r < COINCIDENT_TOLERANCE {
                if almost_equal(obs.u, kept.u) && almost_equal(obs.v, kept.v) {
                    identical_to = Some(i);
                    break;
                }
                coincident.push(i);
            } else {
                separations.push(r);
            }
        }

        if let Some(i) = identical_to {
            info!("Data constraint {} is identical to {} and will be skipped", k, i);
            report.skipped.push((k, i));
            continue;
        }

        for &i in &coincident {
            let kept = &observations[i];
            warn!(
                "Data constraints {} and {} occupy the same location but differ in observation \
                 ({:.12}/{:.12} vs {:.12}/{:.12})",
                i, k, kept.u, obs.u, kept.v, obs.v
            );
            report.conflicts.push(ConflictingPair {
                first: i,
                second: k,
            });
        }
        for &r in &separations {
            r_min = r_min.min(r);
            r_max = r_max.max(r);
        }
        report.retained.push(k);
    }

    if r_min <= r_max {
        report.min_separation = Some(r_min);
        report.max_separation = Some(r_max);
    }

    info!(
        "Found {} unique data constraints ({} skipped as duplicates, {} conflicting pairs)",
        report.retained.len(),
        report.skipped.len(),
        report.conflicts.len()
    );
    report
}

/// Equality up to a few units in the last place.
#[inline]
fn almost_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= 4.0 * f64::EPSILON * a.abs().max(b.abs()).max(1.0)
}
