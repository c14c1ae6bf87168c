//! Where the fitted field is evaluated.
//!
//! # Lattice conventions
//!
//! - Gridline registration puts nodes on cell corners: `round((max − min)/inc) + 1`
//!   nodes per axis, the first at `min`.
//! - Pixel registration puts nodes on cell centres: `round((max − min)/inc)` nodes,
//!   the first at `min + inc/2`.
//! - Values are stored row-major with row 0 along the northern edge (`y_max`).

use crate::error::{GridError, Result};

/// Whether lattice values sit on cell corners or cell centres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Registration {
    #[default]
    Gridline,
    Pixel,
}

/// A regular lattice over a rectangular region.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub x_inc: f64,
    pub y_inc: f64,
    pub registration: Registration,
    nx: usize,
    ny: usize,
}

impl Lattice {
    /// Build and validate a lattice from its region, spacing and registration.
    pub fn new(
        region: [f64; 4],
        inc: [f64; 2],
        registration: Registration,
    ) -> Result<Self> {
        let [x_min, x_max, y_min, y_max] = region;
        if region.iter().chain(inc.iter()).any(|v| !v.is_finite()) {
            return Err(GridError::InvalidLattice(
                "region and increments must be finite".to_string(),
            ));
        }
        if inc[0] <= 0.0 || inc[1] <= 0.0 {
            return Err(GridError::InvalidLattice(format!(
                "increments must be positive, got {}/{}",
                inc[0], inc[1]
            )));
        }
        if x_max < x_min || y_max < y_min {
            return Err(GridError::InvalidLattice(format!(
                "region {x_min}/{x_max}/{y_min}/{y_max} is inverted"
            )));
        }

        let nx = axis_count(x_min, x_max, inc[0], registration)?;
        let ny = axis_count(y_min, y_max, inc[1], registration)?;
        if nx == 0 || ny == 0 {
            return Err(GridError::InvalidLattice(format!(
                "region {x_min}/{x_max}/{y_min}/{y_max} holds no pixel-registered cells"
            )));
        }
        if nx.checked_mul(ny).is_none() {
            return Err(GridError::InvalidLattice(format!(
                "{nx} × {ny} nodes overflow the addressable size"
            )));
        }

        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
            x_inc: inc[0],
            y_inc: inc[1],
            registration,
            nx,
            ny,
        })
    }

    /// Nodes per row.
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Number of rows.
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Total node count. Cannot overflow: `new` rejects such lattices.
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    /// Always `false`: a valid lattice has at least one node.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn half_cell(&self) -> f64 {
        match self.registration {
            Registration::Gridline => 0.0,
            Registration::Pixel => 0.5,
        }
    }

    /// x coordinate of column `col`.
    pub fn x(&self, col: usize) -> f64 {
        self.x_min + (col as f64 + self.half_cell()) * self.x_inc
    }

    /// y coordinate of row `row` (row 0 is northernmost).
    pub fn y(&self, row: usize) -> f64 {
        self.y_max - (row as f64 + self.half_cell()) * self.y_inc
    }

    /// Row-major flat index of `(row, col)`.
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.nx + col
    }

    /// Coordinates of every node, row-major.
    pub fn nodes(&self) -> Vec<[f64; 2]> {
        let xs: Vec<f64> = (0..self.nx).map(|c| self.x(c)).collect();
        (0..self.ny)
            .flat_map(|r| {
                let y = self.y(r);
                xs.iter().map(move |&x| [x, y])
            })
            .collect()
    }
}

fn axis_count(min: f64, max: f64, inc: f64, registration: Registration) -> Result<usize> {
    let cells = ((max - min) / inc).round();
    // `as usize` saturates, so anything at or past the limit is out of range
    let too_many = || {
        GridError::InvalidLattice(format!(
            "increment {inc} over {min}/{max} gives too many nodes"
        ))
    };
    if !cells.is_finite() || cells >= usize::MAX as f64 {
        return Err(too_many());
    }
    let cells = cells as usize;
    match registration {
        Registration::Gridline => cells.checked_add(1).ok_or_else(too_many),
        Registration::Pixel => Ok(cells),
    }
}

/// A lattice restricted by a row-major validity mask of matching length.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedLattice {
    lattice: Lattice,
    mask: Vec<bool>,
}

impl MaskedLattice {
    /// Pair `lattice` with `mask`, one entry per node.
    pub fn new(lattice: Lattice, mask: Vec<bool>) -> Result<Self> {
        if mask.len() != lattice.len() {
            return Err(GridError::MaskSizeMismatch {
                expected: lattice.len(),
                got: mask.len(),
            });
        }
        Ok(Self { lattice, mask })
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// `true` where the node is evaluated.
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Number of unmasked nodes.
    pub fn n_valid(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }
}

/// The set of locations to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLocations {
    /// Every node of a lattice.
    Lattice(Lattice),
    /// Only the lattice nodes whose mask entry is `true`.
    Masked(MaskedLattice),
    /// An explicit list; results keep this order.
    Points(Vec<[f64; 2]>),
}

impl OutputLocations {
    /// Restrict `lattice` with a row-major validity mask.
    pub fn masked(lattice: Lattice, mask: Vec<bool>) -> Result<Self> {
        MaskedLattice::new(lattice, mask).map(OutputLocations::Masked)
    }

    /// Restrict `lattice` to the nodes where `values` is not NaN, the
    /// convention of a mask grid holding zeros and NaNs.
    pub fn masked_from_values(lattice: Lattice, values: &[f64]) -> Result<Self> {
        let mask = values.iter().map(|v| !v.is_nan()).collect();
        Self::masked(lattice, mask)
    }

    /// The query coordinates, in output order.
    pub fn query_points(&self) -> Vec<[f64; 2]> {
        match self {
            OutputLocations::Lattice(lattice) => lattice.nodes(),
            OutputLocations::Masked(masked) => masked
                .lattice
                .nodes()
                .into_iter()
                .zip(&masked.mask)
                .filter_map(|(p, &valid)| valid.then_some(p))
                .collect(),
            OutputLocations::Points(points) => points.clone(),
        }
    }

    /// Number of locations that will be evaluated.
    pub fn n_queries(&self) -> usize {
        match self {
            OutputLocations::Lattice(lattice) => lattice.len(),
            OutputLocations::Masked(masked) => masked.n_valid(),
            OutputLocations::Points(points) => points.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gridline_geometry() {
        let g = Lattice::new([0.0, 10.0, -5.0, 5.0], [2.0, 2.5], Registration::Gridline).unwrap();
        assert_eq!(g.nx(), 6);
        assert_eq!(g.ny(), 5);
        assert_eq!(g.x(0), 0.0);
        assert_eq!(g.x(5), 10.0);
        assert_eq!(g.y(0), 5.0);
        assert_eq!(g.y(4), -5.0);
    }

    #[test]
    fn test_pixel_geometry() {
        let g = Lattice::new([0.0, 10.0, 0.0, 4.0], [2.0, 2.0], Registration::Pixel).unwrap();
        assert_eq!(g.nx(), 5);
        assert_eq!(g.ny(), 2);
        assert_eq!(g.x(0), 1.0);
        assert_eq!(g.x(4), 9.0);
        assert_eq!(g.y(0), 3.0);
        assert_eq!(g.y(1), 1.0);
    }

    #[test]
    fn test_nodes_row_major_from_north() {
        let g = Lattice::new([0.0, 1.0, 0.0, 1.0], [1.0, 1.0], Registration::Gridline).unwrap();
        assert_eq!(
            g.nodes(),
            vec![[0.0, 1.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0]]
        );
        assert_eq!(g.index(1, 0), 2);
    }

    #[test]
    fn test_invalid_lattices() {
        assert!(Lattice::new([0.0, 1.0, 0.0, 1.0], [0.0, 1.0], Registration::Gridline).is_err());
        assert!(Lattice::new([1.0, 0.0, 0.0, 1.0], [0.1, 0.1], Registration::Gridline).is_err());
        assert!(Lattice::new([0.0, 0.0, 0.0, 1.0], [0.1, 0.1], Registration::Pixel).is_err());
        assert!(Lattice::new([0.0, f64::NAN, 0.0, 1.0], [0.1, 0.1], Registration::Pixel).is_err());
    }

    #[test]
    fn test_oversized_lattices_rejected() {
        // Node count per axis past usize::MAX
        assert!(matches!(
            Lattice::new([0.0, 1.0, 0.0, 1.0], [1e-300, 1.0], Registration::Gridline),
            Err(GridError::InvalidLattice(_))
        ));
        // Infinite span from a finite region
        assert!(matches!(
            Lattice::new([-1e308, 1e308, 0.0, 1.0], [1.0, 1.0], Registration::Pixel),
            Err(GridError::InvalidLattice(_))
        ));
        // Each axis fits, their product does not
        assert!(matches!(
            Lattice::new([0.0, 1e10, 0.0, 1e10], [1.0, 1.0], Registration::Gridline),
            Err(GridError::InvalidLattice(_))
        ));
    }

    #[test]
    fn test_mask() {
        let g = Lattice::new([0.0, 1.0, 0.0, 1.0], [1.0, 1.0], Registration::Gridline).unwrap();
        assert!(matches!(
            OutputLocations::masked(g.clone(), vec![true; 3]),
            Err(GridError::MaskSizeMismatch { expected: 4, got: 3 })
        ));

        assert!(MaskedLattice::new(g.clone(), vec![true; 5]).is_err());
        let m = MaskedLattice::new(g.clone(), vec![true, false, true, true]).unwrap();
        assert_eq!(m.mask().len(), m.lattice().len());
        assert_eq!(m.n_valid(), 3);

        let out = OutputLocations::masked_from_values(g, &[0.0, f64::NAN, f64::NAN, 0.0]).unwrap();
        assert_eq!(out.n_queries(), 2);
        assert_eq!(out.query_points(), vec![[0.0, 1.0], [1.0, 0.0]]);
    }
}
