//! Gauss-Jordan elimination with partial pivoting.
//!
//! The right-hand side is reduced in place and returned as the solution.

use nalgebra::{DMatrix, DVector};

use crate::error::{GridError, Result};

/// Solve `a · x = b`, consuming both.
///
/// Fails with [`GridError::SingularMatrix`] when a pivot falls below
/// `max|a| · n · ε`.
pub fn solve(mut a: DMatrix<f64>, mut b: DVector<f64>) -> Result<DVector<f64>> {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "Gauss-Jordan needs a square matrix");
    assert_eq!(n, b.len(), "right-hand side length must match the matrix");

    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let tol = scale * n as f64 * f64::EPSILON;
    if n > 0 && scale == 0.0 {
        return Err(GridError::SingularMatrix { coincident: false });
    }

    let mut factors = vec![0.0; n];
    for col in 0..n {
        // Find pivot
        let mut pivot_row = col;
        let mut max_abs = a[(col, col)].abs();
        for row in (col + 1)..n {
            let v = a[(row, col)].abs();
            if v > max_abs {
                max_abs = v;
                pivot_row = row;
            }
        }
        if max_abs <= tol {
            return Err(GridError::SingularMatrix { coincident: false });
        }

        if pivot_row != col {
            a.swap_rows(col, pivot_row);
            b.swap_rows(col, pivot_row);
        }

        // Scale the pivot row to a unit pivot
        let inv_pivot = 1.0 / a[(col, col)];
        for c in col..n {
            a[(col, c)] *= inv_pivot;
        }
        b[col] *= inv_pivot;

        // Clear the pivot column in every other row, walking the matrix
        // column by column to stay on contiguous storage
        for (row, f) in factors.iter_mut().enumerate() {
            *f = if row == col { 0.0 } else { a[(row, col)] };
        }
        for c in col..n {
            let pc = a[(col, c)];
            if pc == 0.0 {
                continue;
            }
            let mut column = a.column_mut(c);
            for (row, &f) in factors.iter().enumerate() {
                if f != 0.0 {
                    column[row] -= f * pc;
                }
            }
        }
        let bc = b[col];
        for (row, &f) in factors.iter().enumerate() {
            if f != 0.0 {
                b[row] -= f * bc;
            }
        }
    }

    Ok(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_3x3() {
        // Needs a row swap at the first column
        let a = DMatrix::from_row_slice(3, 3, &[0.0, 2.0, 1.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let x_true = DVector::from_vec(vec![1.0, -2.0, 3.0]);
        let b = &a * &x_true;
        let x = solve(a, b).unwrap();
        for i in 0..3 {
            assert!(
                (x[i] - x_true[i]).abs() < 1e-12,
                "x[{}] = {}, expected {}",
                i,
                x[i],
                x_true[i]
            );
        }
    }

    #[test]
    fn test_singular_detected() {
        // Two identical rows, as coincident observations produce
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 0.0, 1.0, 4.0]);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            solve(a, b),
            Err(GridError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn test_matches_lu() {
        let n = 8;
        let a = DMatrix::from_fn(n, n, |r, c| {
            if r == c {
                10.0 + r as f64
            } else {
                ((r * 7 + c * 3) % 5) as f64 - 2.0
            }
        });
        let b = DVector::from_fn(n, |i, _| (i as f64).sin());
        let expected = a.clone().lu().solve(&b).unwrap();
        let x = solve(a, b).unwrap();
        assert!((x - expected).amax() < 1e-12);
    }
}
