//! Pairwise Euclidean distances between the rows of a feature matrix.

use nalgebra::DMatrix;

/// `out[(i, j)] = ‖rows[i] - rows[j]‖₂`.
///
/// The result is symmetric with a zero diagonal.
pub fn pairwise_euclidean(rows: &DMatrix<f64>) -> DMatrix<f64> {
    let n = rows.nrows();
    let mut out = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = (rows.row(i) - rows.row(j)).norm();
            out[(i, j)] = d;
            out[(j, i)] = d;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances_are_symmetric_with_zero_diagonal() {
        let rows = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 3.0, 4.0, 0.0, 1.0]);
        let d = pairwise_euclidean(&rows);
        assert_eq!(d[(0, 0)], 0.0);
        assert!((d[(0, 1)] - 5.0).abs() < 1e-12);
        assert!((d[(1, 0)] - 5.0).abs() < 1e-12);
        assert!((d[(0, 2)] - 1.0).abs() < 1e-12);
    }
}
