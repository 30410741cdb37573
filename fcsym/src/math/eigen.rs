// Eigen decomposition of symmetric matrix. Adapted from
// https://github.com/xasmx/rust-la, which is a Rust port of the JAMA implementation
// https://en.wikipedia.org/wiki/JAMA_(numerical_linear_algebra_library)

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Eigendecomposition of a real symmetric matrix into eigenvalues and
/// eigenvectors
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    /// Eigenvalues of the input matrix, sorted in decreasing order
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors of the input matrix, stored as columns in the same order
    /// as the eigenvalues
    pub eigenvectors: Array2<f64>,
}

impl SymmetricEigen {
    /// Compute the eigendecomposition of a real matrix. The matrix must be
    /// square, and is symmetrized as `(A + Aᵀ) / 2` before the decomposition
    /// to remove floating point noise.
    pub fn new(matrix: ArrayView2<'_, f64>) -> SymmetricEigen {
        assert_eq!(matrix.nrows(), matrix.ncols(), "matrix must be square");

        let n = matrix.ncols();
        if n == 0 {
            return SymmetricEigen {
                eigenvalues: Array1::zeros(0),
                eigenvectors: Array2::zeros((0, 0)),
            };
        }

        let mut vectors = Array2::from_shape_fn((n, n), |(i, j)| {
            0.5 * (matrix[[i, j]] + matrix[[j, i]])
        });
        let mut diagonal = Array1::from_elem(n, 0.0);
        let mut off_diagonal = vec![0.0; n];

        householder_tridiagonal(&mut diagonal, &mut vectors, &mut off_diagonal);
        tridiagonal_ql(&mut diagonal, &mut vectors, &mut off_diagonal);
        sort_decreasing(&mut diagonal, &mut vectors);

        SymmetricEigen {
            eigenvalues: diagonal,
            eigenvectors: vectors,
        }
    }

    /// Recreate the input matrix from the eigenvalues and eigenvectors
    pub fn recompose(&self) -> Array2<f64> {
        let scaled = &self.eigenvectors * &self.eigenvalues;
        return scaled.dot(&self.eigenvectors.t());
    }

    /// Number of eigenvalues larger than `relative_tolerance` times the
    /// largest eigenvalue
    pub fn rank(&self, relative_tolerance: f64) -> usize {
        let largest = self.eigenvalues.get(0).copied().unwrap_or(0.0);
        if largest <= 0.0 {
            return 0;
        }
        let cutoff = largest * relative_tolerance;
        self.eigenvalues.iter().filter(|&&value| value > cutoff).count()
    }

    /// Solve `A x = b` in the least-squares sense, using the pseudo-inverse of
    /// `A` restricted to the first `rank` eigenpairs.
    pub fn pseudo_solve(&self, rhs: ArrayView1<'_, f64>, rank: usize) -> Array1<f64> {
        let mut solution = Array1::zeros(rhs.len());
        for (value, vector) in self.eigenvalues.iter().zip(self.eigenvectors.columns()).take(rank) {
            let projection = vector.dot(&rhs) / value;
            solution.scaled_add(projection, &vector);
        }
        return solution;
    }
}

// Symmetric Householder reduction to tridiagonal form.
//
// This is derived from the Algol procedures tred2 by Bowdler, Martin,
// Reinsch, and Wilkinson, Handbook for Auto. Comp., Vol.ii-Linear
// Algebra, and the corresponding Fortran subroutine in EISPACK.
#[allow(clippy::needless_range_loop)]
fn householder_tridiagonal(d: &mut Array1<f64>, v: &mut Array2<f64>, e: &mut [f64]) {
    let n = d.len();
    debug_assert_eq!(e.len(), n);
    debug_assert_eq!(v.len(), n * n);

    for j in 0..n {
        d[j] = v[[n - 1, j]];
    }

    for i in (1..n).rev() {
        let scale = (0..i).map(|k| d[k].abs()).sum::<f64>();
        let mut h = 0.0;

        if scale == 0.0 {
            e[i] = d[i - 1];
            for j in 0..i {
                d[j] = v[[i - 1, j]];
                v[[i, j]] = 0.0;
                v[[j, i]] = 0.0;
            }
            d[i] = h;
            continue;
        }

        // Householder vector
        for k in 0..i {
            d[k] /= scale;
            h += d[k] * d[k];
        }
        let mut f = d[i - 1];
        let mut g = if f > 0.0 { -h.sqrt() } else { h.sqrt() };
        e[i] = scale * g;
        h -= f * g;
        d[i - 1] = f - g;
        e[..i].fill(0.0);

        // similarity transformation of the remaining columns
        for j in 0..i {
            f = d[j];
            v[[j, i]] = f;
            g = e[j] + v[[j, j]] * f;
            for k in (j + 1)..i {
                g += v[[k, j]] * d[k];
                e[k] += v[[k, j]] * f;
            }
            e[j] = g;
        }

        f = 0.0;
        for j in 0..i {
            e[j] /= h;
            f += e[j] * d[j];
        }
        let hh = f / (h + h);
        for j in 0..i {
            e[j] -= hh * d[j];
        }
        for j in 0..i {
            f = d[j];
            g = e[j];
            for k in j..i {
                v[[k, j]] -= f * e[k] + g * d[k];
            }
            d[j] = v[[i - 1, j]];
            v[[i, j]] = 0.0;
        }
        d[i] = h;
    }

    // accumulate transformations
    for i in 0..(n - 1) {
        v[[n - 1, i]] = v[[i, i]];
        v[[i, i]] = 1.0;
        let h = d[i + 1];
        if h != 0.0 {
            for k in 0..=i {
                d[k] = v[[k, i + 1]] / h;
            }
            for j in 0..=i {
                let g = (0..=i).map(|k| v[[k, i + 1]] * v[[k, j]]).sum::<f64>();
                for k in 0..=i {
                    v[[k, j]] -= g * d[k];
                }
            }
        }
        for k in 0..=i {
            v[[k, i + 1]] = 0.0;
        }
    }
    for j in 0..n {
        d[j] = v[[n - 1, j]];
        v[[n - 1, j]] = 0.0;
    }
    v[[n - 1, n - 1]] = 1.0;
    e[0] = 0.0;
}

// Symmetric tridiagonal QL algorithm.
//
// This is derived from the Algol procedures tql2, by Bowdler, Martin,
// Reinsch, and Wilkinson, Handbook for Auto. Comp., Vol.ii-Linear
// Algebra, and the corresponding Fortran subroutine in EISPACK.
fn tridiagonal_ql(d: &mut Array1<f64>, v: &mut Array2<f64>, e: &mut [f64]) {
    let n = d.len();
    debug_assert_eq!(e.len(), n);

    e.copy_within(1.., 0);
    e[n - 1] = 0.0;

    let mut f = 0.0;
    let mut tst1 = 0.0f64;
    for l in 0..n {
        // find small subdiagonal element
        tst1 = tst1.max(d[l].abs() + e[l].abs());
        let mut m = l;
        while m < n {
            if e[m].abs() <= f64::EPSILON * tst1 {
                break;
            }
            m += 1;
        }

        // if m == l, d[l] is already an eigenvalue
        if m > l {
            loop {
                // implicit shift
                let mut g = d[l];
                let mut p = (d[l + 1] - g) / (2.0 * e[l]);
                let mut r = f64::hypot(p, 1.0);
                if p < 0.0 {
                    r = -r;
                }
                d[l] = e[l] / (p + r);
                d[l + 1] = e[l] * (p + r);
                let dl1 = d[l + 1];
                let mut h = g - d[l];
                for i in (l + 2)..n {
                    d[i] -= h;
                }
                f += h;

                // implicit QL transformation
                p = d[m];
                let mut c = 1.0;
                let mut c2 = c;
                let mut c3 = c;
                let el1 = e[l + 1];
                let mut s = 0.0;
                let mut s2 = 0.0;
                for i in (l..m).rev() {
                    c3 = c2;
                    c2 = c;
                    s2 = s;
                    g = c * e[i];
                    h = c * p;
                    r = f64::hypot(p, e[i]);
                    e[i + 1] = s * r;
                    s = e[i] / r;
                    c = p / r;
                    p = c * d[i] - s * g;
                    d[i + 1] = h + s * (c * g + s * d[i]);

                    for k in 0..n {
                        h = v[[k, i + 1]];
                        v[[k, i + 1]] = s * v[[k, i]] + c * h;
                        v[[k, i]] = c * v[[k, i]] - s * h;
                    }
                }
                p = -s * s2 * c3 * el1 * e[l] / dl1;
                e[l] = s * p;
                d[l] = c * p;

                if e[l].abs() <= f64::EPSILON * tst1 {
                    break;
                }
            }
        }
        d[l] += f;
        e[l] = 0.0;
    }
}

/// Selection sort of the eigenpairs by decreasing eigenvalue
fn sort_decreasing(d: &mut Array1<f64>, v: &mut Array2<f64>) {
    let n = d.len();
    for i in 0..n.saturating_sub(1) {
        let mut k = i;
        for j in (i + 1)..n {
            if d[j] > d[k] {
                k = j;
            }
        }
        if k != i {
            d.swap(i, k);
            for row in 0..n {
                v.swap([row, i], [row, k]);
            }
        }
    }
}
