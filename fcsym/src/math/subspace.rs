//! Iterative extraction of the largest eigenpairs of large sparse symmetric
//! operators, using block subspace iteration with Rayleigh-Ritz projection.
use log::debug;
use ndarray::{Array1, Array2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::Error;
use super::SymmetricEigen;
use super::sparse::{self, SparseMatrix};

/// Parameters of the subspace iteration
#[derive(Debug, Clone)]
pub(crate) struct SubspaceIteration {
    /// size of the iterated subspace
    pub n_eigenpairs: usize,
    /// eigenvalues above this are returned
    pub threshold: f64,
    /// maximal residual norm `|A x - λ x|` of returned eigenpairs
    pub tolerance: f64,
    pub max_iterations: usize,
    pub seed: u64,
}

/// Eigenpairs returned by the subspace iteration, sorted by decreasing
/// eigenvalue
#[derive(Debug, Clone)]
pub(crate) struct RitzPairs {
    pub values: Array1<f64>,
    pub vectors: Array2<f64>,
}

impl SubspaceIteration {
    /// Get all the eigenpairs of `operator` with eigenvalue above the
    /// threshold. This fails if the iterated subspace is too small to contain
    /// all of them, or if the residuals did not converge.
    #[time_graph::instrument(name = "SubspaceIteration::run")]
    pub fn run(&self, operator: &SparseMatrix) -> Result<RitzPairs, Error> {
        let n = operator.rows();
        assert_eq!(n, operator.cols());
        let k = usize::min(self.n_eigenpairs, n);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let shift = gershgorin_shift(operator);

        let start = Array2::from_shape_fn((n, k), |_| rng.gen_range(-1.0..1.0));
        let mut basis = orthonormalize(start, &mut rng);

        let mut achieved = Vec::new();
        let mut previous: Option<Array1<f64>> = None;
        for iteration in 0..self.max_iterations {
            // power step on the shifted operator, so that the largest
            // eigenvalues are also the largest in magnitude
            let mut image = sparse::mul_dense(operator, basis.view());
            if shift > 0.0 {
                image.scaled_add(shift, &basis);
            }
            basis = orthonormalize(image, &mut rng);

            let operator_basis = sparse::mul_dense(operator, basis.view());
            let reduced = basis.t().dot(&operator_basis);
            let eigen = SymmetricEigen::new(reduced.view());

            let ritz_vectors = basis.dot(&eigen.eigenvectors);
            let operator_ritz = operator_basis.dot(&eigen.eigenvectors);

            // Ritz values are sorted in decreasing order
            let n_above = eigen.eigenvalues.iter().take_while(|&&value| value > self.threshold).count();

            // the pairs above the threshold and the largest one below it must
            // all be converged eigenpairs, whatever their current values
            let n_checked = usize::min(n_above + 1, k);
            let mut converged = true;
            achieved.clear();
            for j in 0..n_checked {
                let value = eigen.eigenvalues[j];
                let mut residual = operator_ritz.column(j).to_owned();
                residual.scaled_add(-value, &ritz_vectors.column(j));
                if residual.dot(&residual).sqrt() < self.tolerance {
                    if j < n_above {
                        achieved.push(value);
                    }
                } else {
                    converged = false;
                }
            }

            let stable = previous.as_ref().map_or(false, |previous| {
                (0..n_checked).all(|j| (previous[j] - eigen.eigenvalues[j]).abs() < self.tolerance)
            });

            // if every Ritz value is above the threshold, some eigenpairs
            // might be missing from the subspace
            let complete = n_above < k || k == n;

            if converged && stable && complete {
                debug!(
                    "subspace iteration converged after {} iterations: {} eigenpairs above {} in a block of size {}",
                    iteration + 1, n_above, self.threshold, n
                );

                return Ok(RitzPairs {
                    values: eigen.eigenvalues.slice(ndarray::s![..n_above]).to_owned(),
                    vectors: ritz_vectors.slice(ndarray::s![.., ..n_above]).to_owned(),
                });
            }

            previous = Some(eigen.eigenvalues);
            basis = ritz_vectors;
        }

        return Err(Error::ProjectorEigensolveFailure {
            dimension: n,
            requested: k,
            achieved: achieved,
        });
    }
}

/// Get the shift making the operator positive semi-definite, from the
/// Gershgorin lower bound on its eigenvalues
fn gershgorin_shift(operator: &SparseMatrix) -> f64 {
    let n = operator.rows();
    let mut lower_bounds = vec![0.0; n];
    for (i, j, value) in sparse::triplets(operator) {
        if i == j {
            lower_bounds[i] += value;
        } else {
            lower_bounds[i] -= value.abs();
        }
    }

    let lowest = lower_bounds.iter().copied().fold(0.0, f64::min);
    return -lowest;
}

/// Orthonormalize the columns of `vectors` with two passes of modified
/// Gram-Schmidt. Columns that become linearly dependent are replaced by
/// random vectors.
fn orthonormalize(vectors: Array2<f64>, rng: &mut StdRng) -> Array2<f64> {
    let (n, k) = vectors.dim();
    debug_assert!(k <= n);

    let mut columns: Vec<Array1<f64>> = Vec::with_capacity(k);
    for column in vectors.axis_iter(Axis(1)) {
        let mut candidate = column.to_owned();
        for _attempt in 0..16 {
            let reference = candidate.dot(&candidate).sqrt();
            for _pass in 0..2 {
                for previous in &columns {
                    let overlap = previous.dot(&candidate);
                    candidate.scaled_add(-overlap, previous);
                }
            }

            let norm = candidate.dot(&candidate).sqrt();
            if reference > 0.0 && norm > 1e-8 * reference {
                candidate /= norm;
                break;
            }

            candidate = Array1::from_shape_fn(n, |_| rng.gen_range(-1.0..1.0));
        }
        columns.push(candidate);
    }

    return Array2::from_shape_fn((n, k), |(i, j)| columns[j][i]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Block diagonal projector on `n_blocks` pairs of indices `(2i, 2i + 1)`,
    /// each block projecting on `(1, 1) / √2`
    fn pair_projector(n_blocks: usize) -> SparseMatrix {
        let mut entries = Vec::new();
        for block in 0..n_blocks {
            for i in 0..2 {
                for j in 0..2 {
                    entries.push((2 * block + i, 2 * block + j, 0.5));
                }
            }
        }
        sparse::from_triplets((2 * n_blocks, 2 * n_blocks), entries)
    }

    #[test]
    fn projector_eigenspace() {
        let projector = pair_projector(30);
        let iteration = SubspaceIteration {
            n_eigenpairs: 38,
            threshold: 0.99,
            tolerance: 1e-10,
            max_iterations: 50,
            seed: 42,
        };

        let pairs = iteration.run(&projector).unwrap();
        assert_eq!(pairs.values.len(), 30);
        for &value in &pairs.values {
            assert_relative_eq!(value, 1.0, epsilon = 1e-10);
        }

        let gram = pairs.vectors.t().dot(&pairs.vectors);
        assert_relative_eq!(gram, Array2::<f64>::eye(30), epsilon = 1e-10);

        let image = sparse::mul_dense(&projector, pairs.vectors.view());
        assert_relative_eq!(image, pairs.vectors, epsilon = 1e-10);
    }

    #[test]
    fn too_small_subspace() {
        let projector = pair_projector(30);
        let iteration = SubspaceIteration {
            n_eigenpairs: 10,
            threshold: 0.99,
            tolerance: 1e-10,
            max_iterations: 5,
            seed: 42,
        };

        match iteration.run(&projector) {
            Err(Error::ProjectorEigensolveFailure { dimension, requested, .. }) => {
                assert_eq!(dimension, 60);
                assert_eq!(requested, 10);
            }
            other => panic!("expected an eigensolver failure, got {:?}", other),
        }
    }

    /// Projector on a single dense direction, which the first iteration can
    /// not reach
    fn rank_one_projector(n: usize) -> (SparseMatrix, Array1<f64>) {
        let mut vector = Array1::from_shape_fn(n, |i| 1.0 + f64::sin(i as f64));
        vector /= vector.dot(&vector).sqrt();

        let mut entries = Vec::new();
        for i in 0..n {
            for j in 0..n {
                entries.push((i, j, vector[i] * vector[j]));
            }
        }
        (sparse::from_triplets((n, n), entries), vector)
    }

    #[test]
    fn single_direction() {
        let (projector, vector) = rank_one_projector(24);
        let iteration = SubspaceIteration {
            n_eigenpairs: 3,
            threshold: 0.99,
            tolerance: 1e-8,
            max_iterations: 300,
            seed: 42,
        };

        let pairs = iteration.run(&projector).unwrap();
        assert_eq!(pairs.values.len(), 1);
        assert_relative_eq!(pairs.values[0], 1.0, epsilon = 1e-8);
        let overlap = pairs.vectors.column(0).dot(&vector);
        assert_relative_eq!(overlap.abs(), 1.0, epsilon = 1e-8);

        // a single iteration can not confirm the eigenspace
        let iteration = SubspaceIteration { max_iterations: 1, ..iteration };
        match iteration.run(&projector) {
            Err(Error::ProjectorEigensolveFailure { dimension, .. }) => assert_eq!(dimension, 24),
            other => panic!("expected an eigensolver failure, got {:?}", other),
        }
    }

    #[test]
    fn negative_eigenvalues() {
        // eigenvalues -3 and 1
        let operator = sparse::from_triplets((2, 2), vec![
            (0, 0, -1.0), (0, 1, 2.0), (1, 0, 2.0), (1, 1, -1.0),
        ]);
        let iteration = SubspaceIteration {
            n_eigenpairs: 2,
            threshold: 0.5,
            tolerance: 1e-10,
            max_iterations: 50,
            seed: 1,
        };

        let pairs = iteration.run(&operator).unwrap();
        assert_eq!(pairs.values.len(), 1);
        assert_relative_eq!(pairs.values[0], 1.0, epsilon = 1e-10);
    }
}
