use log::debug;
use ndarray::{Array2, s};

use crate::Error;
use crate::math::{SubspaceIteration, SymmetricEigen};
use crate::math::sparse::{self, SparseMatrix};

use super::EigenOptions;

/// Entries smaller than this are dropped from the basis vectors
const DROP_TOLERANCE: f64 = 1e-12;

/// Get an orthonormal basis of the eigenspace of the symmetric `operator`
/// with eigenvalues above `options.eigenvalue_threshold`, as the columns of a
/// sparse matrix.
///
/// The operator is split in the connected components of its sparsity graph,
/// which are diagonalized independently: with the dense eigensolver for
/// blocks up to `options.dense_threshold`, and with subspace iteration for
/// larger blocks. Columns are ordered by block (in order of the smallest index
/// in the block), then by decreasing eigenvalue. The sign of each column is
/// chosen so that its largest component is positive.
#[time_graph::instrument(name = "eigen_basis")]
pub fn eigen_basis(operator: &SparseMatrix, options: &EigenOptions) -> Result<SparseMatrix, Error> {
    options.validate()?;
    if operator.rows() != operator.cols() {
        return Err(Error::ShapeMismatch {
            context: "eigen basis operator".into(),
            expected: vec![operator.rows(), operator.rows()],
            got: vec![operator.rows(), operator.cols()],
        });
    }

    let n = operator.rows();
    let components = sparse::connected_components(operator);

    let mut position = vec![0; n];
    let mut entries = Vec::new();
    let mut n_columns = 0;
    let mut n_iterative = 0;
    for component in &components {
        for (local, &global) in component.iter().enumerate() {
            position[global] = local;
        }

        let vectors = if component.len() <= options.dense_threshold {
            dense_eigenspace(operator, component, &position, options.eigenvalue_threshold)
        } else {
            n_iterative += 1;
            let block = sparse::sparse_block(operator, component, &position);
            let requested = match options.n_eigenpairs {
                Some(requested) => requested,
                None => (sparse::trace(&block) / options.eigenvalue_threshold).ceil().max(0.0) as usize + 8,
            };

            let iteration = SubspaceIteration {
                n_eigenpairs: usize::max(requested, 1),
                threshold: options.eigenvalue_threshold,
                tolerance: options.tolerance,
                max_iterations: options.max_iterations,
                seed: options.seed,
            };
            let pairs = iteration.run(&block)?;
            debug!("subspace iteration on a block of size {}: accepted eigenvalues {:?}", component.len(), pairs.values);
            pairs.vectors
        };

        for column in vectors.columns() {
            let largest = column.iter().enumerate().fold((0, 0.0), |(best, max), (i, &value)| {
                if value.abs() > max { (i, value.abs()) } else { (best, max) }
            });
            let sign = if column[largest.0] < 0.0 { -1.0 } else { 1.0 };

            for (local, &value) in column.iter().enumerate() {
                if value.abs() >= DROP_TOLERANCE {
                    entries.push((component[local], n_columns, sign * value));
                }
            }
            n_columns += 1;
        }
    }

    debug!(
        "eigen basis: {} vectors from an operator of size {} with {} blocks ({} iterative)",
        n_columns, n, components.len(), n_iterative
    );

    return Ok(sparse::from_triplets((n, n_columns), entries));
}

/// Diagonalize a block of the operator with the dense eigensolver, and
/// return the eigenvectors with eigenvalue above the threshold
fn dense_eigenspace(
    operator: &SparseMatrix,
    component: &[usize],
    position: &[usize],
    threshold: f64,
) -> Array2<f64> {
    let block = sparse::dense_block(operator, component, position);
    let eigen = SymmetricEigen::new(block.view());

    // eigenvalues are sorted in decreasing order
    let accepted = eigen.eigenvalues.iter().take_while(|&&value| value > threshold).count();
    return eigen.eigenvectors.slice(s![.., ..accepted]).to_owned();
}
