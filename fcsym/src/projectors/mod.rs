//! Sparse projectors on the symmetry-invariant subspaces of the compact force
//! constants space.
//!
//! All operators here act on the compact space of an [`IndexCompressor`], or
//! on a subspace of it spanned by the orthonormal columns of a compression
//! matrix.
use log::debug;

use crate::Error;
use crate::compression::IndexCompressor;
use crate::math::sparse::{self, SparseMatrix};
use crate::symmetry::SymmetryContext;

/// Get the projector on the compact vectors symmetric under permutations of
/// the (atom, Cartesian) slots of the tensor, `C_perm · C_permᵀ`. Lattice
/// translation symmetry is already built in the compact space.
#[time_graph::instrument(name = "projectors::permutation_translation")]
pub fn permutation_translation_projector(compressor: &IndexCompressor) -> SparseMatrix {
    let c_perm = compressor.permutation_compression_matrix();
    let projector = sparse::mul(&c_perm, &sparse::transpose(&c_perm));
    debug!(
        "permutation-translation projector: dimension {}, rank {}, {} non-zero entries",
        projector.rows(), c_perm.cols(), projector.nnz()
    );
    return projector;
}

/// Get the default normalization of each term of the coset sum, such that the
/// sum over all coset representatives is a projector
pub fn default_coset_factor(ctx: &SymmetryContext<'_>) -> f64 {
    let n_lp = ctx.translations().n_lp() as f64;
    let n_cosets = ctx.coset_representatives().len() as f64;
    return 1.0 / (n_lp * n_cosets);
}

/// Get the action of the space group operation `operation` on the compact
/// space, `(Cᵀ σ_g C) ⊗ R_g`, multiplied by `n_lp · factor`.
fn coset_term(
    ctx: &SymmetryContext<'_>,
    compressor: &IndexCompressor,
    operation: usize,
    factor: f64,
) -> Result<SparseMatrix, Error> {
    let order = compressor.order();
    let size = order.cartesian_size();
    let rank = order.rank();

    let representation = ctx.rotation_representation(operation, order);
    let permutation = ctx.operations()[operation].permutation();
    let scale = compressor.n_lp() as f64 * factor;

    let mut entries = Vec::new();
    for tuple in 0..compressor.n_tuples() {
        let atoms = compressor.tuple_atoms(tuple);
        let mut mapped = [0; 3];
        for slot in 0..rank {
            mapped[slot] = permutation[atoms[slot]];
        }

        let target = compressor.compact_tuple(&mapped[..rank]).ok_or_else(|| Error::SymmetryInconsistency {
            operation: operation,
            atom: Some(atoms[0]),
            message: "the operation maps a retained atomic tuple onto an excluded one".into(),
        })?;

        for row in 0..size {
            for column in 0..size {
                let value = representation[[row, column]];
                if value.abs() > 1e-12 {
                    entries.push((target * size + row, tuple * size + column, value * scale));
                }
            }
        }
    }

    let dimension = compressor.dimension();
    return Ok(sparse::from_triplets((dimension, dimension), entries));
}

fn coset_factor(ctx: &SymmetryContext<'_>, factor: Option<f64>) -> Result<f64, Error> {
    let factor = factor.unwrap_or_else(|| default_coset_factor(ctx));
    if !(factor.is_finite() && factor > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "coset factor must be positive, got {}", factor
        )));
    }
    return Ok(factor);
}

/// Get the coset sum projector `Σ_g (Cᵀ σ_g C) ⊗ (R_g · factor)` over the
/// coset representatives of the space group, in the full compact space.
///
/// With the default `factor` of `1 / (n_lp · n_cosets)`, this is the
/// projector on the compact vectors invariant under the space group.
#[time_graph::instrument(name = "projectors::coset_sum")]
pub fn coset_sum_projector(
    ctx: &SymmetryContext<'_>,
    compressor: &IndexCompressor,
    factor: Option<f64>,
) -> Result<SparseMatrix, Error> {
    let factor = coset_factor(ctx, factor)?;
    let dimension = compressor.dimension();

    let mut projector = sparse::from_triplets((dimension, dimension), Vec::new());
    for &operation in ctx.coset_representatives() {
        let term = coset_term(ctx, compressor, operation, factor)?;
        projector = &projector + &term;
    }

    return Ok(projector);
}

/// Get the coset sum projector restricted to the subspace spanned by the
/// orthonormal columns of `c_pt`, accumulating `c_ptᵀ · term · c_pt` one
/// operation at a time.
#[time_graph::instrument(name = "projectors::compressed_coset_sum")]
pub fn compressed_coset_sum_projector(
    ctx: &SymmetryContext<'_>,
    compressor: &IndexCompressor,
    c_pt: &SparseMatrix,
    factor: Option<f64>,
) -> Result<SparseMatrix, Error> {
    if c_pt.rows() != compressor.dimension() {
        return Err(Error::ShapeMismatch {
            context: "compression matrix for the coset sum".into(),
            expected: vec![compressor.dimension(), c_pt.cols()],
            got: vec![c_pt.rows(), c_pt.cols()],
        });
    }

    let factor = coset_factor(ctx, factor)?;
    let dimension = c_pt.cols();

    let mut projector = sparse::from_triplets((dimension, dimension), Vec::new());
    for &operation in ctx.coset_representatives() {
        let term = coset_term(ctx, compressor, operation, factor)?;
        let compressed = sparse::congruence(c_pt, &term);
        projector = &projector + &compressed;
    }

    debug!(
        "compressed coset sum projector: dimension {}, {} non-zero entries",
        dimension, projector.nnz()
    );
    return Ok(projector);
}

/// Default number of batches for the sum rule projector on a supercell with
/// `n_atoms` atoms
pub fn default_n_batch(n_atoms: usize) -> usize {
    if n_atoms < 256 {
        n_atoms / usize::min(n_atoms, 16)
    } else {
        n_atoms / 4
    }
}

/// Get the rows of the sum rule constraints for the first atoms in `atoms`:
/// one row for each `(i[, j], cartesian)`, summing the compact entries over
/// the last atom.
fn sum_rule_constraints(compressor: &IndexCompressor, atoms: std::ops::Range<usize>) -> SparseMatrix {
    let order = compressor.order();
    let size = order.cartesian_size();
    let rank = order.rank();
    let n_atoms = compressor.n_atoms();

    // all the (i[, j]) prefixes of the full tuples in this batch
    let mut prefixes = Vec::new();
    for i in atoms {
        if rank == 2 {
            prefixes.push([i, 0, 0]);
        } else {
            for j in 0..n_atoms {
                prefixes.push([i, j, 0]);
            }
        }
    }

    let mut entries = Vec::new();
    for (p, prefix) in prefixes.iter().enumerate() {
        let mut tuple = *prefix;
        for k in 0..n_atoms {
            tuple[rank - 1] = k;
            if let Some(compact) = compressor.compact_tuple(&tuple[..rank]) {
                for cartesian in 0..size {
                    entries.push((p * size + cartesian, compact * size + cartesian, 1.0));
                }
            }
        }
    }

    return sparse::from_triplets((prefixes.len() * size, compressor.dimension()), entries);
}

/// Get the sum rule operator `I - complement` in the subspace spanned by the
/// orthonormal columns of `w`.
///
/// The complement is `Σ_batch Bᵀ B / (n_lp · N)` where `B = U_batch · w` and
/// `U_batch` contains the sum rule constraints for a batch of first atoms.
/// The first atoms are split in batches of `⌈N / n_batch⌉` atoms, and the
/// result does not depend on `n_batch`, which only controls the memory usage.
///
/// The operator is only approximately a projector: the complement is exact
/// when the range of `w` is invariant under the projector on the
/// constraints.
#[time_graph::instrument(name = "projectors::sum_rule")]
pub fn sum_rule_projector(
    compressor: &IndexCompressor,
    w: &SparseMatrix,
    n_batch: Option<usize>,
) -> Result<SparseMatrix, Error> {
    let n_atoms = compressor.n_atoms();
    let n_batch = n_batch.unwrap_or_else(|| default_n_batch(n_atoms));
    if n_batch == 0 || n_batch > n_atoms {
        return Err(Error::InvalidBatchSize { batch: n_batch, max: n_atoms });
    }

    if w.rows() != compressor.dimension() {
        return Err(Error::ShapeMismatch {
            context: "compression matrix for the sum rule".into(),
            expected: vec![compressor.dimension(), w.cols()],
            got: vec![w.rows(), w.cols()],
        });
    }

    let dimension = w.cols();
    let batch_size = (n_atoms + n_batch - 1) / n_batch;

    let mut complement = sparse::from_triplets((dimension, dimension), Vec::new());
    for first in (0..n_atoms).step_by(batch_size) {
        let last = usize::min(first + batch_size, n_atoms);
        let constraints = sum_rule_constraints(compressor, first..last);
        let projected = sparse::mul(&constraints, w);
        complement = &complement + &sparse::gram(&projected);
    }
    debug!("sum rule complement built with batches of {} atoms", batch_size);

    sparse::scale(&mut complement, -1.0 / (compressor.n_lp() * n_atoms) as f64);
    return Ok(&sparse::identity(dimension) + &complement);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array1;

    use crate::{FcOrder, Supercell, UnitCell, Vector3D};
    use crate::basis::{BasisOptions, BasisSet, EigenOptions, eigen_basis};
    use crate::symmetry::DEFAULT_SYMPREC;

    fn bcc() -> Supercell {
        Supercell::new(
            UnitCell::cubic(3.0).unwrap(),
            vec![Vector3D::zero(), Vector3D::new(0.5, 0.5, 0.5)],
            vec![26, 26],
        ).unwrap()
    }

    fn test_vector(n: usize) -> Array1<f64> {
        Array1::from_shape_fn(n, |i| f64::sin(1.0 + 0.7 * i as f64))
    }

    fn assert_idempotent(projector: &SparseMatrix) {
        let x = test_vector(projector.cols());
        let px = sparse::mul_vector(projector, x.view());
        let ppx = sparse::mul_vector(projector, px.view());
        let difference = (&ppx - &px).mapv(f64::abs).fold(0.0, |acc: f64, &v| acc.max(v));
        assert!(difference < 1e-8, "projector is not idempotent: {}", difference);
    }

    #[test]
    fn permutation_translation() {
        let supercell = bcc();
        let ctx = SymmetryContext::new(&supercell, None, DEFAULT_SYMPREC).unwrap();
        for order in [FcOrder::Second, FcOrder::Third] {
            let compressor = IndexCompressor::new(&ctx, order, None).unwrap();
            let projector = permutation_translation_projector(&compressor);
            assert_idempotent(&projector);

            let dense = sparse::to_dense(&projector);
            assert_relative_eq!(dense.clone(), dense.t(), epsilon = 1e-14);
        }

        let compressor = IndexCompressor::new(&ctx, FcOrder::Second, None).unwrap();
        let projector = permutation_translation_projector(&compressor);
        assert_relative_eq!(sparse::trace(&projector), 12.0, epsilon = 1e-12);
    }

    #[test]
    fn coset_sum() {
        let supercell = bcc();
        let ctx = SymmetryContext::new(&supercell, None, DEFAULT_SYMPREC).unwrap();
        for order in [FcOrder::Second, FcOrder::Third] {
            let compressor = IndexCompressor::new(&ctx, order, None).unwrap();
            let projector = coset_sum_projector(&ctx, &compressor, None).unwrap();
            assert_idempotent(&projector);
        }

        // two isotropic 3x3 blocks
        let compressor = IndexCompressor::new(&ctx, FcOrder::Second, None).unwrap();
        let projector = coset_sum_projector(&ctx, &compressor, None).unwrap();
        assert_relative_eq!(sparse::trace(&projector), 2.0, epsilon = 1e-10);

        assert!(coset_sum_projector(&ctx, &compressor, Some(-1.0)).is_err());
    }

    #[test]
    fn compressed_coset_sum() {
        let supercell = bcc();
        let ctx = SymmetryContext::new(&supercell, None, DEFAULT_SYMPREC).unwrap();
        let compressor = IndexCompressor::new(&ctx, FcOrder::Third, None).unwrap();

        let c_perm = compressor.permutation_compression_matrix();
        let compressed = compressed_coset_sum_projector(&ctx, &compressor, &c_perm, None).unwrap();
        assert_eq!(compressed.shape(), (c_perm.cols(), c_perm.cols()));
        assert_idempotent(&compressed);

        // same as projecting the full coset sum
        let full = coset_sum_projector(&ctx, &compressor, None).unwrap();
        let expected = sparse::congruence(&c_perm, &full);
        assert!(sparse::max_abs_difference(&compressed, &expected) < 1e-12);
    }

    #[test]
    fn sum_rule_batches() {
        let supercell = Supercell::expand(&bcc(), [2, 1, 1]).unwrap();
        let ctx = SymmetryContext::new(&supercell, None, DEFAULT_SYMPREC).unwrap();
        let compressor = IndexCompressor::new(&ctx, FcOrder::Second, None).unwrap();
        let w = compressor.permutation_compression_matrix();

        let reference = sum_rule_projector(&compressor, &w, Some(1)).unwrap();
        for n_batch in [2, 4] {
            let projector = sum_rule_projector(&compressor, &w, Some(n_batch)).unwrap();
            assert!(sparse::max_abs_difference(&projector, &reference) < 1e-12);
        }

        assert!(matches!(
            sum_rule_projector(&compressor, &w, Some(0)),
            Err(Error::InvalidBatchSize { batch: 0, max: 4 })
        ));
        assert!(matches!(
            sum_rule_projector(&compressor, &w, Some(5)),
            Err(Error::InvalidBatchSize { batch: 5, max: 4 })
        ));
    }

    #[test]
    fn sum_rule_not_idempotent() {
        let cscl = Supercell::new(
            UnitCell::cubic(4.1).unwrap(),
            vec![Vector3D::zero(), Vector3D::new(0.5, 0.5, 0.5)],
            vec![55, 17],
        ).unwrap();
        let supercell = Supercell::expand(&cscl, [2, 2, 2]).unwrap();
        let ctx = SymmetryContext::new(&supercell, None, DEFAULT_SYMPREC).unwrap();

        // without the sum rule, the compression matrix is the basis of the
        // symmetric force constants
        let options = BasisOptions { apply_sum_rule: false, ..BasisOptions::default() };
        let basis = BasisSet::new(&ctx, FcOrder::Second, options).unwrap();
        let compressor = basis.compressor();
        let w = basis.compression_matrix();

        let operator = sum_rule_projector(compressor, w, None).unwrap();
        let dense = sparse::to_dense(&operator);
        assert_relative_eq!(dense.clone(), dense.t(), epsilon = 1e-12);

        // the constraints projector compressed into the range of w is not
        // idempotent
        let squared = dense.dot(&dense);
        let difference = (&squared - &dense).mapv(f64::abs).fold(0.0, |acc: f64, &v| acc.max(v));
        assert!(difference > 1e-6, "the sum rule operator is idempotent: {}", difference);

        // but the eigenvectors above the threshold satisfy the sum rule
        let eigenvectors = eigen_basis(&operator, &EigenOptions::default()).unwrap();
        assert!(eigenvectors.cols() > 0);
        assert!(eigenvectors.cols() < w.cols());

        let vectors = sparse::mul(w, &eigenvectors);
        let constraints = sum_rule_constraints(compressor, 0..supercell.size());
        let violation = sparse::to_dense(&sparse::mul(&constraints, &vectors));
        let violation = violation.mapv(f64::abs).fold(0.0, |acc: f64, &v| acc.max(v));
        assert!(violation < 1e-8, "sum rule violation: {}", violation);
    }

    #[test]
    fn default_batches() {
        assert_eq!(default_n_batch(2), 1);
        assert_eq!(default_n_batch(64), 4);
        assert_eq!(default_n_batch(512), 128);
    }
}
