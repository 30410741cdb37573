use ndarray::{ArrayD, ArrayView1, ArrayViewD, IxDyn};

use crate::Error;
use crate::basis::BasisSet;
use crate::compression::FcOrder;
use crate::math::sparse;
use crate::symmetry::SymmetryContext;

/// Force constants in the compact layout, with the first atom running over
/// the independent atoms only: the values have shape `(n_a, N, 3, 3)` for
/// second order and `(n_a, N, N, 3, 3, 3)` for third order.
#[derive(Debug, Clone)]
pub struct ForceConstants {
    order: FcOrder,
    values: ArrayD<f64>,
    independent_atoms: Vec<usize>,
    n_lp: usize,
}

impl ForceConstants {
    pub fn order(&self) -> FcOrder {
        self.order
    }

    pub fn values(&self) -> ArrayViewD<'_, f64> {
        self.values.view()
    }

    pub fn into_values(self) -> ArrayD<f64> {
        self.values
    }

    /// Atoms corresponding to the first axis of the values
    pub fn independent_atoms(&self) -> &[usize] {
        &self.independent_atoms
    }

    /// Number of lattice translations in the supercell
    pub fn n_lp(&self) -> usize {
        self.n_lp
    }

    /// Get the full force constants tensor, with shape `(N, N, 3, 3)` or
    /// `(N, N, N, 3, 3, 3)`, using lattice translations to fill the entries
    /// with a non-independent first atom.
    pub fn expand(&self, ctx: &SymmetryContext<'_>) -> Result<ArrayD<f64>, Error> {
        let translations = ctx.translations();
        let n_atoms = translations.n_atoms();
        if translations.independent_atoms() != self.independent_atoms.as_slice() || translations.n_lp() != self.n_lp {
            return Err(Error::ShapeMismatch {
                context: "independent atoms of the symmetry context".into(),
                expected: self.independent_atoms.clone(),
                got: translations.independent_atoms().to_vec(),
            });
        }

        let rank = self.order.rank();
        let size = self.order.cartesian_size();
        let mut shape = vec![n_atoms; rank];
        shape.extend(std::iter::repeat(3).take(rank));
        let mut full = ArrayD::zeros(IxDyn(&shape));

        let compact = self.values.as_slice().ok_or_else(|| Error::InvalidParameter(
            "force constants values must be contiguous".into()
        ))?;
        let output = full.as_slice_mut().ok_or_else(|| Error::InvalidParameter(
            "expanded force constants must be contiguous".into()
        ))?;

        let n_rest = n_atoms.pow(rank as u32 - 1);
        for first in 0..n_atoms {
            let (p, l) = translations.origin(first);
            let inverse = translations.inverse(l);

            for rest in 0..n_rest {
                // translate the remaining atoms back to the frame of `p`
                let mut remaining = rest;
                let mut translated = 0;
                let mut stride = 1;
                for _ in 1..rank {
                    translated += inverse[remaining % n_atoms] * stride;
                    remaining /= n_atoms;
                    stride *= n_atoms;
                }

                let source = (p * n_rest + translated) * size;
                let destination = (first * n_rest + rest) * size;
                output[destination..destination + size].copy_from_slice(&compact[source..source + size]);
            }
        }

        return Ok(full);
    }
}

/// Recover the force constants from the `coefficients` of the vectors in
/// `basis`. Entries for tuples excluded by the cutoff are zero.
#[time_graph::instrument(name = "recover")]
pub fn recover(basis: &BasisSet, coefficients: ArrayView1<'_, f64>) -> Result<ForceConstants, Error> {
    if coefficients.len() != basis.dimension() {
        return Err(Error::ShapeMismatch {
            context: format!("{} coefficients", basis.order()),
            expected: vec![basis.dimension()],
            got: vec![coefficients.len()],
        });
    }

    let compressor = basis.compressor();
    let order = compressor.order();
    let size = order.cartesian_size();
    let n_atoms = compressor.n_atoms();
    let n_independent = compressor.independent_atoms().len();

    let projected = sparse::mul_vector(basis.eigenvectors(), coefficients);
    let compact = sparse::mul_vector(basis.compression_matrix(), projected.view());

    let scale = 1.0 / (compressor.n_lp() as f64).sqrt();
    let mut values = vec![0.0; compressor.n_uncut_tuples() * size];
    for tuple in 0..compressor.n_tuples() {
        let position = compressor.uncut_position(tuple) * size;
        for cartesian in 0..size {
            values[position + cartesian] = scale * compact[tuple * size + cartesian];
        }
    }

    let mut shape = vec![n_independent];
    shape.extend(std::iter::repeat(n_atoms).take(order.rank() - 1));
    shape.extend(std::iter::repeat(3).take(order.rank()));
    let values = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|_| Error::ShapeMismatch {
        context: "recovered force constants".into(),
        expected: shape.clone(),
        got: vec![compressor.n_uncut_tuples() * size],
    })?;

    return Ok(ForceConstants {
        order,
        values,
        independent_atoms: compressor.independent_atoms().to_vec(),
        n_lp: compressor.n_lp(),
    });
}
