//! Representation of the space group of a supercell: atomic permutations,
//! Cartesian rotations, coset representatives and lattice translations.
use indexmap::IndexMap;
use log::{debug, info};
use ndarray::Array2;

use crate::{Error, IntegerMatrix3, Matrix3, Vector3D};
use crate::compression::FcOrder;
use crate::systems::Supercell;

mod operations;
pub use self::operations::{OperationTable, SymmetryOperation};

mod search;
pub use self::search::find_space_group;

mod translations;
pub use self::translations::TranslationPermutations;

/// Default tolerance when matching atomic positions, in the same length unit
/// as the cell
pub const DEFAULT_SYMPREC: f64 = 1e-5;

/// All the symmetry information about a supercell needed to build force
/// constants basis sets.
///
/// This is built once per supercell and shared by all the basis sets built on
/// this supercell.
#[derive(Debug, Clone)]
pub struct SymmetryContext<'a> {
    supercell: &'a Supercell,
    operations: Vec<SymmetryOperation>,
    cartesian_rotations: Vec<Matrix3>,
    /// index of the first operation for each distinct rotation
    coset_representatives: Vec<usize>,
    translations: TranslationPermutations,
}

impl<'a> SymmetryContext<'a> {
    /// Build the symmetry context of `supercell`, using the operations in
    /// `table`, or searching for them if `table` is `None`. `symprec` is the
    /// tolerance used when matching atomic positions.
    #[time_graph::instrument(name = "SymmetryContext::new")]
    pub fn new(
        supercell: &'a Supercell,
        table: Option<&OperationTable>,
        symprec: f64,
    ) -> Result<SymmetryContext<'a>, Error> {
        if !(symprec > 0.0 && symprec.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "symmetry tolerance must be positive, got {}", symprec
            )));
        }

        let searched;
        let table = match table {
            Some(table) => {
                table.validate()?;
                table
            }
            None => {
                searched = find_space_group(supercell, symprec)?;
                &searched
            }
        };

        let mut operations = Vec::with_capacity(table.len());
        for (index, (rotation, translation)) in table.rotations.iter().zip(&table.translations).enumerate() {
            operations.push(SymmetryOperation::new(
                supercell,
                IntegerMatrix3::new(*rotation),
                Vector3D::from(*translation),
                symprec,
                index,
            )?);
        }

        let cell = supercell.cell();
        let cartesian_rotations = operations.iter()
            .map(|op| cell.cartesian_rotation(op.rotation()))
            .collect::<Vec<_>>();

        let mut unique_rotations = IndexMap::new();
        for (index, op) in operations.iter().enumerate() {
            unique_rotations.entry(*op.rotation()).or_insert(index);
        }
        let coset_representatives = unique_rotations.into_values().collect::<Vec<_>>();

        // the identity goes first, then the other translations in table order
        let mut translation_ops = operations.iter().enumerate()
            .filter(|(_, op)| op.is_pure_translation())
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        if let Some(position) = translation_ops.iter().position(|&index| operations[index].is_identity()) {
            let identity = translation_ops.remove(position);
            translation_ops.insert(0, identity);
        }
        let permutations = translation_ops.iter()
            .map(|&index| operations[index].permutation().to_vec())
            .collect();
        let translations = TranslationPermutations::new(permutations, &translation_ops)?;

        info!(
            "{} symmetry operations, {} unique rotations, {} lattice translations, {} independent atoms",
            operations.len(), coset_representatives.len(), translations.n_lp(), translations.n_independent()
        );

        return Ok(SymmetryContext {
            supercell,
            operations,
            cartesian_rotations,
            coset_representatives,
            translations,
        });
    }

    /// Get the supercell this context was built for
    pub fn supercell(&self) -> &'a Supercell {
        self.supercell
    }

    /// Number of atoms in the supercell
    pub fn n_atoms(&self) -> usize {
        self.supercell.size()
    }

    /// All the space group operations
    pub fn operations(&self) -> &[SymmetryOperation] {
        &self.operations
    }

    /// Rotation of the operation at index `operation`, in Cartesian
    /// coordinates
    pub fn cartesian_rotation(&self, operation: usize) -> &Matrix3 {
        &self.cartesian_rotations[operation]
    }

    /// Indexes of the coset representatives: the first operation for each
    /// distinct rotation, in order of first appearance
    pub fn coset_representatives(&self) -> &[usize] {
        &self.coset_representatives
    }

    /// Permutations induced by the pure lattice translations
    pub fn translations(&self) -> &TranslationPermutations {
        &self.translations
    }

    /// Get the representation of the rotation of `operation` acting on rank
    /// `order` Cartesian tensors (`R ⊗ R` or `R ⊗ R ⊗ R`), with the
    /// Cartesian indexes flattened as `a·3 + b` or `a·9 + b·3 + c`.
    pub fn rotation_representation(&self, operation: usize, order: FcOrder) -> Array2<f64> {
        let rotation = &self.cartesian_rotations[operation];
        let size = order.cartesian_size();
        let rank = order.rank();

        let digits = |mut index: usize| {
            let mut result = [0; 3];
            for slot in (0..rank).rev() {
                result[slot] = index % 3;
                index /= 3;
            }
            result
        };

        let representation = Array2::from_shape_fn((size, size), |(row, column)| {
            let row = digits(row);
            let column = digits(column);
            (0..rank).map(|slot| rotation[row[slot]][column[slot]]).product::<f64>()
        });
        debug!("built rank {} rotation representation for operation {}", rank, operation);

        return representation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::systems::UnitCell;

    fn bcc() -> Supercell {
        Supercell::new(
            UnitCell::cubic(3.0).unwrap(),
            vec![Vector3D::zero(), Vector3D::new(0.5, 0.5, 0.5)],
            vec![26, 26],
        ).unwrap()
    }

    #[test]
    fn context() {
        let supercell = bcc();
        let ctx = SymmetryContext::new(&supercell, None, DEFAULT_SYMPREC).unwrap();

        assert_eq!(ctx.operations().len(), 96);
        assert_eq!(ctx.coset_representatives().len(), 48);
        assert_eq!(ctx.translations().n_lp(), 2);
        assert_eq!(ctx.translations().independent_atoms(), &[0]);
        assert_eq!(ctx.translations().permutation(1), &[1, 0]);
    }

    #[test]
    fn explicit_table() {
        let supercell = bcc();
        let table = OperationTable::new(
            vec![[[1, 0, 0], [0, 1, 0], [0, 0, 1]], [[1, 0, 0], [0, 1, 0], [0, 0, 1]]],
            vec![[0.5, 0.5, 0.5], [0.0, 0.0, 0.0]],
        ).unwrap();

        let ctx = SymmetryContext::new(&supercell, Some(&table), DEFAULT_SYMPREC).unwrap();
        // the identity is moved first among the translations
        assert_eq!(ctx.translations().permutation(0), &[0, 1]);
        assert_eq!(ctx.coset_representatives(), &[0]);

        let bad = OperationTable::new(
            vec![[[1, 0, 0], [0, 1, 0], [0, 0, 1]]],
            vec![[0.25, 0.0, 0.0]],
        ).unwrap();
        assert!(matches!(
            SymmetryContext::new(&supercell, Some(&bad), DEFAULT_SYMPREC),
            Err(Error::SymmetryInconsistency { operation: 0, .. })
        ));
    }

    #[test]
    fn rotation_representation() {
        let supercell = bcc();
        let table = OperationTable::new(
            vec![[[1, 0, 0], [0, 1, 0], [0, 0, 1]], [[0, -1, 0], [1, 0, 0], [0, 0, 1]]],
            vec![[0.0; 3], [0.0; 3]],
        ).unwrap();
        let ctx = SymmetryContext::new(&supercell, Some(&table), DEFAULT_SYMPREC).unwrap();

        let second = ctx.rotation_representation(1, FcOrder::Second);
        assert_eq!(second.dim(), (9, 9));
        // R ⊗ R is orthogonal
        assert_relative_eq!(second.dot(&second.t()), Array2::<f64>::eye(9), epsilon = 1e-12);
        // (R ⊗ R)[xy, yx] = R[x][y] R[y][x] = -1
        assert_relative_eq!(second[[1, 3]], -1.0, epsilon = 1e-12);

        let third = ctx.rotation_representation(1, FcOrder::Third);
        assert_eq!(third.dim(), (27, 27));
        assert_relative_eq!(third.dot(&third.t()), Array2::<f64>::eye(27), epsilon = 1e-12);
    }
}
