use serde::{Serialize, Deserialize};
use schemars::JsonSchema;

use crate::{Error, IntegerMatrix3, Vector3D};
use crate::systems::Supercell;

/// Space group operations of a supercell, given as rotations and translations
/// in fractional coordinates of the supercell lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct OperationTable {
    /// Rotation matrices, acting on fractional coordinates as `R · x`
    pub rotations: Vec<[[i32; 3]; 3]>,
    /// Fractional translations, one for each rotation
    pub translations: Vec<[f64; 3]>,
}

impl OperationTable {
    /// Create a new table from the given rotations and translations
    pub fn new(rotations: Vec<[[i32; 3]; 3]>, translations: Vec<[f64; 3]>) -> Result<OperationTable, Error> {
        let table = OperationTable { rotations, translations };
        table.validate()?;
        return Ok(table);
    }

    /// Create a table from its JSON representation
    pub fn from_json(json: &str) -> Result<OperationTable, Error> {
        let table: OperationTable = serde_json::from_str(json)?;
        table.validate()?;
        return Ok(table);
    }

    /// Check that the table is well formed
    pub fn validate(&self) -> Result<(), Error> {
        if self.rotations.is_empty() {
            return Err(Error::InvalidParameter("the operation table is empty".into()));
        }

        if self.rotations.len() != self.translations.len() {
            return Err(Error::ShapeMismatch {
                context: "operation translations".into(),
                expected: vec![self.rotations.len()],
                got: vec![self.translations.len()],
            });
        }

        for (i, rotation) in self.rotations.iter().enumerate() {
            let determinant = IntegerMatrix3::new(*rotation).determinant();
            if determinant.abs() != 1 {
                return Err(Error::InvalidParameter(format!(
                    "rotation {} has determinant {}, expected +1 or -1", i, determinant
                )));
            }
        }

        for (i, translation) in self.translations.iter().enumerate() {
            if translation.iter().any(|t| !t.is_finite()) {
                return Err(Error::InvalidParameter(format!(
                    "translation {} is not finite", i
                )));
            }
        }

        Ok(())
    }

    /// Number of operations in this table
    pub fn len(&self) -> usize {
        self.rotations.len()
    }

    /// Is this table empty?
    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }
}

/// A single space group operation `x -> R · x + t`, together with the
/// permutation it induces on the atoms of a supercell.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetryOperation {
    rotation: IntegerMatrix3,
    translation: Vector3D,
    /// `permutation[i] = j` when the operation maps atom `i` onto atom `j`
    permutation: Vec<usize>,
}

impl SymmetryOperation {
    /// Create a new operation for the given `supercell`, finding the induced
    /// atomic permutation. `index` is the position of this operation in its
    /// table, and is only used for error reporting.
    pub fn new(
        supercell: &Supercell,
        rotation: IntegerMatrix3,
        translation: Vector3D,
        symprec: f64,
        index: usize,
    ) -> Result<SymmetryOperation, Error> {
        let permutation = find_permutation(supercell, &rotation, translation, symprec, index)?;
        return Ok(SymmetryOperation {
            rotation,
            translation: translation.wrapped(),
            permutation,
        });
    }

    /// Rotation part of this operation, in fractional coordinates
    pub fn rotation(&self) -> &IntegerMatrix3 {
        &self.rotation
    }

    /// Translation part of this operation, in fractional coordinates
    pub fn translation(&self) -> Vector3D {
        self.translation
    }

    /// Atomic permutation induced by this operation
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Is this operation a pure lattice translation?
    pub fn is_pure_translation(&self) -> bool {
        self.rotation.is_identity()
    }

    /// Is this operation the identity?
    pub fn is_identity(&self) -> bool {
        self.is_pure_translation() && self.permutation.iter().enumerate().all(|(i, &j)| i == j)
    }
}

/// Find the permutation induced by `R · x + t` on the atoms of `supercell`,
/// matching each transformed atom with the closest atom of the same type.
fn find_permutation(
    supercell: &Supercell,
    rotation: &IntegerMatrix3,
    translation: Vector3D,
    symprec: f64,
    index: usize,
) -> Result<Vec<usize>, Error> {
    let cell = supercell.cell();
    let positions = supercell.positions();
    let types = supercell.types();

    let mut permutation = Vec::with_capacity(positions.len());
    let mut used = vec![false; positions.len()];
    for (i, &position) in positions.iter().enumerate() {
        let image = rotation * position + translation;

        let mut best = None;
        let mut best_distance = f64::INFINITY;
        for (j, &candidate) in positions.iter().enumerate() {
            if types[j] != types[i] {
                continue;
            }

            let distance = cell.distance(image, candidate);
            if distance < best_distance {
                best_distance = distance;
                best = Some(j);
            }
        }

        let j = match best {
            Some(j) if best_distance < symprec => j,
            _ => {
                return Err(Error::SymmetryInconsistency {
                    operation: index,
                    atom: Some(i),
                    message: format!(
                        "no atom of the same type within {} of the image (closest at {})",
                        symprec, best_distance
                    ),
                });
            }
        };

        if used[j] {
            return Err(Error::SymmetryInconsistency {
                operation: index,
                atom: Some(i),
                message: format!("atom {} is the image of more than one atom", j),
            });
        }
        used[j] = true;
        permutation.push(j);
    }

    return Ok(permutation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::UnitCell;

    fn cscl() -> Supercell {
        Supercell::new(
            UnitCell::cubic(4.0).unwrap(),
            vec![Vector3D::zero(), Vector3D::new(0.5, 0.5, 0.5)],
            vec![55, 17],
        ).unwrap()
    }

    #[test]
    fn table_validation() {
        assert!(OperationTable::new(vec![], vec![]).is_err());
        assert!(OperationTable::new(vec![[[1, 0, 0], [0, 1, 0], [0, 0, 1]]], vec![]).is_err());
        assert!(OperationTable::new(vec![[[2, 0, 0], [0, 1, 0], [0, 0, 1]]], vec![[0.0; 3]]).is_err());

        let table = OperationTable::from_json(r#"{
            "rotations": [[[1, 0, 0], [0, 1, 0], [0, 0, 1]]],
            "translations": [[0.0, 0.0, 0.0]]
        }"#).unwrap();
        assert_eq!(table.len(), 1);

        let error = OperationTable::from_json(r#"{"rotations": [], "translations": [], "other": 3}"#);
        assert!(matches!(error, Err(Error::Json(_))));
    }

    #[test]
    fn permutations() {
        let supercell = cscl();
        let inversion = IntegerMatrix3::new([[-1, 0, 0], [0, -1, 0], [0, 0, -1]]);
        let operation = SymmetryOperation::new(&supercell, inversion, Vector3D::zero(), 1e-5, 0).unwrap();
        assert_eq!(operation.permutation(), &[0, 1]);
        assert!(!operation.is_pure_translation());

        let identity = SymmetryOperation::new(&supercell, IntegerMatrix3::one(), Vector3D::zero(), 1e-5, 0).unwrap();
        assert!(identity.is_identity());
    }

    #[test]
    fn inconsistent_operation() {
        let supercell = cscl();
        // swapping Cs and Cl is not a symmetry
        let result = SymmetryOperation::new(
            &supercell, IntegerMatrix3::one(), Vector3D::new(0.5, 0.5, 0.5), 1e-5, 3
        );

        match result {
            Err(Error::SymmetryInconsistency { operation, atom, .. }) => {
                assert_eq!(operation, 3);
                assert_eq!(atom, Some(0));
            }
            other => panic!("expected a symmetry inconsistency, got {:?}", other),
        }
    }
}
