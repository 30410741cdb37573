use crate::{Error, Matrix3, Vector3D};

mod cell;
pub use self::cell::UnitCell;

/// A periodic crystal structure, used as the supercell on which force
/// constants are defined.
///
/// Positions are stored in fractional coordinates, wrapped inside `[0, 1)`.
/// Each different atomic type is identified with a different integer value,
/// usually the atomic number.
#[derive(Debug, Clone, PartialEq)]
pub struct Supercell {
    cell: UnitCell,
    positions: Vec<Vector3D>,
    types: Vec<i32>,
}

impl Supercell {
    /// Create a new supercell from the cell, the fractional positions and the
    /// atomic types of all atoms
    pub fn new(cell: UnitCell, positions: Vec<Vector3D>, types: Vec<i32>) -> Result<Supercell, Error> {
        if positions.is_empty() {
            return Err(Error::InvalidParameter("a supercell must contain at least one atom".into()));
        }

        if positions.len() != types.len() {
            return Err(Error::ShapeMismatch {
                context: "atomic types".into(),
                expected: vec![positions.len()],
                got: vec![types.len()],
            });
        }

        if positions.iter().any(|p| !(p[0].is_finite() && p[1].is_finite() && p[2].is_finite())) {
            return Err(Error::InvalidParameter("atomic positions must be finite".into()));
        }

        let positions = positions.iter().map(Vector3D::wrapped).collect();
        return Ok(Supercell { cell, positions, types });
    }

    /// Create a supercell by repeating `structure` `factors[i]` times along
    /// its i-th lattice vector.
    ///
    /// Atoms are ordered atom-major: all the images of the first atom of
    /// `structure` come first, then all the images of the second atom, etc.
    /// Lattice points are ordered with the last factor running fastest.
    pub fn expand(structure: &Supercell, factors: [usize; 3]) -> Result<Supercell, Error> {
        if factors.iter().any(|&f| f == 0) {
            return Err(Error::InvalidParameter(format!(
                "supercell factors must be positive, got {:?}", factors
            )));
        }

        let [n1, n2, n3] = factors;
        let scale = Vector3D::new(n1 as f64, n2 as f64, n3 as f64);

        let matrix = structure.cell.matrix();
        let mut expanded = Matrix3::zero();
        for i in 0..3 {
            for j in 0..3 {
                expanded[i][j] = matrix[i][j] * scale[i];
            }
        }
        let cell = UnitCell::new(expanded)?;

        let mut lattice_points = Vec::with_capacity(n1 * n2 * n3);
        for i in 0..n1 {
            for j in 0..n2 {
                for k in 0..n3 {
                    lattice_points.push(Vector3D::new(i as f64, j as f64, k as f64));
                }
            }
        }

        let mut positions = Vec::with_capacity(structure.size() * lattice_points.len());
        let mut types = Vec::with_capacity(positions.capacity());
        for (position, &atomic_type) in structure.positions.iter().zip(&structure.types) {
            for point in &lattice_points {
                let shifted = position + point;
                positions.push(Vector3D::new(
                    shifted[0] / scale[0],
                    shifted[1] / scale[1],
                    shifted[2] / scale[2],
                ));
                types.push(atomic_type);
            }
        }

        return Supercell::new(cell, positions, types);
    }

    /// Get the unit cell of this supercell
    pub fn cell(&self) -> &UnitCell {
        &self.cell
    }

    /// Get the number of atoms in this supercell
    pub fn size(&self) -> usize {
        self.positions.len()
    }

    /// Get the fractional positions of all atoms
    pub fn positions(&self) -> &[Vector3D] {
        &self.positions
    }

    /// Get the atomic types of all atoms
    pub fn types(&self) -> &[i32] {
        &self.types
    }

    /// Get the Cartesian positions of all atoms
    pub fn cartesian_positions(&self) -> Vec<Vector3D> {
        self.positions.iter().map(|&p| self.cell.cartesian(p)).collect()
    }

    /// Get the minimum image distance between atoms `i` and `j`
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.cell.distance(self.positions[i], self.positions[j])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn construction() {
        let cell = UnitCell::cubic(3.0).unwrap();
        let positions = vec![Vector3D::new(-0.25, 1.5, 0.0)];

        let supercell = Supercell::new(cell, positions.clone(), vec![1]).unwrap();
        assert_eq!(supercell.positions(), &[Vector3D::new(0.75, 0.5, 0.0)]);

        match Supercell::new(cell, positions, vec![1, 2]) {
            Err(Error::ShapeMismatch { expected, got, .. }) => {
                assert_eq!(expected, vec![1]);
                assert_eq!(got, vec![2]);
            }
            other => panic!("expected a shape mismatch, got {:?}", other),
        }

        assert!(Supercell::new(cell, vec![], vec![]).is_err());
    }

    #[test]
    fn expansion() {
        let cell = UnitCell::cubic(2.0).unwrap();
        let unit = Supercell::new(
            cell,
            vec![Vector3D::zero(), Vector3D::new(0.5, 0.5, 0.5)],
            vec![55, 17],
        ).unwrap();

        let supercell = Supercell::expand(&unit, [2, 1, 1]).unwrap();
        assert_eq!(supercell.size(), 4);
        assert_eq!(supercell.types(), &[55, 55, 17, 17]);
        assert_eq!(supercell.positions()[1], Vector3D::new(0.5, 0.0, 0.0));
        assert_eq!(supercell.positions()[2], Vector3D::new(0.25, 0.5, 0.5));
        assert_relative_eq!(supercell.cell().volume(), 16.0);

        // the two Cs atoms are one lattice vector apart
        assert_relative_eq!(supercell.distance(0, 1), 2.0, epsilon = 1e-12);

        assert!(Supercell::expand(&unit, [0, 1, 1]).is_err());
    }
}
