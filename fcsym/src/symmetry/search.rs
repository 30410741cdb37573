use log::debug;

use crate::{Error, IntegerMatrix3, Matrix3};
use crate::systems::Supercell;

use super::OperationTable;
use super::operations::SymmetryOperation;

/// Find all the space group operations of `supercell` by brute force.
///
/// Candidate rotations are the integer matrices with entries in `{-1, 0, 1}`
/// preserving the lattice metric. For each of them, candidate translations
/// map the first atom of the least common atomic type onto every atom of the
/// same type, and are kept if they map the whole structure onto itself.
///
/// This assumes a reasonably reduced lattice: the rotations of very skewed
/// cells can have larger integer entries, and will be missed. The identity is
/// always the first operation of the returned table.
#[time_graph::instrument(name = "symmetry::find_space_group")]
pub fn find_space_group(supercell: &Supercell, symprec: f64) -> Result<OperationTable, Error> {
    if !(symprec > 0.0 && symprec.is_finite()) {
        return Err(Error::InvalidParameter(format!(
            "symmetry tolerance must be positive, got {}", symprec
        )));
    }

    let rotations = lattice_point_group(supercell, symprec);
    debug!("found {} rotations in the lattice point group", rotations.len());

    let types = supercell.types();
    let positions = supercell.positions();
    let mut counts = std::collections::BTreeMap::new();
    for &atomic_type in types {
        *counts.entry(atomic_type).or_insert(0_usize) += 1;
    }
    let (&rarest, _) = counts.iter()
        .min_by_key(|&(_, &count)| count)
        .ok_or_else(|| Error::InvalidParameter("empty supercell".into()))?;

    let reference = types.iter().position(|&t| t == rarest).unwrap_or(0);
    let candidates = (0..types.len()).filter(|&j| types[j] == rarest).collect::<Vec<_>>();

    let mut table = OperationTable {
        rotations: Vec::new(),
        translations: Vec::new(),
    };
    for rotation in rotations {
        let rotated = &rotation * positions[reference];
        for &j in &candidates {
            let translation = (positions[j] - rotated).wrapped();
            let operation = SymmetryOperation::new(
                supercell, rotation, translation, symprec, table.len()
            );
            if operation.is_ok() {
                table.rotations.push(rotation.rows());
                table.translations.push(translation.into());
            }
        }
    }

    debug!("found {} space group operations", table.len());
    return Ok(table);
}

/// Get all the rotations with entries in `{-1, 0, 1}` preserving the metric
/// of the supercell lattice, identity first.
fn lattice_point_group(supercell: &Supercell, symprec: f64) -> Vec<IntegerMatrix3> {
    let cell = supercell.cell();
    let metric = cell.metric();

    let longest = (0..3).map(|i| metric[i][i]).fold(0.0, f64::max).sqrt();
    let tolerance = 2.0 * symprec * longest + symprec * symprec;

    let mut rotations = vec![IntegerMatrix3::one()];
    for code in 0..19683_u32 {
        let mut data = [[0; 3]; 3];
        let mut remaining = code;
        for row in &mut data {
            for value in row.iter_mut() {
                *value = (remaining % 3) as i32 - 1;
                remaining /= 3;
            }
        }

        let rotation = IntegerMatrix3::new(data);
        if rotation.is_identity() || rotation.determinant().abs() != 1 {
            continue;
        }

        // Rᵀ · G · R == G
        let real = Matrix3::from(rotation);
        let transformed = real.transposed() * metric * real;
        if transformed.max_abs_difference(&metric) < tolerance {
            rotations.push(rotation);
        }
    }

    return rotations;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vector3D;
    use crate::systems::UnitCell;

    #[test]
    fn cubic_point_group() {
        let supercell = Supercell::new(
            UnitCell::cubic(3.0).unwrap(),
            vec![Vector3D::zero()],
            vec![1],
        ).unwrap();

        let rotations = lattice_point_group(&supercell, 1e-5);
        assert_eq!(rotations.len(), 48);
        assert!(rotations[0].is_identity());
    }

    #[test]
    fn tetragonal_point_group() {
        let supercell = Supercell::new(
            UnitCell::orthorhombic(3.0, 3.0, 4.0).unwrap(),
            vec![Vector3D::zero()],
            vec![1],
        ).unwrap();
        assert_eq!(lattice_point_group(&supercell, 1e-5).len(), 16);
    }

    #[test]
    fn body_centered_cubic() {
        let supercell = Supercell::new(
            UnitCell::cubic(3.0).unwrap(),
            vec![Vector3D::zero(), Vector3D::new(0.5, 0.5, 0.5)],
            vec![26, 26],
        ).unwrap();

        let table = find_space_group(&supercell, 1e-5).unwrap();
        // 48 rotations, each with the two lattice translations
        assert_eq!(table.len(), 96);
        assert_eq!(table.rotations[0], IntegerMatrix3::one().rows());
        assert_eq!(table.translations[0], [0.0; 3]);

        let cscl = Supercell::new(
            UnitCell::cubic(3.0).unwrap(),
            vec![Vector3D::zero(), Vector3D::new(0.5, 0.5, 0.5)],
            vec![55, 17],
        ).unwrap();
        assert_eq!(find_space_group(&cscl, 1e-5).unwrap().len(), 48);
    }

    #[test]
    fn invalid_tolerance() {
        let supercell = Supercell::new(
            UnitCell::cubic(3.0).unwrap(),
            vec![Vector3D::zero()],
            vec![1],
        ).unwrap();
        assert!(find_space_group(&supercell, 0.0).is_err());
    }
}
