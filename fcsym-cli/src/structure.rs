use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use fcsym::{Matrix3, OperationTable, Supercell, UnitCell, Vector3D};

use crate::errors::Error;

/// Content of a structure file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructureFile {
    /// Lattice vectors, as rows
    pub lattice: [[f64; 3]; 3],
    /// Fractional positions of the atoms
    pub positions: Vec<[f64; 3]>,
    /// Atomic types
    pub types: Vec<i32>,
    /// Space group operations of the structure, in fractional coordinates
    #[serde(default)]
    pub operations: Option<OperationTable>,
}

/// Read a structure file and expand it into a supercell. The operations in
/// the file are only kept if the structure is not expanded.
pub fn load_supercell(path: &Path, factors: [usize; 3]) -> Result<(Supercell, Option<OperationTable>), Error> {
    let json = std::fs::read_to_string(path).map_err(|error| Error::Io {
        path: path.to_owned(),
        error,
    })?;

    let file: StructureFile = serde_json::from_str(&json).map_err(|error| Error::Json {
        path: path.to_owned(),
        error,
    })?;

    let cell = UnitCell::new(Matrix3::new(file.lattice))?;
    let positions = file.positions.into_iter().map(Vector3D::from).collect();
    let structure = Supercell::new(cell, positions, file.types)?;

    let mut operations = file.operations;
    let supercell = if factors == [1, 1, 1] {
        structure
    } else {
        if operations.take().is_some() {
            warn!("ignoring the operations in '{}' for the expanded supercell", path.display());
        }
        Supercell::expand(&structure, factors)?
    };

    info!(
        "loaded supercell with {} atoms from '{}' (expansion {:?})",
        supercell.size(), path.display(), factors
    );

    return Ok((supercell, operations));
}
