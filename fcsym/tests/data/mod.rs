#![allow(dead_code)]

use serde_json::Value;
use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use fcsym::{Matrix3, Supercell, SymmetryContext, UnitCell, Vector3D};

/// Load one of the structures from `tests/data/structures.json`
pub fn load_structure(name: &str) -> Supercell {
    let json = std::fs::read_to_string("tests/data/structures.json")
        .expect("failed to read structures file");

    let data: Value = serde_json::from_str(&json).expect("failed to parse JSON");
    let structure = &data[name];
    assert!(structure.is_object(), "missing structure '{}'", name);

    let lattice = structure["lattice"].as_array().expect("lattice must be an array");
    let mut matrix = [[0.0; 3]; 3];
    for (row, vector) in matrix.iter_mut().zip(lattice) {
        *row = read_vector(vector);
    }
    let cell = UnitCell::new(Matrix3::new(matrix)).expect("invalid cell");

    let positions = structure["positions"].as_array().expect("positions must be an array")
        .iter()
        .map(|position| Vector3D::from(read_vector(position)))
        .collect();

    let types = structure["types"].as_array().expect("types must be an array")
        .iter()
        .map(|t| t.as_i64().expect("types must be integers") as i32)
        .collect();

    Supercell::new(cell, positions, types).expect("invalid structure")
}

fn read_vector(value: &Value) -> [f64; 3] {
    let value = value.as_array().expect("vector must be an array");
    assert_eq!(value.len(), 3);
    [
        value[0].as_f64().unwrap(),
        value[1].as_f64().unwrap(),
        value[2].as_f64().unwrap(),
    ]
}

/// Random displacements with components in `[-amplitude, amplitude)`, as a
/// `(n_samples, 3 N)` array
pub fn random_displacements(n_samples: usize, n_atoms: usize, amplitude: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((n_samples, 3 * n_atoms), |_| rng.gen_range(-amplitude..amplitude))
}

/// Compute forces from the full `(N, N, 3, 3)` second order and
/// `(N, N, N, 3, 3, 3)` third order force constants, directly from the
/// tensors
pub fn reference_forces(
    fc2: ArrayViewD<'_, f64>,
    fc3: Option<ArrayViewD<'_, f64>>,
    displacements: ArrayView2<'_, f64>,
) -> Array2<f64> {
    let n_atoms = fc2.shape()[0];
    let mut forces = Array2::zeros(displacements.raw_dim());

    for (s, u) in displacements.outer_iter().enumerate() {
        for i in 0..n_atoms {
            for a in 0..3 {
                let mut force = 0.0;
                for j in 0..n_atoms {
                    for b in 0..3 {
                        force -= fc2[[i, j, a, b]] * u[3 * j + b];
                    }
                }

                if let Some(fc3) = &fc3 {
                    for j in 0..n_atoms {
                        for k in 0..n_atoms {
                            for b in 0..3 {
                                for c in 0..3 {
                                    force -= 0.5 * fc3[[i, j, k, a, b, c]] * u[3 * j + b] * u[3 * k + c];
                                }
                            }
                        }
                    }
                }

                forces[[s, 3 * i + a]] = force;
            }
        }
    }

    forces
}

/// Get the largest violation of `Φ(σ(x)) = R Φ(x)` over all operations in
/// `ctx`, for a full force constants tensor of rank 2 or 3
pub fn symmetry_violation(ctx: &SymmetryContext<'_>, full: &ArrayD<f64>) -> f64 {
    let rank = full.ndim() / 2;
    let n_atoms = full.shape()[0];

    let mut violation: f64 = 0.0;
    for (g, operation) in ctx.operations().iter().enumerate() {
        let permutation = operation.permutation();
        let rotation = ctx.cartesian_rotation(g);

        let n_tuples = n_atoms.pow(rank as u32);
        for flat in 0..n_tuples {
            let mut atoms = vec![0; rank];
            let mut remaining = flat;
            for slot in (0..rank).rev() {
                atoms[slot] = remaining % n_atoms;
                remaining /= n_atoms;
            }
            let image = atoms.iter().map(|&atom| permutation[atom]).collect::<Vec<_>>();

            let rotated = rotate(rotation, &block(full, &atoms), rank);
            let expected = block(full, &image);
            for (value, expected) in rotated.iter().zip(&expected) {
                violation = violation.max((value - expected).abs());
            }
        }
    }

    violation
}

/// Get the flattened Cartesian block of the tensor for the given atoms
fn block(full: &ArrayD<f64>, atoms: &[usize]) -> Vec<f64> {
    let rank = atoms.len();
    let size = 3_usize.pow(rank as u32);
    let mut index = atoms.to_vec();
    index.extend(std::iter::repeat(0).take(rank));

    (0..size).map(|cartesian| {
        let mut remaining = cartesian;
        for slot in (0..rank).rev() {
            index[rank + slot] = remaining % 3;
            remaining /= 3;
        }
        full[index.as_slice()]
    }).collect()
}

/// Apply `R ⊗ R [⊗ R]` to a flattened Cartesian block
fn rotate(rotation: &Matrix3, block: &[f64], rank: usize) -> Vec<f64> {
    let size = block.len();
    let digits = |mut index: usize| {
        let mut digits = vec![0; rank];
        for slot in (0..rank).rev() {
            digits[slot] = index % 3;
            index /= 3;
        }
        digits
    };

    (0..size).map(|output| {
        let a = digits(output);
        (0..size).map(|input| {
            let b = digits(input);
            let factor = a.iter().zip(&b).map(|(&a, &b)| rotation[a][b]).product::<f64>();
            factor * block[input]
        }).sum()
    }).collect()
}

/// Get the largest deviation of `Bᵀ B` from the identity
pub fn orthonormality_error(basis: &fcsym::sparse::SparseMatrix) -> f64 {
    let gram = fcsym::sparse::to_dense(&fcsym::sparse::gram(basis));
    let identity = Array2::<f64>::eye(gram.nrows());
    (&gram - &identity).iter().fold(0.0, |max: f64, value| max.max(value.abs()))
}
