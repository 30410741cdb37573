//! Least-squares fit of force constants coefficients from displacements and
//! forces.
//!
//! The forces are modelled as
//!
//! ```text
//! F_ia = - Σ Φ2_{ia,jb} u_jb - 1/2 Σ Φ3_{ia,jb,kc} u_jb u_kc
//! ```
//!
//! where the force constants are linear combinations of the vectors of a
//! [`BasisSet`]. The normal equations are accumulated over chunks of samples,
//! so the full design matrix is never stored.
use log::{info, debug};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayView3, Axis, s};
use serde::{Serialize, Deserialize};
use schemars::JsonSchema;

use crate::Error;
use crate::basis::BasisSet;
use crate::compression::FcOrder;
use crate::math::SymmetricEigen;
use crate::math::sparse::{self, SparseMatrix};

fn serde_default_batch_size() -> usize { 100 }
fn serde_default_rank_tolerance() -> f64 { 1e-12 }

/// Parameters for the least-squares solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SolverOptions {
    /// Number of samples used together when building the design matrix
    #[serde(default = "serde_default_batch_size")]
    pub batch_size: usize,
    /// Eigenvalues of the normal matrix smaller than this times the largest
    /// eigenvalue are considered to be zero
    #[serde(default = "serde_default_rank_tolerance")]
    pub rank_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> SolverOptions {
        SolverOptions {
            batch_size: serde_default_batch_size(),
            rank_tolerance: serde_default_rank_tolerance(),
        }
    }
}

impl SolverOptions {
    /// Parse options from their JSON representation
    pub fn from_json(json: &str) -> Result<SolverOptions, Error> {
        let options: SolverOptions = serde_json::from_str(json)?;
        options.validate()?;
        return Ok(options);
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.batch_size == 0 {
            return Err(Error::InvalidBatchSize { batch: 0, max: usize::MAX });
        }

        if !(self.rank_tolerance >= 0.0 && self.rank_tolerance < 1.0) {
            return Err(Error::InvalidParameter(format!(
                "rank tolerance must be in [0, 1), got {}", self.rank_tolerance
            )));
        }

        Ok(())
    }
}

/// Displacements and forces of a set of supercell configurations, stored as
/// `(n_samples, 3 N)` arrays with atom-major columns (`3 i + a`)
#[derive(Debug, Clone)]
pub struct TrainingData {
    displacements: Array2<f64>,
    forces: Array2<f64>,
}

impl TrainingData {
    /// Create training data from `(n_samples, 3 N)` displacements and forces
    pub fn new(displacements: Array2<f64>, forces: Array2<f64>) -> Result<TrainingData, Error> {
        if displacements.shape() != forces.shape() {
            return Err(Error::ShapeMismatch {
                context: "training forces".into(),
                expected: displacements.shape().to_vec(),
                got: forces.shape().to_vec(),
            });
        }

        if displacements.ncols() % 3 != 0 || displacements.ncols() == 0 {
            return Err(Error::ShapeMismatch {
                context: "training displacements".into(),
                expected: vec![displacements.nrows(), 3 * (displacements.ncols() / 3 + 1)],
                got: displacements.shape().to_vec(),
            });
        }

        let finite = displacements.iter().chain(forces.iter()).all(|value| value.is_finite());
        if !finite {
            return Err(Error::InvalidParameter(
                "training data contains non finite values".into()
            ));
        }

        return Ok(TrainingData { displacements, forces });
    }

    /// Create training data from `(n_samples, 3, N)` displacements and forces
    pub fn from_components(displacements: ArrayView3<'_, f64>, forces: ArrayView3<'_, f64>) -> Result<TrainingData, Error> {
        if displacements.shape()[1] != 3 {
            return Err(Error::ShapeMismatch {
                context: "training displacements components".into(),
                expected: vec![displacements.shape()[0], 3, displacements.shape()[2]],
                got: displacements.shape().to_vec(),
            });
        }

        if displacements.shape() != forces.shape() {
            return Err(Error::ShapeMismatch {
                context: "training forces components".into(),
                expected: displacements.shape().to_vec(),
                got: forces.shape().to_vec(),
            });
        }

        return TrainingData::new(atom_major(displacements), atom_major(forces));
    }

    /// Subtract the forces of the reference structure, given as a `3 N`
    /// vector, from all the training forces
    pub fn with_reference_forces(mut self, reference: ArrayView1<'_, f64>) -> Result<TrainingData, Error> {
        if reference.len() != self.forces.ncols() {
            return Err(Error::ShapeMismatch {
                context: "reference forces".into(),
                expected: vec![self.forces.ncols()],
                got: vec![reference.len()],
            });
        }

        for mut row in self.forces.rows_mut() {
            row -= &reference;
        }
        return Ok(self);
    }

    pub fn n_samples(&self) -> usize {
        self.displacements.nrows()
    }

    pub fn n_atoms(&self) -> usize {
        self.displacements.ncols() / 3
    }

    pub fn displacements(&self) -> ArrayView2<'_, f64> {
        self.displacements.view()
    }

    pub fn forces(&self) -> ArrayView2<'_, f64> {
        self.forces.view()
    }
}

/// Transform `(n_samples, 3, N)` into `(n_samples, 3 N)` with atom-major
/// columns
fn atom_major(components: ArrayView3<'_, f64>) -> Array2<f64> {
    let (n_samples, _, n_atoms) = components.dim();
    return Array2::from_shape_fn((n_samples, 3 * n_atoms), |(sample, column)| {
        components[[sample, column % 3, column / 3]]
    });
}

/// Coefficients of the force constants in their basis sets
#[derive(Debug, Clone)]
pub struct FittedCoefficients {
    pub fc2: Array1<f64>,
    pub fc3: Option<Array1<f64>>,
}

/// Build the rows of the design matrix for one basis set
struct DesignBuilder<'a> {
    basis: &'a BasisSet,
    full_basis: SparseMatrix,
    /// compact tuple of every full atomic tuple
    tuples: Vec<Option<usize>>,
    /// `1/√n_lp` for the translation compression
    scale: f64,
}

impl<'a> DesignBuilder<'a> {
    fn new(basis: &'a BasisSet) -> DesignBuilder<'a> {
        let compressor = basis.compressor();
        DesignBuilder {
            basis,
            full_basis: basis.full_basis(),
            tuples: compressor.decompression_indices(),
            scale: 1.0 / (compressor.n_lp() as f64).sqrt(),
        }
    }

    fn dimension(&self) -> usize {
        self.basis.dimension()
    }

    /// Get the `(n_samples · 3 N, d)` dense design matrix for the given
    /// `(n_samples, 3 N)` displacements
    fn rows(&self, displacements: ArrayView2<'_, f64>) -> Array2<f64> {
        let compressor = self.basis.compressor();
        let order = compressor.order();
        let size = order.cartesian_size();
        let n_atoms = compressor.n_atoms();
        let n_rows = displacements.nrows() * 3 * n_atoms;

        let mut entries = Vec::new();
        for (sample, u) in displacements.outer_iter().enumerate() {
            let offset = sample * 3 * n_atoms;
            match order {
                FcOrder::Second => {
                    for i in 0..n_atoms {
                        for j in 0..n_atoms {
                            let tuple = match self.tuples[i * n_atoms + j] {
                                Some(tuple) => tuple,
                                None => continue,
                            };

                            for b in 0..3 {
                                let u_jb = u[3 * j + b];
                                if u_jb == 0.0 {
                                    continue;
                                }
                                for a in 0..3 {
                                    let column = tuple * size + 3 * a + b;
                                    entries.push((offset + 3 * i + a, column, -self.scale * u_jb));
                                }
                            }
                        }
                    }
                }
                FcOrder::Third => {
                    for i in 0..n_atoms {
                        for j in 0..n_atoms {
                            for k in 0..n_atoms {
                                let tuple = match self.tuples[(i * n_atoms + j) * n_atoms + k] {
                                    Some(tuple) => tuple,
                                    None => continue,
                                };

                                for b in 0..3 {
                                    for c in 0..3 {
                                        let u_jb_kc = u[3 * j + b] * u[3 * k + c];
                                        if u_jb_kc == 0.0 {
                                            continue;
                                        }
                                        for a in 0..3 {
                                            let column = tuple * size + 9 * a + 3 * b + c;
                                            let value = -0.5 * self.scale * u_jb_kc;
                                            entries.push((offset + 3 * i + a, column, value));
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let design = sparse::from_triplets((n_rows, compressor.dimension()), entries);
        return sparse::to_dense(&sparse::mul(&design, &self.full_basis));
    }
}

/// Linear least-squares solver for the coefficients of force constants basis
/// sets
#[derive(Debug, Clone)]
pub struct LinearFCSolver {
    options: SolverOptions,
}

impl LinearFCSolver {
    pub fn new(options: SolverOptions) -> Result<LinearFCSolver, Error> {
        options.validate()?;
        return Ok(LinearFCSolver { options });
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Fit the coefficients of `fc2_basis` (and `fc3_basis` if given) to the
    /// training data
    #[time_graph::instrument(name = "LinearFCSolver::solve")]
    pub fn solve(
        &self,
        data: &TrainingData,
        fc2_basis: &BasisSet,
        fc3_basis: Option<&BasisSet>,
    ) -> Result<FittedCoefficients, Error> {
        let builders = self.builders(data.n_atoms(), fc2_basis, fc3_basis)?;
        let d2 = builders[0].dimension();
        let basis_size = builders.iter().map(DesignBuilder::dimension).sum::<usize>();

        let mut normal = Array2::<f64>::zeros((basis_size, basis_size));
        let mut rhs = Array1::<f64>::zeros(basis_size);
        let mut forces_norm2 = 0.0;

        let n_samples = data.n_samples();
        for start in (0..n_samples).step_by(self.options.batch_size) {
            let stop = usize::min(start + self.options.batch_size, n_samples);
            time_graph::spanned!("LinearFCSolver::accumulate", {
                let design = design_matrix(&builders, data.displacements().slice(s![start..stop, ..]));
                let forces = data.forces().slice(s![start..stop, ..]).iter().copied().collect::<Array1<f64>>();

                normal += &design.t().dot(&design);
                rhs += &design.t().dot(&forces);
                forces_norm2 += forces.dot(&forces);
            });
        }

        let equations = n_samples * 3 * data.n_atoms();
        let eigen = SymmetricEigen::new(normal.view());
        let rank = eigen.rank(self.options.rank_tolerance);
        debug!("normal matrix of size {} has rank {}", basis_size, rank);

        if equations < basis_size || rank < basis_size {
            return Err(Error::UnderdeterminedSystem { equations, rank, basis_size });
        }

        let coefficients = eigen.pseudo_solve(rhs.view(), rank);

        // |F - X c|² = |F|² - 2 cᵀXᵀF + cᵀXᵀXc
        let residual = forces_norm2 - 2.0 * coefficients.dot(&rhs) + coefficients.dot(&normal.dot(&coefficients));
        info!(
            "fitted {} coefficients on {} equations, RMS force residual {:.3e}",
            basis_size, equations, (residual.max(0.0) / equations as f64).sqrt()
        );

        let fc2 = coefficients.slice(s![..d2]).to_owned();
        let fc3 = if builders.len() > 1 {
            Some(coefficients.slice(s![d2..]).to_owned())
        } else {
            None
        };

        return Ok(FittedCoefficients { fc2, fc3 });
    }

    /// Predict the `(n_samples, 3 N)` forces created by the given
    /// displacements with the force constants defined by `coefficients`
    pub fn predict(
        &self,
        displacements: ArrayView2<'_, f64>,
        fc2_basis: &BasisSet,
        fc3_basis: Option<&BasisSet>,
        coefficients: &FittedCoefficients,
    ) -> Result<Array2<f64>, Error> {
        if displacements.ncols() % 3 != 0 {
            return Err(Error::ShapeMismatch {
                context: "displacements".into(),
                expected: vec![displacements.nrows(), 3 * fc2_basis.compressor().n_atoms()],
                got: displacements.shape().to_vec(),
            });
        }

        let n_atoms = displacements.ncols() / 3;
        let builders = self.builders(n_atoms, fc2_basis, fc3_basis)?;

        let mut all_coefficients = coefficients.fc2.to_vec();
        match (fc3_basis, &coefficients.fc3) {
            (Some(_), Some(fc3)) => all_coefficients.extend(fc3.iter()),
            (None, None) => {}
            (Some(_), None) => return Err(Error::InvalidParameter(
                "missing fc3 coefficients for the fc3 basis".into()
            )),
            (None, Some(_)) => return Err(Error::InvalidParameter(
                "got fc3 coefficients without a fc3 basis".into()
            )),
        }

        let basis_size = builders.iter().map(DesignBuilder::dimension).sum::<usize>();
        if all_coefficients.len() != basis_size {
            return Err(Error::ShapeMismatch {
                context: "fitted coefficients".into(),
                expected: vec![basis_size],
                got: vec![all_coefficients.len()],
            });
        }

        let all_coefficients = Array1::from(all_coefficients);
        let mut forces = Array2::zeros(displacements.raw_dim());
        for start in (0..displacements.nrows()).step_by(self.options.batch_size) {
            let stop = usize::min(start + self.options.batch_size, displacements.nrows());
            let design = design_matrix(&builders, displacements.slice(s![start..stop, ..]));
            let predicted = design.dot(&all_coefficients);

            for (mut row, values) in forces.slice_mut(s![start..stop, ..]).outer_iter_mut().zip(predicted.exact_chunks(3 * n_atoms)) {
                row.assign(&values);
            }
        }

        return Ok(forces);
    }

    fn builders<'a>(
        &self,
        n_atoms: usize,
        fc2_basis: &'a BasisSet,
        fc3_basis: Option<&'a BasisSet>,
    ) -> Result<Vec<DesignBuilder<'a>>, Error> {
        if fc2_basis.order() != FcOrder::Second {
            return Err(Error::InvalidParameter(format!(
                "expected a basis for fc2, got one for {}", fc2_basis.order()
            )));
        }

        let mut builders = vec![DesignBuilder::new(fc2_basis)];
        if let Some(fc3_basis) = fc3_basis {
            if fc3_basis.order() != FcOrder::Third {
                return Err(Error::InvalidParameter(format!(
                    "expected a basis for fc3, got one for {}", fc3_basis.order()
                )));
            }
            builders.push(DesignBuilder::new(fc3_basis));
        }

        for builder in &builders {
            let expected = builder.basis.compressor().n_atoms();
            if expected != n_atoms {
                return Err(Error::ShapeMismatch {
                    context: format!("training data for the {} basis", builder.basis.order()),
                    expected: vec![3 * expected],
                    got: vec![3 * n_atoms],
                });
            }
        }

        return Ok(builders);
    }
}

/// Build the design matrix of all the basis sets, concatenated along columns
fn design_matrix(builders: &[DesignBuilder<'_>], displacements: ArrayView2<'_, f64>) -> Array2<f64> {
    let n_rows = displacements.nrows() * displacements.ncols();
    let n_columns = builders.iter().map(DesignBuilder::dimension).sum::<usize>();

    let mut design = Array2::zeros((n_rows, n_columns));
    let mut start = 0;
    for builder in builders {
        let stop = start + builder.dimension();
        design.slice_mut(s![.., start..stop]).assign(&builder.rows(displacements));
        start = stop;
    }
    debug_assert_eq!(design.len_of(Axis(1)), start);

    return design;
}
