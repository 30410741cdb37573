//! Symmetry-adapted basis sets for force constants.
//!
//! A [`BasisSet`] is built in stages, each stage restricting the previous
//! subspace: permutation and lattice translation symmetry, then space group
//! rotations, then (optionally) the translational sum rule.
use log::info;
use serde::{Serialize, Deserialize};
use schemars::JsonSchema;

use crate::Error;
use crate::compression::{FcOrder, IndexCompressor};
use crate::math::sparse::{self, SparseMatrix};
use crate::projectors;
use crate::symmetry::SymmetryContext;

mod eigen;
pub use self::eigen::eigen_basis;

fn serde_default_dense_threshold() -> usize { 500 }
fn serde_default_eigenvalue_threshold() -> f64 { 0.99 }
fn serde_default_max_iterations() -> usize { 300 }
fn serde_default_tolerance() -> f64 { 1e-8 }
fn serde_default_seed() -> u64 { 42 }
fn serde_default_apply_sum_rule() -> bool { true }

/// Parameters of the eigensolver extracting basis vectors from projectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EigenOptions {
    /// Blocks of the operator up to this size are diagonalized with a dense
    /// eigensolver, larger blocks use an iterative eigensolver
    #[serde(default = "serde_default_dense_threshold")]
    pub dense_threshold: usize,
    /// Eigenvectors with an eigenvalue above this threshold are part of the
    /// basis
    #[serde(default = "serde_default_eigenvalue_threshold")]
    pub eigenvalue_threshold: f64,
    /// Maximal number of iterations of the iterative eigensolver. Eigenpairs
    /// are accepted once their residuals and Ritz values stopped changing, so
    /// at least two iterations are needed.
    #[serde(default = "serde_default_max_iterations")]
    pub max_iterations: usize,
    /// Convergence threshold on the residual norm of the iterative
    /// eigensolver
    #[serde(default = "serde_default_tolerance")]
    pub tolerance: f64,
    /// Number of eigenpairs requested from the iterative eigensolver. By
    /// default, this is estimated from the trace of the operator.
    #[serde(default)]
    pub n_eigenpairs: Option<usize>,
    /// Seed for the random starting vectors of the iterative eigensolver
    #[serde(default = "serde_default_seed")]
    pub seed: u64,
}

impl Default for EigenOptions {
    fn default() -> EigenOptions {
        EigenOptions {
            dense_threshold: serde_default_dense_threshold(),
            eigenvalue_threshold: serde_default_eigenvalue_threshold(),
            max_iterations: serde_default_max_iterations(),
            tolerance: serde_default_tolerance(),
            n_eigenpairs: None,
            seed: serde_default_seed(),
        }
    }
}

impl EigenOptions {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.eigenvalue_threshold > 0.0 && self.eigenvalue_threshold <= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "eigenvalue threshold must be in (0, 1], got {}", self.eigenvalue_threshold
            )));
        }

        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "eigensolver tolerance must be positive, got {}", self.tolerance
            )));
        }

        // convergence is checked against the previous iteration
        if self.max_iterations < 2 {
            return Err(Error::InvalidParameter(format!(
                "eigensolver max_iterations must be at least 2, got {}", self.max_iterations
            )));
        }

        if self.n_eigenpairs == Some(0) {
            return Err(Error::InvalidParameter(
                "the number of requested eigenpairs must be at least 1".into()
            ));
        }

        Ok(())
    }
}

/// Parameters for the construction of a basis set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BasisOptions {
    /// Exclude all atomic tuples where two atoms are farther apart than this
    /// distance
    #[serde(default)]
    pub cutoff: Option<f64>,
    /// Restrict the basis to force constants fulfilling the translational sum
    /// rule
    #[serde(default = "serde_default_apply_sum_rule")]
    pub apply_sum_rule: bool,
    /// Number of batches of first atoms used to build the sum rule operator.
    /// This only controls the memory usage. By default, this is `N / 16` for
    /// small supercells, and `N / 4` for supercells of 256 atoms and more.
    #[serde(default)]
    pub n_batch: Option<usize>,
    /// Normalization of each term in the coset sum projector. Defaults to
    /// `1 / (n_lp · n_cosets)`.
    #[serde(default)]
    pub coset_factor: Option<f64>,
    /// Options for the eigensolver
    #[serde(default)]
    pub eigen: EigenOptions,
}

impl Default for BasisOptions {
    fn default() -> BasisOptions {
        BasisOptions {
            cutoff: None,
            apply_sum_rule: true,
            n_batch: None,
            coset_factor: None,
            eigen: EigenOptions::default(),
        }
    }
}

impl BasisOptions {
    /// Parse options from their JSON representation
    pub fn from_json(json: &str) -> Result<BasisOptions, Error> {
        let options: BasisOptions = serde_json::from_str(json)?;
        options.validate()?;
        return Ok(options);
    }

    pub fn validate(&self) -> Result<(), Error> {
        if let Some(cutoff) = self.cutoff {
            if !(cutoff > 0.0) {
                return Err(Error::InvalidParameter(format!(
                    "cutoff must be positive, got {}", cutoff
                )));
            }
        }

        if let Some(factor) = self.coset_factor {
            if !(factor > 0.0 && factor.is_finite()) {
                return Err(Error::InvalidParameter(format!(
                    "coset factor must be positive, got {}", factor
                )));
            }
        }

        if self.n_batch == Some(0) {
            return Err(Error::InvalidBatchSize { batch: 0, max: usize::MAX });
        }

        self.eigen.validate()
    }
}

/// Orthonormal basis of the force constants of a given order compatible with
/// all the symmetries of a supercell.
///
/// The basis vectors are the columns of `compression_matrix · eigenvectors`,
/// in the compact space of the `compressor`.
#[derive(Debug, Clone)]
pub struct BasisSet {
    compressor: IndexCompressor,
    /// basis of the symmetric subspace, without the sum rule
    compression_matrix: SparseMatrix,
    /// basis of the sum rule subspace inside the range of
    /// `compression_matrix`, identity when the sum rule is not applied
    eigenvectors: SparseMatrix,
    options: BasisOptions,
}

impl BasisSet {
    /// Build the basis set for force constants of the given `order`
    #[time_graph::instrument(name = "BasisSet::new")]
    pub fn new(ctx: &SymmetryContext<'_>, order: FcOrder, options: BasisOptions) -> Result<BasisSet, Error> {
        options.validate()?;
        let compressor = IndexCompressor::new(ctx, order, options.cutoff)?;

        let c_pt = time_graph::spanned!("BasisSet::permutation_translation", {
            let projector = projectors::permutation_translation_projector(&compressor);
            eigen_basis(&projector, &options.eigen)?
        });
        info!("{} basis: {} vectors after permutation and translation symmetry", order, c_pt.cols());

        let compression_matrix = time_graph::spanned!("BasisSet::rotations", {
            let c_rpt = {
                let projector = projectors::compressed_coset_sum_projector(
                    ctx, &compressor, &c_pt, options.coset_factor
                )?;
                eigen_basis(&projector, &options.eigen)?
            };
            sparse::mul(&c_pt, &c_rpt)
        });
        drop(c_pt);
        info!("{} basis: {} vectors after space group symmetry", order, compression_matrix.cols());

        let eigenvectors = if options.apply_sum_rule {
            time_graph::spanned!("BasisSet::sum_rule", {
                let projector = projectors::sum_rule_projector(
                    &compressor, &compression_matrix, options.n_batch
                )?;
                eigen_basis(&projector, &options.eigen)?
            })
        } else {
            sparse::identity(compression_matrix.cols())
        };
        info!("{} basis: {} vectors in the final basis", order, eigenvectors.cols());

        return Ok(BasisSet {
            compressor,
            compression_matrix,
            eigenvectors,
            options,
        });
    }

    /// Order of the force constants described by this basis
    pub fn order(&self) -> FcOrder {
        self.compressor.order()
    }

    /// Compact index numbering used by this basis
    pub fn compressor(&self) -> &IndexCompressor {
        &self.compressor
    }

    /// Basis of the symmetric subspace before the sum rule, as columns of a
    /// sparse (compact dimension × d) matrix
    pub fn compression_matrix(&self) -> &SparseMatrix {
        &self.compression_matrix
    }

    /// Coefficients of the final basis vectors in the basis of
    /// `compression_matrix`
    pub fn eigenvectors(&self) -> &SparseMatrix {
        &self.eigenvectors
    }

    /// Options used to build this basis
    pub fn options(&self) -> &BasisOptions {
        &self.options
    }

    /// Number of basis vectors
    pub fn dimension(&self) -> usize {
        self.eigenvectors.cols()
    }

    /// Get the full basis `compression_matrix · eigenvectors`, as columns of
    /// a sparse matrix in the compact space
    pub fn full_basis(&self) -> SparseMatrix {
        sparse::mul(&self.compression_matrix, &self.eigenvectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_json() {
        let options = BasisOptions::from_json("{}").unwrap();
        assert_eq!(options, BasisOptions::default());
        assert!(options.apply_sum_rule);
        assert_eq!(options.eigen.dense_threshold, 500);

        let options = BasisOptions::from_json(r#"{
            "cutoff": 5.0,
            "apply_sum_rule": false,
            "eigen": {"eigenvalue_threshold": 0.5}
        }"#).unwrap();
        assert_eq!(options.cutoff, Some(5.0));
        assert!(!options.apply_sum_rule);
        assert_eq!(options.eigen.eigenvalue_threshold, 0.5);
        assert_eq!(options.eigen.max_iterations, 300);

        assert!(matches!(BasisOptions::from_json(r#"{"cut": 5.0}"#), Err(Error::Json(_))));
        assert!(BasisOptions::from_json(r#"{"cutoff": -5.0}"#).is_err());
        assert!(BasisOptions::from_json(r#"{"eigen": {"eigenvalue_threshold": 1.5}}"#).is_err());
        assert!(BasisOptions::from_json(r#"{"eigen": {"max_iterations": 1}}"#).is_err());
        assert!(matches!(
            BasisOptions::from_json(r#"{"n_batch": 0}"#),
            Err(Error::InvalidBatchSize { .. })
        ));
    }
}
