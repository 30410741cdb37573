#[non_exhaustive]
#[derive(Debug)]
pub enum Error {
    /// Got an invalid parameter value in a function
    InvalidParameter(String),
    /// Error while serializing/deserializing data
    Json(serde_json::Error),
    /// A symmetry operation does not map the atoms of the supercell onto
    /// themselves, or the pure translations are not a valid group
    SymmetryInconsistency {
        /// index of the operation in the operation table
        operation: usize,
        /// atom that could not be mapped, if any
        atom: Option<usize>,
        message: String,
    },
    /// The eigensolver could not extract the requested eigenpairs of a
    /// projector
    ProjectorEigensolveFailure {
        /// size of the block of the operator we tried to diagonalize
        dimension: usize,
        /// number of requested eigenpairs
        requested: usize,
        /// eigenvalues we managed to converge
        achieved: Vec<f64>,
    },
    /// The least-squares system does not have enough independent equations to
    /// determine all the basis coefficients
    UnderdeterminedSystem {
        equations: usize,
        rank: usize,
        basis_size: usize,
    },
    /// Some array does not have the expected shape
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// Batch size or number of batches outside of the allowed range
    InvalidBatchSize {
        batch: usize,
        max: usize,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidParameter(e) => write!(f, "invalid parameter: {}", e),
            Error::Json(e) => write!(f, "json error: {}", e),
            Error::SymmetryInconsistency { operation, atom, message } => {
                write!(f, "inconsistent symmetry operation {}", operation)?;
                if let Some(atom) = atom {
                    write!(f, " for atom {}", atom)?;
                }
                write!(f, ": {}", message)
            }
            Error::ProjectorEigensolveFailure { dimension, requested, achieved } => write!(f,
                "eigensolver failed on a block of size {}: requested {} eigenpairs, converged {}",
                dimension, requested, achieved.len()
            ),
            Error::UnderdeterminedSystem { equations, rank, basis_size } => write!(f,
                "underdetermined least-squares system: {} equations with rank {} for {} unknowns",
                equations, rank, basis_size
            ),
            Error::ShapeMismatch { context, expected, got } => write!(f,
                "shape mismatch for {}: expected {:?}, got {:?}", context, expected, got
            ),
            Error::InvalidBatchSize { batch, max } => write!(f,
                "invalid batch size {}, must be between 1 and {}", batch, max
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidParameter(_) |
            Error::SymmetryInconsistency { .. } |
            Error::ProjectorEigensolveFailure { .. } |
            Error::UnderdeterminedSystem { .. } |
            Error::ShapeMismatch { .. } |
            Error::InvalidBatchSize { .. } => None,
            Error::Json(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Error {
        Error::Json(error)
    }
}
