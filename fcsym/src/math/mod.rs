mod eigen;
pub(crate) use self::eigen::SymmetricEigen;

pub mod sparse;

mod subspace;
pub(crate) use self::subspace::SubspaceIteration;
