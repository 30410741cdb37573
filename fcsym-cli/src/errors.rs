use std::path::PathBuf;

/// Errors from the command line tool
#[derive(Debug)]
pub enum Error {
    /// Error from the force constants library
    Fcsym(fcsym::Error),
    /// I/O error when accessing a file
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    /// Error when parsing a JSON structure file
    Json {
        path: PathBuf,
        error: serde_json::Error,
    },
    /// Error when reading a .npy file
    ReadNpy {
        path: PathBuf,
        error: ndarray_npy::ReadNpyError,
    },
    /// Error when writing a .npy file
    WriteNpy {
        path: PathBuf,
        error: ndarray_npy::WriteNpyError,
    },
    /// Invalid command line arguments or input data
    Input(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Fcsym(e) => write!(f, "{}", e),
            Error::Io { path, error } => write!(f, "failed to access '{}': {}", path.display(), error),
            Error::Json { path, error } => write!(f, "invalid JSON in '{}': {}", path.display(), error),
            Error::ReadNpy { path, error } => write!(f, "failed to read '{}': {}", path.display(), error),
            Error::WriteNpy { path, error } => write!(f, "failed to write '{}': {}", path.display(), error),
            Error::Input(message) => write!(f, "invalid input: {}", message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Fcsym(e) => Some(e),
            Error::Io { error, .. } => Some(error),
            Error::Json { error, .. } => Some(error),
            Error::ReadNpy { error, .. } => Some(error),
            Error::WriteNpy { error, .. } => Some(error),
            Error::Input(_) => None,
        }
    }
}

impl From<fcsym::Error> for Error {
    fn from(error: fcsym::Error) -> Error {
        Error::Fcsym(error)
    }
}
