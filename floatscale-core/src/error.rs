//! Error types for floatscale

use thiserror::Error;

/// Main error type for floatscale operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A single point record cannot be turned into a sample.
    /// Ingestion counts and skips these; they never abort a source.
    #[error("Malformed input record: {0}")]
    MalformedInput(String),

    #[error("No samples were inserted into the octree")]
    EmptyInput,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Isosurface does not contain any vertices")]
    EmptyResult,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias for floatscale operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit status a command line front end should report for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::EmptyInput => 2,
            Error::InvalidConfiguration(_) => 3,
            Error::EmptyResult => 4,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            Error::EmptyInput.exit_code(),
            Error::InvalidConfiguration("x".into()).exit_code(),
            Error::EmptyResult.exit_code(),
            Error::InvalidData("x".into()).exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4, 1]);
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
