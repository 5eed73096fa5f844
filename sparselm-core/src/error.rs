use thiserror::Error;

/// Error type shared by every estimator, solver and storage routine in the crate.
///
/// # Example
///
/// ```rust
/// # use sparselm_core::error::SparseLmError;
///
/// fn might_fail() -> Result<(), SparseLmError> {
///     Err(SparseLmError::InvalidParameter("alpha must be non-negative".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum SparseLmError {
    #[error("Dimensions {0}x{1} and {2}x{3} do not match")]
    DimensionMismatch(usize, usize, usize, usize),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Unknown parameter '{0}' for estimator {1}")]
    UnknownParameter(String, String),
    #[error("Estimator {0} has not been fitted yet")]
    NotFitted(String),
    #[error("Linear system is singular: {0}")]
    Singular(String),
    #[error("Support search over {candidates} candidates exceeds the limit of {limit}")]
    SearchTooLarge { candidates: u128, limit: u128 },
    #[error("Invalid estimator composition: {0}")]
    InvalidComposition(String),
    #[error("Corrupt data file: {0}")]
    CorruptDataFile(String),
    #[error("Model {0} not found in store")]
    ModelNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bincode encode error: {0}")]
    BincodeEncode(#[from] bincode::error::EncodeError),
    #[error("Bincode decode error: {0}")]
    BincodeDecode(#[from] bincode::error::DecodeError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SparseLmError>;
