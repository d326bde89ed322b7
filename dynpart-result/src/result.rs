use crate::error::Error;

/// Result type alias used throughout dynpart.
pub type Result<T> = std::result::Result<T, Error>;
