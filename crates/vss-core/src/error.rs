use std::io;
use thiserror::Error;

/// Failures decoding a vector from one of its wire forms.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("vector blob header too short")]
    HeaderTooShort,

    #[error("blob is not a vector")]
    NotAVector,

    #[error("vector blob has wrong type")]
    WrongType,

    #[error("invalid raw blob length, blob must be divisible by 4")]
    RawLength,

    #[error("input not valid json, or contains non-float data")]
    Json,
}

#[derive(Error, Debug)]
pub enum VssError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("input query size doesn't match index dimensions: {got} != {want}")]
    Dimension { got: usize, want: usize },

    /// The column's build spec lacks the named operation.
    #[error("{0} not implemented for this type of index")]
    Capability(&'static str),

    #[error("limit must be greater than 0, got {0}")]
    InvalidLimit(i64),

    #[error("could not parse index string {0}")]
    BuildSpec(String),

    #[error("unknown metric type: {0}")]
    UnknownMetric(String),

    #[error("invalid metric_type value")]
    EmptyMetric,

    #[error("{0}")]
    Parameter(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("index for column {0} requires training before inserting data")]
    Untrained(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VssError>;

impl VssError {
    /// True for failures caused by how a column was declared rather than by
    /// the data flowing through it.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            VssError::Capability(_)
                | VssError::BuildSpec(_)
                | VssError::UnknownMetric(_)
                | VssError::EmptyMetric
                | VssError::Config(_)
        )
    }
}

// SQLite reports the Display text of a user function error as the statement's
// error message, so engine errors reach SQL callers verbatim.
impl From<VssError> for rusqlite::Error {
    fn from(err: VssError) -> Self {
        match err {
            VssError::Sqlite(inner) => inner,
            other => rusqlite::Error::UserFunctionError(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_verbatim() {
        assert_eq!(
            VssError::Dimension { got: 3, want: 2 }.to_string(),
            "input query size doesn't match index dimensions: 3 != 2"
        );
        assert_eq!(
            VssError::Capability("add_with_ids").to_string(),
            "add_with_ids not implemented for this type of index"
        );
        assert_eq!(
            VssError::InvalidLimit(-1).to_string(),
            "limit must be greater than 0, got -1"
        );
        assert_eq!(
            VssError::from(DecodeError::Json).to_string(),
            "input not valid json, or contains non-float data"
        );
    }

    #[test]
    fn test_sqlite_errors_unwrap_on_conversion() {
        let err: rusqlite::Error = VssError::Sqlite(rusqlite::Error::QueryReturnedNoRows).into();
        assert!(matches!(err, rusqlite::Error::QueryReturnedNoRows));

        let err: rusqlite::Error = VssError::EmptyMetric.into();
        assert_eq!(err.to_string(), "invalid metric_type value");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(VssError::Capability("reconstruct").is_configuration());
        assert!(VssError::BuildSpec("Bogus".into()).is_configuration());
        assert!(!VssError::InvalidLimit(0).is_configuration());
    }
}
