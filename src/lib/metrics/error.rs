use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid timestamp {value:?} for {field}: expected RFC3339")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("Invalid {field} cursor {value:?}")]
    InvalidCursor { field: &'static str, value: String },

    #[error("Invalid time window: from ({from}) is after to ({to})")]
    InvalidWindow { from: String, to: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Query timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Query worker failed: {0}")]
    Worker(String),
}

impl Error {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimestamp { .. } | Self::InvalidCursor { .. } | Self::InvalidWindow { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
