use thiserror::Error;

use outreach_core::errors::StoreError;

pub mod event;
pub mod lead;

pub use event::SqlEventRepository;
pub use lead::SqlLeadRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        StoreError::Backend(error.to_string())
    }
}
