//! Error type for multi-step repository transactions.
//!
//! Simple CRUD methods return `sqlx::Error` directly; transactions that also
//! enforce domain rules (missing municipality, illegal status, unknown
//! version) return [`RepoError`] so the API layer can map each side
//! separately.

use civica_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Domain(#[from] CoreError),
}

pub type RepoResult<T> = Result<T, RepoError>;
