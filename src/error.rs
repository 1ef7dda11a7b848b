//! Crate-wide error enum and `Result` alias.

use std::fmt::Display;

/// Convenience alias for results returning the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced across the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A value failed validation.
    #[error("{0}")]
    Validation(String),
    /// A configuration value was missing or invalid.
    #[error("{0}")]
    Config(String),
    /// A value could not be parsed into a domain type.
    #[error("{0}")]
    Parsing(String),
    /// An e-mail transport operation failed.
    #[error("{0}")]
    Transport(String),
    /// An internal invariant was violated.
    #[error("{0}")]
    Inconsistency(String),
    /// A requested entity could not be found.
    #[error("{0}")]
    NotFound(String),
    /// A database operation failed.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    /// A template failed to render.
    #[error(transparent)]
    Template(#[from] tera::Error),
    /// An HTTP request failed.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Build a [`Error::NotFound`] for the given entity kind and identifier.
    pub fn not_found(entity: &str, id: impl Display) -> Self {
        Error::NotFound(format!("{} {} not found", entity, id))
    }
}
