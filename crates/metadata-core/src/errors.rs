use thiserror::Error;

/// Faults raised by a document store implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("duplicate document identifier: {0}")]
    Duplicate(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Request-level faults. Every variant maps to exactly one envelope shape,
/// see [`crate::envelope::Envelope::from_error`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetaError {
    #[error("bind error: {0}")]
    Bind(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("provided metadata record does not contain did attribute")]
    MissingIdentifier,
    #[error("insert failed: {0}")]
    Insert(StoreError),
    #[error("remove failed: {0}")]
    Remove(StoreError),
    #[error("no user found in token: {0}")]
    MissingIdentity(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, MetaError>;
