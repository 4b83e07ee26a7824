use crate::errors::{MetaError, StoreError};
use crate::model::ResultSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVICE: &str = "MetaData";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    #[serde(rename = "OK")]
    Ok,
    BindError,
    ParseError,
    InsertError,
    RemoveError,
    AuthError,
    StoreError,
}

/// Uniform wrapper returned for every request, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub service: String,
    pub status: u16,
    pub code: ResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultSet>,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn ok(service: &str, results: ResultSet) -> Self {
        Self {
            service: service.to_string(),
            status: 200,
            code: ResultCode::Ok,
            error: None,
            results: Some(results),
            timestamp: Utc::now(),
        }
    }

    pub fn from_error(service: &str, err: &MetaError) -> Self {
        let (status, code) = classify(err);
        Self {
            service: service.to_string(),
            status,
            code,
            error: Some(err.to_string()),
            results: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ResultCode::Ok
    }
}

/// Fixed mapping from fault to `(status, code)`. Caller-input faults are 4xx,
/// server-side faults 5xx.
pub fn classify(err: &MetaError) -> (u16, ResultCode) {
    match err {
        MetaError::Bind(_) => (400, ResultCode::BindError),
        MetaError::Parse(_) => (400, ResultCode::ParseError),
        MetaError::MissingIdentifier => (400, ResultCode::InsertError),
        MetaError::Insert(_) => (500, ResultCode::InsertError),
        MetaError::Remove(_) => (500, ResultCode::RemoveError),
        MetaError::MissingIdentity(_) => (400, ResultCode::RemoveError),
        MetaError::Unauthorized(_) => (401, ResultCode::AuthError),
        MetaError::Forbidden(_) => (403, ResultCode::AuthError),
        MetaError::Store(StoreError::InvalidFilter(_)) => (400, ResultCode::ParseError),
        MetaError::Store(_) => (500, ResultCode::StoreError),
    }
}
