use tally_core::errors::{ApplicationError, DomainError};
use tally_core::wire::DecodeError;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("bad request: {message}")]
    BadRequest { message: String },
    #[error("resource not found")]
    NotFound,
    #[error("unexpected response status {status_code}: {body}")]
    UnexpectedResponse { status_code: u16, body: String },
    #[error("could not reach the time-tracking service: {cause}")]
    Connection { cause: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl From<TransportError> for ApiError {
    fn from(value: TransportError) -> Self {
        Self::Connection { cause: value.to_string() }
    }
}

impl From<ApiError> for ApplicationError {
    fn from(value: ApiError) -> Self {
        match value {
            ApiError::Decode(error) => Self::Domain(DomainError::Decode(error)),
            other => Self::Integration(other.to_string()),
        }
    }
}
