//! Adapter-local error taxonomy, converted into [`OrchestratorError`] at the
//! `MediaAdapter` trait boundary — the same two-layer error split the
//! teacher uses between its DAO and API layers.

use conflux_core::error::OrchestratorError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("malformed offer: {0}")]
    MalformedOffer(String),
    #[error("no backend host available: {0}")]
    NoHostAvailable(String),
}

impl From<AdapterError> for OrchestratorError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::ElementNotFound(msg) => OrchestratorError::MediaNotFound(msg),
            AdapterError::MalformedOffer(msg) => OrchestratorError::MediaNoAvailableCodec(msg),
            AdapterError::NoHostAvailable(msg) => OrchestratorError::ConnectionError(msg),
        }
    }
}
