//! Client-side error taxonomy for portal actions.

use shared::{
    domain::CaseNo,
    error::{ApiException, ErrorCode},
};
use thiserror::Error;

use crate::gate::GateBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Resource absent. For the current step this is the idle outcome, not a failure.
    NotFound,
    /// Missing or expired credentials; the session must be re-established.
    Unauthorized,
    /// Authenticated but not allowed to touch the resource.
    Forbidden,
    /// Rejected input, either blocked before the network or refused by the server.
    Validation,
    /// Connectivity or server-side failure; retrying the action is safe.
    Transient,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not signed in")]
    NoSession,
    #[error("{0}")]
    Validation(String),
    #[error("process data is locked: {0}")]
    GateClosed(GateBlock),
    #[error("no active step to close")]
    NoOpenStep,
    #[error("case {case_no} belongs to another user")]
    CaseNotOwned { case_no: CaseNo },
    #[error(transparent)]
    Api(#[from] ApiException),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSession => ErrorKind::Unauthorized,
            Self::Validation(_) | Self::GateClosed(_) | Self::NoOpenStep | Self::InvalidUrl(_) => {
                ErrorKind::Validation
            }
            Self::CaseNotOwned { .. } => ErrorKind::Forbidden,
            Self::Api(err) => match err.code {
                ErrorCode::Unauthorized => ErrorKind::Unauthorized,
                ErrorCode::Forbidden => ErrorKind::Forbidden,
                ErrorCode::NotFound => ErrorKind::NotFound,
                ErrorCode::Validation => ErrorKind::Validation,
                ErrorCode::RateLimited | ErrorCode::Internal => ErrorKind::Transient,
            },
            Self::Transport(_) => ErrorKind::Transient,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn requires_reauth(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
