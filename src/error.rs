use std::fmt::{Display, Formatter};

use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::{json, serde_json, Json},
    tokio::task::JoinError,
    Request,
};
use thiserror::Error;

use crate::{anchor::AnchorError, store::StoreError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Election is not active")]
    ElectionNotActive,
    #[error("Vote has already been revealed")]
    AlreadyRevealed,
    #[error("No commitment found for this voter and election")]
    NoCommitmentFound,
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("A vote has already been committed for this election")]
    AlreadyCommitted,
    #[error("Finalization is already in progress or complete")]
    AlreadyInProgress,
    #[error("Candidate and nonce do not match the commitment")]
    HashMismatch,
    #[error("Stored record failed an integrity check: {0}")]
    Integrity(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Anchor(#[from] AnchorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("Could not encode tally summary: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Background task failed: {0}")]
    Task(#[from] JoinError),
}

/// Coarse classification of an [`Error`], telling a caller whether and how to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; never retry.
    Validation,
    /// A precondition on election or vote state is not met.
    State,
    /// Lost a race or duplicated work; retry later, not immediately.
    Conflict,
    /// Data does not match its commitment or fingerprint.
    Integrity,
    /// An external dependency failed; retry with backoff.
    Dependency,
    Auth,
    NotFound,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::State => "state",
            Self::Conflict => "conflict",
            Self::Integrity => "integrity",
            Self::Dependency => "dependency",
            Self::Auth => "auth",
            Self::NotFound => "not_found",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::ElectionNotActive
            | Self::AlreadyRevealed
            | Self::NoCommitmentFound
            | Self::InvalidState(_) => ErrorKind::State,
            Self::AlreadyCommitted | Self::AlreadyInProgress => ErrorKind::Conflict,
            Self::HashMismatch | Self::Integrity(_) | Self::Encoding(_) => ErrorKind::Integrity,
            Self::Anchor(_) | Self::Store(_) | Self::Db(_) | Self::Task(_) => {
                ErrorKind::Dependency
            }
            Self::Forbidden(_) | Self::Unauthorized(_) | Self::Jwt(_) => ErrorKind::Auth,
            Self::Argon2(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Validation(_) | Self::HashMismatch | Self::Argon2(_) => Status::BadRequest,
            Self::ElectionNotActive
            | Self::AlreadyRevealed
            | Self::NoCommitmentFound
            | Self::InvalidState(_)
            | Self::AlreadyCommitted
            | Self::AlreadyInProgress => Status::Conflict,
            Self::Integrity(_)
            | Self::Encoding(_)
            | Self::Store(_)
            | Self::Db(_)
            | Self::Task(_) => {
                Status::InternalServerError
            }
            Self::Anchor(_) => Status::BadGateway,
            Self::Forbidden(_) => Status::Forbidden,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::NotFound(_) => Status::NotFound,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{} {}: {self}", req.method(), req.uri());
        } else {
            warn!("{} {}: {self}", req.method(), req.uri());
        }
        let body = json!({
            "error": self.to_string(),
            "kind": self.kind().as_str(),
        });
        (status, Json(body)).respond_to(req)
    }
}
