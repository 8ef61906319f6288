use rocket::http::Status;
use rocket::response::Responder;
use rocket::serde::json::Json;
use shared::{Error, ErrorCode};
use thiserror::Error;
use tracing::error;

use crate::pitch::PitchError;
use crate::processor::ProcessError;
use crate::retry::RetryError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Invalid Host Key. Access denied.")]
    Unauthorized,
    #[error("Voting has not started yet. Please wait for the host.")]
    VotingPending,
    #[error("Voting is closed. Your vote was not recorded.")]
    VotingClosed,
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    Generation(String),
    #[error("Failed to save. Please try again.")]
    WriteFailed,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::Unauthorized => Status::Unauthorized,
            ApiError::VotingPending | ApiError::VotingClosed => Status::Forbidden,
            ApiError::RateLimited(_) => Status::TooManyRequests,
            ApiError::Generation(_) => Status::BadGateway,
            ApiError::WriteFailed => Status::ServiceUnavailable,
            ApiError::Internal(_) => Status::InternalServerError,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::BadRequest(_) => ErrorCode::InvalidInput,
            ApiError::Unauthorized => ErrorCode::Unauthorized,
            ApiError::VotingPending => ErrorCode::VotingPending,
            ApiError::VotingClosed => ErrorCode::VotingClosed,
            ApiError::WriteFailed => ErrorCode::WriteFailure,
            ApiError::RateLimited(_) => ErrorCode::RateLimited,
            ApiError::Generation(_) => ErrorCode::GenerationFailure,
            ApiError::Internal(_) => ErrorCode::SystemError,
        }
    }

    pub fn to_error(&self) -> Error {
        match self {
            ApiError::Internal(_) => Error::new(self.code(), "An internal server error occurred."),
            _ => Error::new(self.code(), self.to_string()),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        if let ApiError::Internal(detail) = &self {
            error!(path = %req.uri(), "request failed: {}", detail);
        }
        let status = self.status();
        rocket::Response::build_from(Json(self.to_error()).respond_to(req)?)
            .status(status)
            .ok()
    }
}

impl From<ProcessError> for ApiError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::Invalid(v) => ApiError::BadRequest(v.to_string()),
            ProcessError::VotingPending => ApiError::VotingPending,
            ProcessError::VotingClosed => ApiError::VotingClosed,
            ProcessError::Write(failure) => {
                let operation = failure.operation();
                match failure {
                    RetryError::Exhausted { attempts, error, .. } => {
                        error!(operation, attempts, "write gave up: {}", error);
                        ApiError::WriteFailed
                    }
                    RetryError::Permanent { error, .. } => ApiError::Internal(format!("{operation}: {error}")),
                }
            }
            ProcessError::Store(error) => ApiError::Internal(error.to_string()),
        }
    }
}

impl From<PitchError> for ApiError {
    fn from(e: PitchError) -> Self {
        match e {
            PitchError::Invalid(v) => ApiError::BadRequest(v.to_string()),
            PitchError::Inappropriate(_) => ApiError::BadRequest(e.to_string()),
            PitchError::NotConfigured => ApiError::Generation(e.to_string()),
            other => {
                error!("pitch generation failed: {}", other);
                ApiError::Generation(other.user_message())
            }
        }
    }
}
