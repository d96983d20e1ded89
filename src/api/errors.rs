use log::*;
use nested_errors::errors::{JwtError, SessionError};
use rocket::{Request, http::Status, response, response::Responder};

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("database error: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("session error: {0}")]
    SessionError(#[from] SessionError),
    #[error("token error: {0}")]
    TokenError(#[from] JwtError),
    #[error("username must not be empty")]
    EmptyUsername,
}

impl AppError {
    fn status(&self) -> Status {
        match self {
            AppError::DbError(..) => Status::InternalServerError,
            AppError::SessionError(..) => Status::InternalServerError,
            AppError::TokenError(..) => Status::InternalServerError,
            AppError::EmptyUsername => Status::BadRequest,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status.code >= 500 {
            // debug prints enum variant name, display shows thiserror message
            error!("While handling [{req}], encountered {self:?}: {self}");
        }

        // body is rendered by the registered catcher for this status
        Err(status)
    }
}
