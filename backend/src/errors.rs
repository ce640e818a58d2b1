use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;

/// Errors surfaced by the planner operations and mapped onto HTTP statuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    UserError(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    System(String),
}

impl AppError {
    pub fn user_error(message: impl Into<String>) -> Self {
        Self::UserError(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn system_error(message: impl Into<String>) -> Self {
        Self::System(message.into())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::UserError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::System(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = self.to_string();
        HttpResponse::build(self.status_code()).json(ErrorBody { message: &message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::user_error("bad").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::not_found("gone").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::system_error("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display_is_the_message() {
        let err = AppError::user_error("Consumption duration must be positive");
        assert_eq!(err.to_string(), "Consumption duration must be positive");
    }
}
