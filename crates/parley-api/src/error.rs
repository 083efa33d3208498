use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

/// Failure taxonomy surfaced by the auth and message cores.
///
/// Every variant carries a stable, client-safe message; internal detail
/// (hashes, SQL, hashing errors) stays behind `Internal` and is only logged.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or empty required input; the client must fix the request.
    #[error("{0}")]
    Validation(String),

    /// Bad credentials. Deliberately does not distinguish an unknown
    /// username from a wrong password.
    #[error("invalid username/password")]
    Authentication,

    /// Authenticated, but not permitted on this resource.
    #[error("{0}")]
    Authorization(String),

    /// Username already taken.
    #[error("username is already taken")]
    Conflict,

    #[error("{0}")]
    NotFound(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            // Authorization misuse maps to 400 in this API, matching the
            // rest of the client-error surface.
            ApiError::Validation(_) | ApiError::Authorization(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication => StatusCode::UNAUTHORIZED,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            error!("internal error: {e:#}");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Authorization("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Authentication.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_error_hides_detail() {
        let err = ApiError::Internal(anyhow::anyhow!("password_hash leaked?"));
        assert_eq!(err.to_string(), "internal error");
    }
}
