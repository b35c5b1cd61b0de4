//! JSON error responses
//!
//! Every JSON endpoint fails with `{"success": false, "error": ..., "code": ...}`.
//! The status is derived from the code; service errors convert with `?`.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::emotion::DetectionError;
use crate::services::{
    DetectionServiceError, HistoryError, PreferenceError, ResetError, SongServiceError,
    UserServiceError,
};

const GENERIC_ERROR: &str = "Something went wrong. Please try again.";

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            code: code.into(),
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new("RATE_LIMITED", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("SERVICE_UNAVAILABLE", message)
    }

    /// Log the cause and answer with a generic message
    pub fn internal_error(cause: impl std::fmt::Display) -> Self {
        tracing::error!(error = %cause, "request failed");
        Self::new("INTERNAL_ERROR", GENERIC_ERROR)
    }

    pub fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "VALIDATION_ERROR" | "INVALID_IMAGE" | "NO_FACES_DETECTED" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "PAYLOAD_TOO_LARGE" => StatusCode::PAYLOAD_TOO_LARGE,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            "SERVICE_UNAVAILABLE" | "MODEL_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::validation_error(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound => ApiError::not_found("User not found"),
            UserServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<SongServiceError> for ApiError {
    fn from(e: SongServiceError) -> Self {
        match e {
            SongServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            SongServiceError::NotFound => ApiError::not_found("Song not found"),
            SongServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<HistoryError> for ApiError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::ValidationError(msg) => ApiError::validation_error(msg),
            HistoryError::SongNotFound => ApiError::not_found("Song not found"),
            HistoryError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<PreferenceError> for ApiError {
    fn from(e: PreferenceError) -> Self {
        match e {
            PreferenceError::ValidationError(msg) => ApiError::validation_error(msg),
            PreferenceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<ResetError> for ApiError {
    fn from(e: ResetError) -> Self {
        match e {
            ResetError::InvalidToken => ApiError::validation_error(e.to_string()),
            ResetError::ValidationError(msg) => ApiError::validation_error(msg),
            ResetError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<DetectionError> for ApiError {
    fn from(e: DetectionError) -> Self {
        match &e {
            DetectionError::ModelUnavailable(cause) => {
                tracing::error!(error = %cause, "emotion model unavailable");
                ApiError::new(
                    "MODEL_UNAVAILABLE",
                    "Emotion detection is temporarily unavailable",
                )
            }
            DetectionError::PayloadTooLarge { .. } => ApiError::new("PAYLOAD_TOO_LARGE", e.to_string()),
            DetectionError::InvalidImage(_) => ApiError::new("INVALID_IMAGE", e.to_string()),
            DetectionError::NoFacesDetected => ApiError::new("NO_FACES_DETECTED", e.to_string()),
            DetectionError::Inference(_) => ApiError::internal_error(e),
        }
    }
}

impl From<DetectionServiceError> for ApiError {
    fn from(e: DetectionServiceError) -> Self {
        match e {
            DetectionServiceError::Detection(e) => e.into(),
            DetectionServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::new("PAYLOAD_TOO_LARGE", "Request body is too large");
        }
        ApiError::validation_error(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation_error(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::rate_limited("x").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::service_unavailable("x").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::new("SOMETHING_ELSE", "x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_detection_errors() {
        let e: ApiError = DetectionError::NoFacesDetected.into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.error, "No faces detected");

        let e: ApiError = DetectionError::PayloadTooLarge { limit: 10 }.into();
        assert_eq!(e.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let e: ApiError = DetectionError::ModelUnavailable("missing file".into()).into();
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!e.error.contains("missing file"));

        let e: ApiError = DetectionError::InvalidImage("bad".into()).into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let e: ApiError = UserServiceError::InternalError(anyhow::anyhow!("db exploded")).into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!e.error.contains("db exploded"));
        assert!(!e.success);
    }

    #[test]
    fn test_body_shape() {
        let body = serde_json::to_value(ApiError::conflict("Username already exists")).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Username already exists");
        assert_eq!(body["code"], "CONFLICT");
    }

    #[test]
    fn test_json_rejection_is_validation_error() {
        let rejection = Json::<serde_json::Value>::from_bytes(b"{not json").unwrap_err();
        let e: ApiError = rejection.into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "VALIDATION_ERROR");
        assert!(!e.error.is_empty());
    }

    #[test]
    fn test_query_rejection_is_validation_error() {
        #[derive(Debug, Deserialize)]
        struct Paging {
            #[allow(dead_code)]
            page: Option<u32>,
        }

        let uri: axum::http::Uri = "/get_user_activity?page=abc".parse().unwrap();
        let rejection = axum::extract::Query::<Paging>::try_from_uri(&uri).unwrap_err();
        let e: ApiError = rejection.into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "VALIDATION_ERROR");
    }
}
