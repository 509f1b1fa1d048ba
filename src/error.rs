//! Error handling

use axum::response::IntoResponse;
use tracing::info;

/// Errors the web layer turns into responses.
#[derive(Debug)]
pub enum ThemeboothError {
    /// When you didn't do the right thing
    BadRequest,
    /// When DB operations fail
    DatabaseError(sea_orm::DbErr),
    /// When a requested resource is not found
    NotFound(String),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl From<sea_orm::DbErr> for ThemeboothError {
    fn from(err: sea_orm::DbErr) -> Self {
        ThemeboothError::DatabaseError(err)
    }
}

impl From<std::io::Error> for ThemeboothError {
    fn from(err: std::io::Error) -> Self {
        ThemeboothError::InternalServerError(err.to_string())
    }
}

impl From<axum::http::Error> for ThemeboothError {
    fn from(err: axum::http::Error) -> Self {
        ThemeboothError::InternalServerError(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for ThemeboothError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        info!("Rejected multipart body: {}", err.body_text());
        ThemeboothError::BadRequest
    }
}

impl From<tower_sessions::session::Error> for ThemeboothError {
    fn from(err: tower_sessions::session::Error) -> Self {
        ThemeboothError::InternalServerError(format!("session: {err}"))
    }
}

impl IntoResponse for ThemeboothError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ThemeboothError::BadRequest => {
                info!("Bad request received");
                (axum::http::StatusCode::BAD_REQUEST, "Bad Request")
            }
            ThemeboothError::DatabaseError(err) => {
                tracing::error!("Database error: {}", err);
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error",
                )
            }
            ThemeboothError::NotFound(url) => {
                info!("404 {url}");
                (axum::http::StatusCode::NOT_FOUND, "Not Found")
            }
            ThemeboothError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                )
            }
        };
        let mut response = axum::response::Response::new(axum::body::Body::from(body));
        *response.status_mut() = status;
        response
    }
}
