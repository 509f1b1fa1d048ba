pub(crate) use crate::constants::{SESSION_KEY, SESSION_VISIT_NUMBER};
pub(crate) use crate::db::entities::visits::record_visit;
pub(crate) use crate::error::ThemeboothError;
pub(crate) use crate::session::{SessionController, SessionState};
pub(crate) use crate::web::{AppState, middleware::ActiveSession};
pub(crate) use askama::Template;
pub(crate) use askama_web::WebTemplate;
pub(crate) use axum::extract::{Form, Multipart, Path, State};
pub(crate) use axum::http::{StatusCode, header::CONTENT_TYPE};
pub(crate) use axum::response::{IntoResponse, Redirect, Response};
pub(crate) use serde::{Deserialize, Serialize};
pub(crate) use std::sync::Arc;
pub(crate) use tokio::sync::Mutex;
pub(crate) use tracing::{debug, info};
