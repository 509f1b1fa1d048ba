use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tower_sessions::Session;

use super::prelude::*;
use crate::session::random_token;

/// The controller bound to the requesting browser.
///
/// A browser without a session key gets a new one, and that first request
/// is what counts as a visit.
#[derive(Clone)]
pub(crate) struct ActiveSession {
    pub(crate) controller: Arc<Mutex<SessionController>>,
    pub(crate) visit_number: i64,
}

impl FromRequestParts<AppState> for ActiveSession {
    type Rejection = ThemeboothError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, message)| ThemeboothError::InternalServerError(message.to_string()))?;

        let key = match session.get::<String>(SESSION_KEY).await? {
            Some(key) => key,
            None => {
                let key = random_token();
                let visit_number = record_visit(&state.db).await?;
                session.insert(SESSION_KEY, key.clone()).await?;
                session.insert(SESSION_VISIT_NUMBER, visit_number).await?;
                info!("New session, visit #{}", visit_number);
                key
            }
        };
        let visit_number = session
            .get::<i64>(SESSION_VISIT_NUMBER)
            .await?
            .unwrap_or_default();

        Ok(Self {
            controller: state.controller_for(&key).await,
            visit_number,
        })
    }
}
