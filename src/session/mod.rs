//! One browser session's inputs and the reset boundary around a run.

use std::sync::Arc;

use rand::RngExt;
use rand::distr::Alphanumeric;
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::Theme;
use crate::constants::TOKEN_LENGTH;
use crate::generation::{
    GenerationClient, Orchestrator, PreparedRun, ResultSnapshot, ResultStore, SourceImage,
    ValidationError,
};
use crate::prompt::Gender;

mod preview;
mod selection;

pub use preview::{PreviewHandle, PreviewRegistry};
pub use selection::{Selection, Toggle};

pub(crate) fn random_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Where a session stands, derived from its inputs and the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No photo.
    Idle,
    /// Photo present, gender not declared yet.
    GenderPending,
    /// Photo and gender present, nothing selected.
    ImageSelected,
    /// Every run precondition holds.
    Ready,
    /// A run is in flight.
    Running,
}

impl SessionState {
    /// Snake-case name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::GenderPending => "gender_pending",
            SessionState::ImageSelected => "image_selected",
            SessionState::Ready => "ready",
            SessionState::Running => "running",
        }
    }
}

/// Owns upload, selection, gender and error state for one session, and
/// the result store its runs write to.
pub struct SessionController {
    orchestrator: Orchestrator,
    previews: PreviewRegistry,
    image: Option<SourceImage>,
    preview: Option<PreviewHandle>,
    selection: Selection,
    gender: Gender,
    error: Option<String>,
}

impl SessionController {
    /// A fresh, idle session.
    pub fn new(client: Arc<dyn GenerationClient>, previews: PreviewRegistry) -> Self {
        Self {
            orchestrator: Orchestrator::new(ResultStore::new(), client),
            previews,
            image: None,
            preview: None,
            selection: Selection::default(),
            gender: Gender::Undeclared,
            error: None,
        }
    }

    /// Current state.
    pub async fn state(&self) -> SessionState {
        if self.image.is_none() {
            SessionState::Idle
        } else if self.is_running().await {
            SessionState::Running
        } else if !self.gender.is_declared() {
            SessionState::GenderPending
        } else if self.selection.is_empty() {
            SessionState::ImageSelected
        } else {
            SessionState::Ready
        }
    }

    /// True while the store's loading flag is raised.
    pub async fn is_running(&self) -> bool {
        self.orchestrator.store().is_loading().await
    }

    /// Replaces everything with a freshly uploaded photo. Ignored (returns
    /// false) while a run is in flight.
    pub async fn upload(&mut self, image: SourceImage) -> bool {
        if self.is_running().await {
            debug!("Ignoring upload while a run is in flight");
            return false;
        }
        self.reset().await;
        self.preview = Some(self.previews.acquire(image.clone()));
        self.image = Some(image);
        true
    }

    /// Records an upload that could not be used: the session is reset and
    /// the message lands in the error slot. Ignored while running.
    pub async fn reject_upload(&mut self, message: impl Into<String>) -> bool {
        if self.is_running().await {
            return false;
        }
        self.reset().await;
        self.error = Some(message.into());
        true
    }

    /// Declares the subject's gender. Ignored while running.
    pub async fn set_gender(&mut self, gender: Gender) -> bool {
        if self.is_running().await {
            return false;
        }
        self.gender = gender;
        true
    }

    /// Toggles `theme` in the selection.
    pub fn toggle_theme(&mut self, theme: Arc<Theme>) -> Toggle {
        self.selection.toggle(theme)
    }

    /// Validates and seeds a run. The returned run still has to be
    /// executed; `Ok(None)` means a run is already in flight.
    ///
    /// On a validation failure the message replaces the error slot and the
    /// existing results are left alone.
    pub async fn generate(&mut self) -> Result<Option<PreparedRun>, ValidationError> {
        if self.is_running().await {
            debug!("Ignoring generate while a run is in flight");
            return Ok(None);
        }
        match self
            .orchestrator
            .start(self.image.as_ref(), self.selection.themes(), self.gender)
            .await
        {
            Ok(run) => {
                self.error = None;
                Ok(Some(run))
            }
            Err(err) => {
                info!("Generation refused: {:?}", err);
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Returns to the initial state and releases the preview. Any run in
    /// flight keeps going but its settlements are discarded.
    pub async fn reset(&mut self) {
        self.orchestrator.store().clear().await;
        self.selection.clear();
        self.error = None;
        self.gender = Gender::Undeclared;
        self.image = None;
        self.preview = None;
    }

    /// Current selection.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Declared gender.
    pub fn gender(&self) -> Gender {
        self.gender
    }

    /// Message from the last failed action.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The uploaded photo.
    pub fn image(&self) -> Option<&SourceImage> {
        self.image.as_ref()
    }

    /// The uploaded photo, if `id` names this session's live preview.
    pub fn preview(&self, id: &str) -> Option<&SourceImage> {
        self.preview
            .as_ref()
            .filter(|handle| handle.id() == id)
            .and(self.image.as_ref())
    }

    /// URL of the uploaded photo's preview.
    pub fn preview_url(&self) -> Option<String> {
        self.preview.as_ref().map(PreviewHandle::url)
    }

    /// Copy of the results and loading flag.
    pub async fn results(&self) -> ResultSnapshot {
        self.orchestrator.store().snapshot().await
    }
}
