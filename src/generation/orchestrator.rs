//! Fans one generation call out per selected theme and folds the
//! settlements back into the [`ResultStore`].

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::catalog::Theme;
use crate::prompt::{Gender, compose};

use super::ValidationError;
use super::client::{GenerationClient, SourceImage};
use super::results::{ResultStore, RunToken, Settlement};

/// Counts for a finished run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RunReport {
    /// Token the run was seeded with.
    pub token: Option<RunToken>,
    /// Calls that returned an image.
    pub done: usize,
    /// Calls that failed.
    pub failed: usize,
    /// Settlements dropped because the run had been superseded.
    pub discarded: usize,
}

/// Checks the run preconditions in order: image, selection, gender.
pub fn validate<'a>(
    image: Option<&'a SourceImage>,
    themes: &[Arc<Theme>],
    gender: Gender,
) -> Result<&'a SourceImage, ValidationError> {
    let image = image.ok_or(ValidationError::MissingImage)?;
    if themes.is_empty() {
        return Err(ValidationError::EmptySelection);
    }
    if !gender.is_declared() {
        return Err(ValidationError::UndeclaredGender);
    }
    Ok(image)
}

#[derive(Debug)]
struct Job {
    theme_id: String,
    prompt: String,
}

/// Drives runs against one store and one client.
#[derive(Clone)]
pub struct Orchestrator {
    store: ResultStore,
    client: Arc<dyn GenerationClient>,
}

impl Orchestrator {
    /// Binds a store and a client.
    pub fn new(store: ResultStore, client: Arc<dyn GenerationClient>) -> Self {
        Self { store, client }
    }

    /// The store this orchestrator writes to.
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Validates the inputs, composes every prompt and seeds the store with
    /// pending entries. No generation call has started when this returns.
    pub async fn start(
        &self,
        image: Option<&SourceImage>,
        themes: &[Arc<Theme>],
        gender: Gender,
    ) -> Result<PreparedRun, ValidationError> {
        let image = validate(image, themes, gender)?;

        let jobs = themes
            .iter()
            .map(|theme| Job {
                theme_id: theme.id.clone(),
                prompt: compose(theme, gender),
            })
            .collect::<Vec<_>>();
        let token = self.store.seed(themes).await;
        info!(
            "Seeded run {} with {} theme(s), gender {}",
            token,
            jobs.len(),
            gender
        );

        Ok(PreparedRun {
            token,
            image: image.clone(),
            jobs,
            store: self.store.clone(),
            client: self.client.clone(),
        })
    }

    /// [`Orchestrator::start`] followed by [`PreparedRun::execute`].
    pub async fn run(
        &self,
        image: Option<&SourceImage>,
        themes: &[Arc<Theme>],
        gender: Gender,
    ) -> Result<RunReport, ValidationError> {
        Ok(self.start(image, themes, gender).await?.execute().await)
    }
}

/// A seeded run whose calls have not been issued yet.
pub struct PreparedRun {
    token: RunToken,
    image: SourceImage,
    jobs: Vec<Job>,
    store: ResultStore,
    client: Arc<dyn GenerationClient>,
}

impl PreparedRun {
    /// Token the store was seeded with.
    pub fn token(&self) -> RunToken {
        self.token
    }

    /// Issues every call back to back, writes each settlement to its own key
    /// as it arrives, then clears the loading flag once all have settled.
    #[instrument(skip_all, fields(run = %self.token))]
    pub async fn execute(self) -> RunReport {
        let PreparedRun {
            token,
            image,
            jobs,
            store,
            client,
        } = self;

        let calls = jobs.iter().map(|job| {
            let image = &image;
            let store = &store;
            let client = &client;
            async move {
                let result = client.generate(image, &job.prompt).await;
                if let Err(err) = &result {
                    warn!("Generation for {} failed: {}", job.theme_id, err);
                }
                let settlement = Settlement::from_result(result);
                let is_done = matches!(settlement, Settlement::Done(_));
                let written = store.settle(token, &job.theme_id, settlement).await;
                (is_done, written)
            }
        });
        let outcomes = join_all(calls).await;

        let mut report = RunReport {
            token: Some(token),
            ..RunReport::default()
        };
        for (is_done, written) in outcomes {
            if !written {
                report.discarded += 1;
            } else if is_done {
                report.done += 1;
            } else {
                report.failed += 1;
            }
        }

        if store.finish(token).await {
            info!(
                "Run {} finished: {} done, {} failed",
                token, report.done, report.failed
            );
        } else {
            debug!(
                "Run {} was superseded, {} settlement(s) discarded",
                token, report.discarded
            );
        }
        report
    }
}
