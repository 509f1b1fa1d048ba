//! Result table and the store that owns it.
//!
//! Writers never replace the table after seeding; every settlement goes
//! through [`merge`], which touches exactly one key. Each run is tagged with
//! a [`RunToken`] so settlements from a run that was superseded by a reset or
//! a newer run are dropped instead of landing in the fresh table.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::catalog::Theme;
use crate::constants::UNKNOWN_GENERATION_ERROR;

use super::client::GenerationError;

/// Lifecycle of one theme within a run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EntryState {
    /// The generation call is in flight.
    Pending,
    /// The call returned an image.
    Done {
        /// Reference the display loads, usually a `data:` URL.
        #[serde(rename = "imageRef")]
        image_ref: String,
    },
    /// The call failed.
    Failed {
        /// Message shown in place of the image.
        #[serde(rename = "error")]
        message: String,
    },
}

/// Per-theme record in the result table.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct GenerationEntry {
    /// Name of the theme, fixed when the entry is seeded.
    #[serde(rename = "themeName")]
    pub theme_name: String,
    /// Current state.
    #[serde(flatten)]
    pub state: EntryState,
}

impl GenerationEntry {
    /// A freshly seeded entry.
    pub fn pending(theme_name: impl Into<String>) -> Self {
        Self {
            theme_name: theme_name.into(),
            state: EntryState::Pending,
        }
    }

    /// True once the call for this entry has settled.
    pub fn is_settled(&self) -> bool {
        !matches!(self.state, EntryState::Pending)
    }
}

/// Theme id to entry, in selection order.
pub type ResultTable = IndexMap<String, GenerationEntry>;

/// Outcome of one generation call, as applied to the table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Settlement {
    /// Success with the returned image reference.
    Done(String),
    /// Failure with the message to display.
    Failed(String),
}

impl Settlement {
    /// Converts a client result, substituting the generic message when the
    /// error has none.
    pub fn from_result(result: Result<String, GenerationError>) -> Self {
        match result {
            Ok(image_ref) => Settlement::Done(image_ref),
            Err(err) => Settlement::Failed(
                err.user_message()
                    .unwrap_or_else(|| UNKNOWN_GENERATION_ERROR.to_string()),
            ),
        }
    }
}

/// Applies `patch` to the entry at `key` and returns the new table.
///
/// Only an existing key is updated and its theme name is kept; a key that
/// was never seeded is left absent.
pub fn merge(mut table: ResultTable, key: &str, patch: Settlement) -> ResultTable {
    if let Some(entry) = table.get_mut(key) {
        entry.state = match patch {
            Settlement::Done(image_ref) => EntryState::Done { image_ref },
            Settlement::Failed(message) => EntryState::Failed { message },
        };
    }
    table
}

/// Identifies one run; only the most recent token may write to the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct RunToken(u64);

impl RunToken {
    /// Numeric value, for logging.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RunToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time copy of the store for rendering.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ResultSnapshot {
    /// True between seeding and the last settlement of the current run.
    pub loading: bool,
    /// Entries in selection order.
    pub results: ResultTable,
}

#[derive(Debug, Default)]
struct StoreInner {
    run: u64,
    loading: bool,
    table: ResultTable,
}

/// Shared owner of the result table and loading flag.
#[derive(Clone, Debug, Default)]
pub struct ResultStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl ResultStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new run: replaces the table with one pending entry per
    /// theme and raises the loading flag, all under one write lock.
    pub async fn seed(&self, themes: &[Arc<Theme>]) -> RunToken {
        let mut inner = self.inner.write().await;
        inner.run += 1;
        inner.loading = true;
        inner.table = themes
            .iter()
            .map(|theme| (theme.id.clone(), GenerationEntry::pending(theme.name.clone())))
            .collect();
        RunToken(inner.run)
    }

    /// Records one settlement. Returns false when `token` is stale and the
    /// write was discarded.
    pub async fn settle(&self, token: RunToken, key: &str, patch: Settlement) -> bool {
        let mut inner = self.inner.write().await;
        if inner.run != token.0 {
            debug!(
                "Discarding settlement for {} from superseded run {}",
                key, token
            );
            return false;
        }
        let table = std::mem::take(&mut inner.table);
        inner.table = merge(table, key, patch);
        true
    }

    /// Clears the loading flag once every call of `token`'s run settled.
    pub async fn finish(&self, token: RunToken) -> bool {
        let mut inner = self.inner.write().await;
        if inner.run != token.0 {
            return false;
        }
        inner.loading = false;
        true
    }

    /// Empties the table and invalidates any in-flight run.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.run += 1;
        inner.loading = false;
        inner.table.clear();
    }

    /// True while a run is in flight.
    pub async fn is_loading(&self) -> bool {
        self.inner.read().await.loading
    }

    /// Copies the current table and loading flag.
    pub async fn snapshot(&self) -> ResultSnapshot {
        let inner = self.inner.read().await;
        ResultSnapshot {
            loading: inner.loading,
            results: inner.table.clone(),
        }
    }
}
