//! Bounded, ordered theme selection

use std::sync::Arc;

use crate::catalog::Theme;
use crate::constants::MAX_SELECTED_THEMES;

/// What a toggle did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Toggle {
    /// The theme was appended.
    Added,
    /// The theme was already selected and has been removed.
    Removed,
    /// The selection is full; nothing changed.
    Full,
}

/// Themes picked for the next run, unique by id, in pick order.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    themes: Vec<Arc<Theme>>,
}

impl Selection {
    /// Removes `theme` if present, otherwise appends it while under
    /// [`MAX_SELECTED_THEMES`].
    pub fn toggle(&mut self, theme: Arc<Theme>) -> Toggle {
        if let Some(idx) = self.themes.iter().position(|t| t.id == theme.id) {
            self.themes.remove(idx);
            return Toggle::Removed;
        }
        if self.themes.len() >= MAX_SELECTED_THEMES {
            return Toggle::Full;
        }
        self.themes.push(theme);
        Toggle::Added
    }

    /// True when a theme with `id` is selected.
    pub fn contains(&self, id: &str) -> bool {
        self.themes.iter().any(|t| t.id == id)
    }

    /// Selected themes in pick order.
    pub fn themes(&self) -> &[Arc<Theme>] {
        &self.themes
    }

    /// Number of selected themes.
    pub fn len(&self) -> usize {
        self.themes.len()
    }

    /// True when nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    /// Drops every selected theme.
    pub fn clear(&mut self) {
        self.themes.clear();
    }
}
