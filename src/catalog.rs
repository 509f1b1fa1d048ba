//! Theme catalog loaded from a bundled JSON file.
//!
//! Most themes are declared by name only and expanded here into a stable id,
//! the shared "Vietnamese theme" prompt template and a placeholder thumbnail.
//! Hand-written themes carry all four fields in the JSON.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, OnceLock};

use regex::Regex;
use serde::Deserialize;

/// A named visual transformation style.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Theme {
    /// Stable identifier, used as the result table key.
    pub id: String,
    /// Human-readable name shown on the page and kept on result entries.
    pub name: String,
    /// Base instruction sent to the generator before any augmentation.
    pub prompt_template: String,
    /// Thumbnail URL for the theme picker.
    pub thumbnail: String,
}

impl Theme {
    /// Builds a theme from its parts.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        prompt_template: impl Into<String>,
        thumbnail: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prompt_template: prompt_template.into(),
            thumbnail: thumbnail.into(),
        }
    }

    /// Expands a name-only theme declared under `category_id`.
    pub fn from_name(name: &str, category_id: &str) -> Self {
        let slug = slugify(name);
        Self {
            id: format!("{category_id}-{slug}"),
            name: name.to_string(),
            prompt_template: format!(
                "Transform the person in the photo to fit the Vietnamese theme of \"{name}\". Critically, you must preserve the exact facial features and identity of the person from the uploaded photo with photorealistic accuracy. The final image should be hyper-realistic, high-resolution, and seamlessly blend the person's face into the new scene. The background, clothing, and overall atmosphere must authentically reflect the specified theme."
            ),
            thumbnail: format!("https://picsum.photos/seed/{slug}/200"),
        }
    }
}

/// Display grouping of themes.
#[derive(Clone, Debug)]
pub struct ThemeCategory {
    /// Category identifier, also the prefix of generated theme ids.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Themes in display order.
    pub themes: Vec<Arc<Theme>>,
}

/// Errors returned when loading the catalog.
#[derive(Debug)]
pub enum CatalogError {
    /// The JSON payload could not be parsed.
    Parse(serde_json::Error),
    /// A theme declared only some of `id`/`prompt`/`thumbnail`.
    IncompleteTheme(String),
    /// Two themes resolved to the same id.
    DuplicateId(String),
    /// The catalog has not been initialized.
    NotInitialized,
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "Failed to parse theme catalog JSON: {err}"),
            Self::IncompleteTheme(name) => {
                write!(f, "Theme {name:?} must set id, prompt and thumbnail together")
            }
            Self::DuplicateId(id) => write!(f, "Duplicate theme id in catalog: {id}"),
            Self::NotInitialized => write!(f, "Theme catalog has not been initialized"),
        }
    }
}

impl std::error::Error for CatalogError {}

#[derive(Deserialize)]
struct RawCatalog {
    categories: Vec<RawCategory>,
}

#[derive(Deserialize)]
struct RawCategory {
    id: String,
    name: String,
    themes: Vec<RawTheme>,
}

#[derive(Deserialize)]
struct RawTheme {
    name: String,
    id: Option<String>,
    prompt: Option<String>,
    thumbnail: Option<String>,
}

/// Read-only collection of theme categories with id lookup.
#[derive(Debug)]
pub struct ThemeCatalog {
    categories: Vec<ThemeCategory>,
    by_id: HashMap<String, Arc<Theme>>,
}

impl ThemeCatalog {
    /// Parses a catalog document, rejecting duplicate ids.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let parsed: RawCatalog = serde_json::from_str(raw).map_err(CatalogError::Parse)?;

        let mut by_id = HashMap::new();
        let mut categories = Vec::with_capacity(parsed.categories.len());
        for category in parsed.categories {
            let mut themes = Vec::with_capacity(category.themes.len());
            for raw_theme in category.themes {
                let theme = match (raw_theme.id, raw_theme.prompt, raw_theme.thumbnail) {
                    (None, None, None) => Theme::from_name(&raw_theme.name, &category.id),
                    (Some(id), Some(prompt), Some(thumbnail)) => {
                        Theme::new(id, raw_theme.name, prompt, thumbnail)
                    }
                    _ => return Err(CatalogError::IncompleteTheme(raw_theme.name)),
                };
                let theme = Arc::new(theme);
                if by_id.insert(theme.id.clone(), theme.clone()).is_some() {
                    return Err(CatalogError::DuplicateId(theme.id.clone()));
                }
                themes.push(theme);
            }
            categories.push(ThemeCategory {
                id: category.id,
                name: category.name,
                themes,
            });
        }

        Ok(Self { categories, by_id })
    }

    /// Categories in display order.
    pub fn categories(&self) -> &[ThemeCategory] {
        &self.categories
    }

    /// Looks a theme up by id.
    pub fn theme(&self, id: &str) -> Option<Arc<Theme>> {
        self.by_id.get(id).cloned()
    }

    /// Total number of themes across categories.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True when the catalog holds no themes.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

static CATALOG: OnceLock<ThemeCatalog> = OnceLock::new();

/// Parse the bundled catalog; called during startup. Later calls return the
/// already-loaded catalog.
pub fn init() -> Result<&'static ThemeCatalog, CatalogError> {
    if let Some(catalog) = CATALOG.get() {
        return Ok(catalog);
    }
    let raw = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/themes.json"));
    let parsed = ThemeCatalog::from_json(raw)?;
    Ok(CATALOG.get_or_init(|| parsed))
}

/// Returns the loaded catalog.
pub fn catalog() -> Result<&'static ThemeCatalog, CatalogError> {
    CATALOG.get().ok_or(CatalogError::NotInitialized)
}

#[allow(clippy::unwrap_used)] // literal pattern
static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\s-]").unwrap());
#[allow(clippy::unwrap_used)] // literal pattern
static WHITESPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Lowercases and reduces a theme name to an ASCII slug. Letters outside
/// ASCII are dropped rather than transliterated, so ids stay stable.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase().replace(" & ", "-and-");
    let stripped = NON_SLUG_CHARS.replace_all(&lowered, "");
    WHITESPACE_RUNS
        .replace_all(stripped.trim(), "-")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_drops_non_ascii_letters() {
        assert_eq!(slugify("Ngắm trăng bên lồng đèn"), "ngm-trng-bn-lng-n");
        assert_eq!(slugify("Chơi đàn T'rưng"), "chi-n-trng");
        assert_eq!(slugify("Biểu tượng & Văn hóa"), "biu-tng-and-vn-ha");
        assert_eq!(slugify("  Phong cách Low-poly "), "phong-cch-low-poly");
    }

    #[test]
    fn name_only_theme_is_expanded() {
        let theme = Theme::from_name("Biển xanh Phú Quốc", "phong-canh-dia-danh");
        assert_eq!(theme.id, "phong-canh-dia-danh-bin-xanh-ph-quc");
        assert!(theme.prompt_template.contains("\"Biển xanh Phú Quốc\""));
        assert_eq!(theme.thumbnail, "https://picsum.photos/seed/bin-xanh-ph-quc/200");
    }

    #[test]
    fn bundled_catalog_loads() {
        let catalog = init().expect("load bundled catalog");
        assert_eq!(catalog.categories().len(), 10);
        assert_eq!(catalog.len(), 127);
        assert!(catalog.theme(crate::constants::TEST_THEME_ID).is_some());
        assert!(
            catalog
                .theme(crate::prompt::CO_TRANSFORMATION_THEME_ID)
                .is_some()
        );
        assert!(catalog.theme("trung-thu-2025-ngm-trng-bn-lng-n").is_some());
        assert_eq!(catalog.categories()[0].id, "trending");
    }

    #[test]
    fn repeated_init_returns_the_same_catalog() {
        let first = init().expect("load bundled catalog");
        let second = init().expect("reuse bundled catalog");
        assert!(std::ptr::eq(first, second));
        assert!(std::ptr::eq(first, catalog().expect("catalog loaded")));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let raw = r#"{"categories": [
            {"id": "a", "name": "A", "themes": [{"name": "Same"}]},
            {"id": "a", "name": "A again", "themes": [{"name": "Same"}]}
        ]}"#;
        match ThemeCatalog::from_json(raw) {
            Err(CatalogError::DuplicateId(id)) => assert_eq!(id, "a-same"),
            other => panic!("expected duplicate id error, got {other:?}"),
        }
    }

    #[test]
    fn partial_theme_is_rejected() {
        let raw = r#"{"categories": [
            {"id": "a", "name": "A", "themes": [{"name": "Half", "id": "a-half"}]}
        ]}"#;
        assert!(matches!(
            ThemeCatalog::from_json(raw),
            Err(CatalogError::IncompleteTheme(_))
        ));
    }
}
