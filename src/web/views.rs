use std::io::Cursor;

use axum::Json;
use axum::http::header::CACHE_CONTROL;
use image::ImageFormat;

use super::prelude::*;
use crate::constants::{INVALID_UPLOAD_MESSAGE, MAX_SELECTED_THEMES, UNSUPPORTED_UPLOAD_MESSAGE};
use crate::generation::{EntryState, ResultTable, SourceImage};
use crate::prompt::Gender;
use crate::session::Toggle;

const GENDER_CHOICES: [(Gender, &str); 3] = [
    (Gender::Male, "Nam"),
    (Gender::Female, "Nữ"),
    (Gender::Unspecified, "Khác"),
];

#[derive(Clone, Debug)]
pub(crate) struct ThemeCard {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) thumbnail: String,
    pub(crate) selected: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct CategoryView {
    pub(crate) name: String,
    pub(crate) themes: Vec<ThemeCard>,
}

#[derive(Clone, Debug)]
pub(crate) struct GenderChoice {
    pub(crate) value: String,
    pub(crate) label: &'static str,
    pub(crate) checked: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct ResultCard {
    pub(crate) theme_name: String,
    pub(crate) status: &'static str,
    pub(crate) image_ref: String,
    pub(crate) error: String,
}

impl ResultCard {
    fn from_entry(theme_name: &str, state: &EntryState) -> Self {
        let (status, image_ref, error) = match state {
            EntryState::Pending => ("pending", String::new(), String::new()),
            EntryState::Done { image_ref } => ("done", image_ref.clone(), String::new()),
            EntryState::Failed { message } => ("failed", String::new(), message.clone()),
        };
        Self {
            theme_name: theme_name.to_string(),
            status,
            image_ref,
            error,
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub(crate) struct HomeTemplate {
    pub(crate) categories: Vec<CategoryView>,
    pub(crate) genders: Vec<GenderChoice>,
    pub(crate) preview_url: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) state: &'static str,
    pub(crate) loading: bool,
    pub(crate) can_generate: bool,
    pub(crate) results: Vec<ResultCard>,
    pub(crate) selected: usize,
    pub(crate) max_selected: usize,
    pub(crate) visit_number: i64,
}

/// Body of `GET /results`
#[derive(Serialize, Debug)]
pub(crate) struct ResultsResponse {
    pub(crate) loading: bool,
    pub(crate) state: SessionState,
    pub(crate) results: ResultTable,
}

#[derive(Deserialize, Debug)]
pub(crate) struct GenderForm {
    pub(crate) gender: String,
}

/// handles the / GET
pub(crate) async fn home_handler(
    State(state): State<AppState>,
    active: ActiveSession,
) -> Result<HomeTemplate, ThemeboothError> {
    let controller = active.controller.lock().await;
    let session_state = controller.state().await;
    let snapshot = controller.results().await;

    let categories = state
        .catalog
        .categories()
        .iter()
        .map(|category| CategoryView {
            name: category.name.clone(),
            themes: category
                .themes
                .iter()
                .map(|theme| ThemeCard {
                    id: theme.id.clone(),
                    name: theme.name.clone(),
                    thumbnail: theme.thumbnail.clone(),
                    selected: controller.selection().contains(&theme.id),
                })
                .collect(),
        })
        .collect();

    let genders = GENDER_CHOICES
        .iter()
        .map(|(gender, label)| GenderChoice {
            value: gender.to_string(),
            label: *label,
            checked: controller.gender() == *gender,
        })
        .collect();

    let results = snapshot
        .results
        .values()
        .map(|entry| ResultCard::from_entry(&entry.theme_name, &entry.state))
        .collect();

    Ok(HomeTemplate {
        categories,
        genders,
        preview_url: controller.preview_url(),
        error: controller.error().map(str::to_string),
        state: session_state.as_str(),
        loading: snapshot.loading,
        can_generate: session_state == SessionState::Ready,
        results,
        selected: controller.selection().len(),
        max_selected: MAX_SELECTED_THEMES,
        visit_number: active.visit_number,
    })
}

/// Polled by the page while a run is in flight.
pub(crate) async fn results_handler(active: ActiveSession) -> Json<ResultsResponse> {
    let controller = active.controller.lock().await;
    let state = controller.state().await;
    let snapshot = controller.results().await;
    Json(ResultsResponse {
        loading: snapshot.loading,
        state,
        results: snapshot.results,
    })
}

/// Serves the caller's own upload; other sessions' ids are not found.
pub(crate) async fn preview_handler(
    active: ActiveSession,
    Path(id): Path<String>,
) -> Result<Response, ThemeboothError> {
    let controller = active.controller.lock().await;
    let image = controller
        .preview(&id)
        .ok_or_else(|| ThemeboothError::NotFound(format!("/preview/{id}")))?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, image.mime_type())
        .header(CACHE_CONTROL, "private, no-store")
        .body(axum::body::Body::from(image.bytes().to_vec()))?)
}

/// Checks that the bytes decode as a JPEG or PNG and wraps them up.
fn inspect_upload(bytes: &[u8]) -> Result<SourceImage, &'static str> {
    if bytes.len() < 4 {
        debug!("Upload is too short");
        return Err(INVALID_UPLOAD_MESSAGE);
    }

    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| {
            debug!("Failed to guess image format: {}", err);
            INVALID_UPLOAD_MESSAGE
        })?;
    let mime_type = match reader.format() {
        Some(ImageFormat::Jpeg) => "image/jpeg",
        Some(ImageFormat::Png) => "image/png",
        other => {
            debug!("Unsupported upload format: {:?}", other);
            return Err(UNSUPPORTED_UPLOAD_MESSAGE);
        }
    };
    reader.decode().map_err(|err| {
        debug!("Failed to decode image: {}", err);
        INVALID_UPLOAD_MESSAGE
    })?;

    Ok(SourceImage::new(bytes.to_vec(), mime_type))
}

pub(crate) async fn upload_handler(
    active: ActiveSession,
    mut multipart: Multipart,
) -> Result<Redirect, ThemeboothError> {
    let mut image_bytes = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            image_bytes = Some(field.bytes().await?);
        }
    }
    let image_bytes = image_bytes.ok_or(ThemeboothError::BadRequest)?;

    let mut controller = active.controller.lock().await;
    match inspect_upload(&image_bytes) {
        Ok(image) => {
            let mime_type = image.mime_type().to_string();
            if controller.upload(image).await {
                info!("Accepted {} upload ({} bytes)", mime_type, image_bytes.len());
            }
        }
        Err(message) => {
            controller.reject_upload(message).await;
        }
    }
    Ok(Redirect::to("/"))
}

pub(crate) async fn toggle_handler(
    State(state): State<AppState>,
    active: ActiveSession,
    Path(id): Path<String>,
) -> Result<Redirect, ThemeboothError> {
    let theme = state
        .catalog
        .theme(&id)
        .ok_or_else(|| ThemeboothError::NotFound(format!("/themes/{id}/toggle")))?;
    let mut controller = active.controller.lock().await;
    if controller.toggle_theme(theme) == Toggle::Full {
        debug!("Selection full, ignoring {}", id);
    }
    Ok(Redirect::to("/"))
}

pub(crate) async fn gender_handler(
    active: ActiveSession,
    Form(form): Form<GenderForm>,
) -> Result<Redirect, ThemeboothError> {
    let gender = form
        .gender
        .parse::<Gender>()
        .map_err(|_| ThemeboothError::BadRequest)?;
    active.controller.lock().await.set_gender(gender).await;
    Ok(Redirect::to("/"))
}

pub(crate) async fn generate_handler(active: ActiveSession) -> Redirect {
    let mut controller = active.controller.lock().await;
    match controller.generate().await {
        Ok(Some(run)) => {
            info!("Starting run {}", run.token());
            tokio::spawn(run.execute());
        }
        Ok(None) => debug!("Run already in flight"),
        // the controller already holds the message for the page
        Err(_) => {}
    }
    Redirect::to("/")
}

pub(crate) async fn reset_handler(active: ActiveSession) -> Redirect {
    active.controller.lock().await.reset().await;
    Redirect::to("/")
}

pub(crate) async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes() -> Vec<u8> {
        let mut output = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4))
            .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
            .expect("encode png");
        output
    }

    #[test]
    fn uploads_must_decode_as_jpeg_or_png() {
        let image = inspect_upload(&png_bytes()).expect("png accepted");
        assert_eq!(image.mime_type(), "image/png");

        assert_eq!(inspect_upload(&[]).err(), Some(INVALID_UPLOAD_MESSAGE));
        assert_eq!(
            inspect_upload(b"This is not an image at all.").err(),
            Some(UNSUPPORTED_UPLOAD_MESSAGE)
        );
        // PNG signature followed by garbage
        let mut broken = png_bytes();
        broken.truncate(20);
        assert_eq!(inspect_upload(&broken).err(), Some(INVALID_UPLOAD_MESSAGE));
    }

    #[test]
    fn result_cards_follow_entry_state() {
        let pending = ResultCard::from_entry("A", &EntryState::Pending);
        assert_eq!(pending.status, "pending");
        let failed = ResultCard::from_entry(
            "A",
            &EntryState::Failed {
                message: "timeout".to_string(),
            },
        );
        assert_eq!(failed.status, "failed");
        assert_eq!(failed.error, "timeout");
    }
}
