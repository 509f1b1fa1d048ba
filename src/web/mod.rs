//! HTTP front end: one page, a polling endpoint and the form posts.

use std::collections::HashMap;
use std::num::NonZeroU16;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use sea_orm::DatabaseConnection;
use tokio::sync::RwLock;
use tower_http::limit::RequestBodyLimitLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::{debug, error, info};

use crate::catalog::ThemeCatalog;
use crate::constants::SESSION_INACTIVITY_SECONDS;
use crate::generation::GenerationClient;
use crate::session::{PreviewRegistry, SessionController};

mod middleware;
pub(crate) mod prelude;
mod views;

use prelude::{Arc, Mutex};
use views::{
    gender_handler, generate_handler, home_handler, preview_handler, reset_handler,
    results_handler, styles_handler, toggle_handler, upload_handler,
};

/// How often idle controllers are swept.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

struct ControllerSlot {
    controller: Arc<Mutex<SessionController>>,
    last_seen: Instant,
}

type ControllerMap = HashMap<String, ControllerSlot>;

#[derive(Clone)]
pub(crate) struct AppState {
    db: Arc<DatabaseConnection>,
    catalog: &'static ThemeCatalog,
    client: Arc<dyn GenerationClient>,
    previews: PreviewRegistry,
    sessions: Arc<RwLock<ControllerMap>>,
    max_upload_bytes: usize,
}

impl AppState {
    fn new(
        db: DatabaseConnection,
        catalog: &'static ThemeCatalog,
        client: Arc<dyn GenerationClient>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            db: Arc::new(db),
            catalog,
            client,
            previews: PreviewRegistry::new(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_upload_bytes,
        }
    }

    /// Controller for `key`, created on first use. Marks it as seen.
    async fn controller_for(&self, key: &str) -> Arc<Mutex<SessionController>> {
        let mut sessions = self.sessions.write().await;
        let slot = sessions
            .entry(key.to_string())
            .or_insert_with(|| ControllerSlot {
                controller: Arc::new(Mutex::new(SessionController::new(
                    self.client.clone(),
                    self.previews.clone(),
                ))),
                last_seen: Instant::now(),
            });
        slot.last_seen = Instant::now();
        slot.controller.clone()
    }

    /// Drops controllers unseen for longer than `max_idle`, which releases
    /// their uploads and previews. Controllers in use or with a run in
    /// flight are kept. Returns how many were dropped.
    async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (key, slot) in sessions.iter() {
            if now.duration_since(slot.last_seen) <= max_idle {
                continue;
            }
            let Ok(controller) = slot.controller.try_lock() else {
                continue;
            };
            if !controller.is_running().await {
                expired.push(key.clone());
            }
        }
        for key in &expired {
            sessions.remove(key);
        }
        if !expired.is_empty() {
            debug!(
                "Evicted {} idle session(s), {} left",
                expired.len(),
                sessions.len()
            );
        }
        expired.len()
    }
}

/// Periodically drops controllers whose browser session has expired.
async fn evict_idle_sessions(state: AppState) {
    let max_idle = Duration::from_secs(SESSION_INACTIVITY_SECONDS.unsigned_abs());
    let mut interval = tokio::time::interval(EVICTION_INTERVAL);
    loop {
        interval.tick().await;
        state.evict_idle(max_idle).await;
    }
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(home_handler))
        .route("/results", get(results_handler))
        .route("/preview/{id}", get(preview_handler))
        .route("/static/styles.css", get(styles_handler))
        .route("/upload", post(upload_handler))
        .route("/themes/{id}/toggle", post(toggle_handler))
        .route("/gender", post(gender_handler))
        .route("/generate", post(generate_handler))
        .route("/reset", post(reset_handler))
}

fn build_app(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(
            SESSION_INACTIVITY_SECONDS,
        )));
    let max_upload_bytes = state.max_upload_bytes;

    create_router()
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(session_layer)
        .with_state(state)
}

/// Binds `listen_addr:port` and serves until the listener fails.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    db: DatabaseConnection,
    catalog: &'static ThemeCatalog,
    client: Arc<dyn GenerationClient>,
    max_upload_bytes: usize,
) -> Result<(), anyhow::Error> {
    let state = AppState::new(db, catalog, client, max_upload_bytes);
    tokio::spawn(evict_idle_sessions(state.clone()));
    let app = build_app(state);

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use sea_orm_migration::MigratorTrait;
    use tower::ServiceExt;

    use crate::constants::{MAX_SELECTED_THEMES, TEST_THEME_ID, UNKNOWN_GENERATION_ERROR};
    use crate::db::entities::visits::current_visits;
    use crate::generation::{EchoClient, GenerationError, SourceImage};

    const BOUNDARY: &str = "themebooth-test-boundary";

    struct FailingClient;

    #[async_trait::async_trait]
    impl GenerationClient for FailingClient {
        async fn generate(
            &self,
            _image: &SourceImage,
            _prompt: &str,
        ) -> Result<String, GenerationError> {
            Err(GenerationError::Unknown)
        }
    }

    async fn setup_state_with(client: Arc<dyn GenerationClient>) -> AppState {
        let db = crate::db::connect_test_db()
            .await
            .expect("connect test db");
        crate::db::migrations::Migrator::up(&db, None)
            .await
            .expect("run migrations");
        let catalog = crate::catalog::init().expect("load catalog");
        AppState::new(db, catalog, client, 1024 * 1024)
    }

    async fn setup_state() -> AppState {
        setup_state_with(Arc::new(EchoClient)).await
    }

    async fn read_body(response: axum::response::Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    fn png_bytes() -> Vec<u8> {
        let mut output = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4))
            .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)
            .expect("encode png");
        output
    }

    fn get(uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    fn post_form(uri: &str, cookie: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(COOKIE, cookie)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_upload(cookie: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(COOKIE, cookie)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    /// Opens a session and returns its cookie.
    async fn start_session(app: &Router) -> String {
        let request = Request::builder()
            .method("GET")
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .expect("session cookie")
            .to_string()
    }

    async fn expect_redirect(app: &Router, request: Request<Body>) {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/");
    }

    async fn results_json(app: &Router, cookie: &str) -> serde_json::Value {
        let response = app.clone().oneshot(get("/results", cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_str(&read_body(response).await).expect("results json")
    }

    async fn wait_for_run(app: &Router, cookie: &str) -> serde_json::Value {
        for _ in 0..200 {
            let value = results_json(app, cookie).await;
            if value["loading"] == false {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run never finished");
    }

    async fn home(app: &Router, cookie: &str) -> String {
        let response = app.clone().oneshot(get("/", cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        read_body(response).await
    }

    #[tokio::test]
    async fn homepage_lists_catalog_and_visit_number() {
        let state = setup_state().await;
        let app = build_app(state);
        let cookie = start_session(&app).await;

        let body = home(&app, &cookie).await;
        assert!(body.contains("Trending"));
        assert!(body.contains(&format!("/themes/{TEST_THEME_ID}/toggle")));
        assert!(body.contains("class=\"visit-number\">#1<"));
        assert!(body.contains("value=\"unspecified\""));
        assert!(body.contains("Khác"));
    }

    #[tokio::test]
    async fn visits_are_counted_once_per_session() {
        let state = setup_state().await;
        let db = state.db.clone();
        let app = build_app(state);

        let first = start_session(&app).await;
        for _ in 0..3 {
            home(&app, &first).await;
        }
        assert_eq!(current_visits(&db).await.expect("read visits"), 1);

        let second = start_session(&app).await;
        assert_ne!(first, second);
        assert!(
            home(&app, &second)
                .await
                .contains("class=\"visit-number\">#2<")
        );
        assert_eq!(current_visits(&db).await.expect("read visits"), 2);
    }

    #[tokio::test]
    async fn full_run_through_the_router() {
        let state = setup_state().await;
        let previews = state.previews.clone();
        let app = build_app(state);
        let cookie = start_session(&app).await;

        expect_redirect(&app, post_upload(&cookie, &png_bytes())).await;
        assert_eq!(previews.len(), 1);
        assert_eq!(results_json(&app, &cookie).await["state"], "gender_pending");

        expect_redirect(&app, post_form("/gender", &cookie, "gender=female")).await;
        expect_redirect(
            &app,
            post_form(&format!("/themes/{TEST_THEME_ID}/toggle"), &cookie, ""),
        )
        .await;
        assert_eq!(results_json(&app, &cookie).await["state"], "ready");

        let body = home(&app, &cookie).await;
        let start = body.find("/preview/").expect("preview url on page");
        let preview_url = &body[start..start + "/preview/".len() + 32];
        let response = app.clone().oneshot(get(preview_url, &cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "image/png");

        expect_redirect(&app, post_form("/generate", &cookie, "")).await;
        let value = wait_for_run(&app, &cookie).await;
        let entry = &value["results"][TEST_THEME_ID];
        assert_eq!(entry["status"], "done");
        assert!(
            entry["imageRef"]
                .as_str()
                .expect("image ref")
                .starts_with("data:image/png;base64,")
        );

        expect_redirect(&app, post_form("/reset", &cookie, "")).await;
        let value = results_json(&app, &cookie).await;
        assert_eq!(value["state"], "idle");
        assert_eq!(value["results"], serde_json::json!({}));
        assert!(previews.is_empty());
        let response = app.clone().oneshot(get(preview_url, &cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_generation_shows_generic_message() {
        let state = setup_state_with(Arc::new(FailingClient)).await;
        let app = build_app(state);
        let cookie = start_session(&app).await;

        expect_redirect(&app, post_upload(&cookie, &png_bytes())).await;
        expect_redirect(&app, post_form("/gender", &cookie, "gender=male")).await;
        expect_redirect(
            &app,
            post_form(&format!("/themes/{TEST_THEME_ID}/toggle"), &cookie, ""),
        )
        .await;
        expect_redirect(&app, post_form("/generate", &cookie, "")).await;

        let value = wait_for_run(&app, &cookie).await;
        assert_eq!(value["results"][TEST_THEME_ID]["status"], "failed");
        assert_eq!(
            value["results"][TEST_THEME_ID]["error"],
            UNKNOWN_GENERATION_ERROR
        );
        assert!(home(&app, &cookie).await.contains(UNKNOWN_GENERATION_ERROR));
    }

    #[tokio::test]
    async fn generate_without_image_shows_error() {
        let state = setup_state().await;
        let app = build_app(state);
        let cookie = start_session(&app).await;

        expect_redirect(&app, post_form("/generate", &cookie, "")).await;
        let value = results_json(&app, &cookie).await;
        assert_eq!(value["loading"], false);
        assert_eq!(value["results"], serde_json::json!({}));
        assert!(home(&app, &cookie).await.contains("Vui lòng tải ảnh lên."));
    }

    #[tokio::test]
    async fn invalid_upload_is_reported_on_the_page() {
        let state = setup_state().await;
        let previews = state.previews.clone();
        let app = build_app(state);
        let cookie = start_session(&app).await;

        expect_redirect(&app, post_upload(&cookie, b"definitely not a photo")).await;
        assert!(previews.is_empty());
        assert!(
            home(&app, &cookie)
                .await
                .contains(crate::constants::UNSUPPORTED_UPLOAD_MESSAGE)
        );
    }

    #[tokio::test]
    async fn selection_stops_at_the_limit() {
        let state = setup_state().await;
        let ids = state
            .catalog
            .categories()
            .iter()
            .flat_map(|category| category.themes.iter())
            .take(MAX_SELECTED_THEMES + 1)
            .map(|theme| theme.id.clone())
            .collect::<Vec<_>>();
        let sessions = state.sessions.clone();
        let app = build_app(state);
        let cookie = start_session(&app).await;

        for id in &ids {
            expect_redirect(
                &app,
                post_form(&format!("/themes/{id}/toggle"), &cookie, ""),
            )
            .await;
        }

        let sessions = sessions.read().await;
        assert_eq!(sessions.len(), 1);
        let controller = sessions
            .values()
            .next()
            .expect("controller")
            .controller
            .lock()
            .await;
        assert_eq!(controller.selection().len(), MAX_SELECTED_THEMES);
        assert!(!controller.selection().contains(&ids[MAX_SELECTED_THEMES]));
    }

    fn preview_url_in(body: &str) -> String {
        let start = body.find("/preview/").expect("preview url on page");
        body[start..start + "/preview/".len() + 32].to_string()
    }

    #[tokio::test]
    async fn previews_are_private_to_their_session() {
        let state = setup_state().await;
        let app = build_app(state);
        let owner = start_session(&app).await;
        let other = start_session(&app).await;

        expect_redirect(&app, post_upload(&owner, &png_bytes())).await;
        let preview_url = preview_url_in(&home(&app, &owner).await);

        let response = app.clone().oneshot(get(&preview_url, &owner)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(get(&preview_url, &other)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_and_release_previews() {
        let state = setup_state().await;
        let previews = state.previews.clone();
        let sessions = state.sessions.clone();
        let app = build_app(state.clone());

        let mut cookies = Vec::new();
        let mut preview_urls = Vec::new();
        for _ in 0..3 {
            let cookie = start_session(&app).await;
            expect_redirect(&app, post_upload(&cookie, &png_bytes())).await;
            preview_urls.push(preview_url_in(&home(&app, &cookie).await));
            cookies.push(cookie);
        }
        assert_eq!(sessions.read().await.len(), 3);
        assert_eq!(previews.len(), 3);

        assert_eq!(state.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(previews.len(), 3);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.evict_idle(Duration::ZERO).await, 3);
        assert!(sessions.read().await.is_empty());
        assert!(previews.is_empty());

        for (cookie, preview_url) in cookies.iter().zip(&preview_urls) {
            let response = app.clone().oneshot(get(preview_url, cookie)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn running_sessions_survive_eviction() {
        let state = setup_state().await;
        let controller = state.controller_for("busy").await;
        {
            let mut controller = controller.lock().await;
            controller.upload(SourceImage::new(png_bytes(), "image/png")).await;
            controller.set_gender(crate::prompt::Gender::Male).await;
            controller.toggle_theme(state.catalog.theme(TEST_THEME_ID).expect("test theme"));
            let run = controller
                .generate()
                .await
                .expect("valid inputs")
                .expect("no run in flight");
            // left unexecuted so the run stays in flight
            drop(run);
            assert!(controller.is_running().await);
        }
        state.controller_for("idle").await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.evict_idle(Duration::ZERO).await, 1);
        let sessions = state.sessions.read().await;
        assert!(sessions.contains_key("busy"));
        assert!(!sessions.contains_key("idle"));
    }

    #[tokio::test]
    async fn unknown_theme_and_bad_gender_are_rejected() {
        let state = setup_state().await;
        let app = build_app(state);
        let cookie = start_session(&app).await;

        let response = app
            .clone()
            .oneshot(post_form("/themes/no-such-theme/toggle", &cookie, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(post_form("/gender", &cookie, "gender=undeclared"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(get("/preview/nothing-here", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn styles_are_served() {
        let state = setup_state().await;
        let app = build_app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/static/styles.css")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/css");
    }
}
