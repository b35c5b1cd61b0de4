//! End-to-end router tests over an in-memory database and stub models

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use serde_json::{json, Value};

use super::build_router;
use super::middleware::AppState;
use crate::config::Config;
use crate::db::repositories::testing::setup_pool;
use crate::emotion::testing::{face_at, png_data_url, scores_for, stub_pipeline, FixedLocator, MissingModel};
use crate::emotion::EmotionPipeline;
use crate::models::Emotion;
use crate::services::email::RecordingMailer;
use crate::services::{AddSongRequest, LoginInput, Signer, SignupInput};

const PASSWORD: &str = "Password123";

struct TestApp {
    server: TestServer,
    state: AppState,
    mailer: Arc<RecordingMailer>,
}

async fn app_with(pipeline: EmotionPipeline) -> TestApp {
    let pool = setup_pool().await;
    let mut config = Config::default();
    config.admin.password = Some("AdminPass123".to_string());
    config.mail.public_base_url = "http://moodify.test".to_string();

    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(
        pool,
        config,
        Arc::new(pipeline),
        mailer.clone(),
        Signer::new("test-secret"),
    )
    .unwrap();
    state.user_service.ensure_admin(&state.config.admin).await.unwrap();

    let server = TestServer::new(build_router(state.clone(), "http://localhost:8080")).unwrap();
    TestApp {
        server,
        state,
        mailer,
    }
}

async fn app() -> TestApp {
    app_with(stub_pipeline(
        vec![face_at(10.0, 10.0)],
        vec![scores_for(Emotion::Happy, 0.9)],
    ))
    .await
}

impl TestApp {
    /// Sign up `username` and return a Bearer header for them
    async fn user(&self, username: &str) -> HeaderValue {
        let user = self
            .state
            .user_service
            .signup(SignupInput::new(
                "Test User",
                username,
                format!("{}@example.com", username),
                PASSWORD,
                PASSWORD,
            ))
            .await
            .unwrap();
        let session = self.state.user_service.start_session(user.id).await.unwrap();
        self.bearer(&session.id)
    }

    async fn admin(&self) -> HeaderValue {
        let (_, session) = self
            .state
            .user_service
            .login(LoginInput::new("admin", "AdminPass123"))
            .await
            .unwrap();
        self.bearer(&session.id)
    }

    fn bearer(&self, session_id: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {}", self.state.signer.sign(session_id))).unwrap()
    }

    async fn song(&self, title: &str, emotion: &str, language: &str) -> i64 {
        self.state
            .song_service
            .add(AddSongRequest {
                title: title.to_string(),
                artist: "Artist".to_string(),
                url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
                emotion: emotion.to_string(),
                language: Some(language.to_string()),
            })
            .await
            .unwrap()
            .id
    }
}

fn auth() -> HeaderName {
    header::AUTHORIZATION
}

fn location(response: &TestResponse) -> String {
    response
        .headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

/// `name=value` part of a Set-Cookie header
fn cookie_pair(response: &TestResponse) -> HeaderValue {
    let set_cookie = &response.headers()[header::SET_COOKIE];
    let pair = set_cookie.to_str().unwrap().split(';').next().unwrap().to_string();
    HeaderValue::from_str(&pair).unwrap()
}

// ============================================================================
// Auth flows
// ============================================================================

#[tokio::test]
async fn test_root_redirects_anonymous_visitor_to_login() {
    let app = app().await;
    let response = app.server.get("/").await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = app.server.get("/welcome").await;
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_signup_signs_in_and_sends_to_language_picker() {
    let app = app().await;
    let response = app
        .server
        .post("/signup")
        .form(&[
            ("name", "Asha"),
            ("username", "asha"),
            ("email", "asha@example.com"),
            ("password", PASSWORD),
            ("confirm_password", PASSWORD),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/language");

    let cookie = cookie_pair(&response);
    assert!(cookie.to_str().unwrap().starts_with("moodify_session="));

    let page = app
        .server
        .get("/language")
        .add_header(header::COOKIE, cookie)
        .await;
    assert_eq!(page.status_code(), StatusCode::OK);
    assert!(page.text().contains("Tamil"));
}

#[tokio::test]
async fn test_signup_rejects_duplicate_username() {
    let app = app().await;
    app.user("asha").await;
    let response = app
        .server
        .post("/signup")
        .form(&[
            ("name", "Other"),
            ("username", "asha"),
            ("email", "other@example.com"),
            ("password", PASSWORD),
            ("confirm_password", PASSWORD),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert!(response.text().contains("other@example.com"));
}

#[tokio::test]
async fn test_login_lands_admin_on_dashboard() {
    let app = app().await;
    let response = app
        .server
        .post("/login")
        .form(&[("username", "admin"), ("password", "AdminPass123")])
        .await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin");
}

#[tokio::test]
async fn test_login_failures_are_rate_limited_per_identifier() {
    let app = app().await;
    app.user("asha").await;

    for _ in 0..5 {
        let response = app
            .server
            .post("/login")
            .form(&[("username", "asha"), ("password", "wrong-password")])
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        assert!(response.text().contains("Invalid username or password"));
    }

    let response = app
        .server
        .post("/login")
        .form(&[("username", "asha"), ("password", PASSWORD)])
        .await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = app().await;
    let token = app.user("asha").await;

    let response = app.server.get("/logout").add_header(auth(), token.clone()).await;
    assert_eq!(location(&response), "/login");
    assert!(response
        .headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .contains("Max-Age=0"));

    let response = app.server.get("/get_language_preferences").add_header(auth(), token).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_password_reset_round_trip() {
    let app = app().await;
    app.user("asha").await;

    let response = app
        .server
        .post("/forgot_password")
        .form(&[("email", "asha@example.com")])
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("a reset link is on its way"));

    // Unknown addresses get the same answer and no mail
    let response = app
        .server
        .post("/forgot_password")
        .form(&[("email", "nobody@example.com")])
        .await;
    assert!(response.text().contains("a reset link is on its way"));

    let body = {
        let sent = app.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        sent[0].body.clone()
    };
    let token: String = body
        .split("/reset_password/")
        .nth(1)
        .unwrap()
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect();

    let page = app.server.get(&format!("/reset_password/{}", token)).await;
    assert_eq!(page.status_code(), StatusCode::OK);

    let response = app
        .server
        .post(&format!("/reset_password/{}", token))
        .form(&[("password", "NewPassword456"), ("confirm_password", "NewPassword456")])
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("Your password has been updated"));

    // Tokens are single use
    let page = app.server.get(&format!("/reset_password/{}", token)).await;
    assert_eq!(page.status_code(), StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/login")
        .form(&[("username", "asha"), ("password", "NewPassword456")])
        .await;
    assert_eq!(location(&response), "/welcome");
}

// ============================================================================
// Detection and recommendations
// ============================================================================

#[tokio::test]
async fn test_json_endpoints_require_login() {
    let app = app().await;
    let response = app
        .server
        .post("/process_emotion")
        .json(&json!({ "image": png_data_url(64) }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_process_emotion_recommends_and_records_history() {
    let app = app().await;
    let token = app.user("asha").await;
    app.song("Walking on Sunshine", "Happy", "English").await;
    app.song("Hurt", "Sad", "English").await;

    let response = app
        .server
        .post("/process_emotion")
        .add_header(auth(), token.clone())
        .json(&json!({ "image": png_data_url(64) }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["dominant_emotion"], "Happy");
    assert_eq!(body["detections"].as_array().unwrap().len(), 1);
    let titles: Vec<&str> = body["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Walking on Sunshine"]);

    let response = app
        .server
        .get("/get_user_activity")
        .add_header(auth(), token)
        .await;
    let body: Value = response.json();
    assert_eq!(body["activities"].as_array().unwrap().len(), 1);
    assert_eq!(body["activities"][0]["emotion"], "Happy");
    assert_eq!(body["has_more"], false);
}

#[tokio::test]
async fn test_process_emotion_failures_leave_no_history() {
    let app = app_with(stub_pipeline(vec![], vec![scores_for(Emotion::Happy, 0.9)])).await;
    let token = app.user("asha").await;

    let response = app
        .server
        .post("/process_emotion")
        .add_header(auth(), token.clone())
        .json(&json!({ "image": png_data_url(64) }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "NO_FACES_DETECTED");

    let response = app
        .server
        .post("/process_emotion")
        .add_header(auth(), token.clone())
        .json(&json!({ "image": "data:image/png;base64,not-an-image" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/process_emotion")
        .add_header(auth(), token.clone())
        .json(&json!({ "image": "" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let body: Value = app
        .server
        .get("/get_user_activity")
        .add_header(auth(), token)
        .await
        .json();
    assert!(body["activities"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_model_is_service_unavailable() {
    let pipeline = EmotionPipeline::new(
        Arc::new(MissingModel),
        Arc::new(crate::emotion::testing::ScriptedClassifier::new(vec![scores_for(
            Emotion::Happy,
            0.9,
        )])),
        5 * 1024 * 1024,
    );
    let app = app_with(pipeline).await;
    let token = app.user("asha").await;

    let response = app
        .server
        .post("/process_emotion")
        .add_header(auth(), token)
        .json(&json!({ "image": png_data_url(64) }))
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["code"], "MODEL_UNAVAILABLE");
}

#[tokio::test]
async fn test_get_songs_respects_language_preferences() {
    let app = app().await;
    let token = app.user("asha").await;
    app.song("English Happy", "Happy", "English").await;
    app.song("Tamil Happy", "Happy", "Tamil").await;

    let response = app
        .server
        .post("/save_language_preferences")
        .add_header(auth(), token.clone())
        .json(&json!({ "languages": ["tamil"] }))
        .await;
    assert_eq!(response.json::<Value>()["languages"], json!(["Tamil"]));

    let body: Value = app
        .server
        .get("/get_songs/Happy")
        .add_header(auth(), token.clone())
        .await
        .json();
    assert_eq!(body["songs"].as_array().unwrap().len(), 1);
    assert_eq!(body["songs"][0]["title"], "Tamil Happy");

    // Clearing the preferences removes the filter
    app.server
        .post("/update_language_preferences")
        .add_header(auth(), token.clone())
        .json(&json!({ "languages": [] }))
        .await;
    let body: Value = app
        .server
        .get("/get_songs/Happy")
        .add_header(auth(), token.clone())
        .await
        .json();
    assert_eq!(body["songs"].as_array().unwrap().len(), 2);

    let response = app
        .server
        .get("/get_songs/Grumpy")
        .add_header(auth(), token)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_song_selection_shows_in_history_page() {
    let app = app().await;
    let token = app.user("asha").await;
    let song_id = app.song("Walking on Sunshine", "Happy", "English").await;

    let response = app
        .server
        .post("/save_song_selection")
        .add_header(auth(), token.clone())
        .json(&json!({ "emotion": "Happy", "song_id": song_id }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = app
        .server
        .post("/save_song_selection")
        .add_header(auth(), token.clone())
        .json(&json!({ "emotion": "Happy", "song_id": 9999 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let page = app.server.get("/user_history").add_header(auth(), token).await;
    assert_eq!(page.status_code(), StatusCode::OK);
    assert!(page.text().contains("Walking on Sunshine"));
}

#[tokio::test]
async fn test_recommendations_page_renders_songs() {
    let app = app().await;
    let token = app.user("asha").await;
    app.song("Hurt", "Sad", "English").await;

    let page = app
        .server
        .get("/recommendations?emotion=Sad")
        .add_header(auth(), token)
        .await;
    assert_eq!(page.status_code(), StatusCode::OK);
    let html = page.text();
    assert!(html.contains("Hurt"));
    assert!(html.contains("youtube.com/embed/dQw4w9WgXcQ"));
}

#[cfg(not(feature = "camera"))]
#[tokio::test]
async fn test_video_feed_unavailable_without_camera_support() {
    let app = app().await;
    let token = app.user("asha").await;
    let response = app.server.get("/video_feed").add_header(auth(), token).await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// Account
// ============================================================================

#[tokio::test]
async fn test_profile_and_password_updates() {
    let app = app().await;
    let token = app.user("asha").await;

    let response = app
        .server
        .post("/update_profile")
        .add_header(auth(), token.clone())
        .json(&json!({ "name": "Asha R", "email": "asha.r@example.com" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["email"], "asha.r@example.com");

    let response = app
        .server
        .post("/update_password")
        .add_header(auth(), token.clone())
        .json(&json!({ "current_password": "nope-nope", "new_password": "NewPassword456" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "Current password is incorrect");

    let response = app
        .server
        .post("/update_password")
        .add_header(auth(), token)
        .json(&json!({ "current_password": PASSWORD, "new_password": "NewPassword456" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_profile_picture_upload_and_fetch() {
    let app = app().await;
    let token = app.user("asha").await;

    let response = app.server.get("/profile_picture").add_header(auth(), token.clone()).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = app
        .server
        .post("/update_profile_picture")
        .add_header(auth(), token.clone())
        .json(&json!({ "image": png_data_url(16) }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = app.server.get("/profile_picture").add_header(auth(), token).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn test_download_user_data_is_an_attachment() {
    let app = app().await;
    let token = app.user("asha").await;
    app.server
        .post("/save_language_preferences")
        .add_header(auth(), token.clone())
        .json(&json!({ "languages": ["Hindi"] }))
        .await;

    let response = app.server.get("/download_user_data").add_header(auth(), token).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response
        .headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("moodify_user_data.json"));
    let body: Value = response.json();
    assert_eq!(body["profile"]["username"], "asha");
    assert!(body["profile"].get("password_hash").is_none());
    assert_eq!(body["language_preferences"], json!(["Hindi"]));
}

#[tokio::test]
async fn test_clear_history_and_delete_account() {
    let app = app().await;
    let token = app.user("asha").await;

    app.server
        .post("/process_emotion")
        .add_header(auth(), token.clone())
        .json(&json!({ "image": png_data_url(64) }))
        .await;
    let response = app
        .server
        .post("/clear_activity_history")
        .add_header(auth(), token.clone())
        .await;
    assert_eq!(response.json::<Value>()["removed"], 1);

    let response = app.server.post("/delete_account").add_header(auth(), token.clone()).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response
        .headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .contains("Max-Age=0"));

    let response = app.server.get("/get_language_preferences").add_header(auth(), token).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn test_admin_routes_reject_regular_users() {
    let app = app().await;
    let token = app.user("asha").await;

    let response = app
        .server
        .post("/admin/add_song")
        .add_header(auth(), token.clone())
        .json(&json!({ "title": "x", "artist": "y", "url": "https://a.b", "emotion": "Happy" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let page = app.server.get("/admin").add_header(auth(), token).await;
    assert_eq!(page.status_code(), StatusCode::FORBIDDEN);
    assert!(page.text().contains("You do not have access to this page."));
}

#[tokio::test]
async fn test_admin_manages_catalog() {
    let app = app().await;
    let token = app.admin().await;

    let response = app
        .server
        .post("/admin/add_song")
        .add_header(auth(), token.clone())
        .json(&json!({
            "title": "Lovely Day",
            "artist": "Bill Withers",
            "url": "https://open.spotify.com/track/0bRXwKfigvpKZUurwqAlEh?si=abc",
            "emotion": "Happy",
            "language": "English"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let song_id = response.json::<Value>()["song_id"].as_i64().unwrap();

    let response = app
        .server
        .post("/admin/add_song")
        .add_header(auth(), token.clone())
        .json(&json!({ "title": "", "artist": "y", "url": "https://a.b", "emotion": "Happy" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let body: Value = app
        .server
        .get("/admin/songs_data")
        .add_header(auth(), token.clone())
        .await
        .json();
    assert_eq!(body["songs"]["Happy"][0]["title"], "Lovely Day");

    let page = app.server.get("/admin/songs").add_header(auth(), token.clone()).await;
    assert_eq!(page.status_code(), StatusCode::OK);
    assert!(page.text().contains("Lovely Day"));

    let body: Value = app
        .server
        .get("/admin/get_dashboard_stats")
        .add_header(auth(), token.clone())
        .await
        .json();
    assert_eq!(body["success"], true);
    assert_eq!(body["song_count"], 1);
    assert_eq!(body["user_count"], 1);

    let response = app
        .server
        .delete(&format!("/admin/delete_song/{}", song_id))
        .add_header(auth(), token.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = app
        .server
        .delete(&format!("/admin/delete_song/{}", song_id))
        .add_header(auth(), token)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_dashboard_page_renders() {
    let app = app().await;
    let token = app.admin().await;
    let page = app.server.get("/admin").add_header(auth(), token).await;
    assert_eq!(page.status_code(), StatusCode::OK);
    assert!(page.text().contains("Detections"));
}

#[tokio::test]
async fn test_static_assets_are_public() {
    let app = app().await;
    let response = app.server.get("/static/css/style.css").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
}

#[tokio::test]
async fn test_process_emotion_reports_every_face() {
    let pipeline = EmotionPipeline::new(
        Arc::new(FixedLocator(vec![face_at(0.0, 0.0), face_at(20.0, 20.0)])),
        Arc::new(crate::emotion::testing::ScriptedClassifier::new(vec![
            scores_for(Emotion::Sad, 0.6),
            scores_for(Emotion::Sad, 0.7),
        ])),
        5 * 1024 * 1024,
    );
    let app = app_with(pipeline).await;
    let token = app.user("asha").await;
    let body: Value = app
        .server
        .post("/process_emotion")
        .add_header(auth(), token)
        .json(&json!({ "image": png_data_url(64) }))
        .await
        .json();
    assert_eq!(body["dominant_emotion"], "Sad");
    assert_eq!(body["detections"].as_array().unwrap().len(), 2);
}

fn oversized_data_url(bytes: usize) -> String {
    format!(
        "data:image/png;base64,{}",
        data_encoding::BASE64.encode(&vec![0u8; bytes])
    )
}

#[tokio::test]
async fn test_malformed_json_bodies_get_json_errors() {
    let app = app().await;
    let token = app.user("asha").await;

    let response = app
        .server
        .post("/process_emotion")
        .add_header(auth(), token.clone())
        .bytes(axum::body::Bytes::from_static(b"{not json"))
        .content_type("application/json")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let response = app
        .server
        .post("/save_song_selection")
        .add_header(auth(), token.clone())
        .json(&json!({ "emotion": "Happy" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");

    let response = app
        .server
        .post("/update_profile")
        .add_header(auth(), token.clone())
        .text("name=asha")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");

    let response = app
        .server
        .get("/get_user_activity?page=abc")
        .add_header(auth(), token)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_oversized_images_are_payload_too_large() {
    let app = app().await;
    let token = app.user("asha").await;
    let limit = app.state.config.detection.max_image_bytes;

    for path in ["/process_emotion", "/update_profile_picture"] {
        // Just over the limit passes the body cap and fails the decoded size check
        let response = app
            .server
            .post(path)
            .add_header(auth(), token.clone())
            .json(&json!({ "image": oversized_data_url(limit + 1024) }))
            .await;
        assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE, "{path}");
        assert_eq!(response.json::<Value>()["code"], "PAYLOAD_TOO_LARGE", "{path}");

        // Far over the limit is cut off by the body cap
        let response = app
            .server
            .post(path)
            .add_header(auth(), token.clone())
            .json(&json!({ "image": oversized_data_url(limit * 4) }))
            .await;
        assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE, "{path}");
        assert_eq!(response.json::<Value>()["code"], "PAYLOAD_TOO_LARGE", "{path}");
    }

    let body: Value = app
        .server
        .get("/get_user_activity")
        .add_header(auth(), token)
        .await
        .json();
    assert!(body["activities"].as_array().unwrap().is_empty());
}
