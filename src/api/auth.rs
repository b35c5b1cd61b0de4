//! Authentication pages
//!
//! Handles the HTML form flows:
//! - GET/POST /login - log in by username or email
//! - GET/POST /signup - create an account, then pick languages
//! - GET /logout - end the session
//! - GET/POST /forgot_password - request a reset link
//! - GET/POST /reset_password/{token} - choose a new password

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension, Form, Router,
};
use serde::Deserialize;

use crate::api::middleware::{AppState, ClientIp};
use crate::api::pages::{error_page, landing_path, page_context, render, render_with_status};
use crate::services::reset::DELIVERY_FAILED_MESSAGE;
use crate::services::{
    LoginInput, ResetError, ResetRequestOutcome, SignupInput, UserServiceError,
};

const INVALID_CREDENTIALS: &str = "Invalid username or password";
const TOO_MANY_ATTEMPTS: &str = "Too many login attempts. Please try again later.";
const RESET_SENT: &str = "If an account exists for that email, a reset link is on its way.";
const PASSWORD_UPDATED: &str = "Your password has been updated. Please log in.";

/// Build the auth router (no authentication required)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/signup", get(signup_page).post(signup))
        .route("/logout", get(logout))
        .route("/forgot_password", get(forgot_password_page).post(forgot_password))
        .route(
            "/reset_password/{token}",
            get(reset_password_page).post(reset_password),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForgotPasswordForm {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetPasswordForm {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

fn login_form(
    state: &AppState,
    status: StatusCode,
    username: &str,
    error: Option<&str>,
    notice: Option<&str>,
) -> Response {
    let mut ctx = page_context(None);
    ctx.insert("form", &serde_json::json!({ "username": username }));
    ctx.insert("error", &error);
    ctx.insert("notice", &notice);
    render_with_status(state, status, "login.html", &ctx)
}

/// GET /login
async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(user) = state.current_user(&headers).await {
        return Redirect::to(landing_path(&user)).into_response();
    }
    login_form(&state, StatusCode::OK, "", None, None)
}

/// POST /login
///
/// Rate limited per client IP (10 per minute) and per identifier
/// (5 failures per 15 minutes).
async fn login(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    Form(form): Form<LoginForm>,
) -> Response {
    let identifier = form.username.trim().to_string();

    if let Some(ip) = ip {
        if state.rate_limiter.is_ip_limited(ip).await {
            tracing::warn!(%ip, "login rate limit hit for client");
            return login_form(&state, StatusCode::TOO_MANY_REQUESTS, &identifier, Some(TOO_MANY_ATTEMPTS), None);
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    if state.rate_limiter.is_identifier_limited(&identifier).await {
        tracing::warn!(identifier = %identifier, "login rate limit hit for identifier");
        return login_form(&state, StatusCode::TOO_MANY_REQUESTS, &identifier, Some(TOO_MANY_ATTEMPTS), None);
    }

    match state
        .user_service
        .login(LoginInput::new(identifier.clone(), form.password))
        .await
    {
        Ok((user, session)) => {
            state.rate_limiter.clear_identifier(&identifier).await;
            (
                [(header::SET_COOKIE, state.session_cookie(&session.id))],
                Redirect::to(landing_path(&user)),
            )
                .into_response()
        }
        Err(UserServiceError::AuthenticationError(_)) | Err(UserServiceError::ValidationError(_)) => {
            state.rate_limiter.record_failed_attempt(&identifier).await;
            login_form(&state, StatusCode::UNAUTHORIZED, &identifier, Some(INVALID_CREDENTIALS), None)
        }
        Err(e) => error_page(&state, None, e),
    }
}

fn signup_form(state: &AppState, status: StatusCode, form: &SignupForm, error: Option<&str>) -> Response {
    let mut ctx = page_context(None);
    ctx.insert(
        "form",
        &serde_json::json!({ "name": form.name, "username": form.username, "email": form.email }),
    );
    ctx.insert("error", &error);
    render_with_status(state, status, "signup.html", &ctx)
}

/// GET /signup
async fn signup_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(user) = state.current_user(&headers).await {
        return Redirect::to(landing_path(&user)).into_response();
    }
    signup_form(&state, StatusCode::OK, &SignupForm::default(), None)
}

/// POST /signup - on success the new user is signed in and sent to the
/// language picker
async fn signup(State(state): State<AppState>, Form(form): Form<SignupForm>) -> Response {
    let input = SignupInput::new(
        form.name.clone(),
        form.username.clone(),
        form.email.clone(),
        form.password.clone(),
        form.confirm_password.clone(),
    );

    let user = match state.user_service.signup(input).await {
        Ok(user) => user,
        Err(UserServiceError::ValidationError(msg)) => {
            return signup_form(&state, StatusCode::BAD_REQUEST, &form, Some(&msg))
        }
        Err(UserServiceError::UserExists(msg)) => {
            return signup_form(&state, StatusCode::CONFLICT, &form, Some(&msg))
        }
        Err(e) => return error_page(&state, None, e),
    };

    match state.user_service.start_session(user.id).await {
        Ok(session) => (
            [(header::SET_COOKIE, state.session_cookie(&session.id))],
            Redirect::to("/language"),
        )
            .into_response(),
        Err(e) => error_page(&state, None, e),
    }
}

/// GET /logout
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(session_id) = state.session_id(&headers) {
        if let Err(e) = state.user_service.logout(&session_id).await {
            tracing::warn!(error = %e, "failed to delete session on logout");
        }
    }
    (
        [(header::SET_COOKIE, state.clear_session_cookie())],
        Redirect::to("/login"),
    )
        .into_response()
}

fn forgot_form(
    state: &AppState,
    status: StatusCode,
    email: &str,
    error: Option<&str>,
    notice: Option<&str>,
) -> Response {
    let mut ctx = page_context(None);
    ctx.insert("form", &serde_json::json!({ "email": email }));
    ctx.insert("error", &error);
    ctx.insert("notice", &notice);
    render_with_status(state, status, "forgot_password.html", &ctx)
}

/// GET /forgot_password
async fn forgot_password_page(State(state): State<AppState>) -> Response {
    forgot_form(&state, StatusCode::OK, "", None, None)
}

/// POST /forgot_password - the answer never reveals whether the email exists
async fn forgot_password(
    State(state): State<AppState>,
    Form(form): Form<ForgotPasswordForm>,
) -> Response {
    match state.reset_service.request_reset(&form.email).await {
        Ok(ResetRequestOutcome::Sent) | Ok(ResetRequestOutcome::UnknownEmail) => {
            forgot_form(&state, StatusCode::OK, "", None, Some(RESET_SENT))
        }
        Ok(ResetRequestOutcome::DeliveryFailed) => forgot_form(
            &state,
            StatusCode::OK,
            &form.email,
            Some(DELIVERY_FAILED_MESSAGE),
            None,
        ),
        Err(ResetError::ValidationError(msg)) => {
            forgot_form(&state, StatusCode::BAD_REQUEST, &form.email, Some(&msg), None)
        }
        Err(e) => error_page(&state, None, e),
    }
}

fn reset_form(
    state: &AppState,
    status: StatusCode,
    token: &str,
    valid: bool,
    error: Option<&str>,
) -> Response {
    let mut ctx = page_context(None);
    ctx.insert("token", token);
    ctx.insert("valid", &valid);
    ctx.insert("error", &error);
    render_with_status(state, status, "reset_password.html", &ctx)
}

/// GET /reset_password/{token}
async fn reset_password_page(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    match state.reset_service.check_token(&token).await {
        Ok(_) => reset_form(&state, StatusCode::OK, &token, true, None),
        Err(ResetError::InvalidToken) => reset_form(&state, StatusCode::BAD_REQUEST, &token, false, None),
        Err(e) => error_page(&state, None, e),
    }
}

/// POST /reset_password/{token}
async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> Response {
    match state
        .reset_service
        .redeem(&token, &form.password, &form.confirm_password)
        .await
    {
        Ok(()) => {
            let mut ctx = page_context(None);
            ctx.insert("form", &serde_json::json!({ "username": "" }));
            ctx.insert("notice", PASSWORD_UPDATED);
            render(&state, "login.html", &ctx)
        }
        Err(ResetError::InvalidToken) => reset_form(&state, StatusCode::BAD_REQUEST, &token, false, None),
        Err(ResetError::ValidationError(msg)) => {
            reset_form(&state, StatusCode::BAD_REQUEST, &token, true, Some(&msg))
        }
        Err(e) => error_page(&state, None, e),
    }
}
