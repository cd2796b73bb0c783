//! Sign-in, registration, profile and the authentication middleware.
//!
//! Credentials are checked by the inventory API; this module only keeps the
//! returned token and user in a server-side session keyed by a cookie.

use axum::{
    Extension, Form,
    extract::{Multipart, Query, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;

use crate::app::{MultipartBody, SharedState, current_user, redirect_with, render_page};
use crate::catalog::{LoginResponse, User};
use crate::error::{FleetError, Result};
use crate::payloads::{LoginRequest, ProfileForm, ProfileUpdate, RegisterRequest};
use crate::routes;
use crate::session::{SESSION_COOKIE, SessionHandle};

/// One-shot messages carried in the query string after a redirect.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NoticeQuery {
    pub registered: Option<String>,
    pub notice: Option<String>,
    pub error: Option<String>,
}

fn login_form(
    state: &SharedState,
    status: StatusCode,
    email: &str,
    registered: bool,
    error: Option<String>,
) -> Result<Response> {
    render_page(
        state,
        status,
        "login",
        &json!({
            "title": "Iniciar sesión",
            "email": email,
            "registered": registered,
            "error": error,
        }),
    )
}

/// Serve the login page
///
/// # Arguments
/// * `query` - `registered` after a successful sign-up, `error` after an expired session
///
/// # Returns
/// * `Result<Response>` - The rendered login page
pub async fn login_page(
    State(state): State<SharedState>,
    Query(query): Query<NoticeQuery>,
) -> Result<Response> {
    login_form(
        &state,
        StatusCode::OK,
        "",
        query.registered.is_some(),
        query.error,
    )
}

/// Handle user login requests
///
/// Validates the form, asks the inventory API for a token and opens a
/// session on success.
///
/// # Arguments
/// * `jar` - Cookie jar for storing the session cookie
/// * `credentials` - Form data containing the email and password
///
/// # Returns
/// * `Result<Response>` - Redirect to the dashboard, or the login page with the reason
pub async fn handle_login(
    State(state): State<SharedState>,
    jar: CookieJar,
    Form(credentials): Form<LoginRequest>,
) -> Result<Response> {
    let email = credentials.email.clone();
    let request = match credentials.validate() {
        Ok(request) => request,
        Err(e) => {
            return login_form(&state, StatusCode::BAD_REQUEST, &email, false, Some(e.message));
        }
    };

    match state.catalog.login(&request).await {
        Ok(LoginResponse { token, user }) => {
            log::info!("user {} logged in", user.email);
            let session_id = state.sessions.login(token, user);
            let cookie = Cookie::build((SESSION_COOKIE, session_id))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax);
            Ok((jar.add(cookie), Redirect::to(routes::DASHBOARD_ROUTE)).into_response())
        }
        Err(e @ (FleetError::Unauthorized | FleetError::Upstream { .. } | FleetError::Http(_))) => {
            log::warn!("login rejected for {}: {}", email, e);
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
            login_form(&state, status, &email, false, Some(e.user_message()))
        }
        Err(e) => Err(e),
    }
}

fn register_form(
    state: &SharedState,
    status: StatusCode,
    form: &RegisterRequest,
    error: Option<String>,
) -> Result<Response> {
    // The password is never echoed back.
    render_page(
        state,
        status,
        "register",
        &json!({
            "title": "Crear cuenta",
            "form": { "nombre": form.nombre, "apellido": form.apellido, "email": form.email },
            "error": error,
        }),
    )
}

pub async fn register_page(State(state): State<SharedState>) -> Result<Response> {
    let empty = RegisterRequest {
        nombre: String::new(),
        apellido: String::new(),
        email: String::new(),
        password: String::new(),
    };
    register_form(&state, StatusCode::OK, &empty, None)
}

/// Handle user registration
///
/// # Arguments
/// * `form` - Form data containing name, surname, email and password
///
/// # Returns
/// * `Result<Response>` - Redirect to the login page, or the form with the reason
pub async fn handle_register(
    State(state): State<SharedState>,
    Form(form): Form<RegisterRequest>,
) -> Result<Response> {
    let request = match form.clone().validate() {
        Ok(request) => request,
        Err(e) => return register_form(&state, StatusCode::BAD_REQUEST, &form, Some(e.message)),
    };

    match state.catalog.register(&request).await {
        Ok(()) => {
            log::info!("registered user {}", request.email);
            Ok(Redirect::to(&format!("{}?registered=true", routes::LOGIN_ROUTE)).into_response())
        }
        Err(e @ (FleetError::Upstream { .. } | FleetError::Http(_))) => {
            log::warn!("registration rejected for {}: {}", request.email, e);
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
            register_form(&state, status, &form, Some(e.user_message()))
        }
        Err(e) => Err(e),
    }
}

/// Handle user logout
///
/// Clears the server-side session, including any mounted QR workflow, and
/// the cookie.
///
/// # Returns
/// * `(CookieJar, Redirect)` - Modified cookie jar and redirect to the login page
pub async fn handle_logout(State(state): State<SharedState>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if state.sessions.logout(cookie.value()) {
            log::info!("session closed");
        }
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to(routes::LOGIN_ROUTE),
    )
}

/// Authentication middleware
///
/// Passes requests with a live session through, with the [`SessionHandle`]
/// as a request extension; everything else is redirected to the login page.
/// A `GET` outside the QR workflow counts as navigating away from it, so the
/// mounted workflow and its artifact are dropped.
///
/// # Arguments
/// * `jar` - Cookie jar containing the session cookie
/// * `request` - The incoming request
/// * `next` - Next middleware in the chain
///
/// # Returns
/// * `Response` - Either the inner response or a redirect to login
pub async fn require_auth(
    State(state): State<SharedState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let handle = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.get(cookie.value()));
    let Some(handle) = handle else {
        return Redirect::to(routes::LOGIN_ROUTE).into_response();
    };

    if request.method() == Method::GET && !routes::is_qr_workflow_path(request.uri().path()) {
        handle.lock().await.unmount_qr();
    }

    request.extensions_mut().insert(handle);
    next.run(request).await
}

fn profile_form(
    state: &SharedState,
    status: StatusCode,
    user: &User,
    form: &ProfileForm,
    notice: Option<String>,
    error: Option<String>,
) -> Result<Response> {
    render_page(
        state,
        status,
        "profile",
        &json!({
            "title": "Mi perfil",
            "user": state.user_view(user),
            "form": { "nombre": form.nombre, "apellido": form.apellido, "email": form.email },
            "notice": notice,
            "error": error,
        }),
    )
}

pub async fn profile_page(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Query(query): Query<NoticeQuery>,
) -> Result<Response> {
    let user = current_user(&session).await;
    profile_form(
        &state,
        StatusCode::OK,
        &user,
        &ProfileForm::from(&user),
        query.notice,
        query.error,
    )
}

/// Handle a profile update
///
/// Sends the changes (and optional new picture) to the API with the
/// session's bearer token. On success the session's user is replaced and the
/// new record is published so every other session of the same user picks
/// it up. A rejected token ends the session.
pub async fn update_profile(
    State(state): State<SharedState>,
    jar: CookieJar,
    Extension(session): Extension<SessionHandle>,
    multipart: Multipart,
) -> Result<Response> {
    let body = MultipartBody::read(multipart, "imagen").await?;
    let form: ProfileForm = body.form()?;
    let (token, user) = {
        let ctx = session.lock().await;
        (ctx.token().to_string(), ctx.user().clone())
    };

    let update = match ProfileUpdate::try_from(form.clone()) {
        Ok(update) => update,
        Err(e) => {
            return profile_form(&state, StatusCode::BAD_REQUEST, &user, &form, None, Some(e.message));
        }
    };

    match state
        .catalog
        .update_profile(&token, &user, &update, body.file)
        .await
    {
        Ok(updated) => {
            session.lock().await.set_user(updated.clone());
            state.profile_updates.publish(updated);
            Ok(redirect_with(routes::PROFILE_ROUTE, "notice", "Perfil actualizado").into_response())
        }
        Err(FleetError::Unauthorized) => {
            log::warn!("token rejected while updating user {}", user.id);
            if let Some(cookie) = jar.get(SESSION_COOKIE) {
                state.sessions.logout(cookie.value());
            }
            Ok(redirect_with(
                routes::LOGIN_ROUTE,
                "error",
                "Tu sesión expiró, vuelve a iniciar sesión",
            )
            .into_response())
        }
        Err(e @ (FleetError::Upstream { .. } | FleetError::Validation(_))) => {
            profile_form(
                &state,
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY),
                &user,
                &form,
                None,
                Some(e.user_message()),
            )
        }
        Err(e) => Err(e),
    }
}
