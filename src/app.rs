//! Application state, router and the inventory / spare-part pages.

use axum::{
    Extension, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::catalog::{self, Bus, HttpCatalog, ItemSource, SparePart, User};
use crate::config::AppConfig;
use crate::downloader;
use crate::error::{FleetError, Result};
use crate::events::Subject;
use crate::fiche;
use crate::login;
use crate::payloads::{
    BusForm, BusPayload, ImageUpload, PART_CATEGORIES, SparePartForm, SparePartPayload,
    ValidationError,
};
use crate::qr_page;
use crate::routes::{self, expand};
use crate::session::{SessionHandle, SessionStore};
use crate::templates::{Pages, paginate};

const UPLOAD_LIMIT_BYTES: usize = 10 * 1024 * 1024;
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Everything the handlers share.
pub struct AppState {
    pub config: AppConfig,
    pub catalog: HttpCatalog,
    pub sessions: Arc<SessionStore>,
    /// Published after a successful profile update.
    pub profile_updates: Subject<User>,
    pub pages: Pages,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Build the API client, the session store and the page templates.
    ///
    /// # Arguments
    /// * `config` - Runtime configuration
    ///
    /// # Returns
    /// * `Result<Self, Box<dyn std::error::Error>>` - Ready state or the first setup error
    pub fn new(config: AppConfig) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            catalog: HttpCatalog::new(&config)?,
            sessions: Arc::new(SessionStore::new(config.session_ttl_secs)),
            profile_updates: Subject::default(),
            pages: Pages::new()?,
            config,
        })
    }

    pub(crate) fn image_url(&self, reference: Option<&str>) -> Option<String> {
        catalog::image_url(self.catalog.base_url(), reference)
    }

    pub(crate) fn user_view(&self, user: &User) -> UserView {
        UserView {
            id: user.id.clone(),
            display_name: user.display_name(),
            email: user.email.clone(),
            imagen_url: self.image_url(user.imagen.as_deref()),
        }
    }

    /// Origin encoded into QR codes: the configured one, else the request's host.
    pub(crate) fn public_origin(&self, headers: &HeaderMap) -> String {
        if let Some(origin) = &self.config.public_origin {
            return origin.trim_end_matches('/').to_string();
        }
        let header_text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let host = header_text(header::HOST.as_str()).unwrap_or(&self.config.listen_addr);
        // Only web schemes may end up in a QR target.
        let scheme = match header_text("x-forwarded-proto").map(str::trim) {
            Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
            _ => "http",
        };
        format!("{}://{}", scheme, host)
    }
}

/// The signed-in user as the navigation bar shows it.
#[derive(Debug, Serialize)]
pub(crate) struct UserView {
    id: String,
    display_name: String,
    email: String,
    imagen_url: Option<String>,
}

/// Build the router for every page.
///
/// Dashboard routes sit behind [`login::require_auth`]; public pages don't.
/// Also starts the task that refreshes sessions after profile updates, so it
/// must be called from inside a tokio runtime.
pub fn router(state: SharedState) -> Router {
    state
        .sessions
        .clone()
        .spawn_profile_sync(state.profile_updates.subscribe());

    let dashboard = Router::new()
        .route(routes::DASHBOARD_ROUTE, get(dashboard_page))
        .route(routes::INVENTORY_ROUTE, get(inventory_page))
        .route(
            routes::INVENTORY_NEW_ROUTE,
            get(new_bus_page).post(create_bus),
        )
        .route(
            routes::INVENTORY_EDIT_ROUTE,
            get(edit_bus_page).post(update_bus),
        )
        .route(routes::INVENTORY_DELETE_ROUTE, post(delete_bus))
        .route(routes::INVENTORY_FICHE_ROUTE, get(fiche_page))
        .route(routes::INVENTORY_FICHE_PDF_ROUTE, get(fiche_pdf))
        .route(routes::QR_ROUTE, get(qr_page::mount))
        .route(routes::QR_GENERATE_ROUTE, post(qr_page::generate))
        .route(routes::QR_DOWNLOAD_ROUTE, post(qr_page::download))
        .route(routes::QR_CONFIRM_ROUTE, post(qr_page::confirm))
        .route(routes::QR_CANCEL_ROUTE, post(qr_page::cancel))
        .route(routes::QR_PRINT_ROUTE, get(qr_page::print))
        .route(routes::QR_SURFACE_ROUTE, get(qr_page::surface))
        .route(routes::PARTS_ROUTE, get(parts_page))
        .route(routes::PARTS_NEW_ROUTE, get(new_part_page).post(create_part))
        .route(
            routes::PARTS_EDIT_ROUTE,
            get(edit_part_page).post(update_part),
        )
        .route(routes::PARTS_DELETE_ROUTE, post(delete_part))
        .route(routes::PARTS_EXPORT_ROUTE, get(export_parts))
        .route(routes::PARTS_IMPORT_ROUTE, post(import_parts))
        .route(
            routes::PROFILE_ROUTE,
            get(login::profile_page).post(login::update_profile),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_auth,
        ));

    let public = Router::new()
        .route(routes::LANDING_ROUTE, get(landing_page))
        .route(routes::PUBLIC_BUS_ROUTE, get(public_bus_page))
        .route(
            routes::LOGIN_ROUTE,
            get(login::login_page).post(login::handle_login),
        )
        .route(
            routes::REGISTER_ROUTE,
            get(login::register_page).post(login::handle_register),
        )
        .route(routes::LOGOUT_ROUTE, get(login::handle_logout));

    Router::new()
        .merge(dashboard)
        .merge(public)
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server and serve until it fails.
///
/// # Arguments
/// * `config` - Runtime configuration, including the listen address
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Only returns on error
pub async fn run(config: AppConfig) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let listen_addr = config.listen_addr.clone();
    log::info!("inventory API at {}", config.api_base_url);

    let state = Arc::new(AppState::new(config)?);

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                log::info!("purged {} expired session(s)", purged);
            }
        }
    });

    let app = router(state);
    let listener = TcpListener::bind(&listen_addr).await?;
    log::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// `path?key=message`, for one-shot notices after a redirect.
pub(crate) fn redirect_with(path: &str, key: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{}?{}={}", path, key, urlencoding::encode(message)))
}

pub(crate) async fn current_user(session: &SessionHandle) -> User {
    session.lock().await.user().clone()
}

/// Render `page` with `status`, turning template failures into error responses.
pub(crate) fn render_page<T: Serialize>(
    state: &AppState,
    status: StatusCode,
    page: &str,
    data: &T,
) -> Result<Response> {
    Ok((status, state.pages.render(page, data)?).into_response())
}

/// A multipart body split into text fields and one optional file.
pub(crate) struct MultipartBody {
    fields: Map<String, Value>,
    pub file: Option<ImageUpload>,
}

impl MultipartBody {
    /// Drain `multipart`, keeping the part named `file_field` as the file.
    /// An empty file part counts as no file.
    pub async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self> {
        let mut fields = Map::new();
        let mut file = None;

        while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
            let name = field.name().unwrap_or_default().to_string();
            if name == file_field {
                let file_name = field.file_name().unwrap_or("archivo").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(invalid_form)?;
                if !bytes.is_empty() {
                    file = Some(ImageUpload {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            } else {
                let value = field.text().await.map_err(invalid_form)?;
                fields.insert(name, Value::String(value));
            }
        }

        Ok(Self { fields, file })
    }

    /// Deserialize the text fields into a form struct.
    pub fn form<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| ValidationError::new("form", &e.to_string()).into())
    }
}

fn invalid_form(e: axum::extract::multipart::MultipartError) -> FleetError {
    ValidationError::new("form", &e.body_text()).into()
}

/// Query string of the list pages.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub q: String,
    pub categoria: String,
    pub page: String,
    pub notice: Option<String>,
    pub error: Option<String>,
}

impl ListQuery {
    fn page_number(&self) -> usize {
        self.page.trim().parse().unwrap_or(1)
    }
}

#[derive(Debug, Serialize)]
struct BusCard {
    id: String,
    title: String,
    uso: Option<String>,
    imagen_url: Option<String>,
    public_url: String,
    qr_url: String,
    fiche_url: String,
    fiche_pdf_url: String,
    edit_url: String,
    delete_url: String,
}

impl BusCard {
    fn new(state: &AppState, bus: &Bus) -> Self {
        Self {
            id: bus.id.clone(),
            title: bus.title(),
            uso: bus.uso.clone(),
            imagen_url: state.image_url(bus.imagen.as_deref()),
            public_url: expand(routes::PUBLIC_BUS_ROUTE, &bus.id),
            qr_url: expand(routes::QR_ROUTE, &bus.id),
            fiche_url: expand(routes::INVENTORY_FICHE_ROUTE, &bus.id),
            fiche_pdf_url: expand(routes::INVENTORY_FICHE_PDF_ROUTE, &bus.id),
            edit_url: expand(routes::INVENTORY_EDIT_ROUTE, &bus.id),
            delete_url: expand(routes::INVENTORY_DELETE_ROUTE, &bus.id),
        }
    }
}

#[derive(Debug, Serialize)]
struct PartCard {
    #[serde(flatten)]
    part: SparePart,
    imagen_url: Option<String>,
    edit_url: String,
    delete_url: String,
}

impl PartCard {
    fn new(state: &AppState, part: SparePart) -> Self {
        Self {
            imagen_url: state.image_url(part.imagen.as_deref()),
            edit_url: expand(routes::PARTS_EDIT_ROUTE, &part.id),
            delete_url: expand(routes::PARTS_DELETE_ROUTE, &part.id),
            part,
        }
    }
}

fn category_options(selected: &str) -> Vec<Value> {
    PART_CATEGORIES
        .iter()
        .map(|c| json!({ "name": c, "selected": *c == selected }))
        .collect()
}

// ---------------------------------------------------------------------------
// Public pages
// ---------------------------------------------------------------------------

async fn landing_page(State(state): State<SharedState>) -> Result<Response> {
    let (buses, parts) = tokio::join!(state.catalog.list_buses(), state.catalog.list_parts());
    let buses = buses.unwrap_or_else(|e| {
        log::warn!("landing page without buses: {}", e);
        Vec::new()
    });
    let parts = parts.unwrap_or_else(|e| {
        log::warn!("landing page without parts: {}", e);
        Vec::new()
    });

    let buses: Vec<BusCard> = buses.iter().map(|b| BusCard::new(&state, b)).collect();
    let parts: Vec<PartCard> = parts.into_iter().map(|p| PartCard::new(&state, p)).collect();
    render_page(
        &state,
        StatusCode::OK,
        "landing",
        &json!({ "title": "Inicio", "buses": buses, "parts": parts }),
    )
}

/// The page QR codes point at. Readable without a session.
async fn public_bus_page(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response> {
    match state.catalog.fetch_bus(&id).await {
        Ok(bus) => render_page(
            &state,
            StatusCode::OK,
            "public_bus",
            &json!({
                "title": bus.title(),
                "imagen_url": state.image_url(bus.imagen.as_deref()),
                "specs": bus.specs(),
                "bus": bus,
            }),
        ),
        Err(FleetError::NotFound(_)) => not_found_page(&state, "Autobús no encontrado", "/"),
        Err(e) => Err(e),
    }
}

pub(crate) fn not_found_page(state: &AppState, title: &str, back: &str) -> Result<Response> {
    render_page(
        state,
        StatusCode::NOT_FOUND,
        "not_found",
        &json!({
            "title": title,
            "message": "El recurso solicitado no existe o fue eliminado.",
            "back": back,
        }),
    )
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

async fn dashboard_page(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
) -> Result<Response> {
    let user = current_user(&session).await;
    let (buses, parts) = tokio::join!(state.catalog.list_buses(), state.catalog.list_parts());
    let count = |n: Result<usize>| {
        n.map(|n| n.to_string()).unwrap_or_else(|e| {
            log::warn!("dashboard count unavailable: {}", e);
            "-".to_string()
        })
    };

    render_page(
        &state,
        StatusCode::OK,
        "dashboard",
        &json!({
            "title": "Panel",
            "user": state.user_view(&user),
            "bus_count": count(buses.map(|b| b.len())),
            "part_count": count(parts.map(|p| p.len())),
        }),
    )
}

async fn inventory_page(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Query(query): Query<ListQuery>,
) -> Result<Response> {
    let user = current_user(&session).await;
    let (buses, load_error) = match state.catalog.list_buses().await {
        Ok(buses) => (buses, None),
        Err(e) => {
            log::error!("failed to list buses: {}", e);
            (Vec::new(), Some(e.user_message()))
        }
    };

    let cards: Vec<BusCard> = buses
        .iter()
        .filter(|b| b.matches(&query.q))
        .map(|b| BusCard::new(&state, b))
        .collect();
    let page = paginate(cards, query.page_number(), state.config.items_per_page);

    render_page(
        &state,
        StatusCode::OK,
        "inventory",
        &json!({
            "title": "Inventario",
            "user": state.user_view(&user),
            "query": query.q,
            "page": page,
            "notice": query.notice,
            "error": load_error.or(query.error),
        }),
    )
}

fn bus_form_page(
    state: &AppState,
    user: &User,
    id: Option<&str>,
    form: &BusForm,
    imagen_url: Option<String>,
    error: Option<String>,
) -> Result<Response> {
    let (title, action) = match id {
        Some(id) => ("Editar autobús", expand(routes::INVENTORY_EDIT_ROUTE, id)),
        None => ("Nuevo autobús", routes::INVENTORY_NEW_ROUTE.to_string()),
    };
    let status = if error.is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };

    render_page(
        state,
        status,
        "bus_form",
        &json!({
            "title": title,
            "user": state.user_view(user),
            "action": action,
            "form": form,
            "imagen_url": imagen_url,
            "error": error,
        }),
    )
}

async fn new_bus_page(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
) -> Result<Response> {
    let user = current_user(&session).await;
    bus_form_page(&state, &user, None, &BusForm::default(), None, None)
}

async fn edit_bus_page(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Path(id): Path<String>,
) -> Result<Response> {
    let user = current_user(&session).await;
    match state.catalog.fetch_bus(&id).await {
        Ok(bus) => {
            let imagen_url = state.image_url(bus.imagen.as_deref());
            bus_form_page(&state, &user, Some(&id), &BusForm::from(&bus), imagen_url, None)
        }
        Err(FleetError::NotFound(_)) => {
            not_found_page(&state, "Autobús no encontrado", routes::INVENTORY_ROUTE)
        }
        Err(e) => Err(e),
    }
}

async fn create_bus(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    multipart: Multipart,
) -> Result<Response> {
    save_bus(&state, &session, None, multipart).await
}

async fn update_bus(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Response> {
    save_bus(&state, &session, Some(&id), multipart).await
}

/// Validate the posted form and forward it. Validation or API rejections
/// re-render the form with the message; the typed values are kept.
async fn save_bus(
    state: &AppState,
    session: &SessionHandle,
    id: Option<&str>,
    multipart: Multipart,
) -> Result<Response> {
    let body = MultipartBody::read(multipart, "imagen").await?;
    let form: BusForm = body.form()?;

    let result = match BusPayload::try_from(form.clone()) {
        Ok(payload) => state.catalog.save_bus(id, &payload, body.file).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => Ok(redirect_with(routes::INVENTORY_ROUTE, "notice", "Autobús guardado").into_response()),
        Err(e @ (FleetError::Validation(_) | FleetError::Upstream { .. })) => {
            let user = current_user(session).await;
            bus_form_page(state, &user, id, &form, None, Some(e.user_message()))
        }
        Err(e) => Err(e),
    }
}

async fn delete_bus(State(state): State<SharedState>, Path(id): Path<String>) -> Redirect {
    match state.catalog.delete_bus(&id).await {
        Ok(()) => {
            log::info!("deleted bus {}", id);
            redirect_with(routes::INVENTORY_ROUTE, "notice", "Autobús eliminado")
        }
        Err(e) => {
            log::error!("failed to delete bus {}: {}", id, e);
            redirect_with(routes::INVENTORY_ROUTE, "error", &e.user_message())
        }
    }
}

/// Printable technical fiche, with a link to the PDF download.
async fn fiche_page(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Response> {
    let bus = match state.catalog.fetch_bus(&id).await {
        Ok(bus) => bus,
        Err(FleetError::NotFound(_)) => {
            return not_found_page(&state, "Autobús no encontrado", routes::INVENTORY_ROUTE);
        }
        Err(e) => return Err(e),
    };

    render_page(
        &state,
        StatusCode::OK,
        "fiche",
        &json!({
            "title": fiche::fiche_name(&bus),
            "file_name": fiche::fiche_name(&bus),
            "pdf_url": expand(routes::INVENTORY_FICHE_PDF_ROUTE, &bus.id),
            "generated_at": chrono::Local::now().format("%d/%m/%Y").to_string(),
            "imagen_url": state.image_url(bus.imagen.as_deref()),
            "specs": bus.specs(),
            "bus": bus,
        }),
    )
}

/// Download the fiche as `Ficha-{marca}-{modelo}.pdf`. A picture that cannot
/// be fetched leaves the fiche without one.
async fn fiche_pdf(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Response> {
    let bus = match state.catalog.fetch_bus(&id).await {
        Ok(bus) => bus,
        Err(FleetError::NotFound(_)) => {
            return not_found_page(&state, "Autobús no encontrado", routes::INVENTORY_ROUTE);
        }
        Err(e) => return Err(e),
    };

    let picture = match bus.imagen.as_deref() {
        Some(reference) => match state.catalog.fetch_image(reference).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("fiche of bus {} without picture: {}", bus.id, e);
                None
            }
        },
        None => None,
    };

    let bytes = fiche::fiche_pdf(&bus, picture.as_deref())?;
    let file_name = fiche::fiche_file_name(&bus);
    log::info!("generated {}", file_name);

    Ok((
        [
            (header::CONTENT_TYPE, fiche::PDF_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Spare parts
// ---------------------------------------------------------------------------

async fn parts_page(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Query(query): Query<ListQuery>,
) -> Result<Response> {
    let user = current_user(&session).await;
    let (parts, load_error) = match state.catalog.list_parts().await {
        Ok(parts) => (parts, None),
        Err(e) => {
            log::error!("failed to list spare parts: {}", e);
            (Vec::new(), Some(e.user_message()))
        }
    };

    let category = Some(query.categoria.as_str()).filter(|c| PART_CATEGORIES.contains(c));
    let cards: Vec<PartCard> = parts
        .into_iter()
        .filter(|p| p.matches(&query.q, category))
        .map(|p| PartCard::new(&state, p))
        .collect();
    let page = paginate(cards, query.page_number(), state.config.items_per_page);

    render_page(
        &state,
        StatusCode::OK,
        "parts",
        &json!({
            "title": "Repuestos",
            "user": state.user_view(&user),
            "query": query.q,
            "category": category.unwrap_or(""),
            "categories": category_options(category.unwrap_or("")),
            "page": page,
            "notice": query.notice,
            "error": load_error.or(query.error),
        }),
    )
}

fn part_form_page(
    state: &AppState,
    user: &User,
    id: Option<&str>,
    form: &SparePartForm,
    imagen_url: Option<String>,
    error: Option<String>,
) -> Result<Response> {
    let (title, action) = match id {
        Some(id) => ("Editar repuesto", expand(routes::PARTS_EDIT_ROUTE, id)),
        None => ("Nuevo repuesto", routes::PARTS_NEW_ROUTE.to_string()),
    };
    let status = if error.is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    let selected = if form.categoria.is_empty() {
        crate::payloads::DEFAULT_PART_CATEGORY
    } else {
        form.categoria.as_str()
    };

    render_page(
        state,
        status,
        "part_form",
        &json!({
            "title": title,
            "user": state.user_view(user),
            "action": action,
            "form": form,
            "categories": category_options(selected),
            "imagen_url": imagen_url,
            "error": error,
        }),
    )
}

async fn new_part_page(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
) -> Result<Response> {
    let user = current_user(&session).await;
    part_form_page(&state, &user, None, &SparePartForm::default(), None, None)
}

async fn edit_part_page(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Path(id): Path<String>,
) -> Result<Response> {
    let user = current_user(&session).await;
    match state.catalog.fetch_part(&id).await {
        Ok(part) => {
            let imagen_url = state.image_url(part.imagen.as_deref());
            part_form_page(
                &state,
                &user,
                Some(&id),
                &SparePartForm::from(&part),
                imagen_url,
                None,
            )
        }
        Err(FleetError::NotFound(_)) => {
            not_found_page(&state, "Repuesto no encontrado", routes::PARTS_ROUTE)
        }
        Err(e) => Err(e),
    }
}

async fn create_part(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    multipart: Multipart,
) -> Result<Response> {
    save_part(&state, &session, None, multipart).await
}

async fn update_part(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Response> {
    save_part(&state, &session, Some(&id), multipart).await
}

async fn save_part(
    state: &AppState,
    session: &SessionHandle,
    id: Option<&str>,
    multipart: Multipart,
) -> Result<Response> {
    let body = MultipartBody::read(multipart, "imagen").await?;
    let form: SparePartForm = body.form()?;

    let result = match SparePartPayload::try_from(form.clone()) {
        Ok(payload) => state.catalog.save_part(id, &payload, body.file).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => Ok(redirect_with(routes::PARTS_ROUTE, "notice", "Repuesto guardado").into_response()),
        Err(e @ (FleetError::Validation(_) | FleetError::Upstream { .. })) => {
            let user = current_user(session).await;
            part_form_page(state, &user, id, &form, None, Some(e.user_message()))
        }
        Err(e) => Err(e),
    }
}

async fn delete_part(State(state): State<SharedState>, Path(id): Path<String>) -> Redirect {
    match state.catalog.delete_part(&id).await {
        Ok(()) => {
            log::info!("deleted spare part {}", id);
            redirect_with(routes::PARTS_ROUTE, "notice", "Repuesto eliminado")
        }
        Err(e) => {
            log::error!("failed to delete spare part {}: {}", id, e);
            redirect_with(routes::PARTS_ROUTE, "error", &e.user_message())
        }
    }
}

/// Download the whole catalog as `Catalogo_Repuestos.xlsx`, pictures included.
async fn export_parts(State(state): State<SharedState>) -> Result<Response> {
    let parts = state.catalog.list_parts().await?;

    let mut images = HashMap::new();
    for part in &parts {
        let Some(reference) = part.imagen.as_deref() else {
            continue;
        };
        match state.catalog.fetch_image(reference).await {
            Ok(bytes) => {
                images.insert(part.id.clone(), bytes);
            }
            Err(e) => log::warn!("exporting part {} without image: {}", part.id, e),
        }
    }

    let bytes = downloader::parts_to_xlsx(&parts, &images)?;
    log::info!("exported {} spare parts", parts.len());

    Ok((
        [
            (header::CONTENT_TYPE, downloader::XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", downloader::PARTS_EXPORT_FILE),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Create one part per usable row of an uploaded workbook or CSV file. Rows
/// the API or the validation rejects are counted and skipped.
async fn import_parts(State(state): State<SharedState>, multipart: Multipart) -> Result<Redirect> {
    let body = MultipartBody::read(multipart, "archivo").await?;
    let Some(file) = body.file else {
        return Ok(redirect_with(
            routes::PARTS_ROUTE,
            "error",
            "Selecciona un archivo Excel o CSV",
        ));
    };

    let forms = match downloader::parts_from_upload(&file.bytes) {
        Ok(forms) => forms,
        Err(e) => {
            log::warn!("rejected import {}: {}", file.file_name, e);
            return Ok(redirect_with(routes::PARTS_ROUTE, "error", &e.user_message()));
        }
    };

    let (mut imported, mut skipped) = (0, 0);
    for form in forms {
        let saved = match SparePartPayload::try_from(form) {
            Ok(payload) => state.catalog.save_part(None, &payload, None).await,
            Err(e) => Err(e.into()),
        };
        match saved {
            Ok(()) => imported += 1,
            Err(e) => {
                log::warn!("skipped imported row: {}", e);
                skipped += 1;
            }
        }
    }

    log::info!("imported {} spare parts, skipped {}", imported, skipped);
    let message = format!("Importados {} repuestos ({} omitidos)", imported, skipped);
    Ok(redirect_with(routes::PARTS_ROUTE, "notice", &message))
}
