//! QR workflow pages.
//!
//! `GET` on the workflow route mounts a fresh [`QrWorkflow`] in the caller's
//! session and loads the bus. The action endpoints drive that mounted
//! controller; when nothing is mounted for the bus (the user navigated away,
//! or the session is new) they send the browser back to the mount route.

use axum::{
    Extension,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;

use crate::app::{AppState, SharedState, UserView, render_page};
use crate::error::Result;
use crate::routes::{self, expand};
use crate::session::SessionHandle;
use crate::workflow::{Action, DownloadPreview, QrWorkflow, WorkflowState};

/// Everything `qr.hbs` needs for one state of the workflow.
#[derive(Debug, Serialize)]
struct QrView {
    title: String,
    user: UserView,
    state: WorkflowState,
    target_url: String,
    bus_title: Option<String>,
    bus_uso: Option<String>,
    not_found: bool,
    generated: bool,
    can_generate: bool,
    can_download: bool,
    can_print: bool,
    preview: Option<DownloadPreview>,
    error: Option<String>,
    back_url: &'static str,
    generate_url: String,
    download_url: String,
    confirm_url: String,
    cancel_url: String,
    print_url: String,
    surface_url: String,
}

impl QrView {
    fn new(user: UserView, workflow: &QrWorkflow) -> Self {
        let id = workflow.item_id();
        // The dialog floats over the generated view, which shows again as
        // soon as the dialog closes.
        let page_actions = match workflow.state() {
            WorkflowState::PreviewingDownload => {
                vec![Action::Generate, Action::Download, Action::Print]
            }
            _ => workflow.available_actions(),
        };
        let bus = workflow.item();

        Self {
            title: bus.map_or_else(|| "Código QR".to_string(), |b| format!("QR {}", b.title())),
            user,
            state: workflow.state(),
            target_url: workflow.target_url().to_string(),
            bus_title: bus.map(|b| b.title()),
            bus_uso: bus.and_then(|b| b.uso.clone()),
            not_found: workflow.state() == WorkflowState::NotFound,
            generated: workflow.is_generated(),
            can_generate: page_actions.contains(&Action::Generate),
            can_download: page_actions.contains(&Action::Download),
            can_print: page_actions.contains(&Action::Print),
            preview: match workflow.state() {
                WorkflowState::PreviewingDownload => workflow.download_preview(),
                _ => None,
            },
            error: None,
            back_url: routes::INVENTORY_ROUTE,
            generate_url: expand(routes::QR_GENERATE_ROUTE, id),
            download_url: expand(routes::QR_DOWNLOAD_ROUTE, id),
            confirm_url: expand(routes::QR_CONFIRM_ROUTE, id),
            cancel_url: expand(routes::QR_CANCEL_ROUTE, id),
            print_url: expand(routes::QR_PRINT_ROUTE, id),
            surface_url: expand(routes::QR_SURFACE_ROUTE, id),
        }
    }

    fn with_error(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }
}

fn render(state: &AppState, status: StatusCode, view: &QrView) -> Result<Response> {
    render_page(state, status, "qr", view)
}

/// Send the browser to the mount route, which starts over from `Loading`.
fn remount(id: &str) -> Response {
    log::debug!("no QR workflow mounted for bus {}, remounting", id);
    Redirect::to(&expand(routes::QR_ROUTE, id)).into_response()
}

/// Mount a fresh workflow for bus `id` and load the bus.
///
/// The bus is fetched without holding the session lock, so a slow API does
/// not block the user's other requests. The mount is stamped before the
/// fetch; if the session remounted or navigated away in the meantime, the
/// loaded controller is rendered once but never mounted. The target URL is
/// fixed from the route template at this point and never changes afterwards.
pub async fn mount(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let stamp = session.lock().await.begin_qr_mount();

    let mut workflow = QrWorkflow::new(&state.public_origin(&headers), &id);
    workflow.fetch_item(&state.catalog).await;

    let mut ctx = session.lock().await;
    let view = QrView::new(state.user_view(ctx.user()), &workflow);
    let status = match workflow.state() {
        WorkflowState::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };
    ctx.finish_qr_mount(stamp, workflow);

    render(&state, status, &view)
}

pub async fn generate(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Path(id): Path<String>,
) -> Result<Response> {
    let mut ctx = session.lock().await;
    let user = state.user_view(ctx.user());
    let Some(workflow) = ctx.mounted_qr(&id) else {
        return Ok(remount(&id));
    };

    if !workflow.allows(Action::Generate) {
        return render(&state, StatusCode::CONFLICT, &QrView::new(user, workflow));
    }

    let view = if workflow.generate_artifact() {
        QrView::new(user, workflow)
    } else {
        QrView::new(user, workflow).with_error("No se pudo generar el código QR")
    };
    render(&state, StatusCode::OK, &view)
}

/// Open the confirmation dialog. Nothing is downloaded yet.
pub async fn download(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Path(id): Path<String>,
) -> Result<Response> {
    let mut ctx = session.lock().await;
    let user = state.user_view(ctx.user());
    let Some(workflow) = ctx.mounted_qr(&id) else {
        return Ok(remount(&id));
    };

    let status = match workflow.request_download() {
        Some(_) => StatusCode::OK,
        None => StatusCode::CONFLICT,
    };
    render(&state, status, &QrView::new(user, workflow))
}

/// Commit the download: the PNG goes out as an attachment named
/// `QR-{marca}-{modelo}.png`.
pub async fn confirm(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Path(id): Path<String>,
) -> Result<Response> {
    let mut ctx = session.lock().await;
    let user = state.user_view(ctx.user());
    let Some(workflow) = ctx.mounted_qr(&id) else {
        return Ok(remount(&id));
    };

    let Some(file) = workflow.confirm_download() else {
        return render(&state, StatusCode::CONFLICT, &QrView::new(user, workflow));
    };
    log::info!("downloaded {}", file.file_name);

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.file_name),
            ),
        ],
        file.bytes,
    )
        .into_response())
}

pub async fn cancel(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Path(id): Path<String>,
) -> Result<Response> {
    let mut ctx = session.lock().await;
    let user = state.user_view(ctx.user());
    let Some(workflow) = ctx.mounted_qr(&id) else {
        return Ok(remount(&id));
    };

    let status = if workflow.cancel_download() {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    render(&state, status, &QrView::new(user, workflow))
}

/// Print-only view of the generated code.
pub async fn print(
    State(state): State<SharedState>,
    Extension(session): Extension<SessionHandle>,
    Path(id): Path<String>,
) -> Result<Response> {
    let mut ctx = session.lock().await;
    let user = state.user_view(ctx.user());
    let Some(workflow) = ctx.mounted_qr(&id) else {
        return Ok(remount(&id));
    };

    match workflow.print() {
        Some(sheet) => render_page(
            &state,
            StatusCode::OK,
            "qr_print",
            &serde_json::json!({ "sheet": sheet }),
        ),
        None => render(&state, StatusCode::CONFLICT, &QrView::new(user, workflow)),
    }
}

/// Snapshot of the live preview surface.
pub async fn surface(
    Extension(session): Extension<SessionHandle>,
    Path(id): Path<String>,
) -> Result<Response> {
    let mut ctx = session.lock().await;
    let png = match ctx.mounted_qr(&id).and_then(|workflow| workflow.artifact()) {
        Some(artifact) => artifact.surface().snapshot_png()?,
        None => return Ok(StatusCode::NOT_FOUND.into_response()),
    };

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        png,
    )
        .into_response())
}
