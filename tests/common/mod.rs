//! In-process stand-in for the inventory REST API.

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde_json::{Value, json};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

use fleet_dashboard::AppConfig;

pub const ORIGIN: &str = "https://flota.example";
pub const EMAIL: &str = "ana@fleet.ve";
pub const PASSWORD: &str = "Secreta1";
pub const TOKEN: &str = "tok-ana";

/// Handle to a running stub API.
pub struct StubApi {
    pub base_url: String,
    created_parts: Arc<AtomicUsize>,
}

impl StubApi {
    /// Parts accepted by `POST /repuestos` so far.
    pub fn created_parts(&self) -> usize {
        self.created_parts.load(Ordering::SeqCst)
    }

    /// Dashboard configuration pointing at this stub.
    pub fn config(&self) -> AppConfig {
        AppConfig::new()
            .with_api_base_url(&self.base_url)
            .with_public_origin(ORIGIN)
    }
}

pub fn yutong() -> Value {
    json!({
        "id": 42,
        "marca": "Yutong",
        "modelo": "ZK6129H",
        "uso": "Turismo",
        "asientos": 49,
        "imagen": "buses/42.png",
        "motor": "Cummins ISL 340",
        "transmision": "ZF manual"
    })
}

fn king_long() -> Value {
    json!({
        "id": 7,
        "marca": "King Long",
        "modelo": "XMQ6127",
        "uso": "Urbano",
        "imagen": "buses/borrada.jpg"
    })
}

fn marcopolo() -> Value {
    json!({ "id": 8, "marca": "Marcopolo", "modelo": "Torino", "uso": "Urbano" })
}

/// How long the stub takes to answer for the slow bus (id 8).
pub const SLOW_BUS_DELAY: Duration = Duration::from_millis(400);

fn parts() -> Value {
    json!([
        { "id": 1, "nombre": "Pastilla de freno", "categoria": "Frenos", "codigo": "PF-100" },
        { "id": 2, "nombre": "Filtro de aire", "categoria": "Motor", "modelo": "ZK6129H" }
    ])
}

async fn fetch_bus(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "42" => Json(yutong()).into_response(),
        "7" => Json(king_long()).into_response(),
        "8" => {
            tokio::time::sleep(SLOW_BUS_DELAY).await;
            Json(marcopolo()).into_response()
        }
        // Some backends answer an unknown id with an empty object.
        "0" => Json(json!({})).into_response(),
        "500" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "db down" })),
        )
            .into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Autobús no encontrado" })),
        )
            .into_response(),
    }
}

async fn uploaded_file(Path(path): Path<String>) -> Response {
    if path != "buses/42.png" {
        return StatusCode::NOT_FOUND.into_response();
    }
    let picture = image::RgbImage::from_pixel(40, 20, image::Rgb([20, 90, 200]));
    let mut png = Cursor::new(Vec::new());
    picture
        .write_to(&mut png, image::ImageOutputFormat::Png)
        .unwrap();
    ([(header::CONTENT_TYPE, "image/png")], png.into_inner()).into_response()
}

async fn create_part(State(created): State<Arc<AtomicUsize>>, mut multipart: Multipart) -> Response {
    let mut nombre = String::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("nombre") {
            nombre = field.text().await.unwrap_or_default();
        }
    }
    if nombre == "Rechazado" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Repuesto duplicado" })),
        )
            .into_response();
    }
    let id = created.fetch_add(1, Ordering::SeqCst) + 100;
    (StatusCode::CREATED, Json(json!({ "id": id, "nombre": nombre }))).into_response()
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["email"] == EMAIL && body["password"] == PASSWORD {
        Json(json!({
            "token": TOKEN,
            "user": { "id": 5, "nombre": "Ana", "apellido": "Pérez", "email": EMAIL }
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Credenciales inválidas" })),
        )
            .into_response()
    }
}

async fn update_user(headers: HeaderMap, mut multipart: Multipart) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {}", TOKEN).as_str());
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let mut changes = serde_json::Map::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "nombre" || name == "apellido" {
            changes.insert(name, Value::String(field.text().await.unwrap_or_default()));
        }
    }
    Json(Value::Object(changes)).into_response()
}

/// Start the stub on an ephemeral port.
pub async fn spawn_inventory_api() -> StubApi {
    let created = Arc::new(AtomicUsize::new(0));

    let app = Router::new()
        .route(
            "/api/autobuses",
            get(|| async { Json(json!([yutong(), king_long()])) }),
        )
        .route(
            "/api/autobuses/:id",
            get(fetch_bus).delete(|| async { StatusCode::NO_CONTENT }),
        )
        .route(
            "/api/repuestos",
            get(|| async { Json(parts()) }).post(create_part),
        )
        .route("/api/uploads/*path", get(uploaded_file))
        .route("/api/auth/login", post(login))
        .route("/api/auth/users/:id", put(update_user))
        .with_state(created.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    StubApi {
        base_url: format!("http://{}/api", addr),
        created_parts: created,
    }
}
