//! Read models of the inventory API and the HTTP client that talks to it.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::{FleetError, Result};
use crate::payloads::{
    BusPayload, ImageUpload, LoginRequest, ProfileUpdate, RegisterRequest, SparePartPayload,
};

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("invalid id: {}", other))),
    }
}

/// Optional text that the API may send as a string, a number, `null` or `""`.
fn de_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!("expected text, got {}", other))),
    }
}

/// A bus model in the inventory. Read-only from the dashboard's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub marca: String,
    pub modelo: String,
    #[serde(default, deserialize_with = "de_text")]
    pub uso: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub imagen: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub descripcion: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub motor: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub transmision: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub asientos: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub puertas: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub combustible: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub neumaticos: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub direccion: Option<String>,
}

/// Label/value pair of a technical attribute, for spec grids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecRow {
    pub label: &'static str,
    pub value: String,
}

impl Bus {
    /// "Marca Modelo", as shown in page titles and the print sheet.
    pub fn title(&self) -> String {
        format!("{} {}", self.marca, self.modelo)
    }

    /// Technical attributes that are present, in fiche order.
    pub fn specs(&self) -> Vec<SpecRow> {
        [
            ("Asientos", &self.asientos),
            ("Puertas", &self.puertas),
            ("Motor", &self.motor),
            ("Transmisión", &self.transmision),
            ("Combustible", &self.combustible),
            ("Neumáticos", &self.neumaticos),
            ("Dirección", &self.direccion),
        ]
        .into_iter()
        .filter_map(|(label, value)| {
            value.as_ref().map(|v| SpecRow {
                label,
                value: v.clone(),
            })
        })
        .collect()
    }

    /// Case-insensitive match against brand, model and usage tag.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.marca.to_lowercase().contains(&term)
            || self.modelo.to_lowercase().contains(&term)
            || self
                .uso
                .as_deref()
                .is_some_and(|u| u.to_lowercase().contains(&term))
    }
}

/// A spare part in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparePart {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub nombre: String,
    #[serde(default, deserialize_with = "de_text")]
    pub codigo: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub modelo: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub categoria: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub descripcion: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub imagen: Option<String>,
}

impl SparePart {
    /// Search over name, description, code and model plus an exact category
    /// filter; `None` category means "all".
    pub fn matches(&self, term: &str, category: Option<&str>) -> bool {
        if let Some(category) = category {
            if self.categoria.as_deref() != Some(category) {
                return false;
            }
        }

        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        let hit = |v: Option<&str>| v.is_some_and(|v| v.to_lowercase().contains(&term));
        hit(Some(&self.nombre))
            || hit(self.descripcion.as_deref())
            || hit(self.codigo.as_deref())
            || hit(self.modelo.as_deref())
    }
}

/// A dashboard user as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub apellido: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, deserialize_with = "de_text")]
    pub imagen: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.nombre, self.apellido).trim().to_string()
    }
}

/// `POST /auth/login` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// Resolve an image reference from the API into a fetchable URL.
///
/// Absolute `http(s)` references pass through, anything else is served from
/// the API's `/uploads/` directory.
pub fn image_url(api_base: &str, reference: Option<&str>) -> Option<String> {
    let reference = reference?.trim();
    if reference.is_empty() {
        return None;
    }
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Some(reference.to_string());
    }
    Some(format!(
        "{}/uploads/{}",
        api_base.trim_end_matches('/'),
        reference.trim_start_matches('/')
    ))
}

/// Anything the QR workflow can load a bus from.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Fetch one bus. Missing, empty or non-success answers are errors.
    async fn fetch_bus(&self, id: &str) -> Result<Bus>;
}

/// reqwest-backed client for the inventory REST API.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into `FleetError`, keeping the API's
    /// `message` when it sends one.
    async fn check(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(FleetError::NotFound(what.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

        Err(FleetError::Upstream {
            status: status.as_u16(),
            message,
        })
    }

    fn multipart(fields: Vec<(&'static str, String)>, image: Option<ImageUpload>) -> Result<Form> {
        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name, value);
        }
        if let Some(image) = image {
            let mut part = Part::bytes(image.bytes).file_name(image.file_name);
            if let Some(mime) = image.content_type {
                part = part.mime_str(&mime)?;
            }
            form = form.part("imagen", part);
        }
        Ok(form)
    }

    pub async fn list_buses(&self) -> Result<Vec<Bus>> {
        let response = self.client.get(self.url("/autobuses")).send().await?;
        let response = Self::check(response, "autobuses").await?;
        Ok(response.json().await?)
    }

    /// Create (`id == None`) or update a bus.
    pub async fn save_bus(
        &self,
        id: Option<&str>,
        payload: &BusPayload,
        image: Option<ImageUpload>,
    ) -> Result<()> {
        let form = Self::multipart(payload.fields(), image)?;
        let request = match id {
            Some(id) => self.client.put(self.url(&format!("/autobuses/{}", id))),
            None => self.client.post(self.url("/autobuses")),
        };
        let response = request.multipart(form).send().await?;
        Self::check(response, "autobús").await?;
        log::info!("saved bus {} {}", payload.marca, payload.modelo);
        Ok(())
    }

    pub async fn delete_bus(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/autobuses/{}", id)))
            .send()
            .await?;
        Self::check(response, &format!("autobús {}", id)).await?;
        Ok(())
    }

    pub async fn list_parts(&self) -> Result<Vec<SparePart>> {
        let response = self.client.get(self.url("/repuestos")).send().await?;
        let response = Self::check(response, "repuestos").await?;
        Ok(response.json().await?)
    }

    pub async fn fetch_part(&self, id: &str) -> Result<SparePart> {
        let response = self
            .client
            .get(self.url(&format!("/repuestos/{}", id)))
            .send()
            .await?;
        let response = Self::check(response, &format!("repuesto {}", id)).await?;
        Ok(response.json().await?)
    }

    /// Create (`id == None`) or update a spare part.
    pub async fn save_part(
        &self,
        id: Option<&str>,
        payload: &SparePartPayload,
        image: Option<ImageUpload>,
    ) -> Result<()> {
        let form = Self::multipart(payload.fields(), image)?;
        let request = match id {
            Some(id) => self.client.put(self.url(&format!("/repuestos/{}", id))),
            None => self.client.post(self.url("/repuestos")),
        };
        let response = request.multipart(form).send().await?;
        Self::check(response, "repuesto").await?;
        Ok(())
    }

    pub async fn delete_part(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/repuestos/{}", id)))
            .send()
            .await?;
        Self::check(response, &format!("repuesto {}", id)).await?;
        Ok(())
    }

    /// Download an uploaded image by reference.
    pub async fn fetch_image(&self, reference: &str) -> Result<Vec<u8>> {
        let url = image_url(&self.base_url, Some(reference))
            .ok_or_else(|| FleetError::NotFound("imagen".to_string()))?;
        let response = self.client.get(url).send().await?;
        let response = Self::check(response, reference).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(request)
            .send()
            .await?;
        let response = match Self::check(response, "usuario").await {
            Err(FleetError::NotFound(_)) => return Err(FleetError::Unauthorized),
            other => other?,
        };
        Ok(response.json().await?)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
        let response = self
            .client
            .post(self.url("/auth/register"))
            .json(request)
            .send()
            .await?;
        Self::check(response, "registro").await?;
        Ok(())
    }

    /// Update the profile of `user` and return the merged result.
    ///
    /// The API may answer with only the changed fields; they are laid over
    /// the current user so the session keeps a complete record.
    pub async fn update_profile(
        &self,
        token: &str,
        user: &User,
        update: &ProfileUpdate,
        image: Option<ImageUpload>,
    ) -> Result<User> {
        let form = Self::multipart(update.fields(), image)?;
        let response = self
            .client
            .put(self.url(&format!("/auth/users/{}", user.id)))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(FleetError::Unauthorized);
        }
        let response = Self::check(response, "usuario").await?;
        let changes: Value = response.json().await?;
        merge_user(user, changes)
    }
}

fn merge_user(user: &User, changes: Value) -> Result<User> {
    let mut merged = serde_json::to_value(user)
        .map_err(|e| FleetError::Encoding(e.to_string()))?;
    if let (Some(base), Value::Object(changes)) = (merged.as_object_mut(), changes) {
        for (key, value) in changes {
            base.insert(key, value);
        }
    }
    serde_json::from_value(merged).map_err(|e| FleetError::Upstream {
        status: 502,
        message: format!("Respuesta del servidor inválida: {}", e),
    })
}

#[async_trait]
impl ItemSource for HttpCatalog {
    async fn fetch_bus(&self, id: &str) -> Result<Bus> {
        let response = self
            .client
            .get(self.url(&format!("/autobuses/{}", id)))
            .send()
            .await?;
        let response = Self::check(response, &format!("autobús {}", id)).await?;
        let body: Value = response.json().await?;
        if body.is_null() || body.as_object().is_some_and(|o| o.is_empty()) {
            return Err(FleetError::NotFound(format!("autobús {}", id)));
        }
        serde_json::from_value(body).map_err(|e| FleetError::Upstream {
            status: 502,
            message: e.to_string(),
        })
    }
}
