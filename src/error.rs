//! Error taxonomy shared by the API client, the QR workflow and the web layer.

use thiserror::Error;

use crate::payloads::ValidationError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Every failure the dashboard can surface.
///
/// Variants carrying upstream detail keep it for the log; the HTTP mapping in
/// the `web` feature only exposes a short message to the browser.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Resource missing upstream (404) or an empty body where an item was expected.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport-level failure talking to the inventory API.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The inventory API answered with a non-success status.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// A request payload failed validation before being sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// QR encoding or PNG serialisation failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Spreadsheet export failed.
    #[error("export error: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),

    /// CSV import could not be parsed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Excel import could not be read.
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    /// Fiche PDF could not be written.
    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// Image buffer could not be encoded.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Page rendering failed.
    #[cfg(feature = "web")]
    #[error("template error: {0}")]
    Template(#[from] handlebars::RenderError),

    /// Missing or expired session.
    #[error("unauthorized")]
    Unauthorized,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FleetError {
    /// HTTP status code this error should be reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Csv(_) | Self::Workbook(_) => 400,
            Self::Unauthorized => 401,
            Self::Upstream { status, .. } if (400..500).contains(status) => *status,
            Self::Upstream { .. } | Self::Http(_) => 502,
            _ => 500,
        }
    }

    /// Short Spanish message fit for showing on a page.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(_) => "El recurso solicitado no existe".to_string(),
            Self::Validation(e) => e.message.clone(),
            Self::Upstream { message, .. } => message.clone(),
            Self::Unauthorized => "Credenciales inválidas o sesión expirada".to_string(),
            Self::Http(_) => "No se pudo contactar al servidor".to_string(),
            Self::Csv(_) => "El archivo CSV no es válido".to_string(),
            Self::Workbook(_) => "El archivo Excel no es válido".to_string(),
            _ => "Ocurrió un error inesperado".to_string(),
        }
    }
}

#[cfg(feature = "web")]
mod response {
    use super::FleetError;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};

    impl IntoResponse for FleetError {
        fn into_response(self) -> Response {
            let status = StatusCode::from_u16(self.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

            let message = match &self {
                FleetError::NotFound(what) => what.clone(),
                FleetError::Validation(e) => e.to_string(),
                FleetError::Upstream { message, .. } if status.is_client_error() => {
                    message.clone()
                }
                FleetError::Unauthorized => "Unauthorized".to_string(),
                FleetError::Csv(e) => format!("Invalid CSV file: {}", e),
                FleetError::Workbook(e) => format!("Invalid workbook: {}", e),
                _ => {
                    log::error!("request failed: {}", self);
                    "Internal server error".to_string()
                }
            };

            let body = serde_json::json!({ "error": message });
            (status, axum::Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_client_errors_keep_their_status() {
        let err = FleetError::Upstream {
            status: 409,
            message: "duplicate".to_string(),
        };
        assert_eq!(err.status_code(), 409);

        let err = FleetError::Upstream {
            status: 503,
            message: "down".to_string(),
        };
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn not_found_and_validation_map_to_client_errors() {
        assert_eq!(FleetError::NotFound("bus 9".into()).status_code(), 404);
        let v = ValidationError::new("marca", "La marca es requerida");
        assert_eq!(FleetError::from(v).status_code(), 400);
        assert_eq!(FleetError::Unauthorized.status_code(), 401);
    }

    #[test]
    fn user_messages_hide_internal_detail() {
        let v = ValidationError::new("marca", "La marca es requerida");
        assert_eq!(FleetError::from(v).user_message(), "La marca es requerida");
        let err = FleetError::Encoding("data too long".into());
        assert_eq!(err.user_message(), "Ocurrió un error inesperado");
    }
}
