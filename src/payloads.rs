//! Typed request bodies sent to the inventory API.
//!
//! Browser forms arrive as loose `*Form` structs (every field a string, empty
//! when left blank). Each is turned into a payload through a constructor that
//! validates first, so nothing reaches the API without passing the same rules
//! the dashboard shows to the user.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Bus, SparePart, User};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// Fixed spare-part categories offered by the dashboard.
pub const PART_CATEGORIES: [&str; 9] = [
    "Motor",
    "Transmisión",
    "Suspensión",
    "Frenos",
    "Eléctrico",
    "Carrocería",
    "Interior",
    "Accesorios",
    "Otros",
];

/// Category assigned when none is given.
pub const DEFAULT_PART_CATEGORY: &str = "Otros";

/// A single rejected field and the message shown next to it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: &str) -> Self {
        Self {
            field,
            message: message.to_string(),
        }
    }
}

/// An uploaded image forwarded untouched to the API as the `imagen` part.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn require_min(
    field: &'static str,
    value: &str,
    min: usize,
    message: &str,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.chars().count() < min {
        return Err(ValidationError::new(field, message));
    }
    Ok(trimmed.to_string())
}

fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::new(
            "email",
            "El correo electrónico es requerido",
        ));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(ValidationError::new(
            "email",
            "Por favor ingresa un correo electrónico válido",
        ));
    }
    Ok(email.to_string())
}

/// Raw bus form as posted by the browser.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BusForm {
    pub marca: String,
    pub modelo: String,
    pub uso: String,
    pub descripcion: String,
    pub motor: String,
    pub puertas: String,
    pub asientos: String,
    pub transmision: String,
    pub combustible: String,
    pub neumaticos: String,
    pub direccion: String,
}

impl From<&Bus> for BusForm {
    /// Prefill the edit form from a stored bus.
    fn from(bus: &Bus) -> Self {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            marca: bus.marca.clone(),
            modelo: bus.modelo.clone(),
            uso: text(&bus.uso),
            descripcion: text(&bus.descripcion),
            motor: text(&bus.motor),
            puertas: text(&bus.puertas),
            asientos: text(&bus.asientos),
            transmision: text(&bus.transmision),
            combustible: text(&bus.combustible),
            neumaticos: text(&bus.neumaticos),
            direccion: text(&bus.direccion),
        }
    }
}

/// Validated body for `POST /autobuses` and `PUT /autobuses/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusPayload {
    pub marca: String,
    pub modelo: String,
    pub uso: Option<String>,
    pub descripcion: Option<String>,
    pub motor: Option<String>,
    pub puertas: Option<String>,
    pub asientos: Option<String>,
    pub transmision: Option<String>,
    pub combustible: Option<String>,
    pub neumaticos: Option<String>,
    pub direccion: Option<String>,
}

impl TryFrom<BusForm> for BusPayload {
    type Error = ValidationError;

    fn try_from(form: BusForm) -> Result<Self, Self::Error> {
        Ok(Self {
            modelo: require_min("modelo", &form.modelo, 2, "El nombre del modelo es requerido")?,
            marca: require_min("marca", &form.marca, 2, "La marca es requerida")?,
            uso: optional(&form.uso),
            descripcion: optional(&form.descripcion),
            motor: optional(&form.motor),
            puertas: optional(&form.puertas),
            asientos: optional(&form.asientos),
            transmision: optional(&form.transmision),
            combustible: optional(&form.combustible),
            neumaticos: optional(&form.neumaticos),
            direccion: optional(&form.direccion),
        })
    }
}

impl BusPayload {
    /// Multipart text fields. Absent optionals are sent as empty strings,
    /// which the API treats as "clear".
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        vec![
            ("marca", self.marca.clone()),
            ("modelo", self.modelo.clone()),
            ("uso", opt(&self.uso)),
            ("descripcion", opt(&self.descripcion)),
            ("motor", opt(&self.motor)),
            ("puertas", opt(&self.puertas)),
            ("asientos", opt(&self.asientos)),
            ("transmision", opt(&self.transmision)),
            ("combustible", opt(&self.combustible)),
            ("neumaticos", opt(&self.neumaticos)),
            ("direccion", opt(&self.direccion)),
        ]
    }
}

/// Raw spare-part form.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SparePartForm {
    pub nombre: String,
    pub categoria: String,
    pub descripcion: String,
    pub codigo: String,
    pub modelo: String,
}

impl From<&SparePart> for SparePartForm {
    fn from(part: &SparePart) -> Self {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            nombre: part.nombre.clone(),
            categoria: text(&part.categoria),
            descripcion: text(&part.descripcion),
            codigo: text(&part.codigo),
            modelo: text(&part.modelo),
        }
    }
}

/// Validated body for `POST /repuestos` and `PUT /repuestos/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SparePartPayload {
    pub nombre: String,
    pub categoria: String,
    pub descripcion: Option<String>,
    pub codigo: Option<String>,
    pub modelo: Option<String>,
}

impl TryFrom<SparePartForm> for SparePartPayload {
    type Error = ValidationError;

    fn try_from(form: SparePartForm) -> Result<Self, Self::Error> {
        let nombre = require_min("nombre", &form.nombre, 1, "El nombre es requerido")?;
        let categoria = match optional(&form.categoria) {
            None => DEFAULT_PART_CATEGORY.to_string(),
            Some(c) if PART_CATEGORIES.contains(&c.as_str()) => c,
            Some(_) => {
                return Err(ValidationError::new("categoria", "Categoría no válida"));
            }
        };

        Ok(Self {
            nombre,
            categoria,
            descripcion: optional(&form.descripcion),
            codigo: optional(&form.codigo),
            modelo: optional(&form.modelo),
        })
    }
}

impl SparePartPayload {
    /// Multipart text fields; optionals are omitted when absent.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("nombre", self.nombre.clone()),
            ("categoria", self.categoria.clone()),
        ];
        if let Some(d) = &self.descripcion {
            fields.push(("descripcion", d.clone()));
        }
        if let Some(c) = &self.codigo {
            fields.push(("codigo", c.clone()));
        }
        if let Some(m) = &self.modelo {
            fields.push(("modelo", m.clone()));
        }
        fields
    }
}

/// Body for `POST /auth/login`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(self) -> Result<Self, ValidationError> {
        let email = validate_email(&self.email)?;
        if self.password.is_empty() {
            return Err(ValidationError::new("password", "La contraseña es requerida"));
        }
        if self.password.chars().count() < 6 {
            return Err(ValidationError::new(
                "password",
                "La contraseña debe tener al menos 6 caracteres",
            ));
        }
        Ok(Self {
            email,
            password: self.password,
        })
    }
}

/// Body for `POST /auth/register`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegisterRequest {
    pub nombre: String,
    pub apellido: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.nombre.trim().is_empty() {
            return Err(ValidationError::new("nombre", "El nombre es requerido"));
        }
        let nombre = require_min(
            "nombre",
            &self.nombre,
            2,
            "El nombre debe tener al menos 2 caracteres",
        )?;
        if self.apellido.trim().is_empty() {
            return Err(ValidationError::new("apellido", "El apellido es requerido"));
        }
        let apellido = require_min(
            "apellido",
            &self.apellido,
            2,
            "El apellido debe tener al menos 2 caracteres",
        )?;
        let email = validate_email(&self.email)?;
        validate_new_password(&self.password)?;

        Ok(Self {
            nombre,
            apellido,
            email,
            password: self.password,
        })
    }
}

fn validate_new_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::new("password", "La contraseña es requerida"));
    }
    if password.chars().count() < 6 {
        return Err(ValidationError::new(
            "password",
            "La contraseña debe tener al menos 6 caracteres",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "password",
            "La contraseña debe contener al menos una letra mayúscula",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new(
            "password",
            "La contraseña debe contener al menos un número",
        ));
    }
    Ok(())
}

/// Raw profile form.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileForm {
    pub nombre: String,
    pub apellido: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl From<&User> for ProfileForm {
    /// Current profile, password fields left blank.
    fn from(user: &User) -> Self {
        Self {
            nombre: user.nombre.clone(),
            apellido: user.apellido.clone(),
            email: user.email.clone(),
            ..Default::default()
        }
    }
}

/// Validated body for `PUT /auth/users/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileUpdate {
    pub nombre: String,
    pub apellido: String,
    pub email: String,
    /// Only sent when the user typed a new password.
    pub password: Option<String>,
}

impl TryFrom<ProfileForm> for ProfileUpdate {
    type Error = ValidationError;

    fn try_from(form: ProfileForm) -> Result<Self, Self::Error> {
        let password = if form.password.is_empty() {
            None
        } else {
            if form.password != form.confirm_password {
                return Err(ValidationError::new(
                    "confirm_password",
                    "Las contraseñas no coinciden",
                ));
            }
            Some(form.password)
        };

        Ok(Self {
            nombre: form.nombre.trim().to_string(),
            apellido: form.apellido.trim().to_string(),
            email: validate_email(&form.email)?,
            password,
        })
    }
}

impl ProfileUpdate {
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("nombre", self.nombre.clone()),
            ("apellido", self.apellido.clone()),
            ("email", self.email.clone()),
        ];
        if let Some(p) = &self.password {
            fields.push(("password", p.clone()));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_requires_brand_and_model() {
        let form = BusForm {
            marca: "Y".into(),
            modelo: "ZK6129H".into(),
            ..Default::default()
        };
        let err = BusPayload::try_from(form).unwrap_err();
        assert_eq!(err.field, "marca");

        let form = BusForm {
            marca: "Yutong".into(),
            modelo: "".into(),
            ..Default::default()
        };
        assert_eq!(BusPayload::try_from(form).unwrap_err().field, "modelo");
    }

    #[test]
    fn bus_blank_optionals_become_none_and_empty_fields() {
        let form = BusForm {
            marca: " Yutong ".into(),
            modelo: "ZK6129H".into(),
            uso: "  ".into(),
            asientos: "49".into(),
            ..Default::default()
        };
        let payload = BusPayload::try_from(form).unwrap();
        assert_eq!(payload.marca, "Yutong");
        assert_eq!(payload.uso, None);
        assert_eq!(payload.asientos.as_deref(), Some("49"));

        let fields = payload.fields();
        assert_eq!(fields.len(), 11);
        assert!(fields.contains(&("uso", String::new())));
    }

    #[test]
    fn spare_part_defaults_and_rejects_unknown_category() {
        let form = SparePartForm {
            nombre: "Filtro de aceite".into(),
            ..Default::default()
        };
        let payload = SparePartPayload::try_from(form).unwrap();
        assert_eq!(payload.categoria, DEFAULT_PART_CATEGORY);
        assert_eq!(payload.fields().len(), 2);

        let form = SparePartForm {
            nombre: "Filtro".into(),
            categoria: "Juguetes".into(),
            ..Default::default()
        };
        assert_eq!(
            SparePartPayload::try_from(form).unwrap_err().field,
            "categoria"
        );
    }

    #[test]
    fn login_checks_email_and_length() {
        let bad = LoginRequest {
            email: "admin@local".into(),
            password: "secret1".into(),
        };
        assert_eq!(bad.validate().unwrap_err().field, "email");

        let short = LoginRequest {
            email: "admin@fleet.ve".into(),
            password: "abc".into(),
        };
        assert_eq!(short.validate().unwrap_err().field, "password");

        let ok = LoginRequest {
            email: " admin@fleet.ve ".into(),
            password: "abcdef".into(),
        };
        assert_eq!(ok.validate().unwrap().email, "admin@fleet.ve");
    }

    #[test]
    fn register_enforces_password_strength() {
        let base = RegisterRequest {
            nombre: "Ana".into(),
            apellido: "Pérez".into(),
            email: "ana@fleet.ve".into(),
            password: "abcdef1".into(),
        };
        let err = base.clone().validate().unwrap_err();
        assert!(err.message.contains("mayúscula"));

        let no_digit = RegisterRequest {
            password: "Abcdefg".into(),
            ..base.clone()
        };
        assert!(no_digit.validate().unwrap_err().message.contains("número"));

        let ok = RegisterRequest {
            password: "Abcdef1".into(),
            ..base
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn profile_password_must_be_confirmed() {
        let form = ProfileForm {
            nombre: "Ana".into(),
            apellido: "Pérez".into(),
            email: "ana@fleet.ve".into(),
            password: "Nueva123".into(),
            confirm_password: "Nueva124".into(),
        };
        assert_eq!(
            ProfileUpdate::try_from(form.clone()).unwrap_err().field,
            "confirm_password"
        );

        let unchanged = ProfileForm {
            password: String::new(),
            confirm_password: String::new(),
            ..form
        };
        let update = ProfileUpdate::try_from(unchanged).unwrap();
        assert_eq!(update.password, None);
        assert_eq!(update.fields().len(), 3);
    }
}
