//! Runtime configuration.

use std::env;

/// Longest session lifetime accepted, one year.
pub const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 60 * 60;

pub struct AppConfig {
    pub listen_addr: String,
    pub api_base_url: String,
    /// Origin encoded into QR codes. When unset, the request's `Host` is used.
    pub public_origin: Option<String>,
    pub session_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub items_per_page: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            api_base_url: "http://localhost:4000/api".to_string(),
            public_origin: None,
            session_ttl_secs: 24 * 60 * 60, // 24 hours
            request_timeout_secs: 30,
            items_per_page: 6,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `FLEET_*` environment variables.
    ///
    /// Unparseable numeric values are ignored with a warning; a session
    /// lifetime above [`MAX_SESSION_TTL_SECS`] is clamped.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = env::var("FLEET_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Ok(url) = env::var("FLEET_API_URL") {
            config.api_base_url = url;
        }
        if let Ok(origin) = env::var("FLEET_PUBLIC_ORIGIN") {
            if !origin.trim().is_empty() {
                config.public_origin = Some(origin);
            }
        }
        if let Ok(ttl) = env::var("FLEET_SESSION_TTL_SECS") {
            match parse_session_ttl(&ttl) {
                Some(secs) => config.session_ttl_secs = secs,
                None => log::warn!("ignoring invalid FLEET_SESSION_TTL_SECS={}", ttl),
            }
        }

        config
    }

    pub fn with_listen_addr(mut self, addr: &str) -> Self {
        self.listen_addr = addr.to_string();
        self
    }

    pub fn with_api_base_url(mut self, url: &str) -> Self {
        self.api_base_url = url.to_string();
        self
    }

    pub fn with_public_origin(mut self, origin: &str) -> Self {
        self.public_origin = Some(origin.to_string());
        self
    }

    pub fn with_session_ttl(mut self, secs: u64) -> Self {
        self.session_ttl_secs = secs.min(MAX_SESSION_TTL_SECS);
        self
    }
}

fn parse_session_ttl(raw: &str) -> Option<u64> {
    let secs: u64 = raw.trim().parse().ok()?;
    if secs > MAX_SESSION_TTL_SECS {
        log::warn!(
            "FLEET_SESSION_TTL_SECS={} exceeds one year, using {}",
            secs,
            MAX_SESSION_TTL_SECS
        );
    }
    Some(secs.min(MAX_SESSION_TTL_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = AppConfig::new()
            .with_api_base_url("http://api.internal")
            .with_public_origin("https://catalogo.example")
            .with_session_ttl(60);

        assert_eq!(config.api_base_url, "http://api.internal");
        assert_eq!(config.public_origin.as_deref(), Some("https://catalogo.example"));
        assert_eq!(config.session_ttl_secs, 60);
        assert_eq!(config.items_per_page, 6);
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
    }

    #[test]
    fn session_ttl_is_clamped() {
        assert_eq!(parse_session_ttl(" 3600 "), Some(3600));
        assert_eq!(parse_session_ttl("-5"), None);
        assert_eq!(parse_session_ttl("soon"), None);
        assert_eq!(
            parse_session_ttl("18446744073709551615"),
            Some(MAX_SESSION_TTL_SECS)
        );
        let config = AppConfig::new().with_session_ttl(u64::MAX);
        assert_eq!(config.session_ttl_secs, MAX_SESSION_TTL_SECS);
    }
}
