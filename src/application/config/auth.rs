use std::env;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for session tokens. `None` means a per-process secret is generated.
    pub jwt_secret: Option<String>,
    pub token_ttl_secs: i64,
    pub secure_cookies: bool,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            jwt_secret: env::var("BACKOFFICE_JWT_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            token_ttl_secs: env::var("BACKOFFICE_TOKEN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(28_800),
            secure_cookies: env::var("BACKOFFICE_SECURE_COOKIES")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
        }
    }
}
