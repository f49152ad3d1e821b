//! Password hashing and session tokens

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::CONFIG;
use crate::error::{AppError, Result};

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

static KEYS: Lazy<SigningKeys> = Lazy::new(|| {
    let secret = CONFIG.auth.jwt_secret.clone().unwrap_or_else(|| {
        tracing::warn!(
            "BACKOFFICE_JWT_SECRET is not set; sessions will not survive a restart"
        );
        generate_random_string(32)
    });
    SigningKeys::from_secret(secret.as_bytes())
});

/// Session token payload. `sub` is the user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Could not hash password: {}", e)))
}

/// A malformed stored hash counts as a mismatch
pub fn verify_password(password: &str, hash: &str) -> bool {
    matches!(bcrypt::verify(password, hash), Ok(true))
}

/// Signs a session token; `ttl_secs` overrides the configured lifetime
pub fn create_access_token(subject: &str, email: Option<&str>, ttl_secs: Option<i64>) -> Result<String> {
    let issued = Utc::now();
    let ttl = Duration::seconds(ttl_secs.unwrap_or(CONFIG.auth.token_ttl_secs));
    let claims = Claims {
        sub: subject.to_owned(),
        email: email.map(str::to_owned),
        iat: issued.timestamp(),
        exp: (issued + ttl).timestamp(),
        jti: Some(uuid::Uuid::new_v4().to_string()),
    };
    Ok(jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &KEYS.encoding,
    )?)
}

pub fn decode_token(token: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);
    let data = jsonwebtoken::decode::<Claims>(token, &KEYS.decoding, &validation)?;
    Ok(data.claims)
}

/// Hex string built from `bytes` random bytes
pub fn generate_random_string(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill(buf.as_mut_slice());
    hex::encode(buf)
}

/// Password for accounts created from the console without one
pub fn generate_secure_password(length: usize) -> String {
    const ALPHABET: &[u8] =
        b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789!@#$%&*-_";
    let mut rng = rand::rng();
    std::iter::repeat_with(|| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .take(length)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("backoffice-secret").unwrap();
        assert!(verify_password("backoffice-secret", &hash));
        assert!(!verify_password("backoffice-guess", &hash));
        assert!(!verify_password("anything", "$2b$not-a-real-hash"));
    }

    #[test]
    fn test_session_token_carries_user() {
        let token = create_access_token("7", Some("editor@example.com"), Some(300)).unwrap();
        let claims = decode_token(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.email.as_deref(), Some("editor@example.com"));
        assert!(claims.exp > claims.iat);
        assert!(claims.jti.is_some());
    }

    #[test]
    fn test_stale_or_altered_tokens_rejected() {
        let stale = create_access_token("7", None, Some(-120)).unwrap();
        assert!(matches!(decode_token(&stale), Err(AppError::Jwt(_))));

        let fresh = create_access_token("7", None, Some(300)).unwrap();
        let (head, _) = fresh.rsplit_once('.').unwrap();
        assert!(decode_token(&format!("{}.c2lnbmF0dXJl", head)).is_err());
    }

    #[test]
    fn test_generated_secrets() {
        let a = generate_random_string(16);
        assert_eq!(a.len(), 32);
        assert_ne!(a, generate_random_string(16));

        let password = generate_secure_password(24);
        assert_eq!(password.chars().count(), 24);
        assert!(!password.contains('0') && !password.contains('O'));
    }
}
