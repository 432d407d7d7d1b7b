//! Password hashing, session tokens and the identity extractors.
//!
//! Sessions are HS256 JWTs carried either in the `token` cookie (browser
//! clients) or an `Authorization: Bearer` header. The user id lives in the
//! `sub` claim; tokens minted with a `userId` claim are still accepted.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use taskflow_core::{logging, Error, Result};

use crate::config::SameSite;
use crate::{ApiError, AppState};

/// Name of the session cookie.
pub const TOKEN_COOKIE: &str = "token";

/// Session lifetime.
pub const TOKEN_TTL_DAYS: i64 = 7;

// =============================================================================
// PASSWORDS
// =============================================================================

/// Hash a password with Argon2id and a random salt, returning a PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| Error::Internal(format!("salt encoding failed: {}", e)))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Internal(format!("password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string. Malformed hashes never match.
pub fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// =============================================================================
// TOKENS
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    iat: i64,
    exp: i64,
}

/// Signing keys and cookie attributes for sessions.
#[derive(Clone)]
pub struct AuthSettings {
    encoding: EncodingKey,
    decoding: DecodingKey,
    cookie_secure: bool,
    same_site: SameSite,
}

impl AuthSettings {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            cookie_secure: false,
            same_site: SameSite::Lax,
        }
    }

    pub fn with_cookie(mut self, secure: bool, same_site: SameSite) -> Self {
        self.cookie_secure = secure;
        self.same_site = same_site;
        self
    }

    /// Mint a session token for `user_id`.
    pub fn issue_token(&self, user_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: Some(user_id.to_string()),
            user_id: None,
            iat: now.timestamp(),
            exp: (now + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("token signing failed: {}", e)))
    }

    /// Validate signature and expiry and return the user id.
    pub fn verify_token(&self, token: &str) -> Result<Uuid> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| Error::Unauthorized(format!("invalid token: {}", e)))?;
        let raw = data
            .claims
            .sub
            .or(data.claims.user_id)
            .ok_or_else(|| Error::Unauthorized("token has no subject".to_string()))?;
        Uuid::parse_str(&raw).map_err(|_| Error::Unauthorized("token subject is not a user id".to_string()))
    }

    /// `Set-Cookie` value carrying `token`.
    pub fn session_cookie(&self, token: &str) -> String {
        self.cookie(token, TOKEN_TTL_DAYS * 24 * 60 * 60)
    }

    /// `Set-Cookie` value that expires the session cookie.
    pub fn clear_cookie(&self) -> String {
        self.cookie("", 0)
    }

    fn cookie(&self, value: &str, max_age: i64) -> String {
        let mut cookie = format!(
            "{}={}; HttpOnly; Path=/; Max-Age={}; SameSite={}",
            TOKEN_COOKIE,
            value,
            max_age,
            self.same_site.as_str()
        );
        // Browsers drop SameSite=None cookies without Secure.
        if self.cookie_secure || self.same_site == SameSite::None {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Pull the session token from the cookie jar or a bearer header.
pub fn token_from_parts(parts: &Parts) -> Option<String> {
    let from_cookie = parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| cookie_value(v, TOKEN_COOKIE));
    if from_cookie.is_some() {
        return from_cookie;
    }
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn cookie_value(header_value: &str, name: &str) -> Option<String> {
    header_value.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name && !v.is_empty()).then(|| v.to_string())
    })
}

// =============================================================================
// EXTRACTORS
// =============================================================================

/// Identity if the request carries a valid session, `None` otherwise.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuth(pub Option<Uuid>);

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Some(token) = token_from_parts(parts) else {
            return Ok(MaybeAuth(None));
        };
        match state.auth.verify_token(&token) {
            Ok(id) => Ok(MaybeAuth(Some(id))),
            Err(e) => {
                tracing::debug!(
                    subsystem = logging::SUBSYSTEM_API,
                    component = logging::COMPONENT_AUTH,
                    error = %e,
                    "Ignoring invalid session token"
                );
                Ok(MaybeAuth(None))
            }
        }
    }
}

/// Authenticated caller. Rejects with 401 when there is no valid session.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        match MaybeAuth::from_request_parts(parts, state).await? {
            MaybeAuth(Some(id)) => Ok(AuthUser { id }),
            MaybeAuth(None) => Err(ApiError::Unauthorized("Not authenticated".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }

    #[test]
    fn test_token_roundtrip() {
        let auth = AuthSettings::new("secret");
        let id = Uuid::now_v7();
        let token = auth.issue_token(id).unwrap();
        assert_eq!(auth.verify_token(&token).unwrap(), id);
    }

    #[test]
    fn test_token_wrong_secret_rejected() {
        let token = AuthSettings::new("a").issue_token(Uuid::now_v7()).unwrap();
        let err = AuthSettings::new("b").verify_token(&token).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_legacy_user_id_claim_accepted() {
        let id = Uuid::now_v7();
        let claims = Claims {
            sub: None,
            user_id: Some(id.to_string()),
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert_eq!(AuthSettings::new("secret").verify_token(&token).unwrap(), id);
    }

    #[test]
    fn test_expired_token_rejected() {
        let claims = Claims {
            sub: Some(Uuid::now_v7().to_string()),
            user_id: None,
            iat: (Utc::now() - Duration::days(9)).timestamp(),
            exp: (Utc::now() - Duration::days(2)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(AuthSettings::new("secret").verify_token(&token).is_err());
    }

    #[test]
    fn test_token_from_cookie_or_bearer() {
        let p = parts(&[("cookie", "theme=dark; token=abc.def; other=1")]);
        assert_eq!(token_from_parts(&p).as_deref(), Some("abc.def"));

        let p = parts(&[("authorization", "Bearer xyz")]);
        assert_eq!(token_from_parts(&p).as_deref(), Some("xyz"));

        let p = parts(&[("cookie", "token=")]);
        assert_eq!(token_from_parts(&p), None);

        assert_eq!(token_from_parts(&parts(&[])), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let lax = AuthSettings::new("s");
        let c = lax.session_cookie("t");
        assert!(c.starts_with("token=t; HttpOnly; Path=/; Max-Age=604800"));
        assert!(c.contains("SameSite=Lax"));
        assert!(!c.contains("Secure"));

        let none = AuthSettings::new("s").with_cookie(false, SameSite::None);
        assert!(none.session_cookie("t").ends_with("; Secure"));
        assert!(none.clear_cookie().contains("Max-Age=0"));
    }
}
