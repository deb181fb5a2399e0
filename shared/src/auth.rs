use crate::config::Config;
use crate::error::ApiError;
use crate::store::Store;
use crate::types::{Identity, Role};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Pre-encoded `{"alg":"HS256","typ":"JWT"}`.
const TOKEN_HEADER: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Upstream(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

fn sign(message: &str, secret: &str) -> Result<Vec<u8>, ApiError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::Upstream(format!("Invalid signing key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Issue an HS256 bearer token for `identity_id`.
pub fn issue_token(identity_id: &str, config: &Config) -> Result<String, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: identity_id.to_string(),
        iat: now,
        exp: now + config.token_ttl_days * 24 * 60 * 60,
    };
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&claims)
            .map_err(|e| ApiError::Upstream(format!("Failed to encode claims: {}", e)))?,
    );
    let signing_input = format!("{}.{}", TOKEN_HEADER, payload);
    let signature = URL_SAFE_NO_PAD.encode(sign(&signing_input, &config.jwt_secret)?);
    Ok(format!("{}.{}", signing_input, signature))
}

/// Check signature and expiry, returning the claims.
pub fn verify_token(token: &str, config: &Config) -> Result<Claims, ApiError> {
    let rejected = || ApiError::Unauthorized("Not authorized, token failed".to_string());

    let mut parts = token.split('.');
    let (header, payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => return Err(rejected()),
    };
    if header != TOKEN_HEADER {
        return Err(rejected());
    }

    let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| rejected())?;
    let mut mac = HmacSha256::new_from_slice(config.jwt_secret.as_bytes())
        .map_err(|e| ApiError::Upstream(format!("Invalid signing key: {}", e)))?;
    mac.update(format!("{}.{}", header, payload).as_bytes());
    mac.verify_slice(&signature).map_err(|_| rejected())?;

    let claims: Claims = URL_SAFE_NO_PAD
        .decode(payload)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(rejected)?;
    if claims.exp <= chrono::Utc::now().timestamp() {
        return Err(ApiError::Unauthorized("Session expired, please log in again".to_string()));
    }
    Ok(claims)
}

/// The caller of one request, resolved from its bearer token.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn role(&self) -> Role {
        self.identity.role
    }

    pub fn require_role(&self, role: Role) -> Result<(), ApiError> {
        if self.identity.role == role {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "User role {} is not authorized to access this route",
                self.identity.role
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        self.require_role(Role::Admin)
    }
}

/// Pull the token out of an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the session for a request. The identity is re-read on every call so
/// role and approval changes apply immediately.
pub async fn authenticate<S: Store>(
    store: &S,
    config: &Config,
    authorization: Option<&str>,
) -> Result<Session, ApiError> {
    let token = bearer_token(authorization)
        .ok_or_else(|| ApiError::Unauthorized("Not authorized, no token".to_string()))?;
    let claims = verify_token(token, config)?;
    let identity = store
        .get_identity(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Not authorized, user not found".to_string()))?;
    Ok(Session { identity })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_header_constant_matches_encoding() {
        assert_eq!(
            URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
            TOKEN_HEADER
        );
    }

    #[test]
    fn test_token_roundtrip() {
        let config = Config::local();
        let token = issue_token("user-1", &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 60 * 60);
    }

    #[test]
    fn test_token_with_other_secret_is_rejected() {
        let config = Config::local();
        let token = issue_token("user-1", &config).unwrap();

        let other = Config {
            jwt_secret: "another-secret".to_string(),
            ..Config::local()
        };
        assert!(matches!(
            verify_token(&token, &other),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let config = Config::local();
        let token = issue_token("user-1", &config).unwrap();
        let forged_claims = URL_SAFE_NO_PAD.encode(br#"{"sub":"admin","iat":0,"exp":99999999999}"#);
        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert!(verify_token(&forged, &config).is_err());
        assert!(verify_token("not-a-token", &config).is_err());
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("Sup3r-secret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Sup3r-secret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(Some("Basic xyz")), None);
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(None), None);
    }
}
