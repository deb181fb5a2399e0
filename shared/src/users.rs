use crate::auth::{self, Session};
use crate::config::Config;
use crate::error::ApiError;
use crate::store::Store;
use crate::types::{
    now_rfc3339, AuthResponse, Identity, LoginRequest, RegisterRequest, Role,
    UpdateProfileRequest,
};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Result of a registration; the token is set when the caller must mail a
/// verification link.
#[derive(Debug)]
pub struct Registration {
    pub identity: Identity,
    pub verification_token: Option<String>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ApiError::Validation("Please provide a valid email".to_string()))
    }
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn new_verification_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Create an unapproved identity. Admin accounts cannot be self-registered.
pub async fn register<S: Store>(
    store: &S,
    config: &Config,
    req: RegisterRequest,
) -> Result<Registration, ApiError> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation(
            "Please provide name, email and password".to_string(),
        ));
    }
    validate_email(&email)?;
    validate_password(&req.password)?;

    let role = match req.role.as_deref().map(str::parse::<Role>) {
        None => Role::Client,
        Some(Ok(Role::Admin)) => {
            return Err(ApiError::Forbidden(
                "Admin accounts cannot be self-registered".to_string(),
            ))
        }
        Some(Ok(role)) => role,
        Some(Err(e)) => return Err(ApiError::Validation(e)),
    };

    tracing::info!("Register request for: {}", email);
    if store.find_identity_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("User already exists".to_string()));
    }

    let verification_token = config
        .require_email_verification
        .then(new_verification_token);
    let identity = Identity {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        email,
        password_hash: auth::hash_password(&req.password)?,
        role,
        approved: false,
        contact_handle: req.contact_handle.trim().to_string(),
        avatar_url: None,
        email_verification_token: verification_token.clone(),
        created_at: now_rfc3339(),
    };
    store.create_identity(&identity).await?;
    tracing::info!("User {} created, awaiting approval", identity.id);

    Ok(Registration {
        identity,
        verification_token,
    })
}

pub async fn login<S: Store>(
    store: &S,
    config: &Config,
    req: LoginRequest,
) -> Result<AuthResponse, ApiError> {
    let email = normalize_email(&req.email);
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let identity = store
        .find_identity_by_email(&email)
        .await?
        .ok_or_else(invalid)?;
    if !auth::verify_password(&req.password, &identity.password_hash) {
        tracing::warn!("Failed login for {}", identity.id);
        return Err(invalid());
    }
    if !identity.approved {
        return Err(ApiError::Unauthorized(
            "Account pending approval. Please verify your email or contact support.".to_string(),
        ));
    }

    let token = auth::issue_token(&identity.id, config)?;
    tracing::info!("User {} logged in", identity.id);
    Ok(AuthResponse { identity, token })
}

/// Redeem an emailed verification token. The token is single use.
pub async fn verify_email<S: Store>(store: &S, token: &str) -> Result<Identity, ApiError> {
    let mut identity = store
        .find_identity_by_verification_token(token)
        .await?
        .ok_or(ApiError::InvalidToken)?;
    identity.approved = true;
    identity.email_verification_token = None;
    store.update_identity(&identity).await?;
    tracing::info!("Email verified for user {}", identity.id);
    Ok(identity)
}

/// Update the caller's own account. Blank or missing fields keep their value.
pub async fn update_profile<S: Store>(
    store: &S,
    config: &Config,
    session: &Session,
    req: UpdateProfileRequest,
) -> Result<AuthResponse, ApiError> {
    let mut identity = store
        .get_identity(session.id())
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let present = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    if let Some(name) = present(req.name) {
        identity.name = name;
    }
    if let Some(email) = present(req.email) {
        let email = normalize_email(&email);
        validate_email(&email)?;
        if email != identity.email {
            if let Some(owner) = store.find_identity_by_email(&email).await? {
                if owner.id != identity.id {
                    return Err(ApiError::Conflict("Email already in use".to_string()));
                }
            }
            identity.email = email;
        }
    }
    if let Some(contact) = present(req.contact_handle) {
        identity.contact_handle = contact;
    }
    if let Some(url) = present(req.avatar_url) {
        identity.avatar_url = Some(url);
    }
    if let Some(password) = req.password.filter(|p| !p.is_empty()) {
        validate_password(&password)?;
        identity.password_hash = auth::hash_password(&password)?;
    }

    store.update_identity(&identity).await?;
    tracing::info!("Profile updated for user {}", identity.id);

    let token = auth::issue_token(&identity.id, config)?;
    Ok(AuthResponse { identity, token })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryStore;

    pub(crate) fn register_request(name: &str, email: &str, role: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: "password123".to_string(),
            role: role.map(str::to_string),
            contact_handle: "254700000000".to_string(),
        }
    }

    /// Register and approve an identity in one go.
    pub(crate) async fn approved_identity(
        store: &MemoryStore,
        name: &str,
        email: &str,
        role: Role,
    ) -> Identity {
        let registration = register(
            store,
            &Config::local(),
            register_request(name, email, None),
        )
        .await
        .unwrap();
        let mut identity = registration.identity;
        identity.approved = true;
        identity.role = role;
        store.update_identity(&identity).await.unwrap();
        identity
    }

    pub(crate) fn session(identity: &Identity) -> Session {
        Session {
            identity: identity.clone(),
        }
    }

    #[tokio::test]
    async fn test_register_creates_pending_client() {
        let store = MemoryStore::new();
        let registration = register(
            &store,
            &Config::local(),
            register_request("Wanjiku", "  Wanjiku@Example.com ", None),
        )
        .await
        .unwrap();

        let identity = registration.identity;
        assert_eq!(identity.email, "wanjiku@example.com");
        assert_eq!(identity.role, Role::Client);
        assert!(!identity.approved);
        assert!(registration.verification_token.is_none());
        assert_ne!(identity.password_hash, "password123");
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_admins() {
        let store = MemoryStore::new();
        let config = Config::local();
        register(&store, &config, register_request("A", "a@example.com", None))
            .await
            .unwrap();

        let dup = register(&store, &config, register_request("A2", "A@example.com", None)).await;
        assert!(matches!(dup, Err(ApiError::Conflict(_))));

        let admin = register(
            &store,
            &config,
            register_request("Mallory", "m@example.com", Some("admin")),
        )
        .await;
        assert!(matches!(admin, Err(ApiError::Forbidden(_))));

        let bad_email = register(&store, &config, register_request("B", "nope", None)).await;
        assert!(matches!(bad_email, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_requires_approval() {
        let store = MemoryStore::new();
        let config = Config::local();
        let registration = register(
            &store,
            &config,
            register_request("Otieno", "otieno@example.com", Some("provider")),
        )
        .await
        .unwrap();

        let login_req = || LoginRequest {
            email: "otieno@example.com".to_string(),
            password: "password123".to_string(),
        };
        let pending = login(&store, &config, login_req()).await;
        assert!(matches!(pending, Err(ApiError::Unauthorized(_))));

        let mut identity = registration.identity;
        identity.approved = true;
        store.update_identity(&identity).await.unwrap();

        let resp = login(&store, &config, login_req()).await.unwrap();
        assert_eq!(resp.identity.role, Role::Provider);
        assert_eq!(
            auth::verify_token(&resp.token, &config).unwrap().sub,
            identity.id
        );

        let wrong = login(
            &store,
            &config,
            LoginRequest {
                email: "otieno@example.com".to_string(),
                password: "wrong-password".to_string(),
            },
        )
        .await;
        assert!(matches!(wrong, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_email_verification_flow() {
        let store = MemoryStore::new();
        let config = Config {
            require_email_verification: true,
            ..Config::local()
        };
        let registration = register(
            &store,
            &config,
            register_request("Kamau", "kamau@example.com", None),
        )
        .await
        .unwrap();
        let token = registration.verification_token.unwrap();
        assert_eq!(token.len(), 64);

        let verified = verify_email(&store, &token).await.unwrap();
        assert!(verified.approved);
        assert!(verified.email_verification_token.is_none());

        // Single use
        assert!(matches!(
            verify_email(&store, &token).await,
            Err(ApiError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_update_profile_keeps_blank_fields() {
        let store = MemoryStore::new();
        let config = Config::local();
        let identity = approved_identity(&store, "Achieng", "achieng@example.com", Role::Client).await;
        let other = approved_identity(&store, "Other", "other@example.com", Role::Client).await;

        let resp = update_profile(
            &store,
            &config,
            &session(&identity),
            UpdateProfileRequest {
                name: Some("Achieng O.".to_string()),
                contact_handle: Some("  ".to_string()),
                avatar_url: Some("https://cdn.example.com/a.jpg".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(resp.identity.name, "Achieng O.");
        assert_eq!(resp.identity.contact_handle, "254700000000");
        assert_eq!(
            resp.identity.avatar_url.as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );

        let taken = update_profile(
            &store,
            &config,
            &session(&identity),
            UpdateProfileRequest {
                email: Some(other.email.clone()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(taken, Err(ApiError::Conflict(_))));

        update_profile(
            &store,
            &config,
            &session(&identity),
            UpdateProfileRequest {
                password: Some("new-password".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let relogin = login(
            &store,
            &config,
            LoginRequest {
                email: "achieng@example.com".to_string(),
                password: "new-password".to_string(),
            },
        )
        .await;
        assert!(relogin.is_ok());
    }
}
