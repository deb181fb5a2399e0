//! Moderation surface: read-all listings, verification and cascading deletes.
//!
//! Deletes are planned into a [`Cascade`] first and committed in one call, then
//! every surviving provider that lost reviews has its rating rebuilt.

use crate::auth;
use crate::bookings;
use crate::error::ApiError;
use crate::reviews;
use crate::store::{Cascade, Store};
use crate::types::{
    now_rfc3339, Booking, BookingView, BulkOutcome, DashboardStats, Identity, ProviderProfile,
    ProviderView, PublicIdentity, ReviewView, Role,
};

pub async fn stats<S: Store>(store: &S) -> Result<DashboardStats, ApiError> {
    let providers = store.list_providers().await?;
    Ok(DashboardStats {
        total_users: store.list_identities().await?.len(),
        total_providers: providers.len(),
        total_bookings: store.list_bookings().await?.len(),
        pending_providers: providers.iter().filter(|p| !p.verified).count(),
    })
}

pub async fn list_users<S: Store>(store: &S) -> Result<Vec<Identity>, ApiError> {
    let mut users = store.list_identities().await?;
    users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(users)
}

/// Every provider profile, or only unverified ones.
pub async fn list_providers<S: Store>(
    store: &S,
    pending_only: bool,
) -> Result<Vec<ProviderView>, ApiError> {
    let mut profiles: Vec<ProviderProfile> = store
        .list_providers()
        .await?
        .into_iter()
        .filter(|p| !pending_only || !p.verified)
        .collect();
    profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut views = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let owner = store
            .get_identity(&profile.identity_id)
            .await?
            .map(|i| PublicIdentity::of(&i));
        views.push(ProviderView { profile, owner });
    }
    Ok(views)
}

pub async fn list_bookings<S: Store>(store: &S) -> Result<Vec<BookingView>, ApiError> {
    let all = store.list_bookings().await?;
    bookings::views(store, all).await
}

pub async fn list_reviews<S: Store>(store: &S) -> Result<Vec<ReviewView>, ApiError> {
    let all = store.list_reviews().await?;
    reviews::views(store, all).await
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

fn provider_not_found() -> ApiError {
    ApiError::NotFound("Provider not found".to_string())
}

/// Approve an identity. Approving twice is not an error.
pub async fn verify_identity<S: Store>(store: &S, id: &str) -> Result<Identity, ApiError> {
    let mut identity = store.get_identity(id).await?.ok_or_else(user_not_found)?;
    if identity.approved && identity.email_verification_token.is_none() {
        return Ok(identity);
    }
    identity.approved = true;
    identity.email_verification_token = None;
    store.update_identity(&identity).await?;
    tracing::info!("User {} approved", identity.id);
    Ok(identity)
}

pub async fn verify_provider<S: Store>(store: &S, id: &str) -> Result<ProviderProfile, ApiError> {
    let mut profile = store.get_provider(id).await?.ok_or_else(provider_not_found)?;
    if profile.verified {
        return Ok(profile);
    }
    profile.verified = true;
    store.update_provider(&profile).await?;
    tracing::info!("Provider {} verified", profile.id);
    Ok(profile)
}

pub async fn bulk_verify<S: Store>(store: &S, ids: &[String]) -> Result<BulkOutcome, ApiError> {
    let mut outcome = BulkOutcome {
        processed: Vec::new(),
        missing: Vec::new(),
    };
    for id in ids {
        match verify_identity(store, id).await {
            Ok(identity) => outcome.processed.push(identity.id),
            Err(ApiError::NotFound(_)) => outcome.missing.push(id.clone()),
            Err(e) => return Err(e),
        }
    }
    Ok(outcome)
}

pub async fn bulk_delete<S: Store>(store: &S, ids: &[String]) -> Result<BulkOutcome, ApiError> {
    let mut outcome = BulkOutcome {
        processed: Vec::new(),
        missing: Vec::new(),
    };
    for id in ids {
        match delete_identity(store, id).await {
            Ok(()) => outcome.processed.push(id.clone()),
            Err(ApiError::NotFound(_)) => outcome.missing.push(id.clone()),
            Err(e) => return Err(e),
        }
    }
    Ok(outcome)
}

// ---- cascade planning ----

async fn add_bookings<S: Store>(
    store: &S,
    cascade: &mut Cascade,
    bookings: Vec<Booking>,
) -> Result<(), ApiError> {
    for booking in bookings {
        if cascade.bookings.iter().any(|b| b.id == booking.id) {
            continue;
        }
        if let Some(review) = store.find_review_by_booking(&booking.id).await? {
            cascade.reviews.push(review);
        }
        cascade.bookings.push(booking);
    }
    Ok(())
}

async fn add_provider<S: Store>(
    store: &S,
    cascade: &mut Cascade,
    profile: ProviderProfile,
) -> Result<(), ApiError> {
    let bookings = store.list_bookings_for_provider(&profile.id).await?;
    add_bookings(store, cascade, bookings).await?;
    cascade.providers.push(profile);
    Ok(())
}

/// Profile, its bookings and their reviews; the owner drops back to client.
pub async fn plan_provider_delete<S: Store>(
    store: &S,
    profile: ProviderProfile,
) -> Result<Cascade, ApiError> {
    let mut cascade = Cascade::default();
    if let Some(owner) = store.get_identity(&profile.identity_id).await? {
        if owner.role == Role::Provider {
            cascade.role_changes.push((owner.id, Role::Client));
        }
    }
    add_provider(store, &mut cascade, profile).await?;
    Ok(cascade)
}

/// Identity, its provider profile (with that profile's bookings) and every
/// booking it made as a client, each with its review.
pub async fn plan_identity_delete<S: Store>(
    store: &S,
    identity: Identity,
) -> Result<Cascade, ApiError> {
    let mut cascade = Cascade::default();
    if let Some(profile) = store.find_provider_by_identity(&identity.id).await? {
        add_provider(store, &mut cascade, profile).await?;
    }
    let as_client = store.list_bookings_for_client(&identity.id).await?;
    add_bookings(store, &mut cascade, as_client).await?;
    cascade.identities.push(identity);
    Ok(cascade)
}

async fn commit<S: Store>(store: &S, cascade: &Cascade) -> Result<(), ApiError> {
    store.commit_cascade(cascade).await?;
    tracing::info!(
        "Cascade committed: {} identities, {} providers, {} bookings, {} reviews, {} role changes",
        cascade.identities.len(),
        cascade.providers.len(),
        cascade.bookings.len(),
        cascade.reviews.len(),
        cascade.role_changes.len()
    );
    for provider_id in cascade.affected_providers() {
        reviews::recompute_rating(store, &provider_id).await?;
    }
    Ok(())
}

pub async fn delete_identity<S: Store>(store: &S, id: &str) -> Result<(), ApiError> {
    let identity = store.get_identity(id).await?.ok_or_else(user_not_found)?;
    let cascade = plan_identity_delete(store, identity).await?;
    commit(store, &cascade).await
}

pub async fn delete_provider<S: Store>(store: &S, id: &str) -> Result<(), ApiError> {
    let profile = store.get_provider(id).await?.ok_or_else(provider_not_found)?;
    let cascade = plan_provider_delete(store, profile).await?;
    commit(store, &cascade).await
}

/// Removes the booking and its review.
pub async fn delete_booking<S: Store>(store: &S, id: &str) -> Result<(), ApiError> {
    let booking = store
        .get_booking(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))?;
    let mut cascade = Cascade::default();
    add_bookings(store, &mut cascade, vec![booking]).await?;
    commit(store, &cascade).await
}

pub async fn delete_review<S: Store>(store: &S, id: &str) -> Result<(), ApiError> {
    let review = store
        .get_review(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Review not found".to_string()))?;
    let cascade = Cascade {
        reviews: vec![review],
        ..Cascade::default()
    };
    commit(store, &cascade).await
}

/// Drop one offered service (case-insensitive) from a profile.
pub async fn delete_provider_service<S: Store>(
    store: &S,
    id: &str,
    service: &str,
) -> Result<ProviderProfile, ApiError> {
    let mut profile = store.get_provider(id).await?.ok_or_else(provider_not_found)?;
    let service = service.trim();
    let before = profile.services.len();
    profile.services.retain(|s| !s.eq_ignore_ascii_case(service));
    if profile.services.len() != before {
        store.update_provider(&profile).await?;
        tracing::info!("Service '{}' removed from provider {}", service, profile.id);
    }
    Ok(profile)
}

/// Create the administrator account, or promote and re-key an existing
/// identity with that email.
pub async fn ensure_admin<S: Store>(
    store: &S,
    email: &str,
    password: &str,
    name: &str,
    contact_handle: &str,
) -> Result<Identity, ApiError> {
    let email = crate::users::normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "Admin email and password are required".to_string(),
        ));
    }
    let password_hash = auth::hash_password(password)?;

    match store.find_identity_by_email(&email).await? {
        Some(mut identity) => {
            identity.role = Role::Admin;
            identity.approved = true;
            identity.email_verification_token = None;
            identity.password_hash = password_hash;
            store.update_identity(&identity).await?;
            tracing::info!("Existing user {} promoted to admin", identity.id);
            Ok(identity)
        }
        None => {
            let identity = Identity {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                email,
                password_hash,
                role: Role::Admin,
                approved: true,
                contact_handle: contact_handle.to_string(),
                avatar_url: None,
                email_verification_token: None,
                created_at: now_rfc3339(),
            };
            store.create_identity(&identity).await?;
            tracing::info!("Admin user {} created", identity.id);
            Ok(identity)
        }
    }
}
