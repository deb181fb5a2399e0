use crate::auth::Session;
use crate::error::ApiError;
use crate::store::Store;
use crate::types::{
    now_rfc3339, Location, ProviderProfile, ProviderSearch, ProviderSummary, ProviderView,
    PublicIdentity, Role, UpsertProviderRequest,
};

fn matches_filter(value: &str, filter: &Option<String>) -> bool {
    match filter.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(needle) => value
            .to_lowercase()
            .contains(&needle.to_lowercase()),
    }
}

impl ProviderSearch {
    /// Case-insensitive substring match on every filter that is set.
    pub fn matches(&self, profile: &ProviderProfile) -> bool {
        let service_ok = match self.service.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(_) => profile
                .services
                .iter()
                .any(|s| matches_filter(s, &self.service)),
        };
        service_ok
            && matches_filter(&profile.location.region, &self.region)
            && matches_filter(&profile.location.locality, &self.locality)
    }
}

/// Create or overwrite the caller's provider profile.
///
/// First creation needs an approved identity and promotes a client to the
/// provider role. Later calls replace every editable field; `verified`, the
/// rating and `createdAt` are kept.
pub async fn upsert<S: Store>(
    store: &S,
    session: &Session,
    req: UpsertProviderRequest,
) -> Result<ProviderProfile, ApiError> {
    let services = req.services.normalize();
    if services.is_empty() {
        return Err(ApiError::Validation(
            "Please provide at least one service".to_string(),
        ));
    }
    let region = req.region.trim().to_string();
    let locality = req.locality.trim().to_string();
    if region.is_empty() || locality.is_empty() {
        return Err(ApiError::Validation(
            "Please provide region and locality".to_string(),
        ));
    }
    let contact_handle = match req.contact_handle.trim() {
        "" => session.identity.contact_handle.clone(),
        handle => handle.to_string(),
    };
    if contact_handle.is_empty() {
        return Err(ApiError::Validation(
            "Please provide a contact handle".to_string(),
        ));
    }
    let location = Location { region, locality };
    let bio = req.bio.trim().to_string();

    match store.find_provider_by_identity(session.id()).await? {
        Some(existing) => {
            let profile = ProviderProfile {
                services,
                bio,
                location,
                contact_handle,
                ..existing
            };
            store.update_provider(&profile).await?;
            tracing::info!("Provider profile {} updated", profile.id);
            Ok(profile)
        }
        None => {
            if !session.identity.approved {
                return Err(ApiError::Forbidden(
                    "Your account must be approved before creating a provider profile"
                        .to_string(),
                ));
            }
            let profile = ProviderProfile {
                id: uuid::Uuid::new_v4().to_string(),
                identity_id: session.id().to_string(),
                services,
                bio,
                location,
                contact_handle,
                verified: false,
                rating_average: 0.0,
                rating_count: 0,
                created_at: now_rfc3339(),
            };
            store.create_provider(&profile).await?;
            tracing::info!(
                "Provider profile {} created for user {}",
                profile.id,
                profile.identity_id
            );

            if session.role() == Role::Client {
                let mut identity = session.identity.clone();
                identity.role = Role::Provider;
                store.update_identity(&identity).await?;
                tracing::info!("User {} promoted to provider", identity.id);
            }
            Ok(profile)
        }
    }
}

/// Newest-first list of profiles that pass the filters.
pub async fn search<S: Store>(
    store: &S,
    filters: &ProviderSearch,
    verified_only: bool,
) -> Result<Vec<ProviderView>, ApiError> {
    let mut profiles: Vec<ProviderProfile> = store
        .list_providers()
        .await?
        .into_iter()
        .filter(|p| !verified_only || p.verified)
        .filter(|p| filters.matches(p))
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

async fn detailed_view<S: Store>(
    store: &S,
    profile: ProviderProfile,
) -> Result<ProviderView, ApiError> {
    let owner = store
        .get_identity(&profile.identity_id)
        .await?
        .map(|i| PublicIdentity::with_contact(&i));
    Ok(ProviderView { profile, owner })
}

pub async fn get_by_id<S: Store>(store: &S, id: &str) -> Result<ProviderView, ApiError> {
    let profile = store
        .get_provider(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Provider not found".to_string()))?;
    detailed_view(store, profile).await
}

pub async fn get_mine<S: Store>(store: &S, session: &Session) -> Result<ProviderView, ApiError> {
    let profile = store
        .find_provider_by_identity(session.id())
        .await?
        .ok_or_else(|| ApiError::NotFound("Provider profile not found".to_string()))?;
    detailed_view(store, profile).await
}

/// Compact provider block embedded in booking listings.
pub(crate) async fn summary<S: Store>(
    store: &S,
    provider_id: &str,
) -> Result<Option<ProviderSummary>, ApiError> {
    let Some(profile) = store.get_provider(provider_id).await? else {
        return Ok(None);
    };
    let owner = store
        .get_identity(&profile.identity_id)
        .await?
        .map(|i| PublicIdentity::of(&i));
    Ok(Some(ProviderSummary {
        id: profile.id,
        services: profile.services,
        location: profile.location,
        owner,
    }))
}
