use crate::auth::Session;
use crate::error::ApiError;
use crate::providers;
use crate::store::Store;
use crate::types::{
    now_rfc3339, Booking, BookingStatus, BookingView, CreateBookingRequest, PublicIdentity, Role,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_scheduled_at(raw: &str) -> Result<String, ApiError> {
    let raw = raw.trim();
    let parsed: Option<DateTime<Utc>> = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        });
    parsed
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| ApiError::Validation(format!("Invalid booking date '{}'", raw)))
}

/// Record a pending booking from the calling client.
pub async fn create<S: Store>(
    store: &S,
    session: &Session,
    req: CreateBookingRequest,
) -> Result<Booking, ApiError> {
    session.require_role(Role::Client)?;

    let provider_id = req.provider_id.trim();
    let service_name = req.service_name.trim();
    if provider_id.is_empty() || service_name.is_empty() || req.scheduled_at.trim().is_empty() {
        return Err(ApiError::Validation(
            "Please provide providerId, service and bookingDate".to_string(),
        ));
    }
    let scheduled_at = parse_scheduled_at(&req.scheduled_at)?;

    if store.get_provider(provider_id).await?.is_none() {
        return Err(ApiError::NotFound("Provider not found".to_string()));
    }

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        client_id: session.id().to_string(),
        provider_id: provider_id.to_string(),
        service_name: service_name.to_string(),
        scheduled_at,
        status: BookingStatus::Pending,
        created_at: now_rfc3339(),
    };
    store.create_booking(&booking).await?;
    tracing::info!(
        "Booking {} created by {} for provider {}",
        booking.id,
        booking.client_id,
        booking.provider_id
    );
    Ok(booking)
}

/// Join bookings with client, provider and review state, newest first.
pub(crate) async fn views<S: Store>(
    store: &S,
    mut bookings: Vec<Booking>,
) -> Result<Vec<BookingView>, ApiError> {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut out = Vec::with_capacity(bookings.len());
    for booking in bookings {
        let client = store
            .get_identity(&booking.client_id)
            .await?
            .map(|i| PublicIdentity::of(&i));
        let provider = providers::summary(store, &booking.provider_id).await?;
        let is_reviewed = store.find_review_by_booking(&booking.id).await?.is_some();
        out.push(BookingView {
            booking,
            client,
            provider,
            is_reviewed,
        });
    }
    Ok(out)
}

/// Providers see bookings made against their profile; everyone else sees
/// the bookings they made.
pub async fn list_for_actor<S: Store>(
    store: &S,
    session: &Session,
) -> Result<Vec<BookingView>, ApiError> {
    let bookings = match session.role() {
        Role::Provider => {
            let profile = store
                .find_provider_by_identity(session.id())
                .await?
                .ok_or_else(|| ApiError::NotFound("Provider profile not found".to_string()))?;
            store.list_bookings_for_provider(&profile.id).await?
        }
        Role::Client | Role::Admin => store.list_bookings_for_client(session.id()).await?,
    };
    views(store, bookings).await
}

/// Move a booking along its lifecycle. Only the owning provider may do so.
pub async fn transition_status<S: Store>(
    store: &S,
    session: &Session,
    booking_id: &str,
    status: &str,
) -> Result<Booking, ApiError> {
    let mut booking = store
        .get_booking(booking_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))?;

    let owns = store
        .find_provider_by_identity(session.id())
        .await?
        .is_some_and(|p| p.id == booking.provider_id);
    if !owns {
        return Err(ApiError::Unauthorized("Not authorized".to_string()));
    }

    let next: BookingStatus = status.parse().map_err(ApiError::Validation)?;
    if booking.status.is_terminal() {
        return Err(ApiError::InvalidState(format!(
            "Booking is already {}",
            booking.status
        )));
    }
    if !booking.status.can_transition_to(next) {
        return Err(ApiError::InvalidState(format!(
            "Cannot change booking status from {} to {}",
            booking.status, next
        )));
    }

    store
        .update_booking_status(&booking.id, booking.status, next)
        .await?;
    tracing::info!(
        "Booking {} moved from {} to {}",
        booking.id,
        booking.status,
        next
    );
    booking.status = next;
    Ok(booking)
}
