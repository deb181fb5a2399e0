use crate::auth::Session;
use crate::error::ApiError;
use crate::store::Store;
use crate::types::{
    now_rfc3339, BookingStatus, CreateReviewRequest, RatingSummary, Review, ReviewView,
};

/// Attach a review to one of the caller's completed bookings and refresh the
/// provider's rating.
pub async fn create<S: Store>(
    store: &S,
    session: &Session,
    req: CreateReviewRequest,
) -> Result<Review, ApiError> {
    let rating = u8::try_from(req.rating)
        .ok()
        .filter(|r| (1..=5).contains(r))
        .ok_or_else(|| ApiError::Validation("Rating must be between 1 and 5".to_string()))?;

    let booking = store
        .get_booking(req.booking_id.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))?;
    if booking.client_id != session.id() {
        return Err(ApiError::Unauthorized("Not authorized".to_string()));
    }
    if booking.status != BookingStatus::Completed {
        return Err(ApiError::InvalidState(
            "Can only review completed bookings".to_string(),
        ));
    }
    if store.find_review_by_booking(&booking.id).await?.is_some() {
        return Err(ApiError::Conflict("Booking already reviewed".to_string()));
    }

    let review = Review {
        id: uuid::Uuid::new_v4().to_string(),
        booking_id: booking.id,
        client_id: session.id().to_string(),
        provider_id: booking.provider_id,
        rating,
        comment: req.comment.trim().to_string(),
        created_at: now_rfc3339(),
    };
    store.create_review(&review).await?;
    tracing::info!(
        "Review {} ({} stars) added for provider {}",
        review.id,
        review.rating,
        review.provider_id
    );

    recompute_rating(store, &review.provider_id).await?;
    Ok(review)
}

/// Rebuild a provider's rating from every review that references it.
pub async fn recompute_rating<S: Store>(
    store: &S,
    provider_id: &str,
) -> Result<RatingSummary, ApiError> {
    let reviews = store.list_reviews_for_provider(provider_id).await?;
    let summary = RatingSummary::from_ratings(reviews.iter().map(|r| r.rating));
    if store.set_provider_rating(provider_id, summary).await? {
        tracing::info!(
            "Provider {} rating is now {:.2} over {} reviews",
            provider_id,
            summary.average,
            summary.count
        );
    } else {
        tracing::warn!("Skipped rating update, provider {} is gone", provider_id);
    }
    Ok(summary)
}

pub(crate) async fn views<S: Store>(
    store: &S,
    mut reviews: Vec<Review>,
) -> Result<Vec<ReviewView>, ApiError> {
    reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let mut out = Vec::with_capacity(reviews.len());
    for review in reviews {
        let client_name = store.get_identity(&review.client_id).await?.map(|i| i.name);
        out.push(ReviewView {
            review,
            client_name,
        });
    }
    Ok(out)
}

pub async fn list_for_provider<S: Store>(
    store: &S,
    provider_id: &str,
) -> Result<Vec<ReviewView>, ApiError> {
    let reviews = store.list_reviews_for_provider(provider_id).await?;
    views(store, reviews).await
}
