//! In-memory [`Store`] used by tests and local runs.

use super::{Cascade, Store, StoreResult};
use crate::error::StoreError;
use crate::types::{
    Booking, BookingStatus, Feedback, FeedbackStatus, Identity, ProviderProfile, RatingSummary,
    Review,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    identities: BTreeMap<String, Identity>,
    providers: BTreeMap<String, ProviderProfile>,
    bookings: BTreeMap<String, Booking>,
    reviews: BTreeMap<String, Review>,
    feedback: BTreeMap<String, Feedback>,
}

/// All tables live behind one lock, so every operation (cascades included)
/// is atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    async fn create_identity(&self, identity: &Identity) -> StoreResult<()> {
        let mut tables = self.lock()?;
        if tables.identities.values().any(|i| i.email == identity.email) {
            return Err(StoreError::Conflict("User already exists".to_string()));
        }
        tables
            .identities
            .insert(identity.id.clone(), identity.clone());
        Ok(())
    }

    async fn get_identity(&self, id: &str) -> StoreResult<Option<Identity>> {
        Ok(self.lock()?.identities.get(id).cloned())
    }

    async fn find_identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        Ok(self
            .lock()?
            .identities
            .values()
            .find(|i| i.email == email)
            .cloned())
    }

    async fn find_identity_by_verification_token(
        &self,
        token: &str,
    ) -> StoreResult<Option<Identity>> {
        Ok(self
            .lock()?
            .identities
            .values()
            .find(|i| i.email_verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn update_identity(&self, identity: &Identity) -> StoreResult<()> {
        let mut tables = self.lock()?;
        if !tables.identities.contains_key(&identity.id) {
            return Err(StoreError::Conflict("User no longer exists".to_string()));
        }
        let email_taken = tables
            .identities
            .values()
            .any(|i| i.id != identity.id && i.email == identity.email);
        if email_taken {
            return Err(StoreError::Conflict("Email already in use".to_string()));
        }
        tables
            .identities
            .insert(identity.id.clone(), identity.clone());
        Ok(())
    }

    async fn list_identities(&self) -> StoreResult<Vec<Identity>> {
        Ok(self.lock()?.identities.values().cloned().collect())
    }

    async fn create_provider(&self, profile: &ProviderProfile) -> StoreResult<()> {
        let mut tables = self.lock()?;
        if tables
            .providers
            .values()
            .any(|p| p.identity_id == profile.identity_id)
        {
            return Err(StoreError::Conflict(
                "Provider profile already exists".to_string(),
            ));
        }
        tables.providers.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn get_provider(&self, id: &str) -> StoreResult<Option<ProviderProfile>> {
        Ok(self.lock()?.providers.get(id).cloned())
    }

    async fn find_provider_by_identity(
        &self,
        identity_id: &str,
    ) -> StoreResult<Option<ProviderProfile>> {
        Ok(self
            .lock()?
            .providers
            .values()
            .find(|p| p.identity_id == identity_id)
            .cloned())
    }

    async fn update_provider(&self, profile: &ProviderProfile) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let stored = tables
            .providers
            .get_mut(&profile.id)
            .ok_or_else(|| StoreError::Conflict("Provider no longer exists".to_string()))?;
        let (average, count) = (stored.rating_average, stored.rating_count);
        *stored = ProviderProfile {
            rating_average: average,
            rating_count: count,
            ..profile.clone()
        };
        Ok(())
    }

    async fn set_provider_rating(
        &self,
        provider_id: &str,
        rating: RatingSummary,
    ) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        match tables.providers.get_mut(provider_id) {
            Some(profile) => {
                profile.rating_average = rating.average;
                profile.rating_count = rating.count;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_providers(&self) -> StoreResult<Vec<ProviderProfile>> {
        Ok(self.lock()?.providers.values().cloned().collect())
    }

    async fn create_booking(&self, booking: &Booking) -> StoreResult<()> {
        self.lock()?
            .bookings
            .insert(booking.id.clone(), booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: &str) -> StoreResult<Option<Booking>> {
        Ok(self.lock()?.bookings.get(id).cloned())
    }

    async fn update_booking_status(
        &self,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<()> {
        let mut tables = self.lock()?;
        match tables.bookings.get_mut(id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                Ok(())
            }
            _ => Err(StoreError::Conflict(
                "Booking was modified concurrently".to_string(),
            )),
        }
    }

    async fn list_bookings_for_client(&self, client_id: &str) -> StoreResult<Vec<Booking>> {
        Ok(self
            .lock()?
            .bookings
            .values()
            .filter(|b| b.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn list_bookings_for_provider(&self, provider_id: &str) -> StoreResult<Vec<Booking>> {
        Ok(self
            .lock()?
            .bookings
            .values()
            .filter(|b| b.provider_id == provider_id)
            .cloned()
            .collect())
    }

    async fn list_bookings(&self) -> StoreResult<Vec<Booking>> {
        Ok(self.lock()?.bookings.values().cloned().collect())
    }

    async fn create_review(&self, review: &Review) -> StoreResult<()> {
        let mut tables = self.lock()?;
        if tables
            .reviews
            .values()
            .any(|r| r.booking_id == review.booking_id)
        {
            return Err(StoreError::Conflict("Booking already reviewed".to_string()));
        }
        tables.reviews.insert(review.id.clone(), review.clone());
        Ok(())
    }

    async fn get_review(&self, id: &str) -> StoreResult<Option<Review>> {
        Ok(self.lock()?.reviews.get(id).cloned())
    }

    async fn find_review_by_booking(&self, booking_id: &str) -> StoreResult<Option<Review>> {
        Ok(self
            .lock()?
            .reviews
            .values()
            .find(|r| r.booking_id == booking_id)
            .cloned())
    }

    async fn list_reviews_for_provider(&self, provider_id: &str) -> StoreResult<Vec<Review>> {
        Ok(self
            .lock()?
            .reviews
            .values()
            .filter(|r| r.provider_id == provider_id)
            .cloned()
            .collect())
    }

    async fn list_reviews(&self) -> StoreResult<Vec<Review>> {
        Ok(self.lock()?.reviews.values().cloned().collect())
    }

    async fn create_feedback(&self, feedback: &Feedback) -> StoreResult<()> {
        self.lock()?
            .feedback
            .insert(feedback.id.clone(), feedback.clone());
        Ok(())
    }

    async fn get_feedback(&self, id: &str) -> StoreResult<Option<Feedback>> {
        Ok(self.lock()?.feedback.get(id).cloned())
    }

    async fn update_feedback_status(&self, id: &str, status: FeedbackStatus) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let feedback = tables
            .feedback
            .get_mut(id)
            .ok_or_else(|| StoreError::Conflict("Feedback no longer exists".to_string()))?;
        feedback.status = status;
        Ok(())
    }

    async fn delete_feedback(&self, id: &str) -> StoreResult<()> {
        self.lock()?.feedback.remove(id);
        Ok(())
    }

    async fn list_feedback(&self) -> StoreResult<Vec<Feedback>> {
        Ok(self.lock()?.feedback.values().cloned().collect())
    }

    async fn commit_cascade(&self, cascade: &Cascade) -> StoreResult<()> {
        let mut tables = self.lock()?;
        for review in &cascade.reviews {
            tables.reviews.remove(&review.id);
        }
        for booking in &cascade.bookings {
            tables.bookings.remove(&booking.id);
        }
        for profile in &cascade.providers {
            tables.providers.remove(&profile.id);
        }
        for identity in &cascade.identities {
            tables.identities.remove(&identity.id);
        }
        for (identity_id, role) in &cascade.role_changes {
            if let Some(identity) = tables.identities.get_mut(identity_id) {
                identity.role = *role;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookings::tests::{booking_request, completed_booking, fixture};
    use crate::error::ApiError;
    use crate::types::now_rfc3339;
    use crate::users::tests::session;
    use crate::{bookings, reviews};
    use lambda_http::http::StatusCode;

    fn review_for(booking: &Booking, rating: u8) -> Review {
        Review {
            id: uuid::Uuid::new_v4().to_string(),
            booking_id: booking.id.clone(),
            client_id: booking.client_id.clone(),
            provider_id: booking.provider_id.clone(),
            rating,
            comment: String::new(),
            created_at: now_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_stale_status_write_is_a_conflict() {
        let store = MemoryStore::new();
        let f = fixture(&store).await;
        let booking = bookings::create(&store, &session(&f.client), booking_request(&f.profile.id))
            .await
            .unwrap();
        bookings::transition_status(&store, &session(&f.provider), &booking.id, "accepted")
            .await
            .unwrap();

        // A writer that read the booking while it was still pending.
        let stale = store
            .update_booking_status(&booking.id, BookingStatus::Pending, BookingStatus::Cancelled)
            .await;
        let err = match stale {
            Err(e @ StoreError::Conflict(_)) => e,
            other => panic!("expected conflict, got {:?}", other),
        };
        let api: ApiError = err.into();
        assert!(matches!(api, ApiError::Conflict(_)));
        assert_eq!(api.status(), StatusCode::CONFLICT);

        let stored = store.get_booking(&booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Accepted);

        let missing = store
            .update_booking_status("missing", BookingStatus::Pending, BookingStatus::Accepted)
            .await;
        assert!(matches!(missing, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_second_review_for_booking_is_a_conflict() {
        let store = MemoryStore::new();
        let f = fixture(&store).await;
        let booking = completed_booking(&store, &f).await;

        store.create_review(&review_for(&booking, 4)).await.unwrap();
        let second = store.create_review(&review_for(&booking, 2)).await;
        assert!(matches!(second, Err(StoreError::Conflict(_))));

        let kept = store.list_reviews_for_provider(&f.profile.id).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].rating, 4);
        assert_eq!(
            reviews::recompute_rating(&store, &f.profile.id).await.unwrap().count,
            1
        );
    }
}
