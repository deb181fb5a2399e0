//! Persistence seam for every PataJob record.
//!
//! Handlers never talk to DynamoDB directly; they go through [`Store`] so the
//! same business rules run against the single-table DynamoDB layout in
//! production and the in-memory tables in tests.

pub mod dynamo;
pub mod memory;

use crate::error::StoreError;
use crate::types::{
    Booking, BookingStatus, Feedback, FeedbackStatus, Identity, ProviderProfile, RatingSummary,
    Review, Role,
};
use std::future::Future;

pub use dynamo::DynamoStore;
pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// A set of deletes and role changes that must land together.
///
/// Built by the moderation layer; dependents (reviews, bookings) are removed
/// before the records that own them.
#[derive(Debug, Default, Clone)]
pub struct Cascade {
    pub reviews: Vec<Review>,
    pub bookings: Vec<Booking>,
    pub providers: Vec<ProviderProfile>,
    pub identities: Vec<Identity>,
    pub role_changes: Vec<(String, Role)>,
}

impl Cascade {
    /// Provider ids whose rating must be recomputed once this cascade commits,
    /// excluding providers removed by the cascade itself.
    pub fn affected_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for review in &self.reviews {
            let deleted = self.providers.iter().any(|p| p.id == review.provider_id);
            if !deleted && !ids.contains(&review.provider_id) {
                ids.push(review.provider_id.clone());
            }
        }
        ids
    }
}

pub trait Store: Send + Sync {
    // ---- identities ----

    /// Insert a new identity. Fails with `StoreError::Conflict` when the
    /// email is already registered.
    fn create_identity(&self, identity: &Identity) -> impl Future<Output = StoreResult<()>> + Send;

    fn get_identity(&self, id: &str) -> impl Future<Output = StoreResult<Option<Identity>>> + Send;

    fn find_identity_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = StoreResult<Option<Identity>>> + Send;

    fn find_identity_by_verification_token(
        &self,
        token: &str,
    ) -> impl Future<Output = StoreResult<Option<Identity>>> + Send;

    /// Overwrite an existing identity, keeping the email and verification
    /// token lookups in step. A new email that belongs to someone else is a
    /// `StoreError::Conflict`.
    fn update_identity(&self, identity: &Identity) -> impl Future<Output = StoreResult<()>> + Send;

    fn list_identities(&self) -> impl Future<Output = StoreResult<Vec<Identity>>> + Send;

    // ---- provider profiles ----

    /// Insert a profile. At most one profile per identity.
    fn create_provider(
        &self,
        profile: &ProviderProfile,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn get_provider(
        &self,
        id: &str,
    ) -> impl Future<Output = StoreResult<Option<ProviderProfile>>> + Send;

    fn find_provider_by_identity(
        &self,
        identity_id: &str,
    ) -> impl Future<Output = StoreResult<Option<ProviderProfile>>> + Send;

    /// Overwrite the editable fields of a profile. Rating fields are left
    /// untouched; only [`Store::set_provider_rating`] writes them.
    fn update_provider(
        &self,
        profile: &ProviderProfile,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Returns `false` when the provider no longer exists.
    fn set_provider_rating(
        &self,
        provider_id: &str,
        rating: RatingSummary,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn list_providers(&self) -> impl Future<Output = StoreResult<Vec<ProviderProfile>>> + Send;

    // ---- bookings ----

    fn create_booking(&self, booking: &Booking) -> impl Future<Output = StoreResult<()>> + Send;

    fn get_booking(&self, id: &str) -> impl Future<Output = StoreResult<Option<Booking>>> + Send;

    /// Compare-and-set on the status. Fails with `StoreError::Conflict` when
    /// the stored status is no longer `from`.
    fn update_booking_status(
        &self,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn list_bookings_for_client(
        &self,
        client_id: &str,
    ) -> impl Future<Output = StoreResult<Vec<Booking>>> + Send;

    fn list_bookings_for_provider(
        &self,
        provider_id: &str,
    ) -> impl Future<Output = StoreResult<Vec<Booking>>> + Send;

    fn list_bookings(&self) -> impl Future<Output = StoreResult<Vec<Booking>>> + Send;

    // ---- reviews ----

    /// Insert a review. A second review for the same booking is a
    /// `StoreError::Conflict`.
    fn create_review(&self, review: &Review) -> impl Future<Output = StoreResult<()>> + Send;

    fn get_review(&self, id: &str) -> impl Future<Output = StoreResult<Option<Review>>> + Send;

    fn find_review_by_booking(
        &self,
        booking_id: &str,
    ) -> impl Future<Output = StoreResult<Option<Review>>> + Send;

    fn list_reviews_for_provider(
        &self,
        provider_id: &str,
    ) -> impl Future<Output = StoreResult<Vec<Review>>> + Send;

    fn list_reviews(&self) -> impl Future<Output = StoreResult<Vec<Review>>> + Send;

    // ---- feedback ----

    fn create_feedback(&self, feedback: &Feedback) -> impl Future<Output = StoreResult<()>> + Send;

    fn get_feedback(&self, id: &str) -> impl Future<Output = StoreResult<Option<Feedback>>> + Send;

    fn update_feedback_status(
        &self,
        id: &str,
        status: FeedbackStatus,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn delete_feedback(&self, id: &str) -> impl Future<Output = StoreResult<()>> + Send;

    fn list_feedback(&self) -> impl Future<Output = StoreResult<Vec<Feedback>>> + Send;

    // ---- moderation ----

    /// Apply every delete and role change of `cascade` as one unit where the
    /// backend allows it.
    fn commit_cascade(&self, cascade: &Cascade) -> impl Future<Output = StoreResult<()>> + Send;
}
