use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp format shared by every stored record.
///
/// Fixed-width UTC so that lexical order matches chronological order.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

// ========== ROLE ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Provider,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" | "user" => Ok(Role::Client),
            "provider" => Ok(Role::Provider),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}

// ========== IDENTITY ==========
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub approved: bool,
    pub contact_handle: String,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing)]
    pub email_verification_token: Option<String>,
    pub created_at: String,
}

/// Identity fields that are safe to show to other users.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicIdentity {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_handle: Option<String>,
}

impl PublicIdentity {
    pub fn of(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            contact_handle: None,
        }
    }

    pub fn with_contact(identity: &Identity) -> Self {
        Self {
            contact_handle: Some(identity.contact_handle.clone()),
            ..Self::of(identity)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<String>,
    #[serde(default, alias = "whatsapp")]
    pub contact_handle: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "whatsapp")]
    pub contact_handle: Option<String>,
    #[serde(alias = "profilePicture")]
    pub avatar_url: Option<String>,
    pub password: Option<String>,
}

/// Returned by login and profile updates.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(flatten)]
    pub identity: Identity,
    pub token: String,
}

// ========== PROVIDER ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Location {
    pub region: String,
    pub locality: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub id: String,
    pub identity_id: String,
    pub services: Vec<String>,
    pub bio: String,
    pub location: Location,
    pub contact_handle: String,
    pub verified: bool,
    pub rating_average: f64,
    pub rating_count: u32,
    pub created_at: String,
}

/// `services` arrives either as a JSON list or a comma separated string.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum ServicesInput {
    List(Vec<String>),
    Delimited(String),
}

impl Default for ServicesInput {
    fn default() -> Self {
        ServicesInput::List(Vec::new())
    }
}

impl ServicesInput {
    /// Trimmed, non-empty, de-duplicated (case-insensitively) service names.
    pub fn normalize(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            ServicesInput::List(items) => items.iter().map(String::as_str).collect(),
            ServicesInput::Delimited(s) => s.split(',').collect(),
        };
        let mut out: Vec<String> = Vec::new();
        for item in raw {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            if !out.iter().any(|s| s.eq_ignore_ascii_case(item)) {
                out.push(item.to_string());
            }
        }
        out
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpsertProviderRequest {
    #[serde(default)]
    pub services: ServicesInput,
    #[serde(default)]
    pub bio: String,
    #[serde(default, alias = "county")]
    pub region: String,
    #[serde(default, alias = "town")]
    pub locality: String,
    #[serde(default, alias = "whatsapp")]
    pub contact_handle: String,
}

#[derive(Debug, Default, Clone)]
pub struct ProviderSearch {
    pub service: Option<String>,
    pub region: Option<String>,
    pub locality: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    #[serde(flatten)]
    pub profile: ProviderProfile,
    pub owner: Option<PublicIdentity>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub id: String,
    pub services: Vec<String>,
    pub location: Location,
    pub owner: Option<PublicIdentity>,
}

// ========== BOOKING ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// Forward-only lifecycle: pending -> accepted | cancelled, accepted -> completed.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Accepted)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Accepted, BookingStatus::Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "accepted" => Ok(BookingStatus::Accepted),
            "cancelled" | "rejected" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(format!("Unknown booking status '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub client_id: String,
    pub provider_id: String,
    pub service_name: String,
    pub scheduled_at: String,
    pub status: BookingStatus,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    #[serde(default)]
    pub provider_id: String,
    #[serde(default, alias = "service")]
    pub service_name: String,
    #[serde(default, alias = "bookingDate")]
    pub scheduled_at: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingStatusRequest {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub client: Option<PublicIdentity>,
    pub provider: Option<ProviderSummary>,
    pub is_reviewed: bool,
}

// ========== REVIEW ==========
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub booking_id: String,
    pub client_id: String,
    pub provider_id: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    #[serde(default)]
    pub booking_id: String,
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    #[serde(flatten)]
    pub review: Review,
    pub client_name: Option<String>,
}

/// Mean and count of every review referencing one provider.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RatingSummary {
    pub average: f64,
    pub count: u32,
}

impl RatingSummary {
    pub fn from_ratings<I: IntoIterator<Item = u8>>(ratings: I) -> Self {
        let (sum, count) = ratings
            .into_iter()
            .fold((0u64, 0u32), |(sum, count), r| (sum + u64::from(r), count + 1));
        if count == 0 {
            return Self::default();
        }
        Self {
            average: sum as f64 / f64::from(count),
            count,
        }
    }
}

// ========== FEEDBACK ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackCategory {
    #[default]
    Feedback,
    Improvement,
    Review,
}

impl FeedbackCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackCategory::Feedback => "feedback",
            FeedbackCategory::Improvement => "improvement",
            FeedbackCategory::Review => "review",
        }
    }
}

impl FromStr for FeedbackCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feedback" => Ok(FeedbackCategory::Feedback),
            "improvement" => Ok(FeedbackCategory::Improvement),
            "review" => Ok(FeedbackCategory::Review),
            other => Err(format!("Unknown feedback category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::Pending => "pending",
            FeedbackStatus::Approved => "approved",
            FeedbackStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for FeedbackStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(FeedbackStatus::Pending),
            "approved" => Ok(FeedbackStatus::Approved),
            "rejected" => Ok(FeedbackStatus::Rejected),
            other => Err(format!("Unknown feedback status '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    pub identity_id: Option<String>,
    pub name: String,
    pub email: String,
    pub category: FeedbackCategory,
    pub content: String,
    pub status: FeedbackStatus,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFeedbackRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(alias = "type")]
    pub category: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFeedbackStatusRequest {
    #[serde(default)]
    pub status: String,
}

// ========== MODERATION ==========
#[derive(Debug, Deserialize)]
pub struct BulkIdsRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct BulkOutcome {
    pub processed: Vec<String>,
    pub missing: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: usize,
    pub total_providers: usize,
    pub total_bookings: usize,
    pub pending_providers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_lifecycle_is_forward_only() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Accepted.can_transition_to(Completed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Accepted.can_transition_to(Pending));
        assert!(!Accepted.can_transition_to(Cancelled));
        for terminal in [Cancelled, Completed] {
            assert!(terminal.is_terminal());
            for next in [Pending, Accepted, Cancelled, Completed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_services_normalization() {
        let delimited = ServicesInput::Delimited(" Plumbing, Wiring ,,plumbing ".to_string());
        assert_eq!(delimited.normalize(), vec!["Plumbing", "Wiring"]);

        let list = ServicesInput::List(vec!["  Painting ".into(), "".into()]);
        assert_eq!(list.normalize(), vec!["Painting"]);
    }

    #[test]
    fn test_services_accepts_string_or_list() {
        let req: UpsertProviderRequest =
            serde_json::from_str(r#"{"services":"a, b","county":"Nairobi","town":"Kilimani"}"#)
                .unwrap();
        assert_eq!(req.services.normalize(), vec!["a", "b"]);
        assert_eq!(req.region, "Nairobi");

        let req: UpsertProviderRequest =
            serde_json::from_str(r#"{"services":["a"],"region":"Kisumu"}"#).unwrap();
        assert_eq!(req.services.normalize(), vec!["a"]);
    }

    #[test]
    fn test_rating_summary() {
        assert_eq!(RatingSummary::from_ratings(Vec::new()), RatingSummary::default());
        let summary = RatingSummary::from_ratings([5, 4, 3]);
        assert_eq!(summary.count, 3);
        assert!((summary.average - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_identity_serialization_hides_secrets() {
        let identity = Identity {
            id: "u1".into(),
            name: "Amina".into(),
            email: "amina@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            role: Role::Client,
            approved: true,
            contact_handle: "254700000001".into(),
            avatar_url: None,
            email_verification_token: Some("tok".into()),
            created_at: now_rfc3339(),
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("emailVerificationToken").is_none());
        assert_eq!(json["role"], "client");
        assert_eq!(json["contactHandle"], "254700000001");
    }
}
