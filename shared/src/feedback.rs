use crate::auth::Session;
use crate::error::ApiError;
use crate::store::Store;
use crate::types::{
    now_rfc3339, CreateFeedbackRequest, Feedback, FeedbackCategory, FeedbackStatus,
};

/// Public submission; attached to the caller when a session is present.
pub async fn create<S: Store>(
    store: &S,
    session: Option<&Session>,
    req: CreateFeedbackRequest,
) -> Result<Feedback, ApiError> {
    let name = req.name.trim();
    let email = req.email.trim();
    let content = req.content.trim();
    if name.is_empty() || email.is_empty() || content.is_empty() {
        return Err(ApiError::Validation(
            "Please provide all required fields".to_string(),
        ));
    }
    let category = match req.category.as_deref().map(str::trim) {
        None | Some("") => FeedbackCategory::default(),
        Some(raw) => raw.parse().map_err(ApiError::Validation)?,
    };

    let feedback = Feedback {
        id: uuid::Uuid::new_v4().to_string(),
        identity_id: session.map(|s| s.id().to_string()),
        name: name.to_string(),
        email: email.to_ascii_lowercase(),
        category,
        content: content.to_string(),
        status: FeedbackStatus::Pending,
        created_at: now_rfc3339(),
    };
    store.create_feedback(&feedback).await?;
    tracing::info!("Feedback {} submitted ({})", feedback.id, category.as_str());
    Ok(feedback)
}

async fn newest_first<S: Store>(store: &S) -> Result<Vec<Feedback>, ApiError> {
    let mut all = store.list_feedback().await?;
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(all)
}

pub async fn list_all<S: Store>(store: &S) -> Result<Vec<Feedback>, ApiError> {
    newest_first(store).await
}

/// Approved entries only, for the landing page.
pub async fn list_public<S: Store>(store: &S) -> Result<Vec<Feedback>, ApiError> {
    Ok(newest_first(store)
        .await?
        .into_iter()
        .filter(|f| f.status == FeedbackStatus::Approved)
        .collect())
}

pub async fn set_status<S: Store>(
    store: &S,
    id: &str,
    status: &str,
) -> Result<Feedback, ApiError> {
    let status: FeedbackStatus = status.parse().map_err(ApiError::Validation)?;
    let mut feedback = store
        .get_feedback(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Feedback not found".to_string()))?;
    store.update_feedback_status(id, status).await?;
    feedback.status = status;
    tracing::info!("Feedback {} marked {}", id, status.as_str());
    Ok(feedback)
}

pub async fn delete<S: Store>(store: &S, id: &str) -> Result<(), ApiError> {
    if store.get_feedback(id).await?.is_none() {
        return Err(ApiError::NotFound("Feedback not found".to_string()));
    }
    store.delete_feedback(id).await?;
    tracing::info!("Feedback {} removed", id);
    Ok(())
}
