//! DynamoDB single-table [`Store`].
//!
//! Item layout (`PK` / `SK`):
//!
//! | record                | PK                 | SK             |
//! |-----------------------|--------------------|----------------|
//! | identity              | `USER#{id}`        | `PROFILE`      |
//! | email lookup          | `EMAIL#{email}`    | `EMAIL`        |
//! | verification lookup   | `VERIFY#{token}`   | `VERIFY`       |
//! | provider profile      | `PROVIDER#{id}`    | `PROFILE`      |
//! | identity -> provider  | `USER#{id}`        | `PROVIDER`     |
//! | booking               | `BOOKING#{id}`     | `BOOKING`      |
//! | client -> booking     | `USER#{id}`        | `BOOKING#{id}` |
//! | provider -> booking   | `PROVIDER#{id}`    | `BOOKING#{id}` |
//! | review                | `REVIEW#{id}`      | `REVIEW`       |
//! | booking -> review     | `BOOKING#{id}`     | `REVIEW`       |
//! | provider -> review    | `PROVIDER#{id}`    | `REVIEW#{id}`  |
//! | feedback              | `FEEDBACK#{id}`    | `FEEDBACK`     |
//!
//! Records carry an `entity_type` attribute so admin listings can scan by kind.
//! Every uniqueness rule (email, one profile per identity, one review per
//! booking) is a conditional put inside a `TransactWriteItems` call.

use super::{Cascade, Store, StoreResult};
use crate::error::StoreError;
use crate::types::{
    Booking, BookingStatus, Feedback, FeedbackCategory, FeedbackStatus, Identity, Location,
    ProviderProfile, RatingSummary, Review, Role,
};
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeValue, Delete, KeysAndAttributes, Put, TransactWriteItem, Update,
};
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;
use std::str::FromStr;

type Item = HashMap<String, AttributeValue>;

/// DynamoDB caps a transaction at 100 actions.
const MAX_TRANSACT_ITEMS: usize = 100;
const MAX_BATCH_GET: usize = 100;
const MAX_BATCH_ATTEMPTS: usize = 5;

const IDENTITY: &str = "IDENTITY";
const PROVIDER: &str = "PROVIDER";
const BOOKING: &str = "BOOKING";
const REVIEW: &str = "REVIEW";
const FEEDBACK: &str = "FEEDBACK";

#[derive(Debug, Clone)]
pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn get(&self, key: Item) -> StoreResult<Option<Item>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key))
            .send()
            .await
            .map_err(backend)?;
        Ok(result.item)
    }

    /// Ids stored under `pk` whose sort key starts with `prefix`.
    async fn query_links(&self, pk: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut start: Option<Item> = None;
        loop {
            let result = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
                .expression_attribute_values(":pk", s(pk))
                .expression_attribute_values(":sk_prefix", s(prefix))
                .set_exclusive_start_key(start.take())
                .send()
                .await
                .map_err(backend)?;

            for item in result.items() {
                if let Some(id) = item
                    .get("SK")
                    .and_then(|v| v.as_s().ok())
                    .and_then(|sk| sk.strip_prefix(prefix))
                {
                    ids.push(id.to_string());
                }
            }

            match result.last_evaluated_key() {
                Some(key) if !key.is_empty() => start = Some(key.clone()),
                _ => break,
            }
        }
        Ok(ids)
    }

    async fn batch_get(&self, keys: Vec<Item>) -> StoreResult<Vec<Item>> {
        let mut items = Vec::new();
        for chunk in keys.chunks(MAX_BATCH_GET) {
            let mut pending = chunk.to_vec();
            let mut attempts = 0;
            while !pending.is_empty() {
                attempts += 1;
                if attempts > MAX_BATCH_ATTEMPTS {
                    return Err(StoreError::Backend(format!(
                        "batch get left {} keys unprocessed",
                        pending.len()
                    )));
                }
                let request = KeysAndAttributes::builder()
                    .set_keys(Some(std::mem::take(&mut pending)))
                    .build()
                    .map_err(backend)?;
                let result = self
                    .client
                    .batch_get_item()
                    .request_items(&self.table_name, request)
                    .send()
                    .await
                    .map_err(backend)?;

                if let Some(found) = result
                    .responses()
                    .and_then(|r| r.get(&self.table_name))
                {
                    items.extend(found.iter().cloned());
                }
                if let Some(unprocessed) = result
                    .unprocessed_keys()
                    .and_then(|u| u.get(&self.table_name))
                {
                    pending = unprocessed.keys().to_vec();
                }
            }
        }
        Ok(items)
    }

    async fn scan_entities(&self, entity_type: &str) -> StoreResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut start: Option<Item> = None;
        loop {
            let result = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("entity_type = :type")
                .expression_attribute_values(":type", s(entity_type))
                .set_exclusive_start_key(start.take())
                .send()
                .await
                .map_err(backend)?;

            items.extend(result.items().iter().cloned());

            match result.last_evaluated_key() {
                Some(key) if !key.is_empty() => start = Some(key.clone()),
                _ => break,
            }
        }
        Ok(items)
    }

    /// Run one transaction; a cancelled transaction means a condition failed.
    async fn transact(
        &self,
        actions: Vec<TransactWriteItem>,
        conflict_message: &str,
    ) -> StoreResult<()> {
        match self
            .client
            .transact_write_items()
            .set_transact_items(Some(actions))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                if err.is_transaction_canceled_exception() {
                    Err(StoreError::Conflict(conflict_message.to_string()))
                } else {
                    Err(backend(err))
                }
            }
        }
    }

    fn put(&self, item: Item, condition: Option<&str>) -> StoreResult<TransactWriteItem> {
        let put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .set_condition_expression(condition.map(str::to_string))
            .build()
            .map_err(backend)?;
        Ok(TransactWriteItem::builder().put(put).build())
    }

    fn delete(&self, pk: String, sk: &str) -> StoreResult<TransactWriteItem> {
        let delete = Delete::builder()
            .table_name(&self.table_name)
            .set_key(Some(key(pk, sk)))
            .build()
            .map_err(backend)?;
        Ok(TransactWriteItem::builder().delete(delete).build())
    }

    async fn update_conditional(
        &self,
        pk: String,
        sk: &str,
        update_expression: &str,
        condition: &str,
        names: &[(&str, &str)],
        values: Vec<(&str, AttributeValue)>,
    ) -> StoreResult<bool> {
        let mut builder = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(key(pk, sk)))
            .update_expression(update_expression)
            .condition_expression(condition);
        for (k, v) in names {
            builder = builder.expression_attribute_names(*k, *v);
        }
        for (k, v) in values {
            builder = builder.expression_attribute_values(k, v);
        }
        match builder.send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = e.into_service_error();
                if err.is_conditional_check_failed_exception() {
                    Ok(false)
                } else {
                    Err(backend(err))
                }
            }
        }
    }

    async fn lookup_id(&self, pk: String, sk: &str, attr: &str) -> StoreResult<Option<String>> {
        Ok(self
            .get(key(pk, sk))
            .await?
            .and_then(|item| get_opt_s(&item, attr)))
    }
}

impl Store for DynamoStore {
    async fn create_identity(&self, identity: &Identity) -> StoreResult<()> {
        let mut actions = vec![
            self.put(identity_item(identity), Some("attribute_not_exists(PK)"))?,
            self.put(
                marker(email_pk(&identity.email), "EMAIL", "identity_id", &identity.id),
                Some("attribute_not_exists(PK)"),
            )?,
        ];
        if let Some(token) = &identity.email_verification_token {
            actions.push(self.put(
                marker(verify_pk(token), "VERIFY", "identity_id", &identity.id),
                Some("attribute_not_exists(PK)"),
            )?);
        }
        self.transact(actions, "User already exists").await
    }

    async fn get_identity(&self, id: &str) -> StoreResult<Option<Identity>> {
        self.get(key(user_pk(id), "PROFILE"))
            .await?
            .map(|item| identity_from_item(&item))
            .transpose()
    }

    async fn find_identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        match self.lookup_id(email_pk(email), "EMAIL", "identity_id").await? {
            Some(id) => self.get_identity(&id).await,
            None => Ok(None),
        }
    }

    async fn find_identity_by_verification_token(
        &self,
        token: &str,
    ) -> StoreResult<Option<Identity>> {
        match self.lookup_id(verify_pk(token), "VERIFY", "identity_id").await? {
            Some(id) => self.get_identity(&id).await,
            None => Ok(None),
        }
    }

    async fn update_identity(&self, identity: &Identity) -> StoreResult<()> {
        let current = self
            .get_identity(&identity.id)
            .await?
            .ok_or_else(|| StoreError::Conflict("User no longer exists".to_string()))?;

        let mut actions = vec![self.put(identity_item(identity), Some("attribute_exists(PK)"))?];
        if current.email != identity.email {
            actions.push(self.put(
                marker(email_pk(&identity.email), "EMAIL", "identity_id", &identity.id),
                Some("attribute_not_exists(PK)"),
            )?);
            actions.push(self.delete(email_pk(&current.email), "EMAIL")?);
        }
        if current.email_verification_token != identity.email_verification_token {
            if let Some(old) = &current.email_verification_token {
                actions.push(self.delete(verify_pk(old), "VERIFY")?);
            }
            if let Some(new) = &identity.email_verification_token {
                actions.push(self.put(
                    marker(verify_pk(new), "VERIFY", "identity_id", &identity.id),
                    Some("attribute_not_exists(PK)"),
                )?);
            }
        }
        self.transact(actions, "Email already in use").await
    }

    async fn list_identities(&self) -> StoreResult<Vec<Identity>> {
        self.scan_entities(IDENTITY)
            .await?
            .iter()
            .map(identity_from_item)
            .collect()
    }

    async fn create_provider(&self, profile: &ProviderProfile) -> StoreResult<()> {
        let actions = vec![
            self.put(provider_item(profile), Some("attribute_not_exists(PK)"))?,
            self.put(
                marker(user_pk(&profile.identity_id), "PROVIDER", "provider_id", &profile.id),
                Some("attribute_not_exists(PK)"),
            )?,
        ];
        self.transact(actions, "Provider profile already exists").await
    }

    async fn get_provider(&self, id: &str) -> StoreResult<Option<ProviderProfile>> {
        self.get(key(provider_pk(id), "PROFILE"))
            .await?
            .map(|item| provider_from_item(&item))
            .transpose()
    }

    async fn find_provider_by_identity(
        &self,
        identity_id: &str,
    ) -> StoreResult<Option<ProviderProfile>> {
        match self
            .lookup_id(user_pk(identity_id), "PROVIDER", "provider_id")
            .await?
        {
            Some(id) => self.get_provider(&id).await,
            None => Ok(None),
        }
    }

    async fn update_provider(&self, profile: &ProviderProfile) -> StoreResult<()> {
        let updated = self
            .update_conditional(
                provider_pk(&profile.id),
                "PROFILE",
                "SET services = :services, bio = :bio, region = :region, locality = :locality, \
                 contact_handle = :contact, verified = :verified",
                "attribute_exists(PK)",
                &[],
                vec![
                    (":services", string_list(&profile.services)),
                    (":bio", s(&profile.bio)),
                    (":region", s(&profile.location.region)),
                    (":locality", s(&profile.location.locality)),
                    (":contact", s(&profile.contact_handle)),
                    (":verified", AttributeValue::Bool(profile.verified)),
                ],
            )
            .await?;
        if updated {
            Ok(())
        } else {
            Err(StoreError::Conflict("Provider no longer exists".to_string()))
        }
    }

    async fn set_provider_rating(
        &self,
        provider_id: &str,
        rating: RatingSummary,
    ) -> StoreResult<bool> {
        self.update_conditional(
            provider_pk(provider_id),
            "PROFILE",
            "SET rating_average = :avg, rating_count = :count",
            "attribute_exists(PK)",
            &[],
            vec![
                (":avg", n(rating.average)),
                (":count", n(rating.count)),
            ],
        )
        .await
    }

    async fn list_providers(&self) -> StoreResult<Vec<ProviderProfile>> {
        self.scan_entities(PROVIDER)
            .await?
            .iter()
            .map(provider_from_item)
            .collect()
    }

    async fn create_booking(&self, booking: &Booking) -> StoreResult<()> {
        let sk = format!("BOOKING#{}", booking.id);
        let actions = vec![
            self.put(booking_item(booking), Some("attribute_not_exists(PK)"))?,
            self.put(link(user_pk(&booking.client_id), &sk), None)?,
            self.put(link(provider_pk(&booking.provider_id), &sk), None)?,
        ];
        self.transact(actions, "Booking already exists").await
    }

    async fn get_booking(&self, id: &str) -> StoreResult<Option<Booking>> {
        self.get(key(booking_pk(id), "BOOKING"))
            .await?
            .map(|item| booking_from_item(&item))
            .transpose()
    }

    async fn update_booking_status(
        &self,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<()> {
        let updated = self
            .update_conditional(
                booking_pk(id),
                "BOOKING",
                "SET #status = :to",
                "#status = :from",
                &[("#status", "status")],
                vec![(":to", s(to.as_str())), (":from", s(from.as_str()))],
            )
            .await?;
        if updated {
            Ok(())
        } else {
            Err(StoreError::Conflict(
                "Booking was modified concurrently".to_string(),
            ))
        }
    }

    async fn list_bookings_for_client(&self, client_id: &str) -> StoreResult<Vec<Booking>> {
        let ids = self.query_links(&user_pk(client_id), "BOOKING#").await?;
        self.fetch_bookings(ids).await
    }

    async fn list_bookings_for_provider(&self, provider_id: &str) -> StoreResult<Vec<Booking>> {
        let ids = self
            .query_links(&provider_pk(provider_id), "BOOKING#")
            .await?;
        self.fetch_bookings(ids).await
    }

    async fn list_bookings(&self) -> StoreResult<Vec<Booking>> {
        self.scan_entities(BOOKING)
            .await?
            .iter()
            .map(booking_from_item)
            .collect()
    }

    async fn create_review(&self, review: &Review) -> StoreResult<()> {
        let actions = vec![
            self.put(
                marker(booking_pk(&review.booking_id), "REVIEW", "review_id", &review.id),
                Some("attribute_not_exists(PK)"),
            )?,
            self.put(review_item(review), Some("attribute_not_exists(PK)"))?,
            self.put(
                link(
                    provider_pk(&review.provider_id),
                    &format!("REVIEW#{}", review.id),
                ),
                None,
            )?,
        ];
        self.transact(actions, "Booking already reviewed").await
    }

    async fn get_review(&self, id: &str) -> StoreResult<Option<Review>> {
        self.get(key(review_pk(id), "REVIEW"))
            .await?
            .map(|item| review_from_item(&item))
            .transpose()
    }

    async fn find_review_by_booking(&self, booking_id: &str) -> StoreResult<Option<Review>> {
        match self
            .lookup_id(booking_pk(booking_id), "REVIEW", "review_id")
            .await?
        {
            Some(id) => self.get_review(&id).await,
            None => Ok(None),
        }
    }

    async fn list_reviews_for_provider(&self, provider_id: &str) -> StoreResult<Vec<Review>> {
        let ids = self
            .query_links(&provider_pk(provider_id), "REVIEW#")
            .await?;
        let keys = ids.iter().map(|id| key(review_pk(id), "REVIEW")).collect();
        self.batch_get(keys)
            .await?
            .iter()
            .map(review_from_item)
            .collect()
    }

    async fn list_reviews(&self) -> StoreResult<Vec<Review>> {
        self.scan_entities(REVIEW)
            .await?
            .iter()
            .map(review_from_item)
            .collect()
    }

    async fn create_feedback(&self, feedback: &Feedback) -> StoreResult<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(feedback_item(feedback)))
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_feedback(&self, id: &str) -> StoreResult<Option<Feedback>> {
        self.get(key(feedback_pk(id), "FEEDBACK"))
            .await?
            .map(|item| feedback_from_item(&item))
            .transpose()
    }

    async fn update_feedback_status(&self, id: &str, status: FeedbackStatus) -> StoreResult<()> {
        let updated = self
            .update_conditional(
                feedback_pk(id),
                "FEEDBACK",
                "SET #status = :status",
                "attribute_exists(PK)",
                &[("#status", "status")],
                vec![(":status", s(status.as_str()))],
            )
            .await?;
        if updated {
            Ok(())
        } else {
            Err(StoreError::Conflict("Feedback no longer exists".to_string()))
        }
    }

    async fn delete_feedback(&self, id: &str) -> StoreResult<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(key(feedback_pk(id), "FEEDBACK")))
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_feedback(&self) -> StoreResult<Vec<Feedback>> {
        self.scan_entities(FEEDBACK)
            .await?
            .iter()
            .map(feedback_from_item)
            .collect()
    }

    /// Dependents first, owners last. Cascades larger than one transaction are
    /// split; a failure part-way leaves the owners in place, so repeating the
    /// same delete finishes the job.
    async fn commit_cascade(&self, cascade: &Cascade) -> StoreResult<()> {
        let mut actions = Vec::new();
        for review in &cascade.reviews {
            actions.push(self.delete(review_pk(&review.id), "REVIEW")?);
            actions.push(self.delete(booking_pk(&review.booking_id), "REVIEW")?);
            actions.push(self.delete(
                provider_pk(&review.provider_id),
                &format!("REVIEW#{}", review.id),
            )?);
        }
        for booking in &cascade.bookings {
            let sk = format!("BOOKING#{}", booking.id);
            actions.push(self.delete(booking_pk(&booking.id), "BOOKING")?);
            actions.push(self.delete(user_pk(&booking.client_id), &sk)?);
            actions.push(self.delete(provider_pk(&booking.provider_id), &sk)?);
        }
        for profile in &cascade.providers {
            actions.push(self.delete(provider_pk(&profile.id), "PROFILE")?);
            actions.push(self.delete(user_pk(&profile.identity_id), "PROVIDER")?);
        }
        for (identity_id, role) in &cascade.role_changes {
            let update = Update::builder()
                .table_name(&self.table_name)
                .set_key(Some(key(user_pk(identity_id), "PROFILE")))
                .update_expression("SET #role = :role")
                .condition_expression("attribute_exists(PK)")
                .expression_attribute_names("#role", "role")
                .expression_attribute_values(":role", s(role.as_str()))
                .build()
                .map_err(backend)?;
            actions.push(TransactWriteItem::builder().update(update).build());
        }
        for identity in &cascade.identities {
            actions.push(self.delete(user_pk(&identity.id), "PROFILE")?);
            actions.push(self.delete(email_pk(&identity.email), "EMAIL")?);
            if let Some(token) = &identity.email_verification_token {
                actions.push(self.delete(verify_pk(token), "VERIFY")?);
            }
        }

        let total = actions.len();
        let mut remaining = actions;
        while !remaining.is_empty() {
            let rest = remaining.split_off(remaining.len().min(MAX_TRANSACT_ITEMS));
            self.transact(remaining, "Cascade target changed concurrently")
                .await?;
            remaining = rest;
        }
        tracing::info!("Committed cascade of {} write(s)", total);
        Ok(())
    }
}

impl DynamoStore {
    async fn fetch_bookings(&self, ids: Vec<String>) -> StoreResult<Vec<Booking>> {
        let keys = ids.iter().map(|id| key(booking_pk(id), "BOOKING")).collect();
        self.batch_get(keys)
            .await?
            .iter()
            .map(booking_from_item)
            .collect()
    }
}

// ---- keys ----

fn user_pk(id: &str) -> String {
    format!("USER#{}", id)
}

fn email_pk(email: &str) -> String {
    format!("EMAIL#{}", email)
}

fn verify_pk(token: &str) -> String {
    format!("VERIFY#{}", token)
}

fn provider_pk(id: &str) -> String {
    format!("PROVIDER#{}", id)
}

fn booking_pk(id: &str) -> String {
    format!("BOOKING#{}", id)
}

fn review_pk(id: &str) -> String {
    format!("REVIEW#{}", id)
}

fn feedback_pk(id: &str) -> String {
    format!("FEEDBACK#{}", id)
}

fn key(pk: String, sk: &str) -> Item {
    HashMap::from([("PK".to_string(), s(pk)), ("SK".to_string(), s(sk))])
}

fn link(pk: String, sk: &str) -> Item {
    key(pk, sk)
}

fn marker(pk: String, sk: &str, attr: &str, value: &str) -> Item {
    let mut item = key(pk, sk);
    item.insert(attr.to_string(), s(value));
    item
}

// ---- encoding ----

fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

fn n(value: impl ToString) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

fn string_list(values: &[String]) -> AttributeValue {
    AttributeValue::L(values.iter().map(|v| s(v.as_str())).collect())
}

fn backend<E: std::error::Error>(e: E) -> StoreError {
    StoreError::Backend(format!("{}", DisplayErrorContext(&e)))
}

fn identity_item(identity: &Identity) -> Item {
    let mut item = key(user_pk(&identity.id), "PROFILE");
    item.insert("entity_type".into(), s(IDENTITY));
    item.insert("id".into(), s(&identity.id));
    item.insert("name".into(), s(&identity.name));
    item.insert("email".into(), s(&identity.email));
    item.insert("password_hash".into(), s(&identity.password_hash));
    item.insert("role".into(), s(identity.role.as_str()));
    item.insert("approved".into(), AttributeValue::Bool(identity.approved));
    item.insert("contact_handle".into(), s(&identity.contact_handle));
    item.insert("created_at".into(), s(&identity.created_at));
    if let Some(url) = &identity.avatar_url {
        item.insert("avatar_url".into(), s(url));
    }
    if let Some(token) = &identity.email_verification_token {
        item.insert("email_verification_token".into(), s(token));
    }
    item
}

fn provider_item(profile: &ProviderProfile) -> Item {
    let mut item = key(provider_pk(&profile.id), "PROFILE");
    item.insert("entity_type".into(), s(PROVIDER));
    item.insert("id".into(), s(&profile.id));
    item.insert("identity_id".into(), s(&profile.identity_id));
    item.insert("services".into(), string_list(&profile.services));
    item.insert("bio".into(), s(&profile.bio));
    item.insert("region".into(), s(&profile.location.region));
    item.insert("locality".into(), s(&profile.location.locality));
    item.insert("contact_handle".into(), s(&profile.contact_handle));
    item.insert("verified".into(), AttributeValue::Bool(profile.verified));
    item.insert("rating_average".into(), n(profile.rating_average));
    item.insert("rating_count".into(), n(profile.rating_count));
    item.insert("created_at".into(), s(&profile.created_at));
    item
}

fn booking_item(booking: &Booking) -> Item {
    let mut item = key(booking_pk(&booking.id), "BOOKING");
    item.insert("entity_type".into(), s(BOOKING));
    item.insert("id".into(), s(&booking.id));
    item.insert("client_id".into(), s(&booking.client_id));
    item.insert("provider_id".into(), s(&booking.provider_id));
    item.insert("service_name".into(), s(&booking.service_name));
    item.insert("scheduled_at".into(), s(&booking.scheduled_at));
    item.insert("status".into(), s(booking.status.as_str()));
    item.insert("created_at".into(), s(&booking.created_at));
    item
}

fn review_item(review: &Review) -> Item {
    let mut item = key(review_pk(&review.id), "REVIEW");
    item.insert("entity_type".into(), s(REVIEW));
    item.insert("id".into(), s(&review.id));
    item.insert("booking_id".into(), s(&review.booking_id));
    item.insert("client_id".into(), s(&review.client_id));
    item.insert("provider_id".into(), s(&review.provider_id));
    item.insert("rating".into(), n(review.rating));
    item.insert("comment".into(), s(&review.comment));
    item.insert("created_at".into(), s(&review.created_at));
    item
}

fn feedback_item(feedback: &Feedback) -> Item {
    let mut item = key(feedback_pk(&feedback.id), "FEEDBACK");
    item.insert("entity_type".into(), s(FEEDBACK));
    item.insert("id".into(), s(&feedback.id));
    item.insert("name".into(), s(&feedback.name));
    item.insert("email".into(), s(&feedback.email));
    item.insert("category".into(), s(feedback.category.as_str()));
    item.insert("content".into(), s(&feedback.content));
    item.insert("status".into(), s(feedback.status.as_str()));
    item.insert("created_at".into(), s(&feedback.created_at));
    if let Some(identity_id) = &feedback.identity_id {
        item.insert("identity_id".into(), s(identity_id));
    }
    item
}

// ---- decoding ----

fn get_s(item: &Item, name: &str) -> StoreResult<String> {
    get_opt_s(item, name).ok_or_else(|| StoreError::Corrupt(format!("missing attribute '{}'", name)))
}

fn get_opt_s(item: &Item, name: &str) -> Option<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
}

fn get_bool(item: &Item, name: &str) -> bool {
    item.get(name)
        .and_then(|v| v.as_bool().ok())
        .copied()
        .unwrap_or(false)
}

fn get_n<T: FromStr>(item: &Item, name: &str) -> StoreResult<T> {
    item.get(name)
        .and_then(|v| v.as_n().ok())
        .and_then(|raw| raw.parse::<T>().ok())
        .ok_or_else(|| StoreError::Corrupt(format!("bad numeric attribute '{}'", name)))
}

fn get_list(item: &Item, name: &str) -> Vec<String> {
    item.get(name)
        .and_then(|v| v.as_l().ok())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_s().ok().cloned())
                .collect()
        })
        .unwrap_or_default()
}

fn parse<T: FromStr<Err = String>>(item: &Item, name: &str) -> StoreResult<T> {
    get_s(item, name)?.parse::<T>().map_err(StoreError::Corrupt)
}

fn identity_from_item(item: &Item) -> StoreResult<Identity> {
    Ok(Identity {
        id: get_s(item, "id")?,
        name: get_s(item, "name")?,
        email: get_s(item, "email")?,
        password_hash: get_s(item, "password_hash")?,
        role: parse::<Role>(item, "role")?,
        approved: get_bool(item, "approved"),
        contact_handle: get_opt_s(item, "contact_handle").unwrap_or_default(),
        avatar_url: get_opt_s(item, "avatar_url"),
        email_verification_token: get_opt_s(item, "email_verification_token"),
        created_at: get_s(item, "created_at")?,
    })
}

fn provider_from_item(item: &Item) -> StoreResult<ProviderProfile> {
    Ok(ProviderProfile {
        id: get_s(item, "id")?,
        identity_id: get_s(item, "identity_id")?,
        services: get_list(item, "services"),
        bio: get_opt_s(item, "bio").unwrap_or_default(),
        location: Location {
            region: get_opt_s(item, "region").unwrap_or_default(),
            locality: get_opt_s(item, "locality").unwrap_or_default(),
        },
        contact_handle: get_opt_s(item, "contact_handle").unwrap_or_default(),
        verified: get_bool(item, "verified"),
        rating_average: get_n(item, "rating_average")?,
        rating_count: get_n(item, "rating_count")?,
        created_at: get_s(item, "created_at")?,
    })
}

fn booking_from_item(item: &Item) -> StoreResult<Booking> {
    Ok(Booking {
        id: get_s(item, "id")?,
        client_id: get_s(item, "client_id")?,
        provider_id: get_s(item, "provider_id")?,
        service_name: get_s(item, "service_name")?,
        scheduled_at: get_s(item, "scheduled_at")?,
        status: parse::<BookingStatus>(item, "status")?,
        created_at: get_s(item, "created_at")?,
    })
}

fn review_from_item(item: &Item) -> StoreResult<Review> {
    Ok(Review {
        id: get_s(item, "id")?,
        booking_id: get_s(item, "booking_id")?,
        client_id: get_s(item, "client_id")?,
        provider_id: get_s(item, "provider_id")?,
        rating: get_n(item, "rating")?,
        comment: get_opt_s(item, "comment").unwrap_or_default(),
        created_at: get_s(item, "created_at")?,
    })
}

fn feedback_from_item(item: &Item) -> StoreResult<Feedback> {
    Ok(Feedback {
        id: get_s(item, "id")?,
        identity_id: get_opt_s(item, "identity_id"),
        name: get_s(item, "name")?,
        email: get_s(item, "email")?,
        category: parse::<FeedbackCategory>(item, "category")?,
        content: get_s(item, "content")?,
        status: parse::<FeedbackStatus>(item, "status")?,
        created_at: get_s(item, "created_at")?,
    })
}
