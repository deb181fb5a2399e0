use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use patajob_shared::{
    admin, auth,
    auth::Session,
    bookings, email, feedback,
    error::{json_response, message_response, ApiError},
    providers, reviews, s3,
    store::Store,
    types::{
        BulkIdsRequest, Identity, ProviderProfile, ProviderSearch, UpdateBookingStatusRequest,
        UpdateFeedbackStatusRequest,
    },
    users, AppState,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
struct MessageWith<'a, T: Serialize> {
    message: &'a str,
    #[serde(flatten)]
    data: T,
}

#[derive(Serialize)]
struct UserPayload<'a> {
    user: &'a Identity,
}

#[derive(Serialize)]
struct ProviderPayload<'a> {
    provider: &'a ProviderProfile,
}

#[derive(Serialize)]
struct DataPayload<T: Serialize> {
    data: T,
}

/// Main Lambda handler - every REST route goes through here
pub(crate) async fn function_handler<S: Store>(
    event: Request,
    state: Arc<AppState<S>>,
) -> Result<Response<Body>, Error> {
    let method = event.method().clone();
    let path = event.uri().path().to_string();
    tracing::info!("PataJob API invoked - Method: {} Path: {}", method, path);

    // CORS preflight
    if method == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET,POST,PUT,DELETE,OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type,Authorization")
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect();
    let parts: Vec<&str> = segments.iter().map(String::as_str).collect();
    let parts = match parts.as_slice() {
        ["api", rest @ ..] => rest,
        all => all,
    };

    match route(&event, &state, &method, parts).await {
        Ok(Some(resp)) => Ok(resp),
        Ok(None) => {
            tracing::warn!("No route matched - Method: {} Path: {}", method, path);
            not_found()
        }
        Err(e) => e.into_response(),
    }
}

type Routed = Result<Option<Response<Body>>, ApiError>;

fn reply<T: Serialize>(status: StatusCode, value: &T) -> Routed {
    json_response(status, value)
        .map(Some)
        .map_err(|e| ApiError::Upstream(format!("Failed to render response: {}", e)))
}

fn reply_message(status: StatusCode, message: &str) -> Routed {
    message_response(status, message)
        .map(Some)
        .map_err(|e| ApiError::Upstream(format!("Failed to render response: {}", e)))
}

fn parse_body<T: DeserializeOwned>(event: &Request) -> Result<T, ApiError> {
    let body: &[u8] = event.body();
    let body = if body.is_empty() { b"{}".as_slice() } else { body };
    serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("Invalid request body: {}", e)))
}

fn authorization(event: &Request) -> Option<&str> {
    event
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
}

fn query(event: &Request, name: &str) -> Option<String> {
    event
        .query_string_parameters_ref()
        .and_then(|params| params.first(name))
        .map(str::to_string)
}

async fn session<S: Store>(event: &Request, state: &AppState<S>) -> Result<Session, ApiError> {
    auth::authenticate(&state.store, &state.config, authorization(event)).await
}

async fn admin_session<S: Store>(
    event: &Request,
    state: &AppState<S>,
) -> Result<Session, ApiError> {
    let session = session(event, state).await?;
    session.require_admin()?;
    Ok(session)
}

async fn route<S: Store>(
    event: &Request,
    state: &AppState<S>,
    method: &Method,
    parts: &[&str],
) -> Routed {
    let store = &state.store;
    let config = &state.config;

    match (method, parts) {
        // --- AUTH ---
        (&Method::POST, ["auth", "register"]) => {
            let registration = users::register(store, config, parse_body(event)?).await?;
            let message = match registration.verification_token.as_deref() {
                None => "Registration successful. Your account is pending admin approval.",
                Some(token) => {
                    let sent = match state.ses_client.as_ref() {
                        Some(ses) => {
                            email::send_verification_email(
                                ses,
                                config,
                                &registration.identity.email,
                                &registration.identity.name,
                                token,
                            )
                            .await
                        }
                        None => Err("Email client is not configured".to_string()),
                    };
                    match sent {
                        Ok(()) => "Registration successful. Please check your email to verify your account.",
                        Err(e) => {
                            tracing::error!(
                                "Verification email for {} failed: {}",
                                registration.identity.id,
                                e
                            );
                            "Registered, but verification email failed. Please contact support."
                        }
                    }
                }
            };
            reply(
                StatusCode::CREATED,
                &MessageWith {
                    message,
                    data: UserPayload {
                        user: &registration.identity,
                    },
                },
            )
        }
        (&Method::POST, ["auth", "login"]) => {
            let resp = users::login(store, config, parse_body(event)?).await?;
            reply(StatusCode::OK, &resp)
        }
        (&Method::GET, ["auth", "verify", token]) => {
            users::verify_email(store, token).await?;
            reply_message(
                StatusCode::OK,
                "Email verified successfully. You can now log in.",
            )
        }
        (&Method::GET, ["auth", "me"]) => {
            let session = session(event, state).await?;
            reply(StatusCode::OK, &session.identity)
        }
        (&Method::PUT, ["auth", "profile"]) => {
            let session = session(event, state).await?;
            let resp = users::update_profile(store, config, &session, parse_body(event)?).await?;
            reply(StatusCode::OK, &resp)
        }
        (&Method::POST, ["auth", "upload-avatar"]) => {
            let session = session(event, state).await?;
            let s3_client = state
                .s3_client
                .as_ref()
                .ok_or_else(|| ApiError::Upstream("Avatar storage is not configured".to_string()))?;
            let resp = s3::upload_avatar(s3_client, &config.avatar_bucket, &session, parse_body(event)?)
                .await?;
            reply(StatusCode::OK, &resp)
        }

        // --- PROVIDERS ---
        (&Method::POST, ["providers"]) => {
            let session = session(event, state).await?;
            let profile = providers::upsert(store, &session, parse_body(event)?).await?;
            reply(StatusCode::OK, &profile)
        }
        (&Method::GET, ["providers"]) => {
            let filters = ProviderSearch {
                service: query(event, "service"),
                region: query(event, "region").or_else(|| query(event, "county")),
                locality: query(event, "locality").or_else(|| query(event, "town")),
            };
            let found = providers::search(store, &filters, config.search_verified_only).await?;
            reply(StatusCode::OK, &found)
        }
        (&Method::GET, ["providers", "me"]) => {
            let session = session(event, state).await?;
            reply(StatusCode::OK, &providers::get_mine(store, &session).await?)
        }
        (&Method::GET, ["providers", id]) => {
            reply(StatusCode::OK, &providers::get_by_id(store, id).await?)
        }

        // --- BOOKINGS ---
        (&Method::POST, ["bookings"]) => {
            let session = session(event, state).await?;
            let booking = bookings::create(store, &session, parse_body(event)?).await?;
            reply(StatusCode::CREATED, &booking)
        }
        (&Method::GET, ["bookings"]) => {
            let session = session(event, state).await?;
            reply(StatusCode::OK, &bookings::list_for_actor(store, &session).await?)
        }
        (&Method::PUT, ["bookings", id, "status"]) => {
            let session = session(event, state).await?;
            let req: UpdateBookingStatusRequest = parse_body(event)?;
            let booking = bookings::transition_status(store, &session, id, &req.status).await?;
            reply(StatusCode::OK, &booking)
        }

        // --- REVIEWS ---
        (&Method::POST, ["reviews"]) => {
            let session = session(event, state).await?;
            let review = reviews::create(store, &session, parse_body(event)?).await?;
            reply(StatusCode::CREATED, &review)
        }
        (&Method::GET, ["reviews", provider_id]) => {
            reply(StatusCode::OK, &reviews::list_for_provider(store, provider_id).await?)
        }

        // --- FEEDBACK ---
        (&Method::POST, ["feedback"]) => {
            // Anonymous submissions are fine; a bad token just detaches the entry.
            let caller = match authorization(event) {
                Some(_) => session(event, state).await.ok(),
                None => None,
            };
            let created = feedback::create(store, caller.as_ref(), parse_body(event)?).await?;
            reply(
                StatusCode::CREATED,
                &MessageWith {
                    message: "Feedback submitted successfully",
                    data: DataPayload { data: created },
                },
            )
        }
        (&Method::GET, ["feedback", "public"]) => {
            reply(StatusCode::OK, &feedback::list_public(store).await?)
        }
        (&Method::GET, ["feedback"]) => {
            admin_session(event, state).await?;
            reply(StatusCode::OK, &feedback::list_all(store).await?)
        }
        (&Method::PUT, ["feedback", id, "status"]) => {
            admin_session(event, state).await?;
            let req: UpdateFeedbackStatusRequest = parse_body(event)?;
            let updated = feedback::set_status(store, id, &req.status).await?;
            let message = format!("Feedback {} successfully", updated.status.as_str());
            reply(
                StatusCode::OK,
                &MessageWith {
                    message: &message,
                    data: DataPayload { data: updated },
                },
            )
        }
        (&Method::DELETE, ["feedback", id]) => {
            admin_session(event, state).await?;
            feedback::delete(store, id).await?;
            reply_message(StatusCode::OK, "Feedback removed")
        }

        // --- ADMIN ---
        (_, ["admin", ..]) => {
            admin_session(event, state).await?;
            admin_route(event, store, method, parts).await
        }

        _ => Ok(None),
    }
}

async fn admin_route<S: Store>(
    event: &Request,
    store: &S,
    method: &Method,
    parts: &[&str],
) -> Routed {
    match (method, parts) {
        (&Method::GET, ["admin", "stats"]) => reply(StatusCode::OK, &admin::stats(store).await?),
        (&Method::GET, ["admin", "users"]) => {
            reply(StatusCode::OK, &admin::list_users(store).await?)
        }
        (&Method::GET, ["admin", "providers"]) => {
            reply(StatusCode::OK, &admin::list_providers(store, false).await?)
        }
        (&Method::GET, ["admin", "pending-providers"]) => {
            reply(StatusCode::OK, &admin::list_providers(store, true).await?)
        }
        (&Method::GET, ["admin", "bookings"]) => {
            reply(StatusCode::OK, &admin::list_bookings(store).await?)
        }
        (&Method::GET, ["admin", "reviews"]) => {
            reply(StatusCode::OK, &admin::list_reviews(store).await?)
        }
        (&Method::PUT, ["admin", "users", id, "verify"]) => {
            let user = admin::verify_identity(store, id).await?;
            reply(
                StatusCode::OK,
                &MessageWith {
                    message: "User verified",
                    data: UserPayload { user: &user },
                },
            )
        }
        (&Method::PUT, ["admin", "verify-provider", id]) => {
            let provider = admin::verify_provider(store, id).await?;
            reply(
                StatusCode::OK,
                &MessageWith {
                    message: "Provider verified",
                    data: ProviderPayload { provider: &provider },
                },
            )
        }
        (&Method::POST, ["admin", "users", "bulk-verify"]) => {
            let req: BulkIdsRequest = parse_body(event)?;
            reply(StatusCode::OK, &admin::bulk_verify(store, &req.ids).await?)
        }
        (&Method::POST, ["admin", "users", "bulk-delete"]) => {
            let req: BulkIdsRequest = parse_body(event)?;
            reply(StatusCode::OK, &admin::bulk_delete(store, &req.ids).await?)
        }
        (&Method::DELETE, ["admin", "users", id]) => {
            admin::delete_identity(store, id).await?;
            reply_message(StatusCode::OK, "User deleted successfully")
        }
        (&Method::DELETE, ["admin", "providers", id]) => {
            admin::delete_provider(store, id).await?;
            reply_message(
                StatusCode::OK,
                "Provider and associated bookings removed successfully",
            )
        }
        (&Method::DELETE, ["admin", "providers", id, "services", service]) => {
            let provider = admin::delete_provider_service(store, id, service).await?;
            let message = format!("Service '{}' removed", service);
            reply(
                StatusCode::OK,
                &MessageWith {
                    message: &message,
                    data: ProviderPayload { provider: &provider },
                },
            )
        }
        (&Method::DELETE, ["admin", "bookings", id]) => {
            admin::delete_booking(store, id).await?;
            reply_message(StatusCode::OK, "Booking deleted successfully")
        }
        (&Method::DELETE, ["admin", "reviews", id]) => {
            admin::delete_review(store, id).await?;
            reply_message(StatusCode::OK, "Review deleted successfully")
        }
        _ => Ok(None),
    }
}

fn not_found() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"error": "NotFound", "message": "Route not found"})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use patajob_shared::config::Config;
    use patajob_shared::store::MemoryStore;
    use patajob_shared::types::Role;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn state() -> Arc<AppState<MemoryStore>> {
        AppState::new(MemoryStore::new(), Config::local(), None, None)
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request {
        let mut builder = lambda_http::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::Empty,
        };
        builder.body(body).unwrap()
    }

    async fn call(
        state: &Arc<AppState<MemoryStore>>,
        req: Request,
    ) -> (StatusCode, Value) {
        let resp = function_handler(req, Arc::clone(state)).await.unwrap();
        let status = resp.status();
        let body: &[u8] = resp.body();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(body).unwrap()
        };
        (status, value)
    }

    /// Register through the API, approve directly in the store, then log in.
    async fn signed_in(
        state: &Arc<AppState<MemoryStore>>,
        name: &str,
        email: &str,
        role: Role,
    ) -> (String, String) {
        let (status, body) = call(
            state,
            request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({"name": name, "email": email, "password": "password123", "whatsapp": "254711000000"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["user"]["id"].as_str().unwrap().to_string();

        let mut identity = state.store.get_identity(&id).await.unwrap().unwrap();
        identity.approved = true;
        identity.role = role;
        state.store.update_identity(&identity).await.unwrap();

        let (status, body) = call(
            state,
            request(
                "POST",
                "/auth/login",
                None,
                Some(json!({"email": email, "password": "password123"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        (id, body["token"].as_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_preflight_and_unknown_route() {
        let state = state();
        let resp = function_handler(request("OPTIONS", "/api/bookings", None, None), Arc::clone(&state))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");

        let (status, _) = call(&state, request("GET", "/nowhere", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pending_account_cannot_log_in() {
        let state = state();
        let (status, body) = call(
            &state,
            request(
                "POST",
                "/auth/register",
                None,
                Some(json!({"name": "Zawadi", "email": "z@example.com", "password": "password123"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["user"].get("passwordHash").is_none());

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/auth/login",
                None,
                Some(json!({"email": "z@example.com", "password": "password123"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_failed_verification_mail_keeps_registration() {
        let state = AppState::new(
            MemoryStore::new(),
            Config {
                require_email_verification: true,
                ..Config::local()
            },
            None,
            None,
        );
        let (status, body) = call(
            &state,
            request(
                "POST",
                "/auth/register",
                None,
                Some(json!({"name": "Baraka", "email": "b@example.com", "password": "password123"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["message"].as_str().unwrap().contains("verification email failed"));
        assert!(state
            .store
            .find_identity_by_email("b@example.com")
            .await
            .unwrap()
            .is_some());

        let (status, body) = call(&state, request("GET", "/auth/verify/bogus", None, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidToken");
    }

    #[tokio::test]
    async fn test_booking_and_review_flow_over_http() {
        let state = state();
        let (_, client) = signed_in(&state, "Client C", "c@example.com", Role::Client).await;
        let (_, provider) = signed_in(&state, "Provider P", "p@example.com", Role::Client).await;

        let (status, profile) = call(
            &state,
            request(
                "POST",
                "/providers",
                Some(&provider),
                Some(json!({"services": "Plumbing, Wiring", "county": "Nairobi", "town": "Kilimani", "bio": "Fast"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let provider_id = profile["id"].as_str().unwrap().to_string();

        let search = request("GET", "/providers", None, None).with_query_string_parameters(
            HashMap::from([("service".to_string(), vec!["plumb".to_string()])]),
        );
        let (status, found) = call(&state, search).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found.as_array().unwrap().len(), 1);
        assert_eq!(found[0]["owner"]["name"], "Provider P");

        let (status, booking) = call(
            &state,
            request(
                "POST",
                "/bookings",
                Some(&client),
                Some(json!({"providerId": provider_id, "service": "Plumbing", "bookingDate": "2026-11-02"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(booking["status"], "pending");
        let booking_id = booking["id"].as_str().unwrap().to_string();
        let status_uri = format!("/bookings/{}/status", booking_id);

        let (status, _) = call(
            &state,
            request("PUT", &status_uri, Some(&client), Some(json!({"status": "accepted"}))),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        for next in ["accepted", "completed"] {
            let (status, body) = call(
                &state,
                request("PUT", &status_uri, Some(&provider), Some(json!({"status": next}))),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], next);
        }

        let review = json!({"bookingId": booking_id, "rating": 5, "comment": "great"});
        let (status, _) = call(&state, request("POST", "/reviews", Some(&client), Some(review.clone()))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = call(&state, request("POST", "/reviews", Some(&client), Some(review))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Conflict");

        let (_, view) = call(&state, request("GET", &format!("/providers/{}", provider_id), None, None)).await;
        assert_eq!(view["ratingAverage"], 5.0);
        assert_eq!(view["ratingCount"], 1);
        assert_eq!(view["owner"]["contactHandle"], "254711000000");

        let (_, listed) = call(&state, request("GET", "/bookings", Some(&client), None)).await;
        assert_eq!(listed[0]["isReviewed"], true);

        let (_, reviews) = call(&state, request("GET", &format!("/reviews/{}", provider_id), None, None)).await;
        assert_eq!(reviews[0]["clientName"], "Client C");
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin() {
        let state = state();
        let (_, client) = signed_in(&state, "Client", "c@example.com", Role::Client).await;
        let (_, admin) = signed_in(&state, "Admin", "admin@example.com", Role::Admin).await;

        let (status, _) = call(&state, request("GET", "/admin/stats", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&state, request("GET", "/admin/stats", Some(&client), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, stats) = call(&state, request("GET", "/api/admin/stats", Some(&admin), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["totalUsers"], 2);

        let (status, outcome) = call(
            &state,
            request(
                "POST",
                "/admin/users/bulk-delete",
                Some(&admin),
                Some(json!({"ids": ["ghost"]})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["missing"][0], "ghost");

        let (status, _) = call(&state, request("GET", "/admin/nothing-here", Some(&admin), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_feedback_moderation_over_http() {
        let state = state();
        let (_, admin) = signed_in(&state, "Admin", "admin@example.com", Role::Admin).await;

        let (status, created) = call(
            &state,
            request(
                "POST",
                "/feedback",
                None,
                Some(json!({"name": "Imani", "email": "i@example.com", "type": "improvement", "content": "Add M-Pesa"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (_, public) = call(&state, request("GET", "/feedback/public", None, None)).await;
        assert!(public.as_array().unwrap().is_empty());

        let (status, _) = call(
            &state,
            request(
                "PUT",
                &format!("/feedback/{}/status", id),
                Some(&admin),
                Some(json!({"status": "approved"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, public) = call(&state, request("GET", "/feedback/public", None, None)).await;
        assert_eq!(public[0]["category"], "improvement");

        let (status, _) = call(&state, request("POST", "/feedback", None, Some(json!({"name": "x"})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_validation_error() {
        let state = state();
        let req = lambda_http::http::Request::builder()
            .method("POST")
            .uri("/auth/login")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = call(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");
    }
}
