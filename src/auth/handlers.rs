use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthData, AuthResponse, LoginRequest, ProtectedResponse, SignupRequest},
        errors::ApiError,
        extract::JsonOrForm,
        guard::CurrentUser,
        repo::{DuplicateField, StoreError},
        repo_types::NewUser,
        validation::{validate_login, validate_signup},
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

/// Routes that must sit behind `guard::require_auth`.
pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/protected", get(protected))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: JsonOrForm<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let JsonOrForm(payload) = payload;

    if let Err(errors) = validate_signup(&payload) {
        warn!(fields = errors.len(), "signup validation failed");
        return Err(ApiError::Validation(errors));
    }

    if state.store.find_by_username(&payload.username).await?.is_some() {
        warn!(username = %payload.username, "username already exists");
        return Err(ApiError::UsernameTaken);
    }

    let password_hash = state.hasher.hash_async(payload.password).await?;

    let new_user = NewUser {
        username: payload.username,
        password_hash,
        phone: payload.phone,
        name: payload.name,
    };

    // A concurrent signup can still win either unique index here.
    let user = match state.store.create(new_user).await {
        Ok(u) => u,
        Err(StoreError::Duplicate(DuplicateField::Username)) => {
            warn!("username taken by a concurrent signup");
            return Err(ApiError::UsernameTaken);
        }
        Err(StoreError::Duplicate(field)) => {
            warn!(?field, "phone number already registered");
            return Err(ApiError::PhoneTaken);
        }
        Err(e) => return Err(e.into()),
    };

    let token = state.keys.issue(user.id, &user.username)?;

    info!(user_id = %user.id, username = %user.username, "user signed up");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            status: 201,
            message: "Sign up successfully",
            data: AuthData::new(token, user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: JsonOrForm<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let JsonOrForm(payload) = payload;

    if let Err(errors) = validate_login(&payload) {
        warn!(fields = errors.len(), "login validation failed");
        return Err(ApiError::Validation(errors));
    }

    let user = match state.store.find_by_username(&payload.username).await? {
        Some(u) => u,
        None => {
            // Burn the same hashing cost as a real check before answering.
            let _ = state
                .hasher
                .verify_async(payload.password, state.decoy_hash.to_string())
                .await;
            warn!(username = %payload.username, "login unknown username");
            return Err(ApiError::InvalidUsername);
        }
    };

    let ok = state
        .hasher
        .verify_async(payload.password, user.password_hash.clone())
        .await?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidPassword);
    }

    let token = state.keys.issue(user.id, &user.username)?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(AuthResponse {
        status: 201,
        message: "Login Successful",
        data: AuthData::new(token, user),
    }))
}

pub async fn protected(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<ProtectedResponse> {
    debug!(user_id = %user.id, "protected route authorized");
    Json(ProtectedResponse {
        msg: "You are authorized",
        user,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use time::{Duration, OffsetDateTime};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::{
        app::build_app,
        auth::{repo::UserStore, repo_types::User},
    };

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header("authorization", format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn send_form(app: &Router, uri: &str, form: &'static str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn amy() -> Value {
        json!({
            "username": "amy",
            "password": "secret1",
            "phone": "+14155550100",
            "name": "Amy"
        })
    }

    #[tokio::test]
    async fn signup_returns_token_and_profile() {
        let state = AppState::fake();
        let app = build_app(state.clone());

        let (status, body) = send(&app, "POST", "/api/signup", Some(amy()), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], 201);
        assert_eq!(body["message"], "Sign up successfully");
        assert_eq!(body["data"]["name"], "Amy");
        assert_eq!(body["data"]["username"], "amy");
        assert_eq!(body["data"]["phone"], "+14155550100");
        assert!(body["data"].get("password").is_none());
        assert!(body["data"].get("password_hash").is_none());

        let token = body["data"]["token"].as_str().unwrap();
        let claims = state.keys.verify(token).unwrap();
        let stored = state.store.find_by_username("amy").await.unwrap().unwrap();
        assert_eq!(claims.id, stored.id);
        assert_eq!(claims.username, "amy");
        assert_ne!(stored.password_hash, "secret1");
    }

    #[tokio::test]
    async fn repeated_signup_conflicts_on_username() {
        let app = build_app(AppState::fake());
        send(&app, "POST", "/api/signup", Some(amy()), None).await;

        let mut again = amy();
        again["phone"] = json!("+14155550111");
        again["name"] = json!("Someone Else");
        let (status, body) = send(&app, "POST", "/api/signup", Some(again), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
        assert_eq!(body["message"], "Username already exists");
        assert_eq!(body["errors"], json!([]));
    }

    #[tokio::test]
    async fn signup_with_used_phone_conflicts_on_phone() {
        let app = build_app(AppState::fake());
        send(&app, "POST", "/api/signup", Some(amy()), None).await;

        let mut other = amy();
        other["username"] = json!("bob");
        let (status, body) = send(&app, "POST", "/api/signup", Some(other), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "status": 400, "message": "Phone number already registered" }));
    }

    #[tokio::test]
    async fn concurrent_signups_sharing_a_phone_yield_one_user() {
        let state = AppState::fake();
        let app = build_app(state.clone());
        let mut bob = amy();
        bob["username"] = json!("bob");

        let (a, b) = tokio::join!(
            send(&app, "POST", "/api/signup", Some(amy()), None),
            send(&app, "POST", "/api/signup", Some(bob), None),
        );
        assert!(matches!(
            (a.0, b.0),
            (StatusCode::CREATED, StatusCode::BAD_REQUEST)
                | (StatusCode::BAD_REQUEST, StatusCode::CREATED)
        ));
        let loser = if a.0 == StatusCode::BAD_REQUEST { a.1 } else { b.1 };
        assert_eq!(loser["message"], "Phone number already registered");
    }

    #[tokio::test]
    async fn signup_validation_lists_field_errors() {
        let app = build_app(AppState::fake());
        let (status, body) = send(
            &app,
            "POST",
            "/api/signup",
            Some(json!({ "username": "", "password": "123", "phone": "call me" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let errors = body["errors"].as_array().unwrap();
        let paths: Vec<_> = errors.iter().map(|e| e["path"].as_str().unwrap()).collect();
        assert_eq!(paths, ["username", "password", "phone", "name"]);
        assert_eq!(errors[0]["msg"], "Username is required");
        assert_eq!(errors[0]["location"], "body");
    }

    #[tokio::test]
    async fn malformed_body_is_a_client_error() {
        let app = build_app(AppState::fake());
        let req = Request::builder()
            .method("POST")
            .uri("/api/signup")
            .header("content-type", "application/json")
            .body(Body::from("{ invalid json }"))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn form_encoded_signup_and_login() {
        let app = build_app(AppState::fake());

        let (status, body) = send_form(
            &app,
            "/api/signup",
            "username=amy&password=secret1&phone=%2B14155550100&name=Amy",
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["username"], "amy");
        assert_eq!(body["data"]["phone"], "+14155550100");

        let (status, body) = send_form(&app, "/api/login", "username=amy&password=secret1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Login Successful");
        assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));

        let (status, body) = send_form(&app, "/api/login", "username=amy").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["path"], "password");
    }

    #[tokio::test]
    async fn login_outcomes() {
        let app = build_app(AppState::fake());
        send(&app, "POST", "/api/signup", Some(amy()), None).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/login",
            Some(json!({ "username": "amy", "password": "secret1" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 201);
        assert_eq!(body["message"], "Login Successful");
        assert_eq!(body["data"]["phone"], "+14155550100");
        assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));

        let (status, body) = send(
            &app,
            "POST",
            "/api/login",
            Some(json!({ "username": "amy", "password": "wrong-one" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "message": "Invalid password", "status": 400 }));

        let (status, body) = send(
            &app,
            "POST",
            "/api/login",
            Some(json!({ "username": "nobody", "password": "secret1" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "message": "Invalid username", "status": 400 }));
    }

    #[tokio::test]
    async fn login_requires_fields() {
        let app = build_app(AppState::fake());
        let (status, body) = send(&app, "POST", "/api/login", Some(json!({})), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn protected_route_accepts_token_until_expiry() {
        let state = AppState::fake();
        let app = build_app(state.clone());
        let (_, body) = send(&app, "POST", "/api/signup", Some(amy()), None).await;
        let claims = state
            .keys
            .verify(body["data"]["token"].as_str().unwrap())
            .unwrap();

        let now = OffsetDateTime::now_utc();
        let hour_old = state
            .keys
            .issue_at(claims.id, "amy", now - Duration::hours(1))
            .unwrap();
        let (status, body) = send(&app, "GET", "/api/protected", None, Some(&hour_old)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["msg"], "You are authorized");
        assert_eq!(body["user"]["username"], "amy");
        assert_eq!(body["user"]["name"], "Amy");
        assert!(body["user"].get("password_hash").is_none());

        let five_days_old = state
            .keys
            .issue_at(claims.id, "amy", now - Duration::days(5))
            .unwrap();
        let (status, _) = send(&app, "GET", "/api/protected", None, Some(&five_days_old)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_route_rejects_bad_credentials() {
        let state = AppState::fake();
        let app = build_app(state.clone());

        let (status, _) = send(&app, "GET", "/api/protected", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "GET", "/api/protected", None, Some("garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Well-signed token for a user the store has never seen.
        let ghost = state.keys.issue(Uuid::new_v4(), "ghost").unwrap();
        let (status, _) = send(&app, "GET", "/api/protected", None, Some(&ghost)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    struct BrokenStore;

    #[async_trait]
    impl UserStore for BrokenStore {
        async fn find_by_username(&self, _: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn find_by_id(&self, _: Uuid) -> Result<Option<User>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn create(&self, _: NewUser) -> Result<User, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn store_failure_is_an_opaque_server_error() {
        let base = AppState::fake();
        let state = AppState::from_parts(
            Arc::new(BrokenStore),
            base.hasher.clone(),
            base.keys.clone(),
        )
        .unwrap();
        let app = build_app(state);

        let (status, body) = send(&app, "POST", "/api/signup", Some(amy()), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "status": 500, "message": "Server error" }));
    }

    /// Store whose username lookup passes but whose insert hits a unique index,
    /// as when another signup commits in between.
    struct RacingStore(DuplicateField);

    #[async_trait]
    impl UserStore for RacingStore {
        async fn find_by_username(&self, _: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn find_by_id(&self, _: Uuid) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn create(&self, _: NewUser) -> Result<User, StoreError> {
            Err(StoreError::Duplicate(self.0))
        }
    }

    fn racing_app(field: DuplicateField) -> Router {
        let base = AppState::fake();
        let state = AppState::from_parts(
            Arc::new(RacingStore(field)),
            base.hasher.clone(),
            base.keys.clone(),
        )
        .unwrap();
        build_app(state)
    }

    #[tokio::test]
    async fn username_lost_at_insert_reports_username_conflict() {
        let app = racing_app(DuplicateField::Username);
        let (status, body) = send(&app, "POST", "/api/signup", Some(amy()), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({ "status": 400, "message": "Username already exists", "errors": [] })
        );
    }

    #[tokio::test]
    async fn unattributed_duplicate_reports_phone_conflict() {
        let app = racing_app(DuplicateField::Unknown);
        let (status, body) = send(&app, "POST", "/api/signup", Some(amy()), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "status": 400, "message": "Phone number already registered" }));
    }
}
