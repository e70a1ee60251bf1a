//! End-to-end signup, login and refresh rotation against PostgreSQL.
//!
//! Run with `cargo test -- --ignored` and `DATABASE_URL` pointing at a
//! scratch database.

mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use gdsi::app::build_router;
use gdsi::core::auth::{AuthError, AuthService, LoginRequest, PasswordHasher, RefreshRequest};
use gdsi::core::clock::FixedClock;
use gdsi::core::db::models::ClientMetadata;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use common::{database_state, send, signup_body, unique_email};

async fn account_id(pool: &PgPool, email: &str) -> Uuid {
    let row: (Uuid,) = sqlx::query_as("SELECT id FROM account WHERE email = $1")
        .bind(email)
        .fetch_one(pool)
        .await
        .unwrap();
    row.0
}

async fn count(pool: &PgPool, sql: &str, account_id: Uuid) -> i64 {
    let row: (i64,) = sqlx::query_as(sql)
        .bind(account_id)
        .fetch_one(pool)
        .await
        .unwrap();
    row.0
}

async fn live_tokens(pool: &PgPool, account_id: Uuid) -> i64 {
    count(
        pool,
        "SELECT COUNT(*) FROM refresh_token WHERE account_id = $1 AND is_revoked = FALSE",
        account_id,
    )
    .await
}

async fn all_tokens(pool: &PgPool, account_id: Uuid) -> i64 {
    count(pool, "SELECT COUNT(*) FROM refresh_token WHERE account_id = $1", account_id).await
}

async fn delete_account(pool: &PgPool, account_id: Uuid) {
    sqlx::query("DELETE FROM account WHERE id = $1")
        .bind(account_id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn test_signup_login_refresh_replay_scenario() {
    let (state, pool) = database_state().await;
    let app = build_router(state);
    let email = unique_email();

    // S1: signup
    let (status, body) = send(&app, Method::POST, "/v1/auth/signup", None, Some(signup_body(&email))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!body["access_token"].as_str().unwrap().is_empty());
    assert!(!body["refresh_token"].as_str().unwrap().is_empty());
    let account = account_id(&pool, &email).await;
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM player WHERE account_id = $1", account).await,
        1
    );
    assert_eq!(all_tokens(&pool, account).await, 1);
    assert_eq!(live_tokens(&pool, account).await, 1);

    // S2: duplicate signup
    let (status, body) = send(&app, Method::POST, "/v1/auth/signup", None, Some(signup_body(&email))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "account with email already exists");
    assert_eq!(all_tokens(&pool, account).await, 1);

    // S3: wrong password
    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/auth/tokens/access",
        None,
        Some(json!({ "email": email, "password": "WRONG" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid email or password");
    assert_eq!(all_tokens(&pool, account).await, 1);

    // S4: correct login revokes the signup token
    let (status, login) = send(
        &app,
        Method::POST,
        "/v1/auth/tokens/access",
        None,
        Some(json!({ "email": email, "password": "hunter22" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all_tokens(&pool, account).await, 2);
    assert_eq!(live_tokens(&pool, account).await, 1);
    let login_refresh = login["refresh_token"].as_str().unwrap().to_string();

    // S5: rotation
    let (status, rotated) = send(
        &app,
        Method::POST,
        "/v1/auth/tokens/refresh",
        None,
        Some(json!({ "refresh_token": login_refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refresh_token"], login["refresh_token"]);
    assert_eq!(all_tokens(&pool, account).await, 3);
    assert_eq!(live_tokens(&pool, account).await, 1);

    // S6: replaying the rotated token revokes everything
    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/auth/tokens/refresh",
        None,
        Some(json!({ "refresh_token": login_refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "refresh token is revoked");
    assert_eq!(live_tokens(&pool, account).await, 0);

    delete_account(&pool, account).await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn test_email_is_case_insensitive() {
    let (state, pool) = database_state().await;
    let app = build_router(state);
    let email = unique_email();

    let (status, _) = send(&app, Method::POST, "/v1/auth/signup", None, Some(signup_body(&email))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/auth/signup",
        None,
        Some(signup_body(&email.to_uppercase())),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/auth/tokens/access",
        None,
        Some(json!({ "email": email.to_uppercase(), "password": "hunter22" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    delete_account(&pool, account_id(&pool, &email).await).await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn test_unknown_refresh_token_is_unauthorized() {
    let (state, _pool) = database_state().await;
    let app = build_router(state);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/auth/tokens/refresh",
        None,
        Some(json!({ "refresh_token": "never-issued" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "refresh token not found");
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn test_expired_refresh_token_is_revoked() {
    let (state, pool) = database_state().await;
    let app = build_router(state.clone());
    let email = unique_email();

    let (_, body) = send(&app, Method::POST, "/v1/auth/signup", None, Some(signup_body(&email))).await;
    let account = account_id(&pool, &email).await;
    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();

    let later = Utc::now() + Duration::hours(721);
    let service = AuthService::with_clock(
        pool.clone(),
        state.jwt.clone(),
        PasswordHasher::new(4),
        Arc::new(FixedClock(later)),
    );

    let result = service
        .refresh(RefreshRequest { refresh_token }, ClientMetadata::default())
        .await;
    assert!(matches!(result, Err(AuthError::RefreshTokenExpired)));
    assert_eq!(live_tokens(&pool, account).await, 0);
    assert_eq!(all_tokens(&pool, account).await, 1);

    delete_account(&pool, account).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires running PostgreSQL database"]
async fn test_concurrent_rotation_has_one_winner() {
    let (state, pool) = database_state().await;
    let app = build_router(state.clone());
    let email = unique_email();

    let (_, body) = send(&app, Method::POST, "/v1/auth/signup", None, Some(signup_body(&email))).await;
    let account = account_id(&pool, &email).await;
    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();

    let attempts: Vec<_> = (0..4)
        .map(|_| {
            let service = state.auth.clone();
            let refresh_token = refresh_token.clone();
            tokio::spawn(async move {
                service
                    .refresh(RefreshRequest { refresh_token }, ClientMetadata::default())
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => assert!(matches!(err, AuthError::RefreshTokenRevoked)),
        }
    }

    assert_eq!(successes, 1);
    // Losers found the token revoked and revoked the winner's new token too
    assert_eq!(live_tokens(&pool, account).await, 0);

    delete_account(&pool, account).await;
}

fn login_request(email: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: "hunter22".to_string(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires running PostgreSQL database"]
async fn test_concurrent_logins_leave_one_live_token() {
    let (state, pool) = database_state().await;
    let app = build_router(state.clone());
    let email = unique_email();

    send(&app, Method::POST, "/v1/auth/signup", None, Some(signup_body(&email))).await;
    let account = account_id(&pool, &email).await;

    let attempts: Vec<_> = (0..6)
        .map(|_| {
            let service = state.auth.clone();
            let request = login_request(&email);
            tokio::spawn(async move { service.login(request, ClientMetadata::default()).await })
        })
        .collect();

    for attempt in attempts {
        assert!(attempt.await.unwrap().is_ok());
    }

    assert_eq!(live_tokens(&pool, account).await, 1);
    assert_eq!(all_tokens(&pool, account).await, 7);

    delete_account(&pool, account).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires running PostgreSQL database"]
async fn test_login_racing_refresh_leaves_at_most_one_live_token() {
    let (state, pool) = database_state().await;
    let app = build_router(state.clone());
    let email = unique_email();

    let (_, body) = send(&app, Method::POST, "/v1/auth/signup", None, Some(signup_body(&email))).await;
    let account = account_id(&pool, &email).await;
    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();

    let refresher = {
        let service = state.auth.clone();
        tokio::spawn(async move {
            service
                .refresh(RefreshRequest { refresh_token }, ClientMetadata::default())
                .await
        })
    };
    let login = {
        let service = state.auth.clone();
        let request = login_request(&email);
        tokio::spawn(async move { service.login(request, ClientMetadata::default()).await })
    };

    assert!(login.await.unwrap().is_ok());
    match refresher.await.unwrap() {
        Ok(_) => {}
        // Login committed first and revoked the presented token
        Err(err) => assert!(matches!(err, AuthError::RefreshTokenRevoked)),
    }

    assert!(live_tokens(&pool, account).await <= 1);

    delete_account(&pool, account).await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn test_refresh_records_client_metadata_and_last_use() {
    let (state, pool) = database_state().await;
    let app = build_router(state.clone());
    let email = unique_email();

    send(&app, Method::POST, "/v1/auth/signup", None, Some(signup_body(&email))).await;
    let account = account_id(&pool, &email).await;

    let client = ClientMetadata {
        device_id: Some("pixel-8".to_string()),
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("gdsi-android/2.4".to_string()),
    };
    let pair = state
        .auth
        .login(
            LoginRequest {
                email: email.clone(),
                password: "hunter22".to_string(),
            },
            client.clone(),
        )
        .await
        .unwrap();
    state
        .auth
        .refresh(
            RefreshRequest {
                refresh_token: pair.refresh_token,
            },
            ClientMetadata::default(),
        )
        .await
        .unwrap();

    let row: (Option<String>, Option<String>, Option<String>, bool, bool) = sqlx::query_as(
        r#"
        SELECT device_id, ip_address, user_agent, is_revoked, last_used_at IS NOT NULL
        FROM refresh_token
        WHERE account_id = $1 AND device_id IS NOT NULL
        "#,
    )
    .bind(account)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, client.device_id);
    assert_eq!(row.1, client.ip_address);
    assert_eq!(row.2, client.user_agent);
    assert!(row.3);
    assert!(row.4);

    delete_account(&pool, account).await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn test_logout_revokes_all_tokens() {
    let (state, pool) = database_state().await;
    let app = build_router(state);
    let email = unique_email();

    let (_, body) = send(&app, Method::POST, "/v1/auth/signup", None, Some(signup_body(&email))).await;
    let account = account_id(&pool, &email).await;
    let access = body["access_token"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::POST, "/v1/auth/logout", Some(&access), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(live_tokens(&pool, account).await, 0);

    delete_account(&pool, account).await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn test_player_owner_can_update_and_delete() {
    let (state, pool) = database_state().await;
    let app = build_router(state);
    let email = unique_email();
    let other_email = unique_email();

    let (_, body) = send(&app, Method::POST, "/v1/auth/signup", None, Some(signup_body(&email))).await;
    let access = body["access_token"].as_str().unwrap().to_string();
    let (_, other) = send(&app, Method::POST, "/v1/auth/signup", None, Some(signup_body(&other_email))).await;
    let other_access = other["access_token"].as_str().unwrap().to_string();

    let account = account_id(&pool, &email).await;
    let other_account = account_id(&pool, &other_email).await;
    let player: (Uuid,) = sqlx::query_as("SELECT id FROM player WHERE account_id = $1")
        .bind(account)
        .fetch_one(&pool)
        .await
        .unwrap();
    let uri = format!("/v1/players/{}", player.0);

    let (status, updated) = send(&app, Method::PATCH, &uri, Some(&access), Some(json!({ "racket": "Babolat" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["racket"], "Babolat");

    let (status, _) = send(&app, Method::PATCH, &uri, Some(&other_access), Some(json!({ "racket": "Head" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, fetched) = send(&app, Method::GET, &uri, Some(&other_access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["racket"], "Babolat");

    let (status, _) = send(&app, Method::DELETE, &format!("/v1/accounts/{account}"), Some(&access), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(all_tokens(&pool, account).await, 0);

    let (status, _) = send(&app, Method::GET, &uri, Some(&other_access), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    delete_account(&pool, other_account).await;
}
