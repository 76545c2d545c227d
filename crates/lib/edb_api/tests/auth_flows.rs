//! Bearer-token flows: sign-up, sign-in, token exchange and resets.

mod support;

use axum::http::StatusCode;
use edb_core::mail::MailKind;
use edb_core::models::auth::TokenKind;
use serde_json::json;
use support::{PASSWORD, TestApp, bearer, post, post_json};

async fn sign_in(app: &TestApp, username: &str) -> (String, String) {
    let resp = app
        .send(post_json(
            "/auth/signin",
            json!({ "username": username, "password": PASSWORD }),
        ))
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.json);
    (
        resp.json["data"]["refreshToken"].as_str().unwrap().to_string(),
        resp.json["data"]["accessToken"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn signup_then_verify_email() {
    let app = TestApp::new();

    let resp = app
        .send(post_json(
            "/signup",
            json!({ "email": "Alice <alice@example.com>", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.json);
    assert_eq!(resp.json["success"], true);

    let token = app
        .mail
        .last(MailKind::Verify, "alice@example.com")
        .and_then(|m| m.token)
        .expect("verify email queued");

    // Unverified accounts cannot sign in
    let resp = app
        .send(post_json(
            "/auth/signin",
            json!({ "username": "alice@example.com", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.error(), "email_not_verified");

    let resp = app.send(bearer(post("/auth/email/verified"), &token)).await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.json);
    assert!(app.mail.last(MailKind::Verified, "alice@example.com").is_some());

    let resp = app.send(bearer(post("/auth/email/verified"), &token)).await;
    assert_eq!(resp.status, StatusCode::OK);
    let confirmations = app
        .mail
        .sent()
        .into_iter()
        .filter(|m| m.kind == MailKind::Verified)
        .count();
    assert_eq!(confirmations, 1);

    let (_, access) = sign_in(&app, "alice@example.com").await;
    let claims = app.state.tokens.parse(&access).unwrap();
    assert_eq!(claims.kind, TokenKind::Access);
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let app = TestApp::new();
    app.add_user("bob", &["user", "login"]).await;

    let resp = app
        .send(post_json("/signup", json!({ "email": "bob@example.com" })))
        .await;
    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(resp.error(), "account_exists");
}

#[tokio::test]
async fn signup_rejects_a_malformed_address() {
    let app = TestApp::new();
    let resp = app
        .send(post_json("/signup", json!({ "email": "not an address" })))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error(), "invalid_email");
    assert!(app.users.is_empty().await);
}

#[tokio::test]
async fn empty_password_sends_a_passwordless_email() {
    let app = TestApp::new();
    app.add_user("bob", &["user", "login"]).await;

    let resp = app
        .send(post_json("/auth/signin", json!({ "username": "bob" })))
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.json);
    assert!(resp.json["data"].is_null());

    let mail = app
        .mail
        .last(MailKind::Passwordless, "bob@example.com")
        .expect("passwordless email queued");
    assert_eq!(mail.ttl.as_deref(), Some("10 minutes"));
    let token = mail.token.unwrap();
    assert_eq!(
        app.state.tokens.parse(&token).unwrap().kind,
        TokenKind::Passwordless
    );

    let resp = app
        .send(bearer(post("/auth/passwordless/signin"), &token))
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.json);
    let refresh = resp.json["data"]["refreshToken"].as_str().unwrap();
    assert_eq!(
        app.state.tokens.parse(refresh).unwrap().kind,
        TokenKind::Refresh
    );
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let app = TestApp::new();
    app.add_user("bob", &["user", "login"]).await;

    let wrong = app
        .send(post_json(
            "/auth/signin",
            json!({ "username": "bob", "password": "not the password" }),
        ))
        .await;
    let unknown = app
        .send(post_json(
            "/auth/signin",
            json!({ "username": "nobody", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(wrong.status, StatusCode::NOT_FOUND);
    assert_eq!(wrong.status, unknown.status);
    assert_eq!(wrong.json, unknown.json);
}

#[tokio::test]
async fn accounts_without_the_login_role_cannot_sign_in() {
    let app = TestApp::new();
    app.add_user("robot", &["user"]).await;

    let resp = app
        .send(post_json(
            "/auth/signin",
            json!({ "username": "robot", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.error(), "not_allowed_to_sign_in");
}

#[tokio::test]
async fn wrong_password_does_not_reveal_accounts_that_cannot_sign_in() {
    let app = TestApp::new();
    app.add_user("robot", &["user"]).await;

    let wrong = app
        .send(post_json(
            "/auth/signin",
            json!({ "username": "robot", "password": "not the password" }),
        ))
        .await;
    let unknown = app
        .send(post_json(
            "/auth/signin",
            json!({ "username": "nobody", "password": "not the password" }),
        ))
        .await;
    assert_eq!(wrong.status, StatusCode::NOT_FOUND);
    assert_eq!(wrong.json, unknown.json);
}

#[tokio::test]
async fn refresh_and_access_tokens_are_not_interchangeable() {
    let app = TestApp::new();
    app.add_user("bob", &["user", "login"]).await;
    let (refresh, access) = sign_in(&app, "bob").await;

    let resp = app.send(bearer(post("/auth/users"), &refresh)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error(), "wrong_token_type");

    let resp = app.send(bearer(post("/auth/users"), &access)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json["data"]["username"], "bob");
    assert!(resp.json["data"].get("passwordHash").is_none());

    let resp = app.send(bearer(post("/auth/tokens/access"), &access)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app.send(bearer(post("/auth/tokens/access"), &refresh)).await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.json);
    let fresh = resp.json["data"]["accessToken"].as_str().unwrap();
    assert_eq!(
        app.state.tokens.parse(fresh).unwrap().kind,
        TokenKind::Access
    );
}

#[tokio::test]
async fn missing_or_garbage_bearer_is_unauthorized() {
    let app = TestApp::new();

    let resp = app.send(post("/auth/tokens/info")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = app
        .send(bearer(post("/auth/tokens/info"), "not-a-jwt"))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error(), "invalid_token");
}

#[tokio::test]
async fn token_info_describes_the_bearer() {
    let app = TestApp::new();
    let bob = app.add_user("bob", &["user", "login"]).await;
    let (_, access) = sign_in(&app, "bob").await;

    let resp = app.send(bearer(post("/auth/tokens/info"), &access)).await;
    assert_eq!(resp.status, StatusCode::OK);
    let data = &resp.json["data"];
    assert_eq!(data["userId"], bob.id.as_str());
    assert_eq!(data["type"], "access");
    assert_eq!(data["roles"], json!(["user", "login"]));
    assert!(data["expires"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn password_reset_token_works_once() {
    let app = TestApp::new();
    app.add_user("bob", &["user", "login"]).await;

    let resp = app
        .send(post_json(
            "/auth/passwords/reset",
            json!({ "email": "bob@example.com" }),
        ))
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.json);
    let token = app
        .mail
        .last(MailKind::PasswordReset, "bob@example.com")
        .and_then(|m| m.token)
        .unwrap();

    let update = |password: &str| {
        bearer(
            post_json("/auth/passwords/update", json!({ "password": password })),
            &token,
        )
    };

    let resp = app.send(update("short")).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error(), "invalid_password");

    let resp = app.send(update("a brand new password")).await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.json);
    assert!(app.mail.last(MailKind::PasswordUpdated, "bob@example.com").is_some());

    let resp = app.send(update("yet another password")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = app
        .send(post_json(
            "/auth/signin",
            json!({ "username": "bob", "password": "a brand new password" }),
        ))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn email_change_is_mailed_to_the_current_address() {
    let app = TestApp::new();
    app.add_user("bob", &["user", "login"]).await;
    app.add_user("carol", &["user", "login"]).await;
    let (_, access) = sign_in(&app, "bob").await;

    let resp = app
        .send(bearer(
            post_json("/auth/email/reset", json!({ "email": "carol@example.com" })),
            &access,
        ))
        .await;
    assert_eq!(resp.status, StatusCode::CONFLICT);

    let resp = app
        .send(bearer(
            post_json("/auth/email/reset", json!({ "email": "robert@example.com" })),
            &access,
        ))
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.json);
    let token = app
        .mail
        .last(MailKind::EmailReset, "bob@example.com")
        .and_then(|m| m.token)
        .unwrap();

    // The token is for one address only
    let resp = app
        .send(bearer(
            post_json("/auth/email/update", json!({ "email": "eve@example.com" })),
            &token,
        ))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app.send(bearer(post("/auth/email/update"), &token)).await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.json);
    assert!(
        app.mail
            .last(MailKind::EmailUpdated, "robert@example.com")
            .is_some()
    );

    let resp = app
        .send(post_json(
            "/auth/signin",
            json!({ "username": "robert@example.com", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn user_update_needs_an_update_token() {
    let app = TestApp::new();
    let bob = app.add_user("bob", &["user", "login"]).await;
    let (_, access) = sign_in(&app, "bob").await;

    let body = json!({ "name": "Robert" });
    let resp = app
        .send(bearer(post_json("/auth/users/update", body.clone()), &access))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let update = app.state.tokens.update_token(&bob.id, &bob.roles).unwrap();
    let resp = app
        .send(bearer(post_json("/auth/users/update", body), &update))
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.json);
    assert_eq!(resp.json["data"]["name"], "Robert");
    assert_eq!(resp.json["data"]["username"], "bob");
    assert!(
        app.mail
            .last(MailKind::AccountUpdated, "bob@example.com")
            .is_some()
    );
}
