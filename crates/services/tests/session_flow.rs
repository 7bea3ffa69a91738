mod support;

use serde_json::json;

use portal_core::model::{ProfilePatch, SessionState, SettingsPatch, Theme};
use services::api::user::RegisterRequest;
use services::http::Method;
use services::{ApiError, SessionError};
use storage::{InMemoryStore, KeyValueStore, MirrorKey};

use support::{Harness, eventually, login_json, user_json};

const LOGIN: &str = "/api/v1/auth/login";
const REGISTER: &str = "/api/v1/auth/register";
const LOGOUT: &str = "/api/v1/auth/logout";
const REFRESH: &str = "/api/v1/auth/refresh";
const PROFILE: &str = "/api/v1/user/profile";
const PASSWORD: &str = "/api/v1/user/password";
const SETTINGS: &str = "/api/v1/user/settings";

fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.set("token", r#""stored-token""#).unwrap();
    store.set("refreshToken", r#""stored-refresh""#).unwrap();
    store.set("user", &user_json().to_string()).unwrap();
    store
        .set("userSettings", r#"{"appearance":{"theme":"dark"}}"#)
        .unwrap();
    store
}

#[tokio::test]
async fn login_persists_credentials_and_profile() {
    let h = Harness::new();
    h.transport.ok(Method::Post, LOGIN, login_json());
    let session = h.context.session();

    let user = session.login("ada", "secret").await.expect("login");
    assert_eq!(user.username, "ada");
    assert!(session.is_authenticated());
    assert_eq!(session.state(), SessionState::Authenticated);

    let mirror = h.reopened_mirror();
    assert_eq!(mirror.load::<String>(MirrorKey::Token).as_deref(), Some("access-1"));
    assert_eq!(
        mirror.load::<String>(MirrorKey::RefreshToken).as_deref(),
        Some("refresh-1")
    );
    assert!(h.store.get("tokenExpiry").unwrap().is_some());
    assert!(h.store.get("user").unwrap().is_some());

    let body = h.transport.last(Method::Post, LOGIN).unwrap().body.unwrap();
    assert_eq!(body, json!({"username": "ada", "password": "secret"}));
}

#[tokio::test]
async fn blank_credentials_never_reach_the_network() {
    let h = Harness::new();
    let session = h.context.session();

    for (user, pass) in [("", "x"), ("   ", "x"), ("ada", "")] {
        let err = session.login(user, pass).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
    }
    assert!(h.transport.requests().is_empty());
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn rejected_login_surfaces_envelope_message() {
    let h = Harness::new();
    h.transport
        .business(Method::Post, LOGIN, 1001, "invalid username or password");
    let err = h.context.session().login("ada", "nope").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Api(ApiError::Business { code: 1001, .. })
    ));
    assert_eq!(h.shell.errors(), vec!["invalid username or password".to_string()]);
}

#[tokio::test]
async fn authenticated_requests_carry_bearer_and_gets_are_cache_busted() {
    let h = Harness::new();
    h.transport.ok(Method::Post, LOGIN, login_json());
    h.transport.ok(Method::Get, PROFILE, user_json());
    let session = h.context.session();
    session.login("ada", "secret").await.unwrap();

    session.fetch_profile().await.unwrap();
    let request = h.transport.last(Method::Get, PROFILE).unwrap();
    assert_eq!(request.bearer.as_deref(), Some("access-1"));
    let busted: Vec<_> = request
        .url
        .query_pairs()
        .filter(|(k, _)| k == "_t")
        .map(|(_, v)| v.into_owned())
        .collect();
    assert_eq!(busted, vec![h.clock.now_millis().to_string()]);

    let login = h.transport.last(Method::Post, LOGIN).unwrap();
    assert_eq!(login.url.query(), None);
}

#[tokio::test]
async fn logout_clears_everything_even_when_server_fails() {
    let h = Harness::new();
    h.transport.ok(Method::Post, LOGIN, login_json());
    h.transport.offline(Method::Post, LOGOUT);
    let session = h.context.session();
    session.login("ada", "secret").await.unwrap();
    h.store.set("userSettings", "{}").unwrap();

    session.logout().await;

    assert!(!session.is_authenticated());
    assert!(session.user().is_none());
    assert_eq!(session.settings(), Default::default());
    for key in MirrorKey::SESSION_SCOPED {
        assert_eq!(h.store.get(key.as_str()).unwrap(), None, "{key} still persisted");
    }
    assert_eq!(h.shell.navigations(), 1);
    assert!(h.shell.errors().is_empty(), "logout failures stay quiet");

    let call = h.transport.last(Method::Post, LOGOUT).expect("server told");
    assert_eq!(call.bearer.as_deref(), Some("access-1"));
}

#[tokio::test]
async fn initialize_user_restores_before_validation_resolves() {
    let h = Harness::with_store(seeded_store());
    h.transport.ok(Method::Get, PROFILE, user_json());
    let gate = h.transport.hold(Method::Get, PROFILE);

    let validation = h.context.start().expect("stored session");
    let session = h.context.session();
    assert!(session.is_authenticated());
    assert_eq!(session.token().as_deref(), Some("stored-token"));
    assert_eq!(session.settings().appearance.theme, Theme::Dark);
    assert!(!validation.is_finished());

    gate.notify_one();
    validation.await.unwrap();
    assert!(session.is_authenticated());
    assert_eq!(session.user().unwrap().email, "ada@example.com");
}

#[tokio::test]
async fn network_failure_during_validation_keeps_the_session() {
    let h = Harness::with_store(seeded_store());
    h.transport.offline(Method::Get, PROFILE);

    h.context.start().expect("stored session").await.unwrap();
    assert!(h.context.session().is_authenticated());
    assert_eq!(h.shell.navigations(), 0);
}

#[tokio::test]
async fn business_failure_during_validation_signs_out() {
    let h = Harness::with_store(seeded_store());
    h.transport.business(Method::Get, PROFILE, 1004, "account disabled");

    h.context.start().expect("stored session").await.unwrap();
    assert!(!h.context.session().is_authenticated());
    assert_eq!(h.store.get("token").unwrap(), None);
    assert_eq!(h.shell.navigations(), 1);
}

#[tokio::test]
async fn unauthorized_response_prompts_and_signs_out() {
    let h = Harness::new();
    h.transport.ok(Method::Post, LOGIN, login_json());
    h.transport.business(Method::Put, SETTINGS, 401, "token expired");
    h.context.start();
    let session = h.context.session();
    session.login("ada", "secret").await.unwrap();

    let err = session
        .save_settings(SettingsPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Api(ref e) if e.is_auth()));

    eventually(|| !session.is_authenticated()).await;
    assert_eq!(h.shell.prompts(), 1);
    assert_eq!(h.shell.navigations(), 1);
    assert!(h.shell.errors().is_empty(), "401 goes through the prompt only");
}

#[tokio::test]
async fn declined_relogin_keeps_the_session() {
    let h = Harness::new();
    h.shell.decline_relogin();
    h.transport.ok(Method::Post, LOGIN, login_json());
    h.transport.status(Method::Get, PROFILE, 403);
    h.context.start();
    let session = h.context.session();
    session.login("ada", "secret").await.unwrap();

    session.fetch_profile().await.unwrap_err();
    eventually(|| h.shell.prompts() == 1).await;
    assert!(session.is_authenticated());
    assert_eq!(
        h.shell.errors(),
        vec!["Permission denied for this resource".to_string()]
    );
}

#[tokio::test]
async fn refresh_replaces_tokens_and_failure_signs_out() {
    let h = Harness::new();
    h.transport.ok(Method::Post, LOGIN, login_json());
    h.transport.ok(
        Method::Post,
        REFRESH,
        json!({"token": "access-2", "refreshToken": "refresh-2", "expiresIn": 3600}),
    );
    let session = h.context.session();
    session.login("ada", "secret").await.unwrap();

    session.refresh().await.expect("refresh");
    assert_eq!(session.token().as_deref(), Some("access-2"));
    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(
        h.reopened_mirror()
            .load::<String>(MirrorKey::RefreshToken)
            .as_deref(),
        Some("refresh-2")
    );
    let body = h.transport.last(Method::Post, REFRESH).unwrap().body.unwrap();
    assert_eq!(body, json!({"refreshToken": "refresh-1"}));

    h.transport.business(Method::Post, REFRESH, 1005, "refresh token revoked");
    session.refresh().await.unwrap_err();
    assert_eq!(session.state(), SessionState::Anonymous);
    assert_eq!(h.store.get("refreshToken").unwrap(), None);
}

#[tokio::test]
async fn rejected_refresh_signs_out_without_relogin_prompt() {
    let h = Harness::new();
    h.transport.ok(Method::Post, LOGIN, login_json());
    h.transport.status(Method::Post, REFRESH, 401);
    h.context.start();
    let session = h.context.session();
    session.login("ada", "secret").await.unwrap();

    let err = session.refresh().await.unwrap_err();
    assert!(matches!(err, SessionError::Api(ref e) if e.is_auth()));
    assert_eq!(session.state(), SessionState::Anonymous);
    assert_eq!(h.store.get("token").unwrap(), None);

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    assert_eq!(h.shell.prompts(), 0);
    assert!(h.shell.errors().is_empty());
    assert_eq!(h.shell.navigations(), 1);
}

#[tokio::test]
async fn ensure_fresh_refreshes_only_near_expiry() {
    let h = Harness::new();
    h.transport.ok(Method::Post, LOGIN, login_json());
    h.transport.ok(
        Method::Post,
        REFRESH,
        json!({"token": "access-2", "expiresIn": 3600}),
    );
    let session = h.context.session();
    session.login("ada", "secret").await.unwrap();

    assert!(!session.ensure_fresh().await.unwrap());
    h.clock.advance(chrono::Duration::seconds(3600 - 10));
    assert!(session.ensure_fresh().await.unwrap());
    assert_eq!(session.token().as_deref(), Some("access-2"));
    assert_eq!(h.transport.calls(Method::Post, REFRESH), 1);
}

#[tokio::test]
async fn settings_are_saved_locally_before_sync() {
    let h = Harness::new();
    h.transport.ok(Method::Post, LOGIN, login_json());
    let session = h.context.session();
    session.login("ada", "secret").await.unwrap();

    let mut appearance = session.settings().appearance;
    appearance.theme = Theme::Dark;
    let result = session
        .save_settings(SettingsPatch {
            appearance: Some(appearance),
            ..SettingsPatch::default()
        })
        .await;

    assert!(result.is_err(), "server unreachable");
    assert_eq!(session.settings().appearance.theme, Theme::Dark);
    let raw = h.store.get("userSettings").unwrap().unwrap();
    assert!(raw.contains(r#""theme":"dark""#));
}

fn registration() -> RegisterRequest {
    RegisterRequest {
        username: "grace".into(),
        email: "grace@example.com".into(),
        password: "hopper".into(),
        captcha: None,
    }
}

#[tokio::test]
async fn register_requires_every_field() {
    let h = Harness::new();
    let session = h.context.session();

    let incomplete = [
        RegisterRequest { username: " ".into(), ..registration() },
        RegisterRequest { email: String::new(), ..registration() },
        RegisterRequest { password: String::new(), ..registration() },
    ];
    for request in &incomplete {
        let err = session.register(request).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
    }
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn register_posts_the_account_without_signing_in() {
    let h = Harness::new();
    h.transport.ok(Method::Post, REGISTER, serde_json::Value::Null);
    let session = h.context.session();

    session.register(&registration()).await.expect("register");
    let request = h.transport.last(Method::Post, REGISTER).unwrap();
    assert_eq!(
        request.body.unwrap(),
        json!({"username": "grace", "email": "grace@example.com", "password": "hopper"})
    );
    assert!(!session.is_authenticated());
    assert_eq!(h.store.get("token").unwrap(), None);
}

#[tokio::test]
async fn rejected_registration_surfaces_envelope_message() {
    let h = Harness::new();
    h.transport
        .business(Method::Post, REGISTER, 1002, "username already taken");
    let err = h
        .context
        .session()
        .register(&registration())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Api(ApiError::Business { code: 1002, .. })
    ));
    assert_eq!(h.shell.errors(), vec!["username already taken".to_string()]);
}

#[tokio::test]
async fn empty_profile_patch_is_rejected_locally() {
    let h = Harness::new();
    h.transport.ok(Method::Post, LOGIN, login_json());
    let session = h.context.session();
    session.login("ada", "secret").await.unwrap();

    let err = session
        .update_profile(&ProfilePatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(h.transport.calls(Method::Put, PROFILE), 0);
}

#[tokio::test]
async fn profile_update_replaces_user_and_persists_it() {
    let h = Harness::new();
    h.transport.ok(Method::Post, LOGIN, login_json());
    let mut updated = user_json();
    updated["bio"] = json!("analyst");
    h.transport.ok(Method::Put, PROFILE, updated);
    let session = h.context.session();
    session.login("ada", "secret").await.unwrap();

    let patch = ProfilePatch {
        bio: Some("analyst".into()),
        ..ProfilePatch::default()
    };
    let profile = session.update_profile(&patch).await.expect("update");
    assert_eq!(profile.bio.as_deref(), Some("analyst"));
    assert_eq!(session.user().unwrap().bio.as_deref(), Some("analyst"));

    let body = h.transport.last(Method::Put, PROFILE).unwrap().body.unwrap();
    assert_eq!(body, json!({"bio": "analyst"}));
    let raw = h.store.get("user").unwrap().unwrap();
    assert!(raw.contains(r#""bio":"analyst""#));
}

#[tokio::test]
async fn blank_passwords_never_reach_the_network() {
    let h = Harness::new();
    let session = h.context.session();

    for (current, new) in [("", "next"), ("old", ""), ("", "")] {
        let err = session.change_password(current, new).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
    }
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn password_change_sends_both_passwords() {
    let h = Harness::new();
    h.transport.ok(Method::Post, LOGIN, login_json());
    h.transport.ok(Method::Put, PASSWORD, serde_json::Value::Null);
    let session = h.context.session();
    session.login("ada", "secret").await.unwrap();

    session.change_password("secret", "s3cret!").await.expect("change");
    let request = h.transport.last(Method::Put, PASSWORD).unwrap();
    assert_eq!(request.bearer.as_deref(), Some("access-1"));
    assert_eq!(
        request.body.unwrap(),
        json!({"currentPassword": "secret", "newPassword": "s3cret!"})
    );
    assert!(session.is_authenticated());
}
