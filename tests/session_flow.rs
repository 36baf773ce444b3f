use anyhow::Result;
use parampara::{
    auth::{
        CredentialStore, GuardDecision, MemoryCredentialStore, ProfileUpdate,
        ProfileUpdateOutcome, ProfileUpdatePolicy, RequireAuth, Session, SessionError,
        SessionHandle, SessionStatus, credential::Credential,
    },
    config::AppConfig,
};
use secrecy::SecretString;
use serde_json::json;
use std::{net::TcpListener, sync::Arc};
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn password() -> SecretString {
    SecretString::from("pw".to_string())
}

fn user_json(id: i64, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "full_name": name,
        "email": "a@b.com",
        "state_name": "Goa"
    })
}

async fn mount_login(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"email": "a@b.com", "password": "pw"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "token": token,
                "user": user_json(1, "A")
            })),
        )
        .mount(server)
        .await;
}

fn session(
    server: &MockServer,
    store: Arc<MemoryCredentialStore>,
    policy: ProfileUpdatePolicy,
) -> Result<SessionHandle> {
    let mut config = AppConfig::new(&format!("{}/api", server.uri()));
    config.profile_update_policy = policy;
    Ok(SessionHandle::with_store(&config, store)?)
}

#[tokio::test]
async fn login_then_logout_round_trip() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;
    mount_login(&server, "T1").await;

    let store = Arc::new(MemoryCredentialStore::default());
    let handle = session(&server, store.clone(), ProfileUpdatePolicy::default())?;

    assert_eq!(handle.restore().await?, Session::Anonymous);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());

    let user = handle.login("a@b.com", &password()).await?;
    assert_eq!(user.id, 1);
    assert_eq!(handle.status(), SessionStatus::Authenticated);
    assert_eq!(store.get()?, Some(Credential::new("T1")));

    handle.logout();
    assert_eq!(handle.current(), Session::Anonymous);
    assert_eq!(store.get()?, None);
    Ok(())
}

#[tokio::test]
async fn stale_credential_is_dropped_on_restore() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/verify"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid token"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new(
        "stale",
    )));
    let handle = session(&server, store.clone(), ProfileUpdatePolicy::default())?;
    assert_eq!(handle.status(), SessionStatus::Verifying);

    assert_eq!(handle.restore().await?, Session::Anonymous);
    assert_eq!(store.get()?, None);
    Ok(())
}

#[tokio::test]
async fn two_guards_redirect_after_one_logout() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;
    mount_login(&server, "T1").await;

    let store = Arc::new(MemoryCredentialStore::default());
    let handle = session(&server, store, ProfileUpdatePolicy::default())?;
    handle.login("a@b.com", &password()).await?;

    let mut dashboard = RequireAuth::new(&handle);
    let mut profile = RequireAuth::new(&handle);
    assert_eq!(dashboard.decision(), GuardDecision::Render);
    assert_eq!(profile.decision(), GuardDecision::Render);

    handle.logout();

    let redirect = Some(GuardDecision::Redirect {
        to: "/login".to_string(),
    });
    assert_eq!(dashboard.changed().await, redirect);
    assert_eq!(profile.changed().await, redirect);
    Ok(())
}

#[tokio::test]
async fn rejected_credential_on_profile_update_signs_out() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;
    mount_login(&server, "T1").await;
    Mock::given(method("PUT"))
        .and(path("/api/users/me/profile"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::default());
    let handle = session(&server, store.clone(), ProfileUpdatePolicy::Keep)?;
    handle.login("a@b.com", &password()).await?;
    let mut guard = RequireAuth::new(&handle);

    let result = handle
        .update_profile(ProfileUpdate {
            full_name: Some("A2".to_string()),
            ..ProfileUpdate::default()
        })
        .await;

    assert_eq!(result, Err(SessionError::AuthExpired));
    assert_eq!(handle.current(), Session::Anonymous);
    assert_eq!(store.get()?, None);
    assert_eq!(
        guard.changed().await,
        Some(GuardDecision::Redirect {
            to: "/login".to_string()
        })
    );
    Ok(())
}

#[tokio::test]
async fn profile_update_keeps_or_ends_session_by_policy() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;
    mount_login(&server, "T1").await;
    Mock::given(method("PUT"))
        .and(path("/api/users/me/profile"))
        .and(body_json(json!({"state_name": "Kerala"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"id": 1, "full_name": "A", "email": "a@b.com", "state_name": "Kerala"}
        })))
        .mount(&server)
        .await;
    let update = ProfileUpdate {
        region: Some("Kerala".to_string()),
        ..ProfileUpdate::default()
    };

    let store = Arc::new(MemoryCredentialStore::default());
    let keep = session(&server, store.clone(), ProfileUpdatePolicy::Keep)?;
    keep.login("a@b.com", &password()).await?;
    match keep.update_profile(update.clone()).await? {
        ProfileUpdateOutcome::Updated(user) => assert_eq!(user.region, "Kerala"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(keep.user().map(|user| user.region), Some("Kerala".to_string()));
    assert_eq!(store.get()?, Some(Credential::new("T1")));

    let store = Arc::new(MemoryCredentialStore::default());
    let logout = session(&server, store.clone(), ProfileUpdatePolicy::Logout)?;
    logout.login("a@b.com", &password()).await?;
    assert!(matches!(
        logout.update_profile(update).await?,
        ProfileUpdateOutcome::SignedOut(_)
    ));
    assert_eq!(logout.current(), Session::Anonymous);
    assert_eq!(store.get()?, None);
    Ok(())
}

#[tokio::test]
async fn file_store_survives_restart() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;
    mount_login(&server, "T1").await;
    Mock::given(method("GET"))
        .and(path("/api/auth/verify"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": user_json(1, "A")})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new()?;
    let mut config = AppConfig::new(&format!("{}/api", server.uri()));
    config.credential_dir = dir.path().to_path_buf();

    let first = SessionHandle::connect(&config)?;
    first.restore().await?;
    first.login("a@b.com", &password()).await?;
    drop(first);

    // A new handle over the same directory stands in for a restarted client.
    let second = SessionHandle::connect(&config)?;
    assert_eq!(second.status(), SessionStatus::Verifying);
    let restored = second.restore().await?;
    assert_eq!(restored.user().map(|user| user.id), Some(1));
    Ok(())
}
