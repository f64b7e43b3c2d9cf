use anyhow::Result;
use campus_iam::{
    auth::{
        AuditAction, AuditFilter, AuditRecorder, AuthConfig, AuthError, AuthService, Campus,
        LoginRequest, NewPrincipal, PrincipalUpdate, Requirement, Role, TokenService,
    },
    clock::{ManualClock, SharedClock},
    store::{
        memory::{Fault, Operation},
        Collection, MemoryStore, ResilientStore, StoreError, StoreOptions,
    },
};
use chrono::{Duration, Utc};
use secrecy::SecretString;
use std::sync::Arc;

const K1: &str = "campus-key-one-0123456789abcdef0123";
const K2: &str = "campus-key-two-0123456789abcdef0123";

struct Harness {
    clock: Arc<ManualClock>,
    memory: Arc<MemoryStore>,
    store: ResilientStore,
    auth: AuthService,
}

fn harness_with(config: &AuthConfig, secret: &str) -> Result<Harness> {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let shared: SharedClock = clock.clone();
    let memory = Arc::new(MemoryStore::new());
    let store = ResilientStore::new(
        memory.clone(),
        StoreOptions::new().with_retry_delay(std::time::Duration::from_millis(1)),
    );
    let tokens = TokenService::new(&SecretString::from(secret.to_string()), shared.clone())?;
    let audit = Arc::new(AuditRecorder::new(store.clone(), shared.clone()));
    let auth = AuthService::new(config, store.clone(), tokens, audit, shared);
    Ok(Harness {
        clock,
        memory,
        store,
        auth,
    })
}

fn harness() -> Result<Harness> {
    harness_with(&AuthConfig::new().with_bcrypt_cost(4), K1)
}

fn principal(username: &str, role: Role, campus: Campus, password: &str) -> NewPrincipal {
    NewPrincipal {
        username: username.to_string(),
        email: format!("{username}@example.edu"),
        display_name: format!("{username} tester"),
        role,
        campus,
        department: String::new(),
        password: password.to_string(),
    }
}

fn login(username: &str, password: &str, campus: Campus) -> LoginRequest {
    LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
        campus: Some(campus),
    }
}

async fn admin_token(h: &Harness) -> Result<String> {
    h.auth
        .bootstrap_admin(
            principal("root", Role::Admin, Campus::LlanoLargo, "Passw0rd!"),
            None,
        )
        .await?;
    let response = h
        .auth
        .login(login("root", "Passw0rd!", Campus::LlanoLargo), None)
        .await?;
    Ok(response.access_token)
}

#[tokio::test]
async fn bootstrap_admin_logs_in_with_admin_claims() -> Result<()> {
    let h = harness()?;
    let token = admin_token(&h).await?;

    let claims = h.auth.authorize(&token, Requirement::Role(Role::Admin))?;
    assert_eq!(claims.sub, "root");
    assert_eq!(claims.role, Role::Admin);
    assert_eq!(claims.campus, Campus::LlanoLargo);

    let again = h
        .auth
        .bootstrap_admin(
            principal("second", Role::Admin, Campus::Taxco, "Passw0rd!"),
            None,
        )
        .await;
    assert!(matches!(again, Err(AuthError::Forbidden(_))));
    Ok(())
}

#[tokio::test]
async fn lockout_blocks_correct_password_until_expiry() -> Result<()> {
    let h = harness()?;
    let admin = h.auth.authorize(&admin_token(&h).await?, Requirement::Authenticated)?;
    h.auth
        .register(
            &admin,
            principal("bob", Role::Nursing, Campus::Taxco, "Corr3ctHorse"),
            None,
        )
        .await?;

    for attempt in 1..=5 {
        let result = h
            .auth
            .login(login("bob", "wrong-password", Campus::Taxco), None)
            .await;
        if attempt < 5 {
            assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        } else {
            assert!(matches!(result, Err(AuthError::AccountLocked { .. })));
        }
    }

    let locked = h
        .auth
        .login(login("bob", "Corr3ctHorse", Campus::Taxco), Some("10.0.0.7".into()))
        .await;
    assert!(matches!(locked, Err(AuthError::AccountLocked { .. })));

    h.clock.advance(Duration::minutes(31));
    let response = h
        .auth
        .login(login("bob", "Corr3ctHorse", Campus::Taxco), None)
        .await?;
    assert_eq!(response.user.role, Role::Nursing);

    let stored = h
        .store
        .get_by_id(&Collection::by_id("users"), "user:bob@taxco")
        .await?
        .ok_or_else(|| anyhow::anyhow!("bob is missing"))?;
    assert_eq!(stored.get("failed_attempts"), Some(&serde_json::json!(0)));
    assert_eq!(stored.get("locked_until"), Some(&serde_json::Value::Null));

    let failures = h
        .auth
        .audit()
        .query(&AuditFilter {
            actor: Some("bob@taxco".into()),
            action: Some(AuditAction::LoginFailed),
            limit: None,
        })
        .await?;
    assert_eq!(failures.len(), 6);
    assert_eq!(failures[0].client_ip.as_deref(), Some("10.0.0.7"));
    Ok(())
}

#[tokio::test]
async fn token_from_another_key_is_rejected() -> Result<()> {
    let h1 = harness()?;
    let token = admin_token(&h1).await?;

    let h2 = harness_with(&AuthConfig::new().with_bcrypt_cost(4), K2)?;
    let result = h2.auth.authorize(&token, Requirement::Authenticated);
    assert!(matches!(result, Err(AuthError::InvalidToken)));
    Ok(())
}

#[tokio::test]
async fn zero_ttl_token_is_expired() -> Result<()> {
    let config = AuthConfig::new()
        .with_bcrypt_cost(4)
        .with_token_ttl(Duration::zero());
    let h = harness_with(&config, K1)?;
    let token = admin_token(&h).await?;

    let result = h.auth.authorize(&token, Requirement::Authenticated);
    assert!(matches!(result, Err(AuthError::Expired)));
    Ok(())
}

#[tokio::test]
async fn non_admin_cannot_register_and_nothing_is_recorded() -> Result<()> {
    let h = harness()?;
    let admin = h.auth.authorize(&admin_token(&h).await?, Requirement::Authenticated)?;
    h.auth
        .register(
            &admin,
            principal("rita", Role::Reception, Campus::Acapulco, "Recept10nist"),
            None,
        )
        .await?;

    let rita = h
        .auth
        .login(login("rita", "Recept10nist", Campus::Acapulco), None)
        .await?;
    let claims = h.auth.authorize(&rita.access_token, Requirement::Authenticated)?;

    let result = h
        .auth
        .register(
            &claims,
            principal("mallory", Role::Admin, Campus::Acapulco, "Passw0rd!"),
            None,
        )
        .await;
    assert!(matches!(result, Err(AuthError::Forbidden(_))));

    let created = h
        .auth
        .audit()
        .query(&AuditFilter {
            actor: Some("rita@acapulco".into()),
            action: Some(AuditAction::CreateUser),
            limit: None,
        })
        .await?;
    assert!(created.is_empty());

    let listed = h.auth.list_users(&admin, None, None).await?;
    assert!(listed.iter().all(|user| user.username != "mallory"));
    Ok(())
}

#[tokio::test]
async fn duplicate_username_is_scoped_to_campus() -> Result<()> {
    let h = harness()?;
    let admin = h.auth.authorize(&admin_token(&h).await?, Requirement::Authenticated)?;

    h.auth
        .register(
            &admin,
            principal("ana", Role::Physician, Campus::Taxco, "Med1cinal"),
            None,
        )
        .await?;
    h.auth
        .register(
            &admin,
            principal("ana", Role::Physician, Campus::Iguala, "Med1cinal"),
            None,
        )
        .await?;
    let duplicate = h
        .auth
        .register(
            &admin,
            principal("ana", Role::Nursing, Campus::Taxco, "Med1cinal"),
            None,
        )
        .await;
    assert!(matches!(duplicate, Err(AuthError::AlreadyExists)));

    let taxco = h.auth.list_users(&admin, Some(Campus::Taxco), None).await?;
    assert_eq!(taxco.len(), 1);
    assert_eq!(taxco[0].id, "user:ana@taxco");
    Ok(())
}

fn unavailable() -> StoreError {
    StoreError::Backend {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

async fn with_nurse(h: &Harness) -> Result<()> {
    let admin = h.auth.authorize(&admin_token(h).await?, Requirement::Authenticated)?;
    h.auth
        .register(
            &admin,
            principal("bob", Role::Nursing, Campus::Taxco, "Corr3ctHorse"),
            None,
        )
        .await?;
    Ok(())
}

async fn last_login_failure(h: &Harness) -> Result<Option<String>> {
    let failures = h
        .auth
        .audit()
        .query(&AuditFilter {
            actor: Some("bob@taxco".into()),
            action: Some(AuditAction::LoginFailed),
            limit: Some(1),
        })
        .await?;
    Ok(failures.into_iter().next().and_then(|record| record.detail))
}

#[tokio::test]
async fn login_read_failure_is_store_unavailable() -> Result<()> {
    let h = harness()?;
    with_nurse(&h).await?;

    h.memory.inject(Operation::Read, Fault::Fail(unavailable()));
    let result = h
        .auth
        .login(login("bob", "Corr3ctHorse", Campus::Taxco), None)
        .await;
    assert!(matches!(result, Err(AuthError::StoreUnavailable)));
    assert_eq!(
        last_login_failure(&h).await?.as_deref(),
        Some("store unavailable")
    );
    Ok(())
}

#[tokio::test]
async fn failed_counter_write_does_not_advance_the_counter() -> Result<()> {
    let h = harness()?;
    with_nurse(&h).await?;

    h.memory.inject(Operation::Upsert, Fault::Fail(unavailable()));
    let result = h
        .auth
        .login(login("bob", "wrong-password", Campus::Taxco), None)
        .await;
    assert!(matches!(result, Err(AuthError::StoreUnavailable)));

    let stored = h
        .store
        .get_by_id(&Collection::by_id("users"), "user:bob@taxco")
        .await?
        .ok_or_else(|| anyhow::anyhow!("bob is missing"))?;
    assert_eq!(stored.get("failed_attempts"), Some(&serde_json::json!(0)));
    assert_eq!(
        last_login_failure(&h).await?.as_deref(),
        Some("store unavailable")
    );
    Ok(())
}

#[tokio::test]
async fn failed_success_write_issues_no_token() -> Result<()> {
    let h = harness()?;
    with_nurse(&h).await?;

    h.memory.inject(Operation::Upsert, Fault::Fail(unavailable()));
    let result = h
        .auth
        .login(login("bob", "Corr3ctHorse", Campus::Taxco), None)
        .await;
    assert!(matches!(result, Err(AuthError::StoreUnavailable)));

    let logins = h
        .auth
        .audit()
        .query(&AuditFilter {
            actor: Some("bob@taxco".into()),
            action: Some(AuditAction::Login),
            limit: None,
        })
        .await?;
    assert!(logins.is_empty());
    Ok(())
}

#[tokio::test]
async fn unresolved_update_conflict_is_not_already_exists() -> Result<()> {
    let h = harness()?;
    let admin = h.auth.authorize(&admin_token(&h).await?, Requirement::Authenticated)?;
    h.auth
        .register(
            &admin,
            principal("bob", Role::Nursing, Campus::Taxco, "Corr3ctHorse"),
            None,
        )
        .await?;

    // The lookup succeeds, the write conflicts and the read-back finds nothing.
    h.memory.inject(Operation::Read, Fault::Pass);
    h.memory.inject(Operation::Read, Fault::Fail(StoreError::NotFound));
    h.memory.inject(Operation::Upsert, Fault::Fail(StoreError::Conflict));

    let update = PrincipalUpdate {
        department: Some("Urgencias".into()),
        ..PrincipalUpdate::default()
    };
    let result = h
        .auth
        .update_user(&admin, "user:bob@taxco", update, None)
        .await;
    assert!(matches!(result, Err(AuthError::StoreUnavailable)));
    Ok(())
}

#[tokio::test]
async fn oversized_token_ttl_fails_login_without_panicking() -> Result<()> {
    let ttl = Duration::from_std(std::time::Duration::from_secs(9_000_000_000_000))?;
    let config = AuthConfig::new().with_bcrypt_cost(4).with_token_ttl(ttl);
    let h = harness_with(&config, K1)?;
    h.auth
        .bootstrap_admin(
            principal("root", Role::Admin, Campus::LlanoLargo, "Passw0rd!"),
            None,
        )
        .await?;

    let result = h
        .auth
        .login(login("root", "Passw0rd!", Campus::LlanoLargo), None)
        .await;
    assert!(matches!(result, Err(AuthError::Internal(_))));
    Ok(())
}
