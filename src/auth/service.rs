//! Login, session and user-management flows.
//!
//! Flow Overview:
//! 1) Resolve the principal by `(username, campus)`.
//! 2) Reject locked or disabled accounts before touching the password.
//! 3) Verify the password, update the lockout state and persist it.
//! 4) Issue a session token and record the outcome in the audit trail.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{
    audit::{AuditAction, AuditEvent, AuditFilter, AuditRecord, AuditRecorder},
    credential::{PasswordCodec, DEFAULT_COST},
    lockout::LockoutPolicy,
    permissions::{has_permission, Permission, Role},
    principal::{principal_id, Campus, NewPrincipal, Principal, PrincipalUpdate, PrincipalView},
    token::{SessionClaims, TokenService, DEFAULT_TOKEN_TTL_SECONDS},
    validation, AuthError,
};
use crate::clock::SharedClock;
use crate::store::{from_document, to_document, Collection, Query, ResilientStore, SortOrder};

pub const USERS_COLLECTION: &str = "users";
const BOOTSTRAP_ACTOR: &str = "bootstrap";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_ttl: Duration,
    lockout: LockoutPolicy,
    bcrypt_cost: u32,
    default_campus: Campus,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECONDS),
            lockout: LockoutPolicy::default(),
            bcrypt_cost: DEFAULT_COST,
            default_campus: Campus::LlanoLargo,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_lockout(mut self, lockout: LockoutPolicy) -> Self {
        self.lockout = lockout;
        self
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    #[must_use]
    pub fn with_default_campus(mut self, campus: Campus) -> Self {
        self.default_campus = campus;
        self
    }

    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    #[must_use]
    pub fn lockout(&self) -> LockoutPolicy {
        self.lockout
    }

    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    #[must_use]
    pub fn default_campus(&self) -> Campus {
        self.default_campus
    }
}

/// Precondition checked by [`AuthService::authorize`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    /// Exact role match.
    Role(Role),
    Permission(Permission),
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub campus: Option<Campus>,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("campus", &self.campus)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: PrincipalView,
}

#[derive(Debug)]
pub struct AuthService {
    store: ResilientStore,
    users: Collection,
    tokens: TokenService,
    codec: PasswordCodec,
    lockout: LockoutPolicy,
    audit: Arc<AuditRecorder>,
    clock: SharedClock,
    default_campus: Campus,
}

impl AuthService {
    #[must_use]
    pub fn new(
        config: &AuthConfig,
        store: ResilientStore,
        tokens: TokenService,
        audit: Arc<AuditRecorder>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            users: Collection::by_id(USERS_COLLECTION),
            tokens: tokens.with_ttl(config.token_ttl()),
            codec: PasswordCodec::new(config.bcrypt_cost()),
            lockout: config.lockout(),
            audit,
            clock,
            default_campus: config.default_campus(),
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn audit(&self) -> &Arc<AuditRecorder> {
        &self.audit
    }

    /// Authenticate and issue a session token.
    ///
    /// Every outcome, success or not, appends exactly one `LOGIN` or
    /// `LOGIN_FAILED` audit record.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` for an unknown user or wrong password,
    /// `AccountLocked` while locked (including the attempt that locks),
    /// `AccountDisabled` for inactive accounts, `StoreUnavailable` on store failure.
    pub async fn login(
        &self,
        request: LoginRequest,
        client_ip: Option<String>,
    ) -> Result<LoginResponse, AuthError> {
        let campus = request.campus.unwrap_or(self.default_campus);
        let actor = format!("{}@{campus}", request.username);
        let id = principal_id(&request.username, campus);

        let failed = |detail: &str| {
            AuditEvent::new(actor.clone(), AuditAction::LoginFailed)
                .resource(id.clone())
                .detail(detail)
                .client_ip(client_ip.clone())
        };

        let mut principal = match self.find(&id).await {
            Ok(Some(principal)) => principal,
            Ok(None) => {
                self.audit.record(failed("unknown user")).await;
                return Err(AuthError::InvalidCredentials);
            }
            Err(err) => {
                self.audit.record(failed("store unavailable")).await;
                return Err(err);
            }
        };

        let now = self.clock.now();
        if self.lockout.is_locked(&principal, now) {
            self.audit.record(failed("account locked")).await;
            let until = principal.locked_until.unwrap_or(now);
            return Err(AuthError::AccountLocked { until });
        }
        if !principal.active {
            self.audit.record(failed("account disabled")).await;
            return Err(AuthError::AccountDisabled);
        }

        let verified = self
            .codec
            .verify_blocking(request.password, principal.password_hash.clone())
            .await;

        if !verified {
            let locked = self.lockout.register_failure(&mut principal, now);
            let detail = format!("invalid password (attempt {})", principal.failed_attempts);
            if let Err(err) = self.save(&principal).await {
                self.audit.record(failed("store unavailable")).await;
                return Err(err);
            }
            if locked {
                warn!(principal = %principal.id, "account locked after {} failed attempts", principal.failed_attempts);
                self.audit
                    .record(failed(&format!("{detail}; account locked")))
                    .await;
                return Err(AuthError::AccountLocked {
                    until: principal.locked_until.unwrap_or(now),
                });
            }
            self.audit.record(failed(&detail)).await;
            return Err(AuthError::InvalidCredentials);
        }

        self.lockout.register_success(&mut principal);
        principal.last_access = Some(now);
        if let Err(err) = self.save(&principal).await {
            self.audit.record(failed("store unavailable")).await;
            return Err(err);
        }

        let access_token = self
            .tokens
            .issue(&principal.username, principal.role, principal.campus)?;

        self.audit
            .record(
                AuditEvent::new(actor, AuditAction::Login)
                    .resource(principal.id.clone())
                    .client_ip(client_ip),
            )
            .await;
        info!(principal = %principal.id, role = %principal.role, "login succeeded");

        Ok(LoginResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: self.tokens.ttl().num_seconds(),
            user: principal.view(),
        })
    }

    /// Validate `token` and check `requirement` against its claims.
    ///
    /// # Errors
    ///
    /// `InvalidToken` or `Expired` for a bad token, `Forbidden` when the
    /// requirement is not met.
    pub fn authorize(
        &self,
        token: &str,
        requirement: Requirement,
    ) -> Result<SessionClaims, AuthError> {
        let claims = self.tokens.validate(token)?;
        require(&claims, requirement)?;
        Ok(claims)
    }

    /// The stored principal behind a session.
    ///
    /// # Errors
    ///
    /// `NotFound` when the principal no longer exists.
    pub async fn me(&self, claims: &SessionClaims) -> Result<PrincipalView, AuthError> {
        let id = principal_id(&claims.sub, claims.campus);
        self.find(&id)
            .await?
            .map(|principal| principal.view())
            .ok_or(AuthError::NotFound)
    }

    /// Record a logout. The token stays valid until it expires.
    pub async fn logout(&self, claims: &SessionClaims, client_ip: Option<String>) {
        self.audit
            .record(
                AuditEvent::new(claims.actor(), AuditAction::Logout)
                    .resource(principal_id(&claims.sub, claims.campus))
                    .client_ip(client_ip),
            )
            .await;
    }

    /// Create a principal on behalf of an administrator.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admin callers (nothing is recorded), `ValidationFailed`
    /// for bad input or a weak password, `AlreadyExists` for a taken
    /// `(username, campus)`.
    pub async fn register(
        &self,
        acting: &SessionClaims,
        new: NewPrincipal,
        client_ip: Option<String>,
    ) -> Result<PrincipalView, AuthError> {
        require(acting, Requirement::Role(Role::Admin))?;
        let view = self.create_principal(new).await?;
        self.audit
            .record(
                AuditEvent::new(acting.actor(), AuditAction::CreateUser)
                    .resource(view.id.clone())
                    .detail(format!("role={}", view.role))
                    .client_ip(client_ip),
            )
            .await;
        Ok(view)
    }

    /// Create the first administrator. Only succeeds while no admin exists;
    /// the check runs on every call.
    ///
    /// # Errors
    ///
    /// `Forbidden` once an admin exists, `ValidationFailed` when the new
    /// principal is not an admin or fails validation.
    pub async fn bootstrap_admin(
        &self,
        new: NewPrincipal,
        client_ip: Option<String>,
    ) -> Result<PrincipalView, AuthError> {
        if new.role != Role::Admin {
            return Err(AuthError::ValidationFailed(
                "the bootstrap principal must have the admin role".into(),
            ));
        }
        if self.admin_exists().await? {
            return Err(AuthError::Forbidden(
                "an administrator already exists".into(),
            ));
        }

        let view = self.create_principal(new).await?;
        info!(principal = %view.id, "bootstrap administrator created");
        self.audit
            .record(
                AuditEvent::new(BOOTSTRAP_ACTOR, AuditAction::CreateUser)
                    .resource(view.id.clone())
                    .detail("bootstrap administrator")
                    .client_ip(client_ip),
            )
            .await;
        Ok(view)
    }

    /// Principals, optionally narrowed to one campus and/or role.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admin callers.
    pub async fn list_users(
        &self,
        acting: &SessionClaims,
        campus: Option<Campus>,
        role: Option<Role>,
    ) -> Result<Vec<PrincipalView>, AuthError> {
        require(acting, Requirement::Role(Role::Admin))?;

        let mut query = Query::new().starts_with("id", "user:");
        if let Some(campus) = campus {
            query = query.eq("campus", campus.as_str());
        }
        if let Some(role) = role {
            query = query.eq("role", role.as_str());
        }
        let query = query.order_by("username", SortOrder::Asc);

        self.store
            .query(&self.users, &query)
            .await?
            .into_iter()
            .map(|doc| from_document::<Principal>(doc).map(|p| p.view()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(AuthError::from)
    }

    /// Apply an administrative update. Deactivation is `active = false`.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admin callers, `ValidationFailed` for an empty or
    /// invalid update, `NotFound` for an unknown id.
    pub async fn update_user(
        &self,
        acting: &SessionClaims,
        id: &str,
        update: PrincipalUpdate,
        client_ip: Option<String>,
    ) -> Result<PrincipalView, AuthError> {
        require(acting, Requirement::Role(Role::Admin))?;
        if update.is_empty() {
            return Err(AuthError::ValidationFailed("no fields to update".into()));
        }

        let mut principal = self.find(id).await?.ok_or(AuthError::NotFound)?;
        let changed = update.changed_fields().join(",");

        if let Some(email) = update.email {
            let email = validation::normalize_email(&email);
            validation::email(&email)?;
            principal.email = email;
        }
        if let Some(display_name) = update.display_name {
            validation::display_name(&display_name)?;
            principal.display_name = display_name.trim().to_string();
        }
        if let Some(role) = update.role {
            principal.role = role;
        }
        if let Some(department) = update.department {
            principal.department = department.trim().to_string();
        }
        if let Some(active) = update.active {
            principal.active = active;
        }

        self.save(&principal).await?;
        self.audit
            .record(
                AuditEvent::new(acting.actor(), AuditAction::UpdateUser)
                    .resource(principal.id.clone())
                    .detail(format!("fields={changed}"))
                    .client_ip(client_ip),
            )
            .await;
        Ok(principal.view())
    }

    /// Replace the caller's own password.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` when `current` does not verify, `ValidationFailed`
    /// for a weak replacement, `NotFound` when the principal is gone.
    pub async fn change_password(
        &self,
        claims: &SessionClaims,
        current: String,
        replacement: String,
        client_ip: Option<String>,
    ) -> Result<(), AuthError> {
        let id = principal_id(&claims.sub, claims.campus);
        let mut principal = self.find(&id).await?.ok_or(AuthError::NotFound)?;

        if !self
            .codec
            .verify_blocking(current, principal.password_hash.clone())
            .await
        {
            return Err(AuthError::InvalidCredentials);
        }
        validation::password_strength(&replacement)?;

        principal.password_hash = self.codec.hash_blocking(replacement).await?;
        self.save(&principal).await?;
        self.audit
            .record(
                AuditEvent::new(claims.actor(), AuditAction::UpdateUser)
                    .resource(principal.id.clone())
                    .detail("password changed")
                    .client_ip(client_ip),
            )
            .await;
        Ok(())
    }

    /// Audit records for administrators, newest first.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admin callers.
    pub async fn audit_logs(
        &self,
        acting: &SessionClaims,
        filter: &AuditFilter,
    ) -> Result<Vec<AuditRecord>, AuthError> {
        require(acting, Requirement::Role(Role::Admin))?;
        Ok(self.audit.query(filter).await?)
    }

    async fn create_principal(&self, new: NewPrincipal) -> Result<PrincipalView, AuthError> {
        let username = new.username.trim().to_string();
        let email = validation::normalize_email(&new.email);
        validation::username(&username)?;
        validation::email(&email)?;
        validation::display_name(&new.display_name)?;
        validation::password_strength(&new.password)?;

        let id = principal_id(&username, new.campus);
        if self.find(&id).await?.is_some() {
            return Err(AuthError::AlreadyExists);
        }

        let principal = Principal {
            id,
            username,
            email,
            display_name: new.display_name.trim().to_string(),
            role: new.role,
            campus: new.campus,
            department: new.department.trim().to_string(),
            active: true,
            created_at: self.clock.now(),
            last_access: None,
            failed_attempts: 0,
            locked_until: None,
            password_hash: self.codec.hash_blocking(new.password).await?,
        };

        let doc = to_document(&principal)?;
        self.store
            .create(&self.users, doc, &principal.id)
            .await
            .map_err(AuthError::on_create)?;
        Ok(principal.view())
    }

    async fn admin_exists(&self) -> Result<bool, AuthError> {
        let query = Query::new()
            .starts_with("id", "user:")
            .eq("role", Role::Admin.as_str())
            .limit(1);
        Ok(!self.store.query(&self.users, &query).await?.is_empty())
    }

    async fn find(&self, id: &str) -> Result<Option<Principal>, AuthError> {
        match self.store.get_by_id(&self.users, id).await? {
            Some(doc) => Ok(Some(from_document(doc)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, principal: &Principal) -> Result<(), AuthError> {
        let doc = to_document(principal)?;
        self.store.upsert(&self.users, doc, &principal.id).await?;
        Ok(())
    }
}

/// Check a requirement against already-validated claims.
///
/// # Errors
///
/// `Forbidden` when the role differs or the permission is not granted.
pub fn require(claims: &SessionClaims, requirement: Requirement) -> Result<(), AuthError> {
    match requirement {
        Requirement::Authenticated => Ok(()),
        Requirement::Role(role) if claims.role == role => Ok(()),
        Requirement::Role(role) => Err(AuthError::Forbidden(format!("requires role {role}"))),
        Requirement::Permission(permission) if has_permission(claims.role, permission) => Ok(()),
        Requirement::Permission(permission) => Err(AuthError::Forbidden(format!(
            "missing permission {permission}"
        ))),
    }
}
