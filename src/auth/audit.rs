//! Append-only audit trail.
//!
//! Recording never fails the caller: store errors are logged and dropped.
//! Losing audit records while the store is down is accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;
use tracing::{debug, error};
use ulid::{Generator, Ulid};
use utoipa::ToSchema;

use super::permissions::UnknownScope;
use crate::clock::SharedClock;
use crate::store::{
    from_document, to_document, Collection, Query, ResilientStore, SortOrder, StoreError,
};

pub const AUDIT_COLLECTION: &str = "audit_logs";
pub const DEFAULT_AUDIT_LIMIT: usize = 100;
pub const MAX_AUDIT_LIMIT: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Login,
    Logout,
    LoginFailed,
    CreateHealthCard,
    UpdateHealthCard,
    ViewHealthCard,
    CreateNote,
    UpdateNote,
    ViewNote,
    CreateAppointment,
    UpdateAppointment,
    DeleteAppointment,
    CreatePromotion,
    CreateVaccination,
    CreateUser,
    UpdateUser,
    DeleteUser,
}

impl AuditAction {
    pub const ALL: [Self; 17] = [
        Self::Login,
        Self::Logout,
        Self::LoginFailed,
        Self::CreateHealthCard,
        Self::UpdateHealthCard,
        Self::ViewHealthCard,
        Self::CreateNote,
        Self::UpdateNote,
        Self::ViewNote,
        Self::CreateAppointment,
        Self::UpdateAppointment,
        Self::DeleteAppointment,
        Self::CreatePromotion,
        Self::CreateVaccination,
        Self::CreateUser,
        Self::UpdateUser,
        Self::DeleteUser,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::CreateHealthCard => "CREATE_HEALTH_CARD",
            Self::UpdateHealthCard => "UPDATE_HEALTH_CARD",
            Self::ViewHealthCard => "VIEW_HEALTH_CARD",
            Self::CreateNote => "CREATE_NOTE",
            Self::UpdateNote => "UPDATE_NOTE",
            Self::ViewNote => "VIEW_NOTE",
            Self::CreateAppointment => "CREATE_APPOINTMENT",
            Self::UpdateAppointment => "UPDATE_APPOINTMENT",
            Self::DeleteAppointment => "DELETE_APPOINTMENT",
            Self::CreatePromotion => "CREATE_PROMOTION",
            Self::CreateVaccination => "CREATE_VACCINATION",
            Self::CreateUser => "CREATE_USER",
            Self::UpdateUser => "UPDATE_USER",
            Self::DeleteUser => "DELETE_USER",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownScope(s.to_string()))
    }
}

/// A stored audit entry. Never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuditRecord {
    pub id: String,
    pub actor: String,
    pub action: AuditAction,
    pub resource_id: Option<String>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub client_ip: Option<String>,
}

/// What a caller reports; id and timestamp are assigned on record.
#[derive(Clone, Debug)]
pub struct AuditEvent {
    actor: String,
    action: AuditAction,
    resource_id: Option<String>,
    detail: Option<String>,
    client_ip: Option<String>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(actor: impl Into<String>, action: AuditAction) -> Self {
        Self {
            actor: actor.into(),
            action,
            resource_id: None,
            detail: None,
            client_ip: None,
        }
    }

    #[must_use]
    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn client_ip(mut self, client_ip: Option<String>) -> Self {
        self.client_ip = client_ip;
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct AuditFilter {
    pub actor: Option<String>,
    pub action: Option<AuditAction>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Requested limit, defaulted and capped.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_AUDIT_LIMIT)
            .clamp(1, MAX_AUDIT_LIMIT)
    }
}

pub struct AuditRecorder {
    store: ResilientStore,
    collection: Collection,
    clock: SharedClock,
    ids: Mutex<Generator>,
}

impl fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl AuditRecorder {
    #[must_use]
    pub fn new(store: ResilientStore, clock: SharedClock) -> Self {
        Self {
            store,
            collection: Collection::by_id(AUDIT_COLLECTION),
            clock,
            ids: Mutex::new(Generator::new()),
        }
    }

    // ULIDs from one generator are strictly increasing, so id order is time order.
    fn next_id(&self, now: DateTime<Utc>) -> String {
        let at = SystemTime::from(now);
        let ulid = self
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate_from_datetime(at)
            .unwrap_or_else(|_| Ulid::from_datetime(at));
        format!("audit:{ulid}")
    }

    /// Append one record. Failures are logged, never returned.
    pub async fn record(&self, event: AuditEvent) {
        let now = self.clock.now();
        let record = AuditRecord {
            id: self.next_id(now),
            actor: event.actor,
            action: event.action,
            resource_id: event.resource_id,
            detail: event.detail,
            timestamp: now,
            client_ip: event.client_ip,
        };

        let doc = match to_document(&record) {
            Ok(doc) => doc,
            Err(err) => {
                error!(action = %record.action, "failed to encode audit record: {err}");
                return;
            }
        };

        match self.store.upsert(&self.collection, doc, &record.id).await {
            Ok(_) => debug!(id = %record.id, action = %record.action, actor = %record.actor, "audit recorded"),
            Err(err) => error!(
                action = %record.action,
                actor = %record.actor,
                status = err.status(),
                "failed to persist audit record: {err}"
            ),
        }
    }

    /// Records matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns the store error when the query fails.
    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StoreError> {
        let mut query = Query::new().starts_with("id", "audit:");
        if let Some(actor) = &filter.actor {
            query = query.eq("actor", actor.as_str());
        }
        if let Some(action) = filter.action {
            query = query.eq("action", action.as_str());
        }
        let query = query
            .order_by("id", SortOrder::Desc)
            .limit(filter.effective_limit());

        self.store
            .query(&self.collection, &query)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }
}
