//! Appointments.
//!
//! The partition path is a deployment setting (`/id`, `/student_id`,
//! `/matricula`, ...). Documents written under another scheme need a one-time
//! migration; nothing here branches on old layouts at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{
    service::require, Action, AuditAction, AuditEvent, AuditRecorder, AuthError, Campus,
    Permission, Requirement, Resource, SessionClaims,
};
use crate::clock::SharedClock;
use crate::store::{
    from_document, to_document, Collection, PartitionPath, Query, ResilientStore, SortOrder,
};

pub const APPOINTMENTS_COLLECTION: &str = "appointments";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Appointment {
    pub id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matricula: Option<String>,
    pub campus: Campus,
    pub service: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub status: AppointmentStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct NewAppointment {
    pub student_id: String,
    pub matricula: Option<String>,
    pub service: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug)]
pub struct Appointments {
    store: ResilientStore,
    collection: Collection,
    audit: Arc<AuditRecorder>,
    clock: SharedClock,
}

impl Appointments {
    #[must_use]
    pub fn new(
        store: ResilientStore,
        audit: Arc<AuditRecorder>,
        clock: SharedClock,
        partition: PartitionPath,
    ) -> Self {
        Self {
            store,
            collection: collection_for(partition),
            audit,
            clock,
        }
    }

    #[must_use]
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Book an appointment on the caller's campus.
    ///
    /// # Errors
    ///
    /// `Forbidden` without `appointments:create`, `ValidationFailed` for a
    /// missing student or service, `StoreUnavailable` on store failure.
    pub async fn create(
        &self,
        claims: &SessionClaims,
        new: NewAppointment,
        client_ip: Option<String>,
    ) -> Result<Appointment, AuthError> {
        require(
            claims,
            Requirement::Permission(Permission::new(Resource::Appointments, Action::Create)),
        )?;
        if new.student_id.trim().is_empty() {
            return Err(AuthError::ValidationFailed("student_id is required".into()));
        }
        if new.service.trim().is_empty() {
            return Err(AuthError::ValidationFailed("service is required".into()));
        }

        let mut doc = to_document(&Appointment {
            id: String::new(),
            student_id: new.student_id.trim().to_string(),
            matricula: new.matricula.filter(|m| !m.trim().is_empty()),
            campus: claims.campus,
            service: new.service.trim().to_string(),
            scheduled_at: new.scheduled_at,
            reason: new.reason,
            status: AppointmentStatus::Scheduled,
            created_by: claims.actor(),
            created_at: self.clock.now(),
        })?;
        // an empty id is filled in by partition inference
        doc.remove("id");

        let stored: Appointment =
            from_document(self.store.upsert_inferred(&self.collection, doc).await?)?;

        self.audit
            .record(
                AuditEvent::new(claims.actor(), AuditAction::CreateAppointment)
                    .resource(stored.id.clone())
                    .detail(format!("student={}", stored.student_id))
                    .client_ip(client_ip),
            )
            .await;
        Ok(stored)
    }

    /// Appointments of one student, earliest first.
    ///
    /// # Errors
    ///
    /// `Forbidden` without `appointments:read`.
    pub async fn for_student(
        &self,
        claims: &SessionClaims,
        student_id: &str,
    ) -> Result<Vec<Appointment>, AuthError> {
        require(
            claims,
            Requirement::Permission(Permission::new(Resource::Appointments, Action::Read)),
        )?;
        let query = Query::new()
            .eq("student_id", student_id)
            .order_by("scheduled_at", SortOrder::Asc);
        self.store
            .query(&self.collection, &query)
            .await?
            .into_iter()
            .map(from_document)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AuthError::from)
    }
}

fn collection_for(partition: PartitionPath) -> Collection {
    let fallback = match &partition {
        PartitionPath::Field(field) if field == "student_id" => Some("matricula"),
        PartitionPath::Field(_) => Some("student_id"),
        PartitionPath::Id => None,
    };
    let collection =
        Collection::new(APPOINTMENTS_COLLECTION, partition).with_id_prefix("appointment");
    match fallback {
        Some(key) => collection.with_fallback_key(key),
        None => collection,
    }
}
