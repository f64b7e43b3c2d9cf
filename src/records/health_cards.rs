//! Student health cards: one card per student, created once and then edited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{
    service::require, Action, AuditAction, AuditEvent, AuditRecorder, AuthError, Campus,
    Permission, Requirement, Resource, SessionClaims,
};
use crate::clock::SharedClock;
use crate::store::{from_document, to_document, Collection, ResilientStore};

pub const HEALTH_CARDS_COLLECTION: &str = "health_cards";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthCard {
    pub id: String,
    pub student_id: String,
    pub campus: Campus,
    #[serde(default)]
    pub blood_type: Option<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct HealthCardInput {
    pub student_id: String,
    pub blood_type: Option<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    pub emergency_contact: Option<String>,
    pub notes: Option<String>,
}

#[must_use]
pub fn health_card_id(student_id: &str) -> String {
    format!("health_card:{student_id}")
}

#[derive(Debug)]
pub struct HealthCards {
    store: ResilientStore,
    collection: Collection,
    audit: Arc<AuditRecorder>,
    clock: SharedClock,
}

impl HealthCards {
    #[must_use]
    pub fn new(store: ResilientStore, audit: Arc<AuditRecorder>, clock: SharedClock) -> Self {
        Self {
            store,
            collection: Collection::by_id(HEALTH_CARDS_COLLECTION),
            audit,
            clock,
        }
    }

    /// # Errors
    ///
    /// `Forbidden` without `health_cards:create`, `AlreadyExists` when the
    /// student already has a card.
    pub async fn create(
        &self,
        claims: &SessionClaims,
        input: HealthCardInput,
        client_ip: Option<String>,
    ) -> Result<HealthCard, AuthError> {
        require(claims, permission(Action::Create))?;
        let student_id = input.student_id.trim().to_string();
        if student_id.is_empty() {
            return Err(AuthError::ValidationFailed("student_id is required".into()));
        }

        let card = HealthCard {
            id: health_card_id(&student_id),
            student_id,
            campus: claims.campus,
            blood_type: input.blood_type,
            allergies: input.allergies,
            chronic_conditions: input.chronic_conditions,
            emergency_contact: input.emergency_contact,
            notes: input.notes,
            created_by: claims.actor(),
            created_at: self.clock.now(),
            updated_by: None,
            updated_at: None,
        };
        let stored = self
            .store
            .create(&self.collection, to_document(&card)?, &card.id)
            .await
            .map_err(AuthError::on_create)?;
        let card: HealthCard = from_document(stored)?;

        self.audit
            .record(
                AuditEvent::new(claims.actor(), AuditAction::CreateHealthCard)
                    .resource(card.id.clone())
                    .client_ip(client_ip),
            )
            .await;
        Ok(card)
    }

    /// Edit an existing card. The student and creation fields never change.
    ///
    /// # Errors
    ///
    /// `Forbidden` without `health_cards:update`, `NotFound` for an unknown card.
    pub async fn update(
        &self,
        claims: &SessionClaims,
        id: &str,
        input: HealthCardInput,
        client_ip: Option<String>,
    ) -> Result<HealthCard, AuthError> {
        require(claims, permission(Action::Update))?;
        let existing = self
            .store
            .get_by_id(&self.collection, id)
            .await?
            .ok_or(AuthError::NotFound)?;
        let mut card: HealthCard = from_document(existing)?;
        if input.student_id.trim() != card.student_id {
            return Err(AuthError::ValidationFailed(
                "student_id of a health card cannot change".into(),
            ));
        }

        card.blood_type = input.blood_type;
        card.allergies = input.allergies;
        card.chronic_conditions = input.chronic_conditions;
        card.emergency_contact = input.emergency_contact;
        card.notes = input.notes;
        card.updated_by = Some(claims.actor());
        card.updated_at = Some(self.clock.now());

        let stored = self
            .store
            .replace(&self.collection, to_document(&card)?, &card.id)
            .await?;
        let card: HealthCard = from_document(stored)?;

        self.audit
            .record(
                AuditEvent::new(claims.actor(), AuditAction::UpdateHealthCard)
                    .resource(card.id.clone())
                    .client_ip(client_ip),
            )
            .await;
        Ok(card)
    }

    /// # Errors
    ///
    /// `Forbidden` without `health_cards:read`, `NotFound` for an unknown card.
    pub async fn get(
        &self,
        claims: &SessionClaims,
        id: &str,
        client_ip: Option<String>,
    ) -> Result<HealthCard, AuthError> {
        require(claims, permission(Action::Read))?;
        let doc = self
            .store
            .get_by_id(&self.collection, id)
            .await?
            .ok_or(AuthError::NotFound)?;
        let card: HealthCard = from_document(doc)?;

        self.audit
            .record(
                AuditEvent::new(claims.actor(), AuditAction::ViewHealthCard)
                    .resource(card.id.clone())
                    .client_ip(client_ip),
            )
            .await;
        Ok(card)
    }
}

fn permission(action: Action) -> Requirement {
    Requirement::Permission(Permission::new(Resource::HealthCards, action))
}
