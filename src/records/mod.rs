//! Record collaborators that sit behind the authorization guard.
//!
//! These are deliberately thin: each operation checks a permission, goes
//! through the resilient store and leaves an audit record.

pub mod appointments;
pub mod health_cards;

use std::sync::Arc;

use crate::auth::AuditRecorder;
use crate::clock::SharedClock;
use crate::store::{PartitionPath, ResilientStore};

pub use appointments::{Appointment, AppointmentStatus, NewAppointment};
pub use health_cards::{HealthCard, HealthCardInput};

#[derive(Debug)]
pub struct Records {
    pub appointments: appointments::Appointments,
    pub health_cards: health_cards::HealthCards,
}

impl Records {
    #[must_use]
    pub fn new(
        store: ResilientStore,
        audit: Arc<AuditRecorder>,
        clock: SharedClock,
        appointment_partition: PartitionPath,
    ) -> Self {
        Self {
            appointments: appointments::Appointments::new(
                store.clone(),
                audit.clone(),
                clock.clone(),
                appointment_partition,
            ),
            health_cards: health_cards::HealthCards::new(store, audit, clock),
        }
    }
}
