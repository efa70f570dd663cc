// libs/appointment-cell/src/services/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::pagination::{Page, PageRequest};

use crate::models::Appointment;
use crate::services::appointment_store::AppointmentStore;

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all_appointments(&self) -> Vec<Appointment> {
        self.appointments.read().await.values().cloned().collect()
    }

    async fn page_where<F>(&self, page: PageRequest, keep: F) -> Page<Appointment>
    where
        F: Fn(&Appointment) -> bool,
    {
        let mut matching: Vec<Appointment> = self.appointments.read().await
            .values()
            .filter(|a| keep(a))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Page {
            total: matching.len(),
            items: page.slice(&matching),
        }
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn find_active(&self, patient_id: Uuid, doctor_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.read().await
            .values()
            .find(|a| a.patient_id == patient_id && a.doctor_id == doctor_id && a.is_active())
            .cloned())
    }

    async fn find_by_id_for_patient(&self, appointment_id: Uuid, patient_id: Uuid) -> Result<Appointment, StoreError> {
        self.appointments.read().await
            .get(&appointment_id)
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_slot(&self, slot_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.read().await
            .values()
            .find(|a| a.slot_id == slot_id && a.is_active())
            .cloned())
    }

    async fn save(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        self.appointments.write().await.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_if_active(&self, appointment: Appointment, expected_slot: Uuid) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;
        let current = appointments.get_mut(&appointment.id).ok_or(StoreError::NotFound)?;

        if !current.is_active() || current.slot_id != expected_slot {
            return Err(StoreError::Conflict);
        }

        *current = appointment.clone();
        Ok(appointment)
    }

    async fn list_by_patient(&self, patient_id: Uuid, page: PageRequest) -> Result<Page<Appointment>, StoreError> {
        Ok(self.page_where(page, |a| a.patient_id == patient_id).await)
    }

    async fn list_by_doctor(&self, doctor_id: Uuid, page: PageRequest) -> Result<Page<Appointment>, StoreError> {
        Ok(self.page_where(page, |a| a.doctor_id == doctor_id).await)
    }
}
