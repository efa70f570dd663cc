// libs/appointment-cell/src/services/directory.rs
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use availability_cell::models::Slot;
use availability_cell::services::SlotStore;
use shared_database::profiles::{Profile, ProfileLookup};
use shared_models::pagination::{PageRequest, Pagination};

use crate::models::{Appointment, AppointmentError, AppointmentListPage, AppointmentView};
use crate::services::appointment_store::AppointmentStore;

const UNKNOWN_DOCTOR: &str = "Unknown Doctor";
const DEFAULT_SPECIALTY: &str = "General Practice";
const UNKNOWN_PATIENT: &str = "Unknown Patient";
const UNKNOWN_EMAIL: &str = "Unknown Email";

/// Appointment listings with display data. Only the listing itself can fail;
/// slot and profile enrichment degrade to placeholders.
pub struct AppointmentDirectory {
    slots: Arc<dyn SlotStore>,
    appointments: Arc<dyn AppointmentStore>,
    profiles: Arc<dyn ProfileLookup>,
}

impl AppointmentDirectory {
    pub fn new(
        slots: Arc<dyn SlotStore>,
        appointments: Arc<dyn AppointmentStore>,
        profiles: Arc<dyn ProfileLookup>,
    ) -> Self {
        Self { slots, appointments, profiles }
    }

    pub async fn patient_appointments(
        &self,
        patient_id: Uuid,
        page: PageRequest,
    ) -> Result<AppointmentListPage, AppointmentError> {
        let found = self.appointments.list_by_patient(patient_id, page).await?;
        debug!("Patient {} has {} appointments", patient_id, found.total);
        Ok(AppointmentListPage {
            appointments: self.enrich(found.items).await,
            total_count: found.total,
            pagination: Pagination::new(page, found.total),
        })
    }

    pub async fn doctor_appointments(
        &self,
        doctor_id: Uuid,
        page: PageRequest,
    ) -> Result<AppointmentListPage, AppointmentError> {
        let found = self.appointments.list_by_doctor(doctor_id, page).await?;
        debug!("Doctor {} has {} appointments", doctor_id, found.total);
        Ok(AppointmentListPage {
            appointments: self.enrich(found.items).await,
            total_count: found.total,
            pagination: Pagination::new(page, found.total),
        })
    }

    /// Single appointment with display data, for booking and cancellation
    /// responses.
    pub async fn view(&self, appointment: Appointment) -> AppointmentView {
        let (slots, profiles) = self.lookups(std::slice::from_ref(&appointment)).await;
        to_view(appointment, &slots, &profiles)
    }

    async fn enrich(&self, appointments: Vec<Appointment>) -> Vec<AppointmentView> {
        if appointments.is_empty() {
            return Vec::new();
        }

        let (slots, profiles) = self.lookups(&appointments).await;
        appointments.into_iter()
            .map(|a| to_view(a, &slots, &profiles))
            .collect()
    }

    async fn lookups(&self, appointments: &[Appointment]) -> (HashMap<Uuid, Slot>, HashMap<Uuid, Profile>) {
        let slot_lookups = appointments.iter().map(|a| self.slots.get(a.slot_id));
        let slots: HashMap<Uuid, Slot> = join_all(slot_lookups).await
            .into_iter()
            .filter_map(|result| match result {
                Ok(slot) => Some((slot.id, slot)),
                Err(e) => {
                    debug!("Slot lookup failed during enrichment: {}", e);
                    None
                }
            })
            .collect();

        let mut people: Vec<Uuid> = appointments.iter()
            .flat_map(|a| [a.doctor_id, a.patient_id])
            .collect();
        people.sort();
        people.dedup();

        let profiles: HashMap<Uuid, Profile> = match self.profiles.find_profiles(&people).await {
            Ok(found) => found.into_iter().map(|p| (p.id, p)).collect(),
            Err(e) => {
                warn!("Profile lookup failed, using placeholders: {}", e);
                HashMap::new()
            }
        };

        (slots, profiles)
    }
}

fn to_view(
    appointment: Appointment,
    slots: &HashMap<Uuid, Slot>,
    profiles: &HashMap<Uuid, Profile>,
) -> AppointmentView {
    let slot = slots.get(&appointment.slot_id);
    let doctor = profiles.get(&appointment.doctor_id);
    let patient = profiles.get(&appointment.patient_id);

    AppointmentView {
        id: appointment.id,
        doctor_id: appointment.doctor_id,
        patient_id: appointment.patient_id,
        slot_id: appointment.slot_id,
        status: appointment.status,
        start_time: slot.map(|s| s.start_time),
        end_time: slot.map(|s| s.end_time),
        doctor_name: doctor
            .and_then(|p| p.full_name.clone())
            .unwrap_or_else(|| UNKNOWN_DOCTOR.to_string()),
        doctor_specialty: doctor
            .and_then(|p| p.specialty.clone())
            .unwrap_or_else(|| DEFAULT_SPECIALTY.to_string()),
        patient_name: patient
            .and_then(|p| p.full_name.clone())
            .unwrap_or_else(|| UNKNOWN_PATIENT.to_string()),
        patient_email: patient
            .and_then(|p| p.email.clone())
            .unwrap_or_else(|| UNKNOWN_EMAIL.to_string()),
        created_at: appointment.created_at,
        updated_at: appointment.updated_at,
    }
}
