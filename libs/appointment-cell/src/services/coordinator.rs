// libs/appointment-cell/src/services/coordinator.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use availability_cell::models::{Slot, SlotView};
use availability_cell::services::SlotStore;
use shared_database::StoreError;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookingAction, BookingOutcome,
    SlotUnavailableReason,
};
use crate::services::appointment_store::AppointmentStore;

/// Orchestrates book, rebook and cancel across the slot and appointment
/// stores. Holds no state of its own.
///
/// There is no transaction spanning both stores. Every operation performs the
/// contended slot transition first, as a single conditional write, and only
/// then touches the appointment record. When the appointment write fails the
/// slot transition is undone.
pub struct BookingCoordinator {
    slots: Arc<dyn SlotStore>,
    appointments: Arc<dyn AppointmentStore>,
}

impl BookingCoordinator {
    pub fn new(slots: Arc<dyn SlotStore>, appointments: Arc<dyn AppointmentStore>) -> Self {
        Self { slots, appointments }
    }

    /// Book `slot_id` for the patient. An existing active appointment with
    /// the same doctor is moved to the new slot instead of creating a second
    /// one.
    #[instrument(skip(self))]
    pub async fn book(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        slot_id: Uuid,
    ) -> Result<BookingOutcome, AppointmentError> {
        let slot = match self.slots.get(slot_id).await {
            Ok(slot) => slot,
            Err(StoreError::NotFound) => return Err(AppointmentError::SlotNotFound),
            Err(e) => return Err(e.into()),
        };

        if slot.doctor_id != doctor_id {
            warn!("Slot {} belongs to doctor {}, not {}", slot_id, slot.doctor_id, doctor_id);
            return Err(AppointmentError::DoctorMismatch);
        }

        let existing = self.appointments.find_active(patient_id, doctor_id).await?;
        let reserved = self.reserve(slot_id, patient_id).await?;

        match existing {
            Some(appointment) => self.move_appointment(appointment, reserved).await,
            None => self.create_appointment(patient_id, doctor_id, reserved).await,
        }
    }

    /// Cancel the patient's appointment and hand its slot back to the pool.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        patient_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointment = match self.appointments.find_by_id_for_patient(appointment_id, patient_id).await {
            Ok(appointment) => appointment,
            Err(StoreError::NotFound) => return Err(AppointmentError::NotFoundOrForbidden),
            Err(e) => return Err(e.into()),
        };

        match appointment.status {
            AppointmentStatus::Cancelled => return Err(AppointmentError::AlreadyCancelled),
            AppointmentStatus::Completed => return Err(AppointmentError::AlreadyCompleted),
            AppointmentStatus::Pending | AppointmentStatus::Confirmed => {}
        }

        let slot = match self.slots.get(appointment.slot_id).await {
            Ok(slot) => Some(slot),
            Err(StoreError::NotFound) => {
                warn!("Slot {} of appointment {} no longer exists", appointment.slot_id, appointment_id);
                None
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(slot) = &slot {
            if slot.start_time <= Utc::now() {
                return Err(AppointmentError::PastAppointment);
            }
        }

        let released = match &slot {
            Some(slot) => self.release_held(slot.id, patient_id).await?,
            None => false,
        };

        let expected_slot = appointment.slot_id;
        appointment.status = AppointmentStatus::Cancelled;
        appointment.updated_at = Utc::now();

        match self.appointments.update_if_active(appointment, expected_slot).await {
            Ok(saved) => {
                info!("Appointment {} cancelled", saved.id);
                Ok(saved)
            }
            Err(StoreError::Conflict) => {
                let err = self.stale_cancellation(appointment_id, patient_id).await;
                warn!("Cancellation of {} lost to a concurrent change: {}", appointment_id, err);
                Err(err)
            }
            Err(e) => {
                error!("Failed to persist cancellation of {}: {}", appointment_id, e);
                if released {
                    self.restore_hold(expected_slot, patient_id).await;
                }
                Err(e.into())
            }
        }
    }

    /// Reserve or explain why not.
    async fn reserve(&self, slot_id: Uuid, patient_id: Uuid) -> Result<Slot, AppointmentError> {
        match self.slots.try_reserve(slot_id, patient_id).await {
            Ok(slot) => Ok(slot),
            Err(StoreError::Conflict) => {
                let reason = self.unavailable_reason(slot_id, patient_id).await;
                warn!("Slot {} unavailable for patient {}: {:?}", slot_id, patient_id, reason);
                Err(AppointmentError::SlotUnavailable { reason })
            }
            Err(StoreError::NotFound) => Err(AppointmentError::SlotNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Read-only classification after a lost reservation. The holder comes
    /// from the slot, or from the active appointment pointing at it when the
    /// slot carries none.
    async fn unavailable_reason(&self, slot_id: Uuid, patient_id: Uuid) -> SlotUnavailableReason {
        let mut holder = match self.slots.get(slot_id).await {
            Ok(slot) => slot.booked_by,
            Err(e) => {
                debug!("Could not re-read slot {}: {}", slot_id, e);
                None
            }
        };

        if holder.is_none() {
            holder = match self.appointments.find_by_slot(slot_id).await {
                Ok(appointment) => appointment.map(|a| a.patient_id),
                Err(e) => {
                    debug!("Could not look up appointment for slot {}: {}", slot_id, e);
                    None
                }
            };
        }

        match holder {
            Some(holder) if holder == patient_id => SlotUnavailableReason::HeldByRequester,
            Some(_) => SlotUnavailableReason::HeldByAnotherPatient,
            None => SlotUnavailableReason::HolderUnknown,
        }
    }

    /// Why a conditional cancellation found the record changed underneath it.
    async fn stale_cancellation(&self, appointment_id: Uuid, patient_id: Uuid) -> AppointmentError {
        match self.appointments.find_by_id_for_patient(appointment_id, patient_id).await {
            Ok(current) => match current.status {
                AppointmentStatus::Cancelled => AppointmentError::AlreadyCancelled,
                AppointmentStatus::Completed => AppointmentError::AlreadyCompleted,
                AppointmentStatus::Pending | AppointmentStatus::Confirmed => {
                    AppointmentError::ConcurrentModification
                }
            },
            Err(StoreError::NotFound) => AppointmentError::NotFoundOrForbidden,
            Err(e) => e.into(),
        }
    }

    async fn create_appointment(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        slot: Slot,
    ) -> Result<BookingOutcome, AppointmentError> {
        let appointment = Appointment::new_pending(patient_id, doctor_id, slot.id, Utc::now());

        let saved = match self.appointments.save(appointment).await {
            Ok(saved) => saved,
            Err(e) => {
                error!("Failed to persist new appointment for slot {}: {}", slot.id, e);
                self.undo_reservation(slot.id, patient_id).await;
                return Err(e.into());
            }
        };

        info!("Appointment {} booked on slot {}", saved.id, slot.id);
        Ok(BookingOutcome {
            action: BookingAction::Booked,
            appointment: saved,
            slot: SlotView::from(slot),
            released_slot: None,
        })
    }

    async fn move_appointment(
        &self,
        mut appointment: Appointment,
        slot: Slot,
    ) -> Result<BookingOutcome, AppointmentError> {
        let old_slot_id = appointment.slot_id;

        appointment.slot_id = slot.id;
        appointment.status = AppointmentStatus::Pending;
        appointment.updated_at = Utc::now();

        let patient_id = appointment.patient_id;
        let saved = match self.appointments.update_if_active(appointment, old_slot_id).await {
            Ok(saved) => saved,
            Err(StoreError::Conflict) => {
                warn!("Appointment moved or cancelled concurrently, giving back slot {}", slot.id);
                self.undo_reservation(slot.id, patient_id).await;
                return Err(AppointmentError::ConcurrentModification);
            }
            Err(e) => {
                error!("Failed to persist rebooking onto slot {}: {}", slot.id, e);
                self.undo_reservation(slot.id, patient_id).await;
                return Err(e.into());
            }
        };

        let released_slot = self.release_previous(old_slot_id, saved.patient_id).await;

        info!("Appointment {} moved from slot {} to {}", saved.id, old_slot_id, slot.id);
        Ok(BookingOutcome {
            action: BookingAction::Rescheduled,
            appointment: saved,
            slot: SlotView::from(slot),
            released_slot,
        })
    }

    /// Best-effort: a slot left booked here is a leak, never a double booking.
    async fn release_previous(&self, slot_id: Uuid, patient_id: Uuid) -> Option<Uuid> {
        match self.slots.release_held_by(slot_id, patient_id).await {
            Ok(_) => Some(slot_id),
            Err(StoreError::Conflict) => {
                debug!("Previous slot {} is no longer held by patient {}", slot_id, patient_id);
                None
            }
            Err(e) => {
                warn!("Failed to release previous slot {}: {}", slot_id, e);
                None
            }
        }
    }

    /// Frees the slot only while this patient still holds it.
    async fn release_held(&self, slot_id: Uuid, patient_id: Uuid) -> Result<bool, AppointmentError> {
        match self.slots.release_held_by(slot_id, patient_id).await {
            Ok(_) => {
                info!("Slot {} returned to the pool", slot_id);
                Ok(true)
            }
            Err(StoreError::Conflict) => {
                warn!("Slot {} is not held by patient {}, leaving it untouched", slot_id, patient_id);
                Ok(false)
            }
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn undo_reservation(&self, slot_id: Uuid, patient_id: Uuid) {
        match self.slots.release_held_by(slot_id, patient_id).await {
            Ok(_) => info!("Reservation of slot {} rolled back", slot_id),
            Err(e) => error!("Failed to roll back reservation of slot {}: {}", slot_id, e),
        }
    }

    async fn restore_hold(&self, slot_id: Uuid, patient_id: Uuid) {
        match self.slots.try_reserve(slot_id, patient_id).await {
            Ok(_) => info!("Slot {} re-reserved for patient {}", slot_id, patient_id),
            Err(e) => error!("Failed to re-reserve slot {} for patient {}: {}", slot_id, patient_id, e),
        }
    }
}
