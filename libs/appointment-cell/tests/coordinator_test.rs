// libs/appointment-cell/tests/coordinator_test.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentError, AppointmentStatus, BookingAction, SlotUnavailableReason,
};
use appointment_cell::services::{AppointmentStore, BookingCoordinator, InMemoryAppointmentStore};
use availability_cell::models::Slot;
use availability_cell::services::{InMemorySlotStore, SlotStore};
use shared_database::StoreError;
use shared_models::pagination::{Page, PageRequest};

/// Appointment store whose writes can be switched off.
#[derive(Default)]
struct FlakyAppointments {
    inner: InMemoryAppointmentStore,
    fail_saves: AtomicBool,
}

impl FlakyAppointments {
    fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AppointmentStore for FlakyAppointments {
    async fn find_active(&self, patient_id: Uuid, doctor_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.inner.find_active(patient_id, doctor_id).await
    }

    async fn find_by_id_for_patient(&self, appointment_id: Uuid, patient_id: Uuid) -> Result<Appointment, StoreError> {
        self.inner.find_by_id_for_patient(appointment_id, patient_id).await
    }

    async fn find_by_slot(&self, slot_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.inner.find_by_slot(slot_id).await
    }

    async fn save(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write timed out".to_string()));
        }
        self.inner.save(appointment).await
    }

    async fn update_if_active(&self, appointment: Appointment, expected_slot: Uuid) -> Result<Appointment, StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write timed out".to_string()));
        }
        self.inner.update_if_active(appointment, expected_slot).await
    }

    async fn list_by_patient(&self, patient_id: Uuid, page: PageRequest) -> Result<Page<Appointment>, StoreError> {
        self.inner.list_by_patient(patient_id, page).await
    }

    async fn list_by_doctor(&self, doctor_id: Uuid, page: PageRequest) -> Result<Page<Appointment>, StoreError> {
        self.inner.list_by_doctor(doctor_id, page).await
    }
}

struct Fixture {
    slots: Arc<InMemorySlotStore>,
    appointments: Arc<FlakyAppointments>,
    coordinator: BookingCoordinator,
    doctor: Uuid,
}

impl Fixture {
    fn new() -> Self {
        let slots = Arc::new(InMemorySlotStore::new());
        let appointments = Arc::new(FlakyAppointments::default());
        let coordinator = BookingCoordinator::new(slots.clone(), appointments.clone());
        Self { slots, appointments, coordinator, doctor: Uuid::new_v4() }
    }

    async fn publish(&self, hours_ahead: i64) -> Slot {
        let start = Utc::now() + Duration::hours(hours_ahead);
        self.slots
            .insert(Slot::new_available(self.doctor, start, start + Duration::minutes(30)))
            .await
            .unwrap()
    }

    async fn slot(&self, id: Uuid) -> Slot {
        self.slots.get(id).await.unwrap()
    }

    async fn assert_invariants(&self) {
        for slot in self.slots.all_slots().await {
            assert!(slot.holder_is_consistent(), "slot {} has inconsistent holder", slot.id);
        }

        let all = self.appointments.inner.all_appointments().await;
        let active: Vec<_> = all.iter().filter(|a| a.is_active()).collect();
        for appointment in &active {
            let same_pair = active.iter()
                .filter(|b| b.patient_id == appointment.patient_id && b.doctor_id == appointment.doctor_id)
                .count();
            assert_eq!(same_pair, 1, "more than one active appointment for a pair");
            assert!(self.slot(appointment.slot_id).await.is_held_by(appointment.patient_id));
        }

        for slot in self.slots.all_slots().await.into_iter().filter(|s| !s.is_available()) {
            assert!(
                active.iter().any(|a| a.slot_id == slot.id && Some(a.patient_id) == slot.booked_by),
                "slot {} is held without an active appointment",
                slot.id
            );
        }
    }
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[tokio::test]
async fn first_booking_creates_pending_appointment() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let slot = fx.publish(24).await;

    let outcome = fx.coordinator.book(patient, fx.doctor, slot.id).await.unwrap();

    assert_eq!(outcome.action, BookingAction::Booked);
    assert_eq!(outcome.appointment.status, AppointmentStatus::Pending);
    assert_eq!(outcome.appointment.slot_id, slot.id);
    assert_eq!(outcome.released_slot, None);
    assert!(fx.slot(slot.id).await.is_held_by(patient));
    fx.assert_invariants().await;
}

#[tokio::test]
async fn rebooking_moves_the_same_record() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let first = fx.publish(24).await;
    let second = fx.publish(48).await;

    let booked = fx.coordinator.book(patient, fx.doctor, first.id).await.unwrap();
    let moved = fx.coordinator.book(patient, fx.doctor, second.id).await.unwrap();

    assert_eq!(moved.action, BookingAction::Rescheduled);
    assert_eq!(moved.appointment.id, booked.appointment.id);
    assert_eq!(moved.appointment.slot_id, second.id);
    assert_eq!(moved.appointment.created_at, booked.appointment.created_at);
    assert!(moved.appointment.updated_at >= booked.appointment.updated_at);
    assert_eq!(moved.released_slot, Some(first.id));

    assert!(fx.slot(first.id).await.is_available());
    assert!(fx.slot(second.id).await.is_held_by(patient));
    assert_eq!(fx.appointments.inner.all_appointments().await.len(), 1);
    fx.assert_invariants().await;
}

#[tokio::test]
async fn rebooking_resets_confirmed_to_pending() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let first = fx.publish(24).await;
    let second = fx.publish(48).await;

    let booked = fx.coordinator.book(patient, fx.doctor, first.id).await.unwrap();
    let mut confirmed = booked.appointment.clone();
    confirmed.status = AppointmentStatus::Confirmed;
    fx.appointments.save(confirmed).await.unwrap();

    let moved = fx.coordinator.book(patient, fx.doctor, second.id).await.unwrap();
    assert_eq!(moved.appointment.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn booking_a_taken_slot_changes_nothing() {
    let fx = Fixture::new();
    let p = Uuid::new_v4();
    let q = Uuid::new_v4();
    let s1 = fx.publish(24).await;
    let s2 = fx.publish(48).await;

    fx.coordinator.book(p, fx.doctor, s1.id).await.unwrap();
    let moved = fx.coordinator.book(p, fx.doctor, s2.id).await.unwrap();
    assert_eq!(moved.action, BookingAction::Rescheduled);
    assert!(fx.slot(s1.id).await.is_available());

    let before = fx.appointments.inner.all_appointments().await;
    let result = fx.coordinator.book(q, fx.doctor, s2.id).await;

    assert_matches!(
        result,
        Err(AppointmentError::SlotUnavailable { reason: SlotUnavailableReason::HeldByAnotherPatient })
    );
    assert!(fx.slot(s2.id).await.is_held_by(p));
    assert_eq!(fx.appointments.inner.all_appointments().await, before);
    fx.assert_invariants().await;
}

#[tokio::test]
async fn booking_own_slot_again_reports_requester() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let slot = fx.publish(24).await;

    fx.coordinator.book(patient, fx.doctor, slot.id).await.unwrap();
    let result = fx.coordinator.book(patient, fx.doctor, slot.id).await;

    assert_matches!(
        result,
        Err(AppointmentError::SlotUnavailable { reason: SlotUnavailableReason::HeldByRequester })
    );
    assert!(fx.slot(slot.id).await.is_held_by(patient));
    fx.assert_invariants().await;
}

#[tokio::test]
async fn unknown_slot_and_wrong_doctor_are_rejected() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let slot = fx.publish(24).await;

    assert_matches!(
        fx.coordinator.book(patient, fx.doctor, Uuid::new_v4()).await,
        Err(AppointmentError::SlotNotFound)
    );
    assert_matches!(
        fx.coordinator.book(patient, Uuid::new_v4(), slot.id).await,
        Err(AppointmentError::DoctorMismatch)
    );

    assert!(fx.slot(slot.id).await.is_available());
    assert!(fx.appointments.inner.all_appointments().await.is_empty());
}

#[tokio::test]
async fn failed_appointment_write_releases_new_reservation() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let slot = fx.publish(24).await;

    fx.appointments.fail_saves(true);
    let result = fx.coordinator.book(patient, fx.doctor, slot.id).await;

    assert_matches!(result, Err(AppointmentError::StorageUnavailable(_)));
    assert!(fx.slot(slot.id).await.is_available());
    assert!(fx.appointments.inner.all_appointments().await.is_empty());
    fx.assert_invariants().await;
}

#[tokio::test]
async fn failed_rebooking_write_keeps_the_old_slot() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let first = fx.publish(24).await;
    let second = fx.publish(48).await;

    let booked = fx.coordinator.book(patient, fx.doctor, first.id).await.unwrap();

    fx.appointments.fail_saves(true);
    let result = fx.coordinator.book(patient, fx.doctor, second.id).await;

    assert_matches!(result, Err(AppointmentError::StorageUnavailable(_)));
    assert!(fx.slot(first.id).await.is_held_by(patient));
    assert!(fx.slot(second.id).await.is_available());

    let stored = fx.appointments.find_active(patient, fx.doctor).await.unwrap().unwrap();
    assert_eq!(stored, booked.appointment);
    fx.assert_invariants().await;
}

// ==============================================================================
// CANCELLATION
// ==============================================================================

#[tokio::test]
async fn cancellation_releases_exactly_one_slot() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let other = Uuid::new_v4();
    let mine = fx.publish(24).await;
    let theirs = fx.publish(30).await;

    let booked = fx.coordinator.book(patient, fx.doctor, mine.id).await.unwrap();
    fx.coordinator.book(other, fx.doctor, theirs.id).await.unwrap();

    let cancelled = fx.coordinator.cancel(booked.appointment.id, patient).await.unwrap();

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert!(cancelled.updated_at >= booked.appointment.updated_at);
    assert!(fx.slot(mine.id).await.is_available());
    assert!(fx.slot(theirs.id).await.is_held_by(other));
    fx.assert_invariants().await;

    assert_matches!(
        fx.coordinator.cancel(booked.appointment.id, patient).await,
        Err(AppointmentError::AlreadyCancelled)
    );
}

#[tokio::test]
async fn cancelled_pair_can_book_again() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let slot = fx.publish(24).await;

    let first = fx.coordinator.book(patient, fx.doctor, slot.id).await.unwrap();
    fx.coordinator.cancel(first.appointment.id, patient).await.unwrap();

    let second = fx.coordinator.book(patient, fx.doctor, slot.id).await.unwrap();
    assert_eq!(second.action, BookingAction::Booked);
    assert_ne!(second.appointment.id, first.appointment.id);
    fx.assert_invariants().await;
}

#[tokio::test]
async fn other_patients_appointment_is_hidden() {
    let fx = Fixture::new();
    let owner = Uuid::new_v4();
    let slot = fx.publish(24).await;
    let booked = fx.coordinator.book(owner, fx.doctor, slot.id).await.unwrap();

    assert_matches!(
        fx.coordinator.cancel(booked.appointment.id, Uuid::new_v4()).await,
        Err(AppointmentError::NotFoundOrForbidden)
    );
    assert_matches!(
        fx.coordinator.cancel(Uuid::new_v4(), owner).await,
        Err(AppointmentError::NotFoundOrForbidden)
    );
    assert!(fx.slot(slot.id).await.is_held_by(owner));
}

#[tokio::test]
async fn completed_appointment_cannot_be_cancelled() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let slot = fx.publish(24).await;
    let booked = fx.coordinator.book(patient, fx.doctor, slot.id).await.unwrap();

    let mut completed = booked.appointment.clone();
    completed.status = AppointmentStatus::Completed;
    fx.appointments.save(completed).await.unwrap();

    assert_matches!(
        fx.coordinator.cancel(booked.appointment.id, patient).await,
        Err(AppointmentError::AlreadyCompleted)
    );
    assert!(fx.slot(slot.id).await.is_held_by(patient));
}

#[tokio::test]
async fn past_appointment_keeps_its_slot() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let slot = fx.publish(-2).await;

    fx.slots.try_reserve(slot.id, patient).await.unwrap();
    let appointment = Appointment::new_pending(patient, fx.doctor, slot.id, Utc::now() - Duration::days(1));
    fx.appointments.save(appointment.clone()).await.unwrap();

    assert_matches!(
        fx.coordinator.cancel(appointment.id, patient).await,
        Err(AppointmentError::PastAppointment)
    );
    assert!(fx.slot(slot.id).await.is_held_by(patient));
    let stored = fx.appointments.find_by_id_for_patient(appointment.id, patient).await.unwrap();
    assert_eq!(stored.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn missing_slot_does_not_block_cancellation() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let appointment = Appointment::new_pending(patient, fx.doctor, Uuid::new_v4(), Utc::now());
    fx.appointments.save(appointment.clone()).await.unwrap();

    let cancelled = fx.coordinator.cancel(appointment.id, patient).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn slot_held_by_someone_else_is_left_alone() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let holder = Uuid::new_v4();
    let slot = fx.publish(24).await;

    fx.slots.try_reserve(slot.id, holder).await.unwrap();
    let stale = Appointment::new_pending(patient, fx.doctor, slot.id, Utc::now());
    fx.appointments.save(stale.clone()).await.unwrap();

    fx.coordinator.cancel(stale.id, patient).await.unwrap();
    assert!(fx.slot(slot.id).await.is_held_by(holder));
}

#[tokio::test]
async fn failed_cancellation_write_restores_the_hold() {
    let fx = Fixture::new();
    let patient = Uuid::new_v4();
    let slot = fx.publish(24).await;
    let booked = fx.coordinator.book(patient, fx.doctor, slot.id).await.unwrap();

    fx.appointments.fail_saves(true);
    let result = fx.coordinator.cancel(booked.appointment.id, patient).await;

    assert_matches!(result, Err(AppointmentError::StorageUnavailable(_)));
    assert!(fx.slot(slot.id).await.is_held_by(patient));
    let stored = fx.appointments.find_by_id_for_patient(booked.appointment.id, patient).await.unwrap();
    assert!(stored.is_active());
    fx.assert_invariants().await;
}
