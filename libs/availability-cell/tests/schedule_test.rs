// libs/availability-cell/tests/schedule_test.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use availability_cell::models::Slot;
use availability_cell::services::{InMemorySlotStore, ScheduleAggregator, SlotStore};
use shared_models::pagination::PageRequest;

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2031, 6, day, hour, 0, 0).unwrap()
}

async fn publish(store: &InMemorySlotStore, doctor: Uuid, start: DateTime<Utc>) -> Slot {
    store
        .insert(Slot::new_available(doctor, start, start + Duration::minutes(30)))
        .await
        .unwrap()
}

#[tokio::test]
async fn anonymous_view_lists_future_available_slots_by_day() {
    let store = Arc::new(InMemorySlotStore::new());
    let doctor = Uuid::new_v4();
    let now = at(10, 12);

    publish(&store, doctor, at(10, 9)).await; // already started
    publish(&store, doctor, at(10, 15)).await;
    publish(&store, doctor, at(12, 9)).await;
    publish(&store, doctor, at(11, 9)).await;
    publish(&store, Uuid::new_v4(), at(11, 10)).await; // another doctor

    let aggregator = ScheduleAggregator::new(store.clone());
    let page = aggregator
        .schedule_groups(doctor, None, PageRequest::new(0, 30).unwrap(), now)
        .await
        .unwrap();

    let dates: Vec<_> = page.schedule_groups.iter().map(|g| g.date.to_string()).collect();
    assert_eq!(dates, vec!["2031-06-10", "2031-06-11", "2031-06-12"]);
    assert_eq!(page.schedule_groups[0].time_slots.len(), 1);
    assert!(page.schedule_groups.iter().all(|g| !g.has_user_booking_in_group));
    assert_eq!(page.pagination.total_items, 3);
}

#[tokio::test]
async fn patient_sees_own_bookings_but_not_others() {
    let store = Arc::new(InMemorySlotStore::new());
    let doctor = Uuid::new_v4();
    let patient = Uuid::new_v4();
    let now = at(1, 0);

    let mine = publish(&store, doctor, at(3, 9)).await;
    let theirs = publish(&store, doctor, at(3, 10)).await;
    publish(&store, doctor, at(4, 9)).await;

    store.try_reserve(mine.id, patient).await.unwrap();
    store.try_reserve(theirs.id, Uuid::new_v4()).await.unwrap();

    let aggregator = ScheduleAggregator::new(store.clone());
    let page = aggregator
        .schedule_groups(doctor, Some(patient), PageRequest::new(0, 30).unwrap(), now)
        .await
        .unwrap();

    assert_eq!(page.schedule_groups.len(), 2);

    let day_three = &page.schedule_groups[0];
    assert!(day_three.has_user_booking_in_group);
    assert_eq!(day_three.time_slots.len(), 1);
    assert_eq!(day_three.time_slots[0].id, mine.id);
    assert!(!page.schedule_groups[1].has_user_booking_in_group);

    // The same view without identity hides the patient's booking.
    let anonymous = aggregator
        .schedule_groups(doctor, None, PageRequest::new(0, 30).unwrap(), now)
        .await
        .unwrap();
    assert_eq!(anonymous.schedule_groups.len(), 1);
}

#[tokio::test]
async fn pagination_applies_to_groups() {
    let store = Arc::new(InMemorySlotStore::new());
    let doctor = Uuid::new_v4();

    for day in 1..=5 {
        publish(&store, doctor, at(day, 9)).await;
        publish(&store, doctor, at(day, 11)).await;
    }

    let aggregator = ScheduleAggregator::new(store.clone());
    let page = aggregator
        .schedule_groups(doctor, None, PageRequest::new(1, 2).unwrap(), at(1, 0))
        .await
        .unwrap();

    assert_eq!(page.schedule_groups.len(), 2);
    assert_eq!(page.schedule_groups[0].id, "day_003");
    assert_eq!(page.schedule_groups[1].id, "day_004");
    assert_eq!(page.pagination.total_pages, 3);
    assert!(page.pagination.has_next_page);
    assert!(page.pagination.has_previous_page);
}

#[tokio::test]
async fn empty_schedule_is_an_empty_page() {
    let aggregator = ScheduleAggregator::new(Arc::new(InMemorySlotStore::new()));
    let page = aggregator
        .schedule_groups(Uuid::new_v4(), None, PageRequest::new(0, 30).unwrap(), Utc::now())
        .await
        .unwrap();

    assert!(page.schedule_groups.is_empty());
    assert_eq!(page.pagination.total_items, 0);
    assert!(!page.pagination.has_next_page);
}
