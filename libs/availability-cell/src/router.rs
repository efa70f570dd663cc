use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AvailabilityState};

pub fn availability_routes(state: AvailabilityState) -> Router {
    // Public routes; the schedule view reads an optional bearer token itself
    let public_routes = Router::new()
        .route("/doctors/{doctor_id}/schedule-groups", get(handlers::get_doctor_schedule_groups))
        .route("/available-doctors", get(handlers::get_available_doctors));

    // Doctor routes
    let protected_routes = Router::new()
        .route("/update", post(handlers::update_availability))
        .route("/my-slots", get(handlers::get_my_slots))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
