// libs/appointment-cell/src/router.rs
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(state: AppointmentState) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/book", post(handlers::book_appointment))
        .route("/me", get(handlers::get_my_appointments))
        .route("/doctor/me", get(handlers::get_doctor_appointments))
        .route("/{appointment_id}", delete(handlers::cancel_appointment))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
