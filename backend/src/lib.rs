pub mod catchers;
pub mod config;
pub mod cors;
pub mod error;
pub mod host;
pub mod monitor;
pub mod pg_store;
pub mod pitch;
pub mod processor;
pub mod rate_limiter;
pub mod retry;
pub mod routes;
pub mod store;
pub use shared::user_info;
pub use shared::{models::*, error::*, user_info::*};

use rocket::{catchers, routes, Build, Rocket};

use crate::catchers::*;
use crate::cors::CORS;
use crate::routes::*;

/// Assembles the API around an already-built state.
pub fn build_rocket(state: AppState) -> Rocket<Build> {
    rocket::build()
        .attach(CORS)
        .manage(state)
        .mount(
            "/api",
            routes![
                all_options,
                get_session,
                get_window,
                get_ballot,
                cast_ballot,
                ballot_events,
                get_results,
                live_events,
                host_unlock,
                host_start,
                host_stop,
                host_reset,
                host_tally,
                host_events,
                host_pitch
            ],
        )
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                too_many_requests,
                internal_error,
                service_unavailable
            ],
        )
}
