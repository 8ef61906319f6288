//! Shared-secret gate for host controls.
//!
//! The secret travels in a request header and is compared for equality. This
//! is low assurance: anyone who learns the key is the host.

use ring::constant_time::verify_slices_are_equal;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use tracing::warn;

use crate::error::ApiError;
use crate::routes::AppState;

pub const HOST_KEY_HEADER: &str = "X-Host-Key";

pub struct HostGate {
    secret: Option<String>,
}

impl HostGate {
    pub fn new(secret: Option<String>) -> Self {
        match secret {
            Some(s) if !s.trim().is_empty() => Self { secret: Some(s) },
            _ => {
                warn!("HostGate created without a secret - host controls are locked");
                Self { secret: None }
            }
        }
    }

    pub fn verify(&self, candidate: &str) -> bool {
        match &self.secret {
            Some(secret) => verify_slices_are_equal(secret.as_bytes(), candidate.as_bytes()).is_ok(),
            None => false,
        }
    }
}

/// Request guard for host-only routes.
pub struct HostAccess;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for HostAccess {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(state) = req.rocket().state::<AppState>() else {
            return Outcome::Error((Status::InternalServerError, ApiError::Internal("app state missing".into())));
        };
        let key = req.headers().get_one(HOST_KEY_HEADER).unwrap_or_default();
        if state.host_gate.verify(key) {
            Outcome::Success(HostAccess)
        } else {
            warn!(path = %req.uri(), "rejected host request with invalid key");
            Outcome::Error((Status::Unauthorized, ApiError::Unauthorized))
        }
    }
}
