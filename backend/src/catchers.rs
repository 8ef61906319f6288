use rocket::{catch, serde::json::Json, Request};
use shared::{Error, ErrorCode};

fn body(code: ErrorCode, message: &str) -> Json<Error> {
    Json(Error::new(code, message))
}

#[catch(400)]
pub fn bad_request(_req: &Request) -> Json<Error> {
    body(ErrorCode::InvalidInput, "Invalid request parameters.")
}

#[catch(401)]
pub fn unauthorized(_req: &Request) -> Json<Error> {
    body(ErrorCode::Unauthorized, "Invalid Host Key. Access denied.")
}

#[catch(403)]
pub fn forbidden(req: &Request) -> Json<Error> {
    match req.uri().path().segments().last() {
        Some("ballot") => body(ErrorCode::VotingClosed, "Voting is not open right now."),
        _ => body(ErrorCode::Unauthorized, "Access forbidden."),
    }
}

#[catch(404)]
pub fn not_found(req: &Request) -> Json<Error> {
    Json(Error::with_details(
        ErrorCode::NotFound,
        "The requested resource was not found.",
        req.uri().path().to_string(),
    ))
}

#[catch(422)]
pub fn unprocessable(_req: &Request) -> Json<Error> {
    body(ErrorCode::InvalidInput, "The request body could not be understood.")
}

#[catch(429)]
pub fn too_many_requests(_req: &Request) -> Json<Error> {
    body(ErrorCode::RateLimited, "Rate limit exceeded. Please wait before trying again.")
}

#[catch(500)]
pub fn internal_error(_req: &Request) -> Json<Error> {
    body(ErrorCode::SystemError, "An internal server error occurred.")
}

#[catch(503)]
pub fn service_unavailable(_req: &Request) -> Json<Error> {
    body(ErrorCode::WriteFailure, "The service is temporarily unavailable. Please try again.")
}
