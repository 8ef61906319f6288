use rocket::response::stream::{Event, EventStream};
use rocket::{get, http::Status, post, serde::json::Json, Shutdown, State};
use futures::StreamExt;
use tokio::select;
use tokio::time::{interval_at, Duration, Instant};
use tracing::{debug, info, instrument};

use shared::models::*;
use shared::user_info::UserInfo;

use crate::config::Config;
use crate::error::ApiError;
use crate::host::{HostAccess, HostGate};
use crate::pitch::PitchGenerator;
use crate::processor::VoteProcessor;
use crate::rate_limiter::RateLimiter;

const PITCH_RATE_LIMIT_PER_MINUTE: u32 = 6;
const LIVE_TICK: Duration = Duration::from_secs(1);

pub struct AppState {
    pub processor: VoteProcessor,
    pub host_gate: HostGate,
    pub pitch: PitchGenerator,
    pub vote_limiter: RateLimiter,
    pub pitch_limiter: RateLimiter,
}

impl AppState {
    pub fn new(processor: VoteProcessor, config: &Config) -> Self {
        Self {
            processor,
            host_gate: HostGate::new(config.host_secret.clone()),
            pitch: PitchGenerator::new(
                config.gemini_api_key.clone(),
                config.gemini_model.clone(),
                config.retry.clone(),
            ),
            vote_limiter: RateLimiter::per_minute(config.vote_rate_limit_per_minute),
            pitch_limiter: RateLimiter::per_minute(PITCH_RATE_LIMIT_PER_MINUTE),
        }
    }
}

#[rocket::options("/<_..>")]
pub async fn all_options() -> Status {
    Status::Ok
}

#[get("/session")]
pub fn get_session(user_info: UserInfo) -> Json<SessionInfo> {
    Json(user_info.session())
}

#[get("/window")]
pub async fn get_window(state: &State<AppState>) -> Result<Json<WindowStatus>, ApiError> {
    Ok(Json(state.processor.window_status().await?))
}

#[instrument(skip(state, user_info))]
#[get("/ballot")]
pub async fn get_ballot(state: &State<AppState>, user_info: UserInfo) -> Result<Json<Option<Vote>>, ApiError> {
    let vote = state.processor.vote_of(&user_info.voter_id).await?;
    debug!(has_vote = vote.is_some(), "ballot lookup");
    Ok(Json(vote))
}

#[instrument(skip(state, request, user_info), fields(candidate = request.candidate_id))]
#[post("/ballot", format = "json", data = "<request>")]
pub async fn cast_ballot(
    state: &State<AppState>,
    request: Json<CastVoteRequest>,
    user_info: UserInfo,
) -> Result<Json<VoteReceipt>, ApiError> {
    let rate_limit_key = format!("cast_ballot:{}", user_info.rate_limit_subject());
    state.vote_limiter.check_rate_limit(&rate_limit_key)?;

    let receipt = state
        .processor
        .submit_vote(&user_info.voter_id, request.candidate_id)
        .await?;
    Ok(Json(receipt))
}

#[get("/results")]
pub async fn get_results(state: &State<AppState>) -> Result<Json<PublicResults>, ApiError> {
    Ok(Json(state.processor.public_results().await?))
}

#[get("/events")]
pub fn live_events(state: &State<AppState>, mut shutdown: Shutdown) -> EventStream![] {
    let processor = state.processor.clone();
    let mut subscription = processor.store().subscribe_all();
    EventStream! {
        let mut ticker = interval_at(Instant::now() + LIVE_TICK, LIVE_TICK);
        let mut snapshot = subscription.next().await.unwrap_or_default();
        loop {
            yield Event::json(&processor.live_update(&snapshot));
            select! {
                next = subscription.next() => match next {
                    Some(s) => snapshot = s,
                    None => break,
                },
                _ = ticker.tick() => {},
                _ = &mut shutdown => break,
            }
        }
    }
}

/// The caller's own ballot: the current record first, then every change,
/// including the `null` a reset leaves behind.
#[get("/ballot/events")]
pub fn ballot_events(
    state: &State<AppState>,
    user_info: UserInfo,
    mut shutdown: Shutdown,
) -> Result<EventStream![], ApiError> {
    let mut updates = Box::pin(state.processor.voter_feed(&user_info.voter_id)?.into_stream());
    Ok(EventStream! {
        loop {
            let vote = select! {
                next = updates.next() => match next {
                    Some(vote) => vote,
                    None => break,
                },
                _ = &mut shutdown => break,
            };
            yield Event::json(&vote);
        }
    })
}

#[post("/host/unlock")]
pub fn host_unlock(_host: HostAccess) -> Status {
    info!("host controls unlocked");
    Status::NoContent
}

#[instrument(skip_all)]
#[post("/host/start")]
pub async fn host_start(state: &State<AppState>, _host: HostAccess) -> Result<Json<WindowStatus>, ApiError> {
    Ok(Json(state.processor.start_voting().await?))
}

#[instrument(skip_all)]
#[post("/host/stop")]
pub async fn host_stop(state: &State<AppState>, _host: HostAccess) -> Result<Json<WindowStatus>, ApiError> {
    Ok(Json(state.processor.stop_voting().await?))
}

#[instrument(skip_all)]
#[post("/host/reset")]
pub async fn host_reset(state: &State<AppState>, _host: HostAccess) -> Result<Json<WindowStatus>, ApiError> {
    Ok(Json(state.processor.reset().await?))
}

#[get("/host/tally")]
pub async fn host_tally(state: &State<AppState>, _host: HostAccess) -> Result<Json<HostDashboard>, ApiError> {
    Ok(Json(state.processor.host_dashboard().await?))
}

#[get("/host/events")]
pub fn host_events(state: &State<AppState>, _host: HostAccess, mut shutdown: Shutdown) -> EventStream![] {
    let processor = state.processor.clone();
    let mut subscription = processor.store().subscribe_all();
    EventStream! {
        let mut ticker = interval_at(Instant::now() + LIVE_TICK, LIVE_TICK);
        let mut snapshot = subscription.next().await.unwrap_or_default();
        loop {
            yield Event::json(&processor.dashboard_from(&snapshot));
            select! {
                next = subscription.next() => match next {
                    Some(s) => snapshot = s,
                    None => break,
                },
                _ = ticker.tick() => {},
                _ = &mut shutdown => break,
            }
        }
    }
}

#[instrument(skip_all, fields(team = request.team_number))]
#[post("/host/pitch", format = "json", data = "<request>")]
pub async fn host_pitch(
    state: &State<AppState>,
    _host: HostAccess,
    request: Json<PitchRequest>,
    user_info: UserInfo,
) -> Result<Json<PitchResponse>, ApiError> {
    let rate_limit_key = format!("pitch:{}", user_info.rate_limit_subject());
    state.pitch_limiter.check_rate_limit(&rate_limit_key)?;
    Ok(Json(state.pitch.generate(&request).await?))
}
