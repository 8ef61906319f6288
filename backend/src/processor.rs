use std::sync::Arc;
use tracing::{debug, info, instrument};

use shared::models::*;
use shared::tally::compute_tally;
use shared::validation::{validate_candidate, validate_voter_id, ValidationError};
use shared::window::Clock;

use crate::retry::{run_with_retry, RetryError, RetryPolicy};
use crate::store::{CastOutcome, DocumentStore, StoreError, StoreSnapshot, Subscription, WriteBatch};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("Voting has not started yet")]
    VotingPending,
    #[error("Voting is closed")]
    VotingClosed,
    #[error("{0}")]
    Write(RetryError<StoreError>),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Window lifecycle and vote handling on top of a [`DocumentStore`].
#[derive(Clone)]
pub struct VoteProcessor {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    duration_minutes: i64,
}

impl VoteProcessor {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, retry: RetryPolicy, duration_minutes: i64) -> Self {
        Self { store, clock, retry, duration_minutes }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    pub async fn window_status(&self) -> Result<WindowStatus, ProcessError> {
        let window = self.store.window().await?;
        Ok(window.status_at(self.now()))
    }

    pub async fn vote_of(&self, voter_id: &str) -> Result<Option<Vote>, ProcessError> {
        validate_voter_id(voter_id)?;
        Ok(self.store.vote(voter_id).await?)
    }

    /// Live view of one voter's own record: the current vote first, then each
    /// change, including the `None` left behind by a reset.
    pub fn voter_feed(&self, voter_id: &str) -> Result<Subscription<Option<Vote>>, ProcessError> {
        validate_voter_id(voter_id)?;
        Ok(self.store.subscribe_voter(voter_id))
    }

    /// Records or replaces the caller's vote. The window check happens in the
    /// store together with the write on every attempt, so a vote never lands
    /// outside an active window. The receipt carries the stored vote.
    #[instrument(skip(self), fields(backend = self.store.backend_tag()))]
    pub async fn submit_vote(&self, voter_id: &str, candidate: i64) -> Result<VoteReceipt, ProcessError> {
        validate_voter_id(voter_id)?;
        let candidate_id = validate_candidate(candidate)?;

        let outcome = run_with_retry(&self.retry, "submit_vote", || {
            self.store.cast_vote(voter_id, candidate_id, self.clock.as_ref())
        })
        .await
        .map_err(ProcessError::Write)?;

        match outcome {
            CastOutcome::Recorded { stored, previous } => {
                info!(%candidate_id, changed = previous.is_some(), "vote recorded");
                Ok(VoteReceipt { vote: stored, replaced: previous.map(|p| p.candidate_id) })
            }
            CastOutcome::Rejected(Phase::Closed) => Err(ProcessError::VotingClosed),
            CastOutcome::Rejected(_) => Err(ProcessError::VotingPending),
        }
    }

    /// Opens a fresh window starting now. Restarts a window that is already open.
    pub async fn start_voting(&self) -> Result<WindowStatus, ProcessError> {
        let state = VotingWindowState::started(self.now(), self.duration_minutes);
        self.write_window("start_voting", state).await?;
        info!(duration_minutes = self.duration_minutes, "voting started");
        self.window_status().await
    }

    /// Closes the window immediately by back-dating its start.
    pub async fn stop_voting(&self) -> Result<WindowStatus, ProcessError> {
        let now = self.now();
        if self.store.window().await?.phase_at(now) == Phase::Pending {
            return Err(ProcessError::VotingPending);
        }
        let state = VotingWindowState::stopped(now, self.duration_minutes);
        self.write_window("stop_voting", state).await?;
        info!("voting stopped");
        self.window_status().await
    }

    /// Returns the window to pending and deletes every vote in one batch.
    pub async fn reset(&self) -> Result<WindowStatus, ProcessError> {
        let mut batch = WriteBatch::new();
        batch
            .set_window(VotingWindowState::pending(self.duration_minutes))
            .clear_votes();
        run_with_retry(&self.retry, "reset", || self.store.commit(&batch))
            .await
            .map_err(ProcessError::Write)?;
        info!("system reset complete");
        self.window_status().await
    }

    pub async fn public_results(&self) -> Result<PublicResults, ProcessError> {
        let window = self.store.window().await?;
        let votes = self.store.votes().await?;
        Ok(public_results(&window, &votes, self.now()))
    }

    pub async fn host_dashboard(&self) -> Result<HostDashboard, ProcessError> {
        let window = self.store.window().await?;
        let votes = self.store.votes().await?;
        debug!(votes = votes.len(), "host dashboard read");
        Ok(host_dashboard(&window, &votes, self.now()))
    }

    pub fn live_update(&self, snapshot: &StoreSnapshot) -> LiveUpdate {
        let now = self.now();
        LiveUpdate {
            window: snapshot.window.status_at(now),
            results: public_results(&snapshot.window, snapshot.votes.values(), now),
        }
    }

    pub fn dashboard_from(&self, snapshot: &StoreSnapshot) -> HostDashboard {
        host_dashboard(&snapshot.window, snapshot.votes.values(), self.now())
    }

    async fn write_window(&self, operation: &'static str, state: VotingWindowState) -> Result<(), ProcessError> {
        run_with_retry(&self.retry, operation, || self.store.set_window(&state))
            .await
            .map_err(ProcessError::Write)
    }
}

pub fn public_results<'a>(
    window: &VotingWindowState,
    votes: impl IntoIterator<Item = &'a Vote>,
    now: i64,
) -> PublicResults {
    let tally = compute_tally(votes);
    let phase = window.phase_at(now);
    let closed = phase == Phase::Closed;
    PublicResults {
        phase,
        total_votes: closed.then_some(tally.total),
        results: closed.then(|| tally.results(true)),
        winners: closed.then(|| tally.winners.clone()),
    }
}

pub fn host_dashboard<'a>(
    window: &VotingWindowState,
    votes: impl IntoIterator<Item = &'a Vote>,
    now: i64,
) -> HostDashboard {
    let tally = compute_tally(votes);
    let status = window.status_at(now);
    let results = tally.results(status.phase == Phase::Closed);
    HostDashboard { window: status, tally, results }
}
