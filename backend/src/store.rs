//! Document-store seam.
//!
//! The app keeps two kinds of documents: a single window-settings document and
//! a collection of votes keyed by voter id. Every implementation publishes a
//! whole-store [`StoreSnapshot`] after each acknowledged write; subscribers
//! project the part they care about out of it.

use async_trait::async_trait;
use futures::Stream;
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::atomic::AtomicU32;
use tokio::sync::watch;
use tracing::warn;

use shared::models::{CandidateId, Phase, Vote, VotingWindowState};
use shared::window::Clock;
use shared::ErrorCode;

use crate::retry::Transient;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("database error: {0}")]
    Database(String),
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Conflict(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub window: VotingWindowState,
    pub votes: BTreeMap<String, Vote>,
}

impl StoreSnapshot {
    fn apply(&mut self, op: &BatchOp) {
        match op {
            BatchOp::SetWindow(state) => self.window = *state,
            BatchOp::PutVote(vote) => {
                self.votes.insert(vote.voter_id.clone(), vote.clone());
            }
            BatchOp::DeleteVote(voter_id) => {
                self.votes.remove(voter_id);
            }
            BatchOp::ClearVotes => self.votes.clear(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    SetWindow(VotingWindowState),
    PutVote(Vote),
    DeleteVote(String),
    /// Deletes the whole vote collection, including votes written after the
    /// batch was assembled.
    ClearVotes,
}

/// Result of a conditional vote write.
#[derive(Debug, Clone, PartialEq)]
pub enum CastOutcome {
    /// Stored while the window was active; `previous` is the vote it replaced.
    Recorded { stored: Vote, previous: Option<Vote> },
    /// Nothing was written because the window was in this phase.
    Rejected(Phase),
}

/// Writes that land together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_window(&mut self, state: VotingWindowState) -> &mut Self {
        self.ops.push(BatchOp::SetWindow(state));
        self
    }

    pub fn put_vote(&mut self, vote: Vote) -> &mut Self {
        self.ops.push(BatchOp::PutVote(vote));
        self
    }

    pub fn delete_vote(&mut self, voter_id: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::DeleteVote(voter_id.into()));
        self
    }

    pub fn clear_votes(&mut self) -> &mut Self {
        self.ops.push(BatchOp::ClearVotes);
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn window(&self) -> Result<VotingWindowState, StoreError>;

    async fn set_window(&self, state: &VotingWindowState) -> Result<(), StoreError>;

    async fn vote(&self, voter_id: &str) -> Result<Option<Vote>, StoreError>;

    /// Inserts or replaces the vote of `voter_id`, but only if the window is
    /// active. The vote is stamped from `clock` under the same lock as the
    /// phase check and the upsert, so no other write can fall in between.
    async fn cast_vote(
        &self,
        voter_id: &str,
        candidate_id: CandidateId,
        clock: &dyn Clock,
    ) -> Result<CastOutcome, StoreError>;

    async fn votes(&self) -> Result<Vec<Vote>, StoreError>;

    async fn commit(&self, batch: &WriteBatch) -> Result<(), StoreError>;

    /// Receiver of the snapshot published after each acknowledged write.
    fn watch(&self) -> watch::Receiver<StoreSnapshot>;

    fn subscribe_window(&self) -> Subscription<VotingWindowState> {
        Subscription::new(self.watch(), |s| s.window)
    }

    fn subscribe_votes(&self) -> Subscription<Vec<Vote>> {
        Subscription::new(self.watch(), |s| s.votes.values().cloned().collect())
    }

    fn subscribe_voter(&self, voter_id: &str) -> Subscription<Option<Vote>> {
        let voter_id = voter_id.to_string();
        Subscription::new(self.watch(), move |s| s.votes.get(&voter_id).cloned())
    }

    fn subscribe_all(&self) -> Subscription<StoreSnapshot> {
        Subscription::new(self.watch(), StoreSnapshot::clone)
    }
}

type Selector<T> = Box<dyn Fn(&StoreSnapshot) -> T + Send + Sync>;

/// A sequence of values of one document or collection: the current value
/// first, then one value per change, in write order. Intermediate values may
/// be coalesced when the subscriber falls behind; the last one is never lost.
pub struct Subscription<T> {
    rx: watch::Receiver<StoreSnapshot>,
    select: Selector<T>,
    last: Option<T>,
}

impl<T: Clone + PartialEq> Subscription<T> {
    pub fn new(
        rx: watch::Receiver<StoreSnapshot>,
        select: impl Fn(&StoreSnapshot) -> T + Send + Sync + 'static,
    ) -> Self {
        Self { rx, select: Box::new(select), last: None }
    }

    /// Last value handed out by [`Subscription::next`].
    pub fn latest(&self) -> Option<&T> {
        self.last.as_ref()
    }

    /// Waits for the next distinct value. Returns `None` once the store side
    /// has gone away; [`Subscription::latest`] keeps the last-known value.
    pub async fn next(&mut self) -> Option<T> {
        if self.last.is_none() {
            let value = (self.select)(&self.rx.borrow_and_update());
            self.last = Some(value.clone());
            return Some(value);
        }

        loop {
            if self.rx.changed().await.is_err() {
                warn!(code = %ErrorCode::SubscriptionFailure, "store feed closed, keeping last-known snapshot");
                return None;
            }
            let value = (self.select)(&self.rx.borrow_and_update());
            if self.last.as_ref() != Some(&value) {
                self.last = Some(value.clone());
                return Some(value);
            }
        }
    }

    pub fn close(self) {}

    pub fn into_stream(self) -> impl Stream<Item = T> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|value| (value, sub))
        })
    }
}

/// In-process store. Writes apply under the channel lock, so every batch is
/// atomic and every read observes all acknowledged writes.
pub struct MemoryStore {
    state: watch::Sender<StoreSnapshot>,
    #[cfg(test)]
    failures: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_snapshot(StoreSnapshot::default())
    }

    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        let (state, _) = watch::channel(snapshot);
        Self {
            state,
            #[cfg(test)]
            failures: AtomicU32::new(0),
        }
    }

    /// Makes the next `n` operations fail with a transient error.
    #[cfg(test)]
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn injected_fault(&self) -> Result<(), StoreError> {
        use std::sync::atomic::Ordering;
        match self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
            Ok(_) => Err(StoreError::Unavailable("injected fault".into())),
            Err(_) => Ok(()),
        }
    }

    #[cfg(not(test))]
    fn injected_fault(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn apply(&self, ops: &[BatchOp]) -> Result<(), StoreError> {
        self.injected_fault()?;
        self.state.send_modify(|snapshot| ops.iter().for_each(|op| snapshot.apply(op)));
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn window(&self) -> Result<VotingWindowState, StoreError> {
        self.injected_fault()?;
        Ok(self.state.borrow().window)
    }

    async fn set_window(&self, state: &VotingWindowState) -> Result<(), StoreError> {
        self.apply(&[BatchOp::SetWindow(*state)])
    }

    async fn vote(&self, voter_id: &str) -> Result<Option<Vote>, StoreError> {
        self.injected_fault()?;
        Ok(self.state.borrow().votes.get(voter_id).cloned())
    }

    async fn cast_vote(
        &self,
        voter_id: &str,
        candidate_id: CandidateId,
        clock: &dyn Clock,
    ) -> Result<CastOutcome, StoreError> {
        self.injected_fault()?;
        let mut outcome = CastOutcome::Rejected(Phase::Pending);
        self.state.send_if_modified(|snapshot| {
            let now = clock.now_ms();
            match snapshot.window.phase_at(now) {
                Phase::Active => {
                    let vote = Vote { voter_id: voter_id.to_string(), candidate_id, timestamp: now };
                    let previous = snapshot.votes.insert(vote.voter_id.clone(), vote.clone());
                    outcome = CastOutcome::Recorded { stored: vote, previous };
                    true
                }
                phase => {
                    outcome = CastOutcome::Rejected(phase);
                    false
                }
            }
        });
        Ok(outcome)
    }

    async fn votes(&self) -> Result<Vec<Vote>, StoreError> {
        self.injected_fault()?;
        Ok(self.state.borrow().votes.values().cloned().collect())
    }

    async fn commit(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.apply(batch.ops())
    }

    fn watch(&self) -> watch::Receiver<StoreSnapshot> {
        self.state.subscribe()
    }
}
