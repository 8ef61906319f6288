use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use shared::models::{CandidateId, Phase, Vote, VotingWindowState};
use shared::window::Clock;
use shared::ErrorCode;

use crate::store::{BatchOp, CastOutcome, DocumentStore, StoreError, StoreSnapshot, WriteBatch};

const SETTINGS_ID: &str = "settings";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                StoreError::Unavailable(e.to_string())
            }
            sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) => {
                StoreError::Conflict(e.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Malformed(e.to_string()),
            _ => StoreError::Database(e.to_string()),
        }
    }
}

/// Postgres-backed store. Writes from this process are serialized so that the
/// snapshots it publishes follow commit order.
pub struct PgStore {
    pool: PgPool,
    state: watch::Sender<StoreSnapshot>,
    write_lock: Mutex<()>,
}

impl PgStore {
    /// Seeds the settings document when missing and loads the first snapshot.
    pub async fn connect(pool: PgPool) -> Result<Self, StoreError> {
        sqlx::query(
            "INSERT INTO app_state (id, voting_start_time, voting_duration_minutes)
             VALUES ($1, NULL, $2)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(SETTINGS_ID)
        .bind(VotingWindowState::default().duration_minutes)
        .execute(&pool)
        .await?;

        let snapshot = load_snapshot(&pool).await?;
        info!(votes = snapshot.votes.len(), "document store ready");
        let (state, _) = watch::channel(snapshot);
        Ok(Self { pool, state, write_lock: Mutex::new(()) })
    }

    async fn publish(&self) {
        match load_snapshot(&self.pool).await {
            Ok(snapshot) => {
                self.state.send_replace(snapshot);
            }
            Err(e) => warn!(code = %ErrorCode::SubscriptionFailure, "failed to reload snapshot after write: {}", e),
        }
    }

    async fn apply(tx: &mut Transaction<'_, Postgres>, op: &BatchOp) -> Result<(), StoreError> {
        match op {
            BatchOp::SetWindow(state) => {
                upsert_window(state).execute(&mut **tx).await?;
            }
            BatchOp::PutVote(vote) => {
                upsert_vote(vote).execute(&mut **tx).await?;
            }
            BatchOp::DeleteVote(voter_id) => {
                sqlx::query("DELETE FROM mummy_votes WHERE voter_id = $1")
                    .bind(voter_id)
                    .execute(&mut **tx)
                    .await?;
            }
            BatchOp::ClearVotes => {
                sqlx::query("DELETE FROM mummy_votes").execute(&mut **tx).await?;
            }
        }
        Ok(())
    }
}

fn upsert_window(state: &VotingWindowState) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        "INSERT INTO app_state (id, voting_start_time, voting_duration_minutes)
         VALUES ($1, $2, $3)
         ON CONFLICT (id) DO UPDATE
         SET voting_start_time = EXCLUDED.voting_start_time,
             voting_duration_minutes = EXCLUDED.voting_duration_minutes",
    )
    .bind(SETTINGS_ID)
    .bind(state.start_time)
    .bind(state.duration_minutes)
}

fn upsert_vote(vote: &Vote) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        "INSERT INTO mummy_votes (voter_id, candidate_id, cast_at)
         VALUES ($1, $2, $3)
         ON CONFLICT (voter_id) DO UPDATE
         SET candidate_id = EXCLUDED.candidate_id,
             cast_at = EXCLUDED.cast_at
         RETURNING voter_id, candidate_id, cast_at",
    )
    .bind(&vote.voter_id)
    .bind(i16::from(vote.candidate_id.get()))
    .bind(vote.timestamp)
}

fn window_from_row(row: &PgRow) -> Result<VotingWindowState, StoreError> {
    Ok(VotingWindowState {
        start_time: row.try_get("voting_start_time")?,
        duration_minutes: row.try_get("voting_duration_minutes")?,
    })
}

/// Rows naming a candidate outside the valid range are skipped.
fn vote_from_row(row: &PgRow) -> Result<Option<Vote>, StoreError> {
    let voter_id: String = row.try_get("voter_id")?;
    let raw: i16 = row.try_get("candidate_id")?;
    let Ok(candidate_id) = CandidateId::try_from(i64::from(raw)) else {
        warn!(%voter_id, candidate = raw, "ignoring vote for unknown candidate");
        return Ok(None);
    };
    Ok(Some(Vote { voter_id, candidate_id, timestamp: row.try_get("cast_at")? }))
}

/// Row-locks the settings document for the rest of the transaction, so vote
/// writes and window writes from any instance are serialized.
async fn lock_window(tx: &mut Transaction<'_, Postgres>) -> Result<VotingWindowState, StoreError> {
    let row = sqlx::query(
        "SELECT voting_start_time, voting_duration_minutes FROM app_state WHERE id = $1 FOR UPDATE",
    )
    .bind(SETTINGS_ID)
    .fetch_optional(&mut **tx)
    .await?;
    row.as_ref().map_or(Ok(VotingWindowState::default()), window_from_row)
}

async fn fetch_window(pool: &PgPool) -> Result<VotingWindowState, StoreError> {
    let row = sqlx::query("SELECT voting_start_time, voting_duration_minutes FROM app_state WHERE id = $1")
        .bind(SETTINGS_ID)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map_or(Ok(VotingWindowState::default()), window_from_row)
}

async fn fetch_votes(pool: &PgPool) -> Result<Vec<Vote>, StoreError> {
    let rows = sqlx::query("SELECT voter_id, candidate_id, cast_at FROM mummy_votes ORDER BY voter_id")
        .fetch_all(pool)
        .await?;
    let mut votes = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(vote) = vote_from_row(row)? {
            votes.push(vote);
        }
    }
    Ok(votes)
}

async fn load_snapshot(pool: &PgPool) -> Result<StoreSnapshot, StoreError> {
    let window = fetch_window(pool).await?;
    let votes = fetch_votes(pool).await?
        .into_iter()
        .map(|vote| (vote.voter_id.clone(), vote))
        .collect();
    Ok(StoreSnapshot { window, votes })
}

#[async_trait]
impl DocumentStore for PgStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn window(&self) -> Result<VotingWindowState, StoreError> {
        fetch_window(&self.pool).await
    }

    async fn set_window(&self, state: &VotingWindowState) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        upsert_window(state).execute(&self.pool).await?;
        debug!(start_time = ?state.start_time, "window document written");
        self.publish().await;
        Ok(())
    }

    async fn vote(&self, voter_id: &str) -> Result<Option<Vote>, StoreError> {
        let row = sqlx::query("SELECT voter_id, candidate_id, cast_at FROM mummy_votes WHERE voter_id = $1")
            .bind(voter_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => vote_from_row(&row),
            None => Ok(None),
        }
    }

    async fn cast_vote(
        &self,
        voter_id: &str,
        candidate_id: CandidateId,
        clock: &dyn Clock,
    ) -> Result<CastOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let window = lock_window(&mut tx).await?;
        let now = clock.now_ms();
        let phase = window.phase_at(now);
        if phase != Phase::Active {
            tx.rollback().await?;
            return Ok(CastOutcome::Rejected(phase));
        }
        let vote = Vote { voter_id: voter_id.to_string(), candidate_id, timestamp: now };

        let previous = sqlx::query("SELECT voter_id, candidate_id, cast_at FROM mummy_votes WHERE voter_id = $1")
            .bind(&vote.voter_id)
            .fetch_optional(&mut *tx)
            .await?;
        let previous = match previous {
            Some(row) => vote_from_row(&row)?,
            None => None,
        };
        let row = upsert_vote(&vote).fetch_one(&mut *tx).await?;
        let stored = vote_from_row(&row)?
            .ok_or_else(|| StoreError::Malformed(format!("vote for {} read back invalid", vote.voter_id)))?;
        tx.commit().await?;

        self.publish().await;
        Ok(CastOutcome::Recorded { stored, previous })
    }

    async fn votes(&self) -> Result<Vec<Vote>, StoreError> {
        fetch_votes(&self.pool).await
    }

    async fn commit(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        lock_window(&mut tx).await?;
        for op in batch.ops() {
            Self::apply(&mut tx, op).await?;
        }
        tx.commit().await?;
        debug!(ops = batch.ops().len(), "batch committed");
        self.publish().await;
        Ok(())
    }

    fn watch(&self) -> watch::Receiver<StoreSnapshot> {
        self.state.subscribe()
    }
}
