use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use shared::models::{CandidateId, Phase, VotingWindowState};
use shared::tally::compute_tally;
use shared::ErrorCode;

use crate::processor::VoteProcessor;
use crate::store::StoreSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Opened { start_time: i64, duration_minutes: i64 },
    Closed { total: u32, winners: Vec<CandidateId> },
    Reset,
}

/// What changed between two observations of the window, if anything worth
/// reporting. A restart of an open window counts as a fresh opening.
pub fn detect_transition(
    previous: (Phase, VotingWindowState),
    current: (Phase, VotingWindowState),
    snapshot: &StoreSnapshot,
) -> Option<Transition> {
    let (was, before) = previous;
    let (now, after) = current;
    match now {
        Phase::Pending if was != Phase::Pending => Some(Transition::Reset),
        Phase::Active if was != Phase::Active || before.start_time != after.start_time => {
            Some(Transition::Opened {
                start_time: after.start_time.unwrap_or_default(),
                duration_minutes: after.duration_minutes,
            })
        }
        Phase::Closed if was != Phase::Closed => {
            let tally = compute_tally(snapshot.votes.values());
            Some(Transition::Closed { total: tally.total, winners: tally.winners })
        }
        _ => None,
    }
}

fn log_transition(transition: &Transition) {
    match transition {
        Transition::Opened { start_time, duration_minutes } => {
            info!(start_time, duration_minutes, "🧟 Voting window opened");
        }
        Transition::Closed { total, winners } => {
            let winners: Vec<String> = winners.iter().map(|w| format!("#{w}")).collect();
            info!(total, winners = %winners.join(", "), "🏆 Voting window closed");
        }
        Transition::Reset => info!("🧹 Voting reset, waiting for host"),
    }
}

/// Follows the store and the clock, logging each phase change once.
pub async fn run_window_monitor(processor: VoteProcessor) {
    let mut subscription = processor.store().subscribe_all();
    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let Some(mut snapshot) = subscription.next().await else {
        warn!(code = %ErrorCode::SubscriptionFailure, "window monitor could not subscribe");
        return;
    };
    let mut observed = (snapshot.window.phase_at(processor.now()), snapshot.window);
    info!(phase = %observed.0, "🕰️ Window monitor started");

    loop {
        tokio::select! {
            next = subscription.next() => match next {
                Some(s) => snapshot = s,
                None => {
                    warn!(code = %ErrorCode::SubscriptionFailure, "window monitor lost the store feed");
                    return;
                }
            },
            _ = ticker.tick() => {}
        }

        let current = (snapshot.window.phase_at(processor.now()), snapshot.window);
        if let Some(transition) = detect_transition(observed, current, &snapshot) {
            log_transition(&transition);
        }
        observed = current;
    }
}
