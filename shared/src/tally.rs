use serde::{Serialize, Deserialize};
use std::collections::HashMap;

use crate::models::{CandidateId, CandidateResult, Vote};
use crate::validation::CANDIDATE_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateCount {
    pub candidate_id: CandidateId,
    pub votes: u32,
}

/// Per-candidate counts over one snapshot of the vote collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    /// One entry per candidate, in candidate order, zero-filled.
    pub counts: Vec<CandidateCount>,
    pub total: u32,
    /// Empty while no vote has been counted.
    pub winners: Vec<CandidateId>,
}

impl Default for Tally {
    fn default() -> Self {
        compute_tally(std::iter::empty())
    }
}

impl Tally {
    pub fn count(&self, candidate: CandidateId) -> u32 {
        self.counts.get(candidate.index()).map_or(0, |c| c.votes)
    }

    pub fn is_winner(&self, candidate: CandidateId) -> bool {
        self.winners.contains(&candidate)
    }

    /// Share of the total in percent; zero when nothing has been counted.
    pub fn percentage(&self, candidate: CandidateId) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.count(candidate)) * 100.0 / f64::from(self.total)
    }

    /// Rows for the bar chart. Winners are only flagged when `reveal_winners`.
    pub fn results(&self, reveal_winners: bool) -> Vec<CandidateResult> {
        self.counts.iter()
            .map(|c| CandidateResult {
                candidate_id: c.candidate_id,
                votes: c.votes,
                percentage: self.percentage(c.candidate_id),
                is_winner: reveal_winners && self.is_winner(c.candidate_id),
            })
            .collect()
    }
}

/// Counts one vote per voter. When a voter appears more than once the record
/// with the latest timestamp is the one counted.
pub fn compute_tally<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Tally {
    let mut latest: HashMap<&str, &Vote> = HashMap::new();
    for vote in votes {
        latest.entry(vote.voter_id.as_str())
            .and_modify(|seen| if vote.timestamp >= seen.timestamp { *seen = vote })
            .or_insert(vote);
    }

    let mut by_candidate = [0u32; CANDIDATE_COUNT as usize];
    for vote in latest.values() {
        by_candidate[vote.candidate_id.index()] += 1;
    }

    let counts: Vec<CandidateCount> = CandidateId::all()
        .map(|candidate_id| CandidateCount { candidate_id, votes: by_candidate[candidate_id.index()] })
        .collect();
    let total = counts.iter().map(|c| c.votes).sum();

    Tally { winners: leaders(&counts, total), counts, total }
}

fn leaders(counts: &[CandidateCount], total: u32) -> Vec<CandidateId> {
    if total == 0 {
        return Vec::new();
    }

    let mut max_votes = 0;
    let mut winners = Vec::new();
    for count in counts {
        if count.votes > max_votes {
            max_votes = count.votes;
            winners.clear();
            winners.push(count.candidate_id);
        } else if count.votes == max_votes && count.votes > 0 {
            winners.push(count.candidate_id);
        }
    }
    winners
}
