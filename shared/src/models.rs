use serde::{Serialize, Deserialize};
use std::fmt;

use crate::tally::Tally;
use crate::validation::{ValidationError, CANDIDATE_COUNT, VOTING_DURATION_MINUTES};

/// A contestant number in `1..=CANDIDATE_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct CandidateId(u8);

impl CandidateId {
    pub const fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = CandidateId> {
        (1..=CANDIDATE_COUNT).map(CandidateId)
    }

    pub const fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl TryFrom<i64> for CandidateId {
    type Error = ValidationError;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        if (1..=i64::from(CANDIDATE_COUNT)).contains(&v) {
            Ok(CandidateId(v as u8))
        } else {
            Err(ValidationError::CandidateOutOfRange(v))
        }
    }
}

impl From<CandidateId> for u8 {
    fn from(id: CandidateId) -> u8 {
        id.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub voter_id: String,
    pub candidate_id: CandidateId,
    /// Epoch milliseconds at which the vote was cast.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingWindowState {
    pub start_time: Option<i64>,
    pub duration_minutes: i64,
}

impl Default for VotingWindowState {
    fn default() -> Self {
        Self::pending(VOTING_DURATION_MINUTES)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pending,
    Active,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Pending => "pending",
            Phase::Active => "active",
            Phase::Closed => "closed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStatus {
    pub phase: Phase,
    pub start_time: Option<i64>,
    pub duration_minutes: i64,
    pub end_time: Option<i64>,
    pub remaining_ms: i64,
    /// `MM:SS`, truncated to whole seconds.
    pub remaining: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub candidate_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    /// The vote as read back from the store after the write was acknowledged.
    pub vote: Vote,
    pub replaced: Option<CandidateId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VoterSource {
    Provided,
    Fingerprint,
    Anonymous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub voter_id: String,
    pub source: VoterSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    pub candidate_id: CandidateId,
    pub votes: u32,
    pub percentage: f64,
    pub is_winner: bool,
}

/// What voters and the audience screen may see. Counts and winners stay
/// hidden until the window closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicResults {
    pub phase: Phase,
    pub total_votes: Option<u32>,
    pub results: Option<Vec<CandidateResult>>,
    pub winners: Option<Vec<CandidateId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDashboard {
    pub window: WindowStatus,
    pub tally: Tally,
    pub results: Vec<CandidateResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveUpdate {
    pub window: WindowStatus,
    pub results: PublicResults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchTone {
    #[default]
    Hilarious,
    Spooky,
    Epic,
    Silly,
}

impl PitchTone {
    pub const fn describe(self) -> &'static str {
        match self {
            PitchTone::Hilarious => "Hilarious and absurd",
            PitchTone::Spooky => "Deeply spooky and serious",
            PitchTone::Epic => "Epic and overly dramatic",
            PitchTone::Silly => "Silly and family-friendly",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PitchRequest {
    pub team_number: i64,
    pub items_collected: String,
    pub tone: PitchTone,
}

impl Default for PitchRequest {
    fn default() -> Self {
        Self {
            team_number: 1,
            items_collected: "A pink clip, a silver watch, a rubber chicken.".into(),
            tone: PitchTone::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchResponse {
    pub team_number: i64,
    pub script: String,
}
