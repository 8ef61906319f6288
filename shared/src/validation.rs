use crate::models::{CandidateId, PitchRequest};

pub const CANDIDATE_COUNT: u8 = 10;
pub const VOTING_DURATION_MINUTES: i64 = 5;
pub const MIN_DURATION_MINUTES: i64 = 1;
pub const MAX_DURATION_MINUTES: i64 = 60;
pub const MAX_VOTER_ID_LENGTH: usize = 128;
pub const MAX_ITEMS_LENGTH: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Candidate {0} does not exist (must be 1-{CANDIDATE_COUNT})")]
    CandidateOutOfRange(i64),
    #[error("Voter identity is missing")]
    EmptyVoterId,
    #[error("Voter identity exceeds maximum length of {MAX_VOTER_ID_LENGTH}")]
    VoterIdTooLong,
    #[error("Voter identity contains invalid characters")]
    VoterIdMalformed,
    #[error("Team {0} does not exist (must be 1-{CANDIDATE_COUNT})")]
    TeamOutOfRange(i64),
    #[error("List at least one collected item")]
    EmptyItems,
    #[error("Item list exceeds maximum length of {MAX_ITEMS_LENGTH}")]
    ItemsTooLong,
    #[error("Duration must be {MIN_DURATION_MINUTES}-{MAX_DURATION_MINUTES} minutes, got {0}")]
    DurationOutOfRange(i64),
}

pub fn validate_candidate(raw: i64) -> Result<CandidateId, ValidationError> {
    CandidateId::try_from(raw)
}

/// Accepts ids made of ASCII alphanumerics, `-` and `_`; this covers UUIDs
/// and the URL-safe base64 fingerprints minted by the server.
pub fn validate_voter_id(voter_id: &str) -> Result<(), ValidationError> {
    if voter_id.trim().is_empty() { return Err(ValidationError::EmptyVoterId); }
    if voter_id.len() > MAX_VOTER_ID_LENGTH { return Err(ValidationError::VoterIdTooLong); }
    if !voter_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ValidationError::VoterIdMalformed);
    }
    Ok(())
}

pub fn validate_duration(minutes: i64) -> Result<(), ValidationError> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(ValidationError::DurationOutOfRange(minutes));
    }
    Ok(())
}

pub fn validate_pitch_request(request: &PitchRequest) -> Result<(), ValidationError> {
    if !(1..=i64::from(CANDIDATE_COUNT)).contains(&request.team_number) {
        return Err(ValidationError::TeamOutOfRange(request.team_number));
    }
    if request.items_collected.trim().is_empty() { return Err(ValidationError::EmptyItems); }
    if request.items_collected.chars().count() > MAX_ITEMS_LENGTH { return Err(ValidationError::ItemsTooLong); }
    Ok(())
}
