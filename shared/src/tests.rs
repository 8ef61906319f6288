#[cfg(test)]
mod tests {
    use crate::models::{CandidateId, Phase, PitchRequest, Vote, VotingWindowState, VoterSource};
    use crate::tally::compute_tally;
    use crate::user_info::{UserInfo, UNKNOWN_IP};
    use crate::validation::*;
    use crate::window::{format_remaining, Clock, ManualClock, MS_PER_MINUTE};

    const T0: i64 = 1_730_000_000_000;

    fn c(n: i64) -> CandidateId {
        CandidateId::try_from(n).unwrap()
    }

    fn vote(voter: &str, candidate: i64, timestamp: i64) -> Vote {
        Vote { voter_id: voter.into(), candidate_id: c(candidate), timestamp }
    }

    fn votes_for(spread: &[(i64, usize)]) -> Vec<Vote> {
        let mut votes = Vec::new();
        for &(candidate, n) in spread {
            for i in 0..n {
                votes.push(vote(&format!("voter-{candidate}-{i}"), candidate, T0));
            }
        }
        votes
    }

    #[test]
    fn test_pending_without_start() {
        let w = VotingWindowState::pending(5);
        for now in [0, T0, i64::MAX / 2] {
            assert_eq!(w.phase_at(now), Phase::Pending);
        }
        assert_eq!(w.remaining_ms(T0), 0);
        assert_eq!(w.end_time(), None);
    }

    #[test]
    fn test_active_until_exact_end() {
        let w = VotingWindowState::started(T0, 5);
        let end = T0 + 5 * MS_PER_MINUTE;
        assert_eq!(w.phase_at(T0), Phase::Active);
        assert_eq!(w.phase_at(end - 1), Phase::Active);
        assert_eq!(w.phase_at(end), Phase::Closed);
        assert_eq!(w.phase_at(end + 1), Phase::Closed);
        assert_eq!(w.remaining_ms(end - 1), 1);
        assert_eq!(w.remaining_ms(end), 0);
        assert_eq!(w.remaining_ms(end + 10_000), 0);
    }

    #[test]
    fn test_phase_is_monotonic_in_now() {
        let rank = |p: Phase| match p { Phase::Pending => 0, Phase::Active => 1, Phase::Closed => 2 };
        for duration in [0, 1, 5, 30] {
            let w = VotingWindowState::started(T0, duration);
            let mut last = 0;
            let mut now = T0 - 2 * MS_PER_MINUTE;
            while now < T0 + 40 * MS_PER_MINUTE {
                let r = rank(w.phase_at(now));
                assert_ne!(r, 0, "started window read pending at {now}");
                assert!(r >= last, "phase went backwards at {now} for duration {duration}");
                last = r;
                now += 7_919;
            }
            assert_eq!(last, 2);
        }
    }

    #[test]
    fn test_future_start_reads_active_with_clamped_remaining() {
        let w = VotingWindowState::started(T0 + 90_000, 5);
        assert_eq!(w.phase_at(T0), Phase::Active);
        assert_eq!(w.remaining_ms(T0), 5 * MS_PER_MINUTE);
        assert_eq!(w.status_at(T0).remaining, "05:00");
        assert_eq!(w.phase_at(T0 + 90_000 + 5 * MS_PER_MINUTE), Phase::Closed);
    }

    #[test]
    fn test_stop_then_query_is_closed() {
        let clock = ManualClock::new(T0);
        let started = VotingWindowState::started(clock.now_ms(), 5);
        clock.advance(42_000);
        assert_eq!(started.phase_at(clock.now_ms()), Phase::Active);

        let stopped = VotingWindowState::stopped(clock.now_ms(), 5);
        assert!(stopped.start_time.is_some());
        assert_eq!(stopped.end_time(), Some(clock.now_ms()));
        assert_eq!(stopped.phase_at(clock.now_ms()), Phase::Closed);
        assert_eq!(stopped.remaining_ms(clock.now_ms()), 0);
    }

    #[test]
    fn test_zero_duration_closes_immediately() {
        let w = VotingWindowState::started(T0, 0);
        assert_eq!(w.phase_at(T0), Phase::Closed);
    }

    #[test]
    fn test_status_and_format() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(-500), "00:00");
        assert_eq!(format_remaining(999), "00:00");
        assert_eq!(format_remaining(61_999), "01:01");
        assert_eq!(format_remaining(5 * MS_PER_MINUTE), "05:00");

        let status = VotingWindowState::started(T0, 5).status_at(T0 + 30_500);
        assert_eq!(status.phase, Phase::Active);
        assert_eq!(status.remaining_ms, 5 * MS_PER_MINUTE - 30_500);
        assert_eq!(status.remaining, "04:29");
        assert_eq!(status.end_time, Some(T0 + 5 * MS_PER_MINUTE));
    }

    #[test]
    fn test_tally_tie() {
        let a = c(2);
        let b = c(5);
        let tally = compute_tally(&votes_for(&[(2, 3), (5, 3), (9, 1)]));
        assert_eq!(tally.total, 7);
        assert_eq!(tally.winners, vec![a, b]);
        assert_eq!(tally.count(a), 3);
        assert_eq!(tally.count(c(9)), 1);
    }

    #[test]
    fn test_tally_empty() {
        let tally = compute_tally(&Vec::<Vote>::new());
        assert_eq!(tally.total, 0);
        assert!(tally.winners.is_empty());
        assert_eq!(tally.counts.len(), CANDIDATE_COUNT as usize);
        assert!(tally.counts.iter().all(|c| c.votes == 0));
        assert_eq!(tally, crate::tally::Tally::default());
    }

    #[test]
    fn test_tally_later_higher_count_replaces_earlier_leaders() {
        let tally = compute_tally(&votes_for(&[(1, 2), (2, 2), (7, 3)]));
        assert_eq!(tally.winners, vec![c(7)]);

        let tally = compute_tally(&votes_for(&[(1, 1), (3, 4), (4, 2), (10, 4)]));
        assert_eq!(tally.winners, vec![c(3), c(10)]);
    }

    #[test]
    fn test_tally_is_idempotent() {
        let votes = votes_for(&[(1, 4), (6, 2), (8, 4)]);
        assert_eq!(compute_tally(&votes), compute_tally(&votes));
    }

    #[test]
    fn test_tally_counts_latest_vote_per_voter() {
        let votes = vec![
            vote("alice", 1, T0),
            vote("alice", 4, T0 + 10),
            vote("bob", 4, T0 + 5),
            vote("alice", 2, T0 + 3),
        ];
        let tally = compute_tally(&votes);
        assert_eq!(tally.total, 2);
        assert_eq!(tally.count(c(4)), 2);
        assert_eq!(tally.count(c(1)), 0);
        assert_eq!(tally.winners, vec![c(4)]);
    }

    #[test]
    fn test_results_hide_winner_flag_until_revealed() {
        let tally = compute_tally(&votes_for(&[(3, 3), (4, 1)]));
        let hidden = tally.results(false);
        assert!(hidden.iter().all(|r| !r.is_winner));
        let shown = tally.results(true);
        assert!(shown[2].is_winner);
        assert!((shown[2].percentage - 75.0).abs() < f64::EPSILON);
        assert!((shown[3].percentage - 25.0).abs() < f64::EPSILON);
        assert_eq!(shown[0].percentage, 0.0);
    }

    #[test]
    fn test_candidate_range() {
        assert!(CandidateId::try_from(0).is_err());
        assert!(CandidateId::try_from(11).is_err());
        assert!(CandidateId::try_from(-3).is_err());
        assert_eq!(c(10).get(), 10);
        assert_eq!(CandidateId::all().count(), 10);
        assert!(matches!(validate_candidate(12), Err(ValidationError::CandidateOutOfRange(12))));

        let parsed: Result<CandidateId, _> = serde_json::from_str("11");
        assert!(parsed.is_err());
        let parsed: CandidateId = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, c(3));
    }

    #[test]
    fn test_voter_id_validation() {
        assert!(validate_voter_id("a1b2-c3_d4").is_ok());
        assert!(matches!(validate_voter_id("   "), Err(ValidationError::EmptyVoterId)));
        assert!(matches!(validate_voter_id("bad id"), Err(ValidationError::VoterIdMalformed)));
        let long = "x".repeat(MAX_VOTER_ID_LENGTH + 1);
        assert!(matches!(validate_voter_id(&long), Err(ValidationError::VoterIdTooLong)));
    }

    #[test]
    fn test_pitch_request_validation() {
        assert!(validate_pitch_request(&PitchRequest::default()).is_ok());

        let request = PitchRequest { team_number: 0, ..Default::default() };
        assert!(matches!(validate_pitch_request(&request), Err(ValidationError::TeamOutOfRange(0))));

        let request = PitchRequest { items_collected: "  ".into(), ..Default::default() };
        assert!(matches!(validate_pitch_request(&request), Err(ValidationError::EmptyItems)));

        let request = PitchRequest { items_collected: "a".repeat(MAX_ITEMS_LENGTH + 1), ..Default::default() };
        assert!(matches!(validate_pitch_request(&request), Err(ValidationError::ItemsTooLong)));
    }

    #[test]
    fn test_voter_identity_resolution() {
        let provided = UserInfo::resolve(Some("session-123"), Some("10.0.0.1"), Some("ua"));
        assert_eq!(provided.voter_id, "session-123");
        assert_eq!(provided.source, VoterSource::Provided);

        let first = UserInfo::resolve(Some("not valid!"), Some("10.0.0.1"), Some("ua"));
        let second = UserInfo::resolve(None, Some("10.0.0.1"), Some("ua"));
        assert_eq!(first.source, VoterSource::Fingerprint);
        assert_eq!(first.voter_id, second.voter_id);
        assert!(validate_voter_id(&first.voter_id).is_ok());

        let a = UserInfo::resolve(None, None, None);
        let b = UserInfo::resolve(None, None, None);
        assert_eq!(a.source, VoterSource::Anonymous);
        assert_ne!(a.voter_id, b.voter_id);
    }

    #[test]
    fn test_rate_limit_subject_prefers_address() {
        let a = UserInfo::resolve(Some("mask-1"), Some("203.0.113.9"), Some("ua"));
        let b = UserInfo::resolve(Some("mask-2"), Some("203.0.113.9"), Some("ua"));
        assert_eq!(a.rate_limit_subject(), "203.0.113.9");
        assert_eq!(a.rate_limit_subject(), b.rate_limit_subject());

        let unknown = UserInfo::resolve(Some("mask-3"), None, Some("ua"));
        assert_eq!(unknown.ip, UNKNOWN_IP);
        assert_eq!(unknown.rate_limit_subject(), "mask-3");
    }

    #[test]
    fn test_duration_bounds() {
        assert!(validate_duration(VOTING_DURATION_MINUTES).is_ok());
        assert!(validate_duration(0).is_err());
        assert!(validate_duration(MAX_DURATION_MINUTES + 1).is_err());
    }
}
