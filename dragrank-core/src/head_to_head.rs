/// Head-to-head aggregator: survey votes → one symmetric tally per pair.
///
/// A vote is two records sharing a vote id, one winner and one loser. Both
/// directions of a matchup fold into a single row oriented by contestant id
/// (`contestant_a < contestant_b`), so `wins(A,B) + wins(B,A) == count`.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::{VoteRecord, VoteResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadToHeadTally {
    /// Lower contestant id of the pair.
    pub contestant_a: i64,
    /// Higher contestant id of the pair.
    pub contestant_b: i64,
    /// Total votes between the two.
    pub count: u32,
    /// Votes won by `contestant_a`.
    pub wins: u32,
}

impl HeadToHeadTally {
    /// Wins for `contestant` in this pair, or `None` if they are not in it
    /// or the tally has more wins than votes.
    pub fn wins_for(&self, contestant: i64) -> Option<u32> {
        if contestant == self.contestant_a {
            self.losses().map(|_| self.wins)
        } else if contestant == self.contestant_b {
            self.losses()
        } else {
            None
        }
    }

    /// Votes lost by `contestant_a`; `None` when `wins > count`.
    pub fn losses(&self) -> Option<u32> {
        self.count.checked_sub(self.wins)
    }
}

/// One resolved vote: who won, who lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matchup {
    pub winner: i64,
    pub loser: i64,
}

/// Most recent survey round present in the records.
pub fn latest_survey(votes: &[VoteRecord]) -> Option<u32> {
    votes.iter().map(|v| v.survey_id).max()
}

/// Pair up the two sides of every vote in one survey, in vote-id order.
pub fn resolve_matchups(votes: &[VoteRecord], survey_id: u32) -> Result<Vec<Matchup>> {
    let mut sides: BTreeMap<i64, (Vec<i64>, Vec<i64>)> = BTreeMap::new();
    for vote in votes.iter().filter(|v| v.survey_id == survey_id) {
        let entry = sides.entry(vote.vote_id).or_default();
        match vote.result {
            VoteResult::Win => entry.0.push(vote.contestant_id),
            VoteResult::Lose => entry.1.push(vote.contestant_id),
        }
    }

    sides
        .into_iter()
        .map(|(vote_id, (winners, losers))| {
            let malformed = |reason: String| PipelineError::MalformedVote { survey_id, vote_id, reason };
            match (winners.as_slice(), losers.as_slice()) {
                ([winner], [loser]) if winner == loser => {
                    Err(malformed(format!("contestant {winner} voted against themselves")))
                }
                ([winner], [loser]) => Ok(Matchup { winner: *winner, loser: *loser }),
                _ => Err(malformed(format!(
                    "expected one winner and one loser, found {} and {}",
                    winners.len(),
                    losers.len()
                ))),
            }
        })
        .collect()
}

/// Fold matchups into canonical per-pair tallies, sorted by (A, B).
pub fn tally_matchups(matchups: &[Matchup]) -> Vec<HeadToHeadTally> {
    let mut tallies: BTreeMap<(i64, i64), (u32, u32)> = BTreeMap::new();
    for m in matchups {
        let (a, b) = if m.winner < m.loser { (m.winner, m.loser) } else { (m.loser, m.winner) };
        let entry = tallies.entry((a, b)).or_insert((0, 0));
        entry.0 += 1;
        if m.winner == a {
            entry.1 += 1;
        }
    }
    tallies
        .into_iter()
        .map(|((contestant_a, contestant_b), (count, wins))| HeadToHeadTally {
            contestant_a,
            contestant_b,
            count,
            wins,
        })
        .collect()
}

/// Aggregate the most recent survey round. Empty input gives no tallies.
pub fn aggregate_votes(votes: &[VoteRecord]) -> Result<Vec<HeadToHeadTally>> {
    let Some(survey_id) = latest_survey(votes) else {
        return Ok(Vec::new());
    };
    let matchups = resolve_matchups(votes, survey_id)?;
    let tallies = tally_matchups(&matchups);
    tracing::debug!(survey_id, votes = matchups.len(), pairs = tallies.len(), "aggregated head-to-head votes");
    Ok(tallies)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Both records of one vote.
    fn vote(survey_id: u32, vote_id: i64, winner: i64, loser: i64) -> [VoteRecord; 2] {
        [
            VoteRecord { survey_id, vote_id, contestant_id: winner, result: VoteResult::Win },
            VoteRecord { survey_id, vote_id, contestant_id: loser, result: VoteResult::Lose },
        ]
    }

    #[test]
    fn test_three_vote_scenario() {
        const A: i64 = 10;
        const B: i64 = 20;
        let votes: Vec<VoteRecord> = [vote(1, 1, A, B), vote(1, 2, B, A), vote(1, 3, A, B)]
            .into_iter()
            .flatten()
            .collect();

        let tallies = aggregate_votes(&votes).unwrap();
        assert_eq!(tallies, vec![HeadToHeadTally { contestant_a: A, contestant_b: B, count: 3, wins: 2 }]);
        assert_eq!(tallies[0].wins_for(A), Some(2));
        assert_eq!(tallies[0].wins_for(B), Some(1));
        assert_eq!(tallies[0].wins_for(99), None);
    }

    #[test]
    fn test_excess_wins_have_no_split() {
        let tally = HeadToHeadTally { contestant_a: 1, contestant_b: 2, count: 1, wins: 3 };
        assert_eq!(tally.losses(), None);
        assert_eq!(tally.wins_for(1), None);
        assert_eq!(tally.wins_for(2), None);
    }

    #[test]
    fn test_direction_does_not_matter() {
        let forward: Vec<VoteRecord> = [vote(1, 1, 1, 2), vote(1, 2, 1, 2)].into_iter().flatten().collect();
        let backward: Vec<VoteRecord> = [vote(1, 1, 2, 1), vote(1, 2, 2, 1)].into_iter().flatten().collect();

        let f = aggregate_votes(&forward).unwrap();
        let b = aggregate_votes(&backward).unwrap();
        assert_eq!(f[0].count, b[0].count);
        assert_eq!(f[0].wins, 2);
        assert_eq!(b[0].wins, 0);
    }

    #[test]
    fn test_symmetry_across_many_pairs() {
        let mut votes = Vec::new();
        let mut vote_id = 0;
        for (winner, loser) in [(3, 1), (1, 3), (2, 3), (3, 2), (3, 2), (1, 2), (2, 1), (2, 1)] {
            vote_id += 1;
            votes.extend(vote(7, vote_id, winner, loser));
        }
        let tallies = aggregate_votes(&votes).unwrap();

        let total: u32 = tallies.iter().map(|t| t.count).sum();
        assert_eq!(total, 8, "every vote lands in exactly one tally");
        for t in &tallies {
            assert!(t.contestant_a < t.contestant_b);
            assert!(t.wins <= t.count);
            assert_eq!(
                t.wins_for(t.contestant_a).unwrap() + t.wins_for(t.contestant_b).unwrap(),
                t.count
            );
        }
        let pairs: Vec<(i64, i64)> = tallies.iter().map(|t| (t.contestant_a, t.contestant_b)).collect();
        assert_eq!(pairs, vec![(1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn test_only_latest_survey_counts() {
        let votes: Vec<VoteRecord> = [vote(1, 1, 1, 2), vote(1, 2, 1, 2), vote(2, 1, 2, 1)]
            .into_iter()
            .flatten()
            .collect();
        let tallies = aggregate_votes(&votes).unwrap();
        assert_eq!(tallies, vec![HeadToHeadTally { contestant_a: 1, contestant_b: 2, count: 1, wins: 0 }]);
    }

    #[test]
    fn test_malformed_vote_is_an_error() {
        let mut votes: Vec<VoteRecord> = vote(1, 1, 1, 2).to_vec();
        votes.push(VoteRecord { survey_id: 1, vote_id: 2, contestant_id: 3, result: VoteResult::Win });
        let err = aggregate_votes(&votes).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedVote { vote_id: 2, .. }));

        let self_vote: Vec<VoteRecord> = vote(1, 1, 4, 4).to_vec();
        assert!(aggregate_votes(&self_vote).is_err());
    }

    #[test]
    fn test_no_votes() {
        assert!(aggregate_votes(&[]).unwrap().is_empty());
    }
}
