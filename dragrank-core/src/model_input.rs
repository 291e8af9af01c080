/// Model input assembler.
///
/// Packs modeled placements, covariates and head-to-head tallies into the
/// numeric contract the solver consumes. Contestant and episode indices are
/// dense and 1-based. Rows are sorted by (episode, rank) so each episode's
/// rows are contiguous and ordered best to worst.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::features::{Covariate, CovariateTable};
use crate::head_to_head::HeadToHeadTally;
use crate::placement::{Band, Placement, RankScheme};
use crate::types::ContestantIndex;

/// Head-to-head tallies re-indexed onto dense contestant indices,
/// oriented so `pair_a[i] < pair_b[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadToHeadArrays {
    pub n_pair: usize,
    pub pair_a: Vec<usize>,
    pub pair_b: Vec<usize>,
    pub count: Vec<u32>,
    /// Wins for `pair_a`.
    pub wins: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInput {
    /// Ranking rows.
    #[serde(rename = "N")]
    pub n: usize,
    /// Predictors.
    #[serde(rename = "K")]
    pub k: usize,
    /// Episodes.
    #[serde(rename = "E")]
    pub e: usize,
    /// Contestants.
    #[serde(rename = "C")]
    pub c: usize,
    pub predictors: Vec<String>,
    /// Covariates, `x[contestant - 1][predictor]`.
    #[serde(rename = "X")]
    pub x: Vec<Vec<f64>>,
    /// Dense contestant index per row.
    pub contestant: Vec<usize>,
    /// Dense episode index per row.
    pub episode: Vec<usize>,
    /// Ordinal rank per row.
    pub rank: Vec<u8>,
    /// Distinct contestants per episode.
    pub n_episode_contestant: Vec<usize>,
    /// Number of rank levels in the scheme.
    pub n_rank: usize,
    /// `episode_rank_counts[e][r - 1]` = rows of episode e with rank r.
    pub episode_rank_counts: Vec<Vec<usize>>,
    pub n_episode_winner: Vec<usize>,
    pub n_episode_safe: Vec<usize>,
    pub n_episode_bottom: Vec<usize>,
    pub head_to_head: Option<HeadToHeadArrays>,
    /// Contestant id for each dense index (`contestant_ids[i - 1]`).
    pub contestant_ids: Vec<i64>,
    /// Episode id for each dense episode index.
    pub episode_ids: Vec<u32>,
}

impl ModelInput {
    /// Rebuild the dense contestant mapping.
    pub fn contestant_index(&self) -> ContestantIndex {
        ContestantIndex::from_ids(self.contestant_ids.iter().copied())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ModelInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "N={} K={} E={} C={} predictors=[{}] pairs={}",
            self.n,
            self.k,
            self.e,
            self.c,
            self.predictors.join(", "),
            self.head_to_head.as_ref().map(|h| h.n_pair).unwrap_or(0),
        )
    }
}

/// Map canonical tallies onto dense indices. Tallies naming a contestant
/// outside the index are dropped; a tally with more wins than votes is an error.
pub fn reindex_tallies(tallies: &[HeadToHeadTally], index: &ContestantIndex) -> Result<HeadToHeadArrays> {
    let mut arrays = HeadToHeadArrays { n_pair: 0, pair_a: Vec::new(), pair_b: Vec::new(), count: Vec::new(), wins: Vec::new() };
    let mut dropped = 0usize;

    for t in tallies {
        let losses = t.losses().ok_or(PipelineError::InvalidTally {
            contestant_a: t.contestant_a,
            contestant_b: t.contestant_b,
            count: t.count,
            wins: t.wins,
        })?;
        let (Some(ia), Some(ib)) = (index.to_idx(t.contestant_a), index.to_idx(t.contestant_b)) else {
            dropped += 1;
            continue;
        };
        // Dense order can disagree with id order; flip wins with the pair.
        let (a, b, wins) = if ia < ib { (ia, ib, t.wins) } else { (ib, ia, losses) };
        arrays.pair_a.push(a);
        arrays.pair_b.push(b);
        arrays.count.push(t.count);
        arrays.wins.push(wins);
    }
    arrays.n_pair = arrays.pair_a.len();

    if dropped > 0 {
        tracing::warn!(dropped, kept = arrays.n_pair, "head-to-head pairs reference contestants outside the modeled rankings");
    }
    Ok(arrays)
}

/// Assemble the solver input from normalized placements.
///
/// Only modeled rows (competition episodes, not ignored) are used. Every
/// modeled (contestant, season) must have a covariate row.
pub fn assemble(
    placements: &[Placement],
    covariates: &CovariateTable,
    tallies: Option<&[HeadToHeadTally]>,
    scheme: &RankScheme,
    predictors: &[Covariate],
    fallback: f64,
) -> Result<ModelInput> {
    let mut rows: Vec<&Placement> = placements.iter().filter(|p| p.is_modeled()).collect();
    if rows.is_empty() {
        return Err(PipelineError::EmptyRankings);
    }
    // Stable: equal (episode, rank) keep input order.
    rows.sort_by_key(|p| (p.episode_id, p.rank));

    for p in &rows {
        if covariates.get(p.contestant_id, p.season).is_none() {
            return Err(PipelineError::MissingCovariates { contestant_id: p.contestant_id, season: p.season });
        }
    }

    let index = ContestantIndex::from_ids(rows.iter().map(|p| p.contestant_id));
    let episode_ids: Vec<u32> = rows.iter().map(|p| p.episode_id).collect::<BTreeSet<_>>().into_iter().collect();
    let episode_pos: BTreeMap<u32, usize> = episode_ids.iter().enumerate().map(|(i, &id)| (id, i + 1)).collect();

    // Covariates come from each contestant's first modeled row.
    let mut first_season: BTreeMap<i64, u32> = BTreeMap::new();
    for p in &rows {
        first_season.entry(p.contestant_id).or_insert(p.season);
    }
    let x: Vec<Vec<f64>> = index
        .ids()
        .iter()
        .map(|id| -> Result<Vec<f64>> {
            let season = first_season[id];
            let features = covariates
                .get(*id, season)
                .ok_or(PipelineError::MissingCovariates { contestant_id: *id, season })?;
            Ok(predictors
                .iter()
                .map(|&c| {
                    let v = features.value(c);
                    if v.is_finite() { v } else { fallback }
                })
                .collect())
        })
        .collect::<Result<_>>()?;

    let e = episode_ids.len();
    let n_rank = scheme.max_rank() as usize;
    let bands = scheme.bands();
    let mut field: Vec<BTreeSet<i64>> = vec![BTreeSet::new(); e];
    let mut episode_rank_counts = vec![vec![0usize; n_rank]; e];
    let mut n_episode_winner = vec![0usize; e];
    let mut n_episode_safe = vec![0usize; e];
    let mut n_episode_bottom = vec![0usize; e];

    let mut contestant = Vec::with_capacity(rows.len());
    let mut episode = Vec::with_capacity(rows.len());
    let mut rank = Vec::with_capacity(rows.len());

    for p in &rows {
        let ep = episode_pos[&p.episode_id];
        let slot = ep - 1;
        field[slot].insert(p.contestant_id);
        if let Some(count) = (p.rank as usize).checked_sub(1).and_then(|r| episode_rank_counts[slot].get_mut(r)) {
            *count += 1;
        }
        match bands.band(p.rank) {
            Band::Winner => n_episode_winner[slot] += 1,
            Band::Safe => n_episode_safe[slot] += 1,
            Band::Bottom => n_episode_bottom[slot] += 1,
            Band::Out => {}
        }
        // Every id in `rows` was inserted into the index above.
        contestant.push(index.to_idx(p.contestant_id).unwrap_or_default());
        episode.push(ep);
        rank.push(p.rank);
    }

    let head_to_head = tallies.map(|t| reindex_tallies(t, &index)).transpose()?;

    let input = ModelInput {
        n: rows.len(),
        k: predictors.len(),
        e,
        c: index.len(),
        predictors: predictors.iter().map(|c| c.name().to_string()).collect(),
        x,
        contestant,
        episode,
        rank,
        n_episode_contestant: field.iter().map(BTreeSet::len).collect(),
        n_rank,
        episode_rank_counts,
        n_episode_winner,
        n_episode_safe,
        n_episode_bottom,
        head_to_head,
        contestant_ids: index.ids().to_vec(),
        episode_ids,
    };
    tracing::debug!(%input, "assembled model input");
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episodes::index_episodes;
    use crate::features::{build_features, FeatureConfig};
    use crate::placement::normalize_placements;
    use crate::types::{ContestantRecord, EpisodeRecord, RankingRecord};
    use chrono::NaiveDate;

    struct Fixture {
        placements: Vec<Placement>,
        covariates: CovariateTable,
    }

    fn fixture(rows: &[(u32, i64, &str)]) -> Fixture {
        let episodes = index_episodes(&[
            EpisodeRecord { season: 1, episode: 1, air_date: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(), episode_type: "Competition".into() },
            EpisodeRecord { season: 1, episode: 2, air_date: NaiveDate::from_ymd_opt(2019, 1, 8).unwrap(), episode_type: "Competition".into() },
            EpisodeRecord { season: 1, episode: 3, air_date: NaiveDate::from_ymd_opt(2019, 1, 15).unwrap(), episode_type: "Reunion".into() },
        ]);
        let rankings: Vec<RankingRecord> = rows
            .iter()
            .map(|&(episode, contestant_id, label)| RankingRecord { season: 1, episode, contestant_id, placement: label.into() })
            .collect();
        let contestants: Vec<ContestantRecord> = (1..=6)
            .map(|id| ContestantRecord {
                contestant_id: id,
                season: 1,
                name: None,
                age: Some(20.0 + id as f64),
                hometown_city: Some(if id % 2 == 0 { "New York" } else { "Miami" }.into()),
            })
            .collect();
        Fixture {
            placements: normalize_placements(&rankings, &episodes, &RankScheme::six_level()).unwrap(),
            covariates: build_features(&contestants, &[], &episodes, &FeatureConfig::default()),
        }
    }

    fn build(f: &Fixture, tallies: Option<&[HeadToHeadTally]>) -> Result<ModelInput> {
        assemble(
            &f.placements,
            &f.covariates,
            tallies,
            &RankScheme::six_level(),
            &[Covariate::AgeZ, Covariate::IsReferenceCity],
            0.0,
        )
    }

    #[test]
    fn test_double_win_episode_counts() {
        let f = fixture(&[(1, 1, "WIN"), (1, 2, "SAFE"), (1, 3, "WIN"), (1, 4, "BTM2"), (1, 5, "ELIM")]);
        let input = build(&f, None).unwrap();

        assert_eq!(input.e, 1);
        assert_eq!(input.n_episode_contestant, vec![5]);
        assert_eq!(input.episode_rank_counts[0][0], 2, "two winners");
        assert_eq!(input.episode_rank_counts[0], vec![2, 0, 1, 0, 1, 1]);
        assert_eq!(input.n_episode_winner, vec![2]);
        assert_eq!(input.n_episode_safe, vec![1]);
        assert_eq!(input.n_episode_bottom, vec![1]);
    }

    #[test]
    fn test_rows_sorted_and_dense_indices() {
        let f = fixture(&[
            (2, 3, "ELIM"),
            (2, 1, "WIN"),
            (1, 4, "SAFE"),
            (1, 3, "WIN"),
            (2, 4, "SAFE"),
            (1, 1, "BTM2"),
        ]);
        let input = build(&f, None).unwrap();

        // Episode 1: 3 (WIN), 4 (SAFE), 1 (BTM2); episode 2: 1 (WIN), 4 (SAFE), 3 (ELIM).
        assert_eq!(input.contestant_ids, vec![3, 4, 1]);
        assert_eq!(input.contestant, vec![1, 2, 3, 3, 2, 1]);
        assert_eq!(input.episode, vec![1, 1, 1, 2, 2, 2]);
        assert_eq!(input.rank, vec![1, 3, 5, 1, 3, 6]);
        assert_eq!(input.c, 3);
        assert_eq!(input.n, 6);

        let mut dense: Vec<usize> = input.contestant.clone();
        dense.sort_unstable();
        dense.dedup();
        assert_eq!(dense, (1..=input.c).collect::<Vec<_>>());
    }

    #[test]
    fn test_covariate_matrix_follows_dense_order() {
        let f = fixture(&[(1, 2, "WIN"), (1, 5, "SAFE"), (1, 3, "ELIM")]);
        let input = build(&f, None).unwrap();
        assert_eq!(input.k, 2);
        assert_eq!(input.predictors, vec!["age_z", "is_reference_city"]);
        assert_eq!(input.x.len(), 3);
        // Contestant 2 is from New York, 5 and 3 are not.
        assert_eq!(input.x[0][1], 1.0);
        assert_eq!(input.x[1][1], 0.0);
        let expected = f.covariates.get(5, 1).unwrap().age_z;
        assert_eq!(input.x[1][0], expected);
    }

    #[test]
    fn test_ignored_and_non_competition_rows_are_excluded() {
        let f = fixture(&[(1, 1, "WIN"), (1, 2, "Guest"), (1, 3, "SAFE"), (3, 4, "WIN")]);
        let input = build(&f, None).unwrap();
        assert_eq!(input.contestant_ids, vec![1, 3]);
        assert_eq!(input.e, 1);
    }

    #[test]
    fn test_missing_covariates_is_fatal() {
        let f = fixture(&[(1, 1, "WIN"), (1, 42, "SAFE")]);
        let err = build(&f, None).unwrap_err();
        assert!(matches!(err, PipelineError::MissingCovariates { contestant_id: 42, season: 1 }));
    }

    #[test]
    fn test_empty_rankings() {
        let f = fixture(&[(1, 1, "Guest")]);
        assert!(matches!(build(&f, None), Err(PipelineError::EmptyRankings)));
    }

    #[test]
    fn test_tallies_reoriented_onto_dense_indices() {
        // Dense order is 3, 1 (by appearance), the reverse of id order.
        let f = fixture(&[(1, 3, "WIN"), (1, 1, "SAFE")]);
        let tallies = vec![
            HeadToHeadTally { contestant_a: 1, contestant_b: 3, count: 5, wins: 4 },
            HeadToHeadTally { contestant_a: 1, contestant_b: 99, count: 2, wins: 1 },
        ];
        let input = build(&f, Some(&tallies)).unwrap();
        let h2h = input.head_to_head.unwrap();

        assert_eq!(h2h.n_pair, 1);
        assert_eq!((h2h.pair_a[0], h2h.pair_b[0]), (1, 2));
        assert_eq!(h2h.count[0], 5);
        // Contestant 3 (dense 1) won 5 - 4 = 1 vote.
        assert_eq!(h2h.wins[0], 1);
    }

    #[test]
    fn test_tally_with_excess_wins_is_rejected() {
        let f = fixture(&[(1, 3, "WIN"), (1, 1, "SAFE")]);
        let tallies = vec![HeadToHeadTally { contestant_a: 1, contestant_b: 3, count: 2, wins: 5 }];
        let err = build(&f, Some(&tallies)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTally { count: 2, wins: 5, .. }));
    }

    #[test]
    fn test_assembly_is_byte_identical_across_runs() {
        let rows = [(1, 1, "WIN"), (1, 2, "HIGH"), (1, 3, "LOW"), (2, 2, "WIN"), (2, 1, "ELIM")];
        let first = build(&fixture(&rows), None).unwrap().to_json().unwrap();
        let second = build(&fixture(&rows), None).unwrap().to_json().unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"N\": 5"));
    }

    #[test]
    fn test_display_summary() {
        let input = build(&fixture(&[(1, 1, "WIN"), (1, 2, "ELIM")]), None).unwrap();
        assert_eq!(input.to_string(), "N=2 K=2 E=1 C=2 predictors=[age_z, is_reference_city] pairs=0");
    }
}
