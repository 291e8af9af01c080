/// Contestant feature builder.
///
/// Derives the per-contestant covariates the solver regresses ability on:
/// standardized age, standardized follower counts, within-season follower
/// rank, and a hometown indicator. Every derived value is finite; undefined
/// scores become the configured fallback.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_REFERENCE_CITIES, NEUTRAL_FALLBACK, STDEV_EPSILON};
use crate::episodes::EpisodeIndex;
use crate::error::PipelineError;
use crate::types::{ContestantRecord, SocialMediaRecord};

/// How to pick one follower count per contestant from many observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FollowerPolicy {
    /// Earliest observation ever recorded.
    #[default]
    Earliest,
    /// Latest observation strictly before the contestant's season premiere.
    LatestBeforeSeasonStart,
}

impl FromStr for FollowerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earliest" => Ok(FollowerPolicy::Earliest),
            "latest-before-season-start" | "latest-before-season" => {
                Ok(FollowerPolicy::LatestBeforeSeasonStart)
            }
            other => Err(format!(
                "unknown follower policy \"{other}\" (use \"earliest\" or \"latest-before-season-start\")"
            )),
        }
    }
}

/// Population a score is standardized against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StandardizeScope {
    #[default]
    Season,
    Global,
}

impl FromStr for StandardizeScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "season" => Ok(StandardizeScope::Season),
            "global" => Ok(StandardizeScope::Global),
            other => Err(format!("unknown standardize scope \"{other}\" (use \"season\" or \"global\")")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub follower_policy: FollowerPolicy,
    pub scope: StandardizeScope,
    /// Standardized value for missing entries and undefined groups.
    pub fallback: f64,
    pub reference_cities: BTreeSet<String>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            follower_policy: FollowerPolicy::default(),
            scope: StandardizeScope::default(),
            fallback: NEUTRAL_FALLBACK,
            reference_cities: DEFAULT_REFERENCE_CITIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A derived covariate the model can use as a predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Covariate {
    AgeZ,
    FollowersZ,
    TwitterRank,
    IsReferenceCity,
}

impl Covariate {
    pub fn name(&self) -> &'static str {
        match self {
            Covariate::AgeZ => "age_z",
            Covariate::FollowersZ => "followers_z",
            Covariate::TwitterRank => "twitter_rank",
            Covariate::IsReferenceCity => "is_reference_city",
        }
    }
}

impl FromStr for Covariate {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "age_z" => Ok(Covariate::AgeZ),
            "followers_z" | "followers_twitter_z" => Ok(Covariate::FollowersZ),
            "twitter_rank" => Ok(Covariate::TwitterRank),
            "is_reference_city" | "is_ny" => Ok(Covariate::IsReferenceCity),
            other => Err(PipelineError::UnknownPredictor(other.to_string())),
        }
    }
}

impl fmt::Display for Covariate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One contestant-season with raw and derived covariates.
#[derive(Debug, Clone, PartialEq)]
pub struct ContestantFeatures {
    pub contestant_id: i64,
    pub season: u32,
    pub name: Option<String>,
    pub age: Option<f64>,
    /// Representative follower count under the configured policy.
    pub followers: Option<f64>,
    pub age_z: f64,
    pub followers_z: f64,
    pub twitter_rank: f64,
    pub is_reference_city: f64,
}

impl ContestantFeatures {
    pub fn value(&self, covariate: Covariate) -> f64 {
        match covariate {
            Covariate::AgeZ => self.age_z,
            Covariate::FollowersZ => self.followers_z,
            Covariate::TwitterRank => self.twitter_rank,
            Covariate::IsReferenceCity => self.is_reference_city,
        }
    }
}

/// Covariates keyed by (contestant id, season).
#[derive(Debug, Clone, Default)]
pub struct CovariateTable {
    rows: BTreeMap<(i64, u32), ContestantFeatures>,
}

impl CovariateTable {
    pub fn get(&self, contestant_id: i64, season: u32) -> Option<&ContestantFeatures> {
        self.rows.get(&(contestant_id, season))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContestantFeatures> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Mean and sample standard deviation of the present values in a group.
fn group_stats(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stdev = variance.sqrt();
    if stdev.is_finite() && stdev > STDEV_EPSILON {
        Some((mean, stdev))
    } else {
        None
    }
}

/// Group-wise z-scores. `values[i]` belongs to group `groups[i]`.
///
/// Missing values do not count towards group statistics and come out as
/// `fallback`. Groups with fewer than two present values or zero variance
/// yield `fallback` for every member.
pub fn standardize<G: Ord + Clone>(values: &[Option<f64>], groups: &[G], fallback: f64) -> Vec<f64> {
    assert_eq!(values.len(), groups.len(), "values and groups must align");

    let mut members: BTreeMap<G, Vec<f64>> = BTreeMap::new();
    for (value, group) in values.iter().zip(groups) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            members.entry(group.clone()).or_default().push(v);
        }
    }
    let stats: BTreeMap<G, (f64, f64)> = members
        .into_iter()
        .filter_map(|(g, vals)| group_stats(&vals).map(|s| (g, s)))
        .collect();

    values
        .iter()
        .zip(groups)
        .map(|(value, group)| match (value.filter(|v| v.is_finite()), stats.get(group)) {
            (Some(v), Some(&(mean, stdev))) => (v - mean) / stdev,
            _ => fallback,
        })
        .collect()
}

/// Rank within each group, 1 = smallest, ties get the average of their
/// positions. Missing values stay missing.
pub fn average_rank_within_groups<G: Ord + Clone>(values: &[Option<f64>], groups: &[G]) -> Vec<Option<f64>> {
    assert_eq!(values.len(), groups.len(), "values and groups must align");

    let mut members: BTreeMap<G, Vec<(f64, usize)>> = BTreeMap::new();
    for (i, (value, group)) in values.iter().zip(groups).enumerate() {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            members.entry(group.clone()).or_default().push((v, i));
        }
    }

    let mut ranks = vec![None; values.len()];
    for (_, mut entries) in members {
        entries.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut start = 0;
        while start < entries.len() {
            let mut end = start + 1;
            while end < entries.len() && entries[end].0 == entries[start].0 {
                end += 1;
            }
            // Positions start+1 ..= end share their average.
            let average = (start + 1 + end) as f64 / 2.0;
            for &(_, i) in &entries[start..end] {
                ranks[i] = Some(average);
            }
            start = end;
        }
    }
    ranks
}

/// Pick one follower count per (contestant id, season).
///
/// Observations without a follower count are dropped first. Under
/// `LatestBeforeSeasonStart`, contestant-seasons whose season has no known
/// start date get no value.
pub fn representative_followers(
    observations: &[SocialMediaRecord],
    contestants: &[ContestantRecord],
    season_starts: &BTreeMap<u32, NaiveDate>,
    policy: FollowerPolicy,
) -> BTreeMap<(i64, u32), f64> {
    let mut by_contestant: BTreeMap<i64, Vec<&SocialMediaRecord>> = BTreeMap::new();
    for obs in observations.iter().filter(|o| o.followers.is_some_and(f64::is_finite)) {
        by_contestant.entry(obs.contestant_id).or_default().push(obs);
    }

    let mut chosen = BTreeMap::new();
    for contestant in contestants {
        let Some(history) = by_contestant.get(&contestant.contestant_id) else {
            continue;
        };
        let pick = match policy {
            // First of the earliest timestamps, so ties resolve by input order.
            FollowerPolicy::Earliest => history
                .iter()
                .copied()
                .reduce(|best, o| if o.timestamp < best.timestamp { o } else { best }),
            FollowerPolicy::LatestBeforeSeasonStart => {
                let Some(start) = season_starts.get(&contestant.season) else {
                    continue;
                };
                history
                    .iter()
                    .copied()
                    .filter(|o| o.timestamp.date() < *start)
                    .reduce(|best, o| if o.timestamp > best.timestamp { o } else { best })
            }
        };
        if let Some(followers) = pick.and_then(|o| o.followers) {
            chosen.insert((contestant.contestant_id, contestant.season), followers);
        }
    }
    chosen
}

/// Build the covariate table. A repeated (id, season) row keeps its first occurrence.
pub fn build_features(
    contestants: &[ContestantRecord],
    social_media: &[SocialMediaRecord],
    episodes: &EpisodeIndex,
    config: &FeatureConfig,
) -> CovariateTable {
    let mut seen = BTreeSet::new();
    let unique: Vec<&ContestantRecord> = contestants
        .iter()
        .filter(|c| seen.insert((c.contestant_id, c.season)))
        .collect();
    if unique.len() < contestants.len() {
        tracing::warn!(
            duplicates = contestants.len() - unique.len(),
            "duplicate contestant rows ignored"
        );
    }
    let owned: Vec<ContestantRecord> = unique.iter().map(|c| (*c).clone()).collect();

    let followers = representative_followers(
        social_media,
        &owned,
        episodes.season_starts(),
        config.follower_policy,
    );

    let seasons: Vec<u32> = owned.iter().map(|c| c.season).collect();
    let scope: Vec<u32> = match config.scope {
        StandardizeScope::Season => seasons.clone(),
        StandardizeScope::Global => vec![0; owned.len()],
    };

    let ages: Vec<Option<f64>> = owned.iter().map(|c| c.age).collect();
    let follower_values: Vec<Option<f64>> = owned
        .iter()
        .map(|c| followers.get(&(c.contestant_id, c.season)).copied())
        .collect();

    let age_z = standardize(&ages, &scope, config.fallback);
    let followers_z = standardize(&follower_values, &scope, config.fallback);
    let follower_ranks = average_rank_within_groups(&follower_values, &seasons);
    let twitter_rank = standardize(&follower_ranks, &scope, config.fallback);

    let mut table = CovariateTable::default();
    for (i, c) in owned.into_iter().enumerate() {
        let is_reference_city = c
            .hometown_city
            .as_deref()
            .map(|city| config.reference_cities.contains(city.trim()))
            .unwrap_or(false);
        table.rows.insert(
            (c.contestant_id, c.season),
            ContestantFeatures {
                contestant_id: c.contestant_id,
                season: c.season,
                followers: follower_values[i],
                age_z: age_z[i],
                followers_z: followers_z[i],
                twitter_rank: twitter_rank[i],
                is_reference_city: if is_reference_city { 1.0 } else { 0.0 },
                name: c.name,
                age: c.age,
            },
        );
    }

    tracing::debug!(
        contestants = table.len(),
        with_followers = followers.len(),
        policy = ?config.follower_policy,
        "built contestant features"
    );
    table
}
