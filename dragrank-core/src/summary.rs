/// Posterior summaries and next-episode predictions.
///
/// Everything here reads [`PosteriorSamples`] pooled over chains. Best/worst
/// probabilities only cover the active field of the latest episode; other
/// contestants get `None`.
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_QUANTILES;
use crate::placement::Placement;
use crate::posterior::PosteriorSamples;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankBy {
    #[default]
    Mean,
    Median,
}

impl FromStr for RankBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(RankBy::Mean),
            "median" => Ok(RankBy::Median),
            other => Err(format!("unknown rank statistic \"{other}\" (expected mean or median)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOptions {
    /// Probabilities in [0, 1].
    pub quantiles: Vec<f64>,
    pub rank_by: RankBy,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        SummaryOptions { quantiles: DEFAULT_QUANTILES.to_vec(), rank_by: RankBy::Mean }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilitySummary {
    pub contestant_id: i64,
    pub mean: f64,
    pub sd: f64,
    pub median: f64,
    /// One value per requested quantile, same order.
    pub quantiles: Vec<f64>,
    /// 1 = best.
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientSummary {
    pub predictor: String,
    pub mean: f64,
    pub sd: f64,
    pub quantiles: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub contestant_id: i64,
    pub name: Option<String>,
    pub mean: f64,
    pub sd: f64,
    pub quantiles: Vec<f64>,
    pub rank: usize,
    pub prob_best: Option<f64>,
    pub prob_worst: Option<f64>,
}

/// Linear-interpolated quantile of ascending `sorted`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

/// Mean and population standard deviation.
fn mean_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values
}

/// Per-contestant summaries in dense order, ranked by `options.rank_by`.
pub fn summarize_abilities(samples: &PosteriorSamples, options: &SummaryOptions) -> Vec<AbilitySummary> {
    let mut summaries: Vec<AbilitySummary> = samples
        .contestant_ids
        .iter()
        .enumerate()
        .map(|(pos, &contestant_id)| {
            let draws = sorted(samples.ability_of(pos));
            let (mean, sd) = mean_sd(&draws);
            AbilitySummary {
                contestant_id,
                mean,
                sd,
                median: quantile_sorted(&draws, 0.5),
                quantiles: options.quantiles.iter().map(|&q| quantile_sorted(&draws, q)).collect(),
                rank: 0,
            }
        })
        .collect();

    let key = |s: &AbilitySummary| match options.rank_by {
        RankBy::Mean => s.mean,
        RankBy::Median => s.median,
    };
    let mut order: Vec<usize> = (0..summaries.len()).collect();
    // Stable sort keeps dense order among ties.
    order.sort_by(|&a, &b| {
        key(&summaries[b]).partial_cmp(&key(&summaries[a])).unwrap_or(std::cmp::Ordering::Equal)
    });
    for (rank, pos) in order.into_iter().enumerate() {
        summaries[pos].rank = rank + 1;
    }
    summaries
}

pub fn summarize_coefficients(samples: &PosteriorSamples, quantiles: &[f64]) -> Vec<CoefficientSummary> {
    samples
        .predictors
        .iter()
        .enumerate()
        .map(|(k, predictor)| {
            let draws = sorted(samples.beta_of(k));
            let (mean, sd) = mean_sd(&draws);
            CoefficientSummary {
                predictor: predictor.clone(),
                mean,
                sd,
                quantiles: quantiles.iter().map(|&q| quantile_sorted(&draws, q)).collect(),
            }
        })
        .collect()
}

/// Latest competition episode with a modeled row, and the contestants still
/// in it: a non-ignored row there and no eliminated row there (ignored rows
/// count for elimination). Sorted by contestant id.
pub fn next_episode_field(placements: &[Placement]) -> Option<(u32, Vec<i64>)> {
    let latest = placements.iter().filter(|p| p.is_modeled()).map(|p| p.episode_id).max()?;
    let in_latest = || placements.iter().filter(move |p| p.episode_id == latest);

    let eliminated: BTreeSet<i64> = in_latest().filter(|p| p.eliminated).map(|p| p.contestant_id).collect();
    let field: BTreeSet<i64> = in_latest()
        .filter(|p| !p.ignored && !eliminated.contains(&p.contestant_id))
        .map(|p| p.contestant_id)
        .collect();
    Some((latest, field.into_iter().collect()))
}

/// Best and worst probabilities over `field`, keyed by contestant id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtremeProbabilities {
    pub best: BTreeMap<i64, f64>,
    pub worst: BTreeMap<i64, f64>,
}

/// Share of draws in which each field member has the highest (lowest)
/// ability. Tied draws are split equally. Field members without draws are
/// skipped; `None` when nothing is left or there are no draws.
pub fn extreme_probabilities(samples: &PosteriorSamples, field: &[i64]) -> Option<ExtremeProbabilities> {
    let members: Vec<(i64, usize)> = field.iter().filter_map(|&id| samples.position(id).map(|p| (id, p))).collect();
    let num_draws = samples.num_draws();
    if members.is_empty() || num_draws == 0 {
        return None;
    }

    let mut best = vec![0.0; members.len()];
    let mut worst = vec![0.0; members.len()];
    for draw in samples.ability_draws() {
        let values: Vec<f64> = members.iter().map(|&(_, pos)| draw[pos]).collect();
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);

        let top: Vec<usize> = (0..values.len()).filter(|&i| values[i] == max).collect();
        let bottom: Vec<usize> = (0..values.len()).filter(|&i| values[i] == min).collect();
        for &i in &top {
            best[i] += 1.0 / top.len() as f64;
        }
        for &i in &bottom {
            worst[i] += 1.0 / bottom.len() as f64;
        }
    }

    let n = num_draws as f64;
    Some(ExtremeProbabilities {
        best: members.iter().zip(&best).map(|(&(id, _), &b)| (id, b / n)).collect(),
        worst: members.iter().zip(&worst).map(|(&(id, _), &w)| (id, w / n)).collect(),
    })
}

/// Join ability summaries, names and next-episode probabilities.
/// Output is ordered by rank.
pub fn predict(
    samples: &PosteriorSamples,
    placements: &[Placement],
    names: &BTreeMap<i64, String>,
    options: &SummaryOptions,
) -> Vec<Prediction> {
    let summaries = summarize_abilities(samples, options);
    let extremes = next_episode_field(placements).and_then(|(episode_id, field)| {
        let probs = extreme_probabilities(samples, &field);
        tracing::debug!(episode_id, field = field.len(), scored = probs.is_some(), "next-episode field");
        probs
    });
    if extremes.is_none() {
        tracing::warn!("next-episode field is empty; best/worst probabilities unavailable");
    }

    let mut predictions: Vec<Prediction> = summaries
        .into_iter()
        .map(|s| Prediction {
            contestant_id: s.contestant_id,
            name: names.get(&s.contestant_id).cloned(),
            mean: s.mean,
            sd: s.sd,
            quantiles: s.quantiles,
            rank: s.rank,
            prob_best: extremes.as_ref().and_then(|e| e.best.get(&s.contestant_id).copied()),
            prob_worst: extremes.as_ref().and_then(|e| e.worst.get(&s.contestant_id).copied()),
        })
        .collect();
    predictions.sort_by_key(|p| p.rank);
    predictions
}
