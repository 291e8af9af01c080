/// Solver seam and the built-in MCMC solver.
///
/// [`AbilitySolver`] is what the pipeline talks to. [`GibbsSolver`] turns a
/// [`ModelInput`] into weighted pairwise outcomes, warm-starts from a
/// Bradley-Terry MLE and runs independent seeded chains in parallel.
use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::bradley_terry::BradleyTerry;
use crate::error::SolverError;
use crate::model_input::ModelInput;
use crate::model_spec::CompiledModel;
use crate::posterior::PosteriorSamples;
use crate::sampler::AbilitySampler;

/// `(winner, loser, weight)` over 0-based dense contestant positions.
pub type WeightedOutcome = (usize, usize, f64);

const MLE_MAX_ITERATIONS: usize = 200;

pub trait AbilitySolver {
    fn fit(&self, input: &ModelInput) -> Result<PosteriorSamples, SolverError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerOptions {
    pub chains: usize,
    /// Kept draws per chain.
    pub iterations: usize,
    /// Discarded sweeps per chain.
    pub burn_in: usize,
    /// Chain `c` is seeded with `seed + c`.
    pub seed: u64,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        SamplerOptions { chains: 4, iterations: 1000, burn_in: 500, seed: 1 }
    }
}

/// Check that every index and shape in `input` is consistent.
pub fn validate_input(input: &ModelInput) -> Result<(), SolverError> {
    let invalid = |msg: String| Err(SolverError::InvalidInput(msg));

    if input.c == 0 {
        return invalid("no contestants".into());
    }
    if input.contestant_ids.len() != input.c || input.x.len() != input.c {
        return invalid(format!(
            "C={} but {} contestant ids and {} covariate rows",
            input.c,
            input.contestant_ids.len(),
            input.x.len()
        ));
    }
    if input.predictors.len() != input.k {
        return invalid(format!("K={} but {} predictor names", input.k, input.predictors.len()));
    }
    if let Some(row) = input.x.iter().position(|r| r.len() != input.k || r.iter().any(|v| !v.is_finite())) {
        return invalid(format!("covariate row {} is not {} finite values", row + 1, input.k));
    }
    if input.contestant.len() != input.n || input.episode.len() != input.n || input.rank.len() != input.n {
        return invalid(format!("N={} but row arrays have different lengths", input.n));
    }
    if let Some(&bad) = input.contestant.iter().find(|&&c| c == 0 || c > input.c) {
        return invalid(format!("contestant index {bad} outside 1..={}", input.c));
    }
    if let Some(&bad) = input.episode.iter().find(|&&e| e == 0 || e > input.e) {
        return invalid(format!("episode index {bad} outside 1..={}", input.e));
    }
    if input.episode.windows(2).any(|w| w[1] < w[0]) {
        return invalid("rows are not grouped by episode".into());
    }
    for (name, counts) in [
        ("n_episode_winner", &input.n_episode_winner),
        ("n_episode_safe", &input.n_episode_safe),
        ("n_episode_bottom", &input.n_episode_bottom),
    ] {
        if counts.len() != input.e {
            return invalid(format!("{name} has {} entries, expected E={}", counts.len(), input.e));
        }
    }
    let rows_per_episode = rows_per_episode(input);
    for e in 0..input.e {
        let banded = input.n_episode_winner[e] + input.n_episode_safe[e] + input.n_episode_bottom[e];
        if banded > rows_per_episode[e] {
            return invalid(format!("episode {} has {banded} banded rows but only {} rows", e + 1, rows_per_episode[e]));
        }
    }

    if let Some(h2h) = &input.head_to_head {
        let n = h2h.n_pair;
        if h2h.pair_a.len() != n || h2h.pair_b.len() != n || h2h.count.len() != n || h2h.wins.len() != n {
            return invalid(format!("head-to-head arrays disagree with n_pair={n}"));
        }
        for i in 0..n {
            let (a, b) = (h2h.pair_a[i], h2h.pair_b[i]);
            if a == 0 || b == 0 || a > input.c || b > input.c || a == b {
                return invalid(format!("head-to-head pair {} has indices ({a}, {b})", i + 1));
            }
            if h2h.wins[i] > h2h.count[i] {
                return invalid(format!("head-to-head pair {} has more wins than votes", i + 1));
            }
        }
    }
    Ok(())
}

fn rows_per_episode(input: &ModelInput) -> Vec<usize> {
    let mut rows = vec![0usize; input.e];
    for &e in &input.episode {
        rows[e - 1] += 1;
    }
    rows
}

/// Band of the row at `position` within its episode: 0 winner, 1 safe,
/// 2 bottom, 3 out.
fn band_at(position: usize, winners: usize, safe: usize, bottom: usize) -> u8 {
    if position < winners {
        0
    } else if position < winners + safe {
        1
    } else if position < winners + safe + bottom {
        2
    } else {
        3
    }
}

/// Flatten episode bands and head-to-head tallies into merged weighted
/// outcomes. Assumes `input` passed [`validate_input`].
pub fn collect_outcomes(input: &ModelInput, head_to_head_weight: f64) -> Vec<WeightedOutcome> {
    let mut merged: BTreeMap<(usize, usize), f64> = BTreeMap::new();

    let mut start = 0;
    while start < input.n {
        let e = input.episode[start];
        let end = start + input.episode[start..].iter().take_while(|&&x| x == e).count();
        let (w, s, b) = (input.n_episode_winner[e - 1], input.n_episode_safe[e - 1], input.n_episode_bottom[e - 1]);

        for i in start..end {
            let band_i = band_at(i - start, w, s, b);
            for j in (i + 1)..end {
                if band_i < band_at(j - start, w, s, b) {
                    let key = (input.contestant[i] - 1, input.contestant[j] - 1);
                    *merged.entry(key).or_insert(0.0) += 1.0;
                }
            }
        }
        start = end;
    }

    if let Some(h2h) = &input.head_to_head {
        if head_to_head_weight > 0.0 {
            for i in 0..h2h.n_pair {
                let (a, b) = (h2h.pair_a[i] - 1, h2h.pair_b[i] - 1);
                let wins_a = h2h.wins[i];
                let wins_b = h2h.count[i].saturating_sub(wins_a);
                if wins_a > 0 {
                    *merged.entry((a, b)).or_insert(0.0) += wins_a as f64 * head_to_head_weight;
                }
                if wins_b > 0 {
                    *merged.entry((b, a)).or_insert(0.0) += wins_b as f64 * head_to_head_weight;
                }
            }
        }
    }

    merged.into_iter().map(|((winner, loser), weight)| (winner, loser, weight)).collect()
}

pub struct GibbsSolver {
    model: CompiledModel,
    options: SamplerOptions,
}

impl GibbsSolver {
    pub fn new(model: CompiledModel, options: SamplerOptions) -> Self {
        GibbsSolver { model, options }
    }

    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }
}

impl AbilitySolver for GibbsSolver {
    fn fit(&self, input: &ModelInput) -> Result<PosteriorSamples, SolverError> {
        let opts = self.options;
        if opts.chains == 0 || opts.iterations == 0 {
            return Err(SolverError::InvalidInput(format!(
                "need at least one chain and one iteration (chains={}, iterations={})",
                opts.chains, opts.iterations
            )));
        }
        validate_input(input)?;

        let spec = &self.model.spec;
        let outcomes = collect_outcomes(input, spec.head_to_head_weight);

        let mut mle = BradleyTerry::new(input.c, &outcomes, spec.regularization_strength);
        mle.calculate_scores(MLE_MAX_ITERATIONS);
        let start = mle.centered_log_scores();

        tracing::info!(
            model = %spec.name,
            contestants = input.c,
            outcomes = outcomes.len(),
            chains = opts.chains,
            iterations = opts.iterations,
            burn_in = opts.burn_in,
            "sampling abilities"
        );

        let chains = (0..opts.chains)
            .into_par_iter()
            .map(|chain| {
                let mut rng = SmallRng::seed_from_u64(opts.seed.wrapping_add(chain as u64));
                let mut sampler = AbilitySampler::new(input.x.clone(), &outcomes, spec);
                sampler.set_abilities(&start);
                let draws = sampler.run(opts.burn_in, opts.iterations, chain, &mut rng)?;
                tracing::debug!(chain, "chain finished");
                Ok(draws)
            })
            .collect::<Result<Vec<_>, SolverError>>()?;

        PosteriorSamples::new(input.contestant_ids.clone(), input.predictors.clone(), chains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_input::HeadToHeadArrays;
    use crate::model_spec::{compile, DEFAULT_MODEL_SPEC};

    /// One episode per entry; each entry lists dense contestant indices best
    /// to worst with (winners, safe, bottom) counts.
    fn input(c: usize, episodes: &[(Vec<usize>, (usize, usize, usize))]) -> ModelInput {
        let mut contestant = Vec::new();
        let mut episode = Vec::new();
        let mut rank = Vec::new();
        let mut n_episode_contestant = Vec::new();
        let (mut winners, mut safe, mut bottom) = (Vec::new(), Vec::new(), Vec::new());
        for (e, (rows, (w, s, b))) in episodes.iter().enumerate() {
            for (pos, &ci) in rows.iter().enumerate() {
                contestant.push(ci);
                episode.push(e + 1);
                rank.push((pos + 1) as u8);
            }
            n_episode_contestant.push(rows.len());
            winners.push(*w);
            safe.push(*s);
            bottom.push(*b);
        }
        ModelInput {
            n: contestant.len(),
            k: 1,
            e: episodes.len(),
            c,
            predictors: vec!["age_z".into()],
            x: (0..c).map(|i| vec![i as f64 * 0.1]).collect(),
            contestant,
            episode,
            rank,
            n_episode_contestant,
            n_rank: 6,
            episode_rank_counts: vec![vec![0; 6]; episodes.len()],
            n_episode_winner: winners,
            n_episode_safe: safe,
            n_episode_bottom: bottom,
            head_to_head: None,
            contestant_ids: (1..=c as i64).map(|i| i * 100).collect(),
            episode_ids: (1..=episodes.len() as u32).collect(),
        }
    }

    fn solver(options: SamplerOptions) -> GibbsSolver {
        GibbsSolver::new(compile(DEFAULT_MODEL_SPEC).unwrap(), options)
    }

    fn quick() -> SamplerOptions {
        SamplerOptions { chains: 2, iterations: 200, burn_in: 100, seed: 42 }
    }

    #[test]
    fn test_outcomes_follow_bands() {
        // winner, safe, safe, bottom, out
        let inp = input(5, &[(vec![1, 2, 3, 4, 5], (1, 2, 1))]);
        let outcomes = collect_outcomes(&inp, 1.0);

        let pairs: Vec<(usize, usize)> = outcomes.iter().map(|&(w, l, _)| (w, l)).collect();
        assert!(pairs.contains(&(0, 1)));
        assert!(pairs.contains(&(0, 4)));
        assert!(pairs.contains(&(3, 4)));
        // Same band: no outcome either way.
        assert!(!pairs.contains(&(1, 2)));
        assert!(!pairs.contains(&(2, 1)));
        assert_eq!(outcomes.len(), 9);
    }

    #[test]
    fn test_outcomes_merge_across_episodes_and_votes() {
        let mut inp = input(2, &[(vec![1, 2], (1, 0, 1)), (vec![1, 2], (1, 0, 1))]);
        inp.head_to_head = Some(HeadToHeadArrays { n_pair: 1, pair_a: vec![1], pair_b: vec![2], count: vec![3], wins: vec![1] });

        let outcomes = collect_outcomes(&inp, 0.5);
        assert_eq!(outcomes, vec![(0, 1, 2.5), (1, 0, 1.0)]);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let inp = input(4, &[(vec![1, 2, 3, 4], (1, 2, 1)), (vec![2, 1, 4, 3], (1, 2, 1))]);
        let a = solver(quick()).fit(&inp).unwrap();
        let b = solver(quick()).fit(&inp).unwrap();
        assert_eq!(a, b);

        let c = solver(SamplerOptions { seed: 43, ..quick() }).fit(&inp).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_posterior_shape() {
        let inp = input(3, &[(vec![1, 2, 3], (1, 1, 1))]);
        let post = solver(quick()).fit(&inp).unwrap();
        assert_eq!(post.num_chains(), 2);
        assert_eq!(post.num_draws(), 400);
        assert_eq!(post.contestant_ids, vec![100, 200, 300]);
        assert_eq!(post.predictors, vec!["age_z".to_string()]);
    }

    #[test]
    fn test_consistent_winner_ranks_first() {
        let episodes: Vec<(Vec<usize>, (usize, usize, usize))> = (0..8).map(|_| (vec![1, 2, 3], (1, 1, 1))).collect();
        let inp = input(3, &episodes);
        let post = solver(SamplerOptions { chains: 2, iterations: 400, burn_in: 200, seed: 5 }).fit(&inp).unwrap();

        let means: Vec<f64> = (0..3)
            .map(|i| {
                let d = post.ability_of(i);
                d.iter().sum::<f64>() / d.len() as f64
            })
            .collect();
        assert!(means[0] > means[1] && means[1] > means[2], "{means:?}");
    }

    #[test]
    fn test_invalid_input_rejected() {
        let mut inp = input(2, &[(vec![1, 2], (1, 0, 1))]);
        inp.contestant[1] = 3;
        assert!(matches!(solver(quick()).fit(&inp), Err(SolverError::InvalidInput(_))));

        let mut inp = input(2, &[(vec![1, 2], (1, 0, 1))]);
        inp.x.pop();
        assert!(validate_input(&inp).is_err());

        let mut inp = input(2, &[(vec![1, 2], (2, 1, 0))]);
        assert!(validate_input(&inp).is_err());
        inp.n_episode_safe[0] = 0;
        assert!(validate_input(&inp).is_ok());

        let inp = input(2, &[(vec![1, 2], (1, 0, 1))]);
        let no_chains = solver(SamplerOptions { chains: 0, ..quick() });
        assert!(no_chains.fit(&inp).is_err());
    }
}
