/// Metropolis-within-Gibbs sampler for the hierarchical ability model.
///
/// Latent abilities get a regression prior `N(x_c . beta, ability_sd^2)` and
/// coefficients get `N(0, beta_sd^2)`. Every observed outcome contributes
/// `weight * log_sigmoid(ability[winner] - ability[loser])`. Works on 0-based
/// dense positions; the solver maps them back to contestant ids.
use rand::Rng;

use crate::error::SolverError;
use crate::model_spec::ModelSpec;
use crate::posterior::ChainDraws;
use crate::solver::WeightedOutcome;

struct Outcome {
    winner: usize,
    loser: usize,
    weight: f64,
}

pub struct AbilitySampler {
    num_contestants: usize,
    num_predictors: usize,
    /// `x[contestant][predictor]`.
    x: Vec<Vec<f64>>,
    outcomes: Vec<Outcome>,
    /// contestant -> indices into `outcomes`.
    contestant_outcomes: Vec<Vec<usize>>,
    abilities: Vec<f64>,
    beta: Vec<f64>,

    ability_var: f64,
    beta_var: f64,
    ability_proposal: f64,
    beta_proposal: f64,
}

/// `ln(1 / (1 + e^-d))` without overflow.
fn log_sigmoid(d: f64) -> f64 {
    if d >= 0.0 {
        -(-d).exp().ln_1p()
    } else {
        d - d.exp().ln_1p()
    }
}

impl AbilitySampler {
    pub fn new(x: Vec<Vec<f64>>, outcomes: &[WeightedOutcome], spec: &ModelSpec) -> Self {
        let num_contestants = x.len();
        let num_predictors = x.first().map_or(0, Vec::len);

        let mut contestant_outcomes: Vec<Vec<usize>> = vec![Vec::new(); num_contestants];
        let outcomes: Vec<Outcome> = outcomes
            .iter()
            .enumerate()
            .map(|(i, &(winner, loser, weight))| {
                contestant_outcomes[winner].push(i);
                contestant_outcomes[loser].push(i);
                Outcome { winner, loser, weight }
            })
            .collect();

        AbilitySampler {
            num_contestants,
            num_predictors,
            x,
            outcomes,
            contestant_outcomes,
            abilities: vec![0.0; num_contestants],
            beta: vec![0.0; num_predictors],
            ability_var: spec.ability_sd * spec.ability_sd,
            beta_var: spec.beta_sd * spec.beta_sd,
            ability_proposal: spec.ability_proposal,
            beta_proposal: spec.beta_proposal,
        }
    }

    /// Overwrite the current abilities, e.g. with an MLE warm start.
    pub fn set_abilities(&mut self, start: &[f64]) {
        debug_assert_eq!(start.len(), self.num_contestants);
        self.abilities.copy_from_slice(start);
    }

    pub fn abilities(&self) -> &[f64] {
        &self.abilities
    }

    pub fn beta(&self) -> &[f64] {
        &self.beta
    }

    fn prior_mean(&self, contestant: usize, beta: &[f64]) -> f64 {
        self.x[contestant].iter().zip(beta).map(|(x, b)| x * b).sum()
    }

    fn log_posterior_ability(&self, contestant: usize, ability: f64) -> f64 {
        let resid = ability - self.prior_mean(contestant, &self.beta);
        let mut log_prob = -0.5 * resid * resid / self.ability_var;

        for &i in &self.contestant_outcomes[contestant] {
            let o = &self.outcomes[i];
            let diff = if o.winner == contestant {
                ability - self.abilities[o.loser]
            } else {
                self.abilities[o.winner] - ability
            };
            log_prob += o.weight * log_sigmoid(diff);
        }
        log_prob
    }

    fn update_ability(&mut self, contestant: usize, rng: &mut impl Rng) {
        let current = self.abilities[contestant];
        let proposed = current + (rng.random::<f64>() - 0.5) * 2.0 * self.ability_proposal;

        let diff = self.log_posterior_ability(contestant, proposed) - self.log_posterior_ability(contestant, current);
        if rng.random::<f64>().ln() < diff {
            self.abilities[contestant] = proposed;
        }
    }

    /// Log-posterior of coefficient `k` taking `value`, others held fixed.
    fn log_posterior_beta(&self, k: usize, value: f64) -> f64 {
        let mut beta = self.beta.clone();
        beta[k] = value;

        let mut log_prob = -0.5 * value * value / self.beta_var;
        for c in 0..self.num_contestants {
            let resid = self.abilities[c] - self.prior_mean(c, &beta);
            log_prob += -0.5 * resid * resid / self.ability_var;
        }
        log_prob
    }

    fn update_beta(&mut self, k: usize, rng: &mut impl Rng) {
        let current = self.beta[k];
        let proposed = current + (rng.random::<f64>() - 0.5) * 2.0 * self.beta_proposal;

        let diff = self.log_posterior_beta(k, proposed) - self.log_posterior_beta(k, current);
        if rng.random::<f64>().ln() < diff {
            self.beta[k] = proposed;
        }
    }

    fn gibbs_iteration(&mut self, rng: &mut impl Rng) {
        for c in 0..self.num_contestants {
            self.update_ability(c, rng);
        }
        for k in 0..self.num_predictors {
            self.update_beta(k, rng);
        }
    }

    fn state_is_finite(&self) -> bool {
        self.abilities.iter().chain(&self.beta).all(|v| v.is_finite())
    }

    /// Run `burn_in` discarded sweeps, then keep `iterations` draws.
    pub fn run(
        &mut self,
        burn_in: usize,
        iterations: usize,
        chain: usize,
        rng: &mut impl Rng,
    ) -> Result<ChainDraws, SolverError> {
        if !self.state_is_finite() {
            return Err(SolverError::NonFinite { chain, iteration: 0 });
        }
        for iteration in 0..burn_in {
            self.gibbs_iteration(rng);
            if !self.state_is_finite() {
                return Err(SolverError::NonFinite { chain, iteration });
            }
        }

        let mut draws = ChainDraws { ability: Vec::with_capacity(iterations), beta: Vec::with_capacity(iterations) };
        for i in 0..iterations {
            self.gibbs_iteration(rng);
            if !self.state_is_finite() {
                return Err(SolverError::NonFinite { chain, iteration: burn_in + i });
            }
            draws.ability.push(self.abilities.clone());
            draws.beta.push(self.beta.clone());
        }
        Ok(draws)
    }
}
