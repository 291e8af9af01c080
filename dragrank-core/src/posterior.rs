/// Posterior sample container produced by a solver.
///
/// Draws are stored per chain, draw-major: `chains[c].ability[d][i]` is
/// contestant `i` (0-based dense order) in draw `d` of chain `c`. Coordinates
/// travel with the draws so the serialized form is self-describing.
use serde::{Deserialize, Serialize};

use crate::error::SolverError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDraws {
    /// `ability[draw][contestant]`.
    pub ability: Vec<Vec<f64>>,
    /// `beta[draw][predictor]`.
    pub beta: Vec<Vec<f64>>,
}

impl ChainDraws {
    pub fn num_draws(&self) -> usize {
        self.ability.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedSamples")]
pub struct PosteriorSamples {
    /// Contestant coordinate, in dense-index order.
    pub contestant_ids: Vec<i64>,
    /// Predictor coordinate.
    pub predictors: Vec<String>,
    pub chains: Vec<ChainDraws>,
}

/// Deserialized form before the shape checks in [`PosteriorSamples::new`].
#[derive(Deserialize)]
struct UncheckedSamples {
    contestant_ids: Vec<i64>,
    predictors: Vec<String>,
    chains: Vec<ChainDraws>,
}

impl TryFrom<UncheckedSamples> for PosteriorSamples {
    type Error = SolverError;

    fn try_from(raw: UncheckedSamples) -> Result<Self, Self::Error> {
        PosteriorSamples::new(raw.contestant_ids, raw.predictors, raw.chains)
    }
}

impl PosteriorSamples {
    /// Build a sample set, checking that every draw matches the coordinates.
    pub fn new(
        contestant_ids: Vec<i64>,
        predictors: Vec<String>,
        chains: Vec<ChainDraws>,
    ) -> Result<Self, SolverError> {
        for (c, chain) in chains.iter().enumerate() {
            if chain.beta.len() != chain.ability.len() {
                return Err(SolverError::InvalidInput(format!(
                    "chain {c} has {} ability draws but {} beta draws",
                    chain.ability.len(),
                    chain.beta.len()
                )));
            }
            if let Some(bad) = chain.ability.iter().position(|d| d.len() != contestant_ids.len()) {
                return Err(SolverError::InvalidInput(format!(
                    "chain {c} draw {bad} has {} abilities, expected {}",
                    chain.ability[bad].len(),
                    contestant_ids.len()
                )));
            }
            if let Some(bad) = chain.beta.iter().position(|d| d.len() != predictors.len()) {
                return Err(SolverError::InvalidInput(format!(
                    "chain {c} draw {bad} has {} coefficients, expected {}",
                    chain.beta[bad].len(),
                    predictors.len()
                )));
            }
        }
        Ok(PosteriorSamples { contestant_ids, predictors, chains })
    }

    pub fn num_chains(&self) -> usize {
        self.chains.len()
    }

    /// Draws across all chains.
    pub fn num_draws(&self) -> usize {
        self.chains.iter().map(ChainDraws::num_draws).sum()
    }

    pub fn num_contestants(&self) -> usize {
        self.contestant_ids.len()
    }

    /// 0-based position of a contestant in the coordinate.
    pub fn position(&self, contestant_id: i64) -> Option<usize> {
        self.contestant_ids.iter().position(|&id| id == contestant_id)
    }

    /// Every ability draw, chains concatenated in order.
    pub fn ability_draws(&self) -> impl Iterator<Item = &[f64]> {
        self.chains.iter().flat_map(|c| c.ability.iter().map(Vec::as_slice))
    }

    /// All draws of one contestant's ability.
    pub fn ability_of(&self, position: usize) -> Vec<f64> {
        self.ability_draws().map(|d| d[position]).collect()
    }

    /// All draws of one coefficient.
    pub fn beta_of(&self, predictor: usize) -> Vec<f64> {
        self.chains
            .iter()
            .flat_map(|c| c.beta.iter().map(move |d| d[predictor]))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
