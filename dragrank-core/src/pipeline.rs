/// End-to-end pipeline: raw tables → model input → posterior → predictions.
///
/// Each stage is a plain function over the previous stage's output; this
/// module only wires them together under one [`PipelineConfig`].
use std::collections::BTreeMap;

use crate::constants::DEFAULT_PREDICTORS;
use crate::episodes::{index_episodes, EpisodeIndex};
use crate::error::{PipelineError, Result};
use crate::features::{build_features, Covariate, CovariateTable, FeatureConfig};
use crate::head_to_head::{aggregate_votes, HeadToHeadTally};
use crate::model_input::{assemble, ModelInput};
use crate::placement::{normalize_placements, Placement, RankScheme};
use crate::posterior::PosteriorSamples;
use crate::solver::AbilitySolver;
use crate::summary::{predict, summarize_coefficients, CoefficientSummary, Prediction, SummaryOptions};
use crate::types::RawTables;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub scheme: RankScheme,
    pub features: FeatureConfig,
    pub predictors: Vec<Covariate>,
    /// Use survey votes when the table is present.
    pub head_to_head: bool,
    pub summary: SummaryOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            scheme: RankScheme::default(),
            features: FeatureConfig::default(),
            predictors: DEFAULT_PREDICTORS.iter().filter_map(|name| name.parse().ok()).collect(),
            head_to_head: true,
            summary: SummaryOptions::default(),
        }
    }
}

/// Output of the data-preparation stages.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub episodes: EpisodeIndex,
    /// Every ranking row, normalized, in input order.
    pub placements: Vec<Placement>,
    pub covariates: CovariateTable,
    pub tallies: Option<Vec<HeadToHeadTally>>,
}

impl PreparedData {
    pub fn model_input(&self, config: &PipelineConfig) -> Result<ModelInput> {
        assemble(
            &self.placements,
            &self.covariates,
            self.tallies.as_deref(),
            &config.scheme,
            &config.predictors,
            config.features.fallback,
        )
    }

    /// Contestant names by id, taken from the first season a name appears.
    pub fn contestant_names(&self) -> BTreeMap<i64, String> {
        let mut names = BTreeMap::new();
        for features in self.covariates.iter() {
            if let Some(name) = &features.name {
                names.entry(features.contestant_id).or_insert_with(|| name.clone());
            }
        }
        names
    }
}

/// Run the episode indexer, placement normalizer, feature builder and
/// head-to-head aggregator.
pub fn prepare(tables: &RawTables, config: &PipelineConfig) -> Result<PreparedData> {
    let episodes = index_episodes(&tables.episodes);
    let placements = normalize_placements(&tables.rankings, &episodes, &config.scheme)?;
    let covariates = build_features(&tables.contestants, &tables.social_media, &episodes, &config.features);

    let tallies = match (&tables.votes, config.head_to_head) {
        (Some(votes), true) => Some(aggregate_votes(votes)?),
        (None, true) => {
            tracing::info!("no survey votes available, fitting without head-to-head data");
            None
        }
        (_, false) => None,
    };

    tracing::info!(
        episodes = episodes.len(),
        placements = placements.len(),
        contestants = covariates.len(),
        pairs = tallies.as_ref().map_or(0, Vec::len),
        "prepared tables"
    );
    Ok(PreparedData { episodes, placements, covariates, tallies })
}

/// Prepare the tables and assemble the model input in one step.
pub fn build_model_input(tables: &RawTables, config: &PipelineConfig) -> Result<(PreparedData, ModelInput)> {
    let prepared = prepare(tables, config)?;
    let input = prepared.model_input(config)?;
    tracing::info!(%input, "assembled model input");
    Ok((prepared, input))
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub prepared: PreparedData,
    pub input: ModelInput,
    pub posterior: PosteriorSamples,
    /// Ordered by rank.
    pub predictions: Vec<Prediction>,
    pub coefficients: Vec<CoefficientSummary>,
}

/// Full run: prepare, fit with `solver`, summarize.
pub fn run(tables: &RawTables, config: &PipelineConfig, solver: &dyn AbilitySolver) -> Result<RunOutput> {
    let (prepared, input) = build_model_input(tables, config)?;

    let posterior = solver
        .fit(&input)
        .map_err(|source| PipelineError::Solver { summary: input.to_string(), source })?;
    tracing::info!(chains = posterior.num_chains(), draws = posterior.num_draws(), "posterior sampled");

    let predictions = predict(&posterior, &prepared.placements, &prepared.contestant_names(), &config.summary);
    let coefficients = summarize_coefficients(&posterior, &config.summary.quantiles);

    Ok(RunOutput { prepared, input, posterior, predictions, coefficients })
}
