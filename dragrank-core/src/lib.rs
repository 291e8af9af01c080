/// dragrank-core: latent-ability ranking for elimination competitions.
///
/// Raw episode, ranking, contestant, social-media and survey tables →
/// normalized placements and covariates → a numeric model input → posterior
/// draws of each contestant's ability → rankings and next-episode
/// best/worst probabilities. No CSV parsing or terminal output lives here;
/// callers hand in [`RawTables`] and get plain structs back.
///
/// Contestants are identified by their `i64` ids throughout. The model input
/// uses dense 1-based indices internally and carries the id mapping with it.
///
/// # Quick start
///
/// ```rust,no_run
/// use dragrank_core::{
///     compile, pipeline, GibbsSolver, PipelineConfig, RawTables, SamplerOptions, DEFAULT_MODEL_SPEC,
/// };
///
/// # fn load() -> RawTables { RawTables::default() }
/// let tables: RawTables = load();
/// let solver = GibbsSolver::new(compile(DEFAULT_MODEL_SPEC)?, SamplerOptions::default());
///
/// let out = pipeline::run(&tables, &PipelineConfig::default(), &solver)?;
/// for p in &out.predictions {
///     println!("#{} {} mean={:.3} P(best)={:?}", p.rank, p.contestant_id, p.mean, p.prob_best);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```

pub mod bradley_terry;
pub mod cache;
pub mod constants;
pub mod episodes;
pub mod error;
pub mod features;
pub mod head_to_head;
pub mod model_input;
pub mod model_spec;
pub mod pipeline;
pub mod placement;
pub mod posterior;
pub mod sampler;
pub mod solver;
pub mod summary;
pub mod types;

// Re-export primary public API at crate root.
pub use cache::{cache_key, load_or_compile, CacheStatus, FsModelCache, MemoryModelCache, ModelCache, NoCache};
pub use episodes::{index_episodes, Episode, EpisodeIndex};
pub use error::{PipelineError, Result, SolverError};
pub use features::{
    build_features, standardize, Covariate, CovariateTable, FeatureConfig, FollowerPolicy, StandardizeScope,
};
pub use head_to_head::{aggregate_votes, HeadToHeadTally};
pub use model_input::{assemble, HeadToHeadArrays, ModelInput};
pub use model_spec::{compile, spec_hash, CompiledModel, ModelSpec, DEFAULT_MODEL_SPEC};
pub use pipeline::{build_model_input, prepare, PipelineConfig, PreparedData, RunOutput};
pub use placement::{normalize_placements, Band, Placement, RankBands, RankScheme, RankSchemeKind};
pub use posterior::{ChainDraws, PosteriorSamples};
pub use solver::{AbilitySolver, GibbsSolver, SamplerOptions};
pub use summary::{
    next_episode_field, predict, summarize_abilities, summarize_coefficients, AbilitySummary, CoefficientSummary,
    Prediction, RankBy, SummaryOptions,
};
pub use types::{
    ContestantRecord, EpisodeRecord, RankingRecord, RawTables, SocialMediaRecord, VoteRecord, VoteResult,
};
