//! Error types for the dragrank pipeline.
//!
//! Every fatal condition of a run has its own variant. Recoverable conditions
//! (zero-variance groups, cache misses, empty next-episode fields) never show
//! up here; they are handled where they occur.

/// Failures raised by an [`AbilitySolver`](crate::solver::AbilitySolver).
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// The model input is internally inconsistent (bad index, wrong shape).
    #[error("invalid model input: {0}")]
    InvalidInput(String),

    /// A chain produced NaN or infinite draws.
    #[error("chain {chain} produced a non-finite draw at iteration {iteration}")]
    NonFinite { chain: usize, iteration: usize },

    /// The model specification text could not be compiled.
    #[error("invalid model specification: {0}")]
    InvalidSpec(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A placement label has no entry in the active rank scheme.
    #[error("unrecognized placement label \"{label}\" for contestant {contestant_id} (season {season}, episode {episode}) under the {scheme} rank scheme")]
    UnknownPlacement {
        label: String,
        scheme: String,
        contestant_id: i64,
        season: u32,
        episode: u32,
    },

    /// A ranking row points at a (season, episode) pair missing from the episode table.
    #[error("ranking row references season {season} episode {episode}, which is not in the episode table")]
    UnknownEpisode { season: u32, episode: u32 },

    /// A contestant in the modeled rankings has no covariate row.
    #[error("contestant {contestant_id} (season {season}) appears in rankings but has no row in the contestant table")]
    MissingCovariates { contestant_id: i64, season: u32 },

    /// A vote id does not carry exactly one winner and one loser.
    #[error("survey {survey_id} vote {vote_id} is malformed: {reason}")]
    MalformedVote {
        survey_id: u32,
        vote_id: i64,
        reason: String,
    },

    /// A head-to-head tally claims more wins than votes.
    #[error("head-to-head tally for {contestant_a} vs {contestant_b} has {wins} wins out of {count} votes")]
    InvalidTally {
        contestant_a: i64,
        contestant_b: i64,
        count: u32,
        wins: u32,
    },

    /// A predictor name does not match any derived covariate.
    #[error("unknown predictor \"{0}\" (expected one of: age_z, followers_z, twitter_rank, is_reference_city)")]
    UnknownPredictor(String),

    /// Nothing left to model after filtering.
    #[error("no competitive ranking rows remain after filtering")]
    EmptyRankings,

    /// The solver failed; `summary` describes the input it was given.
    #[error("solver failed on input [{summary}]: {source}")]
    Solver {
        summary: String,
        #[source]
        source: SolverError,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
