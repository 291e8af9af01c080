/// Model specification text and its compiled form.
///
/// The specification is a small TOML document holding the solver's
/// hyperparameters. Compiling parses and validates it; the result is what
/// the model cache stores, keyed by a SHA-256 of the text.
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SolverError;

/// Built-in specification used when none is supplied.
pub const DEFAULT_MODEL_SPEC: &str = "\
# dragrank ability model
#
# ability[c] ~ Normal(X[c] . beta, ability_sd^2)
# beta[k]    ~ Normal(0, beta_sd^2)
# Within an episode, every contestant in a better band beats every
# contestant in a worse band (logistic). Head-to-head votes add
# weighted logistic outcomes.

name = \"pairwise-bands\"
ability_sd = 1.0
beta_sd = 1.0
ability_proposal = 0.5
beta_proposal = 0.2
head_to_head_weight = 1.0
# Ghost-player strength for the Bradley-Terry warm start.
regularization_strength = 0.01
";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    pub name: String,
    pub ability_sd: f64,
    pub beta_sd: f64,
    pub ability_proposal: f64,
    pub beta_proposal: f64,
    #[serde(default = "default_head_to_head_weight")]
    pub head_to_head_weight: f64,
    #[serde(default = "default_regularization")]
    pub regularization_strength: f64,
}

fn default_head_to_head_weight() -> f64 {
    1.0
}

fn default_regularization() -> f64 {
    0.01
}

/// A validated specification tagged with the hash of its source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledModel {
    pub spec_hash: String,
    pub spec: ModelSpec,
}

/// Lowercase hex SHA-256 of the specification text.
pub fn spec_hash(spec_text: &str) -> String {
    let digest = Sha256::digest(spec_text.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

/// Parse and validate a specification.
pub fn compile(spec_text: &str) -> Result<CompiledModel, SolverError> {
    let spec: ModelSpec = toml::from_str(spec_text).map_err(|e| SolverError::InvalidSpec(e.to_string()))?;

    let positive = [
        ("ability_sd", spec.ability_sd),
        ("beta_sd", spec.beta_sd),
        ("ability_proposal", spec.ability_proposal),
        ("beta_proposal", spec.beta_proposal),
    ];
    for (field, value) in positive {
        if !(value.is_finite() && value > 0.0) {
            return Err(SolverError::InvalidSpec(format!("{field} must be a positive number, got {value}")));
        }
    }
    for (field, value) in [
        ("head_to_head_weight", spec.head_to_head_weight),
        ("regularization_strength", spec.regularization_strength),
    ] {
        if !(value.is_finite() && value >= 0.0) {
            return Err(SolverError::InvalidSpec(format!("{field} must be non-negative, got {value}")));
        }
    }

    Ok(CompiledModel { spec_hash: spec_hash(spec_text), spec })
}
