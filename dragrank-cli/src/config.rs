/// Config file loading and creation for the dragrank CLI.
///
/// Config lives at ~/.config/dragrank/config.toml.
/// All fields are optional. CLI flags override config values, config values
/// override built-in defaults.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::bail;

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DragrankConfig {
    pub data_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub scheme: Option<String>,
    pub follower_policy: Option<String>,
    pub standardize_scope: Option<String>,
    pub predictors: Option<Vec<String>>,
    pub reference_cities: Option<Vec<String>>,
    pub head_to_head: Option<bool>,
    pub social_media_skip_rows: Option<usize>,
    pub chains: Option<usize>,
    pub iterations: Option<usize>,
    pub burn_in: Option<usize>,
    pub seed: Option<u64>,
    pub quantiles: Option<Vec<f64>>,
    pub rank_by: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub model_spec: Option<PathBuf>,
}

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# dragrank configuration
# All values here can be overridden by CLI flags.

# Directory holding all_episodes.csv, all_rankings.csv, all_contestants.csv,
# all_social_media.csv and (optionally) all_survey_votes.csv
# data_dir = \"data\"

# Where prepared data, the posterior and summaries are written
# output_dir = \"data\"

# Placement rank scheme: \"six-level\" or \"three-level\"
# scheme = \"six-level\"

# Follower count used per contestant: \"earliest\" or \"latest-before-season-start\"
# follower_policy = \"earliest\"

# Standardize covariates within each \"season\" or across all seasons (\"global\")
# standardize_scope = \"season\"

# Model predictors: any of age_z, followers_z, twitter_rank, is_reference_city
# predictors = [\"age_z\", \"twitter_rank\"]

# Hometowns counted by is_reference_city
# reference_cities = [\"New York\", \"Brooklyn\"]

# Use head-to-head survey votes when all_survey_votes.csv is present
# head_to_head = true

# Lines to drop under the header of all_social_media.csv (1 for spreadsheet exports)
# social_media_skip_rows = 0

# Sampler settings
# chains = 4
# iterations = 1000
# burn_in = 500
# seed = 1

# Posterior quantiles to report, and the statistic used for the overall rank (\"mean\" or \"median\")
# quantiles = [0.1, 0.5, 0.9]
# rank_by = \"mean\"

# Compiled model cache directory
# cache_dir = \"data/model-cache\"

# Path to a custom model specification (TOML). The built-in one is used if unset.
# model_spec = \"/path/to/model.toml\"
";

/// Returns the default config path: ~/.config/dragrank/config.toml
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| bail("HOME environment variable not set"));
    PathBuf::from(home).join(".config").join("dragrank").join("config.toml")
}

/// Load config from a file path. Returns default (all None) if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<DragrankConfig> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            toml::from_str(&content).with_context(|| format!("Failed to parse config at {}", path.display()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DragrankConfig::default()),
        Err(e) => Err(e).with_context(|| format!("Failed to read config at {}", path.display())),
    }
}

/// Create the default config file. Errors if it already exists.
pub fn create_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write config to {}", path.display()))
}
