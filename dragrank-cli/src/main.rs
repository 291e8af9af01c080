mod config;
mod output;
mod tables;

use anyhow::{Context, Result};
use clap::Parser;
use dragrank_core::{
    build_model_input, load_or_compile, pipeline, Covariate, FeatureConfig, FollowerPolicy, FsModelCache,
    GibbsSolver, PipelineConfig, RankBy, RankScheme, RankSchemeKind, SamplerOptions, StandardizeScope,
    SummaryOptions, DEFAULT_MODEL_SPEC,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::config::DragrankConfig;

pub fn bail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

#[derive(Parser)]
#[command(name = "dragrank", version, about = "Rank competition contestants by latent ability and predict the next episode")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Normalize the raw tables and write the prepared rankings and model input
    Prepare(CommonArgs),
    /// Prepare, fit the ability model and print next-episode predictions
    Run(RunArgs),
    /// Create a default config file at ~/.config/dragrank/config.toml
    Init {
        /// Where to write the config (default: ~/.config/dragrank/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args, Default, Clone)]
struct CommonArgs {
    /// Directory holding the all_*.csv tables
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory for prepared data and results
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Placement rank scheme: "six-level" or "three-level"
    #[arg(long)]
    scheme: Option<String>,

    /// Follower count per contestant: "earliest" or "latest-before-season-start"
    #[arg(long)]
    follower_policy: Option<String>,

    /// Standardization groups: "season" or "global"
    #[arg(long)]
    standardize_scope: Option<String>,

    /// Comma-separated predictors (age_z, followers_z, twitter_rank, is_reference_city)
    #[arg(long, value_delimiter = ',')]
    predictors: Option<Vec<String>>,

    /// Comma-separated hometowns counted by is_reference_city
    #[arg(long, value_delimiter = ',')]
    reference_cities: Option<Vec<String>>,

    /// Ignore survey votes even if all_survey_votes.csv exists
    #[arg(long)]
    no_head_to_head: bool,

    /// Lines to drop under the header of all_social_media.csv
    #[arg(long)]
    social_media_skip_rows: Option<usize>,

    /// Path to config file (default: ~/.config/dragrank/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show progress on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::Args, Default, Clone)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Number of MCMC chains
    #[arg(long)]
    chains: Option<usize>,

    /// Kept draws per chain
    #[arg(long)]
    iterations: Option<usize>,

    /// Discarded warm-up sweeps per chain
    #[arg(long)]
    burn_in: Option<usize>,

    /// Base RNG seed; chain c uses seed + c
    #[arg(long)]
    seed: Option<u64>,

    /// Comma-separated posterior quantiles to report
    #[arg(long, value_delimiter = ',')]
    quantiles: Option<Vec<f64>>,

    /// Statistic used for the overall rank: "mean" or "median"
    #[arg(long)]
    rank_by: Option<String>,

    /// Compiled model cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Custom model specification file (TOML)
    #[arg(long)]
    model_spec: Option<PathBuf>,

    /// Output JSON instead of tables
    #[arg(long)]
    json: bool,
}

/// CLI flags merged over the config file merged over defaults.
#[derive(Debug)]
struct Settings {
    data_dir: PathBuf,
    social_media_skip_rows: usize,
    output_dir: PathBuf,
    pipeline: PipelineConfig,
    sampler: SamplerOptions,
    cache_dir: PathBuf,
    model_spec: Option<PathBuf>,
}

fn parse_with<T>(value: Option<String>, what: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| v.parse::<T>().map_err(|e| anyhow::anyhow!("Invalid {what}: {e}")))
        .transpose()
}

impl Settings {
    fn resolve(args: &RunArgs, cfg: DragrankConfig) -> Result<Settings> {
        let common = &args.common;
        let data_dir = common.data_dir.clone().or(cfg.data_dir).unwrap_or_else(|| PathBuf::from("data"));
        let output_dir = common.output_dir.clone().or(cfg.output_dir).unwrap_or_else(|| data_dir.clone());
        let social_media_skip_rows = common.social_media_skip_rows.or(cfg.social_media_skip_rows).unwrap_or(0);

        let scheme_kind: RankSchemeKind = parse_with(common.scheme.clone().or(cfg.scheme), "rank scheme")?.unwrap_or_default();
        let follower_policy: FollowerPolicy =
            parse_with(common.follower_policy.clone().or(cfg.follower_policy), "follower policy")?.unwrap_or_default();
        let scope: StandardizeScope =
            parse_with(common.standardize_scope.clone().or(cfg.standardize_scope), "standardize scope")?
                .unwrap_or_default();
        let rank_by: RankBy = parse_with(args.rank_by.clone().or(cfg.rank_by), "rank statistic")?.unwrap_or_default();

        let mut features = FeatureConfig { follower_policy, scope, ..FeatureConfig::default() };
        if let Some(cities) = common.reference_cities.clone().or(cfg.reference_cities) {
            features.reference_cities = cities.into_iter().map(|c| c.trim().to_string()).collect();
        }

        let mut pipeline = PipelineConfig {
            scheme: RankScheme::from_kind(scheme_kind),
            features,
            head_to_head: !common.no_head_to_head && cfg.head_to_head.unwrap_or(true),
            ..PipelineConfig::default()
        };
        if let Some(names) = common.predictors.clone().or(cfg.predictors) {
            pipeline.predictors = names.iter().map(|n| n.parse::<Covariate>()).collect::<Result<_, _>>()?;
        }

        let quantiles = args.quantiles.clone().or(cfg.quantiles).unwrap_or_else(|| SummaryOptions::default().quantiles);
        if let Some(q) = quantiles.iter().find(|q| !(0.0..=1.0).contains(*q)) {
            anyhow::bail!("Quantiles must be between 0 and 1, got {q}");
        }
        pipeline.summary = SummaryOptions { quantiles, rank_by };

        let defaults = SamplerOptions::default();
        let sampler = SamplerOptions {
            chains: args.chains.or(cfg.chains).unwrap_or(defaults.chains),
            iterations: args.iterations.or(cfg.iterations).unwrap_or(defaults.iterations),
            burn_in: args.burn_in.or(cfg.burn_in).unwrap_or(defaults.burn_in),
            seed: args.seed.or(cfg.seed).unwrap_or(defaults.seed),
        };
        if sampler.chains == 0 || sampler.iterations == 0 {
            anyhow::bail!("--chains and --iterations must be at least 1");
        }

        let cache_dir = args.cache_dir.clone().or(cfg.cache_dir).unwrap_or_else(|| output_dir.join("model-cache"));
        let model_spec = args.model_spec.clone().or(cfg.model_spec);

        Ok(Settings { data_dir, social_media_skip_rows, output_dir, pipeline, sampler, cache_dir, model_spec })
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_settings(args: &RunArgs) -> Result<Settings> {
    let config_path = args.common.config.clone().unwrap_or_else(config::config_path);
    let cfg = config::load_config(&config_path)?;
    Settings::resolve(args, cfg)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {}", dir.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Prepare(common) => {
            init_tracing(common.verbose);
            run_prepare(&RunArgs { common, ..RunArgs::default() })
        }
        Commands::Run(args) => {
            init_tracing(args.common.verbose);
            run_model(&args)
        }
        Commands::Init { config } => {
            let path = config.unwrap_or_else(config::config_path);
            config::create_default_config(&path)?;
            println!("Created config at {}", path.display());
            println!("Edit it to set your data directory, predictors, sampler settings, etc.");
            Ok(())
        }
    }
}

fn run_prepare(args: &RunArgs) -> Result<()> {
    let settings = load_settings(args)?;
    let tables = tables::load_tables(&settings.data_dir, settings.social_media_skip_rows)?;
    let (prepared, input) = build_model_input(&tables, &settings.pipeline)?;

    ensure_dir(&settings.output_dir)?;
    let prepared_path = settings.output_dir.join(output::PREPARED_FILE);
    let input_path = settings.output_dir.join(output::MODEL_INPUT_FILE);
    output::write_prepared_csv(&prepared_path, &prepared.placements, &prepared.covariates)?;
    output::write_model_input(&input_path, &input)?;

    println!("Model input: {input}");
    println!("Wrote {}", prepared_path.display());
    println!("Wrote {}", input_path.display());
    Ok(())
}

fn run_model(args: &RunArgs) -> Result<()> {
    let settings = load_settings(args)?;

    let (spec_name, spec_text) = match &settings.model_spec {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read model specification {}", path.display()))?;
            let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "model".into());
            (name, text)
        }
        None => ("default".to_string(), DEFAULT_MODEL_SPEC.to_string()),
    };
    let cache = FsModelCache::new(&settings.cache_dir);
    let (model, status) = load_or_compile(&spec_name, &spec_text, &cache)?;
    tracing::info!(?status, cache = %settings.cache_dir.display(), "model ready");

    let tables = tables::load_tables(&settings.data_dir, settings.social_media_skip_rows)?;
    let solver = GibbsSolver::new(model, settings.sampler);
    let out = pipeline::run(&tables, &settings.pipeline, &solver)?;

    ensure_dir(&settings.output_dir)?;
    let dir = &settings.output_dir;
    let quantiles = &settings.pipeline.summary.quantiles;
    output::write_prepared_csv(&dir.join(output::PREPARED_FILE), &out.prepared.placements, &out.prepared.covariates)?;
    output::write_model_input(&dir.join(output::MODEL_INPUT_FILE), &out.input)?;
    output::write_posterior(&dir.join(output::POSTERIOR_FILE), &out.posterior)?;
    output::write_contestants_csv(&dir.join(output::CONTESTANTS_FILE), &out.predictions, quantiles)?;

    if args.json {
        output::print_json(&out.predictions, &out.coefficients)?;
    } else {
        println!("Next episode predictions:\n");
        output::print_table(&out.predictions, quantiles);
        output::print_coefficients(&out.coefficients, quantiles);
        println!("\nResults written to {}", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dragrank_core::PosteriorSamples;

    fn args_in(dir: &Path) -> RunArgs {
        RunArgs {
            common: CommonArgs {
                data_dir: Some(dir.join("data")),
                output_dir: Some(dir.join("out")),
                config: Some(dir.join("missing-config.toml")),
                ..CommonArgs::default()
            },
            chains: Some(2),
            iterations: Some(150),
            burn_in: Some(50),
            seed: Some(3),
            ..RunArgs::default()
        }
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&RunArgs::default(), DragrankConfig::default()).unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.output_dir, PathBuf::from("data"));
        assert_eq!(settings.cache_dir, PathBuf::from("data").join("model-cache"));
        assert_eq!(settings.sampler, SamplerOptions::default());
        assert_eq!(settings.pipeline.scheme.name(), RankScheme::six_level().name());
        assert!(settings.pipeline.head_to_head);
        assert!(settings.model_spec.is_none());
    }

    #[test]
    fn test_cli_beats_config_beats_default() {
        let cfg = DragrankConfig {
            chains: Some(8),
            iterations: Some(50),
            scheme: Some("three-level".into()),
            predictors: Some(vec!["age_z".into()]),
            head_to_head: Some(false),
            ..DragrankConfig::default()
        };
        let args = RunArgs { chains: Some(2), ..RunArgs::default() };
        let settings = Settings::resolve(&args, cfg).unwrap();

        assert_eq!(settings.sampler.chains, 2);
        assert_eq!(settings.sampler.iterations, 50);
        assert_eq!(settings.sampler.burn_in, SamplerOptions::default().burn_in);
        assert_eq!(settings.pipeline.scheme.max_rank(), 3);
        assert_eq!(settings.pipeline.predictors, vec![Covariate::AgeZ]);
        assert!(!settings.pipeline.head_to_head);
    }

    #[test]
    fn test_social_media_skip_rows_precedence() {
        let cfg = DragrankConfig { social_media_skip_rows: Some(1), ..DragrankConfig::default() };
        assert_eq!(Settings::resolve(&RunArgs::default(), DragrankConfig::default()).unwrap().social_media_skip_rows, 0);
        assert_eq!(Settings::resolve(&RunArgs::default(), cfg).unwrap().social_media_skip_rows, 1);

        let cli = Cli::try_parse_from(["dragrank", "prepare", "--social-media-skip-rows", "2"]).unwrap();
        let Commands::Prepare(common) = cli.command else { panic!("expected prepare") };
        let args = RunArgs { common, ..RunArgs::default() };
        let cfg = DragrankConfig { social_media_skip_rows: Some(1), ..DragrankConfig::default() };
        assert_eq!(Settings::resolve(&args, cfg).unwrap().social_media_skip_rows, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_scheme = RunArgs {
            common: CommonArgs { scheme: Some("ten-level".into()), ..CommonArgs::default() },
            ..RunArgs::default()
        };
        assert!(Settings::resolve(&bad_scheme, DragrankConfig::default()).is_err());

        let bad_predictor = DragrankConfig { predictors: Some(vec!["height".into()]), ..DragrankConfig::default() };
        assert!(Settings::resolve(&RunArgs::default(), bad_predictor).is_err());

        let bad_quantile = RunArgs { quantiles: Some(vec![0.5, 1.5]), ..RunArgs::default() };
        assert!(Settings::resolve(&bad_quantile, DragrankConfig::default()).is_err());

        let no_chains = RunArgs { chains: Some(0), ..RunArgs::default() };
        assert!(Settings::resolve(&no_chains, DragrankConfig::default()).is_err());
    }

    #[test]
    fn test_cli_parses_delimited_lists() {
        let cli = Cli::try_parse_from([
            "dragrank",
            "run",
            "--predictors",
            "age_z,is_reference_city",
            "--quantiles",
            "0.05,0.95",
            "--no-head-to-head",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else { panic!("expected run") };
        assert_eq!(args.common.predictors, Some(vec!["age_z".to_string(), "is_reference_city".to_string()]));
        assert_eq!(args.quantiles, Some(vec![0.05, 0.95]));
        assert!(args.common.no_head_to_head);
    }

    #[test]
    fn test_prepare_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("data")).unwrap();
        tables::tests::write_fixture(&dir.path().join("data"), true);

        run_prepare(&args_in(dir.path())).unwrap();
        let out = dir.path().join("out");
        let prepared = std::fs::read_to_string(out.join(output::PREPARED_FILE)).unwrap();
        assert_eq!(prepared.lines().count(), 13, "header + every ranking row");
        let input = std::fs::read_to_string(out.join(output::MODEL_INPUT_FILE)).unwrap();
        assert!(input.contains("\"N\": 11"));
    }

    #[test]
    fn test_run_writes_outputs_and_caches_model() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("data")).unwrap();
        tables::tests::write_fixture(&dir.path().join("data"), true);
        let args = args_in(dir.path());

        run_model(&args).unwrap();
        let out = dir.path().join("out");
        let posterior =
            PosteriorSamples::from_json(&std::fs::read_to_string(out.join(output::POSTERIOR_FILE)).unwrap()).unwrap();
        assert_eq!(posterior.num_draws(), 300);
        let contestants = std::fs::read_to_string(out.join(output::CONTESTANTS_FILE)).unwrap();
        assert_eq!(contestants.lines().count(), 5);

        let cached: Vec<_> = std::fs::read_dir(out.join("model-cache")).unwrap().filter_map(|e| e.ok()).collect();
        assert_eq!(cached.len(), 1);
        assert!(cached[0].file_name().to_string_lossy().starts_with("default-"));

        // Second run hits the cache and reproduces the same draws.
        run_model(&args).unwrap();
        let again =
            PosteriorSamples::from_json(&std::fs::read_to_string(out.join(output::POSTERIOR_FILE)).unwrap()).unwrap();
        assert_eq!(again, posterior);
    }
}
