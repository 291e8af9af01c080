/// Output formatting: terminal tables, JSON and the files written by
/// `prepare` and `run`.
use anyhow::{Context, Result};
use dragrank_core::{CoefficientSummary, CovariateTable, ModelInput, Placement, PosteriorSamples, Prediction};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const PREPARED_FILE: &str = "rankings_prepared.csv";
pub const MODEL_INPUT_FILE: &str = "model_input.json";
pub const POSTERIOR_FILE: &str = "output_posterior.json";
pub const CONTESTANTS_FILE: &str = "output_contestants.csv";

#[derive(Serialize)]
struct JsonOutput<'a> {
    predictions: &'a [Prediction],
    coefficients: &'a [CoefficientSummary],
}

fn quantile_label(q: f64) -> String {
    format!("q{}", (q * 100.0).round())
}

fn fmt_prob(p: Option<f64>) -> String {
    p.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".to_string())
}

/// Print the next-episode field as a terminal table, best first.
/// Contestants outside the field are left out.
pub fn print_table(predictions: &[Prediction], quantiles: &[f64]) {
    let field: Vec<&Prediction> = predictions.iter().filter(|p| p.prob_best.is_some() || p.prob_worst.is_some()).collect();
    if field.is_empty() {
        println!("No active field for the next episode.");
        return;
    }

    let name_width = field
        .iter()
        .map(|p| p.name.as_deref().unwrap_or("").len())
        .max()
        .unwrap_or(4)
        .max(4);

    let q_header: String = quantiles.iter().map(|&q| format!(" | {:>7}", quantile_label(q))).collect();
    println!(" # | {:>5} | {:<name_width$} |    Mean |      SD{q_header} | P(best) | P(worst)", "ID", "Name");
    println!(
        "---|-------|-{}-|---------|---------{}|---------|---------",
        "-".repeat(name_width),
        "|---------".repeat(quantiles.len())
    );

    for p in &field {
        let q_cells: String = p.quantiles.iter().map(|v| format!(" | {v:>7.3}")).collect();
        println!(
            "{:>2} | {:>5} | {:<name_width$} | {:>7.3} | {:>7.3}{q_cells} | {:>7} | {:>8}",
            p.rank,
            p.contestant_id,
            p.name.as_deref().unwrap_or(""),
            p.mean,
            p.sd,
            fmt_prob(p.prob_best),
            fmt_prob(p.prob_worst),
        );
    }
    println!("\n{} contestants in the next episode ({} ranked overall)", field.len(), predictions.len());
}

pub fn print_coefficients(coefficients: &[CoefficientSummary], quantiles: &[f64]) {
    if coefficients.is_empty() {
        return;
    }
    let width = coefficients.iter().map(|c| c.predictor.len()).max().unwrap_or(9).max(9);
    let q_header: String = quantiles.iter().map(|&q| format!(" | {:>7}", quantile_label(q))).collect();
    println!("\n{:<width$} |    Mean |      SD{q_header}", "Predictor");
    for c in coefficients {
        let q_cells: String = c.quantiles.iter().map(|v| format!(" | {v:>7.3}")).collect();
        println!("{:<width$} | {:>7.3} | {:>7.3}{q_cells}", c.predictor, c.mean, c.sd);
    }
}

pub fn print_json(predictions: &[Prediction], coefficients: &[CoefficientSummary]) -> Result<()> {
    let output = JsonOutput { predictions, coefficients };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[derive(Serialize)]
struct PreparedRow<'a> {
    season_number: u32,
    episode_number: u32,
    episode_id: u32,
    contestant_id: i64,
    episode_placement: &'a str,
    rank: u8,
    eliminated: bool,
    ignored: bool,
    competitive: bool,
    age_z: Option<f64>,
    followers_z: Option<f64>,
    twitter_rank: Option<f64>,
    is_reference_city: Option<f64>,
}

/// Normalized placements joined with their contestant-season covariates.
pub fn write_prepared_csv(path: &Path, placements: &[Placement], covariates: &CovariateTable) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for p in placements {
        let features = covariates.get(p.contestant_id, p.season);
        writer.serialize(PreparedRow {
            season_number: p.season,
            episode_number: p.episode,
            episode_id: p.episode_id,
            contestant_id: p.contestant_id,
            episode_placement: &p.label,
            rank: p.rank,
            eliminated: p.eliminated,
            ignored: p.ignored,
            competitive: p.competitive,
            age_z: features.map(|f| f.age_z),
            followers_z: features.map(|f| f.followers_z),
            twitter_rank: features.map(|f| f.twitter_rank),
            is_reference_city: features.map(|f| f.is_reference_city),
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_model_input(path: &Path, input: &ModelInput) -> Result<()> {
    let json = input.to_json()?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn write_posterior(path: &Path, posterior: &PosteriorSamples) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, posterior)?;
    writer.flush()?;
    Ok(())
}

/// One row per contestant, keyed by contestant id.
pub fn write_contestants_csv(path: &Path, predictions: &[Prediction], quantiles: &[f64]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;

    let mut header = vec!["contestant_id".to_string(), "contestant_name".into(), "ability_mean".into(), "ability_sd".into()];
    header.extend(quantiles.iter().map(|&q| format!("ability_{}", quantile_label(q))));
    header.extend(["rank".into(), "prob_best".into(), "prob_worst".into()]);
    writer.write_record(&header)?;

    let mut rows: Vec<&Prediction> = predictions.iter().collect();
    rows.sort_by_key(|p| p.contestant_id);
    for p in rows {
        let mut record = vec![
            p.contestant_id.to_string(),
            p.name.clone().unwrap_or_default(),
            p.mean.to_string(),
            p.sd.to_string(),
        ];
        record.extend(p.quantiles.iter().map(|v| v.to_string()));
        record.push(p.rank.to_string());
        record.push(p.prob_best.map(|v| v.to_string()).unwrap_or_default());
        record.push(p.prob_worst.map(|v| v.to_string()).unwrap_or_default());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
