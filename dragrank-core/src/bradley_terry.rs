/// Ghost-regularized Bradley-Terry MLE, used to warm-start the sampler.
///
/// Operates on 0-based dense contestant positions and weighted win counts.
use std::collections::BTreeMap;

use crate::solver::WeightedOutcome;

const CONVERGENCE_THRESHOLD: f64 = 1e-6;

pub struct BradleyTerry {
    /// Contestants, excluding the ghost.
    num_contestants: usize,
    /// Contestants plus ghost.
    total: usize,
    /// `wins[i][j]` = weighted wins of i over j.
    wins: Vec<BTreeMap<usize, f64>>,
    total_wins: Vec<f64>,
    /// Current strengths, ghost last.
    scores: Vec<f64>,
}

impl BradleyTerry {
    pub fn new(num_contestants: usize, outcomes: &[WeightedOutcome], regularization_strength: f64) -> Self {
        let ghost = num_contestants;
        let total = num_contestants + 1;

        let mut wins: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); total];
        for &(winner, loser, weight) in outcomes {
            debug_assert!(winner < num_contestants && loser < num_contestants);
            *wins[winner].entry(loser).or_insert(0.0) += weight;
            // Keep the reverse key so the denominator sees the pair.
            wins[loser].entry(winner).or_insert(0.0);
        }

        if regularization_strength > 0.0 {
            for i in 0..num_contestants {
                *wins[i].entry(ghost).or_insert(0.0) += regularization_strength;
                *wins[ghost].entry(i).or_insert(0.0) += regularization_strength;
            }
        }

        let total_wins = wins
            .iter()
            .enumerate()
            .map(|(i, row)| row.iter().filter(|(&j, _)| j != i).map(|(_, &w)| w).sum())
            .collect();

        BradleyTerry { num_contestants, total, wins, total_wins, scores: vec![1.0; total] }
    }

    fn wins_of(&self, i: usize, j: usize) -> f64 {
        self.wins[i].get(&j).copied().unwrap_or(0.0)
    }

    fn run_iteration(&mut self) {
        let mut next = vec![0.0; self.total];

        for i in 0..self.total {
            let total_wins_i = self.total_wins[i];
            if total_wins_i == 0.0 {
                continue;
            }

            let score_i = self.scores[i];
            let mut denominator = 0.0;
            for (&j, &wins_ij) in &self.wins[i] {
                let games = wins_ij + self.wins_of(j, i);
                let score_sum = score_i + self.scores[j];
                if games > 0.0 && score_sum > 0.0 {
                    denominator += games / score_sum;
                }
            }

            next[i] = if denominator > 0.0 { total_wins_i / denominator } else { score_i };
        }

        self.scores = next;
    }

    /// Divide by the geometric mean of the non-zero scores.
    fn normalize_scores(&mut self) {
        let positive: Vec<f64> = self.scores.iter().copied().filter(|&s| s > 0.0).collect();
        if positive.is_empty() {
            return;
        }
        let geo_mean = (positive.iter().map(|s| s.ln()).sum::<f64>() / positive.len() as f64).exp();
        if geo_mean > 0.0 {
            for score in &mut self.scores {
                *score /= geo_mean;
            }
        }
    }

    /// Iterate until the largest score change drops below the threshold.
    pub fn calculate_scores(&mut self, max_iterations: usize) {
        for _ in 0..max_iterations {
            let previous = self.scores.clone();
            self.run_iteration();
            self.normalize_scores();

            let max_change = self
                .scores
                .iter()
                .zip(&previous)
                .map(|(new, old)| (new - old).abs())
                .fold(0.0_f64, f64::max);
            if max_change < CONVERGENCE_THRESHOLD {
                break;
            }
        }
    }

    /// Strengths of the real contestants.
    pub fn scores(&self) -> &[f64] {
        &self.scores[..self.num_contestants]
    }

    /// Log-strengths centred at zero. Zero-strength contestants start at the
    /// lowest finite value.
    pub fn centered_log_scores(&self) -> Vec<f64> {
        let logs: Vec<f64> = self.scores().iter().map(|&s| if s > 0.0 { s.ln() } else { f64::NAN }).collect();
        let floor = logs.iter().copied().filter(|v| v.is_finite()).fold(f64::INFINITY, f64::min);
        let floor = if floor.is_finite() { floor } else { 0.0 };
        let logs: Vec<f64> = logs.into_iter().map(|v| if v.is_finite() { v } else { floor }).collect();
        let mean = if logs.is_empty() { 0.0 } else { logs.iter().sum::<f64>() / logs.len() as f64 };
        logs.into_iter().map(|v| v - mean).collect()
    }
}
