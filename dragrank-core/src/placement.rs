/// Placement normalizer: free-text labels → ordinal rank + elimination flag.
///
/// Rank and elimination are separate lookups. Rank feeds ability
/// scoring; elimination feeds the next-episode field.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ELIMINATED, DEFAULT_IGNORE, SIX_LEVEL_RANKS, THREE_LEVEL_RANKS};
use crate::episodes::EpisodeIndex;
use crate::error::{PipelineError, Result};
use crate::types::RankingRecord;

/// Which built-in label table to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RankSchemeKind {
    #[default]
    SixLevel,
    ThreeLevel,
}

impl FromStr for RankSchemeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "six-level" | "6" => Ok(RankSchemeKind::SixLevel),
            "three-level" | "3" => Ok(RankSchemeKind::ThreeLevel),
            other => Err(format!("unknown rank scheme \"{other}\" (use \"six-level\" or \"three-level\")")),
        }
    }
}

impl fmt::Display for RankSchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankSchemeKind::SixLevel => write!(f, "six-level"),
            RankSchemeKind::ThreeLevel => write!(f, "three-level"),
        }
    }
}

/// Outcome band of a rank, as the solver sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Band {
    Winner,
    Safe,
    Bottom,
    /// Past the bottom threshold (eliminated outright).
    Out,
}

/// Inclusive upper rank thresholds for each band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankBands {
    pub winner_max: u8,
    pub safe_max: u8,
    pub bottom_max: u8,
}

impl RankBands {
    pub fn band(&self, rank: u8) -> Band {
        if rank <= self.winner_max {
            Band::Winner
        } else if rank <= self.safe_max {
            Band::Safe
        } else if rank <= self.bottom_max {
            Band::Bottom
        } else {
            Band::Out
        }
    }
}

/// A label → rank table with its eliminated set and ignore-list.
#[derive(Debug, Clone, PartialEq)]
pub struct RankScheme {
    name: String,
    ranks: BTreeMap<String, u8>,
    eliminated: BTreeSet<String>,
    ignore: BTreeSet<String>,
    bands: RankBands,
}

impl RankScheme {
    pub fn new(
        name: impl Into<String>,
        ranks: impl IntoIterator<Item = (String, u8)>,
        bands: RankBands,
    ) -> Self {
        RankScheme {
            name: name.into(),
            ranks: ranks.into_iter().collect(),
            eliminated: DEFAULT_ELIMINATED.iter().map(|s| s.to_string()).collect(),
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
            bands,
        }
    }

    /// WIN=1, HIGH=2, SAFE=3, LOW=4, BTM2=5, ELIM=6.
    pub fn six_level() -> Self {
        Self::new(
            RankSchemeKind::SixLevel.to_string(),
            SIX_LEVEL_RANKS.iter().map(|&(l, r)| (l.to_string(), r)),
            RankBands { winner_max: 1, safe_max: 4, bottom_max: 5 },
        )
    }

    /// WIN=1, everything safe=2, bottom/eliminated=3.
    pub fn three_level() -> Self {
        Self::new(
            RankSchemeKind::ThreeLevel.to_string(),
            THREE_LEVEL_RANKS.iter().map(|&(l, r)| (l.to_string(), r)),
            RankBands { winner_max: 1, safe_max: 2, bottom_max: 3 },
        )
    }

    pub fn from_kind(kind: RankSchemeKind) -> Self {
        match kind {
            RankSchemeKind::SixLevel => Self::six_level(),
            RankSchemeKind::ThreeLevel => Self::three_level(),
        }
    }

    pub fn with_eliminated<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.eliminated = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ignore<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rank(&self, label: &str) -> Option<u8> {
        self.ranks.get(label.trim()).copied()
    }

    pub fn is_eliminated(&self, label: &str) -> bool {
        self.eliminated.contains(label.trim())
    }

    pub fn is_ignored(&self, label: &str) -> bool {
        self.ignore.contains(label.trim())
    }

    /// Worst (largest) rank in the table.
    pub fn max_rank(&self) -> u8 {
        self.ranks.values().copied().max().unwrap_or(0)
    }

    pub fn bands(&self) -> RankBands {
        self.bands
    }

    /// All recognized labels in sorted order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.ranks.keys().map(String::as_str)
    }
}

impl Default for RankScheme {
    fn default() -> Self {
        Self::six_level()
    }
}

/// A ranking row after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub season: u32,
    pub episode: u32,
    pub episode_id: u32,
    pub contestant_id: i64,
    pub label: String,
    pub rank: u8,
    pub eliminated: bool,
    /// Label is on the ignore-list; row stays for elimination lookups only.
    pub ignored: bool,
    /// Episode type is a competition episode.
    pub competitive: bool,
}

impl Placement {
    /// Rows that feed the ability model.
    pub fn is_modeled(&self) -> bool {
        self.competitive && !self.ignored
    }
}

/// Normalize every ranking row. Fails on the first unrecognized label or
/// unknown episode; output order matches input order.
pub fn normalize_placements(
    rows: &[RankingRecord],
    episodes: &EpisodeIndex,
    scheme: &RankScheme,
) -> Result<Vec<Placement>> {
    let placements = rows
        .iter()
        .map(|row| {
            let episode_id = episodes
                .episode_id(row.season, row.episode)
                .ok_or(PipelineError::UnknownEpisode {
                    season: row.season,
                    episode: row.episode,
                })?;
            let rank = scheme
                .rank(&row.placement)
                .ok_or_else(|| PipelineError::UnknownPlacement {
                    label: row.placement.clone(),
                    scheme: scheme.name().to_string(),
                    contestant_id: row.contestant_id,
                    season: row.season,
                    episode: row.episode,
                })?;
            let competitive = episodes
                .get(episode_id)
                .map(|e| e.is_competition())
                .unwrap_or(false);

            Ok(Placement {
                season: row.season,
                episode: row.episode,
                episode_id,
                contestant_id: row.contestant_id,
                label: row.placement.trim().to_string(),
                rank,
                eliminated: scheme.is_eliminated(&row.placement),
                ignored: scheme.is_ignored(&row.placement),
                competitive,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        rows = placements.len(),
        modeled = placements.iter().filter(|p| p.is_modeled()).count(),
        scheme = scheme.name(),
        "normalized placements"
    );
    Ok(placements)
}
