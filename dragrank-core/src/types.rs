use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One row of the episodes table.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRecord {
    pub season: u32,
    pub episode: u32,
    pub air_date: NaiveDate,
    /// "Competition" for scored episodes; anything else is a special/reunion.
    pub episode_type: String,
}

/// One row of the rankings table: a contestant's raw outcome in one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingRecord {
    pub season: u32,
    pub episode: u32,
    pub contestant_id: i64,
    /// Free-text placement label, e.g. "WIN" or "Eliminated".
    pub placement: String,
}

/// One row of the contestants table.
#[derive(Debug, Clone, PartialEq)]
pub struct ContestantRecord {
    pub contestant_id: i64,
    pub season: u32,
    pub name: Option<String>,
    pub age: Option<f64>,
    pub hometown_city: Option<String>,
}

/// One social-media observation.
#[derive(Debug, Clone, PartialEq)]
pub struct SocialMediaRecord {
    pub contestant_id: i64,
    pub timestamp: NaiveDateTime,
    /// Missing when the account was not tracked at that time.
    pub followers: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteResult {
    Win,
    Lose,
}

/// One side of a head-to-head survey vote. A complete vote is two records
/// sharing `vote_id`: one `Win`, one `Lose`.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteRecord {
    pub survey_id: u32,
    pub vote_id: i64,
    pub contestant_id: i64,
    pub result: VoteResult,
}

/// Everything the raw table provider hands to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct RawTables {
    pub episodes: Vec<EpisodeRecord>,
    pub rankings: Vec<RankingRecord>,
    pub contestants: Vec<ContestantRecord>,
    pub social_media: Vec<SocialMediaRecord>,
    /// `None` when no survey table is available.
    pub votes: Option<Vec<VoteRecord>>,
}

/// Maps contestant IDs to dense 1-based model indices, in insertion order.
///
/// Index `i` in the model corresponds to `ids[i - 1]`.
#[derive(Debug, Clone, Default)]
pub struct ContestantIndex {
    ids: Vec<i64>,
    id_to_idx: HashMap<i64, usize>,
}

impl ContestantIndex {
    /// Build from IDs in first-appearance order. Repeated IDs keep their first slot.
    pub fn from_ids<I: IntoIterator<Item = i64>>(ids: I) -> Self {
        let mut index = ContestantIndex::default();
        for id in ids {
            index.insert(id);
        }
        index
    }

    /// Insert an ID if unseen; returns its dense index either way.
    pub fn insert(&mut self, id: i64) -> usize {
        if let Some(&idx) = self.id_to_idx.get(&id) {
            return idx;
        }
        self.ids.push(id);
        let idx = self.ids.len();
        self.id_to_idx.insert(id, idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Dense 1-based index for a contestant ID.
    pub fn to_idx(&self, id: i64) -> Option<usize> {
        self.id_to_idx.get(&id).copied()
    }

    /// Contestant ID for a dense 1-based index.
    pub fn to_id(&self, idx: usize) -> Option<i64> {
        idx.checked_sub(1).and_then(|i| self.ids.get(i)).copied()
    }

    /// IDs in dense-index order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }
}
