/// Episode indexer: dense, chronological episode identities.
///
/// Ids start at 1 and follow air date; equal air dates fall back to
/// (season, episode) so the mapping never depends on input order.
use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::constants::COMPETITION_EPISODE_TYPE;
use crate::types::EpisodeRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub episode_id: u32,
    pub season: u32,
    pub episode: u32,
    pub air_date: NaiveDate,
    pub episode_type: String,
}

impl Episode {
    pub fn is_competition(&self) -> bool {
        self.episode_type == COMPETITION_EPISODE_TYPE
    }
}

#[derive(Debug, Clone, Default)]
pub struct EpisodeIndex {
    by_pair: BTreeMap<(u32, u32), u32>,
    /// `episodes[id - 1]` is the episode with that id.
    episodes: Vec<Episode>,
    season_starts: BTreeMap<u32, NaiveDate>,
}

impl EpisodeIndex {
    pub fn episode_id(&self, season: u32, episode: u32) -> Option<u32> {
        self.by_pair.get(&(season, episode)).copied()
    }

    pub fn get(&self, episode_id: u32) -> Option<&Episode> {
        (episode_id as usize)
            .checked_sub(1)
            .and_then(|i| self.episodes.get(i))
    }

    /// Earliest air date in the season.
    pub fn season_start(&self, season: u32) -> Option<NaiveDate> {
        self.season_starts.get(&season).copied()
    }

    pub fn season_starts(&self) -> &BTreeMap<u32, NaiveDate> {
        &self.season_starts
    }

    /// Episodes in id order.
    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

/// Assign episode ids. A (season, episode) pair listed more than once keeps
/// its earliest air date.
pub fn index_episodes(records: &[EpisodeRecord]) -> EpisodeIndex {
    let mut first_seen: BTreeMap<(u32, u32), &EpisodeRecord> = BTreeMap::new();
    for record in records {
        first_seen
            .entry((record.season, record.episode))
            .and_modify(|existing| {
                if record.air_date < existing.air_date {
                    *existing = record;
                }
            })
            .or_insert(record);
    }

    let mut ordered: Vec<&EpisodeRecord> = first_seen.into_values().collect();
    ordered.sort_by_key(|r| (r.air_date, r.season, r.episode));

    let mut index = EpisodeIndex::default();
    for (i, record) in ordered.into_iter().enumerate() {
        let episode_id = i as u32 + 1;
        index.by_pair.insert((record.season, record.episode), episode_id);
        index.episodes.push(Episode {
            episode_id,
            season: record.season,
            episode: record.episode,
            air_date: record.air_date,
            episode_type: record.episode_type.clone(),
        });
        index
            .season_starts
            .entry(record.season)
            .and_modify(|start| *start = (*start).min(record.air_date))
            .or_insert(record.air_date);
    }

    tracing::debug!(episodes = index.len(), seasons = index.season_starts.len(), "indexed episodes");
    index
}
