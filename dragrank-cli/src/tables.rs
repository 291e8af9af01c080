/// CSV loading for the raw show tables.
///
/// Columns are matched by header name, so extra columns (including a
/// leading unnamed index column) are ignored. The survey-votes table is
/// optional; every other table must exist.
use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use dragrank_core::{
    ContestantRecord, EpisodeRecord, RankingRecord, RawTables, SocialMediaRecord, VoteRecord, VoteResult,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

pub const EPISODES_FILE: &str = "all_episodes.csv";
pub const RANKINGS_FILE: &str = "all_rankings.csv";
pub const CONTESTANTS_FILE: &str = "all_contestants.csv";
pub const SOCIAL_MEDIA_FILE: &str = "all_social_media.csv";
pub const VOTES_FILE: &str = "all_survey_votes.csv";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d %B %Y", "%B %d, %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Deserialize)]
struct EpisodeRow {
    season_number: u32,
    episode_number: u32,
    episode_airdate: String,
    episode_type: String,
}

#[derive(Deserialize)]
struct RankingRow {
    season_number: u32,
    episode_number: u32,
    contestant_id: i64,
    episode_placement: String,
}

#[derive(Deserialize)]
struct ContestantRow {
    contestant_id: i64,
    season_number: u32,
    contestant_name: Option<String>,
    age: Option<f64>,
    hometown_city: Option<String>,
}

#[derive(Deserialize)]
struct SocialMediaRow {
    contestant_id: i64,
    datetime: String,
    followers_twitter: Option<f64>,
}

#[derive(Deserialize)]
struct VoteRow {
    survey_id: u32,
    vote_id: i64,
    contestant_id: i64,
    vote_result: String,
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        .or_else(|| parse_datetime(raw).map(|dt| dt.date()))
}

/// Accepts full timestamps or bare dates (taken as midnight).
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    read_rows_after(path, 0)
}

/// Read records, discarding the first `skip` lines after the header
/// unparsed. Skipped lines may have any number of fields.
fn read_rows_after<T: DeserializeOwned>(path: &Path, skip: usize) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(skip > 0)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = reader.headers().with_context(|| format!("{}: unreadable header", path.display()))?.clone();
    reader
        .records()
        .enumerate()
        .skip(skip)
        .map(|(i, record)| {
            let line = i + 2;
            record
                .map_err(anyhow::Error::from)
                .and_then(|r| r.deserialize(Some(&headers)).map_err(anyhow::Error::from))
                .with_context(|| format!("{}: bad record on line {line}", path.display()))
        })
        .collect()
}

pub fn load_episodes(path: &Path) -> Result<Vec<EpisodeRecord>> {
    read_rows::<EpisodeRow>(path)?
        .into_iter()
        .map(|r| {
            let Some(air_date) = parse_date(&r.episode_airdate) else {
                bail!(
                    "{}: unreadable air date \"{}\" for season {} episode {}",
                    path.display(),
                    r.episode_airdate,
                    r.season_number,
                    r.episode_number
                );
            };
            Ok(EpisodeRecord {
                season: r.season_number,
                episode: r.episode_number,
                air_date,
                episode_type: r.episode_type,
            })
        })
        .collect()
}

pub fn load_rankings(path: &Path) -> Result<Vec<RankingRecord>> {
    Ok(read_rows::<RankingRow>(path)?
        .into_iter()
        .map(|r| RankingRecord {
            season: r.season_number,
            episode: r.episode_number,
            contestant_id: r.contestant_id,
            placement: r.episode_placement,
        })
        .collect())
}

pub fn load_contestants(path: &Path) -> Result<Vec<ContestantRecord>> {
    Ok(read_rows::<ContestantRow>(path)?
        .into_iter()
        .map(|r| ContestantRecord {
            contestant_id: r.contestant_id,
            season: r.season_number,
            name: r.contestant_name,
            age: r.age,
            hometown_city: r.hometown_city,
        })
        .collect())
}

/// Spreadsheet exports of this table carry a junk line under the header;
/// `skip_rows` drops that many lines before parsing.
pub fn load_social_media(path: &Path, skip_rows: usize) -> Result<Vec<SocialMediaRecord>> {
    read_rows_after::<SocialMediaRow>(path, skip_rows)?
        .into_iter()
        .map(|r| {
            let Some(timestamp) = parse_datetime(&r.datetime) else {
                bail!("{}: unreadable timestamp \"{}\" for contestant {}", path.display(), r.datetime, r.contestant_id);
            };
            Ok(SocialMediaRecord { contestant_id: r.contestant_id, timestamp, followers: r.followers_twitter })
        })
        .collect()
}

pub fn load_votes(path: &Path) -> Result<Vec<VoteRecord>> {
    read_rows::<VoteRow>(path)?
        .into_iter()
        .map(|r| {
            let result = match r.vote_result.to_ascii_lowercase().as_str() {
                "win" => VoteResult::Win,
                "lose" | "loss" => VoteResult::Lose,
                other => bail!("{}: vote {} has result \"{other}\" (expected win or lose)", path.display(), r.vote_id),
            };
            Ok(VoteRecord { survey_id: r.survey_id, vote_id: r.vote_id, contestant_id: r.contestant_id, result })
        })
        .collect()
}

/// Load every table from `data_dir`.
pub fn load_tables(data_dir: &Path, social_media_skip_rows: usize) -> Result<RawTables> {
    let votes_path = data_dir.join(VOTES_FILE);
    let votes = if votes_path.exists() {
        Some(load_votes(&votes_path)?)
    } else {
        tracing::info!(path = %votes_path.display(), "no survey votes file");
        None
    };

    let tables = RawTables {
        episodes: load_episodes(&data_dir.join(EPISODES_FILE))?,
        rankings: load_rankings(&data_dir.join(RANKINGS_FILE))?,
        contestants: load_contestants(&data_dir.join(CONTESTANTS_FILE))?,
        social_media: load_social_media(&data_dir.join(SOCIAL_MEDIA_FILE), social_media_skip_rows)?,
        votes,
    };
    tracing::debug!(
        episodes = tables.episodes.len(),
        rankings = tables.rankings.len(),
        contestants = tables.contestants.len(),
        social_media = tables.social_media.len(),
        "loaded tables from {}",
        data_dir.display()
    );
    Ok(tables)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    /// Writes a small but complete data directory.
    pub(crate) fn write_fixture(dir: &Path, with_votes: bool) {
        fs::write(
            dir.join(EPISODES_FILE),
            ",season_number,episode_number,episode_airdate,episode_type\n\
             0,1,1,2020-01-10,Competition\n\
             1,1,2,2020-01-17,Competition\n\
             2,1,3,2020-01-24,Competition\n\
             3,1,4,2020-01-31,Reunion\n",
        )
        .unwrap();
        fs::write(
            dir.join(RANKINGS_FILE),
            "season_number,episode_number,contestant_id,episode_placement\n\
             1,1,1,WIN\n1,1,2,SAFE\n1,1,3,LOW\n1,1,4,BTM2\n\
             1,2,1,WIN\n1,2,2,HIGH\n1,2,3,BTM2\n1,2,4,ELIM\n\
             1,3,1,WIN\n1,3,2,SAFE\n1,3,3,BTM2\n\
             1,4,1,Guest\n",
        )
        .unwrap();
        fs::write(
            dir.join(CONTESTANTS_FILE),
            "contestant_id,season_number,contestant_name,age,hometown_city,notes\n\
             1,1,Ada,24,New York,x\n\
             2,1,Bea,29,Chicago,\n\
             3,1,Cy,,Brooklyn,\n\
             4,1,Di,22,Austin,\n",
        )
        .unwrap();
        fs::write(
            dir.join(SOCIAL_MEDIA_FILE),
            "contestant_id,datetime,followers_twitter\n\
             1,2020-01-01 12:00:00,5000\n\
             2,2020-01-01 12:00:00,\n\
             2,2020-01-02 12:00:00,3000\n\
             3,2020-01-01,2000\n\
             4,2020-01-01T08:30:00,1000\n",
        )
        .unwrap();
        if with_votes {
            fs::write(
                dir.join(VOTES_FILE),
                "survey_id,vote_id,contestant_id,vote_result\n\
                 1,1,1,win\n1,1,2,lose\n1,2,2,WIN\n1,2,3,Lose\n",
            )
            .unwrap();
        }
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(parse_date("2020-01-10"), NaiveDate::from_ymd_opt(2020, 1, 10));
        assert_eq!(parse_date("1/10/2020"), NaiveDate::from_ymd_opt(2020, 1, 10));
        assert_eq!(parse_date("2020-01-10 21:00:00"), NaiveDate::from_ymd_opt(2020, 1, 10));
        assert!(parse_date("soon").is_none());

        let midnight = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0);
        assert_eq!(parse_datetime("2020-01-01"), midnight);
        assert!(parse_datetime("2020-01-01T08:30:00").is_some());
    }

    #[test]
    fn test_load_tables() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), true);
        let tables = load_tables(dir.path(), 0).unwrap();

        assert_eq!(tables.episodes.len(), 4);
        assert_eq!(tables.episodes[3].episode_type, "Reunion");
        assert_eq!(tables.rankings.len(), 12);
        assert_eq!(tables.contestants[2].age, None, "empty cell reads as missing");
        assert_eq!(tables.contestants[0].name.as_deref(), Some("Ada"));
        assert_eq!(tables.social_media[1].followers, None);
        let votes = tables.votes.unwrap();
        assert_eq!(votes.len(), 4);
        assert_eq!(votes[2].result, VoteResult::Win);
        assert_eq!(votes[3].result, VoteResult::Lose);
    }

    #[test]
    fn test_votes_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), false);
        assert!(load_tables(dir.path(), 0).unwrap().votes.is_none());
    }

    #[test]
    fn test_missing_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), false);
        fs::remove_file(dir.path().join(RANKINGS_FILE)).unwrap();
        let err = load_tables(dir.path(), 0).unwrap_err();
        assert!(format!("{err:#}").contains(RANKINGS_FILE));
    }

    #[test]
    fn test_social_media_junk_line_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SOCIAL_MEDIA_FILE);
        fs::write(
            &path,
            ",contestant_id,datetime,followers_twitter\n\
             ,,,,units\n\
             0,1,2020-01-01 12:00:00,5000\n\
             1,2,2020-01-02 12:00:00,\n",
        )
        .unwrap();

        let err = load_social_media(&path, 0).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"), "{err:#}");

        let rows = load_social_media(&path, 1).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].contestant_id, 1);
        assert_eq!(rows[0].followers, Some(5000.0));
        assert_eq!(rows[1].followers, None);
    }

    #[test]
    fn test_bad_date_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EPISODES_FILE);
        fs::write(&path, "season_number,episode_number,episode_airdate,episode_type\n1,1,someday,Competition\n").unwrap();
        let err = load_episodes(&path).unwrap_err();
        assert!(err.to_string().contains("someday"));
    }
}
