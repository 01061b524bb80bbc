use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::gamelog::{PlayerKind, RawRow};
use crate::http_cache::HttpCache;
use crate::http_client::http_client;
use crate::lineup::{RosterEntry, Side, external_id_from_href};
use crate::record::GameId;

/// Everything the record builder needs from outside the event file.
pub trait GameDataSource {
    /// The player's season gamelog in published (chronological) order.
    fn fetch_gamelog(&self, player_id: &str, kind: PlayerKind, season: u16) -> Result<Vec<RawRow>>;

    /// Starters for one side in batting order.
    fn fetch_roster(&self, game: &GameId, side: Side) -> Result<Vec<RosterEntry>>;

    /// Runs scored by both teams in the first inning.
    fn fetch_first_inning_total(&self, game: &GameId) -> Result<u32>;
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    away: Vec<RosterEntryJson>,
    #[serde(default)]
    home: Vec<RosterEntryJson>,
}

#[derive(Debug, Deserialize)]
struct RosterEntryJson {
    #[serde(default)]
    name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinescoreFile {
    away: Vec<Value>,
    home: Vec<Value>,
}

pub fn gamelog_path(player_id: &str, kind: PlayerKind, season: u16) -> String {
    format!("gamelogs/{season}/{}/{player_id}.json", kind.as_str())
}

pub fn roster_path(game: &GameId) -> String {
    format!("rosters/{}.json", game.as_str())
}

pub fn linescore_path(game: &GameId) -> String {
    format!("linescores/{}.json", game.as_str())
}

pub fn parse_gamelog_json(raw: &str) -> Result<Vec<RawRow>> {
    let rows = serde_json::from_str::<Vec<BTreeMap<String, Value>>>(raw.trim())
        .context("invalid gamelog json")?;
    Ok(rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .filter_map(|(column, value)| value_text(&value).map(|text| (column, text)))
                .collect()
        })
        .collect())
}

pub fn parse_roster_json(raw: &str, side: Side) -> Result<Vec<RosterEntry>> {
    let file = serde_json::from_str::<RosterFile>(raw.trim()).context("invalid roster json")?;
    let entries = match side {
        Side::Away => file.away,
        Side::Home => file.home,
    };
    entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            let external_id = entry
                .id
                .filter(|id| !id.trim().is_empty())
                .or_else(|| entry.href.as_deref().and_then(external_id_from_href))
                .ok_or_else(|| anyhow!("{side} roster entry {idx} has neither id nor href"))?;
            Ok(RosterEntry::new(entry.name, external_id))
        })
        .collect()
}

pub fn parse_first_inning_total(raw: &str) -> Result<u32> {
    let file =
        serde_json::from_str::<LinescoreFile>(raw.trim()).context("invalid linescore json")?;
    let mut total = 0u32;
    for (side, innings) in [("away", &file.away), ("home", &file.home)] {
        let first = innings
            .first()
            .ok_or_else(|| anyhow!("{side} linescore is empty"))?;
        total += value_u32(first).ok_or_else(|| anyhow!("{side} first inning is not a count"))?;
    }
    Ok(total)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn value_u32(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    value.as_str()?.trim().parse::<u32>().ok()
}

/// Pre-extracted tables laid out under one directory.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    root: PathBuf,
}

impl JsonDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, relative: &str) -> Result<String> {
        let path = self.root.join(relative);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}

impl GameDataSource for JsonDirSource {
    fn fetch_gamelog(&self, player_id: &str, kind: PlayerKind, season: u16) -> Result<Vec<RawRow>> {
        parse_gamelog_json(&self.read(&gamelog_path(player_id, kind, season))?)
            .with_context(|| format!("{kind} gamelog for {player_id}"))
    }

    fn fetch_roster(&self, game: &GameId, side: Side) -> Result<Vec<RosterEntry>> {
        parse_roster_json(&self.read(&roster_path(game))?, side)
            .with_context(|| format!("roster for {}", game.as_str()))
    }

    fn fetch_first_inning_total(&self, game: &GameId) -> Result<u32> {
        parse_first_inning_total(&self.read(&linescore_path(game))?)
            .with_context(|| format!("linescore for {}", game.as_str()))
    }
}

/// The same layout served over HTTP, revalidated through the on-disk cache.
#[derive(Debug)]
pub struct HttpJsonSource {
    base_url: String,
    client: &'static Client,
    cache: HttpCache,
}

impl HttpJsonSource {
    pub fn new(base_url: &str, timeout_secs: u64, cache: HttpCache) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("empty source base url"));
        }
        info!(%base_url, "using http data source");
        Ok(Self {
            base_url,
            client: http_client(timeout_secs)?,
            cache,
        })
    }

    fn get(&self, relative: &str) -> Result<String> {
        let url = format!("{}/{relative}", self.base_url);
        self.cache.fetch_text(self.client, &url)
    }
}

impl GameDataSource for HttpJsonSource {
    fn fetch_gamelog(&self, player_id: &str, kind: PlayerKind, season: u16) -> Result<Vec<RawRow>> {
        parse_gamelog_json(&self.get(&gamelog_path(player_id, kind, season))?)
            .with_context(|| format!("{kind} gamelog for {player_id}"))
    }

    fn fetch_roster(&self, game: &GameId, side: Side) -> Result<Vec<RosterEntry>> {
        parse_roster_json(&self.get(&roster_path(game))?, side)
            .with_context(|| format!("roster for {}", game.as_str()))
    }

    fn fetch_first_inning_total(&self, game: &GameId) -> Result<u32> {
        parse_first_inning_total(&self.get(&linescore_path(game))?)
            .with_context(|| format!("linescore for {}", game.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamelog_values_become_text() {
        let rows = parse_gamelog_json(
            r#"[{"date_game":"Apr 1","H":2,"batting_avg":".500","note":null}]"#,
        )
        .expect("parse");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["H"], "2");
        assert_eq!(rows[0]["batting_avg"], ".500");
        assert_eq!(rows[0]["note"], "");
    }

    #[test]
    fn roster_accepts_id_or_href() {
        let raw = r#"{
            "away": [{"name": "A", "id": "aaa01"}, {"name": "B", "href": "/players/b/bbb01.shtml"}],
            "home": [{"name": "C"}]
        }"#;
        let away = parse_roster_json(raw, Side::Away).expect("away");
        assert_eq!(away[0].external_id, "aaa01");
        assert_eq!(away[1].external_id, "bbb01");
        assert!(parse_roster_json(raw, Side::Home).is_err());
    }

    #[test]
    fn first_inning_sums_both_sides() {
        assert_eq!(
            parse_first_inning_total(r#"{"away":[2,0,1],"home":["1","0"]}"#).expect("parse"),
            3
        );
        assert!(parse_first_inning_total(r#"{"away":[0],"home":["-"]}"#).is_err());
        assert!(parse_first_inning_total(r#"{"away":[],"home":[1]}"#).is_err());
    }
}
