use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{GamelogCache, GamelogKey};
use crate::chunker::{self, EVENT_MARKERS, GameChunk, INFO_MARKER, START_MARKER, split_fields};
use crate::date_code::DateCode;
use crate::error::{GameError, StatError};
use crate::gamelog::{PlayerGamelog, PlayerKind};
use crate::lineup::{self, IdRemap, LineupSlot, Side, StartRecord};
use crate::sources::GameDataSource;
use crate::stats::{self, BattingSnapshot, PitchingSnapshot};

pub const BATTING_SLOTS: [u8; 3] = [1, 2, 3];

/// `<team><YYYYMMDD><game digit>`, e.g. `BOS201904010`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId {
    raw: String,
    season: u16,
    date_code: DateCode,
}

impl GameId {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Home team code, also the event file's team.
    pub fn team(&self) -> &str {
        &self.raw[..3]
    }

    pub fn season(&self) -> u16 {
        self.season
    }

    /// The trailing `MMDDG`, matched against gamelog rows.
    pub fn date_code(&self) -> DateCode {
        self.date_code
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for GameId {
    type Err = GameError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let bad = || GameError::malformed(format!("bad game id {raw:?}"));
        if raw.len() != 12 || !raw.is_ascii() {
            return Err(bad());
        }
        let (team, digits) = raw.split_at(3);
        if !team.bytes().all(|b| b.is_ascii_alphanumeric())
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(bad());
        }
        let season = digits[..4].parse::<u16>().map_err(|_| bad())?;
        let date_code = digits[4..].parse::<DateCode>().map_err(|_| bad())?;
        Ok(Self {
            raw: raw.to_string(),
            season,
            date_code,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameInfo {
    values: HashMap<String, String>,
}

impl GameInfo {
    /// Later `info` lines overwrite earlier ones with the same key.
    pub fn from_chunk(chunk: &GameChunk) -> Self {
        let mut values = HashMap::new();
        for line in chunk.records(INFO_MARKER) {
            let fields = split_fields(line);
            if let [_, key, value, ..] = fields.as_slice() {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &str, game: &GameId) -> Result<String, GameError> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| GameError::malformed(format!("{game} has no info,{key} line")))
    }

    fn optional(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Everything extracted from one chunk before any lookups happen.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGame {
    pub id: GameId,
    pub info: GameInfo,
    pub events: Vec<String>,
    pub starters: Vec<StartRecord>,
}

impl ParsedGame {
    pub fn from_chunk(chunk: &GameChunk) -> Result<Self, GameError> {
        let first = chunk
            .first_line()
            .ok_or_else(|| GameError::malformed("empty game chunk"))?;
        if !chunker::is_id_line(first) {
            return Err(GameError::malformed(format!(
                "chunk does not start with an id line: {first}"
            )));
        }
        let id = split_fields(first)
            .get(1)
            .ok_or_else(|| GameError::malformed(format!("id line has no identifier: {first}")))?
            .parse::<GameId>()?;

        let info = GameInfo::from_chunk(chunk);
        let events = chunk
            .lines()
            .iter()
            .filter(|line| chunker::record_type(line).is_some_and(|t| EVENT_MARKERS.contains(&t)))
            .map(|line| line.trim().to_string())
            .collect();
        let starters = chunk
            .records(START_MARKER)
            .map(StartRecord::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id,
            info,
            events,
            starters,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub game_id: GameId,
    pub date_code: DateCode,
    pub date: String,
    pub home_team: String,
    pub away_team: String,
    pub temperature: String,
    pub wind_direction: String,
    pub wind_speed: String,
    /// Batting orders 1-3.
    pub home_batters: [BattingSnapshot; 3],
    pub away_batters: [BattingSnapshot; 3],
    pub home_pitcher: PitchingSnapshot,
    pub away_pitcher: PitchingSnapshot,
    pub first_inning_total: u32,
}

/// What to do when a starter has no usable history before the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingStatPolicy {
    /// Drop the game.
    #[default]
    Skip,
    /// Keep the game; the affected snapshot is all `-1`.
    Sentinel,
}

impl FromStr for MissingStatPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "sentinel" | "fill" => Ok(Self::Sentinel),
            other => Err(format!("unknown missing-stat policy {other:?}")),
        }
    }
}

pub struct RecordBuilder<'a, S: GameDataSource + ?Sized> {
    source: &'a S,
    cache: &'a mut GamelogCache,
    remap: &'a IdRemap,
    policy: MissingStatPolicy,
}

impl<'a, S: GameDataSource + ?Sized> RecordBuilder<'a, S> {
    pub fn new(source: &'a S, cache: &'a mut GamelogCache, remap: &'a IdRemap) -> Self {
        Self {
            source,
            cache,
            remap,
            policy: MissingStatPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MissingStatPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache(&self) -> &GamelogCache {
        self.cache
    }

    pub fn build(&mut self, chunk: &GameChunk) -> Result<FeatureRecord, GameError> {
        let game = ParsedGame::from_chunk(chunk)?;
        let id = &game.id;
        let date_code = id.date_code();
        info!(game_id = %id, events = game.events.len(), "building feature record");

        let date = game.info.require("date", id)?;
        let home_team = game.info.require("hometeam", id)?;
        let away_team = game.info.require("visteam", id)?;

        let home = self.lineup(&game, Side::Home)?;
        let away = self.lineup(&game, Side::Away)?;

        let home_batters = self.batters(&home, id, Side::Home)?;
        let away_batters = self.batters(&away, id, Side::Away)?;
        let home_pitcher = self.pitcher(&home, id, Side::Home)?;
        let away_pitcher = self.pitcher(&away, id, Side::Away)?;

        let first_inning_total = self.source.fetch_first_inning_total(id)?;

        Ok(FeatureRecord {
            game_id: id.clone(),
            date_code,
            date,
            home_team,
            away_team,
            temperature: game.info.optional("temp"),
            wind_direction: game.info.optional("winddir"),
            wind_speed: game.info.optional("windspeed"),
            home_batters,
            away_batters,
            home_pitcher,
            away_pitcher,
            first_inning_total,
        })
    }

    fn lineup(&self, game: &ParsedGame, side: Side) -> Result<Vec<LineupSlot>, GameError> {
        let roster = self.source.fetch_roster(&game.id, side)?;
        let lineup = lineup::reconcile(&game.starters, &roster, side, self.remap)?;
        debug!(game_id = %game.id, %side, starters = lineup.len(), "lineup reconciled");
        Ok(lineup)
    }

    fn batters(
        &mut self,
        lineup: &[LineupSlot],
        game: &GameId,
        side: Side,
    ) -> Result<[BattingSnapshot; 3], GameError> {
        let mut out = [BattingSnapshot::missing(); 3];
        for (slot_idx, order) in BATTING_SLOTS.iter().enumerate() {
            let Some(slot) = lineup::batter_at(lineup, *order) else {
                return Err(GameError::malformed(format!(
                    "{game} {side} lineup has no batter #{order}"
                )));
            };
            let snapshot = self
                .snapshot(&slot.external_id, PlayerKind::Batting, game, stats::batting_snapshot)?;
            out[slot_idx] = snapshot.unwrap_or_else(BattingSnapshot::missing);
        }
        Ok(out)
    }

    fn pitcher(
        &mut self,
        lineup: &[LineupSlot],
        game: &GameId,
        side: Side,
    ) -> Result<PitchingSnapshot, GameError> {
        let slot = lineup::starting_pitcher(lineup).ok_or_else(|| {
            GameError::malformed(format!("{game} {side} lineup has no single starting pitcher"))
        })?;
        let snapshot = self
            .snapshot(&slot.external_id, PlayerKind::Pitching, game, stats::pitching_snapshot)?;
        Ok(snapshot.unwrap_or_else(PitchingSnapshot::missing))
    }

    /// `Ok(None)` means "no history, fill with sentinels" under the
    /// sentinel policy.
    fn snapshot<T>(
        &mut self,
        player_id: &str,
        kind: PlayerKind,
        game: &GameId,
        compute: fn(&PlayerGamelog, DateCode) -> Result<T, StatError>,
    ) -> Result<Option<T>, GameError> {
        let key = GamelogKey::new(player_id, kind, game.season());
        let source = self.source;
        let gamelog = self.cache.get_or_fetch(&key, |k| {
            source
                .fetch_gamelog(&k.player_id, k.kind, k.season)
                .map(|rows| PlayerGamelog::from_raw_rows(&k.player_id, k.kind, k.season, rows))
        })?;

        match compute(gamelog, game.date_code()) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => match self.policy {
                MissingStatPolicy::Skip => Err(GameError::StatNotFound {
                    player_id: player_id.to_string(),
                    kind,
                    source: err,
                }),
                MissingStatPolicy::Sentinel => {
                    warn!(game_id = %game, player_id, %kind, error = %err, "filling missing stats with sentinels");
                    Ok(None)
                }
            },
        }
    }
}
