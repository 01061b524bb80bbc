use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::date_code::{self, DateCode, DateLayout};

pub const DATE_COLUMN: &str = "date_game";

/// One published gamelog row: column name → cell text.
pub type RawRow = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerKind {
    Batting,
    Pitching,
}

impl PlayerKind {
    /// Batting tables space-separate the day and game number; pitching
    /// tables fuse them behind a non-breaking space.
    pub fn date_layout(self) -> DateLayout {
        match self {
            PlayerKind::Batting => DateLayout::Spaced,
            PlayerKind::Pitching => DateLayout::Fused,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayerKind::Batting => "batting",
            PlayerKind::Pitching => "pitching",
        }
    }
}

impl fmt::Display for PlayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GamelogRow {
    pub date_code: Option<DateCode>,
    pub columns: RawRow,
}

impl GamelogRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(|v| v.trim())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerGamelog {
    pub player_id: String,
    pub kind: PlayerKind,
    pub season: u16,
    pub rows: Vec<GamelogRow>,
}

impl PlayerGamelog {
    /// Rows keep their published order; the as-of lookups rely on it
    /// being chronological.
    pub fn from_raw_rows(player_id: &str, kind: PlayerKind, season: u16, raw: Vec<RawRow>) -> Self {
        let layout = kind.date_layout();
        let rows = raw
            .into_iter()
            .map(|columns| {
                let date_text = columns.get(DATE_COLUMN).map(String::as_str).unwrap_or("");
                let date_code = date_code::normalize(date_text, layout);
                if date_code.is_none() {
                    debug!(player_id, %kind, date_text, "gamelog row date not recognised");
                }
                GamelogRow { date_code, columns }
            })
            .collect();
        Self {
            player_id: player_id.to_string(),
            kind,
            season,
            rows,
        }
    }

    pub fn position_of(&self, code: DateCode) -> Option<usize> {
        self.rows.iter().position(|row| row.date_code == Some(code))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
