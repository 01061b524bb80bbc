use thiserror::Error;

use crate::date_code::DateCode;
use crate::gamelog::PlayerKind;

/// Why a snapshot could not be computed from a gamelog.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatError {
    #[error("no gamelog row dated {0}")]
    DateNotFound(DateCode),

    #[error("no game precedes {0}")]
    NoPriorGame(DateCode),

    #[error("column {column} has unparseable value {value:?}")]
    BadField { column: String, value: String },
}

#[derive(Error, Debug)]
pub enum GameError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("{kind} stats unavailable for {player_id}: {source}")]
    StatNotFound {
        player_id: String,
        kind: PlayerKind,
        #[source]
        source: StatError,
    },

    #[error("data source failed: {0:#}")]
    Source(#[from] anyhow::Error),
}

impl GameError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    /// Recoverable errors skip one game; anything else ends the file.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedInput(_) | Self::StatNotFound { .. })
    }
}
