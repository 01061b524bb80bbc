use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const NBSP: char = '\u{a0}';

// Season span only; anything outside it cannot be a regular-season or playoff game.
const MONTHS: &[(&str, u8)] = &[
    ("Mar", 3),
    ("Apr", 4),
    ("May", 5),
    ("Jun", 6),
    ("Jul", 7),
    ("Aug", 8),
    ("Sep", 9),
    ("Oct", 10),
    ("Nov", 11),
];

/// Canonical `MMDDG` code shared by game ids and gamelog rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateCode {
    month: u8,
    day: u8,
    game: u8,
}

impl DateCode {
    pub fn new(month: u8, day: u8, game: u8) -> Option<Self> {
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) || game > 9 {
            return None;
        }
        Some(Self { month, day, game })
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    /// 0 for a single game, N for the Nth game of a double-header.
    pub fn game_number(&self) -> u8 {
        self.game
    }
}

impl fmt::Display for DateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}{}", self.month, self.day, self.game)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDateCodeError(String);

impl fmt::Display for ParseDateCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid date code {:?}", self.0)
    }
}

impl std::error::Error for ParseDateCodeError {}

impl FromStr for DateCode {
    type Err = ParseDateCodeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let err = || ParseDateCodeError(raw.to_string());
        if raw.len() != 5 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let month = raw[0..2].parse::<u8>().map_err(|_| err())?;
        let day = raw[2..4].parse::<u8>().map_err(|_| err())?;
        let game = raw[4..5].parse::<u8>().map_err(|_| err())?;
        DateCode::new(month, day, game).ok_or_else(err)
    }
}

/// How a gamelog's date column is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateLayout {
    /// `"Apr 1"`, `"Apr 1 (2)"`
    Spaced,
    /// `"Apr\u{a0}1"`, `"Apr\u{a0}1(2)"`
    Fused,
    /// Pick one of the above from the text itself.
    Detect,
}

pub fn detect_layout(text: &str) -> DateLayout {
    let text = text.trim();
    if text.contains(NBSP) {
        return DateLayout::Fused;
    }
    let fused_token = text
        .split(' ')
        .nth(1)
        .is_some_and(|token| token.contains('('));
    if fused_token {
        DateLayout::Fused
    } else {
        DateLayout::Spaced
    }
}

/// Returns `None` when the text cannot be mapped; callers treat that as
/// "no stats for this row" rather than a hard failure.
pub fn normalize(text: &str, layout: DateLayout) -> Option<DateCode> {
    let text = text.trim_matches(|c: char| c.is_whitespace());
    match layout {
        DateLayout::Spaced => parse_spaced(text),
        DateLayout::Fused => parse_fused(text),
        DateLayout::Detect => normalize(text, detect_layout(text)),
    }
}

fn parse_spaced(text: &str) -> Option<DateCode> {
    let parts = text.split(' ').filter(|p| !p.is_empty()).collect::<Vec<_>>();
    let (month, day, game) = match parts.as_slice() {
        [month, day] => (*month, *day, 0),
        [month, day, suffix] => (*month, *day, parse_game_suffix(suffix)?),
        _ => return None,
    };
    DateCode::new(month_number(month)?, parse_day(day)?, game)
}

fn parse_fused(text: &str) -> Option<DateCode> {
    let (month, rest) = text.split_once(NBSP).or_else(|| text.split_once(' '))?;
    let rest = rest
        .chars()
        .filter(|c| *c != NBSP && *c != ' ')
        .collect::<String>();
    let (day, game) = match rest.find('(') {
        Some(idx) => (&rest[..idx], parse_game_suffix(&rest[idx..])?),
        None => (rest.as_str(), 0),
    };
    DateCode::new(month_number(month)?, parse_day(day)?, game)
}

fn month_number(token: &str) -> Option<u8> {
    MONTHS
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, number)| *number)
}

fn parse_day(token: &str) -> Option<u8> {
    if token.is_empty() || token.len() > 2 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<u8>().ok().filter(|day| (1..=31).contains(day))
}

// `(N)` with a single digit N >= 1.
fn parse_game_suffix(token: &str) -> Option<u8> {
    let inner = token.strip_prefix('(')?.strip_suffix(')')?;
    let mut chars = inner.chars();
    let digit = chars.next()?.to_digit(10)?;
    if chars.next().is_some() || digit == 0 {
        return None;
    }
    u8::try_from(digit).ok()
}
