use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chunker::split_fields;
use crate::error::GameError;

pub const PITCHER_POSITION: u8 = 1;
pub const BATTING_SLOTS: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Away,
    Home,
}

impl Side {
    /// Side indicator used by `start` and `sub` lines.
    pub fn code(self) -> &'static str {
        match self {
            Side::Away => "0",
            Side::Home => "1",
        }
    }

    pub fn from_code(raw: &str) -> Option<Self> {
        match raw.trim() {
            "0" => Some(Side::Away),
            "1" => Some(Side::Home),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Away => "away",
            Side::Home => "home",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `start` line: `start,<id>,"<name>",<side>,<batting order>,<position>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRecord {
    pub player_id: String,
    pub name: String,
    pub side: Side,
    pub batting_order: u8,
    pub fielding_position: u8,
}

impl StartRecord {
    pub fn parse(line: &str) -> Result<Self, GameError> {
        let fields = split_fields(line);
        let [marker, player_id, name, side, order, position] = fields.as_slice() else {
            return Err(GameError::malformed(format!("start line has wrong shape: {line}")));
        };
        if marker != "start" {
            return Err(GameError::malformed(format!("not a start line: {line}")));
        }
        let side = Side::from_code(side)
            .ok_or_else(|| GameError::malformed(format!("bad side in start line: {line}")))?;
        let batting_order = order
            .trim()
            .parse::<u8>()
            .map_err(|_| GameError::malformed(format!("bad batting order in start line: {line}")))?;
        let fielding_position = position
            .trim()
            .parse::<u8>()
            .map_err(|_| GameError::malformed(format!("bad position in start line: {line}")))?;
        Ok(Self {
            player_id: player_id.trim().to_string(),
            name: name.clone(),
            side,
            batting_order,
            fielding_position,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub external_id: String,
}

impl RosterEntry {
    pub fn new(name: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            external_id: external_id.into(),
        }
    }
}

/// `/players/b/bettsmo01.shtml` → `bettsmo01`
pub fn external_id_from_href(href: &str) -> Option<String> {
    let file = href.trim().trim_end_matches('/').rsplit('/').next()?;
    let id = file.split('.').next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Overrides for external ids that the roster source reports ambiguously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdRemap {
    overrides: HashMap<String, String>,
}

impl Default for IdRemap {
    fn default() -> Self {
        let mut remap = Self::empty();
        remap.insert("sabatc", "sabatc.01");
        remap
    }
}

impl IdRemap {
    pub fn empty() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.overrides.insert(from.into(), to.into());
    }

    /// Extends the table from `from=to;from=to` text.
    pub fn extend_from_pairs(&mut self, pairs: &str) {
        for pair in pairs.split([';', ',']) {
            if let Some((from, to)) = pair.split_once('=') {
                let (from, to) = (from.trim(), to.trim());
                if !from.is_empty() && !to.is_empty() {
                    self.insert(from, to);
                }
            }
        }
    }

    pub fn apply(&self, id: &str) -> String {
        self.overrides
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineupSlot {
    pub retro_id: String,
    pub external_id: String,
    pub name: String,
    pub side: Side,
    pub batting_order: u8,
    pub fielding_position: u8,
}

impl LineupSlot {
    pub fn is_pitcher(&self) -> bool {
        self.fielding_position == PITCHER_POSITION
    }
}

/// Pairs the side's starters with the external roster index for index.
/// Names are never compared. A non-empty side must fill batting orders 1 to 9
/// once each; order 0 is the pitcher under a designated hitter.
pub fn reconcile(
    starters: &[StartRecord],
    roster: &[RosterEntry],
    side: Side,
    remap: &IdRemap,
) -> Result<Vec<LineupSlot>, GameError> {
    let starters = starters.iter().filter(|s| s.side == side).collect::<Vec<_>>();
    if starters.is_empty() || roster.is_empty() {
        return Ok(Vec::new());
    }
    if starters.len() != roster.len() {
        return Err(GameError::malformed(format!(
            "{side} lineup has {} starters but roster lists {}",
            starters.len(),
            roster.len()
        )));
    }
    check_batting_slots(&starters, side)?;

    Ok(starters
        .into_iter()
        .zip(roster)
        .map(|(starter, entry)| LineupSlot {
            retro_id: starter.player_id.clone(),
            external_id: remap.apply(entry.external_id.trim()),
            name: starter.name.clone(),
            side,
            batting_order: starter.batting_order,
            fielding_position: starter.fielding_position,
        })
        .collect())
}

fn check_batting_slots(starters: &[&StartRecord], side: Side) -> Result<(), GameError> {
    let mut filled = [false; BATTING_SLOTS as usize];
    for starter in starters.iter().filter(|s| s.batting_order != 0) {
        let slot = usize::from(starter.batting_order) - 1;
        match filled.get_mut(slot) {
            Some(seen) if !*seen => *seen = true,
            _ => {
                return Err(GameError::malformed(format!(
                    "{side} lineup has bad batting order {} for {}",
                    starter.batting_order, starter.player_id
                )));
            }
        }
    }
    let count = filled.iter().filter(|seen| **seen).count();
    if count != usize::from(BATTING_SLOTS) {
        return Err(GameError::malformed(format!(
            "{side} lineup fills {count} of {BATTING_SLOTS} batting slots"
        )));
    }
    Ok(())
}

pub fn batter_at(lineup: &[LineupSlot], batting_order: u8) -> Option<&LineupSlot> {
    lineup.iter().find(|slot| slot.batting_order == batting_order)
}

/// The side's starting pitcher; `None` unless exactly one slot holds the position.
pub fn starting_pitcher(lineup: &[LineupSlot]) -> Option<&LineupSlot> {
    let mut pitchers = lineup.iter().filter(|slot| slot.is_pitcher());
    let first = pitchers.next()?;
    if pitchers.next().is_some() {
        return None;
    }
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn starters() -> Vec<StartRecord> {
        [
            r#"start,bettm001,"Mookie Betts",1,1,9"#,
            r#"start,devei001,"Rafael Devers",1,2,5"#,
            r#"start,martj006,"J.D. Martinez",1,3,10"#,
            r#"start,bogax001,"Xander Bogaerts",1,4,6"#,
            r#"start,benia002,"Andrew Benintendi",1,5,7"#,
            r#"start,morem001,"Mitch Moreland",1,6,3"#,
            r#"start,holtb002,"Brock Holt",1,7,4"#,
            r#"start,bradj001,"Jackie Bradley",1,8,8"#,
            r#"start,vazqc001,"Christian Vazquez",1,9,2"#,
            r#"start,salec001,"Chris Sale",1,0,1"#,
            r#"start,kiner001,"Ian Kinsler",0,1,4"#,
        ]
        .iter()
        .map(|line| StartRecord::parse(line).expect("valid start line"))
        .collect()
    }

    fn roster_of(len: usize) -> Vec<RosterEntry> {
        (1..=len)
            .map(|n| RosterEntry::new(format!("player {n}"), format!("p{n:02}")))
            .collect()
    }

    #[test]
    fn parses_start_line_with_quoted_comma() {
        let rec = StartRecord::parse(r#"start,smitj001,"Smith, Jr.",0,3,8"#).expect("parse");
        assert_eq!(rec.name, "Smith, Jr.");
        assert_eq!(rec.side, Side::Away);
        assert_eq!(rec.batting_order, 3);
        assert_eq!(rec.fielding_position, 8);
        assert!(StartRecord::parse("start,x,\"y\",2,1,1").is_err());
        assert!(StartRecord::parse("play,1,0,x,??,,K").is_err());
    }

    #[test]
    fn pairs_by_position_not_name() {
        let mut roster = roster_of(10);
        roster[0] = RosterEntry::new("Rafael Devers", "deverra01");
        roster[1] = RosterEntry::new("Mookie Betts", "bettsmo01");
        let lineup = reconcile(&starters(), &roster, Side::Home, &IdRemap::default()).expect("ok");
        assert_eq!(lineup.len(), 10);
        assert_eq!(lineup[0].retro_id, "bettm001");
        assert_eq!(lineup[0].external_id, "deverra01");
        assert_eq!(lineup[1].external_id, "bettsmo01");
        assert_eq!(lineup[9].batting_order, 0);
        assert!(lineup[9].is_pitcher());
    }

    #[test]
    fn short_lineup_is_malformed() {
        let mut short = starters();
        short.retain(|s| s.side == Side::Home && s.batting_order < 4);
        let err = reconcile(&short, &roster_of(3), Side::Home, &IdRemap::default()).unwrap_err();
        assert!(matches!(err, GameError::MalformedInput(_)));

        // Kinsler is the only away starter.
        let err = reconcile(&starters(), &roster_of(1), Side::Away, &IdRemap::default()).unwrap_err();
        assert!(matches!(err, GameError::MalformedInput(_)));
    }

    #[test]
    fn repeated_batting_order_is_malformed() {
        let mut repeated = starters();
        repeated[1].batting_order = 1;
        let err =
            reconcile(&repeated, &roster_of(10), Side::Home, &IdRemap::default()).unwrap_err();
        assert!(matches!(err, GameError::MalformedInput(_)));

        let mut out_of_range = starters();
        out_of_range[8].batting_order = 10;
        assert!(reconcile(&out_of_range, &roster_of(10), Side::Home, &IdRemap::default()).is_err());
    }

    #[test]
    fn pitcher_batting_ninth_fills_the_order() {
        let mut no_dh = starters();
        no_dh.retain(|s| s.side == Side::Home && s.batting_order != 9);
        if let Some(pitcher) = no_dh.iter_mut().find(|s| s.fielding_position == PITCHER_POSITION) {
            pitcher.batting_order = 9;
        }
        let lineup = reconcile(&no_dh, &roster_of(9), Side::Home, &IdRemap::default()).expect("ok");
        assert_eq!(lineup.len(), 9);
        assert_eq!(batter_at(&lineup, 9).map(|s| s.retro_id.as_str()), Some("salec001"));
    }

    #[test]
    fn count_mismatch_fails_closed() {
        let roster = vec![RosterEntry::new("Mookie Betts", "bettsmo01")];
        let err = reconcile(&starters(), &roster, Side::Home, &IdRemap::default()).unwrap_err();
        assert!(matches!(err, GameError::MalformedInput(_)));
    }

    #[test]
    fn empty_inputs_give_empty_lineup() {
        let lineup = reconcile(&starters(), &[], Side::Home, &IdRemap::default()).expect("ok");
        assert!(lineup.is_empty());
        let roster = vec![RosterEntry::new("A", "a01")];
        let lineup = reconcile(&[], &roster, Side::Away, &IdRemap::default()).expect("ok");
        assert!(lineup.is_empty());
    }

    #[test]
    fn remap_overrides_ambiguous_ids() {
        let mut roster = roster_of(10);
        roster[9] = RosterEntry::new(
            "CC Sabathia",
            external_id_from_href("/players/s/sabatc.01.shtml").expect("id"),
        );
        let lineup = reconcile(&starters(), &roster, Side::Home, &IdRemap::default()).expect("ok");
        assert_eq!(lineup[9].external_id, "sabatc.01");

        let mut remap = IdRemap::empty();
        remap.extend_from_pairs("foo=foo.02; bar = bar.03");
        assert_eq!(remap.apply("foo"), "foo.02");
        assert_eq!(remap.apply("bar"), "bar.03");
        assert_eq!(remap.apply("baz"), "baz");
    }

    #[test]
    fn href_extraction() {
        assert_eq!(
            external_id_from_href("/players/b/bettsmo01.shtml").as_deref(),
            Some("bettsmo01")
        );
        assert_eq!(
            external_id_from_href("https://example.org/players/d/deverra01.shtml").as_deref(),
            Some("deverra01")
        );
        assert_eq!(external_id_from_href(""), None);
    }

    #[test]
    fn pitcher_lookup_requires_single_pitcher() {
        let lineup =
            reconcile(&starters(), &roster_of(10), Side::Home, &IdRemap::default()).expect("ok");
        assert_eq!(starting_pitcher(&lineup).map(|s| s.external_id.as_str()), Some("p10"));
        assert_eq!(batter_at(&lineup, 2).map(|s| s.external_id.as_str()), Some("p02"));
        assert!(batter_at(&lineup, 10).is_none());

        let mut doubled = lineup.clone();
        doubled[0].fielding_position = PITCHER_POSITION;
        assert!(starting_pitcher(&doubled).is_none());
    }
}
