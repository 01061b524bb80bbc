use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::date_code::DateCode;
use crate::error::StatError;
use crate::gamelog::{GamelogRow, PlayerGamelog};

pub const MISSING: f64 = -1.0;

const COL_BATTING_AVG: &str = "batting_avg";
const COL_ONBASE: &str = "onbase_perc";
const COL_SLUGGING: &str = "slugging_perc";
const COL_OPS: &str = "onbase_plus_slugging";

const COL_ERA: &str = "earned_run_avg";
const COL_BB: &str = "BB";
const COL_HBP: &str = "HBP";
const COL_H: &str = "H";
const COL_IP: &str = "IP";
const COL_HR: &str = "HR";
const COL_SO: &str = "SO";
const COL_BF: &str = "batters_faced";

const FIP_CONSTANT: f64 = 3.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BattingSnapshot {
    pub batting_avg: f64,
    pub on_base: f64,
    pub slugging: f64,
    pub ops: f64,
}

impl BattingSnapshot {
    pub fn missing() -> Self {
        Self {
            batting_avg: MISSING,
            on_base: MISSING,
            slugging: MISSING,
            ops: MISSING,
        }
    }

    pub fn values(&self) -> [(&'static str, f64); 4] {
        [
            ("ba", self.batting_avg),
            ("obp", self.on_base),
            ("slg", self.slugging),
            ("ops", self.ops),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchingSnapshot {
    pub era: f64,
    pub whip: f64,
    pub fip: f64,
    pub strikeout_rate: f64,
    pub walk_rate: f64,
}

impl PitchingSnapshot {
    pub fn missing() -> Self {
        Self {
            era: MISSING,
            whip: MISSING,
            fip: MISSING,
            strikeout_rate: MISSING,
            walk_rate: MISSING,
        }
    }

    pub fn values(&self) -> [(&'static str, f64); 5] {
        [
            ("ERA", self.era),
            ("WHIP", self.whip),
            ("FIP", self.fip),
            ("KOP", self.strikeout_rate),
            ("BBP", self.walk_rate),
        ]
    }
}

/// Season-to-date counting stats a pitcher carries into a game.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PitchingTotals {
    pub walks: f64,
    pub hit_by_pitch: f64,
    pub hits: f64,
    pub innings: f64,
    pub home_runs: f64,
    pub strikeouts: f64,
    pub batters_faced: f64,
}

impl PitchingTotals {
    fn add(&mut self, other: &PitchingTotals) {
        self.walks += other.walks;
        self.hit_by_pitch += other.hit_by_pitch;
        self.hits += other.hits;
        self.innings += other.innings;
        self.home_runs += other.home_runs;
        self.strikeouts += other.strikeouts;
        self.batters_faced += other.batters_faced;
    }

    pub fn fip(&self) -> f64 {
        if self.innings == 0.0 {
            return MISSING;
        }
        let numerator = 13.0 * self.home_runs + 3.0 * (self.walks + self.hit_by_pitch)
            - 2.0 * self.strikeouts;
        numerator / self.innings + FIP_CONSTANT
    }

    pub fn whip(&self) -> f64 {
        if self.innings == 0.0 {
            return MISSING;
        }
        (self.walks + self.hits) / self.innings
    }

    pub fn strikeout_rate(&self) -> f64 {
        if self.batters_faced == 0.0 {
            return MISSING;
        }
        self.strikeouts / self.batters_faced
    }

    pub fn walk_rate(&self) -> f64 {
        if self.batters_faced == 0.0 {
            return MISSING;
        }
        self.walks / self.batters_faced
    }
}

/// Cumulative batting line through the game before `cutoff`.
pub fn batting_snapshot(gamelog: &PlayerGamelog, cutoff: DateCode) -> Result<BattingSnapshot, StatError> {
    let idx = gamelog
        .position_of(cutoff)
        .ok_or(StatError::DateNotFound(cutoff))?;
    let prev = idx
        .checked_sub(1)
        .map(|i| &gamelog.rows[i])
        .ok_or(StatError::NoPriorGame(cutoff))?;

    Ok(BattingSnapshot {
        batting_avg: rate_column(prev, COL_BATTING_AVG)?,
        on_base: rate_column(prev, COL_ONBASE)?,
        slugging: rate_column(prev, COL_SLUGGING)?,
        ops: rate_column(prev, COL_OPS)?,
    })
}

/// Rate stats over every appearance before `cutoff`. Rows that fail to
/// parse are left out of the totals.
pub fn pitching_snapshot(gamelog: &PlayerGamelog, cutoff: DateCode) -> Result<PitchingSnapshot, StatError> {
    let idx = gamelog
        .position_of(cutoff)
        .ok_or(StatError::DateNotFound(cutoff))?;

    let totals = pitching_totals(gamelog, &gamelog.rows[..idx]);
    let era = match idx.checked_sub(1) {
        Some(prev) => rate_column(&gamelog.rows[prev], COL_ERA)?,
        None => MISSING,
    };

    Ok(PitchingSnapshot {
        era,
        whip: totals.whip(),
        fip: totals.fip(),
        strikeout_rate: totals.strikeout_rate(),
        walk_rate: totals.walk_rate(),
    })
}

pub fn pitching_totals(gamelog: &PlayerGamelog, rows: &[GamelogRow]) -> PitchingTotals {
    let mut totals = PitchingTotals::default();
    for (idx, row) in rows.iter().enumerate() {
        match parse_pitching_row(row) {
            Ok(line) => totals.add(&line),
            Err(err) => warn!(
                player_id = %gamelog.player_id,
                row = idx,
                error = %err,
                "excluding pitching row from totals"
            ),
        }
    }
    totals
}

fn parse_pitching_row(row: &GamelogRow) -> Result<PitchingTotals, StatError> {
    Ok(PitchingTotals {
        walks: count_column(row, COL_BB)?,
        hit_by_pitch: count_column(row, COL_HBP)?,
        hits: count_column(row, COL_H)?,
        innings: innings_column(row, COL_IP)?,
        home_runs: count_column(row, COL_HR)?,
        strikeouts: count_column(row, COL_SO)?,
        batters_faced: count_column(row, COL_BF)?,
    })
}

fn bad_field(column: &str, value: &str) -> StatError {
    StatError::BadField {
        column: column.to_string(),
        value: value.to_string(),
    }
}

fn cell<'a>(row: &'a GamelogRow, column: &str) -> Result<&'a str, StatError> {
    row.get(column).ok_or_else(|| bad_field(column, ""))
}

fn count_column(row: &GamelogRow, column: &str) -> Result<f64, StatError> {
    let raw = cell(row, column)?;
    raw.parse::<u32>()
        .map(f64::from)
        .map_err(|_| bad_field(column, raw))
}

fn rate_column(row: &GamelogRow, column: &str) -> Result<f64, StatError> {
    let raw = cell(row, column)?;
    parse_rate(raw).ok_or_else(|| bad_field(column, raw))
}

// Published rates drop the leading zero (".312"). An ERA with no outs
// recorded is published as "inf" and reads as MISSING.
pub fn parse_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let padded;
    let text = if let Some(rest) = raw.strip_prefix('.') {
        padded = format!("0.{rest}");
        padded.as_str()
    } else {
        raw
    };
    text.parse::<f64>()
        .ok()
        .filter(|v| !v.is_nan())
        .map(|v| if v.is_finite() { v } else { MISSING })
}

// "6.1" is six innings and one out, not 6.1 innings.
fn innings_column(row: &GamelogRow, column: &str) -> Result<f64, StatError> {
    let raw = cell(row, column)?;
    parse_innings(raw).ok_or_else(|| bad_field(column, raw))
}

pub fn parse_innings(raw: &str) -> Option<f64> {
    let (whole, outs) = match raw.trim().split_once('.') {
        Some((whole, outs)) => (whole, outs),
        None => (raw.trim(), "0"),
    };
    let whole = whole.parse::<u32>().ok()?;
    let outs = match outs {
        "0" => 0,
        "1" => 1,
        "2" => 2,
        _ => return None,
    };
    let outs_total = whole.checked_mul(3)?.checked_add(outs)?;
    Some(f64::from(outs_total) / 3.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gamelog::{DATE_COLUMN, PlayerKind, RawRow};

    fn raw(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn code(raw: &str) -> DateCode {
        raw.parse().expect("valid code")
    }

    fn batting_log() -> PlayerGamelog {
        PlayerGamelog::from_raw_rows(
            "devermr01",
            PlayerKind::Batting,
            2019,
            vec![
                raw(&[
                    (DATE_COLUMN, "Apr 1"),
                    (COL_BATTING_AVG, ".300"),
                    (COL_ONBASE, ".350"),
                    (COL_SLUGGING, ".500"),
                    (COL_OPS, ".850"),
                ]),
                raw(&[
                    (DATE_COLUMN, "Apr 2"),
                    (COL_BATTING_AVG, ".310"),
                    (COL_ONBASE, ".360"),
                    (COL_SLUGGING, ".520"),
                    (COL_OPS, ".880"),
                ]),
            ],
        )
    }

    fn pitching_row(date: &str, ip: &str, bb: &str, h: &str, hr: &str, so: &str, bf: &str, era: &str) -> RawRow {
        raw(&[
            (DATE_COLUMN, date),
            (COL_IP, ip),
            (COL_BB, bb),
            (COL_HBP, "0"),
            (COL_H, h),
            (COL_HR, hr),
            (COL_SO, so),
            (COL_BF, bf),
            (COL_ERA, era),
        ])
    }

    #[test]
    fn batting_uses_predecessor_row() {
        let log = batting_log();
        let snap = batting_snapshot(&log, code("04020")).expect("snapshot");
        assert!((snap.batting_avg - 0.300).abs() < 1e-9);
        assert!((snap.ops - 0.850).abs() < 1e-9);
    }

    #[test]
    fn batting_first_row_and_missing_date() {
        let log = batting_log();
        assert_eq!(
            batting_snapshot(&log, code("04010")),
            Err(StatError::NoPriorGame(code("04010")))
        );
        assert_eq!(
            batting_snapshot(&log, code("05010")),
            Err(StatError::DateNotFound(code("05010")))
        );
    }

    #[test]
    fn pitching_sums_all_prior_rows() {
        let log = PlayerGamelog::from_raw_rows(
            "salech01",
            PlayerKind::Pitching,
            2019,
            vec![
                pitching_row("Mar\u{a0}28", "3", "1", "2", "1", "2", "12", "3.00"),
                pitching_row("Apr\u{a0}3", "3", "1", "1", "0", "3", "13", "1.50"),
                pitching_row("Apr\u{a0}9", "7", "0", "4", "0", "9", "27", "1.38"),
            ],
        );
        let snap = pitching_snapshot(&log, code("04090")).expect("snapshot");
        assert!((snap.whip - 5.0 / 6.0).abs() < 1e-9);
        assert!((snap.fip - ((13.0 + 6.0 - 10.0) / 6.0 + 3.2)).abs() < 1e-9);
        assert!((snap.strikeout_rate - 5.0 / 25.0).abs() < 1e-9);
        assert!((snap.walk_rate - 2.0 / 25.0).abs() < 1e-9);
        assert!((snap.era - 1.50).abs() < 1e-9);
    }

    #[test]
    fn pitching_first_start_uses_sentinels() {
        let log = PlayerGamelog::from_raw_rows(
            "salech01",
            PlayerKind::Pitching,
            2019,
            vec![pitching_row("Mar\u{a0}28", "5", "1", "2", "1", "2", "20", "1.80")],
        );
        let snap = pitching_snapshot(&log, code("03280")).expect("snapshot");
        assert_eq!(snap, PitchingSnapshot::missing());
    }

    #[test]
    fn era_after_outing_without_an_out_is_missing() {
        let log = PlayerGamelog::from_raw_rows(
            "cashnan01",
            PlayerKind::Pitching,
            2019,
            vec![
                pitching_row("Apr\u{a0}5", "0", "2", "3", "1", "0", "5", "inf"),
                pitching_row("Apr\u{a0}6", "6", "1", "4", "0", "7", "24", "9.00"),
            ],
        );
        let snap = pitching_snapshot(&log, code("04060")).expect("snapshot");
        assert_eq!(snap.era, MISSING);
        assert_eq!(snap.whip, MISSING);
        assert!(snap.strikeout_rate.is_finite());
    }

    #[test]
    fn zero_innings_gives_sentinels() {
        let totals = PitchingTotals {
            walks: 2.0,
            batters_faced: 3.0,
            ..PitchingTotals::default()
        };
        assert_eq!(totals.fip(), MISSING);
        assert_eq!(totals.whip(), MISSING);
        assert!((totals.walk_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn unparseable_row_is_excluded() {
        let log = PlayerGamelog::from_raw_rows(
            "salech01",
            PlayerKind::Pitching,
            2019,
            vec![
                pitching_row("Mar\u{a0}28", "6", "2", "3", "1", "5", "25", "1.50"),
                pitching_row("Apr\u{a0}3", "x", "9", "9", "9", "9", "99", "9.00"),
                pitching_row("Apr\u{a0}9", "7", "0", "4", "0", "9", "27", "1.38"),
            ],
        );
        let totals = pitching_totals(&log, &log.rows[..2]);
        assert_eq!(totals.walks, 2.0);
        assert_eq!(totals.batters_faced, 25.0);
    }

    #[test]
    fn innings_notation() {
        assert_eq!(parse_innings("6"), Some(6.0));
        assert_eq!(parse_innings("6.0"), Some(6.0));
        assert!((parse_innings("6.1").unwrap() - 19.0 / 3.0).abs() < 1e-9);
        assert!((parse_innings("0.2").unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(parse_innings("6.3"), None);
        assert_eq!(parse_innings(""), None);
        assert_eq!(parse_innings("4294967295.2"), None);
        assert_eq!(parse_innings("1431655765"), Some(1431655765.0));
        assert_eq!(parse_innings("1431655765.1"), None);
    }

    #[test]
    fn rates_accept_missing_leading_zero() {
        assert_eq!(parse_rate(".312"), Some(0.312));
        assert_eq!(parse_rate("1.045"), Some(1.045));
        assert_eq!(parse_rate("inf"), Some(MISSING));
        assert_eq!(parse_rate("-inf"), Some(MISSING));
        assert_eq!(parse_rate("NaN"), None);
        assert_eq!(parse_rate(""), None);
        assert_eq!(parse_rate("--"), None);
    }
}
