use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::record::FeatureRecord;
use crate::stats::{BattingSnapshot, PitchingSnapshot};

const ORDINALS: [&str; 3] = ["first", "second", "third"];
const BATTING_STATS: [&str; 4] = ["ba", "obp", "slg", "ops"];
const PITCHING_STATS: [&str; 5] = ["ERA", "WHIP", "FIP", "KOP", "BBP"];

/// Destination for finished feature rows.
pub trait RecordSink {
    fn emit_record(&mut self, record: &FeatureRecord) -> Result<()>;

    /// Flushes buffered rows; called once after the last record.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl RecordSink for Vec<FeatureRecord> {
    fn emit_record(&mut self, record: &FeatureRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

impl<T: RecordSink + ?Sized> RecordSink for Box<T> {
    fn emit_record(&mut self, record: &FeatureRecord) -> Result<()> {
        (**self).emit_record(record)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Sends every record to each inner sink in turn.
pub struct FanOut<'a> {
    sinks: Vec<Box<dyn RecordSink + 'a>>,
}

impl<'a> FanOut<'a> {
    pub fn new(sinks: Vec<Box<dyn RecordSink + 'a>>) -> Self {
        Self { sinks }
    }
}

impl RecordSink for FanOut<'_> {
    fn emit_record(&mut self, record: &FeatureRecord) -> Result<()> {
        for sink in &mut self.sinks {
            sink.emit_record(record)?;
        }
        Ok(())
    }

    // Every sink gets finished; the first failure is reported.
    fn finish(&mut self) -> Result<()> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(err) = sink.finish() {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    Xlsx,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "excel" => Ok(Self::Xlsx),
            other => Err(anyhow!("unknown output format {other:?}")),
        }
    }
}

pub fn header() -> Vec<String> {
    let mut cols = [
        "game_id",
        "date",
        "home_team",
        "away_team",
        "temperature",
        "wind_direction",
        "wind_speed",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect::<Vec<_>>();

    for side in ["home", "away"] {
        for ordinal in ORDINALS {
            for stat in BATTING_STATS {
                cols.push(format!("{ordinal}_{side}_{stat}"));
            }
        }
    }
    for side in ["home", "away"] {
        for stat in PITCHING_STATS {
            cols.push(format!("{side}_{stat}"));
        }
    }
    cols.push("first_inning_total".to_string());
    cols
}

pub fn record_row(record: &FeatureRecord) -> Vec<String> {
    let mut row = vec![
        record.game_id.to_string(),
        record.date.clone(),
        record.home_team.clone(),
        record.away_team.clone(),
        record.temperature.clone(),
        record.wind_direction.clone(),
        record.wind_speed.clone(),
    ];
    for batters in [&record.home_batters, &record.away_batters] {
        row.extend(batters.iter().flat_map(batting_cells));
    }
    for pitcher in [&record.home_pitcher, &record.away_pitcher] {
        row.extend(pitching_cells(pitcher));
    }
    row.push(record.first_inning_total.to_string());
    row
}

fn batting_cells(snapshot: &BattingSnapshot) -> Vec<String> {
    snapshot.values().iter().map(|(_, v)| v.to_string()).collect()
}

fn pitching_cells(snapshot: &PitchingSnapshot) -> Vec<String> {
    snapshot.values().iter().map(|(_, v)| v.to_string()).collect()
}

pub struct CsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl CsvSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("create csv {}", path.display()))?;
        writer.write_record(header()).context("write csv header")?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
        })
    }
}

impl RecordSink for CsvSink {
    fn emit_record(&mut self, record: &FeatureRecord) -> Result<()> {
        self.writer
            .write_record(record_row(record))
            .with_context(|| format!("write csv row for {}", record.game_id))
    }

    fn finish(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flush csv {}", self.path.display()))
    }
}

/// Buffers rows and writes a single-sheet workbook on finish.
pub struct XlsxSink {
    path: PathBuf,
    rows: Vec<Vec<String>>,
}

impl XlsxSink {
    pub fn create(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            rows: vec![header()],
        }
    }
}

impl RecordSink for XlsxSink {
    fn emit_record(&mut self, record: &FeatureRecord) -> Result<()> {
        self.rows.push(record_row(record));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let mut workbook = Workbook::new();
        {
            let sheet = workbook.add_worksheet();
            sheet.set_name("Features")?;
            write_rows(sheet, &self.rows)?;
        }
        workbook
            .save(&self.path)
            .with_context(|| format!("failed writing workbook to {}", self.path.display()))
    }
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            // Stat cells go in as numbers so the sheet stays sortable.
            let written = if row_idx > 0
                && let Ok(number) = value.parse::<f64>()
                && number.is_finite()
            {
                worksheet.write_number(row_idx as u32, col_idx as u16, number)
            } else {
                worksheet.write_string(row_idx as u32, col_idx as u16, value)
            };
            written.with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

/// Sink for one event file, named after the file's stem.
pub fn sink_for_event_file(
    out_dir: &Path,
    event_file: &Path,
    format: OutputFormat,
) -> Result<Box<dyn RecordSink>> {
    let stem = event_file
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("event file has no name: {}", event_file.display()))?;
    let path = out_dir.join(format!("{stem}.{}", format.extension()));
    Ok(match format {
        OutputFormat::Csv => Box::new(CsvSink::create(&path)?),
        OutputFormat::Xlsx => Box::new(XlsxSink::create(&path)),
    })
}
