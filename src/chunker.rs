use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub const ID_MARKER: &str = "id";
pub const INFO_MARKER: &str = "info";
pub const START_MARKER: &str = "start";
pub const EVENT_MARKERS: &[&str] = &["play", "com", "sub"];

/// Raw lines of one game, starting with its `id` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameChunk {
    lines: Vec<String>,
}

impl GameChunk {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn first_line(&self) -> Option<&str> {
        self.lines.first().map(String::as_str)
    }

    pub fn has_id_line(&self) -> bool {
        self.first_line().is_some_and(is_id_line)
    }

    /// Lines of the given record type, in file order.
    pub fn records<'a>(&'a self, marker: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.lines
            .iter()
            .map(String::as_str)
            .filter(move |line| record_type(line) == Some(marker))
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

pub fn is_id_line(line: &str) -> bool {
    record_type(line) == Some(ID_MARKER)
}

pub fn record_type(line: &str) -> Option<&str> {
    let head = line.split(',').next()?.trim();
    if head.is_empty() { None } else { Some(head) }
}

/// Splits one comma-delimited record, honouring quoted fields.
pub fn split_fields(line: &str) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.trim_end().as_bytes());
    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => record.iter().map(str::to_string).collect(),
        // A stray quote; fall back to a plain split so the caller can report it.
        _ => line.trim_end().split(',').map(str::to_string).collect(),
    }
}

/// Splits an event file into per-game chunks.
///
/// The first line is a header and is skipped unless it is itself an `id`
/// line. Every remaining line lands in exactly one chunk; lines that precede
/// the first `id` line form a leading chunk with no identifier.
pub fn chunk_lines(lines: &[String]) -> Vec<GameChunk> {
    let skip = match lines.first() {
        Some(first) if !is_id_line(first) => 1,
        _ => 0,
    };
    let scanned = &lines[skip..];

    let mut chunks = Vec::new();
    let mut start = 0usize;
    for (idx, line) in scanned.iter().enumerate() {
        if is_id_line(line) && idx > start {
            chunks.push(GameChunk::new(scanned[start..idx].to_vec()));
            start = idx;
        }
    }
    if start < scanned.len() {
        chunks.push(GameChunk::new(scanned[start..].to_vec()));
    }
    chunks
}

pub fn read_event_file(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read event file {}", path.display()))?;
    Ok(raw
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect())
}
