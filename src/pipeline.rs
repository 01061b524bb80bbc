use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::chunker::{self, GameChunk};
use crate::export::{self, FanOut, OutputFormat, RecordSink};
use crate::feature_store::{FeatureStore, StoreSink};
use crate::record::RecordBuilder;
use crate::sources::GameDataSource;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSummary {
    pub event_file: PathBuf,
    pub games_total: usize,
    pub records_emitted: usize,
    /// One line per skipped game.
    pub skipped: Vec<String>,
    /// Set when a source or sink failure ended the file early.
    pub aborted: Option<String>,
}

impl FileSummary {
    fn new(event_file: &Path) -> Self {
        Self {
            event_file: event_file.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn errors(&self) -> Vec<String> {
        let mut out = self.skipped.clone();
        out.extend(self.aborted.iter().map(|reason| format!("aborted: {reason}")));
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub files: Vec<FileSummary>,
}

impl RunSummary {
    pub fn games_total(&self) -> usize {
        self.files.iter().map(|f| f.games_total).sum()
    }

    pub fn records_emitted(&self) -> usize {
        self.files.iter().map(|f| f.records_emitted).sum()
    }

    pub fn games_skipped(&self) -> usize {
        self.files.iter().map(|f| f.skipped.len()).sum()
    }

    pub fn files_aborted(&self) -> usize {
        self.files.iter().filter(|f| f.aborted.is_some()).count()
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub out_dir: PathBuf,
    pub format: OutputFormat,
    pub parallelism: usize,
}

/// Files whose extension starts with `EV` (`.EVA`, `.EVN`, ...), sorted by name.
pub fn list_event_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("read events dir {}", dir.display()))?;
    let mut out = Vec::new();
    for entry in entries {
        let path = entry.context("read events dir entry")?.path();
        if path.is_file() && is_event_file(&path) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn is_event_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.len() >= 2 && ext[..2].eq_ignore_ascii_case("ev"))
}

fn build_parse_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .ok()
}

/// Reads and chunks every file on a rayon pool; output keeps input order.
pub fn load_event_files(
    paths: &[PathBuf],
    parallelism: usize,
) -> Vec<(PathBuf, Result<Vec<GameChunk>>)> {
    let load = || {
        paths
            .par_iter()
            .map(|path| {
                let chunks = chunker::read_event_file(path).map(|lines| chunker::chunk_lines(&lines));
                (path.clone(), chunks)
            })
            .collect::<Vec<_>>()
    };
    match build_parse_pool(parallelism) {
        Some(pool) => pool.install(load),
        None => load(),
    }
}

/// Builds one record per chunk. Recoverable failures skip the game; a source
/// or sink failure stops the file. The sink is finished either way.
pub fn process_chunks<S: GameDataSource + ?Sized>(
    builder: &mut RecordBuilder<'_, S>,
    event_file: &Path,
    chunks: &[GameChunk],
    sink: &mut dyn RecordSink,
) -> FileSummary {
    let mut summary = FileSummary::new(event_file);
    summary.games_total = chunks.len();

    for chunk in chunks {
        let record = match builder.build(chunk) {
            Ok(record) => record,
            Err(err) if err.is_recoverable() => {
                let game = chunk.first_line().unwrap_or("<empty>");
                warn!(event_file = %event_file.display(), game, error = %err, "skipping game");
                summary.skipped.push(format!("{game}: {err}"));
                continue;
            }
            Err(err) => {
                warn!(event_file = %event_file.display(), error = %err, "aborting event file");
                summary.aborted = Some(err.to_string());
                break;
            }
        };
        if let Err(err) = sink.emit_record(&record) {
            summary.aborted = Some(format!("{err:#}"));
            break;
        }
        summary.records_emitted += 1;
    }

    if let Err(err) = sink.finish() {
        warn!(event_file = %event_file.display(), error = %err, "failed to finish output");
        summary.aborted.get_or_insert_with(|| format!("{err:#}"));
    }
    summary
}

/// Processes each file into its own output, plus the optional store.
pub fn run<S: GameDataSource + ?Sized>(
    paths: &[PathBuf],
    options: &RunOptions,
    builder: &mut RecordBuilder<'_, S>,
    mut store: Option<&mut FeatureStore>,
) -> RunSummary {
    let mut run = RunSummary::default();

    for (path, loaded) in load_event_files(paths, options.parallelism) {
        let chunks = match loaded {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!(event_file = %path.display(), error = %err, "failed to read event file");
                let mut summary = FileSummary::new(&path);
                summary.aborted = Some(format!("{err:#}"));
                run.files.push(summary);
                continue;
            }
        };
        info!(event_file = %path.display(), games = chunks.len(), "processing event file");

        let summary = match process_file(&path, &chunks, options, builder, store.as_deref_mut()) {
            Ok(summary) => summary,
            Err(err) => {
                let mut summary = FileSummary::new(&path);
                summary.games_total = chunks.len();
                summary.aborted = Some(format!("{err:#}"));
                summary
            }
        };
        run.files.push(summary);
    }
    run
}

fn process_file<S: GameDataSource + ?Sized>(
    path: &Path,
    chunks: &[GameChunk],
    options: &RunOptions,
    builder: &mut RecordBuilder<'_, S>,
    store: Option<&mut FeatureStore>,
) -> Result<FileSummary> {
    let name = path.display().to_string();
    let file_sink = export::sink_for_event_file(&options.out_dir, path, options.format)?;

    let Some(store) = store else {
        let mut sink = file_sink;
        return Ok(process_chunks(builder, path, chunks, &mut sink));
    };

    let run_id = store.begin_run(&name)?;
    let summary = {
        let mut sinks: Vec<Box<dyn RecordSink + '_>> = Vec::with_capacity(2);
        sinks.push(file_sink);
        sinks.push(Box::new(StoreSink::new(store, name.as_str())));
        process_chunks(builder, path, chunks, &mut FanOut::new(sinks))
    };
    store.finish_run(run_id, summary.games_total, summary.records_emitted, &summary.errors())?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_extensions_match() {
        assert!(is_event_file(Path::new("2019BOS.EVA")));
        assert!(is_event_file(Path::new("2019NYN.evn")));
        assert!(!is_event_file(Path::new("TEAM2019")));
        assert!(!is_event_file(Path::new("2019BOS.ROS")));
    }

    #[test]
    fn run_summary_totals() {
        let run = RunSummary {
            files: vec![
                FileSummary {
                    games_total: 3,
                    records_emitted: 2,
                    skipped: vec!["x".into()],
                    ..FileSummary::default()
                },
                FileSummary {
                    games_total: 1,
                    aborted: Some("source down".into()),
                    ..FileSummary::default()
                },
            ],
        };
        assert_eq!(run.games_total(), 4);
        assert_eq!(run.records_emitted(), 2);
        assert_eq!(run.games_skipped(), 1);
        assert_eq!(run.files_aborted(), 1);
    }
}
