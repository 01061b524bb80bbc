use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use retro_features::chunker;
use retro_features::config::arg_value;
use retro_features::lineup::Side;
use retro_features::pipeline;
use retro_features::record::ParsedGame;

/// Prints how each event file splits into games, without any lookups.
fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let target = arg_value(&args, "--events")
        .or_else(|| std::env::var("EVENTS_DIR").ok())
        .map(PathBuf::from)
        .context("pass --events <file|dir> or set EVENTS_DIR")?;
    let limit = arg_value(&args, "--limit")
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(usize::MAX);

    let files = if target.is_dir() {
        pipeline::list_event_files(&target)?
    } else {
        vec![target.clone()]
    };
    if files.is_empty() {
        return Err(anyhow!("no event files under {}", target.display()));
    }

    for path in &files {
        report_file(path, limit)?;
    }
    Ok(())
}

fn report_file(path: &Path, limit: usize) -> Result<()> {
    let lines = chunker::read_event_file(path)?;
    let chunks = chunker::chunk_lines(&lines);
    let id_lines = lines.iter().filter(|line| chunker::is_id_line(line)).count();

    println!("{}", path.display());
    println!("  lines={} games={} id_lines={}", lines.len(), chunks.len(), id_lines);

    let mut printed = 0usize;
    for chunk in &chunks {
        match ParsedGame::from_chunk(chunk) {
            Ok(game) if printed < limit => {
                printed += 1;
                let starters = |side: Side| game.starters.iter().filter(|s| s.side == side).count();
                println!(
                    "  {} date={} lines={} events={} starters={}/{} home={} away={}",
                    game.id,
                    game.id.date_code(),
                    chunk.len(),
                    game.events.len(),
                    starters(Side::Away),
                    starters(Side::Home),
                    game.info.get("hometeam").unwrap_or("?"),
                    game.info.get("visteam").unwrap_or("?"),
                );
            }
            Ok(_) => {}
            Err(err) => {
                println!("  malformed chunk ({} lines): {err}", chunk.len());
            }
        }
    }
    Ok(())
}
