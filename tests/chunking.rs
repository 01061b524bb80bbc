use std::path::PathBuf;

use retro_features::chunker::{self, GameChunk};
use retro_features::record::ParsedGame;

fn fixture(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(rel)
}

#[test]
fn fixture_chunks_match_id_lines() {
    let lines = chunker::read_event_file(&fixture("events/2019BOS.EVA")).expect("read");
    let chunks = chunker::chunk_lines(&lines);
    let id_lines = lines.iter().filter(|line| chunker::is_id_line(line)).count();
    assert_eq!(chunks.len(), id_lines);

    // The file opens with an id line, so nothing is dropped.
    let rebuilt = chunks
        .iter()
        .flat_map(|chunk| chunk.lines().iter().cloned())
        .collect::<Vec<_>>();
    assert_eq!(rebuilt, lines);
}

#[test]
fn fixture_games_parse() {
    let lines = chunker::read_event_file(&fixture("events/2019BOS.EVA")).expect("read");
    let games = chunker::chunk_lines(&lines)
        .iter()
        .map(|chunk| ParsedGame::from_chunk(chunk).expect("parse"))
        .collect::<Vec<_>>();

    assert_eq!(games[0].id.as_str(), "BOS201904131");
    assert_eq!(games[1].id.as_str(), "BOS201904132");
    assert_eq!(games[0].starters.len(), 20);
    assert_eq!(games[0].events.len(), 6);
    // The second game's substitution counts as an event.
    assert_eq!(games[1].events.len(), 4);
    assert_eq!(games[1].info.get("number"), Some("2"));
}

#[test]
fn crlf_and_header_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("2019TST.EVN");
    std::fs::write(
        &path,
        "TST 2019 regular season\r\nid,TST201905050\r\ninfo,hometeam,TST\r\nid,TST201905060\r\n",
    )
    .expect("write");

    let lines = chunker::read_event_file(&path).expect("read");
    assert!(lines.iter().all(|line| !line.ends_with('\r')));
    let chunks = chunker::chunk_lines(&lines);
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(GameChunk::has_id_line));
    assert_eq!(chunks[0].len(), 2);
}
