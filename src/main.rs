use std::fs;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use retro_features::cache::GamelogCache;
use retro_features::config::Config;
use retro_features::feature_store::FeatureStore;
use retro_features::pipeline::{self, RunOptions};
use retro_features::record::RecordBuilder;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_env()?;
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    config.apply_args(&args)?;

    let files = pipeline::list_event_files(&config.events_dir)?;
    if files.is_empty() {
        return Err(anyhow!(
            "no event files found in {}",
            config.events_dir.display()
        ));
    }
    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("create output dir {}", config.out_dir.display()))?;

    let source = config.build_source()?;
    let mut cache = GamelogCache::new(config.cache_capacity);
    let mut store = config
        .db_path
        .as_deref()
        .map(FeatureStore::open)
        .transpose()?;

    let options = RunOptions {
        out_dir: config.out_dir.clone(),
        format: config.format,
        parallelism: config.parse_parallelism,
    };
    let summary = {
        let mut builder = RecordBuilder::new(source.as_ref(), &mut cache, &config.id_remap)
            .with_policy(config.missing_stat_policy);
        pipeline::run(&files, &options, &mut builder, store.as_mut())
    };

    println!("Feature build complete");
    println!("Events: {}", config.events_dir.display());
    println!("Output: {} ({})", config.out_dir.display(), config.format.extension());
    if let Some(path) = config.db_path.as_deref() {
        println!("DB: {}", path.display());
    }
    println!("Files: {}", summary.files.len());
    println!(
        "Records: {}/{} games (skipped={}, files aborted={})",
        summary.records_emitted(),
        summary.games_total(),
        summary.games_skipped(),
        summary.files_aborted()
    );
    let stats = cache.stats();
    println!(
        "Gamelog cache: hits={} misses={} evictions={}",
        stats.hits, stats.misses, stats.evictions
    );

    for file in &summary.files {
        let errors = file.errors();
        if errors.is_empty() {
            continue;
        }
        println!(
            "{}: records {}/{}",
            file.event_file.display(),
            file.records_emitted,
            file.games_total
        );
        println!("  errors: {}", errors.len());
        for err in errors.iter().take(6) {
            println!("   - {err}");
        }
    }

    Ok(())
}
