use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use crate::cache::DEFAULT_CAPACITY;
use crate::export::OutputFormat;
use crate::http_cache::HttpCache;
use crate::http_client::DEFAULT_TIMEOUT_SECS;
use crate::lineup::IdRemap;
use crate::record::MissingStatPolicy;
use crate::sources::{GameDataSource, HttpJsonSource, JsonDirSource};

const DEFAULT_EVENTS_DIR: &str = "events";
const DEFAULT_OUTPUT_DIR: &str = "features";
const DEFAULT_SOURCE_DIR: &str = "data";
const DEFAULT_PARSE_PARALLELISM: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Dir(PathBuf),
    Http { base_url: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub events_dir: PathBuf,
    pub out_dir: PathBuf,
    pub format: OutputFormat,
    pub db_path: Option<PathBuf>,
    pub source: SourceConfig,
    pub cache_capacity: usize,
    pub missing_stat_policy: MissingStatPolicy,
    pub parse_parallelism: usize,
    pub id_remap: IdRemap,
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|val| !val.trim().is_empty());

        let format = match get("OUTPUT_FORMAT") {
            Some(raw) => raw.parse::<OutputFormat>().context("OUTPUT_FORMAT")?,
            None => OutputFormat::default(),
        };
        let missing_stat_policy = match get("MISSING_STAT_POLICY") {
            Some(raw) => raw
                .parse::<MissingStatPolicy>()
                .map_err(|err| anyhow!(err))
                .context("MISSING_STAT_POLICY")?,
            None => MissingStatPolicy::default(),
        };
        let source = match get("SOURCE_BASE_URL") {
            Some(base_url) => SourceConfig::Http { base_url },
            None => SourceConfig::Dir(PathBuf::from(
                get("SOURCE_DIR").unwrap_or_else(|| DEFAULT_SOURCE_DIR.to_string()),
            )),
        };
        let mut id_remap = IdRemap::default();
        if let Some(pairs) = get("ID_REMAP") {
            id_remap.extend_from_pairs(&pairs);
        }

        Ok(Self {
            events_dir: PathBuf::from(
                get("EVENTS_DIR").unwrap_or_else(|| DEFAULT_EVENTS_DIR.to_string()),
            ),
            out_dir: PathBuf::from(
                get("OUTPUT_DIR").unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            ),
            format,
            db_path: get("FEATURE_DB").map(PathBuf::from),
            source,
            cache_capacity: get("GAMELOG_CACHE_CAPACITY")
                .and_then(|val| val.trim().parse::<usize>().ok())
                .unwrap_or(DEFAULT_CAPACITY)
                .clamp(1, 10_000),
            missing_stat_policy,
            parse_parallelism: get("PARSE_PARALLELISM")
                .and_then(|val| val.trim().parse::<usize>().ok())
                .unwrap_or(DEFAULT_PARSE_PARALLELISM)
                .clamp(1, 32),
            id_remap,
            request_timeout_secs: get("REQUEST_TIMEOUT_SECS")
                .and_then(|val| val.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS)
                .clamp(1, 120),
        })
    }

    /// `--events`, `--out`, `--db` and `--format` override the environment.
    pub fn apply_args(&mut self, args: &[String]) -> Result<()> {
        if let Some(dir) = arg_value(args, "--events") {
            self.events_dir = PathBuf::from(dir);
        }
        if let Some(dir) = arg_value(args, "--out") {
            self.out_dir = PathBuf::from(dir);
        }
        if let Some(path) = arg_value(args, "--db") {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = arg_value(args, "--format") {
            self.format = raw.parse::<OutputFormat>().context("--format")?;
        }
        Ok(())
    }

    pub fn build_source(&self) -> Result<Box<dyn GameDataSource>> {
        Ok(match &self.source {
            SourceConfig::Dir(root) => {
                if !root.is_dir() {
                    return Err(anyhow!("source dir {} does not exist", root.display()));
                }
                Box::new(JsonDirSource::new(root.clone()))
            }
            SourceConfig::Http { base_url } => Box::new(HttpJsonSource::new(
                base_url,
                self.request_timeout_secs,
                HttpCache::open_default(),
            )?),
        })
    }
}

/// Accepts both `--flag value` and `--flag=value`; the first non-blank wins.
pub fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
