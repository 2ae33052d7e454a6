use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration for the telforge generator.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Which dataset to generate. Default: hosts.
    #[serde(default)]
    pub dataset: Dataset,

    /// Number of simulated entities. Default: 100.
    #[serde(default = "default_entity_count")]
    pub entity_count: usize,

    /// Prefix for generated entity IDs. Default: "host".
    #[serde(default = "default_entity_prefix")]
    pub entity_prefix: String,

    /// Tick interval as `{integer}{s|m}` (e.g. "10s", "1m"). Default: "10s".
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Backfill start as date math: `now` or `now-{integer}{s|m|h|d}`.
    /// Default: "now" (no backfill).
    #[serde(default = "default_backfill")]
    pub backfill: String,

    /// Output formats to render each tick into. Default: [elastic].
    #[serde(default = "default_renderers")]
    pub renderers: Vec<RendererKind>,

    /// Bulk sink configuration.
    #[serde(default)]
    pub sink: SinkConfig,
}

/// Dataset selects which metric families the generator produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Infrastructure host metrics (CPU, memory, network, disk).
    #[default]
    Hosts,
    /// Weather station metrics plus the correlated host metrics of the
    /// station's edge compute box.
    Weather,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Hosts => "hosts",
            Dataset::Weather => "weather",
        }
    }
}

impl FromStr for Dataset {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, ParseError> {
        match s {
            "hosts" => Ok(Dataset::Hosts),
            "weather" => Ok(Dataset::Weather),
            other => Err(ParseError::Dataset(other.to_string())),
        }
    }
}

/// Output format identifiers as they appear in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    Elastic,
    Otel,
    Fieldsense,
}

impl RendererKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RendererKind::Elastic => "elastic",
            RendererKind::Otel => "otel",
            RendererKind::Fieldsense => "fieldsense",
        }
    }
}

impl FromStr for RendererKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, ParseError> {
        match s {
            "elastic" => Ok(RendererKind::Elastic),
            "otel" => Ok(RendererKind::Otel),
            "fieldsense" => Ok(RendererKind::Fieldsense),
            other => Err(ParseError::Renderer(other.to_string())),
        }
    }
}

/// Where rendered documents go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkMode {
    /// NDJSON bulk requests against an HTTP endpoint.
    Http,
    /// NDJSON on stdout, one document per line.
    #[default]
    Stdout,
}

/// Bulk sink configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// Transport mode. Default: stdout.
    #[serde(default)]
    pub mode: SinkMode,

    /// Bulk endpoint URL for http mode (e.g. "http://localhost:9200/_bulk").
    #[serde(default = "default_address")]
    pub address: String,

    /// Additional HTTP headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Gzip-compress bulk request bodies. Default: true.
    #[serde(default = "default_true")]
    pub gzip: bool,

    /// Maximum duration for one bulk request. Default: 30s.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum documents to queue before producers block. Default: 4096.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Maximum documents per batch. Default: 500.
    #[serde(default = "default_batch_max_docs")]
    pub batch_max_docs: usize,

    /// Approximate maximum batch payload in bytes. Default: 1MB.
    #[serde(default = "default_batch_max_bytes")]
    pub batch_max_bytes: usize,

    /// Maximum wait before a partial batch is sent. Default: 1s.
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Number of concurrent bulk submissions. Default: 2.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Retries per batch before it is dropped. Default: 3.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base delay between retries, doubled per attempt. Default: 500ms.
    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,
}

/// Settings derived from the raw config strings.
#[derive(Debug, Clone, Copy)]
pub struct RunPlan {
    /// Parsed tick interval.
    pub interval: Duration,
    /// Resolved backfill start. Equal to `now` means no backfill.
    pub backfill_start: DateTime<Utc>,
}

/// Errors from the interval and date-math grammars.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid interval {0:?}: expected {{integer}}{{s|m}}")]
    Interval(String),

    #[error("interval {0:?} must be greater than zero")]
    ZeroInterval(String),

    #[error("invalid date math {0:?}: expected now or now-{{integer}}{{s|m|h|d}}")]
    DateMath(String),

    #[error("unknown dataset {0:?}: expected hosts or weather")]
    Dataset(String),

    #[error("unknown renderer {0:?}: expected elastic, otel, or fieldsense")]
    Renderer(String),
}

/// Parses the interval grammar `{integer}{s|m}`.
pub fn parse_interval(input: &str) -> Result<Duration, ParseError> {
    let trimmed = input.trim();
    if trimmed.len() < 2 {
        return Err(ParseError::Interval(input.to_string()));
    }

    let (digits, unit) = trimmed.split_at(trimmed.len() - 1);
    let value: u64 = digits
        .parse()
        .map_err(|_| ParseError::Interval(input.to_string()))?;

    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        _ => return Err(ParseError::Interval(input.to_string())),
    };

    if seconds == 0 {
        return Err(ParseError::ZeroInterval(input.to_string()));
    }
    Ok(Duration::from_secs(seconds))
}

/// Resolves the date-math grammar `now` or `now-{integer}{s|m|h|d}` against
/// an explicit reference instant.
pub fn resolve_date_math(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ParseError> {
    let trimmed = input.trim();
    if trimmed == "now" {
        return Ok(now);
    }

    let Some(offset) = trimmed.strip_prefix("now-") else {
        return Err(ParseError::DateMath(input.to_string()));
    };
    if offset.len() < 2 {
        return Err(ParseError::DateMath(input.to_string()));
    }

    let (digits, unit) = offset.split_at(offset.len() - 1);
    let value: i64 = digits
        .parse()
        .map_err(|_| ParseError::DateMath(input.to_string()))?;

    let delta = match unit {
        "s" => chrono::Duration::seconds(value),
        "m" => chrono::Duration::minutes(value),
        "h" => chrono::Duration::hours(value),
        "d" => chrono::Duration::days(value),
        _ => return Err(ParseError::DateMath(input.to_string())),
    };

    Ok(now - delta)
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_entity_count() -> usize {
    100
}

fn default_entity_prefix() -> String {
    "host".to_string()
}

fn default_interval() -> String {
    "10s".to_string()
}

fn default_backfill() -> String {
    "now".to_string()
}

fn default_renderers() -> Vec<RendererKind> {
    vec![RendererKind::Elastic]
}

fn default_address() -> String {
    "http://localhost:9200/_bulk".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_queue_size() -> usize {
    4096
}

fn default_batch_max_docs() -> usize {
    500
}

fn default_batch_max_bytes() -> usize {
    1024 * 1024 // 1MB
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_workers() -> usize {
    2
}

fn default_retries() -> u32 {
    3
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(500)
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dataset: Dataset::default(),
            entity_count: default_entity_count(),
            entity_prefix: default_entity_prefix(),
            interval: default_interval(),
            backfill: default_backfill(),
            renderers: default_renderers(),
            sink: SinkConfig::default(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            mode: SinkMode::default(),
            address: default_address(),
            headers: HashMap::new(),
            gzip: true,
            request_timeout: default_request_timeout(),
            max_queue_size: default_max_queue_size(),
            batch_max_docs: default_batch_max_docs(),
            batch_max_bytes: default_batch_max_bytes(),
            flush_interval: default_flush_interval(),
            workers: default_workers(),
            retries: default_retries(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.entity_count == 0 {
            bail!("entity_count must be positive");
        }

        if self.entity_prefix.is_empty() {
            bail!("entity_prefix is required");
        }

        if self.renderers.is_empty() {
            bail!("at least one renderer is required");
        }

        let mut seen = HashSet::new();
        for renderer in &self.renderers {
            if !seen.insert(*renderer) {
                bail!("renderer listed more than once: {}", renderer.as_str());
            }
        }

        parse_interval(&self.interval)?;
        resolve_date_math(&self.backfill, Utc::now())?;

        if self.sink.mode == SinkMode::Http && self.sink.address.is_empty() {
            bail!("sink.address is required for http mode");
        }
        if self.sink.max_queue_size == 0 {
            bail!("sink.max_queue_size must be positive");
        }
        if self.sink.batch_max_docs == 0 {
            bail!("sink.batch_max_docs must be positive");
        }
        if self.sink.batch_max_bytes == 0 {
            bail!("sink.batch_max_bytes must be positive");
        }
        if self.sink.workers == 0 {
            bail!("sink.workers must be positive");
        }

        Ok(())
    }

    /// Resolves the interval and backfill strings against a reference
    /// instant. The instant is passed in so the whole run shares one `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<RunPlan> {
        let interval = parse_interval(&self.interval)?;
        let backfill_start = resolve_date_math(&self.backfill, now)?;
        Ok(RunPlan {
            interval,
            backfill_start,
        })
    }
}
