//! Producer pipeline: schedules ticks (historical backfill followed by
//! realtime), turns each (entity, timestamp) pair into rendered documents,
//! and feeds the bulk sink. Backpressure from the sink propagates here
//! through the bounded channel, so generation slows down rather than
//! dropping ticks.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Dataset;
use crate::entity::ConfigStore;
use crate::gen;
use crate::ledger::CounterLedger;
use crate::render::{Renderer, WireDocument};
use crate::sink::BulkSink;

/// Pipeline lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Replaying historical ticks as fast as the sink accepts them.
    Backfilling,
    /// Backfill finished; waiting for queued submissions to settle.
    Draining,
    /// Emitting ticks on the wall-clock interval.
    Realtime,
    Stopped,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Backfilling => "backfilling",
            Phase::Draining => "draining",
            Phase::Realtime => "realtime",
            Phase::Stopped => "stopped",
        }
    }
}

/// Yields the historical tick timestamps `start + k * interval` for every
/// `k` where the result is strictly before `until`. An empty schedule means
/// no backfill.
pub fn backfill_schedule(
    start: DateTime<Utc>,
    until: DateTime<Utc>,
    interval: Duration,
) -> impl Iterator<Item = DateTime<Utc>> {
    let step_ms = interval.as_millis().min(i64::MAX as u128) as i64;
    (0i64..)
        .map(move |k| start + chrono::Duration::milliseconds(step_ms.saturating_mul(k)))
        .take_while(move |ts| *ts < until)
}

/// Per-run simulation state: the entity config cache plus each entity's
/// counter ledger and last tick timestamp. Owned by one pipeline; never
/// shared across runs so restarts reset counters.
#[derive(Default)]
pub struct SimContext {
    pub store: ConfigStore,
    pub ledgers: HashMap<String, CounterLedger>,
    pub last_tick: HashMap<String, DateTime<Utc>>,
}

impl SimContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Transform Stage: maps one (entity, timestamp) tick to the documents of
/// every configured output format.
pub struct TransformStage {
    ctx: SimContext,
    dataset: Dataset,
    renderers: Vec<Renderer>,
    interval_secs: f64,
}

impl TransformStage {
    pub fn new(dataset: Dataset, renderers: Vec<Renderer>, interval: Duration) -> Self {
        Self {
            ctx: SimContext::new(),
            dataset,
            renderers,
            interval_secs: interval.as_secs_f64(),
        }
    }

    /// Generates one tick for one entity and renders it into every format.
    /// State updates (ledger totals, last tick) happen here, exactly once
    /// per call, so each tick is integrated exactly once no matter how many
    /// renderers run.
    pub fn process(
        &mut self,
        entity_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<WireDocument>> {
        let config = self.ctx.store.get_or_create(entity_id);
        let ledger = self
            .ctx
            .ledgers
            .entry(entity_id.to_string())
            .or_default();
        let previous = self.ctx.last_tick.insert(entity_id.to_string(), timestamp);

        let snapshot = gen::generate(
            self.dataset,
            &config,
            ledger,
            timestamp,
            previous,
            self.interval_secs,
        );

        let mut documents = Vec::new();
        for renderer in &self.renderers {
            documents.extend(renderer.render(&snapshot));
        }
        Ok(documents)
    }
}

/// Pipeline settings, already resolved from configuration.
pub struct PipelineOptions {
    pub dataset: Dataset,
    pub renderers: Vec<Renderer>,
    pub entity_count: usize,
    pub entity_prefix: String,
    pub interval: Duration,
    pub backfill_start: DateTime<Utc>,
}

/// Drives the tick schedule through the transform stage into the sink.
pub struct Pipeline {
    phase: Phase,
    transform: TransformStage,
    entities: Vec<String>,
    interval: Duration,
    backfill_start: DateTime<Utc>,
    sink: BulkSink,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(options: PipelineOptions, sink: BulkSink, cancel: CancellationToken) -> Self {
        let entities = entity_ids(&options.entity_prefix, options.entity_count);
        Self {
            phase: Phase::Backfilling,
            transform: TransformStage::new(options.dataset, options.renderers, options.interval),
            entities,
            interval: options.interval,
            backfill_start: options.backfill_start,
            sink,
            cancel,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        info!(phase = phase.as_str(), "pipeline phase changed");
    }

    /// Runs backfill, drain, then realtime until cancellation.
    pub async fn run(mut self) -> Result<()> {
        self.run_backfill().await?;
        if !self.cancel.is_cancelled() {
            self.drain().await?;
            self.run_realtime().await?;
        }
        self.set_phase(Phase::Stopped);
        self.sink.flush().await
    }

    /// Replays historical ticks entity by entity, as fast as the sink
    /// accepts them. Ticks are ordered by timestamp so counters integrate
    /// forward in time.
    pub async fn run_backfill(&mut self) -> Result<()> {
        self.set_phase(Phase::Backfilling);
        let until = Utc::now();
        let mut ticks = 0usize;

        info!(
            start = %self.backfill_start,
            until = %until,
            interval_secs = self.interval.as_secs(),
            entities = self.entities.len(),
            "backfill started",
        );

        for timestamp in backfill_schedule(self.backfill_start, until, self.interval) {
            for index in 0..self.entities.len() {
                if self.cancel.is_cancelled() {
                    info!(ticks, "backfill interrupted");
                    return Ok(());
                }
                self.emit(index, timestamp).await?;
            }
            ticks += 1;
        }

        info!(ticks, "backfill complete");
        Ok(())
    }

    /// Waits for every backfill document to clear the sink before realtime
    /// emission starts.
    pub async fn drain(&mut self) -> Result<()> {
        self.set_phase(Phase::Draining);
        self.sink.flush().await
    }

    /// Emits one sweep across all entities per interval. The first sweep
    /// fires immediately; sweeps missed while the sink applies backpressure
    /// are skipped rather than bunched.
    pub async fn run_realtime(&mut self) -> Result<()> {
        self.set_phase(Phase::Realtime);
        info!(interval_secs = self.interval.as_secs(), "realtime started");

        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = timer.tick() => {
                    let timestamp = Utc::now();
                    for index in 0..self.entities.len() {
                        if self.cancel.is_cancelled() {
                            return Ok(());
                        }
                        self.emit(index, timestamp).await?;
                    }
                }
            }
        }
    }

    /// Processes one tick for one entity. Generation failures and panics
    /// are logged and the tick skipped; only sink teardown aborts the run.
    async fn emit(&mut self, entity_index: usize, timestamp: DateTime<Utc>) -> Result<()> {
        let documents = contain_tick_panics(&self.entities[entity_index], timestamp, || {
            self.transform.process(&self.entities[entity_index], timestamp)
        });
        let Some(documents) = documents else {
            return Ok(());
        };
        for document in documents {
            self.sink.push(document).await?;
        }
        Ok(())
    }
}

/// Runs one tick's generation with panic containment: an error or panic is
/// logged with the entity and timestamp, and the tick is skipped so the
/// rest of the run continues. Generation is synchronous and owns no locks
/// across the call, so unwinding here leaves no broken state behind.
fn contain_tick_panics<F>(
    entity_id: &str,
    timestamp: DateTime<Utc>,
    tick: F,
) -> Option<Vec<WireDocument>>
where
    F: FnOnce() -> Result<Vec<WireDocument>>,
{
    match catch_unwind(AssertUnwindSafe(tick)) {
        Ok(Ok(documents)) => Some(documents),
        Ok(Err(err)) => {
            warn!(
                entity = %entity_id,
                timestamp = %timestamp,
                error = %err,
                "tick generation failed, skipping",
            );
            None
        }
        Err(payload) => {
            warn!(
                entity = %entity_id,
                timestamp = %timestamp,
                reason = panic_message(payload.as_ref()),
                "tick generation panicked, skipping",
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Entity IDs are derived from the prefix and a zero-padded ordinal, so the
/// same configuration always simulates the same fleet.
pub fn entity_ids(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}-{i:05}")).collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, m, s).single().expect("valid ts")
    }

    #[test]
    fn test_backfill_schedule_counts_whole_intervals() {
        // 30s window at 10s spacing: ticks at -30, -20, -10.
        let until = ts(14, 0, 30);
        let start = ts(14, 0, 0);
        let schedule: Vec<_> =
            backfill_schedule(start, until, Duration::from_secs(10)).collect();
        assert_eq!(schedule, vec![ts(14, 0, 0), ts(14, 0, 10), ts(14, 0, 20)]);
    }

    #[test]
    fn test_backfill_schedule_rounds_partial_window_up() {
        // 25s window at 10s spacing still yields 3 ticks, all before until.
        let until = ts(14, 0, 25);
        let start = ts(14, 0, 0);
        let schedule: Vec<_> =
            backfill_schedule(start, until, Duration::from_secs(10)).collect();
        assert_eq!(schedule.len(), 3);
        assert!(schedule.iter().all(|t| *t < until));
    }

    #[test]
    fn test_backfill_schedule_empty_when_start_is_now() {
        let now = ts(14, 0, 0);
        let schedule: Vec<_> = backfill_schedule(now, now, Duration::from_secs(10)).collect();
        assert!(schedule.is_empty());
    }

    #[test]
    fn test_entity_ids_are_stable_and_padded() {
        let ids = entity_ids("host", 3);
        assert_eq!(ids, vec!["host-00000", "host-00001", "host-00002"]);
    }

    #[test]
    fn test_transform_tracks_previous_tick_per_entity() {
        let mut stage = TransformStage::new(
            Dataset::Hosts,
            vec![Renderer::Elastic],
            Duration::from_secs(10),
        );

        stage.process("host-00000", ts(14, 0, 0)).expect("tick");
        stage.process("host-00001", ts(14, 0, 0)).expect("tick");
        stage.process("host-00000", ts(14, 0, 10)).expect("tick");

        assert_eq!(stage.ctx.last_tick["host-00000"], ts(14, 0, 10));
        assert_eq!(stage.ctx.last_tick["host-00001"], ts(14, 0, 0));
        assert_eq!(stage.ctx.ledgers.len(), 2);
    }

    #[test]
    fn test_transform_counters_are_monotonic_across_ticks() {
        let mut stage = TransformStage::new(
            Dataset::Hosts,
            vec![Renderer::Elastic],
            Duration::from_secs(10),
        );

        let read_bytes = |docs: &[WireDocument]| -> f64 {
            docs.iter()
                .find(|d| d.index == "metrics-system.diskio-default")
                .and_then(|d| d.body["system"]["diskio"]["read"]["bytes"].as_f64())
                .expect("diskio doc")
        };

        let first = read_bytes(&stage.process("host-00000", ts(14, 0, 0)).expect("tick"));
        let second = read_bytes(&stage.process("host-00000", ts(14, 0, 10)).expect("tick"));
        let third = read_bytes(&stage.process("host-00000", ts(14, 0, 20)).expect("tick"));
        assert!(second > first);
        assert!(third > second);
    }

    #[test]
    fn test_tick_panic_is_contained() {
        let out = contain_tick_panics("host-00000", ts(14, 0, 0), || panic!("bad draw"));
        assert!(out.is_none());

        let out = contain_tick_panics("host-00000", ts(14, 0, 0), || {
            panic!("{}", format!("bad draw for core {}", 3))
        });
        assert!(out.is_none());
    }

    #[test]
    fn test_tick_error_is_contained() {
        let out =
            contain_tick_panics("host-00000", ts(14, 0, 0), || anyhow::bail!("derivation failed"));
        assert!(out.is_none());

        let out = contain_tick_panics("host-00000", ts(14, 0, 0), || Ok(Vec::new()));
        assert!(matches!(out, Some(ref docs) if docs.is_empty()));
    }

    #[test]
    fn test_transform_fans_out_to_all_renderers() {
        let mut single = TransformStage::new(
            Dataset::Hosts,
            vec![Renderer::Elastic],
            Duration::from_secs(10),
        );
        let mut all = TransformStage::new(
            Dataset::Hosts,
            vec![Renderer::Elastic, Renderer::Otel, Renderer::Fieldsense],
            Duration::from_secs(10),
        );

        let single_docs = single.process("host-00000", ts(14, 0, 0)).expect("tick");
        let all_docs = all.process("host-00000", ts(14, 0, 0)).expect("tick");
        assert!(all_docs.len() > single_docs.len());
    }
}
