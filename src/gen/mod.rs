//! Tick Metrics Generator: produces one immutable [`MetricsSnapshot`] per
//! `(entity, timestamp)` tick from deterministic inputs only. Renderers
//! consume the snapshot without ever consulting the ledger or config store
//! again.

pub mod hosts;
pub mod weather;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Dataset;
use crate::entity::EntityConfig;
use crate::ledger::CounterLedger;

pub use hosts::{CoreMetrics, CoreStates, CpuTimeMs, DiskIoTotals, HostMetrics, InterfaceMetrics};
pub use weather::{WeatherCondition, WeatherMetrics};

/// The complete, immutable set of measured values for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub config: Arc<EntityConfig>,
    pub timestamp: DateTime<Utc>,
    /// Seconds since this entity's previous tick (the configured interval on
    /// the very first tick).
    pub elapsed_secs: f64,
    pub host: HostMetrics,
    /// Present only for the weather dataset.
    pub weather: Option<WeatherMetrics>,
}

/// Generates the snapshot for one tick.
///
/// Every draw is seeded from `(entity id, timestamp, field salt)`; repeated
/// calls with identical arguments and identical ledger state yield identical
/// snapshots. Counter-backed quantities are integrated through `ledger`
/// (rate x elapsed seconds), and the snapshot stores the ledger's returned
/// cumulative values.
pub fn generate(
    dataset: Dataset,
    config: &Arc<EntityConfig>,
    ledger: &mut CounterLedger,
    timestamp: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
    default_interval_secs: f64,
) -> MetricsSnapshot {
    let elapsed_secs = previous
        .map(|p| (timestamp - p).num_milliseconds() as f64 / 1000.0)
        .filter(|secs| *secs > 0.0)
        .unwrap_or(default_interval_secs);

    let weather = match dataset {
        Dataset::Weather => Some(weather::generate(config, timestamp)),
        Dataset::Hosts => None,
    };

    // The weather variant drives the station computer's load from the
    // battery/irradiance state so the whole snapshot stays coherent;
    // plain hosts anchor on the diurnal curve.
    let anchor = weather
        .as_ref()
        .map(|w| w.compute_load)
        .unwrap_or_else(|| hosts::diurnal_anchor(&config.id, timestamp));

    let host = hosts::generate(config, ledger, timestamp, elapsed_secs, anchor);

    MetricsSnapshot {
        config: Arc::clone(config),
        timestamp,
        elapsed_secs,
        host,
        weather,
    }
}
