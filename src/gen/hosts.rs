//! Host infrastructure metrics: CPU decomposed per core, load averages,
//! memory, filesystem, network and disk I/O counters.

use chrono::{DateTime, Timelike, Utc};
use rand::Rng;

use crate::entity::EntityConfig;
use crate::ledger::CounterLedger;
use crate::seed;

/// CPU state fractions for one core (or the aggregate). All states sum to
/// 1.0; `idle` is computed as the complement of the busy states.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoreStates {
    pub user: f64,
    pub system: f64,
    pub iowait: f64,
    pub nice: f64,
    pub irq: f64,
    pub softirq: f64,
    pub idle: f64,
}

impl CoreStates {
    pub fn busy(&self) -> f64 {
        1.0 - self.idle
    }

    /// Arithmetic mean of a set of cores. The aggregate CPU values are
    /// defined as this mean, so sub-unit consistency holds by construction.
    pub fn mean(cores: &[CoreMetrics]) -> CoreStates {
        let n = cores.len().max(1) as f64;
        let mut total = CoreStates::default();
        for core in cores {
            total.user += core.states.user;
            total.system += core.states.system;
            total.iowait += core.states.iowait;
            total.nice += core.states.nice;
            total.irq += core.states.irq;
            total.softirq += core.states.softirq;
            total.idle += core.states.idle;
        }
        CoreStates {
            user: total.user / n,
            system: total.system / n,
            iowait: total.iowait / n,
            nice: total.nice / n,
            irq: total.irq / n,
            softirq: total.softirq / n,
            idle: total.idle / n,
        }
    }
}

/// Cumulative CPU time per state in milliseconds, as returned by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CpuTimeMs {
    pub user: f64,
    pub system: f64,
    pub iowait: f64,
    pub idle: f64,
}

/// One core's instantaneous state fractions and cumulative CPU time.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreMetrics {
    pub states: CoreStates,
    pub cpu_time_ms: CpuTimeMs,
}

/// Cumulative traffic totals for one network interface.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceMetrics {
    pub name: String,
    pub in_bytes: f64,
    pub out_bytes: f64,
    pub in_packets: f64,
    pub out_packets: f64,
}

/// Cumulative disk I/O totals.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiskIoTotals {
    pub read_bytes: f64,
    pub write_bytes: f64,
    pub read_ops: f64,
    pub write_ops: f64,
}

/// All host-level measured values for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct HostMetrics {
    pub cores: Vec<CoreMetrics>,
    /// Exact arithmetic mean of `cores`.
    pub total: CoreStates,
    pub load_1m: f64,
    pub load_5m: f64,
    pub load_15m: f64,
    pub cpu_temperature_c: f64,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub memory_cached_bytes: u64,
    pub memory_free_bytes: u64,
    /// Used memory as a fraction of total, 0..1.
    pub memory_used_pct: f64,
    pub fs_total_bytes: u64,
    pub fs_used_bytes: u64,
    pub fs_free_bytes: u64,
    /// Used filesystem space as a fraction of total, 0..1.
    pub fs_used_pct: f64,
    pub interfaces: Vec<InterfaceMetrics>,
    pub disk: DiskIoTotals,
}

/// Baseline utilization band by hour of day: elevated during the 9-17
/// working window, moderate through the evening, low overnight.
fn diurnal_band(hour: u32) -> f64 {
    match hour {
        9..=17 => 0.55,
        18..=22 => 0.30,
        _ => 0.12,
    }
}

/// The per-tick utilization anchor every CPU-derived gauge hangs off.
pub fn diurnal_anchor(entity_id: &str, timestamp: DateTime<Utc>) -> f64 {
    let band = diurnal_band(timestamp.hour());
    let mut rng = seed::tick_rng(entity_id, timestamp, "cpu_anchor");
    (band + rng.gen_range(-0.08..0.08)).clamp(0.02, 0.95)
}

/// Generates host metrics for one tick around the given utilization anchor.
pub fn generate(
    config: &EntityConfig,
    ledger: &mut CounterLedger,
    timestamp: DateTime<Utc>,
    elapsed_secs: f64,
    anchor: f64,
) -> HostMetrics {
    let id = config.id.as_str();
    let core_count = config.cores();

    // Per-core decomposition. Each core's states sum to its own 100%; the
    // aggregate is the exact mean of the cores.
    let mut cores = Vec::with_capacity(core_count);
    for core_index in 0..core_count {
        let states = core_states(id, timestamp, core_index, anchor);
        let cpu_time_ms = integrate_cpu_time(ledger, core_index, &states, elapsed_secs);
        cores.push(CoreMetrics {
            states,
            cpu_time_ms,
        });
    }
    let total = CoreStates::mean(&cores);

    // Load averages: same anchor, independent jitter, smoothed toward the
    // longer windows.
    let mut rng = seed::tick_rng(id, timestamp, "load");
    let load_1m = (anchor * core_count as f64 * rng.gen_range(0.85..1.25)).max(0.0);
    let load_5m = (load_1m * rng.gen_range(0.88..1.02)).max(0.0);
    let load_15m = (load_5m * rng.gen_range(0.90..1.02)).max(0.0);

    let mut rng = seed::tick_rng(id, timestamp, "cpu_temp");
    let cpu_temperature_c = 34.0 + anchor * 38.0 + rng.gen_range(-1.5..1.5);

    // Memory: usage tracks the anchor loosely; cache takes a share of the
    // remainder so totals always reconcile.
    let memory_total_bytes = config.machine_class.memory_bytes;
    let mut rng = seed::tick_rng(id, timestamp, "memory");
    let used_fraction = (0.25 + anchor * 0.55 + rng.gen_range(-0.05..0.05)).clamp(0.05, 0.97);
    let memory_used_bytes = (memory_total_bytes as f64 * used_fraction) as u64;
    let memory_cached_bytes =
        ((memory_total_bytes - memory_used_bytes) as f64 * rng.gen_range(0.25..0.40)) as u64;
    let memory_free_bytes = memory_total_bytes - memory_used_bytes - memory_cached_bytes;

    // Filesystem: a per-entity stable fill level with slow per-tick drift.
    let fs_base = 0.30 + (seed::stable_hash64(&format!("{id}|fs_base")) % 1000) as f64 / 1000.0 * 0.45;
    let mut rng = seed::tick_rng(id, timestamp, "filesystem");
    let fs_used_pct = (fs_base + rng.gen_range(-0.01..0.01)).clamp(0.01, 0.99);
    let fs_total_bytes = config.disk_total_bytes;
    let fs_used_bytes = (fs_total_bytes as f64 * fs_used_pct) as u64;
    let fs_free_bytes = fs_total_bytes - fs_used_bytes;

    // Network: instantaneous rates integrated into cumulative counters.
    let mut interfaces = Vec::with_capacity(config.interfaces.len());
    for iface in &config.interfaces {
        let mut rng = seed::tick_rng(id, timestamp, &format!("net_{iface}"));
        let in_rate = anchor * 6.0e6 * rng.gen_range(0.7..1.3);
        let out_rate = in_rate * rng.gen_range(0.3..0.8);
        let in_pkt_rate = in_rate / rng.gen_range(600.0..1200.0);
        let out_pkt_rate = out_rate / rng.gen_range(600.0..1200.0);

        interfaces.push(InterfaceMetrics {
            name: iface.clone(),
            in_bytes: ledger.increment(&format!("net:{iface}:in_bytes"), in_rate * elapsed_secs),
            out_bytes: ledger.increment(&format!("net:{iface}:out_bytes"), out_rate * elapsed_secs),
            in_packets: ledger
                .increment(&format!("net:{iface}:in_packets"), in_pkt_rate * elapsed_secs),
            out_packets: ledger
                .increment(&format!("net:{iface}:out_packets"), out_pkt_rate * elapsed_secs),
        });
    }

    // Disk I/O, same integration scheme.
    let mut rng = seed::tick_rng(id, timestamp, "diskio");
    let read_rate = anchor * 2.5e6 * rng.gen_range(0.6..1.4);
    let write_rate = anchor * 1.8e6 * rng.gen_range(0.6..1.4);
    let read_ops_rate = read_rate / rng.gen_range(32.0e3..128.0e3);
    let write_ops_rate = write_rate / rng.gen_range(32.0e3..128.0e3);
    let disk = DiskIoTotals {
        read_bytes: ledger.increment("disk:read_bytes", read_rate * elapsed_secs),
        write_bytes: ledger.increment("disk:write_bytes", write_rate * elapsed_secs),
        read_ops: ledger.increment("disk:read_ops", read_ops_rate * elapsed_secs),
        write_ops: ledger.increment("disk:write_ops", write_ops_rate * elapsed_secs),
    };

    HostMetrics {
        cores,
        total,
        load_1m,
        load_5m,
        load_15m,
        cpu_temperature_c,
        memory_total_bytes,
        memory_used_bytes,
        memory_cached_bytes,
        memory_free_bytes,
        memory_used_pct: used_fraction,
        fs_total_bytes,
        fs_used_bytes,
        fs_free_bytes,
        fs_used_pct,
        interfaces,
        disk,
    }
}

/// Draws one core's state fractions around the anchor. Busy is split across
/// the non-idle states by normalized weights; idle is the complement so the
/// states always sum to 1.
fn core_states(
    entity_id: &str,
    timestamp: DateTime<Utc>,
    core_index: usize,
    anchor: f64,
) -> CoreStates {
    let mut rng = seed::tick_rng(entity_id, timestamp, &format!("cpu_core_{core_index}"));
    let busy = (anchor + rng.gen_range(-0.10..0.10)).clamp(0.01, 0.98);

    let w_user = rng.gen_range(0.55..0.70);
    let w_system = rng.gen_range(0.15..0.25);
    let w_iowait = rng.gen_range(0.02..0.08);
    let w_nice = rng.gen_range(0.0..0.03);
    let w_irq = rng.gen_range(0.005..0.015);
    let w_softirq = rng.gen_range(0.005..0.020);
    let w_sum = w_user + w_system + w_iowait + w_nice + w_irq + w_softirq;

    let user = busy * w_user / w_sum;
    let system = busy * w_system / w_sum;
    let iowait = busy * w_iowait / w_sum;
    let nice = busy * w_nice / w_sum;
    let irq = busy * w_irq / w_sum;
    let softirq = busy * w_softirq / w_sum;
    let idle = 1.0 - (user + system + iowait + nice + irq + softirq);

    CoreStates {
        user,
        system,
        iowait,
        nice,
        irq,
        softirq,
        idle,
    }
}

/// Feeds one core's state fractions through the ledger as CPU time in
/// milliseconds and returns the cumulative totals.
fn integrate_cpu_time(
    ledger: &mut CounterLedger,
    core_index: usize,
    states: &CoreStates,
    elapsed_secs: f64,
) -> CpuTimeMs {
    let ms = elapsed_secs * 1000.0;
    CpuTimeMs {
        user: ledger.increment(
            &format!("cpu_time:core={core_index}:state=user"),
            states.user * ms,
        ),
        system: ledger.increment(
            &format!("cpu_time:core={core_index}:state=system"),
            states.system * ms,
        ),
        iowait: ledger.increment(
            &format!("cpu_time:core={core_index}:state=iowait"),
            states.iowait * ms,
        ),
        idle: ledger.increment(
            &format!("cpu_time:core={core_index}:state=idle"),
            states.idle * ms,
        ),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::entity::ConfigStore;

    fn fixture() -> (std::sync::Arc<EntityConfig>, CounterLedger, DateTime<Utc>) {
        let mut store = ConfigStore::new();
        let config = store.get_or_create("host-00001");
        let ts = Utc.with_ymd_and_hms(2024, 6, 3, 14, 30, 0).single().expect("valid ts");
        (config, CounterLedger::new(), ts)
    }

    #[test]
    fn test_core_states_sum_to_one() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 3, 14, 30, 0).single().expect("valid ts");
        for core in 0..16 {
            let states = core_states("host-00001", ts, core, 0.5);
            let sum = states.user
                + states.system
                + states.iowait
                + states.nice
                + states.irq
                + states.softirq
                + states.idle;
            assert!((sum - 1.0).abs() < 1e-9, "core {core} states sum to {sum}");
            assert!(states.idle >= 0.0);
        }
    }

    #[test]
    fn test_aggregate_is_mean_of_cores() {
        let (config, mut ledger, ts) = fixture();
        let host = generate(&config, &mut ledger, ts, 10.0, 0.5);

        let n = host.cores.len() as f64;
        let mean_user: f64 = host.cores.iter().map(|c| c.states.user).sum::<f64>() / n;
        let mean_idle: f64 = host.cores.iter().map(|c| c.states.idle).sum::<f64>() / n;
        assert!((host.total.user - mean_user).abs() < 1e-12);
        assert!((host.total.idle - mean_idle).abs() < 1e-12);
    }

    #[test]
    fn test_diurnal_band_shape() {
        let day = Utc.with_ymd_and_hms(2024, 6, 3, 11, 0, 0).single().expect("valid ts");
        let evening = Utc.with_ymd_and_hms(2024, 6, 3, 20, 0, 0).single().expect("valid ts");
        let night = Utc.with_ymd_and_hms(2024, 6, 3, 3, 0, 0).single().expect("valid ts");

        // Anchors carry jitter; the bands are far enough apart that the
        // ordering still holds for any draw.
        let a_day = diurnal_anchor("host-00001", day);
        let a_evening = diurnal_anchor("host-00001", evening);
        let a_night = diurnal_anchor("host-00001", night);
        assert!(a_day > a_evening, "day {a_day} <= evening {a_evening}");
        assert!(a_evening > a_night, "evening {a_evening} <= night {a_night}");
    }

    #[test]
    fn test_memory_reconciles() {
        let (config, mut ledger, ts) = fixture();
        let host = generate(&config, &mut ledger, ts, 10.0, 0.5);
        assert_eq!(
            host.memory_total_bytes,
            host.memory_used_bytes + host.memory_cached_bytes + host.memory_free_bytes,
        );
        assert!(host.memory_used_pct > 0.0 && host.memory_used_pct < 1.0);
    }

    #[test]
    fn test_filesystem_reconciles() {
        let (config, mut ledger, ts) = fixture();
        let host = generate(&config, &mut ledger, ts, 10.0, 0.5);
        assert_eq!(host.fs_total_bytes, host.fs_used_bytes + host.fs_free_bytes);
    }

    #[test]
    fn test_cpu_time_counters_scale_with_elapsed() {
        let (config, mut ledger_a, ts) = fixture();
        let mut ledger_b = CounterLedger::new();
        let short = generate(&config, &mut ledger_a, ts, 1.0, 0.5);
        let long = generate(&config, &mut ledger_b, ts, 100.0, 0.5);
        // Same fractions, 100x the elapsed time, 100x the first-tick total.
        let s = short.cores[0].cpu_time_ms.user;
        let l = long.cores[0].cpu_time_ms.user;
        assert!((l / s - 100.0).abs() < 1e-6, "expected 100x, got {}", l / s);
    }

    #[test]
    fn test_one_interface_entry_per_configured_interface() {
        let (config, mut ledger, ts) = fixture();
        let host = generate(&config, &mut ledger, ts, 10.0, 0.5);
        assert_eq!(host.interfaces.len(), config.interfaces.len());
    }
}
