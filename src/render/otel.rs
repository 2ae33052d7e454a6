//! OpenTelemetry-flavoured renderer: one document per (metric group,
//! attribute set), each carrying resource attributes, an `attributes`
//! object, and a `metrics` object of semantic-convention names. Utilization
//! metrics are fractions in 0..1.

use chrono::SecondsFormat;
use serde_json::{json, Value};

use super::{attach_fingerprint, WireDocument};
use crate::gen::MetricsSnapshot;

const INDEX: &str = "metrics-generic.otel-default";

pub fn render(snapshot: &MetricsSnapshot) -> Vec<WireDocument> {
    let host = &snapshot.host;
    let mut docs = Vec::new();

    // Aggregate CPU utilization, one data point per state.
    for (state, fraction) in [
        ("user", host.total.user),
        ("system", host.total.system),
        ("wait", host.total.iowait),
        ("nice", host.total.nice),
        ("interrupt", host.total.irq + host.total.softirq),
        ("idle", host.total.idle),
    ] {
        docs.push(data_point(
            snapshot,
            json!({"state": state}),
            json!({"system.cpu.utilization": fraction}),
        ));
    }

    // Cumulative CPU time per core and state, seconds.
    for (index, core) in host.cores.iter().enumerate() {
        for (state, total_ms) in [
            ("user", core.cpu_time_ms.user),
            ("system", core.cpu_time_ms.system),
            ("wait", core.cpu_time_ms.iowait),
            ("idle", core.cpu_time_ms.idle),
        ] {
            docs.push(data_point(
                snapshot,
                json!({"cpu": index.to_string(), "state": state}),
                json!({"system.cpu.time": total_ms / 1000.0}),
            ));
        }
    }

    // Load averages, raw and per-cpu.
    let cores = host.cores.len() as f64;
    docs.push(data_point(
        snapshot,
        json!({}),
        json!({
            "system.cpu.load_average.1m": host.load_1m,
            "system.cpu.load_average.5m": host.load_5m,
            "system.cpu.load_average.15m": host.load_15m,
            "system.cpu.load_average.per_cpu.1m": host.load_1m / cores,
            "system.cpu.load_average.per_cpu.5m": host.load_5m / cores,
            "system.cpu.load_average.per_cpu.15m": host.load_15m / cores,
        }),
    ));

    // Memory usage by state.
    let total = host.memory_total_bytes as f64;
    for (state, bytes) in [
        ("used", host.memory_used_bytes),
        ("free", host.memory_free_bytes),
        ("cached", host.memory_cached_bytes),
    ] {
        docs.push(data_point(
            snapshot,
            json!({"state": state}),
            json!({
                "system.memory.usage": bytes,
                "system.memory.utilization": bytes as f64 / total,
            }),
        ));
    }

    // Filesystem usage.
    docs.push(data_point(
        snapshot,
        json!({"mountpoint": "/"}),
        json!({
            "system.filesystem.usage": host.fs_used_bytes,
            "system.filesystem.utilization": host.fs_used_pct,
        }),
    ));

    // Network I/O counters per device and direction.
    for iface in &host.interfaces {
        for (direction, bytes, packets) in [
            ("receive", iface.in_bytes, iface.in_packets),
            ("transmit", iface.out_bytes, iface.out_packets),
        ] {
            docs.push(data_point(
                snapshot,
                json!({"device": iface.name, "direction": direction}),
                json!({
                    "system.network.io": bytes,
                    "system.network.packets": packets,
                }),
            ));
        }
    }

    // Disk I/O counters per direction.
    for (direction, bytes, operations) in [
        ("read", host.disk.read_bytes, host.disk.read_ops),
        ("write", host.disk.write_bytes, host.disk.write_ops),
    ] {
        docs.push(data_point(
            snapshot,
            json!({"direction": direction}),
            json!({
                "system.disk.io": bytes,
                "system.disk.operations": operations,
            }),
        ));
    }

    if let Some(weather) = &snapshot.weather {
        let condition = weather.condition.as_str();
        docs.push(data_point(
            snapshot,
            json!({"condition": condition}),
            json!({
                "environment.temperature": weather.temperature_c,
                "environment.humidity": weather.humidity_pct / 100.0,
                "environment.wind.speed": weather.wind_speed_ms,
                "environment.wind.direction": weather.wind_direction_deg,
                "environment.precipitation.rate": weather.precipitation_mm_hr,
                "environment.irradiance": weather.solar_irradiance_wm2,
            }),
        ));
        docs.push(data_point(
            snapshot,
            json!({}),
            json!({
                "solar.inverter.power": weather.panel_output_w,
                "battery.utilization": weather.battery_charge_pct / 100.0,
            }),
        ));
    }

    docs
}

fn data_point(snapshot: &MetricsSnapshot, attributes: Value, metrics: Value) -> WireDocument {
    let config = &snapshot.config;

    let mut body = json!({
        "@timestamp": snapshot.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        "resource": {
            "attributes": {
                "host.name": config.hostname,
                "host.type": config.machine_class.name,
                "os.type": "linux",
                "cloud.provider": config.provider.as_str(),
                "cloud.region": config.region,
                "cloud.availability_zone": config.zone,
                "service.name": "telforge",
            }
        },
        "attributes": attributes,
        "metrics": metrics,
    });

    attach_fingerprint(&mut body);

    WireDocument {
        index: INDEX.to_string(),
        body,
    }
}
