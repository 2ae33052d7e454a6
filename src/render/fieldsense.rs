//! Fieldsense renderer: the fully exploded per-core schema plus per-sensor
//! environmental readings. Utilization values are percentages (0..100);
//! load carries both the raw value and the per-core normalization.

use chrono::SecondsFormat;
use serde_json::{json, Value};

use super::{attach_fingerprint, WireDocument};
use crate::entity::catalog::SensorKind;
use crate::gen::MetricsSnapshot;

pub fn render(snapshot: &MetricsSnapshot) -> Vec<WireDocument> {
    let host = &snapshot.host;
    let mut docs = Vec::new();

    // One document per core x state.
    for (index, core) in host.cores.iter().enumerate() {
        let states = [
            ("user", core.states.user, Some(core.cpu_time_ms.user)),
            ("system", core.states.system, Some(core.cpu_time_ms.system)),
            ("iowait", core.states.iowait, Some(core.cpu_time_ms.iowait)),
            ("nice", core.states.nice, None),
            ("irq", core.states.irq, None),
            ("softirq", core.states.softirq, None),
            ("idle", core.states.idle, Some(core.cpu_time_ms.idle)),
        ];
        for (state, fraction, time_ms) in states {
            let mut cpu = json!({
                "core": index,
                "state": state,
                "pct": fraction * 100.0,
            });
            if let Some(ms) = time_ms {
                cpu["time_ms"] = json!(ms);
            }
            docs.push(document(snapshot, "hosts", json!({"cpu": cpu})));
        }
    }

    // Aggregate summary.
    docs.push(document(
        snapshot,
        "hosts",
        json!({
            "cpu_total": {
                "pct": host.total.busy() * 100.0,
                "user_pct": host.total.user * 100.0,
                "system_pct": host.total.system * 100.0,
                "idle_pct": host.total.idle * 100.0,
            },
            "temperature_c": host.cpu_temperature_c,
        }),
    ));

    // Load: raw plus per-core normalized, matching the other schemas after
    // conversion.
    let cores = host.cores.len() as f64;
    docs.push(document(
        snapshot,
        "hosts",
        json!({
            "load": {
                "one": host.load_1m,
                "five": host.load_5m,
                "fifteen": host.load_15m,
                "per_core": {
                    "one": host.load_1m / cores,
                    "five": host.load_5m / cores,
                    "fifteen": host.load_15m / cores,
                },
            }
        }),
    ));

    docs.push(document(
        snapshot,
        "hosts",
        json!({
            "memory": {
                "total_bytes": host.memory_total_bytes,
                "used_bytes": host.memory_used_bytes,
                "free_bytes": host.memory_free_bytes,
                "cached_bytes": host.memory_cached_bytes,
                "used_pct": host.memory_used_pct * 100.0,
            }
        }),
    ));

    docs.push(document(
        snapshot,
        "hosts",
        json!({
            "filesystem": {
                "total_bytes": host.fs_total_bytes,
                "used_bytes": host.fs_used_bytes,
                "free_bytes": host.fs_free_bytes,
                "used_pct": host.fs_used_pct * 100.0,
            }
        }),
    ));

    for iface in &host.interfaces {
        docs.push(document(
            snapshot,
            "hosts",
            json!({
                "network": {
                    "interface": iface.name,
                    "in_bytes": iface.in_bytes,
                    "out_bytes": iface.out_bytes,
                    "in_packets": iface.in_packets,
                    "out_packets": iface.out_packets,
                }
            }),
        ));
    }

    docs.push(document(
        snapshot,
        "hosts",
        json!({
            "disk": {
                "read_bytes": host.disk.read_bytes,
                "write_bytes": host.disk.write_bytes,
                "read_ops": host.disk.read_ops,
                "write_ops": host.disk.write_ops,
            }
        }),
    ));

    if let Some(weather) = &snapshot.weather {
        // One reading per mounted sensor.
        for sensor in &snapshot.config.sensors {
            let reading = match sensor.kind {
                SensorKind::Thermometer => json!({"temperature_c": weather.temperature_c}),
                SensorKind::Hygrometer => json!({"humidity_pct": weather.humidity_pct}),
                SensorKind::Anemometer => json!({
                    "wind_speed_ms": weather.wind_speed_ms,
                    "wind_direction_deg": weather.wind_direction_deg,
                }),
                SensorKind::RainGauge => {
                    json!({"precipitation_mm_hr": weather.precipitation_mm_hr})
                }
                SensorKind::Pyranometer => {
                    json!({"irradiance_wm2": weather.solar_irradiance_wm2})
                }
            };
            docs.push(document(
                snapshot,
                "weather",
                json!({
                    "sensor": {
                        "kind": sensor.kind.as_str(),
                        "height_m": sensor.mount_height_m,
                    },
                    "condition": weather.condition.as_str(),
                    "reading": reading,
                }),
            ));
        }

        // Per-panel output plus the station power summary.
        for (index, (panel, output)) in snapshot
            .config
            .panels
            .iter()
            .zip(&weather.panel_outputs_w)
            .enumerate()
        {
            docs.push(document(
                snapshot,
                "weather",
                json!({
                    "panel": {
                        "index": index,
                        "watts_peak": panel.watts_peak,
                        "output_w": output,
                    }
                }),
            ));
        }
        docs.push(document(
            snapshot,
            "weather",
            json!({
                "solar": {
                    "panel_count": weather.panel_outputs_w.len(),
                    "output_w": weather.panel_output_w,
                    "battery_pct": weather.battery_charge_pct,
                    "battery_charging": weather.battery_charging,
                }
            }),
        ));
    }

    docs
}

fn document(snapshot: &MetricsSnapshot, family: &str, fields: Value) -> WireDocument {
    let config = &snapshot.config;

    let mut body = json!({
        "@timestamp": snapshot.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        "entity": {
            "id": config.id,
            "hostname": config.hostname,
            "zone": config.zone,
        },
    });

    if let (Some(base), Some(extra)) = (body.as_object_mut(), fields.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    attach_fingerprint(&mut body);

    WireDocument {
        index: format!("fieldsense-{family}"),
        body,
    }
}
