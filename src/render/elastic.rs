//! Metricbeat-flavoured renderer: one document per metricset, routed to
//! `metrics-<dataset>-default` data streams. Percentages follow the
//! metricbeat convention: `.pct` is the sum across cores (may exceed 1),
//! `.norm.pct` is normalized to 0..1.

use chrono::SecondsFormat;
use serde_json::{json, Value};

use super::{attach_fingerprint, WireDocument};
use crate::gen::MetricsSnapshot;

pub fn render(snapshot: &MetricsSnapshot) -> Vec<WireDocument> {
    let mut docs = Vec::with_capacity(8 + snapshot.host.interfaces.len());

    docs.push(metricset(snapshot, "system.cpu", cpu_fields(snapshot)));
    docs.push(metricset(snapshot, "system.load", load_fields(snapshot)));
    docs.push(metricset(snapshot, "system.memory", memory_fields(snapshot)));
    docs.push(metricset(
        snapshot,
        "system.filesystem",
        filesystem_fields(snapshot),
    ));
    docs.push(metricset(snapshot, "system.diskio", diskio_fields(snapshot)));

    for iface in &snapshot.host.interfaces {
        docs.push(metricset(
            snapshot,
            "system.network",
            json!({
                "system": {
                    "network": {
                        "name": iface.name,
                        "in": {"bytes": iface.in_bytes, "packets": iface.in_packets},
                        "out": {"bytes": iface.out_bytes, "packets": iface.out_packets},
                    }
                }
            }),
        ));
    }

    if let Some(weather) = &snapshot.weather {
        docs.push(metricset(
            snapshot,
            "environment.weather",
            json!({
                "environment": {
                    "weather": {
                        "condition": weather.condition.as_str(),
                        "temperature": {"celsius": weather.temperature_c},
                        "humidity": {"pct": weather.humidity_pct},
                        "wind": {
                            "speed": weather.wind_speed_ms,
                            "direction": weather.wind_direction_deg,
                        },
                        "precipitation": {"rate": weather.precipitation_mm_hr},
                        "irradiance": {"wm2": weather.solar_irradiance_wm2},
                    }
                }
            }),
        ));
        docs.push(metricset(
            snapshot,
            "environment.solar",
            json!({
                "environment": {
                    "solar": {
                        "panels": weather.panel_outputs_w.len(),
                        "output": {"watts": weather.panel_output_w},
                        "battery": {
                            "pct": weather.battery_charge_pct,
                            "charging": weather.battery_charging,
                        },
                    }
                }
            }),
        ));
    }

    docs
}

/// Wraps metricset fields with the shared resource/event envelope and the
/// cardinality fingerprint.
fn metricset(snapshot: &MetricsSnapshot, dataset: &str, fields: Value) -> WireDocument {
    let config = &snapshot.config;
    let module = dataset.split('.').next().unwrap_or(dataset);

    let mut body = json!({
        "@timestamp": snapshot.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        "host": {
            "name": config.hostname,
            "architecture": config.architecture,
            "os": {"name": config.os_name},
        },
        "cloud": {
            "provider": config.provider.as_str(),
            "region": config.region,
            "availability_zone": config.zone,
            "instance": {"type": config.machine_class.name},
        },
        "event": {"module": module, "dataset": dataset},
    });

    merge(&mut body, fields);
    attach_fingerprint(&mut body);

    WireDocument {
        index: format!("metrics-{dataset}-default"),
        body,
    }
}

fn cpu_fields(snapshot: &MetricsSnapshot) -> Value {
    let host = &snapshot.host;
    let cores = host.cores.len() as f64;
    let state = |fraction: f64| {
        json!({
            "pct": fraction * cores,
            "norm": {"pct": fraction},
        })
    };

    json!({
        "system": {
            "cpu": {
                "cores": host.cores.len(),
                "user": state(host.total.user),
                "system": state(host.total.system),
                "iowait": state(host.total.iowait),
                "nice": state(host.total.nice),
                "irq": state(host.total.irq),
                "softirq": state(host.total.softirq),
                "idle": state(host.total.idle),
                "total": state(host.total.busy()),
            }
        }
    })
}

fn load_fields(snapshot: &MetricsSnapshot) -> Value {
    let host = &snapshot.host;
    let cores = host.cores.len() as f64;
    json!({
        "system": {
            "load": {
                "1": host.load_1m,
                "5": host.load_5m,
                "15": host.load_15m,
                "cores": host.cores.len(),
                "norm": {
                    "1": host.load_1m / cores,
                    "5": host.load_5m / cores,
                    "15": host.load_15m / cores,
                },
            }
        }
    })
}

fn memory_fields(snapshot: &MetricsSnapshot) -> Value {
    let host = &snapshot.host;
    json!({
        "system": {
            "memory": {
                "total": host.memory_total_bytes,
                "used": {"bytes": host.memory_used_bytes, "pct": host.memory_used_pct},
                "free": host.memory_free_bytes,
                "cached": host.memory_cached_bytes,
            }
        }
    })
}

fn filesystem_fields(snapshot: &MetricsSnapshot) -> Value {
    let host = &snapshot.host;
    json!({
        "system": {
            "filesystem": {
                "mount_point": "/",
                "device_name": "/dev/sda1",
                "total": host.fs_total_bytes,
                "used": {"bytes": host.fs_used_bytes, "pct": host.fs_used_pct},
                "free": host.fs_free_bytes,
            }
        }
    })
}

fn diskio_fields(snapshot: &MetricsSnapshot) -> Value {
    let disk = &snapshot.host.disk;
    json!({
        "system": {
            "diskio": {
                "read": {"bytes": disk.read_bytes, "count": disk.read_ops},
                "write": {"bytes": disk.write_bytes, "count": disk.write_ops},
            }
        }
    })
}

/// Deep-merges `extra` into `base`. Keys in `extra` win.
fn merge(base: &mut Value, extra: Value) {
    match (base, extra) {
        (Value::Object(base_map), Value::Object(extra_map)) => {
            for (key, value) in extra_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::config::Dataset;
    use crate::entity::ConfigStore;
    use crate::gen;
    use crate::ledger::CounterLedger;

    fn snapshot(dataset: Dataset) -> MetricsSnapshot {
        let mut store = ConfigStore::new();
        let config = store.get_or_create("host-00001");
        let mut ledger = CounterLedger::new();
        let ts = Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).single().expect("valid ts");
        gen::generate(dataset, &config, &mut ledger, ts, None, 10.0)
    }

    #[test]
    fn test_one_doc_per_metricset() {
        let snap = snapshot(Dataset::Hosts);
        let docs = render(&snap);
        // cpu, load, memory, filesystem, diskio, one per interface.
        assert_eq!(docs.len(), 5 + snap.host.interfaces.len());
    }

    #[test]
    fn test_weather_adds_environment_docs() {
        let snap = snapshot(Dataset::Weather);
        let docs = render(&snap);
        assert!(docs
            .iter()
            .any(|d| d.index == "metrics-environment.weather-default"));
        assert!(docs
            .iter()
            .any(|d| d.index == "metrics-environment.solar-default"));
    }

    #[test]
    fn test_index_is_derivable_from_doc() {
        let snap = snapshot(Dataset::Hosts);
        for doc in render(&snap) {
            let dataset = doc.body["event"]["dataset"].as_str().expect("dataset field");
            assert_eq!(doc.index, format!("metrics-{dataset}-default"));
            assert!(doc.timestamp().is_some());
            assert!(doc.body["_metric_names_hash"].is_string());
        }
    }

    #[test]
    fn test_cpu_norm_matches_raw_over_cores() {
        let snap = snapshot(Dataset::Hosts);
        let docs = render(&snap);
        let cpu = &docs
            .iter()
            .find(|d| d.index == "metrics-system.cpu-default")
            .expect("cpu doc")
            .body["system"]["cpu"];

        let cores = cpu["cores"].as_f64().expect("cores");
        let raw = cpu["user"]["pct"].as_f64().expect("pct");
        let norm = cpu["user"]["norm"]["pct"].as_f64().expect("norm pct");
        assert!((raw - norm * cores).abs() < 1e-9);
    }

    #[test]
    fn test_network_doc_per_interface() {
        let snap = snapshot(Dataset::Hosts);
        let docs = render(&snap);
        let names: Vec<String> = docs
            .iter()
            .filter(|d| d.index == "metrics-system.network-default")
            .map(|d| {
                d.body["system"]["network"]["name"]
                    .as_str()
                    .expect("name")
                    .to_string()
            })
            .collect();
        let expected: Vec<String> = snap.host.interfaces.iter().map(|i| i.name.clone()).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_merge_is_deep() {
        let mut base = serde_json::json!({"a": {"b": 1}});
        merge(&mut base, serde_json::json!({"a": {"c": 2}}));
        assert_eq!(base, serde_json::json!({"a": {"b": 1, "c": 2}}));
    }
}
