use std::collections::HashMap;

/// Largest cumulative total the ledger will hold: 2^53 - 1, the biggest
/// integer exactly representable in an f64.
pub const SAFE_TOTAL_LIMIT: f64 = 9_007_199_254_740_991.0;

/// Per-entity store of cumulative counter totals, keyed by a
/// dimension-qualified metric key such as `"cpu_time:core=2:state=user"`.
///
/// Totals are monotonically non-decreasing except at the overflow boundary.
/// Overflow policy (reset-to-increment): when a total would exceed
/// [`SAFE_TOTAL_LIMIT`], it resets to the incoming delta rather than to
/// zero, so consumers observe a counter reset without a spurious drop to
/// nothing. This mirrors the original system's behavior and is deliberately
/// kept as a named policy rather than a wrap to a fixed bit width.
#[derive(Debug, Default)]
pub struct CounterLedger {
    totals: HashMap<String, f64>,
}

impl CounterLedger {
    pub fn new() -> Self {
        Self {
            totals: HashMap::new(),
        }
    }

    /// Adds `delta` to the counter at `key` and returns the new cumulative
    /// total. `delta` is expected to be non-negative; the generator only
    /// ever produces rate x elapsed-seconds deltas.
    pub fn increment(&mut self, key: &str, delta: f64) -> f64 {
        debug_assert!(delta >= 0.0, "counter delta must be non-negative: {delta}");
        let delta = delta.max(0.0);

        let total = self.totals.entry(key.to_string()).or_insert(0.0);
        let next = *total + delta;
        *total = if next > SAFE_TOTAL_LIMIT { delta } else { next };
        *total
    }

    /// Returns the current total for a key, if any increment has been
    /// applied to it.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.totals.get(key).copied()
    }

    /// Overwrites a counter total directly. Used to pre-position a counter
    /// near the overflow boundary in tests and replay tooling.
    pub fn set_total(&mut self, key: &str, value: f64) {
        self.totals.insert(key.to_string(), value);
    }

    /// Number of tracked counter dimensions.
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}
