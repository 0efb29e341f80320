//! Process-wide counters, fixed-bucket histograms, and gauges.
//!
//! Mutations go through per-kind `Mutex<HashMap<..>>` maps: writers are
//! short and the lock never crosses an await point.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Upper bounds of the fixed histogram buckets, in milliseconds.
pub const BUCKET_BOUNDS: [f64; 10] = [
    10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
];

#[derive(Debug, Default, Clone)]
struct HistogramData {
    /// Cumulative count per bucket: `buckets[i]` counts observations `<= BUCKET_BOUNDS[i]`.
    buckets: [u64; BUCKET_BOUNDS.len()],
    inf_count: u64,
    sum: f64,
    count: u64,
}

impl HistogramData {
    fn observe(&mut self, value: f64) {
        for (bound, bucket) in BUCKET_BOUNDS.iter().zip(self.buckets.iter_mut()) {
            if value <= *bound {
                *bucket += 1;
            }
        }
        self.inf_count += 1;
        self.sum += value;
        self.count += 1;
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let buckets: Vec<(f64, u64)> = BUCKET_BOUNDS
            .iter()
            .copied()
            .zip(self.buckets.iter().copied())
            .collect();
        HistogramSnapshot {
            count: self.count,
            sum: self.sum,
            buckets,
            inf_count: self.inf_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    pub buckets: Vec<(f64, u64)>,
    pub inf_count: u64,
}

impl HistogramSnapshot {
    pub fn p50(&self) -> f64 {
        percentile(self, 0.5)
    }
    pub fn p90(&self) -> f64 {
        percentile(self, 0.9)
    }
    pub fn p99(&self) -> f64 {
        percentile(self, 0.99)
    }
}

/// Locates the first cumulative bucket count >= `p * count` and linearly
/// interpolates between its lower bound (the previous bucket's upper bound,
/// or 0) and its own upper bound. Returns 0 for an empty histogram and the
/// last defined upper bound if no finite bucket reaches the target.
pub fn percentile(h: &HistogramSnapshot, p: f64) -> f64 {
    if h.count == 0 {
        return 0.0;
    }
    let target = p * h.count as f64;
    let mut prev_bound = 0.0_f64;
    let mut prev_count = 0.0_f64;
    for (bound, count) in &h.buckets {
        let count = *count as f64;
        if count >= target {
            let denom = count - prev_count;
            let frac = if denom > 0.0 {
                (target - prev_count) / denom
            } else {
                0.0
            };
            return prev_bound + frac * (bound - prev_bound);
        }
        prev_bound = *bound;
        prev_count = count;
    }
    prev_bound
}

/// Returns `"1xx".."5xx"` for `100 <= code <= 599`.
pub fn status_class(code: u16) -> String {
    format!("{}xx", code / 100)
}

/// Serializes an ordered label tuple as a colon-joined string; `_` when empty.
pub fn label_key(labels: &[&str]) -> String {
    if labels.is_empty() {
        "_".to_string()
    } else {
        labels.join(":")
    }
}

type LabelMap<V> = HashMap<String, V>;
type NamedMap<V> = HashMap<String, LabelMap<V>>;

#[derive(Default)]
pub struct Registry {
    counters: Mutex<NamedMap<u64>>,
    gauges: Mutex<NamedMap<i64>>,
    histograms: Mutex<NamedMap<HistogramData>>,
    started_at: Option<Instant>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
            started_at: Some(Instant::now()),
        }
    }

    pub fn increment(&self, name: &str, labels: &[&str], delta: u64) {
        let key = label_key(labels);
        let mut map = self.counters.lock().expect("counters lock poisoned");
        *map.entry(name.to_string()).or_default().entry(key).or_insert(0) += delta;
    }

    pub fn gauge_inc(&self, name: &str, labels: &[&str], delta: i64) {
        let key = label_key(labels);
        let mut map = self.gauges.lock().expect("gauges lock poisoned");
        *map.entry(name.to_string()).or_default().entry(key).or_insert(0) += delta;
    }

    pub fn gauge_dec(&self, name: &str, labels: &[&str], delta: i64) {
        self.gauge_inc(name, labels, -delta);
    }

    pub fn gauge_set(&self, name: &str, labels: &[&str], value: i64) {
        let key = label_key(labels);
        let mut map = self.gauges.lock().expect("gauges lock poisoned");
        map.entry(name.to_string()).or_default().insert(key, value);
    }

    pub fn observe(&self, name: &str, value: f64, labels: &[&str]) {
        let key = label_key(labels);
        let mut map = self.histograms.lock().expect("histograms lock poisoned");
        map.entry(name.to_string())
            .or_default()
            .entry(key)
            .or_default()
            .observe(value);
    }

    fn uptime_seconds(&self) -> u64 {
        self.started_at
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Deep snapshot for `GET /metrics`.
    pub fn get_metrics(&self) -> serde_json::Value {
        let counters = self.counters.lock().expect("counters lock poisoned");
        let gauges = self.gauges.lock().expect("gauges lock poisoned");
        let histograms = self.histograms.lock().expect("histograms lock poisoned");

        let counters_json = serde_json::to_value(&*counters).unwrap_or_default();

        let mut gauges_json = serde_json::Map::new();
        for (name, labels) in gauges.iter() {
            gauges_json.insert(name.clone(), serde_json::to_value(labels).unwrap_or_default());
        }
        gauges_json.insert("uptime_seconds".to_string(), self.uptime_seconds().into());

        let mut histograms_json = serde_json::Map::new();
        for (name, labels) in histograms.iter() {
            let mut per_label = serde_json::Map::new();
            for (label, data) in labels.iter() {
                let snap = data.snapshot();
                let buckets: serde_json::Map<String, serde_json::Value> = snap
                    .buckets
                    .iter()
                    .map(|(bound, count)| (bound.to_string(), (*count).into()))
                    .chain(std::iter::once(("+Inf".to_string(), snap.inf_count.into())))
                    .collect();
                per_label.insert(
                    label.clone(),
                    serde_json::json!({
                        "p50": snap.p50(),
                        "p90": snap.p90(),
                        "p99": snap.p99(),
                        "count": snap.count,
                        "sum": snap.sum,
                        "buckets": buckets,
                    }),
                );
            }
            histograms_json.insert(name.clone(), per_label.into());
        }

        serde_json::json!({
            "counters": counters_json,
            "histograms": histograms_json,
            "gauges": gauges_json,
        })
    }

    /// Aggregated view for `GET /health`'s `metrics_summary`.
    pub fn get_summary(&self) -> Summary {
        let counters = self.counters.lock().expect("counters lock poisoned");
        let gauges = self.gauges.lock().expect("gauges lock poisoned");
        let histograms = self.histograms.lock().expect("histograms lock poisoned");

        let total_requests: u64 = counters
            .get("requests_total")
            .map(|m| m.values().sum())
            .unwrap_or(0);
        let total_errors: u64 = counters
            .get("requests_errors_total")
            .map(|m| m.values().sum())
            .unwrap_or(0);
        let active_requests: i64 = gauges
            .get("active_requests")
            .map(|m| m.values().sum())
            .unwrap_or(0);

        let (sum, count) = histograms
            .get("request_duration_ms")
            .map(|per_label| {
                per_label.values().fold((0.0_f64, 0_u64), |(sum, count), data| {
                    (sum + data.sum, count + data.count)
                })
            })
            .unwrap_or((0.0, 0));
        let avg_latency_ms = if count == 0 { 0.0 } else { sum / count as f64 };

        Summary {
            total_requests,
            total_errors,
            active_requests,
            avg_latency_ms,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Summary {
    pub total_requests: u64,
    pub total_errors: u64,
    pub active_requests: i64,
    pub avg_latency_ms: f64,
}
