//! Minimal run-time metrics sink.
//!
//! No exporter is bundled. The recorder keeps the latest value of every
//! series in a process-wide snapshot and, when a host process registered a
//! raw callback, forwards each update as a name/value pair.

use dashmap::DashMap;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use once_cell::sync::{Lazy, OnceCell};
use std::collections::BTreeMap;
use std::ffi::CString;
use std::os::raw::{c_char, c_ulonglong};
use std::sync::Arc;

/// Signature for external collectors. `name` is NUL-terminated and only
/// valid for the duration of the call.
pub type StatsCallback = unsafe extern "C" fn(name: *const c_char, value: c_ulonglong);

static CALLBACK: OnceCell<StatsCallback> = OnceCell::new();
static SNAPSHOT: Lazy<DashMap<String, f64>> = Lazy::new(DashMap::new);

/// Register a callback from C/other languages. Only the first one sticks.
#[no_mangle]
pub extern "C" fn ipam_register_stats_callback(cb: StatsCallback) {
    let _ = CALLBACK.set(cb);
}

/// Series name with labels folded in: `name{k=v,...}`.
fn series(key: &Key) -> String {
    let mut labels = key.labels().peekable();
    if labels.peek().is_none() {
        return key.name().to_string();
    }
    let folded: Vec<String> = labels.map(|l| format!("{}={}", l.key(), l.value())).collect();
    format!("{}{{{}}}", key.name(), folded.join(","))
}

#[derive(Clone)]
struct Series {
    name: String,
    cname: Arc<CString>,
}

impl Series {
    fn new(key: &Key) -> Self {
        let name = series(key);
        let cname = Arc::new(CString::new(name.replace('\0', " ")).unwrap_or_default());
        Self { name, cname }
    }

    fn update(&self, f: impl FnOnce(f64) -> f64) {
        let value = {
            let mut slot = SNAPSHOT.entry(self.name.clone()).or_insert(0.0);
            *slot = f(*slot);
            *slot
        };
        if let Some(cb) = CALLBACK.get() {
            // SAFETY: the callback contract only borrows `name` for the call.
            unsafe { cb(self.cname.as_ptr(), value.max(0.0) as c_ulonglong) };
        }
    }
}

struct SnapshotRecorder;

impl Recorder for SnapshotRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(Series::new(key)))
    }
    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(Arc::new(Series::new(key)))
    }
    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(Series::new(key)))
    }
}

impl metrics::CounterFn for Series {
    fn increment(&self, value: u64) {
        self.update(|v| v + value as f64);
    }
    fn absolute(&self, value: u64) {
        self.update(|_| value as f64);
    }
}

impl metrics::GaugeFn for Series {
    fn set(&self, value: f64) {
        self.update(|_| value);
    }
    fn increment(&self, value: f64) {
        self.update(|v| v + value);
    }
    fn decrement(&self, value: f64) {
        self.update(|v| v - value);
    }
}

// Histograms keep the most recent sample only.
impl metrics::HistogramFn for Series {
    fn record(&self, value: f64) {
        self.update(|_| value);
    }
}

/// Install the recorder exactly once. A recorder installed earlier by the
/// host wins; the snapshot then stays empty.
pub fn init() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        if metrics::set_global_recorder(SnapshotRecorder).is_err() {
            log::debug!("[METRICS] a global recorder is already installed");
        }
    });
}

/// Current value of every series seen so far.
pub fn snapshot() -> BTreeMap<String, f64> {
    SNAPSHOT.iter().map(|e| (e.key().clone(), *e.value())).collect()
}
