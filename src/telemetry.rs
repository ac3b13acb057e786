//! telemetry.rs — stable reason codes, counters, and a bounded event ring.
//!
//! Grounded on `dapper/_frame_eval/telemetry.py`: a typed counts struct (one
//! field per reason code, not a loose map) plus a small ring buffer of recent
//! events for diagnostics. A single mutex guards both; readers get a copy.

use std::collections::VecDeque;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

/// Stable telemetry reason codes. The `Display` impl is the stable string
/// form used in snapshots and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReasonCode {
    AutoIntegrationFailed,
    BytecodeInjectionFailed,
    IntegrationFailed,
    SelectiveTracingAnalysisFailed,
    HotReloadSucceeded,
    HotReloadFailed,
    BudgetExceeded,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 7] = [
        ReasonCode::AutoIntegrationFailed,
        ReasonCode::BytecodeInjectionFailed,
        ReasonCode::IntegrationFailed,
        ReasonCode::SelectiveTracingAnalysisFailed,
        ReasonCode::HotReloadSucceeded,
        ReasonCode::HotReloadFailed,
        ReasonCode::BudgetExceeded,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ReasonCode::AutoIntegrationFailed => "AUTO_INTEGRATION_FAILED",
            ReasonCode::BytecodeInjectionFailed => "BYTECODE_INJECTION_FAILED",
            ReasonCode::IntegrationFailed => "INTEGRATION_FAILED",
            ReasonCode::SelectiveTracingAnalysisFailed => "SELECTIVE_TRACING_ANALYSIS_FAILED",
            ReasonCode::HotReloadSucceeded => "HOT_RELOAD_SUCCEEDED",
            ReasonCode::HotReloadFailed => "HOT_RELOAD_FAILED",
            ReasonCode::BudgetExceeded => "BUDGET_EXCEEDED",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field per [`ReasonCode`], mirroring `FrameEvalReasonCounts`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReasonCounts {
    pub auto_integration_failed: u64,
    pub bytecode_injection_failed: u64,
    pub integration_failed: u64,
    pub selective_tracing_analysis_failed: u64,
    pub hot_reload_succeeded: u64,
    pub hot_reload_failed: u64,
    pub budget_exceeded: u64,
}

impl ReasonCounts {
    fn increment(&mut self, reason: ReasonCode) {
        match reason {
            ReasonCode::AutoIntegrationFailed => self.auto_integration_failed += 1,
            ReasonCode::BytecodeInjectionFailed => self.bytecode_injection_failed += 1,
            ReasonCode::IntegrationFailed => self.integration_failed += 1,
            ReasonCode::SelectiveTracingAnalysisFailed => {
                self.selective_tracing_analysis_failed += 1;
            }
            ReasonCode::HotReloadSucceeded => self.hot_reload_succeeded += 1,
            ReasonCode::HotReloadFailed => self.hot_reload_failed += 1,
            ReasonCode::BudgetExceeded => self.budget_exceeded += 1,
        }
    }

    /// JSON-friendly projection keyed by the stable reason-code string.
    pub fn as_map(&self) -> std::collections::HashMap<&'static str, u64> {
        [
            (ReasonCode::AutoIntegrationFailed.as_str(), self.auto_integration_failed),
            (ReasonCode::BytecodeInjectionFailed.as_str(), self.bytecode_injection_failed),
            (ReasonCode::IntegrationFailed.as_str(), self.integration_failed),
            (
                ReasonCode::SelectiveTracingAnalysisFailed.as_str(),
                self.selective_tracing_analysis_failed,
            ),
            (ReasonCode::HotReloadSucceeded.as_str(), self.hot_reload_succeeded),
            (ReasonCode::HotReloadFailed.as_str(), self.hot_reload_failed),
            (ReasonCode::BudgetExceeded.as_str(), self.budget_exceeded),
        ]
        .into_iter()
        .collect()
    }
}

/// A single recorded telemetry event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetryEvent {
    /// Seconds since `UNIX_EPOCH`, best-effort wall clock.
    pub timestamp_s: f64,
    pub reason_code: &'static str,
    pub context: std::collections::HashMap<String, String>,
}

/// Point-in-time, JSON-serializable view of the telemetry state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetrySnapshot {
    pub reason_counts: ReasonCounts,
    pub recent_events: Vec<TelemetryEvent>,
}

#[cfg(feature = "serde")]
impl TelemetrySnapshot {
    /// Convenience wrapper, mirroring `FrameEvalTelemetrySnapshot.as_json()`.
    pub fn as_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

struct Inner {
    counts: ReasonCounts,
    recent: VecDeque<TelemetryEvent>,
    capacity: usize,
}

/// Counters plus a bounded ring of recent events, guarded by one mutex. An
/// embedder that wants to stream events live (rather than polling
/// [`Telemetry::snapshot`]) can attach an unbounded `crossbeam_channel`
/// sender with [`Telemetry::subscribe`]; a full or disconnected receiver
/// never blocks or panics the recording call — a send error is simply
/// dropped, since telemetry delivery is always best-effort.
pub struct Telemetry {
    inner: Mutex<Inner>,
    subscriber: Mutex<Option<Sender<TelemetryEvent>>>,
}

impl Telemetry {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                counts: ReasonCounts::default(),
                recent: VecDeque::with_capacity(capacity.min(1024)),
                capacity: capacity.max(1),
            }),
            subscriber: Mutex::new(None),
        }
    }

    /// Attaches a channel that receives a copy of every recorded event from
    /// this point on. Replaces any previously attached subscriber.
    pub fn subscribe(&self, sender: Sender<TelemetryEvent>) {
        *self.subscriber.lock() = Some(sender);
    }

    pub fn unsubscribe(&self) {
        *self.subscriber.lock() = None;
    }

    /// Records a reason code with no extra context.
    pub fn record(&self, reason: ReasonCode) {
        self.record_with_context(reason, std::collections::HashMap::new());
    }

    /// Records a reason code with structured context (e.g. the offending
    /// expression text, the file path, the backend name).
    pub fn record_with_context(
        &self,
        reason: ReasonCode,
        context: std::collections::HashMap<String, String>,
    ) {
        let event = TelemetryEvent { timestamp_s: now_s(), reason_code: reason.as_str(), context };

        let mut inner = self.inner.lock();
        inner.counts.increment(reason);
        if inner.recent.len() == inner.capacity {
            inner.recent.pop_front();
        }
        inner.recent.push_back(event.clone());
        drop(inner);

        #[cfg(feature = "trace")]
        log::debug!("telemetry: {}", reason.as_str());

        if let Some(sender) = self.subscriber.lock().as_ref() {
            let _ = sender.try_send(event);
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let inner = self.inner.lock();
        TelemetrySnapshot {
            reason_counts: inner.counts,
            recent_events: inner.recent.iter().cloned().collect(),
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.counts = ReasonCounts::default();
        inner.recent.clear();
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(50)
    }
}

fn now_s() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_ring_buffer() {
        let t = Telemetry::new(2);
        t.record(ReasonCode::BudgetExceeded);
        t.record(ReasonCode::BudgetExceeded);
        t.record(ReasonCode::HotReloadFailed);
        let snap = t.snapshot();
        assert_eq!(snap.reason_counts.budget_exceeded, 2);
        assert_eq!(snap.reason_counts.hot_reload_failed, 1);
        // capacity 2: oldest event (first budget_exceeded) was evicted.
        assert_eq!(snap.recent_events.len(), 2);
        assert_eq!(snap.recent_events[1].reason_code, "HOT_RELOAD_FAILED");
    }

    #[test]
    fn clear_resets_everything() {
        let t = Telemetry::default();
        t.record(ReasonCode::IntegrationFailed);
        t.clear();
        let snap = t.snapshot();
        assert_eq!(snap.reason_counts, ReasonCounts::default());
        assert!(snap.recent_events.is_empty());
    }

    #[test]
    fn subscriber_receives_recorded_events() {
        let t = Telemetry::default();
        let (tx, rx) = crossbeam_channel::unbounded();
        t.subscribe(tx);
        t.record(ReasonCode::HotReloadFailed);
        let event = rx.try_recv().expect("subscriber should have received the event");
        assert_eq!(event.reason_code, "HOT_RELOAD_FAILED");
    }

    #[test]
    fn as_map_has_stable_keys() {
        let counts = ReasonCounts { budget_exceeded: 3, ..Default::default() };
        let map = counts.as_map();
        assert_eq!(map["BUDGET_EXCEEDED"], 3);
    }
}
