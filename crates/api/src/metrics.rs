use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Kinds of request the API serves, each tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Session,
    Summary,
    Keywords,
    Graph,
    Chat,
    Explain,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::Session,
        ArtifactKind::Summary,
        ArtifactKind::Keywords,
        ArtifactKind::Graph,
        ArtifactKind::Chat,
        ArtifactKind::Explain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Session => "session",
            ArtifactKind::Summary => "summary",
            ArtifactKind::Keywords => "keywords",
            ArtifactKind::Graph => "graph",
            ArtifactKind::Chat => "chat",
            ArtifactKind::Explain => "explain",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// How a single request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Answered with a parser default.
    Fallback,
    Failure,
}

#[derive(Default)]
struct KindCounters {
    requests: AtomicUsize,
    successes: AtomicUsize,
    fallbacks: AtomicUsize,
    failures: AtomicUsize,
    cache_hits: AtomicUsize,
    // Microseconds
    total_time_us: AtomicU64,
}

pub struct Metrics {
    kinds: [KindCounters; 6],
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            kinds: Default::default(),
        })
    }

    pub fn record(&self, kind: ArtifactKind, outcome: Outcome, duration: Duration) {
        let counters = &self.kinds[kind.index()];
        counters.requests.fetch_add(1, Ordering::Relaxed);
        counters
            .total_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        let slot = match outcome {
            Outcome::Success => &counters.successes,
            Outcome::Fallback => &counters.fallbacks,
            Outcome::Failure => &counters.failures,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    /// Cached answers count as requests but not toward latency.
    pub fn record_cache_hit(&self, kind: ArtifactKind) {
        let counters = &self.kinds[kind.index()];
        counters.requests.fetch_add(1, Ordering::Relaxed);
        counters.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let kinds: Vec<KindSnapshot> = ArtifactKind::ALL
            .iter()
            .map(|kind| {
                let c = &self.kinds[kind.index()];
                let requests = c.requests.load(Ordering::Relaxed);
                let cache_hits = c.cache_hits.load(Ordering::Relaxed);
                KindSnapshot {
                    kind: *kind,
                    requests,
                    successes: c.successes.load(Ordering::Relaxed),
                    fallbacks: c.fallbacks.load(Ordering::Relaxed),
                    failures: c.failures.load(Ordering::Relaxed),
                    cache_hits,
                    avg_time_ms: avg_time_ms(
                        c.total_time_us.load(Ordering::Relaxed),
                        requests.saturating_sub(cache_hits),
                    ),
                }
            })
            .collect();

        MetricsSnapshot {
            total_requests: kinds.iter().map(|k| k.requests).sum(),
            failed_requests: kinds.iter().map(|k| k.failures).sum(),
            kinds,
        }
    }
}

fn avg_time_ms(total_us: u64, count: usize) -> f64 {
    if count > 0 {
        total_us as f64 / count as f64 / 1000.0
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub failed_requests: usize,
    pub kinds: Vec<KindSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct KindSnapshot {
    pub kind: ArtifactKind,
    pub requests: usize,
    pub successes: usize,
    pub fallbacks: usize,
    pub failures: usize,
    pub cache_hits: usize,
    pub avg_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
