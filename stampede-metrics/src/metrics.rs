use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::trend::{TrendMode, TrendStore, TrendSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

/// One observation handed to [`crate::Registry::record`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Counter(u64),
    Gauge(i64),
    Rate(bool),
    Trend(f64),
}

impl Sample {
    pub fn kind(&self) -> MetricKind {
        match self {
            Sample::Counter(_) => MetricKind::Counter,
            Sample::Gauge(_) => MetricKind::Gauge,
            Sample::Rate(_) => MetricKind::Rate,
            Sample::Trend(_) => MetricKind::Trend,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricSeriesSummary {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
    pub values: MetricValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    /// `rate` is `hits / total`, or `0.0` when nothing was observed.
    Rate {
        total: u64,
        hits: u64,
        rate: f64,
    },
    Trend(TrendSummary),
}

impl MetricValue {
    /// Number of observations behind the value. Gauges count as one once set.
    pub fn observations(&self) -> u64 {
        match self {
            MetricValue::Counter(v) => *v,
            MetricValue::Gauge(_) => 1,
            MetricValue::Rate { total, .. } => *total,
            MetricValue::Trend(t) => t.count,
        }
    }
}

pub(crate) fn rate_of(hits: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

#[derive(Debug, Default)]
pub struct Rate {
    pub(crate) total: AtomicU64,
    pub(crate) hits: AtomicU64,
}

impl Rate {
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.hits.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<Rate>),
    Trend(Arc<Mutex<TrendStore>>),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind, trend_mode: TrendMode) -> Self {
        match kind {
            MetricKind::Counter => MetricStorage::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Gauge => MetricStorage::Gauge(Arc::new(AtomicI64::new(0))),
            MetricKind::Rate => MetricStorage::Rate(Arc::new(Rate::default())),
            MetricKind::Trend => {
                MetricStorage::Trend(Arc::new(Mutex::new(TrendStore::new(trend_mode))))
            }
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            MetricStorage::Counter(a) => MetricHandle::Counter(a.clone()),
            MetricStorage::Gauge(a) => MetricHandle::Gauge(a.clone()),
            MetricStorage::Rate(a) => MetricHandle::Rate(a.clone()),
            MetricStorage::Trend(a) => MetricHandle::Trend(a.clone()),
        }
    }
}

/// Cheap, cloneable write handle to a single series.
///
/// Counter, gauge and rate updates are single atomic operations. A trend takes the lock of
/// its own series only.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<Rate>),
    Trend(Arc<Mutex<TrendStore>>),
}

impl MetricHandle {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricHandle::Counter(_) => MetricKind::Counter,
            MetricHandle::Gauge(_) => MetricKind::Gauge,
            MetricHandle::Rate(_) => MetricKind::Rate,
            MetricHandle::Trend(_) => MetricKind::Trend,
        }
    }

    #[inline]
    pub fn increment(&self, value: u64) {
        if let MetricHandle::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn set_gauge(&self, value: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.store(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn max_gauge(&self, value: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.fetch_max(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn observe_rate(&self, hit: bool) {
        if let MetricHandle::Rate(r) = self {
            if hit {
                r.hits.fetch_add(1, Ordering::Relaxed);
            }
            r.total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn observe_trend(&self, value: f64) {
        if let MetricHandle::Trend(t) = self {
            t.lock().record(value);
        }
    }

    /// Applies `sample` if it matches the handle's kind. Returns `false` otherwise.
    pub fn apply(&self, sample: Sample) -> bool {
        match (self, sample) {
            (MetricHandle::Counter(_), Sample::Counter(v)) => self.increment(v),
            (MetricHandle::Gauge(_), Sample::Gauge(v)) => self.set_gauge(v),
            (MetricHandle::Rate(_), Sample::Rate(v)) => self.observe_rate(v),
            (MetricHandle::Trend(_), Sample::Trend(v)) => self.observe_trend(v),
            _ => return false,
        }
        true
    }

    pub fn get_counter(&self) -> u64 {
        match self {
            MetricHandle::Counter(c) => c.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    pub fn get_gauge(&self) -> i64 {
        match self {
            MetricHandle::Gauge(g) => g.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    /// `(total, hits)`.
    pub fn get_rate(&self) -> (u64, u64) {
        match self {
            MetricHandle::Rate(r) => r.snapshot(),
            _ => (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_starts_empty() {
        match MetricStorage::new(MetricKind::Counter, TrendMode::Exact) {
            MetricStorage::Counter(c) => assert_eq!(c.load(Ordering::Relaxed), 0),
            other => panic!("expected counter, got {other:?}"),
        }

        match MetricStorage::new(MetricKind::Rate, TrendMode::Exact) {
            MetricStorage::Rate(r) => assert_eq!(r.snapshot(), (0, 0)),
            other => panic!("expected rate, got {other:?}"),
        }

        match MetricStorage::new(MetricKind::Trend, TrendMode::Hdr) {
            MetricStorage::Trend(t) => assert!(t.lock().is_empty()),
            other => panic!("expected trend, got {other:?}"),
        }
    }

    #[test]
    fn handles_update_their_series() {
        let c = MetricStorage::new(MetricKind::Counter, TrendMode::Exact).handle();
        c.increment(2);
        c.increment(3);
        assert_eq!(c.get_counter(), 5);

        let g = MetricStorage::new(MetricKind::Gauge, TrendMode::Exact).handle();
        g.set_gauge(10);
        g.max_gauge(4);
        assert_eq!(g.get_gauge(), 10);
        g.max_gauge(12);
        assert_eq!(g.get_gauge(), 12);

        let r = MetricStorage::new(MetricKind::Rate, TrendMode::Exact).handle();
        r.observe_rate(true);
        r.observe_rate(false);
        r.observe_rate(true);
        assert_eq!(r.get_rate(), (3, 2));
    }

    #[test]
    fn apply_rejects_mismatched_samples() {
        let r = MetricStorage::new(MetricKind::Rate, TrendMode::Exact).handle();
        assert!(r.apply(Sample::Rate(true)));
        assert!(!r.apply(Sample::Counter(1)));
        assert_eq!(r.get_rate(), (1, 1));
    }

    #[test]
    fn empty_rate_is_zero() {
        assert_eq!(rate_of(0, 0), 0.0);
        assert_eq!(rate_of(1, 4), 0.25);
    }
}
