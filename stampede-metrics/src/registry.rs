use std::sync::Arc;
use std::sync::atomic::Ordering;

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::agg::Query;
use crate::error::{MetricsError, Result};
use crate::key::{Interner, KeyId};
use crate::metrics::{
    MetricHandle, MetricKind, MetricSeriesSummary, MetricStorage, MetricValue, Sample, rate_of,
};
use crate::tags::TagSet;
use crate::trend::{TrendMode, TrendSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId(u32);

#[derive(Debug)]
struct MetricDef {
    name: KeyId,
    kind: MetricKind,
}

type SeriesMap = DashMap<TagSet, MetricStorage, RandomState>;

/// Series of one metric. The kind lives next to the map so writers never consult `defs`.
#[derive(Debug)]
struct MetricSeries {
    kind: MetricKind,
    series: SeriesMap,
}

/// Run-scoped metric store.
///
/// Metrics are keyed by name and split into series by tag set. Each metric owns its own
/// sharded series map, and each series its own atomics or lock, so writers on different
/// metrics never contend.
///
/// Lock order is `by_name` -> `defs` -> `storage`. The `defs` guard is released before
/// `storage` is touched, and readers of `storage` clone the metric's series out and drop
/// the shard guard before doing anything else.
#[derive(Debug)]
pub struct Registry {
    trend_mode: TrendMode,
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    by_name: DashMap<KeyId, (MetricId, MetricKind), RandomState>,
    storage: DashMap<MetricId, Arc<MetricSeries>, RandomState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(TrendMode::default())
    }
}

impl Registry {
    pub fn new(trend_mode: TrendMode) -> Self {
        Self {
            trend_mode,
            interner: Interner::default(),
            defs: RwLock::new(Vec::new()),
            by_name: DashMap::default(),
            storage: DashMap::default(),
        }
    }

    pub fn trend_mode(&self) -> TrendMode {
        self.trend_mode
    }

    /// Returns the id for `name`, creating the metric on first use.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricId> {
        let name_id = self.interner.get_or_intern(name);

        let (id, existing) = match self.by_name.get(&name_id) {
            Some(entry) => *entry.value(),
            None => *self
                .by_name
                .entry(name_id)
                .or_insert_with(|| {
                    let id = {
                        let mut defs = self.defs.write();
                        let id = MetricId(defs.len() as u32);
                        defs.push(MetricDef {
                            name: name_id,
                            kind,
                        });
                        id
                    };
                    self.storage.insert(
                        id,
                        Arc::new(MetricSeries {
                            kind,
                            series: SeriesMap::default(),
                        }),
                    );
                    (id, kind)
                })
                .value(),
        };

        if existing != kind {
            return Err(MetricsError::KindMismatch {
                name: name.to_string(),
                existing,
                requested: kind,
            });
        }
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let name_id = self.interner.get(name)?;
        self.by_name.get(&name_id).map(|e| *e.value())
    }

    pub fn kind_of(&self, metric: MetricId) -> Option<MetricKind> {
        self.series_of(metric).map(|m| m.kind)
    }

    fn series_of(&self, metric: MetricId) -> Option<Arc<MetricSeries>> {
        self.storage.get(&metric).map(|e| Arc::clone(e.value()))
    }

    pub fn resolve_key(&self, key: &str) -> KeyId {
        self.interner.get_or_intern(key)
    }

    pub(crate) fn find_key(&self, key: &str) -> Option<KeyId> {
        self.interner.get(key)
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::from_pairs(
            tags.iter()
                .map(|(k, v)| (self.resolve_key(k), self.resolve_key(v))),
        )
    }

    pub fn tag_pairs(&self, tags: &TagSet) -> Vec<(String, String)> {
        let text = |id: KeyId| {
            self.interner
                .resolve(id)
                .map(|s| s.to_string())
                .unwrap_or_default()
        };
        tags.iter().map(|(k, v)| (text(k), text(v))).collect()
    }

    /// Write handle for one series, created on first use.
    pub fn handle(&self, metric: MetricId, tags: TagSet) -> Result<MetricHandle> {
        let metric_series = self
            .series_of(metric)
            .ok_or(MetricsError::UnknownMetric(metric.0))?;

        if let Some(storage) = metric_series.series.get(&tags) {
            return Ok(storage.handle());
        }

        let kind = metric_series.kind;
        let handle = metric_series
            .series
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(kind, self.trend_mode))
            .handle();
        Ok(handle)
    }

    /// Records one observation by metric name, registering the metric lazily.
    pub fn record(&self, name: &str, tags: &[(&str, &str)], sample: Sample) -> Result<()> {
        let id = self.register(name, sample.kind())?;
        let handle = self.handle(id, self.resolve_tags(tags))?;
        handle.apply(sample);
        Ok(())
    }

    pub(crate) fn visit_series(&self, metric: MetricId, mut f: impl FnMut(&TagSet, &MetricStorage)) {
        let Some(metric_series) = self.series_of(metric) else {
            return;
        };
        for entry in metric_series.series.iter() {
            f(entry.key(), entry.value());
        }
    }

    pub fn query(&self, metric: MetricId) -> Query<'_> {
        Query::new(self, metric)
    }

    /// All registered metrics as `(id, name, kind)`, sorted by name.
    pub fn metrics(&self) -> Vec<(MetricId, Arc<str>, MetricKind)> {
        let defs = self.defs.read();
        let mut out: Vec<_> = defs
            .iter()
            .enumerate()
            .filter_map(|(idx, d)| {
                let name = self.interner.resolve(d.name)?;
                Some((MetricId(idx as u32), name, d.kind))
            })
            .collect();
        out.sort_by(|a, b| a.1.cmp(&b.1));
        out
    }

    /// One summary per series, sorted by metric name then tags.
    pub fn summarize(&self) -> Vec<MetricSeriesSummary> {
        let mut out = Vec::new();

        for (id, name, kind) in self.metrics() {
            self.visit_series(id, |tags, storage| {
                out.push(MetricSeriesSummary {
                    name: name.to_string(),
                    kind,
                    tags: self.tag_pairs(tags),
                    values: storage_value(storage, self.trend_mode),
                });
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }

    /// One summary per metric with every series merged, sorted by name. Metrics that were
    /// registered but never observed are omitted.
    pub fn summarize_metrics(&self) -> Vec<MetricSeriesSummary> {
        self.metrics()
            .into_iter()
            .filter_map(|(id, name, kind)| {
                let values = self.query(id).value()?;
                Some(MetricSeriesSummary {
                    name: name.to_string(),
                    kind,
                    tags: Vec::new(),
                    values,
                })
            })
            .collect()
    }
}

fn storage_value(storage: &MetricStorage, trend_mode: TrendMode) -> MetricValue {
    match storage {
        MetricStorage::Counter(c) => MetricValue::Counter(c.load(Ordering::Relaxed)),
        MetricStorage::Gauge(g) => MetricValue::Gauge(g.load(Ordering::Relaxed)),
        MetricStorage::Rate(r) => {
            let (total, hits) = r.snapshot();
            MetricValue::Rate {
                total,
                hits,
                rate: rate_of(hits, total),
            }
        }
        MetricStorage::Trend(t) => {
            let mut snap = TrendSnapshot::new(trend_mode);
            snap.absorb(&t.lock());
            MetricValue::Trend(snap.finish().summary())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_and_kind_checked() {
        let reg = Registry::default();
        let a = reg
            .register("http_reqs", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        let b = reg
            .register("http_reqs", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(a, b);

        let err = match reg.register("http_reqs", MetricKind::Trend) {
            Ok(_) => panic!("expected kind mismatch"),
            Err(e) => e,
        };
        assert!(matches!(err, MetricsError::KindMismatch { .. }));
        assert_eq!(reg.lookup("http_reqs"), Some((a, MetricKind::Counter)));
        assert_eq!(reg.lookup("nope"), None);
    }

    #[test]
    fn record_creates_series_per_tag_set() {
        let reg = Registry::default();
        let ok = [("status", "200")];
        let bad = [("status", "500")];
        for _ in 0..3 {
            reg.record("http_reqs", &ok, Sample::Counter(1))
                .unwrap_or_else(|e| panic!("{e}"));
        }
        reg.record("http_reqs", &bad, Sample::Counter(2))
            .unwrap_or_else(|e| panic!("{e}"));

        let series = reg.summarize();
        assert_eq!(series.len(), 2);
        assert_eq!(
            series[0].tags,
            vec![("status".to_string(), "200".to_string())]
        );
        assert_eq!(series[0].values, MetricValue::Counter(3));

        let merged = reg.summarize_metrics();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].values, MetricValue::Counter(5));
    }

    #[test]
    fn unobserved_rate_reports_zero() {
        let reg = Registry::default();
        let id = reg
            .register("success", MetricKind::Rate)
            .unwrap_or_else(|e| panic!("{e}"));
        let handle = reg
            .handle(id, TagSet::default())
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(handle.get_rate(), (0, 0));

        let merged = reg.summarize_metrics();
        assert_eq!(
            merged[0].values,
            MetricValue::Rate {
                total: 0,
                hits: 0,
                rate: 0.0
            }
        );
    }

    #[test]
    fn record_rejects_kind_change() {
        let reg = Registry::default();
        reg.record("errors", &[], Sample::Rate(true))
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(reg.record("errors", &[], Sample::Counter(1)).is_err());
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let reg = Arc::new(Registry::default());
        let threads: Vec<_> = (0..1000)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    reg.record("hits", &[("scenario", "default")], Sample::Counter(1))
                        .unwrap_or_else(|e| panic!("{e}"));
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap_or_else(|_| panic!("recorder thread panicked"));
        }

        let (id, _) = reg.lookup("hits").unwrap_or_else(|| panic!("missing metric"));
        assert_eq!(reg.query(id).sum_counter_total(), 1000);
    }

    #[test]
    fn lazy_registration_races_series_creation_without_stalling() {
        const THREADS: usize = 8;
        const OPS: usize = 2_000;

        let reg = Arc::new(Registry::default());
        let reqs = reg
            .register("http_reqs", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        for t in 0..THREADS {
            let reg = reg.clone();
            let done_tx = done_tx.clone();
            std::thread::spawn(move || {
                for i in 0..OPS {
                    if t % 2 == 0 {
                        reg.record(&format!("custom_{t}_{i}"), &[], Sample::Rate(true))
                            .unwrap_or_else(|e| panic!("{e}"));
                    } else {
                        let name = format!("{t}_{i}");
                        reg.handle(reqs, reg.resolve_tags(&[("name", &name)]))
                            .unwrap_or_else(|e| panic!("{e}"))
                            .increment(1);
                    }
                }
                let _ = done_tx.send(());
            });
        }
        drop(done_tx);

        for _ in 0..THREADS {
            done_rx
                .recv_timeout(std::time::Duration::from_secs(30))
                .unwrap_or_else(|_| panic!("registry stalled under concurrent registration"));
        }

        assert_eq!(reg.query(reqs).sum_counter_total(), (THREADS / 2 * OPS) as u64);
        assert_eq!(reg.metrics().len(), THREADS / 2 * OPS + 1);
    }
}
