use std::collections::HashMap;
use std::sync::atomic::Ordering;

use smallvec::SmallVec;

use crate::key::KeyId;
use crate::metrics::{MetricKind, MetricStorage, MetricValue, rate_of};
use crate::registry::{MetricId, Registry};
use crate::tags::TagSet;
use crate::trend::TrendSnapshot;

#[derive(Debug, Clone, Copy)]
enum TagFilter {
    Eq(KeyId, KeyId),
    /// The filter names a string the registry has never seen, so nothing can match.
    Never,
}

impl TagFilter {
    fn matches(&self, tags: &TagSet) -> bool {
        match *self {
            TagFilter::Eq(k, v) => tags.get(k) == Some(v),
            TagFilter::Never => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total: u64,
}

impl CounterSnapshot {
    pub fn new(total: u64) -> Self {
        Self { total }
    }

    pub fn delta_since(self, prev: Option<Self>) -> u64 {
        match prev {
            Some(prev) => self.total.saturating_sub(prev.total),
            None => self.total,
        }
    }

    pub fn per_sec_since(self, prev: Option<Self>, dt_secs: f64) -> f64 {
        per_sec(self.delta_since(prev), dt_secs)
    }
}

#[inline]
pub fn per_sec(delta: u64, dt_secs: f64) -> f64 {
    delta as f64 / dt_secs.max(1e-9)
}

/// Read-side view over the series of one metric, narrowed by tag filters.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    registry: &'a Registry,
    metric: MetricId,
    filters: SmallVec<[TagFilter; 4]>,
    group_keys: SmallVec<[KeyId; 4]>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(registry: &'a Registry, metric: MetricId) -> Self {
        Self {
            registry,
            metric,
            filters: SmallVec::new(),
            group_keys: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn where_eq(mut self, key: KeyId, value: KeyId) -> Self {
        self.filters.push(TagFilter::Eq(key, value));
        self
    }

    /// Like [`Query::where_eq`] but by string, without interning new keys.
    #[must_use]
    pub fn where_tag(mut self, key: &str, value: &str) -> Self {
        let filter = match (self.registry.find_key(key), self.registry.find_key(value)) {
            (Some(k), Some(v)) => TagFilter::Eq(k, v),
            _ => TagFilter::Never,
        };
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn group_by(mut self, keys: impl IntoIterator<Item = KeyId>) -> Self {
        self.group_keys = keys.into_iter().collect();
        self.group_keys.sort_unstable();
        self.group_keys.dedup();
        self
    }

    fn matches(&self, tags: &TagSet) -> bool {
        self.filters.iter().all(|f| f.matches(tags))
    }

    fn group_key(&self, tags: &TagSet) -> TagSet {
        tags.project(&self.group_keys)
    }

    pub fn sum_counter(self) -> HashMap<TagSet, u64> {
        let mut out: HashMap<TagSet, u64> = HashMap::new();

        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            let MetricStorage::Counter(c) = storage else {
                return;
            };

            let v = c.load(Ordering::Relaxed);
            let k = self.group_key(tags);
            let cur = out.entry(k).or_insert(0);
            *cur = cur.saturating_add(v);
        });

        out
    }

    pub fn sum_counter_total(self) -> u64 {
        self.sum_counter().values().copied().sum()
    }

    /// `(total, hits)` summed over matching rate series.
    pub fn sum_rate(self) -> (u64, u64) {
        let mut total = 0u64;
        let mut hits = 0u64;

        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            if let MetricStorage::Rate(r) = storage {
                let (t, h) = r.snapshot();
                total = total.saturating_add(t);
                hits = hits.saturating_add(h);
            }
        });

        (total, hits)
    }

    /// Highest value among matching gauge series.
    pub fn max_gauge(self) -> Option<i64> {
        let mut out: Option<i64> = None;
        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            if let MetricStorage::Gauge(g) = storage {
                let v = g.load(Ordering::Relaxed);
                out = Some(out.map_or(v, |cur| cur.max(v)));
            }
        });
        out
    }

    pub fn merge_trend(self) -> HashMap<TagSet, TrendSnapshot> {
        let mode = self.registry.trend_mode();
        let mut acc: HashMap<TagSet, TrendSnapshot> = HashMap::new();

        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            let MetricStorage::Trend(t) = storage else {
                return;
            };

            let k = self.group_key(tags);
            let entry = acc.entry(k).or_insert_with(|| TrendSnapshot::new(mode));
            entry.absorb(&t.lock());
        });

        acc.into_iter().map(|(k, snap)| (k, snap.finish())).collect()
    }

    /// All matching trend series merged into one snapshot, ignoring `group_by`.
    pub fn merge_trend_single(self) -> Option<TrendSnapshot> {
        let mut q = self;
        q.group_keys.clear();
        q.merge_trend().into_values().next()
    }

    /// Merged value of every matching series, or `None` if no series matched.
    pub fn value(self) -> Option<MetricValue> {
        let kind = self.registry.kind_of(self.metric)?;
        let mut matched = false;
        self.registry.visit_series(self.metric, |tags, _| {
            matched |= self.matches(tags);
        });
        if !matched {
            return None;
        }

        Some(match kind {
            MetricKind::Counter => MetricValue::Counter(self.sum_counter_total()),
            MetricKind::Gauge => MetricValue::Gauge(self.max_gauge().unwrap_or_default()),
            MetricKind::Rate => {
                let (total, hits) = self.sum_rate();
                MetricValue::Rate {
                    total,
                    hits,
                    rate: rate_of(hits, total),
                }
            }
            MetricKind::Trend => MetricValue::Trend(
                self.merge_trend_single()
                    .map(|s| s.summary())
                    .unwrap_or_default(),
            ),
        })
    }
}
