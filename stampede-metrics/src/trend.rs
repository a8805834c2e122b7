use hdrhistogram::Histogram;

/// Fixed-point scale applied before values land in an HDR histogram, so three decimal places
/// of a millisecond survive the integer buckets.
const HDR_SCALE: f64 = 1_000.0;

/// Upper bound of the HDR histogram: one hour in milliseconds, scaled.
const HDR_MAX: u64 = 3_600_000 * 1_000;

/// How Trend series keep their observations.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum TrendMode {
    /// Every sample is retained; percentiles are exact.
    #[default]
    Exact,
    /// Samples are bucketed in an HDR histogram (3 significant digits).
    Hdr,
}

#[derive(Debug)]
pub enum TrendStore {
    Exact(Vec<f64>),
    Hdr(Box<Histogram<u64>>),
}

fn new_hdr() -> Histogram<u64> {
    match Histogram::<u64>::new_with_bounds(1, HDR_MAX, 3) {
        Ok(h) => h,
        Err(err) => panic!("invalid static histogram bounds: {err}"),
    }
}

impl TrendStore {
    pub fn new(mode: TrendMode) -> Self {
        match mode {
            TrendMode::Exact => TrendStore::Exact(Vec::new()),
            TrendMode::Hdr => TrendStore::Hdr(Box::new(new_hdr())),
        }
    }

    /// Non-finite values are dropped. The HDR store clamps negatives to zero.
    pub fn record(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        match self {
            TrendStore::Exact(samples) => samples.push(value),
            TrendStore::Hdr(h) => {
                let scaled = (value.max(0.0) * HDR_SCALE).round() as u64;
                h.saturating_record(scaled);
            }
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            TrendStore::Exact(samples) => samples.len() as u64,
            TrendStore::Hdr(h) => h.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-only merge of one or more Trend series, ready for statistics queries.
#[derive(Debug, Clone)]
pub enum TrendSnapshot {
    Exact(Vec<f64>),
    Hdr(Box<Histogram<u64>>),
}

impl TrendSnapshot {
    pub fn new(mode: TrendMode) -> Self {
        match mode {
            TrendMode::Exact => TrendSnapshot::Exact(Vec::new()),
            TrendMode::Hdr => TrendSnapshot::Hdr(Box::new(new_hdr())),
        }
    }

    pub(crate) fn absorb(&mut self, store: &TrendStore) {
        match (self, store) {
            (TrendSnapshot::Exact(acc), TrendStore::Exact(samples)) => {
                acc.extend_from_slice(samples)
            }
            (TrendSnapshot::Hdr(acc), TrendStore::Hdr(h)) => {
                let _ = acc.add(h.as_ref());
            }
            // A registry uses a single mode for all of its trends.
            (TrendSnapshot::Exact(acc), TrendStore::Hdr(h)) => {
                for v in h.iter_recorded() {
                    let value = v.value_iterated_to() as f64 / HDR_SCALE;
                    acc.extend(std::iter::repeat_n(value, v.count_at_value() as usize));
                }
            }
            (TrendSnapshot::Hdr(acc), TrendStore::Exact(samples)) => {
                for v in samples {
                    acc.saturating_record((v.max(0.0) * HDR_SCALE).round() as u64);
                }
            }
        }
    }

    /// Sorts exact samples with a total order so every query below is independent of the
    /// order in which samples were recorded.
    pub(crate) fn finish(mut self) -> Self {
        if let TrendSnapshot::Exact(samples) = &mut self {
            samples.sort_unstable_by(f64::total_cmp);
        }
        self
    }

    pub fn count(&self) -> u64 {
        match self {
            TrendSnapshot::Exact(s) => s.len() as u64,
            TrendSnapshot::Hdr(h) => h.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn min(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        match self {
            TrendSnapshot::Exact(s) => s.first().copied(),
            TrendSnapshot::Hdr(h) => Some(h.min() as f64 / HDR_SCALE),
        }
    }

    pub fn max(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        match self {
            TrendSnapshot::Exact(s) => s.last().copied(),
            TrendSnapshot::Hdr(h) => Some(h.max() as f64 / HDR_SCALE),
        }
    }

    pub fn avg(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        match self {
            TrendSnapshot::Exact(s) => Some(s.iter().sum::<f64>() / s.len() as f64),
            TrendSnapshot::Hdr(h) => Some(h.mean() / HDR_SCALE),
        }
    }

    /// Percentile `p` in `[0, 100]`.
    ///
    /// Exact mode interpolates linearly between the two closest ranks
    /// (`rank = p / 100 * (n - 1)`). HDR mode reports the bucket value at the quantile.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.is_empty() || !(0.0..=100.0).contains(&p) {
            return None;
        }
        match self {
            TrendSnapshot::Exact(s) => {
                let rank = p / 100.0 * (s.len() - 1) as f64;
                let lower = rank.floor() as usize;
                let upper = rank.ceil() as usize;
                let lo = s[lower];
                let hi = s[upper];
                Some(lo + (hi - lo) * (rank - lower as f64))
            }
            TrendSnapshot::Hdr(h) => Some(h.value_at_quantile(p / 100.0) as f64 / HDR_SCALE),
        }
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    pub fn summary(&self) -> TrendSummary {
        TrendSummary {
            count: self.count(),
            min: self.min(),
            max: self.max(),
            avg: self.avg(),
            med: self.med(),
            p90: self.percentile(90.0),
            p95: self.percentile(95.0),
            p99: self.percentile(99.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendSummary {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub med: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(values: &[f64]) -> TrendSnapshot {
        let mut store = TrendStore::new(TrendMode::Exact);
        for v in values {
            store.record(*v);
        }
        let mut snap = TrendSnapshot::new(TrendMode::Exact);
        snap.absorb(&store);
        snap.finish()
    }

    #[test]
    fn empty_snapshot_has_no_stats() {
        let snap = exact(&[]);
        let s = snap.summary();
        assert_eq!(s.count, 0);
        assert!(s.min.is_none());
        assert!(s.avg.is_none());
        assert!(s.p95.is_none());
    }

    #[test]
    fn exact_percentiles_interpolate_between_ranks() {
        let snap = exact(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(snap.percentile(0.0), Some(10.0));
        assert_eq!(snap.percentile(50.0), Some(30.0));
        assert_eq!(snap.percentile(100.0), Some(50.0));
        // rank = 0.95 * 4 = 3.8 -> 40 + 0.8 * 10
        let p95 = snap.percentile(95.0).unwrap_or_else(|| panic!("p95"));
        assert!((p95 - 48.0).abs() < 1e-9, "p95={p95}");
        assert_eq!(snap.avg(), Some(30.0));
        assert_eq!(snap.percentile(100.5), None);
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let snap = exact(&[7.5]);
        assert_eq!(snap.percentile(1.0), Some(7.5));
        assert_eq!(snap.percentile(99.9), Some(7.5));
    }

    #[test]
    fn percentiles_do_not_depend_on_insertion_order() {
        let forward: Vec<f64> = (1..=1000).map(|v| v as f64 * 0.37).collect();
        let mut shuffled = forward.clone();
        shuffled.reverse();
        shuffled.swap(10, 500);
        shuffled.swap(3, 999);

        let a = exact(&forward);
        let b = exact(&shuffled);
        for p in [50.0, 90.0, 95.0, 99.0, 99.9] {
            assert_eq!(a.percentile(p), b.percentile(p));
            // Recomputing from the same snapshot is idempotent.
            assert_eq!(a.percentile(p), a.percentile(p));
        }
    }

    #[test]
    fn non_finite_samples_are_dropped() {
        let snap = exact(&[1.0, f64::NAN, f64::INFINITY, 3.0]);
        assert_eq!(snap.count(), 2);
        assert_eq!(snap.max(), Some(3.0));
    }

    #[test]
    fn hdr_mode_keeps_sub_millisecond_precision() {
        let mut store = TrendStore::new(TrendMode::Hdr);
        store.record(1.5);
        store.record(2.5);
        store.record(-4.0);
        assert_eq!(store.len(), 3);

        let mut snap = TrendSnapshot::new(TrendMode::Hdr);
        snap.absorb(&store);
        let snap = snap.finish();
        assert_eq!(snap.min(), Some(0.0));
        let max = snap.max().unwrap_or_else(|| panic!("max"));
        assert!((max - 2.5).abs() < 0.01, "max={max}");
    }
}
