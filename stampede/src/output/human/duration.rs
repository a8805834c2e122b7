use std::time::Duration;

/// Compact rounded rendering for progress and header lines: `1h05m`, `2m30s`, `45s`, `250ms`,
/// `80us`.
pub(crate) fn format_duration_single(d: Duration) -> String {
    const NS_PER_US: u128 = 1_000;
    const NS_PER_MS: u128 = 1_000_000;
    const NS_PER_S: u128 = 1_000_000_000;

    fn round_div(value: u128, unit: u128) -> u128 {
        (value + (unit / 2)) / unit
    }

    let total_ns = d.as_nanos();

    if total_ns >= NS_PER_S {
        let secs = round_div(total_ns, NS_PER_S);
        return match (secs / 3600, (secs % 3600) / 60, secs % 60) {
            (0, 0, s) => format!("{s}s"),
            (0, m, 0) => format!("{m}m"),
            (0, m, s) => format!("{m}m{s:02}s"),
            (h, m, _) => format!("{h}h{m:02}m"),
        };
    }
    if total_ns >= NS_PER_MS {
        return format!("{}ms", round_div(total_ns, NS_PER_MS));
    }

    format!("{}us", round_div(total_ns, NS_PER_US))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_largest_sensible_unit() {
        assert_eq!(format_duration_single(Duration::from_micros(80)), "80us");
        assert_eq!(format_duration_single(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration_single(Duration::from_millis(45_400)), "45s");
        assert_eq!(format_duration_single(Duration::from_secs(120)), "2m");
        assert_eq!(format_duration_single(Duration::from_secs(150)), "2m30s");
        assert_eq!(format_duration_single(Duration::from_secs(23 * 60)), "23m");
        assert_eq!(format_duration_single(Duration::from_secs(3900)), "1h05m");
    }
}
