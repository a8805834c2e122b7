pub(crate) fn format_bytes(b: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if b >= GIB {
        return format!("{:.2}GiB", (b as f64) / (GIB as f64));
    }
    if b >= MIB {
        return format!("{:.2}MiB", (b as f64) / (MIB as f64));
    }
    if b >= KIB {
        return format!("{:.2}KiB", (b as f64) / (KIB as f64));
    }

    format!("{b}B")
}

pub(crate) fn format_tags_inline(tags: &[(String, String)], exclude: &[&str]) -> String {
    let mut filtered: Vec<&(String, String)> = tags
        .iter()
        .filter(|(k, _)| !exclude.contains(&k.as_str()))
        .collect();

    if filtered.is_empty() {
        return String::new();
    }
    filtered.sort();

    let inner = filtered
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");

    format!("{{{inner}}}")
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

/// Trend values: milliseconds for `*_duration` metrics, plain numbers otherwise.
pub(crate) fn format_trend_value(metric: &str, v: Option<f64>) -> String {
    match v {
        None => "-".to_string(),
        Some(v) if metric.ends_with("_duration") => format_ms(v),
        Some(v) => format!("{v:.2}"),
    }
}

fn format_ms(ms: f64) -> String {
    if !ms.is_finite() || ms < 0.0 {
        return "-".to_string();
    }
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else if ms >= 1.0 {
        format!("{ms:.2}ms")
    } else {
        format!("{:.0}µs", ms * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_use_binary_units() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00MiB");
    }

    #[test]
    fn tags_are_sorted_and_filtered() {
        let tags = vec![
            ("status".to_string(), "200".to_string()),
            ("scenario".to_string(), "ecommerce".to_string()),
            ("method".to_string(), "GET".to_string()),
        ];
        assert_eq!(
            format_tags_inline(&tags, &["scenario"]),
            "{method=GET status=200}"
        );
        assert_eq!(format_tags_inline(&tags[1..2], &["scenario"]), "");
    }

    #[test]
    fn trend_values_render_durations_in_time_units() {
        assert_eq!(format_trend_value("http_req_duration", Some(12.5)), "12.50ms");
        assert_eq!(format_trend_value("http_req_duration", Some(1500.0)), "1.50s");
        assert_eq!(format_trend_value("http_req_duration", Some(0.25)), "250µs");
        assert_eq!(format_trend_value("cart_size", Some(3.0)), "3.00");
        assert_eq!(format_trend_value("cart_size", None), "-");
    }
}
