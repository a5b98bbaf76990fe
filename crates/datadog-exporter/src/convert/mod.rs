use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::series::{DataPoint, TimeSeries};
use crate::view::{AggregationData, Tag, ViewData};

/// Replace view path separators with the `.` Datadog expects in metric names.
pub fn normalize_metric_name(view_name: &str) -> String {
    view_name.replace('/', ".")
}

/// Render tags as `key:value` strings, keeping the row's order.
pub fn format_tags(tags: &[Tag]) -> Vec<String> {
    tags.iter()
        .map(|tag| format!("{}:{}", tag.key, tag.value))
        .collect()
}

/// Hostname of this process, or an empty string if it cannot be resolved.
pub fn resolve_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Convert every view into one combined series list, preserving view and row order.
pub fn to_time_series_batch(views: &[ViewData], host: &str) -> Vec<TimeSeries> {
    let mut series = Vec::new();
    for view in views {
        series.extend(to_time_series(view, host));
    }
    series
}

/// One series per row of `view`. Rows whose aggregation has no single
/// numeric value (distributions) are left out.
pub fn to_time_series(view: &ViewData, host: &str) -> Vec<TimeSeries> {
    let metric = normalize_metric_name(&view.name);
    let timestamp = unix_seconds(view.end);

    view.rows
        .iter()
        .filter_map(|row| {
            let Some(value) = point_value(&row.data) else {
                debug!(metric = %metric, "skipping row without a point value");
                return None;
            };
            Some(TimeSeries {
                metric: metric.clone(),
                points: vec![DataPoint(timestamp, value)],
                tags: format_tags(&row.tags),
                host: host.to_owned(),
            })
        })
        .collect()
}

fn point_value(data: &AggregationData) -> Option<f64> {
    match data {
        AggregationData::Count(count) => Some(*count as f64),
        AggregationData::Sum(sum) => Some(*sum),
        AggregationData::LastValue(value) => Some(*value),
        AggregationData::Distribution(_) => None,
    }
}

fn unix_seconds(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}
