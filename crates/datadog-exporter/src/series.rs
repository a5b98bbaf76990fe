use serde::Serialize;

/// A single `[timestamp, value]` sample. Timestamps are seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DataPoint(pub i64, pub f64);

impl DataPoint {
    pub fn timestamp(&self) -> i64 {
        self.0
    }

    pub fn value(&self) -> f64 {
        self.1
    }
}

/// One metric stream as accepted by the Datadog series endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub metric: String,
    pub points: Vec<DataPoint>,
    pub tags: Vec<String>,
    pub host: String,
}

/// Body of `POST /api/v1/series`.
#[derive(Debug, Serialize)]
pub struct SeriesRequest<'a> {
    pub series: &'a [TimeSeries],
}
