//! Aggregated view data handed to the exporter by the instrumentation side.

use std::time::SystemTime;

/// One tag key/value pair of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionData {
    pub count: i64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sum_of_squared_dev: f64,
    pub bucket_counts: Vec<i64>,
}

/// The aggregated value of a row.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AggregationData {
    Count(i64),
    Sum(f64),
    LastValue(f64),
    Distribution(DistributionData),
}

/// One tag combination and its aggregated value.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub tags: Vec<Tag>,
    pub data: AggregationData,
}

impl Row {
    pub fn new(tags: Vec<Tag>, data: AggregationData) -> Self {
        Self { tags, data }
    }
}

/// A snapshot of one view over the window `start..end`.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewData {
    pub name: String,
    pub rows: Vec<Row>,
    pub start: SystemTime,
    pub end: SystemTime,
}

impl ViewData {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Sink for view data produced by an instrumentation library.
pub trait ExportView: Send + Sync {
    fn export_view(&self, view_data: ViewData);
}
