use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};

use crate::exporter::{ErrorHandler, ExportError};
use crate::series::TimeSeries;
use crate::uploader::{Upload, UploadError};
use crate::view::{AggregationData, Row, Tag, ViewData};

#[derive(Default)]
pub struct UploadLog {
    pub calls: Mutex<Vec<Vec<TimeSeries>>>,
}

impl UploadLog {
    pub fn calls(&self) -> Vec<Vec<TimeSeries>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

/// Records every upload and succeeds.
pub struct RecordingUploader {
    log: Arc<UploadLog>,
    delay: Duration,
}

impl RecordingUploader {
    pub fn new() -> (Self, Arc<UploadLog>) {
        Self::with_delay(Duration::ZERO)
    }

    /// Sleeps for `delay` before recording each upload.
    pub fn with_delay(delay: Duration) -> (Self, Arc<UploadLog>) {
        let log = Arc::new(UploadLog::default());
        (
            Self {
                log: Arc::clone(&log),
                delay,
            },
            log,
        )
    }
}

impl Upload for RecordingUploader {
    async fn upload(&self, series: Vec<TimeSeries>) -> Result<(), UploadError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.log.calls.lock().unwrap().push(series);
        Ok(())
    }
}

/// Counts attempts and always fails.
#[derive(Default)]
pub struct FailingUploader {
    pub attempts: Arc<AtomicU32>,
}

impl Upload for FailingUploader {
    async fn upload(&self, _series: Vec<TimeSeries>) -> Result<(), UploadError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(UploadError::Rejected {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            body: "backend unavailable".into(),
        })
    }
}

pub type ErrorLog = Arc<Mutex<Vec<ExportError>>>;

/// An error handler closure that collects errors, plus the collection.
pub fn collect_errors() -> (Arc<dyn ErrorHandler>, ErrorLog) {
    let errors: ErrorLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let handler: Arc<dyn ErrorHandler> =
        Arc::new(move |err: ExportError| sink.lock().unwrap().push(err));
    (handler, errors)
}

pub fn count_view(name: &str, counts: &[i64]) -> ViewData {
    ViewData {
        name: name.into(),
        rows: counts
            .iter()
            .enumerate()
            .map(|(i, c)| Row::new(vec![Tag::new("row", i.to_string())], AggregationData::Count(*c)))
            .collect(),
        start: UNIX_EPOCH,
        end: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
    }
}

/// reqwest is built without a bundled crypto provider; install one for tests.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
