use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};
use tracing::{debug, error, warn};

use crate::bundler::{AddError, BundleHandler, Bundler, BundlerConfig, BundlerError};
use crate::config::Options;
use crate::convert;
use crate::uploader::{HttpUploader, Upload, UploadError};
use crate::view::{ExportView, ViewData};

/// Construction failures. Nothing is started when one is returned.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("missing Datadog API key")]
    MissingApiKey,

    #[error("invalid Datadog endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("exporter must be created inside a tokio runtime: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

/// Failures raised after construction, delivered to the [`ErrorHandler`].
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to upload: buffer full")]
    BufferFull,

    #[error("failed to buffer view data: {0}")]
    Bundler(BundlerError),

    #[error("failed to upload: {0}")]
    Upload(#[from] UploadError),
}

/// Receives every error raised on the export path.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, err: ExportError);
}

impl<F> ErrorHandler for F
where
    F: Fn(ExportError) + Send + Sync,
{
    fn handle_error(&self, err: ExportError) {
        self(err)
    }
}

/// Logs errors. Used when no handler is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrors;

impl ErrorHandler for LogErrors {
    fn handle_error(&self, err: ExportError) {
        error!(error = %err, "error exporting to Datadog");
    }
}

struct Shared<U> {
    uploader: U,
    host: String,
    on_error: Arc<dyn ErrorHandler>,
}

impl<U: Upload> Shared<U> {
    async fn upload_views(&self, views: Vec<ViewData>) {
        let series = convert::to_time_series_batch(&views, &self.host);
        if series.is_empty() {
            debug!(views = views.len(), "no series to upload");
            return;
        }
        if let Err(e) = self.uploader.upload(series).await {
            self.on_error.handle_error(ExportError::Upload(e));
        }
    }
}

struct UploadHandler<U>(Arc<Shared<U>>);

impl<U: Upload> BundleHandler<ViewData> for UploadHandler<U> {
    async fn handle(&self, bundle: Vec<ViewData>) {
        self.0.upload_views(bundle).await;
    }
}

/// Buffers view data and uploads it to Datadog in batches.
pub struct Exporter<U: Upload = HttpUploader> {
    bundler: Bundler<ViewData>,
    shared: Arc<Shared<U>>,
    runtime: Handle,
}

impl Exporter<HttpUploader> {
    /// Build an exporter posting to the Datadog series API.
    ///
    /// Must be called inside a tokio runtime; `export_view` may then be called
    /// from any thread.
    pub fn new(options: Options) -> Result<Self, InitError> {
        let uploader = HttpUploader::new(&options)?;
        Self::with_uploader(options, uploader)
    }
}

impl<U: Upload> Exporter<U> {
    pub fn with_uploader(options: Options, uploader: U) -> Result<Self, InitError> {
        Self::with_bundler_config(options, uploader, BundlerConfig::default())
    }

    /// Like [`Exporter::with_uploader`], starting from a custom bundler
    /// configuration. Non-zero bundle thresholds in `options` still win.
    pub fn with_bundler_config(
        options: Options,
        uploader: U,
        mut config: BundlerConfig,
    ) -> Result<Self, InitError> {
        if options.api_key.is_empty() {
            return Err(InitError::MissingApiKey);
        }
        let runtime = Handle::try_current()?;

        if !options.bundle_delay_threshold.is_zero() {
            config.delay_threshold = options.bundle_delay_threshold;
        }
        if options.bundle_count_threshold > 0 {
            config.count_threshold = options.bundle_count_threshold;
        }

        let shared = Arc::new(Shared {
            uploader,
            host: options.host.unwrap_or_else(convert::resolve_hostname),
            on_error: options.on_error.unwrap_or_else(|| Arc::new(LogErrors)),
        });
        let bundler = Bundler::new(config, UploadHandler(Arc::clone(&shared)));

        Ok(Self {
            bundler,
            shared,
            runtime,
        })
    }

    /// Queue `view_data` for upload. Views without rows are ignored.
    pub fn export_view(&self, view_data: ViewData) {
        if view_data.is_empty() {
            return;
        }
        if let Err(rejected) = self.bundler.add(view_data, 1) {
            self.handle_rejected(rejected);
        }
    }

    fn handle_rejected(&self, rejected: AddError<ViewData>) {
        match rejected.reason() {
            BundlerError::OversizedItem => {
                let view = rejected.into_item();
                warn!(view = %view.name, "view data too large to bundle, uploading on its own");
                let shared = Arc::clone(&self.shared);
                // Not tracked by flush.
                self.runtime.spawn(async move {
                    shared.upload_views(vec![view]).await;
                });
            }
            BundlerError::Overflow => self.shared.on_error.handle_error(ExportError::BufferFull),
            reason => self
                .shared
                .on_error
                .handle_error(ExportError::Bundler(reason)),
        }
    }

    /// Wait until every view queued so far has been uploaded or its failure reported.
    pub async fn flush(&self) {
        self.bundler.flush().await;
    }

    /// Flush and stop the background tasks.
    pub async fn shutdown(self) {
        self.bundler.shutdown().await;
    }

    pub fn host(&self) -> &str {
        &self.shared.host
    }
}

impl<U: Upload> ExportView for Exporter<U> {
    fn export_view(&self, view_data: ViewData) {
        Exporter::export_view(self, view_data);
    }
}
