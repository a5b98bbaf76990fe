//! Exports aggregated stats views to Datadog.
//!
//! View data handed to [`Exporter::export_view`] is buffered by a
//! [`Bundler`](bundler::Bundler) and uploaded to the Datadog series API in
//! batches, once a batch is full or has waited long enough. Errors after
//! construction never reach the caller; they go to the configured
//! [`ErrorHandler`] and are logged by default.
//!
//! ```ignore
//! rustls::crypto::ring::default_provider().install_default().unwrap();
//!
//! let exporter = Exporter::new(Options::new(api_key))?;
//! exporter.export_view(view_data);
//! exporter.flush().await;
//! ```
//!
//! reqwest is built without a bundled TLS crypto provider, so the binary must
//! install one before creating an exporter.

pub mod bundler;
pub mod config;
pub mod convert;
pub mod exporter;
pub mod series;
pub mod uploader;
pub mod view;

#[cfg(test)]
mod testing;

pub use config::{Compression, ConfigError, Options};
pub use exporter::{ErrorHandler, ExportError, Exporter, InitError, LogErrors};
pub use series::{DataPoint, TimeSeries};
pub use uploader::{HttpUploader, Upload, UploadError};
pub use view::{AggregationData, DistributionData, ExportView, Row, Tag, ViewData};
