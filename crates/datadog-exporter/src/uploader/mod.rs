use std::future::Future;
use std::io::Write;

use flate2::write::GzEncoder;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::{Compression, Options};
use crate::exporter::InitError;
use crate::series::{SeriesRequest, TimeSeries};

const SERIES_PATH: &str = "api/v1/series";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Datadog rejected series payload: {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to encode series payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("gzip compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// One upload of a series list to the backend. Implementations make a single
/// attempt per call.
pub trait Upload: Send + Sync + 'static {
    fn upload(
        &self,
        series: Vec<TimeSeries>,
    ) -> impl Future<Output = Result<(), UploadError>> + Send + '_;
}

/// Posts series to the Datadog `/api/v1/series` endpoint.
pub struct HttpUploader {
    client: Client,
    url: Url,
    compression: Compression,
}

impl HttpUploader {
    pub fn new(options: &Options) -> Result<Self, InitError> {
        if options.api_key.is_empty() {
            return Err(InitError::MissingApiKey);
        }

        let client = match &options.http_client {
            Some(client) => client.clone(),
            None => Client::builder().timeout(options.export_timeout).build()?,
        };

        // `join` replaces the last segment of a base path without a trailing slash.
        let mut base = options.endpoint.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let mut url = base.join(SERIES_PATH)?;
        url.query_pairs_mut()
            .append_pair("api_key", &options.api_key);

        Ok(Self {
            client,
            url,
            compression: options.compression,
        })
    }
}

impl Upload for HttpUploader {
    async fn upload(&self, series: Vec<TimeSeries>) -> Result<(), UploadError> {
        let json = serde_json::to_vec(&SeriesRequest { series: &series })?;
        debug!(series = series.len(), bytes = json.len(), "uploading series");

        let mut req = self
            .client
            .post(self.url.clone())
            .header("content-type", "application/json");

        let body = if self.compression == Compression::Gzip {
            req = req.header("content-encoding", "gzip");
            compress_gzip(&json)?
        } else {
            json
        };

        // The request URL carries the API key; keep it out of error messages.
        let resp = req
            .body(body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(UploadError::Rejected { status, body })
        }
    }
}

fn compress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}
