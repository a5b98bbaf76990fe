use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct CollectedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub body: Bytes,
}

pub type CollectorStore = Arc<Mutex<Vec<CollectedRequest>>>;

/// A stand-in for the Datadog API that records every request and answers with `status`.
pub struct Collector {
    pub endpoint: url::Url,
    pub store: CollectorStore,
}

impl Collector {
    pub async fn start(status: StatusCode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind collector listener");
        let port = listener.local_addr().unwrap().port();
        let store: CollectorStore = Arc::new(Mutex::new(Vec::new()));
        let store_clone = Arc::clone(&store);

        tokio::spawn(async move {
            loop {
                let (stream, _) = listener
                    .accept()
                    .await
                    .expect("failed to accept connection");
                let store = Arc::clone(&store_clone);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let store = Arc::clone(&store);
                        handle(req, store, status)
                    });
                    let _ = Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            endpoint: url::Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap(),
            store,
        }
    }

    pub fn requests(&self) -> Vec<CollectedRequest> {
        self.store.lock().unwrap().clone()
    }
}

async fn handle<B>(
    req: Request<B>,
    store: CollectorStore,
    status: StatusCode,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
{
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_owned())
    };
    let content_type = header("content-type");
    let content_encoding = header("content-encoding");
    let method = req.method().to_string();
    let path = req.uri().path().to_owned();
    let query = req.uri().query().map(|q| q.to_owned());

    let body = req
        .collect()
        .await
        .map(|c| c.to_bytes())
        .unwrap_or_default();

    store.lock().unwrap().push(CollectedRequest {
        method,
        path,
        query,
        content_type,
        content_encoding,
        body,
    });

    let body = if status.is_success() {
        Bytes::from_static(br#"{"status":"ok"}"#)
    } else {
        Bytes::from_static(br#"{"errors":["Forbidden"]}"#)
    };
    Ok(Response::builder()
        .status(status)
        .body(Full::new(body))
        .unwrap())
}
