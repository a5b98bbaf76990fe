use std::time::{Duration, SystemTime};

use datadog_exporter::{AggregationData, Exporter, Options, Row, Tag, ViewData};
use tracing::{error, info};

const REPORTING_PERIOD: Duration = Duration::from_secs(1);

/// Log an init failure and exit.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("DATADOG_EXPORTER_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid DATADOG_EXPORTER_LOG_LEVEL: {val:?}, defaulting to INFO");
                None
            })
        })
        .unwrap_or(LevelFilter::INFO);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

fn setup_rustls() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls ring provider");
}

/// Stand-in for an instrumentation library: aggregates a fake video pipeline
/// and snapshots its views once per reporting period.
#[derive(Default)]
struct VideoStats {
    processed: i64,
    last_size: f64,
    total_size: f64,
}

impl VideoStats {
    fn record(&mut self, size: f64) {
        self.processed += 1;
        self.last_size = size;
        self.total_size += size;
    }

    fn snapshot(&self, start: SystemTime, end: SystemTime) -> Vec<ViewData> {
        let tags = vec![
            Tag::new("local_testing", "macbook"),
            Tag::new("opencensus", "datadog"),
        ];
        let view = |name: &str, data: AggregationData| ViewData {
            name: name.into(),
            rows: vec![Row::new(tags.clone(), data)],
            start,
            end,
        };
        vec![
            view("demo/video/size", AggregationData::LastValue(self.last_size)),
            view("demo/video/count", AggregationData::Count(self.processed)),
            view("demo/video/size_cum", AggregationData::Sum(self.total_size)),
        ]
    }
}

#[tokio::main]
async fn main() {
    setup_logging();
    setup_rustls();

    let options = Options::from_env().unwrap_or_else(|e| fatal("config error", &e));
    let exporter = Exporter::new(options).unwrap_or_else(|e| fatal("failed to create exporter", &e));
    info!(host = exporter.host(), "exporting demo stats to Datadog");

    let mut stats = VideoStats::default();
    let mut ticker = tokio::time::interval(REPORTING_PERIOD);
    let started = SystemTime::now();
    let mut i = 0u32;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                stats.record(f64::from(i * 10));
                i += 1;
                for view in stats.snapshot(started, SystemTime::now()) {
                    exporter.export_view(view);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, flushing");
                break;
            }
        }
    }

    exporter.shutdown().await;
    info!("all metrics flushed");
}
