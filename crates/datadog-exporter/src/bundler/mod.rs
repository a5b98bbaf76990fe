//! Count-, weight- and time-bounded batching of arbitrary items.
//!
//! Producers call [`Bundler::add`], which never blocks. A formation task owns
//! the open bundle and its deadline and is fed over a channel; completed
//! bundles travel over a second channel to a dispatch task that runs the
//! [`BundleHandler`] one bundle at a time, in order. [`Bundler::flush`] sends
//! a barrier down the same path, so it resolves only after every earlier
//! bundle has been handled.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error};

pub const DEFAULT_DELAY_THRESHOLD: Duration = Duration::from_secs(1);
pub const DEFAULT_COUNT_THRESHOLD: usize = 10;
pub const DEFAULT_WEIGHT_THRESHOLD: u64 = 1_000_000;
pub const DEFAULT_BUFFERED_WEIGHT_LIMIT: u64 = 1_000_000_000;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BundlerError {
    #[error("item is larger than the maximum bundle weight")]
    OversizedItem,

    #[error("bundler buffer is full")]
    Overflow,

    #[error("bundler is no longer running")]
    Closed,
}

/// A rejected [`Bundler::add`]. Hands the item back so the caller can
/// deal with it some other way.
pub struct AddError<T> {
    reason: BundlerError,
    item: T,
}

impl<T> AddError<T> {
    pub fn reason(&self) -> BundlerError {
        self.reason
    }

    pub fn into_item(self) -> T {
        self.item
    }
}

impl<T> fmt::Debug for AddError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddError")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for AddError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.reason, f)
    }
}

impl<T> std::error::Error for AddError<T> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundlerConfig {
    /// Max time between a bundle's first item and its release.
    pub delay_threshold: Duration,
    /// Release a bundle once it holds this many items.
    pub count_threshold: usize,
    /// Release a bundle once its accumulated weight reaches this. Zero disables it.
    pub weight_threshold: u64,
    /// Max weight of a single bundle. Zero means no limit.
    pub weight_limit: u64,
    /// Max weight held across the open bundle and bundles awaiting the handler.
    pub buffered_weight_limit: u64,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            delay_threshold: DEFAULT_DELAY_THRESHOLD,
            count_threshold: DEFAULT_COUNT_THRESHOLD,
            weight_threshold: DEFAULT_WEIGHT_THRESHOLD,
            weight_limit: 0,
            buffered_weight_limit: DEFAULT_BUFFERED_WEIGHT_LIMIT,
        }
    }
}

/// Receives each completed bundle.
pub trait BundleHandler<T>: Send + Sync + 'static {
    fn handle(&self, bundle: Vec<T>) -> impl Future<Output = ()> + Send + '_;
}

impl<T, F, Fut> BundleHandler<T> for F
where
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, bundle: Vec<T>) -> impl Future<Output = ()> + Send + '_ {
        self(bundle)
    }
}

enum Command<T> {
    Add { item: T, weight: u64 },
    Flush(oneshot::Sender<()>),
}

enum Dispatch<T> {
    Bundle { items: Vec<T>, weight: u64 },
    Barrier(oneshot::Sender<()>),
}

pub struct Bundler<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    buffered: Arc<AtomicU64>,
    config: BundlerConfig,
    formation_task: JoinHandle<()>,
    dispatch_task: JoinHandle<()>,
}

impl<T: Send + 'static> Bundler<T> {
    /// Start the bundler's background tasks.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new<H: BundleHandler<T>>(config: BundlerConfig, handler: H) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let buffered = Arc::new(AtomicU64::new(0));

        let formation_task = tokio::spawn(form_bundles(rx, dispatch_tx, config));
        let dispatch_task = tokio::spawn(dispatch_bundles(
            dispatch_rx,
            Arc::new(handler),
            Arc::clone(&buffered),
        ));

        Self {
            tx,
            buffered,
            config,
            formation_task,
            dispatch_task,
        }
    }

    /// Queue `item` into the open bundle without waiting.
    ///
    /// An item heavier than the bundle weight limit (or than the whole buffer)
    /// is rejected with [`BundlerError::OversizedItem`]. When the buffer cannot
    /// take `weight` more, the item is rejected with [`BundlerError::Overflow`].
    pub fn add(&self, item: T, weight: u64) -> Result<(), AddError<T>> {
        let limit = self.config.buffered_weight_limit;
        let oversized = (self.config.weight_limit > 0 && weight > self.config.weight_limit)
            || weight > limit;
        if oversized {
            return Err(AddError {
                reason: BundlerError::OversizedItem,
                item,
            });
        }

        let reserved = self
            .buffered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(weight).filter(|next| *next <= limit)
            });
        if reserved.is_err() {
            return Err(AddError {
                reason: BundlerError::Overflow,
                item,
            });
        }

        if let Err(mpsc::error::SendError(Command::Add { item, .. })) =
            self.tx.send(Command::Add { item, weight })
        {
            self.buffered.fetch_sub(weight, Ordering::AcqRel);
            return Err(AddError {
                reason: BundlerError::Closed,
                item,
            });
        }
        Ok(())
    }

    /// Release the open bundle and wait until every bundle formed so far has
    /// been handled.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    /// Flush, then stop and join the background tasks.
    pub async fn shutdown(self) {
        self.flush().await;
        let Self {
            tx,
            formation_task,
            dispatch_task,
            ..
        } = self;
        drop(tx);
        for (name, task) in [("formation", formation_task), ("dispatch", dispatch_task)] {
            if let Err(e) = task.await {
                error!(error = %e, task = name, "bundler task failed");
            }
        }
    }

    /// Weight currently held by the open bundle and bundles not yet handled.
    pub fn buffered_weight(&self) -> u64 {
        self.buffered.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &BundlerConfig {
        &self.config
    }
}

struct OpenBundle<T> {
    items: Vec<T>,
    weight: u64,
    deadline: Option<Instant>,
}

impl<T> OpenBundle<T> {
    fn push(&mut self, item: T, weight: u64, delay: Duration) {
        if self.items.is_empty() {
            self.deadline = Some(Instant::now() + delay);
        }
        self.items.push(item);
        self.weight += weight;
    }

    /// Hand the bundle to the dispatch task. No-op when empty.
    fn release(&mut self, out: &mpsc::UnboundedSender<Dispatch<T>>) {
        self.deadline = None;
        if self.items.is_empty() {
            return;
        }
        let items = std::mem::take(&mut self.items);
        let weight = std::mem::take(&mut self.weight);
        // The dispatch task outlives this sender, so a failed send means it panicked.
        if out.send(Dispatch::Bundle { items, weight }).is_err() {
            error!(weight, "bundle dropped: dispatch task is gone");
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn form_bundles<T>(
    mut rx: mpsc::UnboundedReceiver<Command<T>>,
    out: mpsc::UnboundedSender<Dispatch<T>>,
    config: BundlerConfig,
) {
    let count_threshold = config.count_threshold.max(1);
    let mut open = OpenBundle {
        items: Vec::new(),
        weight: 0,
        deadline: None,
    };

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Add { item, weight }) => {
                    if config.weight_limit > 0
                        && !open.items.is_empty()
                        && open.weight + weight > config.weight_limit
                    {
                        open.release(&out);
                    }
                    open.push(item, weight, config.delay_threshold);
                    let heavy = config.weight_threshold > 0 && open.weight >= config.weight_threshold;
                    if heavy || open.items.len() >= count_threshold {
                        open.release(&out);
                    }
                }
                Some(Command::Flush(done)) => {
                    open.release(&out);
                    let _ = out.send(Dispatch::Barrier(done));
                }
                None => {
                    open.release(&out);
                    break;
                }
            },
            _ = sleep_until(open.deadline) => {
                debug!(items = open.items.len(), "bundle delay elapsed");
                open.release(&out);
            }
        }
    }
}

async fn dispatch_bundles<T, H>(
    mut rx: mpsc::UnboundedReceiver<Dispatch<T>>,
    handler: Arc<H>,
    buffered: Arc<AtomicU64>,
) where
    T: Send + 'static,
    H: BundleHandler<T>,
{
    while let Some(message) = rx.recv().await {
        match message {
            Dispatch::Bundle { items, weight } => {
                debug!(items = items.len(), weight, "handling bundle");
                let handler = Arc::clone(&handler);
                // Run on its own task so a panicking handler only loses its bundle.
                let result = tokio::spawn(async move { handler.handle(items).await }).await;
                if let Err(e) = result {
                    error!(error = %e, "bundle handler panicked");
                }
                buffered.fetch_sub(weight, Ordering::AcqRel);
            }
            Dispatch::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}
