//! Bounded row streaming
//!
//! A producer task walks a server-side cursor, decodes rows, and pushes
//! them through a bounded channel; the channel's capacity is the only
//! backpressure signal, so memory stays bounded regardless of result-set
//! size. Decode failures are reported through a callback and skipped; a
//! cursor failure is delivered in-band and terminates the stream. The
//! producer closes the cursor on every exit path: exhaustion, fatal
//! error, cancellation, or the consumer dropping its end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::backend::{Record, RowCursor};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};

/// Cooperative cancellation handle the producer polls between row
/// fetches
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// Tuning for a row stream
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Channel capacity between producer and consumer (>= 1)
    pub capacity: usize,
}

impl StreamOptions {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            capacity: config.stream_buffer,
        }
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            capacity: crate::config::DEFAULT_STREAM_BUFFER,
        }
    }
}

/// Consumer end of a stream of decoded items
///
/// A lazy, finite, non-restartable sequence. Ownership of each item
/// transfers on receipt; `None` signals end-of-stream. Dropping the
/// stream cancels the producer, which then releases the cursor.
pub struct RecordStream<I> {
    rx: mpsc::Receiver<StorageResult<I>>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Stream of single records
pub type RowStream<T> = RecordStream<T>;

/// Stream of pre-batched records
pub type BatchStream<T> = RecordStream<Vec<T>>;

impl<I> RecordStream<I> {
    /// Receive the next item. A `Some(Err(_))` is a fatal cursor or
    /// connection failure; the stream ends after delivering it.
    pub async fn recv(&mut self) -> Option<StorageResult<I>> {
        self.rx.recv().await
    }

    /// Handle for cancelling the producer from elsewhere
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request cancellation; the producer stops at its next fetch
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel and wait for the producer to release the cursor
    pub async fn shutdown(mut self) {
        self.token.cancel();
        self.rx.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl<I> Drop for RecordStream<I> {
    fn drop(&mut self) {
        // the producer observes either the token or the closed channel
        // and releases the cursor on its own
        self.token.cancel();
    }
}

/// Stream decoded records one at a time from an open cursor.
///
/// Decode failures invoke `on_decode_err` and are skipped; they do not
/// terminate the stream.
pub fn stream_rows<T, F>(
    cursor: Box<dyn RowCursor>,
    options: StreamOptions,
    on_decode_err: F,
) -> RowStream<T>
where
    T: Record,
    F: Fn(StorageError) + Send + 'static,
{
    let (tx, rx) = mpsc::channel(options.capacity.max(1));
    let token = CancellationToken::new();
    let producer_token = token.clone();

    let handle = tokio::spawn(produce_rows::<T, F>(cursor, tx, producer_token, on_decode_err));

    RecordStream {
        rx,
        token,
        handle: Some(handle),
    }
}

/// Stream decoded records in batches of `batch_size`, emitting a final
/// partial batch when the cursor is exhausted.
pub fn stream_rows_batched<T, F>(
    cursor: Box<dyn RowCursor>,
    batch_size: usize,
    options: StreamOptions,
    on_decode_err: F,
) -> BatchStream<T>
where
    T: Record,
    F: Fn(StorageError) + Send + 'static,
{
    let (tx, rx) = mpsc::channel(options.capacity.max(1));
    let token = CancellationToken::new();
    let producer_token = token.clone();
    let batch_size = batch_size.max(1);

    let handle = tokio::spawn(produce_batches::<T, F>(
        cursor,
        batch_size,
        tx,
        producer_token,
        on_decode_err,
    ));

    RecordStream {
        rx,
        token,
        handle: Some(handle),
    }
}

async fn produce_rows<T, F>(
    mut cursor: Box<dyn RowCursor>,
    tx: mpsc::Sender<StorageResult<T>>,
    token: CancellationToken,
    on_decode_err: F,
) where
    T: Record,
    F: Fn(StorageError) + Send + 'static,
{
    loop {
        if token.is_cancelled() {
            debug!("row stream cancelled");
            break;
        }
        match cursor.next_row().await {
            Ok(Some(row)) => match T::from_row(row.as_ref()) {
                Ok(item) => {
                    if tx.send(Ok(item)).await.is_err() {
                        // consumer went away
                        break;
                    }
                }
                Err(e) => on_decode_err(e),
            },
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
    cursor.close().await;
}

async fn produce_batches<T, F>(
    mut cursor: Box<dyn RowCursor>,
    batch_size: usize,
    tx: mpsc::Sender<StorageResult<Vec<T>>>,
    token: CancellationToken,
    on_decode_err: F,
) where
    T: Record,
    F: Fn(StorageError) + Send + 'static,
{
    let mut buffer: Vec<T> = Vec::with_capacity(batch_size);
    loop {
        if token.is_cancelled() {
            debug!("batched row stream cancelled");
            break;
        }
        match cursor.next_row().await {
            Ok(Some(row)) => match T::from_row(row.as_ref()) {
                Ok(item) => {
                    buffer.push(item);
                    if buffer.len() == batch_size {
                        let full = std::mem::replace(&mut buffer, Vec::with_capacity(batch_size));
                        if tx.send(Ok(full)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => on_decode_err(e),
            },
            Ok(None) => {
                if !buffer.is_empty() {
                    let _ = tx.send(Ok(std::mem::take(&mut buffer))).await;
                }
                break;
            }
            Err(e) => {
                // deliver what was already decoded, then the failure
                if !buffer.is_empty() && tx.send(Ok(std::mem::take(&mut buffer))).await.is_err() {
                    break;
                }
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
    cursor.close().await;
}
