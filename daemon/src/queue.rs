//! The upload queue: captures go to the backend one at a time, in the order they were submitted.

use log::{debug, info, warn};
use shared::{Capture, CaptureError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::backend::Backend;

struct QueuedCapture {
    capture: Capture,
    ack: Option<oneshot::Sender<Result<(), CaptureError>>>,
}

/// Handle to the upload queue and its consumer task.
///
/// Submitting never blocks. The consumer takes the head of the queue, uploads it, and only then
/// looks at the next item, so at most one upload is in flight. Each capture gets exactly one
/// attempt; failures are logged and the capture is dropped.
pub struct UploadQueue {
    sender: mpsc::UnboundedSender<QueuedCapture>,
    pending: Arc<AtomicUsize>,
    uploading: Arc<AtomicBool>,
    consumer: JoinHandle<()>,
}

impl UploadQueue {
    /// Starts the consumer task. Must be called from within a Tokio runtime.
    pub fn spawn(backend: Arc<dyn Backend>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let uploading = Arc::new(AtomicBool::new(false));

        let consumer = tokio::spawn(consume(
            receiver,
            backend,
            Arc::clone(&pending),
            Arc::clone(&uploading),
        ));

        Self {
            sender,
            pending,
            uploading,
            consumer,
        }
    }

    pub fn submit(&self, capture: Capture) {
        self.enqueue(QueuedCapture { capture, ack: None });
    }

    /// Like [`submit`](Self::submit), but reports the outcome of the upload.
    pub fn submit_with_ack(&self, capture: Capture) -> oneshot::Receiver<Result<(), CaptureError>> {
        let (ack, outcome) = oneshot::channel();
        self.enqueue(QueuedCapture {
            capture,
            ack: Some(ack),
        });
        outcome
    }

    fn enqueue(&self, item: QueuedCapture) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::error::SendError(item)) = self.sender.send(item) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("Upload queue is closed, dropping capture for {}", item.capture.label);
            if let Some(ack) = item.ack {
                let _ = ack.send(Err(CaptureError::Remote("upload queue is closed".to_string())));
            }
        }
    }

    /// Captures queued or being uploaded.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::SeqCst)
    }

    /// Stops accepting captures and waits for the backlog to drain.
    pub async fn close(self) {
        let backlog = self.pending();
        if backlog > 0 {
            info!("Waiting for {} pending upload(s)", backlog);
        }
        drop(self.sender);
        if let Err(e) = self.consumer.await {
            warn!("Upload consumer ended abnormally: {}", e);
        }
    }
}

async fn consume(
    mut receiver: mpsc::UnboundedReceiver<QueuedCapture>,
    backend: Arc<dyn Backend>,
    pending: Arc<AtomicUsize>,
    uploading: Arc<AtomicBool>,
) {
    while let Some(QueuedCapture { capture, ack }) = receiver.recv().await {
        uploading.store(true, Ordering::SeqCst);
        let result = backend.upload(&capture).await;
        uploading.store(false, Ordering::SeqCst);
        pending.fetch_sub(1, Ordering::SeqCst);

        let outcome = match result {
            Ok(()) => {
                debug!("Uploaded {} for label {}", capture.file_name(), capture.label);
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Dropping capture {} for label {}: {}",
                    capture.file_name(),
                    capture.label,
                    e
                );
                Err(CaptureError::from(e))
            }
        };
        if let Some(ack) = ack {
            let _ = ack.send(outcome);
        }
    }
    debug!("Upload queue closed");
}
