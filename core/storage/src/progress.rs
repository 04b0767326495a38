//! Transfer progress events and their non-blocking reporter.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, trace};

/// Default capacity for [`progress_channel`].
pub const DEFAULT_PROGRESS_CAPACITY: usize = 64;

/// A progress event for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferProgress {
    /// Bytes handed to the remote side so far.
    Uploading { bytes: u64 },
    /// Bytes received so far.
    Downloading { bytes: u64 },
    /// The transfer finished successfully.
    Completed { bytes: u64 },
    /// The transfer failed.
    Failed { message: String },
}

impl TransferProgress {
    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferProgress::Completed { .. } | TransferProgress::Failed { .. }
        )
    }
}

/// Sending half handed to transfer operations.
pub type ProgressSender = mpsc::Sender<TransferProgress>;
/// Receiving half kept by the observer.
pub type ProgressReceiver = mpsc::Receiver<TransferProgress>;

/// Create a bounded progress channel.
pub fn progress_channel(capacity: usize) -> (ProgressSender, ProgressReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Reports progress for a single transfer.
///
/// Events are logged and forwarded with `try_send`, so a slow or dropped
/// observer never stalls the transfer. Nothing is emitted after the first
/// terminal event.
#[derive(Debug)]
pub struct ProgressReporter {
    object: String,
    sender: Option<ProgressSender>,
    finished: AtomicBool,
}

impl ProgressReporter {
    /// Create a reporter for `object`, forwarding to `sender` if present.
    pub fn new(object: impl Into<String>, sender: Option<ProgressSender>) -> Self {
        Self {
            object: object.into(),
            sender,
            finished: AtomicBool::new(false),
        }
    }

    pub fn uploading(&self, bytes: u64) {
        self.report(TransferProgress::Uploading { bytes });
    }

    pub fn downloading(&self, bytes: u64) {
        self.report(TransferProgress::Downloading { bytes });
    }

    pub fn completed(&self, bytes: u64) {
        self.report(TransferProgress::Completed { bytes });
    }

    pub fn failed(&self, message: impl Into<String>) {
        self.report(TransferProgress::Failed {
            message: message.into(),
        });
    }

    /// Log and forward one event.
    pub fn report(&self, event: TransferProgress) {
        if self.finished.load(Ordering::Acquire) {
            return;
        }
        if event.is_terminal() && self.finished.swap(true, Ordering::AcqRel) {
            return;
        }

        match &event {
            TransferProgress::Uploading { bytes } => {
                debug!(object = %self.object, bytes_uploaded = bytes, "Uploading to Drive");
            }
            TransferProgress::Downloading { bytes } => {
                debug!(object = %self.object, bytes_downloaded = bytes, "Downloading Drive file");
            }
            TransferProgress::Completed { bytes } => {
                info!(object = %self.object, bytes, "Drive transfer completed");
            }
            TransferProgress::Failed { message } => {
                error!(object = %self.object, error = %message, "Drive transfer failed");
            }
        }

        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                trace!(object = %self.object, ?event, "Progress observer lagging; event dropped");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
