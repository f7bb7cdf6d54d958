//! Event fan-out contract.
//!
//! The engine reports everything it learns through an [`EventSink`]. Sinks
//! are called outside the engine's lock, so they may query the engine.
//! For a given subject, events arrive in the order the engine applied them.

use tokio::sync::mpsc;

use crate::location::LocationRecord;

/// Receiver of engine notifications.
pub trait EventSink: Send + Sync {
    /// A new record was accepted for the subject.
    fn on_update(&self, subject_id: &str, record: &LocationRecord);

    /// The subject's document no longer exists; its record was dropped.
    fn on_removed(&self, subject_id: &str);

    /// A fetch, subscription or parse failed for the subject.
    fn on_error(&self, subject_id: &str, message: &str);

    /// Every subject of one `track` call has finished bootstrapping.
    fn on_batch_bootstrapped(&self, success_count: usize, total_count: usize);
}

/// Owned form of an engine notification.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Updated {
        subject_id: String,
        record: LocationRecord,
    },
    Removed {
        subject_id: String,
    },
    Error {
        subject_id: String,
        message: String,
    },
    BatchBootstrapped {
        success_count: usize,
        total_count: usize,
    },
}

impl SyncEvent {
    /// Subject the event is about, if any.
    pub fn subject_id(&self) -> Option<&str> {
        match self {
            SyncEvent::Updated { subject_id, .. }
            | SyncEvent::Removed { subject_id }
            | SyncEvent::Error { subject_id, .. } => Some(subject_id),
            SyncEvent::BatchBootstrapped { .. } => None,
        }
    }
}

impl std::fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncEvent::Updated { subject_id, record } => write!(
                f,
                "update   {} ({:.6}, {:.6}) at {}",
                subject_id,
                record.latitude(),
                record.longitude(),
                record.observed_at().to_rfc3339()
            ),
            SyncEvent::Removed { subject_id } => write!(f, "removed  {}", subject_id),
            SyncEvent::Error {
                subject_id,
                message,
            } => write!(f, "error    {}: {}", subject_id, message),
            SyncEvent::BatchBootstrapped {
                success_count,
                total_count,
            } => write!(f, "batch    {}/{} bootstrapped", success_count, total_count),
        }
    }
}

/// Sink forwarding every notification into an unbounded channel.
///
/// Dropping the receiver silently discards further events.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver it feeds.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelEventSink {
    fn on_update(&self, subject_id: &str, record: &LocationRecord) {
        self.send(SyncEvent::Updated {
            subject_id: subject_id.to_string(),
            record: record.clone(),
        });
    }

    fn on_removed(&self, subject_id: &str) {
        self.send(SyncEvent::Removed {
            subject_id: subject_id.to_string(),
        });
    }

    fn on_error(&self, subject_id: &str, message: &str) {
        self.send(SyncEvent::Error {
            subject_id: subject_id.to_string(),
            message: message.to_string(),
        });
    }

    fn on_batch_bootstrapped(&self, success_count: usize, total_count: usize) {
        self.send(SyncEvent::BatchBootstrapped {
            success_count,
            total_count,
        });
    }
}

/// Deliver an owned event to any sink.
pub(crate) fn dispatch(sink: &dyn EventSink, event: &SyncEvent) {
    match event {
        SyncEvent::Updated { subject_id, record } => sink.on_update(subject_id, record),
        SyncEvent::Removed { subject_id } => sink.on_removed(subject_id),
        SyncEvent::Error {
            subject_id,
            message,
        } => sink.on_error(subject_id, message),
        SyncEvent::BatchBootstrapped {
            success_count,
            total_count,
        } => sink.on_batch_bootstrapped(*success_count, *total_count),
    }
}
