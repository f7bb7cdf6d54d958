//! Revocable handle for one live subscription.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// One live subscription to one subject's document.
///
/// Owned by the engine's subscription table. Cancelling (or dropping) the
/// handle cancels the token handed to the store. The id distinguishes a
/// subscription from a later one for the same subject, so notifications
/// from a replaced subscription can be recognised and dropped.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: u64,
    subject_id: String,
    cancellation: CancellationToken,
}

impl SubscriptionHandle {
    pub(crate) fn new(subject_id: impl Into<String>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            subject_id: subject_id.into(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Token passed to the store; cancelled together with the handle.
    pub(crate) fn token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Revoke the subscription. Idempotent.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = SubscriptionHandle::new("u1");
        let b = SubscriptionHandle::new("u1");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.subject_id(), "u1");
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let handle = SubscriptionHandle::new("u1");
        let token = handle.token();
        assert!(!handle.is_cancelled());

        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_drop_cancels_token() {
        let handle = SubscriptionHandle::new("u1");
        let token = handle.token();
        drop(handle);
        assert!(token.is_cancelled());
    }
}
