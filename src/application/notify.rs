use crate::domain::collaborators::{Notification, NotifierRef};
use std::sync::Arc;

/// Fire-and-forget dispatch after a financial write has committed.
/// Failures are logged and dropped.
pub(crate) fn dispatch(notifier: &NotifierRef, notification: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(notification).await {
            tracing::warn!(error = %e, "notification dispatch failed");
        }
    });
}
