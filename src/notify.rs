//! User-facing notifications raised by the search flows.
//!
//! The engine only emits; how a notification is shown (toast, log line,
//! terminal message) belongs to the consumer.

use std::fmt;

use portal_types::RequestStatus;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Identifiers,
    Uil,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Flow::Identifiers => "identifiers",
            Flow::Uil => "uil",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A submission was accepted and registered.
    RequestSaved { flow: Flow, request_id: String },
    /// A request left `PENDING`.
    RequestUpdated {
        flow: Flow,
        request_id: String,
        status: RequestStatus,
    },
    NoteSaved { request_id: String },
    /// A transport or document failure worth telling the user about.
    Error { operation: String, message: String },
}

impl Notification {
    pub fn error(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Error {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::RequestSaved { flow, request_id } => {
                tracing::info!(%flow, %request_id, "Request saved");
            }
            Notification::RequestUpdated {
                flow,
                request_id,
                status,
            } => {
                tracing::info!(%flow, %request_id, %status, "Request updated");
            }
            Notification::NoteSaved { request_id } => {
                tracing::info!(%request_id, "Note saved");
            }
            Notification::Error { operation, message } => {
                tracing::warn!(%operation, %message, "Request failed");
            }
        }
    }
}

/// Forwards notifications to an unbounded channel. A closed receiver is
/// not an error; the notification is dropped.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("Notification receiver dropped");
        }
    }
}

/// Resolve once `request_id` is terminal. A request whose submit
/// acknowledgement was already terminal is never polled, so no update will
/// arrive for it; pass its registry status as `current`. `None` means the
/// channel closed first.
pub async fn wait_for_terminal(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
    request_id: &str,
    current: Option<RequestStatus>,
) -> Option<RequestStatus> {
    if let Some(status) = current.filter(RequestStatus::is_terminal) {
        return Some(status);
    }
    while let Some(notification) = rx.recv().await {
        match notification {
            Notification::RequestUpdated {
                request_id: id,
                status,
                ..
            } if id == request_id => return Some(status),
            Notification::Error { operation, message } => {
                tracing::warn!(%operation, %message, "Poll failed, retrying on next tick");
            }
            _ => {}
        }
    }
    None
}
