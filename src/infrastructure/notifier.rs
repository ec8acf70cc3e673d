//! Notification sink
//!
//! Sessions report lifecycle events (connected, disconnected, transfer
//! milestones, failures) through a [`Notifier`] handed to them at
//! construction. Presentation is the receiver's business.

use crate::domain::models::{AppEvent, ConnectionStatus, MessageSeverity, StatusMessage, Transport};
use tokio::sync::mpsc;

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: MessageSeverity);

    /// Connection status changes. Ignored unless the sink cares.
    fn connection_status(&self, _transport: Transport, _status: ConnectionStatus) {}
}

/// Forwards notifications as [`AppEvent`]s into an unbounded channel
#[derive(Clone)]
pub struct ChannelNotifier {
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl ChannelNotifier {
    pub fn new(event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { event_sender }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str, severity: MessageSeverity) {
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }

    fn connection_status(&self, transport: Transport, status: ConnectionStatus) {
        let _ = self
            .event_sender
            .send(AppEvent::ConnectionStatus(transport, status));
    }
}

/// Notifier that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, severity: MessageSeverity) {
        match severity {
            MessageSeverity::Error => tracing::error!("{}", message),
            MessageSeverity::Warning => tracing::warn!("{}", message),
            MessageSeverity::Info | MessageSeverity::Success => tracing::info!("{}", message),
        }
    }
}
