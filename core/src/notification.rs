//! Fire-and-forget processing notifications.
//!
//! The flow-processing phase emits exactly one notification per terminal
//! routing outcome: a [`NotificationKind::Response`] when the flow produced
//! a result, or a [`NotificationKind::ErrorResponse`] when it failed
//! unhandled. Sinks must not block or fail; a sink that needs to do real
//! work should hand off internally.

use crate::event::Event;

/// The two terminal routing outcomes a sink can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// The flow produced a response event.
    Response,
    /// The flow failed with an unhandled error.
    ErrorResponse,
}

/// Receiver of processing notifications.
pub trait NotificationSink: Send + Sync {
    /// Observe a terminal routing outcome for `event` at the given message
    /// source location.
    fn fire(&self, kind: NotificationKind, event: &Event, location: &str);
}

/// A sink that discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotificationSink;

impl NotificationSink for NullNotificationSink {
    fn fire(&self, _kind: NotificationKind, _event: &Event, _location: &str) {}
}
