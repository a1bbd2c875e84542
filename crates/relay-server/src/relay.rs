use std::sync::Arc;

use relay_core::events::ServerEvent;
use relay_core::ids::ConnectionId;

use crate::client::ClientRegistry;

/// Delivers server events to one browser connection.
///
/// No buffering beyond the connection's queue: events for a connection that
/// is gone are dropped.
#[derive(Clone)]
pub struct EventRelay {
    registry: Arc<ClientRegistry>,
}

impl EventRelay {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    pub fn emit(&self, target: &ConnectionId, event: &ServerEvent) -> bool {
        let Some(frame) = event.to_wire() else {
            tracing::warn!(event = event.name(), "Failed to serialize event");
            return false;
        };
        let delivered = self.registry.send_to(target, frame);
        if !delivered {
            tracing::debug!(connection_id = %target, event = event.name(), "Dropped event for absent connection");
        }
        delivered
    }

    /// Whether `target` is an open browser connection.
    pub fn is_connected(&self, target: &ConnectionId) -> bool {
        self.registry.is_connected(target)
    }

    pub fn status(&self, target: &ConnectionId, message: impl Into<String>) -> bool {
        self.emit(target, &ServerEvent::status(message))
    }

    pub fn otp(&self, target: &ConnectionId, otp: impl Into<String>) -> bool {
        self.emit(target, &ServerEvent::otp(otp))
    }
}
