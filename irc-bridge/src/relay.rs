//! Fan-out: delivering one endpoint's lines to every other endpoint.

use std::sync::Arc;

use crate::format::{LineKind, RelayLine};

/// What the relay needs from an endpoint. Sends are fire-and-forget: they
/// must not block, and failures are the peer's to log.
pub trait Peer: Send + Sync {
    /// Configured network identifier.
    fn identifier(&self) -> &str;

    /// Post `text` to every channel this peer manages.
    fn send_message(&self, text: &str);

    /// Post `text` as a `/me` action to every channel this peer manages.
    fn send_action(&self, text: &str);
}

/// Every endpoint created at startup, in configuration order.
///
/// Built once and shared read-only; members are never added or removed.
pub struct EndpointSet {
    members: Vec<Arc<dyn Peer>>,
}

impl EndpointSet {
    pub fn new(members: Vec<Arc<dyn Peer>>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Peer>> {
        self.members.iter()
    }

    /// Call `handler` on every member except `origin`, in set order.
    /// Returns how many peers were visited.
    ///
    /// `origin` is matched by identity, not by identifier.
    pub fn forward<F>(&self, origin: &dyn Peer, mut handler: F) -> usize
    where
        F: FnMut(&dyn Peer),
    {
        let mut visited = 0;
        for member in &self.members {
            if std::ptr::addr_eq(Arc::as_ptr(member), origin) {
                tracing::trace!(origin = origin.identifier(), "Skipping origin");
                continue;
            }
            handler(member.as_ref());
            visited += 1;
        }
        visited
    }

    /// Deliver a rendered line to every peer of `origin`.
    pub fn relay(&self, origin: &dyn Peer, line: &RelayLine) -> usize {
        self.forward(origin, |peer| {
            tracing::trace!(to = peer.identifier(), "Forwarding");
            match line.kind {
                LineKind::Message => peer.send_message(&line.text),
                LineKind::Action => peer.send_action(&line.text),
            }
        })
    }
}
