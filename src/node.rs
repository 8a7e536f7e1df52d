//! Local node capabilities consumed by the registry.

use crate::message::EndpointAddress;

/// What the local node can receive, and where.
///
/// Worker-only nodes process messages handed to them but never receive
/// published messages, so they are exempt from registration. Any other
/// node needs a configured inbox before it can register.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    worker_only: bool,
    inbox: Option<EndpointAddress>,
}

impl NodeIdentity {
    /// A node that receives published messages at `inbox`.
    pub fn with_inbox(inbox: EndpointAddress) -> Self {
        Self {
            worker_only: false,
            inbox: Some(inbox),
        }
    }

    /// A worker-only node, exempt from registration.
    pub fn worker_only() -> Self {
        Self {
            worker_only: true,
            inbox: None,
        }
    }

    /// A node with no receiving inbox configured.
    ///
    /// Such a node can still run in ignore mode or defer subscriptions,
    /// but registration against the store will be rejected.
    pub fn without_inbox() -> Self {
        Self {
            worker_only: false,
            inbox: None,
        }
    }

    pub fn is_worker_only(&self) -> bool {
        self.worker_only
    }

    pub fn inbox(&self) -> Option<&EndpointAddress> {
        self.inbox.as_ref()
    }
}
