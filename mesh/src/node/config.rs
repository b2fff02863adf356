use crate::NodeId;

/// Default capacity of the data and control mailboxes.
pub const DEFAULT_MAILBOX_SIZE: usize = 1024;

/// Default maximum size of a datagram accepted in encoded form.
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Configuration for a [Node](super::Node).
#[derive(Clone, Debug)]
pub struct Config {
    /// Identity of the node.
    pub id: NodeId,

    /// Number of datagrams that can be queued before injection fails.
    pub mailbox_size: usize,

    /// Number of control commands that can be queued before injection fails.
    pub control_mailbox_size: usize,

    /// Largest datagram accepted by [Mailbox::inject_encoded](super::Mailbox::inject_encoded).
    pub max_datagram_size: usize,
}

impl Config {
    /// Configuration with default limits for the given identity.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            mailbox_size: DEFAULT_MAILBOX_SIZE,
            control_mailbox_size: DEFAULT_MAILBOX_SIZE,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
        }
    }
}
