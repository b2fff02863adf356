//! Simulate label-switched overlay networks with lossy, delayed links.
//!
//! # Overview
//!
//! A mesh is a set of [node::Node]s joined pairwise by simulated [link]s. Each node holds a table
//! of [RouteRule]s: a datagram arriving on a given link with a given [RouteId] is relabeled with
//! the rule's outgoing [RouteId] and sent over the rule's outgoing link. A multi-hop path is
//! realized as a chain of rules, so no hop needs to know the full path.
//!
//! The [network::Network] creates nodes, connects them, installs rules, and starts every node.
//! Links deliver datagrams after a per-endpoint delay measured with the runtime's
//! [Clock](commonware_runtime::Clock), so simulations run on the `deterministic` runtime are fully
//! reproducible.
//!
//! # Status
//!
//! `commonware-mesh` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

#![doc(
    html_logo_url = "https://commonware.xyz/imgs/rustdoc_logo.svg",
    html_favicon_url = "https://commonware.xyz/favicon.ico"
)]

use thiserror::Error;

pub mod codec;
pub mod link;
pub mod network;
pub mod node;
mod types;
pub use types::{LinkId, NodeId, RouteId, RouteRule, NODE_ID_LEN};

/// Errors that can be returned to callers of a mesh.
///
/// Datagrams dropped while forwarding are not errors: they are logged and counted by the node
/// (see [node::Reason]).
#[derive(Debug, Error)]
pub enum Error {
    #[error("mailbox full")]
    MailboxFull,
    #[error("mailbox closed")]
    MailboxClosed,
    #[error("not valid to link self")]
    LinkingSelf,
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("unknown link: {0}")]
    UnknownLink(LinkId),
    #[error("codec error: {0}")]
    Codec(#[from] commonware_codec::Error),
}
