//! Carry datagrams between two nodes with configurable delay and loss.
//!
//! # Overview
//!
//! A link is a pair of directional [Endpoint]s created by [pair]. Each endpoint belongs to one
//! node and delivers what that node sends to the other node's data mailbox, tagged with the id of
//! the reverse endpoint (the link the datagram "arrived on" from the receiver's perspective).
//!
//! Every endpoint has its own [Config], so links may be asymmetric. Delivery happens `delay` after
//! a send. Loss is deterministic: an endpoint whose delay exceeds its drop threshold loses every
//! packet.
//!
//! # Counters
//!
//! Each endpoint counts packets sent (at send time) and packets confirmed (once accepted by the
//! peer). Counters only grow and confirmed never exceeds sent. Reads are snapshots and are not
//! synchronized with any other endpoint.
//!
//! Packets sent over one endpoint are delivered in order. No ordering holds across endpoints.

mod config;
pub use config::{Config, DEFAULT_DELAY, DEFAULT_DROP_THRESHOLD};
mod endpoint;
pub use endpoint::{pair, Endpoint, Side};
mod metrics;
pub use metrics::Metrics;
