use crate::{LinkId, NodeId};
use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct Endpoint {
    pub link: u64,
    pub origin: String,
    pub recipient: String,
}

impl Endpoint {
    pub fn new(link: LinkId, origin: &NodeId, recipient: &NodeId) -> Self {
        Self {
            link: link.get(),
            origin: origin.to_string(),
            recipient: recipient.to_string(),
        }
    }
}

/// Delivery counters for every endpoint in a network.
#[derive(Clone, Default)]
pub struct Metrics {
    /// Packets accepted for transmission, by endpoint
    pub sent: Family<Endpoint, Counter>,
    /// Packets delivered to the peer, by endpoint
    pub confirmed: Family<Endpoint, Counter>,
}

impl Metrics {
    /// Create and return a new set of metrics, registered under the label of `context`.
    pub fn init<E: RuntimeMetrics>(context: &E) -> Self {
        let metrics = Self::default();
        context.register(
            "packets_sent",
            "Packets accepted for transmission",
            metrics.sent.clone(),
        );
        context.register(
            "packets_confirmed",
            "Packets delivered to the peer node",
            metrics.confirmed.clone(),
        );
        metrics
    }
}
