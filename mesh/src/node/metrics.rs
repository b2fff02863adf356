use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family},
};

/// Reason a datagram was dropped by a node.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Reason {
    /// No rule for the datagram's route.
    UnknownRoute,
    /// The datagram arrived on a link other than the one its rule expects.
    TransportMismatch,
    /// The rule names an outgoing link the node does not have.
    UnknownLink,
    /// A rule is stored under a route other than its own incoming route.
    CorruptRule,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct Dropped {
    pub reason: Reason,
}

/// Metrics for a [Node](super::Node)
#[derive(Clone, Default)]
pub struct Metrics {
    /// Number of datagrams handed to an outgoing link
    pub forwarded: Counter,
    /// Number of datagrams dropped, by reason
    pub dropped: Family<Dropped, Counter>,
}

impl Metrics {
    /// Create and return a new set of metrics, registered under the label of `context`.
    pub fn init<E: RuntimeMetrics>(context: &E) -> Self {
        let metrics = Self::default();
        context.register(
            "forwarded",
            "Number of datagrams handed to an outgoing link",
            metrics.forwarded.clone(),
        );
        context.register(
            "dropped",
            "Number of datagrams dropped by reason",
            metrics.dropped.clone(),
        );
        metrics
    }

    pub fn inc_dropped(&self, reason: Reason) {
        self.dropped.get_or_create(&Dropped { reason }).inc();
    }

    pub fn dropped(&self, reason: Reason) -> u64 {
        self.dropped.get_or_create(&Dropped { reason }).get()
    }
}
