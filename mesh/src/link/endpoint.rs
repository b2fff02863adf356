use super::{metrics, Config};
use crate::{codec::OutRoute, node::Mailbox, LinkId, NodeId};
use commonware_macros::select;
use commonware_runtime::{Clock, Metrics as RuntimeMetrics, Spawner};
use prometheus_client::metrics::counter::Counter;
use std::{collections::VecDeque, fmt, time::SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// One side of a link, as seen by the node that owns it.
#[derive(Clone)]
pub struct Side {
    /// Node owning this side.
    pub node: NodeId,

    /// Id of the endpoint owned by `node`.
    pub link: LinkId,

    /// Ingress of `node`, used by the peer to deliver packets.
    pub mailbox: Mailbox,

    /// Behavior of packets sent by `node` over this link.
    pub config: Config,
}

/// Create both endpoints of a link between `a` and `b`.
///
/// Returns the endpoint owned by `a` (sending toward `b`) and the endpoint owned by `b`
/// (sending toward `a`). Each endpoint spawns its own delivery task on `context`, which runs
/// until every clone of the endpoint is dropped and all pending packets have been handled.
pub fn pair<E: Clock + Spawner + RuntimeMetrics>(
    context: &E,
    metrics: &metrics::Metrics,
    a: Side,
    b: Side,
) -> (Endpoint, Endpoint) {
    let ab = Endpoint::spawn(context, metrics, &a, &b);
    let ba = Endpoint::spawn(context, metrics, &b, &a);
    (ab, ba)
}

/// Directional endpoint of a simulated link.
///
/// Cloning an endpoint is cheap: clones share counters and the delivery queue.
#[derive(Clone)]
pub struct Endpoint {
    id: LinkId,
    owner: NodeId,
    peer: NodeId,
    peer_link: LinkId,
    config: Config,

    sent: Counter,
    confirmed: Counter,

    sender: mpsc::UnboundedSender<OutRoute>,
}

impl Endpoint {
    fn spawn<E: Clock + Spawner + RuntimeMetrics>(
        context: &E,
        metrics: &metrics::Metrics,
        from: &Side,
        to: &Side,
    ) -> Self {
        let label = metrics::Endpoint::new(from.link, &from.node, &to.node);
        let sent = metrics.sent.get_or_create(&label).clone();
        let confirmed = metrics.confirmed.get_or_create(&label).clone();

        let (sender, receiver) = mpsc::unbounded_channel();
        let courier = Courier {
            link: from.link,
            config: from.config,
            peer: to.mailbox.clone(),
            peer_link: to.link,
            receiver,
            queue: VecDeque::new(),
            confirmed: confirmed.clone(),
        };
        context
            .with_label("courier")
            .spawn(move |context| courier.run(context));

        Self {
            id: from.link,
            owner: from.node,
            peer: to.node,
            peer_link: to.link,
            config: from.config,
            sent,
            confirmed,
            sender,
        }
    }

    /// Queue a packet for delivery to the peer.
    ///
    /// The packet is counted as sent immediately, whether or not it is later delivered.
    pub fn send(&self, message: OutRoute) {
        self.sent.inc();
        if self.sender.send(message).is_err() {
            // Only possible if the delivery task panicked
            warn!(link = %self.id, "delivery task stopped");
        }
    }

    /// Id of this endpoint.
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Node that sends over this endpoint.
    pub fn owner(&self) -> &NodeId {
        &self.owner
    }

    /// Node that receives packets sent over this endpoint.
    pub fn peer(&self) -> &NodeId {
        &self.peer
    }

    /// Id of the reverse endpoint, owned by the peer.
    ///
    /// Packets delivered by this endpoint arrive at the peer tagged with this id.
    pub fn peer_link(&self) -> LinkId {
        self.peer_link
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of packets handed to this endpoint.
    pub fn packets_sent(&self) -> u64 {
        self.sent.get()
    }

    /// Number of packets delivered to the peer.
    ///
    /// Never exceeds [Endpoint::packets_sent].
    pub fn packets_confirmed(&self) -> u64 {
        self.confirmed.get()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("peer", &self.peer)
            .field("peer_link", &self.peer_link)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct Pending {
    deadline: SystemTime,
    message: OutRoute,
}

enum Event {
    /// The endpoint handed over a packet, or every sender is gone.
    Received(Option<OutRoute>),
    /// The oldest pending packet is due.
    Due,
}

/// Delivery task of a single endpoint.
///
/// Packets are stamped with their deadline as soon as they are received and delivered in FIFO
/// order. Since the delay of an endpoint is fixed, deadlines are non-decreasing and FIFO order
/// matches deadline order.
struct Courier {
    link: LinkId,
    config: Config,

    peer: Mailbox,
    peer_link: LinkId,

    receiver: mpsc::UnboundedReceiver<OutRoute>,
    queue: VecDeque<Pending>,

    confirmed: Counter,
}

impl Courier {
    async fn run(mut self, context: impl Clock) {
        let mut closed = false;
        loop {
            let next = self.queue.front().map(|pending| pending.deadline);
            let event = match (next, closed) {
                (None, true) => break,
                (None, false) => Event::Received(self.receiver.recv().await),
                (Some(deadline), true) => {
                    context.sleep_until(deadline).await;
                    Event::Due
                }
                (Some(deadline), false) => select! {
                    message = self.receiver.recv() => {
                        Event::Received(message)
                    },
                    _ = context.sleep_until(deadline) => {
                        Event::Due
                    },
                },
            };

            match event {
                Event::Received(Some(message)) => {
                    let deadline = context.current() + self.config.delay;
                    self.queue.push_back(Pending { deadline, message });
                }
                Event::Received(None) => closed = true,
                Event::Due => {
                    if let Some(pending) = self.queue.pop_front() {
                        self.deliver(pending.message);
                    }
                }
            }
        }
        debug!(link = %self.link, "link closed");
    }

    fn deliver(&self, message: OutRoute) {
        if self.config.drops() {
            trace!(
                link = %self.link,
                route = %message.route,
                delay = ?self.config.delay,
                "dropping packet"
            );
            return;
        }

        // Only count packets the peer accepted
        match self
            .peer
            .inject_datagram(self.peer_link, message.route, message.datagram)
        {
            Ok(()) => {
                self.confirmed.inc();
                trace!(link = %self.link, route = %message.route, "delivered packet");
            }
            Err(err) => {
                warn!(link = %self.link, peer = ?self.peer.id(), ?err, "failed to deliver packet");
            }
        }
    }
}
