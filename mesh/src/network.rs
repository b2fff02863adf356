//! Create, connect, and run a set of nodes.
//!
//! A [Network] owns every node and link of a simulation. Nodes can be connected and configured
//! before or after [Network::start]: before, changes are applied directly; after, they are sent
//! to the node's control mailbox and applied asynchronously (use
//! [Mailbox::rules](crate::node::Mailbox::rules) to wait for them).

use crate::{
    link::{self, Endpoint, Side},
    node::{self, Handle, Mailbox, Message, Node, Reservation},
    Error, LinkId, NodeId, RouteId, RouteRule,
};
use commonware_runtime::{Clock, Metrics, Spawner};
use futures::future::join_all;
use rand::{rngs::StdRng, SeedableRng};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Configuration for a [Network].
#[derive(Clone, Debug)]
pub struct Config {
    /// Seed used to generate node identities.
    pub seed: u64,

    /// Capacity of each node's data mailbox.
    pub mailbox_size: usize,

    /// Capacity of each node's control mailbox.
    pub control_mailbox_size: usize,

    /// Largest datagram a node accepts in encoded form.
    pub max_datagram_size: usize,

    /// Behavior of both directions of links created with [Network::connect].
    pub link: link::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 0,
            mailbox_size: node::DEFAULT_MAILBOX_SIZE,
            control_mailbox_size: node::DEFAULT_MAILBOX_SIZE,
            max_datagram_size: node::DEFAULT_MAX_DATAGRAM_SIZE,
            link: link::Config::default(),
        }
    }
}

struct Entry<E: Spawner + Metrics> {
    mailbox: Mailbox,

    /// Set until the node is started.
    node: Option<Node<E>>,

    /// Set once the node is started.
    handle: Option<Handle>,
}

/// Registry of all nodes and links in a simulation.
pub struct Network<E: Clock + Spawner + Metrics> {
    context: E,
    cfg: Config,
    rng: StdRng,

    link_metrics: link::Metrics,

    nodes: BTreeMap<NodeId, Entry<E>>,
    order: Vec<NodeId>,
    endpoints: BTreeMap<LinkId, Endpoint>,
    links: Vec<(LinkId, LinkId)>,
    next_link: u64,
}

impl<E: Clock + Spawner + Metrics> Network<E> {
    /// Create an empty network.
    ///
    /// Link metrics are registered under `link` and node metrics under `node_<index>`, both
    /// relative to the label of `context`.
    pub fn new(context: E, cfg: Config) -> Self {
        let link_metrics = link::Metrics::init(&context.with_label("link"));
        Self {
            context,
            rng: StdRng::seed_from_u64(cfg.seed),
            cfg,
            link_metrics,
            nodes: BTreeMap::new(),
            order: Vec::new(),
            endpoints: BTreeMap::new(),
            links: Vec::new(),
            next_link: 0,
        }
    }

    /// Create a node with a fresh identity. The node is not linked to any other node.
    pub fn add_node(&mut self) -> NodeId {
        let mut id = NodeId::random(&mut self.rng);
        while self.nodes.contains_key(&id) {
            id = NodeId::random(&mut self.rng);
        }
        let (node, mailbox) = Node::new(
            self.context.with_label(&format!("node_{}", self.order.len())),
            node::Config {
                id,
                mailbox_size: self.cfg.mailbox_size,
                control_mailbox_size: self.cfg.control_mailbox_size,
                max_datagram_size: self.cfg.max_datagram_size,
            },
        );
        self.nodes.insert(
            id,
            Entry {
                mailbox,
                node: Some(node),
                handle: None,
            },
        );
        self.order.push(id);
        debug!(node = ?id, "created node");
        id
    }

    /// Create `count` nodes.
    pub fn add_nodes(&mut self, count: usize) -> Vec<NodeId> {
        (0..count).map(|_| self.add_node()).collect()
    }

    /// Ids of all nodes, in creation order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    /// Mailbox of a node.
    pub fn node(&self, id: &NodeId) -> Option<&Mailbox> {
        self.nodes.get(id).map(|entry| &entry.mailbox)
    }

    /// Endpoint with the given id.
    pub fn endpoint(&self, link: &LinkId) -> Option<&Endpoint> {
        self.endpoints.get(link)
    }

    /// All links, as `(a -> b, b -> a)` endpoint pairs in creation order.
    pub fn links(&self) -> &[(LinkId, LinkId)] {
        &self.links
    }

    /// Endpoint owned by `from` that sends to `to`, if the two are connected.
    pub fn transport_between(&self, from: &NodeId, to: &NodeId) -> Option<&Endpoint> {
        self.endpoints
            .values()
            .find(|endpoint| endpoint.owner() == from && endpoint.peer() == to)
    }

    /// Connect two nodes using the default link configuration in both directions.
    ///
    /// Returns the id of the endpoint owned by `a` and the id of the endpoint owned by `b`.
    pub fn connect(&mut self, a: NodeId, b: NodeId) -> Result<(LinkId, LinkId), Error> {
        let cfg = self.cfg.link;
        self.connect_with(a, b, cfg, cfg)
    }

    /// Connect two nodes, configuring each direction separately.
    ///
    /// `ab` applies to packets sent by `a`, `ba` to packets sent by `b`. Nodes may be connected
    /// more than once; each call creates a new link.
    ///
    /// Either both nodes receive their endpoint or neither does: if a running node cannot accept
    /// the attach command, the call fails before anything changes.
    pub fn connect_with(
        &mut self,
        a: NodeId,
        b: NodeId,
        ab: link::Config,
        ba: link::Config,
    ) -> Result<(LinkId, LinkId), Error> {
        if a == b {
            return Err(Error::LinkingSelf);
        }
        let a_mailbox = self.mailbox(&a)?.clone();
        let b_mailbox = self.mailbox(&b)?.clone();

        // Running nodes are attached through their control mailbox
        let a_slot = self.reserve(&a, &a_mailbox)?;
        let b_slot = self.reserve(&b, &b_mailbox)?;

        let a_link = LinkId::new(self.next_link);
        let b_link = LinkId::new(self.next_link + 1);
        self.next_link += 2;

        let (a_endpoint, b_endpoint) = link::pair(
            &self.context,
            &self.link_metrics,
            Side {
                node: a,
                link: a_link,
                mailbox: a_mailbox.clone(),
                config: ab,
            },
            Side {
                node: b,
                link: b_link,
                mailbox: b_mailbox.clone(),
                config: ba,
            },
        );
        self.attach(&a, a_slot, a_link, a_endpoint.clone())?;
        self.attach(&b, b_slot, b_link, b_endpoint.clone())?;
        self.endpoints.insert(a_link, a_endpoint);
        self.endpoints.insert(b_link, b_endpoint);
        self.links.push((a_link, b_link));
        debug!(a = ?a, b = ?b, %a_link, %b_link, "connected nodes");
        Ok((a_link, b_link))
    }

    /// Connect every pair of nodes once.
    pub fn connect_all(&mut self) -> Result<Vec<(LinkId, LinkId)>, Error> {
        let ids = self.order.clone();
        let mut created = Vec::new();
        for (i, a) in ids.iter().enumerate() {
            for b in ids.iter().skip(i + 1) {
                created.push(self.connect(*a, *b)?);
            }
        }
        Ok(created)
    }

    /// Connect two nodes and install a forward rule on `a`.
    ///
    /// The rule accepts datagrams tagged with `a`'s endpoint and a fresh random route, and sends
    /// them to `b` over that same endpoint under another fresh route. Injecting a datagram into
    /// `a` with the rule's incoming link and route therefore crosses the link exactly once.
    pub fn connect_with_route(&mut self, a: NodeId, b: NodeId) -> Result<RouteRule, Error> {
        let (a_link, _) = self.connect(a, b)?;
        let rule = RouteRule {
            incoming_link: a_link,
            outgoing_link: a_link,
            incoming_route: RouteId::random(&mut self.rng),
            outgoing_route: RouteId::random(&mut self.rng),
        };
        self.install(&a, rule)?;
        Ok(rule)
    }

    /// Connect every pair of nodes once, installing a forward rule on the first node of each
    /// pair (see [Network::connect_with_route]).
    ///
    /// Returns the rules in the order the pairs were connected.
    pub fn connect_all_with_routes(&mut self) -> Result<Vec<RouteRule>, Error> {
        let ids = self.order.clone();
        let mut rules = Vec::new();
        for (i, a) in ids.iter().enumerate() {
            for b in ids.iter().skip(i + 1) {
                rules.push(self.connect_with_route(*a, *b)?);
            }
        }
        Ok(rules)
    }

    /// Remove the link containing the endpoint `link`, detaching both of its endpoints.
    ///
    /// Packets already in flight are still delivered.
    pub fn disconnect(&mut self, link: LinkId) -> Result<(), Error> {
        let index = self
            .links
            .iter()
            .position(|(a, b)| *a == link || *b == link)
            .ok_or(Error::UnknownLink(link))?;
        let (a, b) = self.links.remove(index);
        for id in [a, b] {
            let Some(endpoint) = self.endpoints.remove(&id) else {
                continue;
            };
            let owner = *endpoint.owner();
            let entry = self.entry(&owner)?;
            match entry.node.as_mut() {
                Some(node) => node.detach(&id),
                None => entry.mailbox.detach(id)?,
            }
        }
        debug!(%a, %b, "disconnected nodes");
        Ok(())
    }

    /// Install a rule on a node.
    pub fn install(&mut self, id: &NodeId, rule: RouteRule) -> Result<(), Error> {
        let entry = self.entry(id)?;
        match entry.node.as_mut() {
            Some(node) => {
                node.install(rule);
                Ok(())
            }
            None => entry.mailbox.install(rule),
        }
    }

    /// Remove a rule from a node.
    pub fn remove(&mut self, id: &NodeId, route: RouteId) -> Result<(), Error> {
        let entry = self.entry(id)?;
        match entry.node.as_mut() {
            Some(node) => {
                node.remove(&route);
                Ok(())
            }
            None => entry.mailbox.remove(route),
        }
    }

    /// Start every node that is not already running.
    pub fn start(&mut self) {
        let mut started = 0;
        for entry in self.nodes.values_mut() {
            if let Some(node) = entry.node.take() {
                entry.handle = Some(node.start());
                started += 1;
            }
        }
        info!(started, total = self.nodes.len(), "started nodes");
    }

    /// Encode all metrics registered with the runtime in the OpenMetrics text format.
    pub fn encode(&self) -> String {
        self.context.encode()
    }

    /// Stop every running node and wait for it to exit.
    pub async fn shutdown(self) {
        let handles = self
            .nodes
            .into_values()
            .filter_map(|entry| entry.handle)
            .map(|handle| handle.shutdown());
        join_all(handles).await;
        info!("network shutdown");
    }

    fn entry(&mut self, id: &NodeId) -> Result<&mut Entry<E>, Error> {
        self.nodes.get_mut(id).ok_or(Error::UnknownNode(*id))
    }

    fn mailbox(&self, id: &NodeId) -> Result<&Mailbox, Error> {
        self.node(id).ok_or(Error::UnknownNode(*id))
    }

    /// Reserve a control slot on `id` if it is running.
    fn reserve<'a>(
        &self,
        id: &NodeId,
        mailbox: &'a Mailbox,
    ) -> Result<Option<Reservation<'a>>, Error> {
        let entry = self.nodes.get(id).ok_or(Error::UnknownNode(*id))?;
        if entry.node.is_some() {
            return Ok(None);
        }
        mailbox.reserve().map(Some)
    }

    fn attach(
        &mut self,
        id: &NodeId,
        slot: Option<Reservation<'_>>,
        link: LinkId,
        endpoint: Endpoint,
    ) -> Result<(), Error> {
        let entry = self.entry(id)?;
        match (entry.node.as_mut(), slot) {
            (Some(node), _) => node.attach(link, endpoint),
            (None, Some(slot)) => slot.send(Message::Attach { link, endpoint }),
            (None, None) => entry.mailbox.attach(link, endpoint)?,
        }
        Ok(())
    }
}
