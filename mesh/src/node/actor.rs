use super::{
    ingress::{Mailbox, Message},
    metrics::{Metrics, Reason},
    Config,
};
use crate::{
    codec::{InRoute, OutRoute},
    link::Endpoint,
    LinkId, NodeId, RouteId, RouteRule,
};
use commonware_macros::select;
use commonware_runtime::{Handle as TaskHandle, Metrics as RuntimeMetrics, Spawner};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, trace, warn};

/// Routing table and attached endpoints of a node.
#[derive(Default)]
struct State {
    rules: BTreeMap<RouteId, RouteRule>,
    links: BTreeMap<LinkId, Endpoint>,
}

impl State {
    fn install(&mut self, rule: RouteRule) {
        self.rules.insert(rule.incoming_route, rule);
    }

    fn remove(&mut self, route: &RouteId) {
        self.rules.remove(route);
    }

    fn attach(&mut self, link: LinkId, endpoint: Endpoint) {
        self.links.insert(link, endpoint);
    }

    fn detach(&mut self, link: &LinkId) {
        self.links.remove(link);
    }

    fn lookup(&self, link: &LinkId) -> Option<&Endpoint> {
        self.links.get(link)
    }

    fn rules(&self) -> Vec<RouteRule> {
        self.rules.values().copied().collect()
    }

    /// Decide where an incoming datagram goes.
    ///
    /// Returns the outgoing endpoint and the relabeled envelope, or the reason the datagram
    /// must be dropped.
    fn route(&self, message: InRoute) -> Result<(Endpoint, OutRoute), Reason> {
        let rule = self.rules.get(&message.route).ok_or(Reason::UnknownRoute)?;
        if rule.incoming_route != message.route {
            return Err(Reason::CorruptRule);
        }
        if rule.incoming_link != message.link {
            return Err(Reason::TransportMismatch);
        }
        let endpoint = self
            .links
            .get(&rule.outgoing_link)
            .ok_or(Reason::UnknownLink)?;
        Ok((
            endpoint.clone(),
            OutRoute {
                route: rule.outgoing_route,
                datagram: message.datagram,
            },
        ))
    }
}

/// A node that relabels and forwards datagrams according to its [RouteRule]s.
///
/// Until [Node::start] is called the node can be configured directly. Afterwards all changes go
/// through its [Mailbox].
pub struct Node<E: Spawner + RuntimeMetrics> {
    context: E,

    id: NodeId,
    state: State,

    data: mpsc::Receiver<InRoute>,
    control: mpsc::Receiver<Message>,

    metrics: Metrics,
}

impl<E: Spawner + RuntimeMetrics> Node<E> {
    /// Create a new node.
    ///
    /// Returns the node and the mailbox used to inject datagrams and control commands. Metrics
    /// are registered under the label of `context`.
    pub fn new(context: E, cfg: Config) -> (Self, Mailbox) {
        let (data_sender, data) = mpsc::channel(cfg.mailbox_size);
        let (control_sender, control) = mpsc::channel(cfg.control_mailbox_size);
        let metrics = Metrics::init(&context);
        let mailbox = Mailbox::new(
            cfg.id,
            cfg.max_datagram_size,
            data_sender,
            control_sender,
            metrics.clone(),
        );
        let node = Self {
            context,
            id: cfg.id,
            state: State::default(),
            data,
            control,
            metrics,
        };
        (node, mailbox)
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Add a rule, replacing any rule with the same incoming route.
    pub fn install(&mut self, rule: RouteRule) {
        self.state.install(rule);
    }

    /// Remove the rule for `route`, if any.
    pub fn remove(&mut self, route: &RouteId) {
        self.state.remove(route);
    }

    /// Attach an endpoint under `link`.
    pub fn attach(&mut self, link: LinkId, endpoint: Endpoint) {
        self.state.attach(link, endpoint);
    }

    pub fn detach(&mut self, link: &LinkId) {
        self.state.detach(link);
    }

    pub fn lookup(&self, link: &LinkId) -> Option<&Endpoint> {
        self.state.lookup(link)
    }

    pub fn rules(&self) -> Vec<RouteRule> {
        self.state.rules()
    }

    /// Start processing both mailboxes.
    ///
    /// Datagrams and control commands are handled by two independent tasks, each consuming its
    /// mailbox in arrival order. Both tasks share the routing table and hold its lock for the
    /// duration of a single message.
    pub fn start(self) -> Handle {
        let (stop, stopped) = watch::channel(false);
        let state = Arc::new(RwLock::new(self.state));
        let forwarder = self.context.with_label("forwarder").spawn({
            let (id, state, stopped) = (self.id, state.clone(), stopped.clone());
            move |_| forward(id, state, self.data, self.metrics, stopped)
        });
        let controller = self
            .context
            .with_label("controller")
            .spawn(move |_| control(self.id, state, self.control, stopped));
        debug!(node = ?self.id, "started node");
        Handle {
            id: self.id,
            stop,
            forwarder,
            controller,
        }
    }

    /// Store `rule` under an arbitrary key, bypassing [Node::install].
    #[cfg(test)]
    pub(crate) fn install_unchecked(&mut self, route: RouteId, rule: RouteRule) {
        self.state.rules.insert(route, rule);
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<InRoute> {
        self.data.try_recv().ok()
    }
}

/// Handle to a running [Node].
///
/// Dropping the handle stops the node, as does [Handle::shutdown].
pub struct Handle {
    id: NodeId,
    stop: watch::Sender<bool>,
    forwarder: TaskHandle<()>,
    controller: TaskHandle<()>,
}

impl Handle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Stop the node and wait for both tasks to exit.
    ///
    /// Messages still queued are discarded and later injections fail with
    /// [Error::MailboxClosed](crate::Error::MailboxClosed).
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.forwarder.await {
            error!(node = ?self.id, ?err, "forwarder failed");
        }
        if let Err(err) = self.controller.await {
            error!(node = ?self.id, ?err, "controller failed");
        }
        debug!(node = ?self.id, "shutdown");
    }
}

async fn forward(
    id: NodeId,
    state: Arc<RwLock<State>>,
    mut data: mpsc::Receiver<InRoute>,
    metrics: Metrics,
    mut stopped: watch::Receiver<bool>,
) {
    loop {
        let message = select! {
            _ = stopped.changed() => {
                break;
            },
            message = data.recv() => {
                let Some(message) = message else {
                    break;
                };
                message
            },
        };

        let (link, route) = (message.link, message.route);
        let decision = state.read().await.route(message);
        match decision {
            Ok((endpoint, out)) => {
                trace!(node = ?id, %link, %route, outgoing = %endpoint.id(), relabeled = %out.route, "forwarding");
                endpoint.send(out);
                metrics.forwarded.inc();
            }
            Err(reason) => {
                match reason {
                    Reason::UnknownRoute => {
                        debug!(node = ?id, %link, %route, "dropping datagram: unknown route")
                    }
                    Reason::TransportMismatch => {
                        warn!(node = ?id, %link, %route, "dropping datagram: arrived on unexpected link")
                    }
                    Reason::UnknownLink => {
                        warn!(node = ?id, %link, %route, "dropping datagram: outgoing link not attached")
                    }
                    Reason::CorruptRule => {
                        error!(node = ?id, %link, %route, "dropping datagram: rule stored under wrong route")
                    }
                }
                metrics.inc_dropped(reason);
            }
        }
    }
    data.close();
}

async fn control(
    id: NodeId,
    state: Arc<RwLock<State>>,
    mut control: mpsc::Receiver<Message>,
    mut stopped: watch::Receiver<bool>,
) {
    loop {
        let message = select! {
            _ = stopped.changed() => {
                break;
            },
            message = control.recv() => {
                let Some(message) = message else {
                    break;
                };
                message
            },
        };

        match message {
            Message::Install { rule } => {
                trace!(node = ?id, route = %rule.incoming_route, "control: install");
                state.write().await.install(rule);
            }
            Message::Remove { route } => {
                trace!(node = ?id, %route, "control: remove");
                state.write().await.remove(&route);
            }
            Message::Attach { link, endpoint } => {
                trace!(node = ?id, %link, "control: attach");
                state.write().await.attach(link, endpoint);
            }
            Message::Detach { link } => {
                trace!(node = ?id, %link, "control: detach");
                state.write().await.detach(&link);
            }
            Message::Lookup { link, responder } => {
                let endpoint = state.read().await.lookup(&link).cloned();
                let _ = responder.send(endpoint);
            }
            Message::Rules { responder } => {
                let rules = state.read().await.rules();
                let _ = responder.send(rules);
            }
        }
    }
    control.close();
}
