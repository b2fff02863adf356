use super::metrics::{Metrics, Reason};
use crate::{
    codec::{self, InRoute, Kind},
    link::Endpoint,
    Error, LinkId, NodeId, RouteId, RouteRule,
};
use bytes::Bytes;
use commonware_codec::{Decode, Error as CodecError, RangeCfg};
use futures::channel::oneshot;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Control commands that can be sent to a [Node](super::Node).
#[derive(Debug)]
pub enum Message {
    /// Add a rule, replacing any rule with the same incoming route.
    Install { rule: RouteRule },

    /// Remove the rule for a route, if any.
    Remove { route: RouteId },

    /// Attach an endpoint the node can forward datagrams on.
    Attach { link: LinkId, endpoint: Endpoint },

    /// Detach an endpoint, if attached.
    Detach { link: LinkId },

    /// Fetch an attached endpoint.
    Lookup {
        link: LinkId,
        responder: oneshot::Sender<Option<Endpoint>>,
    },

    /// Fetch all installed rules, ordered by incoming route.
    Rules {
        responder: oneshot::Sender<Vec<RouteRule>>,
    },
}

/// Ingress mailbox for a [Node](super::Node).
///
/// Injection never blocks: if the corresponding mailbox is full the call fails with
/// [Error::MailboxFull] and the caller decides what to do.
#[derive(Clone)]
pub struct Mailbox {
    id: NodeId,
    datagram_cfg: RangeCfg,
    data: mpsc::Sender<InRoute>,
    control: mpsc::Sender<Message>,
    metrics: Metrics,
}

impl Mailbox {
    pub(super) fn new(
        id: NodeId,
        max_datagram_size: usize,
        data: mpsc::Sender<InRoute>,
        control: mpsc::Sender<Message>,
        metrics: Metrics,
    ) -> Self {
        Self {
            id,
            datagram_cfg: (0..=max_datagram_size).into(),
            data,
            control,
            metrics,
        }
    }

    /// Identity of the node.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Queue a datagram that arrived on `link` labeled `route`.
    pub fn inject_datagram(
        &self,
        link: LinkId,
        route: RouteId,
        datagram: Bytes,
    ) -> Result<(), Error> {
        self.data
            .try_send(InRoute {
                link,
                route,
                datagram,
            })
            .map_err(map_try_send)
    }

    /// Queue an encoded [InRoute] envelope.
    ///
    /// The kind tag is checked before decoding; any other kind is rejected.
    pub fn inject_encoded(&self, buf: Bytes) -> Result<(), Error> {
        if codec::kind(&buf)? != Kind::InRoute {
            return Err(CodecError::Invalid("mesh::node::Mailbox", "expected InRoute").into());
        }
        let message = InRoute::decode_cfg(buf, &self.datagram_cfg)?;
        self.data.try_send(message).map_err(map_try_send)
    }

    /// Reserve room for one control command without sending it.
    ///
    /// Lets a caller confirm that several mailboxes can accept a command before changing any of
    /// them.
    pub(crate) fn reserve(&self) -> Result<Reservation<'_>, Error> {
        self.control
            .try_reserve()
            .map(Reservation)
            .map_err(map_try_send)
    }

    /// Queue a control command.
    pub fn inject_control(&self, message: Message) -> Result<(), Error> {
        self.control.try_send(message).map_err(map_try_send)
    }

    pub fn install(&self, rule: RouteRule) -> Result<(), Error> {
        self.inject_control(Message::Install { rule })
    }

    pub fn remove(&self, route: RouteId) -> Result<(), Error> {
        self.inject_control(Message::Remove { route })
    }

    pub fn attach(&self, link: LinkId, endpoint: Endpoint) -> Result<(), Error> {
        self.inject_control(Message::Attach { link, endpoint })
    }

    pub fn detach(&self, link: LinkId) -> Result<(), Error> {
        self.inject_control(Message::Detach { link })
    }

    /// Fetch the endpoint attached under `link`.
    pub async fn lookup(&self, link: LinkId) -> Result<Option<Endpoint>, Error> {
        let (responder, receiver) = oneshot::channel();
        self.inject_control(Message::Lookup { link, responder })?;
        receiver.await.map_err(|_| Error::MailboxClosed)
    }

    /// Fetch the installed rules.
    ///
    /// Control commands are applied in order, so the response reflects every command injected
    /// before this call.
    pub async fn rules(&self) -> Result<Vec<RouteRule>, Error> {
        let (responder, receiver) = oneshot::channel();
        self.inject_control(Message::Rules { responder })?;
        receiver.await.map_err(|_| Error::MailboxClosed)
    }

    /// Number of datagrams the node has forwarded.
    pub fn forwarded(&self) -> u64 {
        self.metrics.forwarded.get()
    }

    /// Number of datagrams the node has dropped for `reason`.
    pub fn dropped(&self, reason: Reason) -> u64 {
        self.metrics.dropped(reason)
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A slot in a control mailbox, obtained with [Mailbox::reserve].
pub(crate) struct Reservation<'a>(mpsc::Permit<'a, Message>);

impl Reservation<'_> {
    pub(crate) fn send(self, message: Message) {
        self.0.send(message);
    }
}

fn map_try_send<T>(err: TrySendError<T>) -> Error {
    match err {
        TrySendError::Full(_) => Error::MailboxFull,
        TrySendError::Closed(_) => Error::MailboxClosed,
    }
}
