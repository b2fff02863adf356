//! Relabel and forward datagrams between links.
//!
//! # Overview
//!
//! A [Node] holds a table of [RouteRule](crate::RouteRule)s keyed by incoming route and a set of
//! attached [Endpoint](crate::link::Endpoint)s keyed by [LinkId](crate::LinkId). When a datagram
//! arrives on link `L` labeled with route `R`, the node:
//!
//! 1. Looks up the rule for `R`. Without one, the datagram is dropped.
//! 2. Checks that the rule expects datagrams on `L`. A datagram arriving on any other link is
//!    dropped and never forwarded.
//! 3. Relabels the datagram with the rule's outgoing route.
//! 4. Sends it over the rule's outgoing endpoint. If that endpoint is not attached, the datagram
//!    is dropped.
//!
//! Drops are logged and counted by [Reason]; they never stop the node.
//!
//! # Concurrency
//!
//! A started node runs two tasks: one draining the data mailbox and one draining the control
//! mailbox. Each mailbox is bounded and consumed in arrival order. Control commands may
//! interleave with forwarding, but every message sees the table in a consistent state.
//!
//! Rules must be installed before the datagrams that use them are injected. Datagrams are never
//! buffered waiting for a rule.

mod actor;
pub use actor::{Handle, Node};
mod config;
pub use config::{Config, DEFAULT_MAILBOX_SIZE, DEFAULT_MAX_DATAGRAM_SIZE};
mod ingress;
pub use ingress::{Mailbox, Message};
pub(crate) use ingress::Reservation;
mod metrics;
pub use metrics::Reason;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::{InRoute, OutRoute},
        link::{self, Endpoint, Side},
        Error, LinkId, NodeId, RouteId, RouteRule,
    };
    use bytes::Bytes;
    use commonware_codec::{Encode, Error as CodecError};
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Clock, Metrics, Runner};
    use std::time::Duration;

    const DELAY: Duration = Duration::from_millis(100);
    const AFTER_DELIVERY: Duration = Duration::from_millis(250);

    const AB: LinkId = LinkId::new(1);
    const BA: LinkId = LinkId::new(2);

    const IN: RouteId = RouteId::new(10);
    const OUT: RouteId = RouteId::new(11);

    struct Setup {
        a: Node<deterministic::Context>,
        a_mailbox: Mailbox,
        b: Node<deterministic::Context>,
        ab: Endpoint,
        ba: Endpoint,
    }

    /// Two unstarted nodes joined by a link. `a` owns [AB], `b` owns [BA].
    fn setup(context: &deterministic::Context) -> Setup {
        let (mut a, a_mailbox) =
            Node::new(context.with_label("a"), Config::new(NodeId::from_seed(1)));
        let (mut b, b_mailbox) =
            Node::new(context.with_label("b"), Config::new(NodeId::from_seed(2)));
        let link_context = context.with_label("link");
        let metrics = link::Metrics::init(&link_context);
        let config = link::Config {
            delay: DELAY,
            ..Default::default()
        };
        let (ab, ba) = link::pair(
            &link_context,
            &metrics,
            Side {
                node: *a.id(),
                link: AB,
                mailbox: a_mailbox.clone(),
                config,
            },
            Side {
                node: *b.id(),
                link: BA,
                mailbox: b_mailbox,
                config,
            },
        );
        a.attach(AB, ab.clone());
        b.attach(BA, ba.clone());
        Setup {
            a,
            a_mailbox,
            b,
            ab,
            ba,
        }
    }

    /// Datagrams from `b` on route [IN] bounce back to `b` on route [OUT].
    fn bounce() -> RouteRule {
        RouteRule {
            incoming_link: AB,
            outgoing_link: AB,
            incoming_route: IN,
            outgoing_route: OUT,
        }
    }

    fn payload() -> Bytes {
        Bytes::from_static(b"test")
    }

    #[test_traced]
    fn test_relabel_single_hop() {
        let executor = deterministic::Runner::timed(Duration::from_secs(5));
        executor.start(|context| async move {
            let Setup {
                mut a,
                a_mailbox,
                mut b,
                ab,
                ba,
            } = setup(&context);
            a.install(bounce());
            let _handle = a.start();

            a_mailbox.inject_datagram(AB, IN, payload()).unwrap();
            context.sleep(DELAY / 2).await;
            assert_eq!(ab.packets_sent(), 1);
            assert_eq!(ab.packets_confirmed(), 0);
            assert!(b.try_recv().is_none());

            context.sleep(AFTER_DELIVERY).await;
            assert_eq!(ab.packets_confirmed(), 1);
            assert_eq!(ba.packets_sent(), 0);
            assert_eq!(a_mailbox.forwarded(), 1);
            assert_eq!(
                b.try_recv(),
                Some(InRoute {
                    link: BA,
                    route: OUT,
                    datagram: payload(),
                })
            );
            assert!(b.try_recv().is_none());
        });
    }

    #[test_traced]
    fn test_transport_mismatch_not_forwarded() {
        let executor = deterministic::Runner::timed(Duration::from_secs(5));
        executor.start(|context| async move {
            let Setup {
                mut a,
                a_mailbox,
                mut b,
                ab,
                ..
            } = setup(&context);
            a.install(bounce());
            let _handle = a.start();

            a_mailbox
                .inject_datagram(LinkId::new(99), IN, payload())
                .unwrap();
            context.sleep(AFTER_DELIVERY).await;
            assert_eq!(ab.packets_sent(), 0);
            assert_eq!(a_mailbox.forwarded(), 0);
            assert_eq!(a_mailbox.dropped(Reason::TransportMismatch), 1);
            assert!(b.try_recv().is_none());
        });
    }

    #[test_traced]
    fn test_unknown_route_does_not_stop_node() {
        let executor = deterministic::Runner::timed(Duration::from_secs(5));
        executor.start(|context| async move {
            let Setup {
                mut a,
                a_mailbox,
                b: _b,
                ab,
                ..
            } = setup(&context);
            a.install(bounce());
            let _handle = a.start();

            a_mailbox
                .inject_datagram(AB, RouteId::new(12345), payload())
                .unwrap();
            a_mailbox.inject_datagram(AB, IN, payload()).unwrap();
            context.sleep(AFTER_DELIVERY).await;
            assert_eq!(a_mailbox.dropped(Reason::UnknownRoute), 1);
            assert_eq!(a_mailbox.forwarded(), 1);
            assert_eq!(ab.packets_sent(), 1);
            assert_eq!(ab.packets_confirmed(), 1);
        });
    }

    #[test_traced]
    fn test_unknown_outgoing_link() {
        let executor = deterministic::Runner::timed(Duration::from_secs(5));
        executor.start(|context| async move {
            let Setup {
                mut a,
                a_mailbox,
                ab,
                ..
            } = setup(&context);
            a.install(RouteRule {
                outgoing_link: LinkId::new(77),
                ..bounce()
            });
            let _handle = a.start();

            a_mailbox.inject_datagram(AB, IN, payload()).unwrap();
            context.sleep(AFTER_DELIVERY).await;
            assert_eq!(a_mailbox.dropped(Reason::UnknownLink), 1);
            assert_eq!(ab.packets_sent(), 0);
        });
    }

    #[test_traced]
    fn test_corrupt_rule_contained() {
        let executor = deterministic::Runner::timed(Duration::from_secs(5));
        executor.start(|context| async move {
            let Setup {
                mut a,
                a_mailbox,
                b: _b,
                ab,
                ..
            } = setup(&context);
            let stray = RouteId::new(500);
            a.install_unchecked(stray, bounce());
            a.install(bounce());
            let _handle = a.start();

            a_mailbox.inject_datagram(AB, stray, payload()).unwrap();
            a_mailbox.inject_datagram(AB, IN, payload()).unwrap();
            context.sleep(AFTER_DELIVERY).await;
            assert_eq!(a_mailbox.dropped(Reason::CorruptRule), 1);
            assert_eq!(a_mailbox.forwarded(), 1);
            assert_eq!(ab.packets_sent(), 1);
        });
    }

    #[test_traced]
    fn test_control_after_start() {
        let executor = deterministic::Runner::timed(Duration::from_secs(5));
        executor.start(|context| async move {
            let Setup {
                a,
                a_mailbox,
                b: _b,
                ab,
                ..
            } = setup(&context);
            let _handle = a.start();

            a_mailbox.install(bounce()).unwrap();
            assert_eq!(a_mailbox.rules().await.unwrap(), vec![bounce()]);
            a_mailbox.inject_datagram(AB, IN, payload()).unwrap();
            context.sleep(AFTER_DELIVERY).await;
            assert_eq!(ab.packets_sent(), 1);

            // Overwrite keeps a single rule per incoming route
            let rewritten = RouteRule {
                outgoing_route: RouteId::new(12),
                ..bounce()
            };
            a_mailbox.install(rewritten).unwrap();
            assert_eq!(a_mailbox.rules().await.unwrap(), vec![rewritten]);

            a_mailbox.remove(IN).unwrap();
            a_mailbox.remove(IN).unwrap();
            assert!(a_mailbox.rules().await.unwrap().is_empty());
            a_mailbox.inject_datagram(AB, IN, payload()).unwrap();
            context.sleep(AFTER_DELIVERY).await;
            assert_eq!(ab.packets_sent(), 1);
            assert_eq!(a_mailbox.dropped(Reason::UnknownRoute), 1);
        });
    }

    #[test_traced]
    fn test_attach_detach_lookup() {
        let executor = deterministic::Runner::timed(Duration::from_secs(5));
        executor.start(|context| async move {
            let Setup {
                mut a,
                a_mailbox,
                b: _b,
                ab,
                ..
            } = setup(&context);
            assert_eq!(a.lookup(&AB).map(|endpoint| endpoint.id()), Some(AB));
            a.install(bounce());
            a.detach(&AB);
            assert!(a.lookup(&AB).is_none());
            let _handle = a.start();

            a_mailbox.inject_datagram(AB, IN, payload()).unwrap();
            context.sleep(AFTER_DELIVERY).await;
            assert_eq!(a_mailbox.dropped(Reason::UnknownLink), 1);

            a_mailbox.attach(AB, ab.clone()).unwrap();
            let found = a_mailbox.lookup(AB).await.unwrap().unwrap();
            assert_eq!(found.id(), AB);
            assert_eq!(found.peer_link(), BA);
            a_mailbox.inject_datagram(AB, IN, payload()).unwrap();
            context.sleep(AFTER_DELIVERY).await;
            assert_eq!(ab.packets_sent(), 1);

            a_mailbox.detach(AB).unwrap();
            assert!(a_mailbox.lookup(AB).await.unwrap().is_none());
        });
    }

    #[test_traced]
    fn test_mailbox_overflow() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let cfg = Config {
                mailbox_size: 2,
                control_mailbox_size: 1,
                ..Config::new(NodeId::from_seed(1))
            };
            let (_node, mailbox) = Node::new(context.with_label("node"), cfg);

            mailbox.inject_datagram(AB, IN, payload()).unwrap();
            mailbox.inject_datagram(AB, IN, payload()).unwrap();
            assert!(matches!(
                mailbox.inject_datagram(AB, IN, payload()),
                Err(Error::MailboxFull)
            ));

            mailbox.install(bounce()).unwrap();
            assert!(matches!(mailbox.remove(IN), Err(Error::MailboxFull)));
        });
    }

    #[test_traced]
    fn test_shutdown_closes_mailbox() {
        let executor = deterministic::Runner::timed(Duration::from_secs(5));
        executor.start(|context| async move {
            let Setup { a, a_mailbox, .. } = setup(&context);
            let handle = a.start();
            handle.shutdown().await;

            assert!(matches!(
                a_mailbox.inject_datagram(AB, IN, payload()),
                Err(Error::MailboxClosed)
            ));
            assert!(matches!(
                a_mailbox.install(bounce()),
                Err(Error::MailboxClosed)
            ));
            assert!(matches!(a_mailbox.rules().await, Err(Error::MailboxClosed)));
        });
    }

    #[test_traced]
    fn test_inject_encoded() {
        let executor = deterministic::Runner::timed(Duration::from_secs(5));
        executor.start(|context| async move {
            let Setup {
                mut a,
                a_mailbox,
                b: _b,
                ab,
                ..
            } = setup(&context);
            a.install(bounce());
            let _handle = a.start();

            let encoded = InRoute {
                link: AB,
                route: IN,
                datagram: payload(),
            }
            .encode()
            .freeze();
            a_mailbox.inject_encoded(encoded).unwrap();

            let wrong_kind = OutRoute {
                route: IN,
                datagram: payload(),
            }
            .encode()
            .freeze();
            assert!(matches!(
                a_mailbox.inject_encoded(wrong_kind),
                Err(Error::Codec(CodecError::Invalid(_, _)))
            ));
            assert!(matches!(
                a_mailbox.inject_encoded(Bytes::from_static(&[7, 7])),
                Err(Error::Codec(CodecError::Invalid(_, _)))
            ));

            let oversized = InRoute {
                link: AB,
                route: IN,
                datagram: Bytes::from(vec![0; DEFAULT_MAX_DATAGRAM_SIZE + 1]),
            }
            .encode()
            .freeze();
            assert!(matches!(
                a_mailbox.inject_encoded(oversized),
                Err(Error::Codec(CodecError::InvalidLength(_)))
            ));

            context.sleep(AFTER_DELIVERY).await;
            assert_eq!(ab.packets_sent(), 1);
            assert_eq!(a_mailbox.forwarded(), 1);
        });
    }
}
