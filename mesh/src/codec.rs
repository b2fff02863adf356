//! Typed envelopes exchanged between nodes and links.
//!
//! Every frame starts with a one-byte [Kind] tag so a receiver can dispatch before decoding the
//! body. Identifiers are fixed-width integers and datagrams are length-prefixed, with the length
//! bounded by the [RangeCfg] passed when reading.
//!
//! Within a single process envelopes are passed around as values; encoding is only needed when a
//! datagram is injected as raw bytes (see [crate::node::Mailbox::inject_encoded]).

use crate::{LinkId, RouteId};
use bytes::{Buf, BufMut, Bytes};
use commonware_codec::{EncodeSize, Error, RangeCfg, Read, ReadExt, Write};

/// Tag identifying the type of an encoded envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    /// A datagram entering a node from one of its links.
    InRoute = 0,
    /// A datagram leaving a node on one of its links.
    OutRoute = 1,
}

impl Kind {
    /// Read the tag and fail unless it is `self`.
    fn expect(self, buf: &mut impl Buf, context: &'static str) -> Result<(), Error> {
        if Kind::read(buf)? != self {
            return Err(Error::Invalid(context, "unexpected kind"));
        }
        Ok(())
    }
}

impl Write for Kind {
    fn write(&self, buf: &mut impl BufMut) {
        (*self as u8).write(buf);
    }
}

impl Read for Kind {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        match u8::read(buf)? {
            0 => Ok(Self::InRoute),
            1 => Ok(Self::OutRoute),
            _ => Err(Error::Invalid("mesh::codec::Kind", "unknown kind")),
        }
    }
}

impl EncodeSize for Kind {
    fn encode_size(&self) -> usize {
        (*self as u8).encode_size()
    }
}

/// Read the [Kind] of an encoded envelope without decoding the body.
pub fn kind(mut buf: &[u8]) -> Result<Kind, Error> {
    Kind::read(&mut buf)
}

/// A datagram entering a node, tagged with the link it arrived on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InRoute {
    pub link: LinkId,
    pub route: RouteId,
    pub datagram: Bytes,
}

impl Write for InRoute {
    fn write(&self, buf: &mut impl BufMut) {
        Kind::InRoute.write(buf);
        self.link.get().write(buf);
        self.route.get().write(buf);
        self.datagram.write(buf);
    }
}

impl Read for InRoute {
    /// Allowed datagram lengths.
    type Cfg = RangeCfg;

    fn read_cfg(buf: &mut impl Buf, cfg: &RangeCfg) -> Result<Self, Error> {
        Kind::InRoute.expect(buf, "mesh::codec::InRoute")?;
        let link = LinkId::new(u64::read(buf)?);
        let route = RouteId::new(u64::read(buf)?);
        let datagram = Bytes::read_cfg(buf, cfg)?;
        Ok(Self {
            link,
            route,
            datagram,
        })
    }
}

impl EncodeSize for InRoute {
    fn encode_size(&self) -> usize {
        Kind::InRoute.encode_size()
            + self.link.get().encode_size()
            + self.route.get().encode_size()
            + self.datagram.encode_size()
    }
}

/// A datagram leaving a node. The link is implied by the endpoint carrying it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutRoute {
    pub route: RouteId,
    pub datagram: Bytes,
}

impl Write for OutRoute {
    fn write(&self, buf: &mut impl BufMut) {
        Kind::OutRoute.write(buf);
        self.route.get().write(buf);
        self.datagram.write(buf);
    }
}

impl Read for OutRoute {
    /// Allowed datagram lengths.
    type Cfg = RangeCfg;

    fn read_cfg(buf: &mut impl Buf, cfg: &RangeCfg) -> Result<Self, Error> {
        Kind::OutRoute.expect(buf, "mesh::codec::OutRoute")?;
        let route = RouteId::new(u64::read(buf)?);
        let datagram = Bytes::read_cfg(buf, cfg)?;
        Ok(Self { route, datagram })
    }
}

impl EncodeSize for OutRoute {
    fn encode_size(&self) -> usize {
        Kind::OutRoute.encode_size() + self.route.get().encode_size() + self.datagram.encode_size()
    }
}
