//! Identifiers and route rules shared by nodes and links.

use rand::{CryptoRng, Rng};
use std::fmt;

/// Length of a [NodeId] in bytes.
pub const NODE_ID_LEN: usize = 32;

/// Identity of a node in the mesh.
///
/// Modeled after an ed25519 public key but generated from random bytes (keys are never
/// used to sign anything in the simulation).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    /// Generate a fresh identity.
    pub fn random<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; NODE_ID_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Deterministic identity for tests.
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; NODE_ID_LEN];
        bytes[NODE_ID_LEN - 8..].copy_from_slice(&seed.to_be_bytes());
        Self(bytes)
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; NODE_ID_LEN]> for NodeId {
    fn from(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full keys make logs unreadable
        for byte in self.0[..4].iter() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..")
    }
}

/// Identifier of one directional endpoint of a link.
///
/// A link between `A` and `B` is a pair of [LinkId]s: one owned by `A` (used by `A` to send
/// toward `B` and to tag datagrams `A` receives from `B`) and one owned by `B`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(u64);

impl LinkId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for LinkId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Label of a route segment on a single hop.
///
/// Route ids are unique across the whole mesh. A multi-hop path is a chain of
/// [RouteRule]s, each rewriting one [RouteId] into the next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteId(u64);

impl RouteId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Generate a random route id.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self(rng.gen())
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RouteId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Rewrite rule installed on a node.
///
/// A datagram arriving on `incoming_link` labeled `incoming_route` leaves on
/// `outgoing_link` labeled `outgoing_route`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RouteRule {
    pub incoming_link: LinkId,
    pub outgoing_link: LinkId,
    pub incoming_route: RouteId,
    pub outgoing_route: RouteId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_node_id_display() {
        let id = NodeId::from_seed(0xff);
        let s = id.to_string();
        assert_eq!(s.len(), NODE_ID_LEN * 2);
        assert!(s.ends_with("ff"));
        assert_eq!(format!("{id:?}"), "00000000..");
    }

    #[test]
    fn test_random_ids_distinct() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_ne!(NodeId::random(&mut rng), NodeId::random(&mut rng));
        assert_ne!(RouteId::random(&mut rng), RouteId::random(&mut rng));
    }
}
