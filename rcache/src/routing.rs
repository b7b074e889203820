use std::fmt;

pub(crate) const SLOT_SIZE: u16 = 16384;

fn slot(key: &[u8]) -> u16 {
    crc16::State::<crc16::XMODEM>::calculate(key) % SLOT_SIZE
}

/// Returns the cluster slot that owns `key`.
///
/// Only the hash tag is hashed when the key has one, so `{user1}.a` and
/// `{user1}.b` always share a slot.
pub fn get_slot(key: &[u8]) -> u16 {
    let key = match get_hashtag(key) {
        Some(tag) => tag,
        None => key,
    };

    slot(key)
}

fn get_hashtag(key: &[u8]) -> Option<&[u8]> {
    let open = key.iter().position(|v| *v == b'{')?;
    let close = key[open..].iter().position(|v| *v == b'}')?;

    let rv = &key[open + 1..open + close];
    if rv.is_empty() {
        None
    } else {
        Some(rv)
    }
}

/// How the store is deployed.  Fixed once the connection is set up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Topology {
    /// One logical address.
    #[default]
    Single,
    /// Keys are spread over several nodes by slot.
    Sharded {
        /// `host:port` of the seed nodes.
        nodes: Vec<String>,
    },
}

impl Topology {
    /// Convenience constructor for a sharded deployment.
    pub fn sharded<I, S>(nodes: I) -> Topology
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Topology::Sharded {
            nodes: nodes.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true for sharded deployments.
    pub fn is_sharded(&self) -> bool {
        matches!(self, Topology::Sharded { .. })
    }
}

/// Where a script management command has to be sent.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub enum RouteHint {
    /// Any node will do; used with single-node deployments.
    #[default]
    Any,
    /// The node owning the slot of this key.
    Key(Vec<u8>),
}

impl RouteHint {
    /// Returns the slot this hint points at, if it is key based.
    pub fn slot(&self) -> Option<u16> {
        match self {
            RouteHint::Any => None,
            RouteHint::Key(key) => Some(get_slot(key)),
        }
    }
}

impl fmt::Debug for RouteHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteHint::Any => f.write_str("any"),
            RouteHint::Key(key) => write!(f, "key({:?})", String::from_utf8_lossy(key)),
        }
    }
}

/// Picks the target of script loads.
///
/// Data commands are routed by the store itself; only `SCRIPT LOAD`, which
/// carries no key, needs to be told which shard will later run the script.
#[derive(Debug, Clone, Default)]
pub struct RoutingStrategy {
    topology: Topology,
}

impl RoutingStrategy {
    /// Creates a strategy for the given deployment.
    pub fn new(topology: Topology) -> Self {
        RoutingStrategy { topology }
    }

    /// Returns the deployment this strategy routes for.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Returns the route hint for a script operating on `keys`.  In sharded
    /// mode the first key decides.
    pub fn target_for(&self, keys: &[Vec<u8>]) -> RouteHint {
        match (&self.topology, keys.first()) {
            (Topology::Sharded { .. }, Some(first)) => RouteHint::Key(first.clone()),
            _ => RouteHint::Any,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_hashtag() {
        assert_eq!(get_hashtag(&b"foo{bar}baz"[..]), Some(&b"bar"[..]));
        assert_eq!(get_hashtag(&b"foo{}{baz}"[..]), None);
        assert_eq!(get_hashtag(&b"foo{{bar}}zap"[..]), Some(&b"{bar"[..]));
        assert_eq!(get_hashtag(&b"plain"[..]), None);
    }

    #[test]
    fn test_slot_uses_hashtag() {
        assert_eq!(get_slot(b"{user1}.following"), get_slot(b"{user1}.followers"));
        assert_eq!(get_slot(b"{user1}.following"), get_slot(b"user1"));
        assert!(get_slot(b"anything") < SLOT_SIZE);
    }

    #[test]
    fn test_known_slots() {
        // values as reported by CLUSTER KEYSLOT
        assert_eq!(get_slot(b"foo"), 12182);
        assert_eq!(get_slot(b"bar"), 5061);
    }

    #[test]
    fn single_node_needs_no_hint() {
        let strategy = RoutingStrategy::new(Topology::Single);
        assert_eq!(strategy.target_for(&[b"a".to_vec()]), RouteHint::Any);
    }

    #[test]
    fn sharded_routes_by_first_key() {
        let strategy = RoutingStrategy::new(Topology::sharded(["10.0.0.1:7000", "10.0.0.2:7000"]));
        let hint = strategy.target_for(&[b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(hint, RouteHint::Key(b"first".to_vec()));
        assert_eq!(hint.slot(), Some(get_slot(b"first")));
        assert_eq!(strategy.target_for(&[]), RouteHint::Any);
    }
}
