//! Static peer directory and bootstrap view.

use pbft_types::{NodeId, View};
use std::collections::HashMap;

/// Read-only directory mapping replica ids to their HTTP addresses.
#[derive(Debug, Clone)]
pub struct PeerTable {
    addrs: HashMap<NodeId, String>,
}

impl PeerTable {
    /// The fixed four-replica deployment.
    pub fn bootstrap() -> Self {
        Self::from_entries([
            ("Apple", "127.0.0.1:1111"),
            ("Ball", "127.0.0.1:1112"),
            ("Candy", "127.0.0.1:1113"),
            ("Dog", "127.0.0.1:1114"),
        ])
    }

    pub fn from_entries<I, N, A>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, A)>,
        N: Into<NodeId>,
        A: Into<String>,
    {
        Self {
            addrs: entries
                .into_iter()
                .map(|(node, addr)| (node.into(), addr.into()))
                .collect(),
        }
    }

    pub fn address(&self, node: &NodeId) -> Option<&str> {
        self.addrs.get(node).map(String::as_str)
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.addrs.contains_key(node)
    }

    /// Every replica id except `node`, in arbitrary order.
    pub fn peers_except<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a NodeId> {
        self.addrs.keys().filter(move |peer| *peer != node)
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

/// The view the deployment boots with.
pub fn bootstrap_view() -> View {
    View::new(10_000_000_000, "Apple")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_table_has_four_replicas() {
        let table = PeerTable::bootstrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.address(&NodeId::from("Apple")), Some("127.0.0.1:1111"));
        assert_eq!(table.address(&NodeId::from("Dog")), Some("127.0.0.1:1114"));
        assert!(!table.contains(&NodeId::from("Egg")));
    }

    #[test]
    fn test_peers_except_excludes_self() {
        let table = PeerTable::bootstrap();
        let me = NodeId::from("Ball");
        let peers: Vec<_> = table.peers_except(&me).collect();
        assert_eq!(peers.len(), 3);
        assert!(!peers.contains(&&me));
    }

    #[test]
    fn test_bootstrap_view_names_the_primary() {
        let view = bootstrap_view();
        assert_eq!(view.id, 10_000_000_000);
        assert!(view.is_primary(&NodeId::from("Apple")));
    }
}
