//! Node assignment policy for new partition keys.
//!
//! When a primary key is inserted, the hive selects one node from the
//! dimension's writable nodes. The policy is pluggable; the default
//! [`HashAssigner`] hashes the key and picks by modulo over the node list
//! sorted by id, so the same `(node set, key)` input always routes to the
//! same node, across processes and restarts.

use std::hash::Hasher;

use fnv::FnvHasher;

use crate::error::{HiveError, Result};
use crate::meta::Node;
use crate::types::KeyValue;

/// Chooses the node a new partition key is placed on.
///
/// # Contract
///
/// - `nodes` contains only writable nodes; the returned node is one of them.
/// - The choice is deterministic for the same sorted node-id list and key.
/// - An empty `nodes` fails with [`HiveError::NoWritableNode`].
pub trait Assigner: Send + Sync {
    /// Picks the node for `key` from the writable `nodes`.
    fn choose<'a>(&self, nodes: &'a [Node], key: &KeyValue) -> Result<&'a Node>;
}

/// Default assigner: stable FNV-1a hash of the key, modulo the sorted
/// node-id list.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashAssigner;

impl Assigner for HashAssigner {
    fn choose<'a>(&self, nodes: &'a [Node], key: &KeyValue) -> Result<&'a Node> {
        if nodes.is_empty() {
            return Err(HiveError::NoWritableNode(key.to_string()));
        }

        let mut order: Vec<&Node> = nodes.iter().collect();
        order.sort_by_key(|n| n.id);

        let mut hasher = FnvHasher::default();
        hasher.write(&key.to_canonical_bytes());
        let slot = (hasher.finish() % order.len() as u64) as usize;
        Ok(order[slot])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, Status};

    fn nodes(count: u32) -> Vec<Node> {
        (1..=count)
            .map(|i| Node {
                id: NodeId(i),
                ..Node::new(format!("n{}", i), format!("db://{}", i))
            })
            .collect()
    }

    #[test]
    fn test_empty_input_fails() {
        let err = HashAssigner.choose(&[], &KeyValue::from(1i64)).unwrap_err();
        assert!(matches!(err, HiveError::NoWritableNode(_)));
    }

    #[test]
    fn test_single_node_always_chosen() {
        let nodes = nodes(1);
        for key in 0..20i64 {
            let chosen = HashAssigner.choose(&nodes, &KeyValue::from(key)).unwrap();
            assert_eq!(chosen.id, NodeId(1));
        }
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let nodes = nodes(5);
        let key = KeyValue::from("customer-311");
        let first = HashAssigner.choose(&nodes, &key).unwrap().id;
        for _ in 0..10 {
            assert_eq!(HashAssigner.choose(&nodes, &key).unwrap().id, first);
        }
    }

    #[test]
    fn test_order_insensitive() {
        let mut shuffled = nodes(4);
        shuffled.reverse();
        let key = KeyValue::from(9000i64);
        let a = HashAssigner.choose(&nodes(4), &key).unwrap().id;
        let b = HashAssigner.choose(&shuffled, &key).unwrap().id;
        assert_eq!(a, b);
    }

    #[test]
    fn test_chosen_node_is_from_input() {
        let nodes = nodes(3);
        for key in 0..50i64 {
            let chosen = HashAssigner.choose(&nodes, &KeyValue::from(key)).unwrap();
            assert!(nodes.iter().any(|n| n.id == chosen.id));
            assert_eq!(chosen.status, Status::Writable);
        }
    }
}
